//! Forum model.
//!
//! Forums form a tree through `parent_id` and are manually ordered by
//! `position`.

use serde::Serialize;
use serde_json::{Value, json};
use sqlx::{Postgres, QueryBuilder};

use super::ApiSerializable;
use crate::store::{Entity, Ordering, postgres::PgEntity};

#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct Forum {
    pub id: i64,
    pub name: String,
    pub description: String,

    /// `None` for top-level forums
    pub parent_id: Option<i64>,

    pub position: i64,
}

impl Entity for Forum {
    const TABLE: &'static str = "forums";
    const POSITION_COLUMN: Option<&'static str> = Some("position");

    fn default_order() -> Option<Ordering> {
        Some(Ordering::asc("position"))
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn assign_position(&mut self, position: i64) {
        self.position = position;
    }
}

impl PgEntity for Forum {
    const COLUMNS: &'static str = "id, name, description, parent_id, position";

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("(name, description, parent_id, position) VALUES (");
        let mut values = qb.separated(", ");
        values.push_bind(self.name.clone());
        values.push_bind(self.description.clone());
        values.push_bind(self.parent_id);
        values.push_bind(self.position);
        values.push_unseparated(")");
    }

    fn push_assignments(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("name = ").push_bind(self.name.clone());
        qb.push(", description = ").push_bind(self.description.clone());
        qb.push(", parent_id = ").push_bind(self.parent_id);
        qb.push(", position = ").push_bind(self.position);
    }
}

impl ApiSerializable for Forum {
    fn to_api_representation(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "parent": self.parent_id,
            "position": self.position,
        })
    }
}
