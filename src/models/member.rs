//! Community member model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::{Postgres, QueryBuilder};

use super::ApiSerializable;
use crate::store::{Entity, Ordering, postgres::PgEntity};

/// Represents a member record from the `members` table.
///
/// `name` and `email` are unique across all members.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// Build an unsaved member. The id is assigned on insert.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            email: email.into(),
            joined_at: Utc::now(),
        }
    }
}

impl Entity for Member {
    const TABLE: &'static str = "members";

    fn default_order() -> Option<Ordering> {
        Some(Ordering::asc("id"))
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl PgEntity for Member {
    const COLUMNS: &'static str = "id, name, email, joined_at";

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("(name, email, joined_at) VALUES (");
        let mut values = qb.separated(", ");
        values.push_bind(self.name.clone());
        values.push_bind(self.email.clone());
        values.push_bind(self.joined_at);
        values.push_unseparated(")");
    }

    fn push_assignments(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("name = ").push_bind(self.name.clone());
        qb.push(", email = ").push_bind(self.email.clone());
    }
}

impl ApiSerializable for Member {
    fn to_api_representation(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "joined": self.joined_at,
        })
    }
}
