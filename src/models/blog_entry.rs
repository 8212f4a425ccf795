//! Blog entry model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::{Postgres, QueryBuilder};

use super::ApiSerializable;
use crate::store::{Entity, Ordering, postgres::PgEntity};

/// Represents a row of the `blog_entries` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BlogEntry {
    pub id: i64,
    pub title: String,
    pub content: String,

    /// Foreign key to `members.id`
    pub author_id: i64,

    /// Hidden entries are only visible to moderators on the front end
    pub hidden: bool,

    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for BlogEntry {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title: String::new(),
            content: String::new(),
            author_id: 0,
            hidden: false,
            pinned: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for BlogEntry {
    const TABLE: &'static str = "blog_entries";

    /// Newest first.
    fn default_order() -> Option<Ordering> {
        Some(Ordering::desc("created_at"))
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl PgEntity for BlogEntry {
    const COLUMNS: &'static str =
        "id, title, content, author_id, hidden, pinned, created_at, updated_at";

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("(title, content, author_id, hidden, pinned, created_at, updated_at) VALUES (");
        let mut values = qb.separated(", ");
        values.push_bind(self.title.clone());
        values.push_bind(self.content.clone());
        values.push_bind(self.author_id);
        values.push_bind(self.hidden);
        values.push_bind(self.pinned);
        values.push_bind(self.created_at);
        values.push_bind(self.updated_at);
        values.push_unseparated(")");
    }

    fn push_assignments(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("title = ").push_bind(self.title.clone());
        qb.push(", content = ").push_bind(self.content.clone());
        qb.push(", author_id = ").push_bind(self.author_id);
        qb.push(", hidden = ").push_bind(self.hidden);
        qb.push(", pinned = ").push_bind(self.pinned);
        qb.push(", updated_at = ").push_bind(self.updated_at);
    }
}

impl ApiSerializable for BlogEntry {
    fn to_api_representation(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "content": self.content,
            "author": self.author_id,
            "hidden": self.hidden,
            "pinned": self.pinned,
            "date": self.created_at,
            "updated": self.updated_at,
        })
    }
}
