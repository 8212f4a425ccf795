//! Storage capabilities consumed by the dispatcher.
//!
//! The dispatcher never talks to PostgreSQL directly. It depends on the
//! traits in this module; [`postgres`] implements them on top of `sqlx` and
//! [`memory`] keeps everything in process (tests, local development).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{api_key::ApiKey, api_log::ApiLogEntry};

/// Failure inside a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Row encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Value a filter condition compares a column against.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Bool(bool),
    Text(String),
    Null,
}

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
}

/// A single `column <op> value` predicate.
///
/// Column names are always compile-time constants, never request input.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: &'static str,
    pub comparison: Comparison,
    pub value: FilterValue,
}

/// Conjunction of conditions (`WHERE a AND b AND ...`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: FilterValue) -> Self {
        self.conditions.push(Condition {
            column,
            comparison: Comparison::Eq,
            value,
        });
        self
    }

    pub fn not_eq(mut self, column: &'static str, value: FilterValue) -> Self {
        self.conditions.push(Condition {
            column,
            comparison: Comparison::NotEq,
            value,
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Sort applied to a selection. Ties are always broken by `id` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub column: &'static str,
    pub descending: bool,
}

impl Ordering {
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// An unpaged selection: which rows, in which order.
///
/// Paging (`LIMIT` / `OFFSET`) is applied only when the selection is
/// materialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Filter,
    pub order: Option<Ordering>,
}

/// A row type persisted in its own table.
///
/// The serialized form of an entity mirrors its table row: field names are
/// column names. The in-memory store relies on this to evaluate filters.
pub trait Entity: Serialize + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    /// Column holding a manual sort position, filled with `MAX + 1` on create.
    const POSITION_COLUMN: Option<&'static str> = None;

    fn default_order() -> Option<Ordering> {
        None
    }

    fn id(&self) -> i64;

    fn assign_id(&mut self, id: i64);

    fn assign_position(&mut self, _position: i64) {}
}

/// CRUD access to one entity table.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    async fn count(&self, filter: &Filter) -> Result<i64, StoreError>;

    async fn select(&self, query: &ListQuery, limit: i64, offset: i64)
    -> Result<Vec<E>, StoreError>;

    async fn load(&self, id: i64) -> Result<Option<E>, StoreError>;

    async fn max_value(&self, column: &'static str) -> Result<Option<i64>, StoreError>;

    /// Persist a new entity. The returned copy carries the assigned id.
    async fn insert(&self, entity: E) -> Result<E, StoreError>;

    /// Returns `false` when no row with the entity's id exists.
    async fn update(&self, entity: &E) -> Result<bool, StoreError>;

    /// Returns `false` when no row with this id exists.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

/// Resolves presented key strings to stored API keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Look up an active key by its raw token. Inactive keys are not found.
    async fn find_by_token(&self, raw_key: &str) -> Result<Option<ApiKey>, StoreError>;
}

/// Persisted request log used for auditing and throttling.
#[async_trait]
pub trait AbuseLedger: Send + Sync {
    async fn record(&self, entry: &ApiLogEntry) -> Result<(), StoreError>;

    /// Count bad-key entries for `ip`, optionally only those newer than `since`.
    async fn count_bad_keys(
        &self,
        ip: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError>;

    /// Cheap connectivity check for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Site-wide list of banned IP patterns.
#[async_trait]
pub trait BanStore: Send + Sync {
    async fn ip_patterns(&self) -> Result<Vec<String>, StoreError>;

    async fn insert_ip_ban(&self, ip: &str, reason: &str) -> Result<(), StoreError>;
}
