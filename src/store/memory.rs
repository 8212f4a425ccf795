//! In-process implementations of the storage traits.
//!
//! Used by the test-suite and handy for running the API without PostgreSQL.
//! Filters and ordering are evaluated against each entity's serialized form,
//! whose field names match the table's column names.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    AbuseLedger, BanStore, Comparison, Entity, EntityStore, Filter, FilterValue, KeyStore,
    ListQuery, Ordering, StoreError,
};
use crate::models::{
    api_key::{ApiKey, hash_key},
    api_log::ApiLogEntry,
};

fn matches_value(field: Option<&Value>, expected: &FilterValue) -> bool {
    match expected {
        FilterValue::Int(v) => field.and_then(Value::as_i64) == Some(*v),
        FilterValue::Bool(v) => field.and_then(Value::as_bool) == Some(*v),
        FilterValue::Text(v) => field.and_then(Value::as_str) == Some(v.as_str()),
        FilterValue::Null => field.is_none_or(Value::is_null),
    }
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    filter.conditions().iter().all(|condition| {
        let hit = matches_value(row.get(condition.column), &condition.value);
        match condition.comparison {
            Comparison::Eq => hit,
            Comparison::NotEq => !hit,
        }
    })
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            // RFC 3339 timestamps have a variable-width fraction, compare them as instants.
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => CmpOrdering::Equal,
        // NULLs sort last in ascending order, as in PostgreSQL.
        (None | Some(Value::Null), _) => CmpOrdering::Greater,
        (_, None | Some(Value::Null)) => CmpOrdering::Less,
        _ => CmpOrdering::Equal,
    }
}

struct Table<E> {
    rows: BTreeMap<i64, E>,
    next_id: i64,
}

/// Entity table held in a `BTreeMap` keyed by id.
pub struct MemoryEntityStore<E> {
    table: RwLock<Table<E>>,
}

impl<E> Default for MemoryEntityStore<E> {
    fn default() -> Self {
        Self {
            table: RwLock::new(Table {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl<E: Entity> MemoryEntityStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized rows matching `filter`, in id order.
    fn matching(rows: &BTreeMap<i64, E>, filter: &Filter) -> Result<Vec<(Value, E)>, StoreError> {
        let mut out = Vec::new();
        for entity in rows.values() {
            let row = serde_json::to_value(entity)?;
            if matches_filter(&row, filter) {
                out.push((row, entity.clone()));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryEntityStore<E> {
    async fn count(&self, filter: &Filter) -> Result<i64, StoreError> {
        let table = self.table.read().await;
        let matching = Self::matching(&table.rows, filter)?;

        Ok(matching.len() as i64)
    }

    async fn select(
        &self,
        query: &ListQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<E>, StoreError> {
        let table = self.table.read().await;
        let mut matching = Self::matching(&table.rows, &query.filter)?;

        // Stable sort keeps the id order for ties.
        if let Some(Ordering { column, descending }) = query.order {
            matching.sort_by(|(a, _), (b, _)| {
                let ordering = compare_fields(a.get(column), b.get(column));
                if descending { ordering.reverse() } else { ordering }
            });
        }

        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|(_, entity)| entity)
            .collect())
    }

    async fn load(&self, id: i64) -> Result<Option<E>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn max_value(&self, column: &'static str) -> Result<Option<i64>, StoreError> {
        let table = self.table.read().await;
        let mut max = None;
        for entity in table.rows.values() {
            let row = serde_json::to_value(entity)?;
            if let Some(value) = row.get(column).and_then(Value::as_i64) {
                max = Some(max.map_or(value, |current: i64| current.max(value)));
            }
        }

        Ok(max)
    }

    async fn insert(&self, mut entity: E) -> Result<E, StoreError> {
        let mut table = self.table.write().await;
        let id = table.next_id;
        table.next_id += 1;

        entity.assign_id(id);
        table.rows.insert(id, entity.clone());

        Ok(entity)
    }

    async fn update(&self, entity: &E) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&entity.id()) {
            Some(row) => {
                *row = entity.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.table.write().await.rows.remove(&id).is_some())
    }
}

/// Keys indexed by their hash, like the `api_keys` table.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, ApiKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: ApiKey) {
        self.keys.write().await.insert(key.key_hash.clone(), key);
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn find_by_token(&self, raw_key: &str) -> Result<Option<ApiKey>, StoreError> {
        let keys = self.keys.read().await;

        Ok(keys
            .get(&hash_key(raw_key))
            .filter(|key| key.is_active)
            .cloned())
    }
}

/// Append-only request log.
#[derive(Default)]
pub struct MemoryAbuseLedger {
    entries: RwLock<Vec<ApiLogEntry>>,
}

impl MemoryAbuseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded entry, oldest first.
    pub async fn entries(&self) -> Vec<ApiLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AbuseLedger for MemoryAbuseLedger {
    async fn record(&self, entry: &ApiLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());

        Ok(())
    }

    async fn count_bad_keys(
        &self,
        ip: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        let entries = self.entries.read().await;
        let count = entries
            .iter()
            .filter(|entry| entry.is_bad_key && entry.ip_address == ip)
            .filter(|entry| since.is_none_or(|since| entry.created_at > since))
            .count();

        Ok(count as i64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A recorded ban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpBan {
    pub ip_pattern: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryBanStore {
    bans: RwLock<Vec<IpBan>>,
}

impl MemoryBanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bans(&self) -> Vec<IpBan> {
        self.bans.read().await.clone()
    }
}

#[async_trait]
impl BanStore for MemoryBanStore {
    async fn ip_patterns(&self) -> Result<Vec<String>, StoreError> {
        let bans = self.bans.read().await;

        Ok(bans.iter().map(|ban| ban.ip_pattern.clone()).collect())
    }

    async fn insert_ip_ban(&self, ip: &str, reason: &str) -> Result<(), StoreError> {
        self.bans.write().await.push(IpBan {
            ip_pattern: ip.to_string(),
            reason: reason.to_string(),
            created_at: Utc::now(),
        });

        Ok(())
    }
}
