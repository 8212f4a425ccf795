//! PostgreSQL implementations of the storage traits.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder, postgres::PgRow};

use super::{
    AbuseLedger, BanStore, Comparison, Entity, EntityStore, Filter, FilterValue, KeyStore,
    ListQuery, StoreError,
};
use crate::{
    db::DbPool,
    models::{
        api_key::{ApiKey, hash_key},
        api_log::ApiLogEntry,
    },
};

/// An entity that knows how to write itself into its table.
pub trait PgEntity: Entity + for<'r> FromRow<'r, PgRow> + Unpin {
    /// Column list used in `SELECT` and `RETURNING` clauses.
    const COLUMNS: &'static str;

    /// Push `(col, ...) VALUES (...)` for an insert. The `id` column is left
    /// to the sequence.
    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>);

    /// Push `col = value, ...` for an update.
    fn push_assignments(&self, qb: &mut QueryBuilder<'_, Postgres>);
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Int(v) => {
            qb.push_bind(*v);
        }
        FilterValue::Bool(v) => {
            qb.push_bind(*v);
        }
        FilterValue::Text(v) => {
            qb.push_bind(v.clone());
        }
        FilterValue::Null => {
            qb.push("NULL");
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for (index, condition) in filter.conditions().iter().enumerate() {
        qb.push(if index == 0 { " WHERE " } else { " AND " });
        qb.push(condition.column);

        match (&condition.value, condition.comparison) {
            (FilterValue::Null, Comparison::Eq) => {
                qb.push(" IS NULL");
            }
            (FilterValue::Null, Comparison::NotEq) => {
                qb.push(" IS NOT NULL");
            }
            (value, comparison) => {
                qb.push(match comparison {
                    Comparison::Eq => " = ",
                    Comparison::NotEq => " <> ",
                });
                push_value(qb, value);
            }
        }
    }
}

/// Generic table access for any [`PgEntity`].
pub struct PgEntityStore<E> {
    pool: DbPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> PgEntityStore<E> {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: PgEntity> EntityStore<E> for PgEntityStore<E> {
    async fn count(&self, filter: &Filter) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
        push_filter(&mut qb, filter);

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn select(
        &self,
        query: &ListQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<E>, StoreError> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM {}", E::COLUMNS, E::TABLE));
        push_filter(&mut qb, &query.filter);

        match query.order {
            Some(order) => {
                let direction = if order.descending { "DESC" } else { "ASC" };
                qb.push(format!(" ORDER BY {} {}, id ASC", order.column, direction));
            }
            None => {
                qb.push(" ORDER BY id ASC");
            }
        }

        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let rows = qb.build_query_as::<E>().fetch_all(&self.pool).await?;

        Ok(rows)
    }

    async fn load(&self, id: i64) -> Result<Option<E>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {} WHERE id = ",
            E::COLUMNS,
            E::TABLE
        ));
        qb.push_bind(id);

        let row = qb.build_query_as::<E>().fetch_optional(&self.pool).await?;

        Ok(row)
    }

    async fn max_value(&self, column: &'static str) -> Result<Option<i64>, StoreError> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT MAX({}) FROM {}", column, E::TABLE));

        let max = qb
            .build_query_scalar::<Option<i64>>()
            .fetch_one(&self.pool)
            .await?;

        Ok(max)
    }

    async fn insert(&self, entity: E) -> Result<E, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} ", E::TABLE));
        entity.push_insert(&mut qb);
        qb.push(" RETURNING ").push(E::COLUMNS);

        let created = qb.build_query_as::<E>().fetch_one(&self.pool).await?;

        Ok(created)
    }

    async fn update(&self, entity: &E) -> Result<bool, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", E::TABLE));
        entity.push_assignments(&mut qb);
        qb.push(" WHERE id = ").push_bind(entity.id());

        let affected = qb.build().execute(&self.pool).await?.rows_affected();

        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("DELETE FROM {} WHERE id = ", E::TABLE));
        qb.push_bind(id);

        let affected = qb.build().execute(&self.pool).await?.rows_affected();

        Ok(affected > 0)
    }
}

/// API keys stored as SHA-256 hashes in `api_keys`.
pub struct PgKeyStore {
    pool: DbPool,
}

impl PgKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyStore for PgKeyStore {
    async fn find_by_token(&self, raw_key: &str) -> Result<Option<ApiKey>, StoreError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT id, key_hash, description, is_active, allowed_ips, allowed_apps, created_at
             FROM api_keys
             WHERE key_hash = $1 AND is_active = true",
        )
        .bind(hash_key(raw_key))
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }
}

/// Audit log backed by the `api_logs` table.
pub struct PgAbuseLedger {
    pool: DbPool,
}

impl PgAbuseLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AbuseLedger for PgAbuseLedger {
    async fn record(&self, entry: &ApiLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO api_logs (
                endpoint,
                method,
                api_key,
                ip_address,
                request_data,
                response_code,
                response_output,
                created_at,
                is_bad_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.endpoint)
        .bind(&entry.method)
        .bind(&entry.api_key)
        .bind(&entry.ip_address)
        .bind(&entry.request_data)
        .bind(entry.response_code)
        .bind(&entry.response_output)
        .bind(entry.created_at)
        .bind(entry.is_bad_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_bad_keys(
        &self,
        ip: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        let count = match since {
            Some(since) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM api_logs
                     WHERE ip_address = $1 AND is_bad_key = true AND created_at > $2",
                )
                .bind(ip)
                .bind(since)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM api_logs WHERE ip_address = $1 AND is_bad_key = true",
                )
                .bind(ip)
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(())
    }
}

/// Ban list backed by the `ip_bans` table.
pub struct PgBanStore {
    pool: DbPool,
}

impl PgBanStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanStore for PgBanStore {
    async fn ip_patterns(&self) -> Result<Vec<String>, StoreError> {
        let patterns = sqlx::query_scalar::<_, String>("SELECT ip_pattern FROM ip_bans")
            .fetch_all(&self.pool)
            .await?;

        Ok(patterns)
    }

    async fn insert_ip_ban(&self, ip: &str, reason: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO ip_bans (ip_pattern, reason) VALUES ($1, $2)")
            .bind(ip)
            .bind(reason)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
