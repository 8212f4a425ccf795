//! Paginated response envelope.
//!
//! A list endpoint hands over an unpaged selection plus its total count.
//! Paging is applied only when the envelope is materialized:
//!
//! ```json
//! {
//!   "page": 2,
//!   "perPage": 25,
//!   "totalResults": 60,
//!   "totalPages": 3,
//!   "results": [ ... ]
//! }
//! ```
//!
//! Page numbers have no upper bound; a page past the end is simply empty.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ApiError,
    models::ApiSerializable,
    store::{Entity, EntityStore, ListQuery},
};

/// Fixed page size.
pub const PER_PAGE: i64 = 25;

/// Number of pages needed for `total` results.
pub fn total_pages(total: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + PER_PAGE - 1) / PER_PAGE
    }
}

/// Rows behind a paginated response.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page of already-serialized rows.
    async fn fetch(&self, limit: i64, offset: i64) -> Result<Vec<Value>, ApiError>;
}

/// How rows are turned into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// Through the entity's public API representation
    Api,
    /// The stored row, unchanged
    Raw,
}

/// A filtered, ordered selection over an entity store.
pub struct EntitySelection<E: Entity> {
    store: Arc<dyn EntityStore<E>>,
    query: ListQuery,
    format: RowFormat,
}

impl<E: Entity + ApiSerializable> EntitySelection<E> {
    pub fn new(store: Arc<dyn EntityStore<E>>, query: ListQuery) -> Self {
        Self {
            store,
            query,
            format: RowFormat::Api,
        }
    }

    pub fn raw(store: Arc<dyn EntityStore<E>>, query: ListQuery) -> Self {
        Self {
            store,
            query,
            format: RowFormat::Raw,
        }
    }
}

#[async_trait]
impl<E: Entity + ApiSerializable> PageSource for EntitySelection<E> {
    async fn fetch(&self, limit: i64, offset: i64) -> Result<Vec<Value>, ApiError> {
        let rows = self.store.select(&self.query, limit, offset).await?;

        rows.iter()
            .map(|row| match self.format {
                RowFormat::Api => Ok(row.to_api_representation()),
                RowFormat::Raw => serde_json::to_value(row).map_err(ApiError::from),
            })
            .collect()
    }
}

/// Serialized page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEnvelope {
    pub page: i64,
    pub per_page: i64,
    pub total_results: i64,
    pub total_pages: i64,
    pub results: Vec<Value>,
}

/// A list result waiting to be materialized.
pub struct PaginatedResponse {
    status: StatusCode,
    source: Box<dyn PageSource>,
    page: i64,
    total: i64,
}

impl PaginatedResponse {
    /// `page` is 1-based; anything below 1 is treated as 1.
    pub fn new(status: StatusCode, source: impl PageSource + 'static, page: i64, total: i64) -> Self {
        Self {
            status,
            source: Box::new(source),
            page: page.max(1),
            total,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn total_pages(&self) -> i64 {
        total_pages(self.total)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(PER_PAGE)
    }

    /// Fetch the requested page and build the envelope.
    pub async fn materialize(self) -> Result<PageEnvelope, ApiError> {
        let results = self.source.fetch(PER_PAGE, self.offset()).await?;

        Ok(PageEnvelope {
            page: self.page,
            per_page: PER_PAGE,
            total_results: self.total,
            total_pages: self.total_pages(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::forum::Forum,
        store::{Filter, memory::MemoryEntityStore},
    };

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0), 0);
        assert_eq!(total_pages(1), 1);
        assert_eq!(total_pages(25), 1);
        assert_eq!(total_pages(26), 2);
        assert_eq!(total_pages(60), 3);
    }

    #[test]
    fn page_is_clamped_below_but_not_above() {
        struct Empty;

        #[async_trait]
        impl PageSource for Empty {
            async fn fetch(&self, _: i64, _: i64) -> Result<Vec<Value>, ApiError> {
                Ok(Vec::new())
            }
        }

        assert_eq!(PaginatedResponse::new(StatusCode::OK, Empty, 0, 5).page(), 1);
        assert_eq!(PaginatedResponse::new(StatusCode::OK, Empty, -3, 5).offset(), 0);

        let far = PaginatedResponse::new(StatusCode::OK, Empty, 1_000, 5);
        assert_eq!(far.offset(), 999 * PER_PAGE);
        assert_eq!(PaginatedResponse::new(StatusCode::OK, Empty, i64::MAX, 5).offset(), i64::MAX);
    }

    async fn seeded_store(count: usize) -> Arc<MemoryEntityStore<Forum>> {
        let store = Arc::new(MemoryEntityStore::<Forum>::new());
        for position in 1..=count {
            store
                .insert(Forum {
                    name: format!("Forum {position}"),
                    position: position as i64,
                    ..Forum::default()
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn pages_are_slices_of_the_ordered_selection() {
        let store = seeded_store(60).await;
        let query = ListQuery {
            filter: Filter::new(),
            order: Forum::default_order(),
        };

        for page in 1..=3 {
            let envelope = PaginatedResponse::new(
                StatusCode::OK,
                EntitySelection::new(store.clone(), query.clone()),
                page,
                60,
            )
            .materialize()
            .await
            .unwrap();

            let expected: Vec<i64> = ((page - 1) * PER_PAGE + 1..=(page * PER_PAGE).min(60)).collect();
            let positions: Vec<i64> = envelope
                .results
                .iter()
                .map(|row| row["position"].as_i64().unwrap())
                .collect();

            assert_eq!(positions, expected);
            assert_eq!(envelope.total_pages, 3);
            assert!(envelope.results.len() as i64 <= PER_PAGE);
        }
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let store = seeded_store(3).await;

        let envelope = PaginatedResponse::new(
            StatusCode::OK,
            EntitySelection::new(store, ListQuery::default()),
            7,
            3,
        )
        .materialize()
        .await
        .unwrap();

        assert_eq!(envelope.page, 7);
        assert_eq!(envelope.total_pages, 1);
        assert!(envelope.results.is_empty());
    }

    #[tokio::test]
    async fn raw_rows_keep_column_names() {
        let store = seeded_store(1).await;

        let envelope = PaginatedResponse::new(
            StatusCode::OK,
            EntitySelection::raw(store, ListQuery::default()),
            1,
            1,
        )
        .materialize()
        .await
        .unwrap();

        assert!(envelope.results[0].get("parent_id").is_some());
        assert!(envelope.results[0].get("parent").is_none());
    }
}
