//! `blog/entries`: blog posts written by members.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;

use super::{ApiRequest, EntityResource, SaveMode, base::apply_text};
use crate::{
    error::ApiError,
    models::{blog_entry::BlogEntry, member::Member},
    store::{EntityStore, Filter, FilterValue},
};

const NO_TITLE: &str = "1B300/2";
const NO_CONTENT: &str = "1B300/3";
const INVALID_AUTHOR: &str = "1B300/4";

fn invalid_author() -> ApiError {
    ApiError::rejected(StatusCode::NOT_FOUND, "INVALID_AUTHOR", INVALID_AUTHOR)
}

pub struct EntriesController {
    entries: Arc<dyn EntityStore<BlogEntry>>,
    members: Arc<dyn EntityStore<Member>>,
}

impl EntriesController {
    pub fn new(
        entries: Arc<dyn EntityStore<BlogEntry>>,
        members: Arc<dyn EntityStore<Member>>,
    ) -> Self {
        Self { entries, members }
    }
}

#[async_trait]
impl EntityResource for EntriesController {
    type Entity = BlogEntry;

    const INVALID_ID_LOCATOR: &'static str = "2B300/1";

    fn store(&self) -> Arc<dyn EntityStore<BlogEntry>> {
        self.entries.clone()
    }

    fn new_entity(&self) -> BlogEntry {
        BlogEntry::default()
    }

    async fn create_or_update(
        &self,
        entry: &mut BlogEntry,
        request: &ApiRequest,
        mode: SaveMode,
    ) -> Result<(), ApiError> {
        let params = &request.params;

        apply_text(
            params,
            "title",
            mode,
            &mut entry.title,
            ApiError::rejected(StatusCode::BAD_REQUEST, "NO_TITLE", NO_TITLE),
        )?;
        apply_text(
            params,
            "content",
            mode,
            &mut entry.content,
            ApiError::rejected(StatusCode::BAD_REQUEST, "NO_CONTENT", NO_CONTENT),
        )?;

        if mode == SaveMode::Create || params.contains("author") {
            let author = params.get_i64("author").ok_or_else(invalid_author)?;
            if self.members.load(author).await?.is_none() {
                return Err(invalid_author());
            }
            entry.author_id = author;
        }

        if let Some(hidden) = params.get_bool("hidden") {
            entry.hidden = hidden;
        }
        if let Some(pinned) = params.get_bool("pinned") {
            entry.pinned = pinned;
        }

        if mode == SaveMode::Update {
            entry.updated_at = Utc::now();
        }

        Ok(())
    }

    /// `?author=` and `?hidden=` narrow the list.
    async fn list_filter(&self, request: &ApiRequest) -> Result<Filter, ApiError> {
        let mut filter = Filter::new();

        if let Some(author) = request.params.get_i64("author") {
            filter = filter.eq("author_id", FilterValue::Int(author));
        }
        if let Some(hidden) = request.params.get_bool("hidden") {
            filter = filter.eq("hidden", FilterValue::Bool(hidden));
        }

        Ok(filter)
    }
}
