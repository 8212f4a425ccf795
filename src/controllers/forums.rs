//! `forums/forums`: the forum tree.
//!
//! Forums are listed by `position`. New forums go to the end. `GET
//! {id}/children` pages through a forum's direct children.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use axum::http::StatusCode;

use super::{
    ApiRequest, EntityResource, SaveMode,
    base::{apply_text, list_entities, load_entity, select_all},
};
use crate::{
    error::ApiError,
    models::forum::Forum,
    response::ApiResponse,
    store::{EntityStore, Filter, FilterValue},
};

const NO_NAME: &str = "1F384/2";
const INVALID_PARENT: &str = "1F384/3";

fn invalid_parent() -> ApiError {
    ApiError::rejected(StatusCode::NOT_FOUND, "INVALID_PARENT", INVALID_PARENT)
}

pub struct ForumsController {
    forums: Arc<dyn EntityStore<Forum>>,
}

impl ForumsController {
    pub fn new(forums: Arc<dyn EntityStore<Forum>>) -> Self {
        Self { forums }
    }

    /// Resolve the `parent` parameter. `0` or blank means top level.
    ///
    /// The parent must exist and must not be the forum itself or one of its
    /// descendants.
    async fn parent(&self, raw: &str, own_id: i64) -> Result<Option<i64>, ApiError> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "0" {
            return Ok(None);
        }

        let parent: i64 = raw.parse().map_err(|_| invalid_parent())?;
        if self.forums.load(parent).await?.is_none() {
            return Err(invalid_parent());
        }

        // Unsaved forums have id 0 and no descendants
        if own_id > 0 && self.descends_from(parent, own_id).await? {
            return Err(invalid_parent());
        }

        Ok(Some(parent))
    }

    /// Whether `forum` is `ancestor` or sits somewhere below it.
    async fn descends_from(&self, forum: i64, ancestor: i64) -> Result<bool, ApiError> {
        let mut seen = HashSet::new();
        let mut current = Some(forum);

        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            if !seen.insert(id) {
                break;
            }
            current = self.forums.load(id).await?.and_then(|f| f.parent_id);
        }

        Ok(false)
    }
}

#[async_trait]
impl EntityResource for ForumsController {
    type Entity = Forum;

    const INVALID_ID_LOCATOR: &'static str = "2F384/1";

    fn store(&self) -> Arc<dyn EntityStore<Forum>> {
        self.forums.clone()
    }

    fn new_entity(&self) -> Forum {
        Forum::default()
    }

    async fn create_or_update(
        &self,
        forum: &mut Forum,
        request: &ApiRequest,
        mode: SaveMode,
    ) -> Result<(), ApiError> {
        let params = &request.params;

        apply_text(
            params,
            "name",
            mode,
            &mut forum.name,
            ApiError::rejected(StatusCode::BAD_REQUEST, "NO_NAME", NO_NAME),
        )?;

        if let Some(description) = params.get("description") {
            forum.description = description.trim().to_string();
        }

        if let Some(parent) = params.get("parent") {
            forum.parent_id = self.parent(parent, forum.id).await?;
        }

        if let Some(position) = params.get_i64("position") {
            forum.position = position;
        }

        Ok(())
    }

    /// Children of a deleted forum move to the top level.
    async fn after_delete(&self, forum: &Forum) -> Result<(), ApiError> {
        let filter = Filter::new().eq("parent_id", FilterValue::Int(forum.id));

        for mut child in select_all(&*self.forums, filter).await? {
            child.parent_id = None;
            self.forums.update(&child).await?;
        }

        Ok(())
    }

    async fn nested(
        &self,
        request: &mut ApiRequest,
        id: &str,
        name: &str,
    ) -> Result<ApiResponse, ApiError> {
        match name {
            "children" => {
                let forum = load_entity(self, id).await?;
                let filter = Filter::new().eq("parent_id", FilterValue::Int(forum.id));

                list_entities(self, request, filter).await
            }
            _ => Err(ApiError::NoEndpoint),
        }
    }
}
