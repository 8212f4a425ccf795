//! Resource controllers.
//!
//! A resource controller answers every request routed to one
//! `{app}/{controller}` pair. Controllers backed by a single entity table
//! implement [`EntityResource`] and get list/view/create/update/delete for
//! free; they only describe how request parameters map onto their entity.

pub mod base;
pub mod blog;
pub mod forums;
pub mod members;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use crate::{
    error::ApiError,
    models::{ApiSerializable, api_key::ApiKey},
    request::Params,
    response::ApiResponse,
    store::{Entity, EntityStore, Filter},
};

/// What a controller sees of the request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// The authenticated key
    pub key: ApiKey,

    pub verb: Method,

    /// Path segments after `{app}/{controller}`
    pub segments: Vec<String>,

    pub params: Params,

    pub language: Option<String>,

    /// Set to force an audit log entry for this request
    pub should_log: bool,
}

impl ApiRequest {
    /// 1-based page number from the `page` parameter.
    pub fn page(&self) -> i64 {
        self.params.get_i64("page").unwrap_or(1).max(1)
    }
}

/// Controller action selected by verb and path shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    List,
    View(String),
    Create,
    Update(String),
    Delete(String),
    Nested { id: String, name: String },
}

impl Action {
    /// Map a verb and the segments after the controller token to an action.
    ///
    /// | verb | segments | action |
    /// |---|---|---|
    /// | GET | none | list |
    /// | GET | `{id}` | view |
    /// | GET | `{id}/{name}` | nested |
    /// | POST | none | create |
    /// | POST, PUT, PATCH | `{id}` | update |
    /// | DELETE | `{id}` | delete |
    pub fn resolve(verb: &Method, segments: &[String]) -> Result<Self, ApiError> {
        let action = match (verb.as_str(), segments) {
            ("GET", []) => Action::List,
            ("GET", [id]) => Action::View(id.clone()),
            ("GET", [id, name]) => Action::Nested {
                id: id.clone(),
                name: name.to_ascii_lowercase(),
            },
            ("POST", []) => Action::Create,
            ("POST" | "PUT" | "PATCH", [id]) => Action::Update(id.clone()),
            ("DELETE", [id]) => Action::Delete(id.clone()),
            _ => return Err(ApiError::NoEndpoint),
        };

        Ok(action)
    }
}

/// Handles every request for one `{app}/{controller}` pair.
#[async_trait]
pub trait ResourceController: Send + Sync {
    async fn handle(&self, request: &mut ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Whether an entity is being created or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Create,
    Update,
}

/// A controller backed by one entity table.
#[async_trait]
pub trait EntityResource: Send + Sync + 'static {
    type Entity: Entity + ApiSerializable;

    /// Locator reported with `INVALID_ID`.
    const INVALID_ID_LOCATOR: &'static str;

    /// Always write an audit entry for deletes.
    const AUDIT_DELETES: bool = false;

    fn store(&self) -> Arc<dyn EntityStore<Self::Entity>>;

    /// A fresh, unsaved entity with server-side defaults.
    fn new_entity(&self) -> Self::Entity;

    /// Map request parameters onto the entity and validate them.
    async fn create_or_update(
        &self,
        entity: &mut Self::Entity,
        request: &ApiRequest,
        mode: SaveMode,
    ) -> Result<(), ApiError>;

    /// Runs once the entity has been persisted.
    async fn after_save(
        &self,
        _entity: &Self::Entity,
        _request: &ApiRequest,
        _mode: SaveMode,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    /// Runs once the entity has been deleted. Dependent rows are cleaned up
    /// here the way the database's foreign keys do it.
    async fn after_delete(&self, _entity: &Self::Entity) -> Result<(), ApiError> {
        Ok(())
    }

    /// Extra filter for the list action.
    async fn list_filter(&self, _request: &ApiRequest) -> Result<Filter, ApiError> {
        Ok(Filter::new())
    }

    /// `GET {id}/{name}` actions.
    async fn nested(
        &self,
        _request: &mut ApiRequest,
        _id: &str,
        _name: &str,
    ) -> Result<ApiResponse, ApiError> {
        Err(ApiError::NoEndpoint)
    }
}

#[async_trait]
impl<R: EntityResource> ResourceController for R {
    async fn handle(&self, request: &mut ApiRequest) -> Result<ApiResponse, ApiError> {
        match Action::resolve(&request.verb, &request.segments)? {
            Action::List => {
                let filter = self.list_filter(request).await?;
                base::list_entities(self, request, filter).await
            }
            Action::View(id) => base::view_entity(self, &id).await,
            Action::Create => base::create_entity(self, request).await,
            Action::Update(id) => base::update_entity(self, request, &id).await,
            Action::Delete(id) => {
                let response = base::delete_entity(self, &id).await?;
                if R::AUDIT_DELETES {
                    request.should_log = true;
                }
                Ok(response)
            }
            Action::Nested { id, name } => self.nested(request, &id, &name).await,
        }
    }
}
