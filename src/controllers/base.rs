//! CRUD primitives shared by entity-backed controllers.

use axum::http::StatusCode;

use super::{ApiRequest, EntityResource, SaveMode};
use crate::{
    error::ApiError,
    models::ApiSerializable,
    pagination::{EntitySelection, PaginatedResponse},
    request::Params,
    response::ApiResponse,
    store::{Entity, EntityStore, Filter, ListQuery},
};

const POSITION_OVERFLOW: &str = "1X000/1";

/// Parse an entity id path segment. Ids are positive integers.
pub fn parse_id(raw: &str, locator: &'static str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ApiError::InvalidId { locator })
}

/// Load an entity by its raw id, or fail with the resource's `INVALID_ID`.
pub async fn load_entity<R: EntityResource>(
    resource: &R,
    raw_id: &str,
) -> Result<R::Entity, ApiError> {
    let id = parse_id(raw_id, R::INVALID_ID_LOCATOR)?;

    resource
        .store()
        .load(id)
        .await?
        .ok_or(ApiError::InvalidId {
            locator: R::INVALID_ID_LOCATOR,
        })
}

/// Apply a text parameter.
///
/// On create the parameter is required. On update it may be omitted, but a
/// blank value is still rejected with `missing`.
pub fn apply_text(
    params: &Params,
    name: &str,
    mode: SaveMode,
    target: &mut String,
    missing: ApiError,
) -> Result<(), ApiError> {
    match params.non_empty(name) {
        Some(value) => {
            *target = value.to_string();
            Ok(())
        }
        None if mode == SaveMode::Update && !params.contains(name) => Ok(()),
        None => Err(missing),
    }
}

/// Paginated list of the resource's entities matching `filter`.
pub async fn list_entities<R: EntityResource>(
    resource: &R,
    request: &ApiRequest,
    filter: Filter,
) -> Result<ApiResponse, ApiError> {
    let store = resource.store();
    let total = store.count(&filter).await?;

    let query = ListQuery {
        filter,
        order: <R::Entity as Entity>::default_order(),
    };

    Ok(PaginatedResponse::new(
        StatusCode::OK,
        EntitySelection::new(store, query),
        request.page(),
        total,
    )
    .into())
}

/// Every entity matching `filter`, in the entity's default order.
pub async fn select_all<E: Entity>(
    store: &dyn EntityStore<E>,
    filter: Filter,
) -> Result<Vec<E>, ApiError> {
    let total = store.count(&filter).await?;
    if total == 0 {
        return Ok(Vec::new());
    }

    let query = ListQuery {
        filter,
        order: E::default_order(),
    };

    Ok(store.select(&query, total, 0).await?)
}

pub async fn view_entity<R: EntityResource>(
    resource: &R,
    raw_id: &str,
) -> Result<ApiResponse, ApiError> {
    let entity = load_entity(resource, raw_id).await?;

    Ok(ApiResponse::ok(entity.to_api_representation()))
}

/// Create an entity and answer `201 Created` with its representation.
///
/// Entities with a position column are appended after the current maximum
/// before request parameters are applied. A table whose maximum position is
/// already `i64::MAX` rejects appends with `POSITION_OVERFLOW` (400).
pub async fn create_entity<R: EntityResource>(
    resource: &R,
    request: &ApiRequest,
) -> Result<ApiResponse, ApiError> {
    let store = resource.store();
    let mut entity = resource.new_entity();

    if let Some(column) = <R::Entity as Entity>::POSITION_COLUMN {
        let next = store
            .max_value(column)
            .await?
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(ApiError::rejected(
                StatusCode::BAD_REQUEST,
                "POSITION_OVERFLOW",
                POSITION_OVERFLOW,
            ))?;
        entity.assign_position(next);
    }

    resource
        .create_or_update(&mut entity, request, SaveMode::Create)
        .await?;
    let created = store.insert(entity).await?;
    resource
        .after_save(&created, request, SaveMode::Create)
        .await?;

    Ok(ApiResponse::created(created.to_api_representation()))
}

pub async fn update_entity<R: EntityResource>(
    resource: &R,
    request: &ApiRequest,
    raw_id: &str,
) -> Result<ApiResponse, ApiError> {
    let mut entity = load_entity(resource, raw_id).await?;

    resource
        .create_or_update(&mut entity, request, SaveMode::Update)
        .await?;

    // Deleted between load and update
    if !resource.store().update(&entity).await? {
        return Err(ApiError::InvalidId {
            locator: R::INVALID_ID_LOCATOR,
        });
    }
    resource
        .after_save(&entity, request, SaveMode::Update)
        .await?;

    Ok(ApiResponse::ok(entity.to_api_representation()))
}

/// Delete an entity. Success is `200 OK` with an empty body.
///
/// The resource's `after_delete` hook runs once the row is gone.
pub async fn delete_entity<R: EntityResource>(
    resource: &R,
    raw_id: &str,
) -> Result<ApiResponse, ApiError> {
    let entity = load_entity(resource, raw_id).await?;

    if !resource.store().delete(entity.id()).await? {
        return Err(ApiError::InvalidId {
            locator: R::INVALID_ID_LOCATOR,
        });
    }
    resource.after_delete(&entity).await?;

    Ok(ApiResponse::empty(StatusCode::OK))
}
