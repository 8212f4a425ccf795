//! Successful controller results.

use std::fmt;

use axum::http::StatusCode;
use serde_json::Value;

use crate::{error::ApiError, pagination::PaginatedResponse};

/// Body of a successful response, before serialization.
pub enum ResponseBody {
    Json(Value),
    Paginated(PaginatedResponse),
    /// Nothing at all is written
    Empty,
}

/// What a resource controller returns to the dispatcher.
pub struct ApiResponse {
    status: StatusCode,
    body: ResponseBody,
}

impl ApiResponse {
    pub fn json(status: StatusCode, value: Value) -> Self {
        Self {
            status,
            body: ResponseBody::Json(value),
        }
    }

    pub fn ok(value: Value) -> Self {
        Self::json(StatusCode::OK, value)
    }

    pub fn created(value: Value) -> Self {
        Self::json(StatusCode::CREATED, value)
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: ResponseBody::Empty,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Produce the output payload. `None` means an empty body.
    pub async fn into_output(self) -> Result<Option<Value>, ApiError> {
        match self.body {
            ResponseBody::Json(value) => Ok(Some(value)),
            ResponseBody::Paginated(page) => {
                let envelope = page.materialize().await?;
                Ok(Some(serde_json::to_value(envelope)?))
            }
            ResponseBody::Empty => Ok(None),
        }
    }
}

// Pages are read lazily, so only the body kind is shown.
impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            ResponseBody::Json(_) => "json",
            ResponseBody::Paginated(_) => "paginated",
            ResponseBody::Empty => "empty",
        };

        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .field("body", &body)
            .finish()
    }
}

impl From<PaginatedResponse> for ApiResponse {
    fn from(page: PaginatedResponse) -> Self {
        Self {
            status: page.status(),
            body: ResponseBody::Paginated(page),
        }
    }
}
