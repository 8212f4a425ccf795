//! Error types and HTTP error response handling.
//!
//! Every failure in the API pipeline is an [`ApiError`]. Each variant carries
//! a machine-readable code (`INVALID_APP`), a short locator (`3S290/2`) and an
//! HTTP status. The dispatcher is the only place that turns these into the
//! `{errorCode, errorMessage}` envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Locator shared by every internal (500) error.
pub const INTERNAL_LOCATOR: &str = "1S290/0";

/// Message returned for internal errors outside development mode.
pub const REDACTED_MESSAGE: &str = "UNKNOWN_ERROR";

/// Whether a routing token was syntactically invalid or simply not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFault {
    /// Token contains characters outside `[a-z0-9]` or is missing.
    Malformed,
    /// Token is well formed but nothing is registered under it.
    Unknown,
}

/// Application-wide API error type.
///
/// # Error Categories
///
/// - **Throttling**: banned IPs and callers that keep presenting bad keys
/// - **Authentication**: missing, unknown or restricted API keys
/// - **Routing**: malformed or unknown app/controller tokens, unmapped verbs
/// - **Resource**: entity lookups and per-resource validation
/// - **Internal**: storage failures and anything unexpected
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("IP_ADDRESS_BANNED")]
    IpAddressBanned,

    #[error("TOO_MANY_REQUESTS_WITH_BAD_KEY")]
    TooManyRequestsWithBadKey,

    #[error("NO_API_KEY")]
    NoApiKey,

    #[error("INVALID_API_KEY")]
    InvalidApiKey,

    #[error("IP_ADDRESS_NOT_ALLOWED")]
    IpAddressNotAllowed,

    #[error("CANNOT_USE_KEY_AS_URL_PARAM")]
    CannotUseKeyAsUrlParam,

    #[error("NO_PERMISSION")]
    NoPermission,

    #[error("INVALID_LANGUAGE")]
    InvalidLanguage,

    #[error("INVALID_APP")]
    InvalidApp(RouteFault),

    #[error("INVALID_CONTROLLER")]
    InvalidController(RouteFault),

    #[error("APP_DISABLED")]
    AppDisabled,

    #[error("NO_ENDPOINT")]
    NoEndpoint,

    #[error("INVALID_REQUEST_BODY")]
    InvalidRequestBody,

    /// Referenced entity does not exist. The locator identifies the resource.
    #[error("INVALID_ID")]
    InvalidId { locator: &'static str },

    /// Resource-specific rejection (missing field, bad reference, duplicate).
    #[error("{code}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        locator: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Build a resource-specific rejection.
    pub fn rejected(status: StatusCode, code: &'static str, locator: &'static str) -> Self {
        ApiError::Rejected {
            status,
            code,
            locator,
        }
    }

    /// HTTP status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::IpAddressBanned => StatusCode::FORBIDDEN,
            ApiError::TooManyRequestsWithBadKey => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NoApiKey | ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::IpAddressNotAllowed
            | ApiError::CannotUseKeyAsUrlParam
            | ApiError::NoPermission => StatusCode::FORBIDDEN,
            ApiError::InvalidLanguage | ApiError::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ApiError::InvalidApp(RouteFault::Malformed)
            | ApiError::InvalidController(RouteFault::Malformed) => StatusCode::BAD_REQUEST,
            ApiError::InvalidApp(RouteFault::Unknown)
            | ApiError::InvalidController(RouteFault::Unknown) => StatusCode::NOT_FOUND,
            ApiError::AppDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NoEndpoint | ApiError::InvalidId { .. } => StatusCode::NOT_FOUND,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Storage(_) | ApiError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::IpAddressBanned => "IP_ADDRESS_BANNED",
            ApiError::TooManyRequestsWithBadKey => "TOO_MANY_REQUESTS_WITH_BAD_KEY",
            ApiError::NoApiKey => "NO_API_KEY",
            ApiError::InvalidApiKey => "INVALID_API_KEY",
            ApiError::IpAddressNotAllowed => "IP_ADDRESS_NOT_ALLOWED",
            ApiError::CannotUseKeyAsUrlParam => "CANNOT_USE_KEY_AS_URL_PARAM",
            ApiError::NoPermission => "NO_PERMISSION",
            ApiError::InvalidLanguage => "INVALID_LANGUAGE",
            ApiError::InvalidApp(_) => "INVALID_APP",
            ApiError::InvalidController(_) => "INVALID_CONTROLLER",
            ApiError::AppDisabled => "APP_DISABLED",
            ApiError::NoEndpoint => "NO_ENDPOINT",
            ApiError::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ApiError::InvalidId { .. } => "INVALID_ID",
            ApiError::Rejected { code, .. } => *code,
            ApiError::Storage(_) | ApiError::Serialization(_) => REDACTED_MESSAGE,
        }
    }

    /// Short locator identifying where the error was raised.
    pub fn locator(&self) -> &'static str {
        match self {
            ApiError::IpAddressBanned => "1S290/A",
            ApiError::TooManyRequestsWithBadKey => "1S290/C",
            ApiError::AppDisabled => "1S290/3",
            ApiError::NoApiKey => "2S290/6",
            ApiError::InvalidApiKey => "3S290/7",
            ApiError::IpAddressNotAllowed => "2S290/8",
            ApiError::CannotUseKeyAsUrlParam => "2S290/9",
            ApiError::InvalidLanguage => "2S290/B",
            ApiError::NoPermission => "2S290/D",
            ApiError::InvalidApp(RouteFault::Malformed) => "3S290/2",
            ApiError::InvalidApp(RouteFault::Unknown) => "2S290/3",
            ApiError::InvalidController(RouteFault::Malformed) => "3S290/4",
            ApiError::InvalidController(RouteFault::Unknown) => "2S290/5",
            ApiError::NoEndpoint => "3S290/E",
            ApiError::InvalidRequestBody => "3S290/F",
            ApiError::InvalidId { locator } | ApiError::Rejected { locator, .. } => *locator,
            ApiError::Storage(_) | ApiError::Serialization(_) => INTERNAL_LOCATOR,
        }
    }

    /// Errors that are our fault rather than the caller's.
    pub fn is_internal(&self) -> bool {
        self.status().is_server_error() && !matches!(self, ApiError::AppDisabled)
    }

    /// Build the client-facing envelope.
    ///
    /// Internal errors only carry their real message in development mode.
    pub fn envelope(&self, dev_mode: bool) -> ErrorEnvelope {
        let error_message = if self.is_internal() && dev_mode {
            self.to_string()
        } else {
            self.code().to_string()
        };

        ErrorEnvelope {
            error_code: self.locator().to_string(),
            error_message,
        }
    }
}

/// Error body returned by every failed API call.
///
/// ```json
/// {
///   "errorCode": "3S290/2",
///   "errorMessage": "INVALID_APP"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error_code: String,
    pub error_message: String,
}

/// Convert ApiError into an HTTP response.
///
/// Used by handlers outside the dispatcher (e.g. `/health`), which never run
/// in development mode, so internal details are always hidden here.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, "request failed with an internal error");
        }

        (self.status(), Json(self.envelope(false))).into_response()
    }
}
