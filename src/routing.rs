//! Route resolution for the API dispatcher.
//!
//! A request names its target as `{app}/{controller}[/{segment}...]`, either
//! in the URL path after `/api/` (friendly URLs) or at the start of the query
//! string (`/api/?/blog/entries&page=2`). The app and controller tokens are
//! checked against `[a-z0-9]+` before anything is looked up. Segments after
//! them are percent-decoded.

use axum::http::Method;
use percent_encoding::percent_decode_str;

use crate::error::{ApiError, RouteFault};

/// Marker that precedes the API path in friendly-URL mode.
const API_MARKER: &str = "/api/";

/// Split a request URI into the API path and the query string that still
/// has to be parsed into parameters.
///
/// In friendly-URL mode the API path follows `/api/` and the whole query
/// string holds parameters. Otherwise the API path is the query string up to
/// the first `&`, and the rest holds parameters.
pub fn split_api_path(path: &str, query: Option<&str>, friendly_urls: bool) -> (String, String) {
    let query = query.unwrap_or("");

    if friendly_urls {
        let endpoint = path
            .find(API_MARKER)
            .map(|start| &path[start + API_MARKER.len()..])
            .unwrap_or("");
        return (endpoint.trim_matches('/').to_string(), query.to_string());
    }

    let (head, rest) = query.split_once('&').unwrap_or((query, ""));

    // `?key=abc` carries no path at all
    if head.contains('=') {
        return (String::new(), query.to_string());
    }

    (head.trim_matches('/').to_string(), rest.to_string())
}

/// Whether `token` is a valid app or controller token.
pub fn is_route_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// A parsed API route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Lower-cased application token
    pub app: String,

    /// Lower-cased resource controller token
    pub controller: String,

    /// Remaining path segments (entity id, nested action name)
    pub segments: Vec<String>,

    pub verb: Method,
}

impl Route {
    /// Parse an API path such as `blog/entries/4`.
    ///
    /// # Errors
    ///
    /// - `InvalidApp` (400) if the first segment is missing or not alphanumeric
    /// - `InvalidController` (400) if the second segment is missing or not alphanumeric
    pub fn parse(endpoint: &str, verb: Method) -> Result<Self, ApiError> {
        let mut parts = endpoint.split('/').filter(|segment| !segment.is_empty());

        let app = parts
            .next()
            .map(str::to_ascii_lowercase)
            .filter(|token| is_route_token(token))
            .ok_or(ApiError::InvalidApp(RouteFault::Malformed))?;

        let controller = parts
            .next()
            .map(str::to_ascii_lowercase)
            .filter(|token| is_route_token(token))
            .ok_or(ApiError::InvalidController(RouteFault::Malformed))?;

        Ok(Self {
            app,
            controller,
            segments: parts
                .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
                .collect(),
            verb,
        })
    }
}
