//! Inbound API request parsing.
//!
//! Collects everything the dispatcher needs from an HTTP request: verb, API
//! path, headers, caller IP and the parameter bag built from the body and the
//! query string.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method, header},
};
use serde::Serialize;
use serde_json::Value;

use crate::{config::Config, error::ApiError, routing::split_api_path};

/// Largest request body accepted by the dispatcher.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Reported when the caller address is unknown.
const UNKNOWN_IP: &str = "0.0.0.0";

/// Request parameters by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1&b=2`.
    pub fn from_urlencoded(input: &[u8]) -> Self {
        url::form_urlencoded::parse(input).into_owned().collect()
    }

    /// Flatten a JSON object body. Scalars are stringified, nested values
    /// are kept as their JSON text.
    pub fn from_json_object(value: Value) -> Result<Self, ApiError> {
        let Value::Object(object) = value else {
            return Err(ApiError::InvalidRequestBody);
        };

        Ok(object
            .into_iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(s) => s,
                    Value::Bool(b) => (if b { "1" } else { "0" }).to_string(),
                    other => other.to_string(),
                };
                Some((name, text))
            })
            .collect())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Value with surrounding whitespace removed, `None` when blank.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|value| value.trim().parse().ok())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)?.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Add each parameter that is not already present. Explicit values win.
    pub fn merge_missing(&mut self, other: &Params) {
        for (name, value) in &other.0 {
            self.0
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything the dispatcher reads from an HTTP request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,

    /// API path without the `/api/` prefix, e.g. `blog/entries/4`
    pub endpoint: String,

    pub headers: HeaderMap,

    /// Body parameters merged with query-string parameters
    pub params: Params,

    /// Parameters that arrived in the URL
    pub query: Params,

    pub ip: String,
}

impl InboundRequest {
    /// Read and parse an axum request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequestBody` if the body is too large or is neither a
    /// JSON object nor form-urlencoded data.
    pub async fn read(request: Request, config: &Config) -> Result<Self, ApiError> {
        let (parts, body) = request.into_parts();

        let connect_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let ip = client_ip(&parts.headers, connect_ip, config.trust_proxy_headers);

        let (endpoint, query_string) =
            split_api_path(parts.uri.path(), parts.uri.query(), config.friendly_urls);
        let query = Params::from_urlencoded(query_string.as_bytes());

        let bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|_| ApiError::InvalidRequestBody)?;
        let mut params = body_params(&parts.headers, &bytes)?;
        params.merge_missing(&query);

        Ok(Self {
            method: parts.method,
            endpoint,
            headers: parts.headers,
            params,
            query,
            ip,
        })
    }
}

fn body_params(headers: &HeaderMap, bytes: &[u8]) -> Result<Params, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Params::new());
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("json"));

    if is_json {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|_| ApiError::InvalidRequestBody)?;
        return Params::from_json_object(value);
    }

    Ok(Params::from_urlencoded(bytes))
}

/// Determine the caller address.
///
/// `X-Forwarded-For` is only honoured when the deployment says a trusted
/// proxy sits in front of the service.
pub fn client_ip(headers: &HeaderMap, connect_ip: Option<String>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    connect_ip.unwrap_or_else(|| UNKNOWN_IP.to_string())
}
