//! API key extraction and authentication.
//!
//! A key can arrive in several places. In priority order:
//! 1. `Authorization: Basic base64(key:anything)` (the username is the key)
//! 2. `Authorization: Bearer <key>`
//! 3. Any other header ending in `authorization`, as forwarded by rewriting
//!    front-ends, carrying `[Basic ]base64(key:anything)`
//! 4. A `key` request parameter

use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
    config::Config,
    error::ApiError,
    models::api_key::ApiKey,
    request::Params,
    store::KeyStore,
};

/// Reserved key string for sandbox clients, honoured only when
/// `ENABLE_TEST_KEY` is set.
pub const TEST_KEY: &str = "test";

/// Where the presented key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    BasicAuth,
    Bearer,
    ForwardedHeader,
    BodyParameter,
    UrlParameter,
}

/// A presented key and its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub raw_key: String,
    pub source: KeySource,
}

/// Decode `base64(user:pass)` and return `user`.
fn basic_username(encoded: &str) -> Option<String> {
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    let username = decoded
        .split_once(':')
        .map_or(decoded.as_str(), |(user, _)| user);

    (!username.is_empty()).then(|| username.to_string())
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let prefix = value.get(..scheme.len())?;
    prefix
        .eq_ignore_ascii_case(scheme)
        .then(|| value[scheme.len()..].trim())
}

/// Find the API key in the request, if any was presented.
pub fn extract_credentials(headers: &HeaderMap, params: &Params, query: &Params) -> Option<Credentials> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(raw_key) = strip_scheme(value, "Basic ").and_then(basic_username) {
            return Some(Credentials {
                raw_key,
                source: KeySource::BasicAuth,
            });
        }

        if let Some(token) = strip_scheme(value, "Bearer ").filter(|token| !token.is_empty()) {
            return Some(Credentials {
                raw_key: token.to_string(),
                source: KeySource::Bearer,
            });
        }
    }

    let forwarded = headers.iter().find_map(|(name, value)| {
        let name = name.as_str();
        if name == header::AUTHORIZATION.as_str() || !name.ends_with("authorization") {
            return None;
        }
        let value = value.to_str().ok()?;
        basic_username(strip_scheme(value, "Basic ").unwrap_or(value))
    });
    if let Some(raw_key) = forwarded {
        return Some(Credentials {
            raw_key,
            source: KeySource::ForwardedHeader,
        });
    }

    let raw_key = params.non_empty("key")?;
    let source = if query.get("key").map(str::trim) == Some(raw_key) {
        KeySource::UrlParameter
    } else {
        KeySource::BodyParameter
    };

    Some(Credentials {
        raw_key: raw_key.to_string(),
        source,
    })
}

/// Resolve and vet the presented key.
///
/// # Errors
///
/// - `InvalidApiKey` if the key does not resolve to an active key
/// - `IpAddressNotAllowed` if the key's allow-list excludes `ip`
/// - `CannotUseKeyAsUrlParam` if the key came from the URL and the
///   deployment does not allow it
///
/// With `ENABLE_TEST_KEY`, the `test` key skips the last two checks but must
/// still exist.
pub async fn authenticate(
    keys: &dyn KeyStore,
    config: &Config,
    credentials: &Credentials,
    ip: &str,
) -> Result<ApiKey, ApiError> {
    let key = keys
        .find_by_token(&credentials.raw_key)
        .await?
        .ok_or(ApiError::InvalidApiKey)?;

    if config.enable_test_key && credentials.raw_key == TEST_KEY {
        return Ok(key);
    }

    if !key.allows_ip(ip) {
        return Err(ApiError::IpAddressNotAllowed);
    }

    if credentials.source == KeySource::UrlParameter && !config.allow_key_as_url_param {
        return Err(ApiError::CannotUseKeyAsUrlParam);
    }

    Ok(key)
}
