//! Output language negotiation and the localization hook.
//!
//! Clients pick a language with the `X-Language` header. The serialized
//! response is handed to a [`Localizer`] before it is sent.

use axum::http::HeaderMap;

use crate::error::ApiError;

pub const LANGUAGE_HEADER: &str = "x-language";

/// Validate the requested language against the supported list.
///
/// Returns the canonical (configured) spelling, or `None` when the client
/// did not ask for one.
pub fn negotiate_language(
    headers: &HeaderMap,
    supported: &[String],
) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(LANGUAGE_HEADER) else {
        return Ok(None);
    };

    let requested = value
        .to_str()
        .map_err(|_| ApiError::InvalidLanguage)?
        .trim();

    supported
        .iter()
        .find(|language| language.trim().eq_ignore_ascii_case(requested))
        .map(|language| Some(language.trim().to_string()))
        .ok_or(ApiError::InvalidLanguage)
}

/// Post-processes serialized output for a language.
pub trait Localizer: Send + Sync {
    fn localize(&self, output: String, language: Option<&str>) -> String;
}

/// Leaves output untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl Localizer for PassThrough {
    fn localize(&self, output: String, _language: Option<&str>) -> String {
        output
    }
}
