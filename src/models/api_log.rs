//! Audit log entries written by the dispatcher.
//!
//! One row per logged request. Rows are never updated; the throttle reads
//! them back to count bad-key attempts per IP address.

use chrono::{DateTime, Utc};

/// A request as recorded in the `api_logs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiLogEntry {
    /// API path after `/api/`, e.g. `blog/entries/4`
    pub endpoint: String,

    pub method: String,

    /// Key string exactly as presented, if any
    pub api_key: Option<String>,

    pub ip_address: String,

    /// Request parameters serialized as JSON
    pub request_data: String,

    pub response_code: i32,

    /// Response body exactly as sent
    pub response_output: String,

    pub created_at: DateTime<Utc>,

    /// Set when the presented key did not resolve. Feeds the throttle.
    pub is_bad_key: bool,
}
