//! API Key model for authentication.
//!
//! API keys identify callers of the API. They are stored in the database as SHA-256 hashes for security,
//! together with optional IP and application restrictions.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `key_hash`: SHA-256 hash of the actual API key
/// - `description`: Administrator note about who holds the key
/// - `is_active`: Whether the key is currently valid
/// - `allowed_ips`: Addresses or CIDR networks the key may be used from
/// - `allowed_apps`: Application tokens the key may reach
/// - `created_at`: When the key was created
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    pub description: String,

    /// Inactive keys are rejected during authentication. This provides a way to revoke access without deleting the record.
    pub is_active: bool,

    /// Empty means the key may be used from anywhere.
    pub allowed_ips: Vec<String>,

    /// Empty means the key may reach every application.
    pub allowed_apps: Vec<String>,

    pub created_at: DateTime<Utc>,
}

/// Hash a raw key the way it is stored in `api_keys.key_hash`.
pub fn hash_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());

    hex::encode(hasher.finalize())
}

impl ApiKey {
    /// Build an active, unrestricted key record for the given raw token.
    pub fn issue(raw_key: &str, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key_hash: hash_key(raw_key),
            description: description.into(),
            is_active: true,
            allowed_ips: Vec::new(),
            allowed_apps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_allowed_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_apps<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_apps = apps.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a request from `ip` may use this key.
    ///
    /// Entries are single addresses or CIDR networks. A caller address that
    /// does not parse never matches a non-empty allow-list.
    pub fn allows_ip(&self, ip: &str) -> bool {
        if self.allowed_ips.is_empty() {
            return true;
        }

        let Ok(caller) = ip.trim().parse::<IpAddr>() else {
            return false;
        };

        self.allowed_ips.iter().any(|entry| {
            let entry = entry.trim();
            match entry.parse::<IpNet>() {
                Ok(network) => network.contains(&caller),
                Err(_) => entry.parse::<IpAddr>().is_ok_and(|addr| addr == caller),
            }
        })
    }

    pub fn allows_app(&self, app: &str) -> bool {
        self.allowed_apps.is_empty()
            || self
                .allowed_apps
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(app))
    }
}
