//! Abuse throttling by caller IP.
//!
//! Runs before authentication. Bad-key attempts are counted from the audit
//! log:
//! - more than [`LIFETIME_BAD_KEY_LIMIT`] ever: the IP is banned
//! - more than [`WINDOW_BAD_KEY_LIMIT`] in the last
//!   [`BAD_KEY_WINDOW_MINUTES`] minutes: the request is refused with 429
//!
//! The counts are read and the ban written without a transaction, so
//! concurrent requests from one IP can slip a few attempts past the limits
//! before the ban lands. That is accepted.

use chrono::{TimeDelta, Utc};

use super::ban_cache::BanListCache;
use crate::{error::ApiError, store::AbuseLedger};

/// Lifetime bad-key attempts tolerated before an IP is banned.
pub const LIFETIME_BAD_KEY_LIMIT: i64 = 10;

/// Bad-key attempts tolerated inside the rolling window.
pub const WINDOW_BAD_KEY_LIMIT: i64 = 1;

/// Length of the rolling window.
pub const BAD_KEY_WINDOW_MINUTES: i64 = 5;

/// Reason stored with automatic bans.
pub const AUTO_BAN_REASON: &str = "Too many API requests with a bad key";

/// Refuse callers that are banned or keep presenting bad keys.
///
/// # Errors
///
/// - `IpAddressBanned` if the IP is on the ban list or has just been added to it
/// - `TooManyRequestsWithBadKey` if the recent bad-key rate is exceeded
pub async fn check_caller(
    ledger: &dyn AbuseLedger,
    bans: &BanListCache,
    ip: &str,
) -> Result<(), ApiError> {
    if bans.is_banned(ip).await? {
        return Err(ApiError::IpAddressBanned);
    }

    let lifetime = ledger.count_bad_keys(ip, None).await?;
    if lifetime > LIFETIME_BAD_KEY_LIMIT {
        tracing::warn!(ip, lifetime, "banning IP after repeated bad API keys");
        bans.ban(ip, AUTO_BAN_REASON).await?;
        return Err(ApiError::IpAddressBanned);
    }

    let since = Utc::now() - TimeDelta::minutes(BAD_KEY_WINDOW_MINUTES);
    let recent = ledger.count_bad_keys(ip, Some(since)).await?;
    if recent > WINDOW_BAD_KEY_LIMIT {
        tracing::warn!(ip, recent, "throttling IP after recent bad API keys");
        return Err(ApiError::TooManyRequestsWithBadKey);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        models::api_log::ApiLogEntry,
        store::memory::{MemoryAbuseLedger, MemoryBanStore},
    };

    fn bad_key_entry(ip: &str, at: DateTime<Utc>) -> ApiLogEntry {
        ApiLogEntry {
            endpoint: "core/members".to_string(),
            method: "GET".to_string(),
            api_key: Some("wrong".to_string()),
            ip_address: ip.to_string(),
            request_data: "{}".to_string(),
            response_code: 401,
            response_output: String::new(),
            created_at: at,
            is_bad_key: true,
        }
    }

    fn setup() -> (MemoryAbuseLedger, Arc<MemoryBanStore>, BanListCache) {
        let store = Arc::new(MemoryBanStore::new());
        let cache = BanListCache::new(store.clone(), Duration::from_secs(3600));
        (MemoryAbuseLedger::new(), store, cache)
    }

    #[tokio::test]
    async fn clean_ip_passes() {
        let (ledger, _, cache) = setup();

        assert!(check_caller(&ledger, &cache, "192.0.2.1").await.is_ok());
    }

    #[tokio::test]
    async fn lifetime_limit_bans_once() {
        let (ledger, store, cache) = setup();
        let old = Utc::now() - TimeDelta::days(2);
        for _ in 0..=LIFETIME_BAD_KEY_LIMIT {
            ledger.record(&bad_key_entry("192.0.2.2", old)).await.unwrap();
        }

        let first = check_caller(&ledger, &cache, "192.0.2.2").await.unwrap_err();
        let second = check_caller(&ledger, &cache, "192.0.2.2").await.unwrap_err();

        assert!(matches!(first, ApiError::IpAddressBanned));
        assert!(matches!(second, ApiError::IpAddressBanned));
        assert_eq!(store.bans().await.len(), 1);
        assert_eq!(store.bans().await[0].reason, AUTO_BAN_REASON);
    }

    #[tokio::test]
    async fn lifetime_limit_itself_is_tolerated() {
        let (ledger, store, cache) = setup();
        let old = Utc::now() - TimeDelta::days(2);
        for _ in 0..LIFETIME_BAD_KEY_LIMIT {
            ledger.record(&bad_key_entry("192.0.2.3", old)).await.unwrap();
        }

        assert!(check_caller(&ledger, &cache, "192.0.2.3").await.is_ok());
        assert!(store.bans().await.is_empty());
    }

    #[tokio::test]
    async fn recent_bad_keys_are_throttled() {
        let (ledger, _, cache) = setup();
        let recent = Utc::now() - TimeDelta::minutes(1);
        ledger.record(&bad_key_entry("192.0.2.4", recent)).await.unwrap();
        assert!(check_caller(&ledger, &cache, "192.0.2.4").await.is_ok());

        ledger.record(&bad_key_entry("192.0.2.4", recent)).await.unwrap();
        let err = check_caller(&ledger, &cache, "192.0.2.4").await.unwrap_err();

        assert!(matches!(err, ApiError::TooManyRequestsWithBadKey));
    }

    #[tokio::test]
    async fn window_expires() {
        let (ledger, _, cache) = setup();
        let stale = Utc::now() - TimeDelta::minutes(BAD_KEY_WINDOW_MINUTES + 1);
        ledger.record(&bad_key_entry("192.0.2.5", stale)).await.unwrap();
        ledger.record(&bad_key_entry("192.0.2.5", stale)).await.unwrap();

        assert!(check_caller(&ledger, &cache, "192.0.2.5").await.is_ok());
    }

    #[tokio::test]
    async fn other_ips_are_unaffected() {
        let (ledger, _, cache) = setup();
        let recent = Utc::now();
        ledger.record(&bad_key_entry("192.0.2.6", recent)).await.unwrap();
        ledger.record(&bad_key_entry("192.0.2.6", recent)).await.unwrap();

        assert!(check_caller(&ledger, &cache, "192.0.2.7").await.is_ok());
    }
}
