//! Business logic services.
//!
//! Services hold the dispatcher's policy: who may call, how often, and how
//! output is localized. They depend on the storage traits only.

pub mod auth;
pub mod ban_cache;
pub mod localization;
pub mod throttle;
