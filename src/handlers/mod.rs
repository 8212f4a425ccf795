//! HTTP request handlers (route handlers).
//!
//! The API surface is a single dispatcher; everything under `/api` goes
//! through [`dispatch::dispatch`].

/// The `/api` dispatcher
pub mod dispatch;
/// Service health probe
pub mod health;
