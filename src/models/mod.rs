//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

use serde_json::Value;

/// API key authentication model
pub mod api_key;
/// Audit log entries
pub mod api_log;
/// Blog entries served by `blog/entries`
pub mod blog_entry;
/// Forums served by `forums/forums`
pub mod forum;
/// Community members served by `core/members`
pub mod member;

/// Capability of producing the public API representation of an entity.
///
/// The paginated envelope only depends on this trait, never on concrete
/// entity types.
pub trait ApiSerializable {
    fn to_api_representation(&self) -> Value;
}
