//! # nfc-id
//!
//! Typed identifiers for records owned by a remote cluster.
//!
//! ## Design Principles
//!
//! - IDs are assigned by the cluster; names are user-controlled labels
//! - An ID is never minted locally, only parsed from a remote response
//! - IDs are typed to prevent mixing different resource types
//! - IDs are interpolated into request paths, so they must be path-safe
//!
//! ## ID Format
//!
//! The cluster hands out opaque strings (UUIDs in practice). This crate
//! does not assume a particular shape beyond:
//!
//! - non-empty
//! - no whitespace
//! - none of `/`, `?`, `#`, `%`
//!
//! Examples:
//! - `3f2c1a9e-0174-1000-8a3b-5c4d1e2f3a4b`
//! - `root-group`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Validates the raw string form shared by every ID type.
pub fn validate(raw: &str) -> Result<(), IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }

    if let Some(c) = raw
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
    {
        return Err(IdError::InvalidCharacter(c));
    }

    Ok(())
}
