//! # edugate_core
//!
//! Tenant resolution, credentials, tokens and authorization for Edugate.

pub mod access;
pub mod auth;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod tenant;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
