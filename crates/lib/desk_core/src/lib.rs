//! # desk_core
//!
//! Core authorization and session logic for the helpdesk.

pub mod auth;
pub mod clock;
pub mod migrate;
pub mod models;
pub mod rbac;
pub mod store;
pub mod trash;
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
