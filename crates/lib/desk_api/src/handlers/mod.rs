//! Request handlers.

pub mod auth;
pub mod rbac;
pub mod sessions;
pub mod trash;
pub mod users;
