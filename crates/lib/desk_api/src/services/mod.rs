//! HTTP-side helpers shared by handlers and middleware.

pub mod client;
pub mod cookies;
