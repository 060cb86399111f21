//! Domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! shapes in `edugate_api::models`.

pub mod auth;
pub mod tenant;
pub mod user;
