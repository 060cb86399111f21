//! Request middleware.

pub mod pipeline;
