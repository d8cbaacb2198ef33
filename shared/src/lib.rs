//! Shared types for the storefront workspace
//!
//! Error system, domain models and small utilities used by the server and its
//! tests.

pub mod error;
pub mod models;
pub mod money;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
