//! service-core: shared infrastructure for SyndiCare services.

pub mod auth;
pub mod error;
pub mod observability;
pub mod response;

pub use anyhow;
pub use axum;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
