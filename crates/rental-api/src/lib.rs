//! Typed client for the book rental API
//!
//! Every call is built as a `transport::ApiRequest` and sent through the
//! shared `auth_pipeline::Pipeline`, so credentialed calls renew and replay
//! transparently. Signup and the health check are public.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DEFAULT_LIMIT, RentalApi};
pub use error::{ApiError, Result};
pub use types::*;
