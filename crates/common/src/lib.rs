//! Shared types for the book rental client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
