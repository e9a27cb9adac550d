//! Shared types for the dig-inv services

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
