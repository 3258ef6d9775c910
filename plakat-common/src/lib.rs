//! # Plakat Common Library
//!
//! Shared code for the plakat poster extraction pipeline:
//! - Canonical event record and its schema validation
//! - Common error types

pub mod error;
pub mod models;

pub use error::{Error, Result};
