//! StructWatch Common - Shared types and configuration
//!
//! This crate provides the configuration, error type and domain enums
//! shared across all StructWatch components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
