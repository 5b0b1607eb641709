//! DialRust Common - Shared types and utilities
//!
//! This crate provides configuration, error types and identifiers
//! shared across all DialRust components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
