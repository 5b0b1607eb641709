//! DialRust Storage - Database access for the dialer
//!
//! This crate provides the Postgres-backed stores the dialer consults:
//! campaigns, contacts, call attempts, credits and shared rate windows.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{DatabasePool, HealthCheck};
pub use models::*;
pub use repository::*;
