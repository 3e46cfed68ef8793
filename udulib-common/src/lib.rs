//! # UDULib Common Library
//!
//! Shared code for the UDULib document library service:
//! - Configuration loading (TOML file, environment, CLI overrides)
//! - Domain enums and database row models
//! - SQLite schema creation and administrator bootstrap
//! - Password hashing and bearer token issuance

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod security;

pub use error::{Error, Result};
