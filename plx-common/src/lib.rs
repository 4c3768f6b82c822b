//! # PLX Common Library
//!
//! Shared code for the playlist engine and its tooling:
//! - Database initialization, schema and row models
//! - Configuration loading
//! - Common error type
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
