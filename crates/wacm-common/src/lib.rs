//! WACM Common - Shared types and utilities
//!
//! This crate provides the configuration model, the error type and the id
//! aliases shared across all WACM components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
