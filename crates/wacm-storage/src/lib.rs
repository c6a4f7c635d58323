//! WACM Storage - Domain models and persistence
//!
//! This crate provides the campaign, contact, template, message, bot rule
//! and settings models together with the `Store` contract and its in-memory
//! and PostgreSQL implementations.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
