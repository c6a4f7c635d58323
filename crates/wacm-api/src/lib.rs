//! WACM API - REST API server
//!
//! This crate provides the REST API for WACM, covering campaigns, bot
//! rules, contacts, templates, messages, settings and the WhatsApp webhook.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
