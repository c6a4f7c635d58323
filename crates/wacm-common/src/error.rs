//! Error types for WACM

use thiserror::Error;

/// Main error type for WACM
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for WACM
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::NotFound(_) => 404,
            Error::Validation(_) => 422,
            Error::Provider(_) => 502,
            Error::Scheduler(_) => 409,
            Error::Unauthorized(_) => 401,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Database(_) => "database_error",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation_error",
            Error::Provider(_) => "provider_error",
            Error::Scheduler(_) => "scheduler_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::Internal(_) => "internal_error",
            Error::Other(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(Error::NotFound("campaign".into()).status_code(), 404);
        assert_eq!(Error::Validation("triggers".into()).status_code(), 422);
        assert_eq!(Error::Provider("graph".into()).code(), "provider_error");
        assert_eq!(
            Error::Other(anyhow::anyhow!("boom")).code(),
            "internal_error"
        );
    }
}
