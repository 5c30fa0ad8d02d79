use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire gateway
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Source node read failures
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Node unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("Node returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },
}

/// Destination chain failures raised while building or broadcasting a payout
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid address on {network}: {address}")]
    InvalidAddress { network: String, address: String },

    #[error("Broadcast failed on {network}: {message}")]
    Broadcast { network: String, message: String },
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        if error.is_decode() {
            FetchError::Malformed {
                url,
                message: error.to_string(),
            }
            .into()
        } else if let Some(status) = error.status() {
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
            .into()
        } else {
            FetchError::Unreachable {
                url,
                message: error.to_string(),
            }
            .into()
        }
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<::config::ConfigError> for AppError {
    fn from(error: ::config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the gateway
pub type AppResult<T> = Result<T, AppError>;
