//! Error types for coldreach.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Storage-related errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Provider transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Token refresh failed for {provider}: {reason}")]
    RefreshFailed { provider: String, reason: String },

    #[error("Send failed via {provider}: {reason}")]
    SendFailed { provider: String, reason: String },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
