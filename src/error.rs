//! Error types for Lead Assist.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Model error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with key {key}")]
    NotFound { entity: String, key: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messaging-gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway send to {number} failed: {reason}")]
    SendFailed { number: String, reason: String },

    #[error("Gateway returned status {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Companion-app (FAQ backend) errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Backend returned status {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Language-model provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model not configured")]
    Disabled,

    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
