//! Error types for TV Player Core

use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Construction errors
    #[error("Partner id is required for {backend} players")]
    MissingPartnerId { backend: String },

    #[error("Server URL is required for {backend} players")]
    MissingServerUrl { backend: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Backend errors
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("UI configuration {id} could not be loaded: {reason}")]
    UiConfLoad { id: i64, reason: String },

    // Usage errors
    #[error("{options} media options are not supported by {backend} players")]
    UnsupportedMediaOptions { backend: String, options: String },

    #[error("Invalid plugin configuration for {plugin}: {reason}")]
    InvalidPluginConfig { plugin: String, reason: String },

    #[error("Media load superseded by a newer request")]
    Superseded,

    #[error("No async runtime available to run media loads")]
    Runtime,

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an API error
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Error::InvalidResponse(msg.into())
    }

    /// Returns true if retrying the same call may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::UiConfLoad { .. } | Error::Superseded)
    }

    /// Returns the error code reported to listeners and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MissingPartnerId { .. } => "MISSING_PARTNER_ID",
            Error::MissingServerUrl { .. } => "MISSING_SERVER_URL",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Api { .. } => "API",
            Error::InvalidResponse(_) => "INVALID_RESPONSE",
            Error::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Error::UiConfLoad { .. } => "UICONF_LOAD",
            Error::UnsupportedMediaOptions { .. } => "UNSUPPORTED_MEDIA_OPTIONS",
            Error::InvalidPluginConfig { .. } => "INVALID_PLUGIN_CONFIG",
            Error::Superseded => "SUPERSEDED",
            Error::Runtime => "RUNTIME",
            Error::Network(_) => "NETWORK",
            Error::Json(_) => "JSON",
            Error::Internal(_) => "INTERNAL",
        }
    }
}
