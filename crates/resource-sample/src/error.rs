use resource_stream::{ConfigurationError, ResourceError, TransportError};

/// Errors surfaced by the blog application.
#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("Backend error: {0}")]
    Backend(#[from] TransportError),
    #[error("Could not read API configuration from {path}: {message}")]
    ConfigFile { path: String, message: String },
}
