//! # Errors
//!
//! This module defines the error types used throughout the resource layer.
//! By centralizing error definitions, every stage of the pipeline (key paths,
//! adapters, transport, decoding) reports failures the same way.
//!
//! Only two kinds of failure ever reach a caller at runtime: transport
//! failures and decoding failures. Configuration errors are raised eagerly
//! while a resource is being built. Missing optional fields are never errors.

/// Errors raised while a resource is being configured.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Key path `{0}` has unbalanced brackets")]
    UnbalancedBrackets(String),
    #[error("Key path `{0}` contains an empty segment")]
    EmptySegment(String),
    #[error("Key path `{0}` has no head key")]
    EmptyHead(String),
    #[error("Key path `{0}` has text after its last bracket")]
    TrailingInput(String),
    #[error("Server `{0}` is not configured")]
    UnknownServer(String),
    #[error("Invalid API configuration: {0}")]
    InvalidApiConfig(String),
}

/// Errors surfaced by a [`Transport`](crate::transport::Transport).
///
/// `Clone` so a failure can be held in a stream [`Snapshot`](crate::model::Snapshot)
/// and observed by every subscriber.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Server unreachable: {0}")]
    Unreachable(String),
    #[error("Transport closed")]
    Closed,
}

/// Errors returned by resource operations and carried by failed streams.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ResourceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Could not decode {resource} payload: {message}")]
    Decode { resource: String, message: String },
    #[error("Resource `{0}` is already initialized")]
    AlreadyInitialized(String),
}

/// Non-fatal: a response did not match any recognized envelope and was
/// taken as-is.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Response for {resource} matched no known envelope, using the whole payload")]
pub struct NormalizationWarning {
    pub resource: String,
}

pub type Result<T, E = ResourceError> = std::result::Result<T, E>;
