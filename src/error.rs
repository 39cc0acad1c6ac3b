//! Error types for the local cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and its background sweeper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The repeating task is already running
    #[error("Already started")]
    AlreadyStarted,

    /// The repeating task is not running
    #[error("Not started")]
    NotStarted,

    /// No tokio runtime is available to spawn the repeating task on
    #[error("No runtime: {0}")]
    NoRuntime(String),

    /// A configuration value could not be understood
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
