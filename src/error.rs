//! Error types for worker-guard operations.
//!
//! Defines error types for each subsystem:
//! - Startup guard violations (always fatal)
//! - Configuration loading and validation
//! - Version registration against the backing store

use thiserror::Error;

/// Conditions under which the startup guard terminates the process.
///
/// These never travel up to a caller: [`crate::guard::enforce`] turns them
/// into a diagnostic on stderr followed by a non-zero exit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("production worker launched through an interpreter or source runner")]
    InterpreterInvocationInProduction,

    #[error("production worker has no recorded build identity (git SHA is \"unknown\")")]
    UnknownVersionInProduction,

    #[error("version mismatch: expected {expected}, running {actual}")]
    VersionMismatch { expected: String, actual: String },
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while reading or writing version registrations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed version record at '{key}': {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("Registration timed out after {0:?}")]
    Timeout(std::time::Duration),
}
