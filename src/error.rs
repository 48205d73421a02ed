// src/error.rs

//! Unified error handling for the coordinate extraction pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Retry budget exhausted against the external throttle
    #[error("rate limit exceeded after {attempts} attempts: {message}")]
    RateLimitExceeded { attempts: usize, message: String },

    /// Network/server error that persisted through the retry budget
    #[error("transient fetch failure after {attempts} attempts: {message}")]
    TransientFetch { attempts: usize, message: String },

    /// Non-retryable client error (4xx other than throttling, bad body)
    #[error("permanent fetch failure (status {status}): {message}")]
    PermanentFetch { status: u16, message: String },

    /// Document could not be parsed into a markup tree at all
    #[error("malformed document for {identifier}: {message}")]
    MalformedDocument {
        identifier: String,
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request plumbing failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input records (missing identifiers, duplicates)
    #[error("Input error: {0}")]
    Input(String),
}

impl AppError {
    /// Create a rate-limit exhaustion error.
    pub fn rate_limit_exceeded(attempts: usize, message: impl fmt::Display) -> Self {
        Self::RateLimitExceeded {
            attempts,
            message: message.to_string(),
        }
    }

    /// Create a transient fetch error.
    pub fn transient(attempts: usize, message: impl fmt::Display) -> Self {
        Self::TransientFetch {
            attempts,
            message: message.to_string(),
        }
    }

    /// Create a permanent fetch error.
    pub fn permanent(status: u16, message: impl fmt::Display) -> Self {
        Self::PermanentFetch {
            status,
            message: message.to_string(),
        }
    }

    /// Create a malformed-document error.
    pub fn malformed(identifier: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedDocument {
            identifier: identifier.into(),
            message: message.to_string(),
        }
    }

    /// Create a worker task error.
    pub fn task(message: impl fmt::Display) -> Self {
        Self::Task(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }
}
