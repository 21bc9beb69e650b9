//! Unified error handling for perfboost
//!
//! One error type shared by the core engine, the protocol crate, the daemon and the client.

use std::io;
use std::path::PathBuf;

/// Result type alias using BoostError
pub type Result<T> = std::result::Result<T, BoostError>;

/// Unified error type for all perfboost operations
#[derive(thiserror::Error, Debug)]
pub enum BoostError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write {value:?} to {path}: {source}")]
    FileWrite {
        path: PathBuf,
        value: String,
        source: io::Error,
    },

    #[error("Control node not present: {0}")]
    NodeMissing(PathBuf),

    // ============================================================================
    // Arbitration Errors
    // ============================================================================
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Scene {scene:?} has no config in subsystem {subsystem}")]
    UnknownScene {
        subsystem: String,
        scene: String,
    },

    #[error("Invalid value selector: {0}")]
    InvalidSelector(String),

    #[error("Frequency table {path} unavailable: {reason}")]
    FreqTableUnavailable {
        path: PathBuf,
        reason: String,
    },

    #[error("Boost engine is disabled")]
    EngineDisabled,

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    #[error("Daemon not available")]
    DaemonNotAvailable,

    #[error("Daemon connection failed: {0}")]
    DaemonConnection(String),

    #[error("Daemon request failed: {0}")]
    DaemonRequest(String),

    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl BoostError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a daemon error from a string
    pub fn daemon(msg: impl Into<String>) -> Self {
        Self::DaemonRequest(msg.into())
    }

    /// True for failures caused by the hardware node rather than by the request itself
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::FileRead { .. } | Self::FileWrite { .. } | Self::NodeMissing(_)
        )
    }
}

impl From<String> for BoostError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for BoostError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
