//! Error handling module for TrimCut

use thiserror::Error;

/// Main error type for TrimCut operations
#[derive(Error, Debug)]
pub enum TrimError {
    /// External tool missing or could not be launched
    #[error("{tool} is unavailable: {message}")]
    ProbeUnavailable { tool: String, message: String },

    /// No usable data could be recovered from tool output
    #[error("Failed to parse probe output: {message}")]
    Parse { message: String },

    /// Malformed or out-of-range selection
    #[error("Invalid selection: {message}")]
    InvalidSelection { message: String },

    /// Another export is already active for the same media handle
    #[error("An export is already running for {path}")]
    Busy { path: String },

    /// External tool failure or I/O failure while exporting
    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    /// Export was cancelled before it completed
    #[error("Export was cancelled")]
    Cancelled,

    /// Configuration file or value error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrimError {
    pub fn parse(message: impl Into<String>) -> Self {
        TrimError::Parse {
            message: message.into(),
        }
    }

    pub fn invalid_selection(message: impl Into<String>) -> Self {
        TrimError::InvalidSelection {
            message: message.into(),
        }
    }

    pub fn export_failed(message: impl Into<String>) -> Self {
        TrimError::ExportFailed {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        TrimError::Config {
            message: message.into(),
        }
    }

    /// True for the terminal outcome of a cancelled export
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrimError::Cancelled)
    }
}

/// Result type alias for TrimCut operations
pub type TrimResult<T> = std::result::Result<T, TrimError>;
