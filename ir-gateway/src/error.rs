//! Gateway error types

use std::path::PathBuf;

use thiserror::Error;

/// Why a request did not switch anything
///
/// Reported back to the caller in the page body; the status code stays 200.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Well-formed request naming a button that is not configured
    #[error("Unknown key '{0}'")]
    UnknownKey(String),

    /// Anything other than `/switch?id=<key>`
    #[error("Invalid request: '{0}'")]
    Invalid(String),
}

impl RequestError {
    /// Leading text of the status line
    pub fn label(&self) -> &'static str {
        match self {
            RequestError::UnknownKey(_) => "Unknown key",
            RequestError::Invalid(_) => "Invalid request:",
        }
    }

    /// The value echoed back to the caller
    pub fn subject(&self) -> &str {
        match self {
            RequestError::UnknownKey(key) => key,
            RequestError::Invalid(target) => target,
        }
    }
}

/// Errors reading or writing the settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not determine settings path")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
