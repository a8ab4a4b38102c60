//! Errors raised while loading relay settings.
//!
//! File errors carry the path so the binary can say which file was bad;
//! validation errors name the offending field in its JSON (camelCase) form.

use std::path::PathBuf;

use thiserror::Error;

/// Why the relay settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not JSON, or its values do not fit the settings schema.
    #[error("malformed settings in {}: {source}", path.display())]
    Malformed {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },

    /// A field holds a value the relay cannot run with.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted field name, e.g. `upstream.maxAttempts`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The rejected field, for validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            Self::Read { .. } | Self::Malformed { .. } => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
