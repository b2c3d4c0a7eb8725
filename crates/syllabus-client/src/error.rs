//! Error types for the Syllabus client.
//!
//! [`RemoteFailure`] is what every remote store call returns on failure:
//! transport, timeout, HTTP status and envelope problems all collapse into
//! it. [`SyncError`] is the error of the editing session and the config
//! loader, wrapping tree and remote failures.

use std::fmt;
use std::path::PathBuf;

use syllabus_tree::TreeError;

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Categories of remote failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend could not be reached.
    Network,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Missing or rejected bearer token (401/403).
    Unauthorized,
    /// The addressed resource does not exist (404).
    NotFound,
    /// The backend refused the request (other 4xx, or `success: false`).
    Rejected,
    /// The backend failed (5xx).
    Server,
    /// The response body did not have the expected shape.
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NotFound => write!(f, "not_found"),
            Self::Rejected => write!(f, "rejected"),
            Self::Server => write!(f, "server"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

impl FailureKind {
    /// Classifies a non-success HTTP status.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            500..=599 => Self::Server,
            _ => Self::Rejected,
        }
    }

    /// Returns a suggestion message for this failure kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Network => "Check that apiBaseUrl points at a running backend",
            Self::Timeout => "Retry, or raise timeoutSecs in syllabus.json",
            Self::Unauthorized => "Export a valid bearer token in the variable named by tokenEnv",
            Self::NotFound => "Reload the course; the item may have been deleted elsewhere",
            Self::Rejected => "Review the request; the backend refused it",
            Self::Server => "Retry later; the backend may be experiencing issues",
            Self::Decode => "Check that the backend version matches this client",
        }
    }
}

/// A failed remote call, normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Remote call failed ({kind}): {message}\n\nSuggestion: {}", .kind.suggestion())]
pub struct RemoteFailure {
    /// What went wrong.
    pub kind: FailureKind,
    /// Message from the backend or the transport.
    pub message: String,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
}

impl RemoteFailure {
    /// Creates a failure without an HTTP status.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Creates a failure from an HTTP status and backend message.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::from_status(status),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Creates a `Decode` failure.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Decode, message)
    }

    /// Returns `true` if retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::Network | FailureKind::Timeout | FailureKind::Server
        )
    }
}

/// Errors surfaced by the client crate.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your syllabus.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Sync Errors
    // ========================================================================
    /// A local tree operation or validation failed; nothing was sent.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// A remote call failed and there was nothing local to undo.
    #[error(transparent)]
    Remote(#[from] RemoteFailure),

    /// A sync failed and the container was rolled back to its last synced order.
    #[error("Sync of {container} failed; local order was restored\n\n{source}")]
    RolledBack {
        /// The container that failed to sync.
        container: String,
        /// The underlying failure.
        source: RemoteFailure,
    },

    // ========================================================================
    // Concurrency Errors
    // ========================================================================
    /// The module is being saved; edits now would be overwritten by the server's copy.
    #[error("Module '{module}' is being saved\n\nSuggestion: Wait for the save to finish, then edit again")]
    SaveInFlight {
        /// The module with a deep upsert in flight.
        module: String,
    },
}

impl SyncError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `RolledBack` error.
    #[must_use]
    pub fn rolled_back(container: impl fmt::Display, source: RemoteFailure) -> Self {
        Self::RolledBack {
            container: container.to_string(),
            source,
        }
    }

    /// The remote failure behind this error, if any.
    #[must_use]
    pub const fn remote(&self) -> Option<&RemoteFailure> {
        match self {
            Self::Remote(failure) | Self::RolledBack { source: failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Returns `true` if the error was caught locally before any request was made.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Tree(err) if err.is_validation())
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        if matches!(self, Self::SaveInFlight { .. }) {
            return true;
        }
        match self.remote() {
            Some(failure) => failure.is_transient(),
            None => false,
        }
    }
}
