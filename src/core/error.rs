//! Error handling for the updater
//!
//! Every failure that can reach a caller of the orchestrator is one of the
//! [`UpdateError`] variants. Transport, file-system and OS level failures are
//! translated into this taxonomy at the component boundary that observes them,
//! so callers never see a `reqwest::Error` or `std::io::Error` directly.
//!
//! Each variant has a stable numeric [`UpdateError::code`] that presentation
//! layers can show next to the message, grouped by area:
//!
//! | Range  | Area                         |
//! |--------|------------------------------|
//! | -1xxx  | version check / network      |
//! | -2xxx  | download                     |
//! | -3xxx  | install and permission       |
//! | -4xxx  | setup, configuration, storage|
//!
//! Server business errors keep the code the server sent.
//!
//! For CLI output, [`ErrorContext`] wraps an error with optional details and a
//! suggestion, and [`user_friendly_error`] converts any `anyhow::Error` into one.
//!
//! # Examples
//!
//! ```rust,no_run
//! use app_updater::core::{ErrorContext, UpdateError};
//!
//! let ctx = ErrorContext::new(UpdateError::NetworkTimeout)
//!     .with_suggestion("Check your network connection and try again");
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for every updater operation.
///
/// `DownloadCanceled` is a terminal outcome rather than a failure; it exists
/// here so that callers who prefer `Result`-shaped reporting can represent it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The check request did not complete within the configured timeout.
    #[error("Network request timed out, check your network connection")]
    NetworkTimeout,

    /// The update server could not be reached.
    #[error("Network connection failed: {reason}")]
    NetworkUnreachable {
        /// Transport-level description of the failure
        reason: String,
    },

    /// The server answered with something that is not a valid check response.
    #[error("Server response was malformed: {reason}")]
    MalformedServerResponse {
        /// What was wrong with the response
        reason: String,
    },

    /// The server answered with a non-success business code.
    ///
    /// The message is server-authored and meant to be shown verbatim.
    #[error("{message}")]
    ServerBusinessError {
        /// Business code sent by the server
        code: i32,
        /// Server-authored message
        message: String,
    },

    /// A check failed for a reason that fits no other category.
    #[error("Unknown error: {message}")]
    Unknown {
        /// Description of the failure
        message: String,
    },

    /// A download was requested while another one is still running.
    #[error("A download is already in progress")]
    DownloadAlreadyActive,

    /// The transfer mechanism reported a failure.
    #[error("Download failed: {reason}")]
    DownloadTransportFailure {
        /// Stable reason code reported by the transfer mechanism
        code: i32,
        /// Human-readable reason
        reason: String,
    },

    /// The download was canceled by the caller.
    #[error("Download was canceled")]
    DownloadCanceled,

    /// The downloaded package does not match the checksum the server advertised.
    #[error("Checksum verification failed (expected {expected}, got {actual})")]
    ChecksumMismatch {
        /// Checksum advertised by the server
        expected: String,
        /// Checksum computed from the downloaded file
        actual: String,
    },

    /// The package to install does not exist.
    #[error("Package file does not exist: {}", path.display())]
    PackageFileMissing {
        /// Path that was requested
        path: PathBuf,
    },

    /// The user declined to grant install permission.
    #[error("Install permission was not granted, cannot install")]
    InstallPermissionDenied,

    /// None of the permission settings surfaces could be opened.
    #[error("Unable to open the install permission settings")]
    PermissionSettingsUnavailable,

    /// An install is already parked waiting for permission.
    #[error("An install is already waiting for permission: {}", path.display())]
    InstallAlreadyPending {
        /// Package that is waiting
        path: PathBuf,
    },

    /// The OS installer could not be started.
    #[error("Failed to launch installer: {reason}")]
    InstallLaunchFailed {
        /// Why the launch failed
        reason: String,
    },

    /// An operation was attempted before the updater was initialized.
    #[error("Updater is not initialized, call init() first")]
    NotInitialized,

    /// The updater configuration is invalid.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with it
        message: String,
    },

    /// Durable state (the pending-install ledger, download directory) could not be accessed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the failure
        message: String,
    },
}

impl UpdateError {
    /// Stable numeric code for this error.
    ///
    /// Business errors return the code the server sent; transport failures
    /// return the reason code reported by the transfer mechanism.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::NetworkTimeout => -1001,
            Self::NetworkUnreachable {
                ..
            } => -1002,
            Self::MalformedServerResponse {
                ..
            } => -1003,
            Self::ServerBusinessError {
                code,
                ..
            } => *code,
            Self::Unknown {
                ..
            } => -1099,
            Self::DownloadAlreadyActive => -2001,
            Self::DownloadTransportFailure {
                code,
                ..
            } => *code,
            Self::DownloadCanceled => -2003,
            Self::ChecksumMismatch {
                ..
            } => -2004,
            Self::PackageFileMissing {
                ..
            } => -3001,
            Self::InstallPermissionDenied => -3002,
            Self::PermissionSettingsUnavailable => -3003,
            Self::InstallAlreadyPending {
                ..
            } => -3004,
            Self::InstallLaunchFailed {
                ..
            } => -3005,
            Self::NotInitialized => -4001,
            Self::InvalidConfig {
                ..
            } => -4002,
            Self::Storage {
                ..
            } => -4003,
        }
    }

    /// Whether this error is the cancellation outcome rather than a failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::DownloadCanceled)
    }

    pub(crate) fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// An [`UpdateError`] with optional details and a suggestion for the user.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no details or suggestion.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {} ({})", "error".red().bold(), self.error, self.error.code());

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
///
/// Walks the error chain looking for an [`UpdateError`] or [`ErrorContext`];
/// anything else becomes [`UpdateError::Unknown`] carrying the full chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(ctx) = cause.downcast_ref::<ErrorContext>() {
            return ErrorContext {
                error: ctx.error.clone(),
                suggestion: ctx.suggestion.clone(),
                details: ctx.details.clone(),
            };
        }
        if let Some(update_error) = cause.downcast_ref::<UpdateError>() {
            return create_error_context(update_error.clone());
        }
    }

    ErrorContext::new(UpdateError::Unknown {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::NetworkTimeout
        | UpdateError::NetworkUnreachable {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check your network connection and the configured base_url"),
        UpdateError::MalformedServerResponse {
            ..
        } => ErrorContext::new(error)
            .with_details("The update server did not return a valid check-update response")
            .with_suggestion("Verify that base_url points at the update service"),
        UpdateError::PackageFileMissing {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Download the update again with 'app-updater upgrade'"),
        UpdateError::InstallPermissionDenied => ErrorContext::new(error).with_suggestion(
            "Grant write access to the install directory, then run 'app-updater resume'",
        ),
        UpdateError::InstallAlreadyPending {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run 'app-updater resume' to finish or discard the pending install"),
        UpdateError::NotInitialized
        | UpdateError::InvalidConfig {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run 'app-updater config init' and set base_url and app_id"),
        UpdateError::ChecksumMismatch {
            ..
        } => ErrorContext::new(error)
            .with_details("The downloaded package was discarded")
            .with_suggestion("Retry the download; report the problem if it persists"),
        _ => ErrorContext::new(error),
    }
}
