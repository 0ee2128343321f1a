//! Error handling for vendup
//!
//! Every failure the update engine can report is a variant of [`UpdaterError`].
//! The variants mirror the phases of an update so that callers can tell, from
//! the error alone, whether the vendored tree was touched:
//!
//! - **Per-package setup**: [`UpdaterError::MetadataError`],
//!   [`UpdaterError::NoSupportedUpstream`], [`UpdaterError::ConfigError`]
//! - **Resolution**: [`UpdaterError::VersionParseError`],
//!   [`UpdaterError::UpstreamUnreachable`], [`UpdaterError::OverrideRejected`]
//! - **Pre-swap pipeline** (old tree guaranteed intact):
//!   [`UpdaterError::FetchFailure`], [`UpdaterError::PatchApplyFailure`],
//!   [`UpdaterError::RegenerationFailure`], [`UpdaterError::PostHookFailure`],
//!   [`UpdaterError::ProcessTimeout`], [`UpdaterError::UpdateInProgress`]
//! - **Swap**: [`UpdaterError::SwapFailure`], the only variant after which
//!   manual recovery may be needed
//!
//! "No update available" is not an error; it is a regular planner outcome.
//!
//! Use [`user_friendly_error`] to turn any [`anyhow::Error`] into an
//! [`ErrorContext`] carrying a colored message, details and a suggestion.
//!
//! ```rust,no_run
//! use vendup::core::{UpdaterError, user_friendly_error};
//!
//! let err = UpdaterError::GitNotFound;
//! user_friendly_error(anyhow::Error::from(err)).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for vendup operations.
///
/// Variants carry plain strings rather than paths or nested errors so that
/// they can be cloned into per-package reports and rendered in JSON output.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// The metadata record is missing, unreadable or fails validation.
    ///
    /// Fatal for the affected package only.
    #[error("Invalid metadata in {path}: {reason}")]
    MetadataError {
        /// Path of the metadata file
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// No URL entry in the metadata has a kind the engine can update from.
    #[error("No supported upstream URL in {path}")]
    NoSupportedUpstream {
        /// Path of the metadata file
        path: String,
    },

    /// A version string is malformed, or two versions cannot be ordered.
    ///
    /// The engine never guesses an ordering for ambiguous versions.
    #[error("Cannot interpret version '{version}': {reason}")]
    VersionParseError {
        /// The offending version text
        version: String,
        /// Why it was rejected
        reason: String,
    },

    /// The upstream could not be reached after the bounded retries.
    #[error("Upstream {upstream} is unreachable: {reason}")]
    UpstreamUnreachable {
        /// Upstream address
        upstream: String,
        /// Underlying network or timeout failure
        reason: String,
    },

    /// Downloading, verifying or unpacking the new content failed.
    #[error("Failed to fetch {location}: {reason}")]
    FetchFailure {
        /// URL or repository that was fetched
        location: String,
        /// What went wrong
        reason: String,
    },

    /// A local patch does not apply to the new upstream content.
    #[error("Patch {patch} failed to apply: {stderr}")]
    PatchApplyFailure {
        /// Patch file name
        patch: String,
        /// Output of the patch tool
        stderr: String,
    },

    /// The build-descriptor regeneration collaborator failed.
    #[error("Descriptor regeneration with '{command}' failed: {reason}")]
    RegenerationFailure {
        /// Command that was run
        command: String,
        /// Exit status and output
        reason: String,
    },

    /// The post-update hook exited unsuccessfully.
    #[error("Post-update hook {hook} failed: {reason}")]
    PostHookFailure {
        /// Hook path
        hook: String,
        /// Exit status and output
        reason: String,
    },

    /// The remove-and-move step failed and could not be rolled back.
    ///
    /// This is the only error after which the package directory may be in an
    /// unexpected state. The paths tell the operator where both trees are.
    #[error(
        "Swap of {package} failed and could not be rolled back: {reason} \
         (previous tree: {retired}, new tree: {staged})"
    )]
    SwapFailure {
        /// Package directory
        package: String,
        /// Where the previous tree was parked
        retired: String,
        /// Where the new tree was built
        staged: String,
        /// Underlying filesystem error
        reason: String,
    },

    /// Another run is already updating this package.
    #[error("Package {package} is already being updated (found {staging})")]
    UpdateInProgress {
        /// Package directory
        package: String,
        /// The staging directory acting as the exclusion token
        staging: String,
    },

    /// The requested target version was refused.
    #[error("Cannot update to '{requested}' (recorded '{recorded}'): {reason}")]
    OverrideRejected {
        /// Version the caller asked for
        requested: String,
        /// Version in the metadata record
        recorded: String,
        /// Why it was refused
        reason: String,
    },

    /// An external process exceeded its time budget.
    #[error("'{command}' timed out after {seconds}s")]
    ProcessTimeout {
        /// Command that was run
        command: String,
        /// Time budget in seconds
        seconds: u64,
    },

    /// A git command exited unsuccessfully.
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation (e.g. "fetch", "ls-remote")
        operation: String,
        /// Standard error of the git process
        stderr: String,
    },

    /// No usable `git` executable was found on PATH.
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// The updater configuration file is invalid.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// What is wrong with the configuration
        message: String,
    },

    /// Raw I/O failure.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl UpdaterError {
    /// Whether the failure is transient and worth retrying with backoff.
    ///
    /// Only network-level unreachability qualifies; everything else is
    /// deterministic and would fail the same way again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnreachable { .. })
    }

    /// Whether the package directory may need manual repair.
    #[must_use]
    pub const fn requires_manual_recovery(&self) -> bool {
        matches!(self, Self::SwapFailure { .. })
    }

    /// Short machine-readable name of the variant, used in JSON reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MetadataError { .. } => "MetadataError",
            Self::NoSupportedUpstream { .. } => "NoSupportedUpstream",
            Self::VersionParseError { .. } => "VersionParseError",
            Self::UpstreamUnreachable { .. } => "UpstreamUnreachable",
            Self::FetchFailure { .. } => "FetchFailure",
            Self::PatchApplyFailure { .. } => "PatchApplyFailure",
            Self::RegenerationFailure { .. } => "RegenerationFailure",
            Self::PostHookFailure { .. } => "PostHookFailure",
            Self::SwapFailure { .. } => "SwapFailure",
            Self::UpdateInProgress { .. } => "UpdateInProgress",
            Self::OverrideRejected { .. } => "OverrideRejected",
            Self::ProcessTimeout { .. } => "ProcessTimeout",
            Self::GitCommandError { .. } => "GitCommandError",
            Self::GitNotFound => "GitNotFound",
            Self::ConfigError { .. } => "ConfigError",
            Self::IoError(_) => "IoError",
            Self::Other { .. } => "Other",
        }
    }
}

impl Clone for UpdaterError {
    fn clone(&self) -> Self {
        match self {
            Self::MetadataError {
                path,
                reason,
            } => Self::MetadataError {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::NoSupportedUpstream {
                path,
            } => Self::NoSupportedUpstream {
                path: path.clone(),
            },
            Self::VersionParseError {
                version,
                reason,
            } => Self::VersionParseError {
                version: version.clone(),
                reason: reason.clone(),
            },
            Self::UpstreamUnreachable {
                upstream,
                reason,
            } => Self::UpstreamUnreachable {
                upstream: upstream.clone(),
                reason: reason.clone(),
            },
            Self::FetchFailure {
                location,
                reason,
            } => Self::FetchFailure {
                location: location.clone(),
                reason: reason.clone(),
            },
            Self::PatchApplyFailure {
                patch,
                stderr,
            } => Self::PatchApplyFailure {
                patch: patch.clone(),
                stderr: stderr.clone(),
            },
            Self::RegenerationFailure {
                command,
                reason,
            } => Self::RegenerationFailure {
                command: command.clone(),
                reason: reason.clone(),
            },
            Self::PostHookFailure {
                hook,
                reason,
            } => Self::PostHookFailure {
                hook: hook.clone(),
                reason: reason.clone(),
            },
            Self::SwapFailure {
                package,
                retired,
                staged,
                reason,
            } => Self::SwapFailure {
                package: package.clone(),
                retired: retired.clone(),
                staged: staged.clone(),
                reason: reason.clone(),
            },
            Self::UpdateInProgress {
                package,
                staging,
            } => Self::UpdateInProgress {
                package: package.clone(),
                staging: staging.clone(),
            },
            Self::OverrideRejected {
                requested,
                recorded,
                reason,
            } => Self::OverrideRejected {
                requested: requested.clone(),
                recorded: recorded.clone(),
                reason: reason.clone(),
            },
            Self::ProcessTimeout {
                command,
                seconds,
            } => Self::ProcessTimeout {
                command: command.clone(),
                seconds: *seconds,
            },
            Self::GitCommandError {
                operation,
                stderr,
            } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::GitNotFound => Self::GitNotFound,
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // io::Error is not Clone; keep its rendered form
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error wrapper carrying user-facing details and a suggested fix.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdaterError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wraps an error without any extra context.
    #[must_use]
    pub const fn new(error: UpdaterError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Adds a suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Adds details explaining the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr with terminal colors.
    ///
    /// A [`UpdaterError::SwapFailure`] gets a separate banner so that it cannot
    /// be mistaken for one of the failures that leave the tree untouched.
    pub fn display(&self) {
        if self.error.requires_manual_recovery() {
            eprintln!(
                "{}",
                "!!! MANUAL RECOVERY REQUIRED: the package directory may be incomplete !!!"
                    .on_red()
                    .white()
                    .bold()
            );
        }

        eprintln!("{}: {}", "error".red().bold(), self.error);

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

/// Finds the [`UpdaterError`] behind an [`anyhow::Error`].
///
/// Errors without one are folded into [`UpdaterError::Other`] carrying the
/// whole context chain.
#[must_use]
pub fn classify(error: &anyhow::Error) -> UpdaterError {
    error.chain().find_map(|e| e.downcast_ref::<UpdaterError>()).cloned().unwrap_or_else(|| {
        UpdaterError::Other {
            message: format!("{error:#}"),
        }
    })
}

/// Converts any error into an [`ErrorContext`] suitable for the terminal.
///
/// [`UpdaterError`] values anywhere in the chain get tailored suggestions;
/// I/O and TOML errors are mapped to the closest variant; everything else is
/// rendered with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(updater_error) = error.chain().find_map(|e| e.downcast_ref::<UpdaterError>()) {
        let mut ctx = create_error_context(updater_error.clone());
        let outer = error.to_string();
        if outer != updater_error.to_string() && ctx.details.is_none() {
            ctx.details = Some(outer);
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(UpdaterError::Other {
                    message: format!("Permission denied: {io_error}"),
                })
                .with_suggestion("Check ownership and permissions of the package directory and its parent");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(UpdaterError::Other {
                    message: format!("Not found: {io_error}"),
                })
                .with_suggestion("Check that the package path exists and is spelled correctly");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdaterError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax. Verify quotes, brackets and table headers");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdaterError::Other {
        message,
    })
}

fn create_error_context(error: UpdaterError) -> ErrorContext {
    match &error {
        UpdaterError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git from https://git-scm.com/ or your package manager (e.g., 'apt install git')")
            .with_details("vendup uses git to query commit-tracked upstreams and to apply local patches"),

        UpdaterError::GitCommandError {
            operation,
            stderr,
        } => {
            let suggestion = match operation.as_str() {
                op if op.contains("ls-remote") || op.contains("fetch") || op.contains("clone") => {
                    "Check the upstream URL in METADATA.toml and your network access to it"
                }
                op if op.contains("apply") => {
                    "Refresh the patch against the new upstream content and retry"
                }
                _ => "Try running the git command manually for more details",
            };
            let details = if stderr.is_empty() {
                None
            } else {
                Some(stderr.trim().to_string())
            };
            let ctx = ErrorContext::new(error.clone()).with_suggestion(suggestion);
            match details {
                Some(d) => ctx.with_details(d),
                None => ctx,
            }
        }

        UpdaterError::MetadataError { .. } => ErrorContext::new(error)
            .with_suggestion("Fix METADATA.toml: it needs a [third_party] table with a version and at least one url entry"),

        UpdaterError::NoSupportedUpstream { .. } => ErrorContext::new(error)
            .with_suggestion("Add a [[third_party.url]] entry of type GIT, or an ARCHIVE entry pointing at a GitHub release")
            .with_details("Only the first URL entry of a supported kind is used"),

        UpdaterError::VersionParseError { .. } => ErrorContext::new(error)
            .with_suggestion("Pass an explicit target with --version, or fix the recorded version in METADATA.toml")
            .with_details("Versions are only compared when their prefix and suffix match"),

        UpdaterError::UpstreamUnreachable { .. } => ErrorContext::new(error)
            .with_suggestion("Check your network connection. For GitHub rate limits, set GITHUB_TOKEN")
            .with_details("The request was retried with exponential backoff before giving up"),

        UpdaterError::FetchFailure { .. } => ErrorContext::new(error)
            .with_suggestion("Verify the upstream still publishes this version and that the archive is not corrupt"),

        UpdaterError::PatchApplyFailure { .. } => ErrorContext::new(error)
            .with_suggestion("Rebase or drop the failing patch in patches/, then run the update again")
            .with_details("The update was aborted before the swap; the package directory is unchanged"),

        UpdaterError::RegenerationFailure { .. } => ErrorContext::new(error)
            .with_details("The update was aborted before the swap; the package directory is unchanged"),

        UpdaterError::PostHookFailure { .. } => ErrorContext::new(error)
            .with_suggestion("Run the hook manually, or pass --skip-post-update")
            .with_details("The update was aborted before the swap; the package directory is unchanged"),

        UpdaterError::SwapFailure {
            package,
            retired,
            staged,
            ..
        } => {
            let suggestion = format!(
                "Restore {package} from {retired} (previous content) or {staged} (new content), \
                 then remove the leftover directory"
            );
            ErrorContext::new(error.clone())
                .with_suggestion(suggestion)
                .with_details("The swap step is not reversible once started; both trees were left on disk")
        }

        UpdaterError::UpdateInProgress {
            staging,
            ..
        } => {
            let suggestion =
                format!("Wait for the other run to finish, or remove {staging} if it was interrupted");
            ErrorContext::new(error.clone()).with_suggestion(suggestion)
        }

        UpdaterError::OverrideRejected { .. } => ErrorContext::new(error)
            .with_suggestion("List the upstream tags and pick one that is newer than the recorded version"),

        UpdaterError::ProcessTimeout { .. } => ErrorContext::new(error)
            .with_suggestion("Raise [process] timeout_secs in the vendup config if the step is legitimately slow"),

        UpdaterError::ConfigError { .. } => ErrorContext::new(error)
            .with_suggestion("Check the vendup config file (see --config or $VENDUP_CONFIG)"),

        UpdaterError::IoError(_) | UpdaterError::Other { .. } => ErrorContext::new(error),
    }
}
