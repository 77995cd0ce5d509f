//! Error handling for buckforge
//!
//! The library reports every failure through [`BuildError`], a strongly-typed enum
//! whose variants mirror the failure taxonomy of the generation core:
//!
//! - [`BuildError::UnresolvedDependency`] - the host resolver produced no file for a
//!   declared coordinate. Generation for the requesting module aborts.
//! - [`BuildError::CacheWriteFailure`] - copying an artifact into the cache root failed.
//!   Never retried by the cache itself.
//! - [`BuildError::VersionConflict`] - two requesters disagree on a version and the
//!   owning manager's policy refuses to merge them.
//! - [`BuildError::ProtocolViolation`] - a driver broke the accumulate/finalize protocol
//!   (second finalize, late register, out-of-phase visit).
//!
//! Every error can be flattened into a [`Diagnostic`] (category + coordinate + reason)
//! so a driver can decide whether to abort or continue with best-effort output.
//!
//! At the CLI boundary errors travel as [`anyhow::Error`] and are rendered with
//! [`user_friendly_error`], which attaches suggestions and colors like the rest of the
//! command-line surface.

use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::version::VersionConflict;

/// Result alias used by every library module.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Coarse classification of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    UnresolvedDependency,
    CacheWriteFailure,
    VersionConflict,
    ProtocolViolation,
    InvalidInput,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UnresolvedDependency => "unresolved-dependency",
            Self::CacheWriteFailure => "cache-write-failure",
            Self::VersionConflict => "version-conflict",
            Self::ProtocolViolation => "protocol-violation",
            Self::InvalidInput => "invalid-input",
            Self::Io => "io",
        };
        f.write_str(label)
    }
}

/// Errors produced by the generation core.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The host resolver returned no file for a declared coordinate.
    #[error("Unresolved dependency '{coordinate}'{}", .requested_by.as_ref().map(|m| format!(" (required by {m})")).unwrap_or_default())]
    UnresolvedDependency {
        coordinate: String,
        requested_by: Option<String>,
    },

    /// A module reference points at a module the host graph does not know.
    #[error("Unknown module '{module}' referenced by {requested_by}")]
    UnknownModule {
        module: String,
        requested_by: String,
    },

    /// Copying an artifact into the cache root failed.
    #[error("Failed to write '{coordinate}' into the {category} cache at {}", .path.display())]
    CacheWriteFailure {
        category: String,
        coordinate: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Requested versions of one logical dependency could not be reconciled.
    #[error("{0}")]
    VersionConflict(Box<VersionConflict>),

    /// The accumulate/finalize protocol was broken by the caller.
    #[error("Protocol violation in {component}: {reason}")]
    ProtocolViolation { component: String, reason: String },

    /// A coordinate string failed validation.
    #[error("Invalid coordinate '{input}': {reason}")]
    InvalidCoordinate { input: String, reason: String },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error in {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    /// The host model snapshot could not be read.
    #[error("Invalid project model {}: {reason}", .path.display())]
    Model { path: PathBuf, reason: String },

    /// A rule file template failed to render.
    #[error("Failed to render rule file for {category}: {source}")]
    Render {
        category: String,
        #[source]
        source: tera::Error,
    },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn unresolved(coordinate: impl fmt::Display, requested_by: Option<&str>) -> Self {
        Self::UnresolvedDependency {
            coordinate: coordinate.to_string(),
            requested_by: requested_by.map(str::to_string),
        }
    }

    pub fn protocol(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnresolvedDependency { .. } | Self::UnknownModule { .. } => {
                ErrorCategory::UnresolvedDependency
            }
            Self::CacheWriteFailure { .. } => ErrorCategory::CacheWriteFailure,
            Self::VersionConflict(_) => ErrorCategory::VersionConflict,
            Self::ProtocolViolation { .. } => ErrorCategory::ProtocolViolation,
            Self::InvalidCoordinate { .. } | Self::Config { .. } | Self::Model { .. } => {
                ErrorCategory::InvalidInput
            }
            Self::Render { .. } | Self::Io { .. } => ErrorCategory::Io,
        }
    }

    /// The offending coordinate (or module), when the error is about one.
    pub fn coordinate(&self) -> Option<&str> {
        match self {
            Self::UnresolvedDependency { coordinate, .. }
            | Self::CacheWriteFailure { coordinate, .. } => Some(coordinate),
            Self::UnknownModule { module, .. } => Some(module),
            Self::VersionConflict(conflict) => Some(&conflict.logical_id),
            Self::InvalidCoordinate { input, .. } => Some(input),
            _ => None,
        }
    }

    /// Flatten into the structured form handed to drivers.
    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic {
            category: self.category(),
            coordinate: self.coordinate().map(str::to_string),
            reason: self.to_string(),
        }
    }

    /// Whether the error is a bug in the calling driver rather than bad input data.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }
}

/// Structured, serializable description of a failure or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub category: ErrorCategory,
    pub coordinate: Option<String>,
    pub reason: String,
}

impl Diagnostic {
    pub fn new(
        category: ErrorCategory,
        coordinate: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            category,
            coordinate,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coordinate {
            Some(coordinate) => write!(f, "[{}] {}: {}", self.category, coordinate, self.reason),
            None => write!(f, "[{}] {}", self.category, self.reason),
        }
    }
}

/// User-facing wrapper around an error with an optional suggestion and details.
///
/// Suggestions are printed in green, details in yellow, the error itself in red.
#[derive(Debug)]
pub struct ErrorContext {
    pub message: String,
    pub category: Option<ErrorCategory>,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(message: impl Into<String>, category: Option<ErrorCategory>) -> Self {
        Self {
            message: message.into(),
            category,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

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
        write!(f, "{}", self.message)?;

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

/// Convert any error reaching the CLI into a user-friendly [`ErrorContext`].
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(build_error) = error.downcast_ref::<BuildError>() {
        return create_error_context(build_error, &error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let context = ErrorContext::new(format!("{error:#}"), Some(ErrorCategory::Io));
        return match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => context
                .with_suggestion("Check ownership and permissions of the workspace and cache directories"),
            std::io::ErrorKind::NotFound => {
                context.with_suggestion("Check that the file or directory exists and the path is correct")
            }
            _ => context,
        };
    }

    ErrorContext::new(format!("{error:#}"), None)
}

fn create_error_context(error: &BuildError, chain: &anyhow::Error) -> ErrorContext {
    let context = ErrorContext::new(format!("{chain:#}"), Some(error.category()));
    match error {
        BuildError::UnresolvedDependency { .. } => context
            .with_details("Rules referencing a missing artifact would corrupt the generated output, so generation stopped")
            .with_suggestion("Make sure the host build resolved this coordinate, or add a repository that contains it"),
        BuildError::UnknownModule { .. } => context
            .with_suggestion("Export the referenced module in the project model or fix the module path"),
        BuildError::CacheWriteFailure { .. } => context
            .with_suggestion("Check free disk space and permissions of the cache directory (set BUCKFORGE_CACHE_DIR to relocate it)"),
        BuildError::VersionConflict(_) => context
            .with_suggestion("Align the requested versions, pin a version in buckforge.toml, or relax the manager's conflict_policy"),
        BuildError::ProtocolViolation { .. } => context
            .with_details("This is a bug in the generation driver, not in the project being generated"),
        BuildError::InvalidCoordinate { .. } => context
            .with_suggestion("Coordinates are written as group:name:version[:classifier]"),
        BuildError::Config { .. } => {
            context.with_suggestion("Check buckforge.toml against the documented keys")
        }
        BuildError::Model { .. } => context
            .with_suggestion("Re-export the project model from the host build tool"),
        BuildError::Render { .. } | BuildError::Io { .. } => context,
    }
}
