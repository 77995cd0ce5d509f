//! Core types shared by every buckforge module.
//!
//! - [`BuildError`] and [`Result`] - the structured error taxonomy of the generation core
//! - [`Diagnostic`] - category + coordinate + reason, handed to drivers
//! - [`ErrorContext`] / [`user_friendly_error`] - CLI rendering with suggestions

pub mod error;

pub use error::{BuildError, Diagnostic, ErrorCategory, ErrorContext, Result, user_friendly_error};
