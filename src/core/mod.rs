//! Core types shared by every vendup module.
//!
//! Currently this is the error taxonomy and its user-facing rendering; see
//! [`error`] for details.

pub mod error;

pub use error::{ErrorContext, UpdaterError, classify, user_friendly_error};
