//! Core types shared by every updater component.
//!
//! Currently this is the error taxonomy; see [`error`].

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};
