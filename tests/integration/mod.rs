//! Integration test suite for app-updater
//!
//! End-to-end tests of the update workflow and the command-line interface.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: The `app-updater` binary (config, status, check, install, resume)
//! - **version_check**: Check requests and package downloads over HTTP against a stub service
//! - **workflow**: Download, install, permission round trip and resume with faked platform pieces

mod cli;
mod version_check;
mod workflow;
