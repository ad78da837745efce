//! Command-line interface for app-updater.
//!
//! # Commands
//!
//! - `check` - Ask the update service whether a newer version exists
//! - `upgrade` - Check, download and install the latest version
//! - `install` - Install a package that is already on disk
//! - `resume` - Continue an install that was waiting for permission
//! - `status` - Show the session state, pending install and permission state
//! - `config` - Manage the global configuration file
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - Debug logging
//! - `--quiet` / `-q` - Errors only
//! - `--config` / `-c` - Path to a config file instead of the default location
//! - `--no-progress` - Hide progress bars
//!
//! `RUST_LOG` takes precedence over `--verbose` and `--quiet`.

mod check;
pub mod common;
mod config;
mod install;
mod resume;
mod status;
mod upgrade;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Settings derived from the global flags, passed to every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
    pub no_progress: bool,
    pub config_path: Option<String>,
}

#[derive(Parser)]
#[command(
    name = "app-updater",
    about = "Check for, download and install application updates",
    version,
    long_about = "app-updater asks an update service for a newer version of an application, \
                  downloads the package and hands it to the installer, waiting for install \
                  permission when the system requires it."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether an update is available
    Check(check::CheckCommand),
    /// Download and install the latest version
    Upgrade(upgrade::UpgradeCommand),
    /// Install a downloaded package
    Install(install::InstallCommand),
    /// Continue an install that was waiting for permission
    Resume(resume::ResumeCommand),
    /// Show updater status
    Status(status::StatusCommand),
    /// Manage the global configuration
    Config(config::ConfigCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Upgrade(cmd) => cmd.execute(&config).await,
            Commands::Install(cmd) => cmd.execute(&config).await,
            Commands::Resume(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Config(cmd) => cmd.execute(&config).await,
        }
    }
}
