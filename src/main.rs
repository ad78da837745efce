//! app-updater CLI entry point
//!
//! Parses the command line, sets up logging and runs the selected command:
//! - `check` - Ask the update service whether a newer version exists
//! - `upgrade` - Check, download and install the latest version
//! - `install` - Install a package that is already on disk
//! - `resume` - Continue an install that was waiting for permission
//! - `status` - Show updater status
//! - `config` - Manage global configuration

use anyhow::Result;
use app_updater::cli;
use app_updater::core::user_friendly_error;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let config = cli.build_config();
    init_logging(&config.log_level);

    match cli.execute_with_config(config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}

/// Log to stderr; `RUST_LOG` wins over the level picked from the flags.
fn init_logging(default_level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(default_level)
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
