use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::{EventChannel, build_updater, load_updater_config};
use crate::models::format_file_size;

/// Ask the update service whether a newer version exists.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = load_updater_config(cli).await?;
        let current = config.current_version_code;
        let events = EventChannel::new();
        let updater = build_updater(config, &events)?;

        if !self.json {
            println!("{}", "Checking for updates...".cyan());
        }
        let info = updater.check().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(());
        }

        if !info.has_update {
            println!("{}", format!("You are on the latest version (code {current})").green());
            return Ok(());
        }

        println!(
            "{}",
            format!(
                "Update available: {} (code {} -> {})",
                info.new_version_name, current, info.new_version_code
            )
            .green()
        );
        if info.file_size > 0 {
            println!("Size: {}", format_file_size(info.file_size));
        }
        if !info.description.is_empty() {
            println!("\n{}\n{}", "What's new:".bold(), info.description);
        }
        if info.force_update {
            println!("\n{}", "This update is required.".yellow().bold());
        }
        println!("\nRun `app-updater upgrade` to install it");
        Ok(())
    }
}
