use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::{EventChannel, build_updater, load_updater_config};

/// Show the session state, pending install and permission state.
#[derive(Args, Debug)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = load_updater_config(cli).await?;
        let events = EventChannel::new();
        let updater = build_updater(config, &events)?;
        let config = updater.config();

        println!("{}", "Updater Status".bold());
        println!("Application: {} (version code {})", config.app_id, config.current_version_code);
        println!("Service:     {}", config.base_url);
        println!("State:       {:?}", updater.state());
        println!("Downloads:   {}", config.download_dir().display());

        let summary = updater.permission_summary();
        let permission = if summary.has_install_permission {
            "granted".green()
        } else {
            "not granted".yellow()
        };
        println!("Permission:  {permission}");

        match updater.pending_install() {
            Some(pending) => {
                println!(
                    "Pending:     {} (since {})",
                    pending.package_path.display(),
                    pending.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!("\nRun `app-updater resume` to continue the install");
            }
            None => println!("Pending:     none"),
        }
        Ok(())
    }
}
