use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CliConfig;
use super::common::{EventChannel, await_install, build_updater, load_updater_config};

/// Install a package that is already on disk.
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Path to the package
    package: PathBuf,

    /// Open the permission settings without asking
    #[arg(short, long)]
    yes: bool,
}

impl InstallCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = load_updater_config(cli).await?;
        let mut events = EventChannel::new();
        let updater = build_updater(config, &events)?;

        println!("{}", format!("Installing {}...", self.package.display()).cyan());
        updater.install(&self.package, Some(events.install_handler()));
        await_install(&mut events, self.yes).await
    }
}
