use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use super::common::{EventChannel, await_install, build_updater, load_updater_config};

/// Continue an install that was waiting for permission.
#[derive(Args, Debug)]
pub struct ResumeCommand {
    /// Open the permission settings without asking
    #[arg(short, long)]
    yes: bool,
}

impl ResumeCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = load_updater_config(cli).await?;
        let mut events = EventChannel::new();
        let updater = build_updater(config, &events)?;

        if !updater.resume_pending_install_with(events.install_handler())? {
            println!("{}", "No install is waiting for permission".green());
            return Ok(());
        }
        await_install(&mut events, self.yes).await
    }
}
