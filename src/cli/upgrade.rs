use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use super::CliConfig;
use super::common::{CliEvent, EventChannel, await_install, build_updater, confirm, load_updater_config};
use crate::download::DownloadEvent;
use crate::models::format_file_size;
use crate::orchestrator::Updater;
use crate::utils::DownloadBar;

/// Check, download and install the latest version.
#[derive(Args, Debug)]
pub struct UpgradeCommand {
    /// Answer yes to every question
    #[arg(short, long)]
    yes: bool,

    /// Download only; do not start the installer
    #[arg(long)]
    no_install: bool,
}

impl UpgradeCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let mut config = load_updater_config(cli).await?;
        if self.no_install {
            config.auto_install = false;
        }
        // This command drives the download itself.
        config.auto_offer = false;
        let auto_install = config.auto_install;

        let mut events = EventChannel::new();
        let updater = build_updater(config, &events)?;

        println!("{}", "Checking for updates...".cyan());
        let info = updater.check().await?;
        if !info.has_update {
            println!("{}", "You are on the latest version".green());
            return Ok(());
        }

        println!(
            "{}",
            format!("Update available: {} ({})", info.new_version_name, format_file_size(info.file_size))
                .green()
        );

        if info.force_update {
            println!("{}", "This update is required.".yellow().bold());
        } else if !self.yes
            && !confirm(format!("Download and install {}?", info.new_version_name), true).await
        {
            println!("Update skipped");
            return Ok(());
        }

        updater.start_download(&info, Some(events.download_handler()))?;
        let bar = DownloadBar::new(info.file_size, !cli.no_progress);

        let Some(package) = track_download(&updater, &mut events, &bar).await? else {
            println!("{}", "Download canceled".yellow());
            return Ok(());
        };
        println!("Downloaded to {}", package.display());

        if !auto_install {
            println!("Run `app-updater install {}` to install it", package.display());
            return Ok(());
        }
        await_install(&mut events, self.yes).await
    }
}

/// Follow the download to its end. `None` when it was canceled.
async fn track_download(
    updater: &Updater,
    events: &mut EventChannel,
    bar: &DownloadBar,
) -> Result<Option<PathBuf>> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CliEvent::Download(DownloadEvent::Started)) => debug!("Download started"),
                Some(CliEvent::Download(DownloadEvent::Progress(progress))) => bar.update(&progress),
                Some(CliEvent::Download(DownloadEvent::Completed(path))) => {
                    bar.finish_with_message("done");
                    return Ok(Some(path));
                }
                Some(CliEvent::Download(DownloadEvent::Failed(e))) => {
                    bar.abandon_with_message("failed");
                    return Err(e.into());
                }
                Some(CliEvent::Download(DownloadEvent::Canceled)) => {
                    bar.abandon_with_message("canceled");
                    return Ok(None);
                }
                Some(CliEvent::Install(event)) => debug!("Install event before download end: {event:?}"),
                None => bail!("The updater stopped before the download finished"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                updater.cancel_download();
            }
        }
    }
}
