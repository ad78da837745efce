use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use super::CliConfig;
use crate::config::GlobalConfig;

/// Manage the global configuration file.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommands {
    /// Write an example config
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Print the current config
    Show,
    /// Set one `[updater]` key
    Set {
        key: String,
        value: String,
    },
    /// Print the config file location
    Path,
}

impl ConfigCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config_path = match &cli.config_path {
            Some(path) => PathBuf::from(path),
            None => GlobalConfig::default_path()?,
        };

        match self.command {
            Some(ConfigSubcommands::Init {
                force,
            }) => Self::init(&config_path, force).await,
            Some(ConfigSubcommands::Show) | None => Self::show(&config_path).await,
            Some(ConfigSubcommands::Set {
                key,
                value,
            }) => Self::set(&config_path, &key, &value).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", config_path.display());
                Ok(())
            }
        }
    }

    async fn init(config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            println!("❌ Config already exists at: {}", config_path.display());
            println!("   Use --force to overwrite");
            return Ok(());
        }

        let config = GlobalConfig::init_example();
        config.save_to(config_path).await?;

        println!("✅ Created config at: {}", config_path.display());
        println!("\n{}", "Example configuration:".bold());
        println!("{}", toml::to_string_pretty(&config)?);
        println!("\n{}", "Next steps:".yellow());
        println!("  1. Set base_url to your update service");
        println!("  2. Set app_id and current_version_code for your application");
        Ok(())
    }

    async fn show(config_path: &Path) -> Result<()> {
        let config = GlobalConfig::load_with_optional(Some(config_path.to_path_buf())).await?;

        println!("{}", "Updater Configuration".bold());
        println!("Location: {}\n", config_path.display());
        println!("{}", toml::to_string_pretty(&config)?);

        if config.updater.base_url.is_empty() {
            println!("{}", "Tip:".yellow());
            println!("  Run 'app-updater config init' to create an example configuration");
        }
        Ok(())
    }

    async fn set(config_path: &Path, key: &str, value: &str) -> Result<()> {
        let mut config = GlobalConfig::load_with_optional(Some(config_path.to_path_buf())).await?;
        config.set_value(key, value)?;
        config.save_to(config_path).await?;

        println!("✅ Set updater.{key} = {value}");
        Ok(())
    }
}
