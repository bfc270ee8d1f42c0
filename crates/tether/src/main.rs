use clap::Parser;
use eyre::Result;

use tether::cli::{Cli, Commands};
use tether::commands::{Command, config::ConfigCommand, cursor::CursorCommand};
use tether_core::config::ResumeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Level configured via RUST_LOG
    tether_core::utils::tracing::init_tracing()?;

    let config_path = match cli.config {
        Some(path) => path,
        None => ResumeConfig::config_path()?,
    };

    match cli.command {
        Commands::Cursor { action } => {
            let cursor_file = match cli.cursor_file {
                Some(path) => path,
                None => ResumeConfig::load_from(&config_path)?.cursor_file_path()?,
            };
            CursorCommand {
                action,
                cursor_file,
            }
            .execute()
            .await
        }
        Commands::Config { action } => {
            ConfigCommand {
                action,
                config_path,
            }
            .execute()
            .await
        }
    }
}
