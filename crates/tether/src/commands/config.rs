use async_trait::async_trait;
use eyre::Result;
use std::io::Write;
use std::path::PathBuf;

use super::Command;
use crate::cli::ConfigCommands;
use crate::error::Error;

use tether_core::config::ResumeConfig;

pub struct ConfigCommand {
    pub action: ConfigCommands,
    pub config_path: PathBuf,
}

#[async_trait]
impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.run(&mut stdout)?;
        Ok(())
    }
}

impl ConfigCommand {
    pub fn run(&self, out: &mut dyn Write) -> std::result::Result<(), Error> {
        match self.action {
            ConfigCommands::Show => {
                let config = ResumeConfig::load_from(&self.config_path)?;
                writeln!(out, "Config file: {}", self.config_path.display())?;
                writeln!(out, "Cursor file: {}", config.cursor_file_path()?.display())?;
                writeln!(out, "\n{}", toml::to_string_pretty(&config)?)?;
            }
            ConfigCommands::Path => writeln!(out, "{}", self.config_path.display())?,
        }
        Ok(())
    }
}
