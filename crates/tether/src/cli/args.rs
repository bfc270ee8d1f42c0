use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and reset the state Tether uses to resume interrupted responses.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Cursor file to operate on (defaults to the configured location)
    #[arg(long, env = "TETHER_CURSOR_FILE", global = true)]
    pub cursor_file: Option<PathBuf>,

    /// Resume config file (defaults to the user config directory)
    #[arg(long, env = "TETHER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Manage persisted resume cursors
    Cursor {
        #[command(subcommand)]
        action: CursorCommands,
    },
    /// Show resume configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum CursorCommands {
    /// List all stored cursors
    List,
    /// Show the cursor for one conversation
    Get { chat_id: String },
    /// Overwrite the cursor for one conversation (0 clears it)
    Set { chat_id: String, seq: u64 },
    /// Remove the cursor for one conversation
    Clear { chat_id: String },
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cursor_set() {
        let cli = Cli::try_parse_from(["tether", "cursor", "set", "chat-1", "45"]).unwrap();
        let Commands::Cursor { action } = cli.command else {
            panic!("expected cursor command");
        };
        assert_eq!(
            action,
            CursorCommands::Set {
                chat_id: "chat-1".to_string(),
                seq: 45
            }
        );
    }

    #[test]
    fn global_cursor_file_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tether",
            "cursor",
            "list",
            "--cursor-file",
            "/tmp/c.json",
        ])
        .unwrap();
        assert_eq!(cli.cursor_file, Some(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn rejects_negative_seq() {
        assert!(Cli::try_parse_from(["tether", "cursor", "set", "chat-1", "-3"]).is_err());
    }
}
