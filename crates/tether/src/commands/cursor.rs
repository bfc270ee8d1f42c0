use async_trait::async_trait;
use eyre::Result;
use std::io::Write;
use std::path::PathBuf;

use super::Command;
use crate::cli::CursorCommands;
use crate::error::Error;

use tether_core::cursor::{CursorStore, FileCursorStore};
use tether_core::types::ChatId;

pub struct CursorCommand {
    pub action: CursorCommands,
    pub cursor_file: PathBuf,
}

#[async_trait]
impl Command for CursorCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.run(&mut stdout)?;
        Ok(())
    }
}

impl CursorCommand {
    pub fn run(&self, out: &mut dyn Write) -> std::result::Result<(), Error> {
        let store = FileCursorStore::open(&self.cursor_file)?;

        match &self.action {
            CursorCommands::List => {
                let entries = store.entries()?;
                if entries.is_empty() {
                    writeln!(out, "No cursors stored in {}", self.cursor_file.display())?;
                    return Ok(());
                }
                writeln!(out, "{:<40} {:>10}", "CHAT", "SEQ")?;
                for (chat_id, seq) in entries {
                    writeln!(out, "{chat_id:<40} {seq:>10}")?;
                }
            }
            CursorCommands::Get { chat_id } => match store.get(&ChatId::from(chat_id.as_str()))? {
                Some(seq) => writeln!(out, "{seq}")?,
                None => writeln!(out, "No cursor for {chat_id}")?,
            },
            CursorCommands::Set { chat_id, seq } => {
                let chat = ChatId::from(chat_id.as_str());
                store.persist(&chat, *seq)?;
                tracing::info!(chat_id = %chat, seq, "Cursor overwritten from CLI");
                if *seq == 0 {
                    writeln!(out, "Cleared cursor for {chat_id}")?;
                } else {
                    writeln!(out, "Set cursor for {chat_id} to {seq}")?;
                }
            }
            CursorCommands::Clear { chat_id } => {
                let chat = ChatId::from(chat_id.as_str());
                store.clear(&chat)?;
                tracing::info!(chat_id = %chat, "Cursor cleared from CLI");
                writeln!(out, "Cleared cursor for {chat_id}")?;
            }
        }

        Ok(())
    }
}
