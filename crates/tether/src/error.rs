use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] tether_core::config::ConfigError),

    #[error("Cursor store error: {0}")]
    Cursor(#[from] tether_core::cursor::CursorStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),
}
