use std::path::PathBuf;

/// Standardized application directories for Tether.
pub struct AppPaths;

impl AppPaths {
    /// Return the user-level config directory (platform-specific)
    pub fn user_config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tether").map(|d| d.config_dir().to_path_buf())
    }

    /// Return the user-level data directory (platform-specific)
    pub fn user_data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tether").map(|d| d.data_dir().to_path_buf())
    }

    pub fn resume_config() -> Option<PathBuf> {
        Self::user_config_dir().map(|d| d.join("resume.toml"))
    }

    pub fn default_cursor_file() -> Option<PathBuf> {
        Self::user_data_dir().map(|d| d.join("cursors.json"))
    }

    pub fn log_dir() -> Option<PathBuf> {
        Self::user_data_dir().map(|d| d.join("logs"))
    }
}
