//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Portable mode**: If a `.portable` marker file exists next to the
//!   executable, the settings file and logs live in the same directory.
//! - **Installed mode** (default): Data is stored in the platform data
//!   directory (`%APPDATA%\tbar-web`, `~/.local/share/tbar-web`, ...).

use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "tbar-web";

/// Settings file name
pub const CONFIG_FILE_NAME: &str = "tbar-web.yaml";

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the settings file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// **Debug mode**: If `tbar-web.yaml` exists in the current working
    /// directory (typical when running with `cargo run`), use that directory.
    ///
    /// Note: This is called before logging is initialized, so we use eprintln
    /// for early diagnostic output.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(CONFIG_FILE_NAME).exists() {
                eprintln!(
                    "[paths] Running in DEV mode ({} found in cwd: {})",
                    CONFIG_FILE_NAME,
                    cwd.display()
                );
                return Self::portable(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::portable(&exe_dir);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!(
                    "[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir"
                );
                exe_dir.clone()
            })
            .join(APP_NAME);

        Self::installed(&app_data)
    }

    /// Paths rooted next to the executable (or the dev working directory)
    pub fn portable(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE_NAME),
            logs_dir: dir.join("logs"),
            is_portable: true,
        }
    }

    /// Paths rooted in the per-user application data directory
    pub fn installed(app_data: &Path) -> Self {
        Self {
            config: app_data.join(CONFIG_FILE_NAME),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the logs directory exists.
    pub fn ensure_logs_dir(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_layout() {
        let paths = AppPaths::portable(Path::new("test"));

        assert!(paths.is_portable);
        assert_eq!(paths.config, PathBuf::from("test/tbar-web.yaml"));
        assert_eq!(paths.logs_dir, PathBuf::from("test/logs"));
        assert_eq!(paths.base_dir(), PathBuf::from("test"));
    }

    #[test]
    fn test_installed_layout() {
        let paths = AppPaths::installed(Path::new("data/tbar-web"));

        assert!(!paths.is_portable);
        assert_eq!(paths.config, PathBuf::from("data/tbar-web/tbar-web.yaml"));
    }

    #[test]
    fn test_ensure_logs_dir_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let paths = AppPaths::portable(temp.path());

        paths.ensure_logs_dir().unwrap();
        assert!(paths.logs_dir.is_dir());
    }
}
