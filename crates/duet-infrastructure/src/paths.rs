//! Unified path management for duet files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/duet/              # Config directory
//! ├── config.toml              # Application configuration
//! └── prompts.toml             # Edited role prompts
//!
//! ~/.local/share/duet/         # Data directory
//! ├── history.json             # Exchange log
//! └── logs/                    # Application logs
//!     └── duet.log.YYYY-MM-DD
//! ```

use std::path::{Path, PathBuf};

use duet_core::DuetError;

const APP_DIR: &str = "duet";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for DuetError {
    fn from(err: PathError) -> Self {
        DuetError::config(err.to_string())
    }
}

/// Resolved locations of every file duet reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuetPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl DuetPaths {
    /// Resolves the platform directories (XDG on Linux).
    ///
    /// # Returns
    ///
    /// - `Ok(DuetPaths)`: Paths under the user's config and data directories
    /// - `Err(PathError::HomeDirNotFound)`: Could not determine a directory
    pub fn new() -> Result<Self, PathError> {
        let config_dir = dirs::config_dir().ok_or(PathError::HomeDirNotFound)?;
        let data_dir = dirs::data_dir().ok_or(PathError::HomeDirNotFound)?;
        Ok(Self {
            config_dir: config_dir.join(APP_DIR),
            data_dir: data_dir.join(APP_DIR),
        })
    }

    /// Places both directories under `root` (used by `--data-dir` and tests).
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn prompts_file(&self) -> PathBuf {
        self.config_dir.join("prompts.toml")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let paths = DuetPaths::with_root("/tmp/duet-test");

        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/duet-test/config/config.toml")
        );
        assert_eq!(
            paths.prompts_file(),
            PathBuf::from("/tmp/duet-test/config/prompts.toml")
        );
        assert_eq!(
            paths.history_file(),
            PathBuf::from("/tmp/duet-test/data/history.json")
        );
        assert_eq!(paths.logs_dir(), PathBuf::from("/tmp/duet-test/data/logs"));
    }
}
