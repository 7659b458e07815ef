//! Where the agent keeps its files

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::AgentError;
use crate::filesys::file::File;

const SETTINGS_FILE: &str = "settings.json";
const DEPLOYMENTS_FILE: &str = "deployments.json";
const LOGS_DIR: &str = "logs";

/// On-disk layout rooted at one base directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `settings.json`
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join(SETTINGS_FILE))
    }

    /// `deployments.json`, the local deployment store
    pub fn deployments_file(&self) -> File {
        File::new(self.base_dir.join(DEPLOYMENTS_FILE))
    }

    /// Directory for rolling log files
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join(LOGS_DIR)
    }

    /// Create the base and log directories
    pub async fn setup(&self) -> Result<(), AgentError> {
        fs::create_dir_all(&self.base_dir).await?;
        fs::create_dir_all(self.logs_dir()).await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/satellite");

        // Per-user directory off Linux
        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".satellite");

        Self::new(base_dir)
    }
}
