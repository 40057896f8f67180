//! # Nodevisor Process File
//!
//! PID file handling for the nodevisor supervisor.
//!
//! This crate provides functionality for:
//! - Platform-specific directory resolution for PID files
//! - Writing, reading and deleting `<id>.pid` files
//!
//! A PID file is the only record a restarted supervisor has of components it
//! started in a previous life; the stale process reaper in
//! `nodevisor-process` consumes them.

use nodevisor_common::{ProcessError, ProcessResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default application name used for the PID file subdirectory
pub const DEFAULT_APP_NAME: &str = "nodevisor";

/// Service context defines where the service runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceContext {
    /// System service (daemon) - uses system directories
    System,
    /// User service - uses user directories
    User,
    /// Session service - cleaned up on logout
    Session,
}

/// Configuration for process file management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFileConfig {
    /// Base directory for PID files (if empty, uses OS default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,

    /// Service context - affects directory selection
    #[serde(default = "default_service_context")]
    pub service_context: ServiceContext,

    /// Application name for subdirectory creation
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Create subdirectory for the app (recommended for system services)
    #[serde(default = "default_use_subdirectory")]
    pub use_subdirectory: bool,
}

fn default_service_context() -> ServiceContext {
    ServiceContext::System
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_use_subdirectory() -> bool {
    true
}

impl Default for ProcessFileConfig {
    fn default() -> Self {
        Self {
            base_directory: None,
            service_context: default_service_context(),
            app_name: default_app_name(),
            use_subdirectory: default_use_subdirectory(),
        }
    }
}

/// Process file manager for path generation and management
#[derive(Debug, Clone)]
pub struct ProcessFileManager {
    config: ProcessFileConfig,
}

impl ProcessFileManager {
    pub fn new(config: ProcessFileConfig) -> Self {
        Self { config }
    }

    /// Get the base directory for process files (platform-specific)
    pub fn get_base_directory(&self) -> PathBuf {
        if let Some(ref base_dir) = self.config.base_directory {
            return PathBuf::from(base_dir);
        }

        match self.config.service_context {
            ServiceContext::System => system_directory(),
            ServiceContext::User | ServiceContext::Session => user_directory(),
        }
    }

    /// Generate a PID file path for the given component ID
    pub fn generate_pid_file_path(&self, process_id: &str) -> PathBuf {
        let mut base_dir = self.get_base_directory();
        if self.config.use_subdirectory {
            base_dir = base_dir.join(&self.config.app_name);
        }
        base_dir.join(format!("{}.pid", process_id))
    }

    /// Write a PID file (simple text format: just the PID number)
    pub async fn write_pid_file(&self, process_id: &str, pid: u32) -> ProcessResult<PathBuf> {
        let path = self.generate_pid_file_path(process_id);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProcessError::configuration(
                    process_id,
                    format!("Failed to create directory {}: {}", parent.display(), e),
                )
            })?;
        }

        tokio::fs::write(&path, format!("{}\n", pid))
            .await
            .map_err(|e| {
                ProcessError::configuration(
                    process_id,
                    format!("Failed to write PID file {}: {}", path.display(), e),
                )
            })?;

        Ok(path)
    }

    /// Read the PID file of a component
    pub async fn read_pid_file(&self, process_id: &str) -> ProcessResult<u32> {
        read_pid_from(self.generate_pid_file_path(process_id)).await
    }

    /// Delete the PID file of a component
    pub async fn delete_pid_file(&self, process_id: &str) -> ProcessResult<()> {
        delete_pid_at(self.generate_pid_file_path(process_id)).await
    }
}

/// Read a PID from an explicit file path.
///
/// A missing file is `NotFound`. Any other read failure, and contents that
/// are not a PID, are configuration errors.
pub async fn read_pid_from<P: AsRef<Path>>(path: P) -> ProcessResult<u32> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessError::not_found(path.display().to_string())
        } else {
            ProcessError::configuration(
                path.display().to_string(),
                format!("Failed to read PID file {}: {}", path.display(), e),
            )
        }
    })?;

    content.trim().parse::<u32>().map_err(|e| {
        ProcessError::configuration(
            path.display().to_string(),
            format!("Invalid PID in file {}: {}", path.display(), e),
        )
    })
}

/// Delete a PID file at an explicit path. Missing files are not an error.
pub async fn delete_pid_at<P: AsRef<Path>>(path: P) -> ProcessResult<()> {
    let path = path.as_ref();
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProcessError::configuration(
            path.display().to_string(),
            format!("Failed to delete PID file: {}", e),
        )),
    }
}

fn system_directory() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        // Windows: C:\ProgramData\
        PathBuf::from(std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".to_string()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        // Unix: /run/ or /var/run/
        if Path::new("/run").exists() {
            PathBuf::from("/run")
        } else {
            PathBuf::from("/var/run")
        }
    }
}

fn user_directory() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        // Windows: %LOCALAPPDATA%\
        dirs::data_local_dir().unwrap_or_else(|| {
            let user_profile =
                std::env::var("USERPROFILE").unwrap_or_else(|_| "C:\\Users\\Default".to_string());
            PathBuf::from(format!("{}\\AppData\\Local", user_profile))
        })
    }

    #[cfg(not(target_os = "windows"))]
    {
        // Unix: $XDG_RUNTIME_DIR or ~/.local/share/
        if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(runtime_dir)
        } else {
            dirs::data_local_dir().unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local/share")
            })
        }
    }
}
