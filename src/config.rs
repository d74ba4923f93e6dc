//! Configuration management for quarantiner
//!
//! Stores settings in ~/.config/quarantiner/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// How packages under the repository root are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverKind {
    /// Ask the Go toolchain (`go list`).
    #[default]
    GoList,
    /// Walk the file tree; no toolchain needed, build flags ignored.
    Walk,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extra flags passed to `go list`, e.g. `-tags=integration`
    pub build_flags: Vec<String>,
    /// Skip reason written into quarantined tests
    pub skip_reason: Option<String>,
    pub resolver: ResolverKind,
    /// Emit logs as newline-delimited JSON
    pub log_json: bool,
}

/// Changes requested by `quarantiner config`. `None` keeps the saved value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub build_flags: Option<Vec<String>>,
    pub resolver: Option<ResolverKind>,
    /// An empty reason resets to the built-in default
    pub skip_reason: Option<String>,
    pub log_json: Option<bool>,
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("quarantiner"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A file that fails to parse is moved
    /// aside and defaults are returned.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    pub fn update(&mut self, update: ConfigUpdate) {
        if let Some(flags) = update.build_flags {
            self.build_flags = flags;
        }
        if let Some(resolver) = update.resolver {
            self.resolver = resolver;
        }
        if let Some(reason) = update.skip_reason {
            self.skip_reason = Some(reason).filter(|r| !r.is_empty());
        }
        if let Some(log_json) = update.log_json {
            self.log_json = log_json;
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path()
            .ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    warn!(error = %e, "failed to set config directory permissions");
                }
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        write_config_atomic(path, &content).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/quarantiner/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            warn!(error = %e, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes()).map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}
