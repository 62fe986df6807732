use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::destructive::{StatementAuditor, DEFAULT_PREVIEW_CHARS};
use crate::execution_target::ExecutionMode;
use crate::guard::ExecutionGuard;
use crate::scanner::ScanOptions;

fn enabled() -> bool {
    true
}

fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScannerSettings {
    #[serde(default = "enabled")]
    pub backslash_escapes: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            backslash_escapes: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionSettings {
    #[serde(default)]
    pub default_mode: ExecutionMode,
    #[serde(default)]
    pub active_database: Option<String>,
    #[serde(default = "enabled")]
    pub confirm_destructive: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_mode: ExecutionMode::Smart,
            active_database: None,
            confirm_destructive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditSettings {
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub audit: AuditSettings,
}

impl Settings {
    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::default().with_backslash_escapes(self.scanner.backslash_escapes)
    }

    #[must_use]
    pub fn auditor(&self) -> StatementAuditor {
        StatementAuditor::new(self.scan_options()).with_preview_chars(self.audit.preview_chars)
    }

    #[must_use]
    pub fn guard(&self) -> ExecutionGuard {
        ExecutionGuard::new(self.execution.confirm_destructive).with_auditor(self.auditor())
    }

    #[must_use]
    pub fn active_database(&self) -> Option<&str> {
        self.execution
            .active_database
            .as_deref()
            .filter(|database| !database.trim().is_empty())
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write settings file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl FileSettingsStore {
    pub fn load_default() -> Result<Self, SettingsError> {
        let path = default_settings_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                settings: Settings::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                settings: Settings::default(),
            });
        }

        let settings = toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.clone(),
            source,
        })?;
        log::debug!("loaded settings from {}", path.display());

        Ok(Self { path, settings })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn persist(&self) -> Result<(), SettingsError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| SettingsError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.settings)
            .map_err(|source| SettingsError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let base_dir = if let Some(custom) = env::var_os("SQLSIFT_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(SettingsError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(SettingsError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("sqlsift").join("settings.toml"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{FileSettingsStore, Settings, SettingsError};
    use crate::execution_target::ExecutionMode;
    use crate::guard::GuardDecision;

    #[test]
    fn missing_or_blank_file_loads_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");

        let store = FileSettingsStore::load_from_path(&path).expect("missing file loads");
        assert_eq!(store.settings(), &Settings::default());

        fs::write(&path, "  \n").expect("failed to write blank file");
        let store = FileSettingsStore::load_from_path(&path).expect("blank file loads");
        assert_eq!(store.settings(), &Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        fs::write(
            &path,
            "[execution]\ndefault_mode = \"all\"\nactive_database = \"app\"\n",
        )
        .expect("failed to write settings");

        let store = FileSettingsStore::load_from_path(&path).expect("settings load");
        let settings = store.settings();
        assert_eq!(settings.execution.default_mode, ExecutionMode::All);
        assert_eq!(settings.active_database(), Some("app"));
        assert!(settings.execution.confirm_destructive);
        assert!(settings.scanner.backslash_escapes);
        assert_eq!(settings.audit.preview_chars, 140);
    }

    #[test]
    fn invalid_file_reports_parse_error_with_path() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("settings.toml");
        fs::write(&path, "[execution]\ndefault_mode = \"sometimes\"\n")
            .expect("failed to write settings");

        let err = FileSettingsStore::load_from_path(&path).expect_err("bad mode should fail");
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().contains("settings.toml"));
    }

    #[test]
    fn persist_and_reload_round_trips() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("nested").join("settings.toml");

        let mut store = FileSettingsStore::load_from_path(&path).expect("store loads");
        store.settings_mut().scanner.backslash_escapes = false;
        store.settings_mut().audit.preview_chars = 80;
        store.persist().expect("failed to persist settings");

        let reloaded = FileSettingsStore::load_from_path(&path).expect("reload");
        assert_eq!(reloaded.settings(), store.settings());
        assert_eq!(reloaded.path(), path.as_path());
    }

    #[test]
    fn settings_drive_scanner_and_guard() {
        let mut settings = Settings::default();
        settings.scanner.backslash_escapes = false;
        settings.execution.confirm_destructive = false;
        settings.execution.active_database = Some("  ".to_string());

        assert!(!settings.scan_options().backslash_escapes);
        assert!(settings.active_database().is_none());

        let mut guard = settings.guard();
        let decision = guard.evaluate("DELETE FROM t");
        assert!(matches!(decision, GuardDecision::Allow { .. }));
        assert_eq!(decision.findings().len(), 1);
    }
}
