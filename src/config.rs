//! User settings: `settings.json`, then environment, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_RETENTION_DAYS;
use crate::error::{AppError, Result};
use crate::kicad::LibraryFormat;
use crate::library::{ModelPathStyle, DEFAULT_CATEGORY};

pub const APP_DIR: &str = "lcsc-grabber";
pub const SETTINGS_FILE: &str = "settings.json";
pub const ENV_LIBRARY: &str = "LCSC_GRABBER_LIBRARY";
pub const ENV_CACHE: &str = "LCSC_GRABBER_CACHE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library_root: PathBuf,
    pub cache_dir: PathBuf,
    /// Revision used for newly created libraries.
    pub format: LibraryFormat,
    pub retention_days: i64,
    pub request_interval_ms: u64,
    pub parallel: usize,
    pub default_category: String,
    pub model_paths: ModelPathStyle,
}

impl Default for Settings {
    fn default() -> Self {
        let base = BaseDirs::new();
        let documents = UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
            .or_else(|| base.as_ref().map(|b| b.home_dir().join("Documents")))
            .unwrap_or_else(|| PathBuf::from("."));
        let cache_dir = base.as_ref()
            .map(|b| b.cache_dir().join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".lcsc-grabber-cache"));

        Self {
            library_root: documents.join("KiCad").join("lcsc_grabber"),
            cache_dir,
            format: LibraryFormat::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            request_interval_ms: 600,
            parallel: 4,
            default_category: DEFAULT_CATEGORY.to_string(),
            model_paths: ModelPathStyle::default(),
        }
    }
}

impl Settings {
    /// `<config dir>/lcsc-grabber/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|b| b.config_dir().join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Loads `path` (which must exist) or the default settings file (which
    /// may not), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Invalid settings in {}: {}", path.display(), e)))?;
        log::debug!("Loaded settings from {}", path.display());
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(library) = lookup(ENV_LIBRARY).filter(|v| !v.is_empty()) {
            self.library_root = PathBuf::from(library);
        }
        if let Some(cache) = lookup(ENV_CACHE).filter(|v| !v.is_empty()) {
            self.cache_dir = PathBuf::from(cache);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention_days < 0 {
            return Err(AppError::Config("retention_days must not be negative".to_string()));
        }
        if self.parallel == 0 {
            return Err(AppError::Config("parallel must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"format": "v7", "parallel": 8}"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.format, LibraryFormat::V7);
        assert_eq!(settings.parallel, 8);
        assert_eq!(settings.retention_days, 7);
        assert_eq!(settings.default_category, "misc");
    }

    #[test]
    fn env_overrides_paths() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            ENV_LIBRARY => Some("/tmp/lib".to_string()),
            ENV_CACHE => Some(String::new()),
            _ => None,
        });
        assert_eq!(settings.library_root, PathBuf::from("/tmp/lib"));
        assert_eq!(settings.cache_dir, Settings::default().cache_dir);
    }

    #[test]
    fn rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"parallel": 0}"#).unwrap();
        assert!(matches!(Settings::from_file(&path), Err(AppError::Config(_))));
        assert!(Settings::from_file(&dir.path().join("missing.json")).is_err());
    }
}
