use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::impact::CollisionPolicy;
use crate::sampler::ProcessSource;
use crate::theme::ThemeChoice;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub theme: ThemeChoice,
    /// Seconds between process samples.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Backend used to read the process table.
    #[serde(default)]
    pub process_source: ProcessSource,
    /// How processes sharing a name are combined when ranking entries.
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

const REFRESH_OPTIONS: &[u64] = &[1, 2, 3, 5, 10];
fn default_refresh_interval() -> u64 { 3 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: ThemeChoice::Dark,
            refresh_interval_secs: default_refresh_interval(),
            process_source: ProcessSource::default(),
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl Settings {
    fn sanitize(&mut self) {
        if !REFRESH_OPTIONS.contains(&self.refresh_interval_secs) {
            self.refresh_interval_secs = default_refresh_interval();
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write settings to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Owns the settings file and the current theme. There is one per process,
/// held by the application state.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// Linux → ~/.config/simplytoast/settings.json
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("simplytoast")
            .join("settings.json")
    }

    pub fn open_default() -> Self {
        Self::open(Self::default_path())
    }

    /// Load `path`; a missing or corrupt file is replaced with defaults.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
                Ok(mut settings) => {
                    settings.sanitize();
                    Some(settings)
                }
                Err(e) => {
                    warn!("invalid settings file {}, resetting: {e}", path.display());
                    None
                }
            },
            Err(_) => None,
        };

        let store = Self {
            path,
            settings: loaded.clone().unwrap_or_default(),
        };
        if loaded.is_none() {
            if let Err(e) = store.save() {
                warn!("{e}");
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn theme(&self) -> ThemeChoice {
        self.settings.theme
    }

    /// Make `theme` the current theme and persist it. The in-memory state
    /// changes even when the write fails.
    pub fn apply(&mut self, theme: ThemeChoice) -> Result<(), SettingsError> {
        self.settings.theme = theme;
        info!("theme set to {}", theme.name());
        self.save()
    }

    /// light → mid → dark → light.
    pub fn cycle_theme(&mut self) -> Result<ThemeChoice, SettingsError> {
        let next = self.settings.theme.next();
        self.apply(next)?;
        Ok(next)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
            // Set restrictive permissions on config directory (Unix only)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
            }
        }

        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, json).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> Settings {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.theme, ThemeChoice::Dark);
        assert_eq!(settings.refresh_interval_secs, 3);
        assert_eq!(settings.process_source, ProcessSource::Ps);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simplytoast").join("settings.json");
        let store = ConfigStore::open(&path);
        assert_eq!(store.theme(), ThemeChoice::Dark);
        assert_eq!(read(&path), Settings::default());
    }

    #[test]
    fn test_corrupt_file_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let store = ConfigStore::open(&path);
        assert_eq!(store.theme(), ThemeChoice::Dark);
        let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["theme"], "dark");
    }

    #[test]
    fn test_unknown_theme_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"theme":"neon"}"#).unwrap();
        assert_eq!(ConfigStore::open(&path).theme(), ThemeChoice::Dark);
    }

    #[test]
    fn test_backwards_compat_theme_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"theme": "light"}"#).unwrap();
        let store = ConfigStore::open(&path);
        assert_eq!(store.theme(), ThemeChoice::Light);
        assert_eq!(store.settings().refresh_interval_secs, 3);
        // A valid file is left as the user wrote it.
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"theme": "light"}"#);
    }

    #[test]
    fn test_refresh_interval_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"theme":"mid","refresh_interval_secs":0,"process_source":"sysinfo"}"#).unwrap();
        let store = ConfigStore::open(&path);
        assert_eq!(store.theme(), ThemeChoice::Mid);
        assert_eq!(store.settings().refresh_interval_secs, 3);
        assert_eq!(store.settings().process_source, ProcessSource::Sysinfo);
    }

    #[test]
    fn test_collision_policy_setting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"theme":"dark","collision_policy":"overwrite"}"#).unwrap();
        let store = ConfigStore::open(&path);
        assert_eq!(store.settings().collision_policy, CollisionPolicy::Overwrite);
        assert_eq!(Settings::default().collision_policy, CollisionPolicy::Sum);
    }

    #[test]
    fn test_cycle_theme_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = ConfigStore::open(&path);
        assert_eq!(store.cycle_theme().unwrap(), ThemeChoice::Light);
        assert_eq!(store.cycle_theme().unwrap(), ThemeChoice::Mid);
        assert_eq!(read(&path).theme, ThemeChoice::Mid);
        assert_eq!(ConfigStore::open(&path).theme(), ThemeChoice::Mid);
    }

    #[test]
    fn test_apply_replaces_theme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = ConfigStore::open(&path);
        store.apply(ThemeChoice::Light).unwrap();
        store.apply(ThemeChoice::Dark).unwrap();
        assert_eq!(store.theme(), ThemeChoice::Dark);
        assert_eq!(read(&path).theme, ThemeChoice::Dark);
    }
}
