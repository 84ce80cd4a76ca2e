// Settings Engine
// Loads and saves `SyncSettings` as a JSON file.
// Missing files yield defaults; malformed files are reported, never silently replaced.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::errors::SettingsError;
use crate::types::settings::SyncSettings;

/// Environment variable naming the settings file when no path is given.
pub const CONFIG_ENV_VAR: &str = "LINKSHELF_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "linkshelf.json";

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<SyncSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &SyncSettings;
    fn update(&mut self, settings: SyncSettings) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &Path;
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: PathBuf,
    settings: SyncSettings,
}

impl SettingsEngine {
    /// Creates a new SettingsEngine.
    ///
    /// If `path_override` is `Some`, uses that path. Otherwise uses
    /// `$LINKSHELF_CONFIG`, falling back to `linkshelf.json` in the working directory.
    pub fn new(path_override: Option<PathBuf>) -> Self {
        let config_path = path_override
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Self {
            config_path,
            settings: SyncSettings::default(),
        }
    }

    fn validate(settings: &SyncSettings) -> Result<(), SettingsError> {
        if settings.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if settings.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file.
    ///
    /// If the file does not exist, returns default settings.
    fn load(&mut self) -> Result<SyncSettings, SettingsError> {
        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "no settings file, using defaults");
            self.settings = SyncSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| SettingsError::Io(format!("Failed to read config file: {}", e)))?;

        let settings: SyncSettings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::Serialization(format!("Failed to parse config file: {}", e))
        })?;
        Self::validate(&settings)?;

        self.settings = settings;
        Ok(self.settings.clone())
    }

    /// Saves the current settings, creating parent directories if needed.
    fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SettingsError::Io(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::Serialization(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(&self.config_path, json)
            .map_err(|e| SettingsError::Io(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Validates, replaces and persists the settings.
    fn update(&mut self, settings: SyncSettings) -> Result<(), SettingsError> {
        Self::validate(&settings)?;
        self.settings = settings;
        self.save()
    }

    fn get_config_path(&self) -> &Path {
        &self.config_path
    }
}
