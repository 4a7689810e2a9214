//! Persistent front-end settings (JSON file in the data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use confab_core::conversation::store::default_data_dir;
use confab_core::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// API key; the `CONFAB_API_KEY` environment variable overrides this.
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub preferred_input_device: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            api_key: None,
            model: defaults.model,
            voice: defaults.voice,
            system_instruction: "You are a helpful voice and text assistant. \
                                 Keep spoken replies short and conversational."
                .into(),
            preferred_input_device: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = AppSettings::default();
        if self.model.trim().is_empty() {
            self.model = defaults.model;
        }
        if self.voice.trim().is_empty() {
            self.voice = defaults.voice;
        }
        self.api_key = self
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    /// Resolve into the engine configuration. Fails without an API key.
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let api_key = std::env::var("CONFAB_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no API key: set CONFAB_API_KEY or apiKey in the settings file"
                )
            })?;
        Ok(SessionConfig {
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_instruction: self.system_instruction.clone(),
            api_key,
            preferred_input_device: self.preferred_input_device.clone(),
            ..SessionConfig::default()
        })
    }
}

pub fn default_settings_path() -> PathBuf {
    default_data_dir().join("settings.json")
}

/// Load settings, writing a template on first run so the user has a file to
/// put their key into.
pub fn load_settings(path: &Path) -> AppSettings {
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<AppSettings>(&raw) {
            Ok(mut settings) => {
                settings.normalize();
                settings
            }
            Err(e) => {
                tracing::warn!("invalid settings file {path:?} ({e}); using defaults");
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let settings = AppSettings::default();
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Ok(raw) = serde_json::to_string_pretty(&settings) {
                if let Err(e) = fs::write(path, raw) {
                    tracing::warn!("could not write settings template: {e}");
                }
            }
            settings
        }
        Err(e) => {
            tracing::warn!("could not read settings file {path:?} ({e}); using defaults");
            AppSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_writes_a_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = load_settings(&path);
        assert!(path.exists());
        assert!(settings.api_key.is_none());
        assert!(!settings.model.is_empty());
    }

    #[test]
    fn blank_fields_normalize_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "apiKey": "  ", "model": "", "voice": "  ", "preferredInputDevice": "" }"#,
        )
        .unwrap();
        let settings = load_settings(&path);
        assert!(settings.api_key.is_none());
        assert_eq!(settings.model, AppSettings::default().model);
        assert_eq!(settings.voice, "Zephyr");
        assert!(settings.preferred_input_device.is_none());
    }

    #[test]
    fn session_config_requires_an_api_key() {
        let mut settings = AppSettings::default();
        if std::env::var("CONFAB_API_KEY").is_err() {
            assert!(settings.session_config().is_err());
        }
        settings.api_key = Some("k-123".into());
        let config = settings.session_config().unwrap();
        assert!(!config.api_key.is_empty());
        assert_eq!(config.voice, "Zephyr");
    }
}
