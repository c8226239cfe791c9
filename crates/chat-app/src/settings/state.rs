use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use lexchat_llm::{DEFAULT_OPENAI_MODEL, ProviderConfig};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::{DEFAULT_REASONING_WINDOW, SessionOptions};

pub const DEFAULT_PROVIDER_ID: &str = "openai";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const SETTINGS_DIRECTORY_NAME: &str = "lexchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
/// Prefix for environment overrides, e.g. `LEXCHAT_API_KEY`.
pub const ENV_PREFIX: &str = "LEXCHAT_";

pub const DEFAULT_PREAMBLE: &str = "Eres un asistente jurídico. Razona primero en líneas de \
cita que empiecen por \"> \", separando cada paso con una línea \"> \" vacía. Después escribe \
la respuesta completa bajo el encabezado \"## ⚖️ Análisis Legal\".";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_preamble")]
    pub preamble: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    /// Reasoning paragraphs kept on screen while the model thinks.
    #[serde(default = "default_reasoning_window")]
    pub reasoning_window: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: default_model(),
            preamble: default_preamble(),
            temperature: None,
            max_tokens: None,
            reasoning_window: default_reasoning_window(),
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.provider_id = self.provider_id.trim().to_string();
        if self.provider_id.is_empty() {
            self.provider_id = default_provider_id();
        }
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.model = self.model.trim().to_string();
        if self.model.is_empty() {
            self.model = default_model();
        }
        self.preamble = self.preamble.trim().to_string();
        self.reasoning_window = self.reasoning_window.max(1);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Returns None when no API key is configured.
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if !self.is_valid() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.provider_id,
            &self.api_key,
            &self.endpoint,
            Some(self.model.as_str()),
        ))
    }

    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::new(self.model.clone());
        options.preamble = Some(self.preamble.clone()).filter(|preamble| !preamble.is_empty());
        options.temperature = self.temperature;
        options.max_tokens = self.max_tokens;
        options.reasoning_window = self.reasoning_window;
        options
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        if !settings.api_key.is_empty() {
            settings.api_key = "********".to_string();
        }
        settings
    }
}

/// Settings loaded from disk and environment, swappable at runtime.
pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".lexchat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_layers(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized = settings.normalized();
        self.persist(&normalized)?;
        self.settings.store(Arc::new(normalized));
        Ok(())
    }

    /// Defaults, then the JSON file if present, then `LEXCHAT_*` environment variables.
    fn load_layers(path: &Path) -> Settings {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults");
        }

        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = ?path,
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

fn default_reasoning_window() -> usize {
    DEFAULT_REASONING_WINDOW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("absent.json"));
        let settings = store.settings();
        assert_eq!(settings.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(settings.reasoning_window, DEFAULT_REASONING_WINDOW);
    }

    #[test]
    fn update_persists_normalized_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        let settings = Settings {
            api_key: "  sk-live  ".to_string(),
            model: " o3 ".to_string(),
            reasoning_window: 0,
            ..Settings::default()
        };
        store.update(settings).unwrap();

        assert_eq!(store.settings().api_key, "sk-live");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = SettingsStore::new(path);
        assert_eq!(reloaded.settings().model, "o3");
        assert_eq!(reloaded.settings().reasoning_window, 1);
    }

    #[test]
    fn partial_file_is_merged_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{ "model": "gpt-4.1", "reasoning_window": 4 }"#).unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.model, "gpt-4.1");
        assert_eq!(settings.reasoning_window, 4);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn session_options_follow_settings() {
        let settings = Settings {
            preamble: String::new(),
            temperature: Some(0.2),
            reasoning_window: 3,
            ..Settings::default()
        };
        let options = settings.session_options();
        assert_eq!(options.preamble, None);
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.reasoning_window, 3);
        assert!(settings.to_provider_config().is_none());
    }

    #[test]
    fn redaction_masks_only_present_keys() {
        let with_key = Settings {
            api_key: "sk-secret".to_string(),
            ..Settings::default()
        };
        assert_eq!(with_key.redacted().api_key, "********");
        assert!(Settings::default().redacted().api_key.is_empty());
    }
}
