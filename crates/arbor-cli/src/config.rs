use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use arbor_llm::config::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use arbor_llm::{ChatOptions, OpenAIConfig};
use arbor_persist::JsonFileBackend;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(skip)]
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Prepended as a system message to every request
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: None,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Chat history file; the platform data directory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (ENV defaults to `dev`)
    /// 3. ARBOR_<SECTION>__<KEY> environment variables
    /// 4. OPENAI_BASE_URL / OPENAI_MODEL
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("ARBOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: Config = builder.build()?.try_deserialize()?;
        cfg.apply_env(|key| std::env::var(key).ok());

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Provider settings that only come from the environment
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        self.openai_api_key = non_blank("OPENAI_API_KEY");
        if let Some(base_url) = non_blank("OPENAI_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(model) = non_blank("OPENAI_MODEL") {
            self.llm.model = model;
        }
    }

    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.llm.base_url.clone(),
        }
    }

    pub fn chat_options(&self) -> ChatOptions {
        let mut options = ChatOptions::new();
        if let Some(temperature) = self.llm.temperature {
            options = options.temperature(temperature);
        }
        options
    }

    pub fn storage_path(&self) -> arbor_persist::Result<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => JsonFileBackend::default_path(),
        }
    }
}
