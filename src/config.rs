//! Deployment configuration: persona, generation parameters, endpoint, storage, server.
//!
//! Values are fixed for the lifetime of the process. `ChatConfig::from_env` reads the
//! `GEMINI_*` environment variables on top of the defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::errors::{ChatError, ChatResult};

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Environment variable overriding the endpoint base URL (e.g. a backend proxy).
pub const BASE_URL_ENV: &str = "GEMINI_CHAT_BASE_URL";
/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "GEMINI_CHAT_MODEL";
/// Environment variable selecting the completion provider (`gemini` or `mock`).
pub const PROVIDER_ENV: &str = "GEMINI_CHAT_PROVIDER";
/// Environment variable overriding the persona text; empty disables it.
pub const PERSONA_ENV: &str = "GEMINI_CHAT_PERSONA";
/// Environment variable overriding the `SQLite` database path.
pub const DB_ENV: &str = "GEMINI_CHAT_DB";
/// Environment variable overriding the HTTP port.
pub const PORT_ENV: &str = "GEMINI_CHAT_PORT";
/// Environment variable overriding the static asset directory.
pub const STATIC_DIR_ENV: &str = "GEMINI_CHAT_STATIC_DIR";

/// Default Gemini API host.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Default model.
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
/// Default persona prepended to every transcript.
const DEFAULT_PERSONA: &str = "You are a friendly and knowledgeable assistant. \
Answer clearly and concisely, and use Markdown (headings, lists, code blocks) when it \
makes the answer easier to read.";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Persona (system instruction) settings.
    pub persona: PersonaConfig,
    /// Sampling parameters sent with every request.
    pub generation: GenerationConfig,
    /// Remote endpoint settings.
    pub gemini: GeminiConfig,
    /// Durable slot settings.
    pub storage: StorageConfig,
    /// HTTP surface settings.
    pub server: ServerConfig,
}

impl ChatConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from defaults overridden by environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable holds an unparsable value.
    pub fn from_env() -> ChatResult<Self> {
        let mut config = Self::default();

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.gemini.api_key = Some(key.trim().to_string());
            }
        }
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.gemini.base_url = base_url;
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.gemini.model = model;
        }
        if let Ok(provider) = std::env::var(PROVIDER_ENV) {
            config.gemini.provider = provider.parse()?;
        }
        if let Ok(persona) = std::env::var(PERSONA_ENV) {
            config.persona.text = if persona.trim().is_empty() {
                None
            } else {
                Some(persona)
            };
        }
        if let Ok(path) = std::env::var(DB_ENV) {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            config.server.port = port
                .parse()
                .map_err(|_| ChatError::InvalidConfig(format!("{PORT_ENV} must be a port, got {port}")))?;
        }
        if let Ok(dir) = std::env::var(STATIC_DIR_ENV) {
            config.server.static_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        self.generation.validate()?;

        if self.gemini.model.trim().is_empty() {
            return Err(ChatError::InvalidConfig(
                "gemini.model must not be empty".to_string(),
            ));
        }

        Url::parse(&self.gemini.base_url)?;
        Ok(())
    }

    /// Replace the persona text; `None` disables it.
    #[must_use]
    pub fn with_persona(mut self, text: Option<String>) -> Self {
        self.persona.text = text;
        self
    }

    /// Replace the generation parameters.
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Set the endpoint base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.gemini.base_url = base_url.into();
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.gemini.api_key = Some(key.into());
        self
    }

    /// Select the completion provider.
    #[must_use]
    pub const fn with_provider(mut self, provider: Provider) -> Self {
        self.gemini.provider = provider;
        self
    }
}

/// Fixed preamble establishing the assistant's behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Persona text; `None` sends transcripts without a system instruction.
    pub text: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            text: Some(DEFAULT_PERSONA.to_string()),
        }
    }
}

/// Sampling parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of output tokens.
    pub max_output_tokens: u32,
    /// Nucleus sampling probability mass.
    pub top_p: f32,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Sequences that stop generation.
    pub stop_sequences: Vec<String>,
    /// Safety filters applied by the service.
    pub safety_settings: Vec<SafetySetting>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_output_tokens: 800,
            top_p: 0.8,
            top_k: 10,
            stop_sequences: vec!["Title".to_string()],
            safety_settings: vec![SafetySetting::default()],
        }
    }
}

impl GenerationConfig {
    /// Validate parameter ranges.
    ///
    /// # Errors
    /// Returns an error if a parameter is out of range.
    pub fn validate(&self) -> ChatResult<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::InvalidConfig(
                "generation.temperature must be within 0.0..=2.0".to_string(),
            ));
        }

        if self.max_output_tokens == 0 {
            return Err(ChatError::InvalidConfig(
                "generation.max_output_tokens must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ChatError::InvalidConfig(
                "generation.top_p must be within 0.0..=1.0".to_string(),
            ));
        }

        if self.top_k == 0 {
            return Err(ChatError::InvalidConfig(
                "generation.top_k must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// A harm category and the threshold at which the service blocks it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    /// Harm category, e.g. `HARM_CATEGORY_DANGEROUS_CONTENT`.
    pub category: String,
    /// Block threshold, e.g. `BLOCK_ONLY_HIGH`.
    pub threshold: String,
}

impl Default for SafetySetting {
    fn default() -> Self {
        Self {
            category: "HARM_CATEGORY_DANGEROUS_CONTENT".to_string(),
            threshold: "BLOCK_ONLY_HIGH".to_string(),
        }
    }
}

/// Which completion service backs the orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// In-process echo service, no network.
    Mock,
}

impl std::str::FromStr for Provider {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            other => Err(ChatError::InvalidConfig(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// Remote endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Completion provider.
    pub provider: Provider,
    /// Base URL of the API or of a trusted proxy in front of it.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// API key, kept server-side; a proxy may inject it instead.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Durable slot settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("gemini_chat.sqlite3"),
        }
    }
}

/// HTTP surface settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Directory served for non-API paths.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::server::DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.generation.max_output_tokens, 800);
        assert_eq!(config.generation.top_k, 10);
        assert_eq!(config.generation.stop_sequences, vec!["Title".to_string()]);
        assert_eq!(config.generation.safety_settings[0].threshold, "BLOCK_ONLY_HIGH");
        assert!(config.persona.text.is_some());
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ChatConfig::new()
            .with_persona(None)
            .with_base_url("http://127.0.0.1:8080")
            .with_api_key("test-key")
            .with_provider(Provider::Mock);

        assert!(config.persona.text.is_none());
        assert_eq!(config.gemini.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.gemini.api_key, Some("test-key".to_string()));
        assert_eq!(config.gemini.provider, Provider::Mock);
    }

    #[test]
    fn test_invalid_generation_rejected() {
        let generation = GenerationConfig {
            top_p: 1.5,
            ..GenerationConfig::default()
        };
        let config = ChatConfig::new().with_generation(generation);
        assert!(matches!(config.validate(), Err(ChatError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ChatConfig::new().with_base_url("not a url");
        assert!(matches!(config.validate(), Err(ChatError::Url(_))));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("Mock".parse::<Provider>().unwrap(), Provider::Mock);
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("openai".parse::<Provider>().is_err());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let config = ChatConfig::new().with_api_key("secret-value");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret-value"));
    }
}
