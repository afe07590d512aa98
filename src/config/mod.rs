mod migrate;

pub use migrate::migrate_legacy_keys;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{AgentError, Result};

/// Per-agent configuration, read from `<agents_dir>/<name>/config.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AgentConfig {
    /// Model used for replies
    pub model: String,

    /// Base URL of the LLM server API
    #[serde(default, rename = "baseURL")]
    pub base_url: Option<String>,

    /// API key; may be omitted for local servers.
    /// `$VAR` / `${VAR}` are expanded from the environment.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Wire protocol of the backend
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model used for emotion scoring (defaults to `model`)
    #[serde(default)]
    pub emotion_model: Option<String>,

    #[serde(default)]
    pub agent_description: Option<DescriptionSource>,

    #[serde(default)]
    pub user_description: Option<DescriptionSource>,

    /// How much prior history goes into each request.
    /// One user/assistant pair counts as one record.
    #[serde(default)]
    pub history_limit: HistoryLimit,

    #[serde(default)]
    pub model_params: ModelParams,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions` (OpenAI, vLLM, LM Studio, llama.cpp server...)
    #[default]
    OpenAI,
    /// Ollama native `/api/chat`
    Ollama,
}

/// A persona description, either inline or stored next to the config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DescriptionSource {
    /// Path relative to the agent folder
    File { path: String },
    Text { content: String },
}

/// Window applied to stored history before each request.
///
/// `20` limits by turn count; `{"tokens": 4000}` limits by estimated size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryLimit {
    Turns(usize),
    Tokens { tokens: usize },
}

impl Default for HistoryLimit {
    fn default() -> Self {
        HistoryLimit::Turns(default_history_limit())
    }
}

/// Sampling parameters forwarded to the backend as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelParams {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

// Default value functions
fn default_history_limit() -> usize {
    20
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

impl AgentConfig {
    /// Load, migrate and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::parse(&content).map_err(|e| match e {
            AgentError::Config { message, .. } => AgentError::config(path, message),
            other => other,
        })?;
        config.expand_env_vars();
        debug!("Loaded agent config from {:?}", path);
        Ok(config)
    }

    /// Parse config JSON. Legacy keys are upgraded before typed parsing.
    pub fn parse(content: &str) -> Result<Self> {
        let mut value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| AgentError::config("", e.to_string()))?;

        let migrated = migrate_legacy_keys(&mut value);
        if !migrated.is_empty() {
            info!("Upgraded legacy config keys: {}", migrated.join(", "));
        }

        let config: AgentConfig =
            serde_json::from_value(value).map_err(|e| AgentError::config("", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(AgentError::config("", message));

        if self.model.trim().is_empty() {
            return invalid("model must not be empty".into());
        }
        if let Some(ref url) = self.base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return invalid(format!("baseURL must be an http(s) URL, got {:?}", url));
        }

        let params = &self.model_params;
        if !(0.0..=2.0).contains(&params.temperature) {
            return invalid(format!(
                "temperature must be between 0 and 2, got {}",
                params.temperature
            ));
        }
        if params.max_tokens == 0 {
            return invalid("max_tokens must be greater than 0".into());
        }
        if let Some(top_p) = params.top_p
            && !(0.0..=1.0).contains(&top_p)
        {
            return invalid(format!("top_p must be between 0 and 1, got {}", top_p));
        }
        for (name, value) in [
            ("frequency_penalty", params.frequency_penalty),
            ("presence_penalty", params.presence_penalty),
        ] {
            if let Some(v) = value
                && !(-2.0..=2.0).contains(&v)
            {
                return invalid(format!("{} must be between -2 and 2, got {}", name, v));
            }
        }

        Ok(())
    }

    /// Base URL with the provider default applied, without a trailing slash.
    pub fn base_url(&self) -> String {
        let url = match (&self.base_url, self.provider) {
            (Some(url), _) => url.clone(),
            (None, ProviderKind::OpenAI) => default_openai_base_url(),
            (None, ProviderKind::Ollama) => default_ollama_base_url(),
        };
        url.trim_end_matches('/').to_string()
    }

    pub fn emotion_model(&self) -> &str {
        self.emotion_model.as_deref().unwrap_or(&self.model)
    }

    fn expand_env_vars(&mut self) {
        if let Some(ref mut api_key) = self.api_key {
            *api_key = expand_env(api_key);
        }
    }
}

/// Resolve a persona description once, at agent construction.
///
/// File paths are relative to the agent folder. A missing file is fatal.
pub fn load_description(source: Option<&DescriptionSource>, agent_dir: &Path) -> Result<String> {
    match source {
        None => Ok(String::new()),
        Some(DescriptionSource::Text { content }) => Ok(content.trim().to_string()),
        Some(DescriptionSource::File { path }) => {
            let full_path = agent_dir.join(path);
            match fs::read_to_string(&full_path) {
                Ok(content) => Ok(content.trim().to_string()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(AgentError::DescriptionNotFound(full_path))
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}
