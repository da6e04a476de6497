//! Application configuration read from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::AgentConfig;
use crate::llm::{LLMClient, LLMClientBuilder, LLMError};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_DB: &str = "customers.db";
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error(transparent)]
    Client(#[from] LLMError),
}

/// Which model backend to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Gemini,
    Openai,
}

impl Provider {
    /// The environment variable holding this provider's key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Openai => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::Openai),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Gemini => "gemini",
            Provider::Openai => "openai",
        })
    }
}

/// Settings for the binary and the web server.
#[derive(Clone, PartialEq)]
pub struct AppConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub db_path: PathBuf,
    pub max_steps: Option<usize>,
    /// Per-request timeout for model calls
    pub model_timeout: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("db_path", &self.db_path)
            .field("max_steps", &self.max_steps)
            .field("model_timeout", &self.model_timeout)
            .finish()
    }
}

impl AppConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("SQL_AGENT_PROVIDER") {
            Some(value) => value.parse::<Provider>().map_err(|_| ConfigError::InvalidValue {
                key: "SQL_AGENT_PROVIDER",
                value,
            })?,
            None => Provider::default(),
        };

        // 0 disables the cap.
        let max_steps = match get("SQL_AGENT_MAX_STEPS") {
            Some(value) => match value.parse::<usize>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "SQL_AGENT_MAX_STEPS",
                        value,
                    });
                }
            },
            None => AgentConfig::default().max_steps,
        };

        let model_timeout = match get("SQL_AGENT_MODEL_TIMEOUT") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SQL_AGENT_MODEL_TIMEOUT",
                        value,
                    });
                }
            },
            None => DEFAULT_MODEL_TIMEOUT,
        };

        let base_url = match provider {
            Provider::Openai => get("OPENAI_API_BASE_URL"),
            Provider::Gemini => None,
        };

        Ok(Self {
            provider,
            api_key: get(provider.api_key_var()),
            base_url,
            model: get("SQL_AGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            db_path: get("SQL_AGENT_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB)),
            max_steps,
            model_timeout,
        })
    }

    /// Builds the model client for the configured provider.
    pub fn llm_client(&self) -> Result<Arc<dyn LLMClient>, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or(ConfigError::MissingApiKey(self.provider.api_key_var()))?;

        let mut builder = LLMClientBuilder::new()
            .with_api_key(api_key)
            .with_timeout(self.model_timeout);
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url.clone());
        }

        let client = match self.provider {
            Provider::Gemini => builder.build_gemini()?,
            Provider::Openai => builder.build_openai()?,
        };
        Ok(client)
    }

    /// Agent settings derived from this configuration.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.model.clone(),
            max_steps: self.max_steps,
            ..AgentConfig::default()
        }
    }
}
