//! Agent configuration loaded from the environment.
//!
//! Values come from process environment variables, optionally seeded from a
//! `.env` file by the binary. CLI flags override individual fields after
//! loading.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use incident_memory::{
    Embedder, HashingEmbedder, HttpEmbedder, StoreConfig, DEFAULT_COLLECTION, DEFAULT_PERSIST_DIR,
};
use thiserror::Error;

use crate::agent::DriverSettings;
use crate::engine::StepLimits;

/// Default chat model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-preview";

/// Default chat-completions base URL.
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default namespace for pod-scoped lookups.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default seconds between monitoring cycles.
pub const DEFAULT_MONITORING_INTERVAL_SECS: u64 = 300;

/// Default embedding model name for remote endpoints.
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default request timeout for the chat API.
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 60;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    /// A setting is present but unusable
    #[error("invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Complete agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// API key for the chat-completions endpoint
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_base: String,
    /// Request timeout for chat completions
    pub engine_timeout: Duration,
    /// kubeconfig context; `None` uses the current context
    pub kubernetes_context: Option<String>,
    pub kubernetes_namespace: String,
    pub monitoring_interval: Duration,
    pub max_steps: usize,
    pub planning_interval: usize,
    /// Upper bound for a whole cycle
    pub cycle_timeout: Option<Duration>,
    pub store_dir: PathBuf,
    pub collection: String,
    pub embedding_model: String,
    /// OpenAI-compatible embeddings endpoint; `None` selects local hashing
    pub embedding_api_url: Option<String>,
    pub embedding_api_key: Option<String>,
    /// Drop the `kubectl_exec` tool
    pub read_only: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            engine_timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            kubernetes_context: None,
            kubernetes_namespace: DEFAULT_NAMESPACE.to_string(),
            monitoring_interval: Duration::from_secs(DEFAULT_MONITORING_INTERVAL_SECS),
            max_steps: StepLimits::default().max_steps,
            planning_interval: StepLimits::default().planning_interval,
            cycle_timeout: None,
            store_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            collection: DEFAULT_COLLECTION.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_api_url: None,
            embedding_api_key: None,
            read_only: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Environment Variables
    /// - `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_API_BASE`, `OPENAI_TIMEOUT`
    /// - `KUBERNETES_CONTEXT`, `KUBERNETES_NAMESPACE`
    /// - `MONITORING_INTERVAL`, `MAX_STEPS`, `PLANNING_INTERVAL`, `CYCLE_TIMEOUT`
    /// - `INCIDENT_STORE_DIR` (or legacy `CHROMA_PERSIST_DIR`), `INCIDENT_COLLECTION`
    /// - `EMBEDDING_MODEL`, `EMBEDDING_API_URL`, `EMBEDDING_API_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let monitoring_interval = match get("MONITORING_INTERVAL") {
            Some(raw) => Duration::from_secs(parse_positive("MONITORING_INTERVAL", &raw)?),
            None => defaults.monitoring_interval,
        };

        let engine_timeout = match get("OPENAI_TIMEOUT") {
            Some(raw) => Duration::from_secs(parse_positive("OPENAI_TIMEOUT", &raw)?),
            None => defaults.engine_timeout,
        };

        let max_steps = match get("MAX_STEPS") {
            Some(raw) => usize::try_from(parse_positive("MAX_STEPS", &raw)?).unwrap_or(usize::MAX),
            None => defaults.max_steps,
        };

        let planning_interval = match get("PLANNING_INTERVAL") {
            Some(raw) => {
                usize::try_from(parse_positive("PLANNING_INTERVAL", &raw)?).unwrap_or(usize::MAX)
            }
            None => defaults.planning_interval,
        };

        let cycle_timeout = get("CYCLE_TIMEOUT")
            .map(|raw| parse_positive("CYCLE_TIMEOUT", &raw).map(Duration::from_secs))
            .transpose()?;

        let store_dir = get("INCIDENT_STORE_DIR")
            .or_else(|| get("CHROMA_PERSIST_DIR"))
            .map_or(defaults.store_dir, PathBuf::from);

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_api_base: get("OPENAI_API_BASE").unwrap_or(defaults.openai_api_base),
            engine_timeout,
            kubernetes_context: get("KUBERNETES_CONTEXT"),
            kubernetes_namespace: get("KUBERNETES_NAMESPACE")
                .unwrap_or(defaults.kubernetes_namespace),
            monitoring_interval,
            max_steps,
            planning_interval,
            cycle_timeout,
            store_dir,
            collection: get("INCIDENT_COLLECTION").unwrap_or(defaults.collection),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_api_url: get("EMBEDDING_API_URL"),
            embedding_api_key: get("EMBEDDING_API_KEY"),
            read_only: false,
        })
    }

    /// API key required to run the agent.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    pub fn step_limits(&self) -> StepLimits {
        StepLimits {
            max_steps: self.max_steps,
            planning_interval: self.planning_interval,
        }
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            monitoring_interval: self.monitoring_interval,
            limits: self.step_limits(),
            cycle_timeout: self.cycle_timeout,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.store_dir).with_collection(&self.collection)
    }

    /// Embedder matching the configuration.
    ///
    /// A remote endpoint falls back to the chat API key when no dedicated
    /// embedding key is set.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        match &self.embedding_api_url {
            Some(url) => {
                let mut embedder = HttpEmbedder::new(url, &self.embedding_model);
                if let Some(key) = self
                    .embedding_api_key
                    .as_ref()
                    .or(self.openai_api_key.as_ref())
                {
                    embedder = embedder.with_api_key(key);
                }
                Arc::new(embedder)
            }
            None => Arc::new(HashingEmbedder::default()),
        }
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}
