use crate::error::ConfigError;
use crate::llm::retry::{
    default_fatal_patterns, default_recoverable_patterns, default_recoverable_statuses,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Backend tried first when a request names none.
    #[serde(default)]
    pub default_backend: Option<String>,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            default_backend: None,
            generation: GenerationConfig::default(),
            reliability: ReliabilityConfig::default(),
            context: ContextConfig::default(),
            backends: default_backends(),
        }
    }
}

// ── Generation ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

// ── Reliability ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Total tries per backend before falling back.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
    #[serde(default = "default_recoverable_statuses")]
    pub recoverable_statuses: Vec<u16>,
    #[serde(default = "default_recoverable_patterns")]
    pub recoverable_patterns: Vec<String>,
    #[serde(default = "default_fatal_patterns")]
    pub fatal_patterns: Vec<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            attempt_timeout_secs: None,
            recoverable_statuses: default_recoverable_statuses(),
            recoverable_patterns: default_recoverable_patterns(),
            fatal_patterns: default_fatal_patterns(),
        }
    }
}

// ── Context ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Character budget for the assembled prompt. Unset means unbounded.
    #[serde(default)]
    pub max_chars: Option<usize>,
}

// ── Backends ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::OpenAiCompatible => "openai-compatible",
        }
    }

    /// Environment variables checked for a credential, in order.
    pub fn default_credential_env(self) -> Vec<String> {
        let keys: &[&str] = match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::OpenAiCompatible => &[],
        };
        keys.iter().map(|k| (*k).to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    pub kind: BackendKind,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: i32,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Credential variables; unset uses the kind's defaults, an empty list
    /// means the backend needs no credential.
    #[serde(default)]
    pub credential_env: Option<Vec<String>>,
    #[serde(default)]
    pub supports_system_role: Option<bool>,
    #[serde(default)]
    pub supports_json_mode: Option<bool>,
}

impl BackendConfig {
    pub fn new(id: &str, kind: BackendKind, priority: i32, model: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            priority,
            model: model.to_string(),
            base_url: None,
            credential_env: None,
            supports_system_role: None,
            supports_json_mode: None,
        }
    }

    pub fn credential_keys(&self) -> Vec<String> {
        self.credential_env
            .clone()
            .unwrap_or_else(|| self.kind.default_credential_env())
    }
}

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::new("openai", BackendKind::OpenAi, 0, DEFAULT_OPENAI_MODEL),
        BackendConfig::new("anthropic", BackendKind::Anthropic, 1, DEFAULT_ANTHROPIC_MODEL),
        BackendConfig::new("gemini", BackendKind::Gemini, 2, DEFAULT_GEMINI_MODEL),
    ]
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Validation(format!(
                "generation.temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "generation.max_tokens must be greater than 0".into(),
            ));
        }
        if self.reliability.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "reliability.max_attempts must be at least 1".into(),
            ));
        }
        if self.reliability.max_backoff_ms < self.reliability.base_backoff_ms {
            return Err(ConfigError::Validation(
                "reliability.max_backoff_ms must not be below base_backoff_ms".into(),
            ));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            let id = backend.id.trim().to_ascii_lowercase();
            if id.is_empty() {
                return Err(ConfigError::Validation("backend id must not be empty".into()));
            }
            if !seen.insert(id.clone()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate backend id: {id}"
                )));
            }
            if backend.model.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "backend {id}: model must not be empty"
                )));
            }
            if backend.kind == BackendKind::OpenAiCompatible
                && backend.base_url.as_deref().is_none_or(|u| u.trim().is_empty())
            {
                return Err(ConfigError::Validation(format!(
                    "backend {id}: openai-compatible backends need a base_url"
                )));
            }
        }

        if let Some(default) = &self.default_backend
            && !seen.contains(&default.trim().to_ascii_lowercase())
        {
            return Err(ConfigError::Validation(format!(
                "default_backend {default} is not a configured backend"
            )));
        }
        Ok(())
    }
}
