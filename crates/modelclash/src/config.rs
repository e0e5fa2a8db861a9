//! Runtime configuration for the `modelclash` binary.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Command-line flags ([`Overrides`])
//! 2. Environment variables (`MODELCLASH_ROUNDS`, `MODELCLASH_MAX_IN_FLIGHT`,
//!    `MODELCLASH_PYTHON`, `MODELCLASH_AUDIT_LOG`)
//! 3. Values from the TOML file passed with `--config`
//! 4. Built-in defaults (eleven OpenRouter models, 50 rounds per pairing)
//!
//! ## Example file
//!
//! ```toml
//! models = ["openai/gpt-4o", "anthropic/claude-3.5-sonnet"]
//! audit_log = "logs/audit.jsonl"
//!
//! [tournament]
//! rounds_per_pair = 10
//! max_in_flight = 4
//! scoring = "symmetric"
//!
//! [provider]
//! base_url = "https://openrouter.ai/api/v1"
//! rate_limit = 60
//!
//! [[routes]]
//! prefix = "anthropic"
//! api = "anthropic"
//! base_url = "https://api.anthropic.com/v1"
//! api_key_env = "ANTHROPIC_API_KEY"
//! strip_prefix = true
//! ```

use std::path::{Path, PathBuf};

use arena::{ReportView, ScoringPolicy, SortKey, TournamentConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default hosted endpoint; serves every vendor's models behind one key.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";

const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RATE_LIMIT: usize = 60;
const DEFAULT_RATE_PERIOD_SECS: u64 = 60;
const DEFAULT_PYTHON: &str = "python3";
const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 10;

pub const ENV_ROUNDS: &str = "MODELCLASH_ROUNDS";
pub const ENV_MAX_IN_FLIGHT: &str = "MODELCLASH_MAX_IN_FLIGHT";
pub const ENV_PYTHON: &str = "MODELCLASH_PYTHON";
pub const ENV_AUDIT_LOG: &str = "MODELCLASH_AUDIT_LOG";

/// Models fielded when neither the file nor the command line names any.
pub const DEFAULT_MODELS: [&str; 11] = [
    "google/gemini-pro-1.5",
    "anthropic/claude-3-opus",
    "anthropic/claude-3.5-sonnet",
    "openai/gpt-3.5-turbo",
    "openai/gpt-4-turbo",
    "openai/gpt-4o",
    "openai/gpt-4o-mini",
    "meta-llama/llama-3.1-8b-instruct",
    "meta-llama/llama-3.1-70b-instruct",
    "meta-llama/llama-3.1-405b-instruct",
    "mistralai/mistral-large",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value `{value}` for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Provider routes ──────────────────────────────────────────────────

/// Wire format spoken by a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// `POST {base_url}/chat/completions` (OpenRouter, OpenAI, vLLM, ...).
    #[default]
    OpenAiCompatible,
    /// `POST {base_url}/messages` with `x-api-key`.
    Anthropic,
}

/// One provider endpoint. The default route has no prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Vendor prefix this route serves (`anthropic` matches `anthropic/...`).
    pub prefix: Option<String>,
    pub api: ApiKind,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Requests allowed per `rate_period_secs`; `None` disables throttling.
    pub rate_limit: Option<usize>,
    pub rate_period_secs: u64,
    /// Send `gpt-4o` instead of `openai/gpt-4o`; needed for direct vendor APIs.
    pub strip_prefix: bool,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            api: ApiKind::OpenAiCompatible,
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key_env: OPENROUTER_KEY_ENV.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rate_limit: Some(DEFAULT_RATE_LIMIT),
            rate_period_secs: DEFAULT_RATE_PERIOD_SECS,
            strip_prefix: false,
        }
    }
}

impl RouteConfig {
    /// Name used in logs and the health report.
    pub fn label(&self) -> String {
        match &self.prefix {
            Some(prefix) => prefix.clone(),
            None if self.base_url == OPENROUTER_BASE_URL => "openrouter".to_string(),
            None => "default".to_string(),
        }
    }
}

// ── Sandbox ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter used to run candidates.
    pub python: String,
    /// Wall-clock limit per verification; exceeding it is a fail.
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: DEFAULT_PYTHON.to_string(),
            timeout_secs: DEFAULT_SANDBOX_TIMEOUT_SECS,
        }
    }
}

// ── Top level ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClashConfig {
    pub models: Vec<String>,
    pub tournament: TournamentConfig,
    /// Fallback route for any model without a prefix route.
    pub provider: RouteConfig,
    pub routes: Vec<RouteConfig>,
    pub sandbox: SandboxConfig,
    pub audit_log: Option<PathBuf>,
}

impl Default for ClashConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            tournament: TournamentConfig::default(),
            provider: RouteConfig::default(),
            routes: Vec::new(),
            sandbox: SandboxConfig::default(),
            audit_log: None,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layer in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub models: Option<Vec<String>>,
    pub rounds: Option<u32>,
    pub max_in_flight: Option<usize>,
    pub unbounded: bool,
    pub scoring: Option<ScoringPolicy>,
    pub view: Option<ReportView>,
    pub sort: Option<SortKey>,
    pub audit_log: Option<PathBuf>,
    pub python: Option<String>,
}

impl ClashConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `MODELCLASH_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply environment overrides using `lookup` in place of `std::env::var`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_ROUNDS) {
            self.tournament.rounds_per_pair =
                value.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidEnv {
                        var: ENV_ROUNDS,
                        value: value.clone(),
                        reason: e.to_string(),
                    }
                })?;
        }
        if let Some(value) = lookup(ENV_MAX_IN_FLIGHT) {
            self.tournament.max_in_flight = parse_max_in_flight(&value)?;
        }
        if let Some(value) = lookup(ENV_PYTHON).filter(|v| !v.trim().is_empty()) {
            self.sandbox.python = value;
        }
        if let Some(value) = lookup(ENV_AUDIT_LOG).filter(|v| !v.trim().is_empty()) {
            self.audit_log = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(models) = overrides.models.filter(|m| !m.is_empty()) {
            self.models = models;
        }
        if let Some(rounds) = overrides.rounds {
            self.tournament.rounds_per_pair = rounds;
        }
        if overrides.unbounded {
            self.tournament.max_in_flight = None;
        } else if let Some(n) = overrides.max_in_flight {
            self.tournament.max_in_flight = Some(n);
        }
        if let Some(scoring) = overrides.scoring {
            self.tournament.scoring = scoring;
        }
        if let Some(view) = overrides.view {
            self.tournament.view = view;
        }
        if let Some(sort) = overrides.sort {
            self.tournament.sort = sort;
        }
        if let Some(path) = overrides.audit_log {
            self.audit_log = Some(path);
        }
        if let Some(python) = overrides.python {
            self.sandbox.python = python;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tournament
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("no models configured".into()));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.timeout_secs must be at least 1".into(),
            ));
        }
        for route in std::iter::once(&self.provider).chain(&self.routes) {
            if route.rate_limit == Some(0) || route.rate_period_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "route `{}` has an empty rate window",
                    route.label()
                )));
            }
        }
        if let Some(route) = self.routes.iter().find(|r| r.prefix.is_none()) {
            return Err(ConfigError::Invalid(format!(
                "extra route for {} needs a `prefix`",
                route.base_url
            )));
        }
        Ok(())
    }
}

/// `unbounded`/`none` lift the limit; anything else must be a positive integer.
fn parse_max_in_flight(value: &str) -> Result<Option<usize>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("unbounded") || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match trimmed.parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidEnv {
            var: ENV_MAX_IN_FLIGHT,
            value: value.to_string(),
            reason: "must be at least 1".into(),
        }),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(ConfigError::InvalidEnv {
            var: ENV_MAX_IN_FLIGHT,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}
