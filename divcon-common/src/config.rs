//! Configuration for the DivCon pipeline.
//!
//! Configuration is read from a JSON file (explicit `--config` path, or
//! `divcon.json` in the working directory when present), then environment
//! overrides are applied. Every field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "divcon.json";

// ============================================================================
// Oracle Configuration
// ============================================================================

/// Settings for the text oracle (LLM provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Provider name (currently "openai", any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (falls back to `OPENAI_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Reasoning effort for discovery, classification and scoring
    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,

    /// Reasoning effort for anchor generation
    #[serde(default = "default_anchor_reasoning_effort")]
    pub anchor_reasoning_effort: String,

    /// Sampling temperature. Reasoning models reject it, so it is unset by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// HTTP timeout per oracle call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            reasoning_effort: default_reasoning_effort(),
            anchor_reasoning_effort: default_anchor_reasoning_effort(),
            temperature: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// How a parallel stage reacts to a failed work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run on the first observed failure, cancelling siblings.
    #[default]
    FailFast,
    /// Drain every item, report failures and treat their batches as coverage gaps.
    #[serde(alias = "continue_and_report")]
    Continue,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(Self::FailFast),
            "continue" | "continue_and_report" => Ok(Self::Continue),
            other => Err(format!("unknown failure policy '{other}'")),
        }
    }
}

/// Sample sizes, batch sizes and concurrency bounds for the four stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Opinions shown to the oracle for topic discovery
    #[serde(default = "default_sample_size")]
    pub topic_sample_size: usize,

    /// Topic opinions shown to the oracle for axis discovery
    #[serde(default = "default_sample_size")]
    pub axis_sample_size: usize,

    /// Topic opinions shown to the oracle as anchor reference
    #[serde(default = "default_sample_size")]
    pub anchor_sample_size: usize,

    /// Opinions per classification call
    #[serde(default = "default_classify_batch_size")]
    pub classify_batch_size: usize,

    /// Opinions per scoring call
    #[serde(default = "default_score_batch_size")]
    pub score_batch_size: usize,

    /// Concurrency bound for classification, axis discovery and axis tasks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Concurrency bound for the scoring pool inside each axis task
    #[serde(default = "default_workers")]
    pub score_workers: usize,

    /// Seed for sampling; unseeded runs draw from OS entropy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Reaction to a failed classification/scoring batch
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic_sample_size: default_sample_size(),
            axis_sample_size: default_sample_size(),
            anchor_sample_size: default_sample_size(),
            classify_batch_size: default_classify_batch_size(),
            score_batch_size: default_score_batch_size(),
            workers: default_workers(),
            score_workers: default_workers(),
            seed: None,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Upper bound on oracle calls in flight during anchor generation and scoring.
    pub fn max_in_flight_calls(&self) -> usize {
        self.workers.saturating_mul(self.score_workers)
    }
}

// ============================================================================
// Input / Output Configuration
// ============================================================================

/// Where opinions are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// CSV file with at least `id` and `comment` columns
    #[serde(default = "default_opinions_path")]
    pub opinions_path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            opinions_path: default_opinions_path(),
        }
    }
}

/// Where results are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving topics.json, axes.json, anchors.json, scores.csv, summary.txt
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level"
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format"
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `divcon.json` in the working
    /// directory is used when present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let expanded = expand_path(path);
                if !expanded.exists() {
                    return Err(Error::NotFound(format!(
                        "config file {}",
                        expanded.display()
                    )));
                }
                Self::load_from(&expanded)
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    tracing::debug!("Config file not found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        Self::from_json(&content).context(format!("Failed to parse config from {}", path.display()))
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(content)?;
        config.input.opinions_path = expand_path(&config.input.opinions_path);
        config.output.dir = expand_path(&config.output.dir);
        Ok(config)
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Plain OPENAI_* names are honoured as fallbacks
        if let Some(key) = lookup("DIVCON_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            if !key.is_empty() {
                self.oracle.api_key = Some(key);
            }
        }
        if let Some(url) = lookup("DIVCON_BASE_URL").or_else(|| lookup("OPENAI_BASE_URL")) {
            self.oracle.base_url = url;
        }
        if let Some(model) = lookup("DIVCON_MODEL").or_else(|| lookup("OPENAI_MODEL")) {
            self.oracle.model = model;
        }
        if let Some(effort) = lookup("REASONING_EFFORT") {
            self.oracle.reasoning_effort = effort;
        }

        if let Some(seed) = parse_override(&lookup, "DIVCON_SEED") {
            self.pipeline.seed = Some(seed);
        }
        if let Some(workers) = parse_override(&lookup, "DIVCON_WORKERS") {
            self.pipeline.workers = workers;
        }
        if let Some(workers) = parse_override(&lookup, "DIVCON_SCORE_WORKERS") {
            self.pipeline.score_workers = workers;
        }
        if let Some(policy) = parse_override(&lookup, "DIVCON_FAILURE_POLICY") {
            self.pipeline.failure_policy = policy;
        }

        if let Some(path) = lookup("DIVCON_INPUT") {
            self.input.opinions_path = expand_path(Path::new(&path));
        }
        if let Some(dir) = lookup("DIVCON_OUTPUT_DIR") {
            self.output.dir = expand_path(Path::new(&dir));
        }

        if let Some(level) = lookup("DIVCON_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("DIVCON_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Copy of the configuration that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.oracle.api_key = copy
            .oracle
            .api_key
            .as_deref()
            .map(crate::util::redact_secret);
        copy
    }
}

/// Parse an override value; unparseable values are logged and ignored.
fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid override");
            None
        }
    }
}

/// Expand `~` and environment variables in a configured path.
fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_provider() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_model() -> String {
    "gpt-5-mini".into()
}
fn default_reasoning_effort() -> String {
    "medium".into()
}
fn default_anchor_reasoning_effort() -> String {
    "high".into()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_sample_size() -> usize {
    500
}
fn default_classify_batch_size() -> usize {
    10
}
fn default_score_batch_size() -> usize {
    20
}
fn default_workers() -> usize {
    10
}
fn default_opinions_path() -> PathBuf {
    PathBuf::from("data/opinions.csv")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
