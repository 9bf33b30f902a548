//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use depoline_core::{RateLimitConfig, RetryPolicy};
use depoline_matching::MatchingConfig;
use serde::Deserialize;

/// Global configuration for depoline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub workers: WorkersConfig,
    pub zenodo: ZenodoConfig,
    pub rate_limit: RateLimitSection,
    pub retry: RetrySection,
    pub matching: MatchingConfig,
    pub registries: RegistriesConfig,
    pub pipeline: PipelineSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

/// Upload workers. The rate limiter caps throughput regardless.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { default: 1, max: 4 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZenodoConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub community: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub publisher_note: Option<String>,
    /// Whole-request timeout in seconds
    pub request_timeout: u64,
}

impl Default for ZenodoConfig {
    fn default() -> Self {
        Self {
            community: None,
            publisher_note: None,
            request_timeout: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub per_minute: usize,
    pub per_hour: usize,
    pub min_interval_ms: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let d = RateLimitConfig::default();
        Self {
            per_minute: d.per_minute,
            per_hour: d.per_hour,
            min_interval_ms: d.min_interval.as_millis() as u64,
        }
    }
}

impl RateLimitSection {
    pub fn to_config(self) -> RateLimitConfig {
        RateLimitConfig {
            per_minute: self.per_minute,
            per_hour: self.per_hour,
            min_interval: Duration::from_millis(self.min_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_secs: u64,
    pub max_rate_limit_waits: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        let d = RetryPolicy::default();
        Self {
            max_retries: d.max_retries,
            base_delay_ms: d.base_delay.as_millis() as u64,
            factor: d.factor,
            max_delay_secs: d.max_delay.as_secs(),
            max_rate_limit_waits: d.max_rate_limit_waits,
        }
    }
}

impl RetrySection {
    pub fn to_policy(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            factor: self.factor.max(1),
            max_delay: Duration::from_secs(self.max_delay_secs),
            max_rate_limit_waits: self.max_rate_limit_waits,
        }
    }
}

/// Where duplicate candidates come from besides the record store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistriesConfig {
    /// JSON files listing datasets that are already registered
    pub files: Vec<PathBuf>,
    /// Search the destination catalog by title
    pub search_destination: bool,
    pub crossref: bool,
    pub datacite: bool,
    /// Contact address sent to Crossref's polite pool
    #[serde(deserialize_with = "deserialize_env_var")]
    pub mailto: Option<String>,
    pub rows: usize,
}

impl Default for RegistriesConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            search_destination: true,
            crossref: false,
            datacite: false,
            mailto: None,
            rows: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub source_dir: PathBuf,
    pub batch_size: usize,
    pub abort_on_failure: bool,
    pub auto_accept_threshold: f64,
    pub allow_production_publish: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("fgdc"),
            batch_size: 50,
            abort_on_failure: false,
            auto_accept_threshold: 0.90,
            allow_production_publish: false,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./depoline.toml (current directory)
    /// 2. ~/.config/depoline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("depoline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "depoline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
