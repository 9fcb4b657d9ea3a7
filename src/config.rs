use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::headers::HEADER_MATCH_THRESHOLD;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Exponential backoff: `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub attempts: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Tunables for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Classification attempts before the run fails.
    pub classify_attempts: u32,
    /// Extraction attempts (extract and summarise) before the run fails.
    pub extraction_attempts: u32,
    /// Fixed pause between classification or extraction attempts.
    #[serde(with = "millis")]
    pub retry_delay: Duration,
    /// Per-page retries on the vision path.
    pub vision_backoff: BackoffPolicy,
    /// Score a fragment must exceed to count as a column header.
    pub header_threshold: u8,
    /// Width in pixels pages are rendered at for the oracle.
    pub render_width: u32,
    /// Months before today included in the monthly summary.
    pub summary_window_months: u32,
    #[serde(with = "millis")]
    pub fetch_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_attempts: 5,
            extraction_attempts: 5,
            retry_delay: Duration::from_secs(1),
            vision_backoff: BackoffPolicy::default(),
            header_threshold: HEADER_MATCH_THRESHOLD,
            render_width: 1600,
            summary_window_months: 6,
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &str) -> Result<Self> {
        let expanded = shellexpand::full(path)
            .with_context(|| format!("failed to expand config path '{path}'"))?;
        let path = Path::new(expanded.as_ref());
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid pipeline config in {}", path.display()))
    }
}

/// Connection settings for the OpenAI-compatible oracle endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("vision_model", &self.vision_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OracleConfig {
    /// Loads settings from the environment. `OPENAI_API_KEY` is required.
    pub fn from_env() -> Result<Self> {
        let timeout_secs = match std::env::var("LEDGERLIFT_ORACLE_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .context("LEDGERLIFT_ORACLE_TIMEOUT_SECS must be a whole number of seconds")?,
            Err(_) => 120,
        };
        Ok(Self {
            api_key: require_env("OPENAI_API_KEY")?,
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            chat_model: std::env::var("LEDGERLIFT_CHAT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            vision_model: std::env::var("LEDGERLIFT_VISION_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
