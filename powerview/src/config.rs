//! Per-shade preferences

use crate::error::{ShadeError, ShadeResult};
use serde::Deserialize;
use std::time::Duration;

/// How long debug logging stays on after preferences are saved
pub const DEFAULT_LOGGING_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Minimum spacing between forced re-polls caused by missing positions
pub const DEFAULT_POLL_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60);

/// How long a caller waits for the shade worker to answer
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shade preferences and adapter tuning
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawShadeConfig")]
pub struct ShadeConfig {
    /// Dual-rail shades open by raising the top rail instead of the bottom one
    pub open_top_by_default: bool,
    /// Per-device debug logging; lapses after `logging_timeout`
    pub logging_enabled: bool,
    pub logging_timeout: Duration,
    pub poll_retry_window: Duration,
    pub reply_timeout: Duration,
}

impl Default for ShadeConfig {
    fn default() -> Self {
        Self {
            open_top_by_default: false,
            logging_enabled: true,
            logging_timeout: DEFAULT_LOGGING_TIMEOUT,
            poll_retry_window: DEFAULT_POLL_RETRY_WINDOW,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl ShadeConfig {
    /// Parse and validate preferences from JSON. Missing keys keep defaults.
    pub fn from_json(json: &str) -> ShadeResult<Self> {
        let config: ShadeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_open_top_by_default(mut self, open_top: bool) -> Self {
        self.open_top_by_default = open_top;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn validate(&self) -> ShadeResult<()> {
        if self.poll_retry_window.is_zero() {
            return Err(ShadeError::InvalidConfig(
                "pollRetryWindowSecs must be greater than zero".to_string(),
            ));
        }
        if self.reply_timeout.is_zero() {
            return Err(ShadeError::InvalidConfig(
                "replyTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Wire shape of the preferences, durations as plain integers
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawShadeConfig {
    open_top_by_default: bool,
    logging_enabled: bool,
    logging_timeout_secs: u64,
    poll_retry_window_secs: u64,
    reply_timeout_ms: u64,
}

impl Default for RawShadeConfig {
    fn default() -> Self {
        let defaults = ShadeConfig::default();
        Self {
            open_top_by_default: defaults.open_top_by_default,
            logging_enabled: defaults.logging_enabled,
            logging_timeout_secs: defaults.logging_timeout.as_secs(),
            poll_retry_window_secs: defaults.poll_retry_window.as_secs(),
            reply_timeout_ms: defaults.reply_timeout.as_millis() as u64,
        }
    }
}

impl From<RawShadeConfig> for ShadeConfig {
    fn from(raw: RawShadeConfig) -> Self {
        Self {
            open_top_by_default: raw.open_top_by_default,
            logging_enabled: raw.logging_enabled,
            logging_timeout: Duration::from_secs(raw.logging_timeout_secs),
            poll_retry_window: Duration::from_secs(raw.poll_retry_window_secs),
            reply_timeout: Duration::from_millis(raw.reply_timeout_ms),
        }
    }
}
