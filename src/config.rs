//! Bridge configuration and environment helpers.

use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::LlmError;

mod env {
    pub const USE_RESPONSES_API: &str = "OPENAI_USE_RESPONSES_API";
    pub const TIMEOUT_SECONDS: &str = "OPENAI_TIMEOUT_SECONDS";
    pub const UPDATE_INTERVAL_MS: &str = "STREAM_UPDATE_INTERVAL_MS";
    pub const UPDATE_MIN_CHARS: &str = "STREAM_UPDATE_MIN_CHARS";
    pub const MAX_UPDATES: &str = "STREAM_MAX_UPDATES";
}

/// How forwarded deltas are coalesced for a rate-limited display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    /// Forward once this many characters are buffered.
    pub min_chars: usize,
    /// Forward buffered text at most this long after the previous forward.
    pub interval: Duration,
    /// Upper bound on forwarded deltas per invocation, final flush included.
    pub max_updates: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_chars: 80,
            interval: Duration::from_millis(1000),
            max_updates: 120,
        }
    }
}

impl PacingConfig {
    pub fn new(min_chars: usize, interval: Duration, max_updates: usize) -> Self {
        Self {
            min_chars,
            interval,
            max_updates,
        }
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        if self.max_updates == 0 {
            return Err(LlmError::Configuration(
                "max_updates must allow at least the final flush".to_string(),
            ));
        }
        if self.min_chars == 0 {
            return Err(LlmError::Configuration(
                "min_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read-only settings threaded into the bridge at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Opt in to the responses API when the provider supports it.
    pub use_responses_api: bool,
    pub pacing: PacingConfig,
    /// Execution limit imposed by the hosting environment.
    pub timeout: Duration,
    /// Subtracted from `timeout` to leave room for the final surface update.
    pub safety_margin: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            use_responses_api: false,
            pacing: PacingConfig::default(),
            timeout: Duration::from_secs(30),
            safety_margin: Duration::from_secs(2),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `OPENAI_USE_RESPONSES_API`, `OPENAI_TIMEOUT_SECONDS`
    /// and the `STREAM_*` pacing variables.
    pub fn from_env() -> Result<Self, LlmError> {
        let mut config = Self::default();

        if let Some(flag) = env_bool(env::USE_RESPONSES_API)? {
            config.use_responses_api = flag;
        }
        if let Some(seconds) = env_parse::<f64>(env::TIMEOUT_SECONDS)? {
            config.timeout = Duration::try_from_secs_f64(seconds).map_err(|e| {
                LlmError::Configuration(format!("Invalid {}: {e}", env::TIMEOUT_SECONDS))
            })?;
        }
        if let Some(ms) = env_parse::<u64>(env::UPDATE_INTERVAL_MS)? {
            config.pacing.interval = Duration::from_millis(ms);
        }
        if let Some(chars) = env_parse(env::UPDATE_MIN_CHARS)? {
            config.pacing.min_chars = chars;
        }
        if let Some(max) = env_parse(env::MAX_UPDATES)? {
            config.pacing.max_updates = max;
        }

        config.pacing.validate()?;
        Ok(config)
    }

    pub fn with_responses_api(mut self, enabled: bool) -> Self {
        self.use_responses_api = enabled;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Deadline for an invocation starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.timeout.saturating_sub(self.safety_margin)
    }
}

/// Non-empty value of an environment variable.
pub(crate) fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_parse<T>(name: &str) -> Result<Option<T>, LlmError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| {
                LlmError::Configuration(format!("Invalid {name} ({raw}): {e}"))
            })
        })
        .transpose()
}

pub(crate) fn env_bool(name: &str) -> Result<Option<bool>, LlmError> {
    env_string(name)
        .map(|raw| parse_bool(&raw).ok_or_else(|| {
            LlmError::Configuration(format!("Invalid {name}: expected a boolean, got {raw}"))
        }))
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_pacing_validation() {
        assert!(PacingConfig::default().validate().is_ok());
        assert!(
            PacingConfig::new(10, Duration::from_millis(100), 0)
                .validate()
                .is_err()
        );
        assert!(
            PacingConfig::new(0, Duration::from_millis(100), 5)
                .validate()
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_subtracts_safety_margin() {
        let config = BridgeConfig::new()
            .with_timeout(Duration::from_secs(10))
            .with_safety_margin(Duration::from_secs(3));

        let start = Instant::now();
        assert_eq!(config.deadline() - start, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_margin_larger_than_timeout_yields_immediate_deadline() {
        let config = BridgeConfig::new()
            .with_timeout(Duration::from_secs(1))
            .with_safety_margin(Duration::from_secs(5));

        assert_eq!(config.deadline(), Instant::now());
    }
}
