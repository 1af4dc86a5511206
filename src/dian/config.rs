//! Authority endpoint, timeouts and retry policy.
//!
//! Defaults suit the production authority. Override via environment
//! variables or explicit construction for staging and tests.

use std::time::Duration;

use url::Url;

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self { base, max_delay }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Submission retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Transient failures tolerated per run before the document moves to
    /// `Error`.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub backoff: Backoff,
    /// Give up and flag the document for manual follow-up after this long.
    pub overall_timeout: Duration,
}

/// Configuration for talking to the tax authority.
#[derive(Debug, Clone)]
pub struct DianConfig {
    /// Base URL; `validateDocument` and `documentStatus/{trackId}` are
    /// resolved against it.
    pub base_url: Url,
    /// Timeout of each individual HTTP call.
    pub request_timeout: Duration,
    pub submission: RetryPolicy,
    pub polling: PollPolicy,
}

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 600;

impl DianConfig {
    /// Production defaults against `base_url`.
    pub fn new(base_url: Url) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        );
        Self {
            base_url: with_trailing_slash(base_url),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            submission: RetryPolicy {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                backoff,
            },
            polling: PollPolicy {
                backoff,
                overall_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            },
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `FISCAL_API_URL` (required)
    /// - `FISCAL_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `FISCAL_SUBMIT_MAX_ATTEMPTS` (default: 5)
    /// - `FISCAL_BACKOFF_BASE_MS` (default: 500)
    /// - `FISCAL_BACKOFF_MAX_MS` (default: 30000)
    /// - `FISCAL_POLL_TIMEOUT_SECS` (default: 600)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url =
            lookup("FISCAL_API_URL").ok_or(ConfigError::MissingVar("FISCAL_API_URL"))?;
        let base_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl("FISCAL_API_URL".to_string(), e.to_string()))?;

        let number = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber(var, raw)),
            }
        };

        let backoff = Backoff::new(
            Duration::from_millis(number("FISCAL_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS)?),
            Duration::from_millis(number("FISCAL_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS)?),
        );
        let max_attempts = number("FISCAL_SUBMIT_MAX_ATTEMPTS", u64::from(DEFAULT_MAX_ATTEMPTS))?;
        let max_attempts = u32::try_from(max_attempts)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidNumber("FISCAL_SUBMIT_MAX_ATTEMPTS", max_attempts.to_string())
            })?;

        Ok(Self {
            base_url: with_trailing_slash(base_url),
            request_timeout: Duration::from_secs(number(
                "FISCAL_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            submission: RetryPolicy {
                max_attempts,
                backoff,
            },
            polling: PollPolicy {
                backoff,
                overall_timeout: Duration::from_secs(number(
                    "FISCAL_POLL_TIMEOUT_SECS",
                    DEFAULT_POLL_TIMEOUT_SECS,
                )?),
            },
        })
    }

    /// Configuration for a local mock server, with millisecond delays.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `uri` cannot be parsed.
    pub fn local_mock(uri: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(uri)
            .map_err(|e| ConfigError::InvalidUrl(uri.to_string(), e.to_string()))?;
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_millis(20));
        Ok(Self {
            base_url: with_trailing_slash(base_url),
            request_timeout: Duration::from_secs(5),
            submission: RetryPolicy {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                backoff,
            },
            polling: PollPolicy {
                backoff,
                overall_timeout: Duration::from_secs(5),
            },
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.submission.max_attempts = max_attempts;
        self
    }

    pub fn with_poll_timeout(mut self, overall_timeout: Duration) -> Self {
        self.polling.overall_timeout = overall_timeout;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub(crate) fn submit_url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join("validateDocument")
    }

    pub(crate) fn status_url(&self, track_id: &str) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.join("documentStatus/")?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(track_id);
        Ok(url)
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid number for {0}: '{1}'")]
    InvalidNumber(&'static str, String),
    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let b = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        assert_eq!(b.delay(1), Duration::from_millis(500));
        assert_eq!(b.delay(2), Duration::from_millis(1000));
        assert_eq!(b.delay(3), Duration::from_millis(2000));
        assert_eq!(b.delay(4), Duration::from_secs(3));
        assert_eq!(b.delay(100), Duration::from_secs(3));
    }

    #[test]
    fn env_defaults() {
        let config = DianConfig::from_lookup(lookup(&[("FISCAL_API_URL", "https://api.example/v1")]))
            .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.submission.max_attempts, 5);
        assert_eq!(config.polling.overall_timeout, Duration::from_secs(600));
        assert_eq!(
            config.submit_url().unwrap().as_str(),
            "https://api.example/v1/validateDocument"
        );
        assert_eq!(
            config.status_url("TRK-9").unwrap().as_str(),
            "https://api.example/v1/documentStatus/TRK-9"
        );
    }

    #[test]
    fn env_errors() {
        assert!(matches!(
            DianConfig::from_lookup(lookup(&[])),
            Err(ConfigError::MissingVar("FISCAL_API_URL"))
        ));
        assert!(matches!(
            DianConfig::from_lookup(lookup(&[("FISCAL_API_URL", "not a url")])),
            Err(ConfigError::InvalidUrl(..))
        ));
        assert!(matches!(
            DianConfig::from_lookup(lookup(&[
                ("FISCAL_API_URL", "https://api.example"),
                ("FISCAL_SUBMIT_MAX_ATTEMPTS", "0"),
            ])),
            Err(ConfigError::InvalidNumber("FISCAL_SUBMIT_MAX_ATTEMPTS", _))
        ));
        assert!(matches!(
            DianConfig::from_lookup(lookup(&[
                ("FISCAL_API_URL", "https://api.example"),
                ("FISCAL_BACKOFF_BASE_MS", "fast"),
            ])),
            Err(ConfigError::InvalidNumber("FISCAL_BACKOFF_BASE_MS", _))
        ));
    }

    #[test]
    fn status_url_escapes_track_id() {
        let config = DianConfig::local_mock("http://127.0.0.1:9000").unwrap();
        assert_eq!(
            config.status_url("a/b").unwrap().as_str(),
            "http://127.0.0.1:9000/documentStatus/a%2Fb"
        );
    }
}
