//! Controller configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DEVICE_URL: &str = "http://127.0.0.1";
pub const DEFAULT_STATUS_PATH: &str = "status.xml";
pub const DEFAULT_TOC_PATH: &str = "toc.xml";
pub const DEFAULT_PREFS_PATH: &str = "showdeck-prefs.json";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 660;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The device URL is not an absolute http(s) URL.
    #[error("invalid device URL `{0}`")]
    InvalidDeviceUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Status poll cadence.
    pub poll_interval: Duration,
    /// Quiet period after a command before polling resumes.
    pub settle_delay: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Device base URL without a trailing slash.
    pub device_url: String,
    pub status_path: String,
    pub toc_path: String,
    pub prefs_path: PathBuf,
    pub timings: Timings,
}

impl ControllerConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `SHOWDECK_DEVICE_URL`: default `http://127.0.0.1`
    /// - `SHOWDECK_STATUS_PATH`: default `status.xml`
    /// - `SHOWDECK_TOC_PATH`: default `toc.xml`
    /// - `SHOWDECK_PREFS_PATH`: default `showdeck-prefs.json`
    /// - `SHOWDECK_POLL_INTERVAL_MS`: default 1000
    /// - `SHOWDECK_SETTLE_DELAY_MS`: default 660
    /// - `SHOWDECK_REQUEST_TIMEOUT_MS`: default 2000
    /// - `SHOWDECK_CONNECT_TIMEOUT_MS`: default 1000
    ///
    /// # Errors
    ///
    /// Returns an error if the device URL does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let device_url = std::env::var("SHOWDECK_DEVICE_URL").unwrap_or_else(|_| DEFAULT_DEVICE_URL.to_string());
        let timings = Timings {
            poll_interval: env_millis("SHOWDECK_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            settle_delay: env_millis("SHOWDECK_SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY_MS),
            request_timeout: env_millis("SHOWDECK_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: env_millis("SHOWDECK_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS),
        };

        Ok(Self {
            device_url: normalize_device_url(&device_url)?,
            status_path: env_path("SHOWDECK_STATUS_PATH", DEFAULT_STATUS_PATH),
            toc_path: env_path("SHOWDECK_TOC_PATH", DEFAULT_TOC_PATH),
            prefs_path: std::env::var("SHOWDECK_PREFS_PATH")
                .map_or_else(|_| PathBuf::from(DEFAULT_PREFS_PATH), PathBuf::from),
            timings,
        })
    }

    /// Replace the device URL, e.g. from a command-line flag.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` does not parse.
    pub fn with_device_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.device_url = normalize_device_url(url)?;
        Ok(self)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_url: DEFAULT_DEVICE_URL.to_owned(),
            status_path: DEFAULT_STATUS_PATH.to_owned(),
            toc_path: DEFAULT_TOC_PATH.to_owned(),
            prefs_path: PathBuf::from(DEFAULT_PREFS_PATH),
            timings: Timings::default(),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(env_parse(key, default))
}

fn env_path(key: &str, default: &str) -> String {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim_start_matches('/')
        .to_string()
}

fn normalize_device_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed).map_err(|_| ConfigError::InvalidDeviceUrl(raw.to_owned()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::InvalidDeviceUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
