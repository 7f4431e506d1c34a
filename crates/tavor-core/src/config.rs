//! Client and box configuration types.
//!
//! [`ClientConfig`] is resolved once, either from the environment or through
//! its builder, and handed to [`Client::new`](crate::Client::new). Nothing else
//! in this crate reads process environment.

use crate::error::Error;
use std::collections::HashMap;
use std::time::Duration;

/// Default service root.
pub const DEFAULT_BASE_URL: &str = "https://api.tavor.dev";

/// Default per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for a box to reach `running`.
pub const DEFAULT_BOX_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default deadline for a command to finish.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Default cadence between status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a [`Client`](crate::Client).
#[derive(Clone)]
pub struct ClientConfig {
    /// API key sent as `x-api-key`.
    pub api_key: String,
    /// Service root, without trailing slash.
    pub base_url: String,
    /// Timeout for ordinary (non-streaming) requests.
    pub http_timeout: Duration,
    /// Default deadline for [`BoxHandle::wait_until_ready`](crate::BoxHandle::wait_until_ready).
    pub box_ready_timeout: Duration,
    /// Default deadline for [`BoxHandle::run`](crate::BoxHandle::run).
    pub command_timeout: Duration,
    /// Default poll cadence for commands and readiness waits.
    pub poll_interval: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

// Keep the key out of logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("http_timeout", &self.http_timeout)
            .field("box_ready_timeout", &self.box_ready_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            box_ready_timeout: DEFAULT_BOX_READY_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            user_agent: format!("tavor-rust-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a new config builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TAVOR_API_KEY` | (required) |
    /// | `TAVOR_BASE_URL` | `https://api.tavor.dev` |
    /// | `TAVOR_BOX_TIMEOUT` | `60` (seconds) |
    /// | `TAVOR_COMMAND_TIMEOUT_MS` | `300000` |
    /// | `TAVOR_POLL_INTERVAL_MS` | `1000` |
    /// | `TAVOR_HTTP_TIMEOUT` | `30` (seconds) |
    ///
    /// Unparseable numeric values fall back to their defaults. The result is
    /// not validated; call [`validate`](Self::validate) or let
    /// [`Client::new`](crate::Client::new) do it.
    pub fn from_env() -> Self {
        let default = Self::default();

        let secs = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };
        let millis = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            api_key: std::env::var("TAVOR_API_KEY").unwrap_or_default(),
            base_url: std::env::var("TAVOR_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.base_url),
            http_timeout: secs("TAVOR_HTTP_TIMEOUT", default.http_timeout),
            box_ready_timeout: secs("TAVOR_BOX_TIMEOUT", default.box_ready_timeout),
            command_timeout: millis("TAVOR_COMMAND_TIMEOUT_MS", default.command_timeout),
            poll_interval: millis("TAVOR_POLL_INTERVAL_MS", default.poll_interval),
            user_agent: default.user_agent,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.api_key.is_empty() {
            return Err(Error::Authentication {
                message: "API key is required. Pass it in ClientConfig or set TAVOR_API_KEY"
                    .into(),
            });
        }
        match reqwest::Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            Ok(_) => {
                return Err(Error::Config(format!(
                    "base_url must be an http(s) URL, got {:?}",
                    self.base_url
                )));
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "base_url {:?} is not a valid URL: {e}",
                    self.base_url
                )));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Set the service root.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    /// Set the default box readiness deadline.
    pub fn box_ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.box_ready_timeout = timeout;
        self
    }

    /// Set the default command deadline.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the default poll cadence.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Build the configuration, validating all required fields.
    pub fn build(self) -> Result<ClientConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parameters for creating a box.
#[derive(Debug, Clone, Default)]
pub struct BoxConfig {
    /// Number of CPU cores (service default when `None`).
    pub cpu: Option<u32>,
    /// RAM in MiB (service default when `None`).
    pub mib_ram: Option<u32>,
    /// Box lifetime in seconds (service default when `None`).
    pub timeout: Option<u64>,
    /// Free-form labels attached to the box.
    pub metadata: HashMap<String, String>,
}

impl BoxConfig {
    /// Create a new config builder.
    pub fn builder() -> BoxConfigBuilder {
        BoxConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cpu == Some(0) {
            return Err(Error::Config("cpu must be > 0".into()));
        }
        if self.mib_ram == Some(0) {
            return Err(Error::Config("mib_ram must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for BoxConfig.
#[derive(Debug, Default)]
pub struct BoxConfigBuilder {
    config: BoxConfig,
}

impl BoxConfigBuilder {
    /// Set the CPU core count.
    pub fn cpu(mut self, cpu: u32) -> Self {
        self.config.cpu = Some(cpu);
        self
    }

    /// Set RAM in MiB.
    pub fn mib_ram(mut self, mib: u32) -> Self {
        self.config.mib_ram = Some(mib);
        self
    }

    /// Set the box lifetime in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout = Some(secs);
        self
    }

    /// Add one metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<BoxConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.command_timeout, Duration::from_secs(300));
        assert_eq!(config.box_ready_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.user_agent.starts_with("tavor-rust-sdk/"));
    }

    #[test]
    fn test_builder_requires_api_key() {
        let result = ClientConfig::builder().build();
        assert!(matches!(result, Err(Error::Authentication { .. })));
    }

    #[test]
    fn test_builder_rejects_bad_base_url() {
        let result = ClientConfig::builder()
            .api_key("sk-test")
            .base_url("ftp://example.com")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        for url in ["http://", "https://exa mple", "localhost:8080", ""] {
            let result = ClientConfig::builder().api_key("sk-test").base_url(url).build();
            assert!(
                matches!(result, Err(Error::Config(_))),
                "{url:?} should be rejected"
            );
        }

        let ok = ClientConfig::builder()
            .api_key("sk-test")
            .base_url("http://127.0.0.1:4000")
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_builder_success() {
        let config = ClientConfig::builder()
            .api_key("sk-test")
            .base_url("https://option.tavor.dev/")
            .command_timeout(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .build()
            .expect("should build successfully");

        assert_eq!(config.base_url, "https://option.tavor.dev");
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_from_env() {
        // Only test in this crate that touches the process environment.
        std::env::set_var("TAVOR_API_KEY", "sk-env123");
        std::env::set_var("TAVOR_BASE_URL", "https://custom.tavor.dev");
        std::env::set_var("TAVOR_BOX_TIMEOUT", "120");
        std::env::set_var("TAVOR_COMMAND_TIMEOUT_MS", "not-a-number");
        std::env::remove_var("TAVOR_POLL_INTERVAL_MS");

        let config = ClientConfig::from_env();
        assert_eq!(config.api_key, "sk-env123");
        assert_eq!(config.base_url, "https://custom.tavor.dev");
        assert_eq!(config.box_ready_timeout, Duration::from_secs(120));
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.validate().is_ok());

        std::env::remove_var("TAVOR_API_KEY");
        std::env::remove_var("TAVOR_BASE_URL");
        std::env::remove_var("TAVOR_BOX_TIMEOUT");
        std::env::remove_var("TAVOR_COMMAND_TIMEOUT_MS");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ClientConfig::builder()
            .api_key("sk-secret")
            .build()
            .unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
    }

    #[test]
    fn test_box_config_builder() {
        let config = BoxConfig::builder()
            .cpu(2)
            .mib_ram(2048)
            .metadata("test", "value")
            .build()
            .unwrap();
        assert_eq!(config.cpu, Some(2));
        assert_eq!(config.mib_ram, Some(2048));
        assert_eq!(config.metadata.len(), 1);

        assert!(BoxConfig::builder().cpu(0).build().is_err());
        assert!(BoxConfig::builder().mib_ram(0).build().is_err());
    }
}
