//! Client configuration.
//!
//! Options can be built in code, parsed from TOML, or loaded from
//! `<config dir>/monkdb/config.toml`:
//!
//! ```toml
//! servers = ["http://db1:4200", "http://db2:4200"]
//! retries = 5
//! backoff_factor_ms = 50
//! username = "monkdb"
//! schema = "doc"
//! ```

use crate::error::{MonkError, MonkResult};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:4200";
pub const DEFAULT_SQL_PATH: &str = "/_sql?types=true";

/// Connection options shared by every request of a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Base URLs of the cluster nodes.
    pub servers: Vec<String>,
    /// Attempts per statement, including the first.
    pub retries: u32,
    /// Wait after the first failed attempt.
    pub backoff_factor_ms: u64,
    /// Multiplier applied to the wait after each further failure.
    pub backoff_growth: f64,
    /// How long a failed server stays out of rotation.
    pub retry_interval_ms: u64,
    pub path: String,
    /// Ask the server to include stack traces in error payloads.
    pub error_trace: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sent as `Default-Schema`.
    pub schema: Option<String>,
    /// Per-request timeout of the HTTP transport.
    pub timeout_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            servers: vec![DEFAULT_SERVER.to_string()],
            retries: 3,
            backoff_factor_ms: 100,
            backoff_growth: 2.0,
            retry_interval_ms: 30_000,
            path: DEFAULT_SQL_PATH.to_string(),
            error_trace: false,
            username: None,
            password: None,
            schema: None,
            timeout_ms: 30_000,
        }
    }
}

impl ClientOptions {
    /// Options for the given servers, everything else default.
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().servers(servers)
    }

    pub fn servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn backoff(mut self, base: Duration, growth: f64) -> Self {
        self.backoff_factor_ms = base.as_millis() as u64;
        self.backoff_growth = growth;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn error_trace(mut self, enabled: bool) -> Self {
        self.error_trace = enabled;
        self
    }

    /// Set credentials for HTTP basic auth.
    pub fn credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Parse options from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> MonkResult<Self> {
        let options: ClientOptions =
            toml::from_str(content).map_err(|e| MonkError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> MonkResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from the user config file, or defaults if there is none.
    pub fn load_default() -> MonkResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/monkdb/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("monkdb").join("config.toml"))
    }

    pub fn validate(&self) -> MonkResult<()> {
        if self.servers.is_empty() {
            return Err(MonkError::Config("at least one server is required".into()));
        }
        if let Some(bad) = self.servers.iter().find(|s| s.trim().is_empty()) {
            return Err(MonkError::Config(format!("invalid server url: {:?}", bad)));
        }
        if self.retries == 0 {
            return Err(MonkError::Config("retries must be at least 1".into()));
        }
        if self.backoff_growth.is_nan() || self.backoff_growth < 1.0 {
            return Err(MonkError::Config(format!(
                "backoff_growth must be >= 1.0, got {}",
                self.backoff_growth
            )));
        }
        Ok(())
    }

    /// Request path for statements, including the error-trace flag.
    pub fn sql_path(&self) -> String {
        if !self.error_trace {
            return self.path.clone();
        }
        let sep = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{}error_trace=true", self.path, sep)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retries,
            Duration::from_millis(self.backoff_factor_ms),
            self.backoff_growth,
        )
        .quarantine(Duration::from_millis(self.retry_interval_ms))
    }
}
