use envconfig::Envconfig;
use std::time::Duration;
use validator::Validate;

use crate::error::{AgentError, Result};
use crate::policy::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api";
pub const DEFAULT_USER_AGENT: &str =
    concat!("api-agent (https://github.com/api-agent/api-agent, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Envconfig, Validate, Clone)]
pub struct Config {
    /// Bot credential sent as `Authorization: Bot <token>`
    #[envconfig(from = "BOT_TOKEN")]
    #[validate(length(min = 1, message = "bot token cannot be empty"))]
    pub token: String,

    /// Base URL every request path is joined onto
    #[envconfig(from = "API_BASE_URL", default = "https://discord.com/api")]
    #[validate(url(message = "base URL must be an absolute http(s) URL"))]
    pub base_url: String,

    /// Client identification string, [`DEFAULT_USER_AGENT`] when unset
    #[envconfig(from = "API_USER_AGENT")]
    #[validate(length(min = 1, message = "user agent cannot be empty"))]
    pub user_agent: Option<String>,

    /// Fixed delay before retrying a 5xx response
    #[envconfig(from = "SERVER_ERROR_DELAY_MS", default = "5000")]
    #[validate(range(min = 1, message = "server error delay must be greater than 0"))]
    pub server_error_delay_ms: u64,

    /// Maximum attempts per call, 0 retries forever
    #[envconfig(from = "MAX_ATTEMPTS", default = "0")]
    pub max_attempts: u32,

    /// Longest server-declared retry_after honoured, 0 for no cap
    #[envconfig(from = "MAX_RETRY_AFTER_MS", default = "0")]
    pub max_retry_after_ms: u64,

    /// Per-attempt transport timeout in seconds
    #[envconfig(from = "REQUEST_TIMEOUT_SECS", default = "30")]
    #[validate(range(min = 1, message = "request timeout must be greater than 0"))]
    pub request_timeout_secs: u64,

    /// Idle age after which buckets may be swept
    #[envconfig(from = "BUCKET_IDLE_SECS", default = "300")]
    #[validate(range(min = 1, message = "bucket idle time must be greater than 0"))]
    pub bucket_idle_secs: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config::init_from_env()?;
        config.check()?;
        Ok(config)
    }

    /// Build a configuration with defaults around a token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            server_error_delay_ms: 5000,
            max_attempts: 0,
            max_retry_after_ms: 0,
            request_timeout_secs: 30,
            bucket_idle_secs: 300,
            log_level: "info".to_string(),
        }
    }

    /// Validate field ranges and formats
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AgentError::Configuration(
                "base URL must start with 'http://' or 'https://'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bucket_idle(&self) -> Duration {
        Duration::from_secs(self.bucket_idle_secs)
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy =
            RetryPolicy::standard().server_error_delay(Duration::from_millis(self.server_error_delay_ms));
        if self.max_attempts > 0 {
            policy = policy.max_attempts(self.max_attempts);
        }
        if self.max_retry_after_ms > 0 {
            policy = policy.max_retry_after(Duration::from_millis(self.max_retry_after_ms));
        }
        policy
    }
}
