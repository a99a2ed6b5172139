use crate::{CoordinationError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy applied by a client while its connection is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Fail immediately on connection loss
    Never,
    /// Sleep `base_sleep * random[1, 2^(attempt + 1))`, capped at `max_sleep`,
    /// for at most `max_retries` attempts
    ExponentialBackoff {
        base_sleep: Duration,
        max_retries: u32,
        max_sleep: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::ExponentialBackoff {
            base_sleep: Duration::from_millis(1000),
            max_retries: 3,
            max_sleep: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn exponential_backoff(base_sleep: Duration, max_retries: u32) -> Self {
        RetryPolicy::ExponentialBackoff {
            base_sleep,
            max_retries,
            max_sleep: Duration::from_secs(30),
        }
    }

    /// Sleep before retry number `attempt` (zero based), or `None` once the
    /// policy is exhausted.
    pub fn sleep_for(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Never => None,
            RetryPolicy::ExponentialBackoff {
                base_sleep,
                max_retries,
                max_sleep,
            } => {
                if attempt >= *max_retries {
                    return None;
                }
                let upper = 1u32 << (attempt + 1).min(29);
                let factor = rand::thread_rng().gen_range(1..upper.max(2));
                Some(base_sleep.saturating_mul(factor).min(*max_sleep))
            }
        }
    }
}

/// Connection settings for a coordination client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `host:port[,host:port...]` of the coordination ensemble
    pub connect_string: String,
    /// Session expires when the client stays disconnected this long
    pub session_timeout: Duration,
    /// Upper bound on waiting for a connection before an operation fails
    pub connection_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_string: "localhost:2181".to_string(),
            session_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            ..Default::default()
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load a configuration from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_string.trim().is_empty() {
            return Err(CoordinationError::config("connect string cannot be empty"));
        }
        for endpoint in self.connect_string.split(',') {
            let (host, port) = endpoint.rsplit_once(':').ok_or_else(|| {
                CoordinationError::config(format!("endpoint '{}' is not host:port", endpoint))
            })?;
            if host.trim().is_empty() || port.trim().parse::<u16>().is_err() {
                return Err(CoordinationError::config(format!(
                    "endpoint '{}' is not host:port",
                    endpoint
                )));
            }
        }
        if self.session_timeout.is_zero() {
            return Err(CoordinationError::config("session timeout must be positive"));
        }
        if self.connection_timeout.is_zero() {
            return Err(CoordinationError::config(
                "connection timeout must be positive",
            ));
        }
        Ok(())
    }
}
