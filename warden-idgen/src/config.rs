use crate::symbols::{SymbolCodec, DEFAULT_ID_LENGTH};
use crate::{IdGenError, IdGenResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core::path::validate_path;

/// What a checkout does when the counter mutex cannot be acquired in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckoutTimeoutPolicy {
    /// Fail with [`IdGenError::LockTimeout`]
    #[default]
    Fail,
    /// Restart the previous segment. IDs already issued from it are issued
    /// again, so this is only safe when rare duplicates are acceptable.
    ReusePreviousSegment,
}

/// Configuration for a [`SegmentAllocator`](crate::SegmentAllocator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdGeneratorConfig {
    /// Persistent node holding the next unallocated segment start
    pub counter_path: String,

    /// Number of IDs per segment
    pub interval: i64,

    /// Left-pad rendered IDs with '0' to `length`
    pub fixed_length: bool,

    pub length: usize,

    /// Bound on waiting for the counter mutex
    pub lock_timeout: Duration,

    pub timeout_policy: CheckoutTimeoutPolicy,
}

impl Default for IdGeneratorConfig {
    fn default() -> Self {
        Self {
            counter_path: "/utils/idgen/counter".to_string(),
            interval: 1000,
            fixed_length: true,
            length: DEFAULT_ID_LENGTH,
            lock_timeout: Duration::from_secs(2),
            timeout_policy: CheckoutTimeoutPolicy::Fail,
        }
    }
}

impl IdGeneratorConfig {
    pub fn new(counter_path: impl Into<String>, interval: i64) -> Self {
        Self {
            counter_path: counter_path.into(),
            interval,
            ..Default::default()
        }
    }

    pub fn with_fixed_length(mut self, length: usize) -> Self {
        self.fixed_length = true;
        self.length = length;
        self
    }

    pub fn with_variable_length(mut self) -> Self {
        self.fixed_length = false;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_timeout_policy(mut self, policy: CheckoutTimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Codec rendering IDs as configured.
    pub fn codec(&self) -> SymbolCodec {
        if self.fixed_length {
            SymbolCodec::fixed(self.length)
        } else {
            SymbolCodec::variable()
        }
    }

    pub fn from_json(json: &str) -> IdGenResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IdGenResult<()> {
        validate_path(&self.counter_path).map_err(|e| IdGenError::Config {
            reason: e.to_string(),
        })?;
        if self.counter_path == "/" {
            return Err(IdGenError::Config {
                reason: "counter cannot live at the root".to_string(),
            });
        }
        if self.interval <= 0 {
            return Err(IdGenError::Config {
                reason: format!("interval must be positive, got {}", self.interval),
            });
        }
        if self.fixed_length && self.length == 0 {
            return Err(IdGenError::Config {
                reason: "fixed length must be positive".to_string(),
            });
        }
        if self.lock_timeout.is_zero() {
            return Err(IdGenError::Config {
                reason: "lock timeout must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IdGeneratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.codec(), SymbolCodec::fixed(6));
        assert_eq!(config.timeout_policy, CheckoutTimeoutPolicy::Fail);
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_validation() {
        assert!(IdGeneratorConfig::new("/ids", 0).validate().is_err());
        assert!(IdGeneratorConfig::new("/ids", -5).validate().is_err());
        assert!(IdGeneratorConfig::new("/", 10).validate().is_err());
        assert!(IdGeneratorConfig::new("ids", 10).validate().is_err());
        assert!(IdGeneratorConfig::new("/ids", 10)
            .with_fixed_length(0)
            .validate()
            .is_err());
        assert!(IdGeneratorConfig::new("/ids", 10)
            .with_fixed_length(0)
            .with_variable_length()
            .validate()
            .is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = IdGeneratorConfig::new("/orders/ids", 50)
            .with_timeout_policy(CheckoutTimeoutPolicy::ReusePreviousSegment);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(IdGeneratorConfig::from_json(&json).unwrap(), config);
    }
}
