use std::time::Duration;

use common::crypto::SecretKey;

#[derive(Debug)]
pub struct Config {
    // store configuration
    /// bounded timeout applied to every store operation;
    ///  a step fails with a timeout error rather than
    ///  blocking its process forever
    pub store_timeout: Duration,
    /// attempt ceiling for profile CAS update cycles
    pub put_retry_limit: u32,
    /// how long a cached profile may serve freshness-optional reads
    pub profile_cache_ttl: Duration,

    // identity
    /// secret identifying this client,
    ///  if not set then a new secret will be generated
    pub client_secret: Option<SecretKey>,

    // misc
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            put_retry_limit: 5,
            profile_cache_ttl: Duration::from_secs(2),
            client_secret: None,
            log_level: tracing::Level::INFO,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("store timeout must be non-zero")]
    ZeroStoreTimeout,
    #[error("put retry limit must be non-zero")]
    ZeroRetryLimit,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_timeout.is_zero() {
            return Err(ConfigError::ZeroStoreTimeout);
        }
        if self.put_retry_limit == 0 {
            return Err(ConfigError::ZeroRetryLimit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = Config {
            store_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroStoreTimeout)
        ));
    }

    #[test]
    fn test_zero_retry_limit_is_rejected() {
        let config = Config {
            put_retry_limit: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRetryLimit)));
    }
}
