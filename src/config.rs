//! Client configuration and device addressing.
//!
//! A [`Config`] carries the three device credentials plus connection tuning.
//! Unset fields are filled from the defaults below; [`Config::validate`]
//! rejects empty credentials. The serial number is used for addressing only.
//!
//! # Example
//!
//! ```
//! use nefit_client::Config;
//!
//! let config = Config::new("123456789", "abcdefghij", "secret");
//! assert_eq!(config.jid(), "rrccontact_123456789@wa2-mz36-qrmzh6.bosch.de");
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::time::Duration;

use crate::error::{NefitError, Result};

/// Default backend host.
pub const DEFAULT_HOST: &str = "wa2-mz36-qrmzh6.bosch.de";

/// Default client-to-server port.
pub const DEFAULT_PORT: u16 = 5222;

/// Default keepalive interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 15;

/// Default per-attempt timeout (also the first PUT backoff).
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Prefix prepended to the access key for session authentication.
pub const ACCESS_KEY_PREFIX: &str = "Ct7ZR03b_";

/// Local-part prefix of the client ("from") address.
pub const CONTACT_PREFIX: &str = "rrccontact_";

/// Local-part prefix of the device ("to") address.
pub const GATEWAY_PREFIX: &str = "rrcgateway_";

/// Configuration for a client instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Device serial number.
    pub serial_number: String,
    /// Access key printed on the device.
    pub access_key: String,
    /// User-chosen password.
    pub password: String,
    /// Backend host.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Keepalive interval.
    pub ping_interval: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Per-attempt timeout and base PUT backoff.
    pub retry_timeout: Duration,
}

impl Config {
    /// Create a configuration with default connection settings.
    pub fn new(
        serial_number: impl Into<String>,
        access_key: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            access_key: access_key.into(),
            password: password.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ping_interval: DEFAULT_PING_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_timeout: DEFAULT_RETRY_TIMEOUT,
        }
    }

    /// Set the backend host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the backend port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the keepalive interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the number of retries after the first attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the per-attempt timeout.
    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = timeout;
        self
    }

    /// Fill empty host and zero port/intervals with defaults.
    ///
    /// `max_retries` is left alone: zero retries is a valid setting.
    pub fn with_defaults(mut self) -> Self {
        if self.host.is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.ping_interval.is_zero() {
            self.ping_interval = DEFAULT_PING_INTERVAL;
        }
        if self.retry_timeout.is_zero() {
            self.retry_timeout = DEFAULT_RETRY_TIMEOUT;
        }
        self
    }

    /// Check that the credentials are present.
    pub fn validate(&self) -> Result<()> {
        if self.serial_number.is_empty() {
            return Err(NefitError::Config("serial number is required".to_string()));
        }
        if self.access_key.is_empty() {
            return Err(NefitError::Config("access key is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(NefitError::Config("password is required".to_string()));
        }
        Ok(())
    }

    /// Client address: `rrccontact_<serial>@<host>`.
    pub fn jid(&self) -> String {
        format!("{}{}@{}", CONTACT_PREFIX, self.serial_number, self.host)
    }

    /// Device address: `rrcgateway_<serial>@<host>`.
    pub fn resource_jid(&self) -> String {
        format!("{}{}@{}", GATEWAY_PREFIX, self.serial_number, self.host)
    }

    /// Session password: the access key with its protocol prefix.
    pub fn auth_password(&self) -> String {
        format!("{}{}", ACCESS_KEY_PREFIX, self.access_key)
    }

    /// `host:port` connect address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("serial_number", &self.serial_number)
            .field("access_key", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ping_interval", &self.ping_interval)
            .field("max_retries", &self.max_retries)
            .field("retry_timeout", &self.retry_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let config = Config::new("123", "key", "pass");
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.ping_interval, DEFAULT_PING_INTERVAL);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_timeout, DEFAULT_RETRY_TIMEOUT);
    }

    #[test]
    fn test_with_defaults_fills_zero_values() {
        let config = Config {
            host: String::new(),
            port: 0,
            ping_interval: Duration::ZERO,
            retry_timeout: Duration::ZERO,
            max_retries: 0,
            ..Config::new("123", "key", "pass")
        }
        .with_defaults();

        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.ping_interval, DEFAULT_PING_INTERVAL);
        assert_eq!(config.retry_timeout, DEFAULT_RETRY_TIMEOUT);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        assert!(matches!(
            Config::new("", "key", "pass").validate(),
            Err(NefitError::Config(_))
        ));
        assert!(matches!(
            Config::new("123", "", "pass").validate(),
            Err(NefitError::Config(_))
        ));
        assert!(matches!(
            Config::new("123", "key", "").validate(),
            Err(NefitError::Config(_))
        ));
        assert!(Config::new("123", "key", "pass").validate().is_ok());
    }

    #[test]
    fn test_addressing() {
        let config = Config::new("123456789", "abc", "pw").host("example.org").port(5223);
        assert_eq!(config.jid(), "rrccontact_123456789@example.org");
        assert_eq!(config.resource_jid(), "rrcgateway_123456789@example.org");
        assert_eq!(config.auth_password(), "Ct7ZR03b_abc");
        assert_eq!(config.address(), "example.org:5223");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::new("123", "topsecretkey", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("topsecretkey"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("123"));
    }
}
