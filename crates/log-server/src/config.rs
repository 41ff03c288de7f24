// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::error::LogServerError;
use crate::level::{LogLevel, NOTSET};
use crate::ports;

/// Default receive queue depth, in messages.
pub const DEFAULT_SOCKET_HWM: usize = 1_000_000;

/// Largest accepted receive queue depth.
pub const MAX_SOCKET_HWM: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Largest accepted value of any single timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Level used when nothing more verbose has been configured.
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Error;

/// Bounds of every wait the server performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long `start()` waits for the worker to bind.
    pub startup: Duration,
    /// How long `stop()` waits for the worker to see the sentinel.
    pub sentinel_ack: Duration,
    /// First join attempt on the worker thread.
    pub join: Duration,
    /// Second, final join attempt.
    pub join_retry: Duration,
    /// How long the worker keeps draining once told to stop.
    pub drain: Duration,
    /// Receive poll interval; the running flag is checked at least this often.
    pub poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(5),
            sentinel_ack: Duration::from_secs(5),
            join: Duration::from_secs(7),
            join_retry: Duration::from_secs(5),
            drain: Duration::from_secs(5),
            poll: Duration::from_secs(1),
        }
    }
}

impl Timeouts {
    /// Upper bound of the time `stop()` can block.
    #[must_use]
    pub fn max_stop(&self) -> Duration {
        self.sentinel_ack
            .saturating_add(self.join)
            .saturating_add(self.join_retry)
    }
}

/// Configuration of a log server. Immutable once handed to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to (e.g. "0.0.0.0")
    pub host: String,
    /// Port to bind to; 0 lets the OS pick one when the server starts
    pub port: u16,
    /// Minimum level writers are expected to forward and the tracing sink emits
    pub log_level: LogLevel,
    /// Maximum number of received, not yet handled messages
    pub socket_hwm: usize,
    pub timeouts: Timeouts,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ports::default_host().to_string(),
            port: ports::unused_localhost_port().unwrap_or(0),
            log_level: DEFAULT_LOG_LEVEL,
            socket_hwm: DEFAULT_SOCKET_HWM,
            timeouts: Timeouts::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `LOG_SERVER_HOST`, `LOG_SERVER_PORT`, `LOG_SERVER_LEVEL` and
    /// `LOG_SERVER_HWM`; unset or unparsable numeric values fall back to the
    /// defaults, an unknown level is an error.
    pub fn from_env() -> Result<Self, LogServerError> {
        let defaults = Self::default();

        let host = env::var("LOG_SERVER_HOST")
            .ok()
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or(defaults.host);
        let port = env::var("LOG_SERVER_PORT")
            .ok()
            .and_then(|port| port.trim().parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let log_level = match env::var("LOG_SERVER_LEVEL") {
            Ok(level) => level
                .parse::<LogLevel>()
                .map_err(|e| LogServerError::InvalidConfig(e.to_string()))?,
            Err(_) => defaults.log_level,
        };
        let socket_hwm = env::var("LOG_SERVER_HWM")
            .ok()
            .and_then(|hwm| hwm.trim().parse::<usize>().ok())
            .unwrap_or(defaults.socket_hwm);

        let config = Self {
            host,
            port,
            log_level,
            socket_hwm,
            timeouts: defaults.timeouts,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), LogServerError> {
        if self.host.trim().is_empty() {
            return Err(LogServerError::InvalidConfig(
                "Log server host cannot be empty".to_string(),
            ));
        }

        if self.socket_hwm == 0 {
            return Err(LogServerError::InvalidConfig(
                "Socket high-water-mark must be greater than 0".to_string(),
            ));
        }

        if self.socket_hwm > MAX_SOCKET_HWM {
            return Err(LogServerError::InvalidConfig(format!(
                "Socket high-water-mark must be at most {}",
                MAX_SOCKET_HWM
            )));
        }

        let t = &self.timeouts;
        for (name, value) in [
            ("startup", t.startup),
            ("sentinel_ack", t.sentinel_ack),
            ("join", t.join),
            ("join_retry", t.join_retry),
            ("drain", t.drain),
            ("poll", t.poll),
        ] {
            if value.is_zero() {
                return Err(LogServerError::InvalidConfig(format!(
                    "Timeout '{}' must be greater than 0",
                    name
                )));
            }
            if value > MAX_TIMEOUT {
                return Err(LogServerError::InvalidConfig(format!(
                    "Timeout '{}' must be at most {:?}",
                    name, MAX_TIMEOUT
                )));
            }
        }

        Ok(())
    }

    /// Bind address as `tcp://host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        ports::tcp_address(&self.host, self.port)
    }
}

/// Computes the level writers should forward at.
///
/// Starts from [`DEFAULT_LOG_LEVEL`] and lowers it to the most verbose of the
/// configured numeric levels, ignoring unset (`NOTSET`) ones.
#[must_use]
pub fn resolve_log_level(configured: &[i64]) -> LogLevel {
    let levelno = configured
        .iter()
        .copied()
        .filter(|&levelno| levelno != NOTSET)
        .fold(DEFAULT_LOG_LEVEL.levelno(), i64::min);
    LogLevel::from_levelno(levelno)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 4] = [
        "LOG_SERVER_HOST",
        "LOG_SERVER_PORT",
        "LOG_SERVER_LEVEL",
        "LOG_SERVER_HWM",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_hwm, 1_000_000);
        assert_eq!(config.log_level, LogLevel::Error);
        assert_eq!(config.host, ports::default_host());
        assert_ne!(config.port, 0);
    }

    #[test]
    fn test_default_stop_bound() {
        assert_eq!(Timeouts::default().max_stop(), Duration::from_secs(17));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = ServerConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_hwm() {
        let config = ServerConfig {
            socket_hwm: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ServerConfig {
            timeouts: Timeouts {
                poll: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'poll'"));
    }

    #[test]
    fn test_validate_rejects_oversized_hwm() {
        let config = ServerConfig {
            socket_hwm: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LogServerError::InvalidConfig(_))
        ));

        let config = ServerConfig {
            socket_hwm: MAX_SOCKET_HWM,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_timeout() {
        let config = ServerConfig {
            timeouts: Timeouts {
                startup: Duration::MAX,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'startup'"));
    }

    #[test]
    fn test_max_stop_saturates() {
        let timeouts = Timeouts {
            sentinel_ack: Duration::MAX,
            join: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(timeouts.max_stop(), Duration::MAX);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_oversized_hwm() {
        clear_env();
        env::set_var("LOG_SERVER_HWM", usize::MAX.to_string());
        assert!(matches!(
            ServerConfig::from_env(),
            Err(LogServerError::InvalidConfig(_))
        ));
        clear_env();
    }

    #[test]
    fn test_address_format() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 4510,
            ..Default::default()
        };
        assert_eq!(config.address(), "tcp://127.0.0.1:4510");
    }

    #[test]
    fn test_resolve_log_level() {
        assert_eq!(resolve_log_level(&[]), LogLevel::Error);
        assert_eq!(resolve_log_level(&[NOTSET]), LogLevel::Error);
        assert_eq!(resolve_log_level(&[NOTSET, 20]), LogLevel::Info);
        assert_eq!(resolve_log_level(&[30, 10]), LogLevel::Debug);
        assert_eq!(resolve_log_level(&[50]), LogLevel::Error);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("LOG_SERVER_HOST", "127.0.0.1");
        env::set_var("LOG_SERVER_PORT", "4599");
        env::set_var("LOG_SERVER_LEVEL", "debug");
        env::set_var("LOG_SERVER_HWM", "10");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4599);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.socket_hwm, 10);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_to_defaults() {
        clear_env();
        env::set_var("LOG_SERVER_PORT", "not-a-port");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, ports::default_host());
        assert_ne!(config.port, 0);
        assert_eq!(config.socket_hwm, DEFAULT_SOCKET_HWM);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_level() {
        clear_env();
        env::set_var("LOG_SERVER_LEVEL", "chatty");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(LogServerError::InvalidConfig(_))
        ));
        clear_env();
    }
}
