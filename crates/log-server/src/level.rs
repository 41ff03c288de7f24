// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log severities shared by writers and the server.
//!
//! Writers send numeric levels (`levelno`) using the conventional scale
//! where `DEBUG` is 10 and `CRITICAL` is 50, extended with `TRACE` at 5.

use std::fmt;
use std::str::FromStr;

/// Numeric value of an unset level.
pub const NOTSET: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Numeric level as carried in the `levelno` field.
    #[must_use]
    pub const fn levelno(self) -> i64 {
        match self {
            LogLevel::Trace => 5,
            LogLevel::Debug => 10,
            LogLevel::Info => 20,
            LogLevel::Warning => 30,
            LogLevel::Error => 40,
            LogLevel::Critical => 50,
        }
    }

    /// Maps an arbitrary numeric level onto the closest level at or below it.
    ///
    /// Custom levels in between (e.g. 15) collapse onto the next lower
    /// named level, and anything under `DEBUG` is treated as `TRACE`.
    #[must_use]
    pub const fn from_levelno(levelno: i64) -> Self {
        if levelno >= 50 {
            LogLevel::Critical
        } else if levelno >= 40 {
            LogLevel::Error
        } else if levelno >= 30 {
            LogLevel::Warning
        } else if levelno >= 20 {
            LogLevel::Info
        } else if levelno >= 10 {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Lowercase name understood by `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown log level '{0}'. Must be one of: trace, debug, info, warning, error, critical")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" | "fatal" => Ok(LogLevel::Critical),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levelno_bounds() {
        assert_eq!(LogLevel::from_levelno(0), LogLevel::Trace);
        assert_eq!(LogLevel::from_levelno(15), LogLevel::Debug);
        assert_eq!(LogLevel::from_levelno(30), LogLevel::Warning);
        assert_eq!(LogLevel::from_levelno(1000), LogLevel::Critical);
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical,
        ] {
            assert_eq!(LogLevel::from_levelno(level.levelno()), level);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(" fatal ".parse::<LogLevel>(), Ok(LogLevel::Critical));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_ordering_follows_severity() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Error < LogLevel::Critical);
    }
}
