// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for received log records.
//!
//! The server hands every decoded record to a single [`RecordSink`], always
//! from its worker thread. Implementations must return promptly: a slow sink
//! delays every record queued behind it and, in the worst case, shutdown.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::SinkError;
use crate::level::LogLevel;
use crate::record::LogRecord;
use crate::signal::deadline_after;

/// Target under which [`TracingSink`] re-emits records.
pub const FORWARDED_TARGET: &str = "log_server::forwarded";

/// Receives records keyed by their logger name ([`LogRecord::name`]).
pub trait RecordSink: Send + Sync {
    fn handle(&self, record: LogRecord) -> Result<(), SinkError>;
}

impl<F> RecordSink for F
where
    F: Fn(LogRecord) -> Result<(), SinkError> + Send + Sync,
{
    fn handle(&self, record: LogRecord) -> Result<(), SinkError> {
        self(record)
    }
}

/// Re-emits records as `tracing` events in the current process.
///
/// Records below `min_level` are dropped. The originating logger name is
/// attached as the `logger` field since event targets must be static.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    min_level: LogLevel,
}

impl TracingSink {
    #[must_use]
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

macro_rules! forward_event {
    ($level:expr, $record:expr, $message:expr) => {
        tracing::event!(
            target: FORWARDED_TARGET,
            $level,
            logger = %$record.name,
            pathname = $record.pathname.as_deref(),
            lineno = $record.lineno,
            process = $record.process,
            process_name = $record.process_name.as_deref(),
            exc_text = $record.exc_text.as_deref(),
            "{}",
            $message
        )
    };
}

impl RecordSink for TracingSink {
    fn handle(&self, record: LogRecord) -> Result<(), SinkError> {
        let level = record.level();
        if level < self.min_level {
            return Ok(());
        }
        let message = record.get_message();
        match level {
            LogLevel::Trace => forward_event!(tracing::Level::TRACE, record, message),
            LogLevel::Debug => forward_event!(tracing::Level::DEBUG, record, message),
            LogLevel::Info => forward_event!(tracing::Level::INFO, record, message),
            LogLevel::Warning => forward_event!(tracing::Level::WARN, record, message),
            LogLevel::Error | LogLevel::Critical => {
                forward_event!(tracing::Level::ERROR, record, message)
            }
        }
        Ok(())
    }
}

/// Keeps every record in memory, in arrival order.
///
/// Meant for assertions over what child processes logged.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
    grown: Condvar,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Rendered messages of all records, in arrival order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(LogRecord::get_message)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Waits until at least `count` records arrived; returns whether they did.
    pub fn wait_for_len(&self, count: usize, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let mut records = self.records.lock();
        while records.len() < count {
            match deadline {
                Some(deadline) => {
                    if self.grown.wait_until(&mut records, deadline).timed_out() {
                        break;
                    }
                }
                None => self.grown.wait(&mut records),
            }
        }
        records.len() >= count
    }
}

impl RecordSink for MemorySink {
    fn handle(&self, record: LogRecord) -> Result<(), SinkError> {
        self.records.lock().push(record);
        self.grown.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_tracing_sink_reemits_with_logger_field() {
        let sink = TracingSink::new(LogLevel::Info);
        let record = LogRecord::new("salt.minion", LogLevel::Warning, "disk %s full")
            .with_args(vec!["/var".into()]);
        sink.handle(record).unwrap();

        assert!(logs_contain("disk /var full"));
        assert!(logs_contain("logger=salt.minion"));
    }

    #[test]
    #[traced_test]
    fn test_tracing_sink_filters_below_min_level() {
        let sink = TracingSink::new(LogLevel::Error);
        sink.handle(LogRecord::new("child", LogLevel::Info, "chatty detail"))
            .unwrap();

        assert!(!logs_contain("chatty detail"));
    }

    #[test]
    fn test_memory_sink_wait_for_len() {
        let sink = Arc::new(MemorySink::new());
        assert!(!sink.wait_for_len(1, Duration::from_millis(20)));

        let writer = Arc::clone(&sink);
        let handle = std::thread::spawn(move || {
            for i in 0..3 {
                writer
                    .handle(LogRecord::new("child", LogLevel::Info, format!("m{i}")))
                    .unwrap();
            }
        });
        assert!(sink.wait_for_len(3, Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(sink.messages(), vec!["m0", "m1", "m2"]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_closures_are_sinks() {
        let sink = |record: LogRecord| -> Result<(), SinkError> {
            Err(SinkError::Rejected(record.name))
        };
        let err = sink
            .handle(LogRecord::new("picky", LogLevel::Info, "x"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Sink rejected record: picky");
    }
}
