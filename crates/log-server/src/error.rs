// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors surfaced to the code driving a [`LogServer`](crate::LogServer).
///
/// Everything else that can go wrong while collecting logs is absorbed by
/// the server and only observable through its own logs.
#[derive(Debug, thiserror::Error)]
pub enum LogServerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Log server already started")]
    AlreadyStarted,

    #[error("Log server did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("Failed to spawn the log server thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Errors of the push/pull transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Unable to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send message: {0}")]
    Send(#[source] std::io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// A received message that could not be turned into a log record.
#[derive(Debug, thiserror::Error)]
pub enum MalformedRecord {
    #[error("undecodable payload: {0}")]
    Undecodable(#[from] rmp_serde::decode::Error),

    #[error("{0} unexpected bytes after the message")]
    TrailingBytes(usize),

    #[error("expected a record mapping, got {0}")]
    NotAMapping(&'static str),

    #[error("record key must be text, got {0}")]
    InvalidKey(String),

    #[error("field '{field}' is not valid UTF-8")]
    InvalidUtf8 { field: String },

    #[error("field '{field}' expected {expected}, got {found}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Failure reported by a [`RecordSink`](crate::sink::RecordSink).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink rejected record: {0}")]
    Rejected(String),

    #[error("Sink panicked while handling a record from logger '{0}'")]
    Panicked(String),
}

/// Non-fatal irregularities observed while stopping a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShutdownWarning {
    #[error("The stop sentinel was not acknowledged within {0:?}")]
    SentinelTimeout(Duration),

    #[error("The log server thread was still running after {0:?}")]
    WorkerJoinTimeout(Duration),
}
