// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collects log records that independently running processes push over TCP
//! and hands them to a single sink inside the controlling process.
//!
//! ```no_run
//! use std::sync::Arc;
//! use log_server::{LogServer, ServerConfig, TracingSink};
//!
//! let config = ServerConfig::default();
//! let sink = Arc::new(TracingSink::new(config.log_level));
//! let mut server = LogServer::new(config, sink);
//! server.start()?;
//! // hand `server.connect_address()` to the writer processes
//! let report = server.stop();
//! assert!(report.is_clean());
//! # Ok::<(), log_server::LogServerError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod codec;
pub mod config;
pub mod error;
pub mod level;
pub mod ports;
pub mod record;
pub mod server;
pub mod sink;
pub mod transport;

mod signal;
mod worker;

pub use config::{resolve_log_level, ServerConfig, Timeouts};
pub use error::{LogServerError, MalformedRecord, ShutdownWarning, SinkError, TransportError};
pub use level::LogLevel;
pub use record::{FieldValue, LogRecord};
pub use server::{LogServer, ShutdownReport};
pub use sink::{MemorySink, RecordSink, TracingSink};
pub use transport::LogSender;
