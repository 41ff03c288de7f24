// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of a log server: starting the worker thread and stopping it in
//! bounded time.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{LogServerError, ShutdownWarning};
use crate::level::LogLevel;
use crate::ports;
use crate::signal::deadline_after;
use crate::sink::RecordSink;
use crate::transport::LogSender;
use crate::worker::{self, Shared};

pub const WORKER_THREAD_NAME: &str = "log-server";

/// Granularity at which `start()` notices a worker that exited early.
const READY_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Advisory conditions observed while stopping a server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub warnings: Vec<ShutdownWarning>,
}

impl ShutdownReport {
    /// Whether the worker acknowledged the sentinel and was joined in time.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Receives log records from writer processes and hands them to a sink.
///
/// The server owns a single worker thread, started by [`LogServer::start`]
/// and stopped by [`LogServer::stop`]. An instance is not restartable.
pub struct LogServer {
    config: ServerConfig,
    sink: Arc<dyn RecordSink>,
    shared: Option<Arc<Shared>>,
    worker: Option<JoinHandle<()>>,
}

impl LogServer {
    #[must_use]
    pub fn new(config: ServerConfig, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            config,
            sink,
            shared: None,
            worker: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Minimum level writers are expected to forward.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.config.log_level
    }

    /// Port the server listens on. When configured with port 0 this is the
    /// port the OS picked, once the server has started.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.shared
            .as_ref()
            .and_then(|shared| shared.bound_addr())
            .map_or(self.config.port, |addr| addr.port())
    }

    /// Bind address as `tcp://host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        ports::tcp_address(&self.config.host, self.port())
    }

    /// Address a writer on this machine should connect to.
    #[must_use]
    pub fn connect_address(&self) -> String {
        ports::tcp_address(ports::connect_host(&self.config.host), self.port())
    }

    /// Whether the worker thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        match (&self.shared, &self.worker) {
            (Some(shared), Some(_)) => !shared.signals.terminated.is_set(),
            _ => false,
        }
    }

    /// Starts the worker thread and waits until it is ready to receive.
    ///
    /// Fails with [`LogServerError::StartupTimeout`] when the worker does not
    /// bind within the startup timeout, e.g. because the port is taken. The
    /// instance is unusable afterwards.
    pub fn start(&mut self) -> Result<(), LogServerError> {
        if self.shared.is_some() {
            return Err(LogServerError::AlreadyStarted);
        }
        self.config.validate()?;

        info!(address = %self.address(), "Log server starting...");
        let shared = Arc::new(Shared::default());
        self.shared = Some(Arc::clone(&shared));

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn({
                let config = self.config.clone();
                let sink = Arc::clone(&self.sink);
                let shared = Arc::clone(&shared);
                move || worker::run(config, sink, shared)
            })
            .map_err(LogServerError::ThreadSpawn)?;
        self.worker = Some(worker);

        let startup = self.config.timeouts.startup;
        if !wait_ready(&shared, startup) {
            shared.abandon();
            error!(
                address = %self.address(),
                timeout = ?startup,
                "Log server failed to start"
            );
            return Err(LogServerError::StartupTimeout(startup));
        }

        info!(address = %self.address(), "Log server started");
        Ok(())
    }

    /// Stops the worker thread.
    ///
    /// Pushes the stop sentinel through a transient connection, waits for
    /// the worker to acknowledge it, then joins the thread with escalating
    /// timeouts. Never fails; irregularities are logged and reported. A
    /// worker that could not be joined is left detached.
    pub fn stop(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let (Some(shared), Some(worker)) = (self.shared.clone(), self.worker.take()) else {
            warn!(address = %self.address(), "Log server is not running");
            return report;
        };

        info!(address = %self.address(), "Log server stopping...");
        let timeouts = self.config.timeouts;
        let started = Instant::now();

        // A writer may already have sent a sentinel of its own.
        if !shared.signals.terminated.is_set() {
            let sender = self.send_sentinel(&shared, timeouts.sentinel_ack);
            let acknowledged = shared
                .signals
                .sentinel
                .wait(timeouts.sentinel_ack.saturating_sub(started.elapsed()));
            if !acknowledged {
                let warning = ShutdownWarning::SentinelTimeout(timeouts.sentinel_ack);
                warn!(warning = %warning, "Log server did not acknowledge the sentinel");
                report.warnings.push(warning);
            }
            if let Some(sender) = sender {
                if let Err(e) = sender.close() {
                    debug!(error = %e, "Failed to close the sentinel connection");
                }
            }
        }

        shared.signals.running.clear();

        info!("Joining the logging server process thread");
        let joined = [timeouts.join, timeouts.join_retry]
            .into_iter()
            .any(|timeout| {
                let terminated = shared.signals.terminated.wait(timeout);
                if !terminated {
                    warn!(
                        timeout = ?timeout,
                        "The logging server thread is still running..."
                    );
                }
                terminated
            });
        if joined {
            if worker.join().is_err() {
                warn!("The logging server thread panicked");
            }
            debug!(address = %self.address(), "Log server stopped");
        } else {
            report.warnings.push(ShutdownWarning::WorkerJoinTimeout(
                timeouts.join.saturating_add(timeouts.join_retry),
            ));
        }

        report
    }

    fn send_sentinel(&self, shared: &Shared, timeout: Duration) -> Option<LogSender> {
        let Some(addr) = shared.bound_addr() else {
            warn!("Log server has no bound address, unable to send the sentinel");
            return None;
        };
        let host = ports::connect_host(&self.config.host);
        let mut sender = match LogSender::connect(host, addr.port(), timeout) {
            Ok(sender) => sender,
            Err(e) => {
                warn!(error = %e, "Unable to connect to the log server");
                return None;
            }
        };
        match sender.send_sentinel() {
            Ok(()) => {
                debug!("Sent sentinel to trigger log server shutdown");
                Some(sender)
            }
            Err(e) => {
                warn!(error = %e, "Failed to send the sentinel to the log server");
                None
            }
        }
    }
}

/// Waits for the worker to set `running`, giving up early if it exits.
fn wait_ready(shared: &Shared, timeout: Duration) -> bool {
    let deadline = deadline_after(timeout);
    loop {
        let remaining = deadline.map_or(Duration::MAX, |deadline| {
            deadline.saturating_duration_since(Instant::now())
        });
        if shared
            .signals
            .running
            .wait(remaining.min(READY_CHECK_INTERVAL))
        {
            return true;
        }
        if remaining.is_zero() || shared.signals.terminated.is_set() {
            return false;
        }
    }
}

impl fmt::Debug for LogServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogServer")
            .field("address", &self.address())
            .field("log_level", &self.config.log_level)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for LogServer {
    /// Tells a worker that was never stopped to drain and exit on its own.
    fn drop(&mut self) {
        if let Some(shared) = &self.shared {
            if self.worker.is_some() && !shared.signals.terminated.is_set() {
                debug!("Log server dropped while running, detaching its thread");
                shared.abandon();
            }
        }
    }
}
