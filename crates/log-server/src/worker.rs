// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The receive loop run on a server's worker thread.

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::codec::{self, Decoded};
use crate::config::ServerConfig;
use crate::error::SinkError;
use crate::record::LogRecord;
use crate::signal::{deadline_after, Signals, TerminatedGuard};
use crate::sink::RecordSink;
use crate::transport::{Polled, Puller};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    #[default]
    Pending,
    Bound(SocketAddr),
    /// The controller stopped waiting for the worker to bind.
    Abandoned,
}

/// State shared between a server and its worker thread.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) signals: Signals,
    endpoint: Mutex<Endpoint>,
}

impl Shared {
    /// Records the bound address and sets `running`, unless the controller
    /// already gave up on this worker.
    fn publish(&self, addr: SocketAddr) -> bool {
        let mut endpoint = self.endpoint.lock();
        if *endpoint == Endpoint::Abandoned {
            return false;
        }
        *endpoint = Endpoint::Bound(addr);
        self.signals.running.set();
        true
    }

    /// Gives up on a worker that did not become ready in time.
    pub(crate) fn abandon(&self) {
        let mut endpoint = self.endpoint.lock();
        *endpoint = Endpoint::Abandoned;
        self.signals.running.clear();
    }

    pub(crate) fn bound_addr(&self) -> Option<SocketAddr> {
        match *self.endpoint.lock() {
            Endpoint::Bound(addr) => Some(addr),
            Endpoint::Pending | Endpoint::Abandoned => None,
        }
    }
}

/// Worker thread entry point.
pub(crate) fn run(config: ServerConfig, sink: Arc<dyn RecordSink>, shared: Arc<Shared>) {
    let _terminated = TerminatedGuard(&shared.signals.terminated);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build the log server runtime");
            return;
        }
    };
    runtime.block_on(receive_loop(&config, sink.as_ref(), &shared));
    drop(runtime);

    debug!(address = %config.address(), "Process log thread terminated");
}

async fn receive_loop(config: &ServerConfig, sink: &dyn RecordSink, shared: &Shared) {
    let mut puller =
        match Puller::bind(&config.host, config.port, config.socket_hwm).await {
            Ok(puller) => puller,
            Err(e) => {
                error!(error = %e, "Unable to bind the log puller");
                return;
            }
        };
    if !shared.publish(puller.local_addr()) {
        debug!("Log server startup was abandoned, exiting");
        return;
    }

    let timeouts = config.timeouts;
    let mut drain_deadline: Option<Option<Instant>> = None;
    loop {
        let mut poll = timeouts.poll;
        if !shared.signals.running.is_set() {
            let deadline = *drain_deadline.get_or_insert_with(|| {
                debug!(
                    timeout = ?timeouts.drain,
                    "Log server is no longer running, draining remaining messages"
                );
                deadline_after(timeouts.drain)
            });
            let remaining = deadline.map_or(timeouts.drain, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                debug!("Unable to process remaining log messages in time");
                break;
            }
            poll = poll.min(remaining);
        }

        let payload = match puller.poll(poll).await {
            Polled::Message(payload) => payload,
            Polled::Idle => continue,
            Polled::Closed => {
                error!("Log receive queue closed unexpectedly");
                break;
            }
        };

        match codec::decode(&payload) {
            Ok(Decoded::Sentinel) => {
                info!("Received the sentinel to shutdown");
                shared.signals.sentinel.set();
                break;
            }
            Ok(Decoded::Record(record)) => forward(sink, record),
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Dropping malformed log message");
            }
        }
    }
}

/// Hands one record to the sink. Neither an error nor a panic escapes.
fn forward(sink: &dyn RecordSink, record: LogRecord) {
    let logger = record.name.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.handle(record)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%logger, error = %e, "Failed to forward log record"),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            let e = SinkError::Panicked(logger);
            warn!(error = %e, %reason, "Failed to forward log record");
        }
    }
}
