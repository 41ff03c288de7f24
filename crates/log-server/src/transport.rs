// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Push/pull message transport over TCP.
//!
//! Writers hold a [`LogSender`] (the push side) and deliver one
//! length-delimited frame per message. The server side, [`Puller`], accepts
//! any number of writer connections and funnels their frames into a single
//! bounded queue. The queue depth is the high-water-mark: once it is full,
//! connection readers stop reading and writers are pushed back by TCP flow
//! control. Frames of one connection keep their order; frames of different
//! connections interleave arbitrarily.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::codec::{Encoder, FramedRead, LengthDelimitedCodec};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::error::TransportError;
use crate::ports;
use crate::record::LogRecord;

/// Largest accepted frame. Bigger frames close the offending connection.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Blocking push-side connection to a log server.
#[derive(Debug)]
pub struct LogSender {
    stream: TcpStream,
    codec: LengthDelimitedCodec,
    buf: BytesMut,
}

impl LogSender {
    /// Connects to `host:port`, giving up after `timeout`. The same timeout
    /// bounds every later write.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let address = ports::socket_address(host, port);
        let connect_error = |source| TransportError::Connect {
            address: ports::tcp_address(host, port),
            source,
        };

        let mut last_error = std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "address resolved to nothing",
        );
        let mut stream = None;
        for addr in address.to_socket_addrs().map_err(connect_error)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(connected) => {
                    stream = Some(connected);
                    break;
                }
                Err(e) => last_error = e,
            }
        }
        let stream = stream.ok_or_else(|| connect_error(last_error))?;
        stream.set_nodelay(true).map_err(connect_error)?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(connect_error)?;

        Ok(Self {
            stream,
            codec: frame_codec(),
            buf: BytesMut::new(),
        })
    }

    /// Sends one raw frame.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.buf.clear();
        self.codec
            .encode(Bytes::copy_from_slice(payload), &mut self.buf)
            .map_err(TransportError::Send)?;
        self.stream
            .write_all(&self.buf)
            .map_err(TransportError::Send)
    }

    pub fn send_record(&mut self, record: &LogRecord) -> Result<(), TransportError> {
        let payload = codec::encode_record(record)?;
        self.send_frame(&payload)
    }

    /// Sends the stop sentinel. Frames sent earlier on this connection are
    /// handled before it.
    pub fn send_sentinel(&mut self) -> Result<(), TransportError> {
        self.send_frame(codec::SENTINEL)
    }

    /// Flushes and half-closes the connection.
    pub fn close(mut self) -> Result<(), TransportError> {
        self.stream.flush().map_err(TransportError::Send)?;
        match self.stream.shutdown(Shutdown::Write) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => {
                Err(TransportError::Send(e))
            }
            _ => Ok(()),
        }
    }
}

/// Result of one bounded wait on the receive queue.
#[derive(Debug, PartialEq, Eq)]
pub enum Polled {
    Message(Bytes),
    /// Nothing arrived within the poll interval.
    Idle,
    /// The accept loop is gone; nothing will ever arrive again.
    Closed,
}

/// Bound pull-side endpoint. Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct Puller {
    rx: mpsc::Receiver<Bytes>,
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
}

impl Puller {
    pub async fn bind(host: &str, port: u16, hwm: usize) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            address: ports::tcp_address(host, port),
            source,
        };
        let listener = TcpListener::bind(ports::socket_address(host, port))
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let (tx, rx) = mpsc::channel(hwm.clamp(1, Semaphore::MAX_PERMITS));
        let acceptor = tokio::spawn(accept_loop(listener, tx));
        debug!(address = %local_addr, hwm, "Log puller bound");

        Ok(Self {
            rx,
            local_addr,
            acceptor,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits up to `timeout` for the next message.
    pub async fn poll(&mut self, timeout: Duration) -> Polled {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Polled::Message(message),
            Ok(None) => Polled::Closed,
            Err(_) => Polled::Idle,
        }
    }
}

impl Drop for Puller {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<Bytes>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                trace!(%peer, "Accepted log connection");
                tokio::spawn(read_frames(stream, peer, tx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept log connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn read_frames(stream: tokio::net::TcpStream, peer: SocketAddr, tx: mpsc::Sender<Bytes>) {
    let mut frames = FramedRead::new(stream, frame_codec());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => {
                if tx.send(frame.freeze()).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(%peer, error = %e, "Dropping log connection after a framing error");
                return;
            }
        }
    }
    trace!(%peer, "Log connection closed");
}
