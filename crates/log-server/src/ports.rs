// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bind address selection.

use std::net::{Ipv4Addr, TcpListener};

pub const LOOPBACK_HOST: &str = "127.0.0.1";
pub const WILDCARD_HOST: &str = "0.0.0.0";

/// Host the server binds to when none is configured.
///
/// Windows cannot bind to the wildcard address, so loopback is used there.
#[must_use]
pub fn default_host() -> &'static str {
    if cfg!(windows) {
        LOOPBACK_HOST
    } else {
        WILDCARD_HOST
    }
}

/// Host a local client should connect to in order to reach a server bound
/// on `bind_host`.
#[must_use]
pub fn connect_host(bind_host: &str) -> &str {
    match bind_host {
        WILDCARD_HOST | "" => LOOPBACK_HOST,
        "::" | "[::]" => "::1",
        host => host,
    }
}

/// Asks the OS for a currently unused localhost TCP port.
///
/// The probe socket is closed before returning, so another process may
/// still grab the port before the server binds it.
pub fn unused_localhost_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Formats a bind or connect address as `tcp://host:port`.
#[must_use]
pub fn tcp_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("tcp://[{host}]:{port}")
    } else {
        format!("tcp://{host}:{port}")
    }
}

/// Socket address form (`host:port`) of a host and port.
#[must_use]
pub fn socket_address(host: &str, port: u16) -> String {
    tcp_address(host, port)
        .trim_start_matches("tcp://")
        .to_string()
}
