// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use log_server::{LogLevel, LogServer, ServerConfig, TracingSink};

fn init_logging(level: LogLevel) {
    let env_filter = level.filter_directive();

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging(log_server::config::DEFAULT_LOG_LEVEL);
            error!(error = %e, "Invalid log server configuration. Shutting down.");
            return;
        }
    };
    init_logging(config.log_level);
    debug!("Logging subsystem enabled");

    let sink = Arc::new(TracingSink::new(config.log_level));
    let mut server = LogServer::new(config, sink);
    if let Err(e) = server.start() {
        error!(error = %e, "Unable to start the log server");
        return;
    }
    info!(
        address = %server.address(),
        connect = %server.connect_address(),
        "Log server ready, press Ctrl-C to stop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Unable to listen for the shutdown signal");
    }

    let report = server.stop();
    for warning in &report.warnings {
        warn!(warning = %warning, "Log server shutdown was not clean");
    }
}
