// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// platend: the platen IPP server daemon.
//
// Configuration comes from a JSON file named on the command line (or via
// PLATEN_CONFIG); absent that, defaults apply.  One printer is created at
// startup for each name in PLATEN_PRINTERS (comma separated, default
// "print"); further printers are managed over IPP with Create-Printer and
// Delete-Printer.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use platen_core::{ServerConfig, ServiceType};
use platen_server::printer::Printer;
use platen_server::{events, IppServer, ServerState};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PLATEN_CONFIG").ok());
    let config = match config_path {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => {
                info!(path, "configuration loaded");
                config
            }
            Err(err) => {
                error!(path, error = %err, "unable to load configuration");
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    if let Err(err) = tokio::fs::create_dir_all(&config.spool_dir).await {
        error!(spool = %config.spool_dir.display(), error = %err, "unable to create spool directory");
        std::process::exit(1);
    }

    let state = Arc::new(ServerState::new(config));

    let printer_names = std::env::var("PLATEN_PRINTERS").unwrap_or_else(|_| "print".into());
    for name in printer_names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let printer = Arc::new(Printer::new(
            state.next_printer_id(),
            name,
            ServiceType::Print,
            &state.config,
        ));
        state.add_printer(printer).await;
    }

    tokio::spawn(events::run_lease_sweeper(Arc::clone(&state)));

    let mut server = IppServer::new(Arc::clone(&state));
    if let Err(err) = server.start().await {
        error!(error = %err, "unable to start the IPP server");
        std::process::exit(1);
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => error!(error = %err, "unable to listen for shutdown signal"),
    }

    if let Err(err) = server.stop().await {
        error!(error = %err, "error during shutdown");
    }
}
