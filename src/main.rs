// src/main.rs

//! Process entry point: tracing, configuration from the environment, engine
//! run, ctrl-c shutdown. Exit codes: 0 on graceful shutdown, 1 on startup
//! misconfiguration or an unhandled fatal.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use basisbot::config::Config;
use basisbot::engine::ArbEngine;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("ethers_providers=warn".parse().expect("static directive"))
        .add_directive("hyper=warn".parse().expect("static directive"))
        .add_directive("reqwest=warn".parse().expect("static directive"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration failed");
            return ExitCode::from(1);
        }
    };

    let engine = match ArbEngine::bootstrap(config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Engine bootstrap failed: {:#}", e);
            return ExitCode::from(1);
        }
    };

    // Ctrl-C flips the shutdown token; the engine finishes its drain path
    // before run() returns.
    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, shutting down");
            shutdown.cancel();
        }
    });

    match engine.run().await {
        Ok(()) => {
            info!("Graceful shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Engine terminated with fatal error");
            ExitCode::from(1)
        }
    }
}
