//! DECnet routing daemon
//!
//! Loads configuration, starts the datalinks and runs the dispatcher until
//! interrupted.

use clap::Parser;
use decnet::{Config, Node};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// DECnet routing layer daemon
#[derive(Parser, Debug)]
#[command(name = "decnetd", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    info!("decnetd starting");

    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        warn!("No config files found");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    let mut node = match Node::new(config) {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to create node: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        node = %node.local().id(),
        name = %node.local().name(),
        node_type = %node.local().node_type(),
        circuits = node.circuit_count(),
        "Node created"
    );

    if let Err(e) = node.start().await {
        error!("Failed to start node: {}", e);
        std::process::exit(1);
    }

    let handle = node.handle();
    let dispatcher = tokio::spawn(async move {
        let result = node.run().await;
        (node, result)
    });

    info!("decnetd running, press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    if let Ok(snapshot) = handle.snapshot().await {
        for circuit in &snapshot.circuits {
            info!(
                circuit = %circuit.name,
                state = %circuit.state,
                adjacencies = circuit.adjacencies.len(),
                received = circuit.frames_received,
                sent = circuit.frames_sent,
                "Circuit summary"
            );
        }
        info!(
            routes = snapshot.l1.len(),
            delivered = snapshot.counters.delivered,
            forwarded = snapshot.counters.forwarded,
            "Node summary"
        );
    }

    if let Err(e) = handle.shutdown().await {
        warn!("Dispatcher shutdown request failed: {}", e);
    }

    let mut node = match dispatcher.await {
        Ok((node, Ok(()))) => node,
        Ok((node, Err(e))) => {
            warn!("Dispatcher exited with error: {}", e);
            node
        }
        Err(e) => {
            error!("Dispatcher task failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = node.stop().await {
        warn!("Error during shutdown: {}", e);
    }

    info!("decnetd shutdown complete");
}
