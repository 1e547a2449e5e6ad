//! HTTP proxy ingress binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                   PROXY INGRESS                       │
//!                     │                                                       │
//!   Client ───────────┼─▶ listening socket(s)   (1, or one per core with      │
//!                     │         │                SO_REUSEPORT)                │
//!                     │         ▼                                             │
//!                     │   boss pool: accept loops                             │
//!                     │         │                                             │
//!                     │         ▼                                             │
//!                     │   worker pool: [traffic-shaping] → handler chain ─────┼─▶ Upstream
//!                     │                      ▲                                │
//!                     │                      │ one shared TrafficShaper       │
//!                     └──────────────────────────────────────────────────────┘
//! ```
//!
//! The runtimes are owned by the bootstrap, so `main` stays synchronous.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use http_proxy_ingress::config::{load_config, GatewayConfig};
use http_proxy_ingress::lifecycle::launch;
use http_proxy_ingress::observability::logging::init_logging;
use http_proxy_ingress::observability::metrics::init_metrics;
use http_proxy_ingress::observability::TracingStatusSink;

#[derive(Parser)]
#[command(name = "http-proxy-ingress")]
#[command(about = "HTTP proxy ingress with global traffic shaping", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `http.tcpPort`.
    #[arg(short, long)]
    port: Option<u32>,

    /// Verbose startup reporting.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("http-proxy-ingress: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };
    if let Some(port) = cli.port {
        config.http.tcp_port = port;
    }
    if cli.debug {
        config.http.debug = true;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-proxy-ingress starting");

    let bootstrap = match launch(&config, Arc::new(TracingStatusSink)) {
        Ok(bootstrap) => bootstrap,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    if config.observability.metrics_enabled {
        match (config.observability.metrics_address.parse(), bootstrap.boss_handle()) {
            (Ok(addr), Some(handle)) => {
                let _enter = handle.enter();
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            (Err(_), _) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
            (Ok(_), None) => {}
        }
    }

    bootstrap.wait_for_signal();

    if let Err(e) = bootstrap.shutdown() {
        tracing::warn!(error = %e, "Forced shutdown");
    }
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
