//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the shared components in dependency order
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{validate_config, ConfigError, GatewayConfig, RelayConfig, ValidationError};
use crate::error::Result;
use crate::net::{HostProfile, ListenerBootstrap};
use crate::observability::StatusSink;
use crate::pipeline::{EchoHandler, PipelineFactory, ProxyHandler, RelayHandler};
use crate::shaping::{Direction, TrafficShaper};

/// Choose the handler chain behind the shaping stage.
pub fn build_chain(relay: &RelayConfig) -> Result<Arc<dyn ProxyHandler>> {
    match &relay.upstream {
        Some(upstream) => {
            let addr: SocketAddr = upstream.parse().map_err(|_| {
                ConfigError::Validation(vec![ValidationError::InvalidUpstream(upstream.clone())])
            })?;
            let timeout = Duration::from_secs(relay.connect_timeout_secs);
            Ok(Arc::new(RelayHandler::new(addr, timeout)))
        }
        None => Ok(Arc::new(EchoHandler)),
    }
}

/// Assemble a bootstrap for `config` on `host` without starting it.
pub fn assemble(config: &GatewayConfig, host: HostProfile) -> Result<ListenerBootstrap> {
    validate_config(config).map_err(ConfigError::Validation)?;

    let listener = Arc::new(config.http.clone());
    let shaper = Arc::new(TrafficShaper::from_config(&listener));
    let chain = build_chain(&config.relay)?;
    tracing::debug!(
        chain = chain.name(),
        read_limit = shaper.limit(Direction::Read),
        write_limit = shaper.limit(Direction::Write),
        "Pipeline assembled"
    );

    let factory = PipelineFactory::new(shaper, chain);
    Ok(ListenerBootstrap::new(listener, host, factory))
}

/// Detect the host, assemble and start the ingress.
pub fn launch(config: &GatewayConfig, sink: Arc<dyn StatusSink>) -> Result<ListenerBootstrap> {
    let host = HostProfile::detect(config.http.native_transport);
    tracing::info!(backend = %host.backend, cores = host.cores, "Host detected");

    let mut bootstrap = assemble(config, host)?.with_status_sink(sink);
    bootstrap.start()?;
    Ok(bootstrap)
}
