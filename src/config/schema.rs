//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! ingress. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener, thread pool and traffic shaping settings.
    pub http: ListenerConfig,

    /// Upstream used by the built-in relay chain.
    pub relay: RelayConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
///
/// Loaded once at startup and shared behind an `Arc`; nothing mutates it
/// afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListenerConfig {
    /// IP address to bind (wildcard by default).
    pub host: String,

    /// Port to bind. Every fan-out socket binds this same port.
    pub tcp_port: u32,

    /// Accepted but not used for sizing: both pools follow `work_threads`.
    pub boss_threads: usize,

    /// Minimum size hint for the accept and I/O pools.
    pub work_threads: usize,

    /// Socket keep-alive on the listener and accepted sockets.
    pub keep_alive: bool,

    /// Accept backlog passed to `listen(2)`.
    pub backlog: u32,

    /// Aggregate inbound ceiling in bytes/sec. 0 disables the ceiling.
    #[serde(alias = "readLimiit")]
    pub read_limit: u64,

    /// Aggregate outbound ceiling in bytes/sec. 0 disables the ceiling.
    pub write_limit: u64,

    /// Shaping window length in milliseconds.
    pub check_interval: u64,

    /// Verbose startup reporting.
    pub debug: bool,

    /// Use the native (edge-triggered, port-reuse) backend when the host has it.
    pub native_transport: bool,

    /// Maximum concurrent connections across all listening sockets.
    pub max_connections: usize,

    /// How long shutdown waits for in-flight connections.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            tcp_port: 8080,
            boss_threads: 0,
            work_threads: 0,
            keep_alive: true,
            backlog: 1024,
            read_limit: 0,
            write_limit: 0,
            check_interval: 1000,
            debug: false,
            native_transport: true,
            max_connections: 10_000,
            drain_timeout_secs: 30,
        }
    }
}

/// Relay chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    /// Upstream address (e.g., "127.0.0.1:3128"). Without one, connections are echoed.
    pub upstream: Option<String>,

    /// Upstream connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream: None,
            connect_timeout_secs: 5,
        }
    }
}

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log event format.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
