//! Crate-level error taxonomy.
//!
//! Startup failures are fatal and halt the bootstrap. Shaping delays are not
//! errors at all; they only show up as latency.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Failure while starting or stopping the ingress.
#[derive(Debug, Error)]
pub enum IngressError {
    /// Invalid or missing option, raised before any bind attempt.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A bind call failed; the process never reaches the accepting state.
    #[error("bootstrap bind failed on port {port}: {source}")]
    StartupBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A thread pool could not be created.
    #[error("failed to create {pool} pool: {source}")]
    PoolCreation {
        pool: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called on a bootstrap that already left `NotStarted`.
    #[error("bootstrap already {0}")]
    AlreadyStarted(&'static str),
}

/// In-flight connections did not finish before the drain deadline.
///
/// Logged at shutdown; never blocks process exit.
#[derive(Debug, Error)]
#[error("{pending} connection(s) still active after {timeout:?} drain")]
pub struct ShutdownDrainError {
    pub pending: u64,
    pub timeout: Duration,
}

pub type Result<T, E = IngressError> = std::result::Result<T, E>;
