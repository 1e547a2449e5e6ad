//! HTTP proxy ingress.
//!
//! Binds the proxy's listening socket(s), sizes the boss and worker pools,
//! and puts one process-wide traffic shaper in front of every connection.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod runtime;
pub mod shaping;

pub use config::GatewayConfig;
pub use error::{IngressError, ShutdownDrainError};
pub use net::{Backend, BootstrapState, HostProfile, ListenerBootstrap};
pub use shaping::TrafficShaper;
