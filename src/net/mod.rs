//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! capability.rs (Fast or Portable backend, core count)
//!     → options.rs (socket options for that backend)
//!     → listener.rs (bind C sockets or 1, bounded accept)
//!     → bootstrap.rs (pools, accept loops, state machine)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to the pipeline on the worker pool
//! ```
//!
//! # Design Decisions
//! - Backend detection happens once; every later branch keys off its result
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod bootstrap;
pub mod capability;
pub mod connection;
pub mod listener;
pub mod options;

pub use bootstrap::{BootstrapState, ListenerBootstrap};
pub use capability::{Backend, HostProfile};
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{BoundSocket, Listener, ListenerError, SocketBinder, SocketInfo, SystemBinder};
pub use options::ChannelOptionSet;
