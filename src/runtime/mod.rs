//! Thread pool subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig hints + detected cores
//!     → pool.rs pool_size (max(hint, 2 * cores))
//!     → EventLoopPool "boss"   (accept loops)
//!     → EventLoopPool "worker" (connection I/O and handlers)
//! ```
//!
//! # Design Decisions
//! - Both pools are sized independently from their own hint
//! - Pools are read-only after construction
//! - Released by draining connections first, then shutting the runtimes down

pub mod pool;

pub use pool::{pool_size, EventLoopPool};
