//! Global traffic shaping subsystem.
//!
//! # Data Flow
//! ```text
//! Connection read/write
//!     → stream.rs ShapedStream (reserve within the current window)
//!     → limiter.rs TrafficShaper (shared atomic cursors, one per direction)
//!     → window spent: delay this connection only, then ask again
//!     → granted: transfer, then settle with the bytes actually moved
//! ```
//!
//! # Design Decisions
//! - One shaper per process, shared by `Arc`, never copied per connection
//! - Lock-free: each reservation is a single compare-and-swap
//! - Exceeding the budget delays the operation; nothing is dropped or failed

pub mod limiter;
pub mod stream;

pub use limiter::{Direction, Grant, Reservation, TrafficShaper, TrafficSnapshot, MAX_CHUNK};
pub use stream::ShapedStream;
