//! Connection pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TcpStream
//!     → factory.rs (box the stream, wrap it in the shared shaper)
//!     → [traffic-shaping] stage (shaping::ShapedStream)
//!     → handler.rs ProxyHandler chain (relay, echo, or an external chain)
//! ```
//!
//! # Design Decisions
//! - Built fresh per connection; only the shaper is shared
//! - Ordering is structural: the chain receives a `ShapedConnection`, never the raw socket

pub mod factory;
pub mod handler;
pub mod stream;

pub use factory::{ConnectionPipeline, PipelineFactory, TRAFFIC_SHAPING};
pub use handler::{ConnectionContext, EchoHandler, ProxyHandler, RelayHandler};
pub use stream::{AsyncReadWrite, BoxedStream, ShapedConnection};
