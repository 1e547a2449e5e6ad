//! Stream abstraction handed to the proxy chain.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::shaping::ShapedStream;

/// Combined trait for async read + write.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Type-erased connection stream.
pub type BoxedStream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// What every handler after the traffic-shaping stage receives. The raw
/// socket is never exposed, so the shaper sees every byte.
pub type ShapedConnection = ShapedStream<BoxedStream>;
