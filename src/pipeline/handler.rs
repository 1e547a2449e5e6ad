//! Proxy handling chain attached after traffic shaping.
//!
//! Access control, session/ticket lookup and forwarding live behind the
//! [`ProxyHandler`] seam. Two chains ship with the crate: a raw TCP relay to a
//! fixed upstream and an echo chain.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::net::connection::ConnectionId;
use crate::pipeline::stream::ShapedConnection;

/// Per-connection facts shared with the proxy chain unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    /// Index of the bound socket that accepted the connection.
    pub listener: usize,
}

/// The externally supplied part of a connection pipeline.
pub trait ProxyHandler: Send + Sync + 'static {
    /// Name shown in the pipeline's handler list.
    fn name(&self) -> &str;

    /// Drive the connection to completion.
    fn handle<'a>(
        &'a self,
        ctx: ConnectionContext,
        stream: ShapedConnection,
    ) -> BoxFuture<'a, io::Result<()>>;
}

/// Writes every received byte back to the client.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl ProxyHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    fn handle<'a>(
        &'a self,
        ctx: ConnectionContext,
        stream: ShapedConnection,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let (mut reader, mut writer) = tokio::io::split(stream);
            let echoed = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.shutdown().await?;
            tracing::debug!(connection_id = %ctx.id, bytes = echoed, "Echo finished");
            Ok(())
        })
    }
}

/// Relays the connection byte-for-byte to a fixed upstream.
#[derive(Debug, Clone)]
pub struct RelayHandler {
    upstream: SocketAddr,
    connect_timeout: Duration,
}

impl RelayHandler {
    pub fn new(upstream: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            upstream,
            connect_timeout,
        }
    }
}

impl ProxyHandler for RelayHandler {
    fn name(&self) -> &str {
        "relay"
    }

    fn handle<'a>(
        &'a self,
        ctx: ConnectionContext,
        mut stream: ShapedConnection,
    ) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let connect = TcpStream::connect(self.upstream);
            let mut upstream = match tokio::time::timeout(self.connect_timeout, connect).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", self.upstream),
                    ))
                }
            };
            upstream.set_nodelay(true)?;

            let (from_client, to_client) =
                tokio::io::copy_bidirectional(&mut stream, &mut upstream).await?;

            tracing::debug!(
                connection_id = %ctx.id,
                upstream = %self.upstream,
                from_client,
                to_client,
                "Relay finished"
            );
            Ok(())
        })
    }
}
