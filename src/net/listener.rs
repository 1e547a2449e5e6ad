//! Listening socket creation and the bounded accept path.
//!
//! # Responsibilities
//! - Create listening sockets with the chosen option set
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via a semaphore shared by all sockets
//! - Graceful handling of accept errors

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::net::options::ChannelOptionSet;

/// Creates listening sockets. The bootstrap calls this once per socket.
pub trait SocketBinder: Send + Sync {
    fn bind(&self, addr: SocketAddr, options: &ChannelOptionSet) -> io::Result<std::net::TcpListener>;
}

/// Binds real sockets through `socket2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBinder;

impl SocketBinder for SystemBinder {
    fn bind(&self, addr: SocketAddr, options: &ChannelOptionSet) -> io::Result<std::net::TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        options.apply_listener(&socket)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(options.listen_backlog())?;
        Ok(socket.into())
    }
}

/// One listening socket bound to the configured port.
#[derive(Debug)]
pub struct BoundSocket {
    index: usize,
    local_addr: SocketAddr,
    options: ChannelOptionSet,
    listener: std::net::TcpListener,
}

impl BoundSocket {
    pub fn new(
        index: usize,
        listener: std::net::TcpListener,
        options: ChannelOptionSet,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        Ok(Self {
            index,
            local_addr,
            options,
            listener,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn info(&self) -> SocketInfo {
        SocketInfo {
            index: self.index,
            local_addr: self.local_addr,
            options: self.options,
        }
    }

    /// Register with the current runtime's reactor.
    ///
    /// Must be called from inside the pool that will run the accept loop.
    pub fn into_listener(self, connection_limit: Arc<Semaphore>) -> Result<Listener, ListenerError> {
        let inner = TcpListener::from_std(self.listener).map_err(ListenerError::Register)?;
        Ok(Listener {
            index: self.index,
            inner,
            connection_limit,
        })
    }
}

/// What remains observable about a bound socket once its accept loop owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketInfo {
    pub index: usize,
    pub local_addr: SocketAddr,
    pub options: ChannelOptionSet,
}

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to hand the socket to the runtime.
    Register(io::Error),
    /// Failed to accept connection.
    Accept(io::Error),
    /// The connection limit was closed; no more connections will be accepted.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Register(e) => write!(f, "Failed to register listener: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Connection limit closed"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bounded TCP listener.
///
/// When the shared limit is reached, accepting waits until a slot frees up.
pub struct Listener {
    index: usize,
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(
            listener = self.index,
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool, even if
/// the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
