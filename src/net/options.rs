//! Socket options derived from the listener configuration.

use std::io;

use socket2::{SockRef, Socket};
use tokio::net::TcpStream;

use crate::config::ListenerConfig;
use crate::net::capability::Backend;

/// Options applied to every listening socket.
///
/// The reuse options are only ever set for [`Backend::Fast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptionSet {
    pub keep_alive: bool,
    pub backlog: u32,
    pub reuse_address: bool,
    pub reuse_port: bool,
}

impl ChannelOptionSet {
    pub fn from_config(config: &ListenerConfig, backend: Backend) -> Self {
        let fast = backend == Backend::Fast;
        Self {
            keep_alive: config.keep_alive,
            backlog: config.backlog,
            reuse_address: fast,
            reuse_port: fast,
        }
    }

    /// Backlog as passed to `listen(2)`.
    pub fn listen_backlog(&self) -> i32 {
        i32::try_from(self.backlog).unwrap_or(i32::MAX)
    }

    /// Apply to a listening socket before it is bound.
    pub fn apply_listener(&self, socket: &Socket) -> io::Result<()> {
        socket.set_keepalive(self.keep_alive)?;
        if self.reuse_address {
            socket.set_reuse_address(true)?;
        }
        if self.reuse_port {
            set_reuse_port(socket)?;
        }
        Ok(())
    }

    /// Apply to an accepted connection.
    pub fn apply_accepted(&self, stream: &TcpStream) -> io::Result<()> {
        SockRef::from(stream).set_keepalive(self.keep_alive)
    }
}

#[cfg(target_os = "linux")]
fn set_reuse_port(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_port(true)
}

#[cfg(not(target_os = "linux"))]
fn set_reuse_port(_socket: &Socket) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "port reuse fan-out is only available on Linux",
    ))
}

impl std::fmt::Display for ChannelOptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SO_KEEPALIVE={} SO_BACKLOG={} SO_REUSEADDR={} SO_REUSEPORT={}",
            self.keep_alive, self.backlog, self.reuse_address, self.reuse_port
        )
    }
}
