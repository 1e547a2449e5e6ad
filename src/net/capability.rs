//! Transport backend detection.
//!
//! The single place that decides between the native backend (edge-triggered
//! readiness plus kernel-balanced port reuse) and the portable fallback. Every
//! later branch keys off the returned [`Backend`].

/// Which transport backend the bootstrap binds with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// epoll with `SO_REUSEPORT` fan-out: one listening socket per core.
    Fast,
    /// A single listening socket, no reuse options.
    Portable,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Fast => "native",
            Backend::Portable => "portable",
        }
    }

    /// Number of listening sockets to bind for `cores` logical cores.
    pub fn socket_count(&self, cores: usize) -> usize {
        match self {
            Backend::Fast => cores.max(1),
            Backend::Portable => 1,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query the running host for the native backend.
pub fn detect() -> Backend {
    if native_available() {
        Backend::Fast
    } else {
        Backend::Portable
    }
}

#[cfg(target_os = "linux")]
fn native_available() -> bool {
    use socket2::{Domain, Socket, Type};

    // Tokio drives epoll in edge-triggered mode on Linux; what can still be
    // missing (seccomp, old kernels) is SO_REUSEPORT, so try setting it.
    match Socket::new(Domain::IPV4, Type::STREAM, None) {
        Ok(socket) => socket.set_reuse_port(true).is_ok(),
        Err(e) => {
            tracing::debug!(error = %e, "Port reuse check failed");
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn native_available() -> bool {
    false
}

/// What the bootstrap knows about the host: backend and logical core count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProfile {
    pub backend: Backend,
    pub cores: usize,
}

impl HostProfile {
    pub fn new(backend: Backend, cores: usize) -> Self {
        Self {
            backend,
            cores: cores.max(1),
        }
    }

    /// Detect the host. With `native_transport` off the portable backend is
    /// used even where the native one exists.
    pub fn detect(native_transport: bool) -> Self {
        let backend = if native_transport {
            detect()
        } else {
            Backend::Portable
        };
        Self::new(backend, num_cpus::get())
    }

    /// Listening sockets the bootstrap binds on this host.
    pub fn socket_count(&self) -> usize {
        self.backend.socket_count(self.cores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_fans_out_per_core() {
        assert_eq!(HostProfile::new(Backend::Fast, 8).socket_count(), 8);
        assert_eq!(HostProfile::new(Backend::Portable, 8).socket_count(), 1);
    }

    #[test]
    fn core_count_is_at_least_one() {
        assert_eq!(HostProfile::new(Backend::Fast, 0).cores, 1);
    }

    #[test]
    fn disabled_native_transport_is_portable() {
        let host = HostProfile::detect(false);
        assert_eq!(host.backend, Backend::Portable);
        assert!(host.cores >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_detects_native() {
        assert_eq!(detect(), Backend::Fast);
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn other_platforms_are_portable() {
        assert_eq!(detect(), Backend::Portable);
    }
}
