//! Listener bootstrap.
//!
//! Owns the boss and worker pools, binds the listening socket(s) for the
//! detected backend and runs one accept loop per socket on the boss pool.
//! Accepted connections are moved to the worker pool and handed to a fresh
//! pipeline.
//!
//! ```text
//! NotStarted → Binding → Listening
//!                  └───→ Failed
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::{validate_listener, ConfigError, ListenerConfig, ValidationError};
use crate::error::{IngressError, Result, ShutdownDrainError};
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::net::capability::{Backend, HostProfile};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{
    BoundSocket, Listener, ListenerError, SocketBinder, SocketInfo, SystemBinder,
};
use crate::net::options::ChannelOptionSet;
use crate::observability::{StatusSink, TracingStatusSink};
use crate::pipeline::{ConnectionContext, PipelineFactory};
use crate::runtime::{pool_size, EventLoopPool};
use crate::shaping::TrafficSnapshot;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// How long released pools give leftover tasks after the drain.
const POOL_RELEASE_GRACE: Duration = Duration::from_secs(1);

/// Bootstrap lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    NotStarted,
    Binding,
    Listening,
    Failed,
}

impl BootstrapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapState::NotStarted => "not started",
            BootstrapState::Binding => "binding",
            BootstrapState::Listening => "listening",
            BootstrapState::Failed => "failed",
        }
    }
}

struct Running {
    boss: EventLoopPool,
    worker: EventLoopPool,
    sockets: Vec<SocketInfo>,
    accept_loops: Vec<JoinHandle<()>>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
}

/// Startup orchestrator for the ingress.
pub struct ListenerBootstrap {
    config: Arc<ListenerConfig>,
    host: HostProfile,
    factory: PipelineFactory,
    binder: Arc<dyn SocketBinder>,
    sink: Arc<dyn StatusSink>,
    state: BootstrapState,
    running: Option<Running>,
}

impl std::fmt::Debug for ListenerBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBootstrap")
            .field("host", &self.config.host)
            .field("tcp_port", &self.config.tcp_port)
            .field("profile", &self.host)
            .field("factory", &self.factory)
            .field("state", &self.state)
            .field("pool_sizes", &self.pool_sizes())
            .field("sockets", &self.bound_sockets().len())
            .finish()
    }
}

impl ListenerBootstrap {
    pub fn new(config: Arc<ListenerConfig>, host: HostProfile, factory: PipelineFactory) -> Self {
        Self {
            config,
            host,
            factory,
            binder: Arc::new(SystemBinder),
            sink: Arc::new(TracingStatusSink),
            state: BootstrapState::NotStarted,
            running: None,
        }
    }

    /// Replace the socket binder.
    pub fn with_binder(mut self, binder: Arc<dyn SocketBinder>) -> Self {
        self.binder = binder;
        self
    }

    /// Replace the status sink.
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub fn host(&self) -> HostProfile {
        self.host
    }

    /// Sockets bound by a successful `start`.
    pub fn bound_sockets(&self) -> &[SocketInfo] {
        self.running.as_ref().map(|r| r.sockets.as_slice()).unwrap_or(&[])
    }

    /// Number of accept loops running on the boss pool.
    pub fn accept_loop_count(&self) -> usize {
        self.running.as_ref().map(|r| r.accept_loops.len()).unwrap_or(0)
    }

    /// (boss, worker) pool sizes, once started.
    pub fn pool_sizes(&self) -> Option<(usize, usize)> {
        self.running.as_ref().map(|r| (r.boss.size(), r.worker.size()))
    }

    /// Handle onto the boss pool, for background services such as metrics.
    pub fn boss_handle(&self) -> Option<Handle> {
        self.running.as_ref().map(|r| r.boss.handle())
    }

    pub fn active_connections(&self) -> u64 {
        self.running.as_ref().map(|r| r.tracker.active_count()).unwrap_or(0)
    }

    pub fn traffic(&self) -> TrafficSnapshot {
        self.factory.shaper().snapshot()
    }

    /// Create the pools, bind every socket and start accepting.
    ///
    /// Any failure is fatal: the bootstrap moves to `Failed` and nothing accepts.
    pub fn start(&mut self) -> Result<()> {
        if self.state != BootstrapState::NotStarted {
            return Err(IngressError::AlreadyStarted(self.state.as_str()));
        }

        let (addr, port) = match self.bind_address() {
            Ok(found) => found,
            Err(errors) => {
                self.state = BootstrapState::Failed;
                return Err(IngressError::Configuration(ConfigError::Validation(errors)));
            }
        };

        self.state = BootstrapState::Binding;
        match self.bind_and_listen(addr, port) {
            Ok(running) => {
                self.running = Some(running);
                self.state = BootstrapState::Listening;
                Ok(())
            }
            Err(e) => {
                self.state = BootstrapState::Failed;
                tracing::error!(port, error = %e, "Bootstrap failed");
                Err(e)
            }
        }
    }

    fn bind_address(&self) -> std::result::Result<(SocketAddr, u16), Vec<ValidationError>> {
        validate_listener(&self.config)?;
        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| vec![ValidationError::InvalidHost(self.config.host.clone())])?;
        let port = u16::try_from(self.config.tcp_port)
            .map_err(|_| vec![ValidationError::PortOutOfRange(self.config.tcp_port)])?;
        Ok((SocketAddr::new(ip, port), port))
    }

    fn bind_and_listen(&self, addr: SocketAddr, port: u16) -> Result<Running> {
        let config = &self.config;
        let cores = self.host.cores;

        // both pools size from the worker hint
        let size = pool_size(config.work_threads, cores);
        if config.boss_threads != 0 {
            tracing::debug!(
                boss_threads = config.boss_threads,
                threads = size,
                "bossThreads ignored, boss pool follows workThreads"
            );
        }
        let boss = EventLoopPool::new("boss", size)
            .map_err(|source| IngressError::PoolCreation { pool: "boss", source })?;
        let worker = EventLoopPool::new("worker", size)
            .map_err(|source| IngressError::PoolCreation { pool: "worker", source })?;

        let options = ChannelOptionSet::from_config(config, self.host.backend);
        self.report_start(port, &boss, &worker, &options);

        let count = self.host.socket_count();
        let mut bound = Vec::with_capacity(count);
        for index in 0..count {
            let socket = self
                .binder
                .bind(addr, &options)
                .and_then(|listener| BoundSocket::new(index, listener, options));
            match socket {
                Ok(socket) => bound.push(socket),
                Err(source) => {
                    tracing::error!(
                        port,
                        attempt = index + 1,
                        of = count,
                        error = %source,
                        "Bind failed"
                    );
                    // close the sockets bound so far before giving up
                    drop(bound);
                    worker.shutdown(Duration::ZERO);
                    boss.shutdown(Duration::ZERO);
                    return Err(IngressError::StartupBind { port, source });
                }
            }
        }

        let sockets: Vec<SocketInfo> = bound.iter().map(BoundSocket::info).collect();
        for socket in &sockets {
            self.sink
                .report(&format!("HttpProxyServer socket #{} bound to {}", socket.index, socket.local_addr));
        }

        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));
        let accept_loops = bound
            .into_iter()
            .map(|socket| {
                let accept = AcceptLoop {
                    factory: self.factory.clone(),
                    worker: worker.handle(),
                    tracker: tracker.clone(),
                    options,
                    shutdown: shutdown.subscribe(),
                };
                let limit = Arc::clone(&connection_limit);
                boss.spawn(async move {
                    match socket.into_listener(limit) {
                        Ok(listener) => accept.run(listener).await,
                        Err(e) => tracing::error!(error = %e, "Accept loop could not start"),
                    }
                })
            })
            .collect();

        tracing::info!(
            port,
            backend = %self.host.backend,
            sockets = sockets.len(),
            "Listening"
        );

        Ok(Running {
            boss,
            worker,
            sockets,
            accept_loops,
            shutdown,
            tracker,
        })
    }

    fn report_start(&self, port: u16, boss: &EventLoopPool, worker: &EventLoopPool, options: &ChannelOptionSet) {
        let cores = self.host.cores;
        match self.host.backend {
            Backend::Fast => self.sink.report(&format!(
                "HttpProxyServer listen {} use native transport and cpu {}",
                port, cores
            )),
            Backend::Portable => self.sink.report(&format!(
                "HttpProxyServer listen {} use portable transport and cpu {}",
                port, cores
            )),
        }

        if self.config.debug {
            self.sink.report(&format!(
                "thread pools: boss={} worker={}",
                boss.size(),
                worker.size()
            ));
            self.sink.report(&format!("channel options: {}", options));
            let shaper = self.factory.shaper();
            self.sink.report(&format!(
                "traffic shaping: readLimit={} writeLimit={} checkInterval={}ms",
                self.config.read_limit,
                self.config.write_limit,
                shaper.check_interval().as_millis()
            ));
        }
    }

    /// Block the calling thread until SIGINT/SIGTERM.
    pub fn wait_for_signal(&self) {
        if let Some(running) = &self.running {
            running.boss.block_on(crate::lifecycle::signals::shutdown_signal());
        }
    }

    /// Stop accepting, drain in-flight connections, then release both pools.
    ///
    /// A drain that times out is logged and returned; the pools are released
    /// regardless. Must not be called from inside a Tokio runtime.
    pub fn shutdown(mut self) -> std::result::Result<(), ShutdownDrainError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        tracing::info!(
            active_connections = running.tracker.active_count(),
            "Stopping accept loops"
        );
        running.shutdown.trigger();
        let accept_loops = running.accept_loops;
        running.boss.block_on(async {
            for handle in accept_loops {
                let _ = handle.await;
            }
        });

        let timeout = Duration::from_secs(self.config.drain_timeout_secs);
        let tracker = running.tracker;
        let drained = running.worker.block_on(tracker.wait_idle(timeout));
        if let Err(e) = &drained {
            tracing::warn!(error = %e, "Shutdown drain incomplete");
        }

        running.worker.shutdown(POOL_RELEASE_GRACE);
        running.boss.shutdown(POOL_RELEASE_GRACE);
        tracing::info!("Thread pools released");
        drained
    }
}

/// Per-socket accept loop state.
struct AcceptLoop {
    factory: PipelineFactory,
    worker: Handle,
    tracker: ConnectionTracker,
    options: ChannelOptionSet,
    shutdown: ShutdownSignal,
}

impl AcceptLoop {
    async fn run(mut self, listener: Listener) {
        let index = listener.index();
        tracing::debug!(listener = index, "Accept loop started");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.recv() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    if let Err(e) = self.options.apply_accepted(&stream) {
                        tracing::debug!(peer_addr = %peer, error = %e, "Failed to set keep-alive");
                    }
                    // re-registered on the worker pool's reactor below
                    let stream = match stream.into_std() {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!(peer_addr = %peer, error = %e, "Failed to detach accepted socket");
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let ctx = ConnectionContext {
                        id: guard.id(),
                        peer,
                        listener: index,
                    };
                    let factory = self.factory.clone();

                    self.worker.spawn(async move {
                        let _permit = permit;
                        let _guard = guard;
                        let stream = match TcpStream::from_std(stream) {
                            Ok(stream) => stream,
                            Err(e) => {
                                tracing::warn!(connection_id = %ctx.id, error = %e, "Failed to register connection");
                                return;
                            }
                        };
                        if let Err(e) = factory.build(stream, ctx).run().await {
                            tracing::debug!(
                                connection_id = %ctx.id,
                                peer_addr = %ctx.peer,
                                error = %e,
                                "Connection ended with error"
                            );
                        }
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(listener = index, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        tracing::debug!(listener = index, "Accept loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EchoHandler;
    use crate::shaping::TrafficShaper;

    fn factory() -> PipelineFactory {
        let shaper = Arc::new(TrafficShaper::new(0, 0, Duration::from_secs(1)));
        PipelineFactory::new(shaper, Arc::new(EchoHandler))
    }

    #[test]
    fn zero_port_fails_before_any_pool_or_bind() {
        let mut config = ListenerConfig::default();
        config.tcp_port = 0;
        let mut bootstrap =
            ListenerBootstrap::new(Arc::new(config), HostProfile::new(Backend::Portable, 2), factory());

        let err = bootstrap.start().unwrap_err();
        assert!(matches!(err, IngressError::Configuration(_)));
        assert_eq!(bootstrap.state(), BootstrapState::Failed);
        assert!(bootstrap.pool_sizes().is_none());
    }

    #[test]
    fn start_is_one_shot() {
        let mut config = ListenerConfig::default();
        config.tcp_port = 0;
        let mut bootstrap =
            ListenerBootstrap::new(Arc::new(config), HostProfile::new(Backend::Portable, 1), factory());
        let _ = bootstrap.start();

        assert!(matches!(
            bootstrap.start(),
            Err(IngressError::AlreadyStarted("failed"))
        ));
    }

    #[test]
    fn shutdown_before_start_is_a_no_op() {
        let bootstrap = ListenerBootstrap::new(
            Arc::new(ListenerConfig::default()),
            HostProfile::new(Backend::Portable, 1),
            factory(),
        );
        assert_eq!(bootstrap.state(), BootstrapState::NotStarted);
        assert!(bootstrap.shutdown().is_ok());
    }

    #[test]
    fn debug_output_names_state_and_port() {
        let bootstrap = ListenerBootstrap::new(
            Arc::new(ListenerConfig::default()),
            HostProfile::new(Backend::Portable, 1),
            factory(),
        );
        let rendered = format!("{:?}", bootstrap);
        assert!(rendered.starts_with("ListenerBootstrap"));
        assert!(rendered.contains("NotStarted"));
        assert!(rendered.contains("tcp_port: 8080"));
        assert!(rendered.contains("pool_sizes: None"));
    }
}
