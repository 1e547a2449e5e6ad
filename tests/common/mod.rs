//! Shared utilities for bootstrap integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_proxy_ingress::config::ListenerConfig;
use http_proxy_ingress::net::{
    Backend, ChannelOptionSet, HostProfile, ListenerBootstrap, SocketBinder, SystemBinder,
};
use http_proxy_ingress::observability::MemoryStatusSink;
use http_proxy_ingress::pipeline::{EchoHandler, PipelineFactory};
use http_proxy_ingress::shaping::TrafficShaper;

/// One recorded bind request.
#[derive(Debug, Clone, Copy)]
pub struct BindCall {
    pub addr: SocketAddr,
    pub options: ChannelOptionSet,
}

/// Records every bind request, and binds an ephemeral loopback socket in its place.
///
/// Lets a test ask for port 8080 on every core without touching that port.
#[derive(Debug, Default)]
pub struct RecordingBinder {
    calls: Mutex<Vec<BindCall>>,
    fail_on: Option<usize>,
    bound: Mutex<Vec<SocketAddr>>,
}

impl RecordingBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th bind (1-based) with `AddrInUse`.
    pub fn failing_on(n: usize) -> Self {
        Self {
            fail_on: Some(n),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<BindCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Loopback addresses actually bound on behalf of successful calls.
    pub fn bound(&self) -> Vec<SocketAddr> {
        self.bound.lock().unwrap().clone()
    }
}

impl SocketBinder for RecordingBinder {
    fn bind(&self, addr: SocketAddr, options: &ChannelOptionSet) -> io::Result<std::net::TcpListener> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(BindCall {
            addr,
            options: *options,
        });
        if Some(calls.len()) == self.fail_on {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "address already in use"));
        }

        let portable = ChannelOptionSet {
            reuse_address: false,
            reuse_port: false,
            ..*options
        };
        let listener = SystemBinder.bind(loopback(), &portable)?;
        self.bound.lock().unwrap().push(listener.local_addr()?);
        Ok(listener)
    }
}

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(loopback()).unwrap();
    listener.local_addr().unwrap().port()
}

pub fn echo_factory(config: &ListenerConfig) -> PipelineFactory {
    let shaper = Arc::new(TrafficShaper::from_config(config));
    PipelineFactory::new(shaper, Arc::new(EchoHandler))
}

/// Bootstrap for `config` on a fixed host, reporting into a memory sink.
pub fn bootstrap(
    config: ListenerConfig,
    backend: Backend,
    cores: usize,
    binder: Arc<dyn SocketBinder>,
) -> (ListenerBootstrap, Arc<MemoryStatusSink>) {
    let sink = Arc::new(MemoryStatusSink::new());
    let factory = echo_factory(&config);
    let bootstrap = ListenerBootstrap::new(Arc::new(config), HostProfile::new(backend, cores), factory)
        .with_binder(binder)
        .with_status_sink(sink.clone());
    (bootstrap, sink)
}

/// Loopback listener config on a free port, draining quickly.
pub fn loopback_config() -> ListenerConfig {
    ListenerConfig {
        host: "127.0.0.1".to_string(),
        tcp_port: free_port() as u32,
        drain_timeout_secs: 1,
        ..ListenerConfig::default()
    }
}

/// Client-side runtime, separate from the bootstrap's pools.
pub fn client_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
