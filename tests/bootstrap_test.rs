//! Listener bootstrap scenarios: socket fan-out, pool sizing, bind failures.

use std::net::SocketAddr;
use std::sync::Arc;

use http_proxy_ingress::config::ConfigError;
use http_proxy_ingress::net::{Backend, BootstrapState, SystemBinder};
use http_proxy_ingress::IngressError;

mod common;

use common::RecordingBinder;

fn wildcard(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}

#[test]
fn fast_backend_binds_one_reuse_port_socket_per_core() {
    let config = http_proxy_ingress::config::ListenerConfig {
        tcp_port: 8080,
        work_threads: 4,
        ..Default::default()
    };
    let binder = Arc::new(RecordingBinder::new());
    let (mut bootstrap, sink) = common::bootstrap(config, Backend::Fast, 8, binder.clone());

    bootstrap.start().unwrap();

    assert_eq!(bootstrap.state(), BootstrapState::Listening);
    assert_eq!(bootstrap.pool_sizes(), Some((16, 16)));
    assert_eq!(bootstrap.accept_loop_count(), 8);
    assert_eq!(bootstrap.bound_sockets().len(), 8);

    let calls = binder.calls();
    assert_eq!(calls.len(), 8);
    for call in &calls {
        assert_eq!(call.addr, wildcard(8080));
        assert!(call.options.reuse_address);
        assert!(call.options.reuse_port);
        assert!(call.options.keep_alive);
        assert_eq!(call.options.backlog, 1024);
    }

    let lines = sink.lines();
    assert_eq!(lines[0], "HttpProxyServer listen 8080 use native transport and cpu 8");

    assert!(bootstrap.shutdown().is_ok());
}

#[test]
fn portable_backend_binds_a_single_plain_socket() {
    let config = http_proxy_ingress::config::ListenerConfig {
        tcp_port: 8080,
        ..Default::default()
    };
    let binder = Arc::new(RecordingBinder::new());
    let (mut bootstrap, sink) = common::bootstrap(config, Backend::Portable, 8, binder.clone());

    bootstrap.start().unwrap();

    let calls = binder.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].options.reuse_address);
    assert!(!calls[0].options.reuse_port);
    assert_eq!(bootstrap.accept_loop_count(), 1);
    // boss and worker fall back to 2 * cores
    assert_eq!(bootstrap.pool_sizes(), Some((16, 16)));
    assert_eq!(
        sink.lines()[0],
        "HttpProxyServer listen 8080 use portable transport and cpu 8"
    );

    assert!(bootstrap.shutdown().is_ok());
}

#[test]
fn both_pools_follow_the_worker_hint() {
    let config = http_proxy_ingress::config::ListenerConfig {
        boss_threads: 3,
        work_threads: 12,
        ..Default::default()
    };
    let (mut bootstrap, _sink) =
        common::bootstrap(config, Backend::Portable, 2, Arc::new(RecordingBinder::new()));

    bootstrap.start().unwrap();
    assert_eq!(bootstrap.pool_sizes(), Some((12, 12)));
    assert!(bootstrap.shutdown().is_ok());
}

#[test]
fn port_zero_is_rejected_before_binding() {
    let config = http_proxy_ingress::config::ListenerConfig {
        tcp_port: 0,
        ..Default::default()
    };
    let binder = Arc::new(RecordingBinder::new());
    let (mut bootstrap, sink) = common::bootstrap(config, Backend::Fast, 4, binder.clone());

    let err = bootstrap.start().unwrap_err();

    assert!(matches!(
        err,
        IngressError::Configuration(ConfigError::Validation(_))
    ));
    assert_eq!(bootstrap.state(), BootstrapState::Failed);
    assert!(binder.calls().is_empty());
    assert!(sink.lines().is_empty());
}

#[test]
fn failed_bind_aborts_startup_and_closes_earlier_sockets() {
    let config = http_proxy_ingress::config::ListenerConfig {
        tcp_port: 8080,
        ..Default::default()
    };
    let binder = Arc::new(RecordingBinder::failing_on(3));
    let (mut bootstrap, _sink) = common::bootstrap(config, Backend::Fast, 4, binder.clone());

    let err = bootstrap.start().unwrap_err();

    match err {
        IngressError::StartupBind { port, source } => {
            assert_eq!(port, 8080);
            assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
        }
        other => panic!("expected bind failure, got {other:?}"),
    }
    assert_eq!(bootstrap.state(), BootstrapState::Failed);
    assert_eq!(binder.calls().len(), 3);
    assert_eq!(bootstrap.accept_loop_count(), 0);
    assert!(bootstrap.bound_sockets().is_empty());

    // the two sockets bound before the failure were released
    let bound = binder.bound();
    assert_eq!(bound.len(), 2);
    for addr in bound {
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }
}

#[test]
fn start_twice_is_refused() {
    let (mut bootstrap, _sink) = common::bootstrap(
        common::loopback_config(),
        Backend::Portable,
        1,
        Arc::new(SystemBinder),
    );
    bootstrap.start().unwrap();

    assert!(matches!(
        bootstrap.start(),
        Err(IngressError::AlreadyStarted("listening"))
    ));
    assert!(bootstrap.shutdown().is_ok());
}

#[test]
fn debug_mode_reports_pools_options_and_limits() {
    let config = http_proxy_ingress::config::ListenerConfig {
        debug: true,
        read_limit: 1000,
        ..common::loopback_config()
    };
    let (mut bootstrap, sink) =
        common::bootstrap(config, Backend::Portable, 1, Arc::new(SystemBinder));
    bootstrap.start().unwrap();

    let lines = sink.lines();
    assert!(lines.iter().any(|l| l == "thread pools: boss=2 worker=2"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("channel options: SO_KEEPALIVE=true SO_BACKLOG=1024")));
    assert!(lines
        .iter()
        .any(|l| l == "traffic shaping: readLimit=1000 writeLimit=0 checkInterval=1000ms"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("HttpProxyServer socket #0 bound to 127.0.0.1:")));

    assert!(bootstrap.shutdown().is_ok());
}
