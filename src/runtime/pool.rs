//! Fixed-size execution pools.
//!
//! Each pool is a dedicated multi-thread Tokio runtime. The boss pool runs the
//! accept loops, the worker pool runs per-connection I/O.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Size a pool from a configured hint and the detected core count.
///
/// Never smaller than two threads per core so the cores stay busy while
/// connections wait on the network, even when the hint is set too low.
pub fn pool_size(hint: usize, cores: usize) -> usize {
    hint.max(cores.saturating_mul(2))
}

/// A named, fixed-size thread pool.
pub struct EventLoopPool {
    name: &'static str,
    size: usize,
    runtime: Runtime,
}

impl EventLoopPool {
    /// Build a pool with `size` threads named `http-proxy-<name>-<n>`.
    pub fn new(name: &'static str, size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let counter = Arc::new(AtomicUsize::new(1));
        let runtime = Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name_fn(move || {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                format!("http-proxy-{}-{}", name, n)
            })
            .enable_all()
            .build()?;

        tracing::debug!(pool = name, threads = size, "Thread pool created");

        Ok(Self { name, size, runtime })
    }

    /// Number of threads in the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Handle for spawning onto this pool from another pool.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Run a future to completion on the calling thread.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Release the pool's threads, giving running tasks `grace` to finish.
    ///
    /// Must not be called from inside any runtime.
    pub fn shutdown(self, grace: Duration) {
        tracing::debug!(pool = self.name, "Releasing thread pool");
        self.runtime.shutdown_timeout(grace);
    }
}

impl std::fmt::Debug for EventLoopPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_max_of_hint_and_twice_cores() {
        for hint in [0, 1, 4, 15, 16, 17, 64] {
            for cores in [1, 2, 8, 32] {
                assert_eq!(pool_size(hint, cores), hint.max(2 * cores));
            }
        }
    }

    #[test]
    fn low_hint_is_raised() {
        assert_eq!(pool_size(4, 8), 16);
    }

    #[test]
    fn high_hint_wins() {
        assert_eq!(pool_size(40, 8), 40);
    }

    #[test]
    fn pool_threads_carry_the_pool_name() {
        let pool = EventLoopPool::new("worker", 2).unwrap();
        assert_eq!(pool.size(), 2);

        let name = pool.block_on(async {
            tokio::spawn(async { std::thread::current().name().map(str::to_owned) })
                .await
                .unwrap()
        });
        assert!(name.unwrap().starts_with("http-proxy-worker-"));
        pool.shutdown(Duration::from_millis(100));
    }
}
