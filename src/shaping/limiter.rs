//! Process-wide byte-rate limiter.
//!
//! One instance is shared by reference across every connection. Each
//! direction keeps a single atomic cursor measured in bytes: window `k` owns
//! positions `[k * budget, (k + 1) * budget)`. A transfer reserves its bytes
//! with compare-and-swap immediately before it runs, and a reservation never
//! reaches past the end of the current window. Once the window is spent,
//! callers are told to wait for the next one. Budget left unused in a window
//! that has already passed is forfeited by jumping the cursor forward.
//!
//! Reservations are short-lived: the caller settles each one through
//! [`TrafficShaper::commit`] as soon as the transfer returns, giving back
//! whatever it did not use. A stream with nothing to transfer therefore holds
//! no budget, and the bytes started within one window never exceed `budget`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ListenerConfig;

/// Largest single transfer the shaper grants.
pub const MAX_CHUNK: u64 = 64 * 1024;

/// Traffic direction, from the point of view of the accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes read from the client.
    Read,
    /// Bytes written to the client.
    Write,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }
}

/// Permission to transfer up to `bytes` right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub direction: Direction,
    pub bytes: usize,
    window: u64,
}

/// Outcome of [`TrafficShaper::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Transfer now, then settle with [`TrafficShaper::commit`].
    Granted(Grant),
    /// The current window is spent; ask again after this long.
    Wait(Duration),
}

/// Counters observable by statistics collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrafficSnapshot {
    pub read_limit: u64,
    pub write_limit: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(Debug)]
struct Budget {
    /// Bytes/sec, 0 = unlimited.
    limit: u64,
    /// Bytes per check interval.
    per_window: u64,
    /// Largest grant; never more than one window.
    chunk: u64,
    cursor: AtomicU64,
    total: AtomicU64,
}

impl Budget {
    fn new(limit: u64, interval: Duration) -> Self {
        let per_window = if limit == 0 {
            0
        } else {
            let bytes = u128::from(limit) * interval.as_millis() / 1000;
            u64::try_from(bytes).unwrap_or(u64::MAX).max(1)
        };
        Self {
            limit,
            per_window,
            chunk: per_window.clamp(1, MAX_CHUNK),
            cursor: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }
}

/// Global traffic shaper for aggregate inbound and outbound bytes.
#[derive(Debug)]
pub struct TrafficShaper {
    read: Budget,
    write: Budget,
    interval: Duration,
    epoch: Instant,
}

impl TrafficShaper {
    /// Create a shaper with ceilings in bytes/sec, recomputed every `check_interval`.
    pub fn new(read_limit: u64, write_limit: u64, check_interval: Duration) -> Self {
        let interval = check_interval.max(Duration::from_millis(1));
        Self {
            read: Budget::new(read_limit, interval),
            write: Budget::new(write_limit, interval),
            interval,
            epoch: Instant::now(),
        }
    }

    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(
            config.read_limit,
            config.write_limit,
            Duration::from_millis(config.check_interval),
        )
    }

    pub fn check_interval(&self) -> Duration {
        self.interval
    }

    /// Configured ceiling in bytes/sec (0 = unlimited).
    pub fn limit(&self, direction: Direction) -> u64 {
        self.budget(direction).limit
    }

    /// Bytes allowed per check interval (0 = unlimited).
    pub fn window_budget(&self, direction: Direction) -> u64 {
        self.budget(direction).per_window
    }

    /// Reserve up to `wanted` bytes of the current window.
    ///
    /// A granted reservation must be settled with [`commit`] once the
    /// transfer returns, including when it returned nothing.
    ///
    /// [`commit`]: TrafficShaper::commit
    pub fn reserve(&self, direction: Direction, wanted: usize) -> Reservation {
        let budget = self.budget(direction);
        if budget.limit == 0 || wanted == 0 {
            return Reservation::Granted(Grant {
                direction,
                bytes: wanted,
                window: 0,
            });
        }

        let (now_ns, interval_ns) = self.clock();
        let current = now_ns / interval_ns;
        let floor = current.saturating_mul(budget.per_window);
        let window_end = floor.saturating_add(budget.per_window);

        let mut cursor = budget.cursor.load(Ordering::Acquire);
        loop {
            let start = cursor.max(floor);
            if start >= window_end {
                let opens_at = (start / budget.per_window).saturating_mul(interval_ns);
                let delay = Duration::from_nanos(opens_at.saturating_sub(now_ns).max(1));
                metrics::counter!("ingress_shaping_delays_total", "direction" => direction.as_str())
                    .increment(1);
                tracing::trace!(
                    direction = direction.as_str(),
                    wanted,
                    delay_ms = delay.as_millis() as u64,
                    "Transfer delayed by traffic shaping"
                );
                return Reservation::Wait(delay);
            }

            let bytes = (wanted as u64).min(budget.chunk).min(window_end - start);
            match budget.cursor.compare_exchange_weak(
                cursor,
                start + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Reservation::Granted(Grant {
                        direction,
                        bytes: bytes as usize,
                        window: current,
                    })
                }
                Err(actual) => cursor = actual,
            }
        }
    }

    /// Settle a grant once the transfer returned, `used` being the bytes
    /// actually moved. Unused bytes go back to the window they were taken
    /// from, unless that window has already closed.
    pub fn commit(&self, grant: Grant, used: usize) {
        let budget = self.budget(grant.direction);
        let used = used.min(grant.bytes);

        budget.total.fetch_add(used as u64, Ordering::Relaxed);
        if used > 0 {
            metrics::counter!("ingress_bytes_total", "direction" => grant.direction.as_str())
                .increment(used as u64);
        }

        if budget.limit == 0 || used == grant.bytes {
            return;
        }
        let (now_ns, interval_ns) = self.clock();
        if now_ns / interval_ns == grant.window {
            let unused = (grant.bytes - used) as u64;
            let _ = budget
                .cursor
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                    Some(cursor.saturating_sub(unused))
                });
        }
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            read_limit: self.read.limit,
            write_limit: self.write.limit,
            bytes_read: self.read.total.load(Ordering::Relaxed),
            bytes_written: self.write.total.load(Ordering::Relaxed),
        }
    }

    /// Nanoseconds since the epoch and the window length, both saturating.
    fn clock(&self) -> (u64, u64) {
        let interval_ns = u64::try_from(self.interval.as_nanos()).unwrap_or(u64::MAX);
        let now_ns = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        (now_ns, interval_ns.max(1))
    }

    fn budget(&self, direction: Direction) -> &Budget {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }
}
