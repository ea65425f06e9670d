//! Shared benchmark counters.
//!
//! Worker threads on different event loops all bump the same query/byte
//! totals, so each counter lives alone on its own cache line to avoid false
//! sharing. The counter set is an explicitly constructed object handed
//! around in an `Arc` rather than a process global, so tests can build
//! independent sets.
//!
//! Sessions accumulate into [`SessionStats`] and either push every update
//! straight to the shared atomics (realtime) or flush at a threshold
//! (batched). Batched totals are eventually consistent while a session is
//! live and exact once it closes: the remaining accumulation flushes on drop.

use crate::config::CounterMode;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Alignment that keeps one counter per cache line.
pub const CACHE_LINE_SIZE: usize = 64;

/// Flush batched byte counters after this many read/write completions.
pub const FLUSH_MAX_OPS: u32 = 5;
/// Flush batched byte counters once this many bytes have accumulated.
pub const FLUSH_MAX_BYTES: u64 = 32768;
/// Flush the batched query counter once this many queries have accumulated.
pub const QUERY_FLUSH_INTERVAL: u64 = 100;

/// A 64-bit counter padded to a full cache line.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct PaddedU64 {
    value: AtomicU64,
}

impl PaddedU64 {
    pub const fn new(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A 32-bit counter padded to a full cache line.
///
/// Decrements saturate at zero; the live-connection count never goes
/// negative even if teardown paths race.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct PaddedU32 {
    value: AtomicU32,
}

impl PaddedU32 {
    pub const fn new(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn decrement(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub fn load(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }
}

/// The shared counter set sampled by the reporter.
#[derive(Debug, Default)]
pub struct Stats {
    /// Completed request/response cycles.
    pub queries: PaddedU64,
    /// Currently connected clients.
    pub clients: PaddedU32,
    /// Total bytes received from peers.
    pub recv_bytes: PaddedU64,
    /// Total bytes sent to peers.
    pub sent_bytes: PaddedU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-session counter accumulator.
///
/// Lives on the session's event-loop thread; only `flush` touches the
/// shared atomics.
pub struct SessionStats {
    stats: Arc<Stats>,
    mode: CounterMode,
    packet_size: u64,

    recv_bytes: u64,
    recv_ops: u32,
    sent_bytes: u64,
    sent_ops: u32,
    queries: u64,
    /// Sent bytes not yet amounting to a full packet, carried between
    /// flush boundaries for byte-stream query attribution.
    remainder: u64,
}

impl SessionStats {
    pub fn new(stats: Arc<Stats>, mode: CounterMode, packet_size: usize) -> Self {
        Self {
            stats,
            mode,
            packet_size: packet_size.max(1) as u64,
            recv_bytes: 0,
            recv_ops: 0,
            sent_bytes: 0,
            sent_ops: 0,
            queries: 0,
            remainder: 0,
        }
    }

    /// Account for `n` bytes read from the peer. Zero-length reads are
    /// valid and change nothing.
    pub fn record_recv(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.mode {
            CounterMode::Realtime => self.stats.recv_bytes.add(n as u64),
            CounterMode::Batched => {
                self.recv_bytes += n as u64;
                self.recv_ops += 1;
                if self.recv_ops >= FLUSH_MAX_OPS || self.recv_bytes >= FLUSH_MAX_BYTES {
                    self.stats.recv_bytes.add(self.recv_bytes);
                    self.recv_bytes = 0;
                    self.recv_ops = 0;
                }
            }
        }
    }

    /// Account for `n` bytes written to the peer.
    pub fn record_sent(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.mode {
            CounterMode::Realtime => self.stats.sent_bytes.add(n as u64),
            CounterMode::Batched => {
                self.sent_bytes += n as u64;
                self.sent_ops += 1;
                if self.sent_ops >= FLUSH_MAX_OPS || self.sent_bytes >= FLUSH_MAX_BYTES {
                    self.stats.sent_bytes.add(self.sent_bytes);
                    self.sent_bytes = 0;
                    self.sent_ops = 0;
                }
            }
        }
    }

    /// Count one completed request/response cycle.
    pub fn record_query(&mut self) {
        self.add_queries(1);
    }

    /// Attribute queries from a byte-stream write: every `packet_size`
    /// bytes sent counts one query, with leftover bytes carried to the
    /// next call.
    pub fn record_query_bytes(&mut self, n: usize) {
        let delta = self.remainder + n as u64;
        let queries = delta / self.packet_size;
        self.remainder = delta % self.packet_size;
        if queries > 0 {
            self.add_queries(queries);
        }
    }

    fn add_queries(&mut self, n: u64) {
        match self.mode {
            CounterMode::Realtime => self.stats.queries.add(n),
            CounterMode::Batched => {
                // Flush the whole accumulation once over the threshold;
                // a single large delta must not be dropped.
                self.queries += n;
                if self.queries >= QUERY_FLUSH_INTERVAL {
                    self.stats.queries.add(self.queries);
                    self.queries = 0;
                }
            }
        }
    }

    /// Push all local accumulation to the shared counters.
    pub fn flush(&mut self) {
        if self.recv_bytes > 0 {
            self.stats.recv_bytes.add(self.recv_bytes);
            self.recv_bytes = 0;
            self.recv_ops = 0;
        }
        if self.sent_bytes > 0 {
            self.stats.sent_bytes.add(self.sent_bytes);
            self.sent_bytes = 0;
            self.sent_ops = 0;
        }
        if self.queries > 0 {
            self.stats.queries.add(self.queries);
            self.queries = 0;
        }
    }
}

impl Drop for SessionStats {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Scope guard for the live-connection counter.
///
/// Increments on creation, decrements exactly once on drop, however the
/// session ends.
pub struct ClientGuard {
    stats: Arc<Stats>,
}

impl ClientGuard {
    pub fn new(stats: Arc<Stats>) -> Self {
        stats.clients.increment();
        Self { stats }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.stats.clients.decrement();
    }
}
