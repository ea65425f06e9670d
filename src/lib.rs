//! echo-bench: a TCP echo/request-response benchmarking harness.
//!
//! The server accepts connections onto a pool of per-thread event loops and
//! echoes fixed-size packets (echo mode) or answers `\r\n\r\n`-terminated
//! requests with a canned HTTP response (http mode). Clients drive pingpong,
//! qps, latency, and throughput workloads against it.
//!
//! All of a session's I/O runs on the single event loop it was assigned at
//! accept time; cross-thread state is limited to the round-robin cursor, the
//! connection manager, and the cache-line-padded global counters.

pub mod client;
pub mod config;
pub mod report;
pub mod runtime;
pub mod server;
pub mod stats;
