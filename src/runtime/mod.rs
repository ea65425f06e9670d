//! The asynchronous I/O engine.
//!
//! - `pool`: N independent single-threaded event loops, one per worker
//!   thread, assigned to connections round-robin.
//! - `ring`: the byte-stream framer used by http-mode sessions.

mod pool;
mod ring;

pub use pool::{EventLoopPool, LoopHandle};
pub use ring::RingBuffer;
