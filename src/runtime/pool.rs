//! Event-loop pool.
//!
//! Owns N single-threaded tokio runtimes and drives each on its own
//! dedicated OS thread. A session spawned onto a loop's handle runs every
//! one of its callbacks on that loop's thread until it finishes; nothing
//! migrates between loops.
//!
//! Each loop thread blocks on a standing shutdown-watch future, so its
//! dispatch never returns early just because no sessions are queued yet.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tracing::debug;

/// A cheap handle to one loop in the pool.
///
/// Carries the loop's index so callers (and tests) can observe which loop
/// a connection was assigned to.
#[derive(Clone)]
pub struct LoopHandle {
    index: usize,
    handle: Handle,
}

impl LoopHandle {
    /// Index of this loop within the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Spawn a task onto this loop. The task runs on the loop's thread.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

#[derive(Debug)]
struct LoopContext {
    handle: Handle,
    // Taken by `run`; a loop executes on exactly one thread.
    runtime: Mutex<Option<Runtime>>,
}

/// A fixed-size pool of event loops distributed round-robin.
#[derive(Debug)]
pub struct EventLoopPool {
    loops: Vec<LoopContext>,
    next: AtomicUsize,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl EventLoopPool {
    /// Create a pool with one loop per requested thread.
    ///
    /// Fails with `InvalidInput` if `thread_count` is zero.
    pub fn new(thread_count: usize) -> io::Result<Self> {
        if thread_count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "event-loop pool size is 0",
            ));
        }

        let mut loops = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            let runtime = Builder::new_current_thread().enable_all().build()?;
            loops.push(LoopContext {
                handle: runtime.handle().clone(),
                runtime: Mutex::new(Some(runtime)),
            });
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Self {
            loops,
            next: AtomicUsize::new(0),
            stop_tx,
            stop_rx,
        })
    }

    /// Number of loops in the pool.
    pub fn size(&self) -> usize {
        self.loops.len()
    }

    /// Spawn one thread per loop and drive them until [`stop`] is called,
    /// then join all threads. Callers wanting a detached run call this from
    /// their own thread.
    ///
    /// [`stop`]: EventLoopPool::stop
    pub fn run(&self) -> io::Result<()> {
        let mut threads = Vec::with_capacity(self.loops.len());

        for (i, ctx) in self.loops.iter().enumerate() {
            let runtime = ctx
                .runtime
                .lock()
                .map_err(|_| io::Error::other("event-loop pool mutex poisoned"))?
                .take();
            // Already consumed by an earlier run() call.
            let Some(runtime) = runtime else { continue };

            let mut stop_rx = self.stop_rx.clone();
            let thread = thread::Builder::new()
                .name(format!("loop-{i}"))
                .spawn(move || {
                    runtime.block_on(async move {
                        while !*stop_rx.borrow() {
                            if stop_rx.changed().await.is_err() {
                                break;
                            }
                        }
                    });
                    // Dropping the runtime here cancels any tasks still
                    // pending on this loop.
                    debug!(worker = i, "Event loop stopped");
                })?;
            threads.push(thread);
        }

        for thread in threads {
            let _ = thread.join();
        }
        Ok(())
    }

    /// Signal every loop to drain and return. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Next loop by round-robin cursor, wrapping.
    pub fn assign_next(&self) -> LoopHandle {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.loops.len();
        LoopHandle {
            index,
            handle: self.loops[index].handle.clone(),
        }
    }

    /// The first loop, without advancing the cursor. The acceptor lives here.
    pub fn assign_first(&self) -> LoopHandle {
        LoopHandle {
            index: 0,
            handle: self.loops[0].handle.clone(),
        }
    }
}
