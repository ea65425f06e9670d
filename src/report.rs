//! Once-a-second stdout reporter.
//!
//! Samples the shared counters on a plain OS thread so reporting keeps
//! ticking even when every event loop is saturated. Rates come from
//! deltas between samples; bandwidth counts sent bytes in MB/s (10^6).

use crate::stats::Stats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running reporter thread. Stops and joins on drop.
pub struct Reporter {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Reporter {
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Start printing a stats line every second.
pub fn spawn_reporter(stats: Arc<Stats>, thread_num: usize, packet_size: usize) -> Reporter {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name("reporter".into())
        .spawn(move || {
            let mut last_queries = stats.queries.load();
            let mut last_sent = stats.sent_bytes.load();
            while !stop_flag.load(Ordering::Acquire) {
                thread::sleep(REPORT_INTERVAL);
                let queries = stats.queries.load();
                let sent = stats.sent_bytes.load();
                println!(
                    "[{}] conn - {} thread : {} bytes : qps = {} : BandWidth = {:.3} MB/s",
                    stats.clients.load(),
                    thread_num,
                    packet_size,
                    queries - last_queries,
                    (sent - last_sent) as f64 / 1_000_000.0,
                );
                last_queries = queries;
                last_sent = sent;
            }
        })
        .ok();

    Reporter { stop, thread }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_stops_and_joins() {
        let stats = Arc::new(Stats::new());
        stats.queries.add(5);
        let reporter = spawn_reporter(Arc::clone(&stats), 2, 64);
        thread::sleep(Duration::from_millis(50));
        reporter.stop();
    }

    #[test]
    fn dropping_a_reporter_does_not_hang() {
        let stats = Arc::new(Stats::new());
        let _reporter = spawn_reporter(stats, 1, 64);
    }
}
