//! Latency driver: one connection, round-trip time per cycle.
//!
//! A single in-flight packet is timed around each cycle. Once a second the
//! printer reports the last interval's average latency next to the running
//! average, so warmup drift stays visible.

use super::{connect, echo_cycle, FILL_BYTE};
use crate::config::ClientConfig;
use bytes::BytesMut;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Builder;

#[derive(Default)]
struct LatencyRecorder {
    sum_ns: AtomicU64,
    count: AtomicU64,
}

impl LatencyRecorder {
    fn record(&self, elapsed: Duration) {
        self.sum_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the interval accumulation, leaving it empty.
    fn drain(&self) -> (u64, u64) {
        (
            self.sum_ns.swap(0, Ordering::Relaxed),
            self.count.swap(0, Ordering::Relaxed),
        )
    }
}

fn average_us(sum_ns: u64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    sum_ns as f64 / count as f64 / 1_000.0
}

pub(super) fn run(config: &ClientConfig) -> io::Result<()> {
    // Latency wants one cycle at a time; extra workers only add jitter.
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let recorder = Arc::new(LatencyRecorder::default());

    runtime.block_on(async {
        let printer = {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                interval.tick().await;
                let mut total_ns = 0u64;
                let mut total_count = 0u64;
                loop {
                    interval.tick().await;
                    let (sum_ns, count) = recorder.drain();
                    total_ns += sum_ns;
                    total_count += count;
                    println!(
                        "latency = {:.1} us (avg {:.1} us) : qps = {} : total = {}",
                        average_us(sum_ns, count),
                        average_us(total_ns, total_count),
                        count,
                        total_count,
                    );
                }
            })
        };

        let result = cycles(config.clone(), recorder).await;
        printer.abort();
        result
    })
}

async fn cycles(config: ClientConfig, recorder: Arc<LatencyRecorder>) -> io::Result<()> {
    let mut stream = connect(&config).await?;
    let payload = vec![FILL_BYTE; config.packet_size];
    let mut inbox = BytesMut::with_capacity(config.packet_size);
    loop {
        let start = Instant::now();
        echo_cycle(&mut stream, &payload, &mut inbox).await?;
        recorder.record(start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_resets_the_interval() {
        let recorder = LatencyRecorder::default();
        recorder.record(Duration::from_micros(100));
        recorder.record(Duration::from_micros(300));

        let (sum_ns, count) = recorder.drain();
        assert_eq!(count, 2);
        assert_eq!(sum_ns, 400_000);
        assert_eq!(recorder.drain(), (0, 0));
    }

    #[test]
    fn average_handles_empty_intervals() {
        assert_eq!(average_us(0, 0), 0.0);
        assert_eq!(average_us(400_000, 2), 200.0);
    }
}
