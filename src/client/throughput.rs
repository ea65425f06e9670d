//! Throughput driver: blocking write-only firehose.
//!
//! Measures raw send bandwidth with no response to wait for, so plain
//! blocking sockets on dedicated threads beat an async runtime here. The
//! server side should run with echo disabled for this test.

use super::FILL_BYTE;
use crate::config::ClientConfig;
use crate::stats::Stats;
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub(super) fn run(config: &ClientConfig) -> io::Result<()> {
    let stats = Arc::new(Stats::new());

    // Connect everything up front so refusals fail the run immediately.
    let mut streams = Vec::with_capacity(config.connections);
    for _ in 0..config.connections {
        let stream = TcpStream::connect(config.addr())?;
        if config.no_delay {
            stream.set_nodelay(true)?;
        }
        streams.push(stream);
    }

    let mut writers = Vec::with_capacity(streams.len());
    for (i, stream) in streams.into_iter().enumerate() {
        let stats = Arc::clone(&stats);
        let packet_size = config.packet_size;
        let writer = thread::Builder::new()
            .name(format!("send-{i}"))
            .spawn(move || send_loop(stream, packet_size, stats))?;
        writers.push(writer);
    }

    let mut last_sent = 0u64;
    loop {
        thread::sleep(Duration::from_secs(1));
        let sent = stats.sent_bytes.load();
        println!(
            "[{}] conn : {} bytes : BandWidth = {:.3} MB/s",
            writers.len(),
            config.packet_size,
            (sent - last_sent) as f64 / 1_000_000.0,
        );
        last_sent = sent;

        if writers.iter().all(|w| w.is_finished()) {
            break;
        }
    }

    // All writers down means the server went away; surface the first error.
    for writer in writers {
        match writer.join() {
            Ok(result) => result?,
            Err(_) => return Err(io::Error::other("send thread panicked")),
        }
    }
    Ok(())
}

fn send_loop(mut stream: TcpStream, packet_size: usize, stats: Arc<Stats>) -> io::Result<()> {
    let payload = vec![FILL_BYTE; packet_size];
    loop {
        stream.write_all(&payload)?;
        stats.sent_bytes.add(payload.len() as u64);
        stats.queries.add(1);
    }
}
