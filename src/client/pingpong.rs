//! Pingpong driver: one connection, one packet in flight.

use super::{build_runtime, connect, echo_cycle, FILL_BYTE};
use crate::config::ClientConfig;
use crate::report::spawn_reporter;
use crate::stats::Stats;
use bytes::BytesMut;
use std::io;
use std::sync::Arc;

pub(super) fn run(config: &ClientConfig) -> io::Result<()> {
    let stats = Arc::new(Stats::new());
    let _reporter = spawn_reporter(Arc::clone(&stats), config.thread_num, config.packet_size);

    let runtime = build_runtime(config.thread_num)?;
    runtime.block_on(session(config.clone(), stats))
}

pub(super) async fn session(config: ClientConfig, stats: Arc<Stats>) -> io::Result<()> {
    let mut stream = connect(&config).await?;
    stats.clients.increment();

    let payload = vec![FILL_BYTE; config.packet_size];
    let mut inbox = BytesMut::with_capacity(config.packet_size);
    loop {
        echo_cycle(&mut stream, &payload, &mut inbox).await?;
        stats.sent_bytes.add(payload.len() as u64);
        stats.recv_bytes.add(inbox.len() as u64);
        stats.queries.add(1);
    }
}
