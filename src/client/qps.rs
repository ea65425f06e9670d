//! Qps driver: many concurrent pingpong connections.

use super::{build_runtime, pingpong};
use crate::config::ClientConfig;
use crate::report::spawn_reporter;
use crate::stats::Stats;
use std::io;
use std::sync::Arc;
use tokio::task::JoinSet;

pub(super) fn run(config: &ClientConfig) -> io::Result<()> {
    let stats = Arc::new(Stats::new());
    let _reporter = spawn_reporter(Arc::clone(&stats), config.thread_num, config.packet_size);

    let runtime = build_runtime(config.thread_num)?;
    runtime.block_on(async {
        let mut sessions = JoinSet::new();
        for _ in 0..config.connections {
            sessions.spawn(pingpong::session(config.clone(), Arc::clone(&stats)));
        }

        // Sessions only return on error; the first failure ends the run.
        while let Some(finished) = sessions.join_next().await {
            match finished {
                Ok(result) => result?,
                Err(e) => return Err(io::Error::other(e)),
            }
        }
        Ok(())
    })
}
