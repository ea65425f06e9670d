use echo_bench::config::ServerConfig;
use echo_bench::report::spawn_reporter;
use echo_bench::server::Server;
use echo_bench::stats::Stats;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let stats = Arc::new(Stats::new());
    let server = match Server::bind(config.clone(), Arc::clone(&stats)) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.start() {
        error!(error = %e, "Failed to start acceptor");
        return ExitCode::FAILURE;
    }

    let _reporter = spawn_reporter(stats, config.thread_num, config.packet_size);

    let pool = match server.spawn_run() {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to start event loops");
            return ExitCode::FAILURE;
        }
    };

    match pool.join() {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "Event-loop pool failed");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("Event-loop pool panicked");
            ExitCode::FAILURE
        }
    }
}
