//! The benchmark server.
//!
//! One acceptor task on the first event loop hands each accepted socket to
//! a loop chosen round-robin; the session then runs entirely on that loop.
//! Bind failures are synchronous and fatal, accept failures are logged and
//! survived.

mod echo;
mod http;
mod manager;

pub use echo::EchoSession;
pub use http::{HttpSession, CANNED_RESPONSE};
pub use manager::{ConnectionManager, SessionHandle};

use crate::config::{Mode, ServerConfig};
use crate::runtime::{EventLoopPool, LoopHandle};
use crate::stats::{ClientGuard, SessionStats, Stats};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const LISTEN_BACKLOG: i32 = 1024;
const SOCKET_BUFFER_SIZE: usize = 64 * 1024;
const LINGER_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply the benchmark socket tuning to an accepted connection.
fn tune_socket(stream: &std::net::TcpStream, no_delay: bool) -> io::Result<()> {
    let sock = SockRef::from(stream);
    sock.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    sock.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    sock.set_linger(Some(LINGER_TIMEOUT))?;
    if no_delay {
        sock.set_nodelay(true)?;
    }
    Ok(())
}

pub struct Server {
    config: ServerConfig,
    stats: Arc<Stats>,
    pool: Arc<EventLoopPool>,
    manager: Arc<ConnectionManager>,
    // Bound synchronously, consumed by the acceptor task.
    listener: Mutex<Option<std::net::TcpListener>>,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the listening socket and build the server.
    ///
    /// All failures here (bad address, port in use, pool of size zero)
    /// happen before any thread starts; callers treat them as fatal.
    pub fn bind(config: ServerConfig, stats: Arc<Stats>) -> io::Result<Arc<Self>> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;

        let listener: std::net::TcpListener = socket.into();
        let local_addr = listener.local_addr()?;
        let pool = Arc::new(EventLoopPool::new(config.thread_num)?);

        Ok(Arc::new(Self {
            config,
            stats,
            pool,
            manager: Arc::new(ConnectionManager::new()),
            listener: Mutex::new(Some(listener)),
            local_addr,
        }))
    }

    /// The address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Install the acceptor on the first event loop. The pool must be
    /// running (or about to run) for connections to progress.
    pub fn start(self: &Arc<Self>) -> io::Result<()> {
        let listener = self
            .listener
            .lock()
            .map_err(|_| io::Error::other("listener mutex poisoned"))?
            .take()
            .ok_or_else(|| io::Error::other("server already started"))?;

        info!(
            addr = %self.local_addr,
            mode = ?self.config.mode,
            workers = self.pool.size(),
            "Server listening"
        );

        let server = Arc::clone(self);
        self.pool.assign_first().spawn(async move {
            if let Err(e) = server.accept_loop(listener).await {
                warn!(error = %e, "Acceptor exited");
            }
        });
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: std::net::TcpListener) -> io::Result<()> {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = self.dispatch(stream, peer) {
                        warn!(peer = %peer, error = %e, "Failed to hand off connection");
                    }
                }
                Err(e) => {
                    // Transient accept errors (per-process fd limits and
                    // the like) must not kill the acceptor.
                    warn!(error = %e, "Accept failed");
                }
            }
        }
    }

    /// Move an accepted socket onto its assigned loop and start a session.
    fn dispatch(&self, stream: tokio::net::TcpStream, peer: SocketAddr) -> io::Result<()> {
        let stream = stream.into_std()?;
        tune_socket(&stream, self.config.no_delay)?;

        let worker = self.pool.assign_next();
        let (key, handle) = self.manager.track();
        debug!(peer = %peer, worker = worker.index(), "Connection accepted");

        let config = self.config.clone();
        let stats = Arc::clone(&self.stats);
        let manager = Arc::clone(&self.manager);
        spawn_session(&worker, stream, peer, config, stats, manager, key, handle);
        Ok(())
    }

    /// Run the event-loop pool on a dedicated thread.
    pub fn spawn_run(self: &Arc<Self>) -> io::Result<thread::JoinHandle<io::Result<()>>> {
        let pool = Arc::clone(&self.pool);
        thread::Builder::new()
            .name("loop-pool".into())
            .spawn(move || pool.run())
    }

    /// Stop every session, then stop the pool. Idempotent.
    pub fn shutdown(&self) {
        self.manager.stop_all();
        self.pool.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_session(
    worker: &LoopHandle,
    stream: std::net::TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    stats: Arc<Stats>,
    manager: Arc<ConnectionManager>,
    key: usize,
    handle: Arc<SessionHandle>,
) {
    worker.spawn(async move {
        let _guard = ClientGuard::new(Arc::clone(&stats));
        let session_stats = SessionStats::new(stats, config.counter_mode, config.packet_size);

        let result = match tokio::net::TcpStream::from_std(stream) {
            Ok(stream) => {
                let served = async {
                    match config.mode {
                        Mode::Echo => {
                            EchoSession::new(
                                stream,
                                config.packet_size,
                                config.need_echo,
                                session_stats,
                            )
                            .drive()
                            .await
                        }
                        Mode::Http => {
                            HttpSession::new(
                                stream,
                                config.buffer_size,
                                config.need_echo,
                                session_stats,
                            )
                            .drive()
                            .await
                        }
                    }
                };
                tokio::select! {
                    r = served => r,
                    // Shutdown cancels the session mid-read; that is not
                    // an error worth logging.
                    _ = handle.stopped() => Ok(()),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            debug!(peer = %peer, error = %e, "Session ended with error");
        }
        manager.release(key);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CounterMode;

    fn test_config(port: u16) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            mode: Mode::Echo,
            packet_size: 64,
            buffer_size: 65536,
            thread_num: 1,
            need_echo: true,
            counter_mode: CounterMode::Realtime,
            no_delay: false,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn bind_to_ephemeral_port_reports_real_addr() {
        let server = Server::bind(test_config(0), Arc::new(Stats::new())).unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[test]
    fn double_start_is_an_error() {
        let server = Server::bind(test_config(0), Arc::new(Stats::new())).unwrap();
        server.start().unwrap();
        assert!(server.start().is_err());
        server.shutdown();
    }

    #[test]
    fn bind_conflict_is_synchronous() {
        let first = Server::bind(test_config(0), Arc::new(Stats::new())).unwrap();
        let port = first.local_addr().port();
        // SO_REUSEADDR does not allow two live listeners on one port.
        assert!(Server::bind(test_config(port), Arc::new(Stats::new())).is_err());
    }
}
