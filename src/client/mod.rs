//! Benchmark client drivers.
//!
//! Each driver opens its own runtime, hammers the server with its traffic
//! pattern, and prints a line of numbers once a second until interrupted.

mod latency;
mod pingpong;
mod qps;
mod throughput;

use crate::config::{ClientConfig, TestKind};
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Builder;
use tracing::info;

/// Payload fill byte for generated packets.
pub const FILL_BYTE: u8 = b'h';

/// Run the configured benchmark. Drivers run until the process is
/// interrupted; an `Err` here means the target went away or refused us.
pub fn run_client(config: &ClientConfig) -> io::Result<()> {
    info!(
        target = %config.addr(),
        test = ?config.test,
        connections = config.connections,
        packet_size = config.packet_size,
        "Starting benchmark"
    );
    match config.test {
        TestKind::Pingpong => pingpong::run(config),
        TestKind::Qps => qps::run(config),
        TestKind::Latency => latency::run(config),
        TestKind::Throughput => throughput::run(config),
    }
}

/// Multi-threaded runtime sized for the driver.
fn build_runtime(thread_num: usize) -> io::Result<tokio::runtime::Runtime> {
    Builder::new_multi_thread()
        .worker_threads(thread_num.max(1))
        .enable_all()
        .build()
}

/// Connect and apply client-side socket options.
async fn connect(config: &ClientConfig) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(config.addr()).await?;
    if config.no_delay {
        stream.set_nodelay(true)?;
    }
    Ok(stream)
}

/// One request/response cycle: send a full packet, then collect the echo,
/// which may arrive in several reads.
async fn echo_cycle(stream: &mut TcpStream, payload: &[u8], inbox: &mut BytesMut) -> io::Result<()> {
    stream.write_all(payload).await?;
    inbox.clear();
    while inbox.len() < payload.len() {
        if stream.read_buf(inbox).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn echo_cycle_round_trips_a_packet() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut server, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            server.read_exact(&mut buf).await.unwrap();
            server.write_all(&buf).await.unwrap();
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let payload = vec![FILL_BYTE; 64];
        let mut inbox = BytesMut::with_capacity(64);
        echo_cycle(&mut stream, &payload, &mut inbox).await.unwrap();
        assert_eq!(&inbox[..], &payload[..]);
    }
}
