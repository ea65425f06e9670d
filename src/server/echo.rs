//! Echo-mode session.
//!
//! Fixed-size framing: every request is exactly `packet_size` bytes, and
//! the response echoes those bytes back verbatim. The session reads a full
//! packet, optionally echoes it, counts one query, and repeats until the
//! peer hangs up.

use crate::config::MAX_PACKET_SIZE;
use crate::stats::SessionStats;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct EchoSession {
    stream: TcpStream,
    buf: Vec<u8>,
    stats: SessionStats,
    need_echo: bool,
}

impl EchoSession {
    pub fn new(stream: TcpStream, packet_size: usize, need_echo: bool, stats: SessionStats) -> Self {
        Self {
            stream,
            buf: vec![0u8; packet_size.clamp(1, MAX_PACKET_SIZE)],
            stats,
            need_echo,
        }
    }

    /// Serve the connection until the peer closes or an error occurs.
    ///
    /// A peer hanging up between packets is a normal end of session and
    /// returns `Ok`; hanging up mid-packet does too, since a benchmark
    /// client stopping at an arbitrary moment is expected.
    pub async fn drive(&mut self) -> io::Result<()> {
        loop {
            match self.stream.read_exact(&mut self.buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            }
            self.stats.record_recv(self.buf.len());

            if self.need_echo {
                self.stream.write_all(&self.buf).await?;
                self.stats.record_sent(self.buf.len());
            }
            self.stats.record_query();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CounterMode;
    use crate::stats::Stats;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    const PACKET: usize = 64;

    async fn session_pair(need_echo: bool) -> (EchoSession, TcpStream, Arc<Stats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let stats = Arc::new(Stats::new());
        let session = EchoSession::new(
            server,
            PACKET,
            need_echo,
            SessionStats::new(Arc::clone(&stats), CounterMode::Realtime, PACKET),
        );
        (session, client, stats)
    }

    #[tokio::test]
    async fn echoes_packets_and_counts_queries() {
        let (mut session, mut client, stats) = session_pair(true).await;
        let server = tokio::spawn(async move { session.drive().await });

        let payload = [b'h'; PACKET];
        let mut echoed = [0u8; PACKET];
        for _ in 0..10 {
            client.write_all(&payload).await.unwrap();
            client.read_exact(&mut echoed).await.unwrap();
            assert_eq!(echoed, payload);
        }
        drop(client);

        server.await.unwrap().unwrap();
        assert_eq!(stats.queries.load(), 10);
        assert_eq!(stats.recv_bytes.load(), 10 * PACKET as u64);
        assert_eq!(stats.sent_bytes.load(), 10 * PACKET as u64);
    }

    #[tokio::test]
    async fn no_echo_mode_stays_silent() {
        let (mut session, mut client, stats) = session_pair(false).await;
        let server = tokio::spawn(async move { session.drive().await });

        client.write_all(&[b'h'; PACKET]).await.unwrap();
        client.shutdown().await.unwrap();

        // The only thing left to read is EOF.
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        server.await.unwrap().unwrap();
        assert_eq!(stats.queries.load(), 1);
        assert_eq!(stats.sent_bytes.load(), 0);
    }

    #[tokio::test]
    async fn partial_final_packet_is_a_clean_close() {
        let (mut session, mut client, stats) = session_pair(true).await;
        let server = tokio::spawn(async move { session.drive().await });

        client.write_all(&[b'h'; PACKET / 2]).await.unwrap();
        drop(client);

        server.await.unwrap().unwrap();
        assert_eq!(stats.queries.load(), 0);
    }
}
