//! Http-mode session.
//!
//! Byte-stream framing: requests are delimited by a blank line
//! (`\r\n\r\n`) and may arrive split or pipelined arbitrarily. Each
//! complete request gets the canned response; queries are attributed from
//! bytes written so throughput math matches echo mode.

use crate::runtime::RingBuffer;
use crate::stats::SessionStats;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// The fixed response written for every parsed request.
pub const CANNED_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Date: Fri, 31 Aug 2016 16:25:26 GMT\r\n\
Server: boost-asio\r\n\
Content-Type: text/html\r\n\
Content-Length: 12\r\n\
Connection: Keep-Alive\r\n\
\r\n\
Hello World!";

pub struct HttpSession {
    stream: TcpStream,
    ring: RingBuffer,
    read_size: usize,
    stats: SessionStats,
    need_echo: bool,
}

impl HttpSession {
    pub fn new(
        stream: TcpStream,
        buffer_size: usize,
        need_echo: bool,
        stats: SessionStats,
    ) -> Self {
        Self {
            stream,
            ring: RingBuffer::new(buffer_size),
            read_size: buffer_size.max(1),
            stats,
            need_echo,
        }
    }

    /// Serve the connection until the peer closes or an error occurs.
    pub async fn drive(&mut self) -> io::Result<()> {
        loop {
            self.ring.make_room(self.read_size);
            let slice = self.ring.write_slice(self.read_size);
            if slice.is_empty() {
                // Even a full compaction freed nothing; a single request
                // exceeds the whole buffer.
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "request larger than the session buffer",
                ));
            }

            let n = self.stream.read(slice).await?;
            if n == 0 {
                return Ok(());
            }
            self.ring.append(n);
            self.stats.record_recv(n);

            let mut matches = 0;
            while let Some(end) = self.ring.find_terminator() {
                self.ring.consume_to(end);
                matches += 1;
            }

            for _ in 0..matches {
                if self.need_echo {
                    self.stream.write_all(CANNED_RESPONSE).await?;
                    self.stats.record_sent(CANNED_RESPONSE.len());
                    self.stats.record_query_bytes(CANNED_RESPONSE.len());
                } else {
                    self.stats.record_query();
                }
            }
        }
    }
}
