//! End-to-end http-mode test against a full server stack.

use echo_bench::config::{CounterMode, Mode, ServerConfig};
use echo_bench::server::{Server, CANNED_RESPONSE};
use echo_bench::stats::Stats;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        mode: Mode::Http,
        packet_size: 64,
        buffer_size: 65536,
        thread_num: 2,
        need_echo: true,
        counter_mode: CounterMode::Realtime,
        no_delay: false,
        log_level: "info".to_string(),
    }
}

#[test]
fn pipelined_requests_get_canned_responses() {
    let stats = Arc::new(Stats::new());
    let server = Server::bind(config(), Arc::clone(&stats)).unwrap();
    server.start().unwrap();
    let pool = server.spawn_run().unwrap();

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    // Three requests in a single segment-sized write.
    client
        .write_all(b"GET /1 HTTP/1.1\r\n\r\nGET /2 HTTP/1.1\r\n\r\nGET /3 HTTP/1.1\r\n\r\n")
        .unwrap();

    let mut responses = vec![0u8; 3 * CANNED_RESPONSE.len()];
    client.read_exact(&mut responses).unwrap();
    for chunk in responses.chunks(CANNED_RESPONSE.len()) {
        assert_eq!(chunk, CANNED_RESPONSE);
    }
    drop(client);

    let deadline = Instant::now() + Duration::from_secs(5);
    while stats.sent_bytes.load() != 3 * CANNED_RESPONSE.len() as u64 {
        assert!(Instant::now() < deadline, "sent bytes never settled");
        std::thread::sleep(Duration::from_millis(10));
    }

    server.shutdown();
    pool.join().unwrap().unwrap();
}

#[test]
fn requests_on_many_connections_share_one_counter_set() {
    let stats = Arc::new(Stats::new());
    let server = Server::bind(config(), Arc::clone(&stats)).unwrap();
    server.start().unwrap();
    let pool = server.spawn_run().unwrap();

    let mut response = vec![0u8; CANNED_RESPONSE.len()];
    for _ in 0..4 {
        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        client.read_exact(&mut response).unwrap();
        assert_eq!(response, CANNED_RESPONSE);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while stats.sent_bytes.load() != 4 * CANNED_RESPONSE.len() as u64 {
        assert!(Instant::now() < deadline, "sent bytes never settled");
        std::thread::sleep(Duration::from_millis(10));
    }

    server.shutdown();
    pool.join().unwrap().unwrap();
}
