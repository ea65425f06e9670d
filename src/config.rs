//! Configuration for the benchmark server and client.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values. Invalid host or
//! port values are fatal: the caller reports the error and exits with
//! status 1 before any event loop starts.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Smallest packet size accepted on the command line.
pub const MIN_PACKET_SIZE: usize = 64;
/// Largest packet/buffer size anywhere in the system.
pub const MAX_PACKET_SIZE: usize = 64 * 1024;

/// Server wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fixed-size packet echo, no framing.
    Echo,
    /// `\r\n\r\n`-terminated requests answered with a canned response.
    Http,
}

/// Client benchmark driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Pingpong,
    Qps,
    Latency,
    Throughput,
}

/// How per-session counters reach the shared atomics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    /// Every byte update goes straight to the shared atomic.
    Realtime,
    /// Updates accumulate locally and flush at a threshold.
    Batched,
}

/// Command-line arguments for the benchmark server.
#[derive(Parser, Debug)]
#[command(name = "echo-server")]
#[command(version = "0.1.0")]
#[command(about = "TCP echo/http benchmark server", long_about = None)]
pub struct ServerArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// IPv4 address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u32>,

    /// Server mode
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Packet size in bytes (clamped to [64, 65536])
    #[arg(long)]
    pub packet_size: Option<usize>,

    /// Read buffer size in bytes for http mode
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Number of event-loop threads (0 = hardware concurrency)
    #[arg(long)]
    pub thread_num: Option<usize>,

    /// Echo data back (0 = read and count only)
    #[arg(long)]
    pub echo: Option<u8>,

    /// Counter update mode
    #[arg(long, value_enum)]
    pub counter_mode: Option<CounterMode>,

    /// Disable Nagle's algorithm on accepted sockets
    #[arg(long)]
    pub no_delay: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Command-line arguments for the benchmark client.
#[derive(Parser, Debug)]
#[command(name = "echo-client")]
#[command(version = "0.1.0")]
#[command(about = "TCP echo/http benchmark client", long_about = None)]
pub struct ClientArgs {
    /// IPv4 address to connect to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to connect to
    #[arg(short, long, default_value_t = 8090)]
    pub port: u32,

    /// Benchmark driver
    #[arg(long, value_enum, default_value_t = TestKind::Pingpong)]
    pub test: TestKind,

    /// Packet size in bytes (clamped to [64, 65536])
    #[arg(long, default_value_t = 64)]
    pub packet_size: usize,

    /// Number of concurrent connections (qps/throughput)
    #[arg(long, default_value_t = 1)]
    pub connections: usize,

    /// Number of runtime worker threads (0 = hardware concurrency)
    #[arg(long, default_value_t = 1)]
    pub thread_num: usize,

    /// Disable Nagle's algorithm
    #[arg(long)]
    pub no_delay: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure for the server.
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub bench: BenchSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u32,
    pub mode: Option<Mode>,
    pub thread_num: Option<usize>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: None,
            thread_num: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BenchSection {
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    pub counter_mode: Option<CounterMode>,
    #[serde(default = "default_echo")]
    pub echo: u8,
}

impl Default for BenchSection {
    fn default() -> Self {
        Self {
            packet_size: default_packet_size(),
            buffer_size: default_buffer_size(),
            counter_mode: None,
            echo: default_echo(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u32 {
    8090
}

fn default_packet_size() -> usize {
    64
}

fn default_buffer_size() -> usize {
    MAX_PACKET_SIZE
}

fn default_echo() -> u8 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: Mode,
    pub packet_size: usize,
    pub buffer_size: usize,
    pub thread_num: usize,
    pub need_echo: bool,
    pub counter_mode: CounterMode,
    pub no_delay: bool,
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = ServerArgs::parse();
        Self::resolve(cli)
    }

    /// Merge CLI args with the TOML file and validate the result.
    pub fn resolve(cli: ServerArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let host = cli.host.unwrap_or(toml_config.server.host);
        let port = cli.port.unwrap_or(toml_config.server.port);
        validate_host(&host)?;
        let port = validate_port(port)?;

        let thread_num = cli
            .thread_num
            .or(toml_config.server.thread_num)
            .unwrap_or(0);

        Ok(ServerConfig {
            host,
            port,
            mode: cli.mode.or(toml_config.server.mode).unwrap_or(Mode::Echo),
            packet_size: clamp_packet_size(
                cli.packet_size.unwrap_or(toml_config.bench.packet_size),
            ),
            buffer_size: clamp_packet_size(
                cli.buffer_size.unwrap_or(toml_config.bench.buffer_size),
            ),
            thread_num: resolve_threads(thread_num),
            need_echo: cli.echo.unwrap_or(toml_config.bench.echo) != 0,
            counter_mode: cli
                .counter_mode
                .or(toml_config.bench.counter_mode)
                .unwrap_or(CounterMode::Batched),
            no_delay: cli.no_delay,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Final resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub test: TestKind,
    pub packet_size: usize,
    pub connections: usize,
    pub thread_num: usize,
    pub no_delay: bool,
    pub log_level: String,
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(ClientArgs::parse())
    }

    pub fn resolve(cli: ClientArgs) -> Result<Self, ConfigError> {
        validate_host(&cli.host)?;
        let port = validate_port(cli.port)?;

        Ok(ClientConfig {
            host: cli.host,
            port,
            test: cli.test,
            packet_size: clamp_packet_size(cli.packet_size),
            connections: cli.connections.max(1),
            thread_num: resolve_threads(cli.thread_num),
            no_delay: cli.no_delay,
            log_level: cli.log_level,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Clamp a packet/buffer size into [MIN_PACKET_SIZE, MAX_PACKET_SIZE].
pub fn clamp_packet_size(size: usize) -> usize {
    size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE)
}

fn resolve_threads(requested: usize) -> usize {
    if requested == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        requested
    }
}

/// Check that `host` is a dotted-quad IPv4 address with each octet < 256.
pub fn validate_host(host: &str) -> Result<(), ConfigError> {
    let reject = || ConfigError::InvalidHost(host.to_string());

    if host.is_empty() || host.len() > 15 {
        return Err(reject());
    }
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 {
        return Err(reject());
    }
    for octet in octets {
        if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return Err(reject());
        }
        let value: u32 = octet.parse().map_err(|_| reject())?;
        if value > 255 {
            return Err(reject());
        }
    }
    Ok(())
}

/// Check that `port` is in (0, 65535].
pub fn validate_port(port: u32) -> Result<u16, ConfigError> {
    if port == 0 || port > u16::MAX as u32 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(port as u16)
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidHost(String),
    InvalidPort(u32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidHost(host) => {
                write!(f, "Invalid IPv4 address: '{host}'")
            }
            ConfigError::InvalidPort(port) => {
                write!(f, "Invalid port: {port} (must be in 1..=65535)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_host() {
        assert!(validate_host("127.0.0.1").is_ok());
        assert!(validate_host("0.0.0.0").is_ok());
        assert!(validate_host("255.255.255.255").is_ok());

        assert!(validate_host("999.1.1.1").is_err());
        assert!(validate_host("1.2.3").is_err());
        assert!(validate_host("1.2.3.4.5").is_err());
        assert!(validate_host("a.b.c.d").is_err());
        assert!(validate_host("").is_err());
        assert!(validate_host("1..2.3").is_err());
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port(8090).unwrap(), 8090);
        assert_eq!(validate_port(65535).unwrap(), 65535);
        assert!(validate_port(0).is_err());
        assert!(validate_port(70000).is_err());
    }

    #[test]
    fn test_clamp_packet_size() {
        assert_eq!(clamp_packet_size(1), 64);
        assert_eq!(clamp_packet_size(64), 64);
        assert_eq!(clamp_packet_size(4096), 4096);
        assert_eq!(clamp_packet_size(1 << 20), MAX_PACKET_SIZE);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            mode = "http"
            thread_num = 4

            [bench]
            packet_size = 128
            counter_mode = "realtime"
            echo = 0

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.mode, Some(Mode::Http));
        assert_eq!(config.server.thread_num, Some(4));
        assert_eq!(config.bench.packet_size, 128);
        assert_eq!(config.bench.counter_mode, Some(CounterMode::Realtime));
        assert_eq!(config.bench.echo, 0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.bench.packet_size, 64);
        assert_eq!(config.bench.buffer_size, MAX_PACKET_SIZE);
        assert_eq!(config.bench.echo, 1);
    }
}
