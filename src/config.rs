//! Explicit configuration records
//!
//! Both halves of the harness receive a configuration struct at
//! construction time; nothing reads process-global mutable state.

use std::net::SocketAddr;
use std::time::Duration;

/// What the test server does with each accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Alternate between serving one exchange and aborting with GOAWAY
    FaultInject,
    /// Drain every request and answer 200 unconditionally, forever
    Echo,
}

/// Test server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen: SocketAddr,
    /// Connection handling mode
    pub mode: ServerMode,
    /// Deadline for the connection preface and settings exchange
    pub handshake_timeout: Duration,
    /// Deadline applied to each read/write after the handshake
    pub io_timeout: Duration,
}

impl ServerConfig {
    /// Fault-injecting server on the given address
    pub fn fault_inject(listen: SocketAddr) -> Self {
        ServerConfig {
            listen,
            mode: ServerMode::FaultInject,
            handshake_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(5),
        }
    }

    /// Plain echo server on the given address
    pub fn echo(listen: SocketAddr) -> Self {
        ServerConfig {
            mode: ServerMode::Echo,
            ..Self::fault_inject(listen)
        }
    }
}

/// Load driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Target endpoint, `host:port`
    pub target: String,
    /// Number of concurrent worker threads
    pub jobs: usize,
    /// Total number of requests across all workers; 0 = unbounded
    pub request_budget: u64,
    /// Request body size in bytes (0 provokes the 400 branch)
    pub payload_len: usize,
    /// One shared connection pool across workers, or one pool each
    pub shared_client: bool,
    /// Opt in to transparently replaying a request once after a
    /// connection-level failure (the body is always replayable here)
    pub replay: bool,
    /// Deadline applied to every network operation
    pub request_timeout: Duration,
}

impl DriverConfig {
    /// Driver defaults matching the bug reproduction scenario:
    /// 6 workers, 100 requests, 100-byte bodies, shared pool.
    pub fn new(target: impl Into<String>) -> Self {
        DriverConfig {
            target: target.into(),
            jobs: 6,
            request_budget: 100,
            payload_len: 100,
            shared_client: true,
            replay: false,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_modes() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let fault = ServerConfig::fault_inject(addr);
        assert_eq!(fault.mode, ServerMode::FaultInject);
        assert_eq!(fault.handshake_timeout, Duration::from_secs(2));

        let echo = ServerConfig::echo(addr);
        assert_eq!(echo.mode, ServerMode::Echo);
        assert_eq!(echo.handshake_timeout, fault.handshake_timeout);
    }

    #[test]
    fn test_driver_config_defaults() {
        let config = DriverConfig::new("127.0.0.1:8080");
        assert_eq!(config.jobs, 6);
        assert_eq!(config.request_budget, 100);
        assert!(config.shared_client);
        assert!(!config.replay);
    }
}
