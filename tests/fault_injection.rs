//! End-to-end runs of the load driver against the fault-injecting
//! server over loopback.

use h2probe::config::{DriverConfig, ServerConfig};
use h2probe::driver::{Driver, Verdict};
use h2probe::net;
use h2probe::server::Server;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

/// Spawn a server on an ephemeral port; the accept loop runs until
/// the test process exits.
fn spawn_server(echo: bool) -> SocketAddr {
    let listener = net::bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    let config = if echo {
        ServerConfig::echo(addr)
    } else {
        ServerConfig::fault_inject(addr)
    };
    thread::spawn(move || {
        let _ = Server::new(config).serve(listener);
    });
    addr
}

fn config_for(addr: SocketAddr, jobs: usize, budget: u64) -> DriverConfig {
    let mut config = DriverConfig::new(addr.to_string());
    config.jobs = jobs;
    config.request_budget = budget;
    config.payload_len = 100;
    config.request_timeout = Duration::from_secs(5);
    config
}

#[test]
fn first_request_is_served() {
    let addr = spawn_server(false);
    let report = Driver::new(config_for(addr, 1, 1)).run().unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.verdict(), Verdict::Ok);
    assert_eq!(report.verdict().exit_code(), 0);
}

#[test]
fn second_connection_is_terminated() {
    // Serve, terminate: with a budget of two, exactly one request dies
    // to the injected GOAWAY no matter how the workers interleave.
    let addr = spawn_server(false);
    let report = Driver::new(config_for(addr, 2, 2)).run().unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.verdict(), Verdict::Failed(1));
    assert_eq!(report.verdict().exit_code(), 2);
}

#[test]
fn sequential_run_alternates_deterministically() {
    let addr = spawn_server(false);
    let report = Driver::new(config_for(addr, 1, 2)).run().unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed, 1);
}

#[test]
fn empty_body_gets_400() {
    let addr = spawn_server(false);
    let mut config = config_for(addr, 1, 1);
    config.payload_len = 0;

    let report = Driver::new(config).run().unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 1);
}

#[test]
fn private_pools_hit_the_same_shared_fault() {
    // Per-worker pools change nothing: the termination policy lives in
    // the server, so half the connections still die. Wide bounds only
    // to tolerate stray transport errors under load.
    let addr = spawn_server(false);
    let mut config = config_for(addr, 6, 100);
    config.shared_client = false;

    let report = Driver::new(config).run().unwrap();
    assert_eq!(report.attempted, 100);
    assert!(
        (45..=55).contains(&report.failed),
        "expected ~50 failures, got {}",
        report.failed
    );
    assert_eq!(report.verdict().exit_code(), 2);
}

#[test]
fn budget_is_exact_across_workers() {
    // Against a well-behaved server the run is clean and the slot
    // counter hands out exactly the configured number of requests.
    let addr = spawn_server(true);
    let report = Driver::new(config_for(addr, 4, 16)).run().unwrap();

    assert_eq!(report.attempted, 16);
    assert_eq!(report.failed, 0);
    assert_eq!(report.verdict(), Verdict::Ok);
}

#[test]
fn replay_masks_the_fault() {
    // With replay on, a request killed by GOAWAY on a fresh connection
    // is retried once on another fresh connection, which the policy
    // then serves. The run comes out clean.
    let addr = spawn_server(false);
    let mut config = config_for(addr, 1, 2);
    config.replay = true;

    let report = Driver::new(config).run().unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.verdict(), Verdict::Ok);
}

#[test]
fn bad_preface_does_not_halt_the_accept_loop() {
    // A connection that fails the handshake is logged and abandoned;
    // the server must keep accepting and serving afterwards.
    use std::io::{Read, Write};

    let addr = spawn_server(false);

    let mut stream = std::net::TcpStream::connect(addr).unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    // The server abandons the connection; wait for the close.
    let mut buf = [0u8; 64];
    let _ = stream.read(&mut buf);
    drop(stream);

    // The failed handshake consumed no policy decision, so the next
    // connection is still the "serve" half of the alternation.
    let report = Driver::new(config_for(addr, 1, 1)).run().unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 0);
}

#[test]
fn repeated_runs_are_consistent() {
    // The policy counter resets after each termination, so back-to-back
    // runs against the same server see the same failure count.
    let addr = spawn_server(false);

    let first = Driver::new(config_for(addr, 1, 2)).run().unwrap();
    let second = Driver::new(config_for(addr, 1, 2)).run().unwrap();

    assert_eq!(first.failed, 1);
    assert_eq!(second.failed, first.failed);
}
