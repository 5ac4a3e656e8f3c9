//! Command-line entry point
//!
//! Two subcommands, one per half of the harness: `serve` runs the
//! fault-injecting test server, `load` drives a request budget against
//! a target and exits 0 on a clean run, 2 when any request failed.

use clap::{Parser, Subcommand};
use h2probe::config::{DriverConfig, ServerConfig};
use h2probe::driver::Driver;
use h2probe::net;
use h2probe::server::Server;
use std::net::SocketAddr;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "h2probe", version, about = "HTTP/2 connection-reuse fault harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the test server
    Serve {
        /// Address to listen on
        #[arg(default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Answer every request 200 instead of injecting faults
        #[arg(long)]
        echo: bool,
    },

    /// Drive concurrent load against a server
    Load {
        /// Target endpoint, host:port
        target: String,

        /// Concurrent worker threads
        #[arg(short, long, default_value_t = 6)]
        jobs: usize,

        /// Total request budget across all workers (0 = unbounded)
        #[arg(long, default_value_t = 100)]
        requests: u64,

        /// Request body size in bytes
        #[arg(long, default_value_t = 100)]
        payload_size: usize,

        /// Give each worker its own connection pool
        #[arg(long)]
        private_clients: bool,

        /// Replay a request once on a fresh connection after any
        /// connection-level failure
        #[arg(long)]
        replay: bool,

        /// Per-operation network deadline in seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("h2probe: {}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Serve { addr, echo } => {
            let config = if echo {
                ServerConfig::echo(addr)
            } else {
                ServerConfig::fault_inject(addr)
            };
            let listener = net::bind_listener(config.listen)?;
            eprintln!("listening on {}", listener.local_addr()?);
            Server::new(config).serve(listener)?;
            Ok(0)
        }
        Command::Load {
            target,
            jobs,
            requests,
            payload_size,
            private_clients,
            replay,
            timeout_secs,
        } => {
            let mut config = DriverConfig::new(target);
            config.jobs = jobs;
            config.request_budget = requests;
            config.payload_len = payload_size;
            config.shared_client = !private_clients;
            config.replay = replay;
            config.request_timeout = Duration::from_secs(timeout_secs);

            let report = Driver::new(config).run()?;
            let verdict = report.verdict();
            println!("{} ({} attempted)", verdict, report.attempted);
            Ok(verdict.exit_code())
        }
    }
}
