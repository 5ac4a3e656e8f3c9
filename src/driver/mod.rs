//! Concurrent load driver
//!
//! Runs a fixed budget of POST requests against a target from a pool
//! of worker threads, counts failures, and renders a verdict. Workers
//! claim request slots from one shared atomic counter, so the budget
//! is exact regardless of how the slots interleave across workers.

pub mod pool;
pub mod verdict;

pub use pool::{ClientPool, PooledClient};
pub use verdict::{Tally, Verdict};

use crate::config::DriverConfig;
use crate::h2::{H2Response, Result as H2Result};
use bytes::Bytes;
use log::{debug, info, warn};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Driver-level errors
///
/// Request failures are not errors; they land in the tally. These are
/// the conditions that prevent a run from happening at all.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot resolve target address '{0}'")]
    InvalidTarget(String),

    #[error("worker thread panicked")]
    WorkerPanic,
}

/// Totals of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Requests attempted across all workers
    pub attempted: u64,
    /// Requests that failed (non-200 or transport error)
    pub failed: u64,
}

impl RunReport {
    /// Verdict for this run
    pub fn verdict(&self) -> Verdict {
        match self.failed {
            0 => Verdict::Ok,
            n => Verdict::Failed(n),
        }
    }
}

/// The load driver
pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    /// Create a driver for one run
    pub fn new(config: DriverConfig) -> Self {
        Driver { config }
    }

    /// Run the full request budget to completion
    pub fn run(&self) -> Result<RunReport, DriverError> {
        let target = resolve_target(&self.config.target)?;

        info!(
            "starting load: target={} jobs={} budget={} payload={}B pool={}",
            target,
            self.config.jobs,
            self.config.request_budget,
            self.config.payload_len,
            if self.config.shared_client {
                "shared"
            } else {
                "private"
            }
        );

        let slots = Arc::new(AtomicU64::new(0));
        let tally = Arc::new(Tally::new());
        let shared_pool = if self.config.shared_client {
            Some(Arc::new(ClientPool::new(
                target,
                self.config.target.clone(),
                self.config.request_timeout,
            )))
        } else {
            None
        };

        let mut handles = Vec::with_capacity(self.config.jobs);
        for _ in 0..self.config.jobs {
            let config = self.config.clone();
            let slots = Arc::clone(&slots);
            let tally = Arc::clone(&tally);
            let pool = match &shared_pool {
                Some(pool) => Arc::clone(pool),
                None => Arc::new(ClientPool::new(
                    target,
                    config.target.clone(),
                    config.request_timeout,
                )),
            };

            handles.push(thread::spawn(move || {
                worker(&config, &pool, &slots, &tally);
            }));
        }

        for handle in handles {
            handle.join().map_err(|_| DriverError::WorkerPanic)?;
        }

        let report = RunReport {
            attempted: tally.attempted(),
            failed: tally.failed(),
        };
        info!(
            "run complete: attempted={} failed={}",
            report.attempted, report.failed
        );
        Ok(report)
    }
}

fn resolve_target(target: &str) -> Result<SocketAddr, DriverError> {
    target
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| DriverError::InvalidTarget(target.to_string()))
}

/// One worker: claim slots until the budget is exhausted
fn worker(config: &DriverConfig, pool: &ClientPool, slots: &AtomicU64, tally: &Tally) {
    let payload = vec![b'x'; config.payload_len];

    loop {
        let slot = slots.fetch_add(1, Ordering::Relaxed);
        if config.request_budget > 0 && slot >= config.request_budget {
            break;
        }

        tally.record_attempt();
        match perform_request(config, pool, &payload) {
            Ok(response) if response.status() == 200 => {}
            Ok(response) => {
                warn!("request {}: status {}", slot, response.status());
                tally.record_failure();
            }
            Err(e) => {
                warn!("request {}: {}", slot, e);
                tally.record_failure();
            }
        }
    }
}

/// Issue one POST through the pool
///
/// A reused connection that dies with a connection-level error before
/// yielding any response bytes gets one transparent retry on a fresh
/// connection: the server never saw a byte of our request as accepted
/// work, so the retry cannot double-apply it. Failures on fresh
/// connections count, unless the run opted into replay.
fn perform_request(config: &DriverConfig, pool: &ClientPool, payload: &[u8]) -> H2Result<H2Response> {
    let mut checked = pool.checkout()?;
    let body = Bytes::copy_from_slice(payload);

    match checked.client.post("/", body.clone()) {
        Ok(response) => {
            pool.checkin(checked.client);
            Ok(response)
        }
        Err(e) => {
            let _ = checked.client.close();
            let retry = e.is_connection_error() && (checked.reused || config.replay);
            if !retry {
                return Err(e);
            }

            debug!(
                "retrying on fresh connection after {} failure: {}",
                if checked.reused { "reused-connection" } else { "fresh-connection" },
                e
            );
            let mut fresh = pool.dial_fresh()?;
            match fresh.post("/", body) {
                Ok(response) => {
                    pool.checkin(fresh);
                    Ok(response)
                }
                Err(e) => {
                    let _ = fresh.close();
                    Err(e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target() {
        let addr = resolve_target("127.0.0.1:8080").unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_resolve_target_invalid() {
        let err = resolve_target("not an address").unwrap_err();
        assert!(matches!(err, DriverError::InvalidTarget(_)));
    }

    #[test]
    fn test_report_verdict() {
        let clean = RunReport {
            attempted: 10,
            failed: 0,
        };
        assert_eq!(clean.verdict(), Verdict::Ok);

        let dirty = RunReport {
            attempted: 10,
            failed: 3,
        };
        assert_eq!(dirty.verdict(), Verdict::Failed(3));
        assert_eq!(dirty.verdict().exit_code(), 2);
    }
}
