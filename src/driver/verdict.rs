//! Run accounting and final verdict
//!
//! Workers record into a shared tally with relaxed atomics; the totals
//! are only read after every worker has joined, so no ordering beyond
//! the counter updates themselves is needed.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for one load run
#[derive(Debug, Default)]
pub struct Tally {
    attempted: AtomicU64,
    failed: AtomicU64,
}

impl Tally {
    /// Create an empty tally
    pub fn new() -> Self {
        Tally::default()
    }

    /// Record one request attempt
    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed request
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests attempted
    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    /// Total requests failed
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Final verdict for the run
    pub fn verdict(&self) -> Verdict {
        match self.failed() {
            0 => Verdict::Ok,
            n => Verdict::Failed(n),
        }
    }
}

/// Outcome of a completed load run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every attempted request got a 200
    Ok,
    /// This many requests failed (non-200 or transport error)
    Failed(u64),
}

impl Verdict {
    /// Process exit code for this verdict
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Ok => 0,
            Verdict::Failed(_) => 2,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Ok => write!(f, "OK"),
            Verdict::Failed(n) => write!(f, "FAILED: {} requests", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_clean_run_is_ok() {
        let tally = Tally::new();
        for _ in 0..10 {
            tally.record_attempt();
        }
        assert_eq!(tally.attempted(), 10);
        assert_eq!(tally.failed(), 0);
        assert_eq!(tally.verdict(), Verdict::Ok);
        assert_eq!(tally.verdict().exit_code(), 0);
    }

    #[test]
    fn test_failures_produce_failed_verdict() {
        let tally = Tally::new();
        for _ in 0..4 {
            tally.record_attempt();
        }
        tally.record_failure();
        tally.record_failure();
        assert_eq!(tally.verdict(), Verdict::Failed(2));
        assert_eq!(tally.verdict().exit_code(), 2);
    }

    #[test]
    fn test_concurrent_recording() {
        let tally = Arc::new(Tally::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let tally = Arc::clone(&tally);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    tally.record_attempt();
                    if i % 2 == 0 {
                        tally.record_failure();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tally.attempted(), 400);
        assert_eq!(tally.failed(), 200);
        assert!(tally.failed() <= tally.attempted());
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Ok.to_string(), "OK");
        assert_eq!(Verdict::Failed(3).to_string(), "FAILED: 3 requests");
    }
}
