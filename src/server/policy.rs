//! Termination policy
//!
//! Decides, per accepted connection, whether the server serves the
//! pending exchange or aborts the connection with GOAWAY. The counter
//! is shared by every connection accepted on one listener, so the
//! decision must happen under the lock: two connections racing to be
//! "the first" would otherwise both get served.

use std::sync::Mutex;

/// Alternating termination policy shared across a listener's connections
///
/// Produces the repeating pattern: connection 1 served, connection 2
/// terminated, connection 3 served, ... The reset makes the pattern
/// repeat indefinitely, so the fault stays reproducible over long
/// runs instead of firing once.
#[derive(Debug, Default)]
pub struct TerminationPolicy {
    count: Mutex<u32>,
}

impl TerminationPolicy {
    /// Create a fresh policy (next connection will be served)
    pub fn new() -> Self {
        TerminationPolicy {
            count: Mutex::new(0),
        }
    }

    /// Record one accepted connection and decide its fate
    ///
    /// Returns true when this connection must be terminated before any
    /// response. Single read-modify-write under the lock.
    pub fn should_terminate(&self) -> bool {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        let terminate = *count > 1;
        if terminate {
            *count = 0;
        }
        terminate
    }
}
