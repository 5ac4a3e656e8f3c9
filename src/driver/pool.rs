//! Client connection pool
//!
//! The pool keeps connected HTTP/2 clients for reuse between requests.
//! This is where the defect under test lives: a pooled connection may
//! already carry a GOAWAY (or be closed outright) by the time the next
//! request checks it out. Checkout probes for that with a zero-timeout
//! poll and discards dirty connections, so a checked-out reused client
//! is clean at the moment of checkout but can still race a GOAWAY that
//! arrives in flight.

use crate::h2::{Error, H2Client, H2ClientBuilder, Result};
use crate::session::TcpSessionOps;
use log::{debug, trace};
use std::net::{SocketAddr, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

/// A client checked out of a pool
pub struct PooledClient {
    /// The connected client
    pub client: H2Client<TcpSessionOps>,
    /// True if the connection was reused from the pool rather than
    /// freshly dialed for this checkout
    pub reused: bool,
}

/// Pool of idle HTTP/2 connections to one target
pub struct ClientPool {
    target: SocketAddr,
    authority: String,
    timeout: Duration,
    idle: Mutex<Vec<H2Client<TcpSessionOps>>>,
}

impl ClientPool {
    /// Pool for one target endpoint
    pub fn new(target: SocketAddr, authority: impl Into<String>, timeout: Duration) -> Self {
        ClientPool {
            target,
            authority: authority.into(),
            timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Check out a connection, reusing an idle one when possible
    ///
    /// Idle connections with pending input (a parked GOAWAY, or EOF)
    /// are discarded rather than handed out.
    pub fn checkout(&self) -> Result<PooledClient> {
        loop {
            let candidate = {
                let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
                idle.pop()
            };

            let mut client = match candidate {
                Some(client) => client,
                None => break,
            };

            match client.has_pending_input() {
                Ok(false) => {
                    trace!("reusing pooled connection to {}", self.target);
                    return Ok(PooledClient {
                        client,
                        reused: true,
                    });
                }
                Ok(true) | Err(_) => {
                    // Parked GOAWAY or peer close; throw it away and
                    // try the next idle connection.
                    debug!("discarding stale pooled connection to {}", self.target);
                    let _ = client.close();
                }
            }
        }

        let client = self.dial_fresh()?;
        Ok(PooledClient {
            client,
            reused: false,
        })
    }

    /// Return a connection to the pool for reuse
    pub fn checkin(&self, client: H2Client<TcpSessionOps>) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.push(client);
    }

    /// Dial and handshake a new connection
    pub fn dial_fresh(&self) -> Result<H2Client<TcpSessionOps>> {
        debug!("dialing fresh connection to {}", self.target);
        let stream = TcpStream::connect_timeout(&self.target, self.timeout).map_err(Error::Io)?;
        stream.set_nodelay(true).map_err(Error::Io)?;

        let mut client = H2ClientBuilder::new()
            .authority(self.authority.clone())
            .timeout(Some(self.timeout))
            .build(TcpSessionOps::new(stream))?;
        client.connect()?;
        Ok(client)
    }

    /// Number of idle connections currently pooled
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
