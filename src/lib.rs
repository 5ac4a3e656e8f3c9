//! h2probe - HTTP/2 connection-reuse fault injection harness
//!
//! This crate reproduces a class of connection-reuse defects in HTTP/2
//! clients: under concurrent load, a client drawing from a shared
//! connection pool can mis-handle a server-initiated GOAWAY that lands
//! between exchanges, misrouting or dropping requests.
//!
//! The harness has two halves:
//!
//! - [`server`]: a frame-level HTTP/2 test server that speaks raw frames
//!   and deterministically alternates between serving one clean exchange
//!   and aborting the connection with GOAWAY before any response.
//! - [`driver`]: a concurrent load driver that issues overlapping
//!   requests against the server and verifies that every request is
//!   either served correctly or observed as a connection failure,
//!   never silently corrupted.

pub mod config;
pub mod driver;
pub mod h2;
pub mod net;
pub mod server;
pub mod session;
