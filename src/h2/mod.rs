//! Raw HTTP/2 frame layer
//!
//! This module provides just enough of HTTP/2 to drive the fault
//! injection scenario from both sides: frame encoding/decoding with
//! full control over frame construction, SETTINGS handling, and a
//! blocking single-exchange client. Stream prioritization, server
//! push and flow-control accounting are deliberately absent; the
//! harness only ever sends small bodies well inside the default
//! windows.

pub mod client;
pub mod codec;
pub mod error;
pub mod frames;
pub mod settings;

pub use client::{H2Client, H2ClientBuilder, H2Response};
pub use error::{Error, ErrorCode, Result};
pub use frames::{FrameFlags, FrameType, RawFrame};
pub use settings::{Settings, SettingsBuilder};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
