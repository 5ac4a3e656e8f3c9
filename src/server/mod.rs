//! Frame-level HTTP/2 test server
//!
//! The server speaks raw frames rather than a request/response
//! abstraction so it can do something no well-behaved server would:
//! read a complete request and then, on every second accepted
//! connection, tear the connection down with GOAWAY instead of
//! answering. Served connections close right after their single
//! exchange, which forces clients back through their connection pool
//! and exposes the reuse race under concurrent load.

pub mod policy;

pub use policy::TerminationPolicy;

use crate::config::{ServerConfig, ServerMode};
use crate::h2::codec::FrameCodec;
use crate::h2::error::{Error, Result};
use crate::h2::frames::*;
use crate::h2::settings::Settings;
use crate::h2::{ErrorCode, FrameType, CONNECTION_PREFACE};
use crate::session::{Session, SessionOps, TcpSessionOps};
use bytes::Bytes;
use hpack::Encoder as HpackEncoder;
use log::{debug, warn};
use std::collections::HashMap;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// Handshake progress on one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    Complete,
    Failed,
}

/// How one exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Non-empty body, served 200
    Served200,
    /// Empty body, served 400
    Served400,
    /// Connection aborted with GOAWAY before any response
    Aborted,
}

/// One request/response unit within a connection
#[derive(Debug)]
pub struct Exchange {
    /// Stream the exchange arrived on
    pub stream_id: u32,
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Total request body length; drives the 200/400 decision
    pub body_len: usize,
    /// Terminal state, set once a response or abort is issued
    pub outcome: Option<Outcome>,
}

/// Server side of one accepted connection
///
/// Owned exclusively by its handling thread; only the termination
/// policy is shared with other connections.
pub struct Connection<S: SessionOps> {
    session: Session<S>,
    hpack_encoder: HpackEncoder<'static>,
    hpack_decoder: hpack::Decoder<'static>,
    remote_settings: Settings,
    handshake: HandshakeState,
    /// Stream registry: stream ID to its exchange
    streams: HashMap<u32, Exchange>,
}

impl<S: SessionOps> Connection<S> {
    /// Wrap an accepted transport
    pub fn new(ops: S) -> Self {
        Connection {
            session: Session::new(ops),
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: hpack::Decoder::new(),
            remote_settings: Settings::new(),
            handshake: HandshakeState::Pending,
            streams: HashMap::new(),
        }
    }

    /// Set the per-operation network deadline
    pub fn set_timeout(&mut self, timeout: std::time::Duration) {
        self.session.set_timeout(Some(timeout));
    }

    /// Current handshake state
    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake
    }

    /// Look up an exchange by stream ID
    pub fn exchange(&self, stream_id: u32) -> Option<&Exchange> {
        self.streams.get(&stream_id)
    }

    /// Server-side handshake: client preface, then settings exchange
    pub fn handshake(&mut self) -> Result<()> {
        match self.do_handshake() {
            Ok(()) => {
                self.handshake = HandshakeState::Complete;
                Ok(())
            }
            Err(e) => {
                self.handshake = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    fn do_handshake(&mut self) -> Result<()> {
        let mut preface = [0u8; CONNECTION_PREFACE.len()];
        self.session.read_exact(&mut preface)?;
        if preface != *CONNECTION_PREFACE {
            return Err(Error::MissingPreface);
        }

        // Our SETTINGS go out before we look at the client's
        let own = SettingsFrame::new(Settings::new());
        self.session
            .write_all(&FrameCodec::encode_settings_frame(&own))?;

        let frame = FrameCodec::read_frame(&mut self.session)?;
        if frame.frame_type != FrameType::Settings || frame.flags.is_ack() {
            return Err(Error::Protocol(format!(
                "Expected client SETTINGS, got {}",
                frame.frame_type
            )));
        }
        let settings = Settings::parse(&frame.payload)?;
        self.remote_settings.merge(&settings);

        self.session
            .write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::ack()))?;

        Ok(())
    }

    /// Read one complete request (HEADERS plus any DATA, to END_STREAM)
    ///
    /// Returns the stream ID of the completed exchange. Control frames
    /// arriving in between (SETTINGS ACK, PING, WINDOW_UPDATE) are
    /// handled inline.
    pub fn read_request(&mut self) -> Result<u32> {
        loop {
            let frame = FrameCodec::read_frame(&mut self.session)?;

            match frame.frame_type {
                FrameType::Headers => {
                    if !frame.flags.is_end_headers() {
                        return Err(Error::Protocol(
                            "CONTINUATION not supported by this harness".to_string(),
                        ));
                    }

                    let decoded = self
                        .hpack_decoder
                        .decode(&frame.payload)
                        .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

                    let mut method = String::new();
                    let mut path = String::new();
                    for (name, value) in decoded {
                        match name.as_slice() {
                            b":method" => method = String::from_utf8_lossy(&value).to_string(),
                            b":path" => path = String::from_utf8_lossy(&value).to_string(),
                            _ => {}
                        }
                    }

                    self.streams.insert(
                        frame.stream_id,
                        Exchange {
                            stream_id: frame.stream_id,
                            method,
                            path,
                            body_len: 0,
                            outcome: None,
                        },
                    );

                    if frame.flags.is_end_stream() {
                        return Ok(frame.stream_id);
                    }
                }
                FrameType::Data => {
                    let exchange = self.streams.get_mut(&frame.stream_id).ok_or_else(|| {
                        Error::Protocol(format!(
                            "DATA for unknown stream {}",
                            frame.stream_id
                        ))
                    })?;
                    exchange.body_len += frame.payload.len();

                    if frame.flags.is_end_stream() {
                        return Ok(frame.stream_id);
                    }
                }
                FrameType::Settings => {
                    if !frame.flags.is_ack() {
                        let settings = Settings::parse(&frame.payload)?;
                        self.remote_settings.merge(&settings);
                        self.session.write_all(&FrameCodec::encode_settings_frame(
                            &SettingsFrame::ack(),
                        ))?;
                    }
                }
                FrameType::Ping => {
                    if !frame.flags.is_ack() {
                        if frame.payload.len() != 8 {
                            return Err(Error::FrameSize(
                                "PING payload must be 8 bytes".to_string(),
                            ));
                        }
                        let mut data = [0u8; 8];
                        data.copy_from_slice(&frame.payload);
                        self.session
                            .write_all(&FrameCodec::encode_ping_frame(&PingFrame::ack(data)))?;
                    }
                }
                FrameType::WindowUpdate => {}
                FrameType::Goaway => return Err(Error::ConnectionClosed),
                FrameType::RstStream => {
                    return Err(Error::StreamReset(frame.stream_id));
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected frame while reading request: {}",
                        other
                    )));
                }
            }
        }
    }

    /// Send a complete response on a stream
    pub fn send_response(&mut self, stream_id: u32, status: u16, body: &[u8]) -> Result<()> {
        let status_str = status.to_string();
        let content_length = body.len().to_string();
        let headers: Vec<(&[u8], &[u8])> = vec![
            (b":status", status_str.as_bytes()),
            (b"content-length", content_length.as_bytes()),
        ];

        let mut block = Vec::new();
        self.hpack_encoder
            .encode_into(headers, &mut block)
            .map_err(|e| Error::Internal(format!("HPACK encode error: {}", e)))?;

        let headers_frame =
            HeadersFrame::new(stream_id, Bytes::from(block), body.is_empty(), true);
        self.session
            .write_all(&FrameCodec::encode_headers_frame(&headers_frame))?;

        if !body.is_empty() {
            let data_frame = DataFrame::new(stream_id, Bytes::copy_from_slice(body), true);
            self.session
                .write_all(&FrameCodec::encode_data_frame(&data_frame))?;
        }

        if let Some(exchange) = self.streams.get_mut(&stream_id) {
            exchange.outcome = Some(if status == 200 {
                Outcome::Served200
            } else {
                Outcome::Served400
            });
        }

        Ok(())
    }

    /// Send GOAWAY; no response will follow for pending exchanges
    pub fn send_goaway(
        &mut self,
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: &[u8],
    ) -> Result<()> {
        let frame = GoawayFrame::new(
            last_stream_id,
            error_code,
            Bytes::copy_from_slice(debug_data),
        );
        self.session
            .write_all(&FrameCodec::encode_goaway_frame(&frame))?;

        for exchange in self.streams.values_mut() {
            if exchange.outcome.is_none() {
                exchange.outcome = Some(Outcome::Aborted);
            }
        }

        Ok(())
    }

    /// Close the transport
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}

/// The fault-injecting test server
pub struct Server {
    config: ServerConfig,
    policy: Arc<TerminationPolicy>,
}

impl Server {
    /// Create a server with a fresh termination policy
    pub fn new(config: ServerConfig) -> Self {
        Server {
            config,
            policy: Arc::new(TerminationPolicy::new()),
        }
    }

    /// Accept connections until the listener errors
    ///
    /// One thread per accepted connection. Per-connection failures
    /// (handshake, read, protocol) are logged and never stop the
    /// accept loop.
    pub fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept()?;
            let config = self.config.clone();
            let policy = Arc::clone(&self.policy);

            thread::spawn(move || {
                if let Err(e) = handle_connection(stream, &config, &policy) {
                    warn!("connection from {}: {}", peer, e);
                }
            });
        }
    }
}

/// Drive one accepted connection to completion
fn handle_connection(
    stream: TcpStream,
    config: &ServerConfig,
    policy: &TerminationPolicy,
) -> Result<()> {
    let mut conn = Connection::new(TcpSessionOps::new(stream));

    conn.set_timeout(config.handshake_timeout);
    conn.handshake()?;
    conn.set_timeout(config.io_timeout);

    match config.mode {
        ServerMode::FaultInject => {
            let stream_id = conn.read_request()?;

            if policy.should_terminate() {
                debug!("terminating connection before response, stream {}", stream_id);
                conn.send_goaway(0, ErrorCode::NoError, b"nope")?;
                conn.close()?;
                return Ok(());
            }

            let body_len = conn
                .exchange(stream_id)
                .map(|e| e.body_len)
                .unwrap_or(0);
            debug!("serving stream {}, request body {} bytes", stream_id, body_len);

            if body_len == 0 {
                conn.send_response(stream_id, 400, b"missing request body")?;
            } else {
                conn.send_response(stream_id, 200, b"ok")?;
            }

            // One exchange per connection: close gracefully so the
            // client must go back through its pool for the next one.
            conn.send_goaway(stream_id, ErrorCode::NoError, b"closing")?;
            conn.close()?;
            Ok(())
        }
        ServerMode::Echo => loop {
            match conn.read_request() {
                Ok(stream_id) => {
                    conn.send_response(stream_id, 200, b"")?;
                }
                Err(Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_after_goaway() {
        // A connection whose pending exchange is aborted records the
        // abort in its stream registry. Exercised through the public
        // Connection API against a loopback socket pair.
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_stream, _) = listener.accept().unwrap();
        drop(client);

        let mut conn = Connection::new(TcpSessionOps::new(server_stream));
        conn.streams.insert(
            1,
            Exchange {
                stream_id: 1,
                method: "POST".to_string(),
                path: "/".to_string(),
                body_len: 100,
                outcome: None,
            },
        );

        conn.send_goaway(0, ErrorCode::NoError, b"nope").unwrap();
        assert_eq!(conn.exchange(1).unwrap().outcome, Some(Outcome::Aborted));
    }

    #[test]
    fn test_handshake_state_starts_pending() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_stream, _) = listener.accept().unwrap();
        drop(client);

        let conn = Connection::new(TcpSessionOps::new(server_stream));
        assert_eq!(conn.handshake_state(), HandshakeState::Pending);
    }
}
