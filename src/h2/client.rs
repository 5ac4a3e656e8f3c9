//! Blocking HTTP/2 client
//!
//! A deliberately small client used by the load driver: one exchange
//! at a time over a prior-knowledge cleartext connection. It drains
//! every response to END_STREAM (required for connection reuse) and
//! surfaces GOAWAY and RST_STREAM as distinct errors so the driver can
//! tell "served" from "connection torn down" with certainty.

use super::codec::FrameCodec;
use super::error::{Error, Result};
use super::frames::*;
use super::settings::{Settings, SettingsBuilder};
use super::CONNECTION_PREFACE;
use crate::session::{Session, SessionOps};
use bytes::Bytes;
use hpack::Encoder as HpackEncoder;
use std::collections::HashMap;
use std::time::Duration;

/// HTTP/2 client over a single connection
pub struct H2Client<S: SessionOps> {
    session: Session<S>,
    hpack_encoder: HpackEncoder<'static>,
    hpack_decoder: hpack::Decoder<'static>,
    local_settings: Settings,
    remote_settings: Settings,
    /// Value for the :authority pseudo-header
    authority: String,
    /// Next stream ID to allocate (clients use odd IDs)
    next_stream_id: u32,
    connected: bool,
}

impl<S: SessionOps> H2Client<S> {
    /// Perform the connection preface and settings exchange
    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        // Client preface (RFC 7540 Section 3.5), then our SETTINGS
        self.session.write_all(CONNECTION_PREFACE)?;
        let settings_frame = SettingsFrame::new(self.local_settings.clone());
        self.session
            .write_all(&FrameCodec::encode_settings_frame(&settings_frame))?;

        // First frame from the server must be its SETTINGS
        let frame = FrameCodec::read_frame(&mut self.session)?;
        if frame.frame_type != FrameType::Settings || frame.flags.is_ack() {
            return Err(Error::Protocol(format!(
                "Expected server SETTINGS, got {}",
                frame.frame_type
            )));
        }
        let settings = Settings::parse(&frame.payload)?;
        self.remote_settings.merge(&settings);

        self.session
            .write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::ack()))?;

        self.connected = true;
        Ok(())
    }

    /// Send one request and read its complete response
    ///
    /// The response body is drained to END_STREAM before returning.
    pub fn request(
        &mut self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<H2Response> {
        if !self.connected {
            self.connect()?;
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        let content_length = body.len().to_string();
        // Local copy: the header list must not borrow self while the
        // HPACK encoder needs it mutably.
        let authority = self.authority.clone();
        let mut hpack_headers: Vec<(&str, &str)> = vec![
            (":method", method),
            (":path", path),
            (":scheme", "http"),
            (":authority", &authority),
        ];
        if !body.is_empty() {
            hpack_headers.push(("content-length", &content_length));
        }
        for (name, value) in headers {
            hpack_headers.push((name, value));
        }

        let header_block = self.encode_headers(&hpack_headers)?;

        let has_body = !body.is_empty();
        let headers_frame = HeadersFrame::new(
            stream_id,
            header_block,
            !has_body, // END_STREAM when there is no body
            true,      // END_HEADERS, no continuation
        );
        self.session
            .write_all(&FrameCodec::encode_headers_frame(&headers_frame))?;

        if has_body {
            let data_frame = DataFrame::new(stream_id, body, true);
            self.session
                .write_all(&FrameCodec::encode_data_frame(&data_frame))?;
        }

        self.recv_response(stream_id)
    }

    /// Send a POST request
    pub fn post(&mut self, path: &str, body: Bytes) -> Result<H2Response> {
        self.request("POST", path, &[], body)
    }

    /// HPACK-encode a header list
    fn encode_headers(&mut self, headers: &[(&str, &str)]) -> Result<Bytes> {
        let tuples: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(name, value)| (name.as_bytes(), value.as_bytes()))
            .collect();

        let mut block = Vec::new();
        self.hpack_encoder
            .encode_into(tuples, &mut block)
            .map_err(|e| Error::Internal(format!("HPACK encode error: {}", e)))?;
        Ok(Bytes::from(block))
    }

    /// Read frames until the response stream ends
    fn recv_response(&mut self, stream_id: u32) -> Result<H2Response> {
        let mut response = H2Response {
            stream_id,
            status: 0,
            headers: HashMap::new(),
            body: Vec::new(),
        };

        let mut headers_received = false;

        loop {
            let frame = FrameCodec::read_frame(&mut self.session)?;

            match frame.frame_type {
                FrameType::Headers => {
                    if frame.stream_id != stream_id {
                        continue;
                    }
                    if headers_received {
                        // Trailers, nothing in them we care about
                        if frame.flags.is_end_stream() {
                            break;
                        }
                        continue;
                    }

                    let decoded = self
                        .hpack_decoder
                        .decode(&frame.payload)
                        .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

                    for (name, value) in decoded {
                        let name_str = String::from_utf8_lossy(&name).to_string();
                        let value_str = String::from_utf8_lossy(&value).to_string();

                        if name_str == ":status" {
                            response.status = value_str.parse().unwrap_or(0);
                        } else {
                            response.headers.insert(name_str, value_str);
                        }
                    }
                    headers_received = true;

                    if frame.flags.is_end_stream() {
                        break;
                    }
                }
                FrameType::Data => {
                    if frame.stream_id != stream_id {
                        continue;
                    }
                    response.body.extend_from_slice(&frame.payload);
                    if frame.flags.is_end_stream() {
                        break;
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
                        let pong = PingFrame::ack(data);
                        self.session
                            .write_all(&FrameCodec::encode_ping_frame(&pong))?;
                    }
                }
                FrameType::WindowUpdate => {
                    // Window accounting is not modelled; bodies stay
                    // far below the initial windows.
                }
                FrameType::Goaway => {
                    let goaway = FrameCodec::parse_goaway(&frame.payload)?;
                    return Err(Error::GoawayReceived {
                        error_code: goaway.error_code,
                        debug_data: goaway.debug_data,
                    });
                }
                FrameType::RstStream => {
                    if frame.stream_id == stream_id {
                        return Err(Error::StreamReset(stream_id));
                    }
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected frame during response: {}",
                        other
                    )));
                }
            }
        }

        Ok(response)
    }

    /// Zero-timeout probe: true if the connection has bytes waiting
    /// (typically a trailing GOAWAY) or has been closed by the peer.
    pub fn has_pending_input(&self) -> Result<bool> {
        self.session.has_pending_input()
    }

    /// Set the per-operation network deadline
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.session.set_timeout(timeout);
    }

    /// Get remote settings
    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Close the connection
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}

/// HTTP/2 response
#[derive(Debug, Clone)]
pub struct H2Response {
    /// Stream ID the response arrived on
    pub stream_id: u32,
    /// Status code
    pub status: u16,
    /// Headers
    pub headers: HashMap<String, String>,
    /// Complete, drained body
    pub body: Vec<u8>,
}

impl H2Response {
    /// Get status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    /// Get body as bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// HTTP/2 client builder
pub struct H2ClientBuilder {
    settings: SettingsBuilder,
    authority: String,
    timeout: Option<Duration>,
}

impl H2ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        H2ClientBuilder {
            settings: SettingsBuilder::new()
                .header_table_size(super::DEFAULT_HEADER_TABLE_SIZE)
                .enable_push(false)
                .initial_window_size(super::DEFAULT_INITIAL_WINDOW_SIZE)
                .max_frame_size(super::DEFAULT_MAX_FRAME_SIZE),
            authority: "localhost".to_string(),
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Set the :authority pseudo-header value
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Set the per-operation network deadline
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max concurrent streams advertised to the server
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings = self.settings.max_concurrent_streams(max);
        self
    }

    /// Build the client over a session transport
    pub fn build<S: SessionOps>(self, ops: S) -> Result<H2Client<S>> {
        let local_settings = self.settings.build()?;
        let mut session = Session::new(ops);
        session.set_timeout(self.timeout);

        Ok(H2Client {
            session,
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: hpack::Decoder::new(),
            local_settings,
            remote_settings: Settings::new(),
            authority: self.authority,
            next_stream_id: 1, // Clients use odd stream IDs
            connected: false,
        })
    }
}

impl Default for H2ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_accessors() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());

        let response = H2Response {
            stream_id: 1,
            status: 200,
            headers,
            body: b"Hello".to_vec(),
        };

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.body(), b"Hello");
    }

    #[test]
    fn test_builder_defaults() {
        let builder = H2ClientBuilder::new().authority("127.0.0.1:8080");
        assert_eq!(builder.authority, "127.0.0.1:8080");
        assert_eq!(builder.timeout, Some(Duration::from_secs(10)));
    }
}
