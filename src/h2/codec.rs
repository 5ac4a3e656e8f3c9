//! HTTP/2 frame encoding and decoding
//!
//! Low-level frame construction with full control over the bytes on
//! the wire, plus a blocking frame reader over a [`Session`].

use super::error::{Error, Result};
use super::frames::*;
use super::settings::SettingsParameter;
use crate::session::{Session, SessionOps};
use bytes::{BufMut, Bytes, BytesMut};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Maximum frame payload size (16MB - 1)
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Frame codec for encoding/decoding HTTP/2 frames
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame header into a buffer
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        // Type (8 bits)
        header[3] = frame_type.as_u8();

        // Flags (8 bits)
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        let stream_id = stream_id & 0x7FFF_FFFF;
        header[5] = ((stream_id >> 24) & 0xFF) as u8;
        header[6] = ((stream_id >> 16) & 0xFF) as u8;
        header[7] = ((stream_id >> 8) & 0xFF) as u8;
        header[8] = (stream_id & 0xFF) as u8;

        header
    }

    /// Decode a frame header from bytes
    ///
    /// An unknown frame type is a protocol error for this harness;
    /// neither peer we drive emits extension frames.
    pub fn decode_header(
        bytes: &[u8; FRAME_HEADER_SIZE],
    ) -> Result<(FrameType, FrameFlags, u32, usize)> {
        // Length (24 bits, big-endian)
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        let frame_type = FrameType::from_u8(bytes[3])
            .ok_or_else(|| Error::Protocol(format!("Unknown frame type 0x{:x}", bytes[3])))?;

        let flags = FrameFlags::from_u8(bytes[4]);

        // Stream ID (31 bits, ignore reserved bit)
        let stream_id = ((bytes[5] as u32 & 0x7F) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        Ok((frame_type, flags, stream_id, length))
    }

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut flags = FrameFlags::empty();
        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let header = Self::encode_header(FrameType::Data, flags, frame.stream_id, frame.data.len());
        buf.put_slice(&header);
        buf.put_slice(&frame.data);

        buf.freeze()
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut flags = FrameFlags::empty();
        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let header = Self::encode_header(
            FrameType::Headers,
            flags,
            frame.stream_id,
            frame.header_block.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&frame.header_block);

        buf.freeze()
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings_frame(frame: &SettingsFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        // Each setting is 6 bytes (2 byte ID + 4 byte value)
        let mut settings_data = BytesMut::new();

        if !frame.ack {
            let settings = &frame.settings;

            if let Some(val) = settings.header_table_size {
                settings_data.put_u16(SettingsParameter::HeaderTableSize.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.enable_push {
                settings_data.put_u16(SettingsParameter::EnablePush.as_u16());
                settings_data.put_u32(u32::from(val));
            }
            if let Some(val) = settings.max_concurrent_streams {
                settings_data.put_u16(SettingsParameter::MaxConcurrentStreams.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.initial_window_size {
                settings_data.put_u16(SettingsParameter::InitialWindowSize.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.max_frame_size {
                settings_data.put_u16(SettingsParameter::MaxFrameSize.as_u16());
                settings_data.put_u32(val);
            }
            if let Some(val) = settings.max_header_list_size {
                settings_data.put_u16(SettingsParameter::MaxHeaderListSize.as_u16());
                settings_data.put_u32(val);
            }
        }

        // Stream ID must be 0 for SETTINGS
        let header = Self::encode_header(FrameType::Settings, flags, 0, settings_data.len());
        buf.put_slice(&header);
        buf.put_slice(&settings_data);

        buf.freeze()
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        // Stream ID must be 0 for PING, payload is always 8 bytes
        let header = Self::encode_header(FrameType::Ping, flags, 0, 8);
        buf.put_slice(&header);
        buf.put_slice(&frame.data);

        buf.freeze()
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoawayFrame) -> Bytes {
        let mut buf = BytesMut::new();

        // 4 bytes last stream ID + 4 bytes error code + debug data
        let payload_len = 8 + frame.debug_data.len();

        // Stream ID must be 0 for GOAWAY
        let header = Self::encode_header(FrameType::Goaway, FrameFlags::empty(), 0, payload_len);
        buf.put_slice(&header);

        buf.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        buf.put_u32(frame.error_code.as_u32());
        buf.put_slice(&frame.debug_data);

        buf.freeze()
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header =
            Self::encode_header(FrameType::WindowUpdate, FrameFlags::empty(), frame.stream_id, 4);
        buf.put_slice(&header);
        buf.put_u32(frame.size_increment & 0x7FFF_FFFF);

        buf.freeze()
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header =
            Self::encode_header(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, 4);
        buf.put_slice(&header);
        buf.put_u32(frame.error_code.as_u32());

        buf.freeze()
    }

    /// Read one frame off a session
    ///
    /// Blocks up to the session deadline per read; a clean peer close
    /// before the frame header surfaces as `ConnectionClosed`.
    pub fn read_frame<S: SessionOps>(session: &mut Session<S>) -> Result<RawFrame> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        session.read_exact(&mut header)?;

        let (frame_type, flags, stream_id, payload_len) = Self::decode_header(&header)?;

        if payload_len > MAX_FRAME_SIZE {
            return Err(Error::FrameSize(format!(
                "Frame payload too large: {}",
                payload_len
            )));
        }

        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            session.read_exact(&mut payload)?;
        }

        Ok(RawFrame {
            frame_type,
            flags,
            stream_id,
            payload: Bytes::from(payload),
        })
    }

    /// Parse a GOAWAY payload into (last stream ID, error code, debug data)
    pub fn parse_goaway(payload: &Bytes) -> Result<GoawayFrame> {
        if payload.len() < 8 {
            return Err(Error::FrameSize(format!(
                "GOAWAY payload too short: {}",
                payload.len()
            )));
        }

        let last_stream_id =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let error_code = super::ErrorCode::from_u32(code)
            .ok_or_else(|| Error::Protocol(format!("Unknown GOAWAY error code 0x{:x}", code)))?;

        Ok(GoawayFrame {
            last_stream_id,
            error_code,
            debug_data: payload.slice(8..),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::ErrorCode;

    #[test]
    fn test_encode_decode_header() {
        let frame_type = FrameType::Headers;
        let flags = FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        let stream_id = 42;
        let length = 1234;

        let header = FrameCodec::encode_header(frame_type, flags, stream_id, length);
        let (decoded_type, decoded_flags, decoded_id, decoded_len) =
            FrameCodec::decode_header(&header).unwrap();

        assert_eq!(decoded_type, frame_type);
        assert_eq!(decoded_flags.as_u8(), flags.as_u8());
        assert_eq!(decoded_id, stream_id);
        assert_eq!(decoded_len, length);
    }

    #[test]
    fn test_decode_unknown_frame_type() {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[3] = 0xAB;
        assert!(FrameCodec::decode_header(&header).is_err());
    }

    #[test]
    fn test_encode_data_frame() {
        let frame = DataFrame::new(1, Bytes::from("Hello"), true);
        let encoded = FrameCodec::encode_data_frame(&frame);

        assert_eq!(encoded[0..3], [0, 0, 5]); // Length = 5
        assert_eq!(encoded[3], FrameType::Data.as_u8());
        assert_eq!(encoded[4], FrameFlags::END_STREAM);
        assert_eq!(&encoded[5..9], &[0, 0, 0, 1]); // Stream ID = 1
        assert_eq!(&encoded[9..], b"Hello");
    }

    #[test]
    fn test_encode_settings_ack() {
        let frame = SettingsFrame::ack();
        let encoded = FrameCodec::encode_settings_frame(&frame);

        // Length must be 0 for ACK
        assert_eq!(encoded[0..3], [0, 0, 0]);
        assert_eq!(encoded[4], FrameFlags::ACK);
    }

    #[test]
    fn test_encode_ping_frame() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let frame = PingFrame::new(data);
        let encoded = FrameCodec::encode_ping_frame(&frame);

        assert_eq!(encoded[0..3], [0, 0, 8]);
        assert_eq!(encoded[3], FrameType::Ping.as_u8());
        assert_eq!(&encoded[9..17], &data);
    }

    #[test]
    fn test_goaway_roundtrip() {
        let frame = GoawayFrame::new(7, ErrorCode::NoError, Bytes::from_static(b"nope"));
        let encoded = FrameCodec::encode_goaway_frame(&frame);

        assert_eq!(encoded[3], FrameType::Goaway.as_u8());
        assert_eq!(&encoded[5..9], &[0, 0, 0, 0]); // Stream ID must be 0

        let payload = Bytes::copy_from_slice(&encoded[9..]);
        let parsed = FrameCodec::parse_goaway(&payload).unwrap();
        assert_eq!(parsed.last_stream_id, 7);
        assert_eq!(parsed.error_code, ErrorCode::NoError);
        assert_eq!(&parsed.debug_data[..], b"nope");
    }

    #[test]
    fn test_parse_goaway_too_short() {
        let payload = Bytes::from_static(&[0, 0, 0]);
        assert!(FrameCodec::parse_goaway(&payload).is_err());
    }

    #[test]
    fn test_encode_window_update() {
        let frame = WindowUpdateFrame::new(42, 1000);
        let encoded = FrameCodec::encode_window_update_frame(&frame);

        assert_eq!(encoded[0..3], [0, 0, 4]);
        assert_eq!(encoded[3], FrameType::WindowUpdate.as_u8());
        assert_eq!(&encoded[5..9], &[0, 0, 0, 42]);

        let increment = u32::from_be_bytes([encoded[9], encoded[10], encoded[11], encoded[12]]);
        assert_eq!(increment, 1000);
    }

    #[test]
    fn test_encode_rst_stream() {
        let frame = RstStreamFrame {
            stream_id: 5,
            error_code: ErrorCode::Cancel,
        };
        let encoded = FrameCodec::encode_rst_stream_frame(&frame);

        assert_eq!(encoded[0..3], [0, 0, 4]);
        assert_eq!(encoded[3], FrameType::RstStream.as_u8());
        let code = u32::from_be_bytes([encoded[9], encoded[10], encoded[11], encoded[12]]);
        assert_eq!(code, ErrorCode::Cancel.as_u32());
    }
}
