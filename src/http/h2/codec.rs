//! HTTP/2 frame encoding and decoding
//!
//! `FrameCodec` builds raw frames byte by byte. `FrameReader` pulls frames off
//! a [`SessionReader`] and turns them into [`Frame`] values: padding and
//! priority fields are stripped, CONTINUATION frames are merged into the
//! block they continue, and header blocks go through one HPACK decoder per
//! connection.

use super::error::{Error, Result};
use super::frames::*;
use super::settings::Settings;
use super::{DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN};
use crate::http::reader::SessionReader;
use crate::http::session::SessionOps;
use bytes::{BufMut, Bytes, BytesMut};

/// Largest payload the 24-bit length field can describe
pub const MAX_FRAME_SIZE: u32 = 0x00FF_FFFF;

/// Frame encoders
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame from its parts
    ///
    /// The type is a raw byte so that frames the reader must reject can be
    /// produced too.
    pub fn encode_frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Bytes {
        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        FrameHeader {
            length: payload.len() as u32,
            frame_type,
            flags: FrameFlags::from_u8(flags),
            stream_id,
        }
        .encode(&mut buf);
        buf.extend_from_slice(payload);
        Bytes::from(buf)
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings(settings: &Settings) -> Bytes {
        Self::encode_frame(
            FrameType::Settings.as_u8(),
            0,
            0,
            &settings.encode_payload(),
        )
    }

    /// Encode a SETTINGS frame with the ACK flag and no payload
    pub fn encode_settings_ack() -> Bytes {
        Self::encode_frame(FrameType::Settings.as_u8(), FrameFlags::ACK, 0, &[])
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update(stream_id: u32, increment: u32) -> Bytes {
        Self::encode_frame(
            FrameType::WindowUpdate.as_u8(),
            0,
            stream_id,
            &(increment & 0x7FFF_FFFF).to_be_bytes(),
        )
    }

    /// Encode a DATA frame, optionally padded
    pub fn encode_data(stream_id: u32, data: &[u8], end_stream: bool, padding: Option<u8>) -> Bytes {
        let mut flags = FrameFlags::empty();
        if end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let payload = Self::pad(&mut flags, data, padding);
        Self::encode_frame(FrameType::Data.as_u8(), flags.as_u8(), stream_id, &payload)
    }

    /// Encode a HEADERS frame around an already compressed header block
    pub fn encode_headers(
        stream_id: u32,
        block: &[u8],
        end_stream: bool,
        end_headers: bool,
        padding: Option<u8>,
    ) -> Bytes {
        let mut flags = FrameFlags::empty();
        if end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let payload = Self::pad(&mut flags, block, padding);
        Self::encode_frame(FrameType::Headers.as_u8(), flags.as_u8(), stream_id, &payload)
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation(stream_id: u32, block: &[u8], end_headers: bool) -> Bytes {
        let flags = if end_headers { FrameFlags::END_HEADERS } else { 0 };
        Self::encode_frame(FrameType::Continuation.as_u8(), flags, stream_id, block)
    }

    /// Encode a PUSH_PROMISE frame
    pub fn encode_push_promise(stream_id: u32, promised_stream_id: u32, block: &[u8]) -> Bytes {
        let mut payload = Vec::with_capacity(4 + block.len());
        payload.put_u32(promised_stream_id & 0x7FFF_FFFF);
        payload.extend_from_slice(block);
        Self::encode_frame(
            FrameType::PushPromise.as_u8(),
            FrameFlags::END_HEADERS,
            stream_id,
            &payload,
        )
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream(stream_id: u32, error_code: u32) -> Bytes {
        Self::encode_frame(
            FrameType::RstStream.as_u8(),
            0,
            stream_id,
            &error_code.to_be_bytes(),
        )
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway(last_stream_id: u32, error_code: u32, debug_data: &[u8]) -> Bytes {
        let mut payload = Vec::with_capacity(8 + debug_data.len());
        payload.put_u32(last_stream_id & 0x7FFF_FFFF);
        payload.put_u32(error_code);
        payload.extend_from_slice(debug_data);
        Self::encode_frame(FrameType::Goaway.as_u8(), 0, 0, &payload)
    }

    /// Encode a PING frame
    pub fn encode_ping(ack: bool, data: [u8; 8]) -> Bytes {
        let flags = if ack { FrameFlags::ACK } else { 0 };
        Self::encode_frame(FrameType::Ping.as_u8(), flags, 0, &data)
    }

    /// Compress header fields into a header block
    pub fn encode_header_block(encoder: &mut hpack::Encoder<'_>, fields: &[(&str, &str)]) -> Vec<u8> {
        encoder.encode(fields.iter().map(|(name, value)| (name.as_bytes(), value.as_bytes())))
    }

    fn pad(flags: &mut FrameFlags, data: &[u8], padding: Option<u8>) -> Vec<u8> {
        let Some(pad_len) = padding else {
            return data.to_vec();
        };

        flags.set(FrameFlags::PADDED);
        let mut payload = Vec::with_capacity(1 + data.len() + pad_len as usize);
        payload.push(pad_len);
        payload.extend_from_slice(data);
        payload.put_bytes(0, pad_len as usize);
        payload
    }
}

/// Remove the pad length byte and trailing padding of a PADDED frame
fn strip_padding(header: &FrameHeader, payload: Bytes) -> Result<Bytes> {
    if !header.flags.is_padded() {
        return Ok(payload);
    }

    let Some(&pad_len) = payload.first() else {
        return Err(Error::FrameSize("PADDED frame without pad length".to_string()));
    };
    let pad_len = pad_len as usize;
    if pad_len >= payload.len() {
        return Err(Error::Protocol(format!(
            "Padding of {} bytes exceeds {} byte payload",
            pad_len,
            payload.len()
        )));
    }

    Ok(payload.slice(1..payload.len() - pad_len))
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Decodes frames from a session
///
/// Holds the HPACK dynamic table, so one reader must see every header block
/// of its connection.
pub struct FrameReader {
    decoder: hpack::Decoder<'static>,
    max_frame_size: u32,
}

impl FrameReader {
    /// Create a frame reader with the default maximum frame size
    pub fn new() -> Self {
        FrameReader {
            decoder: hpack::Decoder::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Accept payloads up to `size` bytes
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size.min(MAX_FRAME_SIZE);
    }

    /// Read and decode the next frame
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly between
    /// frames. A close part-way through a frame is an error.
    pub fn read_frame<S: SessionOps>(&mut self, reader: &mut SessionReader<S>) -> Result<Option<Frame>> {
        let Some((header, payload)) = self.read_raw(reader)? else {
            return Ok(None);
        };

        let frame = match header.kind() {
            Some(FrameType::Data) => {
                Self::require_stream(&header)?;
                Frame::Data(DataFrame {
                    stream_id: header.stream_id,
                    data: strip_padding(&header, payload)?,
                    end_stream: header.flags.is_end_stream(),
                })
            }
            Some(FrameType::Headers) => {
                Self::require_stream(&header)?;
                let mut fragment = strip_padding(&header, payload)?;
                if header.flags.is_priority() {
                    if fragment.len() < 5 {
                        return Err(Error::FrameSize(
                            "HEADERS priority fields truncated".to_string(),
                        ));
                    }
                    fragment = fragment.slice(5..);
                }
                let block = self.complete_block(reader, &header, fragment)?;
                Frame::Headers(HeadersFrame {
                    stream_id: header.stream_id,
                    fields: self.decode_block(&block)?,
                    end_stream: header.flags.is_end_stream(),
                })
            }
            Some(FrameType::RstStream) => {
                Self::require_stream(&header)?;
                Self::require_len(&header, &payload, 4)?;
                Frame::RstStream(RstStreamFrame {
                    stream_id: header.stream_id,
                    error_code: read_u32(&payload),
                })
            }
            Some(FrameType::Settings) => {
                Self::require_connection(&header)?;
                let ack = header.flags.is_ack();
                if ack && !payload.is_empty() {
                    return Err(Error::FrameSize("SETTINGS ACK with payload".to_string()));
                }
                Frame::Settings(SettingsFrame {
                    ack,
                    settings: Settings::parse_payload(&payload)?,
                })
            }
            Some(FrameType::PushPromise) => {
                Self::require_stream(&header)?;
                let fragment = strip_padding(&header, payload)?;
                if fragment.len() < 4 {
                    return Err(Error::FrameSize("PUSH_PROMISE truncated".to_string()));
                }
                let promised_stream_id = read_u32(&fragment) & 0x7FFF_FFFF;
                let block = self.complete_block(reader, &header, fragment.slice(4..))?;
                // Decoded even though it is only logged, to keep the HPACK table in step
                Frame::PushPromise(PushPromiseFrame {
                    stream_id: header.stream_id,
                    promised_stream_id,
                    fields: self.decode_block(&block)?,
                })
            }
            Some(FrameType::Ping) => {
                Self::require_connection(&header)?;
                Self::require_len(&header, &payload, 8)?;
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload);
                Frame::Ping(PingFrame {
                    ack: header.flags.is_ack(),
                    data,
                })
            }
            Some(FrameType::Goaway) => {
                Self::require_connection(&header)?;
                if payload.len() < 8 {
                    return Err(Error::FrameSize("GOAWAY truncated".to_string()));
                }
                Frame::GoAway(GoawayFrame {
                    last_stream_id: read_u32(&payload) & 0x7FFF_FFFF,
                    error_code: read_u32(&payload[4..]),
                    debug_data: payload.slice(8..),
                })
            }
            Some(FrameType::WindowUpdate) => {
                Self::require_len(&header, &payload, 4)?;
                Frame::WindowUpdate(WindowUpdateFrame {
                    stream_id: header.stream_id,
                    size_increment: read_u32(&payload) & 0x7FFF_FFFF,
                })
            }
            Some(FrameType::Priority) | Some(FrameType::Continuation) | None => {
                Frame::Unknown(UnknownFrame { header, payload })
            }
        };

        Ok(Some(frame))
    }

    fn read_raw<S: SessionOps>(&mut self, reader: &mut SessionReader<S>) -> Result<Option<(FrameHeader, Bytes)>> {
        let Some(head) = reader.try_read_exact(FRAME_HEADER_LEN)? else {
            return Ok(None);
        };

        let header = FrameHeader::parse(&head)?;
        if header.length > self.max_frame_size {
            return Err(Error::FrameSize(format!(
                "{} byte frame exceeds maximum of {}",
                header.length, self.max_frame_size
            )));
        }

        let payload = reader.read_exact(header.length as usize)?;
        Ok(Some((header, payload)))
    }

    /// Append CONTINUATION fragments until END_HEADERS
    fn complete_block<S: SessionOps>(
        &mut self,
        reader: &mut SessionReader<S>,
        header: &FrameHeader,
        fragment: Bytes,
    ) -> Result<Bytes> {
        if header.flags.is_end_headers() {
            return Ok(fragment);
        }

        let mut block = BytesMut::from(&fragment[..]);
        loop {
            let Some((next, payload)) = self.read_raw(reader)? else {
                return Err(Error::Protocol(
                    "Connection closed inside a header block".to_string(),
                ));
            };
            if next.kind() != Some(FrameType::Continuation) || next.stream_id != header.stream_id {
                return Err(Error::Protocol(format!(
                    "Expected CONTINUATION on stream {}, got type 0x{:x} on stream {}",
                    header.stream_id, next.frame_type, next.stream_id
                )));
            }

            block.extend_from_slice(&payload);
            if next.flags.is_end_headers() {
                return Ok(block.freeze());
            }
        }
    }

    fn decode_block(&mut self, block: &[u8]) -> Result<Vec<HeaderField>> {
        let decoded = self
            .decoder
            .decode(block)
            .map_err(|e| Error::Compression(format!("{:?}", e)))?;

        Ok(decoded
            .into_iter()
            .map(|(name, value)| {
                HeaderField::new(
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }

    fn require_stream(header: &FrameHeader) -> Result<()> {
        if header.stream_id == 0 {
            return Err(Error::Protocol(format!(
                "{} frame on stream 0",
                header.kind().map_or("UNKNOWN", |k| k.name())
            )));
        }
        Ok(())
    }

    fn require_connection(header: &FrameHeader) -> Result<()> {
        if header.stream_id != 0 {
            return Err(Error::Protocol(format!(
                "{} frame on stream {}",
                header.kind().map_or("UNKNOWN", |k| k.name()),
                header.stream_id
            )));
        }
        Ok(())
    }

    fn require_len(header: &FrameHeader, payload: &[u8], len: usize) -> Result<()> {
        if payload.len() != len {
            return Err(Error::FrameSize(format!(
                "{} payload must be {} bytes, got {}",
                header.kind().map_or("UNKNOWN", |k| k.name()),
                len,
                payload.len()
            )));
        }
        Ok(())
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::BufferSession;
    use crate::http::Error as HttpError;

    fn reader_over(segments: &[Bytes]) -> SessionReader<BufferSession> {
        let peer = BufferSession::new();
        for segment in segments {
            peer.push_segment(segment.to_vec());
        }
        SessionReader::from_ops(peer)
    }

    fn block(fields: &[(&str, &str)]) -> Vec<u8> {
        FrameCodec::encode_header_block(&mut hpack::Encoder::new(), fields)
    }

    #[test]
    fn test_encode_settings_frame() {
        let encoded = FrameCodec::encode_settings(&Settings::handshake_defaults());
        assert_eq!(&encoded[..9], &[0, 0, 12, 0x4, 0, 0, 0, 0, 0]);
        assert_eq!(encoded.len(), 21);

        let ack = FrameCodec::encode_settings_ack();
        assert_eq!(&ack[..], &[0, 0, 0, 0x4, 0x1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_window_update() {
        let encoded = FrameCodec::encode_window_update(0, 1 << 30);
        assert_eq!(&encoded[..], &[0, 0, 4, 0x8, 0, 0, 0, 0, 0, 0x40, 0, 0, 0]);
    }

    #[test]
    fn test_read_data_strips_padding() {
        let mut reader = reader_over(&[FrameCodec::encode_data(1, b"Hello", true, Some(4))]);
        let mut frames = FrameReader::new();

        match frames.read_frame(&mut reader).unwrap() {
            Some(Frame::Data(data)) => {
                assert_eq!(data.stream_id, 1);
                assert_eq!(&data.data[..], b"Hello");
                assert!(data.end_stream);
            }
            other => panic!("expected DATA, got {:?}", other),
        }
        assert!(frames.read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_read_headers_with_priority_and_padding() {
        let hb = block(&[(":status", "200"), ("content-type", "text/plain")]);
        let mut payload = vec![2u8];
        payload.extend_from_slice(&[0x80, 0, 0, 3, 15]);
        payload.extend_from_slice(&hb);
        payload.extend_from_slice(&[0, 0]);
        let flags = FrameFlags::END_HEADERS | FrameFlags::PADDED | FrameFlags::PRIORITY;
        let frame = FrameCodec::encode_frame(FrameType::Headers.as_u8(), flags, 1, &payload);

        let mut reader = reader_over(&[frame]);
        match FrameReader::new().read_frame(&mut reader).unwrap() {
            Some(Frame::Headers(headers)) => {
                assert_eq!(headers.pseudo_value("status"), Some("200"));
                assert_eq!(headers.fields[1], HeaderField::new("content-type", "text/plain"));
                assert!(!headers.end_stream);
            }
            other => panic!("expected HEADERS, got {:?}", other),
        }
    }

    #[test]
    fn test_read_headers_merges_continuation() {
        let hb = block(&[(":status", "204"), ("x-one", "1"), ("x-two", "2")]);
        let (first, rest) = hb.split_at(hb.len() / 2);

        let mut reader = reader_over(&[
            FrameCodec::encode_headers(1, first, true, false, None),
            FrameCodec::encode_continuation(1, rest, true),
        ]);
        match FrameReader::new().read_frame(&mut reader).unwrap() {
            Some(Frame::Headers(headers)) => {
                assert_eq!(headers.fields.len(), 3);
                assert!(headers.end_stream);
            }
            other => panic!("expected HEADERS, got {:?}", other),
        }
    }

    #[test]
    fn test_interleaved_frame_in_header_block() {
        let hb = block(&[(":status", "200")]);
        let mut reader = reader_over(&[
            FrameCodec::encode_headers(1, &hb, false, false, None),
            FrameCodec::encode_ping(false, [0; 8]),
        ]);
        assert!(matches!(
            FrameReader::new().read_frame(&mut reader),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_hpack_state_spans_frames() {
        let mut encoder = hpack::Encoder::new();
        let first = FrameCodec::encode_header_block(&mut encoder, &[("x-custom", "abc")]);
        let second = FrameCodec::encode_header_block(&mut encoder, &[("x-custom", "abc")]);

        let mut reader = reader_over(&[
            FrameCodec::encode_push_promise(1, 2, &first),
            FrameCodec::encode_headers(1, &second, false, true, None),
        ]);
        let mut frames = FrameReader::new();
        assert!(matches!(
            frames.read_frame(&mut reader).unwrap(),
            Some(Frame::PushPromise(PushPromiseFrame { promised_stream_id: 2, .. }))
        ));
        match frames.read_frame(&mut reader).unwrap() {
            Some(Frame::Headers(headers)) => {
                assert_eq!(headers.fields, vec![HeaderField::new("x-custom", "abc")]);
            }
            other => panic!("expected HEADERS, got {:?}", other),
        }
    }

    #[test]
    fn test_control_frames() {
        let mut reader = reader_over(&[
            FrameCodec::encode_settings(&Settings::upgrade_defaults()),
            FrameCodec::encode_settings_ack(),
            FrameCodec::encode_ping(true, *b"12345678"),
            FrameCodec::encode_window_update(1, 1024),
            FrameCodec::encode_rst_stream(1, 0x8),
            FrameCodec::encode_goaway(1, 0x2, b"bye"),
        ]);
        let mut frames = FrameReader::new();

        match frames.read_frame(&mut reader).unwrap() {
            Some(Frame::Settings(s)) => {
                assert!(!s.ack);
                assert_eq!(s.settings, Settings::upgrade_defaults());
            }
            other => panic!("expected SETTINGS, got {:?}", other),
        }
        assert!(matches!(
            frames.read_frame(&mut reader).unwrap(),
            Some(Frame::Settings(SettingsFrame { ack: true, .. }))
        ));
        assert!(matches!(
            frames.read_frame(&mut reader).unwrap(),
            Some(Frame::Ping(PingFrame { ack: true, data })) if &data == b"12345678"
        ));
        assert!(matches!(
            frames.read_frame(&mut reader).unwrap(),
            Some(Frame::WindowUpdate(WindowUpdateFrame { stream_id: 1, size_increment: 1024 }))
        ));
        assert!(matches!(
            frames.read_frame(&mut reader).unwrap(),
            Some(Frame::RstStream(RstStreamFrame { stream_id: 1, error_code: 0x8 }))
        ));
        match frames.read_frame(&mut reader).unwrap() {
            Some(Frame::GoAway(g)) => {
                assert_eq!(g.last_stream_id, 1);
                assert_eq!(g.error_code, 0x2);
                assert_eq!(&g.debug_data[..], b"bye");
            }
            other => panic!("expected GOAWAY, got {:?}", other),
        }
    }

    #[test]
    fn test_unhandled_types_become_unknown() {
        let mut reader = reader_over(&[
            FrameCodec::encode_frame(FrameType::Priority.as_u8(), 0, 1, &[0, 0, 0, 0, 16]),
            FrameCodec::encode_continuation(1, &[], true),
            FrameCodec::encode_frame(0xfa, 0, 0, b"ext"),
        ]);
        let mut frames = FrameReader::new();

        for expected in ["PRIORITY", "CONTINUATION", "UNKNOWN"] {
            match frames.read_frame(&mut reader).unwrap() {
                Some(frame @ Frame::Unknown(_)) => assert_eq!(frame.name(), expected),
                other => panic!("expected unknown frame, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_malformed_frames() {
        let cases = [
            FrameCodec::encode_data(0, b"x", false, None),
            FrameCodec::encode_frame(FrameType::Settings.as_u8(), FrameFlags::ACK, 0, &[0; 6]),
            FrameCodec::encode_frame(FrameType::Ping.as_u8(), 0, 0, &[0; 4]),
            FrameCodec::encode_frame(FrameType::Data.as_u8(), FrameFlags::PADDED, 1, &[9, 1, 2]),
            FrameCodec::encode_frame(FrameType::Data.as_u8(), 0, 1, &vec![0; 16385]),
        ];

        for case in cases {
            let mut reader = reader_over(&[case]);
            assert!(FrameReader::new().read_frame(&mut reader).is_err());
        }
    }

    #[test]
    fn test_raised_max_frame_size() {
        let frame = FrameCodec::encode_data(1, &vec![7; 20_000], true, None);
        let mut frames = FrameReader::new();
        frames.set_max_frame_size(32 * 1024);

        let mut reader = reader_over(&[frame]);
        match frames.read_frame(&mut reader).unwrap() {
            Some(Frame::Data(data)) => assert_eq!(data.data.len(), 20_000),
            other => panic!("expected data frame, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_frame() {
        let frame = FrameCodec::encode_data(1, b"Hello", true, None);
        let mut reader = reader_over(&[frame.slice(..11)]);

        assert!(matches!(
            FrameReader::new().read_frame(&mut reader),
            Err(Error::Http(HttpError::ConnectionClosed))
        ));
    }
}
