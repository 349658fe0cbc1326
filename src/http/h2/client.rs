//! HTTP/2 client read loop
//!
//! Once the handshake burst is out, [`H2Client::run`] reads frames until the
//! response stream reaches a definitive outcome and routes each frame by
//! kind. The peer closing the socket is not an outcome by itself; it only
//! shows up as an incomplete stream.

use super::codec::{FrameCodec, FrameReader};
use super::error::{Error, ErrorCode, Result};
use super::frames::Frame;
use super::stream::{AbortCause, AssembledResponse, FinalizeReason, StreamAssembler, StreamState};
use crate::http::reader::SessionReader;
use crate::http::session::SessionOps;

/// How a run ended
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The stream was finalized; check [`AssembledResponse::is_partial`]
    Response(AssembledResponse),
    /// The connection was aborted before any response HEADERS arrived
    Aborted(AbortCause),
    /// The peer closed the connection before the stream ended
    Incomplete(Option<StreamState>),
}

/// HTTP/2 client
///
/// Owns the upgraded connection for the rest of its life. One client reads
/// one response stream.
pub struct H2Client<S: SessionOps> {
    reader: SessionReader<S>,
    frames: FrameReader,
    assembler: StreamAssembler,
    frames_read: usize,
}

impl<S: SessionOps> H2Client<S> {
    /// Take over an upgraded connection
    ///
    /// Bytes already buffered in `reader` are read as frames first.
    pub fn new(reader: SessionReader<S>) -> Self {
        H2Client {
            reader,
            frames: FrameReader::new(),
            assembler: StreamAssembler::new(),
            frames_read: 0,
        }
    }

    /// Number of frames read so far
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Get a reference to the underlying reader
    pub fn reader(&self) -> &SessionReader<S> {
        &self.reader
    }

    /// Give back the connection
    pub fn into_reader(self) -> SessionReader<S> {
        self.reader
    }

    /// Read and dispatch frames until the stream has an outcome
    ///
    /// Cancellation while waiting on the peer aborts the stream like a
    /// GOAWAY would.
    pub fn run(&mut self) -> Result<Outcome> {
        loop {
            match self.step() {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(Error::Http(crate::http::Error::Cancelled)) => {
                    tracing::debug!("Exchange cancelled");
                    return self.abort(AbortCause::Cancelled);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Handle one frame
    fn step(&mut self) -> Result<Option<Outcome>> {
        let frame = match self.frames.read_frame(&mut self.reader) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(Some(self.incomplete(false))),
            // EOF inside a frame is a cut connection, not a decode failure
            Err(Error::Http(crate::http::Error::ConnectionClosed)) => {
                return Ok(Some(self.incomplete(true)))
            }
            Err(e) => return Err(e),
        };

        let index = self.frames_read;
        self.frames_read += 1;
        tracing::debug!(index, "FRAME {}", frame);

        match frame {
            Frame::Headers(headers) => {
                if self
                    .assembler
                    .on_headers(headers.stream_id, &headers.fields, headers.end_stream)?
                {
                    return self.complete(headers.stream_id).map(Some);
                }
            }
            Frame::Data(data) => {
                if self
                    .assembler
                    .on_data(data.stream_id, &data.data, data.end_stream)?
                {
                    return self.complete(data.stream_id).map(Some);
                }
            }
            Frame::Settings(settings) => {
                if !settings.ack {
                    tracing::debug!("ACKing SETTINGS");
                    self.reader.write_all(&FrameCodec::encode_settings_ack())?;
                    self.reader.flush()?;
                }
            }
            Frame::GoAway(goaway) => {
                return self
                    .abort(AbortCause::GoAway {
                        last_stream_id: goaway.last_stream_id,
                        error_code: goaway.error_code,
                    })
                    .map(Some);
            }
            Frame::RstStream(rst) => {
                return self
                    .abort(AbortCause::RstStream {
                        stream_id: rst.stream_id,
                        error_code: rst.error_code,
                    })
                    .map(Some);
            }
            Frame::WindowUpdate(update) => {
                tracing::debug!(
                    stream_id = update.stream_id,
                    increment = update.size_increment,
                    "Peer window update"
                );
            }
            Frame::Ping(ping) => {
                tracing::debug!(ack = ping.ack, data = ?ping.data, "Peer ping");
            }
            Frame::PushPromise(push) => {
                tracing::debug!(
                    stream_id = push.stream_id,
                    promised_stream_id = push.promised_stream_id,
                    fields = push.fields.len(),
                    "Ignoring push promise"
                );
            }
            Frame::Unknown(unknown) => {
                let header = unknown.header;
                let kind = match header.kind() {
                    Some(kind) => kind.name().to_string(),
                    None => format!("0x{:x}", header.frame_type),
                };
                return Err(Error::UnsupportedFrame {
                    kind,
                    stream_id: header.stream_id,
                });
            }
        }

        Ok(None)
    }

    fn complete(&mut self, stream_id: u32) -> Result<Outcome> {
        let response = self
            .assembler
            .finalize(stream_id, FinalizeReason::StreamEnded)?
            .ok_or_else(|| Error::Protocol(format!("Stream {} ended without HEADERS", stream_id)))?;

        tracing::debug!(
            stream_id,
            status = response.status().code(),
            body_len = response.body().len(),
            "Stream ended"
        );
        Ok(Outcome::Response(response))
    }

    fn incomplete(&self, mid_frame: bool) -> Outcome {
        tracing::warn!(
            frames = self.frames_read,
            mid_frame,
            "Connection closed before the stream ended"
        );
        Outcome::Incomplete(self.assembler.stream().cloned())
    }

    fn abort(&mut self, cause: AbortCause) -> Result<Outcome> {
        let Some(stream_id) = self.assembler.active_stream_id() else {
            tracing::warn!(%cause, "Connection aborted before response HEADERS");
            return Ok(Outcome::Aborted(cause));
        };

        if let AbortCause::GoAway { error_code, .. } | AbortCause::RstStream { error_code, .. } = &cause {
            let code = ErrorCode::from(*error_code);
            if code != ErrorCode::NO_ERROR {
                tracing::debug!(error = %code, "Peer reported an error");
            }
        }

        match self
            .assembler
            .finalize(stream_id, FinalizeReason::ConnectionAborted(cause.clone()))?
        {
            Some(response) => {
                tracing::warn!(
                    stream_id,
                    %cause,
                    body_len = response.body().len(),
                    "Returning partial response"
                );
                Ok(Outcome::Response(response))
            }
            None => Ok(Outcome::Aborted(cause)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::{BufferSession, CancelFlag, Transfer};
    use crate::http::h2::Settings;

    fn headers(fields: &[(&str, &str)], end_stream: bool) -> bytes::Bytes {
        let block = FrameCodec::encode_header_block(&mut hpack::Encoder::new(), fields);
        FrameCodec::encode_headers(1, &block, end_stream, true, None)
    }

    fn client_over(frames: &[bytes::Bytes]) -> (BufferSession, H2Client<BufferSession>) {
        let peer = BufferSession::new();
        for frame in frames {
            peer.push_segment(frame.to_vec());
        }
        let client = H2Client::new(SessionReader::from_ops(peer.clone()));
        (peer, client)
    }

    #[test]
    fn test_complete_response() {
        let (_, mut client) = client_over(&[
            FrameCodec::encode_settings(&Settings::upgrade_defaults()),
            FrameCodec::encode_settings_ack(),
            headers(&[(":status", "200"), ("content-type", "text/plain")], false),
            FrameCodec::encode_data(1, b"Hello, ", false, None),
            FrameCodec::encode_data(1, b"World", true, None),
        ]);

        match client.run().unwrap() {
            Outcome::Response(response) => {
                assert_eq!(response.status().code(), 200);
                assert_eq!(response.headers().get_all("Content-Type"), vec!["text/plain"]);
                assert_eq!(response.body(), b"Hello, World");
                assert!(!response.is_partial());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(client.frames_read(), 5);
    }

    #[test]
    fn test_stops_at_end_stream() {
        let first = headers(&[(":status", "204")], true);
        let (peer, mut client) = client_over(&[
            first.clone(),
            FrameCodec::encode_frame(0xee, 0, 0, b"never read"),
        ]);

        assert!(matches!(client.run().unwrap(), Outcome::Response(_)));
        assert_eq!(client.frames_read(), 1);
        assert_eq!(peer.transcript(), vec![Transfer::Read(first.len())]);
    }

    #[test]
    fn test_settings_ack_precedes_next_read() {
        let (peer, mut client) = client_over(&[
            FrameCodec::encode_settings(&Settings::upgrade_defaults()),
            headers(&[(":status", "200")], true),
        ]);

        client.run().unwrap();

        let ack = FrameCodec::encode_settings_ack().to_vec();
        let transcript = peer.transcript();
        let acks: Vec<_> = transcript
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t, Transfer::Wrote(bytes) if *bytes == ack))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(acks.len(), 1);
        // settings read, ack written, headers read
        assert!(matches!(transcript[acks[0] - 1], Transfer::Read(_)));
        assert!(matches!(transcript[acks[0] + 1], Transfer::Read(_)));
    }

    #[test]
    fn test_settings_ack_not_acked() {
        let (peer, mut client) = client_over(&[
            FrameCodec::encode_settings_ack(),
            headers(&[(":status", "200")], true),
        ]);

        client.run().unwrap();
        assert!(peer.written().is_empty());
    }

    #[test]
    fn test_goaway_after_headers_is_partial() {
        let (_, mut client) = client_over(&[
            headers(&[(":status", "200")], false),
            FrameCodec::encode_data(1, b"partial", false, None),
            FrameCodec::encode_goaway(1, 0, b""),
        ]);

        match client.run().unwrap() {
            Outcome::Response(response) => {
                assert_eq!(response.body(), b"partial");
                assert_eq!(
                    response.reason(),
                    &FinalizeReason::ConnectionAborted(AbortCause::GoAway {
                        last_stream_id: 1,
                        error_code: 0
                    })
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_rst_stream_before_headers() {
        let (_, mut client) = client_over(&[FrameCodec::encode_rst_stream(1, 0x7)]);

        assert!(matches!(
            client.run().unwrap(),
            Outcome::Aborted(AbortCause::RstStream {
                stream_id: 1,
                error_code: 0x7
            })
        ));
    }

    #[test]
    fn test_informational_frames_continue() {
        let (_, mut client) = client_over(&[
            FrameCodec::encode_window_update(0, 100),
            FrameCodec::encode_ping(false, [7; 8]),
            headers(&[(":status", "200")], false),
            FrameCodec::encode_push_promise(
                1,
                2,
                &FrameCodec::encode_header_block(&mut hpack::Encoder::new(), &[(":path", "/push")]),
            ),
            FrameCodec::encode_data(1, b"ok", true, None),
        ]);

        match client.run().unwrap() {
            Outcome::Response(response) => assert_eq!(response.body(), b"ok"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unknown_frame_is_fatal() {
        let (_, mut client) = client_over(&[FrameCodec::encode_frame(0x2, 0, 1, &[0, 0, 0, 0, 1])]);

        match client.run() {
            Err(Error::UnsupportedFrame { kind, stream_id }) => {
                assert_eq!(kind, "PRIORITY");
                assert_eq!(stream_id, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_eof_is_incomplete() {
        let (_, mut client) = client_over(&[
            headers(&[(":status", "200")], false),
            FrameCodec::encode_data(1, b"cut", false, None),
        ]);

        match client.run().unwrap() {
            Outcome::Incomplete(Some(stream)) => {
                assert_eq!(stream.body(), b"cut");
                assert!(!stream.is_ended());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_close_inside_data_frame_is_incomplete() {
        let data = FrameCodec::encode_data(1, b"partial-body", true, None);
        let (_, mut client) = client_over(&[
            headers(&[(":status", "200")], false),
            data.slice(..12),
        ]);

        match client.run().unwrap() {
            Outcome::Incomplete(Some(stream)) => {
                assert_eq!(stream.status().code(), 200);
                assert!(stream.body().is_empty());
                assert!(!stream.is_ended());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(client.frames_read(), 1);
    }

    #[test]
    fn test_cancelled_before_read() {
        let (_, mut client) = client_over(&[headers(&[(":status", "200")], false)]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        client.reader.session_mut().set_cancel(Some(cancel));

        assert!(matches!(
            client.run().unwrap(),
            Outcome::Aborted(AbortCause::Cancelled)
        ));
    }
}
