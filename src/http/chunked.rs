//! Chunked transfer encoding support
//!
//! Decodes `Transfer-Encoding: chunked` bodies straight off a
//! [`SessionReader`], which is how a non-upgraded response body is read.

use super::reader::SessionReader;
use super::session::SessionOps;
use super::{Error, Result};
use bytes::{Bytes, BytesMut};

/// Parse a chunk-size line, ignoring chunk extensions
pub fn parse_chunk_size(line: &str) -> Result<usize> {
    let size_str = line.split(';').next().unwrap_or("").trim();
    usize::from_str_radix(size_str, 16).map_err(|_| Error::InvalidChunkSize(size_str.to_string()))
}

/// Read a complete chunked body, discarding trailers
///
/// Fails once the decoded body would exceed `limit` bytes.
pub fn read_chunked_body<S: SessionOps>(reader: &mut SessionReader<S>, limit: usize) -> Result<Bytes> {
    let mut body = BytesMut::new();

    loop {
        let size = parse_chunk_size(&reader.read_line()?)?;

        if size == 0 {
            // Trailer headers - skip until we find the empty line
            while !reader.read_line()?.is_empty() {}
            return Ok(body.freeze());
        }

        if body.len() + size > limit {
            return Err(Error::TooLarge(limit));
        }

        body.extend_from_slice(&reader.read_exact(size)?);

        if !reader.read_line()?.is_empty() {
            return Err(Error::Protocol("Expected CRLF after chunk".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::BufferSession;

    fn reader(input: &[u8]) -> SessionReader<BufferSession> {
        SessionReader::from_ops(BufferSession::with_input(input.to_vec()))
    }

    #[test]
    fn test_parse_chunk_size() {
        assert_eq!(parse_chunk_size("1a").unwrap(), 26);
        assert_eq!(parse_chunk_size("5;name=value").unwrap(), 5);
        assert!(parse_chunk_size("zz").is_err());
    }

    #[test]
    fn test_read_chunked_body() {
        let mut reader = reader(b"5\r\nHello\r\n7\r\n, World\r\n0\r\n\r\nrest");
        let body = read_chunked_body(&mut reader, 1024).unwrap();

        assert_eq!(&body[..], b"Hello, World");
        assert_eq!(reader.buffered(), b"rest");
    }

    #[test]
    fn test_read_chunked_body_with_trailers() {
        let mut reader = reader(b"3\r\nabc\r\n0\r\nX-Trailer: 1\r\n\r\n");
        let body = read_chunked_body(&mut reader, 1024).unwrap();
        assert_eq!(&body[..], b"abc");
    }

    #[test]
    fn test_read_chunked_body_missing_crlf() {
        let mut reader = reader(b"3\r\nabcX\r\n0\r\n\r\n");
        assert!(read_chunked_body(&mut reader, 1024).is_err());
    }

    #[test]
    fn test_read_chunked_body_limit() {
        let mut reader = reader(b"10\r\n0123456789abcdef\r\n0\r\n\r\n");
        assert!(matches!(read_chunked_body(&mut reader, 8), Err(Error::TooLarge(8))));
    }

    #[test]
    fn test_read_chunked_body_split_reads() {
        let session = BufferSession::with_input(b"3\r\nHel".to_vec());
        session.push_segment(b"\r\n2\r\nlo\r\n0\r".to_vec());
        session.push_segment(b"\n\r\n".to_vec());

        let mut reader = SessionReader::from_ops(session);
        assert_eq!(&read_chunked_body(&mut reader, 64).unwrap()[..], b"Hello");
    }
}
