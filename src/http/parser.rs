//! HTTP/1.1 head parsing
//!
//! Start lines and header blocks are read off a [`SessionReader`] one line at
//! a time. Nothing here reads past the blank line that ends a head, so bytes
//! the peer pipelined behind it stay buffered for whoever reads next.

use super::reader::SessionReader;
use super::session::SessionOps;
use super::{Error, Headers, Method, Result, Status, Version};

/// Most header lines accepted in a single head
pub const MAX_HEADER_LINES: usize = 256;

/// Parse HTTP request line
///
/// Format: METHOD URI VERSION
/// Example: GET /index.html HTTP/1.1
pub fn parse_request_line(line: &str) -> Result<(Method, String, Version)> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() != 3 {
        return Err(Error::Parse(format!(
            "Invalid request line: expected 3 parts, got {}",
            parts.len()
        )));
    }

    let method: Method = parts[0].parse()?;
    let uri = parts[1].to_string();
    let version: Version = parts[2].parse()?;

    Ok((method, uri, version))
}

/// Parse HTTP response status line
///
/// Format: VERSION STATUS [REASON]
/// Example: HTTP/1.1 101 Switching Protocols
pub fn parse_status_line(line: &str) -> Result<(Version, Status, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        return Err(Error::Parse(format!(
            "Invalid status line: expected at least 2 parts, got {}",
            parts.len()
        )));
    }

    let version: Version = parts[0].parse()?;
    let status: Status = parts[1].parse()?;
    let reason = match parts.get(2) {
        Some(reason) if !reason.is_empty() => reason.to_string(),
        _ => status.reason_phrase().to_string(),
    };

    Ok((version, status, reason))
}

/// Read header lines up to and including the blank line
///
/// Repeated names are appended under one canonical key. Obsolete line
/// folding is rejected.
pub fn read_headers<S: SessionOps>(reader: &mut SessionReader<S>) -> Result<Headers> {
    let mut headers = Headers::new();

    for _ in 0..MAX_HEADER_LINES {
        let line = reader.read_line()?;
        if line.is_empty() {
            return Ok(headers);
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            return Err(Error::InvalidHeader(format!("Folded header line: {:?}", line)));
        }

        let (name, value) = Headers::parse_header_line(&line)?;
        headers.insert(name, value);
    }

    Err(Error::TooManyHeaders(MAX_HEADER_LINES))
}

/// Declared Content-Length, if any
///
/// Conflicting repeated values are an error.
pub fn content_length(headers: &Headers) -> Result<Option<usize>> {
    let mut length = None;

    for value in headers.get_all("Content-Length") {
        let parsed = value
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", value)))?;
        match length {
            Some(prev) if prev != parsed => {
                return Err(Error::Parse(format!(
                    "Conflicting Content-Length: {} vs {}",
                    prev, parsed
                )))
            }
            _ => length = Some(parsed),
        }
    }

    Ok(length)
}

/// Whether the body uses chunked transfer coding
pub fn is_chunked(headers: &Headers) -> bool {
    headers
        .get_all("Transfer-Encoding")
        .iter()
        .flat_map(|v| v.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::BufferSession;

    #[test]
    fn test_parse_request_line() {
        let (method, uri, version) = parse_request_line("GET /index.html HTTP/1.1").unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(uri, "/index.html");
        assert_eq!(version, Version::Http11);

        assert!(parse_request_line("GET /").is_err());
        assert!(parse_request_line("FETCH / HTTP/1.1").is_err());
    }

    #[test]
    fn test_parse_status_line() {
        let (version, status, reason) = parse_status_line("HTTP/1.1 101 Switching Protocols").unwrap();
        assert_eq!(version, Version::Http11);
        assert_eq!(status.code(), 101);
        assert_eq!(reason, "Switching Protocols");

        let (_, status, reason) = parse_status_line("HTTP/1.1 404").unwrap();
        assert_eq!(status.code(), 404);
        assert_eq!(reason, "Not Found");

        assert!(parse_status_line("HTTP/1.1 abc OK").is_err());
        assert!(parse_status_line("garbage").is_err());
    }

    #[test]
    fn test_read_headers_stops_at_blank_line() {
        let peer = BufferSession::with_input(
            b"Upgrade: h2c\r\nSet-Cookie: a=1\r\nset-cookie: b=2\r\n\r\nPRI".to_vec(),
        );
        let mut reader = SessionReader::from_ops(peer);

        let headers = read_headers(&mut reader).unwrap();
        assert_eq!(headers.get("Upgrade"), Some("h2c"));
        assert_eq!(headers.get_all("Set-Cookie"), vec!["a=1", "b=2"]);
        assert_eq!(reader.buffered(), b"PRI");
    }

    #[test]
    fn test_read_headers_rejects_folding() {
        let peer = BufferSession::with_input(b"X-A: 1\r\n  continued\r\n\r\n".to_vec());
        let mut reader = SessionReader::from_ops(peer);
        assert!(matches!(read_headers(&mut reader), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_content_length() {
        let headers: Headers = vec![("Content-Length", "12")].into_iter().collect();
        assert_eq!(content_length(&headers).unwrap(), Some(12));

        let same: Headers = vec![("Content-Length", "3"), ("Content-Length", "3")]
            .into_iter()
            .collect();
        assert_eq!(content_length(&same).unwrap(), Some(3));

        let conflict: Headers = vec![("Content-Length", "3"), ("Content-Length", "4")]
            .into_iter()
            .collect();
        assert!(content_length(&conflict).is_err());

        assert_eq!(content_length(&Headers::new()).unwrap(), None);
    }

    #[test]
    fn test_is_chunked() {
        let chunked: Headers = vec![("Transfer-Encoding", "gzip, chunked")].into_iter().collect();
        assert!(is_chunked(&chunked));

        let plain: Headers = vec![("Transfer-Encoding", "chunked, gzip")].into_iter().collect();
        assert!(!is_chunked(&plain));
        assert!(!is_chunked(&Headers::new()));
    }
}
