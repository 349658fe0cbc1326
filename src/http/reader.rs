//! Buffered reads over a session
//!
//! `SessionReader` is shared by both sides of the upgrade. The HTTP/1.1 head
//! is parsed line by line, and whatever the peer already sent past the blank
//! line stays in the buffer so the HTTP/2 frame reader sees it first.

use super::session::{HttpSession, SessionOps};
use super::{Error, Result, MAX_LINE_LEN};
use bytes::{Bytes, BytesMut};

/// Size of a single read from the transport
const READ_CHUNK: usize = 4096;

/// Buffered reader/writer over an [`HttpSession`]
pub struct SessionReader<S: SessionOps> {
    session: HttpSession<S>,
    buffer: BytesMut,
}

impl<S: SessionOps> SessionReader<S> {
    /// Wrap an existing session
    pub fn new(session: HttpSession<S>) -> Self {
        SessionReader {
            session,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Wrap raw session operations with the default deadline
    pub fn from_ops(ops: S) -> Self {
        Self::new(HttpSession::new(ops))
    }

    /// Get a reference to the underlying session
    pub fn session(&self) -> &HttpSession<S> {
        &self.session
    }

    /// Get a mutable reference to the underlying session
    pub fn session_mut(&mut self) -> &mut HttpSession<S> {
        &mut self.session
    }

    /// Bytes read from the transport but not consumed yet
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Read once from the transport into the buffer; 0 means EOF
    fn fill(&mut self) -> Result<usize> {
        let mut temp = [0u8; READ_CHUNK];
        let n = self.session.read(&mut temp)?;
        self.buffer.extend_from_slice(&temp[..n]);
        Ok(n)
    }

    /// Read one line, without its line terminator
    ///
    /// Accepts CRLF and bare LF endings.
    pub fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos - 1);
                }
                return String::from_utf8(line.to_vec())
                    .map_err(|_| Error::Parse("Line is not valid UTF-8".to_string()));
            }

            if self.buffer.len() > MAX_LINE_LEN {
                return Err(Error::TooLarge(MAX_LINE_LEN));
            }

            if self.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Read exactly `len` bytes
    pub fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        match self.try_read_exact(len)? {
            Some(bytes) => Ok(bytes),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Read exactly `len` bytes, or `None` on a clean EOF before the first one
    ///
    /// EOF after some but not all bytes arrived is an error.
    pub fn try_read_exact(&mut self, len: usize) -> Result<Option<Bytes>> {
        while self.buffer.len() < len {
            if self.fill()? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Error::ConnectionClosed);
            }
        }

        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Read until the peer closes, failing past `limit` bytes
    pub fn read_to_end(&mut self, limit: usize) -> Result<Bytes> {
        loop {
            if self.buffer.len() > limit {
                return Err(Error::TooLarge(limit));
            }
            if self.fill()? == 0 {
                return Ok(self.buffer.split().freeze());
            }
        }
    }

    /// Write the whole buffer
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.session.write_all(buf)
    }

    /// Flush the underlying transport
    pub fn flush(&mut self) -> Result<()> {
        self.session.flush()
    }

    /// Close the underlying transport
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}
