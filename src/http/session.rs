//! Transports and the deadline/cancel layer above them
//!
//! Upgrade negotiation and HTTP/2 framing only ever see [`HttpSession`], so
//! plain TCP, TLS and the scripted [`BufferSession`] used in tests are
//! interchangeable.

use super::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default deadline applied to every read and write
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// How often a blocked read wakes up to look at its cancel flag
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Raw transport operations
pub trait SessionOps {
    /// Wait up to `timeout` for readiness; `false` means the wait expired
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the session
    fn close(&mut self) -> Result<()>;
}

/// Readiness a session waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// Shared cancellation flag
///
/// Cloning yields another handle to the same flag, so one thread can cancel
/// an exchange that another thread is blocked in.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag in the not-cancelled state
    pub fn new() -> Self {
        CancelFlag::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// HTTP session wrapping a transport with session operations
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
    cancel: Option<CancelFlag>,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a new HTTP session
    pub fn new(session: S) -> Self {
        HttpSession {
            session,
            timeout: Some(DEFAULT_IO_TIMEOUT),
            cancel: None,
        }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Attach a cancellation flag checked while waiting for I/O
    pub fn set_cancel(&mut self, cancel: Option<CancelFlag>) {
        self.cancel = cancel;
    }

    /// Read data with timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.wait(PollEvents::Read)?;
        self.session.read(buf)
    }

    /// Write data with timeout
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.wait(PollEvents::Write)?;
        self.session.write(buf)
    }

    /// Write the whole buffer
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Flush the underlying transport
    pub fn flush(&mut self) -> Result<()> {
        self.session.flush()
    }

    /// Close the session
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Block until the session is ready, the deadline passes, or the
    /// cancel flag is raised
    fn wait(&self, events: PollEvents) -> Result<()> {
        let deadline = self.timeout.map(|t| Instant::now() + t);

        loop {
            if self.cancelled() {
                return Err(Error::Cancelled);
            }

            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Timeout);
                    }
                    let remaining = deadline - now;
                    Some(if self.cancel.is_some() {
                        remaining.min(CANCEL_POLL_INTERVAL)
                    } else {
                        remaining
                    })
                }
                None => self.cancel.as_ref().map(|_| CANCEL_POLL_INTERVAL),
            };

            if self.session.poll(events, slice)? {
                return Ok(());
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::Timeout);
            }
        }
    }
}

/// Plain file descriptor session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create a new FD session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }
}

/// Poll a raw file descriptor
pub(crate) fn poll_fd(fd: i32, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(Error::Io(err));
    }

    Ok(result > 0)
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush().map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(Error::from(e)),
            _ => Ok(()),
        }
    }
}

/// One step of traffic seen by a [`BufferSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// The engine read this many bytes
    Read(usize),
    /// The engine wrote these bytes
    Wrote(Vec<u8>),
}

#[derive(Debug, Default)]
struct BufferInner {
    segments: VecDeque<Vec<u8>>,
    offset: usize,
    written: Vec<u8>,
    transcript: Vec<Transfer>,
    closed: bool,
}

/// In-memory read/write/close session
///
/// Reads are served from queued segments, one segment at most per call, so a
/// test can control where reads stop. Everything written is captured. Clones
/// share the same buffers, which lets a test keep a handle for inspection
/// after the engine has taken ownership.
#[derive(Debug, Clone, Default)]
pub struct BufferSession {
    inner: Arc<Mutex<BufferInner>>,
}

impl BufferSession {
    /// Create an empty session; reads return EOF until input is pushed
    pub fn new() -> Self {
        BufferSession::default()
    }

    /// Create a session with a single input segment
    pub fn with_input(input: impl Into<Vec<u8>>) -> Self {
        let session = BufferSession::new();
        session.push_segment(input);
        session
    }

    /// Queue one more input segment
    pub fn push_segment(&self, segment: impl Into<Vec<u8>>) {
        let segment = segment.into();
        if !segment.is_empty() {
            self.lock().segments.push_back(segment);
        }
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Ordered record of reads and writes
    pub fn transcript(&self) -> Vec<Transfer> {
        self.lock().transcript.clone()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        // A panic while holding the lock only happens in a failing test
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionOps for BufferSession {
    fn poll(&self, _events: PollEvents, _timeout: Option<Duration>) -> Result<bool> {
        Ok(true)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(0);
        }

        let offset = inner.offset;
        let Some(segment) = inner.segments.front() else {
            return Ok(0);
        };

        let n = buf.len().min(segment.len() - offset);
        buf[..n].copy_from_slice(&segment[offset..offset + n]);
        let exhausted = offset + n == segment.len();

        if exhausted {
            inner.segments.pop_front();
            inner.offset = 0;
        } else {
            inner.offset += n;
        }
        inner.transcript.push(Transfer::Read(n));

        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "buffer session closed",
            )));
        }

        inner.written.extend_from_slice(buf);
        inner.transcript.push(Transfer::Wrote(buf.to_vec()));
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}
