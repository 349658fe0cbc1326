//! Outbound connection setup
//!
//! Resolves an `host:port` authority and opens a blocking TCP connection with
//! a bounded connect timeout. Sockets are created through `socket2` so the
//! options are applied before the connection is established.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not resolve {0}")]
    Resolve(String),

    #[error("Connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Resolve an authority (`host:port`) into socket addresses
pub fn resolve(authority: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = authority
        .to_socket_addrs()
        .map_err(|_| Error::Resolve(authority.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Resolve(authority.to_string()));
    }

    Ok(addrs)
}

/// Connect to the first reachable address of `authority`
pub fn dial(authority: &str, timeout: Option<Duration>) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in resolve(authority)? {
        match connect_addr(addr, timeout) {
            Ok(stream) => {
                tracing::debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(source) => {
                tracing::debug!(%addr, error = %source, "connect attempt failed");
                last_err = Some(Error::Connect { addr, source });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Resolve(authority.to_string())))
}

fn connect_addr(addr: SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;

    match timeout {
        Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
        None => socket.connect(&addr.into())?,
    }

    Ok(socket.into())
}

/// Host part of an authority, without port or IPv6 brackets
pub fn host(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }

    match authority.rsplit_once(':') {
        Some((host, _)) => host,
        None => authority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_host() {
        assert_eq!(host("localhost:61001"), "localhost");
        assert_eq!(host("example.com"), "example.com");
        assert_eq!(host("[::1]:8443"), "::1");
    }

    #[test]
    fn test_dial_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = dial(&addr.to_string(), Some(Duration::from_secs(1))).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
        assert!(stream.nodelay().unwrap());
    }

    #[test]
    fn test_resolve_failure() {
        let result = resolve("no port here");
        assert!(matches!(result, Err(Error::Resolve(_))));
    }
}
