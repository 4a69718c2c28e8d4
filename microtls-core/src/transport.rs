//! Byte-stream transport interface.
//!
//! The engine never opens sockets itself. It drives a [`Transport`] supplied
//! by the application: a TCP socket on a host, a driver handle on a board,
//! or an in-memory pipe in tests.

use core::fmt;
use std::net::Ipv4Addr;

/// Default send and receive timeout.
pub const DEFAULT_TIMEOUT_MS: u32 = 30_000;

/// Transport failures, surfaced to callers unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportError {
    /// A send or receive timeout elapsed
    Timeout,
    /// Establishing the connection failed
    ConnectionFailed,
    /// Writing to the transport failed
    SendFailed,
    /// Reading from the transport failed
    RecvFailed,
    /// The transport is closed
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TransportError::Timeout => "transport timed out",
            TransportError::ConnectionFailed => "connection failed",
            TransportError::SendFailed => "send failed",
            TransportError::RecvFailed => "receive failed",
            TransportError::Closed => "transport closed",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for TransportError {}

/// Blocking, ordered byte stream.
pub trait Transport {
    /// Create an unconnected TCP endpoint.
    fn tcp() -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Connect to `addr:port`.
    fn connect(&mut self, addr: Ipv4Addr, port: u16) -> Result<(), TransportError>;

    /// Write some of `data`, returning how many bytes were accepted.
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read into `buf`. `Ok(0)` means the peer closed the stream.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Bound every subsequent `recv` call.
    fn set_recv_timeout(&mut self, timeout_ms: u32) -> Result<(), TransportError>;

    /// Bound every subsequent `send` call.
    fn set_send_timeout(&mut self, timeout_ms: u32) -> Result<(), TransportError>;

    /// Close the stream. Further calls fail with `Closed`.
    fn close(&mut self);
}

/// Write all of `data`, looping over short writes.
pub fn send_all<T: Transport + ?Sized>(
    transport: &mut T,
    data: &[u8],
) -> Result<(), TransportError> {
    let mut written = 0;
    while written < data.len() {
        match transport.send(&data[written..])? {
            0 => return Err(TransportError::SendFailed),
            n => written += n,
        }
    }
    Ok(())
}

/// Outcome of [`recv_exact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadExact {
    /// The buffer was filled.
    Complete,
    /// The stream ended after this many bytes (possibly zero).
    Eof(usize),
}

/// Fill `buf` completely, looping over short reads.
pub fn recv_exact<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &mut [u8],
) -> Result<ReadExact, TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        match transport.recv(&mut buf[filled..])? {
            0 => return Ok(ReadExact::Eof(filled)),
            n => filled += n,
        }
    }
    Ok(ReadExact::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryTransport;

    #[test]
    fn test_send_all_loops_over_short_writes() {
        let mut transport = MemoryTransport::with_incoming(&[]);
        transport.chunk = 3;
        send_all(&mut transport, b"0123456789").unwrap();
        assert_eq!(transport.outgoing, b"0123456789");
    }

    #[test]
    fn test_recv_exact_short_reads() {
        let mut transport = MemoryTransport::with_incoming(b"abcdefgh");
        transport.chunk = 2;
        let mut buf = [0u8; 5];
        assert_eq!(recv_exact(&mut transport, &mut buf), Ok(ReadExact::Complete));
        assert_eq!(&buf, b"abcde");
    }

    #[test]
    fn test_recv_exact_reports_eof_position() {
        let mut transport = MemoryTransport::with_incoming(b"abc");
        let mut buf = [0u8; 5];
        assert_eq!(recv_exact(&mut transport, &mut buf), Ok(ReadExact::Eof(3)));

        let mut empty = MemoryTransport::with_incoming(&[]);
        assert_eq!(recv_exact(&mut empty, &mut buf), Ok(ReadExact::Eof(0)));
    }

    #[test]
    fn test_timeout_propagates() {
        let mut transport = MemoryTransport::with_incoming(&[]);
        transport.timeout_on_empty = true;
        let mut buf = [0u8; 1];
        assert_eq!(
            recv_exact(&mut transport, &mut buf),
            Err(TransportError::Timeout)
        );
    }
}
