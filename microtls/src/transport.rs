//! [`Transport`] over `std::net::TcpStream`.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream};
use std::time::Duration;

use microtls_core::transport::DEFAULT_TIMEOUT_MS;
use microtls_core::{Transport, TransportError};

/// Blocking TCP transport.
///
/// # Example
///
/// ```rust,no_run
/// use std::net::Ipv4Addr;
/// use microtls::{TcpTransport, Transport};
///
/// let mut transport = TcpTransport::tcp()?;
/// transport.connect(Ipv4Addr::new(93, 184, 216, 34), 443)?;
/// # Ok::<(), microtls::TransportError>(())
/// ```
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    recv_timeout_ms: u32,
    send_timeout_ms: u32,
}

impl TcpTransport {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        let mut transport = Self {
            stream: Some(stream),
            recv_timeout_ms: DEFAULT_TIMEOUT_MS,
            send_timeout_ms: DEFAULT_TIMEOUT_MS,
        };
        transport.apply_timeouts()?;
        Ok(transport)
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }

    fn apply_timeouts(&mut self) -> Result<(), TransportError> {
        let recv = timeout(self.recv_timeout_ms);
        let send = timeout(self.send_timeout_ms);
        if let Some(stream) = &self.stream {
            stream
                .set_read_timeout(recv)
                .map_err(|_| TransportError::ConnectionFailed)?;
            stream
                .set_write_timeout(send)
                .map_err(|_| TransportError::ConnectionFailed)?;
        }
        Ok(())
    }
}

fn timeout(ms: u32) -> Option<Duration> {
    match ms {
        0 => None,
        ms => Some(Duration::from_millis(u64::from(ms))),
    }
}

fn map_io_error(error: &io::Error, fallback: TransportError) -> TransportError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => TransportError::Closed,
        _ => fallback,
    }
}

impl Transport for TcpTransport {
    fn tcp() -> Result<Self, TransportError> {
        Ok(Self {
            stream: None,
            recv_timeout_ms: DEFAULT_TIMEOUT_MS,
            send_timeout_ms: DEFAULT_TIMEOUT_MS,
        })
    }

    fn connect(&mut self, addr: Ipv4Addr, port: u16) -> Result<(), TransportError> {
        let target = SocketAddr::V4(SocketAddrV4::new(addr, port));
        let limit = timeout(self.send_timeout_ms).unwrap_or(Duration::from_secs(30));
        let stream = TcpStream::connect_timeout(&target, limit).map_err(|e| {
            tracing::debug!(%target, error = %e, "TCP connect failed");
            TransportError::ConnectionFailed
        })?;
        // Handshake flights are small; do not hold them back
        stream
            .set_nodelay(true)
            .map_err(|_| TransportError::ConnectionFailed)?;
        self.stream = Some(stream);
        self.apply_timeouts()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.stream()?
            .write(data)
            .map_err(|e| map_io_error(&e, TransportError::SendFailed))
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        loop {
            match self.stream()?.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(&e, TransportError::RecvFailed)),
            }
        }
    }

    fn set_recv_timeout(&mut self, timeout_ms: u32) -> Result<(), TransportError> {
        self.recv_timeout_ms = timeout_ms;
        self.apply_timeouts()
    }

    fn set_send_timeout(&mut self, timeout_ms: u32) -> Result<(), TransportError> {
        self.send_timeout_ms = timeout_ms;
        self.apply_timeouts()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_unconnected_transport_is_closed() {
        let mut transport = TcpTransport::tcp().unwrap();
        assert_eq!(transport.send(b"x"), Err(TransportError::Closed));
        assert_eq!(transport.recv(&mut [0u8; 4]), Err(TransportError::Closed));
    }

    #[test]
    fn test_send_and_recv_over_loopback() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut transport = TcpTransport::tcp().unwrap();
        transport.connect(Ipv4Addr::LOCALHOST, port).unwrap();
        microtls_core::transport::send_all(&mut transport, b"hello").unwrap();
        let mut buf = [0u8; 5];
        let mut read = 0;
        while read < buf.len() {
            read += transport.recv(&mut buf[read..]).unwrap();
        }
        assert_eq!(&buf, b"hello");
        server.join().unwrap();

        // The server hung up
        assert_eq!(transport.recv(&mut buf), Ok(0));
        transport.close();
        assert_eq!(transport.send(b"x"), Err(TransportError::Closed));
    }

    #[test]
    fn test_recv_timeout() {
        let (listener, port) = listener();
        let mut transport = TcpTransport::tcp().unwrap();
        transport.connect(Ipv4Addr::LOCALHOST, port).unwrap();
        let _accepted = listener.accept().unwrap();

        transport.set_recv_timeout(50).unwrap();
        assert_eq!(transport.recv(&mut [0u8; 4]), Err(TransportError::Timeout));
    }

    #[test]
    fn test_connect_refused() {
        let (listener, port) = listener();
        drop(listener);
        let mut transport = TcpTransport::tcp().unwrap();
        assert_eq!(
            transport.connect(Ipv4Addr::LOCALHOST, port),
            Err(TransportError::ConnectionFailed)
        );
    }
}
