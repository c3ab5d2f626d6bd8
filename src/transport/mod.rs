//! Transport capability set: serial and socket share a small
//! read/write/close surface. Modeled as a trait rather than a class
//! hierarchy, so the orchestrator and the simulator's accept loop are
//! generic over whichever concrete transport they're driving.
//!
//! Serial-port setup is not implemented by this crate's binaries; the
//! trait boundary plus an in-process loopback double and a real TCP
//! implementation are what's provided here.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Byte-in/byte-out interface the core protocol layer needs from any
/// transport. Reads are non-blocking by contract: `read` returns `Ok(0)`
/// (not an error) when no data is currently available, matching the
/// socket transport's "empty-read returns no data" behavior from §5.
pub trait Transport: Send {
    /// Read as many bytes as are currently available, up to `buf.len()`.
    /// Returns the number of bytes read (may be 0).
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write `buf` in full or fail.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn close(&mut self);
}

/// An in-process, in-memory duplex transport backed by two shared byte
/// queues. Used to connect a reader and a simulator in integration tests,
/// and as the default for `--help`-free unit exercises of the orchestrator,
/// without opening any real serial port or TCP socket.
#[derive(Clone)]
pub struct ChannelTransport {
    inbox: Arc<Mutex<VecDeque<u8>>>,
    outbox: Arc<Mutex<VecDeque<u8>>>,
}

impl ChannelTransport {
    /// Create a connected pair: bytes written to `a` are read by `b`, and
    /// vice versa.
    pub fn pair() -> (ChannelTransport, ChannelTransport) {
        let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
        let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
        let a = ChannelTransport { inbox: b_to_a.clone(), outbox: a_to_b.clone() };
        let b = ChannelTransport { inbox: a_to_b, outbox: b_to_a };
        (a, b)
    }
}

impl Transport for ChannelTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inbox = self.inbox.lock().unwrap();
        let n = buf.len().min(inbox.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbox.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let mut outbox = self.outbox.lock().unwrap();
        outbox.extend(buf.iter().copied());
        Ok(())
    }

    fn close(&mut self) {
        self.inbox.lock().unwrap().clear();
    }
}

/// A `std::net::TcpStream`-backed transport, non-blocking by contract
/// (§5: "Socket: non-blocking; empty-read returns 'no data'"). This is the
/// one concrete transport the crate ships end-to-end, since the reader and
/// simulator binaries need to actually talk to each other over TCP; serial
/// port setup remains the out-of-scope collaborator per §1.
pub struct TcpTransport {
    stream: std::net::TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let stream = std::net::TcpStream::connect((host, port))?;
        stream.set_nonblocking(true)?;
        Ok(TcpTransport { stream })
    }

    pub fn from_stream(stream: std::net::TcpStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::io::Read as _;
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        use std::io::Write as _;
        self.stream.write_all(buf)
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn channel_transport_is_duplex() {
        let (mut a, mut b) = ChannelTransport::pair();
        a.write(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");

        b.write(b"world").unwrap();
        let n = a.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");
    }

    #[test]
    fn empty_read_returns_zero_not_error() {
        let (mut a, _b) = ChannelTransport::pair();
        let mut buf = [0u8; 16];
        let n = a.read(&mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn tcp_transport_loopback_is_duplex() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            TcpTransport::from_stream(stream).unwrap()
        });

        let mut client = TcpTransport::connect("127.0.0.1", addr.port()).unwrap();
        let mut server = server.join().unwrap();

        client.write(b"ping").unwrap();
        let mut buf = [0u8; 16];
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut n = 0;
        while n == 0 && std::time::Instant::now() < deadline {
            n = server.read(&mut buf).unwrap();
        }
        assert_eq!(&buf[..n], b"ping");
    }
}
