//! The transport collaborator (§6, §9): a blocking byte-stream abstraction over TCP or a
//! Unix domain socket. The engine never assumes TCP; tests substitute an in-memory
//! scripted mock that implements the same `Read + Write` contract.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A connected, full-duplex byte stream. `TCP_NODELAY` is the caller's concern (set on
/// `TcpStream` before wrapping); this type only frames reads through a `BufReader` to
/// amortize syscalls across the many small header/payload reads a command cycle makes.
pub enum Stream {
    Tcp(BufReader<TcpStream>),
    #[cfg(unix)]
    Unix(BufReader<UnixStream>),
    #[cfg(test)]
    Mock(MockStream),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    #[cfg(unix)]
    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    /// Wraps a scripted in-memory transport (§9 design note: tests substitute a mock for
    /// the live socket). `script` is the bytes the "server" side will hand back, in order.
    #[cfg(test)]
    pub fn mock(script: Vec<u8>) -> Self {
        Self::Mock(MockStream::new(script))
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
            #[cfg(test)]
            Self::Mock(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(s) => s.get_mut().write(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.get_mut().write(buf),
            #[cfg(test)]
            Self::Mock(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(s) => s.get_mut().flush(),
            #[cfg(unix)]
            Self::Unix(s) => s.get_mut().flush(),
            #[cfg(test)]
            Self::Mock(s) => s.flush(),
        }
    }
}

/// A loopback transport that replays pre-recorded server bytes and records what the
/// client wrote, so the command/response path can be exercised without a live server.
#[cfg(test)]
pub struct MockStream {
    inbound: std::io::Cursor<Vec<u8>>,
    pub written: Vec<u8>,
}

#[cfg(test)]
impl MockStream {
    pub fn new(script: Vec<u8>) -> Self {
        Self {
            inbound: std::io::Cursor::new(script),
            written: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inbound.read(buf)
    }
}

#[cfg(test)]
impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
