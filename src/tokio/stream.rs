//! The async counterpart of [`crate::transport::Stream`] (§9: the transport is a
//! trait-shaped collaborator, not baked-in TCP). Exposes the same small read/write
//! surface the engine needs, over either a TCP or Unix domain socket connection.

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

pub enum Stream {
    Tcp(BufReader<TcpStream>),
    #[cfg(unix)]
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    #[cfg(unix)]
    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(reader) => reader.read_exact(buf).await.map(|_| ()),
            #[cfg(unix)]
            Self::Unix(reader) => reader.read_exact(buf).await.map(|_| ()),
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(reader) => reader.get_mut().write_all(buf).await,
            #[cfg(unix)]
            Self::Unix(reader) => reader.get_mut().write_all(buf).await,
        }
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(reader) => reader.get_mut().flush().await,
            #[cfg(unix)]
            Self::Unix(reader) => reader.get_mut().flush().await,
        }
    }
}
