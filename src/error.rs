use thiserror::Error;

pub use color_eyre::eyre::eyre;

use crate::protocol::response::ErrPayload;

pub type Result<T> = core::result::Result<T, Error>;

/// The error taxonomy of the core. Every fallible operation returns one of these; none
/// are swallowed internally. Transport and protocol errors poison the connection (see
/// [`Error::is_fatal`]); usage errors (wrong param count, statement already closed, a
/// result set already streaming) leave it usable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    TransportError(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("server error: {0}")]
    ServerError(#[from] ErrPayload),

    #[error("handshake incompatible: {0}")]
    HandshakeIncompatible(String),

    #[error("unsupported authentication plugin: {0}")]
    AuthPluginUnsupported(String),

    #[error("wrong number of parameters: statement expects {expected}, got {actual}")]
    WrongNumParams { expected: usize, actual: usize },

    #[error("statement is closed")]
    StatementClosed,

    #[error("a result set is already streaming on this connection")]
    ResultSetStreaming,

    #[error("server requested LOAD DATA LOCAL, which this core does not support")]
    LocalInfileUnsupported,

    #[error("connection is poisoned by a previous fatal error")]
    ConnectionPoisoned,

    #[error("bad configuration: {0}")]
    BadConfigError(String),

    #[error("internal error: {0}")]
    LibraryBug(#[source] color_eyre::Report),
}

impl Error {
    /// Fatal errors poison the connection: any malformed frame, sequence mismatch, or
    /// underlying I/O failure leaves protocol state unrecoverable (§7). Usage errors and
    /// server-reported `ERR` packets do not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TransportError(_) | Error::ProtocolError(_) | Error::LibraryBug(_)
        )
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::ProtocolError(msg.into())
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl<Src, Dst: ?Sized> From<zerocopy::CastError<Src, Dst>> for Error {
    fn from(err: zerocopy::CastError<Src, Dst>) -> Self {
        Error::LibraryBug(eyre!("{:#?}", err))
    }
}
