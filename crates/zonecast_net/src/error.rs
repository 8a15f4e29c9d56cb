//! Error taxonomy for the transport layer.

use thiserror::Error;

/// Errors that are genuinely fatal to the operation in progress, or that a
/// caller must observe to decide whether to retry. Peer-level faults that the
/// bridge degrades silently (timeout, disconnect, EPOLLHUP) are represented
/// as `Ok` outcomes elsewhere, never as this error type -- see
/// [`crate::client_table::WriteOutcome`] and [`crate::client_table::ReadOutcome`].
#[derive(Error, Debug)]
pub enum NetError {
    #[error("failed to bind port {1}: {0}")]
    Bind(#[source] std::io::Error, u16),

    #[error("failed to listen on port {1}: {0}")]
    Listen(#[source] std::io::Error, u16),

    #[error("accept() failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("USERID handshake rejected connection on port {0}")]
    HandshakeRejected(u16),

    #[error("client id {0} exceeds the maximum concurrent user count")]
    ClientIdOutOfRange(u32),

    #[error("epoll operation failed: {0}")]
    Epoll(#[source] nix::Error),

    #[error("short write for a control frame: expected {expected} bytes, wrote {wrote}")]
    ShortFrameWrite { expected: usize, wrote: usize },

    #[error("short read for a control frame: expected {expected} bytes, read {read}")]
    ShortFrameRead { expected: usize, read: usize },
}

pub type NetResult<T> = Result<T, NetError>;
