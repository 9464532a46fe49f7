use thiserror::Error;

use crate::error::QuicheError;

#[derive(Debug, PartialEq)]
pub(crate) enum ConnectionState {
    Handshake,
    Connected,
    Closing,
    Closed,
}

/// Errors local to the connection's socket/lifecycle plumbing. Kept
/// separate from [`crate::error::QuicheError`], whose closed `ErrorCode`
/// set belongs to the framer's wire-level contract, not to UDP I/O or
/// channel bookkeeping.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] QuicheError),
    #[error("connection shutdown channel closed")]
    ChannelClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ConnectionError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ConnectionError::ChannelClosed
    }
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;
