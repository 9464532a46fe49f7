use thiserror::Error;

/// Closed set of error codes surfaced to a [`crate::visitor::FrameVisitor`], mirroring
/// the original framer's `QuicErrorCode` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    NoError,
    InvalidPacketHeader,
    InvalidFrameData,
    InvalidStreamData,
    InvalidAckData,
    InvalidCongestionFeedbackData,
    InvalidRstStreamData,
    InvalidConnectionCloseData,
    InvalidGoAwayData,
    InvalidPublicRstPacket,
    InvalidVersionNegotiationPacket,
    DecryptionFailure,
    EncryptionFailure,
    PacketTooLarge,
    MissingPayload,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error type for every fallible operation in the framer.
///
/// Every variant carries the same `ErrorCode` surfaced to the visitor's
/// `on_error` slot, plus a human-readable detail string.
#[derive(Debug, Error)]
#[error("{code}: {detail}")]
pub struct QuicheError {
    pub code: ErrorCode,
    pub detail: String,
}

impl QuicheError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

pub type QuicheResult<T> = Result<T, QuicheError>;

pub fn require(cond: bool, code: ErrorCode, msg: &str) -> QuicheResult<()> {
    if !cond {
        return Err(QuicheError::new(code, msg));
    }
    Ok(())
}
