pub mod coder;
pub mod types;

pub use coder::FrameCoder;
pub use types::{
    AckFrame, CongestionFeedbackFrame, ConnectionCloseFrame, ConnectionErrorCode,
    FixRateFeedback, Frame, GoAwayFrame, InterArrivalFeedback, ReceivedPacketInfo,
    ReceivedPacketTime, RstStreamErrorCode, RstStreamFrame, SentPacketInfo, StreamFrame,
    TcpFeedback,
};
