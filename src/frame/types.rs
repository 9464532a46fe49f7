use std::collections::BTreeSet;

/// Error codes a stream reset carries, mirroring the original's closed
/// `QuicRstStreamErrorCode` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RstStreamErrorCode {
    NoError = 0,
    FlowControlReceivedTooMuchData = 1,
    ConnectionFlowControlReceivedTooMuchData = 2,
    LastError = 3,
}

impl RstStreamErrorCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::NoError),
            1 => Some(Self::FlowControlReceivedTooMuchData),
            2 => Some(Self::ConnectionFlowControlReceivedTooMuchData),
            _ => None,
        }
    }
}

/// Connection-level error codes, mirroring `QuicErrorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ConnectionErrorCode {
    NoError = 0,
    InvalidStreamData = 1,
    PacketTooLarge = 2,
    InvalidFrameData = 3,
    LastError = 4,
}

impl ConnectionErrorCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::NoError),
            1 => Some(Self::InvalidStreamData),
            2 => Some(Self::PacketTooLarge),
            3 => Some(Self::InvalidFrameData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub stream_id: u32,
    pub offset: u64,
    pub fin: bool,
    pub data: bytes::Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SentPacketInfo {
    pub entropy_hash: u8,
    pub least_unacked: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacketInfo {
    pub entropy_hash: u8,
    pub largest_observed: u64,
    /// `None` encodes the wire's `0xFFFF_FFFF` "infinite"/unknown sentinel.
    pub delta_time_largest_observed_us: Option<u32>,
    pub missing_packets: BTreeSet<u64>,
}

impl Default for ReceivedPacketInfo {
    fn default() -> Self {
        Self {
            entropy_hash: 0,
            largest_observed: 0,
            delta_time_largest_observed_us: None,
            missing_packets: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckFrame {
    pub sent: SentPacketInfo,
    pub received: ReceivedPacketInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacketTime {
    pub sequence_number: u64,
    pub time_received_us: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterArrivalFeedback {
    pub accumulated_number_of_lost_packets: u16,
    /// First entry is the anchor (`smallest_received`, absolute time);
    /// later entries are deltas against it on the wire.
    pub received_packet_times: Vec<ReceivedPacketTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixRateFeedback {
    pub bitrate_bps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFeedback {
    pub accumulated_number_of_lost_packets: u16,
    /// Already shifted back up by 4 bits from the wire's compressed form.
    pub receive_window: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CongestionFeedbackFrame {
    InterArrival(InterArrivalFeedback),
    FixRate(FixRateFeedback),
    Tcp(TcpFeedback),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    pub error_code: RstStreamErrorCode,
    pub error_details: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCloseFrame {
    pub error_code: ConnectionErrorCode,
    pub error_details: String,
    pub ack_frame: AckFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub error_code: ConnectionErrorCode,
    pub last_good_stream_id: u32,
    pub reason_phrase: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Stream(StreamFrame),
    Ack(AckFrame),
    CongestionFeedback(CongestionFeedbackFrame),
    RstStream(RstStreamFrame),
    ConnectionClose(ConnectionCloseFrame),
    GoAway(GoAwayFrame),
    Padding,
}
