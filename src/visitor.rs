use crate::entropy::{EntropyOracle, ZeroEntropyOracle};
use crate::error::ErrorCode;
use crate::frame::{AckFrame, CongestionFeedbackFrame, ConnectionCloseFrame, GoAwayFrame, RstStreamFrame, StreamFrame};
use crate::packet::{PacketHeader, PacketPublicHeader, PublicResetPacket, VersionTag};

/// The framer's callback surface, expressed as a capability set of function
/// values rather than a trait object: every slot is required, and a caller
/// that doesn't care about a given callback installs a no-op. The framer
/// never owns a visitor across calls — it borrows one per `process_packet`.
pub struct FrameVisitor {
    pub on_error: Box<dyn FnMut(ErrorCode, &str)>,
    pub on_packet: Box<dyn FnMut()>,
    pub on_public_reset_packet: Box<dyn FnMut(&PublicResetPacket)>,
    pub on_version_negotiation_packet: Box<dyn FnMut(&PacketPublicHeader, &[VersionTag])>,
    pub on_protocol_version_mismatch: Box<dyn FnMut(VersionTag) -> bool>,
    pub on_packet_header: Box<dyn FnMut(&PacketHeader) -> bool>,
    pub on_fec_protected_payload: Box<dyn FnMut(&[u8])>,
    pub on_stream_frame: Box<dyn FnMut(&StreamFrame) -> bool>,
    pub on_ack_frame: Box<dyn FnMut(&AckFrame) -> bool>,
    pub on_congestion_feedback_frame: Box<dyn FnMut(&CongestionFeedbackFrame) -> bool>,
    pub on_rst_stream_frame: Box<dyn FnMut(&RstStreamFrame) -> bool>,
    pub on_connection_close_frame: Box<dyn FnMut(&ConnectionCloseFrame) -> bool>,
    pub on_goaway_frame: Box<dyn FnMut(&GoAwayFrame) -> bool>,
    pub on_fec_data: Box<dyn FnMut(&[u8])>,
    pub on_packet_complete: Box<dyn FnMut()>,
    pub on_revived_packet: Box<dyn FnMut(&PacketHeader)>,
    pub entropy_oracle: Box<dyn EntropyOracle>,
}

impl FrameVisitor {
    /// Accepts everything, vetoes nothing, logs nowhere. A starting point
    /// for embedders and the default used by tests that only care about a
    /// handful of callbacks.
    pub fn noop() -> Self {
        Self {
            on_error: Box::new(|_, _| {}),
            on_packet: Box::new(|| {}),
            on_public_reset_packet: Box::new(|_| {}),
            on_version_negotiation_packet: Box::new(|_, _| {}),
            on_protocol_version_mismatch: Box::new(|_| true),
            on_packet_header: Box::new(|_| true),
            on_fec_protected_payload: Box::new(|_| {}),
            on_stream_frame: Box::new(|_| true),
            on_ack_frame: Box::new(|_| true),
            on_congestion_feedback_frame: Box::new(|_| true),
            on_rst_stream_frame: Box::new(|_| true),
            on_connection_close_frame: Box::new(|_| true),
            on_goaway_frame: Box::new(|_| true),
            on_fec_data: Box::new(|_| {}),
            on_packet_complete: Box::new(|| {}),
            on_revived_packet: Box::new(|_| {}),
            entropy_oracle: Box::new(ZeroEntropyOracle),
        }
    }
}

impl Default for FrameVisitor {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn noop_visitor_vetoes_nothing() {
        let mut visitor = FrameVisitor::noop();
        assert!((visitor.on_packet_header)(&PacketHeader::new(
            PacketPublicHeader::new(1, crate::wire::SequenceNumberLength::One),
            1
        )));
        assert_eq!(visitor.entropy_oracle.entropy_hash_up_to(5), 0);
    }
}
