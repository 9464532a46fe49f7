use crate::bytes::{ByteBuilder, ByteCursor};
use crate::entropy::EntropyOracle;
use crate::error::{ErrorCode, QuicheError, QuicheResult};

use super::types::{
    AckFrame, CongestionFeedbackFrame, ConnectionCloseFrame, ConnectionErrorCode, Frame,
    FixRateFeedback, GoAwayFrame, InterArrivalFeedback, ReceivedPacketInfo, ReceivedPacketTime,
    RstStreamErrorCode, RstStreamFrame, SentPacketInfo, StreamFrame, TcpFeedback,
};

const FRAME_TYPE_SIZE: usize = 1;
const ENTROPY_HASH_SIZE: usize = 1;
const SEQUENCE_NUMBER_SIZE: usize = 6;
const DELTA_TIME_SIZE: usize = 4;
const NUM_MISSING_PACKETS_SIZE: usize = 1;
const STREAM_PAYLOAD_LENGTH_SIZE: usize = 2;
const MAX_STREAM_ID_SIZE: usize = 4;
const ERROR_CODE_SIZE: usize = 4;
const ERROR_DETAILS_LENGTH_SIZE: usize = 2;
const INVALID_DELTA_TIME: u32 = 0xFFFF_FFFF;

const CONGESTION_FEEDBACK_INTER_ARRIVAL: u8 = 0;
const CONGESTION_FEEDBACK_FIX_RATE: u8 = 1;
const CONGESTION_FEEDBACK_TCP: u8 = 2;

/// General frame-type discriminants carried in the high 5 bits of a frame
/// type byte whose low 3 bits are all set (see [`write_type_byte`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum GeneralFrameKind {
    Padding = 0,
    RstStream = 1,
    ConnectionClose = 2,
    GoAway = 3,
}

fn stream_id_byte_len(stream_id: u32) -> usize {
    let mut v = stream_id;
    for n in 1..=4 {
        v >>= 8;
        if v == 0 {
            return n;
        }
    }
    4
}

fn stream_offset_byte_len(offset: u64) -> usize {
    if offset == 0 {
        return 0;
    }
    let mut v = offset >> 8;
    for n in 2..=8 {
        v >>= 8;
        if v == 0 {
            return n;
        }
    }
    8
}

fn min_stream_frame_size(frame: &StreamFrame, last_in_packet: bool) -> usize {
    FRAME_TYPE_SIZE
        + stream_id_byte_len(frame.stream_id)
        + stream_offset_byte_len(frame.offset)
        + if last_in_packet { 0 } else { STREAM_PAYLOAD_LENGTH_SIZE }
}

fn min_ack_frame_size() -> usize {
    FRAME_TYPE_SIZE
        + ENTROPY_HASH_SIZE
        + SEQUENCE_NUMBER_SIZE
        + ENTROPY_HASH_SIZE
        + SEQUENCE_NUMBER_SIZE
        + DELTA_TIME_SIZE
        + NUM_MISSING_PACKETS_SIZE
}

fn min_rst_stream_frame_size() -> usize {
    FRAME_TYPE_SIZE + MAX_STREAM_ID_SIZE + ERROR_CODE_SIZE + ERROR_DETAILS_LENGTH_SIZE
}

fn min_connection_close_frame_size() -> usize {
    FRAME_TYPE_SIZE + ERROR_CODE_SIZE + ERROR_DETAILS_LENGTH_SIZE + min_ack_frame_size()
}

fn min_goaway_frame_size() -> usize {
    FRAME_TYPE_SIZE + ERROR_CODE_SIZE + ERROR_DETAILS_LENGTH_SIZE + MAX_STREAM_ID_SIZE
}

/// Encodes and decodes every frame kind, including the packed stream-frame
/// type byte and ack-frame truncation.
#[derive(Debug, Default)]
pub struct FrameCoder;

impl FrameCoder {
    pub fn new() -> Self {
        Self
    }

    /// Size this frame would occupy if written untruncated (mirrors
    /// `ComputeFrameLength`).
    pub fn encoded_length(&self, frame: &Frame, last_in_packet: bool) -> usize {
        match frame {
            Frame::Stream(f) => min_stream_frame_size(f, last_in_packet) + f.data.len(),
            Frame::Ack(f) => min_ack_frame_size() + SEQUENCE_NUMBER_SIZE * f.received.missing_packets.len(),
            Frame::CongestionFeedback(f) => {
                FRAME_TYPE_SIZE
                    + 1
                    + match f {
                        CongestionFeedbackFrame::InterArrival(ia) => {
                            let mut len = 2 + 1;
                            if !ia.received_packet_times.is_empty() {
                                len += SEQUENCE_NUMBER_SIZE + 8;
                                len += SEQUENCE_NUMBER_SIZE * (ia.received_packet_times.len() - 1);
                            }
                            len
                        }
                        CongestionFeedbackFrame::FixRate(_) => 4,
                        CongestionFeedbackFrame::Tcp(_) => 4,
                    }
            }
            Frame::RstStream(f) => min_rst_stream_frame_size() + f.error_details.len(),
            Frame::ConnectionClose(f) => {
                min_connection_close_frame_size()
                    + f.error_details.len()
                    + SEQUENCE_NUMBER_SIZE * f.ack_frame.received.missing_packets.len()
            }
            Frame::GoAway(f) => min_goaway_frame_size() + f.reason_phrase.len(),
            Frame::Padding => 0,
        }
    }

    /// Decides how much of `frame` fits in `free_bytes`, per the sizing
    /// rules: padding always consumes the rest of the packet; a stream
    /// frame that doesn't fit with a length prefix is retried as the last
    /// frame; only the first frame in a packet may signal truncation.
    pub fn serialized_length(&self, frame: &Frame, free_bytes: usize, is_first: bool) -> usize {
        if matches!(frame, Frame::Padding) {
            return free_bytes;
        }

        let full = self.encoded_length(frame, false);
        if full <= free_bytes {
            return full;
        }

        if let Frame::Stream(f) = frame {
            let as_last = min_stream_frame_size(f, true) + f.data.len();
            if as_last <= free_bytes {
                return as_last;
            }
        }

        if !is_first {
            return 0;
        }

        if matches!(frame, Frame::Ack(_) | Frame::ConnectionClose(_)) {
            return free_bytes;
        }

        0
    }

    /// Writes the general frame-type byte for the four frames that use it:
    /// `Padding`, `RstStream`, `ConnectionClose`, `GoAway`. Stream/Ack/
    /// CongestionFeedback frames pack their type byte inline instead.
    fn write_type_byte(&self, builder: &mut ByteBuilder, frame: &Frame) -> QuicheResult<()> {
        let kind = match frame {
            Frame::Padding => GeneralFrameKind::Padding,
            Frame::RstStream(_) => GeneralFrameKind::RstStream,
            Frame::ConnectionClose(_) => GeneralFrameKind::ConnectionClose,
            Frame::GoAway(_) => GeneralFrameKind::GoAway,
            Frame::Stream(_) | Frame::Ack(_) | Frame::CongestionFeedback(_) => {
                unreachable!("write_type_byte is only called for general-frame-kind variants")
            }
        };
        builder.write_u8(((kind as u8) << 3) | 0b111)
    }

    pub fn write_frame(
        &self,
        builder: &mut ByteBuilder,
        frame: &Frame,
        last_in_packet: bool,
        oracle: &dyn EntropyOracle,
    ) -> QuicheResult<()> {
        match frame {
            Frame::Stream(f) => self.write_stream_frame(builder, f, last_in_packet),
            Frame::Ack(f) => {
                builder.write_u8(0x01)?;
                self.write_ack_frame(builder, f, oracle)
            }
            Frame::CongestionFeedback(f) => {
                builder.write_u8(0x03)?;
                self.write_congestion_feedback(builder, f)
            }
            Frame::RstStream(f) => {
                self.write_type_byte(builder, frame)?;
                self.write_rst_stream(builder, f)
            }
            Frame::ConnectionClose(f) => {
                self.write_type_byte(builder, frame)?;
                self.write_connection_close(builder, f, oracle)
            }
            Frame::GoAway(f) => {
                self.write_type_byte(builder, frame)?;
                self.write_goaway(builder, f)
            }
            Frame::Padding => {
                self.write_type_byte(builder, frame)?;
                builder.write_padding();
                Ok(())
            }
        }
    }

    fn write_stream_frame(
        &self,
        builder: &mut ByteBuilder,
        frame: &StreamFrame,
        last_in_packet: bool,
    ) -> QuicheResult<()> {
        let stream_id_code = (stream_id_byte_len(frame.stream_id) - 1) as u8;
        let offset_len = stream_offset_byte_len(frame.offset);
        let offset_code = if offset_len == 0 { 0 } else { (offset_len - 1) as u8 };
        let has_length_bit = if last_in_packet { 0u8 } else { 1u8 };
        let fin_bit = frame.fin as u8;
        let type_byte = (fin_bit << 7) | (has_length_bit << 6) | (offset_code << 3) | (stream_id_code << 1);
        builder.write_u8(type_byte)?;

        builder.write_uint(stream_id_byte_len(frame.stream_id), frame.stream_id as u64)?;
        builder.write_uint(offset_len, frame.offset)?;
        if !last_in_packet {
            builder.write_u16(frame.data.len() as u16)?;
        }
        builder.write_bytes(&frame.data)
    }

    fn write_ack_frame(
        &self,
        builder: &mut ByteBuilder,
        frame: &AckFrame,
        oracle: &dyn EntropyOracle,
    ) -> QuicheResult<()> {
        builder.write_u8(frame.sent.entropy_hash)?;
        builder.write_u48(frame.sent.least_unacked)?;

        let received_entropy_offset = builder.len();
        builder.write_u8(frame.received.entropy_hash)?;

        let largest_observed_offset = builder.len();
        builder.write_u48(frame.received.largest_observed)?;

        let delta_time_offset = builder.len();
        let delta_time = frame.received.delta_time_largest_observed_us.unwrap_or(INVALID_DELTA_TIME);
        builder.write_u32(delta_time)?;

        let num_missing_offset = builder.len();
        let missing: Vec<u64> = frame.received.missing_packets.iter().copied().collect();
        builder.write_u8(missing.len() as u8)?;

        let mut written = 0usize;
        for (i, seq) in missing.iter().enumerate() {
            if builder.remaining_capacity() < SEQUENCE_NUMBER_SIZE {
                let largest_observed = calculate_largest_observed(&missing, i - 1);
                builder.write_u8_at(received_entropy_offset, oracle.entropy_hash_up_to(largest_observed));
                builder.write_u48_at(largest_observed_offset, largest_observed);
                builder.write_u32_at(delta_time_offset, INVALID_DELTA_TIME);
                builder.write_u8_at(num_missing_offset, written as u8);
                return Ok(());
            }
            builder.write_u48(*seq)?;
            written += 1;
        }
        Ok(())
    }

    fn write_congestion_feedback(
        &self,
        builder: &mut ByteBuilder,
        frame: &CongestionFeedbackFrame,
    ) -> QuicheResult<()> {
        match frame {
            CongestionFeedbackFrame::InterArrival(ia) => {
                builder.write_u8(CONGESTION_FEEDBACK_INTER_ARRIVAL)?;
                builder.write_u16(ia.accumulated_number_of_lost_packets)?;
                builder.write_u8(ia.received_packet_times.len() as u8)?;
                if let Some((first, rest)) = ia.received_packet_times.split_first() {
                    builder.write_u48(first.sequence_number)?;
                    builder.write_u64(first.time_received_us)?;
                    for entry in rest {
                        let sequence_delta = (entry.sequence_number - first.sequence_number) as u16;
                        let time_delta = entry.time_received_us as i64 - first.time_received_us as i64;
                        builder.write_u16(sequence_delta)?;
                        builder.write_i32(time_delta as i32)?;
                    }
                }
                Ok(())
            }
            CongestionFeedbackFrame::FixRate(fr) => {
                builder.write_u8(CONGESTION_FEEDBACK_FIX_RATE)?;
                builder.write_u32(fr.bitrate_bps)
            }
            CongestionFeedbackFrame::Tcp(tcp) => {
                builder.write_u8(CONGESTION_FEEDBACK_TCP)?;
                builder.write_u16(tcp.accumulated_number_of_lost_packets)?;
                builder.write_u16((tcp.receive_window >> 4) as u16)
            }
        }
    }

    fn write_rst_stream(&self, builder: &mut ByteBuilder, frame: &RstStreamFrame) -> QuicheResult<()> {
        builder.write_u32(frame.stream_id)?;
        builder.write_u32(frame.error_code as u32)?;
        builder.write_string16(&frame.error_details)
    }

    fn write_connection_close(
        &self,
        builder: &mut ByteBuilder,
        frame: &ConnectionCloseFrame,
        oracle: &dyn EntropyOracle,
    ) -> QuicheResult<()> {
        builder.write_u32(frame.error_code as u32)?;
        builder.write_string16(&frame.error_details)?;
        self.write_ack_frame(builder, &frame.ack_frame, oracle)
    }

    fn write_goaway(&self, builder: &mut ByteBuilder, frame: &GoAwayFrame) -> QuicheResult<()> {
        builder.write_u32(frame.error_code as u32)?;
        builder.write_string16(&frame.reason_phrase)?;
        builder.write_u32(frame.last_good_stream_id)
    }

    /// Parses one frame from `cursor`. `last_in_packet` tells the stream
    /// frame reader whether the data length is implicit (runs to end of
    /// packet) for this particular frame, since that is only knowable from
    /// the in-packet `has_explicit_length` bit, which this returns false
    /// for a stream frame whose bit was 0.
    pub fn read_frame(&self, cursor: &mut ByteCursor) -> QuicheResult<Option<Frame>> {
        let frame_type = cursor.read_u8()?;

        if frame_type & 0x01 == 0 {
            return self.read_stream_frame(cursor, frame_type).map(|f| Some(Frame::Stream(f)));
        }
        let shifted = frame_type >> 1;
        if shifted & 0x01 == 0 {
            return self.read_ack_frame(cursor).map(|f| Some(Frame::Ack(f)));
        }
        let shifted = shifted >> 1;
        if shifted & 0x01 == 0 {
            return self.read_congestion_feedback(cursor).map(|f| Some(Frame::CongestionFeedback(f)));
        }

        let kind = frame_type >> 3;
        match kind {
            0 => Ok(None), // padding: stop processing the rest of the packet
            1 => self.read_rst_stream(cursor).map(|f| Some(Frame::RstStream(f))),
            2 => self.read_connection_close(cursor).map(|f| Some(Frame::ConnectionClose(f))),
            3 => self.read_goaway(cursor).map(|f| Some(Frame::GoAway(f))),
            _ => Err(QuicheError::new(ErrorCode::InvalidFrameData, "illegal frame type")),
        }
    }

    fn read_stream_frame(&self, cursor: &mut ByteCursor, frame_type: u8) -> QuicheResult<StreamFrame> {
        let mut flags = frame_type >> 1;
        let stream_id_code = flags & 0b11;
        flags >>= 2;
        let offset_code = flags & 0b111;
        flags >>= 3;
        let has_length = flags & 0b1 == 0b1;
        flags >>= 1;
        let fin = flags & 0b1 == 0b1;

        let stream_id_len = stream_id_code as usize + 1;
        let offset_len = if offset_code == 0 { 0 } else { offset_code as usize + 1 };

        let stream_id = cursor.read_uint(stream_id_len)? as u32;
        let offset = cursor.read_uint(offset_len)?;
        let data = if has_length {
            let len = cursor.read_u16()? as usize;
            cursor.read_bytes(len)?
        } else {
            cursor.read_remaining()
        };

        Ok(StreamFrame { stream_id, offset, fin, data })
    }

    fn read_ack_frame(&self, cursor: &mut ByteCursor) -> QuicheResult<AckFrame> {
        let sent = SentPacketInfo {
            entropy_hash: cursor.read_u8()?,
            least_unacked: cursor.read_uint(SEQUENCE_NUMBER_SIZE)?,
        };

        let entropy_hash = cursor.read_u8()?;
        let largest_observed = cursor.read_uint(SEQUENCE_NUMBER_SIZE)?;
        let delta = cursor.read_u32()?;
        let delta_time_largest_observed_us = if delta == INVALID_DELTA_TIME { None } else { Some(delta) };

        let num_missing = cursor.read_u8()?;
        let mut missing_packets = std::collections::BTreeSet::new();
        for _ in 0..num_missing {
            missing_packets.insert(cursor.read_uint(SEQUENCE_NUMBER_SIZE)?);
        }

        Ok(AckFrame {
            sent,
            received: ReceivedPacketInfo {
                entropy_hash,
                largest_observed,
                delta_time_largest_observed_us,
                missing_packets,
            },
        })
    }

    fn read_congestion_feedback(&self, cursor: &mut ByteCursor) -> QuicheResult<CongestionFeedbackFrame> {
        let feedback_type = cursor.read_u8()?;
        match feedback_type {
            CONGESTION_FEEDBACK_INTER_ARRIVAL => {
                let accumulated_number_of_lost_packets = cursor.read_u16()?;
                let num_received = cursor.read_u8()?;
                let mut received_packet_times = Vec::new();
                if num_received > 0 {
                    let smallest_received = cursor.read_uint(SEQUENCE_NUMBER_SIZE)?;
                    let time_received_us = cursor.read_u64()?;
                    received_packet_times.push(ReceivedPacketTime {
                        sequence_number: smallest_received,
                        time_received_us,
                    });
                    for _ in 0..(num_received - 1) {
                        let sequence_delta = cursor.read_u16()? as u64;
                        let time_delta = cursor.read_u32()? as i32 as i64;
                        received_packet_times.push(ReceivedPacketTime {
                            sequence_number: smallest_received + sequence_delta,
                            time_received_us: (time_received_us as i64 + time_delta) as u64,
                        });
                    }
                }
                Ok(CongestionFeedbackFrame::InterArrival(InterArrivalFeedback {
                    accumulated_number_of_lost_packets,
                    received_packet_times,
                }))
            }
            CONGESTION_FEEDBACK_FIX_RATE => Ok(CongestionFeedbackFrame::FixRate(FixRateFeedback {
                bitrate_bps: cursor.read_u32()?,
            })),
            CONGESTION_FEEDBACK_TCP => {
                let accumulated_number_of_lost_packets = cursor.read_u16()?;
                let receive_window = (cursor.read_u16()? as u32) << 4;
                Ok(CongestionFeedbackFrame::Tcp(TcpFeedback {
                    accumulated_number_of_lost_packets,
                    receive_window,
                }))
            }
            _ => Err(QuicheError::new(ErrorCode::InvalidCongestionFeedbackData, "illegal congestion feedback type")),
        }
    }

    fn read_rst_stream(&self, cursor: &mut ByteCursor) -> QuicheResult<RstStreamFrame> {
        let stream_id = cursor.read_u32()?;
        let error_code_raw = cursor.read_u32()?;
        let error_code = RstStreamErrorCode::from_u32(error_code_raw)
            .ok_or_else(|| QuicheError::new(ErrorCode::InvalidRstStreamData, "invalid rst stream error code"))?;
        let error_details = cursor.read_string16()?;
        Ok(RstStreamFrame { stream_id, error_code, error_details })
    }

    fn read_connection_close(&self, cursor: &mut ByteCursor) -> QuicheResult<ConnectionCloseFrame> {
        let error_code_raw = cursor.read_u32()?;
        let error_code = ConnectionErrorCode::from_u32(error_code_raw)
            .ok_or_else(|| QuicheError::new(ErrorCode::InvalidConnectionCloseData, "invalid error code"))?;
        let error_details = cursor.read_string16()?;
        let ack_frame = self.read_ack_frame(cursor)?;
        Ok(ConnectionCloseFrame { error_code, error_details, ack_frame })
    }

    fn read_goaway(&self, cursor: &mut ByteCursor) -> QuicheResult<GoAwayFrame> {
        let error_code_raw = cursor.read_u32()?;
        let error_code = ConnectionErrorCode::from_u32(error_code_raw)
            .ok_or_else(|| QuicheError::new(ErrorCode::InvalidGoAwayData, "invalid error code"))?;
        let reason_phrase = cursor.read_string16()?;
        let last_good_stream_id = cursor.read_u32()?;
        Ok(GoAwayFrame { error_code, last_good_stream_id, reason_phrase })
    }
}

/// Mirrors `CalculateLargestObserved`: the written-missing-set's implied
/// largest-observed is either the packet just below a gap after the last
/// written entry, or the last written entry itself.
fn calculate_largest_observed(missing: &[u64], last_written_index: usize) -> u64 {
    let previous_missing = missing[last_written_index];
    if let Some(&next) = missing.get(last_written_index + 1) {
        if previous_missing + 1 != next {
            return next - 1;
        }
    }
    previous_missing
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entropy::ZeroEntropyOracle;

    #[test]
    fn stream_frame_round_trips_with_explicit_length() {
        let coder = FrameCoder::new();
        let frame = Frame::Stream(StreamFrame {
            stream_id: 4,
            offset: 300,
            fin: true,
            data: bytes::Bytes::from_static(b"hello"),
        });
        let mut builder = ByteBuilder::new(64);
        coder.write_frame(&mut builder, &frame, false, &ZeroEntropyOracle).unwrap();
        let mut cursor = ByteCursor::new(builder.freeze());
        let decoded = coder.read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn stream_frame_last_in_packet_omits_length_and_reads_to_end() {
        let coder = FrameCoder::new();
        let frame = Frame::Stream(StreamFrame {
            stream_id: 1,
            offset: 0,
            fin: false,
            data: bytes::Bytes::from_static(b"tail"),
        });
        let mut builder = ByteBuilder::new(32);
        coder.write_frame(&mut builder, &frame, true, &ZeroEntropyOracle).unwrap();
        let mut cursor = ByteCursor::new(builder.freeze());
        let decoded = coder.read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn ack_frame_round_trips_without_truncation() {
        let coder = FrameCoder::new();
        let mut missing = std::collections::BTreeSet::new();
        missing.insert(10);
        missing.insert(12);
        let frame = Frame::Ack(AckFrame {
            sent: SentPacketInfo { entropy_hash: 1, least_unacked: 5 },
            received: ReceivedPacketInfo {
                entropy_hash: 2,
                largest_observed: 13,
                delta_time_largest_observed_us: Some(1234),
                missing_packets: missing,
            },
        });
        let mut builder = ByteBuilder::new(64);
        coder.write_frame(&mut builder, &frame, true, &ZeroEntropyOracle).unwrap();
        let mut cursor = ByteCursor::new(builder.freeze());
        let decoded = coder.read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn ack_frame_truncates_when_buffer_runs_out() {
        let coder = FrameCoder::new();
        let mut missing = std::collections::BTreeSet::new();
        missing.insert(100);
        missing.insert(101);
        missing.insert(105);
        let frame = AckFrame {
            sent: SentPacketInfo { entropy_hash: 0, least_unacked: 0 },
            received: ReceivedPacketInfo {
                entropy_hash: 9,
                largest_observed: 200,
                delta_time_largest_observed_us: Some(1),
                missing_packets: missing,
            },
        };

        // Enough room for the fixed fields plus exactly one missing entry.
        let capacity = min_ack_frame_size() - FRAME_TYPE_SIZE + SEQUENCE_NUMBER_SIZE;
        let mut builder = ByteBuilder::new(capacity);
        coder.write_ack_frame(&mut builder, &frame, &ZeroEntropyOracle).unwrap();
        let bytes = builder.freeze();

        let mut cursor = ByteCursor::new(bytes);
        let decoded = coder.read_ack_frame(&mut cursor).unwrap();
        assert_eq!(decoded.received.missing_packets.len(), 1);
        assert!(decoded.received.missing_packets.contains(&100));
        // 101 immediately follows the last written entry (100), so there is
        // no gap; largest_observed falls back to the last written entry.
        assert_eq!(decoded.received.largest_observed, 100);
        assert_eq!(decoded.received.delta_time_largest_observed_us, None);
    }
}
