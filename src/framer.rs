use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::bytes::{ByteBuilder, ByteCursor};
use crate::crypto::{Cryptor, EncryptionLevel};
use crate::entropy::ZeroEntropyOracle;
use crate::error::{ErrorCode, QuicheError, QuicheResult};
use crate::fec::FecBuilder;
use crate::frame::{Frame, FrameCoder};
use crate::packet::{FecGroupMembership, PacketCoder, PacketHeader, PacketPublicHeader, PublicResetPacket, VersionTag};
use crate::visitor::FrameVisitor;
use crate::wire::{RecvState, MAX_PACKET_SIZE};

/// An outbound packet that hasn't been sealed yet: the public-header span
/// that becomes AEAD associated data, and the private-header-plus-frames
/// span that becomes the plaintext. Mirrors the original's
/// `QuicPacket::AssociatedData()`/`Plaintext()` split.
pub struct RawPacket {
    bytes: Bytes,
    associated_data_len: usize,
}

impl RawPacket {
    pub fn associated_data(&self) -> &[u8] {
        &self.bytes[..self.associated_data_len]
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.bytes[self.associated_data_len..]
    }
}

/// Orchestrates [`PacketCoder`], [`FrameCoder`], and [`Cryptor`] into the
/// public build/encrypt/process operations, dispatching parsed packets to a
/// caller-supplied [`FrameVisitor`].
///
/// Single-threaded, synchronous, non-suspending: one `Framer` belongs to
/// exactly one connection and must not be driven concurrently.
pub struct Framer {
    packet_coder: PacketCoder,
    frame_coder: FrameCoder,
    cryptor: Cryptor,
    recv_state: RecvState,
    quic_version: VersionTag,
    is_server: bool,
}

impl Framer {
    pub fn new(quic_version: VersionTag, is_server: bool) -> Self {
        Self {
            packet_coder: PacketCoder::new(),
            frame_coder: FrameCoder::new(),
            cryptor: Cryptor::new(),
            recv_state: RecvState::default(),
            quic_version,
            is_server,
        }
    }

    pub fn cryptor_mut(&mut self) -> &mut Cryptor {
        &mut self.cryptor
    }

    /// Writes the public header (associated data) and the private header
    /// plus frames (plaintext) into one buffer, returning the packet plus
    /// its per-packet entropy bit. Truncation of the first ack/
    /// connection-close frame is handled inline by `FrameCoder`.
    pub fn build_data_packet(&mut self, header: &PacketHeader, frames: &[Frame]) -> QuicheResult<(RawPacket, u8)> {
        let budget = self.cryptor.max_plaintext_size(MAX_PACKET_SIZE);
        let mut builder = ByteBuilder::new(budget);
        self.packet_coder.write_public_header(&mut builder, &header.public_header)?;
        builder.write_uint(header.public_header.sequence_number_length.byte_len(), header.packet_sequence_number)?;
        let associated_data_len = builder.len();

        self.packet_coder.write_private_header(&mut builder, header)?;

        for (i, frame) in frames.iter().enumerate() {
            let is_first = i == 0;
            let is_last = i == frames.len() - 1;
            let free = builder.remaining_capacity();
            if self.frame_coder.serialized_length(frame, free, is_first) == 0 && !matches!(frame, Frame::Padding) {
                return Err(QuicheError::new(ErrorCode::InvalidFrameData, "frame does not fit in the packet"));
            }
            self.frame_coder.write_frame(&mut builder, frame, is_last, &ZeroEntropyOracle)?;
        }

        Ok((
            RawPacket { bytes: builder.freeze(), associated_data_len },
            header.entropy_flag as u8,
        ))
    }

    /// Writes the header followed by caller-supplied redundancy bytes. FEC
    /// packets are never themselves encrypted; a write failure yields an
    /// empty sentinel rather than propagating, per the orchestrator's
    /// write-failure policy for outbound packets.
    pub fn build_fec_packet(&mut self, header: &PacketHeader, redundancy: &[u8]) -> Bytes {
        let mut builder = ByteBuilder::new(MAX_PACKET_SIZE);
        let result = (|| -> QuicheResult<()> {
            self.packet_coder.write_header(&mut builder, header)?;
            builder.write_bytes(redundancy)
        })();
        match result {
            Ok(()) => builder.freeze(),
            Err(err) => {
                warn!(error = %err, "failed to build fec packet");
                Bytes::new()
            }
        }
    }

    pub fn build_public_reset(&mut self, packet: &PublicResetPacket) -> Bytes {
        self.packet_coder.build_public_reset(packet).unwrap_or_else(|err| {
            warn!(error = %err, "failed to build public reset packet");
            Bytes::new()
        })
    }

    pub fn build_version_negotiation(&mut self, connection_id: u64, supported_versions: &[VersionTag]) -> Bytes {
        self.packet_coder
            .build_version_negotiation(connection_id, supported_versions)
            .unwrap_or_else(|err| {
                warn!(error = %err, "failed to build version negotiation packet");
                Bytes::new()
            })
    }

    /// Seals `packet`'s plaintext span with the installed encrypter for
    /// `level`, binding the public header as associated data, and feeds the
    /// resulting ciphertext to `fec_builder` when the packet belongs to an
    /// FEC group.
    pub fn encrypt_packet(
        &self,
        level: EncryptionLevel,
        sequence_number: u64,
        header: &PacketHeader,
        packet: &RawPacket,
        fec_builder: Option<&mut dyn FecBuilder>,
    ) -> QuicheResult<Bytes> {
        let ciphertext =
            self.cryptor.encrypt_packet(level, sequence_number, packet.associated_data(), packet.plaintext())?;

        if header.fec_group_membership == FecGroupMembership::InGroup {
            if let Some(builder) = fec_builder {
                builder.on_built_fec_protected_payload(header, &ciphertext);
            }
        }

        let mut out = BytesMut::with_capacity(packet.associated_data_len + ciphertext.len());
        out.extend_from_slice(packet.associated_data());
        out.extend_from_slice(&ciphertext);
        Ok(out.freeze())
    }

    /// Parses a received, still-encrypted packet and dispatches it to
    /// `visitor`. Version mismatch, public reset, and version negotiation
    /// packets take their dedicated callbacks instead of ordinary frame
    /// dispatch.
    pub fn process_packet(&mut self, encrypted: &[u8], visitor: &mut FrameVisitor) -> QuicheResult<()> {
        let mut cursor = ByteCursor::new(Bytes::copy_from_slice(encrypted));
        let (public_header, _public_flags) = self.read_public_header_reporting(&mut cursor, visitor)?;

        if public_header.reset_flag {
            let reset = self.read_public_reset_reporting(&mut cursor, public_header, visitor)?;
            (visitor.on_public_reset_packet)(&reset);
            return Ok(());
        }

        if public_header.version_present {
            if self.is_server {
                let tag = *public_header.versions.first().ok_or_else(|| {
                    self.report_error(visitor, ErrorCode::InvalidPacketHeader, "version-present packet carries no version tag")
                })?;
                if tag != self.quic_version && !(visitor.on_protocol_version_mismatch)(tag) {
                    return Ok(());
                }
            } else {
                let versions = self.packet_coder.read_version_negotiation(&mut cursor).map_err(|err| {
                    self.report_error(visitor, ErrorCode::InvalidVersionNegotiationPacket, &err.detail);
                    err
                })?;
                (visitor.on_version_negotiation_packet)(&public_header, &versions);
                return Ok(());
            }
        }

        (visitor.on_packet)();

        let sequence_number = self
            .packet_coder
            .read_sequence_number(&mut cursor, &public_header, &self.recv_state)
            .map_err(|err| {
                self.report_error(visitor, err.code, &err.detail);
                err
            })?;

        let associated_data_len = cursor.position();
        let associated_data = &encrypted[..associated_data_len];
        let ciphertext = &encrypted[associated_data_len..];

        let plaintext = self.cryptor.decrypt_payload(sequence_number, associated_data, ciphertext).map_err(|err| {
            self.report_error(visitor, ErrorCode::DecryptionFailure, &err.detail);
            err
        })?;

        if plaintext.len() > MAX_PACKET_SIZE {
            let err = self.report_error(visitor, ErrorCode::PacketTooLarge, "decrypted payload exceeds max packet size");
            return Err(err);
        }

        self.recv_state.last_sequence_number = sequence_number;

        let mut plaintext_cursor = ByteCursor::new(plaintext);
        let header = self.packet_coder.read_private_header(&mut plaintext_cursor, public_header, sequence_number).map_err(|err| {
            self.report_error(visitor, err.code, &err.detail);
            err
        })?;

        if header.fec_group_membership == FecGroupMembership::InGroup && !header.fec_flag {
            (visitor.on_fec_protected_payload)(ciphertext);
        }

        if !(visitor.on_packet_header)(&header) {
            (visitor.on_packet_complete)();
            return Ok(());
        }

        if header.fec_flag {
            (visitor.on_fec_data)(&plaintext_cursor.read_remaining());
            (visitor.on_packet_complete)();
            return Ok(());
        }

        self.dispatch_frames(&mut plaintext_cursor, visitor)?;
        (visitor.on_packet_complete)();
        Ok(())
    }

    /// Dispatches frames already recovered out-of-band by FEC (no AEAD
    /// boundary to cross, since the plaintext was reconstructed directly).
    pub fn process_revived_packet(&mut self, header: PacketHeader, plaintext: &[u8], visitor: &mut FrameVisitor) -> QuicheResult<()> {
        if plaintext.len() > MAX_PACKET_SIZE {
            return Err(self.report_error(visitor, ErrorCode::PacketTooLarge, "revived payload exceeds max packet size"));
        }

        (visitor.on_revived_packet)(&header);

        if !(visitor.on_packet_header)(&header) {
            (visitor.on_packet_complete)();
            return Ok(());
        }

        let mut cursor = ByteCursor::new(Bytes::copy_from_slice(plaintext));
        self.dispatch_frames(&mut cursor, visitor)?;
        (visitor.on_packet_complete)();
        Ok(())
    }

    fn dispatch_frames(&mut self, cursor: &mut ByteCursor, visitor: &mut FrameVisitor) -> QuicheResult<()> {
        while !cursor.is_done() {
            let frame = match self.frame_coder.read_frame(cursor) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    self.report_error(visitor, err.code, &err.detail);
                    return Err(err);
                }
            };

            let keep_going = match &frame {
                Frame::Stream(f) => (visitor.on_stream_frame)(f),
                Frame::Ack(f) => (visitor.on_ack_frame)(f),
                Frame::CongestionFeedback(f) => (visitor.on_congestion_feedback_frame)(f),
                Frame::RstStream(f) => (visitor.on_rst_stream_frame)(f),
                Frame::ConnectionClose(f) => (visitor.on_connection_close_frame)(f),
                Frame::GoAway(f) => (visitor.on_goaway_frame)(f),
                Frame::Padding => true,
            };

            if !keep_going {
                debug!("visitor vetoed further frame dispatch");
                break;
            }
        }
        Ok(())
    }

    fn read_public_header_reporting(
        &self,
        cursor: &mut ByteCursor,
        visitor: &mut FrameVisitor,
    ) -> QuicheResult<(PacketPublicHeader, u8)> {
        self.packet_coder.read_public_header(cursor).map_err(|err| {
            self.report_error(visitor, err.code, &err.detail);
            err
        })
    }

    fn read_public_reset_reporting(
        &self,
        cursor: &mut ByteCursor,
        public_header: PacketPublicHeader,
        visitor: &mut FrameVisitor,
    ) -> QuicheResult<PublicResetPacket> {
        let mut reset = self.packet_coder.read_public_reset(cursor).map_err(|err| {
            self.report_error(visitor, ErrorCode::InvalidPublicRstPacket, &err.detail);
            err
        })?;
        reset.public_header = public_header;
        Ok(reset)
    }

    fn report_error(&self, visitor: &mut FrameVisitor, code: ErrorCode, detail: &str) -> QuicheError {
        (visitor.on_error)(code, detail);
        QuicheError::new(code, detail)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{NullDecrypter, NullEncrypter};
    use crate::packet::{PacketHeader, PacketPublicHeader};
    use crate::wire::SequenceNumberLength;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn wired_framer(is_server: bool) -> Framer {
        let mut framer = Framer::new(1, is_server);
        framer.cryptor_mut().set_encrypter(EncryptionLevel::None, Box::new(NullEncrypter));
        framer.cryptor_mut().set_decrypter(Box::new(NullDecrypter));
        framer
    }

    #[test]
    fn stream_frame_round_trips_through_build_encrypt_process() {
        let mut framer = wired_framer(true);
        let header = PacketHeader::new(PacketPublicHeader::new(42, SequenceNumberLength::One), 1);
        let frame = Frame::Stream(crate::frame::StreamFrame {
            stream_id: 1,
            offset: 0,
            fin: false,
            data: Bytes::from_static(b"hi"),
        });

        let (packet, _entropy) = framer.build_data_packet(&header, &[frame.clone(), Frame::Padding]).unwrap();
        let encrypted = framer.encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut visitor = FrameVisitor::noop();
        visitor.on_stream_frame = Box::new(move |f| {
            seen_clone.borrow_mut().push(f.clone());
            true
        });

        framer.process_packet(&encrypted, &mut visitor).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0], crate::frame::StreamFrame { stream_id: 1, offset: 0, fin: false, data: Bytes::from_static(b"hi") });
    }

    #[test]
    fn tampered_header_fails_decryption() {
        let mut framer = wired_framer(true);
        let header = PacketHeader::new(PacketPublicHeader::new(42, SequenceNumberLength::One), 1);
        let (packet, _) = framer.build_data_packet(&header, &[Frame::Padding]).unwrap();
        let encrypted = framer.encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap();

        let mut tampered = encrypted.to_vec();
        tampered[1] ^= 0xFF;

        let mut visitor = FrameVisitor::noop();
        assert!(framer.process_packet(&tampered, &mut visitor).is_err());
    }

    #[test]
    fn truncated_connection_id_mismatch_is_reported() {
        // Separate sender so the receiver's `last_connection_id` is only ever
        // learned from what it actually parses, not corrupted by write-side
        // bookkeeping for the tampered packet below.
        let mut sender = wired_framer(false);
        let mut receiver = wired_framer(true);

        let full_id = 0x1122_3344_5566_7788;
        let header = PacketHeader::new(PacketPublicHeader::new(full_id, SequenceNumberLength::One), 1);
        let (packet, _) = sender.build_data_packet(&header, &[Frame::Padding]).unwrap();
        let encrypted = sender.encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap();

        let mut visitor = FrameVisitor::noop();
        receiver.process_packet(&encrypted, &mut visitor).unwrap();

        let mut bad_header = header.clone();
        bad_header.public_header.connection_id = 0x99;
        bad_header.public_header.connection_id_length = crate::wire::ConnectionIdLength::One;
        bad_header.packet_sequence_number = 2;
        let (bad_packet, _) = sender.build_data_packet(&bad_header, &[Frame::Padding]).unwrap();
        let bad_encrypted = sender.encrypt_packet(EncryptionLevel::None, 2, &bad_header, &bad_packet, None).unwrap();

        assert!(receiver.process_packet(&bad_encrypted, &mut visitor).is_err());
    }
}
