use bytes::Bytes;

use crate::bytes::{ByteBuilder, ByteCursor};
use crate::error::{ErrorCode, QuicheError, QuicheResult};
use crate::wire::{low_bits, ConnectionIdLength, RecvState, SequenceNumberLength};

use super::header::{
    FecGroupMembership, PacketHeader, PacketPublicHeader, PublicResetPacket, VersionTag,
};

const PUBLIC_FLAG_RST: u8 = 1 << 0;
const PUBLIC_FLAG_VERSION: u8 = 1 << 1;
const PUBLIC_FLAG_GUID_0BYTE: u8 = 0b00 << 2;
const PUBLIC_FLAG_GUID_1BYTE: u8 = 0b01 << 2;
const PUBLIC_FLAG_GUID_4BYTE: u8 = 0b10 << 2;
const PUBLIC_FLAG_GUID_8BYTE: u8 = 0b11 << 2;
const PUBLIC_FLAG_GUID_MASK: u8 = 0b11 << 2;
const PUBLIC_FLAG_SEQ_1BYTE: u8 = 0b00 << 4;
const PUBLIC_FLAG_SEQ_2BYTE: u8 = 0b01 << 4;
const PUBLIC_FLAG_SEQ_4BYTE: u8 = 0b10 << 4;
const PUBLIC_FLAG_SEQ_6BYTE: u8 = 0b11 << 4;
const PUBLIC_FLAG_SEQ_MASK: u8 = 0b11 << 4;
const PUBLIC_FLAG_MAX: u8 = 0x3F;

const PRIVATE_FLAG_ENTROPY: u8 = 1 << 0;
const PRIVATE_FLAG_FEC_GROUP: u8 = 1 << 1;
const PRIVATE_FLAG_FEC: u8 = 1 << 2;
const PRIVATE_FLAG_MAX: u8 = 0x07;

fn guid_flag_for(length: ConnectionIdLength) -> u8 {
    match length {
        ConnectionIdLength::Zero => PUBLIC_FLAG_GUID_0BYTE,
        ConnectionIdLength::One => PUBLIC_FLAG_GUID_1BYTE,
        ConnectionIdLength::Four => PUBLIC_FLAG_GUID_4BYTE,
        ConnectionIdLength::Eight => PUBLIC_FLAG_GUID_8BYTE,
    }
}

fn seq_flag_for(length: SequenceNumberLength) -> u8 {
    match length {
        SequenceNumberLength::One => PUBLIC_FLAG_SEQ_1BYTE,
        SequenceNumberLength::Two => PUBLIC_FLAG_SEQ_2BYTE,
        SequenceNumberLength::Four => PUBLIC_FLAG_SEQ_4BYTE,
        SequenceNumberLength::Six => PUBLIC_FLAG_SEQ_6BYTE,
    }
}

fn guid_length_for_flag(public_flags: u8) -> ConnectionIdLength {
    match public_flags & PUBLIC_FLAG_GUID_MASK {
        PUBLIC_FLAG_GUID_0BYTE => ConnectionIdLength::Zero,
        PUBLIC_FLAG_GUID_1BYTE => ConnectionIdLength::One,
        PUBLIC_FLAG_GUID_4BYTE => ConnectionIdLength::Four,
        _ => ConnectionIdLength::Eight,
    }
}

fn seq_length_for_flag(public_flags: u8) -> SequenceNumberLength {
    match public_flags & PUBLIC_FLAG_SEQ_MASK {
        PUBLIC_FLAG_SEQ_1BYTE => SequenceNumberLength::One,
        PUBLIC_FLAG_SEQ_2BYTE => SequenceNumberLength::Two,
        PUBLIC_FLAG_SEQ_4BYTE => SequenceNumberLength::Four,
        _ => SequenceNumberLength::Six,
    }
}

/// Serializes and parses packet headers, public reset packets, and version
/// negotiation packets. Holds the last connection id seen on the wire so a
/// truncated id can be matched against it, mirroring the per-framer
/// `last_serialized_guid_` / truncated-id resolution on read.
#[derive(Debug, Default)]
pub struct PacketCoder {
    last_connection_id: u64,
}

impl PacketCoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_public_header(
        &mut self,
        builder: &mut ByteBuilder,
        public_header: &PacketPublicHeader,
    ) -> QuicheResult<()> {
        let mut flags = 0u8;
        if public_header.reset_flag {
            flags |= PUBLIC_FLAG_RST;
        }
        if public_header.version_present {
            flags |= PUBLIC_FLAG_VERSION;
        }
        flags |= seq_flag_for(public_header.sequence_number_length);
        flags |= guid_flag_for(public_header.connection_id_length);
        builder.write_u8(flags)?;

        let truncated = low_bits(public_header.connection_id, public_header.connection_id_length);
        builder.write_uint(public_header.connection_id_length.byte_len(), truncated)?;
        self.last_connection_id = public_header.connection_id;

        if public_header.version_present {
            let tag = public_header
                .versions
                .first()
                .copied()
                .ok_or_else(|| QuicheError::new(ErrorCode::InvalidPacketHeader, "version_present set without a version tag"))?;
            builder.write_u32(tag)?;
        }
        Ok(())
    }

    pub fn write_header(&mut self, builder: &mut ByteBuilder, header: &PacketHeader) -> QuicheResult<()> {
        self.write_public_header(builder, &header.public_header)?;
        builder.write_uint(
            header.public_header.sequence_number_length.byte_len(),
            header.packet_sequence_number,
        )?;
        self.write_private_header(builder, header)
    }

    /// Writes just the private-header fields (private flags, FEC offset):
    /// everything the AEAD treats as plaintext rather than associated data.
    /// Split out from [`Self::write_header`] so the orchestrator can encrypt
    /// exactly this span while pinning the public header + sequence number
    /// as associated data.
    pub fn write_private_header(&mut self, builder: &mut ByteBuilder, header: &PacketHeader) -> QuicheResult<()> {
        let mut private_flags = 0u8;
        if header.entropy_flag {
            private_flags |= PRIVATE_FLAG_ENTROPY;
        }
        if header.fec_group_membership == FecGroupMembership::InGroup {
            private_flags |= PRIVATE_FLAG_FEC_GROUP;
        }
        if header.fec_flag {
            private_flags |= PRIVATE_FLAG_FEC;
        }
        builder.write_u8(private_flags)?;

        if header.fec_group_membership == FecGroupMembership::InGroup {
            let offset = header
                .packet_sequence_number
                .checked_sub(header.fec_group)
                .ok_or_else(|| {
                    QuicheError::new(ErrorCode::InvalidPacketHeader, "fec_group exceeds packet sequence number")
                })?;
            if offset == 0 || offset > 255 {
                return Err(QuicheError::new(
                    ErrorCode::InvalidPacketHeader,
                    "fec group offset must be strictly positive and at most 255",
                ));
            }
            builder.write_u8(offset as u8)?;
        }
        Ok(())
    }

    /// Parses the unencrypted leading portion of a packet. Returns the
    /// public header plus the raw flags byte, needed by the caller to
    /// branch on reset/version-negotiation before touching private fields.
    pub fn read_public_header(&self, cursor: &mut ByteCursor) -> QuicheResult<(PacketPublicHeader, u8)> {
        let public_flags = cursor.read_u8()?;

        let reset_flag = public_flags & PUBLIC_FLAG_RST != 0;
        let version_present = public_flags & PUBLIC_FLAG_VERSION != 0;
        if !version_present && public_flags > PUBLIC_FLAG_MAX {
            return Err(QuicheError::new(ErrorCode::InvalidPacketHeader, "illegal public flags value"));
        }
        if reset_flag && version_present {
            return Err(QuicheError::new(
                ErrorCode::InvalidPacketHeader,
                "version flag set on a public reset packet",
            ));
        }

        let connection_id_length = guid_length_for_flag(public_flags);
        let wire_id = cursor.read_uint(connection_id_length.byte_len())?;
        let connection_id = match connection_id_length {
            ConnectionIdLength::Eight => wire_id,
            ConnectionIdLength::Zero => self.last_connection_id,
            _ => {
                if wire_id != low_bits(self.last_connection_id, connection_id_length) {
                    return Err(QuicheError::new(
                        ErrorCode::InvalidPacketHeader,
                        "truncated connection id does not match previously seen id",
                    ));
                }
                self.last_connection_id
            }
        };

        let sequence_number_length = seq_length_for_flag(public_flags);

        let mut versions = Vec::new();
        if version_present {
            // Only a server parses the tag inline; a client sees version_present
            // on a negotiation packet and reads the version list separately.
            versions.push(cursor.read_u32()?);
        }

        Ok((
            PacketPublicHeader {
                connection_id,
                connection_id_length,
                version_present,
                reset_flag,
                versions,
                sequence_number_length,
            },
            public_flags,
        ))
    }

    /// Reads the truncated sequence number from the cleartext tail of the
    /// public header and reconstructs its full value. This is still on the
    /// associated-data side of the AEAD boundary — callers decrypt
    /// everything after this point before parsing the private header.
    pub fn read_sequence_number(
        &self,
        cursor: &mut ByteCursor,
        public_header: &PacketPublicHeader,
        recv_state: &RecvState,
    ) -> QuicheResult<u64> {
        let wire_bits = cursor.read_uint(public_header.sequence_number_length.byte_len())?;
        let packet_sequence_number = recv_state.reconstruct(public_header.sequence_number_length, wire_bits);
        if packet_sequence_number == 0 {
            return Err(QuicheError::new(
                ErrorCode::InvalidPacketHeader,
                "packet sequence numbers cannot be 0",
            ));
        }
        Ok(packet_sequence_number)
    }

    /// Parses the private header fields that follow AEAD removal, given the
    /// already-parsed public header and the already-reconstructed sequence
    /// number.
    pub fn read_private_header(
        &mut self,
        cursor: &mut ByteCursor,
        public_header: PacketPublicHeader,
        packet_sequence_number: u64,
    ) -> QuicheResult<PacketHeader> {
        let private_flags = cursor.read_u8()?;
        if private_flags > PRIVATE_FLAG_MAX {
            return Err(QuicheError::new(ErrorCode::InvalidPacketHeader, "illegal private flags value"));
        }
        let entropy_flag = private_flags & PRIVATE_FLAG_ENTROPY != 0;
        let fec_flag = private_flags & PRIVATE_FLAG_FEC != 0;

        let (fec_group_membership, fec_group) = if private_flags & PRIVATE_FLAG_FEC_GROUP != 0 {
            let offset = cursor.read_u8()? as u64;
            if offset == 0 || offset >= packet_sequence_number {
                return Err(QuicheError::new(
                    ErrorCode::InvalidPacketHeader,
                    "fec group offset must be strictly positive and less than the sequence number",
                ));
            }
            (FecGroupMembership::InGroup, packet_sequence_number - offset)
        } else {
            (FecGroupMembership::NotInGroup, 0)
        };

        self.last_connection_id = public_header.connection_id;
        Ok(PacketHeader {
            public_header,
            packet_sequence_number,
            entropy_flag,
            fec_flag,
            fec_group_membership,
            fec_group,
        })
    }

    /// Convenience wrapper over [`Self::read_sequence_number`] +
    /// [`Self::read_private_header`] for callers that aren't splitting the
    /// read across an AEAD boundary (tests, revived/FEC-recovered packets
    /// that were never encrypted).
    pub fn read_header(
        &mut self,
        cursor: &mut ByteCursor,
        public_header: PacketPublicHeader,
        recv_state: &RecvState,
    ) -> QuicheResult<PacketHeader> {
        let packet_sequence_number = self.read_sequence_number(cursor, &public_header, recv_state)?;
        self.read_private_header(cursor, public_header, packet_sequence_number)
    }

    pub fn build_public_reset(&mut self, packet: &PublicResetPacket) -> QuicheResult<Bytes> {
        let mut builder = ByteBuilder::new(1 + 8 + 8 + 6);
        let flags = PUBLIC_FLAG_RST | PUBLIC_FLAG_GUID_8BYTE | PUBLIC_FLAG_SEQ_6BYTE;
        builder.write_u8(flags)?;
        builder.write_u64(packet.public_header.connection_id)?;
        builder.write_u64(packet.nonce_proof)?;
        builder.write_u48(packet.rejected_sequence_number)?;
        Ok(builder.freeze())
    }

    pub fn read_public_reset(&self, cursor: &mut ByteCursor) -> QuicheResult<PublicResetPacket> {
        let nonce_proof = cursor.read_u64()?;
        let rejected_sequence_number = cursor.read_uint(6)?;
        Ok(PublicResetPacket {
            public_header: PacketPublicHeader::new(self.last_connection_id, SequenceNumberLength::Six),
            nonce_proof,
            rejected_sequence_number,
        })
    }

    pub fn build_version_negotiation(
        &mut self,
        connection_id: u64,
        supported_versions: &[VersionTag],
    ) -> QuicheResult<Bytes> {
        let mut builder = ByteBuilder::new(1 + 8 + 4 * supported_versions.len());
        let flags = PUBLIC_FLAG_VERSION | PUBLIC_FLAG_GUID_8BYTE | PUBLIC_FLAG_SEQ_6BYTE;
        builder.write_u8(flags)?;
        builder.write_u64(connection_id)?;
        for tag in supported_versions {
            builder.write_u32(*tag)?;
        }
        Ok(builder.freeze())
    }

    pub fn read_version_negotiation(&self, cursor: &mut ByteCursor) -> QuicheResult<Vec<VersionTag>> {
        let mut versions = Vec::new();
        loop {
            versions.push(cursor.read_u32()?);
            if cursor.is_done() {
                break;
            }
        }
        Ok(versions)
    }
}
