use crate::wire::{ConnectionIdLength, SequenceNumberLength};

/// A 32-bit version tag, as exchanged during version negotiation.
pub type VersionTag = u32;

/// Whether a packet belongs to an FEC group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecGroupMembership {
    NotInGroup,
    InGroup,
}

/// The portion of the packet header that precedes encryption.
///
/// `reset_flag` and `version_present` never both hold: a public reset
/// packet is never also a version negotiation packet.
#[derive(Debug, Clone)]
pub struct PacketPublicHeader {
    pub connection_id: u64,
    pub connection_id_length: ConnectionIdLength,
    pub version_present: bool,
    pub reset_flag: bool,
    /// Populated only while negotiating a version: the client's proposed
    /// version on a request, or the server's supported list on a rejection.
    pub versions: Vec<VersionTag>,
    pub sequence_number_length: SequenceNumberLength,
}

impl PacketPublicHeader {
    pub fn new(connection_id: u64, sequence_number_length: SequenceNumberLength) -> Self {
        Self {
            connection_id,
            connection_id_length: ConnectionIdLength::Eight,
            version_present: false,
            reset_flag: false,
            versions: Vec::new(),
            sequence_number_length,
        }
    }
}

/// The full packet header: the public portion plus the fields carried
/// inside the encrypted private header.
#[derive(Debug, Clone)]
pub struct PacketHeader {
    pub public_header: PacketPublicHeader,
    /// Never zero on the wire.
    pub packet_sequence_number: u64,
    pub entropy_flag: bool,
    pub fec_flag: bool,
    pub fec_group_membership: FecGroupMembership,
    /// Sequence number of the first packet in the FEC group. Only
    /// meaningful when `fec_group_membership == InGroup`.
    pub fec_group: u64,
}

impl PacketHeader {
    pub fn new(public_header: PacketPublicHeader, packet_sequence_number: u64) -> Self {
        Self {
            public_header,
            packet_sequence_number,
            entropy_flag: false,
            fec_flag: false,
            fec_group_membership: FecGroupMembership::NotInGroup,
            fec_group: 0,
        }
    }
}

/// A public reset packet: `rejected_sequence_number` is truncated to 48
/// bits on the wire, same as an ordinary packet sequence number.
#[derive(Debug, Clone)]
pub struct PublicResetPacket {
    pub public_header: PacketPublicHeader,
    pub nonce_proof: u64,
    pub rejected_sequence_number: u64,
}
