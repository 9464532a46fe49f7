mod connection_id;
mod sequence_number;

pub use connection_id::ConnectionIdLength;
pub use sequence_number::{RecvState, SequenceNumberLength};

pub(crate) use connection_id::low_bits;

/// Maximum serialized packet size on the wire, after encryption.
pub const MAX_PACKET_SIZE: usize = 1200;
