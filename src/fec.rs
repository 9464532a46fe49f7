use crate::packet::PacketHeader;

/// The external FEC builder collaborator: fed the encrypted body of every
/// packet in an FEC group as it is sent, and consulted for the redundancy
/// bytes when the framer is explicitly asked to build an FEC packet.
pub trait FecBuilder {
    fn on_built_fec_protected_payload(&mut self, header: &PacketHeader, protected_payload: &[u8]);
}

/// Used when FEC protection isn't configured for a connection.
#[derive(Debug, Default)]
pub struct NoopFecBuilder;

impl FecBuilder for NoopFecBuilder {
    fn on_built_fec_protected_payload(&mut self, _header: &PacketHeader, _protected_payload: &[u8]) {}
}
