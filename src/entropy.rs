/// Supplies the entropy hash "as of" a given sequence number, used to
/// rewrite an ack frame's received-entropy field after truncation.
///
/// A real calculator tracks the XOR of per-packet entropy bits up to and
/// including `sequence_number`; that bookkeeping lives with the connection
/// controller, not the framer, so only the interface is specified here.
pub trait EntropyOracle {
    fn entropy_hash_up_to(&self, sequence_number: u64) -> u8;
}

/// Always reports zero entropy. Useful for tests and for callers that do
/// not track per-packet entropy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroEntropyOracle;

impl EntropyOracle for ZeroEntropyOracle {
    fn entropy_hash_up_to(&self, _sequence_number: u64) -> u8 {
        0
    }
}
