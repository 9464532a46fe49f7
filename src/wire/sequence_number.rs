/// Truncated width a packet sequence number is serialized with on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceNumberLength {
    One,
    Two,
    Four,
    Six,
}

impl SequenceNumberLength {
    pub fn byte_len(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
            Self::Six => 6,
        }
    }
}

/// The orchestrator's inbound reconstruction state: `last_sequence_number`
/// is read by `reconstruct` and written by the caller only after a
/// packet's AEAD tag has verified.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecvState {
    pub last_sequence_number: u64,
}

fn distance(a: u64, b: u64) -> u64 {
    if a < b {
        b - a
    } else {
        a - b
    }
}

fn closest_to(target: u64, a: u64, b: u64) -> u64 {
    if distance(target, a) < distance(target, b) {
        a
    } else {
        b
    }
}

impl RecvState {
    /// Expands a truncated wire sequence number back to its full 64-bit
    /// value, choosing whichever of the previous/current/next epoch lands
    /// closest to `last_sequence_number + 1`.
    pub fn reconstruct(&self, width: SequenceNumberLength, wire_bits: u64) -> u64 {
        let epoch_delta = 1u64 << (8 * width.byte_len());
        let next_expected = self.last_sequence_number.wrapping_add(1);
        let epoch = self.last_sequence_number & !(epoch_delta - 1);
        let prev_epoch = epoch.wrapping_sub(epoch_delta);
        let next_epoch = epoch.wrapping_add(epoch_delta);

        closest_to(
            next_expected,
            epoch + wire_bits,
            closest_to(next_expected, prev_epoch + wire_bits, next_epoch + wire_bits),
        )
    }
}
