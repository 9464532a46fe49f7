use bytes::{Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ErrorCode, QuicheError, QuicheResult};

/// Encryption level a packet is protected at. The handshake has no direct
/// counterpart here (this crate doesn't model the handshake) but the level
/// indirection is kept because header/packet protection keys change levels
/// independently of the data they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionLevel {
    None,
    Initial,
    Forward,
}

/// The out-of-scope cryptographic module's sealing side: only the
/// interface used by the framer is specified here.
pub trait Encrypter: std::fmt::Debug {
    fn encrypt(&self, sequence_number: u64, associated_data: &[u8], plaintext: &[u8]) -> QuicheResult<Bytes>;
    fn max_plaintext_size(&self, ciphertext_size: usize) -> usize;
}

/// The out-of-scope cryptographic module's opening side.
pub trait Decrypter: std::fmt::Debug {
    fn decrypt(&self, sequence_number: u64, associated_data: &[u8], ciphertext: &[u8]) -> QuicheResult<Bytes>;
}

/// Mirrors `QuicNullEncrypter`/`QuicNullDecrypter`: no real confidentiality,
/// just a fixed-width tag folded from the plaintext and associated data,
/// enough to exercise framing and tamper-detection in tests.
const NULL_TAG_SIZE: usize = 16;

fn fnv1a_fold(associated_data: &[u8], plaintext: &[u8]) -> [u8; NULL_TAG_SIZE] {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in associated_data.iter().chain(plaintext.iter()) {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    let mut tag = [0u8; NULL_TAG_SIZE];
    tag[..8].copy_from_slice(&hash.to_le_bytes());
    tag[8..].copy_from_slice(&hash.rotate_left(17).to_le_bytes());
    tag
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEncrypter;

impl Encrypter for NullEncrypter {
    fn encrypt(&self, _sequence_number: u64, associated_data: &[u8], plaintext: &[u8]) -> QuicheResult<Bytes> {
        let mut out = BytesMut::with_capacity(plaintext.len() + NULL_TAG_SIZE);
        out.extend_from_slice(plaintext);
        out.extend_from_slice(&fnv1a_fold(associated_data, plaintext));
        Ok(out.freeze())
    }

    fn max_plaintext_size(&self, ciphertext_size: usize) -> usize {
        ciphertext_size.saturating_sub(NULL_TAG_SIZE)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullDecrypter;

impl Decrypter for NullDecrypter {
    fn decrypt(&self, _sequence_number: u64, associated_data: &[u8], ciphertext: &[u8]) -> QuicheResult<Bytes> {
        if ciphertext.len() < NULL_TAG_SIZE {
            return Err(QuicheError::new(ErrorCode::DecryptionFailure, "ciphertext shorter than tag"));
        }
        let split = ciphertext.len() - NULL_TAG_SIZE;
        let (plaintext, tag) = ciphertext.split_at(split);
        if tag != fnv1a_fold(associated_data, plaintext) {
            return Err(QuicheError::new(ErrorCode::DecryptionFailure, "tag mismatch"));
        }
        Ok(Bytes::copy_from_slice(plaintext))
    }
}

/// Owns the encrypter table and the decrypter (+ optional alternative with
/// latch), and seals/opens packets with the header pinned in as associated
/// data.
#[derive(Debug)]
pub struct Cryptor {
    encrypters: HashMap<EncryptionLevel, Box<dyn Encrypter>>,
    decrypter: Box<dyn Decrypter>,
    alternative_decrypter: Option<Box<dyn Decrypter>>,
    alternative_decrypter_latch: bool,
}

impl Default for Cryptor {
    fn default() -> Self {
        let mut encrypters: HashMap<EncryptionLevel, Box<dyn Encrypter>> = HashMap::new();
        encrypters.insert(EncryptionLevel::None, Box::new(NullEncrypter));
        Self {
            encrypters,
            decrypter: Box::new(NullDecrypter),
            alternative_decrypter: None,
            alternative_decrypter_latch: false,
        }
    }
}

impl Cryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_encrypter(&mut self, level: EncryptionLevel, encrypter: Box<dyn Encrypter>) {
        self.encrypters.insert(level, encrypter);
    }

    pub fn set_decrypter(&mut self, decrypter: Box<dyn Decrypter>) {
        self.decrypter = decrypter;
        self.alternative_decrypter = None;
        self.alternative_decrypter_latch = false;
    }

    pub fn set_alternative_decrypter(&mut self, decrypter: Box<dyn Decrypter>, latch_once_used: bool) {
        self.alternative_decrypter = Some(decrypter);
        self.alternative_decrypter_latch = latch_once_used;
    }

    pub fn encrypt_packet(
        &self,
        level: EncryptionLevel,
        sequence_number: u64,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> QuicheResult<Bytes> {
        let encrypter = self
            .encrypters
            .get(&level)
            .ok_or_else(|| QuicheError::new(ErrorCode::EncryptionFailure, "no encrypter installed for level"))?;
        encrypter
            .encrypt(sequence_number, associated_data, plaintext)
            .map_err(|_| QuicheError::new(ErrorCode::EncryptionFailure, "encrypter rejected packet"))
    }

    /// Tries the primary decrypter, then the alternative if present. A
    /// successful alternative-decrypter open either latches it in as the new
    /// primary (if `latch_once_used` was set) or swaps the two so the
    /// alternative is tried first next time, supporting zero-gap key
    /// rollover.
    pub fn decrypt_payload(
        &mut self,
        sequence_number: u64,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> QuicheResult<Bytes> {
        if let Ok(plaintext) = self.decrypter.decrypt(sequence_number, associated_data, ciphertext) {
            return Ok(plaintext);
        }

        if let Some(alt) = &self.alternative_decrypter {
            if let Ok(plaintext) = alt.decrypt(sequence_number, associated_data, ciphertext) {
                if self.alternative_decrypter_latch {
                    self.decrypter = self.alternative_decrypter.take().unwrap();
                } else {
                    std::mem::swap(&mut self.decrypter, self.alternative_decrypter.as_mut().unwrap());
                }
                return Ok(plaintext);
            }
        }

        Err(QuicheError::new(ErrorCode::DecryptionFailure, "no installed decrypter could open the packet"))
    }

    /// Minimum of every installed encrypter's plaintext budget for the given
    /// ciphertext size, conservative across levels so packet sizing is
    /// stable as encryption levels change.
    pub fn max_plaintext_size(&self, ciphertext_size: usize) -> usize {
        self.encrypters
            .values()
            .map(|e| e.max_plaintext_size(ciphertext_size))
            .min()
            .unwrap_or(ciphertext_size)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn null_crypto_round_trips() {
        let mut cryptor = Cryptor::new();
        let associated_data = b"header-bytes";
        let plaintext = b"hello quic";
        let ciphertext = cryptor.encrypt_packet(EncryptionLevel::None, 1, associated_data, plaintext).unwrap();
        let decrypted = cryptor.decrypt_payload(1, associated_data, &ciphertext).unwrap();
        assert_eq!(&decrypted[..], plaintext);
    }

    #[test]
    fn tampered_associated_data_fails_to_decrypt() {
        let mut cryptor = Cryptor::new();
        let ciphertext = cryptor.encrypt_packet(EncryptionLevel::None, 1, b"header", b"payload").unwrap();
        assert!(cryptor.decrypt_payload(1, b"tampered", &ciphertext).is_err());
    }

    #[test]
    fn alternative_decrypter_latches_in_as_primary() {
        let mut cryptor = Cryptor::new();
        cryptor.set_decrypter(Box::new(NullDecrypter));
        cryptor.set_alternative_decrypter(Box::new(NullDecrypter), true);
        let ciphertext = cryptor.encrypt_packet(EncryptionLevel::None, 7, b"ad", b"data").unwrap();
        let decrypted = cryptor.decrypt_payload(7, b"ad", &ciphertext).unwrap();
        assert_eq!(&decrypted[..], b"data");
    }

    proptest::proptest! {
        #[test]
        fn any_plaintext_and_associated_data_round_trips(
            associated_data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
            plaintext in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256),
            sequence_number in 0u64..=u64::MAX,
        ) {
            let mut cryptor = Cryptor::new();
            let ciphertext = cryptor
                .encrypt_packet(EncryptionLevel::None, sequence_number, &associated_data, &plaintext)
                .unwrap();
            let decrypted = cryptor.decrypt_payload(sequence_number, &associated_data, &ciphertext).unwrap();
            proptest::prop_assert_eq!(&decrypted[..], plaintext.as_slice());
        }
    }
}
