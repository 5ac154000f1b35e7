//! Fixed-width bit sequences for the id payload and its checksum.
//!
//! Bits are big-endian: index 0 is the most significant bit.
//!
//! The checksum is the population count of the 16 id bits stored in 4 bits.
//! A count of 16 (id 65535) does not fit and wraps to 0, so that id never
//! verifies: it always comes back as [`WatermarkError::ChecksumMismatch`].

use crate::error::{Result, WatermarkError};
use crate::{CHECKSUM_BITS, ID_BITS, PAYLOAD_BITS};

/// Expands `value` into exactly `width` big-endian bits.
pub fn encode(value: u32, width: usize) -> Result<Vec<bool>> {
    if width < 32 && value >> width != 0 {
        return Err(WatermarkError::ValueOutOfRange { value, width });
    }
    Ok(encode_low_bits(value, width))
}

/// Big-endian recombination, the inverse of [`encode`].
pub fn decode(bits: &[bool]) -> u32 {
    bits.iter().fold(0u32, |acc, &bit| (acc << 1) | bit as u32)
}

pub fn popcount(bits: &[bool]) -> u32 {
    bits.iter().filter(|&&b| b).count() as u32
}

/// Appends the population count of `bits` as a 4-bit big-endian field.
///
/// Counts above 15 keep only their low 4 bits.
pub fn append_checksum(mut bits: Vec<bool>) -> Vec<bool> {
    let checksum = encode_low_bits(popcount(&bits), CHECKSUM_BITS);
    bits.extend(checksum);
    bits
}

/// Splits a 20-bit sequence into payload and checksum and returns the
/// payload only if its population count equals the stored checksum.
pub fn verify_checksum(bits: &[bool; PAYLOAD_BITS]) -> Result<u16> {
    let (payload, checksum) = bits.split_at(ID_BITS);
    let stored = decode(checksum);
    let computed = popcount(payload);
    let value = decode(payload) as u16;
    if stored != computed {
        return Err(WatermarkError::ChecksumMismatch {
            payload: value,
            stored,
            computed,
        });
    }
    Ok(value)
}

/// The full 20-bit grid payload for `id`.
pub fn id_payload(id: u16) -> [bool; PAYLOAD_BITS] {
    let bits = append_checksum(encode_low_bits(u32::from(id), ID_BITS));
    let mut out = [false; PAYLOAD_BITS];
    out.copy_from_slice(&bits);
    out
}

fn encode_low_bits(value: u32, width: usize) -> Vec<bool> {
    (0..width)
        .rev()
        .map(|i| i < 32 && (value >> i) & 1 == 1)
        .collect()
}
