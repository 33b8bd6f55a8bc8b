//! The invariant CRC: a reflected CRC-32 over 32-bit little-endian words,
//! seeded so that the variant header fields already processed by the link
//! layer are accounted for, plus the OR-mask that blinds the fields routers
//! may legitimately rewrite in flight.

use crate::error::{Result, RoceError};

/// CRC-32 generator polynomial, shared with the Ethernet FCS.
pub const ICRC_POLY: u32 = 0x04c1_1db7;
/// ICRC seed. Not the FCS seed: it folds in the eight masked bytes that
/// precede the IP header in the full IB LRH/GRH computation.
pub const ICRC_INIT: u32 = 0xdebb_20e3;

/// Per-byte OR-mask for the first 33 bytes of the ICRC region, stored the
/// way the hardware holds it: entry `32 - offset` applies to byte `offset`.
/// The bytes forced to ones end up being IP ToS/ECN (1), IP TTL (8), the IP
/// header checksum (10-11), the UDP checksum (26-27) and the BTH reserved
/// byte (32).
const ICRC_MASK: [u8; 33] = [
    0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0xff, 0xff, 0x00, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0xff, 0x00,
];

/// Bit-serial reflected CRC-32 over 32-bit words, low byte first.
///
/// The polynomial is given in its conventional (non-reflected) form and
/// bit-reversed once up front. Pure and deterministic; the returned state
/// can be fed back in as `init` to continue a running computation.
pub fn crc32_reflected(words: &[u32], poly: u32, init: u32) -> u32 {
    let poly_reversed = poly.reverse_bits();
    let mut crc = init;
    for word in words {
        for byte in word.to_le_bytes() {
            crc ^= byte as u32;
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (poly_reversed & mask);
            }
        }
    }
    crc
}

/// Computes the ICRC over an already masked region (IP header through
/// payload, trailer excluded). The region must be word aligned; RoCEv2
/// packets always are, anything else is a malformed frame.
pub fn compute_icrc(buf: &[u8]) -> Result<u32> {
    if buf.len() % 4 != 0 {
        return Err(RoceError::InvalidCrcLength { len: buf.len() });
    }
    let mut crc = ICRC_INIT;
    for chunk in buf.chunks_exact(4) {
        let word = u32::from_le_bytes(chunk.try_into().unwrap());
        crc = crc32_reflected(&[word], ICRC_POLY, crc);
    }
    Ok(!crc)
}

/// Applies the invariant-field mask in place to the region starting at the
/// IPv4 header. Bytes past offset 32 are untouched; OR-masking makes this
/// idempotent, so re-masking an already masked buffer is harmless.
pub fn mask_for_icrc(region: &mut [u8]) {
    let n = region.len().min(ICRC_MASK.len());
    for (offset, byte) in region[..n].iter_mut().enumerate() {
        *byte |= ICRC_MASK[ICRC_MASK.len() - 1 - offset];
    }
}
