//! XOR checksum codec
//!
//! Every fixed-layout structure on the wire ends in a single checksum byte that
//! is the XOR of all bytes before it. Sender and receiver must lay the fields
//! out in exactly the same order with no padding, otherwise the checksum is
//! meaningless.
//!
//! This only catches accidental corruption. It is not a MAC.

/// XOR of every byte in `bytes`
pub fn xor_fold(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Checksum of an encoded structure, excluding its trailing checksum byte
///
/// An empty slice has no checksum byte and yields 0.
pub fn checksum(encoded: &[u8]) -> u8 {
    match encoded.split_last() {
        Some((_, body)) => xor_fold(body),
        None => 0,
    }
}

/// Writes the checksum into the last byte of `encoded`
pub fn seal(encoded: &mut [u8]) {
    if let Some(last) = encoded.len().checked_sub(1) {
        encoded[last] = xor_fold(&encoded[..last]);
    }
}

/// Recomputes the checksum and compares it with the stored trailing byte
pub fn verify(encoded: &[u8]) -> bool {
    match encoded.split_last() {
        Some((stored, body)) => xor_fold(body) == *stored,
        None => false,
    }
}
