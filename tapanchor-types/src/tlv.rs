//! Deterministic TLV encoding used for asset leaves.
//!
//! Records are written as `bigsize(type) || bigsize(len) || value`, in
//! ascending type order.

use alloc::vec::Vec;

/// Collects TLV records into a byte buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    out: Vec<u8>,
    last_type: Option<u64>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Types must be written in strictly ascending order.
    pub fn record(&mut self, tlv_type: u64, value: &[u8]) -> &mut Self {
        debug_assert!(self.last_type.is_none_or(|last| last < tlv_type));
        self.last_type = Some(tlv_type);
        encode_bigsize(tlv_type, &mut self.out);
        encode_inline_var_bytes(value, &mut self.out);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Encodes a BigSize varint into the provided buffer.
pub fn encode_bigsize(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_be_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_be_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Encodes length-prefixed bytes into the provided buffer.
pub fn encode_inline_var_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    encode_bigsize(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigsize_boundaries() {
        let cases: [(u64, &[u8]); 6] = [
            (0, &[0x00]),
            (0xFC, &[0xFC]),
            (0xFD, &[0xFD, 0x00, 0xFD]),
            (0xFFFF, &[0xFD, 0xFF, 0xFF]),
            (0x1_0000, &[0xFE, 0x00, 0x01, 0x00, 0x00]),
            (0x1_0000_0000, &[0xFF, 0, 0, 0, 1, 0, 0, 0, 0]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_bigsize(value, &mut out);
            assert_eq!(out.as_slice(), expected);
        }
    }

    #[test]
    fn records_are_type_length_value() {
        let mut encoder = Encoder::new();
        encoder.record(0, &[1]).record(6, &[2, 3]);
        assert_eq!(encoder.finish(), [0, 1, 1, 6, 2, 2, 3]);
    }
}
