//! Order-preserving variable-length unsigned integers.
//!
//! # Encoding Format
//!
//! ```text
//! [len: 1 byte][magnitude: len bytes, big-endian, no leading zero byte]
//! ```
//!
//! Zero encodes as the single byte `0x00`. A shorter magnitude always means
//! a smaller value, so comparing the header first and then the big-endian
//! bytes orders encodings exactly like the integers:
//!
//! ```text
//! 0     -> 00
//! 1     -> 01 01
//! 255   -> 01 ff
//! 256   -> 02 01 00
//! u64::MAX -> 08 ff ff ff ff ff ff ff ff
//! ```
//!
//! Every encoding is self-delimiting, which is what lets
//! [`append_with_prefix`] concatenate key fields without separators.

use hexkv_common::constants::{MAX_ULONG_ENCODED_LEN, ROW_ID_SIZE};
use hexkv_common::error::{HexError, HexResult};
use hexkv_common::types::RowId;

/// Encodes `value` as a length-prefixed minimal big-endian integer.
pub fn encode_ulong(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_ULONG_ENCODED_LEN);
    write_ulong(value, &mut buf);
    buf
}

/// Appends the encoding of `value` to `buf`.
pub fn write_ulong(value: u64, buf: &mut Vec<u8>) {
    let len = 8 - (value.leading_zeros() / 8) as usize;
    buf.push(len as u8);
    buf.extend_from_slice(&value.to_be_bytes()[8 - len..]);
}

/// Decodes an integer that occupies all of `bytes`.
pub fn decode_ulong(bytes: &[u8]) -> HexResult<u64> {
    let mut reader = KeyReader::new(bytes);
    let value = reader.read_ulong()?;
    reader.finish()?;
    Ok(value)
}

/// Concatenates a discriminator byte and self-delimiting parts.
pub fn append_with_prefix(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut buf = Vec::with_capacity(len);
    buf.push(prefix);
    for part in parts {
        buf.extend_from_slice(part);
    }
    buf
}

/// Sequential reader over an encoded key.
#[derive(Debug, Clone)]
pub struct KeyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    /// Creates a reader positioned at the first byte.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        let bytes = self.bytes;
        &bytes[self.pos..]
    }

    /// Returns true once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Returns the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consumes one byte.
    pub fn read_u8(&mut self) -> HexResult<u8> {
        let byte = self.peek().ok_or_else(|| self.truncated(1))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Consumes exactly `n` bytes.
    pub fn read_exact(&mut self, n: usize) -> HexResult<&'a [u8]> {
        if self.bytes.len() - self.pos < n {
            return Err(self.truncated(n));
        }
        let bytes = self.bytes;
        let slice = &bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consumes a varint-encoded unsigned integer.
    ///
    /// Non-canonical encodings (header above 8, or a leading zero byte in
    /// the magnitude) are rejected so that every value has one encoding.
    pub fn read_ulong(&mut self) -> HexResult<u64> {
        let len = self.read_u8()? as usize;
        if len > 8 {
            return Err(HexError::invalid_key(format!(
                "integer length header {len} exceeds 8 bytes"
            )));
        }
        let magnitude = self.read_exact(len)?;
        if magnitude.first() == Some(&0) {
            return Err(HexError::invalid_key("integer has a leading zero byte"));
        }

        let mut be = [0u8; 8];
        be[8 - len..].copy_from_slice(magnitude);
        Ok(u64::from_be_bytes(be))
    }

    /// Consumes a 16-byte row identity.
    pub fn read_row_id(&mut self) -> HexResult<RowId> {
        RowId::from_slice(self.read_exact(ROW_ID_SIZE)?)
    }

    /// Fails if any bytes are left over.
    pub fn finish(&self) -> HexResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(HexError::invalid_key(format!(
                "{} trailing bytes after key",
                self.bytes.len() - self.pos
            )))
        }
    }

    fn truncated(&self, wanted: usize) -> HexError {
        HexError::invalid_key(format!(
            "key truncated at offset {}: wanted {wanted} more bytes",
            self.pos
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const BOUNDARIES: [u64; 9] = [
        0,
        1,
        255,
        256,
        65_535,
        65_536,
        (1 << 63) - 1,
        1 << 63,
        u64::MAX,
    ];

    #[test]
    fn test_encode_ulong_layout() {
        assert_eq!(encode_ulong(0), vec![0x00]);
        assert_eq!(encode_ulong(1), vec![0x01, 0x01]);
        assert_eq!(encode_ulong(255), vec![0x01, 0xFF]);
        assert_eq!(encode_ulong(256), vec![0x02, 0x01, 0x00]);
        assert_eq!(
            encode_ulong(u64::MAX),
            vec![0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(encode_ulong(u64::MAX).len(), MAX_ULONG_ENCODED_LEN);
    }

    #[test]
    fn test_boundaries_round_trip_and_order() {
        for pair in BOUNDARIES.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(encode_ulong(a) < encode_ulong(b), "{a} vs {b}");
        }
        for value in BOUNDARIES {
            assert_eq!(decode_ulong(&encode_ulong(value)).unwrap(), value);
        }
    }

    #[test]
    fn test_random_order_preservation() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10_000 {
            // Mix full-range values with small ones so all lengths are hit.
            let shift_a = rng.gen_range(0..64);
            let shift_b = rng.gen_range(0..64);
            let a: u64 = rng.gen::<u64>() >> shift_a;
            let b: u64 = rng.gen::<u64>() >> shift_b;
            assert_eq!(
                a.cmp(&b),
                encode_ulong(a).cmp(&encode_ulong(b)),
                "{a} vs {b}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_ulong(&[]).is_err());
        assert!(decode_ulong(&[0x09, 0, 0, 0, 0, 0, 0, 0, 0, 1]).is_err());
        assert!(decode_ulong(&[0x02, 0x01]).is_err());
        assert!(decode_ulong(&[0x02, 0x00, 0x01]).is_err());
        assert!(decode_ulong(&[0x01, 0x05, 0xAA]).is_err());
    }

    #[test]
    fn test_append_with_prefix() {
        let table = encode_ulong(7);
        let id = [0xAB; 16];
        let key = append_with_prefix(0x06, &[&table, &id]);
        assert_eq!(key.len(), 1 + 2 + 16);
        assert_eq!(key[0], 0x06);
        assert_eq!(&key[1..3], &[0x01, 0x07]);

        let mut reader = KeyReader::new(&key[1..]);
        assert_eq!(reader.read_ulong().unwrap(), 7);
        assert_eq!(reader.read_row_id().unwrap().to_bytes(), id);
        assert!(reader.finish().is_ok());
    }
}
