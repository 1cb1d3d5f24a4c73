//! Order-preserving encodings of indexed column values.
//!
//! # Encoding Format
//!
//! Every value starts with a type tag, so encoded index keys can be decoded
//! without the table schema:
//!
//! ```text
//! 0x00  NULL      (tag only; sorts before every non-null value)
//! 0x10  LONG      8 bytes, big-endian with the sign bit flipped
//! 0x11  ULONG     8 bytes, big-endian
//! 0x12  DOUBLE    8 bytes, IEEE 754 total-order transform
//! 0x20  BYTES     escaped bytes, then terminator 0x00 0x00
//! ```
//!
//! Byte strings escape each `0x00` as `0x00 0xFF`. The terminator `0x00 0x00`
//! is therefore smaller than any continuation, so a string sorts before
//! every longer string it is a prefix of.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use hexkv_common::error::{HexError, HexResult};

use super::var::KeyReader;
use crate::schema::ColumnType;

/// Type tags of encoded index values.
pub mod tag {
    /// NULL.
    pub const NULL: u8 = 0x00;
    /// Signed 64-bit integer.
    pub const LONG: u8 = 0x10;
    /// Unsigned 64-bit integer.
    pub const ULONG: u8 = 0x11;
    /// 64-bit float.
    pub const DOUBLE: u8 = 0x12;
    /// Byte string.
    pub const BYTES: u8 = 0x20;
}

const SIGN_BIT: u64 = 1 << 63;

/// One indexed column value, in the form it takes inside an index key.
#[derive(Clone)]
pub enum IndexValue {
    /// Column is null (absent from the row).
    Null,
    /// Signed integer.
    Long(i64),
    /// Unsigned integer.
    ULong(u64),
    /// Floating point, ordered by `f64::total_cmp`.
    Double(f64),
    /// Decimal, string, binary and temporal columns, compared bytewise.
    Bytes(Vec<u8>),
}

impl IndexValue {
    /// Converts a row's column bytes into an index value.
    ///
    /// `None` (column absent from the row) is `Null`. Numeric columns must
    /// hold exactly eight big-endian bytes.
    pub fn from_column(column_type: ColumnType, bytes: Option<&[u8]>) -> HexResult<Self> {
        let Some(bytes) = bytes else {
            return Ok(Self::Null);
        };

        match column_type {
            ColumnType::Long => Ok(Self::Long(i64::from_be_bytes(fixed8(column_type, bytes)?))),
            ColumnType::ULong => Ok(Self::ULong(u64::from_be_bytes(fixed8(column_type, bytes)?))),
            ColumnType::Double => Ok(Self::Double(f64::from_be_bytes(fixed8(
                column_type,
                bytes,
            )?))),
            ColumnType::Decimal
            | ColumnType::String
            | ColumnType::Binary
            | ColumnType::Date
            | ColumnType::Time
            | ColumnType::DateTime => Ok(Self::Bytes(bytes.to_vec())),
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the type tag.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Null => tag::NULL,
            Self::Long(_) => tag::LONG,
            Self::ULong(_) => tag::ULONG,
            Self::Double(_) => tag::DOUBLE,
            Self::Bytes(_) => tag::BYTES,
        }
    }

    /// Appends the order-preserving encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        match self {
            Self::Null => {}
            Self::Long(v) => buf.extend_from_slice(&((*v as u64) ^ SIGN_BIT).to_be_bytes()),
            Self::ULong(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Self::Double(v) => buf.extend_from_slice(&double_sort_bits(*v).to_be_bytes()),
            Self::Bytes(bytes) => write_escaped(bytes, buf),
        }
    }

    /// Returns the order-preserving encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes one value from the reader.
    pub fn decode_from(reader: &mut KeyReader<'_>) -> HexResult<Self> {
        match reader.read_u8()? {
            tag::NULL => Ok(Self::Null),
            tag::LONG => Ok(Self::Long((read_u64(reader)? ^ SIGN_BIT) as i64)),
            tag::ULONG => Ok(Self::ULong(read_u64(reader)?)),
            tag::DOUBLE => Ok(Self::Double(double_from_sort_bits(read_u64(reader)?))),
            tag::BYTES => Ok(Self::Bytes(read_escaped(reader)?)),
            other => Err(HexError::invalid_key(format!(
                "unknown index value tag 0x{other:02x}"
            ))),
        }
    }
}

/// Appends `bytes` with each `0x00` escaped, then the `0x00 0x00` terminator.
pub fn write_escaped(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        buf.push(b);
        if b == 0x00 {
            buf.push(0xFF);
        }
    }
    buf.extend_from_slice(&[0x00, 0x00]);
}

/// Consumes an escaped, terminated byte string.
pub fn read_escaped(reader: &mut KeyReader<'_>) -> HexResult<Vec<u8>> {
    let mut bytes = Vec::new();
    loop {
        match reader.read_u8()? {
            0x00 => match reader.read_u8()? {
                0x00 => return Ok(bytes),
                0xFF => bytes.push(0x00),
                other => {
                    return Err(HexError::invalid_key(format!(
                        "invalid escape byte 0x{other:02x} in byte string"
                    )))
                }
            },
            b => bytes.push(b),
        }
    }
}

fn fixed8(column_type: ColumnType, bytes: &[u8]) -> HexResult<[u8; 8]> {
    bytes.try_into().map_err(|_| {
        HexError::invalid_argument(format!(
            "{column_type:?} column must hold 8 bytes, got {}",
            bytes.len()
        ))
    })
}

fn read_u64(reader: &mut KeyReader<'_>) -> HexResult<u64> {
    let bytes: [u8; 8] = reader
        .read_exact(8)?
        .try_into()
        .map_err(|_| HexError::invalid_key("short fixed-width value"))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Maps a double onto a u64 whose unsigned order is `f64::total_cmp` order,
/// except that `-0.0` and `0.0` map to the same key.
fn double_sort_bits(value: f64) -> u64 {
    let bits = if value == 0.0 { 0 } else { value.to_bits() };
    if bits & SIGN_BIT == 0 {
        bits ^ SIGN_BIT
    } else {
        !bits
    }
}

fn double_from_sort_bits(sorted: u64) -> f64 {
    let bits = if sorted & SIGN_BIT == 0 {
        !sorted
    } else {
        sorted ^ SIGN_BIT
    };
    f64::from_bits(bits)
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::ULong(a), Self::ULong(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => double_sort_bits(*a).cmp(&double_sort_bits(*b)),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => self.tag().cmp(&other.tag()),
        }
    }
}

impl Hash for IndexValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encode().hash(state);
    }
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Long(v) => write!(f, "Long({v})"),
            Self::ULong(v) => write!(f, "ULong({v})"),
            Self::Double(v) => write!(f, "Double({v})"),
            Self::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "Bytes({s:?})"),
                Err(_) => write!(f, "Bytes({b:02x?})"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn round_trip(value: &IndexValue) -> IndexValue {
        let encoded = value.encode();
        let mut reader = KeyReader::new(&encoded);
        let decoded = IndexValue::decode_from(&mut reader).unwrap();
        assert!(reader.is_empty());
        decoded
    }

    fn assert_encoded_order(values: &[IndexValue]) {
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
            assert!(
                pair[0].encode() < pair[1].encode(),
                "encoding of {:?} < {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_long_order() {
        assert_encoded_order(&[
            IndexValue::Null,
            IndexValue::Long(i64::MIN),
            IndexValue::Long(-1),
            IndexValue::Long(0),
            IndexValue::Long(1),
            IndexValue::Long(i64::MAX),
        ]);
    }

    #[test]
    fn test_double_order() {
        assert_encoded_order(&[
            IndexValue::Double(f64::NEG_INFINITY),
            IndexValue::Double(-1.5),
            IndexValue::Double(-f64::MIN_POSITIVE),
            IndexValue::Double(0.0),
            IndexValue::Double(f64::MIN_POSITIVE),
            IndexValue::Double(2.5),
            IndexValue::Double(f64::INFINITY),
        ]);
        assert_eq!(round_trip(&IndexValue::Double(-3.25)), IndexValue::Double(-3.25));
    }

    #[test]
    fn test_negative_zero_is_zero() {
        let neg = IndexValue::Double(-0.0);
        let pos = IndexValue::Double(0.0);
        assert_eq!(neg, pos);
        assert_eq!(neg.encode(), pos.encode());
        assert_eq!(round_trip(&neg), pos);

        let from_row = IndexValue::from_column(ColumnType::Double, Some(&(-0.0f64).to_be_bytes()))
            .unwrap();
        assert_eq!(from_row.encode(), pos.encode());
    }

    #[test]
    fn test_bytes_order_with_embedded_nulls() {
        assert_encoded_order(&[
            IndexValue::Bytes(vec![]),
            IndexValue::Bytes(vec![0x00]),
            IndexValue::Bytes(vec![0x00, 0x00]),
            IndexValue::Bytes(vec![0x00, 0x01]),
            IndexValue::Bytes(b"a".to_vec()),
            IndexValue::Bytes(b"a\0".to_vec()),
            IndexValue::Bytes(b"ab".to_vec()),
            IndexValue::Bytes(vec![0xFF]),
        ]);
        let value = IndexValue::Bytes(vec![0x00, 0xFF, 0x00, 0x7F]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_random_longs_and_strings() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..2_000 {
            let a = IndexValue::Long(rng.gen());
            let b = IndexValue::Long(rng.gen());
            assert_eq!(a.cmp(&b), a.encode().cmp(&b.encode()));

            let len_a = rng.gen_range(0..6);
            let len_b = rng.gen_range(0..6);
            let a = IndexValue::Bytes((0..len_a).map(|_| rng.gen_range(0..3)).collect());
            let b = IndexValue::Bytes((0..len_b).map(|_| rng.gen_range(0..3)).collect());
            assert_eq!(a.cmp(&b), a.encode().cmp(&b.encode()), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_from_column() {
        assert_eq!(
            IndexValue::from_column(ColumnType::Long, Some(&(-7i64).to_be_bytes())).unwrap(),
            IndexValue::Long(-7)
        );
        assert_eq!(
            IndexValue::from_column(ColumnType::String, Some(b"abc")).unwrap(),
            IndexValue::Bytes(b"abc".to_vec())
        );
        assert!(IndexValue::from_column(ColumnType::ULong, None).unwrap().is_null());
        assert!(IndexValue::from_column(ColumnType::Double, Some(b"abc")).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut reader = KeyReader::new(&[0x30]);
        assert!(IndexValue::decode_from(&mut reader).is_err());

        let mut reader = KeyReader::new(&[tag::BYTES, b'a', 0x00, 0x05]);
        assert!(IndexValue::decode_from(&mut reader).is_err());

        let mut reader = KeyReader::new(&[tag::BYTES, b'a']);
        assert!(IndexValue::decode_from(&mut reader).is_err());
    }
}
