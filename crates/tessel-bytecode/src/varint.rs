//! Variable-length integer codec
//!
//! Values are split into little-endian 7-bit groups. Each of the first eight
//! bytes carries seven payload bits plus a continuation flag in bit 7. When a
//! ninth byte is needed it carries the remaining eight bits verbatim and has no
//! continuation flag, so any 64-bit value fits in [`MAX_VARINT_LEN`] bytes.
//!
//! Signed values use the same groups and stop at the first group whose bit 6,
//! sign-extended, reproduces the remaining value (minimal signed LEB).

use crate::error::{BytecodeError, Result};

/// Hard cap on the encoded length of any 64-bit value
pub const MAX_VARINT_LEN: usize = 9;

/// Number of bytes carrying seven payload bits each
const GROUP_BYTES: usize = MAX_VARINT_LEN - 1;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7F;
const SIGN: u8 = 0x40;

/// Append `value` to `out`, returning the number of bytes written
pub fn encode_u64(value: u64, out: &mut Vec<u8>) -> usize {
    let mut rest = value;
    for written in 0..GROUP_BYTES {
        let group = (rest as u8) & PAYLOAD;
        rest >>= 7;
        if rest == 0 {
            out.push(group);
            return written + 1;
        }
        out.push(group | CONTINUATION);
    }
    // Eight groups consumed 56 bits; the last byte holds the top eight.
    out.push(rest as u8);
    MAX_VARINT_LEN
}

/// Append `value` to `out` using the signed encoding, returning the byte count
pub fn encode_i64(value: i64, out: &mut Vec<u8>) -> usize {
    let mut rest = value;
    for written in 0..GROUP_BYTES {
        let group = (rest as u8) & PAYLOAD;
        rest >>= 7;
        let sign_set = group & SIGN != 0;
        if (rest == 0 && !sign_set) || (rest == -1 && sign_set) {
            out.push(group);
            return written + 1;
        }
        out.push(group | CONTINUATION);
    }
    out.push(rest as u8);
    MAX_VARINT_LEN
}

/// Decode an unsigned value from the front of `bytes`
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for index in 0..MAX_VARINT_LEN {
        let byte = *bytes
            .get(index)
            .ok_or(BytecodeError::EndOfData { offset: index })?;
        if index == GROUP_BYTES {
            value |= (byte as u64) << (7 * GROUP_BYTES);
            return Ok((value, MAX_VARINT_LEN));
        }
        value |= ((byte & PAYLOAD) as u64) << (7 * index);
        if byte & CONTINUATION == 0 {
            return Ok((value, index + 1));
        }
    }
    unreachable!("the ninth byte always terminates decoding")
}

/// Decode a signed value from the front of `bytes`
pub fn decode_i64(bytes: &[u8]) -> Result<(i64, usize)> {
    let mut value = 0u64;
    for index in 0..MAX_VARINT_LEN {
        let byte = *bytes
            .get(index)
            .ok_or(BytecodeError::EndOfData { offset: index })?;
        if index == GROUP_BYTES {
            value |= (byte as u64) << (7 * GROUP_BYTES);
            return Ok((value as i64, MAX_VARINT_LEN));
        }
        value |= ((byte & PAYLOAD) as u64) << (7 * index);
        if byte & CONTINUATION == 0 {
            let shift = 7 * (index + 1);
            if byte & SIGN != 0 {
                value |= u64::MAX << shift;
            }
            return Ok((value as i64, index + 1));
        }
    }
    unreachable!("the ninth byte always terminates decoding")
}

/// Encoded length of an unsigned value, without encoding it
pub fn encoded_len_u64(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).clamp(1, MAX_VARINT_LEN)
}

/// Encoded length of a signed value, without encoding it
pub fn encoded_len_i64(value: i64) -> usize {
    // Significant bits including one sign bit.
    let magnitude = if value < 0 { !value } else { value };
    let bits = 64 - magnitude.leading_zeros() as usize + 1;
    bits.div_ceil(7).clamp(1, MAX_VARINT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode_unsigned(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        let written = encode_u64(value, &mut out);
        assert_eq!(written, out.len());
        out
    }

    fn encode_signed(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        let written = encode_i64(value, &mut out);
        assert_eq!(written, out.len());
        out
    }

    #[test]
    fn test_unsigned_boundaries() {
        let cases: [(u64, usize); 9] = [
            (0, 1),
            (0x7F, 1),
            (0x80, 2),
            (0x3FFF, 2),
            (0x4000, 3),
            ((1 << 49) - 1, 7),
            ((1 << 56) - 1, 8),
            (1 << 56, 9),
            (u64::MAX, 9),
        ];
        for (value, len) in cases {
            let bytes = encode_unsigned(value);
            assert_eq!(bytes.len(), len, "length of {:#x}", value);
            assert_eq!(decode_u64(&bytes), Ok((value, len)));
            assert_eq!(encoded_len_u64(value), len);
        }
    }

    #[test]
    fn test_unsigned_layout() {
        assert_eq!(encode_unsigned(0x80), vec![0x80, 0x01]);
        assert_eq!(encode_unsigned(300), vec![0xAC, 0x02]);
        // Ninth byte carries eight raw bits with no continuation flag.
        assert_eq!(
            encode_unsigned(u64::MAX),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_signed_boundaries() {
        let cases: [(i64, usize); 12] = [
            (0, 1),
            (-1, 1),
            (63, 1),
            (-64, 1),
            (64, 2),
            (-65, 2),
            (8191, 2),
            (-8192, 2),
            (8192, 3),
            ((1 << 55) - 1, 8),
            (i64::MAX, 9),
            (i64::MIN, 9),
        ];
        for (value, len) in cases {
            let bytes = encode_signed(value);
            assert_eq!(bytes.len(), len, "length of {}", value);
            assert_eq!(decode_i64(&bytes), Ok((value, len)));
            assert_eq!(encoded_len_i64(value), len);
        }
    }

    #[test]
    fn test_signed_disambiguation_group() {
        // 64 has bit 6 set in its only group, so a zero group follows.
        assert_eq!(encode_signed(64), vec![0xC0, 0x00]);
        // -65 would read back as positive without the all-ones group.
        assert_eq!(encode_signed(-65), vec![0xBF, 0x7F]);
        assert_eq!(encode_signed(-1), vec![0x7F]);
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let bytes = [0x05, 0xFF, 0xFF];
        assert_eq!(decode_u64(&bytes), Ok((5, 1)));
    }

    #[test]
    fn test_end_of_data() {
        assert_eq!(decode_u64(&[]), Err(BytecodeError::EndOfData { offset: 0 }));
        assert_eq!(
            decode_u64(&[0x80, 0x80]),
            Err(BytecodeError::EndOfData { offset: 2 })
        );
        assert_eq!(
            decode_i64(&[0xFF]),
            Err(BytecodeError::EndOfData { offset: 1 })
        );
    }

    proptest! {
        #[test]
        fn prop_unsigned_round_trip(value in any::<u64>()) {
            let bytes = encode_unsigned(value);
            prop_assert_eq!(decode_u64(&bytes), Ok((value, bytes.len())));
            prop_assert_eq!(bytes.len(), encoded_len_u64(value));
        }

        #[test]
        fn prop_signed_round_trip(value in any::<i64>()) {
            let bytes = encode_signed(value);
            prop_assert_eq!(decode_i64(&bytes), Ok((value, bytes.len())));
            prop_assert_eq!(bytes.len(), encoded_len_i64(value));
        }

        #[test]
        fn prop_signed_is_minimal(value in any::<i64>()) {
            // Dropping the last group must not still describe the same value.
            let bytes = encode_signed(value);
            if bytes.len() > 1 && bytes.len() < MAX_VARINT_LEN {
                let mut shorter = bytes[..bytes.len() - 1].to_vec();
                let last = shorter.len() - 1;
                shorter[last] &= PAYLOAD;
                prop_assert_ne!(decode_i64(&shorter).map(|(v, _)| v), Ok(value));
            }
        }
    }
}
