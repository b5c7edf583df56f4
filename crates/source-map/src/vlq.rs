//! Base64 VLQ codec used by the `mappings` field.

use thiserror::Error;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const CONTINUATION: u8 = 0b10_0000;
const DIGIT_MASK: u8 = 0b01_1111;

/// VLQ decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VlqError {
    /// A character outside the base64 alphabet.
    #[error("invalid base64 digit {0:?}")]
    InvalidDigit(char),
    /// The input ended while a continuation bit was set.
    #[error("unexpected end of VLQ value")]
    Truncated,
    /// The value does not fit in 32 bits.
    #[error("VLQ value overflows 32 bits")]
    Overflow,
}

fn digit_value(byte: u8) -> Option<u8> {
    match byte {
        b'A'..=b'Z' => Some(byte - b'A'),
        b'a'..=b'z' => Some(byte - b'a' + 26),
        b'0'..=b'9' => Some(byte - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Appends the VLQ encoding of `value` to `out`.
pub fn encode_into(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = (vlq & u64::from(DIGIT_MASK)) as u8;
        vlq >>= 5;
        if vlq > 0 {
            digit |= CONTINUATION;
        }
        out.push(BASE64[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Encodes a single value.
pub fn encode(value: i64) -> String {
    let mut out = String::new();
    encode_into(value, &mut out);
    out
}

/// Decodes one value from the start of `input`, returning it with the number
/// of bytes consumed.
pub fn decode(input: &str) -> Result<(i64, usize), VlqError> {
    let mut accumulated: u64 = 0;
    let mut shift = 0u32;

    for (consumed, byte) in input.bytes().enumerate() {
        let digit = digit_value(byte).ok_or_else(|| {
            VlqError::InvalidDigit(input[consumed..].chars().next().unwrap_or('?'))
        })?;

        if shift > 30 {
            return Err(VlqError::Overflow);
        }
        accumulated |= u64::from(digit & DIGIT_MASK) << shift;
        shift += 5;

        if digit & CONTINUATION == 0 {
            let negative = accumulated & 1 == 1;
            let magnitude = (accumulated >> 1) as i64;
            if magnitude > i64::from(i32::MAX) + i64::from(negative) {
                return Err(VlqError::Overflow);
            }
            let value = if negative { -magnitude } else { magnitude };
            return Ok((value, consumed + 1));
        }
    }

    Err(VlqError::Truncated)
}

/// Decodes every value of one comma-free segment.
pub fn decode_segment(mut input: &str) -> Result<Vec<i64>, VlqError> {
    let mut fields = Vec::with_capacity(5);
    while !input.is_empty() {
        let (value, consumed) = decode(input)?;
        fields.push(value);
        input = &input[consumed..];
    }
    Ok(fields)
}
