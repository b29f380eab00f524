// Token-extension integers for the block token stream.
//
// One byte `b` when the value is below 253; otherwise a marker byte selects
// the width of the remainder, each width biased by everything the previous
// widths could express:
//
//   b < 253          value = b
//   b == 253         value = 253 + next u8
//   b == 254         value = 253 + 256 + next u16 (LE)
//   b == 255         value = 253 + 65536 + next u32 (LE)

/// Values below this encode as a single byte.
const INLINE_LIMIT: u64 = 253;
/// Smallest value of the `253` form.
const U8_BIAS: u64 = 253;
/// Smallest value of the `254` form.
const U16_BIAS: u64 = 253 + 256;
/// Smallest value of the `255` form.
const U32_BIAS: u64 = 253 + 65_536;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Append the extension encoding of `value` to `out`.
pub fn encode(out: &mut Vec<u8>, value: usize) {
    let v = value as u64;
    if v < INLINE_LIMIT {
        out.push(v as u8);
    } else if v < U16_BIAS {
        out.push(253);
        out.push((v - U8_BIAS) as u8);
    } else if v < U16_BIAS + 65_536 {
        out.push(254);
        out.extend_from_slice(&((v - U16_BIAS) as u16).to_le_bytes());
    } else {
        out.push(255);
        out.extend_from_slice(&((v - U32_BIAS) as u32).to_le_bytes());
    }
}

/// Encoded byte-length of `value`.
pub fn encoded_len(value: usize) -> usize {
    let v = value as u64;
    if v < INLINE_LIMIT {
        1
    } else if v < U16_BIAS {
        2
    } else if v < U16_BIAS + 65_536 {
        3
    } else {
        5
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionError {
    /// Not enough input bytes to complete the integer.
    Truncated,
    /// Value does not fit the platform `usize`.
    Overflow,
}

impl std::fmt::Display for ExtensionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated extension integer"),
            Self::Overflow => write!(f, "extension integer overflow"),
        }
    }
}

impl std::error::Error for ExtensionError {}

/// Decode one extension integer from the front of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn decode(data: &[u8]) -> Result<(usize, usize), ExtensionError> {
    let first = *data.first().ok_or(ExtensionError::Truncated)?;
    let (value, consumed) = match first {
        b if b < 253 => (u64::from(b), 1),
        253 => {
            let b = *data.get(1).ok_or(ExtensionError::Truncated)?;
            (U8_BIAS + u64::from(b), 2)
        }
        254 => {
            let rest = data.get(1..3).ok_or(ExtensionError::Truncated)?;
            let v = u16::from_le_bytes([rest[0], rest[1]]);
            (U16_BIAS + u64::from(v), 3)
        }
        _ => {
            let rest = data.get(1..5).ok_or(ExtensionError::Truncated)?;
            let v = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            (U32_BIAS + u64::from(v), 5)
        }
    };
    let value = usize::try_from(value).map_err(|_| ExtensionError::Overflow)?;
    Ok((value, consumed))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
