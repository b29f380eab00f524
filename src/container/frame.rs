// On-wire framing: container header, per-block prefix, control kinds,
// trailer.
//
// Header (8 bytes, optional): magic `b L z`, version 0x01, flags u32 LE.
// Frame prefix (4 bytes): tag, then 24-bit LE length storing
// `payload_len - 1` (a payload is always at least one byte; the bias lets
// the field reach the full 16 MiB MaxBlockSize).  With CRC enabled, 4 more
// prefix bytes carry the CRC32C of the payload as written.  Encrypted
// payloads occupy `adjust(payload_len)` bytes on the wire.

use crate::container::flags::Flags;
use crate::error::{Error, Result};

pub const MAGIC: [u8; 3] = *b"bLz";
pub const FORMAT_VERSION: u8 = 0x01;
pub const HEADER_LEN: usize = 8;

/// Trailer sentinel: a frame whose tag is 0xFF and whose "length" bytes
/// spell the reversed magic.
pub const TRAILER: [u8; 4] = [0xFF, b'Z', b'l', b'B'];

// Frame kinds.  0x01..=0x0F carry compressed payloads by algorithm id.
pub const KIND_STORED: u8 = 0x00;
pub const KIND_FLUSH: u8 = 0xF0;
pub const KIND_CONTROL: u8 = 0xF1;
pub const KIND_FILE_INFO: u8 = 0xFD;
pub const KIND_TRAILER: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

pub fn encode_header(flags: Flags) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..3].copy_from_slice(&MAGIC);
    out[3] = FORMAT_VERSION;
    out[4..8].copy_from_slice(&flags.raw().to_le_bytes());
    out
}

pub fn decode_header(bytes: &[u8; HEADER_LEN]) -> Result<Flags> {
    if bytes[..3] != MAGIC {
        return Err(Error::Corrupt(format!(
            "bad magic: expected {:02X} {:02X} {:02X}, got {:02X} {:02X} {:02X}",
            MAGIC[0], MAGIC[1], MAGIC[2], bytes[0], bytes[1], bytes[2]
        )));
    }
    if bytes[3] != FORMAT_VERSION {
        return Err(Error::Version { found: bytes[3] });
    }
    Flags::from_raw(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]))
}

// ---------------------------------------------------------------------------
// Frame prefix
// ---------------------------------------------------------------------------

pub fn encode_prefix(tag: u8, payload_len: usize) -> [u8; 4] {
    debug_assert!(payload_len >= 1 && payload_len <= 1 << 24);
    let biased = (payload_len - 1) as u32;
    let len = biased.to_le_bytes();
    [tag, len[0], len[1], len[2]]
}

/// Split a prefix into `(tag, payload_len)`.  Meaningless for the payloadless
/// kinds (`0xF0`, `0xFF`) whose length bytes carry no length.
pub fn decode_prefix(bytes: [u8; 4]) -> (u8, usize) {
    let biased = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], 0]);
    (bytes[0], biased as usize + 1)
}

// ---------------------------------------------------------------------------
// Encrypted payload sizing
// ---------------------------------------------------------------------------

/// Wire length of an encrypted payload: `payload_len` plus the 8-byte
/// counter, rounded up to a 16-byte AES boundary.
pub fn adjust_encrypted_len(payload_len: usize) -> usize {
    ((payload_len - 1 + 8) | 15) + 1
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
