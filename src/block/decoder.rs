// Block codec decoder.
//
// Interprets the token stream of one compressed block into a caller-supplied
// output buffer.  Each command starts with a tag byte:
//
//   bits 0-3  seq_first  back-reference length minus 4 (15 = extended)
//   bits 4-6  lit_first  literal count (7 = extended)
//   bit  7    mode       0 = short-offset back-ref, 1 = hash-indexed
//
// mode 0 is followed by one offset byte (`source = idx_out - offset - 1`,
// relative to the output index when the command starts).  mode 1 is followed
// by a 16-bit LE dictionary key; the sentinel key 0xFFFF reinterprets the
// tag as a literal-only run whose count is the tag's low 7 bits (127 routes
// through the extension integer).  Back-reference sources and the output
// index are latched before the command's literals are emitted.
//
// Dictionary and rolling window persist across blocks within a stream; the
// framing layer calls `reset()` only at stream boundaries.  Stored
// (uncompressed) payloads still roll the window and update the dictionary so
// both sides stay in lockstep across a raw-fallback block.

use crate::block::dict::{MatchDict, RollingWindow};
use crate::block::varint;
use crate::error::{Error, Result};

/// Dictionary key reserved for literal-only commands.
pub const LITERAL_ONLY_KEY: u16 = 0xFFFF;

/// Shortest encodable back-reference.
pub const MIN_SEQ_LEN: usize = 4;

pub struct BlockDecoder {
    dict: MatchDict,
    window: RollingWindow,
}

impl BlockDecoder {
    pub fn new() -> Self {
        Self {
            dict: MatchDict::new(),
            window: RollingWindow::new(),
        }
    }

    /// Clear the dictionary and rolling window.  Called between independent
    /// blocks; within a stream the state carries across block calls.
    pub fn reset(&mut self) {
        self.dict.reset();
        self.window.reset();
    }

    /// Decode one block payload into `out`, returning the number of bytes
    /// written.  `out` must be at least the stream's `MaxBlockSize`.
    ///
    /// With `is_compressed == false` the payload is copied verbatim (the
    /// dictionary still rolls over it).
    pub fn decompress_block(
        &mut self,
        input: &[u8],
        is_compressed: bool,
        out: &mut [u8],
    ) -> Result<usize> {
        if is_compressed {
            self.decode_commands(input, out)
        } else {
            self.copy_stored(input, out)
        }
    }

    fn copy_stored(&mut self, input: &[u8], out: &mut [u8]) -> Result<usize> {
        if input.len() > out.len() {
            return Err(Error::Config(format!(
                "output buffer too small: {} < {}",
                out.len(),
                input.len()
            )));
        }
        for (idx_out, &byte) in input.iter().enumerate() {
            self.window.push(byte);
            self.dict.set(self.window.key(), idx_out as u32);
            out[idx_out] = byte;
        }
        Ok(input.len())
    }

    fn decode_commands(&mut self, input: &[u8], out: &mut [u8]) -> Result<usize> {
        let mut idx_in = 0usize;
        let mut idx_out = 0usize;

        while idx_in < input.len() {
            let tag = input[idx_in];
            idx_in += 1;

            let seq_first = (tag & 0x0F) as usize;
            let lit_first = ((tag >> 4) & 0x07) as usize;

            let mut lit_count = lit_first;
            let mut seq_len;
            // usize::MAX marks a literal-only command (no back-reference).
            let mut source = usize::MAX;
            let mut literal_only = false;

            if tag & 0x80 != 0 {
                let key_bytes = input
                    .get(idx_in..idx_in + 2)
                    .ok_or_else(|| truncated("hash key"))?;
                let key = u16::from_le_bytes([key_bytes[0], key_bytes[1]]);
                idx_in += 2;

                if key == LITERAL_ONLY_KEY {
                    literal_only = true;
                    lit_count = (tag & 0x7F) as usize;
                    seq_len = 0;
                } else {
                    seq_len = seq_first + MIN_SEQ_LEN;
                    let entry = self.dict.get(key) as usize;
                    if entry < 3 {
                        return Err(Error::Corrupt(format!(
                            "impossible back-reference: dictionary key {key:#06X} resolves before the stream start"
                        )));
                    }
                    source = entry - 3;
                }
            } else {
                let offset = *input.get(idx_in).ok_or_else(|| truncated("offset"))? as usize;
                idx_in += 1;
                seq_len = seq_first + MIN_SEQ_LEN;
                if idx_out < offset + 1 {
                    return Err(Error::Corrupt(format!(
                        "impossible back-reference: offset {offset} at output index {idx_out}"
                    )));
                }
                source = idx_out - offset - 1;
            }

            if literal_only {
                if lit_count == 127 {
                    let (extra, used) = varint::decode(&input[idx_in..])
                        .map_err(|e| Error::Corrupt(e.to_string()))?;
                    lit_count += extra;
                    idx_in += used;
                }
            } else {
                if lit_first == 7 {
                    let (extra, used) = varint::decode(&input[idx_in..])
                        .map_err(|e| Error::Corrupt(e.to_string()))?;
                    lit_count += extra;
                    idx_in += used;
                }
                if seq_first == 15 {
                    let (extra, used) = varint::decode(&input[idx_in..])
                        .map_err(|e| Error::Corrupt(e.to_string()))?;
                    seq_len += extra;
                    idx_in += used;
                }
            }

            if idx_out + lit_count + seq_len > out.len() {
                return Err(Error::Corrupt(format!(
                    "block output overflow: {} + {} + {} exceeds {}",
                    idx_out,
                    lit_count,
                    seq_len,
                    out.len()
                )));
            }
            if idx_in + lit_count > input.len() {
                return Err(truncated("literals"));
            }
            if seq_len > 0 && source + seq_len > out.len() {
                return Err(Error::Corrupt(
                    "back-reference runs past the block buffer".into(),
                ));
            }

            for _ in 0..lit_count {
                let byte = input[idx_in];
                idx_in += 1;
                self.window.push(byte);
                self.dict.set(self.window.key(), idx_out as u32);
                out[idx_out] = byte;
                idx_out += 1;
            }

            // Byte-wise so overlapping copies repeat, the classic LZ run.
            for i in 0..seq_len {
                let byte = out[source + i];
                self.window.push(byte);
                self.dict.set(self.window.key(), idx_out as u32);
                out[idx_out] = byte;
                idx_out += 1;
            }
        }

        Ok(idx_out)
    }
}

impl Default for BlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn truncated(what: &str) -> Error {
    Error::Corrupt(format!("truncated command: input ended inside {what}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(payload: &[u8]) -> Vec<u8> {
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 4096];
        let n = dec.decompress_block(payload, true, &mut out).unwrap();
        out.truncate(n);
        out
    }

    #[test]
    fn literal_only_command() {
        // tag 0x80|3, sentinel key, three literals.
        let payload = [0x83, 0xFF, 0xFF, b'a', b'b', b'c'];
        assert_eq!(decode(&payload), b"abc");
    }

    #[test]
    fn literal_only_with_extension() {
        // 127 in the tag routes through the extension integer (here +3).
        let mut payload = vec![0xFF, 0xFF, 0xFF, 3];
        payload.extend(std::iter::repeat(b'x').take(130));
        assert_eq!(decode(&payload), vec![b'x'; 130]);
    }

    #[test]
    fn short_offset_back_reference() {
        // "ABCD" literals, then copy 4 from offset 3 (source index 0).
        let payload = [0x84, 0xFF, 0xFF, b'A', b'B', b'C', b'D', 0x00, 0x03];
        assert_eq!(decode(&payload), b"ABCDABCD");
    }

    #[test]
    fn overlapping_copy_repeats_bytes() {
        // One literal then an offset-0 copy of 6: run-length expansion.
        let payload = [0x81, 0xFF, 0xFF, b'z', 0x02, 0x00];
        assert_eq!(decode(&payload), b"zzzzzzz");
    }

    #[test]
    fn hash_indexed_back_reference() {
        // Literals "ABCDx" seed the dictionary entry for "ABCD" at position 3;
        // the hash command copies from its stored position minus 3.
        let key = crate::block::dict::window_key(b"ABCD");
        let mut payload = vec![0x85, 0xFF, 0xFF, b'A', b'B', b'C', b'D', b'x'];
        payload.push(0x80); // mode 1, seq_len 4, no literals
        payload.extend_from_slice(&key.to_le_bytes());
        assert_eq!(decode(&payload), b"ABCDxABCD");
    }

    #[test]
    fn stored_payload_is_verbatim_and_rolls_dictionary() {
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 64];

        let n = dec.decompress_block(b"ABCDEFGH", false, &mut out).unwrap();
        assert_eq!(&out[..n], b"ABCDEFGH");

        // A following compressed block may hash-reference the stored bytes.
        let key = crate::block::dict::window_key(b"ABCD");
        let mut payload = vec![0x80];
        payload.extend_from_slice(&key.to_le_bytes());
        let n = dec.decompress_block(&payload, true, &mut out).unwrap();
        assert_eq!(&out[..n], b"ABCD");
    }

    #[test]
    fn empty_dictionary_entry_is_rejected() {
        let mut payload = vec![0x80];
        payload.extend_from_slice(&0x1234u16.to_le_bytes());
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 64];
        let err = dec.decompress_block(&payload, true, &mut out).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn negative_short_offset_is_rejected() {
        // Copy before any output exists.
        let payload = [0x00, 0x00];
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 64];
        let err = dec.decompress_block(&payload, true, &mut out).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn truncated_command_is_rejected() {
        for payload in [&[0x83u8, 0xFF][..], &[0x00][..], &[0x83, 0xFF, 0xFF, b'a'][..]] {
            let mut dec = BlockDecoder::new();
            let mut out = vec![0u8; 64];
            let err = dec.decompress_block(payload, true, &mut out).unwrap_err();
            assert!(matches!(err, Error::Corrupt(_)), "payload {payload:02X?}");
        }
    }

    #[test]
    fn output_overflow_is_rejected() {
        let mut payload = vec![0xFF, 0xFF, 0xFF, 200];
        payload.extend(std::iter::repeat(b'x').take(327));
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 100]; // too small for 327 literals
        let err = dec.decompress_block(&payload, true, &mut out).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }
}
