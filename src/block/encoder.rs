// Block codec encoder.
//
// Greedy single-pass matcher.  The scan keeps a pending literal run and
// probes the dictionary with the 4-byte window at each position; a candidate
// is accepted when its entry is live, lies fully before the current
// position, and its window bytes match.  Matches within 256 bytes of the
// literal-run start are emitted in the 1-byte short-offset form, the rest as
// 2-byte hash-indexed references.  When the only candidate sits inside the
// pending literal run, the run is flushed as a literal-only token first so
// the decoder's dictionary resolves the entry.
//
// The dictionary is updated for every input byte in emission order, which
// keeps it in lockstep with the decoder's per-byte updates, including
// across blocks that fall back to stored form.

use crate::block::decoder::MIN_SEQ_LEN;
use crate::block::dict::{window_key, MatchDict, RollingWindow};
use crate::block::varint;

/// Longest literal run a short-offset back-reference can reach across.
const SHORT_OFFSET_RANGE: usize = 256;

pub struct BlockEncoder {
    dict: MatchDict,
    window: RollingWindow,
}

impl BlockEncoder {
    pub fn new() -> Self {
        Self {
            dict: MatchDict::new(),
            window: RollingWindow::new(),
        }
    }

    /// Clear the dictionary and rolling window (independent-block boundary).
    pub fn reset(&mut self) {
        self.dict.reset();
        self.window.reset();
    }

    /// Compress one input block into `out` (cleared first).
    ///
    /// Returns `true` when the token stream beat the input; `false` means
    /// the caller must store the input verbatim.  The dictionary has still
    /// been rolled over every input byte so the stream stays decodable.
    pub fn compress_block(&mut self, input: &[u8], out: &mut Vec<u8>) -> bool {
        out.clear();
        let len = input.len();
        if len == 0 {
            return false;
        }
        out.reserve(len / 2);

        let mut anchor = 0usize; // start of the pending literal run
        let mut pos = 0usize;

        while pos + MIN_SEQ_LEN <= len {
            if out.len() >= len {
                // Not winning; finish the dictionary roll and store.
                self.roll_range(input, pos, len);
                return false;
            }

            let key = window_key(&input[pos..pos + 4]);
            let candidate = self.dict.get(key) as usize;

            let usable = candidate >= 3
                && candidate < pos
                && input[candidate - 3..candidate + 1] == input[pos..pos + 4];

            if !usable {
                self.roll_range(input, pos, pos + 1);
                pos += 1;
                continue;
            }

            if candidate >= anchor {
                // The decoder resolves the dictionary before this command's
                // literals; flush them so the entry becomes visible.
                emit_literal_run(&input[anchor..pos], out);
                anchor = pos;
            }

            let source = candidate - 3;
            let mut seq_len = MIN_SEQ_LEN;
            while pos + seq_len < len && input[source + seq_len] == input[pos + seq_len] {
                seq_len += 1;
            }

            emit_match(&input[anchor..pos], anchor, source, seq_len, key, out);
            self.roll_range(input, pos, pos + seq_len);
            pos += seq_len;
            anchor = pos;
        }

        self.roll_range(input, pos, len);
        emit_literal_run(&input[anchor..], out);

        out.len() < len
    }

    /// Roll the window and dictionary over `input[from..to]`.
    fn roll_range(&mut self, input: &[u8], from: usize, to: usize) {
        for (i, &byte) in input[from..to].iter().enumerate() {
            self.window.push(byte);
            self.dict.set(self.window.key(), (from + i) as u32);
        }
    }
}

impl Default for BlockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Token emission
// ---------------------------------------------------------------------------

/// Literal-only token: `0x80 | count` (capped at 127, extension beyond) with
/// the 0xFFFF sentinel where the dictionary key would sit.
fn emit_literal_run(literals: &[u8], out: &mut Vec<u8>) {
    if literals.is_empty() {
        return;
    }
    let count = literals.len();
    let first = count.min(127);
    out.push(0x80 | first as u8);
    out.extend_from_slice(&[0xFF, 0xFF]);
    if first == 127 {
        varint::encode(out, count - 127);
    }
    out.extend_from_slice(literals);
}

/// Combined token: pending literals plus one back-reference.  `anchor` is
/// the output index at command start (the decoder's `idx_out` when it
/// latches the source).
fn emit_match(
    literals: &[u8],
    anchor: usize,
    source: usize,
    seq_len: usize,
    key: u16,
    out: &mut Vec<u8>,
) {
    let lit_count = literals.len();
    let lit_first = lit_count.min(7);
    let seq_first = (seq_len - MIN_SEQ_LEN).min(15);
    let offset = anchor - 1 - source;

    if offset < SHORT_OFFSET_RANGE {
        out.push(((lit_first as u8) << 4) | seq_first as u8);
        out.push(offset as u8);
    } else {
        out.push(0x80 | ((lit_first as u8) << 4) | seq_first as u8);
        out.extend_from_slice(&key.to_le_bytes());
    }

    if lit_first == 7 {
        varint::encode(out, lit_count - 7);
    }
    if seq_first == 15 {
        varint::encode(out, seq_len - MIN_SEQ_LEN - 15);
    }
    out.extend_from_slice(literals);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::decoder::BlockDecoder;

    fn roundtrip_one(input: &[u8]) -> (usize, bool) {
        let mut enc = BlockEncoder::new();
        let mut dec = BlockDecoder::new();
        let mut payload = Vec::new();
        let compressed = enc.compress_block(input, &mut payload);

        let stream: &[u8] = if compressed { &payload } else { input };
        let mut out = vec![0u8; input.len().max(64)];
        let n = dec.decompress_block(stream, compressed, &mut out).unwrap();
        assert_eq!(&out[..n], input, "roundtrip mismatch");
        (if compressed { payload.len() } else { input.len() }, compressed)
    }

    fn xorshift_bytes(mut state: u64, n: usize) -> Vec<u8> {
        let mut v = Vec::with_capacity(n);
        while v.len() < n {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            v.extend_from_slice(&state.to_le_bytes());
        }
        v.truncate(n);
        v
    }

    #[test]
    fn short_periodic_input_compresses() {
        let (size, compressed) = roundtrip_one(b"ABCDABCDABCDABCD");
        assert!(compressed);
        assert!(size < 16);
    }

    #[test]
    fn long_run_collapses() {
        let input = vec![0x41u8; 64 * 1024];
        let (size, compressed) = roundtrip_one(&input);
        assert!(compressed);
        assert!(size < 64, "64 KiB run took {size} bytes");
    }

    #[test]
    fn text_with_repeats_compresses() {
        let input: Vec<u8> = b"the quick brown fox jumps over the lazy dog; "
            .iter()
            .copied()
            .cycle()
            .take(8 * 1024)
            .collect();
        let (size, compressed) = roundtrip_one(&input);
        assert!(compressed);
        assert!(size < input.len() / 4);
    }

    #[test]
    fn incompressible_input_falls_back_to_stored() {
        let input = xorshift_bytes(0x9E3779B97F4A7C15, 4096);
        let (_, compressed) = roundtrip_one(&input);
        assert!(!compressed);
    }

    #[test]
    fn tiny_inputs_are_stored() {
        for input in [&b""[..], b"a", b"abc", b"abcd"] {
            let mut enc = BlockEncoder::new();
            let mut payload = Vec::new();
            assert!(!enc.compress_block(input, &mut payload));
        }
    }

    #[test]
    fn dictionary_persists_across_blocks() {
        // Identical consecutive blocks: the second finds the first's windows
        // stale-but-matching in its own coordinates and still round-trips.
        let block: Vec<u8> = b"ABCDEFGH".iter().copied().cycle().take(512).collect();

        let mut enc = BlockEncoder::new();
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 1024];

        for _ in 0..3 {
            let mut payload = Vec::new();
            let compressed = enc.compress_block(&block, &mut payload);
            let stream: &[u8] = if compressed { &payload } else { &block };
            let n = dec.decompress_block(stream, compressed, &mut out).unwrap();
            assert_eq!(&out[..n], &block[..]);
        }
    }

    #[test]
    fn stored_block_keeps_stream_decodable() {
        // Block 1 is incompressible and stored; block 2 repeats block 1's
        // content and must still decode correctly behind it.
        let noise = xorshift_bytes(42, 1024);
        let mut doubled = noise.clone();
        doubled.extend_from_slice(&noise);

        let mut enc = BlockEncoder::new();
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 4096];

        let mut payload = Vec::new();
        let c1 = enc.compress_block(&noise, &mut payload);
        let s1: &[u8] = if c1 { &payload } else { &noise };
        let n = dec.decompress_block(s1, c1, &mut out).unwrap();
        assert_eq!(&out[..n], &noise[..]);

        let mut payload2 = Vec::new();
        let c2 = enc.compress_block(&doubled, &mut payload2);
        let s2: &[u8] = if c2 { &payload2 } else { &doubled };
        let n = dec.decompress_block(s2, c2, &mut out).unwrap();
        assert_eq!(&out[..n], &doubled[..]);
    }

    #[test]
    fn mixed_blocks_roundtrip() {
        let blocks: Vec<Vec<u8>> = vec![
            b"hello world hello world hello world".to_vec(),
            xorshift_bytes(7, 700),
            vec![0u8; 2000],
            b"hello world once more".to_vec(),
        ];

        let mut enc = BlockEncoder::new();
        let mut dec = BlockDecoder::new();
        let mut out = vec![0u8; 4096];

        for block in &blocks {
            let mut payload = Vec::new();
            let compressed = enc.compress_block(block, &mut payload);
            let stream: &[u8] = if compressed { &payload } else { block };
            let n = dec.decompress_block(stream, compressed, &mut out).unwrap();
            assert_eq!(&out[..n], &block[..]);
        }
    }
}
