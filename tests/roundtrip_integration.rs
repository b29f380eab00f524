// Round-trip laws and boundary behaviors across option combinations.

use blazer::{compress_memory, decompress_memory, DecompressOptions, StreamOptions};

fn decompress_options_for(options: &StreamOptions) -> DecompressOptions {
    DecompressOptions {
        password: options.password.clone(),
        encrypt_full: options.encrypt_full,
        headerless: if options.include_header {
            None
        } else {
            Some(options.to_flags().unwrap())
        },
    }
}

fn roundtrip(data: &[u8], options: &StreamOptions) -> Vec<u8> {
    let container = compress_memory(data, options).unwrap();
    let restored = decompress_memory(&container, &decompress_options_for(options)).unwrap();
    assert_eq!(restored, data, "roundtrip mismatch");
    container
}

fn xorshift_bytes(mut state: u64, n: usize) -> Vec<u8> {
    let mut v = Vec::with_capacity(n + 8);
    while v.len() < n {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        v.extend_from_slice(&state.to_le_bytes());
    }
    v.truncate(n);
    v
}

// ---------------------------------------------------------------------------
// Concrete scenarios
// ---------------------------------------------------------------------------

#[test]
fn minimal_profile_roundtrips_sixteen_bytes() {
    // Block mode, no header/CRC/footer, no password.
    let options = StreamOptions {
        include_crc: false,
        include_header: false,
        include_trailer: false,
        ..Default::default()
    };
    roundtrip(b"ABCDABCDABCDABCD", &options);
}

#[test]
fn repetitive_64k_compresses_below_1k() {
    let data = vec![0x41u8; 64 * 1024];
    let container = roundtrip(&data, &StreamOptions::default());
    assert!(
        container.len() < 1024,
        "64 KiB of 'A' took {} bytes",
        container.len()
    );
}

#[test]
fn empty_input_is_header_plus_trailer_only() {
    let container = roundtrip(b"", &StreamOptions::default());
    assert_eq!(container.len(), 8 + 4);
}

#[test]
fn random_megabyte_is_stored_with_bounded_overhead() {
    let data = xorshift_bytes(0x1234_5678_9ABC_DEF0, 1 << 20);
    let container = roundtrip(&data, &StreamOptions::default());
    // Incompressible data ends up in stored frames: at most one prefix (and
    // CRC) per block on top of the input, plus header and trailer.
    assert!(container.len() >= data.len());
    assert!(container.len() <= data.len() + 64);
}

// ---------------------------------------------------------------------------
// Boundary behaviors
// ---------------------------------------------------------------------------

#[test]
fn block_size_boundaries() {
    // Exponent 0 gives the smallest legal block: 512 bytes.
    let options = StreamOptions {
        block_size_exponent: 0,
        ..Default::default()
    };
    for len in [0, 1, 511, 512, 513, 1024, 1025, 4096] {
        let data = xorshift_bytes(len as u64 + 1, len);
        roundtrip(&data, &options);
    }
}

#[test]
fn megabyte_of_zeros_collapses() {
    let data = vec![0u8; 1 << 20];
    let container = roundtrip(&data, &StreamOptions::default());
    assert!(
        container.len() < 256,
        "1 MiB of zeros took {} bytes",
        container.len()
    );
}

#[test]
fn exponent_range_is_enforced() {
    let options = StreamOptions {
        block_size_exponent: 15,
        ..Default::default()
    };
    roundtrip(b"top of the range", &options);

    let options = StreamOptions {
        block_size_exponent: 16,
        ..Default::default()
    };
    assert!(compress_memory(b"x", &options).is_err());
}

#[test]
fn multi_block_text_roundtrips() {
    let data: Vec<u8> = b"pack my box with five dozen liquor jugs. "
        .iter()
        .copied()
        .cycle()
        .take(40_000)
        .collect();
    let options = StreamOptions {
        block_size_exponent: 0, // force ~80 blocks
        ..Default::default()
    };
    let container = roundtrip(&data, &options);
    assert!(container.len() < data.len());
}

#[test]
fn option_matrix_roundtrips() {
    let data: Vec<u8> = b"option matrix data ".repeat(700);
    for crc in [false, true] {
        for header in [false, true] {
            for trailer in [false, true] {
                let options = StreamOptions {
                    include_crc: crc,
                    include_header: header,
                    include_trailer: trailer,
                    block_size_exponent: 3,
                    ..Default::default()
                };
                roundtrip(&data, &options);
            }
        }
    }
}

#[test]
fn binary_structures_roundtrip() {
    // Interleaved compressible and incompressible regions.
    let mut data = Vec::new();
    for i in 0..64u64 {
        data.extend_from_slice(&[0u8; 100]);
        data.extend_from_slice(&xorshift_bytes(i + 1, 100));
        data.extend_from_slice(b"common header v1");
    }
    roundtrip(&data, &StreamOptions::default());
    roundtrip(
        &data,
        &StreamOptions {
            block_size_exponent: 1,
            ..Default::default()
        },
    );
}
