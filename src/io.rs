// File-level helpers for compressing and decompressing whole files.
//
// Wraps the streaming types with buffered I/O and returns simple stats.
// Also owns the default output-name rules used by the CLI.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::container::flags::StreamOptions;
use crate::container::reader::{DecompressOptions, DecompressionStream};
use crate::container::writer::CompressionStream;
use crate::error::{Error, Result};

const BUF_SIZE: usize = 64 * 1024;

/// Suffix appended to compressed files.
pub const COMPRESSED_SUFFIX: &str = "blz";

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by [`compress_file`].
#[derive(Debug, Clone)]
pub struct CompressStats {
    pub input_size: u64,
    pub output_size: u64,
    pub blocks: u64,
}

/// Statistics returned by [`decompress_file`].
#[derive(Debug, Clone)]
pub struct DecompressStats {
    pub input_size: u64,
    pub output_size: u64,
    pub blocks: u64,
}

// ---------------------------------------------------------------------------
// Memory helpers
// ---------------------------------------------------------------------------

/// Compress a byte slice into a fresh container.
pub fn compress_memory(data: &[u8], options: &StreamOptions) -> Result<Vec<u8>> {
    let mut stream = CompressionStream::new(Vec::new(), options.clone())?;
    stream.write_all(data).map_err(Error::from_io)?;
    stream.finish()
}

/// Decompress a complete in-memory container.
pub fn decompress_memory(container: &[u8], options: &DecompressOptions) -> Result<Vec<u8>> {
    let mut stream = DecompressionStream::new(container, options.clone())?;
    let mut out = Vec::new();
    stream.read_to_end(&mut out).map_err(Error::from_io)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Compress `input_path` into `output_path`.
pub fn compress_file(
    input_path: &Path,
    output_path: &Path,
    options: &StreamOptions,
) -> Result<CompressStats> {
    let input = File::open(input_path)?;
    let input_size = input.metadata()?.len();
    let mut reader = BufReader::with_capacity(BUF_SIZE, input);

    let output = File::create(output_path)?;
    let writer = BufWriter::with_capacity(BUF_SIZE, output);
    let mut stream = CompressionStream::new(writer, options.clone())?;

    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).map_err(Error::from_io)?;
    }

    let blocks = stream.blocks_written();
    let writer = stream.finish()?;
    let output_size = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?
        .metadata()?
        .len();

    Ok(CompressStats {
        input_size,
        output_size,
        blocks,
    })
}

/// Decompress `input_path` into `output_path`.
pub fn decompress_file(
    input_path: &Path,
    output_path: &Path,
    options: &DecompressOptions,
) -> Result<DecompressStats> {
    let input = File::open(input_path)?;
    let input_size = input.metadata()?.len();
    let reader = BufReader::with_capacity(BUF_SIZE, input);
    let mut stream = DecompressionStream::with_seekable(reader, options.clone())?;

    let output = File::create(output_path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, output);

    let output_size = copy_stream(&mut stream, &mut writer)?;
    writer.flush()?;

    Ok(DecompressStats {
        input_size,
        output_size,
        blocks: stream.blocks_read(),
    })
}

/// `io::copy` with crate-error recovery on the read side.
pub(crate) fn copy_stream<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<u64> {
    let mut buf = vec![0u8; BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).map_err(Error::from_io)?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

/// `x` → `x.blz`.
pub fn default_compressed_name(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".");
    name.push(COMPRESSED_SUFFIX);
    PathBuf::from(name)
}

/// `x.blz` → `x`; anything else → `x.unpacked`.
pub fn default_decompressed_name(input: &Path) -> PathBuf {
    if input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(COMPRESSED_SUFFIX))
    {
        input.with_extension("")
    } else {
        let mut name = input.as_os_str().to_os_string();
        name.push(".unpacked");
        PathBuf::from(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
