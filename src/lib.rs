//! Blazer: single-stream block compression with optional authenticated
//! encryption and integrity checking.
//!
//! The crate provides:
//! - The Block codec (`block`): an LZ-style compressor whose hash dictionary
//!   persists across blocks in a stream
//! - The container framing layer (`container`): header, framed blocks,
//!   optional per-block CRC32C, optional trailer
//! - Password-derived AES encryption (`crypto`): per-block payloads with an
//!   anti-replay counter, or a whole-container wrap
//! - File helpers (`io`) and an optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use blazer::{compress_memory, decompress_memory, DecompressOptions, StreamOptions};
//!
//! let data = b"hello blazer hello blazer hello blazer";
//! let container = compress_memory(data, &StreamOptions::default()).unwrap();
//! let restored = decompress_memory(&container, &DecompressOptions::default()).unwrap();
//! assert_eq!(restored.as_slice(), &data[..]);
//! ```

pub mod block;
pub mod container;
pub mod crc32c;
pub mod crypto;
pub mod error;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export the everyday surface.
pub use container::file_info::FileInfo;
pub use container::flags::{Algorithm, Flags, StreamOptions};
pub use container::reader::{DecompressOptions, DecompressionStream};
pub use container::writer::CompressionStream;
pub use error::{Error, Result};
pub use io::{compress_memory, decompress_memory};
