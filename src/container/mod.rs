// Container framing: the block-structured wire format.
//
// A container is an optional 8-byte header, an optional 24-byte encryption
// header, an optional single-file-info record, a sequence of framed blocks
// (4-byte prefix, optional CRC32C, payload), and an optional 4-byte trailer.
//
// # Modules
//
// - `flags`     — the 32-bit flag word and stream configuration
// - `frame`     — header/prefix/trailer byte layouts
// - `file_info` — the 0xFD record payload
// - `writer`    — `CompressionStream`
// - `reader`    — `DecompressionStream`

pub mod file_info;
pub mod flags;
pub mod frame;
pub mod reader;
pub mod writer;

pub use file_info::FileInfo;
pub use flags::{Algorithm, Flags, StreamOptions};
pub use reader::{DecompressOptions, DecompressionStream};
pub use writer::CompressionStream;
