// Container flags and stream configuration.
//
// The 32-bit flag word is fixed at construction and (when the header is
// present) written little-endian at header offset 4:
//
//   bits 0-3   block-size exponent e, MaxBlockSize = 1 << (e + 9)
//   bits 4-7   algorithm id (Block = 1)
//   bit  8     per-block CRC32C
//   bit  9     container header
//   bit  10    trailer
//   bit  11    honor caller-initiated flush boundaries
//   bit  12    encrypted block payloads ("encrypt-inner")
//   bit  13    whole container wrapped by a stream cipher ("encrypt-full")
//   bit  14    single-file-info record precedes payload blocks
//
// Every other bit is reserved; a set reserved bit aborts decompression.

use crate::container::file_info::FileInfo;
use crate::error::{Error, Result};

pub const FLAG_CRC: u32 = 1 << 8;
pub const FLAG_HEADER: u32 = 1 << 9;
pub const FLAG_TRAILER: u32 = 1 << 10;
pub const FLAG_RESPECT_FLUSH: u32 = 1 << 11;
pub const FLAG_ENCRYPT_INNER: u32 = 1 << 12;
pub const FLAG_ENCRYPT_FULL: u32 = 1 << 13;
pub const FLAG_SINGLE_FILE_INFO: u32 = 1 << 14;

/// Mask of all bits this build understands.
pub const FLAG_KNOWN_MASK: u32 = 0x7FFF;

/// Largest valid block-size exponent (16 MiB blocks).
pub const MAX_BLOCK_EXPONENT: u8 = 15;

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Payload compression algorithm.  Ids 2..=15 are reserved for the stream
/// codecs this build does not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Block,
}

impl Algorithm {
    pub fn id(self) -> u8 {
        match self {
            Self::Block => 1,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Self::Block),
            _ => Err(Error::Config(format!(
                "unsupported algorithm id {id} (this build reads Block = 1)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Validated 32-bit container flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u32);

impl Flags {
    /// Validate a raw flag word read from a container.
    pub fn from_raw(raw: u32) -> Result<Self> {
        if raw & !FLAG_KNOWN_MASK != 0 {
            return Err(Error::Corrupt(format!(
                "unknown flag bits {:#010X}",
                raw & !FLAG_KNOWN_MASK
            )));
        }
        if raw & FLAG_ENCRYPT_INNER != 0 && raw & FLAG_ENCRYPT_FULL != 0 {
            return Err(Error::Config(
                "encrypt-inner and encrypt-full may not combine".into(),
            ));
        }
        let flags = Self(raw);
        Algorithm::from_id(flags.algorithm_id())?;
        Ok(flags)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn block_size_exponent(self) -> u8 {
        (self.0 & 0x0F) as u8
    }

    pub fn max_block_size(self) -> usize {
        1usize << (self.block_size_exponent() + 9)
    }

    pub fn algorithm_id(self) -> u8 {
        ((self.0 >> 4) & 0x0F) as u8
    }

    pub fn has_crc(self) -> bool {
        self.0 & FLAG_CRC != 0
    }

    pub fn has_header(self) -> bool {
        self.0 & FLAG_HEADER != 0
    }

    pub fn has_trailer(self) -> bool {
        self.0 & FLAG_TRAILER != 0
    }

    pub fn respects_flush(self) -> bool {
        self.0 & FLAG_RESPECT_FLUSH != 0
    }

    pub fn encrypt_inner(self) -> bool {
        self.0 & FLAG_ENCRYPT_INNER != 0
    }

    pub fn encrypt_full(self) -> bool {
        self.0 & FLAG_ENCRYPT_FULL != 0
    }

    pub fn has_file_info(self) -> bool {
        self.0 & FLAG_SINGLE_FILE_INFO != 0
    }
}

// ---------------------------------------------------------------------------
// Stream options
// ---------------------------------------------------------------------------

/// Configuration for a compression stream, fixed at construction.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Block-size exponent e; `MaxBlockSize = 1 << (e + 9)`, e in [0, 15].
    pub block_size_exponent: u8,
    pub include_crc: bool,
    pub include_header: bool,
    pub include_trailer: bool,
    /// Honor caller-initiated flush boundaries (bit 11).
    pub respect_flush: bool,
    /// Wrap the whole container in the outer stream cipher instead of
    /// encrypting block payloads.
    pub encrypt_full: bool,
    /// Enables encryption; the inner layer unless `encrypt_full` is set.
    pub password: Option<String>,
    /// Single-file-info record written right after the header.
    pub file_info: Option<FileInfo>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            block_size_exponent: 12, // 2 MiB blocks
            include_crc: true,
            include_header: true,
            include_trailer: true,
            respect_flush: false,
            encrypt_full: false,
            password: None,
            file_info: None,
        }
    }
}

impl StreamOptions {
    /// The `--blobonly` profile: bare frames, no header/trailer/CRC,
    /// 16 MiB blocks.
    pub fn blob_only() -> Self {
        Self {
            block_size_exponent: MAX_BLOCK_EXPONENT,
            include_crc: false,
            include_header: false,
            include_trailer: false,
            ..Self::default()
        }
    }

    pub fn max_block_size(&self) -> usize {
        1usize << (self.block_size_exponent + 9)
    }

    /// Build the flag word, validating the configuration.
    pub fn to_flags(&self) -> Result<Flags> {
        if self.block_size_exponent > MAX_BLOCK_EXPONENT {
            return Err(Error::Config(format!(
                "block size exponent {} out of range 0..=15",
                self.block_size_exponent
            )));
        }
        if self.encrypt_full && self.password.is_none() {
            return Err(Error::Config("encrypt-full requires a password".into()));
        }
        let mut raw = u32::from(self.block_size_exponent);
        raw |= u32::from(Algorithm::Block.id()) << 4;
        if self.include_crc {
            raw |= FLAG_CRC;
        }
        if self.include_header {
            raw |= FLAG_HEADER;
        }
        if self.include_trailer {
            raw |= FLAG_TRAILER;
        }
        if self.respect_flush {
            raw |= FLAG_RESPECT_FLUSH;
        }
        if self.encrypt_full {
            raw |= FLAG_ENCRYPT_FULL;
        } else if self.password.is_some() {
            raw |= FLAG_ENCRYPT_INNER;
        }
        if self.file_info.is_some() {
            raw |= FLAG_SINGLE_FILE_INFO;
        }
        Ok(Flags(raw))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_pack_expected_bits() {
        let flags = StreamOptions::default().to_flags().unwrap();
        assert_eq!(flags.block_size_exponent(), 12);
        assert_eq!(flags.max_block_size(), 2 * 1024 * 1024);
        assert_eq!(flags.algorithm_id(), 1);
        assert!(flags.has_crc());
        assert!(flags.has_header());
        assert!(flags.has_trailer());
        assert!(!flags.respects_flush());
        assert!(!flags.encrypt_inner());
        assert!(!flags.encrypt_full());
        // Low byte packs exponent | algorithm << 4.
        assert_eq!(flags.raw() & 0xFF, 12 | (1 << 4));
    }

    #[test]
    fn blob_only_profile() {
        let flags = StreamOptions::blob_only().to_flags().unwrap();
        assert_eq!(flags.max_block_size(), 16 * 1024 * 1024);
        assert!(!flags.has_crc());
        assert!(!flags.has_header());
        assert!(!flags.has_trailer());
    }

    #[test]
    fn password_selects_inner_unless_full() {
        let inner = StreamOptions {
            password: Some("pw".into()),
            ..Default::default()
        }
        .to_flags()
        .unwrap();
        assert!(inner.encrypt_inner());
        assert!(!inner.encrypt_full());

        let full = StreamOptions {
            password: Some("pw".into()),
            encrypt_full: true,
            ..Default::default()
        }
        .to_flags()
        .unwrap();
        assert!(!full.encrypt_inner());
        assert!(full.encrypt_full());
    }

    #[test]
    fn reserved_bits_are_rejected() {
        let raw = StreamOptions::default().to_flags().unwrap().raw();
        let err = Flags::from_raw(raw | 1 << 15).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        let err = Flags::from_raw(raw | 1 << 31).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn combined_encryption_bits_are_a_usage_error() {
        let raw = 12 | (1 << 4) | FLAG_ENCRYPT_INNER | FLAG_ENCRYPT_FULL;
        assert!(matches!(Flags::from_raw(raw), Err(Error::Config(_))));
    }

    #[test]
    fn reserved_algorithm_ids_are_a_usage_error() {
        let raw = 12 | (3 << 4);
        assert!(matches!(Flags::from_raw(raw), Err(Error::Config(_))));
    }

    #[test]
    fn exponent_out_of_range_is_config_error() {
        let opts = StreamOptions {
            block_size_exponent: 16,
            ..Default::default()
        };
        assert!(matches!(opts.to_flags(), Err(Error::Config(_))));
    }
}
