// Decompression stream: parses the container, pull-driven.
//
// Construction validates the header (magic, exact version byte, known flag
// bits), runs the password handshake when the stream is encrypted, and
// reads the mandatory file-info record when flagged.  Each `read()` refills
// from the next frame: prefix, optional CRC over the wire bytes, payload,
// decrypt + counter check, block decode.  The `0xFF` trailer frame
// terminates the stream; clean EOF terminates a trailerless one.

use std::io::{self, Read, Seek, SeekFrom};

use crate::block::decoder::BlockDecoder;
use crate::container::file_info::FileInfo;
use crate::container::flags::Flags;
use crate::container::frame::{
    self, adjust_encrypted_len, KIND_CONTROL, KIND_FILE_INFO, KIND_FLUSH, KIND_STORED,
    KIND_TRAILER,
};
use crate::crc32c::crc32c;
use crate::crypto::{DecryptHelper, EncryptFullReader, ENCRYPTION_HEADER_LEN};
use crate::error::{Error, Result};

enum Source<R: Read> {
    Plain(R),
    Full(EncryptFullReader<R>),
}

impl<R: Read> Source<R> {
    fn as_read(&mut self) -> &mut dyn Read {
        match self {
            Self::Plain(r) => r,
            Self::Full(r) => r,
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for opening a container.
#[derive(Debug, Clone, Default)]
pub struct DecompressOptions {
    pub password: Option<String>,
    /// The container is wrapped by the outer stream cipher.  The wrap hides
    /// the header, so the caller has to declare it; the header's flag bit is
    /// verified after unwrapping.
    pub encrypt_full: bool,
    /// Flags for a headerless container (e.g. the `--blobonly` profile).
    /// `None` reads and validates the 8-byte header.
    pub headerless: Option<Flags>,
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

type ControlHandler = Box<dyn FnMut(&[u8])>;

/// Pull-mode container reader implementing [`io::Read`].
pub struct DecompressionStream<R: Read> {
    source: Source<R>,
    flags: Flags,
    max_block: usize,
    decoder: BlockDecoder,
    decrypt: DecryptHelper,
    file_info: Option<FileInfo>,
    control: Option<ControlHandler>,
    /// Decoded bytes of the current block.
    out: Vec<u8>,
    out_pos: usize,
    out_len: usize,
    /// Wire payload staging.
    wire_buf: Vec<u8>,
    /// Decrypted payload staging.
    plain_buf: Vec<u8>,
    done: bool,
    bytes_out: u64,
    blocks_read: u64,
}

impl<R: Read> DecompressionStream<R> {
    pub fn new(inner: R, options: DecompressOptions) -> Result<Self> {
        let mut source = if options.encrypt_full {
            let password = options
                .password
                .as_deref()
                .ok_or(Error::PasswordRequired)?;
            Source::Full(EncryptFullReader::new(inner, password)?)
        } else {
            Source::Plain(inner)
        };

        let flags = match options.headerless {
            Some(flags) => flags,
            None => {
                let mut header = [0u8; frame::HEADER_LEN];
                source
                    .as_read()
                    .read_exact(&mut header)
                    .map_err(|_| Error::Corrupt("truncated container header".into()))?;
                frame::decode_header(&header)?
            }
        };
        if flags.encrypt_full() != options.encrypt_full {
            return Err(Error::Corrupt(
                "full-encryption flag does not match how the stream was opened".into(),
            ));
        }

        let decrypt = if flags.encrypt_inner() {
            let password = options
                .password
                .as_deref()
                .ok_or(Error::PasswordRequired)?;
            let mut enc_header = [0u8; ENCRYPTION_HEADER_LEN];
            source
                .as_read()
                .read_exact(&mut enc_header)
                .map_err(|_| Error::Corrupt("truncated encryption header".into()))?;
            DecryptHelper::init(password, &enc_header)?
        } else {
            if options.password.is_some() && !options.encrypt_full {
                return Err(Error::UnexpectedPassword);
            }
            DecryptHelper::None
        };

        let max_block = flags.max_block_size();
        log::debug!(
            "decompression stream: flags {:#06X}, block size {}",
            flags.raw(),
            max_block
        );

        let mut stream = Self {
            source,
            flags,
            max_block,
            decoder: BlockDecoder::new(),
            decrypt,
            file_info: None,
            control: None,
            out: Vec::new(),
            out_pos: 0,
            out_len: 0,
            wire_buf: Vec::new(),
            plain_buf: Vec::new(),
            done: false,
            bytes_out: 0,
            blocks_read: 0,
        };

        if flags.has_file_info() {
            stream.read_file_info()?;
        }
        Ok(stream)
    }

    /// The container's flag word.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// The file-info record, when the container carries one.
    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    /// Receives `0xF1` control payloads and empty `0xF0` flush callbacks.
    pub fn set_control_handler(&mut self, handler: impl FnMut(&[u8]) + 'static) {
        self.control = Some(Box::new(handler));
    }

    /// Total decoded bytes handed out so far.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Payload blocks decoded so far.
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Give back the inner source, e.g. to keep reading past the container.
    pub fn into_inner(self) -> R {
        match self.source {
            Source::Plain(r) => r,
            Source::Full(f) => f.into_inner(),
        }
    }

    // -- frame machinery ---------------------------------------------------

    /// Read a 4-byte prefix; `None` on clean EOF at a frame boundary.
    fn read_prefix(&mut self) -> Result<Option<[u8; 4]>> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            let n = self.source.as_read().read(&mut prefix[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(Error::Corrupt("truncated frame prefix".into()));
            }
            filled += n;
        }
        Ok(Some(prefix))
    }

    /// Read one frame's CRC and wire payload, verify, decrypt; leaves the
    /// plaintext in `plain_buf`.
    fn read_payload(&mut self, payload_len: usize) -> Result<()> {
        if payload_len > self.max_block {
            return Err(Error::Corrupt(format!(
                "payload of {payload_len} bytes exceeds the {} byte block size",
                self.max_block
            )));
        }

        let mut crc_expected = None;
        if self.flags.has_crc() {
            let mut crc = [0u8; 4];
            self.source
                .as_read()
                .read_exact(&mut crc)
                .map_err(|_| Error::Corrupt("truncated frame checksum".into()))?;
            crc_expected = Some(u32::from_le_bytes(crc));
        }

        let wire_len = match &self.decrypt {
            DecryptHelper::None => payload_len,
            DecryptHelper::Aes { .. } => adjust_encrypted_len(payload_len),
        };
        self.wire_buf.resize(wire_len, 0);
        self.source
            .as_read()
            .read_exact(&mut self.wire_buf)
            .map_err(|_| Error::Corrupt("truncated frame payload".into()))?;

        if let Some(expected) = crc_expected {
            let actual = crc32c(&self.wire_buf);
            if actual != expected {
                return Err(Error::ChecksumMismatch { expected, actual });
            }
        }

        self.decrypt
            .decrypt_payload(&self.wire_buf, payload_len, &mut self.plain_buf)
    }

    fn read_file_info(&mut self) -> Result<()> {
        let prefix = self
            .read_prefix()?
            .ok_or_else(|| Error::Corrupt("missing file-info record".into()))?;
        let (tag, payload_len) = frame::decode_prefix(prefix);
        if tag != KIND_FILE_INFO {
            return Err(Error::Corrupt(format!(
                "expected file-info record, found frame tag {tag:#04X}"
            )));
        }
        self.read_payload(payload_len)?;
        self.file_info = Some(FileInfo::from_bytes(&self.plain_buf)?);
        Ok(())
    }

    /// Decode frames until a payload block lands in `out` or the stream
    /// terminates.
    fn advance(&mut self) -> Result<()> {
        loop {
            let Some(prefix) = self.read_prefix()? else {
                if self.flags.has_trailer() {
                    return Err(Error::Corrupt("missing trailer".into()));
                }
                self.finish_stream();
                return Ok(());
            };

            let tag = prefix[0];
            match tag {
                KIND_TRAILER => {
                    if prefix != frame::TRAILER {
                        return Err(Error::Corrupt("bad trailer".into()));
                    }
                    if !self.flags.has_trailer() {
                        return Err(Error::Corrupt("unexpected trailer frame".into()));
                    }
                    self.finish_stream();
                    return Ok(());
                }
                KIND_FLUSH => {
                    if let Some(handler) = self.control.as_mut() {
                        handler(&[]);
                    }
                }
                KIND_CONTROL => {
                    let (_, payload_len) = frame::decode_prefix(prefix);
                    self.read_payload(payload_len)?;
                    if let Some(handler) = self.control.as_mut() {
                        handler(&self.plain_buf);
                    }
                }
                KIND_FILE_INFO => {
                    return Err(Error::Corrupt(
                        "file-info record after the first frame".into(),
                    ));
                }
                KIND_STORED => {
                    let (_, payload_len) = frame::decode_prefix(prefix);
                    self.decode_block(payload_len, false)?;
                    return Ok(());
                }
                t if t == self.flags.algorithm_id() => {
                    let (_, payload_len) = frame::decode_prefix(prefix);
                    self.decode_block(payload_len, true)?;
                    return Ok(());
                }
                t => {
                    return Err(Error::Corrupt(format!("unknown frame tag {t:#04X}")));
                }
            }
        }
    }

    fn decode_block(&mut self, payload_len: usize, compressed: bool) -> Result<()> {
        self.read_payload(payload_len)?;
        self.out.clear();
        self.out.resize(self.max_block, 0);
        let n = self
            .decoder
            .decompress_block(&self.plain_buf, compressed, &mut self.out)?;
        self.out_len = n;
        self.out_pos = 0;
        self.blocks_read += 1;
        Ok(())
    }

    fn finish_stream(&mut self) {
        self.done = true;
        // Stream end is the one boundary where the codec state resets.
        self.decoder.reset();
    }
}

impl<R: Read + Seek> DecompressionStream<R> {
    /// Open a seekable container, validating the trailer from the end of the
    /// stream before any block is decoded.  Wrapped (encrypt-full) sources
    /// cannot seek beneath the cipher; they fall back to EOF validation.
    pub fn with_seekable(inner: R, options: DecompressOptions) -> Result<Self> {
        let check_upfront = !options.encrypt_full;
        let mut stream = Self::new(inner, options)?;
        if check_upfront && stream.flags.has_trailer() {
            if let Source::Plain(r) = &mut stream.source {
                let resume = r.stream_position()?;
                r.seek(SeekFrom::End(-4))?;
                let mut tail = [0u8; 4];
                r.read_exact(&mut tail)
                    .map_err(|_| Error::Corrupt("missing trailer".into()))?;
                if tail != frame::TRAILER {
                    return Err(Error::Corrupt("bad trailer".into()));
                }
                r.seek(SeekFrom::Start(resume))?;
            }
        }
        Ok(stream)
    }
}

impl<R: Read> Read for DecompressionStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.out_pos == self.out_len {
            if self.done {
                return Ok(0);
            }
            self.advance().map_err(io::Error::from)?;
        }
        let n = buf.len().min(self.out_len - self.out_pos);
        buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        self.bytes_out += n as u64;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::flags::StreamOptions;
    use crate::container::writer::CompressionStream;
    use std::io::Write;

    fn compress(data: &[u8], options: StreamOptions) -> Vec<u8> {
        let mut stream = CompressionStream::new(Vec::new(), options).unwrap();
        stream.write_all(data).unwrap();
        stream.finish().unwrap()
    }

    fn decompress(container: &[u8], options: DecompressOptions) -> Result<Vec<u8>> {
        let mut stream = DecompressionStream::new(container, options)?;
        let mut out = Vec::new();
        stream.read_to_end(&mut out).map_err(Error::from_io)?;
        Ok(out)
    }

    #[test]
    fn roundtrip_with_default_options() {
        let data = b"roundtrip me roundtrip me roundtrip me";
        let container = compress(data, StreamOptions::default());
        let out = decompress(&container, DecompressOptions::default()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn headerless_roundtrip_requires_matching_flags() {
        let options = StreamOptions::blob_only();
        let flags = options.to_flags().unwrap();
        let container = compress(b"blob payload blob payload", options);
        let out = decompress(
            &container,
            DecompressOptions {
                headerless: Some(flags),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(out, b"blob payload blob payload");
    }

    #[test]
    fn password_on_plain_stream_is_rejected() {
        let container = compress(b"plain", StreamOptions::default());
        let err = decompress(
            &container,
            DecompressOptions {
                password: Some("pw".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnexpectedPassword));
    }

    #[test]
    fn missing_password_on_encrypted_stream_is_rejected() {
        let container = compress(
            b"secret",
            StreamOptions {
                password: Some("pw".into()),
                ..Default::default()
            },
        );
        let err = decompress(&container, DecompressOptions::default()).unwrap_err();
        assert!(matches!(err, Error::PasswordRequired));
    }

    #[test]
    fn seekable_constructor_validates_trailer() {
        let container = compress(b"seek me", StreamOptions::default());
        let mut good = DecompressionStream::with_seekable(
            std::io::Cursor::new(container.clone()),
            DecompressOptions::default(),
        )
        .unwrap();
        let mut out = Vec::new();
        good.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"seek me");

        let mut clipped = container;
        clipped.truncate(clipped.len() - 1);
        let err = DecompressionStream::with_seekable(
            std::io::Cursor::new(clipped),
            DecompressOptions::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn missing_trailer_at_eof_is_corrupt() {
        let mut container = compress(b"data data data", StreamOptions::default());
        container.truncate(container.len() - 4);
        let err = decompress(&container, DecompressOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn flush_markers_reach_the_control_handler() {
        let mut writer = CompressionStream::new(
            Vec::new(),
            StreamOptions {
                respect_flush: true,
                ..Default::default()
            },
        )
        .unwrap();
        writer.write_all(b"first").unwrap();
        writer.flush().unwrap();
        writer.write_all(b"second").unwrap();
        let container = writer.finish().unwrap();

        let mut reader =
            DecompressionStream::new(&container[..], DecompressOptions::default()).unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::<Vec<u8>>::new()));
        let sink = seen.clone();
        reader.set_control_handler(move |data| sink.borrow_mut().push(data.to_vec()));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"firstsecond");
        assert_eq!(seen.borrow().as_slice(), &[Vec::<u8>::new()]);
    }

    #[test]
    fn control_frames_reach_the_handler_not_the_output() {
        let mut writer =
            CompressionStream::new(Vec::new(), StreamOptions::default()).unwrap();
        writer.write_all(b"payload").unwrap();
        writer.write_control_data(b"out of band").unwrap();
        let container = writer.finish().unwrap();

        let mut reader =
            DecompressionStream::new(&container[..], DecompressOptions::default()).unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::<Vec<u8>>::new()));
        let sink = seen.clone();
        reader.set_control_handler(move |data| sink.borrow_mut().push(data.to_vec()));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(seen.borrow().as_slice(), &[b"out of band".to_vec()]);
    }

    #[test]
    fn file_info_record_is_exposed() {
        let info = FileInfo {
            file_name: "data.bin".into(),
            length: 4,
            modified_unix: 1_600_000_000,
        };
        let container = compress(
            b"data",
            StreamOptions {
                file_info: Some(info.clone()),
                ..Default::default()
            },
        );
        let mut reader =
            DecompressionStream::new(&container[..], DecompressOptions::default()).unwrap();
        assert_eq!(reader.file_info(), Some(&info));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"data");
    }
}
