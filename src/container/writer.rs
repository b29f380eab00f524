// Compression stream: assembles the container.
//
// Input bytes buffer up to MaxBlockSize; each full block goes through the
// block encoder and out as one frame.  The header (and encryption header and
// file-info record) is deferred until the first frame so a zero-block stream
// still gets its prologue at finish().  The frame buffer reserves the prefix
// at its head and backfills tag, length, and CRC once the payload bytes are
// in place.

use std::io::{self, Write};

use crate::block::encoder::BlockEncoder;
use crate::container::flags::{Flags, StreamOptions};
use crate::container::frame::{self, KIND_CONTROL, KIND_FLUSH, KIND_STORED};
use crate::crc32c::crc32c;
use crate::crypto::{EncryptFullWriter, EncryptHelper};
use crate::error::{Error, Result};

enum Sink<W: Write> {
    Plain(W),
    Full(EncryptFullWriter<W>),
}

impl<W: Write> Sink<W> {
    fn as_write(&mut self) -> &mut dyn Write {
        match self {
            Self::Plain(w) => w,
            Self::Full(w) => w,
        }
    }
}

/// Streaming container writer.
///
/// Implements [`io::Write`]; call [`finish`](Self::finish) to flush the last
/// partial block, emit the trailer, and recover the inner writer.  Dropping
/// the stream without finishing loses the buffered partial block, matching
/// an aborted stream.
pub struct CompressionStream<W: Write> {
    sink: Option<Sink<W>>,
    flags: Flags,
    max_block: usize,
    encoder: BlockEncoder,
    encrypt: EncryptHelper,
    file_info_payload: Option<Vec<u8>>,
    /// Raw input waiting to fill a block.
    pending: Vec<u8>,
    /// Reusable compressed-payload scratch.
    block_buf: Vec<u8>,
    /// Reusable frame assembly buffer (prefix + wire payload).
    frame: Vec<u8>,
    prologue_written: bool,
    bytes_in: u64,
    blocks_written: u64,
}

impl<W: Write> CompressionStream<W> {
    pub fn new(inner: W, options: StreamOptions) -> Result<Self> {
        let flags = options.to_flags()?;
        let max_block = flags.max_block_size();

        let sink = if options.encrypt_full {
            let password = options
                .password
                .as_deref()
                .ok_or_else(|| Error::Config("encrypt-full requires a password".into()))?;
            Sink::Full(EncryptFullWriter::new(inner, password)?)
        } else {
            Sink::Plain(inner)
        };

        let encrypt = if flags.encrypt_inner() {
            EncryptHelper::new(options.password.as_deref())?
        } else {
            EncryptHelper::None
        };

        let file_info_payload = options.file_info.as_ref().map(|info| info.to_bytes());
        if let Some(payload) = &file_info_payload {
            if payload.len() > max_block {
                return Err(Error::Config("file-info record exceeds the block size".into()));
            }
        }

        log::debug!(
            "compression stream: flags {:#06X}, block size {}",
            flags.raw(),
            max_block
        );

        Ok(Self {
            sink: Some(sink),
            flags,
            max_block,
            encoder: BlockEncoder::new(),
            encrypt,
            file_info_payload,
            pending: Vec::with_capacity(max_block.min(1 << 20)),
            block_buf: Vec::new(),
            frame: Vec::new(),
            prologue_written: false,
            bytes_in: 0,
            blocks_written: 0,
        })
    }

    /// The flag word fixed at construction.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Total input bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Frames written so far (payload frames only).
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Emit an out-of-band control frame (`0xF1`), delivered to the reading
    /// side's control handler instead of the decoded stream.
    pub fn write_control_data(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::Config("control payload must not be empty".into()));
        }
        if data.len() > self.max_block {
            return Err(Error::Config("control payload exceeds the block size".into()));
        }
        self.emit_frame(KIND_CONTROL, data)
    }

    /// Flush buffered input as a (possibly short) block followed by a flush
    /// marker.  No-op for the marker when bit 11 is clear.
    pub fn flush_block_boundary(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.flush_block(&pending)?;
        }
        self.pending = pending;
        self.pending.clear();

        self.ensure_prologue()?;
        let sink = self.sink_mut()?;
        sink.as_write().write_all(&[KIND_FLUSH, 0, 0, 0])?;
        Ok(())
    }

    /// Flush the final partial block, write the trailer, and return the
    /// inner writer.
    pub fn finish(mut self) -> Result<W> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.flush_block(&pending)?;
        }
        self.ensure_prologue()?;

        let mut sink = self
            .sink
            .take()
            .ok_or_else(|| Error::Config("stream already finished".into()))?;
        if self.flags.has_trailer() {
            sink.as_write().write_all(&frame::TRAILER)?;
        }
        sink.as_write().flush()?;
        match sink {
            Sink::Plain(w) => Ok(w),
            Sink::Full(w) => w.finish(),
        }
    }

    // -- internals ---------------------------------------------------------

    fn sink_mut(&mut self) -> Result<&mut Sink<W>> {
        self.sink
            .as_mut()
            .ok_or_else(|| Error::Config("stream already finished".into()))
    }

    fn consume(&mut self, mut data: &[u8]) -> Result<()> {
        self.bytes_in += data.len() as u64;

        // Top up a partially filled block first.
        if !self.pending.is_empty() {
            let need = self.max_block - self.pending.len();
            let take = need.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.max_block {
                let block = std::mem::take(&mut self.pending);
                self.flush_block(&block)?;
                self.pending = block;
                self.pending.clear();
            }
        }

        // Full blocks straight from the caller's buffer.
        while data.len() >= self.max_block {
            let (block, rest) = data.split_at(self.max_block);
            self.flush_block(block)?;
            data = rest;
        }

        if !data.is_empty() {
            self.pending.extend_from_slice(data);
        }
        Ok(())
    }

    fn flush_block(&mut self, block: &[u8]) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.block_buf);
        let compressed = self.encoder.compress_block(block, &mut scratch);
        let result = if compressed {
            self.emit_frame(self.flags.algorithm_id(), &scratch)
        } else {
            self.emit_frame(KIND_STORED, block)
        };
        self.block_buf = scratch;
        self.blocks_written += 1;
        result
    }

    /// Assemble and write one payload frame: prefix (+ CRC backfill) and the
    /// payload's wire form.
    fn emit_frame(&mut self, tag: u8, payload: &[u8]) -> Result<()> {
        self.ensure_prologue()?;

        let prefix_len = if self.flags.has_crc() { 8 } else { 4 };
        self.frame.clear();
        self.frame.resize(prefix_len, 0);
        self.encrypt.encrypt_payload(payload, &mut self.frame)?;

        let prefix = frame::encode_prefix(tag, payload.len());
        self.frame[..4].copy_from_slice(&prefix);
        if self.flags.has_crc() {
            let crc = crc32c(&self.frame[prefix_len..]);
            self.frame[4..8].copy_from_slice(&crc.to_le_bytes());
        }

        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::Config("stream already finished".into()))?;
        sink.as_write().write_all(&self.frame)?;
        Ok(())
    }

    /// Header, encryption header, and file-info record, exactly once,
    /// before the first frame (or at finish for an empty stream).
    fn ensure_prologue(&mut self) -> Result<()> {
        if self.prologue_written {
            return Ok(());
        }
        self.prologue_written = true;

        if self.flags.has_header() {
            let header = frame::encode_header(self.flags);
            self.sink_mut()?.as_write().write_all(&header)?;
        }
        if let Some(enc_header) = self.encrypt.header() {
            let enc_header = *enc_header;
            self.sink_mut()?.as_write().write_all(&enc_header)?;
        }
        if let Some(payload) = self.file_info_payload.take() {
            self.emit_frame(frame::KIND_FILE_INFO, &payload)?;
        }
        Ok(())
    }
}

impl<W: Write> io::Write for CompressionStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.consume(buf).map_err(io::Error::from)?;
        Ok(buf.len())
    }

    /// With bit 11 set, forces a block boundary and emits the `0xF0` marker;
    /// otherwise only flushes the inner sink.
    fn flush(&mut self) -> io::Result<()> {
        if self.flags.respects_flush() {
            self.flush_block_boundary().map_err(io::Error::from)?;
        }
        let sink = self.sink_mut().map_err(io::Error::from)?;
        sink.as_write().flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
