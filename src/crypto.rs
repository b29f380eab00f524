// Password-derived encryption.
//
// Inner layer: per-payload AES-256-CBC with a zero IV and zero padding.
// The key comes from PBKDF2-HMAC-SHA1 (20 000 iterations) over an 8-byte
// random salt; every plaintext is prefixed with an 8-byte little-endian
// block counter, so identical payloads never produce identical ciphertext
// and reordered blocks are detected.
//
// The 24-byte encryption header written after the container header:
//
//   bytes  0..8   salt
//   bytes  8..16  random challenge seed
//   bytes 16..24  first 8 bytes of AES(seed || "Blazer!?")
//
// Verification also accepts the legacy "Blazer!!" tail, which disables
// counter enforcement.
//
// Outer layer ("encrypt-full"): AES-256-CBC stream over the whole
// container, PBKDF2 at 4 096 iterations, salt prepended, PKCS7 padding.

use std::io::{self, Read, Write};

use aes::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;

use crate::container::frame::adjust_encrypted_len;
use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const ENCRYPTION_HEADER_LEN: usize = 24;
pub const SALT_LEN: usize = 8;
pub const COUNTER_LEN: usize = 8;
const AES_BLOCK: usize = 16;

const INNER_PBKDF2_ROUNDS: u32 = 20_000;
const FULL_PBKDF2_ROUNDS: u32 = 4_096;

const CHALLENGE_TAIL: &[u8; 8] = b"Blazer!?";
const CHALLENGE_TAIL_LEGACY: &[u8; 8] = b"Blazer!!";

const ZERO_IV: [u8; 16] = [0u8; 16];

pub(crate) fn derive_key(password: &str, salt: &[u8], rounds: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, rounds, &mut key);
    key
}

/// AES-256-CBC over a single 16-byte block with the zero IV.
fn encrypt_challenge(key: &[u8; 32], seed: &[u8; 8], tail: &[u8; 8]) -> Result<[u8; 16]> {
    let mut block = [0u8; 16];
    block[..8].copy_from_slice(seed);
    block[8..].copy_from_slice(tail);
    Aes256CbcEnc::new(key.into(), &ZERO_IV.into())
        .encrypt_padded_mut::<NoPadding>(&mut block, AES_BLOCK)
        .map_err(|_| Error::Config("challenge block encryption failed".into()))?;
    Ok(block)
}

// ---------------------------------------------------------------------------
// Encrypt helper (write side)
// ---------------------------------------------------------------------------

/// Per-payload encryptor: `None` passes payloads through untouched.
pub enum EncryptHelper {
    None,
    Aes {
        key: [u8; 32],
        counter: u64,
        header: [u8; ENCRYPTION_HEADER_LEN],
    },
}

impl EncryptHelper {
    /// Derive a fresh key and build the verification header.
    pub fn new(password: Option<&str>) -> Result<Self> {
        let Some(password) = password else {
            return Ok(Self::None);
        };

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut seed = [0u8; 8];
        OsRng.fill_bytes(&mut seed);

        let key = derive_key(password, &salt, INNER_PBKDF2_ROUNDS);
        let challenge = encrypt_challenge(&key, &seed, CHALLENGE_TAIL)?;

        let mut header = [0u8; ENCRYPTION_HEADER_LEN];
        header[..8].copy_from_slice(&salt);
        header[8..16].copy_from_slice(&seed);
        header[16..24].copy_from_slice(&challenge[..8]);

        Ok(Self::Aes {
            key,
            counter: 0,
            header,
        })
    }

    /// The 24-byte header to write after the container header, if any.
    pub fn header(&self) -> Option<&[u8; ENCRYPTION_HEADER_LEN]> {
        match self {
            Self::None => None,
            Self::Aes { header, .. } => Some(header),
        }
    }

    /// Append the wire form of `plain` to `out`: either the payload itself,
    /// or counter-prefixed zero-padded AES ciphertext of
    /// `adjust_encrypted_len(plain.len())` bytes.
    pub fn encrypt_payload(&mut self, plain: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::None => {
                out.extend_from_slice(plain);
                Ok(())
            }
            Self::Aes { key, counter, .. } => {
                let wire_len = adjust_encrypted_len(plain.len());
                let start = out.len();
                out.extend_from_slice(&counter.to_le_bytes());
                out.extend_from_slice(plain);
                out.resize(start + wire_len, 0);
                *counter += 1;

                Aes256CbcEnc::new((&*key).into(), &ZERO_IV.into())
                    .encrypt_padded_mut::<NoPadding>(&mut out[start..], wire_len)
                    .map_err(|_| Error::Config("payload not block aligned".into()))?;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decrypt helper (read side)
// ---------------------------------------------------------------------------

/// Per-payload decryptor mirroring [`EncryptHelper`].
#[derive(Debug)]
pub enum DecryptHelper {
    None,
    Aes {
        key: [u8; 32],
        counter: u64,
        enforce_counter: bool,
    },
}

impl DecryptHelper {
    /// Verify `password` against the 24-byte encryption header.
    ///
    /// The `"Blazer!?"` tail selects counter enforcement; the legacy
    /// `"Blazer!!"` tail is accepted without it.
    pub fn init(password: &str, header: &[u8; ENCRYPTION_HEADER_LEN]) -> Result<Self> {
        let salt = &header[..8];
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&header[8..16]);
        let expected = &header[16..24];

        let key = derive_key(password, salt, INNER_PBKDF2_ROUNDS);

        let current = encrypt_challenge(&key, &seed, CHALLENGE_TAIL)?;
        if &current[..8] == expected {
            return Ok(Self::Aes {
                key,
                counter: 0,
                enforce_counter: true,
            });
        }
        let legacy = encrypt_challenge(&key, &seed, CHALLENGE_TAIL_LEGACY)?;
        if &legacy[..8] == expected {
            return Ok(Self::Aes {
                key,
                counter: 0,
                enforce_counter: false,
            });
        }
        Err(Error::InvalidPassword)
    }

    /// Recover `plain_len` payload bytes from `wire` into `out` (cleared
    /// first), validating the block counter when enforced.
    pub fn decrypt_payload(&mut self, wire: &[u8], plain_len: usize, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        match self {
            Self::None => {
                if wire.len() != plain_len {
                    return Err(Error::Corrupt("payload length mismatch".into()));
                }
                out.extend_from_slice(wire);
                Ok(())
            }
            Self::Aes {
                key,
                counter,
                enforce_counter,
            } => {
                if wire.len() != adjust_encrypted_len(plain_len) {
                    return Err(Error::Corrupt(format!(
                        "encrypted payload is {} bytes, expected {}",
                        wire.len(),
                        adjust_encrypted_len(plain_len)
                    )));
                }
                out.extend_from_slice(wire);
                Aes256CbcDec::new((&*key).into(), &ZERO_IV.into())
                    .decrypt_padded_mut::<NoPadding>(out)
                    .map_err(|_| Error::Corrupt("encrypted payload not block aligned".into()))?;

                let actual = u64::from_le_bytes(
                    out[..COUNTER_LEN]
                        .try_into()
                        .map_err(|_| Error::Corrupt("short encrypted payload".into()))?,
                );
                if *enforce_counter && actual != *counter {
                    return Err(Error::CounterMismatch {
                        expected: *counter,
                        actual,
                    });
                }
                *counter += 1;

                out.drain(..COUNTER_LEN);
                out.truncate(plain_len);
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encrypt-full stream wrappers
// ---------------------------------------------------------------------------

/// `Write` wrapper applying the outer container cipher.  The salt is
/// emitted first; `finish()` writes the final PKCS7-padded block.
pub struct EncryptFullWriter<W: Write> {
    inner: W,
    cipher: Option<Aes256CbcEnc>,
    pending: Vec<u8>,
}

impl<W: Write> EncryptFullWriter<W> {
    pub fn new(mut inner: W, password: &str) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        inner.write_all(&salt)?;
        let key = derive_key(password, &salt, FULL_PBKDF2_ROUNDS);
        Ok(Self {
            inner,
            cipher: Some(Aes256CbcEnc::new((&key).into(), &ZERO_IV.into())),
            pending: Vec::with_capacity(4096),
        })
    }

    /// Pad and flush the final block, returning the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let tail_len = self.pending.len() % AES_BLOCK;
        let keep = self.pending.len() - tail_len;
        self.encrypt_full_blocks_up_to(keep)?;

        let cipher = self
            .cipher
            .take()
            .ok_or_else(|| Error::Config("stream already finished".into()))?;

        let mut last = [0u8; AES_BLOCK];
        last[..tail_len].copy_from_slice(&self.pending);
        let padded = cipher
            .encrypt_padded_mut::<aes::cipher::block_padding::Pkcs7>(&mut last, tail_len)
            .map_err(|_| Error::Config("final block padding failed".into()))?;
        self.inner.write_all(padded)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn encrypt_full_blocks_up_to(&mut self, limit: usize) -> Result<()> {
        let Some(cipher) = self.cipher.as_mut() else {
            return Err(Error::Config("stream already finished".into()));
        };
        for chunk in self.pending[..limit].chunks_exact_mut(AES_BLOCK) {
            cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        self.inner.write_all(&self.pending[..limit])?;
        self.pending.drain(..limit);
        Ok(())
    }
}

impl<W: Write> Write for EncryptFullWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        // Keep one block back so finish() always has the padding block.
        if self.pending.len() > AES_BLOCK {
            let limit = (self.pending.len() - 1) / AES_BLOCK * AES_BLOCK;
            self.encrypt_full_blocks_up_to(limit).map_err(io::Error::from)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `Read` wrapper removing the outer container cipher.  The final ciphertext
/// block is held back until EOF so its PKCS7 padding can be stripped.
pub struct EncryptFullReader<R: Read> {
    inner: R,
    cipher: Aes256CbcDec,
    raw: Vec<u8>,
    plain: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> EncryptFullReader<R> {
    pub fn new(mut inner: R, password: &str) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        inner
            .read_exact(&mut salt)
            .map_err(|_| Error::Corrupt("truncated encrypted container".into()))?;
        let key = derive_key(password, &salt, FULL_PBKDF2_ROUNDS);
        Ok(Self {
            inner,
            cipher: Aes256CbcDec::new((&key).into(), &ZERO_IV.into()),
            raw: Vec::with_capacity(4096),
            plain: Vec::new(),
            pos: 0,
            eof: false,
        })
    }

    fn refill(&mut self) -> Result<()> {
        self.plain.clear();
        self.pos = 0;

        let mut chunk = [0u8; 4096];
        while self.plain.is_empty() {
            if self.eof {
                return Ok(());
            }
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
                return self.finish_tail();
            }
            self.raw.extend_from_slice(&chunk[..n]);

            // Decrypt everything except a held-back final block candidate.
            let full = self.raw.len() / AES_BLOCK * AES_BLOCK;
            let limit = full.saturating_sub(AES_BLOCK);
            if limit == 0 {
                continue;
            }
            for block in self.raw[..limit].chunks_exact_mut(AES_BLOCK) {
                self.cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            self.plain.extend_from_slice(&self.raw[..limit]);
            self.raw.drain(..limit);
        }
        Ok(())
    }

    /// Give back the wrapped source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn finish_tail(&mut self) -> Result<()> {
        if self.raw.is_empty() || self.raw.len() % AES_BLOCK != 0 {
            return Err(Error::Corrupt("truncated encrypted container".into()));
        }
        for block in self.raw.chunks_exact_mut(AES_BLOCK) {
            self.cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        let pad = *self.raw.last().unwrap_or(&0) as usize;
        if pad == 0 || pad > AES_BLOCK || pad > self.raw.len() {
            return Err(Error::Corrupt("bad container padding".into()));
        }
        let body = self.raw.len() - pad;
        if self.raw[body..].iter().any(|&b| b as usize != pad) {
            return Err(Error::Corrupt("bad container padding".into()));
        }
        self.plain.extend_from_slice(&self.raw[..body]);
        self.raw.clear();
        Ok(())
    }
}

impl<R: Read> Read for EncryptFullReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.plain.len() {
            if self.eof && self.raw.is_empty() {
                return Ok(0);
            }
            self.refill().map_err(io::Error::from)?;
            if self.plain.is_empty() {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.plain.len() - self.pos);
        buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
