// Crate-wide error type.
//
// Every failure is fatal to the current stream; there is no retry logic.
// Variants are kept distinct so callers can tell a damaged container from a
// wrong password from caller misuse.

use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The underlying byte source or sink failed.
    Io(io::Error),
    /// The container or token stream violates the format (unknown tag,
    /// truncated payload, bad trailer, impossible back-reference, unknown
    /// flag bits, oversized block).
    Corrupt(String),
    /// A per-block CRC32C did not match the bytes on the wire.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// The container version byte is not the one this build reads.
    Version { found: u8 },
    /// The password failed the container's verification handshake.
    InvalidPassword,
    /// The container is encrypted but no password was supplied.
    PasswordRequired,
    /// A password was supplied but the container is not encrypted.
    UnexpectedPassword,
    /// A block arrived out of order, twice, or with a damaged counter.
    CounterMismatch { expected: u64, actual: u64 },
    /// Invalid configuration or API misuse (bad block-size exponent,
    /// reserved algorithm id, undersized output buffer).
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Corrupt(msg) => write!(f, "corrupt stream: {msg}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(
                    f,
                    "checksum mismatch: expected {expected:#010X}, got {actual:#010X}"
                )
            }
            Self::Version { found } => {
                if *found < crate::container::frame::FORMAT_VERSION {
                    write!(f, "container version {found:#04X} is older than this build reads")
                } else {
                    write!(f, "container version {found:#04X} is newer than this build reads")
                }
            }
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::PasswordRequired => write!(f, "stream is encrypted but no password was provided"),
            Self::UnexpectedPassword => {
                write!(f, "a password was provided but the stream is not encrypted")
            }
            Self::CounterMismatch { expected, actual } => {
                write!(
                    f,
                    "encrypted block duplicated or damaged: counter {actual}, expected {expected}"
                )
            }
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

impl Error {
    /// Recover a crate error that crossed an `io::Read`/`io::Write` boundary
    /// (the streams wrap themselves in `io::Error` to satisfy the traits).
    pub fn from_io(e: io::Error) -> Self {
        let kind = e.kind();
        match e.into_inner() {
            Some(inner) => match inner.downcast::<Error>() {
                Ok(err) => *err,
                Err(other) => Error::Io(io::Error::new(kind, other)),
            },
            None => Error::Io(io::Error::from(kind)),
        }
    }
}
