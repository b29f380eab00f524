// Single-file-info record, carried in the 0xFD frame right after the
// header when flag bit 14 is set.
//
// Layout: u16 LE name length, UTF-8 name bytes, u64 LE original length,
// i64 LE modification time (Unix seconds).

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_name: String,
    pub length: u64,
    pub modified_unix: i64,
}

impl FileInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        let name = self.file_name.as_bytes();
        let mut out = Vec::with_capacity(2 + name.len() + 16);
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.modified_unix.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bad = || Error::Corrupt("malformed file-info record".into());
        let name_len = u16::from_le_bytes([
            *bytes.first().ok_or_else(bad)?,
            *bytes.get(1).ok_or_else(bad)?,
        ]) as usize;
        let name = bytes.get(2..2 + name_len).ok_or_else(bad)?;
        let rest = bytes.get(2 + name_len..).ok_or_else(bad)?;
        if rest.len() != 16 {
            return Err(bad());
        }
        let file_name = std::str::from_utf8(name)
            .map_err(|_| Error::Corrupt("file-info name is not valid UTF-8".into()))?
            .to_string();
        let length = u64::from_le_bytes(rest[..8].try_into().map_err(|_| bad())?);
        let modified_unix = i64::from_le_bytes(rest[8..].try_into().map_err(|_| bad())?);
        Ok(Self {
            file_name,
            length,
            modified_unix,
        })
    }
}
