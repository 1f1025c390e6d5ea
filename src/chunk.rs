//! Chunk framing: the atomic unit of a container stream.
//!
//! ```text
//! Chunk := payload_len:u16 kind:u8 [name_len:u16 name:bytes[name_len]] body:bytes[payload_len]
//! ```
//!
//! `kind == 0xFF` marks a HEADER chunk: it carries the file name and starts a
//! new logical file.  Any other kind is a DATA chunk appending to the file
//! opened by the nearest preceding header.  Writers always emit `0x00`.
//!
//! # Endianness
//! Multi-byte fields are big-endian.  There is no magic, version or checksum;
//! a stream is zero or more chunks concatenated until end-of-file.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::str::Utf8Error;
use thiserror::Error;

/// Kind byte announcing a HEADER chunk.
pub const HEADER_SENTINEL: u8 = 0xFF;
/// Kind byte written for DATA chunks.
pub const DATA_KIND: u8 = 0x00;
/// Largest body a single chunk can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;
/// Largest encodable file name, in bytes.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FrameError {
    /// The stream ended inside a chunk.
    #[error("truncated {field} at offset {offset}: expected {expected} bytes, found {found}")]
    Truncated {
        offset:   u64,
        field:    &'static str,
        expected: usize,
        found:    usize,
    },
    #[error("data chunk at offset {offset} precedes any header chunk")]
    DataBeforeHeader { offset: u64 },
    #[error("file name at offset {offset} is not valid UTF-8")]
    InvalidName {
        offset: u64,
        #[source]
        source: Utf8Error,
    },
    #[error("file name is {len} bytes, at most 65535 can be framed")]
    NameTooLong { len: usize },
    /// The stream already failed at `offset`; the reader decodes nothing further.
    #[error("chunk stream already failed at offset {offset}")]
    Failed { offset: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Stream offset the damage was detected at, when the error is a format error.
    pub fn offset(&self) -> Option<u64> {
        match self {
            FrameError::Truncated { offset, .. }
            | FrameError::DataBeforeHeader { offset }
            | FrameError::InvalidName { offset, .. }
            | FrameError::Failed { offset } => Some(*offset),
            FrameError::NameTooLong { .. } | FrameError::Io(_) => None,
        }
    }

    /// `true` for genuine I/O failures, `false` for malformed input.
    pub fn is_io(&self) -> bool {
        matches!(self, FrameError::Io(_))
    }
}

// ── Chunk kind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Header,
    Data,
}

impl From<u8> for ChunkKind {
    fn from(b: u8) -> Self {
        if b == HEADER_SENTINEL { ChunkKind::Header } else { ChunkKind::Data }
    }
}

impl ChunkKind {
    pub fn as_byte(self) -> u8 {
        match self {
            ChunkKind::Header => HEADER_SENTINEL,
            ChunkKind::Data   => DATA_KIND,
        }
    }
}

// ── Fixed prefix ─────────────────────────────────────────────────────────────

/// The `payload_len` + `kind` prefix every chunk starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPrefix {
    pub payload_len: u16,
    pub kind:        ChunkKind,
}

impl ChunkPrefix {
    pub const SIZE: usize = 3;

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u16::<BigEndian>(self.payload_len)?;
        writer.write_u8(self.kind.as_byte())?;
        Ok(())
    }

    /// Read the next prefix.  `Ok(None)` means the stream ended cleanly on a
    /// chunk boundary; any partial prefix is a [`FrameError::Truncated`].
    pub fn read<R: Read>(mut reader: R, offset: u64) -> Result<Option<Self>, FrameError> {
        let mut len = [0u8; 2];
        match fill(&mut reader, &mut len)? {
            0 => return Ok(None),
            2 => {}
            found => return Err(FrameError::Truncated {
                offset, field: "payload length", expected: 2, found,
            }),
        }
        let kind = reader.read_u8().map_err(|e| eof_as_truncated(e, offset + 2, "chunk kind", 1))?;
        Ok(Some(Self {
            payload_len: u16::from_be_bytes(len),
            kind:        ChunkKind::from(kind),
        }))
    }
}

/// Write the `name_len` + `name` block that follows a HEADER prefix.
pub fn write_name<W: Write>(mut writer: W, name: &str) -> io::Result<()> {
    let len = u16::try_from(name.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, FrameError::NameTooLong { len: name.len() })
    })?;
    writer.write_u16::<BigEndian>(len)?;
    writer.write_all(name.as_bytes())
}

/// Check that `name` fits the 16-bit length field.
pub fn check_name(name: &str) -> Result<(), FrameError> {
    if name.len() > MAX_NAME_LEN {
        return Err(FrameError::NameTooLong { len: name.len() });
    }
    Ok(())
}

/// Read as many bytes as `buf` holds, stopping early only at end-of-stream.
/// Returns the number of bytes read.
pub fn fill<R: Read>(mut reader: R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes of `field`, turning a short read into
/// [`FrameError::Truncated`].
pub fn read_field<R: Read>(
    reader: R,
    buf:    &mut [u8],
    offset: u64,
    field:  &'static str,
) -> Result<(), FrameError> {
    let found = fill(reader, buf)?;
    if found != buf.len() {
        return Err(FrameError::Truncated { offset, field, expected: buf.len(), found });
    }
    Ok(())
}

fn eof_as_truncated(e: io::Error, offset: u64, field: &'static str, expected: usize) -> FrameError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FrameError::Truncated { offset, field, expected, found: 0 }
    } else {
        FrameError::Io(e)
    }
}
