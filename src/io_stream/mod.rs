//! Streaming chunk engine: writer and reader.
//!
//! # Writer
//! [`ChunkWriter`] frames file content as it is handed over: one HEADER chunk
//! per file (carrying the name and the first block) followed by one DATA chunk
//! per further block.  Nothing is buffered beyond what the wrapped writer
//! buffers itself, so memory use is bounded by the caller's block size.
//!
//! # Reader
//! [`ChunkReader`] walks a container strictly front-to-back, one chunk at a
//! time, reusing a single body buffer of at most 64 KiB.  It owns the decode
//! state machine:
//!
//! ```text
//! AwaitingHeader ──HEADER──▶ InFile ──HEADER|DATA──▶ InFile
//!       │                      │
//!       └──clean EOF──▶ Done ◀─┘        any shortfall ──▶ Failed
//! ```
//!
//! A DATA chunk seen in `AwaitingHeader` is a protocol error.

use std::io::{self, Read, Write};

use crate::chunk::{
    read_field, write_name, ChunkKind, ChunkPrefix, FrameError, MAX_PAYLOAD_LEN,
};

/// Default block size: 16 KiB of file content per chunk.
pub const DEFAULT_BLOCK_SIZE: u16 = 16 * 1024;

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ChunkWriter<W: Write> {
    writer:         W,
    bytes_written:  u64,
    chunks_written: u64,
    in_file:        bool,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, bytes_written: 0, chunks_written: 0, in_file: false }
    }

    /// Start a new logical file: emit a HEADER chunk carrying `name` and the
    /// first block of its content (`body` may be empty).
    pub fn write_header(&mut self, name: &str, body: &[u8]) -> io::Result<()> {
        let prefix = ChunkPrefix { payload_len: payload_len(body)?, kind: ChunkKind::Header };
        prefix.write(&mut self.writer)?;
        write_name(&mut self.writer, name)?;
        self.writer.write_all(body)?;

        self.bytes_written  += (ChunkPrefix::SIZE + 2 + name.len() + body.len()) as u64;
        self.chunks_written += 1;
        self.in_file = true;
        Ok(())
    }

    /// Append `body` to the file opened by the last [`write_header`](Self::write_header).
    pub fn write_data(&mut self, body: &[u8]) -> io::Result<()> {
        if !self.in_file {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "data chunk written before any header chunk",
            ));
        }
        let prefix = ChunkPrefix { payload_len: payload_len(body)?, kind: ChunkKind::Data };
        prefix.write(&mut self.writer)?;
        self.writer.write_all(body)?;

        self.bytes_written  += (ChunkPrefix::SIZE + body.len()) as u64;
        self.chunks_written += 1;
        Ok(())
    }

    /// Frame an in-memory file, splitting `data` into `block_size` chunks.
    /// Returns the number of chunks written.
    pub fn write_entry(&mut self, name: &str, data: &[u8], block_size: u16) -> io::Result<u64> {
        let block = usize::from(block_size.max(1));
        let mut blocks = data.chunks(block);
        self.write_header(name, blocks.next().unwrap_or(&[]))?;
        let mut chunks = 1;
        for body in blocks {
            self.write_data(body)?;
            chunks += 1;
        }
        Ok(chunks)
    }

    pub fn bytes_written(&self)  -> u64 { self.bytes_written }
    pub fn chunks_written(&self) -> u64 { self.chunks_written }

    pub fn get_ref(&self) -> &W { &self.writer }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn payload_len(body: &[u8]) -> io::Result<u16> {
    u16::try_from(body.len()).map_err(|_| io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("chunk body of {} bytes exceeds {MAX_PAYLOAD_LEN}", body.len()),
    ))
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// One decoded chunk.  Borrowed from the reader until the next call.
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    Header { name: &'a str, body: &'a [u8] },
    Data   { body: &'a [u8] },
}

impl<'a> Chunk<'a> {
    pub fn body(&self) -> &'a [u8] {
        match self {
            Chunk::Header { body, .. } | Chunk::Data { body } => *body,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, Chunk::Header { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    AwaitingHeader,
    InFile,
    Done,
    Failed,
}

pub struct ChunkReader<R: Read> {
    reader:      R,
    state:       StreamState,
    offset:      u64,
    chunks_read: u64,
    name:        String,
    body:        Vec<u8>,
    /// Kind of the chunk being decoded; cleared once it completes.
    pending:     Option<ChunkKind>,
    name_read:   bool,
    failed_at:   u64,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state:       StreamState::AwaitingHeader,
            offset:      0,
            chunks_read: 0,
            name:        String::new(),
            body:        Vec::new(),
            pending:     None,
            name_read:   false,
            failed_at:   0,
        }
    }

    /// Decode the next chunk.
    ///
    /// `Ok(None)` is returned once the stream ends exactly on a chunk
    /// boundary, and on every call after that.  Any error moves the reader
    /// to [`StreamState::Failed`]; further calls keep failing.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'_>>, FrameError> {
        let state = self.state;
        let kind = match state {
            StreamState::Done   => return Ok(None),
            StreamState::Failed => return Err(FrameError::Failed { offset: self.failed_at }),
            _ => match self.advance() {
                Ok(Some(kind)) => kind,
                Ok(None) => {
                    self.state = StreamState::Done;
                    return Ok(None);
                }
                Err(e) => {
                    self.state = StreamState::Failed;
                    self.failed_at = e.offset().unwrap_or(self.offset);
                    return Err(e);
                }
            },
        };

        Ok(Some(match kind {
            ChunkKind::Header => Chunk::Header { name: &self.name, body: &self.body },
            ChunkKind::Data   => Chunk::Data { body: &self.body },
        }))
    }

    fn advance(&mut self) -> Result<Option<ChunkKind>, FrameError> {
        let start = self.offset;
        let prefix = match ChunkPrefix::read(&mut self.reader, start)? {
            Some(p) => p,
            None    => return Ok(None),
        };
        self.offset += ChunkPrefix::SIZE as u64;
        self.pending   = Some(prefix.kind);
        self.name_read = false;

        match prefix.kind {
            ChunkKind::Header => self.read_name()?,
            ChunkKind::Data if self.state == StreamState::AwaitingHeader => {
                return Err(FrameError::DataBeforeHeader { offset: start });
            }
            ChunkKind::Data => {}
        }

        let len = usize::from(prefix.payload_len);
        self.body.resize(len, 0);
        read_field(&mut self.reader, &mut self.body, self.offset, "body")?;
        self.offset += len as u64;

        self.chunks_read += 1;
        self.state   = StreamState::InFile;
        self.pending = None;
        Ok(Some(prefix.kind))
    }

    fn read_name(&mut self) -> Result<(), FrameError> {
        let mut len = [0u8; 2];
        read_field(&mut self.reader, &mut len, self.offset, "name length")?;
        self.offset += 2;

        let name_offset = self.offset;
        let mut raw = vec![0u8; usize::from(u16::from_be_bytes(len))];
        read_field(&mut self.reader, &mut raw, name_offset, "name")?;
        self.offset += raw.len() as u64;

        self.name = String::from_utf8(raw).map_err(|e| FrameError::InvalidName {
            offset: name_offset,
            source: e.utf8_error(),
        })?;
        self.name_read = true;
        Ok(())
    }

    /// After a failure, the chunk that was cut short: its kind and, for a
    /// HEADER, the name when it decoded before the failure.  `None` when the
    /// reader has not failed or failed inside a chunk prefix.
    pub fn interrupted(&self) -> Option<(ChunkKind, Option<&str>)> {
        if self.state != StreamState::Failed {
            return None;
        }
        self.pending.map(|kind| match kind {
            ChunkKind::Header if self.name_read => (kind, Some(self.name.as_str())),
            _ => (kind, None),
        })
    }

    pub fn state(&self)       -> StreamState { self.state }
    /// Bytes consumed so far; always a chunk boundary between successful calls.
    pub fn offset(&self)      -> u64 { self.offset }
    pub fn chunks_read(&self) -> u64 { self.chunks_read }

    pub fn into_inner(self) -> R { self.reader }
}
