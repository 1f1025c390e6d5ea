use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::chunk::FrameError;
use crate::io_stream::{Chunk, ChunkReader};

/// One logical file as seen by a sequential pass over a container.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name:          String,
    /// Stream offset of the entry's HEADER chunk.
    pub header_offset: u64,
    pub size:          u64,
    /// HEADER chunk included.
    pub chunks:        u64,
    /// BLAKE3 of the content, hex encoded.
    pub digest:        String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ContainerIndex {
    pub entries:     Vec<IndexEntry>,
    pub total_bytes: u64,
}

impl ContainerIndex {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn find(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Folds decoded chunks into [`IndexEntry`] records.
#[derive(Default)]
pub(crate) struct IndexBuilder {
    entries: Vec<IndexEntry>,
    hasher:  Option<blake3::Hasher>,
}

impl IndexBuilder {
    pub(crate) fn push(&mut self, chunk: &Chunk<'_>, offset: u64) {
        if let Chunk::Header { name, .. } = chunk {
            self.seal();
            self.entries.push(IndexEntry {
                name:          (*name).to_owned(),
                header_offset: offset,
                size:          0,
                chunks:        0,
                digest:        String::new(),
            });
            self.hasher = Some(blake3::Hasher::new());
        }
        // The reader rejects DATA before HEADER, so an entry is always open here.
        if let (Some(entry), Some(hasher)) = (self.entries.last_mut(), self.hasher.as_mut()) {
            entry.size   += chunk.body().len() as u64;
            entry.chunks += 1;
            hasher.update(chunk.body());
        }
    }

    fn seal(&mut self) {
        if let (Some(entry), Some(hasher)) = (self.entries.last_mut(), self.hasher.take()) {
            entry.digest = hex::encode(hasher.finalize().as_bytes());
        }
    }

    pub(crate) fn finish(mut self, total_bytes: u64) -> ContainerIndex {
        self.seal();
        ContainerIndex { entries: self.entries, total_bytes }
    }
}

/// List a container by reading it front-to-back.  Nothing is written.
pub fn scan<R: Read>(reader: R) -> Result<ContainerIndex, FrameError> {
    let mut chunks  = ChunkReader::new(reader);
    let mut builder = IndexBuilder::default();
    loop {
        let offset = chunks.offset();
        match chunks.next_chunk()? {
            Some(chunk) => builder.push(&chunk, offset),
            None        => break,
        }
    }
    Ok(builder.finish(chunks.offset()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_stream::ChunkWriter;
    use std::io::Cursor;

    #[test]
    fn lists_entries_in_stream_order() {
        let mut w = ChunkWriter::new(Vec::new());
        w.write_entry("dir/first.bin", &[0xFF; 40], 16).unwrap();
        w.write_entry("second.txt", b"", 16).unwrap();
        w.write_entry("third.txt", b"hi\n", 16).unwrap();
        let bytes = w.finish().unwrap();

        let idx = scan(Cursor::new(&bytes)).unwrap();
        assert_eq!(idx.names().collect::<Vec<_>>(), ["dir/first.bin", "second.txt", "third.txt"]);
        assert_eq!(idx.total_bytes, bytes.len() as u64);

        let first = &idx.entries[0];
        assert_eq!((first.header_offset, first.size, first.chunks), (0, 40, 3));

        let empty = idx.find("second.txt").unwrap();
        assert_eq!((empty.size, empty.chunks), (0, 1));
        assert_eq!(empty.digest, blake3::hash(b"").to_hex().to_string());

        let third = idx.find("third.txt").unwrap();
        assert_eq!(third.digest, hex::encode(blake3::hash(b"hi\n").as_bytes()));
    }

    #[test]
    fn empty_stream_lists_nothing() {
        let idx = scan(Cursor::new(Vec::new())).unwrap();
        assert!(idx.entries.is_empty());
        assert_eq!(idx.total_bytes, 0);
    }

    #[test]
    fn json_roundtrip() {
        let mut w = ChunkWriter::new(Vec::new());
        w.write_entry("a.txt", b"abc", 16).unwrap();
        let idx = scan(Cursor::new(w.finish().unwrap())).unwrap();
        assert_eq!(ContainerIndex::from_bytes(&idx.to_bytes().unwrap()).unwrap(), idx);
    }
}
