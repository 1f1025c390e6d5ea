use std::io::{self, Read};
use std::path::Path;

use crate::chunk::ChunkKind;
use crate::index::IndexBuilder;
use crate::io_stream::ChunkReader;

use super::{Damage, RecoveryQuality, RecoveryReport};

/// Scan a container stream and report its condition.
///
/// Malformed framing never returns `Err`; it is recorded as [`Damage`] in the
/// report.  Only genuine I/O errors while reading propagate.
pub fn scan<R: Read>(reader: R) -> io::Result<RecoveryReport> {
    let mut chunks  = ChunkReader::new(reader);
    let mut builder = IndexBuilder::default();

    // `boundary` is the end of the last chunk that decoded cleanly.
    let (damage, bytes_scanned) = loop {
        let boundary = chunks.offset();
        match chunks.next_chunk() {
            Ok(Some(chunk)) => builder.push(&chunk, boundary),
            Ok(None)        => break (None, boundary),
            Err(e) if e.is_io() => {
                return Err(io::Error::new(io::ErrorKind::Other, e));
            }
            Err(e) => break (Some(Damage {
                offset: e.offset().unwrap_or(boundary),
                reason: e.to_string(),
            }), boundary),
        }
    };

    let index = builder.finish(bytes_scanned);

    // A cut HEADER means every decoded entry is complete.  A cut DATA chunk
    // or prefix may have lost content of the last decoded entry.
    let (suspect, last_entry_cut) = match (&damage, chunks.interrupted()) {
        (None, _)                                    => (None, false),
        (Some(_), Some((ChunkKind::Header, name)))   => (name.map(str::to_owned), false),
        (Some(_), _) => match index.entries.last() {
            Some(last) => (Some(last.name.clone()), true),
            None       => (None, false),
        },
    };
    let quality = match (&damage, index.entries.is_empty()) {
        (None, _)        => RecoveryQuality::Intact,
        (Some(_), false) => RecoveryQuality::Damaged,
        (Some(_), true)  => RecoveryQuality::Unreadable,
    };

    Ok(RecoveryReport {
        index,
        chunks: chunks.chunks_read(),
        bytes_scanned,
        damage,
        quality,
        suspect,
        last_entry_cut,
    })
}

/// Convenience: scan the container at `path`.
pub fn scan_file(path: &Path) -> io::Result<RecoveryReport> {
    scan(io::BufReader::new(std::fs::File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_stream::ChunkWriter;
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        let mut w = ChunkWriter::new(Vec::new());
        w.write_entry("one.txt", b"first file", 4).unwrap();
        w.write_entry("two.txt", b"second file", 4).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn intact_stream() {
        let bytes = sample();
        let report = scan(Cursor::new(&bytes)).unwrap();
        assert_eq!(report.quality, RecoveryQuality::Intact);
        assert_eq!(report.intact_entries().len(), 2);
        assert!(report.suspect_entry().is_none());
        assert_eq!(report.bytes_scanned, bytes.len() as u64);
        assert_eq!(report.chunks, 6);
    }

    #[test]
    fn truncated_tail_marks_last_entry_suspect() {
        let mut bytes = sample();
        bytes.truncate(bytes.len() - 1);
        let report = scan(Cursor::new(&bytes)).unwrap();
        assert_eq!(report.quality, RecoveryQuality::Damaged);
        assert_eq!(report.intact_entries().len(), 1);
        assert_eq!(report.suspect_entry(), Some("two.txt"));
        assert!(report.damage.as_ref().unwrap().reason.contains("truncated"));
        let last_chunk_start = bytes.len() as u64 + 1 - (3 + 3);
        assert_eq!(report.bytes_scanned, last_chunk_start);
    }

    #[test]
    fn cut_inside_header_body_keeps_earlier_entries_intact() {
        let mut w = ChunkWriter::new(Vec::new());
        w.write_entry("one.txt", b"first", 16).unwrap();
        w.write_entry("two.txt", b"second", 16).unwrap();
        let mut bytes = w.finish().unwrap();
        bytes.truncate(bytes.len() - 2);

        let report = scan(Cursor::new(&bytes)).unwrap();
        assert_eq!(report.quality, RecoveryQuality::Damaged);
        assert_eq!(report.index.names().collect::<Vec<_>>(), ["one.txt"]);
        assert_eq!(report.intact_entries().len(), 1);
        assert_eq!(report.suspect_entry(), Some("two.txt"));
        assert!(!report.last_entry_cut);
    }

    #[test]
    fn cut_inside_header_name_has_no_suspect() {
        let mut w = ChunkWriter::new(Vec::new());
        w.write_entry("one.txt", b"first", 16).unwrap();
        let boundary = w.bytes_written() as usize;
        w.write_entry("two.txt", b"second", 16).unwrap();
        let bytes = w.finish().unwrap();

        let cut = boundary + 3 + 2 + 3;
        let report = scan(Cursor::new(&bytes[..cut])).unwrap();
        assert_eq!(report.intact_entries()[0].name, "one.txt");
        assert!(report.suspect_entry().is_none());
        assert_eq!(report.bytes_scanned, boundary as u64);
    }

    #[test]
    fn damage_before_first_header_is_unreadable() {
        let report = scan(Cursor::new(vec![0x00, 0x04, 0xFF, 0x00])).unwrap();
        assert_eq!(report.quality, RecoveryQuality::Unreadable);
        assert_eq!(report.damage.unwrap().offset, 3);
    }
}
