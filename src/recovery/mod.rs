//! Damage reporting for containers that may be truncated or corrupt.
//!
//! Extraction stops at the first malformed chunk.  [`scan`] walks the same
//! stream without writing anything and reports how far it is intact, which
//! entries are known complete, and where the damage starts.

mod scanner;

pub use scanner::{scan, scan_file};

use serde::Serialize;

use crate::index::{ContainerIndex, IndexEntry};

/// Overall condition of a scanned container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryQuality {
    /// Every chunk decoded and the stream ended on a chunk boundary.
    Intact,
    /// At least one entry decoded before the damage.
    Damaged,
    /// Damage before the first HEADER chunk completed.
    Unreadable,
}

/// Where and why decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Damage {
    pub offset: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    /// Every entry whose HEADER chunk decoded, in stream order.
    pub index:          ContainerIndex,
    pub chunks:         u64,
    /// Bytes up to the last good chunk boundary.
    pub bytes_scanned:  u64,
    pub damage:         Option<Damage>,
    pub quality:        RecoveryQuality,
    /// Name of the entry whose content was cut short, when it is known.
    /// This is not always in `index`: a HEADER chunk cut after its name
    /// decoded names a file that never made it into the listing.
    pub suspect:        Option<String>,
    /// `true` when the suspect entry is the last one in `index`.
    pub last_entry_cut: bool,
}

impl RecoveryReport {
    /// Entries whose content is known to be complete.
    pub fn intact_entries(&self) -> &[IndexEntry] {
        let entries = &self.index.entries;
        if self.last_entry_cut {
            &entries[..entries.len().saturating_sub(1)]
        } else {
            entries
        }
    }

    /// The entry that was open when the damage was hit, if any.
    pub fn suspect_entry(&self) -> Option<&str> {
        self.suspect.as_deref()
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} chunk(s), {} entr{} ({} intact), {} byte(s) readable",
            self.quality,
            self.chunks,
            self.index.entries.len(),
            if self.index.entries.len() == 1 { "y" } else { "ies" },
            self.intact_entries().len(),
            self.bytes_scanned,
        )
    }
}
