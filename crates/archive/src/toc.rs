//! The table of contents: the byte-offset index into the metadata and
//! statistics SQL files, per §4.C.
//!
//! `Toc` is the `serde_yaml`-serialized sibling of the metadata file. Each
//! entry records the half-open byte range `[start_byte, end_byte)` of one
//! emitted object within its section, so a restore can seek directly to an
//! individual object without re-parsing SQL.

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TocEntry {
    pub schema: String,
    pub name: String,
    pub kind: String,
    pub start_byte: u64,
    pub end_byte: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toc {
    #[serde(default)]
    pub predata_entries: Vec<TocEntry>,
    #[serde(default)]
    pub postdata_entries: Vec<TocEntry>,
    #[serde(default)]
    pub statistics_entries: Vec<TocEntry>,
    #[serde(default)]
    pub data_entries: Vec<DataEntry>,
}

/// One per-relation data entry, keyed by oid rather than byte range: data
/// lives in per-segment files (or single-file-mode sub-ranges), not in the
/// coordinator's metadata SQL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataEntry {
    pub relation_oid: u32,
    pub schema: String,
    pub name: String,
    /// Present only in single-file mode, where every table's rows are
    /// framed within one shared per-segment archive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_file_range: Option<(u64, u64)>,
    /// Present when an incremental backup found this append-optimized
    /// table unchanged since `ancestor_timestamp`: the table's data was
    /// never re-copied, and a restore must follow this pointer back to
    /// the ancestor backup's own data file (or single-file range) instead
    /// of looking for data under this backup's own directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<AncestorPointer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AncestorPointer {
    pub timestamp: String,
}

impl Toc {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }
}

/// Tracks a running byte offset while the emitter writes one section of
/// the metadata (or statistics) file, producing `TocEntry` records as it
/// goes and enforcing the monotonicity invariant: entries never overlap
/// and never run backwards.
#[derive(Debug, Default)]
pub struct Section {
    byte_count: u64,
    entries: Vec<TocEntry>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `len` bytes of SQL text as belonging to one object and
    /// advances the running offset. `len` must be the exact byte length of
    /// the text written to the section's underlying writer for this
    /// object, including its terminating semicolon and newline.
    pub fn record(&mut self, schema: &str, name: &str, kind: &str, len: u64) -> Result<()> {
        let start_byte = self.byte_count;
        let end_byte = start_byte + len;

        if start_byte >= end_byte {
            return Err(ArchiveError::TocOutOfOrder(format!(
                "{schema}.{name} ({kind}): zero-length entry at offset {start_byte}"
            )));
        }
        if let Some(prev) = self.entries.last() {
            if start_byte < prev.end_byte {
                return Err(ArchiveError::TocOutOfOrder(format!(
                    "{schema}.{name} ({kind}) starts at {start_byte}, before prior entry's end {}",
                    prev.end_byte
                )));
            }
        }
        debug_assert!(start_byte < end_byte);

        self.entries.push(TocEntry {
            schema: schema.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            start_byte,
            end_byte,
        });
        self.byte_count = end_byte;
        Ok(())
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Number of entries recorded so far, without consuming the section --
    /// used to split one section's entries at a pass boundary (predata vs.
    /// postdata) when both passes write into the same physical file.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn into_entries(self) -> Vec<TocEntry> {
        self.entries
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_section_records_monotonic_entries() {
        let mut section = Section::new();
        section.record("public", "t1", "TABLE", 30).unwrap();
        section.record("public", "t2", "TABLE", 45).unwrap();

        let entries = section.into_entries();
        assert_eq!(entries[0].start_byte, 0);
        assert_eq!(entries[0].end_byte, 30);
        assert_eq!(entries[1].start_byte, 30);
        assert_eq!(entries[1].end_byte, 75);
    }

    #[test]
    fn test_section_rejects_zero_length_entry() {
        let mut section = Section::new();
        let err = section.record("public", "t1", "TABLE", 0).unwrap_err();
        assert!(matches!(err, ArchiveError::TocOutOfOrder(_)));
    }

    #[test]
    fn test_toc_yaml_round_trip() {
        let mut toc = Toc::default();
        let mut predata = Section::new();
        predata.record("public", "t1", "TABLE", 20).unwrap();
        toc.predata_entries = predata.into_entries();
        toc.data_entries.push(DataEntry {
            relation_oid: 16412,
            schema: "public".to_string(),
            name: "t1".to_string(),
            single_file_range: None,
            ancestor: None,
        });

        let yaml = toc.to_yaml().unwrap();
        let round_tripped = Toc::from_yaml(&yaml).unwrap();
        assert_eq!(toc, round_tripped);
    }
}
