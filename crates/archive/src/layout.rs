//! Archive directory layout, per §4.C.
//!
//! ```text
//! <root>/backups/YYYYMMDD/TS/gpbackup_TS_metadata.sql
//! <root>/backups/YYYYMMDD/TS/gpbackup_TS_toc.yaml
//! <root>/backups/YYYYMMDD/TS/gpbackup_TS_config.yaml
//! <root>/backups/YYYYMMDD/TS/gpbackup_TS_statistics.sql
//! <root>_<C>/backups/YYYYMMDD/TS/gpbackup_TS_<oid>.gz
//! <root>_<C>/backups/YYYYMMDD/TS/gpbackup_TS_pipe
//! ```

use std::path::{Path, PathBuf};

/// Timestamp is the 14-digit `YYYYMMDDhhmmss` identifier that is the
/// primary key of a backup, per the GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub [u8; 14]);

impl Timestamp {
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut buf = [0u8; 14];
        buf.copy_from_slice(s.as_bytes());
        Some(Self(buf))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("ascii digits are valid utf8")
    }

    /// The `YYYYMMDD` day prefix used for the coordinator directory's
    /// intermediate component.
    pub fn day(&self) -> &str {
        std::str::from_utf8(&self.0[..8]).expect("ascii digits are valid utf8")
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout resolves every archive file path from a root directory, a
/// timestamp, and (for per-segment data paths) a content id.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub timestamp: Timestamp,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, timestamp: Timestamp) -> Self {
        Self {
            root: root.into(),
            timestamp,
        }
    }

    fn coordinator_dir(&self) -> PathBuf {
        self.root
            .join("backups")
            .join(self.timestamp.day())
            .join(self.timestamp.as_str())
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.coordinator_dir()
            .join(format!("gpbackup_{}_metadata.sql", self.timestamp))
    }

    pub fn toc_file(&self) -> PathBuf {
        self.coordinator_dir()
            .join(format!("gpbackup_{}_toc.yaml", self.timestamp))
    }

    pub fn config_file(&self) -> PathBuf {
        self.coordinator_dir()
            .join(format!("gpbackup_{}_config.yaml", self.timestamp))
    }

    pub fn statistics_file(&self) -> PathBuf {
        self.coordinator_dir()
            .join(format!("gpbackup_{}_statistics.sql", self.timestamp))
    }

    /// The root directory for a single segment's content id. Segment data
    /// roots are siblings of the coordinator root, suffixed by content id,
    /// per §4.C.
    fn segment_root(&self, content_id: i32) -> PathBuf {
        let mut root = self.root.clone();
        let suffix = format!("_{content_id}");
        match root.file_name() {
            Some(name) => {
                let mut name = name.to_owned();
                name.push(&suffix);
                root.set_file_name(name);
            }
            None => root = PathBuf::from(suffix),
        }
        root
    }

    fn segment_dir(&self, content_id: i32) -> PathBuf {
        self.segment_root(content_id)
            .join("backups")
            .join(self.timestamp.day())
            .join(self.timestamp.as_str())
    }

    /// Per-table data file for the default (non-single-file) mode.
    pub fn segment_table_file(&self, content_id: i32, relation_oid: u32) -> PathBuf {
        self.segment_dir(content_id)
            .join(format!("gpbackup_{}_{}.gz", self.timestamp, relation_oid))
    }

    /// The multiplexed single-file-mode pipe/archive path.
    pub fn segment_pipe_file(&self, content_id: i32) -> PathBuf {
        self.segment_dir(content_id)
            .join(format!("gpbackup_{}_pipe", self.timestamp))
    }

    /// The ephemeral named pipe shared between `COPY ... PROGRAM` and the
    /// helper for one table on one segment, per §4.D. Distinct from both
    /// `segment_table_file` (the final per-table archive) and
    /// `segment_pipe_file` (the final single-file-mode archive): this path
    /// exists only for the duration of one table's transfer and is removed
    /// once it completes, in either data-file mode.
    pub fn segment_transfer_fifo(&self, content_id: i32, relation_oid: u32) -> PathBuf {
        self.segment_dir(content_id)
            .join(format!("gpbackup_{}_{}_xfer", self.timestamp, relation_oid))
    }
}

/// Enumerates every backup timestamp found under `root`, by walking
/// `<root>/backups/<day>/<timestamp>/` for directories whose name parses
/// as a `Timestamp`. Used to discover a backup's incremental ancestors
/// without the caller having to track every prior backup itself.
pub fn discover_timestamps(root: &Path) -> std::io::Result<Vec<Timestamp>> {
    let mut found = Vec::new();
    let backups_dir = root.join("backups");
    if !backups_dir.is_dir() {
        return Ok(found);
    }
    for day_entry in std::fs::read_dir(&backups_dir)? {
        let day_entry = day_entry?;
        if !day_entry.file_type()?.is_dir() {
            continue;
        }
        for ts_entry in std::fs::read_dir(day_entry.path())? {
            let ts_entry = ts_entry?;
            if !ts_entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(timestamp) = ts_entry.file_name().to_str().and_then(Timestamp::parse) {
                found.push(timestamp);
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_timestamp_parse_and_day() {
        let ts = Timestamp::parse("20260727153000").unwrap();
        assert_eq!(ts.as_str(), "20260727153000");
        assert_eq!(ts.day(), "20260727");
        assert!(Timestamp::parse("2026072715300").is_none());
        assert!(Timestamp::parse("2026072715300x").is_none());
    }

    #[test]
    fn test_layout_paths() {
        let ts = Timestamp::parse("20260727153000").unwrap();
        let layout = Layout::new("/data1/gpbackup", ts);

        assert_eq!(
            layout.metadata_file(),
            PathBuf::from("/data1/gpbackup/backups/20260727/20260727153000/gpbackup_20260727153000_metadata.sql")
        );
        assert_eq!(
            layout.segment_table_file(2, 16412),
            PathBuf::from("/data1/gpbackup_2/backups/20260727/20260727153000/gpbackup_20260727153000_16412.gz")
        );
        assert_eq!(
            layout.segment_pipe_file(-1),
            PathBuf::from("/data1/gpbackup_-1/backups/20260727/20260727153000/gpbackup_20260727153000_pipe")
        );
    }

    #[test]
    fn test_discover_timestamps_finds_every_backup_dir() {
        let dir = tempfile::tempdir().unwrap();
        for ts in ["20260101000000", "20260102000000"] {
            std::fs::create_dir_all(dir.path().join("backups").join(&ts[..8]).join(ts)).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("backups").join("20260101").join("not-a-timestamp")).unwrap();

        let mut found: Vec<String> = discover_timestamps(dir.path())
            .unwrap()
            .iter()
            .map(|ts| ts.as_str().to_string())
            .collect();
        found.sort();
        assert_eq!(found, vec!["20260101000000", "20260102000000"]);
    }

    #[test]
    fn test_discover_timestamps_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover_timestamps(dir.path()).unwrap(), Vec::new());
    }
}
