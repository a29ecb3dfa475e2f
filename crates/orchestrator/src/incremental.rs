//! Incremental backup chain resolution, per §4.F: "given `--incremental
//! <from_ts>`, follow the chain to the latest full; for each
//! append-optimized table, compare modification counter against the
//! chain. If unchanged, emit a TOC entry pointing at the ancestor's byte
//! range ... Heap tables are always rewritten."

use std::collections::HashMap;
use std::path::Path;

use gpbackup_archive::{BackupConfig, Layout};
use gpbackup_catalog::AoModificationCount;

use crate::error::Error;

/// Loads every backup's `config.yaml` found under `root` into a lookup
/// table keyed by timestamp, for `resolve_chain` to walk. A backup
/// directory that exists but whose config can't be read is skipped rather
/// than failing the whole load -- it may belong to a run that never
/// finished writing its sidecars.
pub fn load_history(root: &Path) -> Result<HashMap<String, BackupConfig>, Error> {
    let mut history = HashMap::new();
    for timestamp in gpbackup_archive::discover_timestamps(root)? {
        let layout = Layout::new(root.to_path_buf(), timestamp);
        let Ok(text) = std::fs::read_to_string(layout.config_file()) else {
            continue;
        };
        let config = BackupConfig::from_yaml(&text).map_err(Error::Archive)?;
        history.insert(config.timestamp.clone(), config);
    }
    Ok(history)
}

/// Builds the `relation_oid -> modification count` lookup `resolve_chain`
/// needs for one ancestor, from that ancestor's own persisted config.
pub fn ancestor_modcounts(config: &BackupConfig) -> HashMap<u32, AoModificationCount> {
    config
        .ao_modification_counts
        .iter()
        .map(|(&oid, &modcount)| (oid, AoModificationCount { relation_oid: oid, modcount, is_append_optimized: true }))
        .collect()
}

/// Walks `incremental_from` pointers starting at `from_timestamp`, back to
/// (and including) the nearest full backup, returning the chain in
/// chronological order (full backup first).
pub fn resolve_chain(
    from_timestamp: &str,
    history: &HashMap<String, BackupConfig>,
) -> Result<Vec<BackupConfig>, Error> {
    let mut chain = Vec::new();
    let mut cursor = Some(from_timestamp.to_string());
    let mut seen = std::collections::HashSet::new();

    while let Some(ts) = cursor {
        if !seen.insert(ts.clone()) {
            return Err(Error::Consistency(format!(
                "incremental chain contains a cycle at timestamp {ts}"
            )));
        }
        let config = history.get(&ts).ok_or_else(|| {
            Error::Consistency(format!("incremental chain references unknown backup {ts}"))
        })?;
        cursor = config.incremental_from.clone();
        chain.push(config.clone());
    }

    chain.reverse();
    Ok(chain)
}

/// Whether one append-optimized table's data must be rewritten for this
/// incremental backup, or whether the TOC can point at an ancestor's
/// already-archived byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    Rewrite,
    PointAt { ancestor_timestamp: String },
}

/// `chain` is ordered oldest-first (the full backup, then each
/// incremental up to but not including the one being taken now).
/// `modcounts_by_timestamp` gives each chain member's AO modification
/// counters, and `current` is the just-probed counter for the table being
/// decided.
pub fn resolve_table_source(
    relation_oid: u32,
    current: &AoModificationCount,
    chain: &[BackupConfig],
    modcounts_by_timestamp: &HashMap<String, HashMap<u32, AoModificationCount>>,
) -> TableSource {
    if !current.is_append_optimized {
        return TableSource::Rewrite;
    }

    // Walk the chain from most recent to oldest, looking for the nearest
    // ancestor whose data still covers this table (i.e. it recorded the
    // same modification count we see now).
    for ancestor in chain.iter().rev() {
        let Some(ancestor_counts) = modcounts_by_timestamp.get(&ancestor.timestamp) else {
            continue;
        };
        match ancestor_counts.get(&relation_oid) {
            Some(ancestor_count) if ancestor_count.modcount == current.modcount => {
                return TableSource::PointAt {
                    ancestor_timestamp: ancestor.timestamp.clone(),
                };
            }
            Some(_) => return TableSource::Rewrite,
            None => continue,
        }
    }
    TableSource::Rewrite
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(ts: &str, incremental_from: Option<&str>) -> BackupConfig {
        BackupConfig {
            timestamp: ts.to_string(),
            database_name: "dvdrental".to_string(),
            gpbackup_version: "1.30.0".to_string(),
            database_version: "6.25.0".to_string(),
            compression: Default::default(),
            single_data_file: false,
            plugin: None,
            filters: Default::default(),
            incremental_from: incremental_from.map(str::to_string),
            segment_count: 3,
            leaf_partition_parents: Default::default(),
            ao_modification_counts: Default::default(),
        }
    }

    #[test]
    fn test_resolve_chain_walks_back_to_full() {
        let mut history = HashMap::new();
        history.insert("ts1".to_string(), config("ts1", None));
        history.insert("ts2".to_string(), config("ts2", Some("ts1")));
        history.insert("ts3".to_string(), config("ts3", Some("ts2")));

        let chain = resolve_chain("ts3", &history).unwrap();
        let timestamps: Vec<&str> = chain.iter().map(|c| c.timestamp.as_str()).collect();
        assert_eq!(timestamps, vec!["ts1", "ts2", "ts3"]);
    }

    #[test]
    fn test_resolve_chain_rejects_unknown_ancestor() {
        let history = HashMap::new();
        assert!(resolve_chain("ts-missing", &history).is_err());
    }

    #[test]
    fn test_unchanged_ao_table_points_at_ancestor() {
        let chain = vec![config("ts1", None), config("ts2", Some("ts1"))];
        let mut modcounts = HashMap::new();
        modcounts.insert(
            "ts1".to_string(),
            HashMap::from([(
                100,
                AoModificationCount { relation_oid: 100, modcount: 5, is_append_optimized: true },
            )]),
        );

        let current = AoModificationCount { relation_oid: 100, modcount: 5, is_append_optimized: true };
        let source = resolve_table_source(100, &current, &chain, &modcounts);
        assert_eq!(source, TableSource::PointAt { ancestor_timestamp: "ts1".to_string() });
    }

    #[test]
    fn test_changed_ao_table_is_rewritten() {
        let chain = vec![config("ts1", None)];
        let mut modcounts = HashMap::new();
        modcounts.insert(
            "ts1".to_string(),
            HashMap::from([(
                100,
                AoModificationCount { relation_oid: 100, modcount: 5, is_append_optimized: true },
            )]),
        );

        let current = AoModificationCount { relation_oid: 100, modcount: 6, is_append_optimized: true };
        let source = resolve_table_source(100, &current, &chain, &modcounts);
        assert_eq!(source, TableSource::Rewrite);
    }

    #[test]
    fn test_heap_table_is_always_rewritten() {
        let current = AoModificationCount { relation_oid: 1, modcount: 0, is_append_optimized: false };
        let source = resolve_table_source(1, &current, &[], &HashMap::new());
        assert_eq!(source, TableSource::Rewrite);
    }
}
