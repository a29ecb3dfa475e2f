//! `BackupConfig`: the per-backup metadata sidecar written alongside the
//! TOC, capturing everything a restore needs to know about how the backup
//! was taken, per spec.md §3.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layout::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FilterSet {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub include_schemas: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_schemas: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub include_tables: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_tables: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginConfig {
    pub executable: String,
    pub config_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupConfig {
    pub timestamp: String,
    pub database_name: String,
    pub gpbackup_version: String,
    pub database_version: String,
    pub compression: CompressionConfig,
    pub single_data_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginConfig>,
    #[serde(default)]
    pub filters: FilterSet,
    /// The timestamp of the backup this one is incremental from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_from: Option<String>,
    pub segment_count: u32,
    /// Every leaf partition's qualified name mapped to its parent's, as
    /// the backup's catalog probe saw it. Persisted here (rather than
    /// re-queried) because `--leaf-partition-data` resolution on restore
    /// runs before the target database has any of this backup's tables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub leaf_partition_parents: BTreeMap<String, String>,
    /// Every append-optimized table's modification counter as the probe
    /// saw it at backup time, keyed by relation oid. Persisted so a later
    /// incremental backup can compare against this backup's counters
    /// without needing to re-query a database state that no longer
    /// exists, per §4.F.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ao_modification_counts: BTreeMap<u32, i64>,
}

impl BackupConfig {
    pub fn timestamp(&self) -> Option<Timestamp> {
        Timestamp::parse(&self.timestamp)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Whether `self` may be restored incrementally on top of `base`:
    /// same database, same segment topology, and `base` is `self`'s direct
    /// or transitive ancestor in the incremental chain.
    pub fn is_descendant_of(&self, base: &BackupConfig) -> bool {
        self.database_name == base.database_name
            && self.segment_count == base.segment_count
            && self.incremental_from.as_deref() == Some(base.timestamp.as_str())
    }
}
