//! Data movement driver, per §4.D: one long-lived helper subprocess per
//! segment, a transient named pipe per (table, segment) work unit, and the
//! bounded worker pool from `gpbackup_mover::pool` running `COPY ...
//! PROGRAM` against that pipe concurrently with the helper's own read or
//! write of it.
//!
//! Each table is assigned to exactly one segment by a deterministic
//! `relation_oid % segment count` split. A real cluster's planner decides
//! which rows live on which segment; without per-segment catalog
//! connectivity to drive that here, this is the simplification this
//! workspace uses to keep the parallel-pool shape faithful while only ever
//! talking to one Postgres pool. See DESIGN.md.
//!
//! Restore additionally has to cope with a table whose data an incremental
//! backup never rewrote: its `DataEntry.ancestor` points at the backup
//! that actually holds the bytes. `run_restore` resolves every table's
//! true source timestamp first, by following ancestor pointers, and spawns
//! one segment-helper set per distinct source timestamp since a helper's
//! `--backup-dir`/`--timestamp` are fixed at spawn time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use gpbackup_archive::{CompressionConfig, DataEntry, Layout, Toc};
use gpbackup_catalog::{CatalogConnection, Relation, SnapshotId};
use gpbackup_mover::{fifo, pool, Baton, HelperCommand, HelperHandle, MoverError, WorkUnit, DEFAULT_WATCHDOG};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::ledger::CleanupLedger;

/// How many ancestor hops `resolve_source_timestamp` will follow before
/// treating the chain as pathological rather than looping forever on a
/// corrupted TOC.
const MAX_ANCESTOR_HOPS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperMode {
    Backup,
    Restore,
}

impl HelperMode {
    fn as_arg(self) -> &'static str {
        match self {
            HelperMode::Backup => "backup",
            HelperMode::Restore => "restore",
        }
    }
}

fn helper_args(
    layout: &Layout,
    content_id: i32,
    mode: HelperMode,
    single_data_file: bool,
    compression: &CompressionConfig,
) -> Vec<String> {
    let mut args = vec![
        "--mode".to_string(),
        mode.as_arg().to_string(),
        "--backup-dir".to_string(),
        layout.root.display().to_string(),
        "--timestamp".to_string(),
        layout.timestamp.to_string(),
        "--content-id".to_string(),
        content_id.to_string(),
    ];
    if single_data_file {
        args.push("--single-data-file".to_string());
    }
    if compression.enabled {
        args.push("--compression-level".to_string());
        args.push(compression.level.to_string());
    }
    args
}

/// Assigns every table to one segment by a stable hash of its oid. Kept as
/// a free function so backup and restore derive the same placement from the
/// same table set without having to persist it anywhere but the TOC.
pub fn assign_segment(relation_oid: u32, content_ids: &[i32]) -> i32 {
    content_ids[(relation_oid as usize) % content_ids.len()]
}

/// One long-lived helper process per segment, plus (for single-file mode)
/// the baton sequencing writers to that segment's shared archive file.
struct SegmentHelpers {
    handles: HashMap<i32, Arc<Mutex<HelperHandle>>>,
    batons: HashMap<i32, Arc<Baton>>,
}

impl SegmentHelpers {
    fn spawn(
        helper_executable: &Path,
        layout: &Layout,
        content_ids: &[i32],
        mode: HelperMode,
        single_data_file: bool,
        compression: &CompressionConfig,
        ledger: &CleanupLedger,
    ) -> Result<Self, Error> {
        let mut handles = HashMap::new();
        let mut batons = HashMap::new();
        for &content_id in content_ids {
            let args = helper_args(layout, content_id, mode, single_data_file, compression);
            let handle = HelperHandle::spawn(helper_executable, &args)?;
            let pid = handle.id();
            ledger.register(move || {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            });

            let baton = Arc::new(Baton::new());
            baton.release_first();

            handles.insert(content_id, Arc::new(Mutex::new(handle)));
            batons.insert(content_id, baton);
        }
        Ok(Self { handles, batons })
    }

    fn handle(&self, content_id: i32) -> Arc<Mutex<HelperHandle>> {
        Arc::clone(
            self.handles
                .get(&content_id)
                .expect("every work unit's content id was spawned a helper"),
        )
    }

    fn baton(&self, content_id: i32) -> Arc<Baton> {
        Arc::clone(
            self.batons
                .get(&content_id)
                .expect("every work unit's content id was spawned a baton"),
        )
    }

    /// Sends `DONE` to every helper and waits for its exit. Consumes `self`
    /// so no worker can race a shutdown-in-progress helper.
    async fn shutdown(self) -> Result<(), Error> {
        for (content_id, handle) in self.handles {
            let handle = Arc::try_unwrap(handle).unwrap_or_else(|_| {
                panic!("helper handle for segment {content_id} still shared after pool drained")
            });
            let handle = handle.into_inner();
            let status = handle.shutdown().await?;
            if !status.success() {
                tracing::warn!(content_id, ?status, "helper process exited non-zero");
            }
        }
        Ok(())
    }
}

fn file_len_or_zero(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Runs every table's backup data transfer and returns one `DataEntry` per
/// table, in relation-oid order. Every transfer's `COPY ... TO PROGRAM`
/// runs inside a transaction bound to `snapshot`, so a table's data and
/// the metadata probed earlier under the same snapshot describe one
/// consistent instant, per §4.A.
#[allow(clippy::too_many_arguments)]
pub async fn run_backup(
    tables: &[Relation],
    layout: &Layout,
    content_ids: &[i32],
    catalog_conn: &CatalogConnection,
    snapshot: &SnapshotId,
    helper_executable: &Path,
    single_data_file: bool,
    compression: &CompressionConfig,
    jobs: usize,
    aborting: Arc<AtomicBool>,
    ledger: Arc<CleanupLedger>,
) -> Result<Vec<DataEntry>, Error> {
    if tables.is_empty() {
        return Ok(Vec::new());
    }

    let helpers = Arc::new(SegmentHelpers::spawn(
        helper_executable,
        layout,
        content_ids,
        HelperMode::Backup,
        single_data_file,
        compression,
        &ledger,
    )?);

    let relations: Arc<HashMap<u32, Relation>> =
        Arc::new(tables.iter().map(|r| (r.relation_oid, r.clone())).collect());
    let units: Vec<WorkUnit> = tables
        .iter()
        .map(|r| WorkUnit { relation_oid: r.relation_oid, content_id: assign_segment(r.relation_oid, content_ids) })
        .collect();

    let entries = Arc::new(Mutex::new(Vec::with_capacity(units.len())));
    let layout = Arc::new(layout.clone());
    let catalog_conn = catalog_conn.clone();
    let snapshot = snapshot.clone();

    let outcomes = {
        let helpers = Arc::clone(&helpers);
        let relations = Arc::clone(&relations);
        let entries = Arc::clone(&entries);
        let layout = Arc::clone(&layout);
        pool::run(units, jobs, DEFAULT_WATCHDOG, aborting, move |unit| {
            let helpers = Arc::clone(&helpers);
            let relations = Arc::clone(&relations);
            let entries = Arc::clone(&entries);
            let layout = Arc::clone(&layout);
            let ledger = Arc::clone(&ledger);
            let catalog_conn = catalog_conn.clone();
            let snapshot = snapshot.clone();
            async move {
                let relation = relations
                    .get(&unit.relation_oid)
                    .expect("work unit oid is one of the backed-up tables");
                let entry =
                    backup_one(unit, relation, &layout, &catalog_conn, &snapshot, &helpers, single_data_file, &ledger).await?;
                entries.lock().await.push(entry);
                Ok(())
            }
        })
        .await
    };

    Arc::try_unwrap(helpers)
        .unwrap_or_else(|_| panic!("helper pool still referenced after pool::run drained"))
        .shutdown()
        .await?;

    fail_on_any_error(outcomes)?;

    let mut entries = Arc::try_unwrap(entries)
        .unwrap_or_else(|_| panic!("data entries still referenced after pool::run drained"))
        .into_inner();
    entries.sort_by_key(|e| e.relation_oid);
    Ok(entries)
}

#[allow(clippy::too_many_arguments)]
async fn backup_one(
    unit: WorkUnit,
    relation: &Relation,
    layout: &Layout,
    catalog_conn: &CatalogConnection,
    snapshot: &SnapshotId,
    helpers: &SegmentHelpers,
    single_data_file: bool,
    ledger: &CleanupLedger,
) -> gpbackup_mover::Result<DataEntry> {
    let pipe_path = layout.segment_transfer_fifo(unit.content_id, unit.relation_oid);
    if let Some(parent) = pipe_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fifo::create(&pipe_path)?;
    let cleanup_path = pipe_path.clone();
    ledger.register(move || {
        let _ = fifo::remove(&cleanup_path);
    });

    let baton = single_data_file.then(|| helpers.baton(unit.content_id));
    let guard = match &baton {
        Some(baton) => Some(baton.wait_for_turn().await),
        None => None,
    };

    let range_start = single_data_file.then(|| file_len_or_zero(&layout.segment_pipe_file(unit.content_id)));

    let result = backup_transfer(unit, relation, &pipe_path, catalog_conn, snapshot, helpers).await;

    let range = range_start.map(|start| (start, file_len_or_zero(&layout.segment_pipe_file(unit.content_id))));
    if let Some(guard) = guard {
        guard.release_next();
    }

    let _ = fifo::remove(&pipe_path);

    let mut entry = result?;
    entry.single_file_range = range;
    Ok(entry)
}

async fn backup_transfer(
    unit: WorkUnit,
    relation: &Relation,
    pipe_path: &Path,
    catalog_conn: &CatalogConnection,
    snapshot: &SnapshotId,
    helpers: &SegmentHelpers,
) -> gpbackup_mover::Result<DataEntry> {
    let handle = helpers.handle(unit.content_id);
    let mut handle = handle.lock().await;
    handle
        .send(&HelperCommand::Backup {
            relation_oid: unit.relation_oid,
            pipe_path: pipe_path.display().to_string(),
        })
        .await?;

    let qualified = relation.qualified_name();
    let pipe_literal = pipe_path.display().to_string().replace('\'', "''");
    let copy_sql = format!("COPY {qualified} TO PROGRAM 'cat >> ''{pipe_literal}'''");

    let mut txn = catalog_conn
        .open_with_snapshot(snapshot)
        .await
        .map_err(|e| MoverError::HelperProtocol(format!("binding backup transfer to snapshot failed: {e}")))?;

    let copy = async {
        sqlx::query(&copy_sql)
            .execute(&mut *txn)
            .await
            .map_err(|e| MoverError::HelperProtocol(format!("COPY TO PROGRAM failed: {e}")))
    };
    // `handle` is held across `send` above and `recv` here so no other
    // unit's command can be interleaved on this helper's stdin/stdout
    // while this one is in flight.
    let ack = async { handle.recv().await };

    let (_rows, response) = tokio::try_join!(copy, ack)?;
    let response = response.ok_or_else(|| {
        MoverError::HelperProtocol(format!("helper closed its stdout before acking oid {}", unit.relation_oid))
    })?;
    if !response.ok {
        return Err(MoverError::HelperProtocol(
            response.error.unwrap_or_else(|| "unknown helper failure".to_string()),
        ));
    }

    txn.commit()
        .await
        .map_err(|e| MoverError::HelperProtocol(format!("committing snapshot-bound transfer transaction failed: {e}")))?;

    Ok(DataEntry {
        relation_oid: relation.relation_oid,
        schema: relation.schema_name.clone(),
        name: relation.relation_name.clone(),
        single_file_range: None,
        ancestor: None,
    })
}

/// Follows `entry.ancestor` pointers, if any, to the timestamp whose own
/// archive actually holds `entry`'s bytes. Returns `entry`'s own backup
/// timestamp when it has no ancestor.
fn resolve_source_timestamp(root: &Path, timestamp: &str, entry: &DataEntry) -> Result<String, Error> {
    let mut current_timestamp = timestamp.to_string();
    let mut current_entry = entry.clone();

    for _ in 0..MAX_ANCESTOR_HOPS {
        let Some(ancestor) = &current_entry.ancestor else {
            return Ok(current_timestamp);
        };
        let ancestor_timestamp_parsed = gpbackup_archive::Timestamp::parse(&ancestor.timestamp).ok_or_else(|| {
            Error::Consistency(format!("ancestor pointer for relation {} has an unparseable timestamp {}", entry.relation_oid, ancestor.timestamp))
        })?;
        let ancestor_layout = Layout::new(root.to_path_buf(), ancestor_timestamp_parsed);
        let ancestor_toc = Toc::from_yaml(&std::fs::read_to_string(ancestor_layout.toc_file())?)?;
        let next_entry = ancestor_toc
            .data_entries
            .iter()
            .find(|e| e.relation_oid == entry.relation_oid)
            .ok_or_else(|| {
                Error::Consistency(format!(
                    "ancestor backup {} has no data entry for relation {}",
                    ancestor.timestamp, entry.relation_oid
                ))
            })?
            .clone();
        current_timestamp = ancestor.timestamp.clone();
        current_entry = next_entry;
    }

    Err(Error::Consistency(format!(
        "ancestor chain for relation {} did not resolve within {MAX_ANCESTOR_HOPS} hops",
        entry.relation_oid
    )))
}

/// Runs every table's restore data transfer. `entries` carries each
/// table's recorded `single_file_range` (if the backup used single-file
/// mode) and, for an incremental restore, an `ancestor` pointer. Tables
/// are grouped by the backup timestamp that actually holds their data
/// (following `ancestor` pointers first) and each group gets its own
/// segment-helper set, since a helper's `--backup-dir`/`--timestamp` are
/// fixed at spawn time and the wire protocol carries no per-command
/// override.
#[allow(clippy::too_many_arguments)]
pub async fn run_restore(
    tables: &[Relation],
    entries: &[DataEntry],
    layout: &Layout,
    content_ids: &[i32],
    pool: &PgPool,
    helper_executable: &Path,
    single_data_file: bool,
    compression: &CompressionConfig,
    jobs: usize,
    aborting: Arc<AtomicBool>,
    ledger: Arc<CleanupLedger>,
) -> Result<(), Error> {
    if tables.is_empty() {
        return Ok(());
    }

    let entries_by_oid: HashMap<u32, &DataEntry> = entries.iter().map(|e| (e.relation_oid, e)).collect();
    let own_timestamp = layout.timestamp.to_string();

    let mut groups: HashMap<String, Vec<Relation>> = HashMap::new();
    for table in tables {
        let entry = entries_by_oid.get(&table.relation_oid).copied().cloned().unwrap_or(DataEntry {
            relation_oid: table.relation_oid,
            schema: table.schema_name.clone(),
            name: table.relation_name.clone(),
            single_file_range: None,
            ancestor: None,
        });
        let source_timestamp = resolve_source_timestamp(&layout.root, &own_timestamp, &entry)?;
        groups.entry(source_timestamp).or_default().push(table.clone());
    }

    for (source_timestamp, group_tables) in groups {
        let group_layout = if source_timestamp == own_timestamp {
            layout.clone()
        } else {
            let parsed = gpbackup_archive::Timestamp::parse(&source_timestamp).ok_or_else(|| {
                Error::Consistency(format!("ancestor timestamp {source_timestamp} does not parse"))
            })?;
            Layout::new(layout.root.clone(), parsed)
        };
        run_restore_group(&group_tables, entries, &group_layout, content_ids, pool, helper_executable, single_data_file, compression, jobs, Arc::clone(&aborting), Arc::clone(&ledger)).await?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_restore_group(
    tables: &[Relation],
    entries: &[DataEntry],
    layout: &Layout,
    content_ids: &[i32],
    pool: &PgPool,
    helper_executable: &Path,
    single_data_file: bool,
    compression: &CompressionConfig,
    jobs: usize,
    aborting: Arc<AtomicBool>,
    ledger: Arc<CleanupLedger>,
) -> Result<(), Error> {
    let helpers = Arc::new(SegmentHelpers::spawn(
        helper_executable,
        layout,
        content_ids,
        HelperMode::Restore,
        single_data_file,
        compression,
        &ledger,
    )?);

    let relations: Arc<HashMap<u32, Relation>> =
        Arc::new(tables.iter().map(|r| (r.relation_oid, r.clone())).collect());
    let ranges: Arc<HashMap<u32, Option<(u64, u64)>>> =
        Arc::new(entries.iter().map(|e| (e.relation_oid, e.single_file_range)).collect());
    let units: Vec<WorkUnit> = tables
        .iter()
        .map(|r| WorkUnit { relation_oid: r.relation_oid, content_id: assign_segment(r.relation_oid, content_ids) })
        .collect();

    let layout = Arc::new(layout.clone());
    let pool = pool.clone();

    let outcomes = {
        let helpers = Arc::clone(&helpers);
        let relations = Arc::clone(&relations);
        let ranges = Arc::clone(&ranges);
        let layout = Arc::clone(&layout);
        pool::run(units, jobs, DEFAULT_WATCHDOG, aborting, move |unit| {
            let helpers = Arc::clone(&helpers);
            let relations = Arc::clone(&relations);
            let ranges = Arc::clone(&ranges);
            let layout = Arc::clone(&layout);
            let ledger = Arc::clone(&ledger);
            let pool = pool.clone();
            async move {
                let relation = relations
                    .get(&unit.relation_oid)
                    .expect("work unit oid is one of the restored tables");
                let range = ranges.get(&unit.relation_oid).copied().flatten();
                restore_one(unit, relation, range, &layout, &pool, &helpers, &ledger).await
            }
        })
        .await
    };

    Arc::try_unwrap(helpers)
        .unwrap_or_else(|_| panic!("helper pool still referenced after pool::run drained"))
        .shutdown()
        .await?;

    fail_on_any_error(outcomes)
}

async fn restore_one(
    unit: WorkUnit,
    relation: &Relation,
    range: Option<(u64, u64)>,
    layout: &Layout,
    pool: &PgPool,
    helpers: &SegmentHelpers,
    ledger: &CleanupLedger,
) -> gpbackup_mover::Result<()> {
    let pipe_path = layout.segment_transfer_fifo(unit.content_id, unit.relation_oid);
    if let Some(parent) = pipe_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fifo::create(&pipe_path)?;
    let cleanup_path = pipe_path.clone();
    ledger.register(move || {
        let _ = fifo::remove(&cleanup_path);
    });

    let result = restore_transfer(unit, relation, range, &pipe_path, pool, helpers).await;

    let _ = fifo::remove(&pipe_path);
    result
}

async fn restore_transfer(
    unit: WorkUnit,
    relation: &Relation,
    range: Option<(u64, u64)>,
    pipe_path: &Path,
    pool: &PgPool,
    helpers: &SegmentHelpers,
) -> gpbackup_mover::Result<()> {
    let (offset, length) = match range {
        Some((start, end)) => (start, end - start),
        None => (0, 0),
    };

    let handle = helpers.handle(unit.content_id);
    let mut handle = handle.lock().await;
    handle
        .send(&HelperCommand::Restore {
            relation_oid: unit.relation_oid,
            pipe_path: pipe_path.display().to_string(),
            offset,
            length,
        })
        .await?;

    let qualified = relation.qualified_name();
    let pipe_literal = pipe_path.display().to_string().replace('\'', "''");
    let copy_sql = format!("COPY {qualified} FROM PROGRAM 'cat ''{pipe_literal}'''");

    let copy = async {
        sqlx::query(&copy_sql)
            .execute(pool)
            .await
            .map_err(|e| MoverError::HelperProtocol(format!("COPY FROM PROGRAM failed: {e}")))
    };
    // Held across `send` and `recv`, same reasoning as `backup_transfer`.
    let ack = async { handle.recv().await };

    let (_rows, response) = tokio::try_join!(copy, ack)?;
    let response = response.ok_or_else(|| {
        MoverError::HelperProtocol(format!("helper closed its stdout before acking oid {}", unit.relation_oid))
    })?;
    if !response.ok {
        return Err(MoverError::HelperProtocol(
            response.error.unwrap_or_else(|| "unknown helper failure".to_string()),
        ));
    }
    Ok(())
}

fn fail_on_any_error(outcomes: Vec<pool::PoolOutcome>) -> Result<(), Error> {
    for outcome in outcomes {
        if let Some(error) = outcome.error {
            return Err(Error::from(error));
        }
    }
    Ok(())
}
