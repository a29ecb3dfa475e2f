use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use gpbackup_archive::{CompressionConfig, FilterSet, Layout, PluginConfig, Timestamp};
use gpbackup_catalog::CatalogConnection;
use gpbackup_orchestrator::{spawn_abort_watcher, BackupOptions, Error, Run};

/// Backs up a database's schema and data into a self-contained, segment-
/// parallel archive.
#[derive(Debug, Parser)]
#[command(name = "gpbackup", version)]
struct Args {
    /// Database to back up.
    #[arg(long)]
    dbname: String,

    /// Root directory the coordinator archive is written under; each
    /// segment writes to a sibling directory suffixed by its content id.
    #[arg(long = "backup-dir")]
    backup_dir: Option<PathBuf>,

    /// Multiplex every table's data into one pipe per segment instead of
    /// one file per table.
    #[arg(long = "single-data-file")]
    single_data_file: bool,

    #[arg(long = "no-compression", conflicts_with = "compression_level")]
    no_compression: bool,
    #[arg(long = "compression-level", value_parser = clap::value_parser!(u32).range(1..=9))]
    compression_level: Option<u32>,

    #[arg(long = "include-schema")]
    include_schema: Vec<String>,
    #[arg(long = "exclude-schema")]
    exclude_schema: Vec<String>,
    #[arg(long = "include-table")]
    include_table: Vec<String>,
    #[arg(long = "exclude-table")]
    exclude_table: Vec<String>,
    #[arg(long = "include-table-file")]
    include_table_file: Option<PathBuf>,
    #[arg(long = "exclude-table-file")]
    exclude_table_file: Option<PathBuf>,

    #[arg(long = "leaf-partition-data")]
    leaf_partition_data: bool,

    #[arg(long = "metadata-only", conflicts_with = "data_only")]
    metadata_only: bool,
    #[arg(long = "data-only")]
    data_only: bool,

    #[arg(long = "with-stats")]
    with_stats: bool,

    #[arg(long = "incremental", value_name = "FROM_TIMESTAMP")]
    incremental: Option<String>,

    #[arg(long = "plugin-config")]
    plugin_config: Option<PathBuf>,

    #[arg(long = "jobs", default_value_t = 1)]
    jobs: usize,

    #[arg(long)]
    verbose: bool,

    #[arg(long = "json-log-format")]
    json_log_format: bool,
}

impl Args {
    fn compression(&self) -> CompressionConfig {
        if self.no_compression {
            CompressionConfig { enabled: false, level: 0 }
        } else {
            CompressionConfig {
                enabled: true,
                level: self.compression_level.unwrap_or(1),
            }
        }
    }

    fn filters(&self) -> anyhow::Result<FilterSet> {
        let mut include_tables: BTreeSet<String> = self.include_table.iter().cloned().collect();
        let mut exclude_tables: BTreeSet<String> = self.exclude_table.iter().cloned().collect();
        if let Some(path) = &self.include_table_file {
            include_tables.extend(read_table_list(path)?);
        }
        if let Some(path) = &self.exclude_table_file {
            exclude_tables.extend(read_table_list(path)?);
        }
        Ok(FilterSet {
            include_schemas: self.include_schema.iter().cloned().collect(),
            exclude_schemas: self.exclude_schema.iter().cloned().collect(),
            include_tables,
            exclude_tables,
        })
    }
}

fn read_table_list(path: &PathBuf) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

fn connection_string(dbname: &str) -> String {
    let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
    let user = std::env::var("PGUSER").unwrap_or_else(|_| whoami_fallback());
    format!("postgres://{user}@{host}:{port}/{dbname}")
}

fn whoami_fallback() -> String {
    std::env::var("USER").unwrap_or_else(|_| "postgres".to_string())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    gpbackup_ops::init(args.json_log_format, args.verbose);

    match run(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "backup failed");
            eprintln!("gpbackup: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let run = Run::new(args.jobs);
    run.begin();
    let _abort_watcher = spawn_abort_watcher(Arc::clone(&run));

    let filters = args.filters().map_err(|e| Error::Config(e.to_string()))?;
    let compression = args.compression();

    if let Some(plugin_config_path) = &args.plugin_config {
        let executable = locate_bin::locate("gpbackup_s3_plugin")
            .map_err(|e| Error::Config(e.to_string()))?;
        let handle = gpbackup_plugin::PluginHandle::new(executable, plugin_config_path.clone());
        handle.verify_installed().await?;
    }

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(args.jobs as u32 + 1)
        .connect(&connection_string(&args.dbname))
        .await
        .map_err(gpbackup_catalog::CatalogError::from)?;
    let catalog = CatalogConnection::new(pool);
    register_cancel_all_backends(&run, catalog.clone());

    let timestamp = chrono_timestamp();
    let backup_dir = args
        .backup_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("/data1/gpbackup"));
    let layout = Layout::new(backup_dir, timestamp);

    std::fs::create_dir_all(layout.metadata_file().parent().expect("layout always has a parent"))?;

    let helper_executable =
        locate_bin::locate("gpbackup_helper").map_err(|e| Error::Config(e.to_string()))?;

    let options = BackupOptions {
        layout,
        helper_executable,
        filters,
        metadata_only: args.metadata_only,
        data_only: args.data_only,
        with_stats: args.with_stats,
        leaf_partition_data: args.leaf_partition_data,
        single_data_file: args.single_data_file,
        compression,
        jobs: args.jobs,
        incremental_from: args.incremental.clone(),
        database_name: args.dbname.clone(),
        gpbackup_version: env!("CARGO_PKG_VERSION").to_string(),
        database_version: "unknown".to_string(),
        plugin: args.plugin_config.as_ref().map(|path| PluginConfig {
            executable: "gpbackup_s3_plugin".to_string(),
            config_path: path.display().to_string(),
        }),
    };

    let aborting = Arc::new(AtomicBool::new(false));
    let _aborting_bridge = spawn_aborting_bridge(Arc::clone(&run), Arc::clone(&aborting));
    let result =
        gpbackup_orchestrator::run_backup(&catalog, &options, Arc::clone(&aborting), Arc::clone(&run.ledger)).await?;

    tracing::info!(
        timestamp = %timestamp,
        tables = result.toc.data_entries.len(),
        metadata_only = args.metadata_only,
        data_only = args.data_only,
        with_stats = args.with_stats,
        leaf_partition_data = args.leaf_partition_data,
        "backup complete"
    );

    run.ledger.run();
    Ok(())
}

/// A 14-digit timestamp for "now," matching the format `Timestamp::parse`
/// accepts.
fn chrono_timestamp() -> Timestamp {
    let now = chrono::Utc::now();
    Timestamp::parse(&now.format("%Y%m%d%H%M%S").to_string())
        .expect("chrono's %Y%m%d%H%M%S is always 14 ascii digits")
}

/// Registers cancellation of every other backend on `catalog`'s database
/// as a cleanup action, so an aborted run's in-flight probe and COPY
/// connections get `pg_cancel_backend`'d in the same LIFO walk that tears
/// down helper processes and fifos.
fn register_cancel_all_backends(run: &Arc<Run>, catalog: CatalogConnection) {
    run.ledger.register(move || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                if let Err(e) = catalog.cancel_all_backends().await {
                    tracing::warn!(error = %e, "failed to cancel in-flight backends during cleanup");
                }
            });
        });
    });
}

/// Bridges the run's process-wide status word to the plain `AtomicBool`
/// the data-movement pool polls between work units: the status word is
/// `Run`'s single source of truth, but `gpbackup_mover::pool::run` was
/// written against a bare flag so it has no dependency on the orchestrator
/// crate.
fn spawn_aborting_bridge(run: Arc<Run>, aborting: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if run.status.is_aborting() {
                aborting.store(true, std::sync::atomic::Ordering::SeqCst);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    })
}

