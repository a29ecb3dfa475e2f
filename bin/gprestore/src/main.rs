use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use gpbackup_archive::{BackupConfig, FilterSet, Layout, Timestamp};
use gpbackup_catalog::CatalogConnection;
use gpbackup_orchestrator::{spawn_abort_watcher, Error, RestoreOptions, Run};

/// Restores a gpbackup archive, in whole or in part, into a target
/// database.
#[derive(Debug, Parser)]
#[command(name = "gprestore", version)]
struct Args {
    /// The 14-digit timestamp identifying which backup to restore.
    #[arg(long)]
    timestamp: String,

    /// Root directory the coordinator archive was written under; must
    /// match the `--backup-dir` the backup ran with.
    #[arg(long = "backup-dir")]
    backup_dir: Option<PathBuf>,

    /// Restore into a database other than the one the backup was taken
    /// from.
    #[arg(long = "redirect-db")]
    redirect_db: Option<String>,

    /// Create the target database before restoring into it.
    #[arg(long = "create-db")]
    create_db: bool,

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

    #[arg(long = "metadata-only", conflicts_with = "data_only")]
    metadata_only: bool,
    #[arg(long = "data-only")]
    data_only: bool,

    #[arg(long = "with-stats")]
    with_stats: bool,

    #[arg(long = "leaf-partition-data")]
    leaf_partition_data: bool,

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
            tracing::error!(error = %e, "restore failed");
            eprintln!("gprestore: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let run = Run::new(args.jobs);
    run.begin();
    let _abort_watcher = spawn_abort_watcher(Arc::clone(&run));

    let filters = args.filters().map_err(|e| Error::Config(e.to_string()))?;

    let timestamp = Timestamp::parse(&args.timestamp)
        .ok_or_else(|| Error::Config(format!("not a 14-digit timestamp: {}", args.timestamp)))?;
    let backup_dir = args
        .backup_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("/data1/gpbackup"));
    let layout = Layout::new(backup_dir, timestamp);

    let config_text = std::fs::read_to_string(layout.config_file())?;
    let config = BackupConfig::from_yaml(&config_text).map_err(Error::Archive)?;
    let target_db = args.redirect_db.clone().unwrap_or_else(|| config.database_name.clone());

    if let Some(plugin_config_path) = &args.plugin_config {
        let executable = locate_bin::locate("gpbackup_s3_plugin")
            .map_err(|e| Error::Config(e.to_string()))?;
        let handle = gpbackup_plugin::PluginHandle::new(executable, plugin_config_path.clone());
        handle.verify_installed().await?;
    }

    if args.create_db {
        let maintenance_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&connection_string("postgres"))
            .await
            .map_err(gpbackup_catalog::CatalogError::from)?;
        let maintenance = CatalogConnection::new(maintenance_pool);
        maintenance
            .execute_batch(&format!("CREATE DATABASE {};\n", gpbackup_catalog::quote_ident(&target_db)))
            .await?;
    }

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(args.jobs as u32 + 1)
        .connect(&connection_string(&target_db))
        .await
        .map_err(gpbackup_catalog::CatalogError::from)?;
    let catalog = CatalogConnection::new(pool);
    register_cancel_all_backends(&run, catalog.clone());

    let helper_executable =
        locate_bin::locate("gpbackup_helper").map_err(|e| Error::Config(e.to_string()))?;

    let options = RestoreOptions {
        layout,
        helper_executable,
        filters,
        metadata_only: args.metadata_only,
        data_only: args.data_only,
        with_stats: args.with_stats,
        leaf_partition_data: args.leaf_partition_data,
        create_db: false, // already handled above against the maintenance db
        redirect_db: args.redirect_db.clone(),
        jobs: args.jobs,
    };

    let aborting = Arc::new(AtomicBool::new(false));
    let _aborting_bridge = spawn_aborting_bridge(Arc::clone(&run), Arc::clone(&aborting));
    let result =
        gpbackup_orchestrator::run_restore(&catalog, &options, Arc::clone(&aborting), Arc::clone(&run.ledger)).await?;

    tracing::info!(
        timestamp = %args.timestamp,
        target_db = %target_db,
        tables_restored = result.tables_restored,
        metadata_only = args.metadata_only,
        data_only = args.data_only,
        with_stats = args.with_stats,
        "restore complete"
    );
    if args.with_stats {
        println!("Query planner statistics restore complete");
    }

    run.ledger.run();
    Ok(())
}

/// Registers cancellation of every other backend on `catalog`'s database
/// as a cleanup action, mirroring `gpbackup`'s own registration.
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
/// the data-movement pool polls between work units, mirroring `gpbackup`'s
/// own bridge task.
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
