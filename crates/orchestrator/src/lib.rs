pub mod backup;
pub mod data;
pub mod error;
pub mod filters;
pub mod incremental;
pub mod ledger;
pub mod planning;
pub mod restore;
pub mod run;
pub mod status;

pub use backup::{run_backup, BackupOptions, BackupResult};
pub use data::{assign_segment, run_backup as run_data_backup, run_restore as run_data_restore, HelperMode};
pub use error::Error;
pub use filters::resolve_tables;
pub use incremental::{ancestor_modcounts, load_history, resolve_chain, resolve_table_source, TableSource};
pub use ledger::CleanupLedger;
pub use planning::plan_restore;
pub use restore::{run_restore, RestoreOptions, RestoreResult};
pub use run::{spawn_abort_watcher, wait_for_abort_signal, Run};
pub use status::{Status, StatusWord};
