//! The `Run` context: the single place connection handles, job counts, and
//! shared cleanup/status state live, per §9 "Global mutable state ->
//! orchestrator-scoped context. Avoid process-wide singletons for
//! connection, flags, logger. Thread them through an immutable `Run`
//! value."

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::ledger::CleanupLedger;
use crate::status::{Status, StatusWord};

/// Everything a worker needs to know about the run it's part of. Built
/// once per invocation of `gpbackup`/`gprestore` and passed down by
/// reference; nothing here is a global. `ledger` is an `Arc` (rather than
/// a plain field borrowed by reference) because work-unit tasks spawned
/// onto the data-movement pool need to register their own cleanup actions
/// (fifo removal) and must own a handle that outlives the borrow of `Run`
/// itself.
pub struct Run {
    pub status: StatusWord,
    pub ledger: Arc<CleanupLedger>,
    pub jobs: usize,
}

impl Run {
    pub fn new(jobs: usize) -> Arc<Self> {
        Arc::new(Self {
            status: StatusWord::new(),
            ledger: Arc::new(CleanupLedger::new()),
            jobs: jobs.max(1),
        })
    }

    pub fn begin(&self) {
        self.status.store(Status::Running);
    }
}

/// Waits for SIGINT or SIGTERM. Returns once either arrives; callers use
/// this in a `tokio::select!` against the run's normal work future.
pub async fn wait_for_abort_signal() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

/// Spawns the background task that watches for SIGINT/SIGTERM and drives
/// the ABORTING transition of §4.F: refuse new work (status flip is
/// enough; workers check it), run the cleanup ledger in LIFO order, print
/// the exact `Cleanup complete` line §8 property 7 checks for, and exit
/// with status 2. This task never itself calls `pg_cancel_backend` or
/// sends `ABORT` to helpers -- those are registered as ledger actions by
/// whatever opened the connection or helper (see `CatalogConnection::
/// cancel_all_backends` registered in `bin/gpbackup`/`bin/gprestore`, and
/// each helper's SIGTERM action registered in `SegmentHelpers::spawn`), so
/// they run in the same LIFO walk as every other resource.
pub fn spawn_abort_watcher(run: Arc<Run>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if wait_for_abort_signal().await.is_err() {
            return;
        }
        run.status.store(Status::Aborting);
        run.ledger.run();
        run.status.store(Status::Terminated);
        println!("Cleanup complete");
        std::process::exit(2);
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_run_begins_in_running_state_after_begin() {
        let run = Run::new(4);
        assert_eq!(run.status.load(), Status::Init);
        run.begin();
        assert_eq!(run.status.load(), Status::Running);
    }

    #[test]
    fn test_jobs_is_never_zero() {
        assert_eq!(Run::new(0).jobs, 1);
    }
}
