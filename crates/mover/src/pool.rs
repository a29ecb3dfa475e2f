//! The bounded worker pool that drives one (table, segment) work unit per
//! task, per §4.D: "Jobs are assigned to a bounded worker pool of size J.
//! Work unit = one (table, segment) pair." and §5's "fixed set of
//! `tokio::task`s," not a thread pool.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;

use crate::error::{MoverError, Result};
use crate::pipe::{Event, SegmentPipe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    pub relation_oid: u32,
    pub content_id: i32,
}

/// Default per-table watchdog timeout, per §4.D: "if neither end
/// progresses for T (configurable, default 5 min)."
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(5 * 60);

pub struct PoolOutcome {
    pub pipe: SegmentPipe,
    pub error: Option<MoverError>,
}

/// Runs `units` through `job_count` concurrent workers, each invoking
/// `process` once (and, on a timeout or transient failure, once more) per
/// unit. `aborting` is checked between units so the signal-handling path
/// in §4.F can stop new work from starting without waiting on in-flight
/// transfers.
pub async fn run<F, Fut>(
    units: Vec<WorkUnit>,
    job_count: usize,
    watchdog: Duration,
    aborting: Arc<AtomicBool>,
    process: F,
) -> Vec<PoolOutcome>
where
    F: Fn(WorkUnit) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let job_count = job_count.max(1);
    let (tx, rx) = mpsc::channel::<WorkUnit>(units.len().max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let process = Arc::new(process);
    let results = Arc::new(tokio::sync::Mutex::new(Vec::with_capacity(units.len())));

    for unit in units {
        // The channel is sized to hold every unit up front; send can never
        // block here.
        let _ = tx.send(unit).await;
    }
    drop(tx);

    let mut workers = FuturesUnordered::new();
    for _ in 0..job_count {
        let rx = Arc::clone(&rx);
        let process = Arc::clone(&process);
        let aborting = Arc::clone(&aborting);
        let results = Arc::clone(&results);
        workers.push(tokio::spawn(async move {
            loop {
                if aborting.load(Ordering::SeqCst) {
                    break;
                }
                let unit = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(unit) = unit else { break };

                let outcome = run_one(unit, watchdog, process.as_ref()).await;
                results.lock().await.push(outcome);
            }
        }));
    }

    while workers.next().await.is_some() {}

    Arc::try_unwrap(results)
        .map(|m| m.into_inner())
        .unwrap_or_default()
}

async fn run_one<F, Fut>(unit: WorkUnit, watchdog: Duration, process: &F) -> PoolOutcome
where
    F: Fn(WorkUnit) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut pipe = SegmentPipe::new(unit.relation_oid, unit.content_id);
    let _ = pipe.transition(Event::Opened);

    // Single retry of the table only, per §4.D failure semantics.
    for attempt in 0..2 {
        let _ = pipe.transition(Event::FlushStarted);
        match tokio::time::timeout(watchdog, process(unit)).await {
            Ok(Ok(())) => {
                let _ = pipe.transition(Event::Completed);
                return PoolOutcome { pipe, error: None };
            }
            Ok(Err(error)) if attempt == 0 => {
                tracing::warn!(relation_oid = unit.relation_oid, %error, "table transfer failed, retrying once");
                pipe = SegmentPipe::new(unit.relation_oid, unit.content_id);
                let _ = pipe.transition(Event::Opened);
                continue;
            }
            Ok(Err(error)) => {
                let _ = pipe.transition(Event::Failed);
                return PoolOutcome { pipe, error: Some(error) };
            }
            Err(_elapsed) if attempt == 0 => {
                tracing::warn!(relation_oid = unit.relation_oid, "table transfer timed out, retrying once");
                pipe = SegmentPipe::new(unit.relation_oid, unit.content_id);
                let _ = pipe.transition(Event::Opened);
                continue;
            }
            Err(_elapsed) => {
                let _ = pipe.transition(Event::Failed);
                return PoolOutcome {
                    pipe,
                    error: Some(MoverError::Timeout { relation_oid: unit.relation_oid }),
                };
            }
        }
    }
    unreachable!("loop always returns within two attempts");
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_all_units_succeed() {
        let units = vec![
            WorkUnit { relation_oid: 1, content_id: 0 },
            WorkUnit { relation_oid: 2, content_id: 0 },
            WorkUnit { relation_oid: 1, content_id: 1 },
        ];
        let aborting = Arc::new(AtomicBool::new(false));

        let outcomes = run(units, 2, Duration::from_secs(1), aborting, |_unit| async { Ok(()) }).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.error.is_none()));
    }

    #[tokio::test]
    async fn test_failure_retries_once_then_fails() {
        let units = vec![WorkUnit { relation_oid: 9, content_id: 0 }];
        let aborting = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicUsize::new(0));

        let attempts_clone = Arc::clone(&attempts);
        let outcomes = run(units, 1, Duration::from_secs(1), aborting, move |_unit| {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(MoverError::HelperProtocol("boom".to_string()))
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].error.is_some());
    }

    #[tokio::test]
    async fn test_watchdog_times_out_and_fails_pipe() {
        let units = vec![WorkUnit { relation_oid: 5, content_id: 0 }];
        let aborting = Arc::new(AtomicBool::new(false));

        let outcomes = run(units, 1, Duration::from_millis(10), aborting, |_unit| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert_eq!(outcomes[0].pipe.state(), crate::pipe::State::Failed);
    }
}
