//! The cleanup ledger, per §5 "every pipe, temp file, and child process is
//! registered in a cleanup ledger at creation and deregistered on success.
//! The cleanup path is run exactly once, on any exit, success or failure"
//! and §9's "append-only ... cleanup walks it in LIFO order."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type CleanupAction = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct CleanupLedger {
    actions: Mutex<Vec<CleanupAction>>,
    ran: AtomicBool,
}

impl CleanupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a cleanup action. Never removes entries directly; a
    /// resource that completed successfully registers a no-op in its
    /// place is unnecessary -- callers instead rely on the action itself
    /// being idempotent (e.g. `fifo::remove` ignores `ENOENT`).
    pub fn register(&self, action: impl FnOnce() + Send + 'static) {
        self.actions
            .lock()
            .expect("cleanup ledger mutex is never poisoned by a panicking holder")
            .push(Box::new(action));
    }

    /// Runs every registered action in LIFO order, exactly once. A second
    /// call (e.g. both the normal exit path and a signal handler racing to
    /// clean up) is a no-op.
    pub fn run(&self) {
        if self.ran.swap(true, Ordering::SeqCst) {
            return;
        }
        let actions = std::mem::take(
            &mut *self
                .actions
                .lock()
                .expect("cleanup ledger mutex is never poisoned by a panicking holder"),
        );
        for action in actions.into_iter().rev() {
            action();
        }
    }

    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_actions_run_in_lifo_order() {
        let ledger = CleanupLedger::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            ledger.register(move || order.lock().unwrap().push(i));
        }
        ledger.run();

        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_run_is_idempotent() {
        let ledger = CleanupLedger::new();
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = Arc::clone(&calls);
        ledger.register(move || *calls_clone.lock().unwrap() += 1);

        ledger.run();
        ledger.run();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(ledger.has_run());
    }
}
