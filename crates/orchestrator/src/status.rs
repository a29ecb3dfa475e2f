//! The process-wide status word, per §5 "a process-wide `status` flag
//! observable by the signal handler (init/running/aborting/terminated)."
//! This is the only piece of global mutable state the orchestrator keeps;
//! everything else is threaded through a `Run` value.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Init = 0,
    Running = 1,
    Aborting = 2,
    Terminated = 3,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Status::Init,
            1 => Status::Running,
            2 => Status::Aborting,
            _ => Status::Terminated,
        }
    }
}

#[derive(Debug, Default)]
pub struct StatusWord(AtomicU8);

impl StatusWord {
    pub fn new() -> Self {
        Self(AtomicU8::new(Status::Init as u8))
    }

    pub fn load(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, status: Status) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    /// Workers call this between units and at every pipe i/o, per §5
    /// "Cancellation: cooperative ... workers check between units."
    pub fn is_aborting(&self) -> bool {
        matches!(self.load(), Status::Aborting)
    }
}
