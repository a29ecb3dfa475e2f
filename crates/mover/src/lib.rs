pub mod error;
pub mod fifo;
pub mod helper;
pub mod pipe;
pub mod pool;
pub mod sequencer;

pub use error::{MoverError, Result};
pub use helper::{HelperCommand, HelperHandle, HelperResponse};
pub use pipe::{Event, SegmentPipe, State};
pub use pool::{PoolOutcome, WorkUnit, DEFAULT_WATCHDOG};
pub use sequencer::{Baton, BatonGuard};
