//! `SegmentPipe`: the explicit state machine for one (table, segment) data
//! transfer, per §9 "Two-process duplex pipe -> explicit state machine" and
//! §4.D's model of a named pipe shared between the database's `COPY ...
//! PROGRAM` and a helper subprocess.

use crate::error::{MoverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Open,
    Flushing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The named pipe has been created and the helper has been told to
    /// open it.
    Opened,
    /// The database (or the archive, on restore) has finished writing and
    /// the helper is draining the remainder.
    FlushStarted,
    /// The helper reported a clean `oid ok` completion.
    Completed,
    /// Any non-zero exit, `COPY` error, plugin error, or watchdog timeout.
    Failed,
}

/// One (table, segment) unit's transfer state. `transition` rejects any
/// move the state machine doesn't allow, so a caller can never silently
/// treat a pipe as further along than it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPipe {
    relation_oid: u32,
    content_id: i32,
    state: State,
}

impl SegmentPipe {
    pub fn new(relation_oid: u32, content_id: i32) -> Self {
        Self {
            relation_oid,
            content_id,
            state: State::Pending,
        }
    }

    pub fn relation_oid(&self) -> u32 {
        self.relation_oid
    }

    pub fn content_id(&self) -> i32 {
        self.content_id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Done | State::Failed)
    }

    pub fn transition(&mut self, event: Event) -> Result<()> {
        let next = match (self.state, event) {
            (State::Pending, Event::Opened) => State::Open,
            (State::Open, Event::FlushStarted) => State::Flushing,
            (State::Flushing, Event::Completed) => State::Done,
            // A failure can be observed from any non-terminal state: a
            // watchdog timeout, a helper crash, or a plugin error can land
            // at any point in the transfer.
            (State::Pending | State::Open | State::Flushing, Event::Failed) => State::Failed,
            (from, event) => return Err(MoverError::IllegalTransition { from, event }),
        };
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut pipe = SegmentPipe::new(16412, 0);
        pipe.transition(Event::Opened).unwrap();
        assert_eq!(pipe.state(), State::Open);
        pipe.transition(Event::FlushStarted).unwrap();
        assert_eq!(pipe.state(), State::Flushing);
        pipe.transition(Event::Completed).unwrap();
        assert_eq!(pipe.state(), State::Done);
        assert!(pipe.is_terminal());
    }

    #[test]
    fn test_failure_from_any_non_terminal_state() {
        for event_sequence in [vec![], vec![Event::Opened], vec![Event::Opened, Event::FlushStarted]] {
            let mut pipe = SegmentPipe::new(1, 0);
            for event in event_sequence {
                pipe.transition(event).unwrap();
            }
            pipe.transition(Event::Failed).unwrap();
            assert_eq!(pipe.state(), State::Failed);
        }
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut pipe = SegmentPipe::new(1, 0);
        let err = pipe.transition(Event::Completed).unwrap_err();
        assert!(matches!(err, MoverError::IllegalTransition { .. }));
    }

    #[test]
    fn test_terminal_states_accept_no_further_events() {
        let mut pipe = SegmentPipe::new(1, 0);
        pipe.transition(Event::Opened).unwrap();
        pipe.transition(Event::FlushStarted).unwrap();
        pipe.transition(Event::Completed).unwrap();
        assert!(pipe.transition(Event::Failed).is_err());
    }
}
