use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Where a negotiation thread stands. Threads are keyed by the id of the
/// envelope that opened them (the correlation id); there is no implicit
/// last-message-wins state anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    AwaitingOffer,
    AwaitingNegotiationResult,
    AwaitingConfirmation,
    Done,
    Failed,
}

impl ThreadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ThreadState::Done | ThreadState::Failed)
    }
}

fn legal_transition(from: ThreadState, to: ThreadState) -> bool {
    use ThreadState::*;
    matches!(
        (from, to),
        (AwaitingOffer, AwaitingConfirmation)
            | (AwaitingOffer, AwaitingNegotiationResult)
            | (AwaitingOffer, Failed)
            | (AwaitingNegotiationResult, AwaitingConfirmation)
            | (AwaitingNegotiationResult, Failed)
            | (AwaitingConfirmation, Done)
    )
}

/// Map from correlation id to thread state, validating every transition.
#[derive(Debug, Default)]
pub struct SessionStore {
    threads: HashMap<Uuid, ThreadState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new thread in `AwaitingOffer`.
    pub fn open(&mut self, correlation_id: Uuid) -> Result<()> {
        if self.threads.contains_key(&correlation_id) {
            return Err(ProtocolError::Session(format!(
                "thread {} already open",
                correlation_id
            )));
        }
        self.threads.insert(correlation_id, ThreadState::AwaitingOffer);
        Ok(())
    }

    pub fn state(&self, correlation_id: Uuid) -> Option<ThreadState> {
        self.threads.get(&correlation_id).copied()
    }

    /// Move a thread to a new state, rejecting transitions the protocol does
    /// not allow.
    pub fn transition(&mut self, correlation_id: Uuid, to: ThreadState) -> Result<()> {
        let state = self.threads.get_mut(&correlation_id).ok_or_else(|| {
            ProtocolError::Session(format!("unknown thread {}", correlation_id))
        })?;
        if !legal_transition(*state, to) {
            return Err(ProtocolError::Session(format!(
                "cannot move thread {} from {:?} to {:?}",
                correlation_id, state, to
            )));
        }
        *state = to;
        Ok(())
    }

    /// Correlation ids of threads that have not reached a terminal state.
    pub fn active_threads(&self) -> Vec<Uuid> {
        self.threads
            .iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_negotiated_path() {
        let mut store = SessionStore::new();
        let id = Uuid::new_v4();

        store.open(id).unwrap();
        assert_eq!(store.state(id), Some(ThreadState::AwaitingOffer));

        store
            .transition(id, ThreadState::AwaitingNegotiationResult)
            .unwrap();
        store
            .transition(id, ThreadState::AwaitingConfirmation)
            .unwrap();
        store.transition(id, ThreadState::Done).unwrap();
        assert!(store.state(id).unwrap().is_terminal());
    }

    #[test]
    fn test_direct_acceptance_path() {
        let mut store = SessionStore::new();
        let id = Uuid::new_v4();

        store.open(id).unwrap();
        store
            .transition(id, ThreadState::AwaitingConfirmation)
            .unwrap();
        store.transition(id, ThreadState::Done).unwrap();
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut store = SessionStore::new();
        let id = Uuid::new_v4();
        store.open(id).unwrap();

        // Cannot confirm a thread that was never accepted or paid.
        assert!(store.transition(id, ThreadState::Done).is_err());

        store.transition(id, ThreadState::Failed).unwrap();
        // Terminal states stay terminal.
        assert!(store
            .transition(id, ThreadState::AwaitingOffer)
            .is_err());
    }

    #[test]
    fn test_unknown_thread_is_an_error() {
        let mut store = SessionStore::new();
        assert!(store
            .transition(Uuid::new_v4(), ThreadState::Done)
            .is_err());
    }

    #[test]
    fn test_duplicate_open_rejected() {
        let mut store = SessionStore::new();
        let id = Uuid::new_v4();
        store.open(id).unwrap();
        assert!(store.open(id).is_err());
    }

    #[test]
    fn test_active_threads() {
        let mut store = SessionStore::new();
        let open_id = Uuid::new_v4();
        let done_id = Uuid::new_v4();

        store.open(open_id).unwrap();
        store.open(done_id).unwrap();
        store
            .transition(done_id, ThreadState::AwaitingConfirmation)
            .unwrap();
        store.transition(done_id, ThreadState::Done).unwrap();

        assert_eq!(store.active_threads(), vec![open_id]);
    }
}
