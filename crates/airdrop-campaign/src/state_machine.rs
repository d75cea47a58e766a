//! Campaign lifecycle state machine.
//!
//! The status is a single persisted scalar. The only legal transitions are:
//!
//! ```text
//! Initialized -> Prepared
//! Prepared    -> Open | Paused
//! Open        -> Expired | Paused
//! Paused      -> Open | Prepared
//! Expired     -> (terminal)
//! ```
//!
//! `Restarting` can be loaded from storage but has no edges in or out.

use std::sync::Arc;

use tracing::{debug, info};

use airdrop_core::error::TransitionError;
use airdrop_core::traits::DurableStore;
use airdrop_core::types::CampaignState;

use crate::codec;

/// Store key holding the persisted [`CampaignState`].
pub const STATUS_KEY: &[u8] = b"campaign/status";

/// Legal successors of `state`.
pub fn allowed_successors(state: CampaignState) -> &'static [CampaignState] {
    use CampaignState::*;
    match state {
        Initialized => &[Prepared],
        Prepared => &[Open, Paused],
        Open => &[Expired, Paused],
        Paused => &[Open, Prepared],
        Restarting | Expired => &[],
    }
}

/// Store-backed lifecycle controller.
pub struct CampaignStateMachine {
    status: CampaignState,
    store: Arc<dyn DurableStore>,
}

impl CampaignStateMachine {
    /// Load the persisted status, or persist `Initialized` if there is none.
    pub fn open(store: Arc<dyn DurableStore>) -> Result<Self, TransitionError> {
        let status = match store.get(STATUS_KEY)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => {
                let initial = CampaignState::Initialized;
                store.set(STATUS_KEY, &codec::encode(&initial)?)?;
                initial
            }
        };
        debug!(%status, "campaign state loaded");
        Ok(Self { status, store })
    }

    pub fn status(&self) -> CampaignState {
        self.status
    }

    pub fn can_transition_to(&self, next: CampaignState) -> bool {
        allowed_successors(self.status).contains(&next)
    }

    /// Move to `next`.
    ///
    /// The new status is written to the store before the in-memory mirror
    /// changes, so a failed write leaves the machine where it was.
    ///
    /// # Errors
    ///
    /// - [`TransitionError::Illegal`] if `next` is not a legal successor
    /// - [`TransitionError::Store`] if the write fails
    pub fn transition_to(&mut self, next: CampaignState) -> Result<(), TransitionError> {
        if !self.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: next,
            });
        }
        self.store.set(STATUS_KEY, &codec::encode(&next)?)?;
        info!(from = %self.status, to = %next, "campaign state transition");
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airdrop_core::error::StoreError;
    use airdrop_core::store::MemoryStore;
    use proptest::prelude::*;
    use CampaignState::*;

    struct ReadOnlyStore(MemoryStore);

    impl DurableStore for ReadOnlyStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            self.0.get(key)
        }
        fn set(&self, _key: &[u8], _value: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Backend("read-only".into()))
        }
        fn init(&self, _key: &[u8], _value: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Backend("read-only".into()))
        }
    }

    fn machine_in(state: CampaignState) -> CampaignStateMachine {
        let store = MemoryStore::new();
        store.set(STATUS_KEY, &codec::encode(&state).unwrap()).unwrap();
        CampaignStateMachine::open(Arc::new(store)).unwrap()
    }

    #[test]
    fn fresh_store_starts_initialized() {
        let store = MemoryStore::new();
        let machine = CampaignStateMachine::open(Arc::new(store.clone())).unwrap();
        assert_eq!(machine.status(), Initialized);
        assert!(store.has(STATUS_KEY).unwrap());
    }

    #[test]
    fn full_lifecycle() {
        let mut m = machine_in(Initialized);
        for next in [Prepared, Paused, Prepared, Open, Paused, Open, Expired] {
            m.transition_to(next).unwrap();
            assert_eq!(m.status(), next);
        }
    }

    #[test]
    fn status_survives_reopen() {
        let store = MemoryStore::new();
        let mut m = CampaignStateMachine::open(Arc::new(store.clone())).unwrap();
        m.transition_to(Prepared).unwrap();
        m.transition_to(Open).unwrap();
        drop(m);
        let reopened = CampaignStateMachine::open(Arc::new(store)).unwrap();
        assert_eq!(reopened.status(), Open);
    }

    #[test]
    fn expired_is_terminal() {
        let mut m = machine_in(Expired);
        for next in CampaignState::ALL {
            assert!(!m.can_transition_to(next));
            assert!(m.transition_to(next).is_err());
        }
        assert_eq!(m.status(), Expired);
    }

    #[test]
    fn restarting_has_no_edges() {
        assert!(allowed_successors(Restarting).is_empty());
        for state in CampaignState::ALL {
            assert!(!allowed_successors(state).contains(&Restarting));
        }
    }

    #[test]
    fn failed_write_leaves_status_unchanged() {
        let inner = MemoryStore::new();
        inner.set(STATUS_KEY, &codec::encode(&Prepared).unwrap()).unwrap();
        let mut m = CampaignStateMachine::open(Arc::new(ReadOnlyStore(inner))).unwrap();
        assert!(matches!(m.transition_to(Open), Err(TransitionError::Store(_))));
        assert_eq!(m.status(), Prepared);
    }

    #[test]
    fn corrupted_status_is_a_codec_error() {
        let store = MemoryStore::new();
        store.set(STATUS_KEY, &[0xff, 0xff]).unwrap();
        assert!(matches!(
            CampaignStateMachine::open(Arc::new(store)),
            Err(TransitionError::Store(StoreError::Codec(_)))
        ));
    }

    fn any_state() -> impl Strategy<Value = CampaignState> {
        prop::sample::select(CampaignState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn illegal_transitions_fail_without_effect(from in any_state(), to in any_state()) {
            let mut m = machine_in(from);
            let legal = allowed_successors(from).contains(&to);
            prop_assert_eq!(m.can_transition_to(to), legal);
            match m.transition_to(to) {
                Ok(()) => {
                    prop_assert!(legal);
                    prop_assert_eq!(m.status(), to);
                }
                Err(e) => {
                    prop_assert!(!legal);
                    prop_assert_eq!(e, TransitionError::Illegal { from, to });
                    prop_assert_eq!(m.status(), from);
                }
            }
        }
    }
}
