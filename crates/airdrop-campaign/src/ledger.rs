//! Claim ledger: at most one payout per claimant key.
//!
//! Committed claims live in the durable store under `claims/<key>` and are
//! never overwritten or removed. While a claim is between validation and
//! commit, its key is held in an in-memory reservation set so that a second
//! attempt for the same key is refused before either one settles.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use airdrop_core::error::{ClaimError, StoreError};
use airdrop_core::traits::DurableStore;
use airdrop_core::types::ClaimRecord;

use crate::codec;

/// Store key prefix for committed claim records.
pub const CLAIM_KEY_PREFIX: &str = "claims/";

fn claim_key(key: &str) -> Vec<u8> {
    format!("{CLAIM_KEY_PREFIX}{key}").into_bytes()
}

pub struct ClaimLedger {
    store: Arc<dyn DurableStore>,
    reserved: HashSet<String>,
}

impl ClaimLedger {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            reserved: HashSet::new(),
        }
    }

    /// Whether a committed record exists for `key`.
    pub fn has_claimed(&self, key: &str) -> Result<bool, StoreError> {
        self.store.has(&claim_key(key))
    }

    /// Whether `key` is held by an in-flight claim.
    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved.contains(key)
    }

    /// Check that `key` has neither claimed nor been reserved, and reserve it.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::DuplicateClaim`] if the key is committed or reserved
    pub fn reserve(&mut self, key: &str) -> Result<(), ClaimError> {
        if self.is_reserved(key) || self.has_claimed(key)? {
            return Err(ClaimError::DuplicateClaim(key.to_string()));
        }
        self.reserved.insert(key.to_string());
        debug!(key, "claim key reserved");
        Ok(())
    }

    /// Drop a reservation. Returns `false` if `key` was not reserved.
    pub fn release(&mut self, key: &str) -> bool {
        self.reserved.remove(key)
    }

    /// Commit `record` under `key`.
    ///
    /// Uses the store's insert-if-absent, so the first record written for a
    /// key is the one that stays. Any reservation for `key` is cleared on
    /// success.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::DuplicateClaim`] if a record already exists
    /// - [`ClaimError::Store`] on any other storage failure
    pub fn record_claim(&mut self, key: &str, record: &ClaimRecord) -> Result<(), ClaimError> {
        let bytes = codec::encode(record)?;
        match self.store.init(&claim_key(key), &bytes) {
            Ok(()) => {
                self.reserved.remove(key);
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => Err(ClaimError::DuplicateClaim(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Committed record for `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<ClaimRecord>, StoreError> {
        self.store
            .get(&claim_key(key))?
            .map(|bytes| codec::decode(&bytes))
            .transpose()
    }

    /// Number of in-flight reservations.
    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }
}
