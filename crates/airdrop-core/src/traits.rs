//! Collaborator interfaces for airdrop campaigns.
//!
//! These traits define the boundary between the campaign core and its host:
//! - [`DurableStore`]: crash-consistent key-value storage (airdrop-node implements with RocksDB)
//! - [`TimerService`] / [`Waker`]: absolute-time wake-ups (airdrop-node implements with tokio)
//! - [`Settlement`]: all-or-nothing multi-party value transfer
//! - [`IdentityResolver`]: canonical address to delivery destination
//!
//! [`MemoryStore`](crate::store::MemoryStore) and
//! [`ManualTimer`](crate::timer::ManualTimer) are in-process implementations
//! used by tests.

use async_trait::async_trait;
use std::sync::Arc;

use crate::address::CanonicalAddress;
use crate::error::{ResolveError, SettlementError, StoreError, TimerError};
use crate::types::{Destination, SettlementReceipt, Timestamp, Transfer, WakeToken};

/// Persistent key-value storage.
///
/// A committed write must survive a process restart. Implementations must
/// make [`init`](Self::init) atomic with respect to concurrent callers.
pub trait DurableStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` under `key`, replacing any previous value.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Write `value` under `key` only if the key is absent.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] if the key is present
    fn init(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Whether `key` has a value.
    ///
    /// Default implementation delegates to [`get`](Self::get).
    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Callback invoked when a scheduled wake-up fires.
pub trait Waker: Send + Sync {
    /// `token` is the handle the wake-up was registered with; `fired_at` is
    /// the timer's clock at delivery.
    fn wake(&self, token: WakeToken, fired_at: Timestamp);
}

/// Absolute-time wake-up service.
///
/// A wake-up whose time has already passed fires at the next opportunity.
/// A cancelled token never fires.
pub trait TimerService: Send + Sync {
    /// Current time according to this service.
    fn now(&self) -> Timestamp;

    /// Schedule `waker` to be called with `token` at `at`.
    fn set_wakeup(
        &self,
        at: Timestamp,
        token: WakeToken,
        waker: Arc<dyn Waker>,
    ) -> Result<(), TimerError>;

    /// Cancel a pending wake-up. Returns `false` if `token` was not pending.
    fn cancel(&self, token: WakeToken) -> bool;
}

/// All-or-nothing multi-party value transfer.
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Apply every transfer or none of them.
    async fn settle(&self, transfers: &[Transfer]) -> Result<SettlementReceipt, SettlementError>;
}

/// Maps a claimant's canonical address to a delivery destination.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, address: &CanonicalAddress) -> Result<Destination, ResolveError>;
}
