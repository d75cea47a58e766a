//! tokio-backed [`TimerService`].
//!
//! Each wake-up is a spawned task sleeping until its deadline. The clock is
//! anchored to wall-clock UTC (via `chrono`) when the timer is created and
//! then advances with `tokio::time::Instant`, so paused-time tests see a
//! consistent clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use airdrop_core::error::TimerError;
use airdrop_core::traits::{TimerService, Waker};
use airdrop_core::types::{Timestamp, WakeToken};

#[derive(Clone)]
pub struct TokioTimer {
    handle: Handle,
    anchor_instant: Instant,
    anchor_secs: u64,
    pending: Arc<Mutex<HashMap<WakeToken, JoinHandle<()>>>>,
}

impl TokioTimer {
    /// Create a timer on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`TimerError::Unavailable`] when called outside a runtime
    pub fn new() -> Result<Self, TimerError> {
        let handle = Handle::try_current().map_err(|e| TimerError::Unavailable(e.to_string()))?;
        let anchor_secs = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        Ok(Self::with_anchor(handle, Timestamp(anchor_secs)))
    }

    /// Create a timer whose clock reads `now` at this instant.
    pub fn with_anchor(handle: Handle, now: Timestamp) -> Self {
        Self {
            handle,
            anchor_instant: Instant::now(),
            anchor_secs: now.as_secs(),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of wake-ups that have neither fired nor been cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn instant_for(&self, at: Timestamp) -> Instant {
        let offset = at.as_secs().saturating_sub(self.anchor_secs);
        self.anchor_instant + Duration::from_secs(offset)
    }
}

impl TimerService for TokioTimer {
    fn now(&self) -> Timestamp {
        let elapsed = Instant::now().saturating_duration_since(self.anchor_instant);
        Timestamp(self.anchor_secs.saturating_add(elapsed.as_secs()))
    }

    fn set_wakeup(
        &self,
        at: Timestamp,
        token: WakeToken,
        waker: Arc<dyn Waker>,
    ) -> Result<(), TimerError> {
        let deadline = self.instant_for(at);
        let clock = self.clone();

        // Held across the spawn so the task cannot observe the map before
        // its own handle is inserted.
        let mut pending = self.pending.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if clock.pending.lock().remove(&token).is_none() {
                return;
            }
            let fired_at = clock.now().max(at);
            trace!(%token, %fired_at, "wake-up firing");
            waker.wake(token, fired_at);
        });
        if let Some(previous) = pending.insert(token, task) {
            previous.abort();
        }
        debug!(%token, %at, "tokio wake-up scheduled");
        Ok(())
    }

    fn cancel(&self, token: WakeToken) -> bool {
        match self.pending.lock().remove(&token) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}
