//! The campaign component and its three facets.
//!
//! One [`Campaign`] owns all mutable campaign state behind a single
//! `parking_lot::Mutex`. Callers never see that state directly; they get
//! one of three narrow views over it:
//!
//! - [`ClaimFacet`] (public): submit claims, read status and payouts
//! - [`AdminFacet`] (creator): pause, resume, re-prepare, expire early
//! - [`EpochDriver`] (timer helper): receives timer wake-ups
//!
//! The lock is only held between suspension points and never across an
//! `.await`.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info};

use airdrop_core::error::{AirdropError, ClaimError, SchedulerError, StoreError};
use airdrop_core::schedule::PayoutSchedule;
use airdrop_core::traits::{DurableStore, IdentityResolver, Settlement, TimerService, Waker};
use airdrop_core::types::{CampaignState, ClaimRecord, Hash256, Timestamp, WakeToken};

use crate::codec;
use crate::config::{CampaignConfig, ValidatedConfig};
use crate::ledger::ClaimLedger;
use crate::processor::{ClaimProcessor, ClaimRequest};
use crate::scheduler::{EpochEvent, EpochScheduler, SCHEDULE_KEY};
use crate::state_machine::CampaignStateMachine;

/// Store key for persisted [`CampaignStats`].
pub const STATS_KEY: &[u8] = b"campaign/stats";

/// Running totals for a campaign.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct CampaignStats {
    /// Claims committed to the ledger.
    pub claims_paid: u64,
    /// Sum of payouts delivered.
    pub total_distributed: u64,
    /// Sum of claim fees collected.
    pub fees_collected: u64,
    /// Reserve left for future payouts.
    pub reserve_remaining: u64,
    /// Payouts that settled without a ledger record.
    pub inconsistencies: u64,
    /// Times these totals could not be written; the copy on disk is behind.
    pub unsaved_updates: u64,
}

impl CampaignStats {
    fn new(token_supply: u64) -> Self {
        Self {
            reserve_remaining: token_supply,
            ..Self::default()
        }
    }

    pub(crate) fn record_payout(&mut self, amount: u64, fee: u64) {
        self.claims_paid += 1;
        self.total_distributed = self.total_distributed.saturating_add(amount);
        self.fees_collected = self.fees_collected.saturating_add(fee);
        self.reserve_remaining = self.reserve_remaining.saturating_sub(amount);
    }

    pub(crate) fn record_inconsistency(&mut self, amount: u64, fee: u64) {
        self.inconsistencies += 1;
        self.total_distributed = self.total_distributed.saturating_add(amount);
        self.fees_collected = self.fees_collected.saturating_add(fee);
        self.reserve_remaining = self.reserve_remaining.saturating_sub(amount);
    }
}

/// State guarded by the campaign lock.
pub(crate) struct CampaignCore {
    pub(crate) machine: CampaignStateMachine,
    pub(crate) scheduler: EpochScheduler,
    pub(crate) schedule: PayoutSchedule,
    pub(crate) ledger: ClaimLedger,
    pub(crate) stats: CampaignStats,
    /// Payout amounts held by in-flight claims.
    pub(crate) reserved_outlay: u64,
}

pub(crate) struct CampaignInner {
    pub(crate) config: ValidatedConfig,
    pub(crate) core: Mutex<CampaignCore>,
    pub(crate) store: Arc<dyn DurableStore>,
    pub(crate) timer: Arc<dyn TimerService>,
    pub(crate) settlement: Arc<dyn Settlement>,
    pub(crate) resolver: Arc<dyn IdentityResolver>,
    shutdown: watch::Sender<bool>,
}

impl CampaignInner {
    pub(crate) fn persist_stats(&self, stats: &CampaignStats) -> Result<(), StoreError> {
        self.store.set(STATS_KEY, &codec::encode(stats)?)
    }

    /// Persist `stats` after a payout, counting a failed write.
    ///
    /// The next successful write carries the in-memory totals, so a later
    /// payout repairs the copy on disk.
    pub(crate) fn save_stats(&self, stats: &mut CampaignStats) {
        if let Err(e) = self.persist_stats(stats) {
            stats.unsaved_updates += 1;
            error!(
                error = %e,
                unsaved = stats.unsaved_updates,
                reserve_remaining = stats.reserve_remaining,
                "campaign stats not persisted, totals on disk are stale"
            );
        }
    }

    fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
        info!("campaign shut down");
    }
}

/// External collaborators a campaign runs against.
#[derive(Clone)]
pub struct CampaignDeps {
    pub store: Arc<dyn DurableStore>,
    pub timer: Arc<dyn TimerService>,
    pub settlement: Arc<dyn Settlement>,
    pub resolver: Arc<dyn IdentityResolver>,
}

/// Forwards timer wake-ups to the campaign without keeping it alive.
#[derive(Default)]
struct DriverWaker {
    campaign: OnceLock<Weak<CampaignInner>>,
}

impl Waker for DriverWaker {
    fn wake(&self, token: WakeToken, fired_at: Timestamp) {
        let Some(inner) = self.campaign.get().and_then(Weak::upgrade) else {
            debug!(%token, "wake-up for a dropped campaign");
            return;
        };
        if let Err(e) = (EpochDriver { inner }).on_wake(token, fired_at) {
            error!(%token, error = %e, "epoch wake-up failed");
        }
    }
}

/// An airdrop campaign.
#[derive(Clone)]
pub struct Campaign {
    inner: Arc<CampaignInner>,
}

impl Campaign {
    /// Start a campaign, or pick up a persisted one where it stopped.
    ///
    /// A fresh store moves `Initialized -> Prepared` and arms the opening
    /// wake-up `start_delay` from now. An existing store restores status,
    /// payout schedule, scheduler progress and totals, and re-arms the
    /// pending boundary if the clock was running.
    pub fn start(config: &CampaignConfig, deps: CampaignDeps) -> Result<Self, AirdropError> {
        let config = config.validate()?;
        let CampaignDeps {
            store,
            timer,
            settlement,
            resolver,
        } = deps;

        let machine = CampaignStateMachine::open(store.clone())?;
        let schedule = match store.get(SCHEDULE_KEY)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => {
                store.set(SCHEDULE_KEY, &codec::encode(&config.schedule)?)?;
                config.schedule.clone()
            }
        };
        let stats = match store.get(STATS_KEY)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => CampaignStats::new(config.token_supply),
        };
        let waker = Arc::new(DriverWaker::default());
        let scheduler = EpochScheduler::new(
            timer.clone(),
            store.clone(),
            waker.clone(),
            config.epoch_length,
            config.target_number_of_epochs,
        )?;
        let (shutdown, _) = watch::channel(machine.status().is_terminal());

        let inner = Arc::new(CampaignInner {
            core: Mutex::new(CampaignCore {
                machine,
                scheduler,
                schedule,
                ledger: ClaimLedger::new(store.clone()),
                stats,
                reserved_outlay: 0,
            }),
            config,
            store,
            timer,
            settlement,
            resolver,
            shutdown,
        });
        let _ = waker.campaign.set(Arc::downgrade(&inner));

        {
            let mut guard = inner.core.lock();
            let core = &mut *guard;
            match core.machine.status() {
                CampaignState::Initialized => {
                    inner.persist_stats(&core.stats)?;
                    core.machine.transition_to(CampaignState::Prepared)?;
                    core.scheduler.start(inner.config.start_delay)?;
                }
                CampaignState::Expired => {}
                status => {
                    core.scheduler.restore(status, inner.config.start_delay)?;
                }
            }
            info!(
                root = %inner.config.merkle_root,
                status = %core.machine.status(),
                epoch = core.scheduler.epoch(),
                claims = core.stats.claims_paid,
                "campaign started"
            );
        }

        Ok(Self { inner })
    }

    /// Public view.
    pub fn claim_facet(&self) -> ClaimFacet {
        ClaimFacet {
            processor: ClaimProcessor::new(self.inner.clone()),
            inner: self.inner.clone(),
        }
    }

    /// Creator view.
    pub fn admin_facet(&self) -> AdminFacet {
        AdminFacet {
            inner: self.inner.clone(),
        }
    }

    /// Timer-callback view.
    pub fn epoch_driver(&self) -> EpochDriver {
        EpochDriver {
            inner: self.inner.clone(),
        }
    }

    /// Becomes `true` once the campaign has expired.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub fn status(&self) -> CampaignState {
        self.inner.core.lock().machine.status()
    }
}

/// Public surface: claims and read-only queries.
#[derive(Clone)]
pub struct ClaimFacet {
    inner: Arc<CampaignInner>,
    processor: ClaimProcessor,
}

impl ClaimFacet {
    pub async fn submit_claim(
        &self,
        request: &ClaimRequest,
    ) -> Result<ClaimRecord, ClaimError> {
        self.processor.submit_claim(request).await
    }

    pub fn status(&self) -> CampaignState {
        self.inner.core.lock().machine.status()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.core.lock().scheduler.epoch()
    }

    /// Payout per tier for the current epoch.
    pub fn payout_values(&self) -> Vec<u64> {
        self.inner.core.lock().schedule.current_amounts().to_vec()
    }

    pub fn merkle_root(&self) -> Hash256 {
        self.inner.config.merkle_root
    }

    pub fn claim_record(&self, key: &str) -> Result<Option<ClaimRecord>, StoreError> {
        self.inner.core.lock().ledger.get(key)
    }

    pub fn has_claimed(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.core.lock().ledger.has_claimed(key)
    }

    pub fn stats(&self) -> CampaignStats {
        self.inner.core.lock().stats.clone()
    }
}

/// Creator surface: lifecycle control.
#[derive(Clone)]
pub struct AdminFacet {
    inner: Arc<CampaignInner>,
}

impl AdminFacet {
    /// Move the campaign to `next` and adjust the epoch clock to match.
    ///
    /// - `-> Paused` stops the clock and remembers the time to the boundary.
    /// - `-> Open` resumes the clock, or starts epoch 0 if the window had
    ///   not opened yet.
    /// - `Paused -> Prepared` re-arms the opening if the window had not
    ///   opened yet; otherwise the clock stays stopped until `Open`.
    /// - `Open -> Expired` closes the window early and shuts down.
    ///
    /// The status change is persisted first. A clock failure afterwards is
    /// returned but does not undo it.
    pub fn set_status(&self, next: CampaignState) -> Result<(), AirdropError> {
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        let from = core.machine.status();
        core.machine.transition_to(next)?;

        let clock: Result<(), SchedulerError> = match next {
            CampaignState::Paused => core.scheduler.pause(),
            CampaignState::Open => core.scheduler.resume().map(|_| ()),
            CampaignState::Prepared if from == CampaignState::Paused => {
                core.scheduler.rearm_opening().map(|_| ())
            }
            CampaignState::Expired => {
                let finished = core.scheduler.finish();
                self.inner.signal_shutdown();
                finished
            }
            _ => Ok(()),
        };
        clock.map_err(|e| {
            error!(%from, to = %next, error = %e, "epoch clock not adjusted after status change");
            e.into()
        })
    }

    pub fn pause(&self) -> Result<(), AirdropError> {
        self.set_status(CampaignState::Paused)
    }

    pub fn resume(&self) -> Result<(), AirdropError> {
        self.set_status(CampaignState::Open)
    }

    /// Clear a halted epoch clock.
    ///
    /// While the campaign is `Open` this arms a full epoch from now, and
    /// before the window opens it arms the opening. In a stopped status the
    /// clock stays stopped until the next resume. Returns the armed token.
    pub fn recover_schedule(&self) -> Result<Option<WakeToken>, AirdropError> {
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        Ok(core.scheduler.recover(core.machine.status())?)
    }

    pub fn stats(&self) -> CampaignStats {
        self.inner.core.lock().stats.clone()
    }
}

/// Helper surface: timer callbacks.
#[derive(Clone)]
pub struct EpochDriver {
    inner: Arc<CampaignInner>,
}

impl EpochDriver {
    /// Handle a wake-up delivered by the timer service.
    pub fn on_wake(&self, token: WakeToken, fired_at: Timestamp) -> Result<EpochEvent, SchedulerError> {
        let event = {
            let mut guard = self.inner.core.lock();
            let core = &mut *guard;
            core.scheduler
                .on_fire(token, fired_at, &mut core.machine, &mut core.schedule)?
        };
        if event == EpochEvent::Expired {
            self.inner.signal_shutdown();
        }
        Ok(event)
    }

    /// Token of the pending wake-up, if any.
    pub fn pending_token(&self) -> Option<WakeToken> {
        self.inner.core.lock().scheduler.current_token()
    }

    pub fn next_boundary(&self) -> Option<Timestamp> {
        self.inner.core.lock().scheduler.next_boundary()
    }

    pub fn is_halted(&self) -> bool {
        self.inner.core.lock().scheduler.is_halted()
    }
}
