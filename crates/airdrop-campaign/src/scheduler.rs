//! Timer-driven epoch advancement.
//!
//! The scheduler owns at most one live [`WakeToken`]. Arming a new wake-up
//! swaps the held token out and cancels it in the same `&mut self` call, so
//! there is no moment at which two tokens are live or the held token is
//! stale.
//!
//! Epoch lifecycle, for `target` epochs of length `L`:
//!
//! - Preparation arms the opening wake at `now + start_delay`.
//! - The opening fire moves the campaign to `Open` at epoch 0 and arms `fired_at + L`.
//! - Each later fire either advances to the next epoch (halving the payout
//!   schedule) and re-arms, or, once epoch `target - 1` has run, moves the
//!   campaign to `Expired`.
//!
//! Pausing stores the time left until the next boundary as a
//! [`RelativeTime`]; resuming re-arms at `resume_time + remaining`.
//!
//! Any failure that leaves the clock without a live wake-up while it should
//! be running halts the scheduler. A halted scheduler arms nothing until
//! [`recover`](EpochScheduler::recover) is called, and the halt is persisted
//! so a restart reports it too.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use airdrop_core::error::{SchedulerError, StoreError};
use airdrop_core::schedule::PayoutSchedule;
use airdrop_core::traits::{DurableStore, TimerService, Waker};
use airdrop_core::types::{CampaignState, RelativeTime, Timestamp, WakeToken};

use crate::codec;
use crate::state_machine::CampaignStateMachine;

/// Store key for the persisted [`SchedulerSnapshot`].
pub const SCHEDULER_KEY: &[u8] = b"campaign/scheduler";
/// Store key for the persisted [`PayoutSchedule`].
pub const SCHEDULE_KEY: &[u8] = b"campaign/schedule";

/// Where the scheduler is in the campaign's life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum SchedulerPhase {
    /// The claim window has not opened yet.
    AwaitingOpen,
    /// Epochs are running.
    Running,
    /// The campaign expired. Nothing is ever armed again.
    Finished,
}

/// What a delivered wake-up did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochEvent {
    /// The token was not the live one (cancelled or superseded).
    Stale,
    /// The claim window opened at epoch 0.
    Opened,
    /// A new epoch began.
    Advanced { epoch: u64 },
    /// The final epoch ended and the campaign expired.
    Expired,
}

/// Durable scheduler progress.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct SchedulerSnapshot {
    pub phase: SchedulerPhase,
    pub epoch: u64,
    pub next_boundary: Option<Timestamp>,
    pub remaining: Option<RelativeTime>,
    pub last_fired: Option<Timestamp>,
    pub halted: bool,
}

impl Default for SchedulerSnapshot {
    fn default() -> Self {
        Self {
            phase: SchedulerPhase::AwaitingOpen,
            epoch: 0,
            next_boundary: None,
            remaining: None,
            last_fired: None,
            halted: false,
        }
    }
}

pub struct EpochScheduler {
    timer: Arc<dyn TimerService>,
    store: Arc<dyn DurableStore>,
    waker: Arc<dyn Waker>,
    epoch_length: RelativeTime,
    target_number_of_epochs: u64,
    current: Option<WakeToken>,
    next_token: u64,
    state: SchedulerSnapshot,
}

impl EpochScheduler {
    /// Create a scheduler, restoring persisted progress if present.
    ///
    /// No wake-up is armed; see [`restore`](Self::restore) and
    /// [`start`](Self::start).
    pub fn new(
        timer: Arc<dyn TimerService>,
        store: Arc<dyn DurableStore>,
        waker: Arc<dyn Waker>,
        epoch_length: RelativeTime,
        target_number_of_epochs: u64,
    ) -> Result<Self, StoreError> {
        let state = match store.get(SCHEDULER_KEY)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => SchedulerSnapshot::default(),
        };
        Ok(Self {
            timer,
            store,
            waker,
            epoch_length,
            target_number_of_epochs,
            current: None,
            next_token: 1,
            state,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.state.epoch
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.state.phase
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    /// The live token, if any.
    pub fn current_token(&self) -> Option<WakeToken> {
        self.current
    }

    /// Absolute time of the next armed boundary.
    pub fn next_boundary(&self) -> Option<Timestamp> {
        self.state.next_boundary
    }

    /// Time left to the boundary at the moment of the last pause.
    pub fn remaining(&self) -> Option<RelativeTime> {
        self.state.remaining
    }

    pub fn last_fired(&self) -> Option<Timestamp> {
        self.state.last_fired
    }

    pub fn snapshot(&self) -> &SchedulerSnapshot {
        &self.state
    }

    /// Arm a wake-up at `at`, cancelling whichever token was live.
    pub fn arm_wakeup(&mut self, at: Timestamp) -> Result<WakeToken, SchedulerError> {
        let token = WakeToken(self.next_token);
        self.next_token += 1;
        if let Some(old) = self.current.replace(token) {
            self.timer.cancel(old);
        }
        if let Err(e) = self.timer.set_wakeup(at, token, self.waker.clone()) {
            self.current = None;
            return Err(e.into());
        }
        self.state.next_boundary = Some(at);
        debug!(%token, %at, "wake-up armed");
        Ok(token)
    }

    /// Cancel the live token, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            self.timer.cancel(token);
            debug!(%token, "wake-up cancelled");
        }
    }

    /// Arm the opening wake-up `start_delay` from now.
    ///
    /// If the wake-up cannot be armed the scheduler is halted.
    pub fn start(&mut self, start_delay: RelativeTime) -> Result<WakeToken, SchedulerError> {
        let at = self.timer.now() + start_delay;
        self.state = SchedulerSnapshot::default();
        let token = self.arm_wakeup(at).map_err(|e| self.halt(e))?;
        self.persist()?;
        info!(opens_at = %at, "claim window opening scheduled");
        Ok(token)
    }

    /// Re-arm after a process restart.
    ///
    /// Re-arms at the persisted absolute boundary when the campaign is in a
    /// state where the clock runs; a boundary already in the past fires
    /// immediately. A running clock with no persisted boundary (the process
    /// stopped between a status change and the scheduler's own write) is
    /// re-armed from now: the remembered remaining time, else `start_delay`
    /// before the window opens, else a full epoch. Returns `None` when
    /// nothing needs arming.
    pub fn restore(
        &mut self,
        status: CampaignState,
        start_delay: RelativeTime,
    ) -> Result<Option<WakeToken>, SchedulerError> {
        if self.state.halted {
            warn!(epoch = self.state.epoch, "epoch advancement was halted before restart");
            return Ok(None);
        }
        if !clock_runs(status, self.state.phase) {
            return Ok(None);
        }
        let at = match self.state.next_boundary {
            Some(at) => at,
            None => {
                let default_wait = match self.state.phase {
                    SchedulerPhase::AwaitingOpen => start_delay,
                    _ => self.epoch_length,
                };
                let wait = self.state.remaining.take().unwrap_or(default_wait);
                warn!(epoch = self.state.epoch, ?wait, "no boundary persisted, re-arming from now");
                self.timer.now() + wait
            }
        };
        let token = self.arm_wakeup(at).map_err(|e| self.halt(e))?;
        self.persist()?;
        info!(epoch = self.state.epoch, %at, "scheduler restored");
        Ok(Some(token))
    }

    /// Handle a delivered wake-up.
    ///
    /// Tokens other than the live one are ignored. On a live token the
    /// firing time is recorded, then the campaign opens, advances an epoch
    /// or expires. `schedule` is replaced with the advanced table and
    /// persisted before the scheduler's own progress.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::RearmFailed`] if the next boundary cannot be
    ///   armed
    /// - [`SchedulerError::Transition`] if the state machine refuses the move
    /// - [`SchedulerError::Store`] if progress cannot be written
    ///
    /// The live token is spent by then, so every error halts the scheduler.
    pub fn on_fire(
        &mut self,
        token: WakeToken,
        fired_at: Timestamp,
        machine: &mut CampaignStateMachine,
        schedule: &mut PayoutSchedule,
    ) -> Result<EpochEvent, SchedulerError> {
        if self.current != Some(token) {
            debug!(%token, "stale wake-up ignored");
            return Ok(EpochEvent::Stale);
        }
        self.current = None;
        self.state.last_fired = Some(fired_at);
        self.state.next_boundary = None;
        self.advance(fired_at, machine, schedule)
            .map_err(|e| self.halt(e))
    }

    fn advance(
        &mut self,
        fired_at: Timestamp,
        machine: &mut CampaignStateMachine,
        schedule: &mut PayoutSchedule,
    ) -> Result<EpochEvent, SchedulerError> {
        match self.state.phase {
            SchedulerPhase::AwaitingOpen => {
                machine.transition_to(CampaignState::Open)?;
                self.state.phase = SchedulerPhase::Running;
                self.state.epoch = 0;
                info!(%fired_at, "claim window open, epoch 0");
                self.rearm(fired_at + self.epoch_length)?;
                Ok(EpochEvent::Opened)
            }
            SchedulerPhase::Running => {
                let next = self.state.epoch.saturating_add(1);
                if next >= self.target_number_of_epochs {
                    machine.transition_to(CampaignState::Expired)?;
                    self.state.phase = SchedulerPhase::Finished;
                    self.persist()?;
                    info!(epochs = next, %fired_at, "final epoch ended, claim window expired");
                    return Ok(EpochEvent::Expired);
                }
                let advanced = schedule.advance_epoch();
                self.store.set(SCHEDULE_KEY, &codec::encode(&advanced)?)?;
                *schedule = advanced;
                self.state.epoch = next;
                info!(
                    epoch = next,
                    payouts = ?schedule.current_amounts(),
                    "epoch advanced"
                );
                self.rearm(fired_at + self.epoch_length)?;
                Ok(EpochEvent::Advanced { epoch: next })
            }
            SchedulerPhase::Finished => Ok(EpochEvent::Stale),
        }
    }

    /// Stop the clock, remembering the time left to the next boundary.
    pub fn pause(&mut self) -> Result<(), SchedulerError> {
        let now = self.timer.now();
        if self.current.is_some() {
            if let Some(boundary) = self.state.next_boundary {
                self.state.remaining = Some(boundary - now);
            }
        }
        self.cancel();
        self.state.next_boundary = None;
        self.persist()?;
        info!(remaining = ?self.state.remaining, "epoch clock paused");
        Ok(())
    }

    /// Restart the clock after the campaign enters `Open`.
    ///
    /// If the window has not opened yet, epoch 0 starts now. Otherwise the
    /// remembered remaining time is re-armed from now. A failure to arm
    /// halts the scheduler.
    pub fn resume(&mut self) -> Result<WakeToken, SchedulerError> {
        if self.state.halted {
            return Err(SchedulerError::Halted);
        }
        let now = self.timer.now();
        let at = match self.state.phase {
            SchedulerPhase::AwaitingOpen => {
                self.state.phase = SchedulerPhase::Running;
                self.state.epoch = 0;
                self.state.remaining = None;
                info!(%now, "claim window opened early, epoch 0");
                now + self.epoch_length
            }
            SchedulerPhase::Running => {
                let remaining = self
                    .state
                    .remaining
                    .ok_or(SchedulerError::NothingToResume)?;
                now + remaining
            }
            SchedulerPhase::Finished => return Err(SchedulerError::NothingToResume),
        };
        let token = self.arm_wakeup(at).map_err(|e| self.halt(e))?;
        self.state.remaining = None;
        self.persist()?;
        info!(epoch = self.state.epoch, next_boundary = %at, "epoch clock resumed");
        Ok(token)
    }

    /// Re-arm the opening wake-up with the remembered remaining time.
    ///
    /// Only applies when the pause began before the window opened; returns
    /// `None` otherwise.
    pub fn rearm_opening(&mut self) -> Result<Option<WakeToken>, SchedulerError> {
        if self.state.halted || self.state.phase != SchedulerPhase::AwaitingOpen {
            return Ok(None);
        }
        let Some(remaining) = self.state.remaining else {
            return Ok(None);
        };
        let at = self.timer.now() + remaining;
        let token = self.arm_wakeup(at).map_err(|e| self.halt(e))?;
        self.state.remaining = None;
        self.persist()?;
        info!(opens_at = %at, "claim window opening re-scheduled");
        Ok(Some(token))
    }

    /// Stop for good after the campaign expired early.
    pub fn finish(&mut self) -> Result<(), SchedulerError> {
        self.cancel();
        self.state.phase = SchedulerPhase::Finished;
        self.state.next_boundary = None;
        self.state.remaining = None;
        self.persist()?;
        Ok(())
    }

    /// Clear a halt, re-arming only if the clock should be running.
    ///
    /// With `status` `Open` the next boundary is a full epoch from now; with
    /// `Prepared` and the window not yet open, the opening fires after the
    /// remembered remaining time, or immediately. In any other live status
    /// (`Paused`, or `Prepared` after opening) only the halt is cleared and a
    /// remaining time is kept for the next resume. A running clock that was
    /// never halted is left as it is.
    pub fn recover(&mut self, status: CampaignState) -> Result<Option<WakeToken>, SchedulerError> {
        if self.state.phase == SchedulerPhase::Finished
            || matches!(
                status,
                CampaignState::Initialized | CampaignState::Restarting | CampaignState::Expired
            )
        {
            return Err(SchedulerError::NothingToResume);
        }
        if !clock_runs(status, self.state.phase) {
            if self.state.remaining.is_none() {
                self.state.remaining = Some(match self.state.phase {
                    SchedulerPhase::Running => self.epoch_length,
                    _ => RelativeTime(0),
                });
            }
            self.state.halted = false;
            self.persist()?;
            info!(%status, remaining = ?self.state.remaining, "epoch halt cleared, clock stays stopped");
            return Ok(None);
        }
        if !self.state.halted && self.current.is_some() {
            return Ok(self.current);
        }
        let now = self.timer.now();
        let at = match self.state.phase {
            SchedulerPhase::AwaitingOpen => now + self.state.remaining.unwrap_or(RelativeTime(0)),
            _ => now + self.epoch_length,
        };
        let token = self.arm_wakeup(at).map_err(|e| self.halt(e))?;
        self.state.halted = false;
        self.state.remaining = None;
        self.persist()?;
        info!(epoch = self.state.epoch, next_boundary = %at, "epoch advancement recovered");
        Ok(Some(token))
    }

    fn rearm(&mut self, at: Timestamp) -> Result<(), SchedulerError> {
        self.arm_wakeup(at)?;
        self.persist()?;
        Ok(())
    }

    /// Mark advancement halted after `cause` left no live wake-up.
    fn halt(&mut self, cause: SchedulerError) -> SchedulerError {
        self.cancel();
        self.state.halted = true;
        self.state.next_boundary = None;
        if let Err(e) = self.persist() {
            error!(error = %e, "halt not persisted");
        }
        error!(
            epoch = self.state.epoch,
            phase = ?self.state.phase,
            error = %cause,
            "epoch advancement halted"
        );
        match cause {
            SchedulerError::Timer(e) => SchedulerError::RearmFailed(e),
            other => other,
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        self.store.set(SCHEDULER_KEY, &codec::encode(&self.state)?)
    }
}

fn clock_runs(status: CampaignState, phase: SchedulerPhase) -> bool {
    matches!(
        (status, phase),
        (CampaignState::Prepared, SchedulerPhase::AwaitingOpen)
            | (CampaignState::Open, SchedulerPhase::Running)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use airdrop_core::store::MemoryStore;
    use airdrop_core::timer::ManualTimer;
    use parking_lot::Mutex;

    const LEN: u64 = 100;

    #[derive(Default)]
    struct Inbox(Mutex<Vec<(WakeToken, Timestamp)>>);

    impl Waker for Inbox {
        fn wake(&self, token: WakeToken, fired_at: Timestamp) {
            self.0.lock().push((token, fired_at));
        }
    }

    struct Fixture {
        timer: ManualTimer,
        store: MemoryStore,
        inbox: Arc<Inbox>,
        scheduler: EpochScheduler,
        machine: CampaignStateMachine,
        schedule: PayoutSchedule,
    }

    impl Fixture {
        fn new(target: u64) -> Self {
            let timer = ManualTimer::new(Timestamp(1_000));
            let store = MemoryStore::new();
            let inbox = Arc::new(Inbox::default());
            let scheduler = EpochScheduler::new(
                Arc::new(timer.clone()),
                Arc::new(store.clone()),
                inbox.clone(),
                RelativeTime(LEN),
                target,
            )
            .unwrap();
            let mut machine = CampaignStateMachine::open(Arc::new(store.clone())).unwrap();
            machine.transition_to(CampaignState::Prepared).unwrap();
            Self {
                timer,
                store,
                inbox,
                scheduler,
                machine,
                schedule: PayoutSchedule::initialize(&[9_000_000, 1_000]).unwrap(),
            }
        }

        /// Advance the clock and feed every delivered wake-up back in.
        fn advance_to(&mut self, t: u64) -> Vec<EpochEvent> {
            self.timer.advance_to(Timestamp(t));
            let delivered: Vec<_> = self.inbox.0.lock().drain(..).collect();
            delivered
                .into_iter()
                .map(|(token, at)| {
                    self.scheduler
                        .on_fire(token, at, &mut self.machine, &mut self.schedule)
                        .unwrap()
                })
                .collect()
        }
    }

    #[test]
    fn only_one_token_is_live() {
        let mut f = Fixture::new(3);
        let first = f.scheduler.arm_wakeup(Timestamp(1_500)).unwrap();
        let second = f.scheduler.arm_wakeup(Timestamp(1_600)).unwrap();
        assert_ne!(first, second);
        assert_eq!(f.timer.pending_tokens(), vec![second]);
        assert_eq!(f.scheduler.current_token(), Some(second));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut f = Fixture::new(3);
        f.scheduler.arm_wakeup(Timestamp(1_500)).unwrap();
        f.scheduler.cancel();
        f.scheduler.cancel();
        assert!(f.timer.pending_tokens().is_empty());
        assert_eq!(f.scheduler.current_token(), None);
    }

    #[test]
    fn opens_then_advances_then_expires() {
        let mut f = Fixture::new(3);
        f.scheduler.start(RelativeTime(120)).unwrap();

        assert_eq!(f.advance_to(1_120), vec![EpochEvent::Opened]);
        assert_eq!(f.machine.status(), CampaignState::Open);
        assert_eq!(f.scheduler.epoch(), 0);

        assert_eq!(f.advance_to(1_220), vec![EpochEvent::Advanced { epoch: 1 }]);
        assert_eq!(f.schedule.current_amounts(), &[4_500_000, 500]);

        assert_eq!(f.advance_to(1_320), vec![EpochEvent::Advanced { epoch: 2 }]);
        assert_eq!(f.schedule.amount_for(0, f.scheduler.epoch()).unwrap(), 2_250_000);

        assert_eq!(f.advance_to(1_420), vec![EpochEvent::Expired]);
        assert_eq!(f.machine.status(), CampaignState::Expired);
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Finished);
        assert_eq!(f.scheduler.current_token(), None);
        assert!(f.timer.pending_tokens().is_empty());
        assert_eq!(f.scheduler.last_fired(), Some(Timestamp(1_420)));
    }

    #[test]
    fn stale_token_is_ignored() {
        let mut f = Fixture::new(3);
        let old = f.scheduler.start(RelativeTime(120)).unwrap();
        f.scheduler.arm_wakeup(Timestamp(1_200)).unwrap();
        let event = f
            .scheduler
            .on_fire(old, Timestamp(1_120), &mut f.machine, &mut f.schedule)
            .unwrap();
        assert_eq!(event, EpochEvent::Stale);
        assert_eq!(f.machine.status(), CampaignState::Prepared);
    }

    #[test]
    fn pause_resume_preserves_remaining_time() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_100)));

        f.advance_to(1_030);
        f.scheduler.pause().unwrap();
        assert_eq!(f.scheduler.remaining(), Some(RelativeTime(70)));
        assert!(f.timer.pending_tokens().is_empty());

        // Nothing fires while paused, however long the pause lasts.
        assert!(f.advance_to(5_000).is_empty());

        f.scheduler.resume().unwrap();
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(5_070)));
        assert!(f.advance_to(5_069).is_empty());
        assert_eq!(f.advance_to(5_070), vec![EpochEvent::Advanced { epoch: 1 }]);
    }

    #[test]
    fn resume_before_open_starts_epoch_zero() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(120)).unwrap();
        f.advance_to(1_050);
        f.scheduler.pause().unwrap();
        f.scheduler.resume().unwrap();
        assert_eq!(f.scheduler.phase(), SchedulerPhase::Running);
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_150)));
    }

    #[test]
    fn reprepare_rearms_pending_opening() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(120)).unwrap();
        f.advance_to(1_020);
        f.scheduler.pause().unwrap();
        f.advance_to(2_000);
        assert!(f.scheduler.rearm_opening().unwrap().is_some());
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(2_100)));
        assert_eq!(f.advance_to(2_100), vec![EpochEvent::Opened]);
    }

    #[test]
    fn reprepare_after_open_leaves_clock_stopped() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.scheduler.pause().unwrap();
        assert_eq!(f.scheduler.rearm_opening().unwrap(), None);
        assert_eq!(f.scheduler.remaining(), Some(RelativeTime(100)));
    }

    #[test]
    fn failed_rearm_halts_advancement() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.timer.set_failing(true);
        f.timer.advance_to(Timestamp(1_100));
        let (token, at) = f.inbox.0.lock().pop().unwrap();
        let err = f
            .scheduler
            .on_fire(token, at, &mut f.machine, &mut f.schedule)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::RearmFailed(_)));
        assert!(f.scheduler.is_halted());
        assert_eq!(f.scheduler.current_token(), None);
        assert_eq!(f.scheduler.resume().unwrap_err(), SchedulerError::Halted);

        f.timer.set_failing(false);
        f.scheduler.recover(CampaignState::Open).unwrap();
        assert!(!f.scheduler.is_halted());
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_200)));
    }

    #[test]
    fn progress_survives_restart() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.advance_to(1_100);
        assert_eq!(f.scheduler.epoch(), 1);

        let mut restored = EpochScheduler::new(
            Arc::new(f.timer.clone()),
            Arc::new(f.store.clone()),
            f.inbox.clone(),
            RelativeTime(LEN),
            5,
        )
        .unwrap();
        assert_eq!(restored.epoch(), 1);
        assert_eq!(restored.next_boundary(), Some(Timestamp(1_200)));
        assert!(restored.restore(CampaignState::Open, RelativeTime(0)).unwrap().is_some());

        let persisted: PayoutSchedule =
            codec::decode(&f.store.get(SCHEDULE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted.epoch(), 1);
    }

    #[test]
    fn restore_while_paused_arms_nothing() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.scheduler.pause().unwrap();
        assert_eq!(f.scheduler.restore(CampaignState::Paused, RelativeTime(0)).unwrap(), None);
    }

    fn persisted(store: &MemoryStore) -> SchedulerSnapshot {
        codec::decode(&store.get(SCHEDULER_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn recover_while_paused_keeps_clock_stopped() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.advance_to(1_030);
        f.scheduler.pause().unwrap();

        assert_eq!(f.scheduler.recover(CampaignState::Paused).unwrap(), None);
        assert!(f.timer.pending_tokens().is_empty());
        assert!(f.advance_to(1_350).is_empty());
        assert_eq!(f.scheduler.epoch(), 0);
        assert_eq!(f.schedule.current_amounts(), &[9_000_000, 1_000]);

        f.scheduler.resume().unwrap();
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_420)));
    }

    #[test]
    fn recover_while_paused_after_halt_defers_to_resume() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.timer.set_failing(true);
        f.timer.advance_to(Timestamp(1_100));
        let (token, at) = f.inbox.0.lock().pop().unwrap();
        assert!(f.scheduler.on_fire(token, at, &mut f.machine, &mut f.schedule).is_err());
        f.scheduler.pause().unwrap();
        f.timer.set_failing(false);

        assert_eq!(f.scheduler.recover(CampaignState::Paused).unwrap(), None);
        assert!(!f.scheduler.is_halted());
        assert!(f.timer.pending_tokens().is_empty());
        assert_eq!(f.scheduler.remaining(), Some(RelativeTime(LEN)));

        f.advance_to(1_500);
        f.scheduler.resume().unwrap();
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_600)));
    }

    #[test]
    fn recover_refuses_after_expiry() {
        let mut f = Fixture::new(1);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.advance_to(1_100);
        assert_eq!(
            f.scheduler.recover(CampaignState::Expired),
            Err(SchedulerError::NothingToResume)
        );
    }

    #[test]
    fn recover_leaves_healthy_clock_alone() {
        let mut f = Fixture::new(5);
        let token = f.scheduler.start(RelativeTime(120)).unwrap();
        assert_eq!(f.scheduler.recover(CampaignState::Prepared).unwrap(), Some(token));
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_120)));
    }

    #[test]
    fn refused_transition_on_fire_halts() {
        let mut f = Fixture::new(1);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        // Paused -> Expired is not a legal move.
        f.machine.transition_to(CampaignState::Paused).unwrap();
        f.timer.advance_to(Timestamp(1_100));
        let (token, at) = f.inbox.0.lock().pop().unwrap();

        let err = f
            .scheduler
            .on_fire(token, at, &mut f.machine, &mut f.schedule)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Transition(_)));
        assert!(f.scheduler.is_halted());
        assert_eq!(f.scheduler.current_token(), None);
        assert!(persisted(&f.store).halted);
    }

    #[test]
    fn failed_start_halts() {
        let mut f = Fixture::new(5);
        f.timer.set_failing(true);
        let err = f.scheduler.start(RelativeTime(120)).unwrap_err();
        assert!(matches!(err, SchedulerError::RearmFailed(_)));
        assert!(f.scheduler.is_halted());
        assert!(persisted(&f.store).halted);

        f.timer.set_failing(false);
        assert!(f.scheduler.recover(CampaignState::Prepared).unwrap().is_some());
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_000)));
        assert_eq!(f.advance_to(1_000), vec![EpochEvent::Opened]);
    }

    #[test]
    fn failed_resume_halts() {
        let mut f = Fixture::new(5);
        f.scheduler.start(RelativeTime(0)).unwrap();
        f.advance_to(1_000);
        f.scheduler.pause().unwrap();
        f.timer.set_failing(true);
        assert!(matches!(f.scheduler.resume(), Err(SchedulerError::RearmFailed(_))));
        assert!(f.scheduler.is_halted());
        assert_eq!(f.scheduler.remaining(), Some(RelativeTime(LEN)));
    }

    #[test]
    fn restore_without_snapshot_arms_opening() {
        let mut f = Fixture::new(5);
        assert_eq!(f.store.get(SCHEDULER_KEY).unwrap(), None);
        assert!(f
            .scheduler
            .restore(CampaignState::Prepared, RelativeTime(120))
            .unwrap()
            .is_some());
        assert_eq!(f.scheduler.next_boundary(), Some(Timestamp(1_120)));
        assert_eq!(persisted(&f.store).next_boundary, Some(Timestamp(1_120)));
    }
}
