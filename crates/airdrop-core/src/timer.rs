//! Deterministic [`TimerService`] driven by an explicit clock.
//!
//! Time only moves when [`ManualTimer::advance_to`] or
//! [`ManualTimer::advance_by`] is called. Due wake-ups are delivered in
//! `(time, token)` order, with the clock set to each wake-up's time while
//! its waker runs. No lock is held during delivery, so a waker may arm or
//! cancel further wake-ups, and those are honoured within the same advance
//! if they fall due.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::TimerError;
use crate::traits::{TimerService, Waker};
use crate::types::{RelativeTime, Timestamp, WakeToken};

struct Pending {
    at: Timestamp,
    waker: Arc<dyn Waker>,
}

#[derive(Default)]
struct Inner {
    now: Timestamp,
    pending: BTreeMap<WakeToken, Pending>,
    failing: bool,
}

/// Manually advanced timer for tests and simulations.
#[derive(Clone, Default)]
pub struct ManualTimer {
    inner: Arc<Mutex<Inner>>,
}

impl ManualTimer {
    /// Create a timer whose clock reads `now`.
    pub fn new(now: Timestamp) -> Self {
        let timer = Self::default();
        timer.inner.lock().now = now;
        timer
    }

    /// Move the clock forward to `target`, delivering every wake-up due at
    /// or before it. Returns the number delivered.
    pub fn advance_to(&self, target: Timestamp) -> usize {
        let mut delivered = 0;
        loop {
            let next = {
                let mut inner = self.inner.lock();
                let due = inner
                    .pending
                    .iter()
                    .filter(|(_, p)| p.at <= target)
                    .min_by_key(|(token, p)| (p.at, **token))
                    .map(|(token, _)| *token);
                match due.and_then(|token| inner.pending.remove(&token).map(|p| (token, p))) {
                    Some((token, pending)) => {
                        inner.now = inner.now.max(pending.at);
                        Some((token, inner.now, pending.waker))
                    }
                    None => {
                        inner.now = inner.now.max(target);
                        None
                    }
                }
            };
            match next {
                Some((token, fired_at, waker)) => {
                    waker.wake(token, fired_at);
                    delivered += 1;
                }
                None => return delivered,
            }
        }
    }

    /// Move the clock forward by `span`.
    pub fn advance_by(&self, span: RelativeTime) -> usize {
        let target = self.now() + span;
        self.advance_to(target)
    }

    /// Tokens currently pending, in token order.
    pub fn pending_tokens(&self) -> Vec<WakeToken> {
        self.inner.lock().pending.keys().copied().collect()
    }

    /// Scheduled time of a pending token.
    pub fn scheduled_at(&self, token: WakeToken) -> Option<Timestamp> {
        self.inner.lock().pending.get(&token).map(|p| p.at)
    }

    /// Make subsequent [`set_wakeup`](TimerService::set_wakeup) calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

impl TimerService for ManualTimer {
    fn now(&self) -> Timestamp {
        self.inner.lock().now
    }

    fn set_wakeup(
        &self,
        at: Timestamp,
        token: WakeToken,
        waker: Arc<dyn Waker>,
    ) -> Result<(), TimerError> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(TimerError::Unavailable("manual timer set to fail".into()));
        }
        inner.pending.insert(token, Pending { at, waker });
        Ok(())
    }

    fn cancel(&self, token: WakeToken) -> bool {
        self.inner.lock().pending.remove(&token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        fired: Mutex<Vec<(WakeToken, Timestamp)>>,
    }

    impl Waker for Recorder {
        fn wake(&self, token: WakeToken, fired_at: Timestamp) {
            self.fired.lock().push((token, fired_at));
        }
    }

    /// Re-arms itself once, one second later.
    struct Chain {
        timer: ManualTimer,
        fired: Mutex<Vec<WakeToken>>,
    }

    impl Waker for Arc<Chain> {
        fn wake(&self, token: WakeToken, fired_at: Timestamp) {
            self.fired.lock().push(token);
            if token == WakeToken(1) {
                self.timer
                    .set_wakeup(fired_at + RelativeTime(1), WakeToken(2), Arc::new(self.clone()))
                    .unwrap();
            }
        }
    }

    #[test]
    fn fires_in_time_order() {
        let timer = ManualTimer::new(Timestamp(0));
        let rec = Arc::new(Recorder::default());
        timer.set_wakeup(Timestamp(20), WakeToken(1), rec.clone()).unwrap();
        timer.set_wakeup(Timestamp(10), WakeToken(2), rec.clone()).unwrap();
        assert_eq!(timer.advance_to(Timestamp(30)), 2);
        assert_eq!(
            *rec.fired.lock(),
            vec![(WakeToken(2), Timestamp(10)), (WakeToken(1), Timestamp(20))]
        );
        assert_eq!(timer.now(), Timestamp(30));
    }

    #[test]
    fn future_wakeups_stay_pending() {
        let timer = ManualTimer::new(Timestamp(0));
        let rec = Arc::new(Recorder::default());
        timer.set_wakeup(Timestamp(50), WakeToken(1), rec.clone()).unwrap();
        assert_eq!(timer.advance_to(Timestamp(49)), 0);
        assert_eq!(timer.pending_tokens(), vec![WakeToken(1)]);
        assert_eq!(timer.scheduled_at(WakeToken(1)), Some(Timestamp(50)));
    }

    #[test]
    fn cancelled_token_never_fires() {
        let timer = ManualTimer::new(Timestamp(0));
        let rec = Arc::new(Recorder::default());
        timer.set_wakeup(Timestamp(5), WakeToken(1), rec.clone()).unwrap();
        assert!(timer.cancel(WakeToken(1)));
        assert!(!timer.cancel(WakeToken(1)));
        assert_eq!(timer.advance_to(Timestamp(10)), 0);
        assert!(rec.fired.lock().is_empty());
    }

    #[test]
    fn past_wakeup_fires_on_next_advance() {
        let timer = ManualTimer::new(Timestamp(100));
        let rec = Arc::new(Recorder::default());
        timer.set_wakeup(Timestamp(90), WakeToken(1), rec.clone()).unwrap();
        assert_eq!(timer.advance_by(RelativeTime::ZERO), 1);
        assert_eq!(*rec.fired.lock(), vec![(WakeToken(1), Timestamp(100))]);
    }

    #[test]
    fn waker_may_rearm_during_delivery() {
        let timer = ManualTimer::new(Timestamp(0));
        let chain = Arc::new(Chain {
            timer: timer.clone(),
            fired: Mutex::new(Vec::new()),
        });
        timer.set_wakeup(Timestamp(1), WakeToken(1), Arc::new(chain.clone())).unwrap();
        assert_eq!(timer.advance_to(Timestamp(5)), 2);
        assert_eq!(*chain.fired.lock(), vec![WakeToken(1), WakeToken(2)]);
    }

    #[test]
    fn failing_mode_rejects_wakeups() {
        let timer = ManualTimer::new(Timestamp(0));
        timer.set_failing(true);
        let rec = Arc::new(Recorder::default());
        assert!(matches!(
            timer.set_wakeup(Timestamp(1), WakeToken(1), rec),
            Err(TimerError::Unavailable(_))
        ));
    }
}
