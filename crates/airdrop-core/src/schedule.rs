//! Per-tier payout schedule with halving decay.
//!
//! Every tier starts at its configured epoch-0 amount and halves (integer
//! shift, truncating) at each epoch boundary:
//!
//! - Epoch 0: `base`
//! - Epoch 1: `base >> 1`
//! - …
//! - Epoch 64+: 0 (shift-overflow guard)
//!
//! [`PayoutSchedule::advance_epoch`] is pure; the owner persists the result.

use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::types::Tier;

/// Amount for a single tier after `epoch` halvings.
///
/// Returns 0 for epoch ≥ 64.
pub fn decayed_amount(base: u64, epoch: u64) -> u64 {
    if epoch >= 64 {
        return 0;
    }
    base >> epoch
}

/// Epoch-indexed payout table.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct PayoutSchedule {
    /// Epoch-0 amount per tier.
    base: Vec<u64>,
    /// Amounts in force for `epoch`.
    current: Vec<u64>,
    /// Epoch the `current` table belongs to.
    epoch: u64,
}

impl PayoutSchedule {
    /// Create a schedule at epoch 0 with one amount per tier.
    pub fn initialize(tier_amounts: &[u64]) -> Result<Self, ScheduleError> {
        if tier_amounts.is_empty() {
            return Err(ScheduleError::EmptySchedule);
        }
        Ok(Self {
            base: tier_amounts.to_vec(),
            current: tier_amounts.to_vec(),
            epoch: 0,
        })
    }

    /// Amount paid to `tier` during `epoch`.
    pub fn amount_for(&self, tier: Tier, epoch: u64) -> Result<u64, ScheduleError> {
        let base = self
            .base
            .get(tier as usize)
            .ok_or(ScheduleError::UnknownTier {
                tier,
                tiers: self.base.len(),
            })?;
        Ok(decayed_amount(*base, epoch))
    }

    /// Produce the table for the next epoch by halving every tier once.
    pub fn advance_epoch(&self) -> PayoutSchedule {
        Self {
            base: self.base.clone(),
            current: self.current.iter().map(|amount| amount >> 1).collect(),
            epoch: self.epoch.saturating_add(1),
        }
    }

    /// Amounts in force for [`epoch`](Self::epoch), one per tier.
    pub fn current_amounts(&self) -> &[u64] {
        &self.current
    }

    /// Epoch-0 amounts, one per tier.
    pub fn base_amounts(&self) -> &[u64] {
        &self.base
    }

    /// Epoch the current table belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tier_count(&self) -> usize {
        self.base.len()
    }

    /// Worst-case total outlay if every eligible claimant claims in epoch 0.
    ///
    /// `claimants_per_tier[i]` is the number of eligibility entries in tier
    /// `i`. Saturates instead of overflowing.
    pub fn max_outlay(&self, claimants_per_tier: &[u64]) -> u64 {
        self.base
            .iter()
            .zip(claimants_per_tier)
            .fold(0u64, |total, (amount, count)| {
                total.saturating_add(amount.saturating_mul(*count))
            })
    }
}
