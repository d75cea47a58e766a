//! Claim processing.
//!
//! A claim runs in three phases:
//!
//! 1. **Admit** (one critical section, no suspension): status check,
//!    duplicate check, address derivation, proof verification, payout
//!    computation at the current epoch, reserve check, and a provisional
//!    reservation of the claimant key and payout amount.
//! 2. **Settle** (suspends): resolve the claimant's destination, then apply
//!    the fee and payout legs all-or-nothing.
//! 3. **Commit** (one critical section): write the claim record.
//!
//! The epoch and amount are fixed in phase 1, so a boundary firing while a
//! claim is suspended does not change what that claim pays. If phase 2
//! fails or the future is dropped, the reservation is released.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use airdrop_core::address::{CanonicalAddress, IdentifierEncoding};
use airdrop_core::constants::{MAX_IDENTIFIER_LEN, MAX_PROOF_DEPTH};
use airdrop_core::error::ClaimError;
use airdrop_core::merkle::{self, MerkleProof, ProofStep, Side};
use airdrop_core::types::{
    CampaignState, ClaimRecord, Destination, Hash256, SettlementReceipt, Tier, Timestamp,
    Transfer,
};

use crate::campaign::CampaignInner;

/// One proof step as submitted by a claimant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProofStepInput {
    /// Hex-encoded sibling hash.
    pub hash: String,
    /// `"left"` or `"right"`: the side the sibling occupies.
    pub direction: String,
}

/// A claim as submitted, before shape validation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClaimRequest {
    /// Claimant identifier (e.g. a public key) in the campaign's encoding.
    pub identifier: String,
    /// Asserted payout tier.
    pub tier: i64,
    /// Membership proof for `(identifier, tier)`.
    pub proof: Vec<ProofStepInput>,
    /// Key the claim is recorded under.
    pub claimant_key: String,
}

/// A request that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedClaim {
    /// Decoded identifier bytes.
    pub identifier: Vec<u8>,
    pub tier: Tier,
    pub proof: MerkleProof,
    pub claimant_key: String,
}

impl ClaimRequest {
    /// Build a request from typed parts.
    pub fn new(identifier: &str, tier: Tier, proof: &MerkleProof, claimant_key: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            tier: i64::from(tier),
            proof: proof
                .path
                .iter()
                .map(|step| ProofStepInput {
                    hash: step.hash.to_hex(),
                    direction: step.side.to_string(),
                })
                .collect(),
            claimant_key: claimant_key.to_string(),
        }
    }

    /// Parse a JSON request. Any missing, extra or mistyped field is
    /// reported as [`ClaimError::Malformed`].
    pub fn from_json(json: &str) -> Result<Self, ClaimError> {
        serde_json::from_str(json).map_err(|e| ClaimError::Malformed(e.to_string()))
    }

    /// Check field contents and produce typed values.
    pub fn validate(&self, encoding: IdentifierEncoding) -> Result<ValidatedClaim, ClaimError> {
        let malformed = |msg: String| ClaimError::Malformed(msg);

        if self.identifier.is_empty() {
            return Err(malformed("identifier is empty".into()));
        }
        if self.identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(malformed(format!(
                "identifier longer than {MAX_IDENTIFIER_LEN} bytes"
            )));
        }
        let identifier = encoding
            .decode(&self.identifier)
            .map_err(|e| malformed(e.to_string()))?;

        let tier = Tier::try_from(self.tier)
            .map_err(|_| malformed(format!("tier {} is out of range", self.tier)))?;

        if self.claimant_key.is_empty() {
            return Err(malformed("claimant key is empty".into()));
        }
        if self.claimant_key.len() > MAX_IDENTIFIER_LEN {
            return Err(malformed(format!(
                "claimant key longer than {MAX_IDENTIFIER_LEN} bytes"
            )));
        }

        if self.proof.is_empty() {
            return Err(malformed("proof is empty".into()));
        }
        if self.proof.len() > MAX_PROOF_DEPTH {
            return Err(malformed(format!(
                "proof has {} steps, at most {MAX_PROOF_DEPTH} allowed",
                self.proof.len()
            )));
        }
        let path = self
            .proof
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let hash = Hash256::from_hex(&step.hash)
                    .map_err(|e| malformed(format!("proof step {i}: {e}")))?;
                let side = step
                    .direction
                    .parse::<Side>()
                    .map_err(|e| malformed(format!("proof step {i}: {e}")))?;
                Ok(ProofStep { hash, side })
            })
            .collect::<Result<Vec<_>, ClaimError>>()?;

        Ok(ValidatedClaim {
            identifier,
            tier,
            proof: MerkleProof { path },
            claimant_key: self.claimant_key.clone(),
        })
    }
}

/// Values fixed when a claim is admitted.
struct Admission {
    address: CanonicalAddress,
    epoch: u64,
    amount: u64,
    claimed_at: Timestamp,
}

/// Holds a claimant key and payout amount while a claim is in flight.
///
/// Dropping an armed reservation releases both.
struct Reservation {
    inner: Arc<CampaignInner>,
    key: String,
    amount: u64,
    armed: bool,
}

impl Reservation {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut core = self.inner.core.lock();
        core.ledger.release(&self.key);
        core.reserved_outlay = core.reserved_outlay.saturating_sub(self.amount);
        debug!(key = %self.key, "claim reservation released");
    }
}

/// Runs claims against one campaign.
#[derive(Clone)]
pub struct ClaimProcessor {
    inner: Arc<CampaignInner>,
}

impl ClaimProcessor {
    pub(crate) fn new(inner: Arc<CampaignInner>) -> Self {
        Self { inner }
    }

    /// Process one claim end to end.
    ///
    /// # Errors
    ///
    /// Rejections before settlement ([`Malformed`](ClaimError::Malformed),
    /// [`ClaimingClosed`](ClaimError::ClaimingClosed),
    /// [`DuplicateClaim`](ClaimError::DuplicateClaim),
    /// [`ProofMismatch`](ClaimError::ProofMismatch),
    /// [`InsufficientReserve`](ClaimError::InsufficientReserve)) and
    /// resolution or settlement failures leave no state behind.
    /// [`LedgerInconsistency`](ClaimError::LedgerInconsistency) means value
    /// moved without a record and needs operator attention.
    pub async fn submit_claim(&self, request: &ClaimRequest) -> Result<ClaimRecord, ClaimError> {
        let result = self.process(request).await;
        match &result {
            Ok(record) => info!(
                key = %record.claimant_key,
                tier = record.tier,
                epoch = record.epoch,
                amount = record.amount_allocated,
                "claim paid"
            ),
            Err(ClaimError::LedgerInconsistency { .. }) => {}
            Err(e) => warn!(key = %request.claimant_key, error = %e, "claim rejected"),
        }
        result
    }

    async fn process(&self, request: &ClaimRequest) -> Result<ClaimRecord, ClaimError> {
        let claim = request.validate(self.inner.config.identifier_encoding)?;
        let admission = self.admit(&claim)?;
        let reservation = Reservation {
            inner: self.inner.clone(),
            key: claim.claimant_key.clone(),
            amount: admission.amount,
            armed: true,
        };

        let destination = self.inner.resolver.resolve(&admission.address).await?;
        let transfers = self.transfers(&claim, admission.amount, &destination);
        let receipt = self.inner.settlement.settle(&transfers).await?;

        self.commit(claim, admission, reservation, receipt)
    }

    fn admit(&self, claim: &ValidatedClaim) -> Result<Admission, ClaimError> {
        let config = &self.inner.config;
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;

        let status = core.machine.status();
        if status != CampaignState::Open {
            return Err(ClaimError::ClaimingClosed { status });
        }
        let key = &claim.claimant_key;
        if core.ledger.is_reserved(key) || core.ledger.has_claimed(key)? {
            return Err(ClaimError::DuplicateClaim(key.clone()));
        }

        let address = CanonicalAddress::derive(&claim.identifier, &config.address_prefix)
            .map_err(|e| ClaimError::Malformed(e.to_string()))?;
        let leaf = merkle::leaf_hash(&claim.identifier, claim.tier);
        if !merkle::verify(&claim.proof, &leaf, &config.merkle_root) {
            return Err(ClaimError::ProofMismatch);
        }

        let epoch = core.scheduler.epoch();
        let amount = core.schedule.amount_for(claim.tier, epoch)?;
        let available = core
            .stats
            .reserve_remaining
            .saturating_sub(core.reserved_outlay);
        if amount > available {
            return Err(ClaimError::InsufficientReserve {
                remaining: available,
                need: amount,
            });
        }

        core.ledger.reserve(key)?;
        core.reserved_outlay = core.reserved_outlay.saturating_add(amount);
        debug!(%key, %address, epoch, amount, "claim admitted");

        Ok(Admission {
            address,
            epoch,
            amount,
            claimed_at: self.inner.timer.now(),
        })
    }

    fn transfers(&self, claim: &ValidatedClaim, amount: u64, destination: &Destination) -> Vec<Transfer> {
        let config = &self.inner.config;
        let mut transfers = Vec::with_capacity(2);
        if config.claim_fee > 0 {
            transfers.push(Transfer {
                from: claim.claimant_key.clone(),
                to: config.fee_collector.clone(),
                amount: config.claim_fee,
            });
        }
        transfers.push(Transfer {
            from: config.reserve_account.clone(),
            to: destination.0.clone(),
            amount,
        });
        transfers
    }

    fn commit(
        &self,
        claim: ValidatedClaim,
        admission: Admission,
        mut reservation: Reservation,
        receipt: SettlementReceipt,
    ) -> Result<ClaimRecord, ClaimError> {
        let record = ClaimRecord {
            claimant_key: claim.claimant_key,
            derived_address: admission.address.encode(),
            tier: claim.tier,
            amount_allocated: admission.amount,
            epoch: admission.epoch,
            claimed_at: admission.claimed_at,
        };
        let fee = self.inner.config.claim_fee;

        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        reservation.disarm();
        core.reserved_outlay = core.reserved_outlay.saturating_sub(admission.amount);

        match core.ledger.record_claim(&record.claimant_key, &record) {
            Ok(()) => {
                core.stats.record_payout(admission.amount, fee);
                self.inner.save_stats(&mut core.stats);
                Ok(record)
            }
            Err(e) => {
                // Value moved: the key stays reserved and the payout stays debited.
                core.stats.record_inconsistency(admission.amount, fee);
                self.inner.save_stats(&mut core.stats);
                error!(
                    key = %record.claimant_key,
                    settlement_id = %receipt.settlement_id,
                    amount = admission.amount,
                    error = %e,
                    "payout settled but claim record not written"
                );
                Err(ClaimError::LedgerInconsistency {
                    key: record.claimant_key,
                    reason: e.to_string(),
                })
            }
        }
    }
}
