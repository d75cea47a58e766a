//! Error types for airdrop campaigns.
use thiserror::Error;

use crate::types::{CampaignState, Tier};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashParseError {
    #[error("invalid hex")] InvalidHex,
    #[error("invalid hash length: {0} bytes")] InvalidLength(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a tree from an empty leaf set")] EmptyInput,
    #[error("leaf not found in tree")] NotFound,
    #[error("duplicate leaf: {0}")] DuplicateLeaf(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("payout schedule needs at least one tier")] EmptySchedule,
    #[error("unknown tier {tier} (schedule has {tiers})")] UnknownTier { tier: Tier, tiers: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid prefix: {0}")] InvalidPrefix(String),
    #[error("identifier does not decode under the configured encoding")] InvalidIdentifier,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal state transition from {from} to {to}")] Illegal { from: CampaignState, to: CampaignState },
    #[error("unknown campaign state: {0}")] UnknownState(String),
    #[error(transparent)] Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key already exists: {0}")] AlreadyExists(String),
    #[error("storage backend: {0}")] Backend(String),
    #[error("codec: {0}")] Codec(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer service unavailable: {0}")] Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("timer: {0}")] Timer(#[from] TimerError),
    #[error("re-arm failed, epoch advancement halted: {0}")] RearmFailed(TimerError),
    #[error("epoch advancement is halted")] Halted,
    #[error("nothing to resume")] NothingToResume,
    #[error(transparent)] Transition(#[from] TransitionError),
    #[error(transparent)] Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("settlement rejected: {0}")] Rejected(String),
    #[error("insufficient balance in {party}: have {have}, need {need}")] InsufficientBalance { party: String, have: u64, need: u64 },
    #[error("settlement backend unavailable: {0}")] Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no deposit destination for {0}")] NotFound(String),
    #[error("identity resolution unavailable: {0}")] Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("malformed claim: {0}")] Malformed(String),
    #[error("airdrop can not be claimed when campaign status is: {status}")] ClaimingClosed { status: CampaignState },
    #[error("token allocation has already been claimed: {0}")] DuplicateClaim(String),
    #[error("computed proof does not match the committed root")] ProofMismatch,
    #[error(transparent)] Schedule(#[from] ScheduleError),
    #[error("reserve exhausted: remaining {remaining}, need {need}")] InsufficientReserve { remaining: u64, need: u64 },
    #[error("identity resolution: {0}")] Resolution(#[from] ResolveError),
    #[error("settlement: {0}")] Settlement(#[from] SettlementError),
    #[error("payout settled for {key} but the claim record could not be written: {reason}")] LedgerInconsistency { key: String, reason: String },
    #[error(transparent)] Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("merkle root: {0}")] InvalidRoot(#[from] HashParseError),
    #[error("at least one tier amount is required")] NoTiers,
    #[error("{0} must be greater than zero")] Zero(&'static str),
    #[error("address prefix: {0}")] Prefix(#[from] AddressError),
    #[error("{0} must not be empty")] Empty(&'static str),
    #[error("token supply {supply} is below the smallest tier payout {min_payout}")] SupplyBelowPayout { supply: u64, min_payout: u64 },
    #[error("config source: {0}")] Source(String),
}

#[derive(Error, Debug)]
pub enum AirdropError {
    #[error(transparent)] Merkle(#[from] MerkleError),
    #[error(transparent)] Schedule(#[from] ScheduleError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error(transparent)] Transition(#[from] TransitionError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Timer(#[from] TimerError),
    #[error(transparent)] Scheduler(#[from] SchedulerError),
    #[error(transparent)] Claim(#[from] ClaimError),
    #[error(transparent)] Config(#[from] ConfigError),
}
