//! Core campaign types: hashes, timestamps, lifecycle states and claim records.
//!
//! All token amounts are in the smallest currency unit and use `u64`.
//! All timestamps are whole seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::{HashParseError, TransitionError};

/// A payout tier index into the [`PayoutSchedule`](crate::schedule::PayoutSchedule).
pub type Tier = u32;

/// A 32-byte SHA-256 digest.
///
/// Used for leaf hashes, interior Merkle nodes and the committed root.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let bytes = hex::decode(s).map_err(|_| HashParseError::InvalidHex)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashParseError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Return a copy with a single bit flipped. Used to probe proof tamper resistance.
    pub fn with_bit_flipped(&self, bit: usize) -> Self {
        let mut bytes = self.0;
        bytes[(bit / 8) % 32] ^= 1 << (bit % 8);
        Self(bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An absolute point in time, in seconds.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Timestamp(pub u64);

/// A span of time between two [`Timestamp`]s, in seconds.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct RelativeTime(pub u64);

impl Timestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_since(&self, earlier: Timestamp) -> RelativeTime {
        RelativeTime(self.0.saturating_sub(earlier.0))
    }
}

impl RelativeTime {
    pub const ZERO: Self = Self(0);

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl Add<RelativeTime> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: RelativeTime) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.0))
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = RelativeTime;

    fn sub(self, rhs: Timestamp) -> RelativeTime {
        self.saturating_since(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Opaque handle for one pending timer callback.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct WakeToken(pub u64);

impl fmt::Display for WakeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wake#{}", self.0)
    }
}

/// Lifecycle status of a campaign.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "kebab-case")]
pub enum CampaignState {
    /// Created, configuration not yet committed.
    Initialized,
    /// Configuration committed, waiting for the claim window to open.
    Prepared,
    /// Claims are accepted.
    Open,
    /// Claims are rejected and the epoch clock is stopped.
    Paused,
    /// Reserved status; no transitions lead into or out of it.
    Restarting,
    /// Terminal. The claim window has closed for good.
    Expired,
}

impl CampaignState {
    /// Every state, in declaration order.
    pub const ALL: [CampaignState; 6] = [
        CampaignState::Initialized,
        CampaignState::Prepared,
        CampaignState::Open,
        CampaignState::Paused,
        CampaignState::Restarting,
        CampaignState::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Prepared => "prepared",
            Self::Open => "claim-window-open",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Expired => "claim-window-expired",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignState {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownState(s.to_string()))
    }
}

/// The immutable record of one successful claim.
///
/// Its existence under a claimant key is the sole source of truth for
/// "already claimed".
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ClaimRecord {
    /// Unique per-claimant key the ledger is indexed by.
    pub claimant_key: String,
    /// Canonical address derived from the claimant identifier.
    pub derived_address: String,
    /// Tier proven by the Merkle proof.
    pub tier: Tier,
    /// Amount delivered to the claimant.
    pub amount_allocated: u64,
    /// Epoch captured when the claim was validated.
    pub epoch: u64,
    /// Time the claim was validated.
    pub claimed_at: Timestamp,
}

/// A delivery capability returned by identity resolution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination(pub String);

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One debit/credit leg handed to the settlement primitive.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Party debited.
    pub from: String,
    /// Party credited.
    pub to: String,
    /// Amount moved.
    pub amount: u64,
}

/// Proof that a settlement was applied.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// Identifier assigned by the settlement backend.
    pub settlement_id: String,
    /// Number of legs applied.
    pub legs: usize,
}
