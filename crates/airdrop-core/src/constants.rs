//! Campaign constants. All amounts in the smallest currency unit.

/// Smallest-unit multiplier for one whole token (six decimal places).
pub const TOKEN_UNIT: u64 = 1_000_000;

/// Default epoch-0 payout per tier, in whole tokens times [`TOKEN_UNIT`].
pub const DEFAULT_TIER_AMOUNTS: [u64; 5] = [
    9_000 * TOKEN_UNIT,
    6_500 * TOKEN_UNIT,
    3_500 * TOKEN_UNIT,
    1_500 * TOKEN_UNIT,
    750 * TOKEN_UNIT,
];

/// Total supply minted into the campaign reserve by default.
pub const DEFAULT_TOKEN_SUPPLY: u64 = 10_000_000 * TOKEN_UNIT;

/// One day in seconds.
pub const ONE_DAY_SECS: u64 = 86_400;

/// Default epoch length.
pub const DEFAULT_EPOCH_LENGTH_SECS: u64 = ONE_DAY_SECS;

/// Default number of epochs before the campaign expires.
pub const DEFAULT_TARGET_EPOCHS: u64 = 5;

/// Default delay between preparation and the claim window opening.
pub const DEFAULT_START_DELAY_SECS: u64 = 120;

/// Human-readable prefix of derived claimant addresses.
pub const DEFAULT_ADDRESS_PREFIX: &str = "drop";

/// Longest proof accepted by shape validation. Deeper trees would need more
/// than 2^64 leaves.
pub const MAX_PROOF_DEPTH: usize = 64;

/// Longest claimant key or identifier accepted by shape validation.
pub const MAX_IDENTIFIER_LEN: usize = 512;
