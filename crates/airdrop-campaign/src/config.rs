//! Campaign configuration supplied at instantiation.
//!
//! [`CampaignConfig`] is plain serde data so hosts can load it from any
//! source; [`CampaignConfig::validate`] turns it into the typed values the
//! campaign runs on.

use serde::{Deserialize, Serialize};

use airdrop_core::address::{CanonicalAddress, IdentifierEncoding};
use airdrop_core::constants::{
    DEFAULT_ADDRESS_PREFIX, DEFAULT_EPOCH_LENGTH_SECS, DEFAULT_START_DELAY_SECS,
    DEFAULT_TARGET_EPOCHS, DEFAULT_TIER_AMOUNTS, DEFAULT_TOKEN_SUPPLY,
};
use airdrop_core::error::ConfigError;
use airdrop_core::schedule::PayoutSchedule;
use airdrop_core::types::{Hash256, RelativeTime};

/// Configuration for one airdrop campaign.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CampaignConfig {
    /// Hex-encoded committed Merkle root of the eligibility set.
    pub merkle_root: String,
    /// Epoch-0 payout per tier.
    pub tier_amounts: Vec<u64>,
    /// Length of one epoch.
    pub epoch_length_secs: u64,
    /// Number of epochs the claim window stays open.
    pub target_number_of_epochs: u64,
    /// Fee each claimant pays to the fee collector.
    pub claim_fee: u64,
    /// Delay between preparation and the claim window opening.
    pub start_delay_secs: u64,
    /// Amount minted into the reserve account for payouts.
    pub token_supply: u64,
    /// Human-readable prefix of derived claimant addresses.
    pub address_prefix: String,
    /// How claimant identifiers are turned into hashed bytes.
    pub identifier_encoding: IdentifierEncoding,
    /// Party credited with claim fees.
    pub fee_collector: String,
    /// Party debited for payouts.
    pub reserve_account: String,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            merkle_root: String::new(),
            tier_amounts: DEFAULT_TIER_AMOUNTS.to_vec(),
            epoch_length_secs: DEFAULT_EPOCH_LENGTH_SECS,
            target_number_of_epochs: DEFAULT_TARGET_EPOCHS,
            claim_fee: 0,
            start_delay_secs: DEFAULT_START_DELAY_SECS,
            token_supply: DEFAULT_TOKEN_SUPPLY,
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
            identifier_encoding: IdentifierEncoding::default(),
            fee_collector: "fee-collector".to_string(),
            reserve_account: "campaign-reserve".to_string(),
        }
    }
}

/// A configuration that passed [`CampaignConfig::validate`].
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub merkle_root: Hash256,
    pub schedule: PayoutSchedule,
    pub epoch_length: RelativeTime,
    pub target_number_of_epochs: u64,
    pub claim_fee: u64,
    pub start_delay: RelativeTime,
    pub token_supply: u64,
    pub address_prefix: String,
    pub identifier_encoding: IdentifierEncoding,
    pub fee_collector: String,
    pub reserve_account: String,
}

impl CampaignConfig {
    /// Check every field and produce typed values.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let merkle_root = Hash256::from_hex(&self.merkle_root)?;
        let schedule =
            PayoutSchedule::initialize(&self.tier_amounts).map_err(|_| ConfigError::NoTiers)?;
        if self.epoch_length_secs == 0 {
            return Err(ConfigError::Zero("epoch_length_secs"));
        }
        if self.target_number_of_epochs == 0 {
            return Err(ConfigError::Zero("target_number_of_epochs"));
        }
        // Derive a throwaway address to validate the prefix.
        CanonicalAddress::derive(&[], &self.address_prefix)?;
        if self.fee_collector.is_empty() {
            return Err(ConfigError::Empty("fee_collector"));
        }
        if self.reserve_account.is_empty() {
            return Err(ConfigError::Empty("reserve_account"));
        }
        let min_payout = self.tier_amounts.iter().copied().min().unwrap_or(0);
        if self.token_supply < min_payout {
            return Err(ConfigError::SupplyBelowPayout {
                supply: self.token_supply,
                min_payout,
            });
        }

        Ok(ValidatedConfig {
            merkle_root,
            schedule,
            epoch_length: RelativeTime::from_secs(self.epoch_length_secs),
            target_number_of_epochs: self.target_number_of_epochs,
            claim_fee: self.claim_fee,
            start_delay: RelativeTime::from_secs(self.start_delay_secs),
            token_supply: self.token_supply,
            address_prefix: self.address_prefix.clone(),
            identifier_encoding: self.identifier_encoding,
            fee_collector: self.fee_collector.clone(),
            reserve_account: self.reserve_account.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airdrop_core::error::{AddressError, HashParseError};

    fn with_root() -> CampaignConfig {
        CampaignConfig {
            merkle_root: "ab".repeat(32),
            ..CampaignConfig::default()
        }
    }

    #[test]
    fn defaults_follow_deployment_values() {
        let cfg = CampaignConfig::default();
        assert_eq!(cfg.tier_amounts, DEFAULT_TIER_AMOUNTS.to_vec());
        assert_eq!(cfg.target_number_of_epochs, 5);
        assert_eq!(cfg.epoch_length_secs, 86_400);
        assert_eq!(cfg.start_delay_secs, 120);
        assert_eq!(cfg.address_prefix, "drop");
    }

    #[test]
    fn default_with_root_validates() {
        let v = with_root().validate().unwrap();
        assert_eq!(v.merkle_root, Hash256([0xab; 32]));
        assert_eq!(v.schedule.tier_count(), 5);
        assert_eq!(v.epoch_length, RelativeTime(86_400));
    }

    #[test]
    fn missing_root_rejected() {
        assert_eq!(
            CampaignConfig::default().validate().unwrap_err(),
            ConfigError::InvalidRoot(HashParseError::InvalidLength(0))
        );
    }

    #[test]
    fn zero_epoch_length_rejected() {
        let cfg = CampaignConfig { epoch_length_secs: 0, ..with_root() };
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::Zero("epoch_length_secs"));
    }

    #[test]
    fn zero_epoch_count_rejected() {
        let cfg = CampaignConfig { target_number_of_epochs: 0, ..with_root() };
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::Zero("target_number_of_epochs")
        );
    }

    #[test]
    fn empty_tiers_rejected() {
        let cfg = CampaignConfig { tier_amounts: vec![], ..with_root() };
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::NoTiers);
    }

    #[test]
    fn bad_prefix_rejected() {
        let cfg = CampaignConfig { address_prefix: "Bad Prefix".into(), ..with_root() };
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::Prefix(AddressError::InvalidPrefix("Bad Prefix".into()))
        );
    }

    #[test]
    fn supply_must_cover_a_payout() {
        let cfg = CampaignConfig {
            tier_amounts: vec![100, 50],
            token_supply: 10,
            ..with_root()
        };
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::SupplyBelowPayout { supply: 10, min_payout: 50 }
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = format!(r#"{{"merkle_root":"{}","claim_fee":5}}"#, "00".repeat(32));
        let cfg: CampaignConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.claim_fee, 5);
        assert_eq!(cfg.target_number_of_epochs, DEFAULT_TARGET_EPOCHS);
        assert_eq!(cfg.identifier_encoding, IdentifierEncoding::Base64);
    }
}
