//! # airdrop-campaign
//! Campaign lifecycle, epoch scheduling, claim ledger and claim processing.
//!
//! [`Campaign`] is the entry point: it owns the state machine, scheduler,
//! payout schedule and ledger, and hands out the claim, admin and epoch
//! driver facets.

mod codec;

pub mod campaign;
pub mod config;
pub mod ledger;
pub mod processor;
pub mod scheduler;
pub mod state_machine;

pub use campaign::{AdminFacet, Campaign, CampaignDeps, CampaignStats, ClaimFacet, EpochDriver};
pub use config::CampaignConfig;
pub use processor::{ClaimProcessor, ClaimRequest};
