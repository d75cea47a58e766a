//! # airdrop-core
//! Foundation types, Merkle proofs, payout schedule and collaborator traits
//! for epoch-decaying airdrop campaigns.

pub mod address;
pub mod constants;
pub mod error;
pub mod merkle;
pub mod schedule;
pub mod store;
pub mod timer;
pub mod traits;
pub mod types;
