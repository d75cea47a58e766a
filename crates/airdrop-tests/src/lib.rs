//! End-to-end and adversarial test suite for airdrop campaigns.
//!
//! The integration tests under `tests/` drive whole campaigns through the
//! public facets and try to break the claim invariants from a claimant's
//! perspective. Shared fixtures live in [`helpers`].

pub mod helpers;
