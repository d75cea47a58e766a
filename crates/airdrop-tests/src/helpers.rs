//! Shared fixtures for campaign integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::Notify;

use airdrop_campaign::campaign::{Campaign, CampaignDeps, STATS_KEY};
use airdrop_campaign::config::CampaignConfig;
use airdrop_campaign::processor::ClaimRequest;
use airdrop_core::address::{CanonicalAddress, IdentifierEncoding};
use airdrop_core::error::{ResolveError, SettlementError, StoreError};
use airdrop_core::merkle::{self, MerkleProof, MerkleTree};
use airdrop_core::store::MemoryStore;
use airdrop_core::timer::ManualTimer;
use airdrop_core::traits::{DurableStore, IdentityResolver, Settlement};
use airdrop_core::types::{Destination, Hash256, SettlementReceipt, Tier, Timestamp, Transfer};

/// Reserve account name used by [`campaign_config`].
pub const RESERVE: &str = "campaign-reserve";
/// Fee collector name used by [`campaign_config`].
pub const FEE_COLLECTOR: &str = "fee-collector";

/// Epoch-0 payouts for tiers 0 and 1.
pub const TIER_AMOUNTS: [u64; 2] = [9_000_000, 4_000_000];
pub const EPOCH_SECS: u64 = 86_400;
pub const START_DELAY_SECS: u64 = 120;
pub const START: Timestamp = Timestamp(1_700_000_000);

// ---------------------------------------------------------------------------
// Eligibility set
// ---------------------------------------------------------------------------

/// A committed eligibility list and its tree.
pub struct Eligibility {
    pub tree: MerkleTree,
}

impl Eligibility {
    /// Build from `(identifier, tier)` pairs. Identifiers are hashed as UTF-8.
    pub fn new(entries: &[(&str, Tier)]) -> Self {
        let leaves: Vec<Hash256> = entries
            .iter()
            .map(|(id, tier)| merkle::leaf_hash(id.as_bytes(), *tier))
            .collect();
        Self {
            tree: MerkleTree::build(&leaves).expect("eligibility tree"),
        }
    }

    /// alice, bob and carol in tier 0, dan in tier 1.
    pub fn standard() -> Self {
        Self::new(&[("alice", 0), ("bob", 0), ("carol", 0), ("dan", 1)])
    }

    pub fn root(&self) -> Hash256 {
        self.tree.root()
    }

    pub fn proof(&self, identifier: &str, tier: Tier) -> MerkleProof {
        self.tree
            .prove_membership(&merkle::leaf_hash(identifier.as_bytes(), tier))
            .expect("identifier is eligible")
    }

    /// A claim for `identifier` recorded under `<identifier>-key`.
    pub fn request(&self, identifier: &str, tier: Tier) -> ClaimRequest {
        ClaimRequest::new(
            identifier,
            tier,
            &self.proof(identifier, tier),
            &claimant_key(identifier),
        )
    }
}

pub fn claimant_key(identifier: &str) -> String {
    format!("{identifier}-key")
}

/// Base64 form of a 32-byte key filled with `seed`.
pub fn base64_pubkey(seed: u8) -> String {
    base64::engine::general_purpose::STANDARD.encode([seed; 32])
}

/// Canonical address for a UTF-8 identifier under the default prefix.
pub fn address_of(identifier: &str) -> String {
    CanonicalAddress::derive(identifier.as_bytes(), "drop")
        .expect("valid prefix")
        .encode()
}

/// Standard test configuration committed to `root`.
pub fn campaign_config(root: Hash256) -> CampaignConfig {
    CampaignConfig {
        merkle_root: root.to_hex(),
        tier_amounts: TIER_AMOUNTS.to_vec(),
        epoch_length_secs: EPOCH_SECS,
        target_number_of_epochs: 5,
        claim_fee: 0,
        start_delay_secs: START_DELAY_SECS,
        identifier_encoding: IdentifierEncoding::Utf8,
        fee_collector: FEE_COLLECTOR.into(),
        reserve_account: RESERVE.into(),
        ..CampaignConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Balance-tracking settlement that applies a batch all-or-nothing.
#[derive(Default)]
pub struct MockSettlement {
    balances: Mutex<HashMap<String, u64>>,
    batches: Mutex<Vec<Vec<Transfer>>>,
    reject: AtomicBool,
    gate: Mutex<Option<Gate>>,
}

/// Suspends the next settlement until released.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl MockSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&self, party: &str, amount: u64) {
        *self.balances.lock().entry(party.to_string()).or_default() += amount;
    }

    pub fn balance(&self, party: &str) -> u64 {
        self.balances.lock().get(party).copied().unwrap_or(0)
    }

    /// Batches applied so far.
    pub fn batches(&self) -> Vec<Vec<Transfer>> {
        self.batches.lock().clone()
    }

    /// Refuse every batch while `true`.
    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Make the next batch wait on the returned gate.
    pub fn hold_next(&self) -> Gate {
        let gate = Gate::default();
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl Settlement for MockSettlement {
    async fn settle(&self, transfers: &[Transfer]) -> Result<SettlementReceipt, SettlementError> {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(SettlementError::Unavailable("ledger offline".into()));
        }

        let mut balances = self.balances.lock();
        let mut staged = balances.clone();
        for t in transfers {
            let have = staged.get(&t.from).copied().unwrap_or(0);
            if have < t.amount {
                return Err(SettlementError::InsufficientBalance {
                    party: t.from.clone(),
                    have,
                    need: t.amount,
                });
            }
            staged.insert(t.from.clone(), have - t.amount);
            *staged.entry(t.to.clone()).or_default() += t.amount;
        }
        *balances = staged;
        drop(balances);

        let mut batches = self.batches.lock();
        batches.push(transfers.to_vec());
        Ok(SettlementReceipt {
            settlement_id: format!("settlement-{}", batches.len()),
            legs: transfers.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolves every address to itself unless it was marked unknown.
#[derive(Default)]
pub struct MockResolver {
    unknown: Mutex<HashSet<String>>,
}

impl MockResolver {
    pub fn forget(&self, address: &str) {
        self.unknown.lock().insert(address.to_string());
    }
}

#[async_trait]
impl IdentityResolver for MockResolver {
    async fn resolve(&self, address: &CanonicalAddress) -> Result<Destination, ResolveError> {
        let encoded = address.encode();
        if self.unknown.lock().contains(&encoded) {
            return Err(ResolveError::NotFound(encoded));
        }
        Ok(Destination(encoded))
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// [`MemoryStore`] whose insert-if-absent, or whose campaign totals
/// writes, can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_init: Arc<AtomicBool>,
    fail_stats: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stats(&self, fail: bool) {
        self.fail_stats.store(fail, Ordering::SeqCst);
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

impl DurableStore for FlakyStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if key == STATS_KEY && self.fail_stats.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.set(key, value)
    }

    fn init(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.init(key, value)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A campaign wired to in-memory collaborators, with a funded reserve.
pub struct Harness {
    pub campaign: Campaign,
    pub timer: ManualTimer,
    pub store: FlakyStore,
    pub settlement: Arc<MockSettlement>,
    pub resolver: Arc<MockResolver>,
    pub eligibility: Eligibility,
}

impl Harness {
    /// Standard eligibility set and configuration.
    pub fn new() -> Self {
        let eligibility = Eligibility::standard();
        let config = campaign_config(eligibility.root());
        Self::with_config(eligibility, &config)
    }

    pub fn with_config(eligibility: Eligibility, config: &CampaignConfig) -> Self {
        let timer = ManualTimer::new(START);
        let store = FlakyStore::default();
        let settlement = Arc::new(MockSettlement::new());
        settlement.credit(&config.reserve_account, config.token_supply);
        let resolver = Arc::new(MockResolver::default());
        let campaign = Campaign::start(
            config,
            CampaignDeps {
                store: Arc::new(store.clone()),
                timer: Arc::new(timer.clone()),
                settlement: settlement.clone(),
                resolver: resolver.clone(),
            },
        )
        .expect("campaign starts");
        Self {
            campaign,
            timer,
            store,
            settlement,
            resolver,
            eligibility,
        }
    }

    /// Time the claim window opens.
    pub fn opens_at(&self) -> Timestamp {
        Timestamp(START.as_secs() + START_DELAY_SECS)
    }

    /// Advance the clock to the opening.
    pub fn open(&self) {
        self.timer.advance_to(self.opens_at());
    }

    /// Advance the clock past `n` more epoch boundaries.
    pub fn advance_epochs(&self, n: u64) {
        for _ in 0..n {
            let boundary = self
                .campaign
                .epoch_driver()
                .next_boundary()
                .expect("a boundary is armed");
            self.timer.advance_to(boundary);
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
