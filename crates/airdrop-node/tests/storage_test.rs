//! RocksDB storage and node composition tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use airdrop_campaign::campaign::{Campaign, CampaignDeps};
use airdrop_campaign::config::CampaignConfig;
use airdrop_campaign::processor::ClaimRequest;
use airdrop_core::address::{CanonicalAddress, IdentifierEncoding};
use airdrop_core::error::{ClaimError, ResolveError, SettlementError, StoreError};
use airdrop_core::merkle::{self, MerkleTree};
use airdrop_core::timer::ManualTimer;
use airdrop_core::traits::{DurableStore, IdentityResolver, Settlement};
use airdrop_core::types::{CampaignState, Destination, SettlementReceipt, Timestamp, Transfer};
use airdrop_node::{AirdropNode, NodeConfig, RocksStore};

#[derive(Default)]
struct CountingSettlement {
    batches: Mutex<usize>,
}

#[async_trait]
impl Settlement for CountingSettlement {
    async fn settle(&self, transfers: &[Transfer]) -> Result<SettlementReceipt, SettlementError> {
        let mut batches = self.batches.lock();
        *batches += 1;
        Ok(SettlementReceipt {
            settlement_id: format!("batch-{}", *batches),
            legs: transfers.len(),
        })
    }
}

struct EchoResolver;

#[async_trait]
impl IdentityResolver for EchoResolver {
    async fn resolve(&self, address: &CanonicalAddress) -> Result<Destination, ResolveError> {
        Ok(Destination(address.encode()))
    }
}

fn tree() -> MerkleTree {
    let leaves: Vec<_> = ["alice", "bob", "carol"]
        .iter()
        .map(|id| merkle::leaf_hash(id.as_bytes(), 0))
        .collect();
    MerkleTree::build(&leaves).unwrap()
}

fn campaign_config(tree: &MerkleTree) -> CampaignConfig {
    CampaignConfig {
        merkle_root: tree.root().to_hex(),
        tier_amounts: vec![1_000],
        epoch_length_secs: 100,
        target_number_of_epochs: 2,
        start_delay_secs: 10,
        token_supply: 10_000,
        identifier_encoding: IdentifierEncoding::Utf8,
        ..CampaignConfig::default()
    }
}

fn claim(tree: &MerkleTree, id: &str) -> ClaimRequest {
    let proof = tree.prove_membership(&merkle::leaf_hash(id.as_bytes(), 0)).unwrap();
    ClaimRequest::new(id, 0, &proof, &format!("{id}-key"))
}

// ---------------------------------------------------------------------------
// RocksStore
// ---------------------------------------------------------------------------

#[test]
fn get_missing_key_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.get(b"campaign/status").unwrap(), None);
    assert!(!store.has(b"claims/nobody").unwrap());
}

#[test]
fn set_overwrites_and_init_refuses() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();

    store.set(b"campaign/status", b"one").unwrap();
    store.set(b"campaign/status", b"two").unwrap();
    assert_eq!(store.get(b"campaign/status").unwrap(), Some(b"two".to_vec()));

    store.init(b"claims/bob-key", b"record").unwrap();
    let err = store.init(b"claims/bob-key", b"other").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(k) if k == "claims/bob-key"));
    assert_eq!(store.get(b"claims/bob-key").unwrap(), Some(b"record".to_vec()));
}

#[test]
fn claim_keys_live_in_their_own_family() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();

    store.set(b"campaign/stats", b"x").unwrap();
    store.init(b"claims/carol-key", b"c").unwrap();
    store.init(b"claims/alice-key", b"a").unwrap();

    assert_eq!(store.claim_count().unwrap(), 2);
    assert_eq!(store.claim_keys().unwrap(), vec!["alice-key", "carol-key"]);
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = RocksStore::open(dir.path()).unwrap();
        store.set(b"campaign/scheduler", b"snapshot").unwrap();
        store.init(b"claims/dan-key", b"d").unwrap();
    }
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.get(b"campaign/scheduler").unwrap(), Some(b"snapshot".to_vec()));
    assert!(store.has(b"claims/dan-key").unwrap());
    assert_eq!(store.claim_count().unwrap(), 1);
}

#[test]
fn concurrent_init_has_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || store.init(b"claims/race", &[i]).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

// ---------------------------------------------------------------------------
// Campaign over RocksStore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn campaign_resumes_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let tree = tree();
    let config = campaign_config(&tree);
    let settlement = Arc::new(CountingSettlement::default());

    {
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let timer = ManualTimer::new(Timestamp(0));
        let campaign = Campaign::start(
            &config,
            CampaignDeps {
                store: store.clone(),
                timer: Arc::new(timer.clone()),
                settlement: settlement.clone(),
                resolver: Arc::new(EchoResolver),
            },
        )
        .unwrap();
        timer.advance_to(Timestamp(10));
        let record = campaign
            .claim_facet()
            .submit_claim(&claim(&tree, "bob"))
            .await
            .unwrap();
        assert_eq!(record.amount_allocated, 1_000);
        assert_eq!(store.claim_keys().unwrap(), vec!["bob-key"]);
    }

    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    let timer = ManualTimer::new(Timestamp(50));
    let campaign = Campaign::start(
        &config,
        CampaignDeps {
            store,
            timer: Arc::new(timer.clone()),
            settlement: settlement.clone(),
            resolver: Arc::new(EchoResolver),
        },
    )
    .unwrap();
    let claims = campaign.claim_facet();

    assert_eq!(claims.status(), CampaignState::Open);
    assert!(claims.has_claimed("bob-key").unwrap());
    assert_eq!(claims.stats().claims_paid, 1);
    assert_eq!(claims.stats().reserve_remaining, 9_000);
    assert_eq!(
        claims.submit_claim(&claim(&tree, "bob")).await.unwrap_err(),
        ClaimError::DuplicateClaim("bob-key".into())
    );
    assert_eq!(*settlement.batches.lock(), 1);

    // The restored boundary is still the one armed before the restart.
    assert_eq!(campaign.epoch_driver().next_boundary(), Some(Timestamp(110)));
    timer.advance_to(Timestamp(110));
    assert_eq!(claims.epoch(), 1);
    assert_eq!(claims.payout_values(), vec![500]);
}

// ---------------------------------------------------------------------------
// AirdropNode
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn node_runs_campaign_to_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let tree = tree();
    let config = NodeConfig {
        data_dir: dir.path().join("node"),
        campaign: campaign_config(&tree),
        ..NodeConfig::default()
    };

    let node = AirdropNode::open(
        &config,
        Arc::new(CountingSettlement::default()),
        Arc::new(EchoResolver),
    )
    .unwrap();
    assert_eq!(node.status(), CampaignState::Prepared);
    assert_eq!(node.pending_wakeups(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(node.status(), CampaignState::Open);
    node.claim_facet()
        .submit_claim(&claim(&tree, "alice"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1_000), node.run_until_expired())
        .await
        .unwrap();
    assert_eq!(node.status(), CampaignState::Expired);
    assert_eq!(node.pending_wakeups(), 0);
    assert_eq!(node.store().claim_keys().unwrap(), vec!["alice-key"]);
}
