//! Composition of a campaign over RocksDB and the tokio clock.

use std::sync::Arc;

use tracing::{debug, info};

use airdrop_campaign::campaign::{AdminFacet, Campaign, CampaignDeps, ClaimFacet, EpochDriver};
use airdrop_core::error::{AirdropError, StoreError};
use airdrop_core::traits::{IdentityResolver, Settlement};
use airdrop_core::types::CampaignState;

use crate::config::NodeConfig;
use crate::storage::RocksStore;
use crate::timer::TokioTimer;

/// A campaign running against on-disk storage and real time.
pub struct AirdropNode {
    campaign: Campaign,
    store: Arc<RocksStore>,
    timer: TokioTimer,
}

impl AirdropNode {
    /// Open the database under `config.data_dir` and start (or resume) the
    /// campaign. Must be called from within a tokio runtime.
    pub fn open(
        config: &NodeConfig,
        settlement: Arc<dyn Settlement>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self, AirdropError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            StoreError::Backend(format!("create {}: {e}", config.data_dir.display()))
        })?;
        let store = Arc::new(RocksStore::open(config.db_path())?);
        let timer = TokioTimer::new()?;

        let campaign = Campaign::start(
            &config.campaign,
            CampaignDeps {
                store: store.clone(),
                timer: Arc::new(timer.clone()),
                settlement,
                resolver,
            },
        )?;
        info!(
            data_dir = %config.data_dir.display(),
            status = %campaign.status(),
            "airdrop node ready"
        );

        Ok(Self {
            campaign,
            store,
            timer,
        })
    }

    pub fn claim_facet(&self) -> ClaimFacet {
        self.campaign.claim_facet()
    }

    pub fn admin_facet(&self) -> AdminFacet {
        self.campaign.admin_facet()
    }

    pub fn epoch_driver(&self) -> EpochDriver {
        self.campaign.epoch_driver()
    }

    pub fn status(&self) -> CampaignState {
        self.campaign.status()
    }

    /// Underlying storage, for inspection.
    pub fn store(&self) -> &RocksStore {
        &self.store
    }

    /// Wake-ups currently scheduled on the tokio clock.
    pub fn pending_wakeups(&self) -> usize {
        self.timer.pending_count()
    }

    /// Resolve once the campaign has expired.
    pub async fn run_until_expired(&self) {
        let mut shutdown = self.campaign.shutdown_signal();
        if shutdown.wait_for(|expired| *expired).await.is_err() {
            debug!("shutdown signal dropped before expiry");
            return;
        }
        info!("campaign expired, node stopping");
    }
}
