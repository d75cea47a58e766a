//! RocksDB-backed [`DurableStore`].
//!
//! Committed claim records (keys under `claims/`) live in their own column
//! family; everything else (status, scheduler progress, payout schedule,
//! totals) lives in `campaign`. Writes are synced to disk before returning.
//!
//! RocksDB has no native insert-if-absent, so [`DurableStore::init`] holds
//! a process-local lock across the existence check and the write.

use std::path::Path;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteOptions, DB};
use tracing::debug;

use airdrop_campaign::ledger::CLAIM_KEY_PREFIX;
use airdrop_core::error::StoreError;
use airdrop_core::traits::DurableStore;

// --- Column family names ---

const CF_CAMPAIGN: &str = "campaign";
const CF_CLAIMS: &str = "claims";

const ALL_CFS: &[&str] = &[CF_CAMPAIGN, CF_CLAIMS];

fn backend(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Persistent campaign storage.
pub struct RocksStore {
    db: DB,
    init_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a database at `path`, creating column families as
    /// needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(backend)?;
        debug!(path = %path.as_ref().display(), "campaign database opened");

        Ok(Self {
            db,
            init_lock: Mutex::new(()),
        })
    }

    /// Number of committed claim records.
    pub fn claim_count(&self) -> Result<u64, StoreError> {
        let cf = self.cf_handle(CF_CLAIMS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item.map_err(backend)?;
            count += 1;
        }
        Ok(count)
    }

    /// Claimant keys with committed records, in byte order.
    pub fn claim_keys(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf_handle(CF_CLAIMS)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (key, _) = item.map_err(backend)?;
                String::from_utf8(key.into_vec())
                    .map_err(|e| StoreError::Codec(format!("claim key: {e}")))
            })
            .collect()
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }

    /// Column family and in-family key for a namespaced store key.
    fn locate<'k>(&self, key: &'k [u8]) -> Result<(&rocksdb::ColumnFamily, &'k [u8]), StoreError> {
        match key.strip_prefix(CLAIM_KEY_PREFIX.as_bytes()) {
            Some(rest) => Ok((self.cf_handle(CF_CLAIMS)?, rest)),
            None => Ok((self.cf_handle(CF_CAMPAIGN)?, key)),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let (cf, key) = self.locate(key)?;
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        self.db.put_cf_opt(cf, key, value, &opts).map_err(backend)
    }
}

impl DurableStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let (cf, key) = self.locate(key)?;
        self.db.get_cf(cf, key).map_err(backend)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.put(key, value)
    }

    fn init(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let _guard = self.init_lock.lock();
        if self.has(key)? {
            return Err(StoreError::AlreadyExists(
                String::from_utf8_lossy(key).into_owned(),
            ));
        }
        self.put(key, value)
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        let (cf, key) = self.locate(key)?;
        Ok(self.db.get_pinned_cf(cf, key).map_err(backend)?.is_some())
    }
}
