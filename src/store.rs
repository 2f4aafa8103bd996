// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Persistence contracts and the file-backed store used by the binary.
//!
//! The relational backend proper is an external collaborator; the watcher and
//! the generation path only see the [`KeyStore`] trait. [`FileStore`] is a
//! JSON-snapshot implementation of the same contract.

use crate::error::{WatcherError, WatcherResult};
use crate::types::{AddressRecord, TransactionRecord, WatchMode};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Store contract consumed by the watcher and the generation path.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Records selected for a reconciliation pass in the given mode.
    async fn list_eligible(&self, mode: WatchMode) -> WatcherResult<Vec<AddressRecord>>;

    /// All non-completed records, for status display.
    async fn list_open(&self) -> WatcherResult<Vec<AddressRecord>>;

    /// Number of records not yet allocated for a deposit.
    async fn unused_count(&self) -> WatcherResult<u64>;

    /// Record a freshly generated address; returns its record id.
    async fn insert_key_record(&self, address: &str) -> WatcherResult<u64>;

    /// Overwrite the last-known received balance for `address`.
    async fn update_received_value(&self, address: &str, value: U256) -> WatcherResult<()>;

    /// Insert a transaction unless one with the same hash already exists.
    /// Returns whether a row was actually inserted; a duplicate is a no-op,
    /// not an error.
    async fn insert_transaction_if_absent(&self, tx: TransactionRecord) -> WatcherResult<bool>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    next_id: u64,
    /// Keyed by 40-hex-digit address.
    keys: BTreeMap<String, AddressRecord>,
    /// Keyed by transaction hash.
    transactions: BTreeMap<String, TransactionRecord>,
}

/// JSON-snapshot store, persisted to disk after every mutation.
pub struct FileStore {
    file_path: PathBuf,
    snapshot: RwLock<StoreSnapshot>,
}

impl FileStore {
    /// Open an existing snapshot file, or start empty if none exists yet.
    pub fn open(file_path: PathBuf) -> WatcherResult<Self> {
        let snapshot = if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path)
                .map_err(|e| WatcherError::Persistence(format!("read {:?}: {}", file_path, e)))?;
            let snapshot: StoreSnapshot = serde_json::from_str(&contents)
                .map_err(|e| WatcherError::Persistence(format!("parse {:?}: {}", file_path, e)))?;
            info!(
                "loaded store from {:?}: {} keys, {} transactions",
                file_path,
                snapshot.keys.len(),
                snapshot.transactions.len()
            );
            snapshot
        } else {
            StoreSnapshot {
                version: 1,
                next_id: 1,
                ..Default::default()
            }
        };

        Ok(Self {
            file_path,
            snapshot: RwLock::new(snapshot),
        })
    }

    fn save(&self, snapshot: &StoreSnapshot) -> WatcherResult<()> {
        let contents = serde_json::to_string_pretty(snapshot)
            .map_err(|e| WatcherError::Persistence(format!("serialize store: {}", e)))?;
        std::fs::write(&self.file_path, contents)
            .map_err(|e| WatcherError::Persistence(format!("write {:?}: {}", self.file_path, e)))
    }

    /// Allocation hook for the external collaborator that hands addresses
    /// out: marks the record used and opens its watch window.
    pub async fn allocate(&self, address: &str, expected_value: U256) -> WatcherResult<()> {
        let mut snapshot = self.snapshot.write().await;
        let record = snapshot
            .keys
            .get_mut(address)
            .ok_or_else(|| WatcherError::Persistence(format!("no record for {}", address)))?;
        record.used = true;
        record.expected_value = expected_value;
        record.started_at = Utc::now();
        self.save(&snapshot)
    }

    /// Terminal flag, set once the expected value has been reached.
    pub async fn mark_completed(&self, address: &str) -> WatcherResult<()> {
        let mut snapshot = self.snapshot.write().await;
        let record = snapshot
            .keys
            .get_mut(address)
            .ok_or_else(|| WatcherError::Persistence(format!("no record for {}", address)))?;
        record.completed = true;
        self.save(&snapshot)
    }

    pub async fn transaction_count(&self) -> usize {
        self.snapshot.read().await.transactions.len()
    }
}

#[async_trait]
impl KeyStore for FileStore {
    async fn list_eligible(&self, mode: WatchMode) -> WatcherResult<Vec<AddressRecord>> {
        let snapshot = self.snapshot.read().await;
        let now = Utc::now();
        Ok(snapshot
            .keys
            .values()
            .filter(|r| r.is_eligible(mode, now))
            .cloned()
            .collect())
    }

    async fn list_open(&self) -> WatcherResult<Vec<AddressRecord>> {
        let snapshot = self.snapshot.read().await;
        let mut open: Vec<_> = snapshot
            .keys
            .values()
            .filter(|r| !r.completed)
            .cloned()
            .collect();
        open.sort_by_key(|r| r.id);
        Ok(open)
    }

    async fn unused_count(&self) -> WatcherResult<u64> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.keys.values().filter(|r| !r.used).count() as u64)
    }

    async fn insert_key_record(&self, address: &str) -> WatcherResult<u64> {
        let mut snapshot = self.snapshot.write().await;
        if let Some(existing) = snapshot.keys.get(address) {
            return Ok(existing.id);
        }

        let id = snapshot.next_id;
        snapshot.next_id += 1;
        snapshot.keys.insert(
            address.to_string(),
            AddressRecord {
                id,
                address: address.to_string(),
                used: false,
                completed: false,
                expected_value: U256::zero(),
                received_value: U256::zero(),
                started_at: Utc::now(),
            },
        );
        self.save(&snapshot)?;
        debug!("stored key record id={} address={}", id, address);
        Ok(id)
    }

    async fn update_received_value(&self, address: &str, value: U256) -> WatcherResult<()> {
        let mut snapshot = self.snapshot.write().await;
        let record = snapshot
            .keys
            .get_mut(address)
            .ok_or_else(|| WatcherError::Persistence(format!("no record for {}", address)))?;
        record.received_value = value;
        self.save(&snapshot)
    }

    async fn insert_transaction_if_absent(&self, tx: TransactionRecord) -> WatcherResult<bool> {
        let mut snapshot = self.snapshot.write().await;
        if snapshot.transactions.contains_key(&tx.hash) {
            return Ok(false);
        }
        snapshot.transactions.insert(tx.hash.clone(), tx);
        self.save(&snapshot)?;
        Ok(true)
    }
}
