// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Balance reconciliation over the eligible address set.

use crate::client::BalanceFetcher;
use crate::error::{WatcherError, WatcherResult};
use crate::store::KeyStore;
use crate::types::{AddressRecord, WatchMode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconciliationSummary {
    /// Eligible records the pass looked at.
    pub examined: usize,
    /// Records whose received value was rewritten (and history refetched).
    pub updated: usize,
    /// Per-record failures; the pass continues past these so one bad record
    /// cannot block progress on the rest.
    pub failures: Vec<(String, WatcherError)>,
}

impl ReconciliationSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Polls eligible records sequentially and persists observed changes.
///
/// Polling is deliberately sequential: the explorer API expects a modest
/// request rate and the pass is I/O-bound, so there is nothing to win from
/// concurrency here. Updates already applied are never rolled back; a retry
/// of the pass is idempotent because balance updates and transaction inserts
/// are themselves idempotent.
pub struct ReconciliationWatcher<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    fetch_timeout: Duration,
}

impl<S: KeyStore, F: BalanceFetcher> ReconciliationWatcher<S, F> {
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self {
            store,
            fetcher,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Run one pass over the currently eligible records.
    ///
    /// A store listing failure fails the pass; per-record fetch or persistence
    /// failures are collected in the summary instead.
    pub async fn reconcile(&self, mode: WatchMode) -> WatcherResult<ReconciliationSummary> {
        let records = self.store.list_eligible(mode).await?;
        if records.is_empty() {
            debug!("no record to look after");
        }

        let mut summary = ReconciliationSummary::default();
        for record in records {
            summary.examined += 1;
            match self.poll_record(&record, mode).await {
                Ok(true) => summary.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "0x{}: {} failure in reconciliation pass: {}",
                        record.address,
                        e.error_type(),
                        e
                    );
                    summary.failures.push((record.address.clone(), e));
                }
            }
        }

        info!(
            "reconciliation pass done: examined={} updated={} failed={}",
            summary.examined,
            summary.updated,
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Poll one record. Returns whether the update path ran.
    async fn poll_record(&self, record: &AddressRecord, mode: WatchMode) -> WatcherResult<bool> {
        debug!("looking at 0x{}", record.address);

        let balance = self
            .with_timeout(self.fetcher.fetch_balance(&record.address))
            .await?;

        if balance == record.received_value && mode == WatchMode::Normal {
            debug!("0x{}: no balance change", record.address);
            return Ok(false);
        }

        info!(
            "0x{}: received value {} -> {}",
            record.address, record.received_value, balance
        );
        self.store
            .update_received_value(&record.address, balance)
            .await?;

        let txs = self
            .with_timeout(self.fetcher.fetch_transactions(&record.address))
            .await?;
        let mut inserted = 0usize;
        let total = txs.len();
        for tx in txs {
            if self.store.insert_transaction_if_absent(tx).await? {
                inserted += 1;
            }
        }
        debug!(
            "0x{}: stored {}/{} transactions ({} already known)",
            record.address,
            inserted,
            total,
            total - inserted
        );

        Ok(true)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = WatcherResult<T>>,
    ) -> WatcherResult<T> {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .map_err(|_| {
                WatcherError::Fetch(format!(
                    "explorer call exceeded {:?} timeout",
                    self.fetch_timeout
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use crate::types::TransactionRecord;
    use async_trait::async_trait;
    use ethers::types::U256;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Canned explorer responses with call counting.
    #[derive(Default)]
    struct MockFetcher {
        balances: Mutex<HashMap<String, WatcherResult<U256>>>,
        transactions: Mutex<HashMap<String, Vec<TransactionRecord>>>,
        tx_fetches: Mutex<usize>,
    }

    impl MockFetcher {
        fn set_balance(&self, address: &str, balance: u64) {
            self.balances
                .lock()
                .unwrap()
                .insert(address.to_string(), Ok(U256::from(balance)));
        }

        fn set_balance_error(&self, address: &str, err: WatcherError) {
            self.balances
                .lock()
                .unwrap()
                .insert(address.to_string(), Err(err));
        }

        fn set_transactions(&self, address: &str, txs: Vec<TransactionRecord>) {
            self.transactions
                .lock()
                .unwrap()
                .insert(address.to_string(), txs);
        }

        fn tx_fetch_count(&self) -> usize {
            *self.tx_fetches.lock().unwrap()
        }
    }

    #[async_trait]
    impl BalanceFetcher for MockFetcher {
        async fn fetch_balance(&self, address: &str) -> WatcherResult<U256> {
            self.balances
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_else(|| Err(WatcherError::Fetch(format!("no mock for {}", address))))
        }

        async fn fetch_transactions(
            &self,
            address: &str,
        ) -> WatcherResult<Vec<TransactionRecord>> {
            *self.tx_fetches.lock().unwrap() += 1;
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn tx(hash: &str, to: &str) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            block_hash: "0xblock".to_string(),
            block_number: 46147,
            confirmations: 12,
            contract_address: String::new(),
            cumulative_gas_used: "21000".to_string(),
            from: "0xsender".to_string(),
            gas: "21000".to_string(),
            gas_price: "1000000000".to_string(),
            to: format!("0x{}", to),
            timestamp: 1_700_000_000,
            transaction_index: 0,
            value: "100".to_string(),
            tx_receipt_status: 1,
            is_error: 0,
        }
    }

    async fn seeded_store(dir: &TempDir, address: &str, expected: u64) -> Arc<FileStore> {
        let store = Arc::new(FileStore::open(dir.path().join("store.json")).unwrap());
        store.insert_key_record(address).await.unwrap();
        store.allocate(address, U256::from(expected)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_balance_change_updates_store_and_history() {
        let dir = TempDir::new().unwrap();
        let addr = "9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f";
        let store = seeded_store(&dir, addr, 100).await;

        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set_balance(addr, 100);
        fetcher.set_transactions(addr, vec![tx("h1", addr), tx("h2", addr)]);

        let watcher = ReconciliationWatcher::new(store.clone(), fetcher.clone());
        let summary = watcher.reconcile(WatchMode::Normal).await.unwrap();
        assert_eq!(summary.examined, 1);
        assert_eq!(summary.updated, 1);
        assert!(summary.is_clean());

        let open = store.list_open().await.unwrap();
        assert_eq!(open[0].received_value, U256::from(100u64));
        assert_eq!(store.transaction_count().await, 2);

        // Second pass with the same fetcher outputs: the target is reached,
        // so the record drops out of the eligible set, and nothing changes.
        let summary = watcher.reconcile(WatchMode::Normal).await.unwrap();
        assert_eq!(summary.examined, 0);
        assert_eq!(store.transaction_count().await, 2);
        assert_eq!(
            store.list_open().await.unwrap()[0].received_value,
            U256::from(100u64)
        );
    }

    #[tokio::test]
    async fn test_unchanged_balance_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let addr = "aa00000000000000000000000000000000000001";
        let store = seeded_store(&dir, addr, 100).await;
        store
            .update_received_value(addr, U256::from(40u64))
            .await
            .unwrap();

        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set_balance(addr, 40);

        let watcher = ReconciliationWatcher::new(store.clone(), fetcher.clone());
        let summary = watcher.reconcile(WatchMode::Normal).await.unwrap();
        assert_eq!(summary.examined, 1);
        assert_eq!(summary.updated, 0);
        // No transaction fetch happened for the unchanged record.
        assert_eq!(fetcher.tx_fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_forces_update_path() {
        let dir = TempDir::new().unwrap();
        let addr = "aa00000000000000000000000000000000000002";
        let store = seeded_store(&dir, addr, 100).await;
        store
            .update_received_value(addr, U256::from(40u64))
            .await
            .unwrap();

        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set_balance(addr, 40); // equal to stored value
        fetcher.set_transactions(addr, vec![tx("h1", addr)]);

        let watcher = ReconciliationWatcher::new(store.clone(), fetcher.clone());
        let summary = watcher.reconcile(WatchMode::Refresh).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(fetcher.tx_fetch_count(), 1);
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_one_bad_record_does_not_block_the_rest() {
        let dir = TempDir::new().unwrap();
        let bad = "aa00000000000000000000000000000000000003";
        let good = "bb00000000000000000000000000000000000004";
        let store = Arc::new(FileStore::open(dir.path().join("store.json")).unwrap());
        for addr in [bad, good] {
            store.insert_key_record(addr).await.unwrap();
            store.allocate(addr, U256::from(100u64)).await.unwrap();
        }

        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set_balance_error(bad, WatcherError::Parse("Max rate limit reached".to_string()));
        fetcher.set_balance(good, 100);
        fetcher.set_transactions(good, vec![tx("h1", good)]);

        let watcher = ReconciliationWatcher::new(store.clone(), fetcher.clone());
        let summary = watcher.reconcile(WatchMode::Normal).await.unwrap();
        assert_eq!(summary.examined, 2);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, bad);
        assert_eq!(summary.failures[0].1.error_type(), "parse");

        // The good record's updates were applied despite the neighbor.
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_stalled_fetch_times_out_as_record_failure() {
        /// Never answers within any reasonable deadline.
        struct StalledFetcher;

        #[async_trait]
        impl BalanceFetcher for StalledFetcher {
            async fn fetch_balance(&self, _address: &str) -> WatcherResult<U256> {
                tokio::time::sleep(Duration::from_secs(300)).await;
                Ok(U256::zero())
            }

            async fn fetch_transactions(
                &self,
                _address: &str,
            ) -> WatcherResult<Vec<TransactionRecord>> {
                Ok(vec![])
            }
        }

        let dir = TempDir::new().unwrap();
        let addr = "aa00000000000000000000000000000000000006";
        let store = seeded_store(&dir, addr, 100).await;

        let watcher = ReconciliationWatcher::new(store.clone(), Arc::new(StalledFetcher))
            .with_fetch_timeout(Duration::from_millis(50));
        let summary = watcher.reconcile(WatchMode::Normal).await.unwrap();

        // The stalled call is cut off and charged to the record, not the pass.
        assert_eq!(summary.examined, 1);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, addr);
        assert_eq!(summary.failures[0].1.error_type(), "fetch");
        // The stored value was never rewritten.
        assert_eq!(
            store.list_open().await.unwrap()[0].received_value,
            U256::zero()
        );
    }

    #[tokio::test]
    async fn test_duplicate_hashes_from_fetcher_collapse() {
        let dir = TempDir::new().unwrap();
        let addr = "aa00000000000000000000000000000000000005";
        let store = seeded_store(&dir, addr, 100).await;

        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set_balance(addr, 60);
        fetcher.set_transactions(addr, vec![tx("h1", addr), tx("h1", addr)]);

        let watcher = ReconciliationWatcher::new(store.clone(), fetcher.clone());
        watcher.reconcile(WatchMode::Normal).await.unwrap();
        assert_eq!(store.transaction_count().await, 1);

        // A later pass re-serving the same history inserts nothing new.
        fetcher.set_balance(addr, 80);
        watcher.reconcile(WatchMode::Normal).await.unwrap();
        assert_eq!(store.transaction_count().await, 1);
    }
}
