// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Records exchanged between the watcher, the store and the explorer client.

use chrono::{DateTime, Duration, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// How long an allocated address stays in the normal polling set.
pub const WATCH_WINDOW_HOURS: i64 = 24;

/// Selection mode for a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Poll open records inside their watch window whose received value is
    /// still short of the expected value; skip records whose balance did not
    /// change.
    Normal,
    /// Backfill/repair: poll every allocated, non-completed record regardless
    /// of window or value match, and force the update path.
    Refresh,
}

/// One deposit address tracked by the store.
///
/// `used` and `completed` are flipped by the external allocator, not by the
/// watcher. `completed` permanently excludes the record from polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: u64,
    /// 40 lowercase hex digits, no `0x` prefix.
    pub address: String,
    /// Allocated for a deposit request.
    pub used: bool,
    /// Target value reached; terminal.
    pub completed: bool,
    /// Amount the watcher is waiting to observe, in wei.
    pub expected_value: U256,
    /// Last-known cumulative balance, in wei.
    pub received_value: U256,
    /// Start of the watch window.
    pub started_at: DateTime<Utc>,
}

impl AddressRecord {
    /// Whether this record is selected by a pass in the given mode.
    pub fn is_eligible(&self, mode: WatchMode, now: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        match mode {
            WatchMode::Normal => {
                self.received_value < self.expected_value
                    && now < self.started_at + Duration::hours(WATCH_WINDOW_HOURS)
            }
            WatchMode::Refresh => self.used,
        }
    }
}

/// A transaction observed for a watched address, keyed by its hash.
///
/// Inserted once when first seen and never updated. Wei-denominated fields
/// (`value`, `gas`, `gas_price`, `cumulative_gas_used`) stay in the opaque
/// decimal-string form the explorer serves, so they re-display byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub confirmations: u64,
    pub contract_address: String,
    pub cumulative_gas_used: String,
    pub from: String,
    pub gas: String,
    pub gas_price: String,
    pub to: String,
    pub timestamp: u64,
    pub transaction_index: u32,
    pub value: String,
    pub tx_receipt_status: i32,
    pub is_error: i32,
}
