// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ethereum deposit address pool and balance watcher.
//!
//! The crate keeps a pool of freshly generated secp256k1 key pairs whose
//! addresses are handed out for deposits, and reconciles the balances of
//! allocated addresses against a block-explorer API:
//!
//! ```text
//! ┌────────────┐   insert_key_record   ┌──────────┐
//! │  KeyPair   │ ────────────────────▶ │ KeyStore │
//! │ generation │   (+ key file sink)   └────┬─────┘
//! └────────────┘                            │ list_eligible
//!                                           ▼
//!                              ┌────────────────────────┐
//!                              │ ReconciliationWatcher  │
//!                              └───────────┬────────────┘
//!                                          │ fetch_balance / fetch_transactions
//!                                          ▼
//!                                  ┌────────────────┐
//!                                  │ BalanceFetcher │ (Etherscan API)
//!                                  └────────────────┘
//! ```
//!
//! On a balance change the watcher writes the new received value back to the
//! store and persists the address's transaction history with insert-or-ignore
//! semantics, so a repeated pass is idempotent.

pub mod client;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod keygen;
pub mod store;
pub mod types;
pub mod watcher;

pub use error::{WatcherError, WatcherResult};
pub use types::{AddressRecord, TransactionRecord, WatchMode};
pub use watcher::{ReconciliationSummary, ReconciliationWatcher};
