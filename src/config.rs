// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Watcher configuration.
//!
//! Loaded from an optional YAML file and overridden by CLI flags; the merged
//! value is passed explicitly into the components that need it. There is no
//! process-wide mutable configuration state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Explorer API host, e.g. `api.etherscan.io`.
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Optional explorer API key, appended to every query.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Append-only file receiving generated key pairs.
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,

    /// JSON snapshot file backing the store.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Number of unallocated addresses to keep on hand.
    #[serde(default = "default_pool_target")]
    pub pool_target: u64,

    /// Per-call deadline for explorer fetches, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_api_host() -> String {
    "api-ropsten.etherscan.io".to_string()
}

fn default_key_file() -> PathBuf {
    PathBuf::from("./private-keys")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./watcher-state.json")
}

fn default_pool_target() -> u64 {
    20
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_key: None,
            key_file: default_key_file(),
            store_path: default_store_path(),
            pool_target: default_pool_target(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl WatcherConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        serde_yaml::from_str(&contents).context("failed to parse config YAML")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
