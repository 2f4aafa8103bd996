// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ethereum deposit watcher CLI.
//!
//! Default action tops up the key pool; `--watch` runs one reconciliation
//! pass (add `--refresh` for the backfill path); `--status` lists open
//! records.

use anyhow::Context;
use clap::Parser;
use eth_deposit_watcher::client::EtherscanClient;
use eth_deposit_watcher::config::WatcherConfig;
use eth_deposit_watcher::keygen::{top_up_pool, KeyFileSink};
use eth_deposit_watcher::store::{FileStore, KeyStore};
use eth_deposit_watcher::watcher::ReconciliationWatcher;
use eth_deposit_watcher::WatchMode;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case", author, version)]
struct Args {
    /// Configuration file (YAML).
    #[clap(env = "WATCHER_CONFIG", long)]
    config: Option<PathBuf>,

    /// Search for transactions for existing addresses.
    #[clap(long)]
    watch: bool,

    /// Force the update path for every allocated address, ignoring the
    /// watch window (backfill/repair).
    #[clap(long)]
    refresh: bool,

    /// Show key statuses.
    #[clap(long)]
    status: bool,

    #[clap(env = "EXPLORER_API_HOST", long)]
    api_host: Option<String>,

    #[clap(env = "EXPLORER_API_KEY", long)]
    api_key: Option<String>,

    /// File for key export.
    #[clap(long)]
    key_file: Option<PathBuf>,

    #[clap(long)]
    store_path: Option<PathBuf>,

    #[clap(long)]
    pool_target: Option<u64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(WatcherConfig, RunMode)> {
        let mut config = match &self.config {
            Some(path) => WatcherConfig::from_file(path)?,
            None => WatcherConfig::default(),
        };

        if let Some(host) = self.api_host {
            config.api_host = host;
        }
        if let Some(key) = self.api_key {
            config.api_key = Some(key);
        }
        if let Some(path) = self.key_file {
            config.key_file = path;
        }
        if let Some(path) = self.store_path {
            config.store_path = path;
        }
        if let Some(target) = self.pool_target {
            config.pool_target = target;
        }

        let mode = if self.status {
            RunMode::Status
        } else if self.watch {
            RunMode::Watch(if self.refresh {
                WatchMode::Refresh
            } else {
                WatchMode::Normal
            })
        } else {
            RunMode::Generate
        };

        Ok((config, mode))
    }
}

enum RunMode {
    Generate,
    Watch(WatchMode),
    Status,
}

async fn run_watch(config: &WatcherConfig, store: Arc<FileStore>, mode: WatchMode) -> anyhow::Result<()> {
    let client = EtherscanClient::new(
        config.api_host.clone(),
        config.api_key.clone(),
        config.fetch_timeout(),
    )?;
    let watcher = ReconciliationWatcher::new(store, Arc::new(client))
        .with_fetch_timeout(config.fetch_timeout());

    let summary = watcher.reconcile(mode).await?;
    for (address, err) in &summary.failures {
        tracing::error!("0x{}: {}", address, err);
    }
    if !summary.is_clean() {
        anyhow::bail!(
            "{}/{} records failed in this pass",
            summary.failures.len(),
            summary.examined
        );
    }
    Ok(())
}

async fn run_status(store: &FileStore) -> anyhow::Result<()> {
    for record in store.list_open().await? {
        info!(
            "id:{} 0x{} used:{} expected:{} received:{} started:{}",
            record.id,
            record.address,
            record.used,
            record.expected_value,
            record.received_value,
            record.started_at
        );
    }
    Ok(())
}

async fn run_generate(config: &WatcherConfig, store: &FileStore) -> anyhow::Result<()> {
    let mut sink = KeyFileSink::open(&config.key_file)?;
    let created = top_up_pool(store, Some(&mut sink), config.pool_target).await?;
    info!(
        "key pool at target {} ({} created this run)",
        config.pool_target, created
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (config, mode) = Args::parse().into_config()?;
    let store =
        Arc::new(FileStore::open(config.store_path.clone()).context("failed to open store")?);

    match mode {
        RunMode::Status => run_status(&store).await,
        RunMode::Watch(watch_mode) => run_watch(&config, store, watch_mode).await,
        RunMode::Generate => run_generate(&config, &store).await,
    }
}
