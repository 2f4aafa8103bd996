// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Block-explorer API client.
//!
//! The explorer is an Etherscan-style HTTP API; the transport itself is a
//! black box that returns a JSON body or fails. Everything numeric in the
//! responses arrives as decimal strings.

use crate::error::{WatcherError, WatcherResult};
use crate::types::TransactionRecord;
use async_trait::async_trait;
use ethers::types::U256;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// External source of balances and transaction histories for an address.
#[async_trait]
pub trait BalanceFetcher: Send + Sync {
    /// Current balance of `address` in wei.
    ///
    /// A response that arrives but does not carry a numeric result is a
    /// [`WatcherError::Parse`], never a zero balance.
    async fn fetch_balance(&self, address: &str) -> WatcherResult<U256>;

    /// Full transaction list for `address`, eagerly materialized. An empty
    /// list is a valid result.
    async fn fetch_transactions(&self, address: &str) -> WatcherResult<Vec<TransactionRecord>>;
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[allow(dead_code)]
    status: String,
    message: String,
    result: String,
}

/// Raw `txlist` entry. Every field is a string on the wire; typed-integer
/// fields are parsed in the conversion to [`TransactionRecord`].
#[derive(Debug, Deserialize)]
pub struct EtherscanTx {
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    pub confirmations: String,
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
    #[serde(rename = "cumulativeGasUsed")]
    pub cumulative_gas_used: String,
    pub from: String,
    pub gas: String,
    #[serde(rename = "gasPrice")]
    pub gas_price: String,
    pub hash: String,
    pub to: String,
    #[serde(rename = "timeStamp")]
    pub timestamp: String,
    #[serde(rename = "transactionIndex")]
    pub transaction_index: String,
    pub value: String,
    #[serde(rename = "txreceipt_status")]
    pub tx_receipt_status: String,
    #[serde(rename = "isError")]
    pub is_error: String,
}

fn parse_field<T: std::str::FromStr>(value: &str, field: &str, hash: &str) -> WatcherResult<T> {
    value.parse().map_err(|_| {
        WatcherError::Parse(format!(
            "tx {}: field {} is not numeric: {:?}",
            hash, field, value
        ))
    })
}

impl TryFrom<EtherscanTx> for TransactionRecord {
    type Error = WatcherError;

    fn try_from(tx: EtherscanTx) -> WatcherResult<Self> {
        // txreceipt_status is empty for pre-Byzantium transactions.
        let tx_receipt_status = if tx.tx_receipt_status.is_empty() {
            -1
        } else {
            parse_field(&tx.tx_receipt_status, "txreceipt_status", &tx.hash)?
        };

        Ok(TransactionRecord {
            block_number: parse_field(&tx.block_number, "blockNumber", &tx.hash)?,
            confirmations: parse_field(&tx.confirmations, "confirmations", &tx.hash)?,
            timestamp: parse_field(&tx.timestamp, "timeStamp", &tx.hash)?,
            transaction_index: parse_field(&tx.transaction_index, "transactionIndex", &tx.hash)?,
            is_error: parse_field(&tx.is_error, "isError", &tx.hash)?,
            tx_receipt_status,
            hash: tx.hash,
            block_hash: tx.block_hash,
            contract_address: tx.contract_address,
            cumulative_gas_used: tx.cumulative_gas_used,
            from: tx.from,
            gas: tx.gas,
            gas_price: tx.gas_price,
            to: tx.to,
            value: tx.value,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    #[allow(dead_code)]
    status: String,
    #[allow(dead_code)]
    message: String,
    result: Vec<EtherscanTx>,
}

/// HTTP client for an Etherscan-compatible API host.
pub struct EtherscanClient {
    http: reqwest::Client,
    api_host: String,
    api_key: Option<String>,
}

impl EtherscanClient {
    pub fn new(
        api_host: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> WatcherResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatcherError::Fetch(e.to_string()))?;
        Ok(Self {
            http,
            api_host: api_host.into(),
            api_key,
        })
    }

    fn url(&self, action: &str, address: &str, extra: &str) -> String {
        let mut url = format!(
            "https://{}/api?module=account&action={}&address=0x{}{}",
            self.api_host, action, address, extra
        );
        if let Some(key) = &self.api_key {
            url.push_str("&apikey=");
            url.push_str(key);
        }
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> WatcherResult<T> {
        debug!("explorer query: {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| WatcherError::Fetch(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| WatcherError::Fetch(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| WatcherError::Parse(e.to_string()))
    }
}

#[async_trait]
impl BalanceFetcher for EtherscanClient {
    async fn fetch_balance(&self, address: &str) -> WatcherResult<U256> {
        let url = self.url("balance", address, "&tag=latest");
        let response: BalanceResponse = self.get_json(&url).await?;

        // On API errors the result field carries a human-readable message
        // instead of a number. Surface it rather than reading zero.
        let balance = U256::from_dec_str(response.result.trim()).map_err(|_| {
            WatcherError::Parse(format!(
                "balance for 0x{}: {} ({})",
                address, response.result, response.message
            ))
        })?;

        debug!("balance of 0x{}: {} wei", address, balance);
        Ok(balance)
    }

    async fn fetch_transactions(&self, address: &str) -> WatcherResult<Vec<TransactionRecord>> {
        let url = self.url(
            "txlist",
            address,
            "&startblock=0&endblock=99999999&sort=asc",
        );
        let response: TxListResponse = self.get_json(&url).await?;

        let txs = response
            .result
            .into_iter()
            .map(TransactionRecord::try_from)
            .collect::<WatcherResult<Vec<_>>>()?;
        debug!("0x{}: {} transactions", address, txs.len());
        Ok(txs)
    }
}
