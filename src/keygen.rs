// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Key-pool top-up: generates key pairs until the store holds the configured
//! number of unallocated addresses, appending each pair to the key file.

use crate::crypto::KeyPair;
use crate::error::{WatcherError, WatcherResult};
use crate::store::KeyStore;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Append-only sink for generated key pairs.
///
/// Line format is a persisted contract consumed by downstream tooling:
/// `<0x-prefixed lowercase address hex>;<64 lowercase hex digits of private key>`
pub struct KeyFileSink {
    file: std::fs::File,
}

impl KeyFileSink {
    pub fn open(path: &Path) -> WatcherResult<Self> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options
            .open(path)
            .map_err(|e| WatcherError::Persistence(format!("open key file {:?}: {}", path, e)))?;
        Ok(Self { file })
    }

    pub fn append(&mut self, pair: &KeyPair) -> WatcherResult<()> {
        writeln!(
            self.file,
            "0x{};{}",
            pair.address_hex(),
            pair.private_key_hex()
        )
        .map_err(|e| WatcherError::Persistence(format!("write key file: {}", e)))
    }
}

/// Generate keys until `target` unallocated addresses exist in the store.
///
/// Each new pair is appended to the sink before its address record is stored,
/// so a crash between the two leaves a recoverable key file line rather than
/// a stored address with no private key. Returns the number of keys created.
pub async fn top_up_pool<S: KeyStore>(
    store: &S,
    sink: Option<&mut KeyFileSink>,
    target: u64,
) -> WatcherResult<usize> {
    let unused = store.unused_count().await?;
    if unused >= target {
        info!("no need to create new keys ({} unallocated in store)", unused);
        return Ok(0);
    }

    let needed = (target - unused) as usize;
    debug!("required to create {} new keys", needed);

    let mut sink = sink;
    for _ in 0..needed {
        let pair = KeyPair::generate()?;
        if let Some(sink) = sink.as_deref_mut() {
            sink.append(&pair)?;
        }
        store.insert_key_record(&pair.address_hex()).await?;
    }

    info!("created {} new keys", needed);
    Ok(needed)
}
