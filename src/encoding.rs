// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! Byte-level primitives used by address derivation.

use crate::error::{WatcherError, WatcherResult};
use sha3::{Digest, Keccak256};

/// Left-pad a natural big-endian encoding to exactly `width` bytes.
///
/// Padding on the left preserves the numeric value; padding on the right
/// would change it. An input longer than `width` is an error, never a
/// truncation.
pub fn fixed_width_bytes(bytes: &[u8], width: usize) -> WatcherResult<Vec<u8>> {
    if bytes.len() > width {
        return Err(WatcherError::Overflow {
            len: bytes.len(),
            width,
        });
    }

    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Legacy Keccak-256 digest, as used for Ethereum addresses.
///
/// This is the original Keccak padding, not the later-standardized SHA3
/// padding. The two produce different digests for the same input, and the
/// wrong one yields wrong addresses with no format error anywhere.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(bytes));
    out
}
