// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

//! secp256k1 key pair generation and Ethereum address derivation.

use crate::encoding::{fixed_width_bytes, keccak256};
use crate::error::{WatcherError, WatcherResult};
use ethers::types::Address as EthAddress;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;

const SCALAR_LEN: usize = 32;
const UNCOMPRESSED_PUBKEY_LEN: usize = 64;

/// A generated key pair with its derived deposit address.
///
/// Immutable after generation. The private scalar is only exposed through
/// [`KeyPair::private_key`] / [`KeyPair::private_key_hex`] so callers can
/// write it to an explicitly configured sink; it is redacted from `Debug`
/// output and must never be logged.
#[derive(Clone)]
pub struct KeyPair {
    private_key: [u8; SCALAR_LEN],
    public_key: [u8; UNCOMPRESSED_PUBKEY_LEN],
    address: EthAddress,
}

impl KeyPair {
    /// Generate a key pair from a uniformly random private scalar drawn from
    /// the OS CSPRNG.
    ///
    /// Scalars outside the valid range (zero, or >= the curve order) are
    /// rejected and redrawn. A failure of the random source itself surfaces
    /// as [`WatcherError::Entropy`].
    pub fn generate() -> WatcherResult<Self> {
        let mut seed = [0u8; SCALAR_LEN];
        loop {
            OsRng
                .try_fill_bytes(&mut seed)
                .map_err(|e| WatcherError::Entropy(e.to_string()))?;

            if let Ok(secret) = SecretKey::from_slice(&seed) {
                return Self::from_secret(&secret);
            }
        }
    }

    /// Derive the full key pair from a known 32-byte private scalar.
    ///
    /// Deterministic: the same scalar always yields the same address.
    pub fn from_secret_bytes(scalar: &[u8; SCALAR_LEN]) -> WatcherResult<Self> {
        let secret = SecretKey::from_slice(scalar)
            .map_err(|e| WatcherError::InvalidKey(format!("private scalar: {}", e)))?;
        Self::from_secret(&secret)
    }

    fn from_secret(secret: &SecretKey) -> WatcherResult<Self> {
        let mut private_key = [0u8; SCALAR_LEN];
        private_key
            .copy_from_slice(&fixed_width_bytes(&secret.to_bytes(), SCALAR_LEN)?);

        // Uncompressed SEC1 point: 0x04 || X || Y. The 0x04 tag byte is NOT
        // part of the hashed public key.
        let point = secret.public_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| WatcherError::InvalidKey("public point has no affine X".to_string()))?;
        let y = point
            .y()
            .ok_or_else(|| WatcherError::InvalidKey("public point has no affine Y".to_string()))?;

        let mut public_key = [0u8; UNCOMPRESSED_PUBKEY_LEN];
        public_key[..SCALAR_LEN].copy_from_slice(&fixed_width_bytes(x, SCALAR_LEN)?);
        public_key[SCALAR_LEN..].copy_from_slice(&fixed_width_bytes(y, SCALAR_LEN)?);

        // Address = last 20 bytes of Keccak-256(X || Y).
        let digest = keccak256(&public_key);
        let address = EthAddress::from_slice(&digest[12..]);

        Ok(Self {
            private_key,
            public_key,
            address,
        })
    }

    pub fn address(&self) -> EthAddress {
        self.address
    }

    /// Lowercase hex address, no `0x` prefix (the store's canonical form).
    pub fn address_hex(&self) -> String {
        hex::encode(self.address.as_bytes())
    }

    pub fn public_key(&self) -> &[u8; UNCOMPRESSED_PUBKEY_LEN] {
        &self.public_key
    }

    pub fn private_key(&self) -> &[u8; SCALAR_LEN] {
        &self.private_key
    }

    /// 64 lowercase hex digits of the private scalar.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &format_args!("0x{}", self.address_hex()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}
