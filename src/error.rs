// Copyright (c) The eth-deposit-watcher Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure taxonomy for key generation and reconciliation.
///
/// A parse failure is deliberately distinct from a zero balance: callers must
/// be able to tell "no balance" apart from "could not tell".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatcherError {
    /// The OS random source failed or is exhausted. Aborts the generation run.
    #[error("entropy source failure: {0}")]
    Entropy(String),

    /// Caller-supplied key material is not a valid curve scalar (zero or
    /// outside the curve order).
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// A value's natural big-endian encoding exceeds the requested field
    /// width. Indicates corrupted key material; never silently truncated.
    #[error("value of {len} bytes does not fit in a {width}-byte field")]
    Overflow { len: usize, width: usize },

    /// Transport-level failure reaching the explorer API. Recoverable by
    /// retrying the reconciliation pass; not auto-retried internally.
    #[error("explorer fetch failed: {0}")]
    Fetch(String),

    /// Malformed or unexpected explorer API response.
    #[error("unparseable explorer response: {0}")]
    Parse(String),

    /// Store read/write failure.
    #[error("store failure: {0}")]
    Persistence(String),
}

impl WatcherError {
    /// Short identifier for the error class, for logs and summaries.
    pub fn error_type(&self) -> &'static str {
        match self {
            WatcherError::Entropy(_) => "entropy",
            WatcherError::InvalidKey(_) => "invalid_key",
            WatcherError::Overflow { .. } => "overflow",
            WatcherError::Fetch(_) => "fetch",
            WatcherError::Parse(_) => "parse",
            WatcherError::Persistence(_) => "persistence",
        }
    }
}

pub type WatcherResult<T> = Result<T, WatcherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_labels() {
        let cases = vec![
            (WatcherError::Entropy("closed".to_string()), "entropy"),
            (
                WatcherError::InvalidKey("zero scalar".to_string()),
                "invalid_key",
            ),
            (WatcherError::Overflow { len: 33, width: 32 }, "overflow"),
            (WatcherError::Fetch("timeout".to_string()), "fetch"),
            (WatcherError::Parse("NOTOK".to_string()), "parse"),
            (WatcherError::Persistence("disk".to_string()), "persistence"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.error_type(), expected);
        }
    }

    #[test]
    fn test_overflow_display_names_both_sizes() {
        let err = WatcherError::Overflow { len: 33, width: 32 };
        let msg = err.to_string();
        assert!(msg.contains("33"));
        assert!(msg.contains("32"));
    }
}
