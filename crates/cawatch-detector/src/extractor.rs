//! Contract-address extraction from free-form text.
//!
//! Two disjoint shapes are recognised on whole ASCII alphanumeric runs:
//! - base58, 32-44 characters → `ChainHint::Solana`
//! - `0x` + 40 hex digits (any case) → `ChainHint::Evm`
//!
//! A shape embedded inside a longer alphanumeric run does not match.

use cawatch_core::ChainHint;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static ALNUM_RUN: Lazy<Regex> = Lazy::new(|| {
    // Static pattern, always valid.
    Regex::new(r"[0-9A-Za-z]+").unwrap()
});

static BASE58: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").unwrap());

static EVM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0[xX][0-9a-fA-F]{40}$").unwrap());

/// A candidate address with its lexical chain hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Address as written in the text.
    pub address: String,
    pub hint: ChainHint,
}

/// Stateless address extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressExtractor;

impl AddressExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract unique candidates in order of first appearance.
    ///
    /// EVM duplicates are collapsed case-insensitively; the first casing seen
    /// is kept.
    pub fn extract(&self, text: &str) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for run in ALNUM_RUN.find_iter(text) {
            let token = run.as_str();
            let (hint, key) = if EVM.is_match(token) {
                (ChainHint::Evm, token.to_ascii_lowercase())
            } else if BASE58.is_match(token) {
                (ChainHint::Solana, token.to_string())
            } else {
                continue;
            };
            if seen.insert((hint, key)) {
                out.push(Candidate {
                    address: token.to_string(),
                    hint,
                });
            }
        }
        out
    }
}
