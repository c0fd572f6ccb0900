//! Chain identification.
//!
//! The extractor only knows the lexical shape of an address (`ChainHint`);
//! the concrete `Chain` of an EVM-shaped address is decided by the task.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Bsc,
    Ethereum,
    Base,
}

impl Chain {
    /// Whether this chain uses `0x`-prefixed hex addresses.
    pub fn is_evm(&self) -> bool {
        !matches!(self, Self::Solana)
    }

    /// Short chain code used in gmgn URL paths.
    pub fn gmgn_code(&self) -> &'static str {
        match self {
            Self::Solana => "sol",
            Self::Bsc => "bsc",
            Self::Ethereum => "eth",
            Self::Base => "base",
        }
    }

    /// Chain id as reported by DexScreener pairs.
    pub fn dexscreener_id(&self) -> &'static str {
        match self {
            Self::Solana => "solana",
            Self::Bsc => "bsc",
            Self::Ethereum => "ethereum",
            Self::Base => "base",
        }
    }

    /// Numeric EVM chain id (GoPlus). `None` for Solana.
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Self::Solana => None,
            Self::Bsc => Some(56),
            Self::Ethereum => Some(1),
            Self::Base => Some(8453),
        }
    }

    /// Resolve an extractor hint against the task's configured EVM chain.
    pub fn from_hint(hint: ChainHint, evm_chain: Chain) -> Self {
        match hint {
            ChainHint::Solana => Self::Solana,
            ChainHint::Evm => evm_chain,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solana => write!(f, "solana"),
            Self::Bsc => write!(f, "bsc"),
            Self::Ethereum => write!(f, "ethereum"),
            Self::Base => write!(f, "base"),
        }
    }
}

impl FromStr for Chain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solana" | "sol" => Ok(Self::Solana),
            "bsc" | "bnb" => Ok(Self::Bsc),
            "ethereum" | "eth" => Ok(Self::Ethereum),
            "base" => Ok(Self::Base),
            other => Err(CoreError::UnknownChain(other.to_string())),
        }
    }
}

/// Chain family guessed from the lexical shape of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainHint {
    /// Base58, 32-44 characters.
    Solana,
    /// `0x` followed by 40 hex digits.
    Evm,
}

impl fmt::Display for ChainHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solana => write!(f, "solana"),
            Self::Evm => write!(f, "evm"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hint_uses_task_evm_chain() {
        assert_eq!(Chain::from_hint(ChainHint::Solana, Chain::Bsc), Chain::Solana);
        assert_eq!(Chain::from_hint(ChainHint::Evm, Chain::Bsc), Chain::Bsc);
        assert_eq!(Chain::from_hint(ChainHint::Evm, Chain::Base), Chain::Base);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("sol".parse::<Chain>().unwrap(), Chain::Solana);
        assert_eq!("ETH".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert!("tron".parse::<Chain>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Chain::Bsc).unwrap();
        assert_eq!(json, "\"bsc\"");
        let back: Chain = serde_json::from_str("\"solana\"").unwrap();
        assert_eq!(back, Chain::Solana);
    }

    #[test]
    fn test_provider_codes() {
        assert_eq!(Chain::Solana.gmgn_code(), "sol");
        assert_eq!(Chain::Ethereum.dexscreener_id(), "ethereum");
        assert_eq!(Chain::Solana.evm_chain_id(), None);
        assert_eq!(Chain::Bsc.evm_chain_id(), Some(56));
        assert!(!Chain::Solana.is_evm());
    }
}
