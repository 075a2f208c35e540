//! Canonical service names shared with the on-chain consumers.
//!
//! Contracts resolve each other through `keccak256(name)`. A name typed
//! differently on either side silently points at an empty slot, so every
//! identifier is derived here and nowhere else.

use std::borrow::Cow;
use std::fmt;

use alloy_core::primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};

use crate::oracle::OraclePair;

/// Version of the name table below. Bump it whenever a string changes.
pub const SERVICE_NAMES_VERSION: u32 = 1;

/// Liquid-staking tokens that may back a strategy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum CollateralAsset {
    #[strum(serialize = "cbETH")]
    #[serde(rename = "cbETH")]
    CbEth,
    #[strum(serialize = "wstETH")]
    #[serde(rename = "wstETH")]
    WstEth,
}

impl CollateralAsset {
    pub fn service_name(self) -> ServiceName {
        match self {
            Self::CbEth => ServiceName::CbEth,
            Self::WstEth => ServiceName::WstEth,
        }
    }
}

/// A service registered in the Service Registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceName {
    Weth,
    UniswapRouter,
    UniswapQuoter,
    AaveV3,
    BalancerVault,
    FlashLender,
    Settings,
    CbEth,
    WstEth,
    Oracle(OraclePair),
}

impl ServiceName {
    /// Names that do not depend on an oracle pair.
    pub const FIXED: [ServiceName; 9] = [
        ServiceName::Weth,
        ServiceName::UniswapRouter,
        ServiceName::UniswapQuoter,
        ServiceName::AaveV3,
        ServiceName::BalancerVault,
        ServiceName::FlashLender,
        ServiceName::Settings,
        ServiceName::CbEth,
        ServiceName::WstEth,
    ];

    /// The exact string the contracts hash.
    pub fn as_str(&self) -> Cow<'static, str> {
        match self {
            Self::Weth => "WETH".into(),
            Self::UniswapRouter => "Uniswap Router".into(),
            Self::UniswapQuoter => "Uniswap Quoter".into(),
            Self::AaveV3 => "AAVE_V3".into(),
            Self::BalancerVault => "Balancer Vault".into(),
            Self::FlashLender => "FlashLender".into(),
            Self::Settings => "Settings".into(),
            Self::CbEth => "cbETH".into(),
            Self::WstEth => "wstETH".into(),
            Self::Oracle(pair) => format!("{pair} Oracle").into(),
        }
    }

    /// Registry key: `keccak256` of the ASCII name.
    pub fn id(&self) -> B256 {
        keccak256(self.as_str().as_bytes())
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    fn all_names() -> Vec<ServiceName> {
        ServiceName::FIXED
            .into_iter()
            .chain(OraclePair::iter().map(ServiceName::Oracle))
            .collect()
    }

    #[test]
    fn test_canonical_strings() {
        assert_eq!(ServiceName::AaveV3.as_str(), "AAVE_V3");
        assert_eq!(ServiceName::UniswapRouter.as_str(), "Uniswap Router");
        assert_eq!(ServiceName::BalancerVault.as_str(), "Balancer Vault");
        assert_eq!(
            ServiceName::Oracle(OraclePair::EthUsd).as_str(),
            "ETH/USD Oracle"
        );
        assert_eq!(
            ServiceName::Oracle(OraclePair::WstEthUsd).to_string(),
            "wstETH/USD Oracle"
        );
    }

    #[test]
    fn test_id_matches_independent_hash() {
        // A consumer hashing the literal on its own must land on the same slot.
        let consumer_side = keccak256(b"AAVE_V3");
        assert_eq!(ServiceName::AaveV3.id(), consumer_side);
        assert_eq!(ServiceName::AaveV3.id(), ServiceName::AaveV3.id());
        assert_ne!(
            ServiceName::AaveV3.id(),
            keccak256(b"Aave V3"),
            "Near-miss spellings must not collide"
        );
    }

    #[test]
    fn test_ids_are_distinct() {
        let names = all_names();
        let ids: HashSet<B256> = names.iter().map(ServiceName::id).collect();
        assert_eq!(ids.len(), names.len(), "Every service must own its own slot");
    }

    #[test]
    fn test_collateral_parsing() {
        assert_eq!(CollateralAsset::from_str("cbETH").unwrap(), CollateralAsset::CbEth);
        assert_eq!(CollateralAsset::from_str("wstETH").unwrap(), CollateralAsset::WstEth);
        assert!(CollateralAsset::from_str("stETH").is_err());
        assert_eq!(CollateralAsset::WstEth.service_name(), ServiceName::WstEth);
    }
}
