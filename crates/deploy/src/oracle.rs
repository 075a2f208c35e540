//! Oracle pair dispatch.
//!
//! A configured label either maps to exactly one deployment routine or fails
//! the run. There is no fallback oracle.

use std::str::FromStr;

use alloy_core::primitives::{Address, Bytes};
use alloy_core::sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::{DeployConfig, DeployError, contracts::Contract};

/// Price pairs with a dedicated oracle contract.
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
pub enum OraclePair {
    #[strum(serialize = "cbETH/USD")]
    #[serde(rename = "cbETH/USD")]
    CbEthUsd,
    #[strum(serialize = "wstETH/USD")]
    #[serde(rename = "wstETH/USD")]
    WstEthUsd,
    #[strum(serialize = "ETH/USD")]
    #[serde(rename = "ETH/USD")]
    EthUsd,
}

impl OraclePair {
    /// Resolve a configured label, failing with `unknown oracle type`.
    pub fn parse(label: &str) -> Result<Self, DeployError> {
        Self::from_str(label).map_err(|_| DeployError::UnknownOracle(label.to_string()))
    }

    pub fn contract(self) -> Contract {
        match self {
            Self::EthUsd => Contract::EthOracle,
            Self::CbEthUsd => Contract::CbEthToUsdOracle,
            Self::WstEthUsd => Contract::WstEthToUsdOracle,
        }
    }

    /// The contract and constructor arguments for this pair.
    ///
    /// Every oracle takes the service registry it reads its tokens from and
    /// the Pyth price feed contract.
    pub fn deployment(self, config: &DeployConfig, registry: Address) -> OracleDeployment {
        OracleDeployment {
            contract: self.contract(),
            args: (registry, config.pyth).abi_encode_params().into(),
        }
    }
}

/// What to deploy for one oracle pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleDeployment {
    pub contract: Contract,
    pub args: Bytes,
}
