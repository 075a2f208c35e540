//! Per-network Configuration Descriptors.
//!
//! Descriptors are read from a TOML file (`[networks.<name>]` tables) with
//! `OVEN_`-prefixed environment overrides, then validated into a
//! [`DeployConfig`] before anything touches the chain.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use alloy_core::primitives::{Address, U256, aliases::U24};
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{DeployError, registry::CollateralAsset};

/// The default name of the descriptor file.
pub const NETWORKS_FILENAME: &str = "Oven.toml";

/// Loan-to-value applied after deployment when the descriptor sets none
/// (800 scaled by 10^6).
pub const DEFAULT_LOAN_TO_VALUE: u64 = 800_000_000;

/// Largest value a `uint24` fee tier can hold.
const MAX_SWAP_FEE_TIER: u32 = 0x00ff_ffff;

/// Every descriptor known to the tool, keyed by network name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworksFile {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl NetworksFile {
    /// Load descriptors from `path`, applying `OVEN_NETWORKS__<NAME>__<KEY>` overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::Config(format!(
                "network descriptor file not found: {}",
                path.display()
            )))
            .context("Failed to load network descriptors");
        }

        let networks: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("OVEN_").split("__"))
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            networks = networks.networks.len(),
            "Network descriptors loaded"
        );
        Ok(networks)
    }

    /// Parse descriptors from a TOML string, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Figment::from(Toml::string(content))
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
            .context("Failed to parse network descriptors")
    }

    /// Select and validate the descriptor of one network.
    pub fn select(&self, network: &str) -> Result<DeployConfig, DeployError> {
        let raw = self
            .networks
            .get(network)
            .ok_or_else(|| DeployError::UnknownNetwork {
                name: network.to_string(),
                known: self
                    .networks
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        raw.validate(network)
    }
}

/// A descriptor as written in the file. Every key is optional here;
/// [`NetworkConfig::validate`] decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Expected chain id of the RPC endpoint, checked before the first transaction.
    pub chain_id: Option<u64>,
    pub weth: Option<Address>,
    pub uniswap_router: Option<Address>,
    pub uniswap_quoter: Option<Address>,
    pub aave_pool: Option<Address>,
    pub balancer_vault: Option<Address>,
    /// Only some chains carry these liquid-staking tokens.
    pub cb_eth: Option<Address>,
    pub wst_eth: Option<Address>,
    /// Pyth price feed contract used by every oracle.
    pub pyth: Option<Address>,
    pub oracles: Option<Vec<String>>,
    pub strategy: Option<StrategySection>,
    pub swap_fee_tier: Option<u32>,
    pub aave_emode_category: Option<u8>,
    pub vault_shares_name: Option<String>,
    pub vault_shares_symbol: Option<String>,
    pub loan_to_value: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySection {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub collateral: Option<String>,
    pub oracle: Option<String>,
}

/// A validated descriptor. Owned by the caller and handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub network: String,
    pub chain_id: Option<u64>,
    pub weth: Address,
    pub uniswap_router: Address,
    pub uniswap_quoter: Address,
    pub aave_pool: Address,
    pub balancer_vault: Address,
    pub cb_eth: Option<Address>,
    pub wst_eth: Option<Address>,
    pub pyth: Address,
    /// Oracle pair labels, dispatched in order during the run.
    pub oracles: Vec<String>,
    pub strategy: StrategyConfig,
    pub swap_fee_tier: U24,
    pub aave_emode_category: u8,
    pub vault_shares_name: String,
    pub vault_shares_symbol: String,
    pub loan_to_value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Strategy type tag, dispatched when the strategy is deployed.
    pub kind: String,
    pub collateral: CollateralAsset,
    /// Oracle pair label the strategy prices its collateral with.
    pub oracle: String,
}

impl DeployConfig {
    /// Address of an optional collateral token, if this network has it.
    pub fn collateral_address(&self, asset: CollateralAsset) -> Option<Address> {
        match asset {
            CollateralAsset::CbEth => self.cb_eth,
            CollateralAsset::WstEth => self.wst_eth,
        }
    }
}

impl NetworkConfig {
    /// Check every required key and the cross-key constraints.
    ///
    /// All problems are reported together in a single configuration error.
    pub fn validate(&self, network: &str) -> Result<DeployConfig, DeployError> {
        let mut errors: Vec<String> = Vec::new();

        let weth = required_address("weth", self.weth, &mut errors);
        let uniswap_router = required_address("uniswap_router", self.uniswap_router, &mut errors);
        let uniswap_quoter = required_address("uniswap_quoter", self.uniswap_quoter, &mut errors);
        let aave_pool = required_address("aave_pool", self.aave_pool, &mut errors);
        let balancer_vault = required_address("balancer_vault", self.balancer_vault, &mut errors);
        let pyth = required_address("pyth", self.pyth, &mut errors);

        for (key, value) in [("cb_eth", self.cb_eth), ("wst_eth", self.wst_eth)] {
            if value == Some(Address::ZERO) {
                errors.push(format!("{key}: must not be the zero address"));
            }
        }

        let oracles = match &self.oracles {
            Some(oracles) if !oracles.is_empty() => oracles.clone(),
            Some(_) => {
                errors.push("oracles: must list at least one oracle pair".into());
                Vec::new()
            }
            None => {
                errors.push("oracles: missing".into());
                Vec::new()
            }
        };

        // Each pair owns exactly one registry slot.
        let mut seen = BTreeSet::new();
        for label in &oracles {
            if !seen.insert(label.as_str()) {
                errors.push(format!("oracles: duplicate pair '{label}'"));
            }
        }

        let swap_fee_tier = match self.swap_fee_tier {
            Some(tier) if tier <= MAX_SWAP_FEE_TIER => U24::from(tier),
            Some(tier) => {
                errors.push(format!("swap_fee_tier: {tier} does not fit in uint24"));
                U24::ZERO
            }
            None => {
                errors.push("swap_fee_tier: missing".into());
                U24::ZERO
            }
        };

        let aave_emode_category = self.aave_emode_category.unwrap_or_else(|| {
            errors.push("aave_emode_category: missing".into());
            0
        });

        let vault_shares_name = required_text("vault_shares_name", &self.vault_shares_name, &mut errors);
        let vault_shares_symbol =
            required_text("vault_shares_symbol", &self.vault_shares_symbol, &mut errors);

        let strategy = self.validate_strategy(&oracles, &mut errors);

        if !errors.is_empty() {
            return Err(DeployError::Config(format!(
                "network '{network}' descriptor is invalid ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            )));
        }

        let Some(strategy) = strategy else {
            return Err(DeployError::Config(format!(
                "network '{network}' descriptor has no usable strategy section"
            )));
        };

        Ok(DeployConfig {
            network: network.to_string(),
            chain_id: self.chain_id,
            weth,
            uniswap_router,
            uniswap_quoter,
            aave_pool,
            balancer_vault,
            cb_eth: self.cb_eth,
            wst_eth: self.wst_eth,
            pyth,
            oracles,
            strategy,
            swap_fee_tier,
            aave_emode_category,
            vault_shares_name,
            vault_shares_symbol,
            loan_to_value: U256::from(self.loan_to_value.unwrap_or(DEFAULT_LOAN_TO_VALUE)),
        })
    }

    fn validate_strategy(&self, oracles: &[String], errors: &mut Vec<String>) -> Option<StrategyConfig> {
        let Some(section) = &self.strategy else {
            errors.push("strategy: missing".into());
            return None;
        };

        let kind = section.kind.clone().or_else(|| {
            errors.push("strategy.type: missing".into());
            None
        });

        let collateral = match section.collateral.as_deref() {
            None => {
                errors.push("strategy.collateral: missing".into());
                None
            }
            Some(name) => match name.parse::<CollateralAsset>() {
                Ok(asset) => {
                    let configured = match asset {
                        CollateralAsset::CbEth => self.cb_eth,
                        CollateralAsset::WstEth => self.wst_eth,
                    };
                    if configured.is_none() {
                        errors.push(format!(
                            "strategy.collateral: {asset} is not available on this network"
                        ));
                    }
                    Some(asset)
                }
                Err(_) => {
                    errors.push(format!("strategy.collateral: unknown collateral asset '{name}'"));
                    None
                }
            },
        };

        let oracle = match section.oracle.clone() {
            None => {
                errors.push("strategy.oracle: missing".into());
                None
            }
            Some(label) if !oracles.is_empty() && !oracles.contains(&label) => {
                errors.push(format!(
                    "strategy.oracle: '{label}' is not one of the deployed oracles"
                ));
                None
            }
            Some(label) => Some(label),
        };

        Some(StrategyConfig {
            kind: kind?,
            collateral: collateral?,
            oracle: oracle?,
        })
    }
}

fn required_address(key: &str, value: Option<Address>, errors: &mut Vec<String>) -> Address {
    match value {
        Some(address) if address != Address::ZERO => address,
        Some(_) => {
            errors.push(format!("{key}: must not be the zero address"));
            Address::ZERO
        }
        None => {
            errors.push(format!("{key}: missing"));
            Address::ZERO
        }
    }
}

fn required_text(key: &str, value: &Option<String>, errors: &mut Vec<String>) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.clone(),
        _ => {
            errors.push(format!("{key}: missing"));
            String::new()
        }
    }
}
