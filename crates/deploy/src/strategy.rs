//! Strategy type dispatch.

use std::str::FromStr;

use alloy_core::primitives::{Address, Bytes};
use alloy_core::sol_types::SolCall;

use crate::{
    DeployConfig, DeployError,
    contracts::{Contract, IStrategy},
    oracle::OraclePair,
    registry::ServiceName,
};

/// Strategy families selectable by the descriptor's `strategy.type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum StrategyKind {
    /// AAVE v3 leverage loop over any registered collateral.
    Base,
}

impl StrategyKind {
    pub fn parse(tag: &str) -> Result<Self, DeployError> {
        Self::from_str(tag).map_err(|_| DeployError::UnknownStrategy(tag.to_string()))
    }

    pub fn contract(self) -> Contract {
        match self {
            Self::Base => Contract::StrategyAaveV3Any,
        }
    }

    /// Implementation contract and proxy initializer for this strategy.
    pub fn deployment(
        self,
        config: &DeployConfig,
        deployer: Address,
        registry: Address,
    ) -> Result<StrategyDeployment, DeployError> {
        match self {
            Self::Base => {
                let oracle = OraclePair::parse(&config.strategy.oracle)?;
                let init = IStrategy::initializeCall {
                    initialOwner: deployer,
                    initialGovernor: deployer,
                    registry,
                    collateral: config.strategy.collateral.service_name().id(),
                    oracle: ServiceName::Oracle(oracle).id(),
                    swapFeeTier: config.swap_fee_tier,
                    eModeCategory: config.aave_emode_category,
                }
                .abi_encode();

                Ok(StrategyDeployment {
                    contract: self.contract(),
                    init: init.into(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDeployment {
    pub contract: Contract,
    pub init: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use alloy_core::primitives::aliases::U24;

    #[test]
    fn test_parse_tags() {
        assert_eq!(StrategyKind::parse("base").unwrap(), StrategyKind::Base);

        let err = StrategyKind::parse("compound").unwrap_err();
        assert_eq!(err.to_string(), "unknown strategy type: compound");
    }

    #[test]
    fn test_base_initializer_uses_canonical_ids() {
        let config = sample_config();
        let deployer = Address::repeat_byte(0x01);
        let registry = Address::repeat_byte(0x02);

        let deployment = StrategyKind::Base
            .deployment(&config, deployer, registry)
            .unwrap();
        assert_eq!(deployment.contract, Contract::StrategyAaveV3Any);

        let call = IStrategy::initializeCall::abi_decode(&deployment.init, true).unwrap();
        assert_eq!(call.initialOwner, deployer);
        assert_eq!(call.initialGovernor, deployer);
        assert_eq!(call.registry, registry);
        assert_eq!(call.collateral, ServiceName::CbEth.id());
        assert_eq!(call.oracle, ServiceName::Oracle(OraclePair::CbEthUsd).id());
        assert_eq!(call.swapFeeTier, U24::from(500u32));
        assert_eq!(call.eModeCategory, 1);
    }
}
