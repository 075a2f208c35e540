//! Steps 4-7: external services, settings, flash lender, collateral, oracles.

use alloy_core::primitives::{Address, Bytes};
use alloy_core::sol_types::SolCall;
use anyhow::{Context, Result};
use strum::IntoEnumIterator;

use super::{Foundation, Founded, Pipeline, StepContext, Wired, Wiring};
use crate::{
    DeployFailure,
    chain::Chain,
    contracts::{Contract, ISettings, address_arg},
    oracle::OraclePair,
    registry::{CollateralAsset, ServiceName},
};

impl<'a, C: Chain> Pipeline<'a, C, Founded> {
    /// Populate the registry and deploy the shared infrastructure.
    pub async fn wire(mut self) -> Result<Pipeline<'a, C, Wired>, DeployFailure> {
        let foundation = self.state.foundation;
        let outcome = wire(&mut self.ctx, &foundation).await;
        let (pipeline, wiring) = self.finish(outcome)?;
        Ok(pipeline.advance(Wired { foundation, wiring }))
    }
}

async fn wire<C: Chain>(ctx: &mut StepContext<'_, C>, foundation: &Foundation) -> Result<Wiring> {
    let registry = foundation.registry;
    let config = ctx.config;

    let external: [(ServiceName, &str, Address); 5] = [
        (ServiceName::Weth, "WETH", config.weth),
        (ServiceName::UniswapRouter, "Uniswap V3 Router", config.uniswap_router),
        (ServiceName::UniswapQuoter, "Uniswap V3 Quoter", config.uniswap_quoter),
        (ServiceName::AaveV3, "AAVE V3 Pool", config.aave_pool),
        (ServiceName::BalancerVault, "Balancer Vault", config.balancer_vault),
    ];
    for (name, label, address) in external {
        ctx.register(registry, name, label, address).await?;
    }

    let init: Bytes = ISettings::initializeCall {
        initialOwner: ctx.chain.deployer(),
    }
    .abi_encode()
    .into();
    let settings = ctx
        .deploy_proxied(foundation, Contract::Settings, init)
        .await?;
    register_only(ctx, registry, ServiceName::Settings, settings.proxy).await?;

    let flash_lender = ctx
        .deploy(Contract::FlashLender, address_arg(registry))
        .await?;
    register_only(ctx, registry, ServiceName::FlashLender, flash_lender).await?;

    for asset in CollateralAsset::iter() {
        match config.collateral_address(asset) {
            Some(address) => {
                ctx.register(registry, asset.service_name(), &asset.to_string(), address)
                    .await?;
            }
            None => tracing::info!(%asset, "Collateral not available on this network, skipping"),
        }
    }

    let mut oracles = Vec::with_capacity(config.oracles.len());
    for label in &config.oracles {
        let pair = OraclePair::parse(label).context("Failed to deploy oracles")?;
        let deployment = pair.deployment(config, registry);
        let address = ctx.deploy(deployment.contract, deployment.args).await?;
        register_only(ctx, registry, ServiceName::Oracle(pair), address).await?;
        oracles.push((pair, address));
    }

    Ok(Wiring {
        settings,
        flash_lender,
        oracles,
    })
}

/// Register an address the deploy step already recorded.
async fn register_only<C: Chain>(
    ctx: &StepContext<'_, C>,
    registry: Address,
    name: ServiceName,
    address: Address,
) -> Result<()> {
    crate::registry::ServiceRegistry::new(ctx.chain, registry)
        .register(name, address)
        .await
}
