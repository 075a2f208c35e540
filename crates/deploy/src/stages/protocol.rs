//! Steps 8-10: strategy, vault, post-deploy configuration.

use alloy_core::primitives::Bytes;
use alloy_core::sol_types::SolCall;
use anyhow::{Context, Result};

use super::{
    Deployed, DeployedSystem, Deployment, Foundation, Pipeline, Protocol, StepContext, Wired,
};
use crate::{
    DeployFailure,
    chain::{self, Chain},
    contracts::{Contract, IOwnable, IStrategy, IVault},
    strategy::StrategyKind,
};

impl<'a, C: Chain> Pipeline<'a, C, Wired> {
    /// Deploy the strategy and the vault in front of it.
    pub async fn deploy_protocol(mut self) -> Result<Pipeline<'a, C, Deployed>, DeployFailure> {
        let foundation = self.state.foundation;
        let outcome = deploy_protocol(&mut self.ctx, &foundation).await;
        let (pipeline, protocol) = self.finish(outcome)?;

        let system = DeployedSystem {
            foundation,
            wiring: pipeline.state.wiring.clone(),
            protocol,
        };
        Ok(pipeline.advance(Deployed { system }))
    }
}

impl<'a, C: Chain> Pipeline<'a, C, Deployed> {
    /// Hand the strategy to the vault and apply the loan-to-value.
    pub async fn configure(self) -> Result<Deployment, DeployFailure> {
        let protocol = self.state.system.protocol;
        let outcome = configure(&self.ctx, &protocol).await;
        let (pipeline, ()) = self.finish(outcome)?;

        Ok(Deployment {
            record: pipeline.ctx.record,
            system: pipeline.state.system,
        })
    }
}

async fn deploy_protocol<C: Chain>(
    ctx: &mut StepContext<'_, C>,
    foundation: &Foundation,
) -> Result<Protocol> {
    let config = ctx.config;
    let deployer = ctx.chain.deployer();

    let kind = StrategyKind::parse(&config.strategy.kind).context("Failed to deploy strategy")?;
    let strategy = kind.deployment(config, deployer, foundation.registry)?;
    let strategy = ctx
        .deploy_proxied(foundation, strategy.contract, strategy.init)
        .await?;

    let init: Bytes = IVault::initializeCall {
        initialOwner: deployer,
        tokenName: config.vault_shares_name.clone(),
        tokenSymbol: config.vault_shares_symbol.clone(),
        registry: foundation.registry,
        strategy: strategy.proxy,
    }
    .abi_encode()
    .into();
    let vault = ctx
        .deploy_proxied(foundation, Contract::Vault, init)
        .await?;

    Ok(Protocol { strategy, vault })
}

async fn configure<C: Chain>(ctx: &StepContext<'_, C>, protocol: &Protocol) -> Result<()> {
    let strategy = protocol.strategy.proxy;
    let vault = protocol.vault.proxy;

    let handover = IOwnable::transferOwnershipCall { newOwner: vault };
    chain::transact(ctx.chain, strategy, handover)
        .await
        .context("Failed to hand strategy ownership to the vault")?;
    tracing::info!(%strategy, owner = %vault, "Strategy ownership transferred");

    let loan_to_value = ctx.config.loan_to_value;
    let call = IStrategy::setLoanToValueCall {
        loanToValue: loan_to_value,
    };
    chain::transact(ctx.chain, strategy, call)
        .await
        .context("Failed to set loan-to-value")?;
    tracing::info!(%strategy, %loan_to_value, "Loan-to-value set");

    Ok(())
}
