//! Steps 1-3: proxy admin, math library, service registry.

use anyhow::Result;

use super::{Foundation, Founded, Pipeline, Start, StepContext};
use crate::{
    DeployFailure,
    chain::Chain,
    contracts::{Contract, address_arg},
};

impl<'a, C: Chain> Pipeline<'a, C, Start> {
    /// Deploy the contracts every later step builds on.
    pub async fn lay_foundation(mut self) -> Result<Pipeline<'a, C, Founded>, DeployFailure> {
        let outcome = lay_foundation(&mut self.ctx).await;
        let (pipeline, foundation) = self.finish(outcome)?;
        Ok(pipeline.advance(Founded { foundation }))
    }
}

async fn lay_foundation<C: Chain>(ctx: &mut StepContext<'_, C>) -> Result<Foundation> {
    let deployer = ctx.chain.deployer();
    tracing::info!(%deployer, network = %ctx.config.network, "Laying foundation");

    let proxy_admin = ctx
        .deploy(Contract::ProxyAdmin, address_arg(deployer))
        .await?;
    let math_library = ctx.deploy_library(Contract::MathLibrary).await?;
    let registry = ctx
        .deploy(Contract::ServiceRegistry, address_arg(deployer))
        .await?;

    Ok(Foundation {
        proxy_admin,
        math_library,
        registry,
    })
}
