//! The staged deployment pipeline.
//!
//! The order is fixed: Foundation -> Wiring -> Protocol -> Configuration.
//! Each stage consumes the pipeline and returns it in the next state, carrying
//! the addresses later steps depend on. A proxy can only be deployed once a
//! proxy admin exists because no state before [`Founded`] offers a way to
//! deploy one.
//!
//! Every step appends to the [`DeploymentRecord`] as soon as its transaction is
//! confirmed. When a step fails, the stage returns a [`DeployFailure`] with the
//! record so far and nothing later runs.

use std::collections::HashMap;

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result};

use crate::{
    Artifacts, DeployConfig, DeployFailure, DeploymentRecord,
    chain::Chain,
    contracts::{Contract, proxy_args},
    oracle::OraclePair,
    registry::{ServiceName, ServiceRegistry},
};

mod foundation;
mod protocol;
mod wiring;

/// Addresses laid down by the first stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Foundation {
    pub proxy_admin: Address,
    pub math_library: Address,
    pub registry: Address,
}

/// An implementation and the proxy fronting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxiedContract {
    pub implementation: Address,
    pub proxy: Address,
}

/// Registry contents and shared infrastructure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wiring {
    pub settings: ProxiedContract,
    pub flash_lender: Address,
    /// Deployed oracles, in descriptor order.
    pub oracles: Vec<(OraclePair, Address)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub strategy: ProxiedContract,
    pub vault: ProxiedContract,
}

/// Everything a completed run deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedSystem {
    pub foundation: Foundation,
    pub wiring: Wiring,
    pub protocol: Protocol,
}

/// Pipeline state before any transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Start;

/// Proxy admin, math library and registry exist.
#[derive(Debug, Clone)]
pub struct Founded {
    pub foundation: Foundation,
}

/// External services are registered, shared infrastructure is deployed.
#[derive(Debug, Clone)]
pub struct Wired {
    pub foundation: Foundation,
    pub wiring: Wiring,
}

/// Strategy and vault are deployed but not yet configured.
#[derive(Debug, Clone)]
pub struct Deployed {
    pub system: DeployedSystem,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Start {}
    impl Sealed for super::Founded {}
    impl Sealed for super::Wired {}
    impl Sealed for super::Deployed {}
}

/// Marker trait for pipeline states.
pub trait PipelineStage: sealed::Sealed + Send + Sync {}

impl PipelineStage for Start {}
impl PipelineStage for Founded {}
impl PipelineStage for Wired {}
impl PipelineStage for Deployed {}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub record: DeploymentRecord,
    pub system: DeployedSystem,
}

/// What every step can reach.
pub struct StepContext<'a, C> {
    pub chain: &'a C,
    pub artifacts: &'a Artifacts,
    pub config: &'a DeployConfig,
    pub record: DeploymentRecord,
    /// Deployed libraries, by name, for linking.
    libraries: HashMap<String, Address>,
}

impl<'a, C: Chain> StepContext<'a, C> {
    fn new(chain: &'a C, artifacts: &'a Artifacts, config: &'a DeployConfig) -> Self {
        Self {
            chain,
            artifacts,
            config,
            record: DeploymentRecord::new(),
            libraries: HashMap::new(),
        }
    }

    /// Link and deploy `contract`, then record it under `label`.
    async fn deploy_as(&mut self, contract: Contract, label: &str, args: Bytes) -> Result<Address> {
        let code = self
            .artifacts
            .contract(contract)?
            .link(&self.libraries)
            .with_context(|| format!("Failed to link {contract}"))?;

        let address = self
            .chain
            .deploy(contract, code, args)
            .await
            .with_context(|| format!("Failed to deploy {label}"))?;

        tracing::info!(%address, contract = %contract, "{label} deployed");
        self.record.push(label, address);
        Ok(address)
    }

    async fn deploy(&mut self, contract: Contract, args: Bytes) -> Result<Address> {
        self.deploy_as(contract, contract.label(), args).await
    }

    /// Deploy a library and make it available to later links.
    async fn deploy_library(&mut self, contract: Contract) -> Result<Address> {
        let address = self.deploy(contract, Bytes::new()).await?;
        self.libraries
            .insert(contract.artifact_name().to_string(), address);
        Ok(address)
    }

    /// Deploy `contract` behind a proxy administered by the foundation's proxy
    /// admin, running `init` through the proxy on creation.
    async fn deploy_proxied(
        &mut self,
        foundation: &Foundation,
        contract: Contract,
        init: Bytes,
    ) -> Result<ProxiedContract> {
        let implementation = self.deploy(contract, Bytes::new()).await?;
        let label = format!("{} (Proxy)", contract.label());
        let proxy = self
            .deploy_as(
                Contract::Proxy,
                &label,
                proxy_args(implementation, foundation.proxy_admin, init),
            )
            .await?;

        Ok(ProxiedContract {
            implementation,
            proxy,
        })
    }

    /// Register `address` under `name` and record it as `label`.
    async fn register(
        &mut self,
        registry: Address,
        name: ServiceName,
        label: &str,
        address: Address,
    ) -> Result<()> {
        ServiceRegistry::new(self.chain, registry)
            .register(name, address)
            .await?;
        self.record.push(label, address);
        Ok(())
    }

    fn fail(self, error: anyhow::Error) -> DeployFailure {
        tracing::error!(
            error = %format!("{error:#}"),
            recorded = self.record.len(),
            "Deployment step failed"
        );
        DeployFailure {
            record: self.record,
            error,
        }
    }
}

/// The deployment pipeline in state `S`.
pub struct Pipeline<'a, C, S: PipelineStage> {
    ctx: StepContext<'a, C>,
    state: S,
}

impl<'a, C: Chain, S: PipelineStage> Pipeline<'a, C, S> {
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn record(&self) -> &DeploymentRecord {
        &self.ctx.record
    }

    fn advance<N: PipelineStage>(self, state: N) -> Pipeline<'a, C, N> {
        Pipeline {
            ctx: self.ctx,
            state,
        }
    }

    fn finish<T>(self, outcome: Result<T>) -> Result<(Self, T), DeployFailure> {
        match outcome {
            Ok(value) => Ok((self, value)),
            Err(error) => Err(self.ctx.fail(error)),
        }
    }
}

impl<'a, C: Chain> Pipeline<'a, C, Start> {
    pub fn new(chain: &'a C, artifacts: &'a Artifacts, config: &'a DeployConfig) -> Self {
        Self {
            ctx: StepContext::new(chain, artifacts, config),
            state: Start,
        }
    }
}
