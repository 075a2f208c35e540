use anyhow::{Context, Result};

use crate::{
    Artifacts, DeployConfig, DeployError, DeployFailure, DeploymentRecord,
    chain::Chain,
    contracts::Contract,
    oracle::OraclePair,
    registry::SERVICE_NAMES_VERSION,
    stages::{Deployment, Pipeline},
    strategy::StrategyKind,
};

/// Contracts every run deploys, whatever the descriptor says.
const REQUIRED_CONTRACTS: [Contract; 7] = [
    Contract::ProxyAdmin,
    Contract::Proxy,
    Contract::MathLibrary,
    Contract::ServiceRegistry,
    Contract::Settings,
    Contract::FlashLender,
    Contract::Vault,
];

/// Main orchestrator for deploying a vault system onto one network.
///
/// The descriptor is selected once by the caller and handed in; nothing below
/// looks configuration up on its own.
pub struct Orchestrator<'a, C> {
    chain: &'a C,
    artifacts: &'a Artifacts,
    config: &'a DeployConfig,
}

impl<'a, C: Chain> Orchestrator<'a, C> {
    pub fn new(chain: &'a C, artifacts: &'a Artifacts, config: &'a DeployConfig) -> Self {
        Self {
            chain,
            artifacts,
            config,
        }
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// On failure the returned [`DeployFailure`] holds everything recorded so
    /// far. Nothing is rolled back.
    pub async fn run(&self) -> Result<Deployment, DeployFailure> {
        self.preflight().map_err(|error| DeployFailure {
            record: DeploymentRecord::new(),
            error,
        })?;

        tracing::info!(
            network = %self.config.network,
            chain_id = self.chain.chain_id(),
            deployer = %self.chain.deployer(),
            service_names = SERVICE_NAMES_VERSION,
            "Starting deployment"
        );

        let deployment = Pipeline::new(self.chain, self.artifacts, self.config)
            .lay_foundation()
            .await?
            .wire()
            .await?
            .deploy_protocol()
            .await?
            .configure()
            .await?;

        tracing::info!(
            vault = %deployment.system.protocol.vault.proxy,
            strategy = %deployment.system.protocol.strategy.proxy,
            recorded = deployment.record.len(),
            "Deployment complete"
        );
        Ok(deployment)
    }

    /// Checks that need no transaction: the endpoint is on the expected chain
    /// and every artifact the run can reach is present.
    pub fn preflight(&self) -> Result<()> {
        if let Some(expected) = self.config.chain_id {
            let actual = self.chain.chain_id();
            if expected != actual {
                return Err(DeployError::ChainIdMismatch { expected, actual }.into());
            }
        }

        let known_oracles = self
            .config
            .oracles
            .iter()
            .filter_map(|label| OraclePair::parse(label).ok());
        let strategy = StrategyKind::parse(&self.config.strategy.kind)
            .ok()
            .map(StrategyKind::contract);

        for contract in REQUIRED_CONTRACTS
            .into_iter()
            .chain(strategy)
            .chain(known_oracles.map(OraclePair::contract))
        {
            self.artifacts
                .contract(contract)
                .with_context(|| format!("Missing artifact for {}", contract.label()))?;
        }

        Ok(())
    }
}
