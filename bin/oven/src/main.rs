//! oven deploys a leveraged-yield vault system onto an EVM chain and prints
//! the address of everything it deployed or registered.

mod cli;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use oven_deploy::{
    Artifacts, Chain, DeployConfig, MemoryChain, NetworksFile, Orchestrator, RpcChain,
    chain::DEFAULT_CHAIN_ID, verify_deployment,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize the logger. Stdout is reserved for the address report.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let config = NetworksFile::load(&cli.config)?.select(&cli.network)?;
    let artifacts = Artifacts::open(&cli.artifacts)?;

    tracing::info!(
        network = %config.network,
        config_path = %cli.config.display(),
        artifacts = %artifacts.root().display(),
        dry_run = cli.dry_run,
        "Network descriptor selected"
    );

    if cli.dry_run {
        let chain_id = config.chain_id.unwrap_or(DEFAULT_CHAIN_ID);
        let chain = match cli.deployer {
            Some(deployer) => MemoryChain::with_deployer(chain_id, deployer),
            None => MemoryChain::new(chain_id),
        };
        return deploy(&chain, &artifacts, &config, cli.verify).await;
    }

    let chain = RpcChain::connect(
        cli.rpc_url,
        cli.deployer,
        Duration::from_secs(cli.confirmation_timeout),
    )
    .await?;
    deploy(&chain, &artifacts, &config, cli.verify).await
}

/// Run the deployment and print the record, partial or complete.
async fn deploy<C: Chain>(
    chain: &C,
    artifacts: &Artifacts,
    config: &DeployConfig,
    verify: bool,
) -> Result<()> {
    let deployment = match Orchestrator::new(chain, artifacts, config).run().await {
        Ok(deployment) => deployment,
        Err(failure) => {
            eprintln!("{}", failure.record.to_table(&config.network, chain.chain_id()));
            if let Some(kind) = failure.kind() {
                tracing::error!(%kind, "Deployment failed");
            }
            let recorded = failure.record.len();
            return Err(failure.error.context(format!(
                "Deployment aborted after {recorded} recorded step(s); deployed contracts were left in place"
            )));
        }
    };

    println!("{}", deployment.record.to_table(&config.network, chain.chain_id()));

    if verify {
        let report = verify_deployment(chain, config, &deployment).await?;
        eprintln!("{report}");
        report.ensure_healthy()?;
    }

    Ok(())
}
