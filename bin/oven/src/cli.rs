use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::Parser;
use oven_deploy::NETWORKS_FILENAME;
use tracing::level_filters::LevelFilter;
use url::Url;

/// The default RPC endpoint (a local development node).
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// The default artifacts directory of a Hardhat build.
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Seconds a transaction may stay unconfirmed before the run aborts.
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(name = "oven")]
#[command(
    author,
    version,
    about = "Deploy and wire a leveraged-yield vault system onto an EVM chain"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "OVEN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Name of the network descriptor to deploy with (e.g. `base`).
    #[arg(short, long, env = "OVEN_NETWORK")]
    pub network: String,

    /// Path to the network descriptors file.
    #[arg(short, long, alias = "conf", env = "OVEN_CONFIG", default_value = NETWORKS_FILENAME)]
    pub config: PathBuf,

    /// JSON-RPC endpoint holding the unlocked deployer account.
    #[arg(long, alias = "rpc", env = "OVEN_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: Url,

    /// Deployer account. Defaults to the node's first account.
    #[arg(long, env = "OVEN_DEPLOYER")]
    pub deployer: Option<Address>,

    /// Directory holding the compiled contract artifacts.
    #[arg(long, env = "OVEN_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// Seconds to wait for each transaction receipt.
    #[arg(long, env = "OVEN_CONFIRMATION_TIMEOUT", default_value_t = DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    pub confirmation_timeout: u64,

    /// Run the whole pipeline against an in-memory chain instead of the RPC endpoint.
    #[arg(long, env = "OVEN_DRY_RUN")]
    pub dry_run: bool,

    /// Read the deployment back and fail if it does not match.
    #[arg(long, env = "OVEN_VERIFY")]
    pub verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["oven", "--network", "base"]).unwrap();
        assert_eq!(cli.network, "base");
        assert_eq!(cli.config, PathBuf::from(NETWORKS_FILENAME));
        assert_eq!(cli.rpc_url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(cli.deployer, None);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_deployer_must_be_an_address() {
        assert!(Cli::try_parse_from(["oven", "-n", "base", "--deployer", "bob"]).is_err());

        let cli = Cli::try_parse_from([
            "oven",
            "-n",
            "base",
            "--deployer",
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        ])
        .unwrap();
        assert!(cli.deployer.is_some());
    }
}
