//! oven-deploy - Deployment library for leveraged-yield vault systems.
//!
//! This crate deploys and wires the on-chain components of a vault (proxy
//! admin, math library, service registry, settings, flash lender, oracles,
//! strategy and vault) onto an EVM chain, recording every address on the way.

mod artifacts;
pub use artifacts::{Artifacts, ContractArtifact, LinkReference};

pub mod chain;
pub use chain::{Chain, MemoryChain, RpcChain};

mod config;
pub use config::{
    DEFAULT_LOAN_TO_VALUE, DeployConfig, NETWORKS_FILENAME, NetworkConfig, NetworksFile,
    StrategyConfig, StrategySection,
};

pub mod contracts;

mod deployer;
pub use deployer::Orchestrator;

mod error;
pub use error::{DeployError, DeployFailure, ErrorKind, error_kind};

pub mod oracle;

mod record;
pub use record::{DeploymentRecord, RecordEntry};

pub mod registry;
pub use registry::{CollateralAsset, ServiceName, ServiceRegistry};

pub mod stages;
pub use stages::{DeployedSystem, Deployment, ProxiedContract};

pub mod strategy;

mod verify;
pub use verify::{Check, VerificationReport, verify_deployment};
