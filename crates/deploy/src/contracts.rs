//! The contracts this tool deploys and the calls it makes into them.

use alloy_core::primitives::{Address, Bytes};
use alloy_core::sol_types::SolValue;

/// A contract deployed by the pipeline, named after its compiled artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumIter)]
pub enum Contract {
    #[strum(serialize = "BakerFiProxyAdmin")]
    ProxyAdmin,
    #[strum(serialize = "BakerFiProxy")]
    Proxy,
    #[strum(serialize = "MathLibrary")]
    MathLibrary,
    #[strum(serialize = "ServiceRegistry")]
    ServiceRegistry,
    #[strum(serialize = "Settings")]
    Settings,
    #[strum(serialize = "BalancerFlashLender")]
    FlashLender,
    #[strum(serialize = "ETHOracle")]
    EthOracle,
    #[strum(serialize = "cbETHToUSDOracle")]
    CbEthToUsdOracle,
    #[strum(serialize = "WstETHToUSDOracle")]
    WstEthToUsdOracle,
    #[strum(serialize = "AAVEv3StrategyAny")]
    StrategyAaveV3Any,
    #[strum(serialize = "Vault")]
    Vault,
}

impl Contract {
    /// Artifact (and Solidity contract) name.
    pub fn artifact_name(&self) -> &str {
        self.as_ref()
    }

    /// Label used in the deployment report.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProxyAdmin => "Proxy Admin",
            Self::Proxy => "Proxy",
            Self::MathLibrary => "Math Library",
            Self::ServiceRegistry => "Service Registry",
            Self::Settings => "Settings",
            Self::FlashLender => "Flash Lender",
            Self::EthOracle => "ETH/USD Oracle",
            Self::CbEthToUsdOracle => "cbETH/USD Oracle",
            Self::WstEthToUsdOracle => "wstETH/USD Oracle",
            Self::StrategyAaveV3Any => "Strategy",
            Self::Vault => "Vault",
        }
    }
}

alloy_core::sol! {
    interface IServiceRegistry {
        function registerService(bytes32 serviceNameHash, address serviceAddress) external;
        function unregisterService(bytes32 serviceNameHash) external;
        function getServiceFromHash(bytes32 serviceHash) external view returns (address);
    }

    interface IOwnable {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
    }

    interface ISettings {
        function initialize(address initialOwner) external;
    }

    interface IStrategy {
        function initialize(
            address initialOwner,
            address initialGovernor,
            address registry,
            bytes32 collateral,
            bytes32 oracle,
            uint24 swapFeeTier,
            uint8 eModeCategory
        ) external;
        function setLoanToValue(uint256 loanToValue) external;
        function getLoanToValue() external view returns (uint256);
    }

    interface IVault {
        function initialize(
            address initialOwner,
            string tokenName,
            string tokenSymbol,
            address registry,
            address strategy
        ) external;
    }
}

/// ABI-encoded constructor arguments of `BakerFiProxy(logic, admin, data)`.
pub fn proxy_args(implementation: Address, proxy_admin: Address, init: Bytes) -> Bytes {
    (implementation, proxy_admin, init).abi_encode_params().into()
}

/// Decode the arguments produced by [`proxy_args`].
pub fn decode_proxy_args(args: &[u8]) -> anyhow::Result<(Address, Address, Bytes)> {
    <(Address, Address, Bytes)>::abi_decode_params(args, true)
        .map_err(|e| anyhow::anyhow!("Malformed proxy constructor arguments: {e}"))
}

/// ABI-encoded arguments of a constructor taking a single address.
pub fn address_arg(address: Address) -> Bytes {
    (address,).abi_encode_params().into()
}
