//! Post-deployment verification.
//!
//! Reads the deployed system back through view calls and compares it to what
//! the run recorded.

use std::fmt;

use alloy_core::primitives::Address;
use anyhow::Result;
use comfy_table::{Table, presets::UTF8_FULL};

use crate::{
    DeployConfig,
    chain::{self, Chain},
    contracts::{IOwnable, IStrategy},
    registry::{CollateralAsset, ServiceName, ServiceRegistry},
    stages::Deployment,
};

/// Verification report for a deployment.
pub struct VerificationReport {
    pub checks: Vec<Check>,
    /// Overall result: every check passed.
    pub healthy: bool,
}

/// One read-back comparison.
pub struct Check {
    pub name: String,
    pub expected: String,
    /// What the chain returned, or the error that prevented reading it.
    pub actual: String,
    pub passed: bool,
}

impl Check {
    fn compare<T: PartialEq + fmt::Display>(
        name: impl Into<String>,
        expected: T,
        actual: Result<T>,
    ) -> Self {
        let (actual, passed) = match actual {
            Ok(actual) => {
                let passed = actual == expected;
                (actual.to_string(), passed)
            }
            Err(e) => (format!("error: {e:#}"), false),
        };
        Self {
            name: name.into(),
            expected: expected.to_string(),
            actual,
            passed,
        }
    }
}

/// Read back ownership, loan-to-value and every registry entry.
pub async fn verify_deployment<C: Chain>(
    chain: &C,
    config: &DeployConfig,
    deployment: &Deployment,
) -> Result<VerificationReport> {
    let system = &deployment.system;
    let strategy = system.protocol.strategy.proxy;
    let registry = ServiceRegistry::new(chain, system.foundation.registry);

    let mut checks = Vec::new();

    let owner = chain::view(chain, strategy, IOwnable::ownerCall {})
        .await
        .map(|r| r._0);
    checks.push(Check::compare(
        "Strategy owner",
        system.protocol.vault.proxy,
        owner,
    ));

    let loan_to_value = chain::view(chain, strategy, IStrategy::getLoanToValueCall {})
        .await
        .map(|r| r._0);
    checks.push(Check::compare(
        "Loan-to-value",
        config.loan_to_value,
        loan_to_value,
    ));

    let mut expected: Vec<(ServiceName, Address)> = vec![
        (ServiceName::Weth, config.weth),
        (ServiceName::UniswapRouter, config.uniswap_router),
        (ServiceName::UniswapQuoter, config.uniswap_quoter),
        (ServiceName::AaveV3, config.aave_pool),
        (ServiceName::BalancerVault, config.balancer_vault),
        (ServiceName::Settings, system.wiring.settings.proxy),
        (ServiceName::FlashLender, system.wiring.flash_lender),
    ];
    expected.extend(
        [CollateralAsset::CbEth, CollateralAsset::WstEth]
            .into_iter()
            .filter_map(|asset| {
                config
                    .collateral_address(asset)
                    .map(|address| (asset.service_name(), address))
            }),
    );
    expected.extend(
        system
            .wiring
            .oracles
            .iter()
            .map(|(pair, address)| (ServiceName::Oracle(*pair), *address)),
    );

    for (name, address) in expected {
        let resolved = registry
            .resolve(name)
            .await
            .map(|resolved| resolved.unwrap_or(Address::ZERO));
        checks.push(Check::compare(format!("Registry: {name}"), address, resolved));
    }

    let healthy = checks.iter().all(|c| c.passed);
    if healthy {
        tracing::info!(checks = checks.len(), "Deployment verified");
    } else {
        tracing::warn!(
            failed = checks.iter().filter(|c| !c.passed).count(),
            "Deployment verification failed"
        );
    }

    Ok(VerificationReport { checks, healthy })
}

impl VerificationReport {
    /// Fail with the names of the failed checks, if any.
    pub fn ensure_healthy(&self) -> Result<()> {
        if self.healthy {
            return Ok(());
        }
        let failed: Vec<&str> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        anyhow::bail!("Deployment verification failed: {}", failed.join(", "))
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Check", "Expected", "Actual", "Status"]);
        for check in &self.checks {
            table.add_row(vec![
                check.name.clone(),
                check.expected.clone(),
                check.actual.clone(),
                status_label(check.passed).to_string(),
            ]);
        }
        table
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.healthy { "VERIFIED" } else { "FAILED" };
        writeln!(f, "Deployment Status: {}", status)?;
        write!(f, "{}", self.to_table())
    }
}

fn status_label(passed: bool) -> &'static str {
    if passed { "ok" } else { "MISMATCH" }
}
