//! Error taxonomy for a deployment run.
//!
//! Errors are raised as [`DeployError`] where they originate and travel inside
//! `anyhow::Error` with added context, so callers can still recover the kind
//! with `downcast_ref`.

use alloy_core::primitives::B256;
use thiserror::Error;

use crate::record::DeploymentRecord;

/// Coarse classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The Configuration Descriptor is missing a key or names something unknown.
    Configuration,
    /// A transaction reverted on-chain.
    Transaction,
    /// The RPC endpoint failed or a confirmation timed out.
    Network,
}

#[derive(Error, Debug)]
pub enum DeployError {
    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network '{name}' is not defined (known networks: {known})")]
    UnknownNetwork { name: String, known: String },

    #[error("unknown oracle type: {0}")]
    UnknownOracle(String),

    #[error("unknown strategy type: {0}")]
    UnknownStrategy(String),

    #[error("chain id mismatch: descriptor expects {expected}, RPC endpoint reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    // -- Transaction --------------------------------------------------------
    #[error("transaction reverted while {action}: {reason}")]
    TransactionReverted { action: String, reason: String },

    // -- Network ------------------------------------------------------------
    #[error("transaction {tx_hash} not confirmed after {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: B256, timeout_secs: u64 },

    #[error("RPC error: {0}")]
    Rpc(String),
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::UnknownNetwork { .. }
            | Self::UnknownOracle(_)
            | Self::UnknownStrategy(_)
            | Self::ChainIdMismatch { .. } => ErrorKind::Configuration,
            Self::TransactionReverted { .. } => ErrorKind::Transaction,
            Self::ConfirmationTimeout { .. } | Self::Rpc(_) => ErrorKind::Network,
        }
    }

    pub(crate) fn reverted(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransactionReverted {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

/// Classify an arbitrary error chain, if it carries a [`DeployError`].
pub fn error_kind(error: &anyhow::Error) -> Option<ErrorKind> {
    error.downcast_ref::<DeployError>().map(DeployError::kind)
}

/// A run that stopped part way.
///
/// Contracts already deployed stay on-chain and are abandoned; `record` lists
/// them in deployment order so they can be reconciled by hand.
#[derive(Debug)]
pub struct DeployFailure {
    pub record: DeploymentRecord,
    pub error: anyhow::Error,
}

impl DeployFailure {
    pub fn kind(&self) -> Option<ErrorKind> {
        error_kind(&self.error)
    }
}

impl std::fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "deployment aborted after {} recorded step(s): {:#}",
            self.record.len(),
            self.error
        )
    }
}
