//! Chain clients.
//!
//! The pipeline only needs an unlocked deployer account that can create
//! contracts, send confirmed transactions and make read-only calls. [`RpcChain`]
//! does this against a JSON-RPC endpoint; [`MemoryChain`] models the same
//! surface in-process for dry runs and tests.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use alloy_core::sol_types::SolCall;
use anyhow::{Context, Result};

use crate::contracts::Contract;

mod memory;
pub use memory::{DEFAULT_CHAIN_ID, DEFAULT_DEPLOYER, MemoryChain, Transaction};

mod rpc;
pub use rpc::{DEFAULT_CONFIRMATION_TIMEOUT, RpcChain};

/// Access to a chain through a single deployer account.
///
/// Every state-changing method resolves only once the transaction is
/// confirmed, and fails if it reverted.
pub trait Chain: Send + Sync {
    /// Account that signs every transaction.
    fn deployer(&self) -> Address;

    fn chain_id(&self) -> u64;

    /// Create `contract` from linked creation `code` followed by ABI-encoded
    /// constructor `args`, returning the new address.
    fn deploy(
        &self,
        contract: Contract,
        code: Bytes,
        args: Bytes,
    ) -> impl Future<Output = Result<Address>> + Send;

    /// Send `data` to `to`, returning the confirmed transaction hash.
    fn send(&self, to: Address, data: Bytes) -> impl Future<Output = Result<B256>> + Send;

    /// Read-only call against the latest state.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Make a typed read-only call and decode its return values.
pub async fn view<C: Chain, T: SolCall>(chain: &C, to: Address, call: T) -> Result<T::Return> {
    let data: Bytes = call.abi_encode().into();
    let output = chain.call(to, data).await?;
    T::abi_decode_returns(&output, true)
        .with_context(|| format!("Failed to decode {} output from {to}", T::SIGNATURE))
}

/// Send a typed call as a confirmed transaction.
pub async fn transact<C: Chain, T: SolCall>(chain: &C, to: Address, call: T) -> Result<B256> {
    let data: Bytes = call.abi_encode().into();
    chain
        .send(to, data)
        .await
        .with_context(|| format!("Failed to call {} on {to}", T::SIGNATURE))
}
