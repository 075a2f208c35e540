//! Service Registry client.
//!
//! Registration is an upsert keyed by the hash of a canonical name: writing a
//! name twice leaves the last address in the slot.

use alloy_core::primitives::Address;
use anyhow::{Context, Result};

use crate::chain::{self, Chain};
use crate::contracts::IServiceRegistry;

mod names;
pub use names::{CollateralAsset, SERVICE_NAMES_VERSION, ServiceName};

/// Handle on a deployed Service Registry, acting as the deployer.
#[derive(Debug)]
pub struct ServiceRegistry<'a, C> {
    chain: &'a C,
    address: Address,
}

impl<'a, C: Chain> ServiceRegistry<'a, C> {
    pub fn new(chain: &'a C, address: Address) -> Self {
        Self { chain, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Map `name` to `address`, replacing any previous mapping.
    pub async fn register(&self, name: ServiceName, address: Address) -> Result<()> {
        let call = IServiceRegistry::registerServiceCall {
            serviceNameHash: name.id(),
            serviceAddress: address,
        };
        chain::transact(self.chain, self.address, call)
            .await
            .with_context(|| format!("Failed to register service '{name}'"))?;

        tracing::info!(service = %name, %address, "Service registered");
        Ok(())
    }

    pub async fn unregister(&self, name: ServiceName) -> Result<()> {
        let call = IServiceRegistry::unregisterServiceCall {
            serviceNameHash: name.id(),
        };
        chain::transact(self.chain, self.address, call)
            .await
            .with_context(|| format!("Failed to unregister service '{name}'"))?;

        tracing::info!(service = %name, "Service unregistered");
        Ok(())
    }

    /// Current address of `name`, or `None` for an empty slot.
    pub async fn resolve(&self, name: ServiceName) -> Result<Option<Address>> {
        let call = IServiceRegistry::getServiceFromHashCall {
            serviceHash: name.id(),
        };
        let address = chain::view(self.chain, self.address, call)
            .await
            .with_context(|| format!("Failed to resolve service '{name}'"))?
            ._0;

        Ok((address != Address::ZERO).then_some(address))
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Bytes;

    use super::*;
    use crate::chain::{DEFAULT_DEPLOYER, MemoryChain};
    use crate::contracts::{Contract, address_arg};
    use crate::oracle::OraclePair;

    async fn deploy_registry(chain: &MemoryChain) -> Address {
        chain
            .deploy(
                Contract::ServiceRegistry,
                Bytes::from_static(&[0x60, 0x80]),
                address_arg(DEFAULT_DEPLOYER),
            )
            .await
            .expect("Failed to deploy registry")
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let chain = MemoryChain::default();
        let registry = ServiceRegistry::new(&chain, deploy_registry(&chain).await);

        let first = Address::repeat_byte(0x0a);
        let second = Address::repeat_byte(0x0b);
        registry.register(ServiceName::Weth, first).await.unwrap();
        registry.register(ServiceName::Weth, second).await.unwrap();

        assert_eq!(
            registry.resolve(ServiceName::Weth).await.unwrap(),
            Some(second),
            "Second registration should replace the first"
        );
    }

    #[tokio::test]
    async fn test_unregistered_name_resolves_to_none() {
        let chain = MemoryChain::default();
        let registry = ServiceRegistry::new(&chain, deploy_registry(&chain).await);

        let oracle = ServiceName::Oracle(OraclePair::EthUsd);
        assert_eq!(registry.resolve(oracle).await.unwrap(), None);

        registry.register(oracle, Address::repeat_byte(0x0c)).await.unwrap();
        registry.unregister(oracle).await.unwrap();
        assert_eq!(registry.resolve(oracle).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_slot_is_keyed_by_name_hash() {
        let chain = MemoryChain::default();
        let address = deploy_registry(&chain).await;
        let registry = ServiceRegistry::new(&chain, address);

        registry
            .register(ServiceName::AaveV3, Address::repeat_byte(0x0d))
            .await
            .unwrap();

        let slot = chain
            .registry_slot(address, alloy_core::primitives::keccak256(b"AAVE_V3"))
            .unwrap();
        assert_eq!(slot, Some(Address::repeat_byte(0x0d)));
    }
}
