//! In-process chain for dry runs and tests.
//!
//! Only the contract surface the pipeline touches is modeled: ownable and
//! governor-gated setters, the service registry, one-shot initializers and
//! proxies that run their initializer on creation. Anything else reverts.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use alloy_core::primitives::{Address, B256, Bytes, U256, address, keccak256};
use alloy_core::sol_types::{SolCall, SolValue};
use anyhow::{Result, anyhow};

use super::Chain;
use crate::{
    DeployError,
    contracts::{
        Contract, IOwnable, IServiceRegistry, ISettings, IStrategy, IVault, decode_proxy_args,
    },
};

/// First account of the standard development mnemonic.
pub const DEFAULT_DEPLOYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// Chain id reported when none is given (a local dev node).
pub const DEFAULT_CHAIN_ID: u64 = 31337;

/// A transaction the chain accepted, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Deploy { contract: Contract, address: Address },
    Call { to: Address, selector: [u8; 4] },
}

#[derive(Debug, Clone)]
struct Account {
    contract: Contract,
    owner: Option<Address>,
    governor: Option<Address>,
    initialized: bool,
    services: HashMap<B256, Address>,
    loan_to_value: U256,
}

impl Account {
    fn new(contract: Contract) -> Self {
        Self {
            contract,
            owner: None,
            governor: None,
            initialized: false,
            services: HashMap::new(),
            loan_to_value: U256::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    nonce: u64,
    accounts: HashMap<Address, Account>,
    transactions: Vec<Transaction>,
    failing: HashSet<Contract>,
}

/// A deterministic in-memory chain.
///
/// Addresses follow CREATE rules from the deployer's nonce, so two runs with
/// the same inputs produce the same addresses.
#[derive(Debug)]
pub struct MemoryChain {
    deployer: Address,
    chain_id: u64,
    state: Mutex<State>,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new(DEFAULT_CHAIN_ID)
    }
}

impl MemoryChain {
    pub fn new(chain_id: u64) -> Self {
        Self::with_deployer(chain_id, DEFAULT_DEPLOYER)
    }

    pub fn with_deployer(chain_id: u64, deployer: Address) -> Self {
        Self {
            deployer,
            chain_id,
            state: Mutex::new(State::default()),
        }
    }

    /// Make every later deployment of `contract` revert.
    pub fn revert_deployments_of(&self, contract: Contract) -> Result<()> {
        self.lock()?.failing.insert(contract);
        Ok(())
    }

    /// Accepted transactions, oldest first.
    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.lock()?.transactions.clone())
    }

    /// The contract deployed at `address`, if any.
    pub fn contract_at(&self, address: Address) -> Result<Option<Contract>> {
        Ok(self.lock()?.accounts.get(&address).map(|a| a.contract))
    }

    /// Raw registry slot, bypassing the call interface.
    pub fn registry_slot(&self, registry: Address, id: B256) -> Result<Option<Address>> {
        Ok(self
            .lock()?
            .accounts
            .get(&registry)
            .and_then(|a| a.services.get(&id).copied()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Memory chain state is poisoned"))
    }

    fn deploy_now(&self, contract: Contract, code: &[u8], args: &[u8]) -> Result<Address> {
        let mut state = self.lock()?;

        let address = self.deployer.create(state.nonce);
        state.nonce += 1;

        let action = format!("deploying {contract}");
        if state.failing.contains(&contract) {
            return Err(DeployError::reverted(action, "injected revert").into());
        }
        if code.is_empty() {
            return Err(DeployError::reverted(action, "empty creation code").into());
        }

        let mut account = Account::new(contract);
        match contract {
            Contract::ProxyAdmin | Contract::ServiceRegistry => {
                let owner = decode_address(args).map_err(|e| DeployError::reverted(&action, e))?;
                account.owner = Some(owner);
            }
            Contract::Proxy => {
                let (logic, admin, init) = decode_proxy_args(args)
                    .map_err(|e| DeployError::reverted(&action, e.to_string()))?;

                let logic = state.accounts.get(&logic).ok_or_else(|| {
                    DeployError::reverted(&action, format!("no implementation at {logic}"))
                })?;
                if state.accounts.get(&admin).map(|a| a.contract) != Some(Contract::ProxyAdmin) {
                    let reason = format!("{admin} is not a proxy admin");
                    return Err(DeployError::reverted(&action, reason).into());
                }

                // The proxy takes on the implementation's behavior with fresh storage.
                account = Account::new(logic.contract);
                if !init.is_empty() {
                    execute(&mut account, self.deployer, &init)
                        .map_err(|reason| DeployError::reverted(&action, reason))?;
                }
            }
            _ => {}
        }

        state.accounts.insert(address, account);
        state.transactions.push(Transaction::Deploy { contract, address });
        tracing::debug!(%contract, %address, "Memory chain created contract");
        Ok(address)
    }

    fn send_now(&self, to: Address, data: &[u8]) -> Result<B256> {
        let mut state = self.lock()?;
        let action = format!("calling {to}");

        let account = state
            .accounts
            .get_mut(&to)
            .ok_or_else(|| DeployError::reverted(&action, "no contract at address"))?;
        execute(account, self.deployer, data)
            .map_err(|reason| DeployError::reverted(&action, reason))?;

        let selector = selector(data).map_err(|reason| DeployError::reverted(&action, reason))?;
        state.transactions.push(Transaction::Call { to, selector });

        let nonce = state.nonce;
        state.nonce += 1;
        let preimage = (self.deployer, U256::from(nonce), Bytes::copy_from_slice(data));
        Ok(keccak256(preimage.abi_encode()))
    }

    fn call_now(&self, to: Address, data: &[u8]) -> Result<Bytes> {
        let state = self.lock()?;
        let action = format!("reading {to}");

        // Calls run against a copy, so nothing leaks into state.
        let mut account = state
            .accounts
            .get(&to)
            .cloned()
            .ok_or_else(|| DeployError::reverted(&action, "no contract at address"))?;
        execute(&mut account, self.deployer, data)
            .map_err(|reason| DeployError::reverted(&action, reason).into())
    }
}

impl Chain for MemoryChain {
    fn deployer(&self) -> Address {
        self.deployer
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn deploy(&self, contract: Contract, code: Bytes, args: Bytes) -> Result<Address> {
        self.deploy_now(contract, &code, &args)
    }

    async fn send(&self, to: Address, data: Bytes) -> Result<B256> {
        self.send_now(to, &data)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.call_now(to, &data)
    }
}

fn selector(data: &[u8]) -> Result<[u8; 4], String> {
    data.get(..4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .ok_or_else(|| "calldata shorter than a selector".to_string())
}

fn decode_address(args: &[u8]) -> Result<Address, String> {
    <(Address,)>::abi_decode_params(args, true)
        .map(|(address,)| address)
        .map_err(|e| format!("malformed constructor arguments: {e}"))
}

fn decode<T: SolCall>(data: &[u8]) -> Result<T, String> {
    T::abi_decode(data, true).map_err(|e| format!("malformed {} calldata: {e}", T::SIGNATURE))
}

fn only(role: &str, expected: Option<Address>, caller: Address) -> Result<(), String> {
    if expected == Some(caller) {
        Ok(())
    } else {
        Err(format!("caller {caller} is not the {role}"))
    }
}

fn initialize_once(account: &mut Account) -> Result<(), String> {
    if account.initialized {
        return Err("contract is already initialized".into());
    }
    account.initialized = true;
    Ok(())
}

const REGISTER_SERVICE: [u8; 4] = IServiceRegistry::registerServiceCall::SELECTOR;
const UNREGISTER_SERVICE: [u8; 4] = IServiceRegistry::unregisterServiceCall::SELECTOR;
const GET_SERVICE: [u8; 4] = IServiceRegistry::getServiceFromHashCall::SELECTOR;
const SETTINGS_INITIALIZE: [u8; 4] = ISettings::initializeCall::SELECTOR;
const STRATEGY_INITIALIZE: [u8; 4] = IStrategy::initializeCall::SELECTOR;
const SET_LOAN_TO_VALUE: [u8; 4] = IStrategy::setLoanToValueCall::SELECTOR;
const GET_LOAN_TO_VALUE: [u8; 4] = IStrategy::getLoanToValueCall::SELECTOR;
const VAULT_INITIALIZE: [u8; 4] = IVault::initializeCall::SELECTOR;
const OWNER: [u8; 4] = IOwnable::ownerCall::SELECTOR;
const TRANSFER_OWNERSHIP: [u8; 4] = IOwnable::transferOwnershipCall::SELECTOR;

/// Run `data` against `account` as `caller`, returning the ABI-encoded output.
fn execute(account: &mut Account, caller: Address, data: &[u8]) -> Result<Bytes, String> {
    let selector = selector(data)?;
    let output: Vec<u8> = match (account.contract, selector) {
        (Contract::ServiceRegistry, REGISTER_SERVICE) => {
            let call = decode::<IServiceRegistry::registerServiceCall>(data)?;
            only("owner", account.owner, caller)?;
            account.services.insert(call.serviceNameHash, call.serviceAddress);
            Vec::new()
        }
        (Contract::ServiceRegistry, UNREGISTER_SERVICE) => {
            let call = decode::<IServiceRegistry::unregisterServiceCall>(data)?;
            only("owner", account.owner, caller)?;
            account.services.remove(&call.serviceNameHash);
            Vec::new()
        }
        (Contract::ServiceRegistry, GET_SERVICE) => {
            let call = decode::<IServiceRegistry::getServiceFromHashCall>(data)?;
            account
                .services
                .get(&call.serviceHash)
                .copied()
                .unwrap_or(Address::ZERO)
                .abi_encode()
        }
        (Contract::Settings, SETTINGS_INITIALIZE) => {
            let call = decode::<ISettings::initializeCall>(data)?;
            initialize_once(account)?;
            account.owner = Some(call.initialOwner);
            Vec::new()
        }
        (Contract::StrategyAaveV3Any, STRATEGY_INITIALIZE) => {
            let call = decode::<IStrategy::initializeCall>(data)?;
            initialize_once(account)?;
            account.owner = Some(call.initialOwner);
            account.governor = Some(call.initialGovernor);
            Vec::new()
        }
        (Contract::StrategyAaveV3Any, SET_LOAN_TO_VALUE) => {
            let call = decode::<IStrategy::setLoanToValueCall>(data)?;
            only("governor", account.governor, caller)?;
            account.loan_to_value = call.loanToValue;
            Vec::new()
        }
        (Contract::StrategyAaveV3Any, GET_LOAN_TO_VALUE) => {
            account.loan_to_value.abi_encode()
        }
        (Contract::Vault, VAULT_INITIALIZE) => {
            let call = decode::<IVault::initializeCall>(data)?;
            initialize_once(account)?;
            account.owner = Some(call.initialOwner);
            Vec::new()
        }
        (_, OWNER) if account.owner.is_some() => {
            account.owner.unwrap_or_default().abi_encode()
        }
        (_, TRANSFER_OWNERSHIP) if account.owner.is_some() => {
            let call = decode::<IOwnable::transferOwnershipCall>(data)?;
            only("owner", account.owner, caller)?;
            if call.newOwner == Address::ZERO {
                return Err("new owner is the zero address".into());
            }
            account.owner = Some(call.newOwner);
            Vec::new()
        }
        (contract, selector) => {
            return Err(format!(
                "{contract} has no function with selector 0x{}",
                hex::encode(selector)
            ));
        }
    };
    Ok(output.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{transact, view};
    use crate::contracts::{address_arg, proxy_args};

    const CODE: &[u8] = &[0x60, 0x80];

    async fn deploy(chain: &MemoryChain, contract: Contract, args: Bytes) -> Address {
        chain
            .deploy(contract, Bytes::from_static(CODE), args)
            .await
            .expect("deployment should succeed")
    }

    #[tokio::test]
    async fn test_addresses_follow_deployer_nonce() {
        let chain = MemoryChain::default();
        let first = deploy(&chain, Contract::MathLibrary, Bytes::new()).await;
        let second = deploy(&chain, Contract::MathLibrary, Bytes::new()).await;

        assert_eq!(first, DEFAULT_DEPLOYER.create(0));
        assert_eq!(second, DEFAULT_DEPLOYER.create(1));
    }

    #[tokio::test]
    async fn test_registry_is_owner_gated() {
        let chain = MemoryChain::default();
        let stranger = Address::repeat_byte(0x99);
        let registry = deploy(&chain, Contract::ServiceRegistry, address_arg(stranger)).await;

        let err = transact(
            &chain,
            registry,
            IServiceRegistry::registerServiceCall {
                serviceNameHash: B256::repeat_byte(0x01),
                serviceAddress: Address::repeat_byte(0x02),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(crate::error_kind(&err), Some(crate::ErrorKind::Transaction));
    }

    #[tokio::test]
    async fn test_proxy_runs_initializer_once() {
        let chain = MemoryChain::default();
        let admin = deploy(&chain, Contract::ProxyAdmin, address_arg(DEFAULT_DEPLOYER)).await;
        let settings = deploy(&chain, Contract::Settings, Bytes::new()).await;

        let init: Bytes = ISettings::initializeCall {
            initialOwner: DEFAULT_DEPLOYER,
        }
        .abi_encode()
        .into();
        let proxy = deploy(&chain, Contract::Proxy, proxy_args(settings, admin, init.clone())).await;

        assert_eq!(chain.contract_at(proxy).unwrap(), Some(Contract::Settings));
        let owner = view(&chain, proxy, IOwnable::ownerCall {}).await.unwrap();
        assert_eq!(owner._0, DEFAULT_DEPLOYER);

        let err = chain.send(proxy, init).await.unwrap_err();
        assert!(format!("{err:#}").contains("already initialized"));
    }

    #[tokio::test]
    async fn test_proxy_requires_proxy_admin() {
        let chain = MemoryChain::default();
        let settings = deploy(&chain, Contract::Settings, Bytes::new()).await;

        let err = chain
            .deploy(
                Contract::Proxy,
                Bytes::from_static(CODE),
                proxy_args(settings, Address::repeat_byte(0x05), Bytes::new()),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a proxy admin"));
    }

    #[tokio::test]
    async fn test_injected_revert_records_nothing() {
        let chain = MemoryChain::default();
        chain.revert_deployments_of(Contract::Vault).unwrap();

        let err = chain
            .deploy(Contract::Vault, Bytes::from_static(CODE), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(crate::error_kind(&err), Some(crate::ErrorKind::Transaction));
        assert!(chain.transactions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_selector_reverts() {
        let chain = MemoryChain::default();
        let library = deploy(&chain, Contract::MathLibrary, Bytes::new()).await;

        let Err(err) = view(&chain, library, IOwnable::ownerCall {}).await else {
            panic!("owner() on a library should revert");
        };
        assert!(format!("{err:#}").contains("has no function with selector"));
    }
}
