//! JSON-RPC chain client with an unlocked deployer account.

use std::time::{Duration, Instant};

use alloy_core::primitives::{Address, B256, Bytes, U64};
use anyhow::{Context, Result};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use super::Chain;
use crate::{DeployError, contracts::Contract};

/// Timeout for a single HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long a transaction may stay unconfirmed before the run is aborted.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Receipt fields the pipeline reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    transaction_hash: B256,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    status: Option<String>,
    contract_address: Option<Address>,
}

impl Receipt {
    fn succeeded(&self) -> bool {
        self.status.as_deref().is_none_or(|s| s != "0x0")
    }
}

/// A chain reached over HTTP JSON-RPC.
///
/// Transactions are submitted with `eth_sendTransaction`, so the node must
/// hold the deployer's key (a local dev node or a signing proxy).
#[derive(Debug, Clone)]
pub struct RpcChain {
    client: reqwest::Client,
    url: Url,
    deployer: Address,
    chain_id: u64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl RpcChain {
    /// Connect to `url`, read its chain id and pick the deployer account.
    ///
    /// Without an explicit `deployer`, the node's first account is used.
    pub async fn connect(
        url: Url,
        deployer: Option<Address>,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let chain_id: U64 = json_rpc_call(&client, &url, "eth_chainId", vec![])
            .await
            .context("Failed to read chain id")?;
        let chain_id = chain_id.to::<u64>();

        let deployer = match deployer {
            Some(deployer) => deployer,
            None => {
                let accounts: Vec<Address> =
                    json_rpc_call(&client, &url, "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                accounts.first().copied().ok_or_else(|| {
                    DeployError::Config(format!(
                        "{url} exposes no unlocked account; pass --deployer"
                    ))
                })?
            }
        };

        tracing::info!(%url, chain_id, %deployer, "Connected to RPC endpoint");

        Ok(Self {
            client,
            url,
            deployer,
            chain_id,
            confirmation_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Poll for receipts every `interval` instead of the default.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Submit a transaction and wait for its receipt.
    async fn submit(&self, action: &str, to: Option<Address>, data: Bytes) -> Result<Receipt> {
        let mut tx = json!({
            "from": self.deployer,
            "data": data,
        });
        if let Some(to) = to {
            tx["to"] = json!(to);
        }

        let tx_hash: B256 = json_rpc_call(&self.client, &self.url, "eth_sendTransaction", vec![tx])
            .await
            .map_err(|e| match e.downcast_ref::<DeployError>() {
                // Nodes that estimate gas up front report the revert here.
                Some(DeployError::Rpc(message)) if message.contains("revert") => {
                    DeployError::reverted(action, message.clone()).into()
                }
                _ => e,
            })?;

        tracing::debug!(%tx_hash, action, "Transaction submitted");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.succeeded() {
            return Err(DeployError::reverted(
                action,
                format!("transaction {} has status 0x0", receipt.transaction_hash),
            )
            .into());
        }
        Ok(receipt)
    }

    /// Poll `eth_getTransactionReceipt` until the receipt appears or the
    /// confirmation timeout elapses.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt> {
        let start = Instant::now();

        loop {
            let receipt: Option<Receipt> = json_rpc_call(
                &self.client,
                &self.url,
                "eth_getTransactionReceipt",
                vec![json!(tx_hash)],
            )
            .await?;

            if let Some(receipt) = receipt {
                return Ok(receipt);
            }

            if start.elapsed() > self.confirmation_timeout {
                return Err(DeployError::ConfirmationTimeout {
                    tx_hash,
                    timeout_secs: self.confirmation_timeout.as_secs(),
                }
                .into());
            }

            tracing::trace!(%tx_hash, "Receipt not available yet, retrying...");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Chain for RpcChain {
    fn deployer(&self) -> Address {
        self.deployer
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn deploy(&self, contract: Contract, code: Bytes, args: Bytes) -> Result<Address> {
        let action = format!("deploying {contract}");
        let mut data = code.to_vec();
        data.extend_from_slice(&args);

        let receipt = self.submit(&action, None, data.into()).await?;
        receipt.contract_address.ok_or_else(|| {
            DeployError::Rpc(format!(
                "receipt of {} has no contract address",
                receipt.transaction_hash
            ))
            .into()
        })
    }

    async fn send(&self, to: Address, data: Bytes) -> Result<B256> {
        let action = format!("calling {to}");
        let receipt = self.submit(&action, Some(to), data).await?;
        Ok(receipt.transaction_hash)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = json!({
            "from": self.deployer,
            "to": to,
            "data": data,
        });
        json_rpc_call(&self.client, &self.url, "eth_call", vec![request, json!("latest")]).await
    }
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Transport failures and error responses are both reported as
/// [`DeployError::Rpc`].
async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T> {
    let response = client
        .post(url.clone())
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| DeployError::Rpc(format!("failed to send {method} request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| DeployError::Rpc(format!("failed to parse {method} response: {e}")))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Err(DeployError::Rpc(format!("{method}: {message}")).into());
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| DeployError::Rpc(format!("no result in {method} response")))?;

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {method} result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_receipt_status() {
        let ok: Receipt = serde_json::from_value(json!({
            "transactionHash": B256::repeat_byte(0x01),
            "status": "0x1",
            "contractAddress": Address::repeat_byte(0x02),
        }))
        .unwrap();
        assert!(ok.succeeded());
        assert_eq!(ok.contract_address, Some(Address::repeat_byte(0x02)));

        let reverted: Receipt = serde_json::from_value(json!({
            "transactionHash": B256::repeat_byte(0x01),
            "status": "0x0",
            "contractAddress": null,
        }))
        .unwrap();
        assert!(!reverted.succeeded());
        assert_eq!(reverted.contract_address, None);
    }

    #[test]
    fn test_receipt_without_status_counts_as_success() {
        let legacy: Receipt = serde_json::from_value(json!({
            "transactionHash": B256::repeat_byte(0x01),
        }))
        .unwrap();
        assert!(legacy.succeeded());
    }

    /// Serve JSON-RPC over plain HTTP on a local port, one request per
    /// connection. `respond` maps a method name to the response body.
    async fn serve(respond: fn(&str) -> Value) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let method = request["method"].as_str().unwrap_or_default();
                    let body = respond(method).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}").parse().unwrap()
    }

    async fn read_request(socket: &mut TcpStream) -> Value {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return Value::Null;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body = end + 4;
            if buf.len() >= body + length {
                return serde_json::from_slice(&buf[body..body + length]).unwrap();
            }
        }
    }

    fn rpc_result(result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": 1, "result": result })
    }

    fn rpc_error(message: &str) -> Value {
        json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": message } })
    }

    async fn connect(url: Url, confirmation_timeout: Duration) -> RpcChain {
        RpcChain::connect(url, None, confirmation_timeout)
            .await
            .unwrap()
            .with_poll_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_connect_reads_chain_id_and_first_account() {
        let url = serve(|method| match method {
            "eth_chainId" => rpc_result(json!("0x2105")),
            "eth_accounts" => rpc_result(json!([Address::repeat_byte(0x0a)])),
            _ => rpc_error("method not found"),
        })
        .await;

        let chain = connect(url, DEFAULT_CONFIRMATION_TIMEOUT).await;
        assert_eq!(chain.chain_id(), 8453);
        assert_eq!(chain.deployer(), Address::repeat_byte(0x0a));
    }

    #[tokio::test]
    async fn test_missing_receipt_times_out() {
        let url = serve(|method| match method {
            "eth_chainId" => rpc_result(json!("0x7a69")),
            "eth_accounts" => rpc_result(json!([Address::repeat_byte(0x0a)])),
            "eth_sendTransaction" => rpc_result(json!(B256::repeat_byte(0x01))),
            "eth_getTransactionReceipt" => rpc_result(Value::Null),
            _ => rpc_error("method not found"),
        })
        .await;

        let chain = connect(url, Duration::from_millis(100)).await;
        let err = chain
            .send(Address::repeat_byte(0x0b), Bytes::new())
            .await
            .unwrap_err();

        assert_eq!(crate::error_kind(&err), Some(crate::ErrorKind::Network));
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::ConfirmationTimeout { tx_hash, .. }) if *tx_hash == B256::repeat_byte(0x01)
        ));
    }

    #[tokio::test]
    async fn test_zero_status_receipt_is_a_revert() {
        let url = serve(|method| match method {
            "eth_chainId" => rpc_result(json!("0x7a69")),
            "eth_accounts" => rpc_result(json!([Address::repeat_byte(0x0a)])),
            "eth_sendTransaction" => rpc_result(json!(B256::repeat_byte(0x01))),
            "eth_getTransactionReceipt" => rpc_result(json!({
                "transactionHash": B256::repeat_byte(0x01),
                "status": "0x0",
                "contractAddress": null,
            })),
            _ => rpc_error("method not found"),
        })
        .await;

        let chain = connect(url, DEFAULT_CONFIRMATION_TIMEOUT).await;
        let err = chain
            .deploy(Contract::Settings, Bytes::from_static(&[0x60, 0x00]), Bytes::new())
            .await
            .unwrap_err();

        assert_eq!(crate::error_kind(&err), Some(crate::ErrorKind::Transaction));
        assert!(err.to_string().contains("status 0x0"));
    }

    #[tokio::test]
    async fn test_send_error_mentioning_revert_is_a_transaction_error() {
        let url = serve(|method| match method {
            "eth_chainId" => rpc_result(json!("0x7a69")),
            "eth_accounts" => rpc_result(json!([Address::repeat_byte(0x0a)])),
            "eth_sendTransaction" => rpc_error("execution reverted: Ownable: caller is not the owner"),
            _ => rpc_error("method not found"),
        })
        .await;

        let chain = connect(url, DEFAULT_CONFIRMATION_TIMEOUT).await;
        let err = chain
            .send(Address::repeat_byte(0x0b), Bytes::new())
            .await
            .unwrap_err();

        assert_eq!(crate::error_kind(&err), Some(crate::ErrorKind::Transaction));
        assert!(format!("{err:#}").contains("caller is not the owner"));
    }

    #[tokio::test]
    async fn test_other_send_errors_stay_network_errors() {
        let url = serve(|method| match method {
            "eth_chainId" => rpc_result(json!("0x7a69")),
            "eth_accounts" => rpc_result(json!([Address::repeat_byte(0x0a)])),
            "eth_sendTransaction" => rpc_error("insufficient funds for gas"),
            _ => rpc_error("method not found"),
        })
        .await;

        let chain = connect(url, DEFAULT_CONFIRMATION_TIMEOUT).await;
        let err = chain
            .send(Address::repeat_byte(0x0b), Bytes::new())
            .await
            .unwrap_err();

        assert_eq!(crate::error_kind(&err), Some(crate::ErrorKind::Network));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_network_error() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let url: Url = "http://127.0.0.1:9".parse().unwrap();

        let err = json_rpc_call::<U64>(&client, &url, "eth_chainId", vec![])
            .await
            .unwrap_err();
        assert_eq!(crate::error_kind(&err), Some(crate::ErrorKind::Network));
    }
}
