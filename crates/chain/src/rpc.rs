use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use primitive_types::U256;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use shared::domain::{Address, TxHash};
use tracing::{debug, warn};
use url::Url;

use crate::{transport::ContractTransport, ChainError};

/// Ethereum JSON-RPC over HTTP.
pub struct JsonRpcTransport {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorBody {
    fn into_error(self) -> ChainError {
        let message = match self.data {
            Some(Value::String(data)) if !data.is_empty() => format!("{} ({data})", self.message),
            _ => self.message,
        };
        ChainError::from_rpc(self.code, message)
    }
}

#[derive(Debug, Deserialize)]
struct ReceiptBody {
    #[serde(default)]
    status: Option<String>,
}

fn encode_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_data(raw: &str) -> Result<Vec<u8>, ChainError> {
    let body = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(body).map_err(|err| ChainError::Transport(format!("invalid hex data: {err}")))
}

fn parse_quantity(raw: &str) -> Result<U256, ChainError> {
    let body = raw.strip_prefix("0x").unwrap_or(raw);
    if body.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(body, 16)
        .map_err(|err| ChainError::Transport(format!("invalid quantity {raw}: {err:?}")))
}

impl JsonRpcTransport {
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(http: Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc: request");
        let envelope: RpcEnvelope = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = envelope.error {
            let error = error.into_error();
            debug!(method, id, error = %error, "rpc: error response");
            return Err(error);
        }
        serde_json::from_value(envelope.result.unwrap_or(Value::Null)).map_err(|err| {
            warn!(method, id, error = %err, "rpc: unexpected result shape");
            ChainError::Transport(format!("{method}: invalid result: {err}"))
        })
    }
}

#[async_trait]
impl ContractTransport for JsonRpcTransport {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let raw: String = self.request("eth_chainId", json!([])).await?;
        Ok(parse_quantity(&raw)?.low_u64())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        self.request("eth_accounts", json!([])).await
    }

    async fn get_code(&self, address: Address) -> Result<Vec<u8>, ChainError> {
        let raw: String = self
            .request("eth_getCode", json!([address, "latest"]))
            .await?;
        decode_data(&raw)
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let raw: String = self
            .request(
                "eth_call",
                json!([{ "to": to, "data": encode_data(&data) }, "latest"]),
            )
            .await?;
        decode_data(&raw)
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<U256, ChainError> {
        let raw: String = self
            .request(
                "eth_estimateGas",
                json!([{ "from": from, "to": to, "data": encode_data(&data) }]),
            )
            .await?;
        parse_quantity(&raw)
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<TxHash, ChainError> {
        self.request(
            "eth_sendTransaction",
            json!([{ "from": from, "to": to, "data": encode_data(&data) }]),
        )
        .await
    }

    async fn receipt_status(&self, hash: TxHash) -> Result<Option<bool>, ChainError> {
        let receipt: Option<ReceiptBody> = self
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;
        Ok(receipt.map(|receipt| match receipt.status.as_deref() {
            Some(status) => parse_quantity(status).map(|v| !v.is_zero()).unwrap_or(false),
            None => true,
        }))
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
