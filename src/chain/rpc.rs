//! JSON-RPC client for chain lookups.
//!
//! Only the two read methods the service needs are implemented:
//! `getTransaction` for payment verification and `getAccountInfo` for
//! profile lookups. Both return `None` for "does not exist", which callers
//! must not conflate with a transport failure.

use crate::config::ChainConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// A confirmed transaction as seen by the payment verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Static account keys in message order; index 0 is the fee payer.
    pub account_keys: Vec<String>,
    /// Lamport balances before execution, aligned with `account_keys`.
    pub pre_balances: Vec<u64>,
    /// Lamport balances after execution, aligned with `account_keys`.
    pub post_balances: Vec<u64>,
    /// Whether execution failed on-chain.
    pub failed: bool,
}

impl TransactionInfo {
    /// The fee payer (first account key), if present.
    #[must_use]
    pub fn payer(&self) -> Option<&str> {
        self.account_keys.first().map(String::as_str)
    }

    /// Balance change of the account matching `address`, located by address
    /// match among the static keys rather than by position.
    #[must_use]
    pub fn balance_change(&self, address: &str) -> Option<i128> {
        let index = self.account_keys.iter().position(|key| key == address)?;
        let pre = i128::from(*self.pre_balances.get(index)?);
        let post = i128::from(*self.post_balances.get(index)?);
        Some(post - pre)
    }
}

/// An on-chain account as seen by the profile adapter. The payload is
/// opaque; the canonical layout is not published yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Owning program address.
    pub owner: String,
    /// Account balance in lamports.
    pub lamports: u64,
    /// Raw payload size in bytes.
    pub data_len: usize,
}

/// Read-only chain oracle.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Look up a confirmed transaction by signature. `None` means the
    /// cluster does not know the signature.
    async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionInfo>>;

    /// Look up an account by address. `None` means no account exists.
    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>>;
}

/// [`ChainClient`] over HTTP JSON-RPC.
pub struct RpcChainClient {
    client: reqwest::Client,
    url: String,
    commitment: String,
}

impl RpcChainClient {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("skillcert-node/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Chain(format!("failed to build RPC client: {e}")))?;

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            commitment: config.commitment.clone(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!("RPC {} -> {}", method, self.url);

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Chain(format!("RPC request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Chain(format!(
                "RPC returned status {}",
                response.status()
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| Error::Chain(format!("failed to parse RPC response: {e}")))?;

        if let Some(error) = envelope.error {
            return Err(Error::Chain(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionInfo>> {
        let result = self
            .call(
                "getTransaction",
                json!([signature, {
                    "commitment": self.commitment,
                    "encoding": "json",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        let transaction: RpcTransaction = serde_json::from_value(result)
            .map_err(|e| Error::Chain(format!("unexpected transaction shape: {e}")))?;

        Ok(Some(TransactionInfo {
            account_keys: transaction.transaction.message.account_keys,
            pre_balances: transaction.meta.pre_balances,
            post_balances: transaction.meta.post_balances,
            failed: transaction.meta.err.is_some(),
        }))
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>> {
        let result = self
            .call(
                "getAccountInfo",
                json!([address, {
                    "commitment": self.commitment,
                    "encoding": "base64",
                }]),
            )
            .await?;

        let value = result.get("value").cloned().unwrap_or(Value::Null);
        if value.is_null() {
            return Ok(None);
        }

        let account: RpcAccount = serde_json::from_value(value)
            .map_err(|e| Error::Chain(format!("unexpected account shape: {e}")))?;

        let data_len = account
            .data
            .first()
            .map_or(0, |encoded| encoded.len() * 3 / 4);

        Ok(Some(AccountInfo {
            owner: account.owner,
            lamports: account.lamports,
            data_len,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    meta: RpcMeta,
    transaction: RpcTransactionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMeta {
    err: Option<Value>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct RpcTransactionBody {
    message: RpcMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    account_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    owner: String,
    lamports: u64,
    #[serde(default)]
    data: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transaction(keys: &[&str], pre: &[u64], post: &[u64]) -> TransactionInfo {
        TransactionInfo {
            account_keys: keys.iter().map(ToString::to_string).collect(),
            pre_balances: pre.to_vec(),
            post_balances: post.to_vec(),
            failed: false,
        }
    }

    #[test]
    fn payer_is_first_key() {
        let tx = transaction(&["Payer", "Treasury"], &[10, 0], &[5, 5]);
        assert_eq!(tx.payer(), Some("Payer"));

        let empty = transaction(&[], &[], &[]);
        assert_eq!(empty.payer(), None);
    }

    #[test]
    fn balance_change_locates_by_address_not_position() {
        let tx = transaction(
            &["Payer", "SomeProgram", "Treasury"],
            &[1_000, 0, 500],
            &[700, 0, 800],
        );
        assert_eq!(tx.balance_change("Treasury"), Some(300));
        assert_eq!(tx.balance_change("Payer"), Some(-300));
        assert_eq!(tx.balance_change("Absent"), None);
    }

    #[test]
    fn balance_change_handles_decrease() {
        let tx = transaction(&["A"], &[900], &[100]);
        assert_eq!(tx.balance_change("A"), Some(-800));
    }

    #[test]
    fn parse_transaction_response() {
        let json = serde_json::json!({
            "meta": {
                "err": null,
                "preBalances": [1000, 500],
                "postBalances": [700, 800],
                "fee": 5000
            },
            "transaction": {
                "message": {
                    "accountKeys": ["Payer", "Treasury"],
                    "instructions": []
                }
            }
        });

        let parsed: RpcTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.transaction.message.account_keys.len(), 2);
        assert!(parsed.meta.err.is_none());
        assert_eq!(parsed.meta.post_balances, vec![700, 800]);
    }

    #[test]
    fn parse_failed_transaction() {
        let json = serde_json::json!({
            "meta": {
                "err": {"InstructionError": [0, "Custom"]},
                "preBalances": [],
                "postBalances": []
            },
            "transaction": {"message": {"accountKeys": []}}
        });

        let parsed: RpcTransaction = serde_json::from_value(json).unwrap();
        assert!(parsed.meta.err.is_some());
    }

    #[test]
    fn parse_account_response() {
        let json = serde_json::json!({
            "owner": "SkiLLcHaiNPRoGraM11111111111111111111111111",
            "lamports": 2_039_280u64,
            "data": ["aGVsbG8=", "base64"],
            "executable": false,
            "rentEpoch": 361
        });

        let parsed: RpcAccount = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.lamports, 2_039_280);
        assert_eq!(parsed.data.len(), 2);
    }
}
