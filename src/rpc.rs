//! Ledger RPC collaborator interface and the bundled HTTP client.
//!
//! The core never talks to a concrete ledger directly: the resolver and the
//! execution driver take a [`LedgerRpc`] implementation as a constructor
//! argument (no ambient singletons). `JsonRpcClient` is the production
//! implementation over JSON-RPC 2.0; the in-process mock lives in
//! [`crate::mock_ledger`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::block::errors::{PtbError, PtbResult};
use crate::types::{
    Address, BlockDigest, ExecutionResult, ObjectDigest, ObjectId, Signature, Version,
};

/// Ownership of an on-chain object as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Owner {
    Address { address: Address },
    Shared { initial_shared_version: Version },
    Immutable,
}

/// Current ledger state of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub version: Version,
    pub digest: ObjectDigest,
    pub owner: Owner,
}

/// External collaborator: the ledger's RPC surface.
///
/// Implementations map transport failures to [`PtbError::Rpc`] (retryable)
/// and ledger-level misses to the precise taxonomy variant (`ObjectNotFound`,
/// `Failed`, ...), which the retry policy treats as terminal.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch an object's current version, digest, and owner.
    async fn fetch_object(&self, id: ObjectId) -> PtbResult<ObjectInfo>;

    /// Submit canonical block bytes plus signature. Returns the provisional
    /// digest immediately; finality comes from polling `get_effects`.
    async fn submit(
        &self,
        bytes: &[u8],
        signature: &Signature,
        sender: Address,
    ) -> PtbResult<BlockDigest>;

    /// Finalized effects for a digest, or `None` while still pending.
    async fn get_effects(&self, digest: &BlockDigest) -> PtbResult<Option<ExecutionResult>>;
}

// JSON-RPC error code the ledger uses for unknown objects.
const CODE_OBJECT_NOT_FOUND: i64 = -32001;
// Code for blocks the ledger refuses to accept at submission time.
const CODE_SUBMISSION_REJECTED: i64 = -32002;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client for a ledger fullnode endpoint.
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(endpoint: impl Into<String>) -> PtbResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PtbError::rpc(format!("failed to build http client: {e}")))?;
        Ok(Self { http, endpoint: endpoint.into(), next_id: AtomicU64::new(1) })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> PtbResult<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| PtbError::rpc(format!("transport failure calling {method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PtbError::rpc(format!("{method} returned http {status}")));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| PtbError::rpc(format!("malformed response from {method}: {e}")))?;

        if let Some(err) = body.error {
            return Err(map_rpc_error(method, err));
        }
        body.result
            .ok_or_else(|| PtbError::rpc(format!("{method} returned neither result nor error")))
    }
}

fn map_rpc_error(method: &str, err: RpcErrorBody) -> PtbError {
    match err.code {
        CODE_OBJECT_NOT_FOUND => {
            // The message carries the id; parse it back when possible.
            match err.message.split_whitespace().last().and_then(|s| ObjectId::parse(s).ok()) {
                Some(id) => PtbError::ObjectNotFound { id },
                None => PtbError::rpc(format!("{method}: {}", err.message)),
            }
        }
        CODE_SUBMISSION_REJECTED => PtbError::failed(err.message),
        // Server-side 5xx-style codes are transient; everything else is not.
        code if (-32099..=-32050).contains(&code) => {
            PtbError::rpc(format!("{method} server error {code}: {}", err.message))
        }
        code => PtbError::failed(format!("{method} error {code}: {}", err.message)),
    }
}

#[async_trait]
impl LedgerRpc for JsonRpcClient {
    async fn fetch_object(&self, id: ObjectId) -> PtbResult<ObjectInfo> {
        self.call("ledger_getObject", json!([id])).await
    }

    async fn submit(
        &self,
        bytes: &[u8],
        signature: &Signature,
        sender: Address,
    ) -> PtbResult<BlockDigest> {
        self.call(
            "ledger_submitBlock",
            json!({
                "bytes": hex::encode(bytes),
                "signature": hex::encode(signature.as_bytes()),
                "sender": sender,
            }),
        )
        .await
    }

    async fn get_effects(&self, digest: &BlockDigest) -> PtbResult<Option<ExecutionResult>> {
        // The envelope keeps "still pending" (effects: null) distinguishable
        // from a missing result field.
        let envelope: EffectsEnvelope = self.call("ledger_getEffects", json!([digest])).await?;
        Ok(envelope.effects)
    }
}

#[derive(Debug, Deserialize)]
struct EffectsEnvelope {
    effects: Option<ExecutionResult>,
}
