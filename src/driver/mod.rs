//! Execution driver: signing, submission, and confirmation polling.
//!
//! State machine per block: `Built -> Signed -> Submitted -> Confirmed |
//! Aborted | Failed`. Signing is pure (no I/O); submission returns a
//! provisional digest; confirmation polls the ledger for finalized effects.
//! Transient RPC errors retry under the bounded backoff policy; abort and
//! failure outcomes are terminal and reported verbatim. Dropping the
//! confirmation future stops local polling only; a submitted block cannot
//! be retracted from the ledger.

pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::block::builder::{BlockBuilder, FrozenBlock};
use crate::block::errors::{PtbError, PtbResult};
use crate::codec;
use crate::config::PtbConfig;
use crate::resolver::Resolver;
use crate::rpc::LedgerRpc;
use crate::signer::SigningCapability;
use crate::types::{Address, BlockDigest, ExecutionResult, Signature};

use retry::retry_with_backoff;

/// Lifecycle phase of a block as it moves through the driver. Terminal
/// phases mirror the ledger-reported execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Built,
    Signed,
    Submitted,
    Confirmed,
    Aborted,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Built => "built",
            Phase::Signed => "signed",
            Phase::Submitted => "submitted",
            Phase::Confirmed => "confirmed",
            Phase::Aborted => "aborted",
            Phase::Failed => "failed",
        }
    }
}

/// Drives frozen blocks through resolution, serialization, signing,
/// submission, and confirmation. Collaborators are injected; distinct
/// blocks may be executed concurrently against the same driver.
pub struct ExecutionDriver<C, S> {
    rpc: Arc<C>,
    signer: Arc<S>,
    config: PtbConfig,
}

impl<C: LedgerRpc, S: SigningCapability> ExecutionDriver<C, S> {
    pub fn new(rpc: Arc<C>, signer: Arc<S>, config: PtbConfig) -> Self {
        Self { rpc, signer, config }
    }

    /// Run the full lifecycle: freeze, resolve, serialize, sign, submit,
    /// and poll to a terminal status. The returned result carries the
    /// ledger's verdict; callers inspect `status` (or use
    /// [`ExecutionResult::ok`]) to distinguish success from abort/failure.
    pub async fn execute(&self, builder: BlockBuilder) -> PtbResult<ExecutionResult> {
        let correlation_id = Uuid::new_v4();
        let frozen = builder.freeze()?;

        let resolver = Resolver::new(Arc::clone(&self.rpc), self.config.retry.clone());
        let resolved = resolver.resolve_block(&frozen).await?;

        let bytes = codec::encode_block(&resolved, self.config.max_tx_bytes)?;
        debug!(
            correlation_id = %correlation_id,
            phase = Phase::Built.as_str(),
            size = bytes.len(),
            commands = resolved.commands.len(),
            "Block serialized"
        );

        let signature = self.sign(&bytes, &resolved)?;
        debug!(
            correlation_id = %correlation_id,
            phase = Phase::Signed.as_str(),
            "Block signed"
        );

        let digest = self.submit(&bytes, &signature, resolved.sender).await?;
        info!(
            correlation_id = %correlation_id,
            phase = Phase::Submitted.as_str(),
            digest = %digest,
            "Block submitted"
        );

        let result = self.confirm(&digest).await?;
        let phase = match &result.status {
            s if s.is_success() => Phase::Confirmed,
            crate::types::ExecutionStatus::Aborted { .. } => Phase::Aborted,
            _ => Phase::Failed,
        };
        info!(
            correlation_id = %correlation_id,
            phase = phase.as_str(),
            digest = %result.digest,
            "Block reached terminal status"
        );
        Ok(result)
    }

    /// Sign canonical bytes. Pure: no network I/O. The signer's identity
    /// must match the block sender.
    pub fn sign(&self, bytes: &[u8], block: &FrozenBlock) -> PtbResult<Signature> {
        let identity = self.signer.public_identity();
        if identity != block.sender {
            return Err(PtbError::signing(format!(
                "signer identity {identity} does not match block sender {}",
                block.sender
            )));
        }
        self.signer.sign(bytes)
    }

    /// Submit signed bytes; returns the provisional digest. Does not imply
    /// finality.
    pub async fn submit(
        &self,
        bytes: &[u8],
        signature: &Signature,
        sender: Address,
    ) -> PtbResult<BlockDigest> {
        retry_with_backoff("submit", &self.config.retry, || {
            let rpc = Arc::clone(&self.rpc);
            let signature = *signature;
            async move { rpc.submit(bytes, &signature, sender).await }
        })
        .await
    }

    /// Poll for finalized effects. Transient errors retry under the backoff
    /// policy; a block that never finalizes within the polling budget
    /// surfaces a terminal timeout. Abort/failure statuses come back inside
    /// a successful result, verbatim, never retried.
    pub async fn confirm(&self, digest: &BlockDigest) -> PtbResult<ExecutionResult> {
        for attempt in 0..self.config.max_poll_attempts {
            let effects = retry_with_backoff("get_effects", &self.config.retry, || {
                let rpc = Arc::clone(&self.rpc);
                let digest = *digest;
                async move { rpc.get_effects(&digest).await }
            })
            .await
            .map_err(|err| {
                if err.is_retryable() {
                    PtbError::ResolutionTimeout { attempts: self.config.retry.max_attempts }
                } else {
                    err
                }
            })?;

            if let Some(result) = effects {
                return Ok(result);
            }
            debug!(
                digest = %digest,
                attempt = attempt + 1,
                max_attempts = self.config.max_poll_attempts,
                "Effects still pending"
            );
            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }

        warn!(digest = %digest, "Confirmation polling budget exhausted");
        Err(PtbError::ResolutionTimeout { attempts: self.config.max_poll_attempts })
    }
}
