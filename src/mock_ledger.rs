//! In-process ledger for tests and local development (`mock-mode`).
//!
//! Implements [`LedgerRpc`] against an in-memory object table. Submission
//! decodes the canonical bytes and executes just enough semantics to
//! exercise the driver: unknown call packages fail, injected aborts abort,
//! everything else succeeds with the block's object inputs reported as
//! mutated. Transient fetch failures and delayed finality are injectable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::block::commands::Command;
use crate::block::errors::{PtbError, PtbResult};
use crate::codec;
use crate::rpc::{LedgerRpc, ObjectInfo, Owner};
use crate::types::{
    Address, BlockDigest, BlockEffects, ExecutionResult, ExecutionStatus, ObjectDigest,
    ObjectId, ObjectRef, Signature, Version, ID_LENGTH,
};

fn object_digest(id: &ObjectId, version: Version) -> ObjectDigest {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(version.value().to_le_bytes());
    let hash = hasher.finalize();
    let mut out = [0u8; ID_LENGTH];
    out.copy_from_slice(&hash);
    ObjectDigest(out)
}

#[derive(Default)]
pub struct MockLedger {
    objects: Mutex<HashMap<ObjectId, ObjectInfo>>,
    packages: Mutex<HashSet<ObjectId>>,
    pending: Mutex<HashMap<BlockDigest, (ExecutionResult, u32)>>,
    abort_reason: Mutex<Option<String>>,
    pending_polls: AtomicU32,
    fail_fetches: AtomicU32,
    fetch_calls: AtomicU64,
    submit_calls: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an address-owned object.
    pub fn add_owned_object(&self, id: ObjectId, version: Version, owner: Address) {
        self.objects.lock().unwrap().insert(
            id,
            ObjectInfo {
                id,
                version,
                digest: object_digest(&id, version),
                owner: Owner::Address { address: owner },
            },
        );
    }

    /// Insert or replace a shared object.
    pub fn add_shared_object(&self, id: ObjectId, initial_shared_version: Version) {
        self.objects.lock().unwrap().insert(
            id,
            ObjectInfo {
                id,
                version: initial_shared_version,
                digest: object_digest(&id, initial_shared_version),
                owner: Owner::Shared { initial_shared_version },
            },
        );
    }

    /// Register a package id so calls targeting it execute.
    pub fn add_package(&self, id: ObjectId) {
        self.packages.lock().unwrap().insert(id);
    }

    /// Force the next submission to abort with the given reason.
    pub fn abort_next(&self, reason: &str) {
        *self.abort_reason.lock().unwrap() = Some(reason.to_string());
    }

    /// Number of `get_effects` calls that report pending before finality.
    pub fn set_pending_polls(&self, polls: u32) {
        self.pending_polls.store(polls, Ordering::SeqCst);
    }

    /// Make the next `n` object fetches fail transiently.
    pub fn fail_next_fetches(&self, n: u32) {
        self.fail_fetches.store(n, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn execute_decoded(&self, block: &crate::block::builder::FrozenBlock) -> (ExecutionStatus, BlockEffects) {
        if let Some(reason) = self.abort_reason.lock().unwrap().take() {
            return (ExecutionStatus::Aborted { reason }, BlockEffects::default());
        }

        let packages = self.packages.lock().unwrap();
        for command in &block.commands {
            if let Command::Call { target, .. } = command {
                if !packages.contains(&target.package) {
                    return (
                        ExecutionStatus::Failed {
                            reason: format!("package not found: {}", target.package),
                        },
                        BlockEffects::default(),
                    );
                }
            }
        }
        drop(packages);

        // Every object input (plus gas payment) counts as mutated; bump the
        // stored versions so re-resolution observes the new state.
        let mut mutated = Vec::new();
        let mut objects = self.objects.lock().unwrap();
        let mut touch = |id: ObjectId| {
            if let Some(info) = objects.get_mut(&id) {
                let next = Version(info.version.value() + 1);
                info.version = next;
                info.digest = object_digest(&id, next);
                mutated.push(ObjectRef { id, version: next, digest: info.digest });
            }
        };
        for input in block.pool.iter() {
            if let Some(id) = input.object_id() {
                touch(id);
            }
        }
        for payment in &block.gas.payment {
            touch(payment.id);
        }

        (
            ExecutionStatus::Success,
            BlockEffects { created: Vec::new(), mutated, deleted: Vec::new() },
        )
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn fetch_object(&self, id: ObjectId) -> PtbResult<ObjectInfo> {
        if self
            .fail_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PtbError::rpc("injected transient failure"));
        }
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .ok_or(PtbError::ObjectNotFound { id })
    }

    async fn submit(
        &self,
        bytes: &[u8],
        _signature: &Signature,
        _sender: Address,
    ) -> PtbResult<BlockDigest> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let block = codec::decode_block(bytes)
            .map_err(|e| PtbError::failed(format!("malformed block: {e}")))?;
        let digest = codec::block_digest(bytes);

        let (status, effects) = self.execute_decoded(&block);
        let result = ExecutionResult { digest, status, effects };
        let polls = self.pending_polls.load(Ordering::SeqCst);
        self.pending.lock().unwrap().insert(digest, (result, polls));
        Ok(digest)
    }

    async fn get_effects(&self, digest: &BlockDigest) -> PtbResult<Option<ExecutionResult>> {
        let mut pending = self.pending.lock().unwrap();
        match pending.get_mut(digest) {
            None => Err(PtbError::failed(format!("unknown digest {digest}"))),
            Some((_, polls)) if *polls > 0 => {
                *polls -= 1;
                Ok(None)
            }
            Some((result, _)) => Ok(Some(result.clone())),
        }
    }
}
