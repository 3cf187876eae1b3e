//! Reference resolution against ledger state.
//!
//! Resolution is read-only with respect to the ledger and pure with respect
//! to the block: it returns a resolved copy and never touches the original,
//! so a failure mid-resolution cannot leave a half-resolved pool behind.
//! Independent lookups commute and run concurrently behind a join barrier;
//! each lookup retries transient transport errors under the bounded backoff
//! policy, and exhaustion surfaces as `ResolutionTimeout`.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use crate::block::builder::{FrozenBlock, GasData};
use crate::block::errors::{PtbError, PtbResult};
use crate::block::inputs::{Input, InputPool, OwnedObjectRef};
use crate::driver::retry::{retry_with_backoff, RetryConfig};
use crate::rpc::{LedgerRpc, ObjectInfo, Owner};
use crate::types::ObjectId;

pub struct Resolver<C> {
    rpc: Arc<C>,
    retry: RetryConfig,
}

impl<C: LedgerRpc> Resolver<C> {
    pub fn new(rpc: Arc<C>, retry: RetryConfig) -> Self {
        Self { rpc, retry }
    }

    /// Resolve every object reference in the block: pool inputs and gas
    /// payment objects alike. Returns a new, fully resolved block.
    pub async fn resolve_block(&self, block: &FrozenBlock) -> PtbResult<FrozenBlock> {
        let (pool, payment) = futures::future::try_join(
            self.resolve_pool(&block.pool),
            try_join_all(block.gas.payment.iter().map(|p| self.resolve_owned(p.id))),
        )
        .await?;

        Ok(FrozenBlock {
            sender: block.sender,
            pool,
            commands: block.commands.clone(),
            gas: GasData {
                payment,
                budget: block.gas.budget,
                price: block.gas.price,
            },
            expiration: block.expiration,
        })
    }

    /// Resolve a pool into a new pool. Object references are re-fetched even
    /// when already resolved, so unchanged ledger state makes this a no-op
    /// and changed state wins with the newer version. Pure inputs pass
    /// through untouched.
    pub async fn resolve_pool(&self, pool: &InputPool) -> PtbResult<InputPool> {
        let lookups = pool.iter().enumerate().filter_map(|(i, input)| {
            input.object_id().map(|_| {
                let input = input.clone();
                async move { Ok::<_, PtbError>((i as u16, self.resolve_input(input).await?)) }
            })
        });
        let resolved_inputs = try_join_all(lookups).await?;

        let mut resolved = pool.clone();
        for (index, input) in resolved_inputs {
            resolved.set(index, input);
        }
        debug!(inputs = pool.len(), "Resolved input pool");
        Ok(resolved)
    }

    async fn resolve_input(&self, input: Input) -> PtbResult<Input> {
        match input {
            Input::Pure { .. } => Ok(input),
            Input::OwnedObject(obj) => {
                let info = self.fetch(obj.id).await?;
                match info.owner {
                    Owner::Address { .. } | Owner::Immutable => Ok(Input::OwnedObject(
                        OwnedObjectRef {
                            id: obj.id,
                            version: Some(info.version),
                            digest: Some(info.digest),
                        },
                    )),
                    Owner::Shared { .. } => Err(PtbError::ObjectNotShared {
                        id: obj.id,
                        detail: "referenced as owned but the ledger reports it shared".into(),
                    }),
                }
            }
            Input::SharedObject { id, mutable, .. } => {
                let info = self.fetch(id).await?;
                match info.owner {
                    Owner::Shared { initial_shared_version } => Ok(Input::SharedObject {
                        id,
                        initial_shared_version: Some(initial_shared_version),
                        mutable,
                    }),
                    Owner::Address { .. } | Owner::Immutable => Err(PtbError::ObjectNotShared {
                        id,
                        detail: "referenced as shared but the ledger reports it owned".into(),
                    }),
                }
            }
        }
    }

    async fn resolve_owned(&self, id: ObjectId) -> PtbResult<OwnedObjectRef> {
        match self.resolve_input(Input::OwnedObject(OwnedObjectRef::unresolved(id))).await? {
            Input::OwnedObject(obj) => Ok(obj),
            _ => unreachable!("owned input resolves to owned input"),
        }
    }

    async fn fetch(&self, id: ObjectId) -> PtbResult<ObjectInfo> {
        let result = retry_with_backoff("fetch_object", &self.retry, || {
            let rpc = Arc::clone(&self.rpc);
            async move { rpc.fetch_object(id).await }
        })
        .await;

        // Exhausted transient failures become a terminal timeout; caller
        // errors (not-found, ownership mismatch) pass through unchanged.
        result.map_err(|err| {
            if err.is_retryable() {
                PtbError::ResolutionTimeout { attempts: self.retry.max_attempts }
            } else {
                err
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::builder::BlockBuilder;
    use crate::block::commands::Argument;
    use crate::mock_ledger::MockLedger;
    use crate::types::{Address, Version};

    fn id(byte: u8) -> ObjectId {
        ObjectId::new([byte; 32])
    }

    fn ledger() -> Arc<MockLedger> {
        let ledger = MockLedger::new();
        ledger.add_owned_object(id(0xAA), Version(4), Address::new([1; 32]));
        ledger.add_shared_object(id(0xBB), Version(2));
        Arc::new(ledger)
    }

    fn block_with(owned: ObjectId, shared: ObjectId) -> FrozenBlock {
        let mut builder = BlockBuilder::new(Address::new([1; 32]));
        let a = builder.owned_object(owned).unwrap();
        let b = builder.shared_object(shared, true).unwrap();
        builder.transfer_objects(vec![a.into(), b.into()], Argument::Gas).unwrap();
        builder.set_gas_budget(100);
        builder.freeze().unwrap()
    }

    #[tokio::test]
    async fn resolves_owned_and_shared_refs() {
        let rpc = ledger();
        let resolver = Resolver::new(rpc, RetryConfig::immediate(3));
        let block = block_with(id(0xAA), id(0xBB));
        assert!(!block.is_fully_resolved());

        let resolved = resolver.resolve_block(&block).await.unwrap();
        assert!(resolved.is_fully_resolved());

        match resolved.pool.get(0).unwrap() {
            Input::OwnedObject(obj) => assert_eq!(obj.version, Some(Version(4))),
            other => panic!("unexpected input {other:?}"),
        }
        match resolved.pool.get(1).unwrap() {
            Input::SharedObject { initial_shared_version, mutable, .. } => {
                assert_eq!(*initial_shared_version, Some(Version(2)));
                assert!(mutable);
            }
            other => panic!("unexpected input {other:?}"),
        }
        // The original block stays unresolved: resolution is pure.
        assert!(!block.is_fully_resolved());
    }

    #[tokio::test]
    async fn missing_object_fails_without_mutating_the_pool() {
        let rpc = ledger();
        let resolver = Resolver::new(rpc, RetryConfig::immediate(3));
        let block = block_with(id(0xAA), id(0xEE)); // 0xEE does not exist

        let err = resolver.resolve_block(&block).await.unwrap_err();
        assert!(matches!(err, PtbError::ObjectNotFound { id: got } if got == id(0xEE)));
        assert!(!block.is_fully_resolved());
        assert_eq!(block.pool.unresolved_indices().len(), 2);
    }

    #[tokio::test]
    async fn ownership_hint_mismatch_is_a_caller_error() {
        let rpc = ledger();
        let resolver = Resolver::new(Arc::clone(&rpc), RetryConfig::immediate(3));

        // 0xBB is shared on the ledger but referenced as owned here.
        let mut builder = BlockBuilder::new(Address::new([1; 32]));
        let wrong = builder.owned_object(id(0xBB)).unwrap();
        builder.transfer_objects(vec![wrong.into()], Argument::Gas).unwrap();
        builder.set_gas_budget(100);
        let block = builder.freeze().unwrap();

        let err = resolver.resolve_block(&block).await.unwrap_err();
        assert!(matches!(err, PtbError::ObjectNotShared { .. }));
        // Hint mismatches are caller errors and must not burn retries.
        assert_eq!(rpc.fetch_count(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_time_out() {
        let rpc = ledger();
        let resolver = Resolver::new(Arc::clone(&rpc), RetryConfig::immediate(3));
        let block = block_with(id(0xAA), id(0xBB));

        // Two transient failures, then success.
        rpc.fail_next_fetches(2);
        let resolved = resolver.resolve_block(&block).await.unwrap();
        assert!(resolved.is_fully_resolved());

        // More failures than attempts: terminal timeout.
        rpc.fail_next_fetches(100);
        let err = resolver.resolve_block(&block).await.unwrap_err();
        assert!(matches!(err, PtbError::ResolutionTimeout { attempts: 3 }));
    }

    #[tokio::test]
    async fn resolving_a_resolved_pool_is_a_noop() {
        let rpc = ledger();
        let resolver = Resolver::new(rpc, RetryConfig::immediate(3));
        let block = block_with(id(0xAA), id(0xBB));

        let once = resolver.resolve_block(&block).await.unwrap();
        let twice = resolver.resolve_block(&once).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn newer_ledger_state_wins_on_re_resolution() {
        let rpc = ledger();
        let resolver = Resolver::new(Arc::clone(&rpc), RetryConfig::immediate(3));
        let block = block_with(id(0xAA), id(0xBB));

        let once = resolver.resolve_block(&block).await.unwrap();
        rpc.add_owned_object(id(0xAA), Version(9), Address::new([1; 32]));
        let twice = resolver.resolve_block(&once).await.unwrap();

        match twice.pool.get(0).unwrap() {
            Input::OwnedObject(obj) => assert_eq!(obj.version, Some(Version(9))),
            other => panic!("unexpected input {other:?}"),
        }
    }
}
