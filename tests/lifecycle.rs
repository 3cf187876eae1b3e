//! End-to-end lifecycle tests against the in-process mock ledger.

use std::sync::Arc;

use ptb::block::commands::Argument;
use ptb::codec;
use ptb::driver::retry::RetryConfig;
use ptb::mock_ledger::MockLedger;
use ptb::types::{ExecutionStatus, FunctionSig, SignatureTable, Version};
use ptb::{
    Address, BlockBuilder, CallTarget, Command, Ed25519Signer, ExecutionDriver, ObjectId,
    PtbConfig, PtbError, SigningCapability,
};

fn id(byte: u8) -> ObjectId {
    ObjectId::new([byte; 32])
}

fn fast_config() -> PtbConfig {
    let mut config = PtbConfig::default();
    config.retry = RetryConfig::immediate(3);
    config.poll_interval_ms = 0;
    config
}

fn setup() -> (Arc<MockLedger>, Arc<Ed25519Signer>, Address) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let signer = Arc::new(Ed25519Signer::from_seed([7; 32]).unwrap());
    let sender = signer.public_identity();
    let ledger = Arc::new(MockLedger::new());
    (ledger, signer, sender)
}

#[tokio::test]
async fn split_then_call_round_trip() {
    let (ledger, signer, sender) = setup();
    let package = id(0x50);
    ledger.add_package(package);
    ledger.add_owned_object(id(0xAA), Version(5), sender);

    let mut builder = BlockBuilder::new(sender);
    let amount = builder.pure_u64(10).unwrap();
    let object = builder.owned_object(id(0xAA)).unwrap();
    let split = builder.split_coins(Argument::Gas, vec![amount.into()]).unwrap();
    let target = CallTarget::new(package, "escrow", "deposit").unwrap();
    builder
        .call(target, vec![], vec![object.into(), split.nested(0)])
        .unwrap();
    builder.set_gas_budget(5_000_000).set_gas_price(1_000);

    let driver = ExecutionDriver::new(Arc::clone(&ledger), signer, fast_config());
    let result = driver.execute(builder).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.effects.mutated.len(), 1);
    assert_eq!(result.effects.mutated[0].id, id(0xAA));
}

#[tokio::test]
async fn encoded_references_are_pool_and_command_indices() {
    let (ledger, _, sender) = setup();
    ledger.add_owned_object(id(0xAA), Version(5), sender);

    let mut builder = BlockBuilder::new(sender);
    let amount = builder.pure_u64(10).unwrap();
    let object = builder.owned_object(id(0xAA)).unwrap();
    let split = builder.split_coins(Argument::Gas, vec![amount.into()]).unwrap();
    let target = CallTarget::new(id(0x50), "escrow", "deposit").unwrap();
    builder
        .call(target, vec![], vec![object.into(), split.nested(0)])
        .unwrap();
    builder.set_gas_budget(5_000_000);

    let resolver = ptb::Resolver::new(ledger, RetryConfig::immediate(3));
    let resolved = resolver.resolve_block(&builder.freeze().unwrap()).await.unwrap();
    let bytes = codec::encode_block(&resolved, codec::DEFAULT_MAX_TX_BYTES).unwrap();
    let decoded = codec::decode_block(&bytes).unwrap();

    // The pure amount sits at pool index 0, the object reference at index 1.
    // The call must name the object by pool index and the split output by
    // (command 0, result 0), never by dereferenced id.
    match &decoded.commands[1] {
        Command::Call { args, .. } => {
            assert!(matches!(args[0], Argument::Input(h) if h.index() == 1));
            assert!(matches!(args[1], Argument::NestedResult(h, 0) if h.index() == 0));
        }
        other => panic!("expected call, got {}", other.kind()),
    }
}

#[tokio::test]
async fn unknown_package_fails_and_never_aborts() {
    let (ledger, signer, sender) = setup();
    // No package registered: the call target does not exist on the ledger.

    let mut builder = BlockBuilder::new(sender);
    let target = CallTarget::new(id(0x51), "ghost", "call").unwrap();
    builder.call(target, vec![], vec![]).unwrap();
    builder.set_gas_budget(1_000_000);

    let driver = ExecutionDriver::new(ledger, signer, fast_config());
    let result = driver.execute(builder).await.unwrap();

    match result.status {
        ExecutionStatus::Failed { ref reason } => {
            assert!(reason.contains("package not found"));
        }
        ref other => panic!("expected failed, got {other:?}"),
    }
    assert!(matches!(result.ok(), Err(PtbError::Failed { .. })));
}

/// The scavenger-hunt shape: create a key, set its code, withdraw from a
/// shared vault with the key, then transfer the withdrawn coin home.
#[tokio::test]
async fn call_chain_threads_results_through_commands() {
    let (ledger, signer, sender) = setup();
    let package = id(0x50);
    let vault = id(0x46);
    ledger.add_package(package);
    ledger.add_shared_object(vault, Version(1));

    let mut table = SignatureTable::new();
    let key_new = CallTarget::new(package, "key", "new").unwrap();
    let set_code = CallTarget::new(package, "key", "set_code").unwrap();
    let withdraw = CallTarget::new(package, "vault", "withdraw").unwrap();
    table.register(&key_new, FunctionSig { type_arg_count: 0, arg_count: 0 });
    table.register(&set_code, FunctionSig { type_arg_count: 0, arg_count: 2 });
    table.register(&withdraw, FunctionSig { type_arg_count: 0, arg_count: 2 });

    let mut builder = BlockBuilder::new(sender).with_signature_table(table);
    let key = builder.call(key_new, vec![], vec![]).unwrap();
    let code = builder.pure_u64(42).unwrap();
    builder.call(set_code, vec![], vec![key.into(), code.into()]).unwrap();
    let vault_ref = builder.shared_object(vault, true).unwrap();
    let coin = builder
        .call(withdraw, vec![], vec![vault_ref.into(), key.into()])
        .unwrap();
    let home = builder.pure_address(sender).unwrap();
    builder.transfer_objects(vec![coin.into()], home).unwrap();
    builder.set_gas_budget(10_000_000);

    let driver = ExecutionDriver::new(Arc::clone(&ledger), signer, fast_config());
    let result = driver.execute(builder).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    // The shared vault is the block's only object input.
    assert_eq!(result.effects.mutated.len(), 1);
    assert_eq!(result.effects.mutated[0].id, vault);
}

#[tokio::test]
async fn distinct_blocks_execute_concurrently() {
    let (ledger, signer, sender) = setup();
    ledger.add_owned_object(id(0xA1), Version(1), sender);
    ledger.add_owned_object(id(0xA2), Version(1), sender);

    let driver = Arc::new(ExecutionDriver::new(
        Arc::clone(&ledger),
        Arc::clone(&signer),
        fast_config(),
    ));

    let make_block = |object: ObjectId| {
        let mut builder = BlockBuilder::new(sender);
        let obj = builder.owned_object(object).unwrap();
        let home = builder.pure_address(sender).unwrap();
        builder.transfer_objects(vec![obj.into()], home).unwrap();
        builder.set_gas_budget(1_000_000);
        builder
    };

    let d1 = Arc::clone(&driver);
    let d2 = Arc::clone(&driver);
    let (r1, r2) = tokio::join!(
        d1.execute(make_block(id(0xA1))),
        d2.execute(make_block(id(0xA2))),
    );
    let (r1, r2) = (r1.unwrap(), r2.unwrap());
    assert_eq!(r1.status, ExecutionStatus::Success);
    assert_eq!(r2.status, ExecutionStatus::Success);
    // Two independent submissions, two distinct digests.
    assert_ne!(r1.digest, r2.digest);
    assert_eq!(ledger.submit_count(), 2);
}

#[tokio::test]
async fn gas_payment_is_resolved_and_reported_mutated() {
    let (ledger, signer, sender) = setup();
    let gas_coin = id(0xC0);
    ledger.add_owned_object(gas_coin, Version(3), sender);

    let mut builder = BlockBuilder::new(sender);
    let amount = builder.pure_u64(10).unwrap();
    builder.split_coins(Argument::Gas, vec![amount.into()]).unwrap();
    builder.add_gas_payment(gas_coin);
    builder.set_gas_budget(1_000_000);

    let driver = ExecutionDriver::new(ledger, signer, fast_config());
    let result = driver.execute(builder).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.effects.mutated.len(), 1);
    assert_eq!(result.effects.mutated[0].id, gas_coin);
    assert_eq!(result.effects.mutated[0].version, Version(4));
}
