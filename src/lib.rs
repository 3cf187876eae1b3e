//! Programmable transaction block (PTB) builder and resolver.
//!
//! A PTB is an ordered batch of commands submitted atomically to a ledger.
//! This crate covers the client-side lifecycle: build a block from pure
//! values, object references, and earlier command outputs; resolve object
//! metadata against ledger state; serialize to a canonical byte form; then
//! sign, submit, and poll to finality. Key management and the concrete
//! ledger endpoint are external collaborators behind [`SigningCapability`]
//! and [`LedgerRpc`].

pub mod block;
pub mod codec;
pub mod config;
pub mod driver;
pub mod resolver;
pub mod rpc;
pub mod signer;
pub mod types;

#[cfg(any(test, feature = "mock-mode"))]
pub mod mock_ledger;

pub use block::{
    Argument, BlockBuilder, Command, CommandHandle, FrozenBlock, InputHandle, PtbError,
    PtbResult,
};
pub use config::PtbConfig;
pub use driver::{ExecutionDriver, Phase};
pub use resolver::Resolver;
pub use rpc::{JsonRpcClient, LedgerRpc, ObjectInfo, Owner};
pub use signer::{Ed25519Signer, SigningCapability};
pub use types::{
    Address, BlockDigest, CallTarget, ExecutionResult, ExecutionStatus, ObjectId, Signature,
    TypeTag,
};
