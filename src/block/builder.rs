//! Append-only block builder and the frozen form it produces.
//!
//! A block is built by one logical caller: append inputs and commands, set
//! gas metadata, then `freeze()` into an immutable [`FrozenBlock`] that the
//! resolver, codec, and driver consume. Every append validates before it
//! mutates, so a failed append leaves the block exactly as it was.
//! Abandoning a builder before submission is just dropping it.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::commands::{Argument, Command, CommandHandle, InputHandle};
use crate::block::errors::{PtbError, PtbResult};
use crate::block::inputs::{InputPool, ObjectKind, OwnedObjectRef};
use crate::types::{Address, CallTarget, ObjectId, SignatureTable, TypeTag};

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Gas metadata carried in the block header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GasData {
    /// Objects paying for gas; resolved like any other owned reference.
    pub payment: Vec<OwnedObjectRef>,
    pub budget: u64,
    pub price: u64,
}

/// Builder for a programmable transaction block.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    id: u64,
    sender: Address,
    pool: InputPool,
    commands: Vec<Command>,
    gas: GasData,
    expiration: Option<u64>,
    signatures: SignatureTable,
}

impl BlockBuilder {
    pub fn new(sender: Address) -> Self {
        Self {
            id: NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed),
            sender,
            pool: InputPool::new(),
            commands: Vec::new(),
            gas: GasData::default(),
            expiration: None,
            signatures: SignatureTable::new(),
        }
    }

    /// Attach a signature table; subsequent `Call` appends whose target the
    /// table knows are arity-checked.
    pub fn with_signature_table(mut self, table: SignatureTable) -> Self {
        self.signatures = table;
        self
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    fn input_handle(&self, index: u16) -> InputHandle {
        InputHandle { block_id: self.id, index }
    }

    // ---- input pool ----

    pub fn pure_bool(&mut self, value: bool) -> PtbResult<InputHandle> {
        self.pool.add_pure_bool(value).map(|i| self.input_handle(i))
    }

    pub fn pure_u8(&mut self, value: u8) -> PtbResult<InputHandle> {
        self.pool.add_pure_u8(value).map(|i| self.input_handle(i))
    }

    pub fn pure_u16(&mut self, value: u16) -> PtbResult<InputHandle> {
        self.pool.add_pure_u16(value).map(|i| self.input_handle(i))
    }

    pub fn pure_u32(&mut self, value: u32) -> PtbResult<InputHandle> {
        self.pool.add_pure_u32(value).map(|i| self.input_handle(i))
    }

    pub fn pure_u64(&mut self, value: u64) -> PtbResult<InputHandle> {
        self.pool.add_pure_u64(value).map(|i| self.input_handle(i))
    }

    pub fn pure_u128(&mut self, value: u128) -> PtbResult<InputHandle> {
        self.pool.add_pure_u128(value).map(|i| self.input_handle(i))
    }

    pub fn pure_address(&mut self, value: Address) -> PtbResult<InputHandle> {
        self.pool.add_pure_address(value).map(|i| self.input_handle(i))
    }

    pub fn pure_bytes(&mut self, value: Vec<u8>) -> PtbResult<InputHandle> {
        self.pool.add_pure_bytes(value).map(|i| self.input_handle(i))
    }

    pub fn pure_raw(&mut self, type_tag: TypeTag, bytes: Vec<u8>) -> PtbResult<InputHandle> {
        self.pool.add_pure_raw(type_tag, bytes).map(|i| self.input_handle(i))
    }

    /// Reference an owned object by id; version and digest are filled in by
    /// the resolver.
    pub fn owned_object(&mut self, id: ObjectId) -> PtbResult<InputHandle> {
        self.pool.add_object(id, ObjectKind::Owned).map(|i| self.input_handle(i))
    }

    /// Reference a shared object by id.
    pub fn shared_object(&mut self, id: ObjectId, mutable: bool) -> PtbResult<InputHandle> {
        self.pool
            .add_object(id, ObjectKind::Shared { mutable })
            .map(|i| self.input_handle(i))
    }

    // ---- gas metadata ----

    /// Add an object paying for gas. Idempotent per id.
    pub fn add_gas_payment(&mut self, id: ObjectId) -> &mut Self {
        if !self.gas.payment.iter().any(|p| p.id == id) {
            self.gas.payment.push(OwnedObjectRef::unresolved(id));
        }
        self
    }

    pub fn set_gas_budget(&mut self, budget: u64) -> &mut Self {
        self.gas.budget = budget;
        self
    }

    pub fn set_gas_price(&mut self, price: u64) -> &mut Self {
        self.gas.price = price;
        self
    }

    pub fn set_expiration_epoch(&mut self, epoch: u64) -> &mut Self {
        self.expiration = Some(epoch);
        self
    }

    // ---- command graph ----

    fn validate_argument(&self, arg: &Argument, position: usize) -> PtbResult<()> {
        match arg {
            Argument::Gas => Ok(()),
            Argument::Input(handle) => {
                if handle.block_id != self.id {
                    return Err(PtbError::dependency(format!(
                        "argument {position} holds an input handle from another block"
                    )));
                }
                if handle.index as usize >= self.pool.len() {
                    return Err(PtbError::dependency(format!(
                        "argument {position} references input {} past the pool end",
                        handle.index
                    )));
                }
                Ok(())
            }
            Argument::Result(handle) | Argument::NestedResult(handle, _) => {
                if handle.block_id != self.id {
                    return Err(PtbError::dependency(format!(
                        "argument {position} holds a command handle from another block"
                    )));
                }
                // The command being appended will sit at self.commands.len(),
                // so any handle pointing there or beyond is a forward reference.
                if handle.index as usize >= self.commands.len() {
                    return Err(PtbError::dependency(format!(
                        "argument {position} references command {} which is not appended yet",
                        handle.index
                    )));
                }
                Ok(())
            }
        }
    }

    fn validate_call(&self, target: &CallTarget, type_args: &[TypeTag], args: &[Argument]) -> PtbResult<()> {
        if let Some(sig) = self.signatures.lookup(target) {
            if sig.type_arg_count != type_args.len() || sig.arg_count != args.len() {
                return Err(PtbError::invalid_input(format!(
                    "{target} expects {} type args and {} args, got {} and {}",
                    sig.type_arg_count,
                    sig.arg_count,
                    type_args.len(),
                    args.len()
                )));
            }
        }
        Ok(())
    }

    /// Append a command. All argument handles are validated first; a failure
    /// leaves the block unmodified. Returns a handle usable as a result
    /// reference by later commands.
    pub fn append(&mut self, command: Command) -> PtbResult<CommandHandle> {
        if self.commands.len() >= u16::MAX as usize {
            return Err(PtbError::dependency("command list is full"));
        }
        for (position, arg) in command.arguments().iter().enumerate() {
            self.validate_argument(arg, position)?;
        }
        if let Command::Call { target, type_args, args } = &command {
            self.validate_call(target, type_args, args)?;
        }
        let index = self.commands.len() as u16;
        self.commands.push(command);
        Ok(CommandHandle { block_id: self.id, index })
    }

    pub fn call(
        &mut self,
        target: CallTarget,
        type_args: Vec<TypeTag>,
        args: Vec<Argument>,
    ) -> PtbResult<CommandHandle> {
        self.append(Command::Call { target, type_args, args })
    }

    pub fn split_coins(
        &mut self,
        coin: impl Into<Argument>,
        amounts: Vec<Argument>,
    ) -> PtbResult<CommandHandle> {
        self.append(Command::SplitCoins { coin: coin.into(), amounts })
    }

    pub fn merge_coins(
        &mut self,
        destination: impl Into<Argument>,
        sources: Vec<Argument>,
    ) -> PtbResult<CommandHandle> {
        self.append(Command::MergeCoins { destination: destination.into(), sources })
    }

    pub fn transfer_objects(
        &mut self,
        objects: Vec<Argument>,
        recipient: impl Into<Argument>,
    ) -> PtbResult<CommandHandle> {
        self.append(Command::TransferObjects { objects, recipient: recipient.into() })
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn input_count(&self) -> usize {
        self.pool.len()
    }

    /// Freeze the block for resolution and serialization. The frozen form
    /// is immutable; a block is serialized exactly once per freeze.
    pub fn freeze(self) -> PtbResult<FrozenBlock> {
        if self.commands.is_empty() {
            return Err(PtbError::invalid_input("block has no commands"));
        }
        if self.gas.budget == 0 {
            return Err(PtbError::invalid_input("gas budget must be set"));
        }
        Ok(FrozenBlock {
            sender: self.sender,
            pool: self.pool,
            commands: self.commands,
            gas: self.gas,
            expiration: self.expiration,
        })
    }
}

/// An immutable, fully constructed block awaiting resolution, serialization,
/// and submission.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenBlock {
    pub sender: Address,
    pub pool: InputPool,
    pub commands: Vec<Command>,
    pub gas: GasData,
    pub expiration: Option<u64>,
}

impl FrozenBlock {
    /// True when every input and every gas payment carries its ledger
    /// metadata, i.e. the block is ready to serialize.
    pub fn is_fully_resolved(&self) -> bool {
        self.pool.iter().all(|input| input.is_resolved())
            && self.gas.payment.iter().all(|p| p.is_resolved())
    }
}
