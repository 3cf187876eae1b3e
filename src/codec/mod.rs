//! Canonical wire format for frozen blocks.
//!
//! The signature and the block digest are computed over these bytes, so the
//! encoding must be deterministic: section order is fixed (metadata header,
//! input pool in insertion order, commands in append order), every integer
//! is little-endian fixed width, and every cross-reference is a zero-based
//! index into the preceding sections, never a dereferenced identifier.
//!
//! Layout (version `PTB1`):
//!
//! ```text
//! magic "PTB1"
//! sender 32 | gas payment count u16, each (id 32, version u64, digest 32)
//! gas_budget u64 | gas_price u64 | expiration u64 (u64::MAX = none)
//! inputs   count u16, each tag u8 (0 pure | 1 owned | 2 shared)
//! commands count u16, each tag u8 (0 call | 1 split | 2 merge | 3 transfer)
//! argument tag u8 (0 gas | 1 input u16 | 2 result u16 | 3 nested u16 u16)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::block::builder::{FrozenBlock, GasData};
use crate::block::commands::{Argument, Command, CommandHandle, InputHandle};
use crate::block::errors::{PtbError, PtbResult};
use crate::block::inputs::{Input, InputPool, OwnedObjectRef};
use crate::types::{
    Address, BlockDigest, CallTarget, ObjectDigest, ObjectId, TypeTag, Version, ID_LENGTH,
};

/// Format magic, bumped when the layout changes.
pub const MAGIC: [u8; 4] = *b"PTB1";

/// Default ledger maximum for a serialized block.
pub const DEFAULT_MAX_TX_BYTES: usize = 128 * 1024;

const INPUT_PURE: u8 = 0;
const INPUT_OWNED: u8 = 1;
const INPUT_SHARED: u8 = 2;

const CMD_CALL: u8 = 0;
const CMD_SPLIT: u8 = 1;
const CMD_MERGE: u8 = 2;
const CMD_TRANSFER: u8 = 3;

const ARG_GAS: u8 = 0;
const ARG_INPUT: u8 = 1;
const ARG_RESULT: u8 = 2;
const ARG_NESTED: u8 = 3;

const EXPIRATION_NONE: u64 = u64::MAX;

/// Encode a fully resolved frozen block into its canonical byte form.
///
/// Fails with `UnresolvedReference` if any input or gas payment is missing
/// ledger metadata, and with `SerializationOverflow` if the encoding exceeds
/// `max_size`. Both are caller errors, never retried.
pub fn encode_block(block: &FrozenBlock, max_size: usize) -> PtbResult<Bytes> {
    // Reject unresolved references up front so the error names the slot.
    for (i, input) in block.pool.iter().enumerate() {
        if !input.is_resolved() {
            return Err(PtbError::UnresolvedReference { index: i as u16 });
        }
    }
    for (i, payment) in block.gas.payment.iter().enumerate() {
        if !payment.is_resolved() {
            return Err(PtbError::UnresolvedReference { index: i as u16 });
        }
    }

    let mut buf = BytesMut::with_capacity(1024);
    buf.put_slice(&MAGIC);

    // Metadata header
    buf.put_slice(block.sender.as_bytes());
    encode_count_u16(&mut buf, block.gas.payment.len(), "gas payments")?;
    for payment in &block.gas.payment {
        buf.put_slice(payment.id.as_bytes());
        buf.put_u64_le(payment.version.expect("checked above").value());
        buf.put_slice(payment.digest.expect("checked above").as_bytes());
    }
    buf.put_u64_le(block.gas.budget);
    buf.put_u64_le(block.gas.price);
    buf.put_u64_le(block.expiration.unwrap_or(EXPIRATION_NONE));

    // Input pool, insertion order
    buf.put_u16_le(block.pool.len() as u16);
    for input in block.pool.iter() {
        encode_input(&mut buf, input)?;
    }

    // Command list, append order
    buf.put_u16_le(block.commands.len() as u16);
    for command in &block.commands {
        encode_command(&mut buf, command)?;
    }

    if buf.len() > max_size {
        return Err(PtbError::SerializationOverflow { size: buf.len(), max: max_size });
    }
    Ok(buf.freeze())
}

/// Content digest of the canonical bytes.
pub fn block_digest(bytes: &[u8]) -> BlockDigest {
    let hash = Sha256::digest(bytes);
    let mut out = [0u8; ID_LENGTH];
    out.copy_from_slice(&hash);
    BlockDigest(out)
}

fn encode_type_tag(buf: &mut BytesMut, tag: &TypeTag) {
    match tag {
        TypeTag::Bool => buf.put_u8(0),
        TypeTag::U8 => buf.put_u8(1),
        TypeTag::U16 => buf.put_u8(2),
        TypeTag::U32 => buf.put_u8(3),
        TypeTag::U64 => buf.put_u8(4),
        TypeTag::U128 => buf.put_u8(5),
        TypeTag::Address => buf.put_u8(6),
        TypeTag::Vector(inner) => {
            buf.put_u8(7);
            encode_type_tag(buf, inner);
        }
    }
}

fn encode_input(buf: &mut BytesMut, input: &Input) -> PtbResult<()> {
    match input {
        Input::Pure { type_tag, bytes } => {
            buf.put_u8(INPUT_PURE);
            encode_type_tag(buf, type_tag);
            buf.put_u32_le(bytes.len() as u32);
            buf.put_slice(bytes);
        }
        Input::OwnedObject(obj) => {
            buf.put_u8(INPUT_OWNED);
            buf.put_slice(obj.id.as_bytes());
            buf.put_u64_le(obj.version.expect("resolved").value());
            buf.put_slice(obj.digest.expect("resolved").as_bytes());
        }
        Input::SharedObject { id, initial_shared_version, mutable } => {
            buf.put_u8(INPUT_SHARED);
            buf.put_slice(id.as_bytes());
            buf.put_u64_le(initial_shared_version.expect("resolved").value());
            buf.put_u8(*mutable as u8);
        }
    }
    Ok(())
}

fn encode_argument(buf: &mut BytesMut, arg: &Argument) {
    match arg {
        Argument::Gas => buf.put_u8(ARG_GAS),
        Argument::Input(handle) => {
            buf.put_u8(ARG_INPUT);
            buf.put_u16_le(handle.index());
        }
        Argument::Result(handle) => {
            buf.put_u8(ARG_RESULT);
            buf.put_u16_le(handle.index());
        }
        Argument::NestedResult(handle, result) => {
            buf.put_u8(ARG_NESTED);
            buf.put_u16_le(handle.index());
            buf.put_u16_le(*result);
        }
    }
}

fn encode_identifier(buf: &mut BytesMut, ident: &str) -> PtbResult<()> {
    if ident.len() > u8::MAX as usize {
        return Err(PtbError::invalid_input(format!("identifier too long: {ident}")));
    }
    buf.put_u8(ident.len() as u8);
    buf.put_slice(ident.as_bytes());
    Ok(())
}

fn encode_count_u16(buf: &mut BytesMut, count: usize, what: &str) -> PtbResult<()> {
    let count = u16::try_from(count)
        .map_err(|_| PtbError::invalid_input(format!("too many {what}: {count}")))?;
    buf.put_u16_le(count);
    Ok(())
}

fn encode_command(buf: &mut BytesMut, command: &Command) -> PtbResult<()> {
    match command {
        Command::Call { target, type_args, args } => {
            buf.put_u8(CMD_CALL);
            buf.put_slice(target.package.as_bytes());
            encode_identifier(buf, &target.module)?;
            encode_identifier(buf, &target.function)?;
            if type_args.len() > u8::MAX as usize {
                return Err(PtbError::invalid_input(format!(
                    "too many type args: {}",
                    type_args.len()
                )));
            }
            buf.put_u8(type_args.len() as u8);
            for tag in type_args {
                encode_type_tag(buf, tag);
            }
            encode_count_u16(buf, args.len(), "call args")?;
            for arg in args {
                encode_argument(buf, arg);
            }
        }
        Command::SplitCoins { coin, amounts } => {
            buf.put_u8(CMD_SPLIT);
            encode_argument(buf, coin);
            encode_count_u16(buf, amounts.len(), "split amounts")?;
            for arg in amounts {
                encode_argument(buf, arg);
            }
        }
        Command::MergeCoins { destination, sources } => {
            buf.put_u8(CMD_MERGE);
            encode_argument(buf, destination);
            encode_count_u16(buf, sources.len(), "merge sources")?;
            for arg in sources {
                encode_argument(buf, arg);
            }
        }
        Command::TransferObjects { objects, recipient } => {
            buf.put_u8(CMD_TRANSFER);
            encode_count_u16(buf, objects.len(), "transfer objects")?;
            for arg in objects {
                encode_argument(buf, arg);
            }
            encode_argument(buf, recipient);
        }
    }
    Ok(())
}

// ---- decoding ----
//
// The decoder exists for inspection and for the in-process mock ledger; a
// decoded block carries handles minted under block id 0 and is not meant to
// be appended to further.

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> PtbResult<()> {
        if self.buf.remaining() < n {
            return Err(PtbError::invalid_input("truncated block encoding"));
        }
        Ok(())
    }

    fn u8(&mut self) -> PtbResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> PtbResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> PtbResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self) -> PtbResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn bytes(&mut self, n: usize) -> PtbResult<Vec<u8>> {
        self.need(n)?;
        let mut out = vec![0u8; n];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    fn array_32(&mut self) -> PtbResult<[u8; ID_LENGTH]> {
        self.need(ID_LENGTH)?;
        let mut out = [0u8; ID_LENGTH];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    fn identifier(&mut self) -> PtbResult<String> {
        let len = self.u8()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw)
            .map_err(|_| PtbError::invalid_input("identifier is not valid utf-8"))
    }

    fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }
}

fn decode_type_tag(r: &mut Reader<'_>) -> PtbResult<TypeTag> {
    Ok(match r.u8()? {
        0 => TypeTag::Bool,
        1 => TypeTag::U8,
        2 => TypeTag::U16,
        3 => TypeTag::U32,
        4 => TypeTag::U64,
        5 => TypeTag::U128,
        6 => TypeTag::Address,
        7 => TypeTag::Vector(Box::new(decode_type_tag(r)?)),
        tag => return Err(PtbError::invalid_input(format!("unknown type tag byte {tag}"))),
    })
}

fn decode_argument(r: &mut Reader<'_>) -> PtbResult<Argument> {
    Ok(match r.u8()? {
        ARG_GAS => Argument::Gas,
        ARG_INPUT => Argument::Input(InputHandle { block_id: 0, index: r.u16()? }),
        ARG_RESULT => Argument::Result(CommandHandle { block_id: 0, index: r.u16()? }),
        ARG_NESTED => {
            let handle = CommandHandle { block_id: 0, index: r.u16()? };
            Argument::NestedResult(handle, r.u16()?)
        }
        tag => return Err(PtbError::invalid_input(format!("unknown argument tag {tag}"))),
    })
}

fn decode_arguments(r: &mut Reader<'_>, count: usize) -> PtbResult<Vec<Argument>> {
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        args.push(decode_argument(r)?);
    }
    Ok(args)
}

fn decode_input(r: &mut Reader<'_>) -> PtbResult<Input> {
    Ok(match r.u8()? {
        INPUT_PURE => {
            let type_tag = decode_type_tag(r)?;
            let len = r.u32()? as usize;
            Input::Pure { type_tag, bytes: r.bytes(len)? }
        }
        INPUT_OWNED => Input::OwnedObject(OwnedObjectRef {
            id: ObjectId::new(r.array_32()?),
            version: Some(Version(r.u64()?)),
            digest: Some(ObjectDigest(r.array_32()?)),
        }),
        INPUT_SHARED => Input::SharedObject {
            id: ObjectId::new(r.array_32()?),
            initial_shared_version: Some(Version(r.u64()?)),
            mutable: r.u8()? != 0,
        },
        tag => return Err(PtbError::invalid_input(format!("unknown input tag {tag}"))),
    })
}

fn decode_command(r: &mut Reader<'_>) -> PtbResult<Command> {
    Ok(match r.u8()? {
        CMD_CALL => {
            let package = ObjectId::new(r.array_32()?);
            let module = r.identifier()?;
            let function = r.identifier()?;
            let target = CallTarget::new(package, &module, &function)?;
            let type_arg_count = r.u8()? as usize;
            let mut type_args = Vec::with_capacity(type_arg_count);
            for _ in 0..type_arg_count {
                type_args.push(decode_type_tag(r)?);
            }
            let arg_count = r.u16()? as usize;
            Command::Call { target, type_args, args: decode_arguments(r, arg_count)? }
        }
        CMD_SPLIT => {
            let coin = decode_argument(r)?;
            let count = r.u16()? as usize;
            Command::SplitCoins { coin, amounts: decode_arguments(r, count)? }
        }
        CMD_MERGE => {
            let destination = decode_argument(r)?;
            let count = r.u16()? as usize;
            Command::MergeCoins { destination, sources: decode_arguments(r, count)? }
        }
        CMD_TRANSFER => {
            let count = r.u16()? as usize;
            let objects = decode_arguments(r, count)?;
            Command::TransferObjects { objects, recipient: decode_argument(r)? }
        }
        tag => return Err(PtbError::invalid_input(format!("unknown command tag {tag}"))),
    })
}

/// Decode canonical bytes back into a frozen block.
pub fn decode_block(bytes: &[u8]) -> PtbResult<FrozenBlock> {
    let mut r = Reader::new(bytes);

    let magic = r.bytes(4)?;
    if magic != MAGIC {
        return Err(PtbError::invalid_input("bad block magic"));
    }

    let sender = Address::new(r.array_32()?);
    let payment_count = r.u16()? as usize;
    let mut payment = Vec::with_capacity(payment_count);
    for _ in 0..payment_count {
        payment.push(OwnedObjectRef {
            id: ObjectId::new(r.array_32()?),
            version: Some(Version(r.u64()?)),
            digest: Some(ObjectDigest(r.array_32()?)),
        });
    }
    let budget = r.u64()?;
    let price = r.u64()?;
    let expiration = match r.u64()? {
        EXPIRATION_NONE => None,
        epoch => Some(epoch),
    };

    let input_count = r.u16()? as usize;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        inputs.push(decode_input(&mut r)?);
    }

    let command_count = r.u16()? as usize;
    let mut commands = Vec::with_capacity(command_count);
    for _ in 0..command_count {
        commands.push(decode_command(&mut r)?);
    }

    if !r.is_empty() {
        return Err(PtbError::invalid_input("trailing bytes after block encoding"));
    }

    Ok(FrozenBlock {
        sender,
        pool: InputPool::from_inputs(inputs),
        commands,
        gas: GasData { payment, budget, price },
        expiration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::builder::BlockBuilder;
    use crate::block::commands::Argument;
    use crate::block::inputs::{Input, OwnedObjectRef};

    fn resolved_block() -> FrozenBlock {
        let sender = Address::new([1; 32]);
        let mut builder = BlockBuilder::new(sender);
        let amount = builder.pure_u64(10).unwrap();
        let obj = builder.owned_object(ObjectId::new([0xAA; 32])).unwrap();
        let split = builder.split_coins(Argument::Gas, vec![amount.into()]).unwrap();
        let target = CallTarget::parse("0x2::vault::withdraw").unwrap();
        builder
            .call(target, vec![TypeTag::U64], vec![obj.into(), split.nested(0)])
            .unwrap();
        builder.set_gas_budget(5_000_000).set_gas_price(1_000);
        let mut frozen = builder.freeze().unwrap();

        // Resolve the owned reference by hand; index 1 is the object slot.
        frozen.pool.set(
            1,
            Input::OwnedObject(OwnedObjectRef {
                id: ObjectId::new([0xAA; 32]),
                version: Some(Version(7)),
                digest: Some(ObjectDigest([9; 32])),
            }),
        );
        frozen
    }

    #[test]
    fn encoding_is_deterministic() {
        let block = resolved_block();
        let a = encode_block(&block, DEFAULT_MAX_TX_BYTES).unwrap();
        let b = encode_block(&block, DEFAULT_MAX_TX_BYTES).unwrap();
        assert_eq!(a, b);
        assert_eq!(block_digest(&a), block_digest(&b));
    }

    #[test]
    fn references_encode_as_indices() {
        let block = resolved_block();
        let bytes = encode_block(&block, DEFAULT_MAX_TX_BYTES).unwrap();
        let decoded = decode_block(&bytes).unwrap();

        // The call must reference the object by pool index 1 and the split
        // result by (command 0, result 0).
        match &decoded.commands[1] {
            Command::Call { args, .. } => {
                assert!(
                    matches!(args[0], Argument::Input(handle) if handle.index() == 1)
                );
                assert!(matches!(
                    args[1],
                    Argument::NestedResult(handle, 0) if handle.index() == 0
                ));
            }
            other => panic!("expected call, got {}", other.kind()),
        }
    }

    #[test]
    fn reencoding_a_decoded_block_is_identity() {
        let block = resolved_block();
        let bytes = encode_block(&block, DEFAULT_MAX_TX_BYTES).unwrap();
        let decoded = decode_block(&bytes).unwrap();
        let again = encode_block(&decoded, DEFAULT_MAX_TX_BYTES).unwrap();
        assert_eq!(bytes, again);
    }

    #[test]
    fn unresolved_input_is_fatal() {
        let sender = Address::new([1; 32]);
        let mut builder = BlockBuilder::new(sender);
        let obj = builder.owned_object(ObjectId::new([0xBB; 32])).unwrap();
        builder.transfer_objects(vec![obj.into()], Argument::Gas).unwrap();
        builder.set_gas_budget(100);
        let frozen = builder.freeze().unwrap();

        let err = encode_block(&frozen, DEFAULT_MAX_TX_BYTES).unwrap_err();
        assert!(matches!(err, PtbError::UnresolvedReference { index: 0 }));
    }

    #[test]
    fn argument_counts_must_fit_their_wire_width() {
        let sender = Address::new([1; 32]);
        let target = CallTarget::parse("0x2::vault::withdraw").unwrap();

        // 256 type args wrap a u8 count; the encoder must refuse rather
        // than emit bytes that misrepresent the block.
        let mut builder = BlockBuilder::new(sender);
        builder.call(target.clone(), vec![TypeTag::U8; 256], vec![]).unwrap();
        builder.set_gas_budget(100);
        let err = encode_block(&builder.freeze().unwrap(), DEFAULT_MAX_TX_BYTES).unwrap_err();
        assert!(matches!(err, PtbError::InvalidInput(_)));

        // 65 536 one-byte args still fit under the size cap but wrap a
        // u16 count.
        let mut builder = BlockBuilder::new(sender);
        builder.call(target, vec![], vec![Argument::Gas; 65_536]).unwrap();
        builder.set_gas_budget(100);
        let err = encode_block(&builder.freeze().unwrap(), DEFAULT_MAX_TX_BYTES).unwrap_err();
        assert!(matches!(err, PtbError::InvalidInput(_)));
    }

    #[test]
    fn oversized_block_is_rejected() {
        let block = resolved_block();
        let err = encode_block(&block, 16).unwrap_err();
        assert!(matches!(err, PtbError::SerializationOverflow { .. }));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_block(b"nope").is_err());
        assert!(decode_block(&[]).is_err());

        let block = resolved_block();
        let bytes = encode_block(&block, DEFAULT_MAX_TX_BYTES).unwrap();
        // Truncation anywhere must error, never panic.
        assert!(decode_block(&bytes[..bytes.len() - 3]).is_err());

        let mut trailing = bytes.to_vec();
        trailing.push(0);
        assert!(decode_block(&trailing).is_err());
    }

    #[test]
    fn expiration_roundtrip() {
        let mut block = resolved_block();
        block.expiration = Some(42);
        let bytes = encode_block(&block, DEFAULT_MAX_TX_BYTES).unwrap();
        assert_eq!(decode_block(&bytes).unwrap().expiration, Some(42));

        block.expiration = None;
        let bytes = encode_block(&block, DEFAULT_MAX_TX_BYTES).unwrap();
        assert_eq!(decode_block(&bytes).unwrap().expiration, None);
    }
}
