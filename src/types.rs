//! Core ledger types shared across the builder, resolver, and driver.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::block::errors::{PtbError, PtbResult};

/// Byte length of object ids, addresses, and digests.
pub const ID_LENGTH: usize = 32;

/// Parse a `0x`-prefixed hex string into a left-padded 32-byte array.
fn parse_hex_32(s: &str, what: &str) -> PtbResult<[u8; ID_LENGTH]> {
    let stripped = s
        .strip_prefix("0x")
        .ok_or_else(|| PtbError::invalid_input(format!("{what} must start with 0x: {s}")))?;
    if stripped.is_empty() || stripped.len() > ID_LENGTH * 2 {
        return Err(PtbError::invalid_input(format!(
            "{what} must be 1..={} hex chars, got {}",
            ID_LENGTH * 2,
            stripped.len()
        )));
    }
    // Left-pad short hex so 0x2 and 0x0...02 name the same id.
    let mut padded = String::with_capacity(ID_LENGTH * 2);
    for _ in 0..(ID_LENGTH * 2 - stripped.len()) {
        padded.push('0');
    }
    padded.push_str(stripped);
    let bytes = hex::decode(&padded)
        .map_err(|e| PtbError::invalid_input(format!("{what} is not valid hex: {e}")))?;
    let mut out = [0u8; ID_LENGTH];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Identifier of an on-chain object (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub [u8; ID_LENGTH]);

impl ObjectId {
    pub const fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// Parse from a `0x`-prefixed hex string, left-padding short ids.
    pub fn parse(s: &str) -> PtbResult<Self> {
        parse_hex_32(s, "object id").map(Self)
    }
}

impl FromStr for ObjectId {
    type Err = PtbError;

    fn from_str(s: &str) -> PtbResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

/// A ledger account address (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ID_LENGTH]);

impl Address {
    pub const fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    pub fn parse(s: &str) -> PtbResult<Self> {
        parse_hex_32(s, "address").map(Self)
    }
}

impl FromStr for Address {
    type Err = PtbError;

    fn from_str(s: &str) -> PtbResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Object sequence number assigned by the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

/// Content digest of an object's current state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectDigest(pub [u8; ID_LENGTH]);

impl ObjectDigest {
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectDigest({self})")
    }
}

/// Content digest of a serialized block: the identifier the ledger assigns
/// at submission time, computable locally by hashing the canonical bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockDigest(pub [u8; ID_LENGTH]);

impl BlockDigest {
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockDigest({self})")
    }
}

/// Detached ed25519 signature over a serialized block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

/// Fully resolved reference to an object: id + version + digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub version: Version,
    pub digest: ObjectDigest,
}

/// Terminal outcome of an executed block, as reported by the ledger.
///
/// `Aborted` means the ledger ran the block but a command signaled a domain
/// abort; effects are queryable but no mutation took hold. `Failed` means
/// the block could not be executed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Aborted { reason: String },
    Failed { reason: String },
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

/// Object-level effects of an executed block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEffects {
    #[serde(default)]
    pub created: Vec<ObjectRef>,
    #[serde(default)]
    pub mutated: Vec<ObjectRef>,
    #[serde(default)]
    pub deleted: Vec<ObjectRef>,
}

/// Finalized result of a submitted block. Owned by the execution driver,
/// read-only to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub digest: BlockDigest,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub effects: BlockEffects,
}

impl ExecutionResult {
    /// Map abort/failure outcomes into the error taxonomy, for callers who
    /// want a `Result` instead of inspecting the status.
    pub fn ok(&self) -> PtbResult<()> {
        match &self.status {
            ExecutionStatus::Success => Ok(()),
            ExecutionStatus::Aborted { reason } => {
                Err(PtbError::Aborted { reason: reason.clone() })
            }
            ExecutionStatus::Failed { reason } => {
                Err(PtbError::Failed { reason: reason.clone() })
            }
        }
    }
}

/// Type tag for pure input values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    Address,
    Vector(Box<TypeTag>),
}

impl TypeTag {
    /// Encoded byte length for fixed-width tags; `None` for vectors.
    pub fn encoded_len(&self) -> Option<usize> {
        match self {
            TypeTag::Bool | TypeTag::U8 => Some(1),
            TypeTag::U16 => Some(2),
            TypeTag::U32 => Some(4),
            TypeTag::U64 => Some(8),
            TypeTag::U128 => Some(16),
            TypeTag::Address => Some(ID_LENGTH),
            TypeTag::Vector(_) => None,
        }
    }

    pub fn parse(s: &str) -> PtbResult<Self> {
        let s = s.trim();
        Ok(match s {
            "bool" => TypeTag::Bool,
            "u8" => TypeTag::U8,
            "u16" => TypeTag::U16,
            "u32" => TypeTag::U32,
            "u64" => TypeTag::U64,
            "u128" => TypeTag::U128,
            "address" => TypeTag::Address,
            _ => {
                let inner = s
                    .strip_prefix("vector<")
                    .and_then(|rest| rest.strip_suffix('>'))
                    .ok_or_else(|| PtbError::invalid_input(format!("unknown type tag: {s}")))?;
                TypeTag::Vector(Box::new(TypeTag::parse(inner)?))
            }
        })
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::U8 => write!(f, "u8"),
            TypeTag::U16 => write!(f, "u16"),
            TypeTag::U32 => write!(f, "u32"),
            TypeTag::U64 => write!(f, "u64"),
            TypeTag::U128 => write!(f, "u128"),
            TypeTag::Address => write!(f, "address"),
            TypeTag::Vector(inner) => write!(f, "vector<{inner}>"),
        }
    }
}

fn valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Target of a `Call` command, parsed and validated at append time rather
/// than carried as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallTarget {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
}

impl CallTarget {
    pub fn new(package: ObjectId, module: &str, function: &str) -> PtbResult<Self> {
        if !valid_identifier(module) {
            return Err(PtbError::invalid_input(format!(
                "invalid module identifier: {module}"
            )));
        }
        if !valid_identifier(function) {
            return Err(PtbError::invalid_input(format!(
                "invalid function identifier: {function}"
            )));
        }
        Ok(Self {
            package,
            module: module.to_string(),
            function: function.to_string(),
        })
    }

    /// Parse a `0xPACKAGE::module::function` triple.
    pub fn parse(s: &str) -> PtbResult<Self> {
        let mut parts = s.split("::");
        let (package, module, function) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(p), Some(m), Some(f), None) => (p, m, f),
                _ => {
                    return Err(PtbError::invalid_input(format!(
                        "call target must be package::module::function: {s}"
                    )))
                }
            };
        Self::new(ObjectId::parse(package)?, module, function)
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.function)
    }
}

/// Declared arity of a known ledger function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSig {
    pub type_arg_count: usize,
    pub arg_count: usize,
}

/// Registry of known module/function signatures. When a builder carries a
/// table that knows a call's target, the call's arity is checked at append
/// time; unknown targets pass through unchecked.
#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    entries: HashMap<(ObjectId, String, String), FunctionSig>,
}

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: &CallTarget, sig: FunctionSig) {
        self.entries.insert(
            (target.package, target.module.clone(), target.function.clone()),
            sig,
        );
    }

    pub fn lookup(&self, target: &CallTarget) -> Option<FunctionSig> {
        self.entries
            .get(&(target.package, target.module.clone(), target.function.clone()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
