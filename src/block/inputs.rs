//! Deduplicated input pool for a transaction block.
//!
//! Pure values dedupe by (type tag, encoded bytes); object references dedupe
//! by object id. Re-adding an object under a conflicting ownership hint is an
//! `InvalidInput`, never a silent second slot.

use std::collections::HashMap;

use crate::block::errors::{PtbError, PtbResult};
use crate::types::{Address, ObjectDigest, ObjectId, TypeTag, Version};

/// Possibly-unresolved reference to an owned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedObjectRef {
    pub id: ObjectId,
    pub version: Option<Version>,
    pub digest: Option<ObjectDigest>,
}

impl OwnedObjectRef {
    pub fn unresolved(id: ObjectId) -> Self {
        Self { id, version: None, digest: None }
    }

    pub fn is_resolved(&self) -> bool {
        self.version.is_some() && self.digest.is_some()
    }
}

/// Ownership hint supplied when an object is added to the pool. Checked
/// against the ledger's actual owner at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Owned,
    Shared { mutable: bool },
}

/// A single slot in the input pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Pure {
        type_tag: TypeTag,
        bytes: Vec<u8>,
    },
    OwnedObject(OwnedObjectRef),
    SharedObject {
        id: ObjectId,
        initial_shared_version: Option<Version>,
        mutable: bool,
    },
}

impl Input {
    /// Pure inputs are always resolved; object inputs are resolved once
    /// their ledger metadata has been filled in.
    pub fn is_resolved(&self) -> bool {
        match self {
            Input::Pure { .. } => true,
            Input::OwnedObject(obj) => obj.is_resolved(),
            Input::SharedObject { initial_shared_version, .. } => {
                initial_shared_version.is_some()
            }
        }
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Input::Pure { .. } => None,
            Input::OwnedObject(obj) => Some(obj.id),
            Input::SharedObject { id, .. } => Some(*id),
        }
    }
}

/// Ordered, deduplicated table of transaction inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputPool {
    inputs: Vec<Input>,
    pure_index: HashMap<(TypeTag, Vec<u8>), u16>,
    object_index: HashMap<ObjectId, u16>,
}

impl InputPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a pool from already-validated inputs (decoder path).
    pub(crate) fn from_inputs(inputs: Vec<Input>) -> Self {
        let mut pure_index = HashMap::new();
        let mut object_index = HashMap::new();
        for (i, input) in inputs.iter().enumerate() {
            match input {
                Input::Pure { type_tag, bytes } => {
                    pure_index
                        .entry((type_tag.clone(), bytes.clone()))
                        .or_insert(i as u16);
                }
                _ => {
                    object_index
                        .entry(input.object_id().expect("object input"))
                        .or_insert(i as u16);
                }
            }
        }
        Self { inputs, pure_index, object_index }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&Input> {
        self.inputs.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Input> {
        self.inputs.iter()
    }

    fn reserve_slot(&self) -> PtbResult<u16> {
        if self.inputs.len() >= u16::MAX as usize {
            return Err(PtbError::invalid_input("input pool is full"));
        }
        Ok(self.inputs.len() as u16)
    }

    /// Add a pure value with pre-encoded bytes, validating the encoding
    /// length against the declared type tag. Identical (tag, bytes) pairs
    /// share one slot.
    pub fn add_pure_raw(&mut self, type_tag: TypeTag, bytes: Vec<u8>) -> PtbResult<u16> {
        match type_tag.encoded_len() {
            Some(expected) => {
                if bytes.len() != expected {
                    return Err(PtbError::invalid_input(format!(
                        "pure value of type {type_tag} must encode to {expected} bytes, got {}",
                        bytes.len()
                    )));
                }
            }
            None => {
                // Fixed-width elements must tile the encoding exactly;
                // nested vectors have no checkable width.
                if let TypeTag::Vector(element) = &type_tag {
                    if let Some(width) = element.encoded_len() {
                        if bytes.len() % width != 0 {
                            return Err(PtbError::invalid_input(format!(
                                "pure value of type {type_tag} must encode to a multiple \
                                 of {width} bytes, got {}",
                                bytes.len()
                            )));
                        }
                    }
                }
            }
        }
        let key = (type_tag.clone(), bytes.clone());
        if let Some(&index) = self.pure_index.get(&key) {
            return Ok(index);
        }
        let index = self.reserve_slot()?;
        self.inputs.push(Input::Pure { type_tag, bytes });
        self.pure_index.insert(key, index);
        Ok(index)
    }

    pub fn add_pure_bool(&mut self, value: bool) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::Bool, vec![value as u8])
    }

    pub fn add_pure_u8(&mut self, value: u8) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::U8, vec![value])
    }

    pub fn add_pure_u16(&mut self, value: u16) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::U16, value.to_le_bytes().to_vec())
    }

    pub fn add_pure_u32(&mut self, value: u32) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::U32, value.to_le_bytes().to_vec())
    }

    pub fn add_pure_u64(&mut self, value: u64) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::U64, value.to_le_bytes().to_vec())
    }

    pub fn add_pure_u128(&mut self, value: u128) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::U128, value.to_le_bytes().to_vec())
    }

    pub fn add_pure_address(&mut self, value: Address) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::Address, value.as_bytes().to_vec())
    }

    pub fn add_pure_bytes(&mut self, value: Vec<u8>) -> PtbResult<u16> {
        self.add_pure_raw(TypeTag::Vector(Box::new(TypeTag::U8)), value)
    }

    /// Add an object reference by id with an ownership hint. Referencing an
    /// id already in the pool returns the existing slot; a conflicting hint
    /// for the same id fails.
    pub fn add_object(&mut self, id: ObjectId, kind: ObjectKind) -> PtbResult<u16> {
        if let Some(&index) = self.object_index.get(&id) {
            let existing = &self.inputs[index as usize];
            let compatible = matches!(
                (existing, kind),
                (Input::OwnedObject(_), ObjectKind::Owned)
            ) || matches!(
                (existing, kind),
                (Input::SharedObject { mutable, .. }, ObjectKind::Shared { mutable: m })
                    if *mutable == m
            );
            if !compatible {
                return Err(PtbError::invalid_input(format!(
                    "object {id} already added with a different ownership hint"
                )));
            }
            return Ok(index);
        }
        let index = self.reserve_slot()?;
        let input = match kind {
            ObjectKind::Owned => Input::OwnedObject(OwnedObjectRef::unresolved(id)),
            ObjectKind::Shared { mutable } => Input::SharedObject {
                id,
                initial_shared_version: None,
                mutable,
            },
        };
        self.inputs.push(input);
        self.object_index.insert(id, index);
        Ok(index)
    }

    /// Replace the input at `index` with a resolved version of itself.
    /// Resolver-internal: only used while building a resolved copy.
    pub(crate) fn set(&mut self, index: u16, input: Input) {
        self.inputs[index as usize] = input;
    }

    /// Indices of inputs still missing ledger metadata.
    pub fn unresolved_indices(&self) -> Vec<u16> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| !input.is_resolved())
            .map(|(i, _)| i as u16)
            .collect()
    }
}
