//! Programmable transaction block construction.
//!
//! A block is an input pool (deduplicated pure values and object references)
//! plus an append-only command list whose execution order equals append
//! order. The modules here split the concern the same way:
//! - **errors**: lifecycle-wide error taxonomy
//! - **inputs**: deduplicated input pool
//! - **commands**: command variants and index-based handles
//! - **builder**: append API and the frozen, immutable block form

pub mod errors;
pub use errors::{PtbError, PtbResult};

pub mod builder;
pub mod commands;
pub mod inputs;

pub use builder::{BlockBuilder, FrozenBlock, GasData};
pub use commands::{Argument, Command, CommandHandle, InputHandle};
pub use inputs::{Input, InputPool, ObjectKind, OwnedObjectRef};
