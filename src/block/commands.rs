//! Command list and the handles that reference into it.
//!
//! Handles are plain indices tagged with the id of the block that minted
//! them, so a handle can never be replayed against an unrelated block.
//! Execution order on the ledger is defined to equal append order exactly.

use crate::types::{CallTarget, TypeTag};

/// Handle to a slot in a block's input pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHandle {
    pub(crate) block_id: u64,
    pub(crate) index: u16,
}

impl InputHandle {
    pub fn index(&self) -> u16 {
        self.index
    }
}

/// Handle to a previously appended command, usable as a reference to that
/// command's result(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle {
    pub(crate) block_id: u64,
    pub(crate) index: u16,
}

impl CommandHandle {
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Reference the Nth result of a multi-return command.
    pub fn nested(&self, result: u16) -> Argument {
        Argument::NestedResult(*self, result)
    }
}

/// An argument to a command: the gas coin, an input pool slot, or the
/// output of an earlier command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    /// The block's gas coin.
    Gas,
    Input(InputHandle),
    /// First (or only) result of an earlier command.
    Result(CommandHandle),
    /// Mth result of an earlier multi-return command.
    NestedResult(CommandHandle, u16),
}

impl From<InputHandle> for Argument {
    fn from(handle: InputHandle) -> Self {
        Argument::Input(handle)
    }
}

impl From<CommandHandle> for Argument {
    fn from(handle: CommandHandle) -> Self {
        Argument::Result(handle)
    }
}

/// A single command in a block. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Invoke `package::module::function` with type and value arguments.
    Call {
        target: CallTarget,
        type_args: Vec<TypeTag>,
        args: Vec<Argument>,
    },
    /// Split `amounts.len()` new coins off `coin`; result i is the ith coin.
    SplitCoins { coin: Argument, amounts: Vec<Argument> },
    /// Merge `sources` into `destination`, consuming the sources.
    MergeCoins { destination: Argument, sources: Vec<Argument> },
    /// Transfer `objects` to `recipient`.
    TransferObjects { objects: Vec<Argument>, recipient: Argument },
}

impl Command {
    /// All arguments of the command, for validation and encoding.
    pub fn arguments(&self) -> Vec<Argument> {
        match self {
            Command::Call { args, .. } => args.clone(),
            Command::SplitCoins { coin, amounts } => {
                let mut all = vec![*coin];
                all.extend_from_slice(amounts);
                all
            }
            Command::MergeCoins { destination, sources } => {
                let mut all = vec![*destination];
                all.extend_from_slice(sources);
                all
            }
            Command::TransferObjects { objects, recipient } => {
                let mut all = objects.clone();
                all.push(*recipient);
                all
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::Call { .. } => "call",
            Command::SplitCoins { .. } => "split_coins",
            Command::MergeCoins { .. } => "merge_coins",
            Command::TransferObjects { .. } => "transfer_objects",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_enumerated_in_encoding_order() {
        let input = InputHandle { block_id: 1, index: 0 };
        let cmd = CommandHandle { block_id: 1, index: 0 };
        let split = Command::SplitCoins {
            coin: Argument::Gas,
            amounts: vec![input.into()],
        };
        assert_eq!(split.arguments(), vec![Argument::Gas, Argument::Input(input)]);

        let xfer = Command::TransferObjects {
            objects: vec![cmd.nested(0)],
            recipient: input.into(),
        };
        assert_eq!(
            xfer.arguments(),
            vec![Argument::NestedResult(cmd, 0), Argument::Input(input)]
        );
    }

    #[test]
    fn command_kinds() {
        let merge = Command::MergeCoins {
            destination: Argument::Gas,
            sources: vec![],
        };
        assert_eq!(merge.kind(), "merge_coins");
    }
}
