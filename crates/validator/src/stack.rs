//! Stack effects, limits and the per-offset depth record

use cfg::{FrameId, InstructionInfo};

use crate::decode::{Instruction, Literal};

/// Maximum number of items on the EVM stack.
pub const MAX_STACK_DEPTH: usize = 1024;

/// Maximum deployed code size in bytes (EIP-170).
pub const MAX_CODE_SIZE: usize = 24_576;

/// Limits applied during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest stack depth any path may reach
    pub max_stack_depth: usize,
    /// Largest accepted code unit, unchecked when None
    pub max_code_size: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_stack_depth: MAX_STACK_DEPTH,
            max_code_size: None,
        }
    }
}

/// How an instruction changes the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect<'a> {
    pub consumed: usize,
    pub produced: usize,
    /// Literal pushed by a constant push
    pub constant: Option<Literal<'a>>,
}

impl<'a> From<&Instruction<'a>> for StackEffect<'a> {
    fn from(instruction: &Instruction<'a>) -> Self {
        let opcode = instruction.opcode();
        Self {
            consumed: opcode.consumed,
            produced: opcode.produced,
            constant: instruction.literal(),
        }
    }
}

/// Stack effect of an instruction
pub fn effect<'a>(instruction: &Instruction<'a>) -> StackEffect<'a> {
    StackEffect::from(instruction)
}

/// Depth recorded the first time an offset was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRecord {
    /// Items above the owning frame's base on entry to the instruction
    pub depth: usize,
    /// Frame that owns the offset
    pub frame: FrameId,
}

/// Outcome of recording a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    /// The offset was unvisited and is now recorded
    First,
    /// Same depth and frame as before; nothing new to explore
    Revisit,
    /// Reached again with a different depth or frame
    Conflict(DepthRecord),
}

/// One slot per code byte. A recorded depth never changes.
#[derive(Debug, Clone)]
pub struct StackDepths {
    slots: Vec<Option<DepthRecord>>,
}

impl StackDepths {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub(crate) fn record(&mut self, offset: usize, record: DepthRecord) -> Visit {
        match self.slots[offset] {
            None => {
                self.slots[offset] = Some(record);
                Visit::First
            }
            Some(existing) if existing == record => Visit::Revisit,
            Some(existing) => Visit::Conflict(existing),
        }
    }

    pub fn get(&self, offset: usize) -> Option<DepthRecord> {
        self.slots.get(offset).copied().flatten()
    }

    /// Recorded offsets in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (usize, DepthRecord)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| slot.map(|record| (offset, record)))
    }
}
