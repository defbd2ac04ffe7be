//! Static control-flow and stack-safety validation for EVM bytecode
//!
//! Decides at deployment time, in time linear in the code size, whether every
//! reachable execution path of a code unit is free of invalid instructions,
//! invalid jumps and stack underflow, and bounds its stack depth.
//!
//! # Validation Checklist
//!
//! | Check | Description |
//! |-------|-------------|
//! | **Valid instructions** | Every reachable byte decodes; immediates never run past the end |
//! | **Constant jumps** | `JUMP`/`JUMPI`/`JUMPSUB` destinations are literals pushed right before the jump |
//! | **Jump destinations** | Destinations are `JUMPDEST` (or `BEGINSUB` for calls) on an instruction boundary |
//! | **Consistent depth** | Every instruction is reached with one stack depth relative to its frame |
//! | **No underflow** | No instruction pops below its frame's base |
//! | **Static overflow** | No frame, and no non-recursive call chain, exceeds the stack limit |
//! | **Subroutine shape** | `BEGINSUB args results` is entered with `args` items and left with `results` |
//!
//! Loops are handled by the per-offset depth record: the second visit of an
//! offset either matches and ends the path or is a mismatch. Overflow through
//! recursive subroutine calls cannot be bounded statically and is left to the
//! interpreter.
//!
//! # Subroutines
//!
//! `JUMPSUB` pops its destination and enters the `BEGINSUB` there with a new
//! stack base, `args` items below the current top. The instruction after the
//! `JUMPSUB` becomes reachable once the subroutine returns through
//! `RETURNSUB` with exactly `results` items above its base. Each offset
//! belongs to exactly one frame.

mod decode;
mod error;
mod stack;
mod verify;

use rayon::prelude::*;

pub use cfg::{FrameId, InstructionInfo};
pub use decode::{Instruction, InstructionBoundaries, Literal, decode, instructions};
pub use error::{DecodeError, ErrorKind, ValidationError};
pub use stack::{DepthRecord, Limits, MAX_CODE_SIZE, MAX_STACK_DEPTH, StackEffect, effect};
pub use verify::{Validation, Validator};

/// Validate a code unit with the default limits.
pub fn validate(code: &[u8]) -> Result<Validation, ValidationError> {
    Validator::new(code).validate()
}

/// Validate independent code units in parallel.
///
/// Results are returned in input order. Each unit is still validated by a
/// single thread.
pub fn validate_batch(
    units: &[&[u8]],
    limits: Limits,
) -> Vec<Result<Validation, ValidationError>> {
    units
        .par_iter()
        .map(|code| Validator::with_limits(code, limits).validate())
        .collect()
}
