//! Trait abstraction over positioned instructions
//!
//! The [`InstructionInfo`] trait derives the control-flow properties of an
//! instruction from its [`ClassifiedOpcode`], so every consumer classifies
//! successors the same way. The validator's decoded `Instruction` implements
//! it, as does the mock used in this crate's tests.

use crate::evm::{ClassifiedOpcode, Flow};

/// Information about an instruction needed for control-flow analysis.
///
/// # Default Implementations
///
/// Control flow methods (`is_jump`, `is_call`, etc.) have default implementations
/// that read the [`ClassifiedOpcode`] returned by [`opcode`](Self::opcode). This
/// keeps classification consistent across text and binary.
pub trait InstructionInfo {
    /// Returns the classified opcode of this instruction.
    fn opcode(&self) -> &'static ClassifiedOpcode;

    /// Returns the byte offset of this instruction in the code unit.
    fn offset(&self) -> usize;

    /// Returns the mnemonic of this instruction.
    #[inline]
    fn mnemonic(&self) -> &'static str {
        self.opcode().mnemonic
    }

    /// Offset of the instruction that follows, past any immediate data.
    #[inline]
    fn next_offset(&self) -> usize {
        self.offset() + self.opcode().encoded_len()
    }

    /// Check if this is `JUMP` or `JUMPI`.
    #[inline]
    fn is_jump(&self) -> bool {
        matches!(self.opcode().flow, Flow::Jump | Flow::ConditionalJump)
    }

    /// Check if this is a subroutine call (`JUMPSUB`).
    #[inline]
    fn is_call(&self) -> bool {
        self.opcode().flow == Flow::JumpSub
    }

    /// Check if this is a subroutine return (`RETURNSUB`).
    #[inline]
    fn is_return(&self) -> bool {
        self.opcode().flow == Flow::ReturnSub
    }

    /// Check if this instruction halts execution.
    #[inline]
    fn is_terminal(&self) -> bool {
        self.opcode().flow == Flow::Terminal
    }

    /// Check if execution may continue with the next instruction.
    ///
    /// A subroutine call does not fall through directly: its continuation
    /// only becomes reachable once the callee returns.
    #[inline]
    fn falls_through(&self) -> bool {
        matches!(
            self.opcode().flow,
            Flow::Next | Flow::JumpDest | Flow::BeginSub | Flow::ConditionalJump
        )
    }
}
