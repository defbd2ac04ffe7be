//! Error types for bytecode validation

use std::fmt;

use thiserror::Error;

/// Errors that can occur while decoding a single instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("offset {offset:#x} is outside the code ({len} bytes)")]
    OutOfBounds { offset: usize, len: usize },

    #[error("unknown opcode {byte:#04x} at {offset:#x}")]
    UnknownOpcode { offset: usize, byte: u8 },

    #[error(
        "truncated {mnemonic} at {offset:#x}: needs {expected} immediate bytes, {available} available"
    )]
    Truncated {
        offset: usize,
        mnemonic: &'static str,
        expected: usize,
        available: usize,
    },
}

impl DecodeError {
    /// Offset of the instruction that failed to decode
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::OutOfBounds { offset, .. }
            | DecodeError::UnknownOpcode { offset, .. }
            | DecodeError::Truncated { offset, .. } => *offset,
        }
    }
}

/// Coarse classification of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInstruction,
    InvalidJumpDestination,
    StackDepthMismatch,
    StackUnderflow,
    StackOverflow,
    CodeTooLarge,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInstruction => "invalid instruction",
            ErrorKind::InvalidJumpDestination => "invalid jump destination",
            ErrorKind::StackDepthMismatch => "stack depth mismatch",
            ErrorKind::StackUnderflow => "stack underflow",
            ErrorKind::StackOverflow => "stack overflow",
            ErrorKind::CodeTooLarge => "code too large",
        };
        f.write_str(name)
    }
}

/// The first failure found in a code unit. Validation stops at the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("subroutine entry at {offset:#x} reached without JUMPSUB")]
    UncalledSubroutineEntry { offset: usize },

    #[error("jump at {offset:#x} has no constant destination")]
    NonConstantDestination { offset: usize },

    /// Reported against the jump, so its kind is an invalid destination
    /// rather than an invalid instruction at the target.
    #[error("jump at {offset:#x} targets beyond the end of the code ({len} bytes)")]
    DestinationOutOfBounds { offset: usize, len: usize },

    #[error("jump at {offset:#x} targets {target:#x}, which is not a {expected}")]
    BadDestination {
        offset: usize,
        target: usize,
        expected: &'static str,
    },

    #[error("RETURNSUB at {offset:#x} has no matching JUMPSUB")]
    UnmatchedReturn { offset: usize },

    #[error("control transfer at {offset:#x} enters {target:#x}, owned by another frame")]
    CrossFrameTransfer { offset: usize, target: usize },

    #[error("stack depth mismatch at {offset:#x}: recorded {recorded}, reached with {found}")]
    StackDepthMismatch {
        offset: usize,
        recorded: usize,
        found: usize,
    },

    #[error("stack underflow at {offset:#x}: needs {required} items, {available} available")]
    StackUnderflow {
        offset: usize,
        required: usize,
        available: usize,
    },

    #[error("stack overflow at {offset:#x}: depth {depth} exceeds limit {limit}")]
    StackOverflow {
        offset: usize,
        depth: usize,
        limit: usize,
    },

    #[error("code size {size} exceeds limit {limit}")]
    CodeTooLarge { size: usize, limit: usize },
}

impl ValidationError {
    /// The kind of failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::Decode(_) | ValidationError::UncalledSubroutineEntry { .. } => {
                ErrorKind::InvalidInstruction
            }
            ValidationError::NonConstantDestination { .. }
            | ValidationError::DestinationOutOfBounds { .. }
            | ValidationError::BadDestination { .. }
            | ValidationError::UnmatchedReturn { .. }
            | ValidationError::CrossFrameTransfer { .. } => ErrorKind::InvalidJumpDestination,
            ValidationError::StackDepthMismatch { .. } => ErrorKind::StackDepthMismatch,
            ValidationError::StackUnderflow { .. } => ErrorKind::StackUnderflow,
            ValidationError::StackOverflow { .. } => ErrorKind::StackOverflow,
            ValidationError::CodeTooLarge { .. } => ErrorKind::CodeTooLarge,
        }
    }

    /// Offset of the offending instruction.
    ///
    /// For [`CodeTooLarge`](ValidationError::CodeTooLarge) this is the limit,
    /// the first offset past the allowed size.
    pub fn offset(&self) -> usize {
        match self {
            ValidationError::Decode(error) => error.offset(),
            ValidationError::UncalledSubroutineEntry { offset }
            | ValidationError::NonConstantDestination { offset }
            | ValidationError::DestinationOutOfBounds { offset, .. }
            | ValidationError::BadDestination { offset, .. }
            | ValidationError::UnmatchedReturn { offset }
            | ValidationError::CrossFrameTransfer { offset, .. }
            | ValidationError::StackDepthMismatch { offset, .. }
            | ValidationError::StackUnderflow { offset, .. }
            | ValidationError::StackOverflow { offset, .. } => *offset,
            ValidationError::CodeTooLarge { limit, .. } => *limit,
        }
    }
}
