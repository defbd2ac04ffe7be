// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for assembly and hex handling.

use thiserror::Error;

/// Error while laying out or encoding assembly text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// Instruction mnemonic not in the opcode table.
    #[error("unknown mnemonic '{mnemonic}' at line {line}")]
    UnknownMnemonic { mnemonic: String, line: usize },

    /// Directive other than `.byte`.
    #[error("unknown directive '{directive}' at line {line}")]
    UnknownDirective { directive: String, line: usize },

    /// Wrong number of operands for the instruction.
    #[error("{mnemonic} takes {expected} operand(s), found {found} at line {line}")]
    OperandCount {
        mnemonic: &'static str,
        expected: usize,
        found: usize,
        line: usize,
    },

    /// Operand is neither a number nor a `@label` reference.
    #[error("invalid operand '{operand}' at line {line}")]
    InvalidOperand { operand: String, line: usize },

    /// Operand value does not fit in the immediate.
    #[error("operand '{operand}' does not fit in {width} byte(s) at line {line}")]
    OperandTooLarge {
        operand: String,
        width: usize,
        line: usize,
    },

    /// Reference to a label that is never defined.
    #[error("undefined label '{label}' referenced at line {line}")]
    UndefinedLabel {
        /// The undefined label name.
        label: String,
        /// Line number where the reference occurs.
        line: usize,
    },

    /// Label defined twice.
    #[error("label '{label}' redefined at line {line}")]
    DuplicateLabel { label: String, line: usize },
}

/// Error while decoding hex text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("invalid hex digit '{digit}' at position {position}")]
    InvalidDigit { digit: char, position: usize },

    #[error("odd number of hex digits ({digits})")]
    OddLength { digits: usize },
}
