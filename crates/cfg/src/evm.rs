//! EVM opcode classification
//!
//! Single source of truth for opcode classification used by both
//! the validator (bytecode) and the assembler (text).
//!
//! The instruction set is the London-era EVM plus `PUSH0` and the three
//! subroutine opcodes `BEGINSUB`, `RETURNSUB` and `JUMPSUB` (0x5c-0x5e).

use std::collections::HashMap;

use lazy_static::lazy_static;

/// How an instruction passes control to its successors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Continues with the next instruction
    Next,
    /// `JUMPDEST`: the only legal target of `JUMP` and `JUMPI`
    JumpDest,
    /// `JUMP`: unconditional jump to a constant destination
    Jump,
    /// `JUMPI`: both the destination and the next instruction are successors
    ConditionalJump,
    /// `BEGINSUB`: the only legal target of `JUMPSUB`
    BeginSub,
    /// `JUMPSUB`: enters a subroutine, resumes after it on return
    JumpSub,
    /// `RETURNSUB`: leaves the current subroutine
    ReturnSub,
    /// Halts execution (`STOP`, `RETURN`, `REVERT`, `INVALID`, `SELFDESTRUCT`)
    Terminal,
}

/// Classification of an EVM opcode
#[derive(Debug, PartialEq, Eq)]
pub struct ClassifiedOpcode {
    /// The opcode byte
    pub byte: u8,
    /// The mnemonic string (e.g., "ADD", "PUSH1")
    pub mnemonic: &'static str,
    /// Number of immediate bytes following the opcode
    pub immediate_len: usize,
    /// Stack items consumed
    pub consumed: usize,
    /// Stack items produced
    pub produced: usize,
    /// Control flow class
    pub flow: Flow,
    /// Whether the produced item is the literal carried in the immediate bytes
    pub is_constant_push: bool,
}

impl ClassifiedOpcode {
    const fn op(byte: u8, mnemonic: &'static str, consumed: usize, produced: usize) -> Self {
        Self {
            byte,
            mnemonic,
            immediate_len: 0,
            consumed,
            produced,
            flow: Flow::Next,
            is_constant_push: false,
        }
    }

    const fn control(byte: u8, mnemonic: &'static str, consumed: usize, flow: Flow) -> Self {
        Self {
            byte,
            mnemonic,
            immediate_len: 0,
            consumed,
            produced: 0,
            flow,
            is_constant_push: false,
        }
    }

    const fn terminal(byte: u8, mnemonic: &'static str, consumed: usize) -> Self {
        Self::control(byte, mnemonic, consumed, Flow::Terminal)
    }

    /// `PUSH0`..`PUSH32`: `width` immediate bytes pushed as one literal
    const fn push(byte: u8, mnemonic: &'static str, width: usize) -> Self {
        Self {
            byte,
            mnemonic,
            immediate_len: width,
            consumed: 0,
            produced: 1,
            flow: Flow::Next,
            is_constant_push: true,
        }
    }

    /// `DUPn` needs `n` items and leaves `n + 1`
    const fn dup(byte: u8, mnemonic: &'static str, n: usize) -> Self {
        Self::op(byte, mnemonic, n, n + 1)
    }

    /// `SWAPn` needs `n + 1` items and leaves as many
    const fn swap(byte: u8, mnemonic: &'static str, n: usize) -> Self {
        Self::op(byte, mnemonic, n + 1, n + 1)
    }

    /// `BEGINSUB args results`: two one-byte immediates declaring the frame shape
    const fn begin_sub(byte: u8, mnemonic: &'static str) -> Self {
        Self {
            byte,
            mnemonic,
            immediate_len: 2,
            consumed: 0,
            produced: 0,
            flow: Flow::BeginSub,
            is_constant_push: false,
        }
    }

    /// Classify an opcode byte.
    ///
    /// Returns None for bytes that are not assigned an instruction.
    pub fn from_byte(byte: u8) -> Option<&'static Self> {
        BY_BYTE[byte as usize]
    }

    /// Classify by mnemonic string (for the assembler)
    ///
    /// Lookup is case-insensitive. Returns None for unknown mnemonics.
    pub fn from_mnemonic(mnemonic: &str) -> Option<&'static Self> {
        BY_MNEMONIC
            .get(mnemonic.to_ascii_uppercase().as_str())
            .copied()
    }

    /// Total encoded length: the opcode byte plus its immediates
    pub fn encoded_len(&self) -> usize {
        1 + self.immediate_len
    }
}

/// Single source of truth: all classified opcodes
const OPCODE_TABLE: &[ClassifiedOpcode] = &[
    // Stop and arithmetic
    ClassifiedOpcode::terminal(0x00, "STOP", 0),
    ClassifiedOpcode::op(0x01, "ADD", 2, 1),
    ClassifiedOpcode::op(0x02, "MUL", 2, 1),
    ClassifiedOpcode::op(0x03, "SUB", 2, 1),
    ClassifiedOpcode::op(0x04, "DIV", 2, 1),
    ClassifiedOpcode::op(0x05, "SDIV", 2, 1),
    ClassifiedOpcode::op(0x06, "MOD", 2, 1),
    ClassifiedOpcode::op(0x07, "SMOD", 2, 1),
    ClassifiedOpcode::op(0x08, "ADDMOD", 3, 1),
    ClassifiedOpcode::op(0x09, "MULMOD", 3, 1),
    ClassifiedOpcode::op(0x0a, "EXP", 2, 1),
    ClassifiedOpcode::op(0x0b, "SIGNEXTEND", 2, 1),
    // Comparison and bitwise logic
    ClassifiedOpcode::op(0x10, "LT", 2, 1),
    ClassifiedOpcode::op(0x11, "GT", 2, 1),
    ClassifiedOpcode::op(0x12, "SLT", 2, 1),
    ClassifiedOpcode::op(0x13, "SGT", 2, 1),
    ClassifiedOpcode::op(0x14, "EQ", 2, 1),
    ClassifiedOpcode::op(0x15, "ISZERO", 1, 1),
    ClassifiedOpcode::op(0x16, "AND", 2, 1),
    ClassifiedOpcode::op(0x17, "OR", 2, 1),
    ClassifiedOpcode::op(0x18, "XOR", 2, 1),
    ClassifiedOpcode::op(0x19, "NOT", 1, 1),
    ClassifiedOpcode::op(0x1a, "BYTE", 2, 1),
    ClassifiedOpcode::op(0x1b, "SHL", 2, 1),
    ClassifiedOpcode::op(0x1c, "SHR", 2, 1),
    ClassifiedOpcode::op(0x1d, "SAR", 2, 1),
    ClassifiedOpcode::op(0x20, "SHA3", 2, 1),
    // Environment
    ClassifiedOpcode::op(0x30, "ADDRESS", 0, 1),
    ClassifiedOpcode::op(0x31, "BALANCE", 1, 1),
    ClassifiedOpcode::op(0x32, "ORIGIN", 0, 1),
    ClassifiedOpcode::op(0x33, "CALLER", 0, 1),
    ClassifiedOpcode::op(0x34, "CALLVALUE", 0, 1),
    ClassifiedOpcode::op(0x35, "CALLDATALOAD", 1, 1),
    ClassifiedOpcode::op(0x36, "CALLDATASIZE", 0, 1),
    ClassifiedOpcode::op(0x37, "CALLDATACOPY", 3, 0),
    ClassifiedOpcode::op(0x38, "CODESIZE", 0, 1),
    ClassifiedOpcode::op(0x39, "CODECOPY", 3, 0),
    ClassifiedOpcode::op(0x3a, "GASPRICE", 0, 1),
    ClassifiedOpcode::op(0x3b, "EXTCODESIZE", 1, 1),
    ClassifiedOpcode::op(0x3c, "EXTCODECOPY", 4, 0),
    ClassifiedOpcode::op(0x3d, "RETURNDATASIZE", 0, 1),
    ClassifiedOpcode::op(0x3e, "RETURNDATACOPY", 3, 0),
    ClassifiedOpcode::op(0x3f, "EXTCODEHASH", 1, 1),
    // Block information
    ClassifiedOpcode::op(0x40, "BLOCKHASH", 1, 1),
    ClassifiedOpcode::op(0x41, "COINBASE", 0, 1),
    ClassifiedOpcode::op(0x42, "TIMESTAMP", 0, 1),
    ClassifiedOpcode::op(0x43, "NUMBER", 0, 1),
    ClassifiedOpcode::op(0x44, "DIFFICULTY", 0, 1),
    ClassifiedOpcode::op(0x45, "GASLIMIT", 0, 1),
    ClassifiedOpcode::op(0x46, "CHAINID", 0, 1),
    ClassifiedOpcode::op(0x47, "SELFBALANCE", 0, 1),
    ClassifiedOpcode::op(0x48, "BASEFEE", 0, 1),
    // Stack, memory, storage and flow
    ClassifiedOpcode::op(0x50, "POP", 1, 0),
    ClassifiedOpcode::op(0x51, "MLOAD", 1, 1),
    ClassifiedOpcode::op(0x52, "MSTORE", 2, 0),
    ClassifiedOpcode::op(0x53, "MSTORE8", 2, 0),
    ClassifiedOpcode::op(0x54, "SLOAD", 1, 1),
    ClassifiedOpcode::op(0x55, "SSTORE", 2, 0),
    ClassifiedOpcode::control(0x56, "JUMP", 1, Flow::Jump),
    ClassifiedOpcode::control(0x57, "JUMPI", 2, Flow::ConditionalJump),
    ClassifiedOpcode::op(0x58, "PC", 0, 1),
    ClassifiedOpcode::op(0x59, "MSIZE", 0, 1),
    ClassifiedOpcode::op(0x5a, "GAS", 0, 1),
    ClassifiedOpcode::control(0x5b, "JUMPDEST", 0, Flow::JumpDest),
    // Subroutines
    ClassifiedOpcode::begin_sub(0x5c, "BEGINSUB"),
    ClassifiedOpcode::control(0x5d, "RETURNSUB", 0, Flow::ReturnSub),
    ClassifiedOpcode::control(0x5e, "JUMPSUB", 1, Flow::JumpSub),
    // Constant pushes
    ClassifiedOpcode::push(0x5f, "PUSH0", 0),
    ClassifiedOpcode::push(0x60, "PUSH1", 1),
    ClassifiedOpcode::push(0x61, "PUSH2", 2),
    ClassifiedOpcode::push(0x62, "PUSH3", 3),
    ClassifiedOpcode::push(0x63, "PUSH4", 4),
    ClassifiedOpcode::push(0x64, "PUSH5", 5),
    ClassifiedOpcode::push(0x65, "PUSH6", 6),
    ClassifiedOpcode::push(0x66, "PUSH7", 7),
    ClassifiedOpcode::push(0x67, "PUSH8", 8),
    ClassifiedOpcode::push(0x68, "PUSH9", 9),
    ClassifiedOpcode::push(0x69, "PUSH10", 10),
    ClassifiedOpcode::push(0x6a, "PUSH11", 11),
    ClassifiedOpcode::push(0x6b, "PUSH12", 12),
    ClassifiedOpcode::push(0x6c, "PUSH13", 13),
    ClassifiedOpcode::push(0x6d, "PUSH14", 14),
    ClassifiedOpcode::push(0x6e, "PUSH15", 15),
    ClassifiedOpcode::push(0x6f, "PUSH16", 16),
    ClassifiedOpcode::push(0x70, "PUSH17", 17),
    ClassifiedOpcode::push(0x71, "PUSH18", 18),
    ClassifiedOpcode::push(0x72, "PUSH19", 19),
    ClassifiedOpcode::push(0x73, "PUSH20", 20),
    ClassifiedOpcode::push(0x74, "PUSH21", 21),
    ClassifiedOpcode::push(0x75, "PUSH22", 22),
    ClassifiedOpcode::push(0x76, "PUSH23", 23),
    ClassifiedOpcode::push(0x77, "PUSH24", 24),
    ClassifiedOpcode::push(0x78, "PUSH25", 25),
    ClassifiedOpcode::push(0x79, "PUSH26", 26),
    ClassifiedOpcode::push(0x7a, "PUSH27", 27),
    ClassifiedOpcode::push(0x7b, "PUSH28", 28),
    ClassifiedOpcode::push(0x7c, "PUSH29", 29),
    ClassifiedOpcode::push(0x7d, "PUSH30", 30),
    ClassifiedOpcode::push(0x7e, "PUSH31", 31),
    ClassifiedOpcode::push(0x7f, "PUSH32", 32),
    // Duplication
    ClassifiedOpcode::dup(0x80, "DUP1", 1),
    ClassifiedOpcode::dup(0x81, "DUP2", 2),
    ClassifiedOpcode::dup(0x82, "DUP3", 3),
    ClassifiedOpcode::dup(0x83, "DUP4", 4),
    ClassifiedOpcode::dup(0x84, "DUP5", 5),
    ClassifiedOpcode::dup(0x85, "DUP6", 6),
    ClassifiedOpcode::dup(0x86, "DUP7", 7),
    ClassifiedOpcode::dup(0x87, "DUP8", 8),
    ClassifiedOpcode::dup(0x88, "DUP9", 9),
    ClassifiedOpcode::dup(0x89, "DUP10", 10),
    ClassifiedOpcode::dup(0x8a, "DUP11", 11),
    ClassifiedOpcode::dup(0x8b, "DUP12", 12),
    ClassifiedOpcode::dup(0x8c, "DUP13", 13),
    ClassifiedOpcode::dup(0x8d, "DUP14", 14),
    ClassifiedOpcode::dup(0x8e, "DUP15", 15),
    ClassifiedOpcode::dup(0x8f, "DUP16", 16),
    // Exchange
    ClassifiedOpcode::swap(0x90, "SWAP1", 1),
    ClassifiedOpcode::swap(0x91, "SWAP2", 2),
    ClassifiedOpcode::swap(0x92, "SWAP3", 3),
    ClassifiedOpcode::swap(0x93, "SWAP4", 4),
    ClassifiedOpcode::swap(0x94, "SWAP5", 5),
    ClassifiedOpcode::swap(0x95, "SWAP6", 6),
    ClassifiedOpcode::swap(0x96, "SWAP7", 7),
    ClassifiedOpcode::swap(0x97, "SWAP8", 8),
    ClassifiedOpcode::swap(0x98, "SWAP9", 9),
    ClassifiedOpcode::swap(0x99, "SWAP10", 10),
    ClassifiedOpcode::swap(0x9a, "SWAP11", 11),
    ClassifiedOpcode::swap(0x9b, "SWAP12", 12),
    ClassifiedOpcode::swap(0x9c, "SWAP13", 13),
    ClassifiedOpcode::swap(0x9d, "SWAP14", 14),
    ClassifiedOpcode::swap(0x9e, "SWAP15", 15),
    ClassifiedOpcode::swap(0x9f, "SWAP16", 16),
    // Logging
    ClassifiedOpcode::op(0xa0, "LOG0", 2, 0),
    ClassifiedOpcode::op(0xa1, "LOG1", 3, 0),
    ClassifiedOpcode::op(0xa2, "LOG2", 4, 0),
    ClassifiedOpcode::op(0xa3, "LOG3", 5, 0),
    ClassifiedOpcode::op(0xa4, "LOG4", 6, 0),
    // System
    ClassifiedOpcode::op(0xf0, "CREATE", 3, 1),
    ClassifiedOpcode::op(0xf1, "CALL", 7, 1),
    ClassifiedOpcode::op(0xf2, "CALLCODE", 7, 1),
    ClassifiedOpcode::terminal(0xf3, "RETURN", 2),
    ClassifiedOpcode::op(0xf4, "DELEGATECALL", 6, 1),
    ClassifiedOpcode::op(0xf5, "CREATE2", 4, 1),
    ClassifiedOpcode::op(0xfa, "STATICCALL", 6, 1),
    ClassifiedOpcode::terminal(0xfd, "REVERT", 2),
    ClassifiedOpcode::terminal(0xfe, "INVALID", 0),
    ClassifiedOpcode::terminal(0xff, "SELFDESTRUCT", 1),
];

lazy_static! {
    /// Map from mnemonic string to ClassifiedOpcode
    pub static ref BY_MNEMONIC: HashMap<&'static str, &'static ClassifiedOpcode> = {
        OPCODE_TABLE.iter().map(|c| (c.mnemonic, c)).collect()
    };

    /// Dense lookup from opcode byte to ClassifiedOpcode
    pub static ref BY_BYTE: [Option<&'static ClassifiedOpcode>; 256] = {
        let mut table = [None; 256];
        for classified in OPCODE_TABLE {
            table[classified.byte as usize] = Some(classified);
        }
        table
    };
}
