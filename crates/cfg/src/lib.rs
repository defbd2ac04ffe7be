//! Control-flow building blocks for EVM bytecode
//!
//! This crate provides:
//! - **EVM opcode classification** shared by the validator and the assembler
//! - **The [`InstructionInfo`] trait** over decoded and assembled instructions
//! - **The subroutine call graph** with cross-frame stack bounds and recursion detection
//!
//! # Modules
//!
//! - [`evm`]: Opcode table, stack effects and control-flow classes
//! - [`traits`]: `InstructionInfo` trait
//! - [`call_graph`]: `CallGraph`, `FrameId` and `StackBound`

pub mod call_graph;
pub mod evm;
pub mod traits;

pub use call_graph::{CallGraph, CallSite, FrameId, StackBound};
pub use evm::{BY_BYTE, BY_MNEMONIC, ClassifiedOpcode, Flow};
pub use traits::InstructionInfo;
