// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Assembler for EVM bytecode with subroutines
//!
//! This crate provides tools to:
//! - Parse EVM assembly text with labels, comments and `.byte` data
//! - Lay out instructions and resolve `@label` operands to byte offsets
//! - Encode and decode code units as hex text
//!
//! It is the test-fixture and tooling companion of the validator: fixtures
//! are written as assembly and assembled before validation.

pub mod error;
pub mod hex;
pub mod parser;

pub use error::{AssembleError, HexError};
pub use parser::{ParsedAssembly, ParsedLine};

/// Assemble source text into bytecode.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssembleError> {
    ParsedAssembly::parse(source).assemble()
}
