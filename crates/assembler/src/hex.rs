// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hex text encoding of code units.

use ::hex::FromHexError;

use crate::error::HexError;

/// Lowercase hex without prefix.
pub fn encode(bytes: &[u8]) -> String {
    ::hex::encode(bytes)
}

/// Decode hex text, ignoring whitespace and an optional `0x` prefix.
///
/// Error positions count digits only, after the prefix and whitespace are
/// removed.
pub fn decode(text: &str) -> Result<Vec<u8>, HexError> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    ::hex::decode(&digits).map_err(|error| match error {
        FromHexError::InvalidHexCharacter { c, index } => HexError::InvalidDigit {
            digit: c,
            position: index,
        },
        FromHexError::OddLength | FromHexError::InvalidStringLength => HexError::OddLength {
            digits: digits.len(),
        },
    })
}
