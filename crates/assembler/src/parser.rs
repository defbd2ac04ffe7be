// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! EVM assembly text parser.
//!
//! # Syntax
//!
//! ```text
//! ; comment (also `//`)
//! start:                  ; label, names the offset of what follows
//!     PUSH1 0x02          ; numbers are decimal or 0x-prefixed hex
//!     PUSH2 @sub          ; @label pushes the label's byte offset
//!     JUMPSUB
//!     STOP
//! sub: BEGINSUB 1 1       ; BEGINSUB takes its args and results counts
//!     RETURNSUB
//!     .byte 0xfe 0x00     ; raw bytes
//! ```
//!
//! Operands are separated by whitespace or commas. Mnemonics are
//! case-insensitive.
//!
//! # Two-Phase Parsing
//!
//! 1. **Text parsing** ([`ParsedAssembly::parse`]): Splits input into lines,
//!    identifies labels, directives, and instructions. No validation is done.
//!
//! 2. **Layout** ([`ParsedAssembly::resolve`]): Assigns every instruction its
//!    byte offset, then encodes operands with label references replaced by
//!    those offsets.

use std::collections::HashMap;

use cfg::{ClassifiedOpcode, Flow};

use crate::{error::AssembleError, hex};

/// An instruction laid out at its byte offset with encoded immediates.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedInstruction {
    /// Byte offset in the assembled code.
    pub(crate) offset: usize,
    pub(crate) opcode: &'static ClassifiedOpcode,
    /// Immediate bytes, exactly `opcode.immediate_len` long.
    pub(crate) immediate: Vec<u8>,
}

/// Output of layout: instructions and raw data in source order.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    Instruction(ResolvedInstruction),
    Data(Vec<u8>),
}

impl Resolved {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Resolved::Instruction(instruction) => {
                out.push(instruction.opcode.byte);
                out.extend_from_slice(&instruction.immediate);
            }
            Resolved::Data(bytes) => out.extend_from_slice(bytes),
        }
    }
}

/// The content of an assembly line after any label.
pub(crate) enum Statement<'a> {
    /// An EVM instruction.
    Instruction(UnresolvedInstruction<'a>),
    /// An assembler directive (e.g., `.byte`).
    Directive {
        name: &'a str,
        operands: Vec<&'a str>,
    },
    /// Empty line or label-only.
    Empty,
}

/// An unresolved instruction with operands as raw strings.
///
/// Label references (`@name`) are not yet replaced by offsets.
pub(crate) struct UnresolvedInstruction<'a> {
    /// The mnemonic as written (e.g., "push1", "JUMPSUB").
    pub(crate) mnemonic: &'a str,
    /// Operands as raw strings (e.g., `["@loop"]` or `["2", "1"]`).
    pub(crate) operands: Vec<&'a str>,
}

impl<'a> UnresolvedInstruction<'a> {
    /// Parse an instruction from text (after removing label and comments).
    fn parse(text: &'a str) -> Self {
        let (mnemonic, operands) = split_operands(text);
        Self { mnemonic, operands }
    }
}

/// Split `head rest...` into the first word and the remaining operands.
fn split_operands(text: &str) -> (&str, Vec<&str>) {
    let mut words = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty());
    let head = words.next().unwrap_or("");
    (head, words.collect())
}

/// A parsed line from an assembly file.
pub struct ParsedLine<'a> {
    /// Label defined on this line (e.g., `"loop"` from `"loop:"`).
    pub(crate) label: Option<&'a str>,
    /// The statement on this line.
    pub(crate) statement: Statement<'a>,
    /// Original line number (1-indexed).
    pub(crate) line_number: usize,
}

/// Parsed assembly text, ready for layout.
pub struct ParsedAssembly<'a> {
    lines: Vec<ParsedLine<'a>>,
}

impl<'a> ParsedAssembly<'a> {
    /// Parse assembly text into lines.
    ///
    /// This performs text parsing only. No validation is done on mnemonics
    /// or operands. Labels are not yet resolved to offsets.
    pub fn parse(input: &'a str) -> Self {
        let lines = input
            .lines()
            .enumerate()
            .map(|(idx, text)| Self::parse_line(text, idx + 1))
            .collect();
        Self { lines }
    }

    /// Assemble into bytecode.
    pub fn assemble(&self) -> Result<Vec<u8>, AssembleError> {
        let mut code = Vec::new();
        for item in self.resolve()? {
            item.encode_into(&mut code);
        }
        Ok(code)
    }

    /// Map from label to byte offset.
    pub fn labels(&self) -> Result<HashMap<&'a str, usize>, AssembleError> {
        Ok(self.layout()?.1)
    }

    /// Lay out and encode every line.
    ///
    /// # Errors
    ///
    /// - [`AssembleError::UnknownMnemonic`] / [`AssembleError::UnknownDirective`]
    /// - [`AssembleError::OperandCount`], [`AssembleError::InvalidOperand`],
    ///   [`AssembleError::OperandTooLarge`]
    /// - [`AssembleError::UndefinedLabel`] / [`AssembleError::DuplicateLabel`]
    pub(crate) fn resolve(&self) -> Result<Vec<Resolved>, AssembleError> {
        let (placed, labels) = self.layout()?;

        // Second pass: encode operands now that every label has an offset
        placed
            .into_iter()
            .map(|placed| match placed {
                Placed::Instruction {
                    offset,
                    opcode,
                    operands,
                    line_number,
                } => {
                    let immediate = encode_operands(opcode, &operands, &labels, line_number)?;
                    Ok(Resolved::Instruction(ResolvedInstruction {
                        offset,
                        opcode,
                        immediate,
                    }))
                }
                Placed::Data(bytes) => Ok(Resolved::Data(bytes)),
            })
            .collect()
    }

    /// First pass: classify every statement and assign offsets to labels.
    fn layout(&self) -> Result<(Vec<Placed<'a>>, HashMap<&'a str, usize>), AssembleError> {
        let mut placed = Vec::new();
        let mut labels: HashMap<&'a str, usize> = HashMap::new();
        let mut offset = 0;

        for line in &self.lines {
            if let Some(label) = line.label {
                if labels.insert(label, offset).is_some() {
                    return Err(AssembleError::DuplicateLabel {
                        label: label.to_string(),
                        line: line.line_number,
                    });
                }
            }

            match &line.statement {
                Statement::Empty => {}
                Statement::Directive { name, operands } => {
                    if !name.eq_ignore_ascii_case(".byte") {
                        return Err(AssembleError::UnknownDirective {
                            directive: name.to_string(),
                            line: line.line_number,
                        });
                    }
                    let bytes = operands
                        .iter()
                        .map(|operand| parse_byte(operand, line.line_number))
                        .collect::<Result<Vec<_>, _>>()?;
                    offset += bytes.len();
                    placed.push(Placed::Data(bytes));
                }
                Statement::Instruction(instruction) => {
                    let opcode = ClassifiedOpcode::from_mnemonic(instruction.mnemonic)
                        .ok_or_else(|| AssembleError::UnknownMnemonic {
                            mnemonic: instruction.mnemonic.to_string(),
                            line: line.line_number,
                        })?;
                    let expected = operand_count(opcode);
                    if instruction.operands.len() != expected {
                        return Err(AssembleError::OperandCount {
                            mnemonic: opcode.mnemonic,
                            expected,
                            found: instruction.operands.len(),
                            line: line.line_number,
                        });
                    }
                    placed.push(Placed::Instruction {
                        offset,
                        opcode,
                        operands: instruction.operands.clone(),
                        line_number: line.line_number,
                    });
                    offset += opcode.encoded_len();
                }
            }
        }

        Ok((placed, labels))
    }

    /// Parse a single line of assembly.
    fn parse_line(text: &'a str, line_number: usize) -> ParsedLine<'a> {
        let text = Self::strip_comment(text).trim();
        let (label, rest) = Self::split_label(text);

        let statement = if rest.is_empty() {
            Statement::Empty
        } else if rest.starts_with('.') {
            let (name, operands) = split_operands(rest);
            Statement::Directive { name, operands }
        } else {
            Statement::Instruction(UnresolvedInstruction::parse(rest))
        };

        ParsedLine {
            label,
            statement,
            line_number,
        }
    }

    /// Remove comments from a line.
    ///
    /// Supports: `;` and `//`
    fn strip_comment(line: &str) -> &str {
        let mut end = line.len();
        if let Some(pos) = line.find("//") {
            end = end.min(pos);
        }
        if let Some(pos) = line.find(';') {
            end = end.min(pos);
        }
        &line[..end]
    }

    /// Split a line into optional label and remaining text.
    fn split_label(line: &str) -> (Option<&str>, &str) {
        match Self::find_label_colon(line) {
            Some(colon_pos) => (Some(line[..colon_pos].trim()), line[colon_pos + 1..].trim()),
            None => (None, line),
        }
    }

    /// Find position of label-ending colon.
    ///
    /// Valid label characters: alphanumeric, `_`, `.`, `$`
    fn find_label_colon(line: &str) -> Option<usize> {
        for (pos, c) in line.char_indices() {
            if c == ':' {
                return (pos > 0).then_some(pos);
            }
            if !is_label_char(c) {
                break;
            }
        }
        None
    }
}

/// A statement with its offset assigned but operands not yet encoded.
enum Placed<'a> {
    Instruction {
        offset: usize,
        opcode: &'static ClassifiedOpcode,
        operands: Vec<&'a str>,
        line_number: usize,
    },
    Data(Vec<u8>),
}

fn is_label_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
}

fn operand_count(opcode: &ClassifiedOpcode) -> usize {
    match opcode.flow {
        Flow::BeginSub => 2,
        _ if opcode.is_constant_push && opcode.immediate_len > 0 => 1,
        _ => 0,
    }
}

/// Encode an instruction's operands into its immediate bytes.
fn encode_operands(
    opcode: &'static ClassifiedOpcode,
    operands: &[&str],
    labels: &HashMap<&str, usize>,
    line: usize,
) -> Result<Vec<u8>, AssembleError> {
    if opcode.flow == Flow::BeginSub {
        return operands
            .iter()
            .map(|operand| parse_byte(operand, line))
            .collect();
    }

    let Some(&operand) = operands.first() else {
        return Ok(Vec::new());
    };

    let value = match operand.strip_prefix('@') {
        Some(label) => {
            let target = labels
                .get(label)
                .copied()
                .ok_or_else(|| AssembleError::UndefinedLabel {
                    label: label.to_string(),
                    line,
                })?;
            minimal_be_bytes(&target.to_be_bytes())
        }
        None => parse_number(operand).ok_or_else(|| AssembleError::InvalidOperand {
            operand: operand.to_string(),
            line,
        })?,
    };

    let width = opcode.immediate_len;
    if value.len() > width {
        return Err(AssembleError::OperandTooLarge {
            operand: operand.to_string(),
            width,
            line,
        });
    }

    let mut immediate = vec![0; width - value.len()];
    immediate.extend(value);
    Ok(immediate)
}

/// A single-byte operand.
fn parse_byte(operand: &str, line: usize) -> Result<u8, AssembleError> {
    let value = parse_number(operand).ok_or_else(|| AssembleError::InvalidOperand {
        operand: operand.to_string(),
        line,
    })?;
    match value.as_slice() {
        [] => Ok(0),
        [byte] => Ok(*byte),
        _ => Err(AssembleError::OperandTooLarge {
            operand: operand.to_string(),
            width: 1,
            line,
        }),
    }
}

/// Parse a decimal or `0x` hex number into minimal big-endian bytes.
///
/// Hex literals may be up to 32 bytes; decimal literals up to `u128`.
fn parse_number(text: &str) -> Option<Vec<u8>> {
    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if digits.is_empty() || digits.chars().any(char::is_whitespace) {
            return None;
        }
        let padded = if digits.len() % 2 == 0 {
            digits.to_string()
        } else {
            format!("0{digits}")
        };
        let bytes = hex::decode(&padded).ok()?;
        let bytes = minimal_be_bytes(&bytes);
        return (bytes.len() <= 32).then_some(bytes);
    }

    let value: u128 = text.parse().ok()?;
    Some(minimal_be_bytes(&value.to_be_bytes()))
}

fn minimal_be_bytes(bytes: &[u8]) -> Vec<u8> {
    let first = bytes
        .iter()
        .position(|&byte| byte != 0)
        .unwrap_or(bytes.len());
    bytes[first..].to_vec()
}
