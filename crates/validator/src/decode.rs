//! EVM instruction decoding
//!
//! Instructions are decoded on demand at an offset. Immediate bytes are
//! never interpreted as opcodes.

use std::fmt;

use cfg::{ClassifiedOpcode, Flow, InstructionInfo};

use crate::error::DecodeError;

/// A decoded instruction borrowing its immediate bytes from the code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Offset of the opcode byte
    pub offset: usize,
    opcode: &'static ClassifiedOpcode,
    immediate: &'a [u8],
}

impl<'a> Instruction<'a> {
    /// Returns the immediate bytes following the opcode
    pub fn immediate(&self) -> &'a [u8] {
        self.immediate
    }

    /// The literal pushed by `PUSH0`..`PUSH32`, None for other instructions
    pub fn literal(&self) -> Option<Literal<'a>> {
        self.opcode
            .is_constant_push
            .then_some(Literal(self.immediate))
    }

    /// `(args, results)` declared by a `BEGINSUB`
    pub fn subroutine_arity(&self) -> Option<(usize, usize)> {
        match (self.opcode.flow, self.immediate) {
            (Flow::BeginSub, &[args, results]) => Some((args as usize, results as usize)),
            _ => None,
        }
    }
}

impl InstructionInfo for Instruction<'_> {
    fn opcode(&self) -> &'static ClassifiedOpcode {
        self.opcode
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        if let Some(literal) = self.literal().filter(|literal| !literal.0.is_empty()) {
            write!(f, " {literal}")?;
        } else if let Some((args, results)) = self.subroutine_arity() {
            write!(f, " {args} {results}")?;
        }
        Ok(())
    }
}

/// Big-endian literal carried by a constant push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal<'a>(&'a [u8]);

impl<'a> Literal<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }

    /// The value as a code offset, or None if it does not fit in `usize`
    pub fn to_offset(&self) -> Option<usize> {
        let significant = match self.0.iter().position(|&byte| byte != 0) {
            Some(first) => &self.0[first..],
            None => return Some(0),
        };
        if significant.len() > size_of::<usize>() {
            return None;
        }
        Some(
            significant
                .iter()
                .fold(0usize, |value, &byte| (value << 8) | byte as usize),
        )
    }
}

impl fmt::Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        if self.0.is_empty() {
            return write!(f, "0");
        }
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Decode the instruction at `offset`.
///
/// Returns the instruction and the offset of the next one.
pub fn decode(code: &[u8], offset: usize) -> Result<(Instruction<'_>, usize), DecodeError> {
    let byte = *code.get(offset).ok_or(DecodeError::OutOfBounds {
        offset,
        len: code.len(),
    })?;
    let opcode =
        ClassifiedOpcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { offset, byte })?;

    let start = offset + 1;
    let immediate = code
        .get(start..start + opcode.immediate_len)
        .ok_or(DecodeError::Truncated {
            offset,
            mnemonic: opcode.mnemonic,
            expected: opcode.immediate_len,
            available: code.len() - start,
        })?;

    let instruction = Instruction {
        offset,
        opcode,
        immediate,
    };
    Ok((instruction, instruction.next_offset()))
}

/// Linear decode from offset 0, yielding each instruction or decode failure.
///
/// An unknown byte is reported and skipped as a one-byte instruction; a
/// truncated immediate is reported and ends the sequence.
pub fn instructions(code: &[u8]) -> Instructions<'_> {
    Instructions { code, offset: 0 }
}

/// Iterator returned by [`instructions`]
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.code.len() {
            return None;
        }
        match decode(self.code, self.offset) {
            Ok((instruction, next)) => {
                self.offset = next;
                Some(Ok(instruction))
            }
            Err(error) => {
                self.offset = match error {
                    DecodeError::UnknownOpcode { offset, .. } => offset + 1,
                    DecodeError::OutOfBounds { .. } | DecodeError::Truncated { .. } => {
                        self.code.len()
                    }
                };
                Some(Err(error))
            }
        }
    }
}

/// Offsets that begin an instruction when decoding linearly from 0.
///
/// Only these offsets may be jump or call destinations; a marker byte inside
/// push data is not a destination.
#[derive(Debug, Clone)]
pub struct InstructionBoundaries {
    starts: Vec<bool>,
}

impl InstructionBoundaries {
    pub fn scan(code: &[u8]) -> Self {
        let mut starts = vec![false; code.len()];
        for item in instructions(code) {
            let offset = match item {
                Ok(instruction) => instruction.offset,
                Err(error) => error.offset(),
            };
            starts[offset] = true;
        }
        Self { starts }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.starts.get(offset).copied().unwrap_or(false)
    }

    /// Boundary offsets holding a `BEGINSUB`, in ascending order
    pub fn subroutine_entries<'a>(&'a self, code: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        self.starts
            .iter()
            .enumerate()
            .filter(|&(_, &start)| start)
            .map(|(offset, _)| offset)
            .filter(move |&offset| {
                ClassifiedOpcode::from_byte(code[offset])
                    .is_some_and(|opcode| opcode.flow == Flow::BeginSub)
            })
    }
}
