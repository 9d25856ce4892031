//! Restartable decoding cursor over an encoded instruction stream.
//!
//! Decoding is a pure function of the byte stream and the symbol tables:
//! a cursor never mutates the code object, so any number of cursors may
//! walk a finalized object concurrently, and iterating twice from the
//! same offset yields identical results.

use crate::code_object::CodeObject;
use crate::opcodes::{CMP_OPS, Opcode, OperandKind};
use garnet_core::{GarnetError, GarnetResult, Value};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInstr {
    /// Byte offset where the instruction begins, including any
    /// `EXTENDED_ARG` prefix folded into it.
    pub offset: usize,
    /// The decoded opcode.
    pub opcode: Opcode,
    /// Operand index, for operand-carrying opcodes.
    pub index: Option<u32>,
    /// Operand value resolved through the matching symbol table, for
    /// table-backed categories.
    pub value: Option<Value>,
}

/// A forward-only cursor producing [`DecodedInstr`]s.
///
/// Constructed by [`CodeObject::cursor`] (or `cursor_at` for an arbitrary
/// starting offset). With extension folding enabled, `EXTENDED_ARG`
/// prefixes are merged into the following instruction's operand and never
/// surfaced; a raw cursor surfaces them as ordinary instructions.
pub struct OpcodeCursor<'a> {
    co: &'a CodeObject,
    pos: usize,
    extend_args: bool,
}

impl CodeObject {
    /// Cursor over the whole byte stream, folding `EXTENDED_ARG` prefixes.
    #[must_use]
    pub fn cursor(&self) -> OpcodeCursor<'_> {
        self.cursor_at(0)
    }

    /// Cursor starting at `offset`, folding `EXTENDED_ARG` prefixes.
    #[must_use]
    pub fn cursor_at(&self, offset: usize) -> OpcodeCursor<'_> {
        OpcodeCursor {
            co: self,
            pos: offset,
            extend_args: true,
        }
    }

    /// Cursor over the whole byte stream that surfaces `EXTENDED_ARG`
    /// instructions instead of folding them.
    #[must_use]
    pub fn raw_cursor(&self) -> OpcodeCursor<'_> {
        OpcodeCursor {
            co: self,
            pos: 0,
            extend_args: false,
        }
    }
}

impl<'a> OpcodeCursor<'a> {
    /// Byte offset of the next instruction to decode.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn decode_one(&mut self) -> GarnetResult<DecodedInstr> {
        let code = self.co.code();
        let start = self.pos;

        let mut extended: u64 = 0;
        let mut opnum = code[self.pos];
        self.pos += 1;
        if self.extend_args {
            while opnum == Opcode::ExtendedArg as u8 {
                let chunk = self.read_operand(start)?;
                extended = (extended << 16) | u64::from(chunk);
                opnum = *code
                    .get(self.pos)
                    .ok_or(GarnetError::TruncatedStream { offset: start })?;
                self.pos += 1;
            }
        }

        let opcode = Opcode::from_u8(opnum).ok_or_else(|| GarnetError::unknown_code(opnum))?;
        if !opcode.takes_operand() {
            return Ok(DecodedInstr {
                offset: start,
                opcode,
                index: None,
                value: None,
            });
        }

        let low = self.read_operand(start)?;
        let merged = (extended << 16) | u64::from(low);
        let index = u32::try_from(merged)
            .map_err(|_| GarnetError::OperandOverflow { offset: start })?;
        let value = self.resolve_value(opcode, index);
        Ok(DecodedInstr {
            offset: start,
            opcode,
            index: Some(index),
            value,
        })
    }

    /// Read the two little-endian operand bytes of the current instruction.
    fn read_operand(&mut self, start: usize) -> GarnetResult<u16> {
        let code = self.co.code();
        if self.pos + 2 > code.len() {
            return Err(GarnetError::TruncatedStream { offset: start });
        }
        let operand = u16::from_le_bytes([code[self.pos], code[self.pos + 1]]);
        self.pos += 2;
        Ok(operand)
    }

    /// Resolve an operand index to its value through the table matching
    /// the opcode's category. Indices outside the table resolve to `None`
    /// rather than failing.
    fn resolve_value(&self, opcode: Opcode, index: u32) -> Option<Value> {
        let index = index as usize;
        match opcode.operand_kind() {
            OperandKind::Const => self.co.consts().get(index).cloned(),
            OperandKind::Name => self.co.names().get(index).map(|s| Value::Str(s.clone())),
            OperandKind::Local => self.co.locals().get(index).map(|s| Value::Str(s.clone())),
            OperandKind::CellOrFree => {
                let cells = self.co.cellvars();
                if index < cells.len() {
                    Some(Value::Str(cells[index].clone()))
                } else {
                    self.co
                        .freevars()
                        .get(index - cells.len())
                        .map(|s| Value::Str(s.clone()))
                }
            }
            OperandKind::Compare => CMP_OPS.get(index).map(|c| Value::str(*c)),
            _ => None,
        }
    }
}

impl Iterator for OpcodeCursor<'_> {
    type Item = GarnetResult<DecodedInstr>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.co.code().len() {
            return None;
        }
        let decoded = self.decode_one();
        if decoded.is_err() {
            // A malformed stream has no recoverable framing; stop here.
            self.pos = self.co.code().len();
        }
        Some(decoded)
    }
}
