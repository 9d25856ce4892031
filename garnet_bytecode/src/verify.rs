//! Assembly listing verification.
//!
//! Matches a decoded instruction stream against a human-readable listing,
//! one instruction per non-blank line:
//!
//! ```text
//! [lineno] [offset] OPNAME [index [ '(' value ')' ]]
//! ```
//!
//! Only the fields present in a line are asserted; absent fields are
//! wildcards. A single leading number is a line number and is ignored;
//! with two leading numbers the second is the byte offset and is checked.
//! The listing may stop before the instruction stream does: partial
//! verification is how a code generator is grown test-first.

use crate::code_object::CodeObject;
use crate::cursor::DecodedInstr;
use garnet_core::{GarnetError, GarnetResult, Value};

/// One parsed listing line.
#[derive(Debug)]
struct AsmLine<'a> {
    offset: Option<usize>,
    opcode: &'a str,
    index: Option<u32>,
    value: Option<&'a str>,
}

impl CodeObject {
    /// Check the decoded instruction stream against `listing`.
    ///
    /// Fails with [`GarnetError::AssemblyMismatch`] on the first field
    /// disagreement, naming the listing line and both values, or with
    /// [`GarnetError::UnexpectedEndOfStream`] if the listing outruns the
    /// bytecode. Lines beyond the end of the listing are not required.
    pub fn check_assembly(&self, listing: &str) -> GarnetResult<()> {
        let mut cursor = self.cursor();
        for raw in listing.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let asm = parse_line(line).ok_or_else(|| GarnetError::listing_syntax(line))?;
            let instr = match cursor.next() {
                Some(decoded) => decoded?,
                None => {
                    return Err(GarnetError::UnexpectedEndOfStream {
                        line: line.to_string(),
                    });
                }
            };
            check_fields(line, &asm, &instr)?;
        }
        Ok(())
    }
}

/// Parse one non-blank listing line, or `None` if it is malformed.
fn parse_line(line: &str) -> Option<AsmLine<'_>> {
    // Split off the parenthesized value first; it may contain spaces.
    let (head, value) = match line.find('(') {
        Some(open) => {
            let close = line[open..].find(')')? + open;
            if !line[close + 1..].trim().is_empty() {
                return None;
            }
            (&line[..open], Some(&line[open + 1..close]))
        }
        None => (line, None),
    };

    let mut toks = head.split_whitespace().peekable();

    // Up to two leading integers: [lineno] then [offset].
    let mut leading: Vec<usize> = Vec::new();
    while leading.len() < 2 {
        match toks.peek() {
            Some(t) if t.bytes().all(|b| b.is_ascii_digit()) => {
                leading.push(toks.next()?.parse().ok()?);
            }
            _ => break,
        }
    }

    let opcode = toks.next()?;
    let mut chars = opcode.chars();
    if !chars.next()?.is_ascii_uppercase()
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    let index = match toks.next() {
        Some(t) => Some(t.parse::<u32>().ok()?),
        None => None,
    };
    if toks.next().is_some() {
        return None;
    }
    // The grammar nests the value inside the index field.
    if value.is_some() && index.is_none() {
        return None;
    }

    // A single leading number is a line number; only the second is an offset.
    let offset = if leading.len() == 2 {
        Some(leading[1])
    } else {
        None
    };

    Some(AsmLine {
        offset,
        opcode,
        index,
        value,
    })
}

/// Assert every field the line supplies against the decoded instruction.
fn check_fields(line: &str, asm: &AsmLine<'_>, instr: &DecodedInstr) -> GarnetResult<()> {
    if let Some(offset) = asm.offset {
        if offset != instr.offset {
            return Err(GarnetError::mismatch(
                line,
                format!("offset {offset}"),
                format!("offset {}", instr.offset),
            ));
        }
    }

    if asm.opcode != instr.opcode.name() {
        return Err(GarnetError::mismatch(line, asm.opcode, instr.opcode.name()));
    }

    if let Some(index) = asm.index {
        if instr.index != Some(index) {
            let actual = match instr.index {
                Some(i) => format!("index {i}"),
                None => "no operand".to_string(),
            };
            return Err(GarnetError::mismatch(line, format!("index {index}"), actual));
        }
    }

    if let Some(text) = asm.value {
        let Some(actual) = &instr.value else {
            return Err(GarnetError::mismatch(
                line,
                format!("({text})"),
                "no resolvable operand value",
            ));
        };
        check_value(line, text, actual)?;
    }

    Ok(())
}

/// Compare listing text against a resolved operand value.
///
/// Quoted text compares as string equality; unquoted text is converted to
/// the resolved value's type before comparing.
fn check_value(line: &str, text: &str, actual: &Value) -> GarnetResult<()> {
    if let Some(inner) = strip_quotes(text) {
        return match actual.as_str() {
            Some(s) if s == inner => Ok(()),
            _ => Err(GarnetError::mismatch(
                line,
                format!("'{inner}'"),
                actual.to_string(),
            )),
        };
    }

    match actual.coerce_from_text(text) {
        Some(expected) if expected == *actual => Ok(()),
        _ => Err(GarnetError::mismatch(line, text, actual.to_string())),
    }
}

fn strip_quotes(text: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if let Some(rest) = text.strip_prefix(quote) {
            return Some(rest.strip_suffix(quote).unwrap_or(rest));
        }
    }
    None
}
