//! Code object construction: instruction encoding, symbol interning, and
//! the deferred-fixup pass.
//!
//! A [`CodeObject`] is built by appending one symbolic instruction at a
//! time. Each append resolves the raw operand into a small operand index
//! through the table matching the opcode's category, then emits the opcode
//! byte plus a 16-bit little-endian operand, escaping wider operands with
//! `EXTENDED_ARG` prefixes. Operands whose final value cannot be known
//! until the whole stream exists (free-variable slots, jump targets) are
//! written as placeholders and rewritten in place by [`CodeObject::finalize`].

use crate::opcodes::{CMP_OPS, Opcode, OperandKind};
use garnet_core::{GarnetError, GarnetResult, Value};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, trace};

/// Relative jumps span one opcode byte plus two operand bytes.
const INSTR_WIDTH: usize = 3;

/// Largest value a 16-bit operand field can hold.
const MAX_OPERAND: u32 = 0xFFFF;

/// A jump target created by [`CodeObject::new_label`].
///
/// Labels are opaque ids; they become concrete code offsets when bound
/// with [`CodeObject::bind_label`], and jumps referencing them are patched
/// during finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

/// A raw operand as supplied by the caller of [`CodeObject::append_arg`].
///
/// The encoder checks the variant against the opcode's category: constants
/// take a [`Value`], symbol-table categories take a name, jumps take a
/// [`Label`], and verbatim-count categories take a count.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A literal for the constant pool.
    Const(Value),
    /// A symbolic identifier or comparison operator.
    Name(Arc<str>),
    /// A jump target.
    Label(Label),
    /// A verbatim count (call arity, container length, extension bits).
    Count(u32),
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Self::Const(v)
    }
}

impl From<i64> for Operand {
    fn from(i: i64) -> Self {
        Self::Const(Value::Int(i))
    }
}

impl From<i32> for Operand {
    fn from(i: i32) -> Self {
        Self::Const(Value::Int(i64::from(i)))
    }
}

impl From<f64> for Operand {
    fn from(x: f64) -> Self {
        Self::Const(Value::Float(x))
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Self::Const(Value::Bool(b))
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Self::Name(Arc::from(s))
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Self::Name(Arc::from(s))
    }
}

impl From<Label> for Operand {
    fn from(l: Label) -> Self {
        Self::Label(l)
    }
}

impl From<u32> for Operand {
    fn from(n: u32) -> Self {
        Self::Count(n)
    }
}

/// Key type for constant deduplication.
///
/// Floats are keyed by bit pattern so that equal constants collapse to one
/// pool entry without running afoul of NaN equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
}

impl ConstKey {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::None => ConstKey::None,
            Value::Bool(b) => ConstKey::Bool(*b),
            Value::Int(i) => ConstKey::Int(*i),
            Value::Float(x) => ConstKey::Float(x.to_bits()),
            Value::Str(s) => ConstKey::Str(s.clone()),
        }
    }
}

/// An assembled code object for the Garnet stack machine.
///
/// Lifecycle: created empty and mutable, grown by sequential appends,
/// sealed by [`finalize`](Self::finalize). After finalization the object
/// is immutable and may be shared freely for decoding and verification;
/// further appends fail with [`GarnetError::NotModifiable`].
#[derive(Debug, Clone)]
pub struct CodeObject {
    /// Encoded instruction stream.
    code: Vec<u8>,
    /// Constant pool; slot 0 is always `Value::None`.
    consts: Vec<Value>,
    /// Constant deduplication map.
    const_map: FxHashMap<ConstKey, u32>,
    /// Global/attribute names.
    names: Vec<Arc<str>>,
    /// Name to index map.
    name_map: FxHashMap<Arc<str>, u32>,
    /// Local variable names.
    locals: Vec<Arc<str>>,
    /// Local name to slot map.
    local_map: FxHashMap<Arc<str>, u32>,
    /// Cell variable names (captured by nested scopes).
    cellvars: Vec<Arc<str>>,
    /// Free variable names (captured from enclosing scopes).
    freevars: Vec<Arc<str>>,
    /// Byte offsets of instructions whose operand awaits the fixup pass.
    pending_fixups: SmallVec<[u32; 8]>,
    /// Label id to bound code offset.
    labels: Vec<Option<u32>>,
    /// Set once by `finalize`; one-way.
    finalized: bool,
}

impl CodeObject {
    /// Create a new empty code object.
    ///
    /// The constant pool starts with the reserved `None` sentinel at
    /// index 0.
    #[must_use]
    pub fn new() -> Self {
        let mut co = Self {
            code: Vec::new(),
            consts: vec![Value::None],
            const_map: FxHashMap::default(),
            names: Vec::new(),
            name_map: FxHashMap::default(),
            locals: Vec::new(),
            local_map: FxHashMap::default(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            pending_fixups: SmallVec::new(),
            labels: Vec::new(),
            finalized: false,
        };
        co.const_map.insert(ConstKey::None, 0);
        co
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    /// The encoded byte stream.
    #[inline]
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The constant pool.
    #[inline]
    #[must_use]
    pub fn consts(&self) -> &[Value] {
        &self.consts
    }

    /// The name table.
    #[inline]
    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    /// The local variable table.
    #[inline]
    #[must_use]
    pub fn locals(&self) -> &[Arc<str>] {
        &self.locals
    }

    /// The cell variable table.
    #[inline]
    #[must_use]
    pub fn cellvars(&self) -> &[Arc<str>] {
        &self.cellvars
    }

    /// The free variable table.
    #[inline]
    #[must_use]
    pub fn freevars(&self) -> &[Arc<str>] {
        &self.freevars
    }

    /// Whether `finalize` has completed.
    #[inline]
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Byte offset where the next instruction will be emitted.
    #[inline]
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Declare a cell variable, returning its slot in the cellvar table.
    ///
    /// Cell variables are declared by the scope analysis of the caller;
    /// re-declaring an existing name returns the existing slot.
    pub fn declare_cellvar(&mut self, name: impl Into<Arc<str>>) -> GarnetResult<u32> {
        if self.finalized {
            return Err(GarnetError::NotModifiable);
        }
        let name = name.into();
        if let Some(i) = self.cellvars.iter().position(|c| **c == *name) {
            return Ok(i as u32);
        }
        self.cellvars.push(name);
        if self.cellvars.len() + self.freevars.len() > MAX_OPERAND as usize {
            return Err(GarnetError::TooManyCellVars);
        }
        Ok((self.cellvars.len() - 1) as u32)
    }

    /// Declare a local variable, returning its slot in the locals table.
    ///
    /// Parameters are declared first so they occupy the leading slots.
    /// Re-declaring an existing name returns the existing slot.
    pub fn declare_local(&mut self, name: impl Into<Arc<str>>) -> GarnetResult<u32> {
        if self.finalized {
            return Err(GarnetError::NotModifiable);
        }
        Ok(self.intern_local(name.into()))
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Create a fresh, unbound jump label.
    pub fn new_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Bind `label` to the current code offset.
    ///
    /// Rebinding moves the label; jumps are resolved against the binding
    /// in effect when `finalize` runs.
    pub fn bind_label(&mut self, label: Label) -> GarnetResult<()> {
        if self.finalized {
            return Err(GarnetError::NotModifiable);
        }
        let offset = self.code.len() as u32;
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(GarnetError::UnboundLabel { id: label.0 })?;
        *slot = Some(offset);
        Ok(())
    }

    // =========================================================================
    // Encoder
    // =========================================================================

    /// Append an instruction that takes no operand.
    pub fn append(&mut self, name: &str) -> GarnetResult<()> {
        self.push_instr(name, None)
    }

    /// Append an instruction with its raw operand.
    ///
    /// The operand is resolved into an operand index through the table
    /// matching the opcode's category; see [`Operand`] for the accepted
    /// shapes.
    pub fn append_arg(&mut self, name: &str, operand: impl Into<Operand>) -> GarnetResult<()> {
        self.push_instr(name, Some(operand.into()))
    }

    fn push_instr(&mut self, name: &str, operand: Option<Operand>) -> GarnetResult<()> {
        let op = Opcode::from_name(name).ok_or_else(|| GarnetError::unknown_opcode(name))?;
        if self.finalized {
            return Err(GarnetError::NotModifiable);
        }
        match (op.takes_operand(), operand) {
            (false, None) => {
                self.emit(op as u8, None);
                Ok(())
            }
            (false, Some(_)) => Err(GarnetError::arity(op.name(), "takes no operand")),
            (true, None) => Err(GarnetError::arity(op.name(), "requires an operand")),
            (true, Some(operand)) => {
                let index = self.resolve_operand(op, operand)?;
                self.emit(op as u8, Some(index));
                Ok(())
            }
        }
    }

    /// Resolve a raw operand into its operand index, growing tables and
    /// recording fixups as the category requires.
    fn resolve_operand(&mut self, op: Opcode, operand: Operand) -> GarnetResult<u32> {
        match op.operand_kind() {
            OperandKind::Const => {
                let value = match operand {
                    Operand::Const(v) => v,
                    // Bare name operands are accepted as string literals.
                    Operand::Name(s) => Value::Str(s),
                    _ => return Err(GarnetError::arity(op.name(), "requires a literal value")),
                };
                Ok(self.intern_const(value))
            }
            OperandKind::Name => {
                let name = Self::expect_name(op, operand)?;
                Ok(self.intern_name(name))
            }
            OperandKind::Local => {
                let name = Self::expect_name(op, operand)?;
                Ok(self.intern_local(name))
            }
            OperandKind::Compare => {
                let name = Self::expect_name(op, operand)?;
                CMP_OPS
                    .iter()
                    .position(|c| *c == &*name)
                    .map(|i| i as u32)
                    .ok_or_else(|| {
                        GarnetError::arity(
                            op.name(),
                            format!("requires a comparison operator like '<=', got '{name}'"),
                        )
                    })
            }
            OperandKind::CellOrFree => {
                let name = Self::expect_name(op, operand)?;
                self.find_cell_or_free(name)
            }
            OperandKind::AbsJump | OperandKind::RelJump => {
                let label = match operand {
                    Operand::Label(l) => l,
                    _ => return Err(GarnetError::arity(op.name(), "requires a jump label")),
                };
                if label.0 > MAX_OPERAND {
                    return Err(GarnetError::jump_range(
                        self.code.len(),
                        format!("label id {} exceeds the 16-bit placeholder field", label.0),
                    ));
                }
                self.pending_fixups.push(self.code.len() as u32);
                Ok(label.0)
            }
            OperandKind::Arity => match operand {
                Operand::Count(n) => Ok(n),
                Operand::Const(Value::Int(n)) if n >= 0 => Ok(n as u32),
                _ => Err(GarnetError::arity(op.name(), "requires a non-negative count")),
            },
            OperandKind::None => unreachable!("handled by the caller"),
        }
    }

    fn expect_name(op: Opcode, operand: Operand) -> GarnetResult<Arc<str>> {
        match operand {
            Operand::Name(s) => Ok(s),
            Operand::Const(Value::Str(s)) => Ok(s),
            _ => Err(GarnetError::arity(op.name(), "requires an identifier")),
        }
    }

    fn intern_const(&mut self, value: Value) -> u32 {
        let key = ConstKey::from_value(&value);
        if let Some(&idx) = self.const_map.get(&key) {
            return idx;
        }
        let idx = self.consts.len() as u32;
        self.consts.push(value);
        self.const_map.insert(key, idx);
        idx
    }

    fn intern_name(&mut self, name: Arc<str>) -> u32 {
        if let Some(&idx) = self.name_map.get(&name) {
            return idx;
        }
        let idx = self.names.len() as u32;
        self.name_map.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    fn intern_local(&mut self, name: Arc<str>) -> u32 {
        if let Some(&idx) = self.local_map.get(&name) {
            return idx;
        }
        let idx = self.locals.len() as u32;
        self.local_map.insert(name.clone(), idx);
        self.locals.push(name);
        idx
    }

    /// Find the slot for `name` in the cell or free variable tables.
    ///
    /// A cellvar hit resolves immediately. Anything else lands in the
    /// freevar table (appended on first use) and is encoded as a biased
    /// placeholder, `0xFFFF - tentative_index`, with the instruction's
    /// offset recorded for the fixup pass: the final combined slot depends
    /// on the cellvar count, which is only known once the caller has
    /// declared the full set.
    fn find_cell_or_free(&mut self, name: Arc<str>) -> GarnetResult<u32> {
        if let Some(i) = self.cellvars.iter().position(|c| **c == *name) {
            trace!(name = %name, slot = i, "cell variable hit");
            return Ok(i as u32);
        }
        let index = match self.freevars.iter().position(|f| **f == *name) {
            Some(i) => i,
            None => {
                trace!(name = %name, index = self.freevars.len(), "new free variable");
                self.freevars.push(name);
                self.freevars.len() - 1
            }
        };
        if self.cellvars.len() + self.freevars.len() > MAX_OPERAND as usize {
            return Err(GarnetError::TooManyCellVars);
        }
        self.pending_fixups.push(self.code.len() as u32);
        Ok(MAX_OPERAND - index as u32)
    }

    /// Emit one instruction into the byte stream.
    ///
    /// Operand indices wider than 16 bits are escaped with a preceding
    /// `EXTENDED_ARG` carrying the high bits; the recursion chains for
    /// operands needing more than one extension.
    fn emit(&mut self, code: u8, arg: Option<u32>) {
        match arg {
            Some(mut arg) => {
                if arg > MAX_OPERAND {
                    self.emit(Opcode::ExtendedArg as u8, Some(arg >> 16));
                    arg &= MAX_OPERAND;
                }
                self.code.push(code);
                self.code.push((arg & 0xFF) as u8);
                self.code.push((arg >> 8) as u8);
            }
            None => self.code.push(code),
        }
    }

    // =========================================================================
    // Fixup engine
    // =========================================================================

    /// Resolve all deferred operands and seal the code object.
    ///
    /// Idempotent: a second call is a no-op. Fixups are processed in
    /// reverse append order, since a later free-variable reference can
    /// grow the tables an earlier reference's slot depends on. On success
    /// the object becomes permanently immutable.
    pub fn finalize(&mut self) -> GarnetResult<()> {
        if self.finalized {
            return Ok(());
        }
        debug!(fixups = self.pending_fixups.len(), "running fixup pass");
        for k in (0..self.pending_fixups.len()).rev() {
            let offset = self.pending_fixups[k] as usize;
            self.apply_fixup(offset)?;
        }
        self.finalized = true;
        Ok(())
    }

    fn apply_fixup(&mut self, offset: usize) -> GarnetResult<()> {
        let op = Opcode::from_u8(self.code[offset])
            .ok_or_else(|| GarnetError::unknown_code(self.code[offset]))?;
        let placeholder =
            u32::from(u16::from_le_bytes([self.code[offset + 1], self.code[offset + 2]]));
        match op.operand_kind() {
            OperandKind::CellOrFree => {
                let slot = self.cellvars.len() as u32 + MAX_OPERAND - placeholder;
                if slot > MAX_OPERAND {
                    return Err(GarnetError::TooManyCellVars);
                }
                trace!(offset, placeholder, slot, "free variable slot resolved");
                self.patch_operand(offset, slot as u16);
            }
            OperandKind::AbsJump => {
                let target = self.label_target(placeholder)?;
                if target > MAX_OPERAND {
                    return Err(GarnetError::jump_range(
                        offset,
                        format!("target {target} requires EXTENDED_ARG"),
                    ));
                }
                trace!(offset, target, "absolute jump resolved");
                self.patch_operand(offset, target as u16);
            }
            OperandKind::RelJump => {
                let target = i64::from(self.label_target(placeholder)?);
                let delta = target - (offset + INSTR_WIDTH) as i64;
                if !(0..=i64::from(MAX_OPERAND)).contains(&delta) {
                    return Err(GarnetError::jump_range(
                        offset,
                        format!("delta {delta} is not encodable in 16 bits"),
                    ));
                }
                trace!(offset, target, delta, "relative jump resolved");
                self.patch_operand(offset, delta as u16);
            }
            // Only the deferred categories ever record fixups.
            _ => {}
        }
        Ok(())
    }

    fn label_target(&self, id: u32) -> GarnetResult<u32> {
        self.labels
            .get(id as usize)
            .copied()
            .flatten()
            .ok_or(GarnetError::UnboundLabel { id })
    }

    fn patch_operand(&mut self, offset: usize, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.code[offset + 1] = lo;
        self.code[offset + 2] = hi;
    }
}

impl Default for CodeObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassemble a code object into a textual listing.
///
/// The listing shows the symbol tables followed by one line per decoded
/// instruction; the instruction lines re-verify against the same code
/// object through [`CodeObject::check_assembly`].
#[must_use]
pub fn disassemble(co: &CodeObject) -> String {
    let mut out = String::new();

    writeln!(out, "Code object: {} bytes", co.code().len()).unwrap();

    if !co.consts().is_empty() {
        writeln!(out, "\nConstants:").unwrap();
        for (i, c) in co.consts().iter().enumerate() {
            writeln!(out, "  {i:4}: {c}").unwrap();
        }
    }
    for (title, table) in [
        ("Names", co.names()),
        ("Locals", co.locals()),
        ("Cellvars", co.cellvars()),
        ("Freevars", co.freevars()),
    ] {
        if !table.is_empty() {
            writeln!(out, "\n{title}:").unwrap();
            for (i, n) in table.iter().enumerate() {
                writeln!(out, "  {i:4}: {n}").unwrap();
            }
        }
    }

    writeln!(out, "\nDisassembly:").unwrap();
    for decoded in co.cursor() {
        match decoded {
            Ok(instr) => {
                let name = instr.opcode.name();
                match (instr.index, &instr.value) {
                    (Some(index), Some(value)) => {
                        writeln!(out, "  {:5} {:<20} {:5} ({})", instr.offset, name, index, value)
                            .unwrap();
                    }
                    (Some(index), None) => {
                        writeln!(out, "  {:5} {:<20} {:5}", instr.offset, name, index).unwrap();
                    }
                    _ => writeln!(out, "  {:5} {}", instr.offset, name).unwrap(),
                }
            }
            Err(e) => {
                writeln!(out, "  <{e}>").unwrap();
                break;
            }
        }
    }

    out
}
