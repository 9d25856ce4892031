//! Static opcode catalog for the Garnet stack machine.
//!
//! The catalog is the single source of truth consulted by both the encoder
//! and the decoder: every opcode carries its numeric code, symbolic name,
//! and operand-resolution category. Keeping the mapping in one place
//! guarantees the two stay symmetric.
//!
//! Opcodes are organized by block:
//! - 0x00-0x1F: stack manipulation, unary/binary operators (no operand)
//! - 0x20-0x27: constant loads
//! - 0x28-0x2F: name-table operations
//! - 0x30-0x37: local-slot operations
//! - 0x38-0x3F: cell/free variable operations
//! - 0x40-0x47: comparisons
//! - 0x48-0x57: jumps
//! - 0x58-0x5F: calls and container builds (verbatim count operand)
//! - 0x7F:      extended-argument escape

/// Operand-resolution strategy for an opcode.
///
/// The category decides how the encoder turns a raw operand into an
/// operand index and how the decoder turns that index back into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand bytes follow the opcode.
    None,
    /// Operand indexes the constant pool, deduplicated by value.
    Const,
    /// Operand indexes the name table.
    Name,
    /// Operand indexes the local-variable table.
    Local,
    /// Operand indexes cell variables then free variables; final slot is
    /// deferred to the fixup pass.
    CellOrFree,
    /// Operand indexes the fixed comparison-operator table.
    Compare,
    /// Operand is a label resolved to an absolute code offset at fixup.
    AbsJump,
    /// Operand is a label resolved to a forward byte delta at fixup.
    RelJump,
    /// Operand is used verbatim, with no table behind it.
    Arity,
}

/// The fixed comparison-operator table indexed by `COMPARE_OP`.
pub static CMP_OPS: &[&str] = &[
    "<", "<=", "==", "!=", ">", ">=", "in", "not in", "is", "is not",
];

/// Opcode enumeration for the Garnet stack machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // =========================================================================
    // Stack manipulation and operators (no operand)
    // =========================================================================
    /// No operation.
    Nop = 0x00,
    /// Pop top of stack.
    PopTop = 0x01,
    /// Duplicate top of stack.
    DupTop = 0x02,
    /// Swap the two top stack entries.
    RotTwo = 0x03,
    /// Rotate the three top stack entries.
    RotThree = 0x04,
    /// Arithmetic negation of top of stack.
    UnaryNegative = 0x05,
    /// Logical negation of top of stack.
    UnaryNot = 0x06,
    /// tos = tos1 + tos.
    BinaryAdd = 0x10,
    /// tos = tos1 - tos.
    BinarySubtract = 0x11,
    /// tos = tos1 * tos.
    BinaryMultiply = 0x12,
    /// tos = tos1 / tos.
    BinaryDivide = 0x13,
    /// tos = tos1 % tos.
    BinaryModulo = 0x14,
    /// tos = tos1 ** tos.
    BinaryPower = 0x15,
    /// Return top of stack to the caller.
    ReturnValue = 0x1E,

    // =========================================================================
    // Constants
    // =========================================================================
    /// Push consts\[operand\].
    LoadConst = 0x20,

    // =========================================================================
    // Names
    // =========================================================================
    /// Push the binding of names\[operand\].
    LoadName = 0x28,
    /// Bind names\[operand\] to top of stack.
    StoreName = 0x29,
    /// Unbind names\[operand\].
    DeleteName = 0x2A,
    /// Push the module-level binding of names\[operand\].
    LoadGlobal = 0x2B,
    /// Bind names\[operand\] at module level.
    StoreGlobal = 0x2C,
    /// Push getattr(tos, names\[operand\]).
    LoadAttr = 0x2D,
    /// setattr(tos, names\[operand\], tos1).
    StoreAttr = 0x2E,

    // =========================================================================
    // Locals
    // =========================================================================
    /// Push local slot locals\[operand\].
    LoadFast = 0x30,
    /// Store top of stack into local slot locals\[operand\].
    StoreFast = 0x31,
    /// Clear local slot locals\[operand\].
    DeleteFast = 0x32,

    // =========================================================================
    // Cell and free variables
    // =========================================================================
    /// Push the value held by closure slot `operand`.
    LoadDeref = 0x38,
    /// Store top of stack into closure slot `operand`.
    StoreDeref = 0x39,
    /// Clear closure slot `operand`.
    DeleteDeref = 0x3A,
    /// Push the cell object for closure slot `operand`.
    LoadClosure = 0x3B,

    // =========================================================================
    // Comparisons
    // =========================================================================
    /// tos = tos1 \<cmp\> tos, where cmp is `CMP_OPS[operand]`.
    CompareOp = 0x40,

    // =========================================================================
    // Jumps
    // =========================================================================
    /// Unconditional jump to an absolute code offset.
    JumpAbsolute = 0x48,
    /// Pop top of stack; jump to an absolute offset if falsy.
    PopJumpIfFalse = 0x49,
    /// Pop top of stack; jump to an absolute offset if truthy.
    PopJumpIfTrue = 0x4A,
    /// Unconditional forward jump by a byte delta.
    JumpForward = 0x50,

    // =========================================================================
    // Calls and container builds
    // =========================================================================
    /// Call tos\[-operand\] with `operand` stacked arguments.
    CallFunction = 0x58,
    /// Make a function object from a code constant with `operand` defaults.
    MakeFunction = 0x59,
    /// Build a tuple from `operand` stacked values.
    BuildTuple = 0x5A,
    /// Build a list from `operand` stacked values.
    BuildList = 0x5B,

    // =========================================================================
    // Escape
    // =========================================================================
    /// Supply 16 additional high-order operand bits to the next instruction.
    ExtendedArg = 0x7F,
}

impl Opcode {
    /// Convert from a numeric code, returning `None` if unassigned.
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Nop),
            0x01 => Some(Opcode::PopTop),
            0x02 => Some(Opcode::DupTop),
            0x03 => Some(Opcode::RotTwo),
            0x04 => Some(Opcode::RotThree),
            0x05 => Some(Opcode::UnaryNegative),
            0x06 => Some(Opcode::UnaryNot),

            0x10 => Some(Opcode::BinaryAdd),
            0x11 => Some(Opcode::BinarySubtract),
            0x12 => Some(Opcode::BinaryMultiply),
            0x13 => Some(Opcode::BinaryDivide),
            0x14 => Some(Opcode::BinaryModulo),
            0x15 => Some(Opcode::BinaryPower),
            0x1E => Some(Opcode::ReturnValue),

            0x20 => Some(Opcode::LoadConst),

            0x28 => Some(Opcode::LoadName),
            0x29 => Some(Opcode::StoreName),
            0x2A => Some(Opcode::DeleteName),
            0x2B => Some(Opcode::LoadGlobal),
            0x2C => Some(Opcode::StoreGlobal),
            0x2D => Some(Opcode::LoadAttr),
            0x2E => Some(Opcode::StoreAttr),

            0x30 => Some(Opcode::LoadFast),
            0x31 => Some(Opcode::StoreFast),
            0x32 => Some(Opcode::DeleteFast),

            0x38 => Some(Opcode::LoadDeref),
            0x39 => Some(Opcode::StoreDeref),
            0x3A => Some(Opcode::DeleteDeref),
            0x3B => Some(Opcode::LoadClosure),

            0x40 => Some(Opcode::CompareOp),

            0x48 => Some(Opcode::JumpAbsolute),
            0x49 => Some(Opcode::PopJumpIfFalse),
            0x4A => Some(Opcode::PopJumpIfTrue),
            0x50 => Some(Opcode::JumpForward),

            0x58 => Some(Opcode::CallFunction),
            0x59 => Some(Opcode::MakeFunction),
            0x5A => Some(Opcode::BuildTuple),
            0x5B => Some(Opcode::BuildList),

            0x7F => Some(Opcode::ExtendedArg),

            _ => None,
        }
    }

    /// Convert from a symbolic name, returning `None` if unrecognized.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NOP" => Some(Opcode::Nop),
            "POP_TOP" => Some(Opcode::PopTop),
            "DUP_TOP" => Some(Opcode::DupTop),
            "ROT_TWO" => Some(Opcode::RotTwo),
            "ROT_THREE" => Some(Opcode::RotThree),
            "UNARY_NEGATIVE" => Some(Opcode::UnaryNegative),
            "UNARY_NOT" => Some(Opcode::UnaryNot),
            "BINARY_ADD" => Some(Opcode::BinaryAdd),
            "BINARY_SUBTRACT" => Some(Opcode::BinarySubtract),
            "BINARY_MULTIPLY" => Some(Opcode::BinaryMultiply),
            "BINARY_DIVIDE" => Some(Opcode::BinaryDivide),
            "BINARY_MODULO" => Some(Opcode::BinaryModulo),
            "BINARY_POWER" => Some(Opcode::BinaryPower),
            "RETURN_VALUE" => Some(Opcode::ReturnValue),
            "LOAD_CONST" => Some(Opcode::LoadConst),
            "LOAD_NAME" => Some(Opcode::LoadName),
            "STORE_NAME" => Some(Opcode::StoreName),
            "DELETE_NAME" => Some(Opcode::DeleteName),
            "LOAD_GLOBAL" => Some(Opcode::LoadGlobal),
            "STORE_GLOBAL" => Some(Opcode::StoreGlobal),
            "LOAD_ATTR" => Some(Opcode::LoadAttr),
            "STORE_ATTR" => Some(Opcode::StoreAttr),
            "LOAD_FAST" => Some(Opcode::LoadFast),
            "STORE_FAST" => Some(Opcode::StoreFast),
            "DELETE_FAST" => Some(Opcode::DeleteFast),
            "LOAD_DEREF" => Some(Opcode::LoadDeref),
            "STORE_DEREF" => Some(Opcode::StoreDeref),
            "DELETE_DEREF" => Some(Opcode::DeleteDeref),
            "LOAD_CLOSURE" => Some(Opcode::LoadClosure),
            "COMPARE_OP" => Some(Opcode::CompareOp),
            "JUMP_ABSOLUTE" => Some(Opcode::JumpAbsolute),
            "POP_JUMP_IF_FALSE" => Some(Opcode::PopJumpIfFalse),
            "POP_JUMP_IF_TRUE" => Some(Opcode::PopJumpIfTrue),
            "JUMP_FORWARD" => Some(Opcode::JumpForward),
            "CALL_FUNCTION" => Some(Opcode::CallFunction),
            "MAKE_FUNCTION" => Some(Opcode::MakeFunction),
            "BUILD_TUPLE" => Some(Opcode::BuildTuple),
            "BUILD_LIST" => Some(Opcode::BuildList),
            "EXTENDED_ARG" => Some(Opcode::ExtendedArg),
            _ => None,
        }
    }

    /// The symbolic name of this opcode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PopTop => "POP_TOP",
            Opcode::DupTop => "DUP_TOP",
            Opcode::RotTwo => "ROT_TWO",
            Opcode::RotThree => "ROT_THREE",
            Opcode::UnaryNegative => "UNARY_NEGATIVE",
            Opcode::UnaryNot => "UNARY_NOT",
            Opcode::BinaryAdd => "BINARY_ADD",
            Opcode::BinarySubtract => "BINARY_SUBTRACT",
            Opcode::BinaryMultiply => "BINARY_MULTIPLY",
            Opcode::BinaryDivide => "BINARY_DIVIDE",
            Opcode::BinaryModulo => "BINARY_MODULO",
            Opcode::BinaryPower => "BINARY_POWER",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadName => "LOAD_NAME",
            Opcode::StoreName => "STORE_NAME",
            Opcode::DeleteName => "DELETE_NAME",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::LoadAttr => "LOAD_ATTR",
            Opcode::StoreAttr => "STORE_ATTR",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::DeleteFast => "DELETE_FAST",
            Opcode::LoadDeref => "LOAD_DEREF",
            Opcode::StoreDeref => "STORE_DEREF",
            Opcode::DeleteDeref => "DELETE_DEREF",
            Opcode::LoadClosure => "LOAD_CLOSURE",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::JumpAbsolute => "JUMP_ABSOLUTE",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::JumpForward => "JUMP_FORWARD",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::MakeFunction => "MAKE_FUNCTION",
            Opcode::BuildTuple => "BUILD_TUPLE",
            Opcode::BuildList => "BUILD_LIST",
            Opcode::ExtendedArg => "EXTENDED_ARG",
        }
    }

    /// The operand-resolution category for this opcode.
    #[inline]
    #[must_use]
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            Opcode::Nop
            | Opcode::PopTop
            | Opcode::DupTop
            | Opcode::RotTwo
            | Opcode::RotThree
            | Opcode::UnaryNegative
            | Opcode::UnaryNot
            | Opcode::BinaryAdd
            | Opcode::BinarySubtract
            | Opcode::BinaryMultiply
            | Opcode::BinaryDivide
            | Opcode::BinaryModulo
            | Opcode::BinaryPower
            | Opcode::ReturnValue => OperandKind::None,

            Opcode::LoadConst => OperandKind::Const,

            Opcode::LoadName
            | Opcode::StoreName
            | Opcode::DeleteName
            | Opcode::LoadGlobal
            | Opcode::StoreGlobal
            | Opcode::LoadAttr
            | Opcode::StoreAttr => OperandKind::Name,

            Opcode::LoadFast | Opcode::StoreFast | Opcode::DeleteFast => OperandKind::Local,

            Opcode::LoadDeref
            | Opcode::StoreDeref
            | Opcode::DeleteDeref
            | Opcode::LoadClosure => OperandKind::CellOrFree,

            Opcode::CompareOp => OperandKind::Compare,

            Opcode::JumpAbsolute | Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue => {
                OperandKind::AbsJump
            }
            Opcode::JumpForward => OperandKind::RelJump,

            Opcode::CallFunction
            | Opcode::MakeFunction
            | Opcode::BuildTuple
            | Opcode::BuildList
            | Opcode::ExtendedArg => OperandKind::Arity,
        }
    }

    /// True when the opcode is followed by two operand bytes.
    #[inline]
    #[must_use]
    pub const fn takes_operand(self) -> bool {
        !matches!(self.operand_kind(), OperandKind::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_number_roundtrip() {
        for code in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(code) {
                assert_eq!(op as u8, code);
                assert_eq!(Opcode::from_name(op.name()), Some(op));
            }
        }
    }

    #[test]
    fn test_from_u8_unassigned() {
        assert_eq!(Opcode::from_u8(0xEF), None);
        assert_eq!(Opcode::from_u8(0x1F), None);
    }

    #[test]
    fn test_from_name_unrecognized() {
        assert_eq!(Opcode::from_name("LOAD_CONTS"), None);
        assert_eq!(Opcode::from_name(""), None);
    }

    #[test]
    fn test_operand_kinds() {
        assert_eq!(Opcode::ReturnValue.operand_kind(), OperandKind::None);
        assert_eq!(Opcode::LoadConst.operand_kind(), OperandKind::Const);
        assert_eq!(Opcode::StoreGlobal.operand_kind(), OperandKind::Name);
        assert_eq!(Opcode::LoadFast.operand_kind(), OperandKind::Local);
        assert_eq!(Opcode::LoadClosure.operand_kind(), OperandKind::CellOrFree);
        assert_eq!(Opcode::CompareOp.operand_kind(), OperandKind::Compare);
        assert_eq!(Opcode::JumpAbsolute.operand_kind(), OperandKind::AbsJump);
        assert_eq!(Opcode::JumpForward.operand_kind(), OperandKind::RelJump);
        assert_eq!(Opcode::CallFunction.operand_kind(), OperandKind::Arity);
    }

    #[test]
    fn test_takes_operand() {
        assert!(!Opcode::Nop.takes_operand());
        assert!(!Opcode::ReturnValue.takes_operand());
        assert!(Opcode::LoadConst.takes_operand());
        assert!(Opcode::ExtendedArg.takes_operand());
    }

    #[test]
    fn test_cmp_ops_table() {
        assert_eq!(CMP_OPS[0], "<");
        assert_eq!(CMP_OPS[1], "<=");
        assert!(CMP_OPS.contains(&"is not"));
        assert_eq!(CMP_OPS.len(), 10);
    }
}
