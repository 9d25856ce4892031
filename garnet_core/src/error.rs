//! Error types and result definitions for the Garnet toolchain.
//!
//! Every failure in the assembler, decoder, and verifier is a variant of
//! [`GarnetError`]. All errors are local, synchronous, and carry enough
//! context to diagnose the failing call without replaying it; none are
//! retryable.

use thiserror::Error;

/// The unified result type used throughout Garnet.
pub type GarnetResult<T> = Result<T, GarnetError>;

/// Comprehensive error type covering all Garnet error conditions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GarnetError {
    /// An opcode name or number not present in the instruction catalog.
    #[error("unknown opcode {op}")]
    UnknownOpcode {
        /// The symbolic name, or the numeric code formatted as hex.
        op: String,
    },

    /// Operand presence or shape disagrees with the opcode's declared form.
    #[error("bad operand for {opcode}: {message}")]
    OperandArity {
        /// The opcode whose operand contract was violated.
        opcode: &'static str,
        /// What the opcode expected.
        message: String,
    },

    /// An append or label bind was attempted after finalization.
    #[error("code object is finalized and can no longer be modified")]
    NotModifiable,

    /// A jump target or delta does not fit the 16-bit operand field.
    #[error("jump at offset {offset} cannot be encoded: {message}")]
    JumpRange {
        /// Byte offset of the jump instruction.
        offset: usize,
        /// Why the jump is unencodable.
        message: String,
    },

    /// A jump referenced a label that was never bound to a code offset.
    #[error("label {id} was never bound to a code offset")]
    UnboundLabel {
        /// The label id.
        id: u32,
    },

    /// The combined cell and free variable tables outgrew the slot space.
    #[error("cell and free variable tables exceed the encodable slot range")]
    TooManyCellVars,

    /// The byte stream ended in the middle of an instruction.
    #[error("bytecode stream truncated at offset {offset}")]
    TruncatedStream {
        /// Byte offset where the incomplete instruction begins.
        offset: usize,
    },

    /// Chained extended arguments produced an operand wider than 32 bits.
    #[error("operand at offset {offset} overflows the 32-bit index range")]
    OperandOverflow {
        /// Byte offset where the instruction begins.
        offset: usize,
    },

    /// An assembly listing line could not be parsed.
    #[error("cannot parse assembly line: '{line}'")]
    ListingSyntax {
        /// The offending line, verbatim.
        line: String,
    },

    /// A listing line disagrees with the decoded instruction stream.
    #[error("assembly mismatch at '{line}': expected {expected}, got {actual}")]
    AssemblyMismatch {
        /// The listing line that failed to match.
        line: String,
        /// The value the listing asked for.
        expected: String,
        /// The value actually decoded.
        actual: String,
    },

    /// The listing has more instruction lines than the byte stream.
    #[error("reached end of bytecode at line: '{line}'")]
    UnexpectedEndOfStream {
        /// The first listing line with no instruction left to match.
        line: String,
    },
}

impl GarnetError {
    /// Create an unknown-opcode error from a symbolic name.
    #[must_use]
    pub fn unknown_opcode(name: &str) -> Self {
        Self::UnknownOpcode {
            op: format!("'{name}'"),
        }
    }

    /// Create an unknown-opcode error from a numeric code.
    #[must_use]
    pub fn unknown_code(code: u8) -> Self {
        Self::UnknownOpcode {
            op: format!("{code:#04x}"),
        }
    }

    /// Create an operand arity error.
    #[must_use]
    pub fn arity(opcode: &'static str, message: impl Into<String>) -> Self {
        Self::OperandArity {
            opcode,
            message: message.into(),
        }
    }

    /// Create a jump range error.
    #[must_use]
    pub fn jump_range(offset: usize, message: impl Into<String>) -> Self {
        Self::JumpRange {
            offset,
            message: message.into(),
        }
    }

    /// Create a listing syntax error.
    #[must_use]
    pub fn listing_syntax(line: impl Into<String>) -> Self {
        Self::ListingSyntax { line: line.into() }
    }

    /// Create an assembly mismatch error.
    #[must_use]
    pub fn mismatch(
        line: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::AssemblyMismatch {
            line: line.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_opcode_from_name() {
        let err = GarnetError::unknown_opcode("LOAD_CONTS");
        assert_eq!(err.to_string(), "unknown opcode 'LOAD_CONTS'");
    }

    #[test]
    fn test_unknown_opcode_from_code() {
        let err = GarnetError::unknown_code(0xEF);
        assert_eq!(err.to_string(), "unknown opcode 0xef");
    }

    #[test]
    fn test_arity_error_display() {
        let err = GarnetError::arity("RETURN_VALUE", "takes no operand");
        assert_eq!(
            err.to_string(),
            "bad operand for RETURN_VALUE: takes no operand"
        );
    }

    #[test]
    fn test_jump_range_display() {
        let err = GarnetError::jump_range(12, "delta 70000 requires EXTENDED_ARG");
        assert!(err.to_string().contains("offset 12"));
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn test_mismatch_display() {
        let err = GarnetError::mismatch("LOAD_CONST 1 (43)", "43", "42");
        let rendered = err.to_string();
        assert!(rendered.contains("LOAD_CONST 1 (43)"));
        assert!(rendered.contains("expected 43"));
        assert!(rendered.contains("got 42"));
    }

    #[test]
    fn test_error_is_clone_and_eq() {
        let original = GarnetError::NotModifiable;
        assert_eq!(original.clone(), original);
    }
}
