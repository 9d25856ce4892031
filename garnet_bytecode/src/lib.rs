//! # Garnet Bytecode
//!
//! Bytecode assembler, decoder, and assembly verifier for the Garnet
//! stack machine.
//!
//! Key components:
//!
//! - [`Opcode`] - the static instruction catalog, shared by encoder and
//!   decoder so the two stay symmetric by construction
//! - [`CodeObject`] - symbol tables plus the encoded byte stream, grown
//!   one instruction at a time and sealed by a deferred-fixup pass
//! - [`OpcodeCursor`] - restartable decoding cursor over the byte stream
//! - [`CodeObject::check_assembly`] - verifies the stream against a
//!   textual assembly listing
//! - [`disassemble`] - renders a code object as such a listing
//!
//! # Example
//!
//! ```
//! use garnet_bytecode::CodeObject;
//!
//! let mut co = CodeObject::new();
//! co.append_arg("LOAD_CONST", 42)?;
//! co.append("RETURN_VALUE")?;
//! co.finalize()?;
//!
//! co.check_assembly("LOAD_CONST 1 (42)\nRETURN_VALUE")?;
//! # Ok::<(), garnet_core::GarnetError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod code_object;
mod cursor;
mod opcodes;
mod verify;

pub use code_object::{CodeObject, Label, Operand, disassemble};
pub use cursor::{DecodedInstr, OpcodeCursor};
pub use opcodes::{CMP_OPS, Opcode, OperandKind};
