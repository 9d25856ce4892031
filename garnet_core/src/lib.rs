//! # Garnet Core
//!
//! Foundation types shared across the Garnet bytecode toolchain.
//!
//! This crate provides the building blocks consumed by the assembler,
//! decoder, and verifier:
//!
//! - **Value System**: the literal type stored in a code object's constant
//!   pool, with the structural equality the interning tables rely on
//! - **Error Handling**: the unified error taxonomy and result alias

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod value;

pub use error::{GarnetError, GarnetResult};
pub use value::Value;

/// Garnet toolchain version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
