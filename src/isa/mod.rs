//! The LC-3 instruction set.
//!
//! This module is pure data and functions, with no machine state:
//! - register operands and N/Z/P condition masks
//! - one encoder per mnemonic
//! - a table-driven decoder with reserved-bit validation
//! - a disassembler

pub mod register;
pub mod encode;
pub mod decode;
pub mod disasm;

pub use register::{Nzp, Register};
pub use decode::{decode, sign_extend, DecodeError, Instruction};
pub use disasm::{disassemble, disassemble_word};
