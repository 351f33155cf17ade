//! # LC-3 Emulator
//!
//! An emulator of the LC-3, the 16-bit teaching computer with eight
//! registers, a 65536-word address space and memory-mapped console I/O.
//!
//! ```
//! use lc3::isa::encode::{lea, trap};
//! use lc3::isa::Register::R0;
//! use lc3::{BufferConsole, Machine};
//!
//! let mut m = Machine::with_console(BufferConsole::new());
//! m.load_program(0x3000, &[lea(R0, 2), trap(0x22), trap(0x25), 'o' as u16, 'k' as u16, 0])
//!     .unwrap();
//! m.initialize();
//! m.run().unwrap();
//! assert_eq!(m.console().output_string(), "ok");
//! ```

pub mod isa;
pub mod cpu;

// Re-export commonly used types
pub use isa::{decode, disassemble, DecodeError, Instruction, Nzp, Register};
pub use cpu::{
    BufferConsole, Console, Executor, LoadError, Machine, MachineError, MachineState, Memory,
    Registers, StdConsole, TracedMachine,
};
