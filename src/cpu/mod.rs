//! LC-3 machine emulation.
//!
//! This module implements the complete LC-3 machine:
//! - eight 16-bit general-purpose registers, PC and PSR
//! - 65536 words of memory with a memory-mapped device window
//! - keyboard, display and machine-control device registers
//! - built-in trap service routines installed at initialization
//! - a plain execution engine and a tracing decorator over one operation set

pub mod registers;
pub mod memory;
pub mod devices;
pub mod traps;
pub mod executor;
pub mod machine;
pub mod trace;

pub use registers::{PrivilegeMode, Registers};
pub use memory::{DeviceBus, LoadError, Memory, MemoryWriter, NoDevices};
pub use devices::{BufferConsole, Console, Devices, StdConsole};
pub use executor::{dispatch, Executor};
pub use machine::{Machine, MachineError, MachineState, Snapshot};
pub use trace::TracedMachine;
