//! The LC-3 execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::devices::{Console, Devices, StdConsole};
use crate::cpu::executor::{dispatch, Executor};
use crate::cpu::memory::{LoadError, Memory, MemoryWriter, BACKED_WORDS, USER_END, USER_START};
use crate::cpu::registers::{add_offset, PrivilegeMode, Registers};
use crate::cpu::traps;
use crate::isa::{decode, DecodeError, Instruction, Nzp, Register};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Machine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Not yet initialized. PC and R6 are meaningless.
    Uninitialized,
    /// Executing while the clock is enabled.
    Running,
    /// The clock was disabled.
    Halted,
    /// Execution stopped on an ill-formed instruction.
    Faulted,
}

/// An LC-3 machine with its register file, memory and devices.
pub struct Machine<C = StdConsole> {
    /// Register file.
    pub regs: Registers,
    /// Main memory with the standard device set on its device window.
    pub mem: Memory<Devices<C>>,
    state: MachineState,
    /// Instructions retired since initialization.
    cycles: u64,
    last_instr: Option<Instruction>,
}

/// Externally visible machine state, for dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: MachineState,
    pub cycles: u64,
    pub regs: Registers,
}

impl Machine<StdConsole> {
    /// A machine wired to the process's stdin and stdout.
    pub fn new() -> Self {
        Self::with_console(StdConsole::new())
    }
}

impl Default for Machine<StdConsole> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Console> Machine<C> {
    /// A machine whose keyboard and display are served by `console`.
    pub fn with_console(console: C) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::with_bus(Devices::new(console)),
            state: MachineState::Uninitialized,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Prepare the machine to run.
    ///
    /// Installs the trap service routines and their vector table entries,
    /// resets the register file, points PC at the start of user memory and
    /// R6 at its top, resets the devices and enables the clock. Memory
    /// outside the trap routines and vector entries is left as is, so an
    /// image may be loaded before or after this call.
    pub fn initialize(&mut self) {
        for (routine, addr) in traps::layout() {
            self.mem.write_segment(addr, &routine.code);
            self.mem.write(u16::from(routine.vector), addr);
            debug!(
                "installed {} at x{:04X} (vector x{:02X})",
                routine.name, addr, routine.vector
            );
        }

        self.regs.reset();
        self.regs.pc = USER_START;
        self.regs.write(Register::SP, USER_END);

        let devices = self.mem.bus_mut();
        devices.reset();
        devices.enable_clock();

        self.state = MachineState::Running;
        self.cycles = 0;
        self.last_instr = None;
        debug!("machine initialized, PC=x{:04X} R6=x{:04X}", self.regs.pc, USER_END);
    }

    /// Clear memory and registers and return to [`MachineState::Uninitialized`].
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.mem.bus_mut().reset();
        self.state = MachineState::Uninitialized;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Load a little-endian byte image at address zero.
    pub fn load_image(&mut self, image: &[u8]) -> Result<usize, LoadError> {
        self.load_image_at(0, image)
    }

    /// Load a little-endian byte image starting at word address `origin`.
    ///
    /// Returns the number of bytes written. If the image runs into the
    /// device window, the part that fits is still written and
    /// [`LoadError::ShortWrite`] is returned.
    pub fn load_image_at(&mut self, origin: u16, image: &[u8]) -> Result<usize, LoadError> {
        let mut writer = MemoryWriter::at(&mut self.mem, origin)?;
        match writer.write_bytes(image) {
            Ok(n) => {
                debug!("loaded {} bytes at x{:04X}", n, origin);
                Ok(n)
            }
            Err(e) => {
                warn!("image truncated at x{:04X}: {}", origin, e);
                Err(e)
            }
        }
    }

    /// Load a program given as words starting at `origin`.
    ///
    /// Words that would land in the device window are dropped and reported
    /// the same way as for [`load_image_at`](Self::load_image_at).
    pub fn load_program(&mut self, origin: u16, program: &[u16]) -> Result<(), LoadError> {
        let start = usize::from(origin);
        if start >= BACKED_WORDS {
            return Err(LoadError::OriginOutOfRange(origin));
        }
        let fit = program.len().min(BACKED_WORDS - start);
        self.mem.write_segment(origin, &program[..fit]);

        if fit < program.len() {
            return Err(LoadError::ShortWrite {
                written: fit * 2,
                rejected: (program.len() - fit) * 2,
            });
        }
        Ok(())
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error.
    pub fn step(&mut self) -> Result<Instruction, MachineError> {
        let instr = self.fetch()?;
        dispatch(self, instr);
        self.retire(instr);
        Ok(instr)
    }

    /// Run until the clock is disabled or an instruction faults.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, MachineError> {
        self.run_limited(u64::MAX)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, MachineError> {
        self.check_runnable()?;

        let start_cycles = self.cycles;
        while self.sync_clock() && self.cycles - start_cycles < max_cycles {
            self.step()?;
        }
        Ok(self.cycles - start_cycles)
    }

    /// A run on a machine that was never initialized or has faulted is an
    /// error. A halted machine runs zero instructions.
    pub(crate) fn check_runnable(&self) -> Result<(), MachineError> {
        match self.state {
            MachineState::Uninitialized | MachineState::Faulted => {
                Err(MachineError::NotRunning(self.state))
            }
            MachineState::Running | MachineState::Halted => Ok(()),
        }
    }

    /// Read the word at PC, advance PC and decode.
    pub(crate) fn fetch(&mut self) -> Result<Instruction, MachineError> {
        if !self.sync_clock() {
            return Err(MachineError::NotRunning(self.state));
        }

        let pc = self.regs.advance_pc();
        let word = self.mem.read(pc);
        decode(word).map_err(|source| {
            self.state = MachineState::Faulted;
            error!("decode fault at x{:04X}: {}", pc, source);
            MachineError::Decode { pc, source }
        })
    }

    /// Account for an executed instruction and stop if it disabled the clock.
    pub(crate) fn retire(&mut self, instr: Instruction) {
        self.cycles += 1;
        self.last_instr = Some(instr);
        self.sync_clock();
    }

    /// Move to `Halted` if the clock was disabled while running.
    /// Returns whether the machine is still running.
    fn sync_clock(&mut self) -> bool {
        if self.state == MachineState::Running && !self.clock_enabled() {
            self.state = MachineState::Halted;
            debug!("halted after {} cycles, PC=x{:04X}", self.cycles, self.regs.pc);
        }
        self.state == MachineState::Running
    }

    /// Stop the machine: disable the clock and enter `Halted`.
    pub fn halt(&mut self) {
        self.disable_clock();
        self.sync_clock();
    }

    /// Continue a halted machine from where it stopped.
    ///
    /// Re-enables the clock and returns to `Running` with registers and
    /// memory untouched. Resuming a running machine does nothing.
    pub fn resume(&mut self) -> Result<(), MachineError> {
        match self.state {
            MachineState::Halted => {
                self.enable_clock();
                self.state = MachineState::Running;
                debug!("resumed at PC=x{:04X}", self.regs.pc);
                Ok(())
            }
            MachineState::Running => Ok(()),
            state => Err(MachineError::NotRunning(state)),
        }
    }

    pub fn clock_enabled(&self) -> bool {
        self.mem.bus().clock_enabled()
    }

    pub fn enable_clock(&mut self) {
        self.mem.bus_mut().enable_clock();
    }

    pub fn disable_clock(&mut self) {
        self.mem.bus_mut().disable_clock();
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running && self.clock_enabled()
    }

    pub fn console(&self) -> &C {
        self.mem.bus().console()
    }

    pub fn console_mut(&mut self) -> &mut C {
        self.mem.bus_mut().console_mut()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            cycles: self.cycles,
            regs: self.regs.clone(),
        }
    }

    /// Write `value` to `dr` and set the condition codes from it.
    fn write_result(&mut self, dr: Register, value: u16) {
        self.regs.write(dr, value);
        self.regs.set_flags_from(value);
    }
}

impl<C: Console> Executor for Machine<C> {
    fn add_reg(&mut self, dr: Register, sr1: Register, sr2: Register) {
        let result = self.regs.read_signed(sr1).wrapping_add(self.regs.read_signed(sr2));
        self.write_result(dr, result as u16);
    }

    fn add_imm(&mut self, dr: Register, sr1: Register, imm5: i16) {
        let result = self.regs.read_signed(sr1).wrapping_add(imm5);
        self.write_result(dr, result as u16);
    }

    fn and_reg(&mut self, dr: Register, sr1: Register, sr2: Register) {
        let result = self.regs.read(sr1) & self.regs.read(sr2);
        self.write_result(dr, result);
    }

    fn and_imm(&mut self, dr: Register, sr1: Register, imm5: i16) {
        let result = self.regs.read_signed(sr1) & imm5;
        self.write_result(dr, result as u16);
    }

    fn br(&mut self, nzp: Nzp, offset9: i16) {
        if nzp.intersects(self.regs.flags()) {
            self.regs.pc = self.regs.pc_relative(offset9);
        }
    }

    fn jmp(&mut self, base: Register) {
        self.regs.pc = self.regs.read(base);
    }

    fn jsr(&mut self, offset11: i16) {
        let pc = self.regs.pc;
        self.regs.write(Register::LINK, pc);
        self.regs.pc = add_offset(pc, offset11);
    }

    fn jsrr(&mut self, base: Register) {
        let target = self.regs.read(base);
        self.regs.write(Register::LINK, self.regs.pc);
        self.regs.pc = target;
    }

    fn ld(&mut self, dr: Register, offset9: i16) {
        let value = self.mem.read(self.regs.pc_relative(offset9));
        self.write_result(dr, value);
    }

    fn ldi(&mut self, dr: Register, offset9: i16) {
        let addr = self.mem.read(self.regs.pc_relative(offset9));
        let value = self.mem.read(addr);
        self.write_result(dr, value);
    }

    fn ldr(&mut self, dr: Register, base: Register, offset6: i16) {
        let value = self.mem.read(add_offset(self.regs.read(base), offset6));
        self.write_result(dr, value);
    }

    fn lea(&mut self, dr: Register, offset9: i16) {
        let addr = self.regs.pc_relative(offset9);
        self.write_result(dr, addr);
    }

    fn not(&mut self, dr: Register, sr: Register) {
        let result = !self.regs.read(sr);
        self.write_result(dr, result);
    }

    fn rti(&mut self) {
        // TODO: raise the privilege-mode violation exception through the
        // interrupt vector table instead of ignoring the instruction.
        if self.regs.privilege() != PrivilegeMode::Supervisor {
            debug!("RTI in user mode ignored at x{:04X}", self.regs.pc.wrapping_sub(1));
            return;
        }

        let sp = self.regs.read(Register::SP);
        self.regs.pc = self.mem.read(sp);
        let sp = sp.wrapping_add(1);
        self.regs.psr = self.mem.read(sp);
        self.regs.write(Register::SP, sp.wrapping_add(1));
    }

    fn st(&mut self, sr: Register, offset9: i16) {
        let addr = self.regs.pc_relative(offset9);
        self.mem.write(addr, self.regs.read(sr));
    }

    fn sti(&mut self, sr: Register, offset9: i16) {
        let addr = self.mem.read(self.regs.pc_relative(offset9));
        self.mem.write(addr, self.regs.read(sr));
    }

    fn str(&mut self, sr: Register, base: Register, offset6: i16) {
        let addr = add_offset(self.regs.read(base), offset6);
        self.mem.write(addr, self.regs.read(sr));
    }

    fn trap(&mut self, vector: u8) {
        self.regs.write(Register::LINK, self.regs.pc);
        self.regs.pc = self.mem.read(u16::from(vector));
    }
}

impl<C> std::fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that stop execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("decode fault at x{pc:04X}: {source}")]
    Decode {
        pc: u16,
        #[source]
        source: DecodeError,
    },
}
