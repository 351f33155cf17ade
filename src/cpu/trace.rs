//! Instruction tracing.
//!
//! [`TracedMachine`] borrows a [`Machine`] and executes the same operation
//! set, writing one line per instruction before delegating:
//!
//! ```text
//! 0: AND R0, R0, #0
//! 1: STI R0, #0
//! ```

use crate::cpu::devices::Console;
use crate::cpu::executor::{dispatch, Executor};
use crate::cpu::machine::{Machine, MachineError};
use crate::isa::{Instruction, Nzp, Register};
use std::io::Write;
use std::ops::ControlFlow;
use tracing::warn;

/// A [`Machine`] decorated with a per-instruction trace written to `out`.
pub struct TracedMachine<'a, C, W> {
    machine: &'a mut Machine<C>,
    out: W,
    /// Instructions traced so far.
    cycle: u64,
}

impl<'a, C: Console, W: Write> TracedMachine<'a, C, W> {
    pub fn new(machine: &'a mut Machine<C>, out: W) -> Self {
        Self { machine, out, cycle: 0 }
    }

    pub fn machine(&self) -> &Machine<C> {
        &*self.machine
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Give back the trace sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Execute a single instruction, tracing it.
    pub fn step(&mut self) -> Result<Instruction, MachineError> {
        let instr = self.machine.fetch()?;
        dispatch(self, instr);
        self.cycle += 1;
        self.machine.retire(instr);
        Ok(instr)
    }

    /// Run until the clock is disabled or an instruction faults.
    pub fn run(&mut self) -> Result<u64, MachineError> {
        self.run_with_observer(|_| ControlFlow::Continue(()))
    }

    /// Run, calling `observe` with the machine before every step.
    ///
    /// Returning [`ControlFlow::Break`] halts the machine. The observer is
    /// called once more after the final step, so it also sees the state the
    /// machine stopped in. A halted machine can be continued with
    /// [`Machine::resume`].
    pub fn run_with_observer<F>(&mut self, mut observe: F) -> Result<u64, MachineError>
    where
        F: FnMut(&Machine<C>) -> ControlFlow<()>,
    {
        self.machine.check_runnable()?;

        let start = self.cycle;
        loop {
            if observe(&*self.machine).is_break() {
                self.machine.halt();
                break;
            }
            if !self.machine.is_running() {
                break;
            }
            self.step()?;
        }
        Ok(self.cycle - start)
    }

    fn log(&mut self, instr: Instruction) {
        if let Err(e) = writeln!(self.out, "{}: {}", self.cycle, instr) {
            warn!("trace write failed: {}", e);
        }
    }
}

impl<C: Console, W: Write> Executor for TracedMachine<'_, C, W> {
    fn add_reg(&mut self, dr: Register, sr1: Register, sr2: Register) {
        self.log(Instruction::AddReg { dr, sr1, sr2 });
        self.machine.add_reg(dr, sr1, sr2);
    }

    fn add_imm(&mut self, dr: Register, sr1: Register, imm5: i16) {
        self.log(Instruction::AddImm { dr, sr1, imm5 });
        self.machine.add_imm(dr, sr1, imm5);
    }

    fn and_reg(&mut self, dr: Register, sr1: Register, sr2: Register) {
        self.log(Instruction::AndReg { dr, sr1, sr2 });
        self.machine.and_reg(dr, sr1, sr2);
    }

    fn and_imm(&mut self, dr: Register, sr1: Register, imm5: i16) {
        self.log(Instruction::AndImm { dr, sr1, imm5 });
        self.machine.and_imm(dr, sr1, imm5);
    }

    fn br(&mut self, nzp: Nzp, offset9: i16) {
        self.log(Instruction::Br { nzp, offset9 });
        self.machine.br(nzp, offset9);
    }

    fn jmp(&mut self, base: Register) {
        self.log(Instruction::Jmp { base });
        self.machine.jmp(base);
    }

    fn jsr(&mut self, offset11: i16) {
        self.log(Instruction::Jsr { offset11 });
        self.machine.jsr(offset11);
    }

    fn jsrr(&mut self, base: Register) {
        self.log(Instruction::Jsrr { base });
        self.machine.jsrr(base);
    }

    fn ld(&mut self, dr: Register, offset9: i16) {
        self.log(Instruction::Ld { dr, offset9 });
        self.machine.ld(dr, offset9);
    }

    fn ldi(&mut self, dr: Register, offset9: i16) {
        self.log(Instruction::Ldi { dr, offset9 });
        self.machine.ldi(dr, offset9);
    }

    fn ldr(&mut self, dr: Register, base: Register, offset6: i16) {
        self.log(Instruction::Ldr { dr, base, offset6 });
        self.machine.ldr(dr, base, offset6);
    }

    fn lea(&mut self, dr: Register, offset9: i16) {
        self.log(Instruction::Lea { dr, offset9 });
        self.machine.lea(dr, offset9);
    }

    fn not(&mut self, dr: Register, sr: Register) {
        self.log(Instruction::Not { dr, sr });
        self.machine.not(dr, sr);
    }

    fn rti(&mut self) {
        self.log(Instruction::Rti);
        self.machine.rti();
    }

    fn st(&mut self, sr: Register, offset9: i16) {
        self.log(Instruction::St { sr, offset9 });
        self.machine.st(sr, offset9);
    }

    fn sti(&mut self, sr: Register, offset9: i16) {
        self.log(Instruction::Sti { sr, offset9 });
        self.machine.sti(sr, offset9);
    }

    fn str(&mut self, sr: Register, base: Register, offset6: i16) {
        self.log(Instruction::Str { sr, base, offset6 });
        self.machine.str(sr, base, offset6);
    }

    fn trap(&mut self, vector: u8) {
        self.log(Instruction::Trap { vector });
        self.machine.trap(vector);
    }
}
