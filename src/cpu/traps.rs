//! Built-in trap service routines.
//!
//! Installed into the privileged region at initialization, back to back
//! from [`PRIVILEGED_START`] in vector order. Each trap vector table entry
//! holds the address of its routine. Routines that need scratch registers
//! save them on the R6 stack (store, then decrement) and restore them
//! before returning through R7.

use crate::cpu::devices::{
    DISPLAY_DATA, DISPLAY_STATUS, KEYBOARD_DATA, KEYBOARD_STATUS, MACHINE_CONTROL,
};
use crate::cpu::memory::PRIVILEGED_START;
use crate::isa::encode::*;
use crate::isa::Nzp;
use crate::isa::Register::*;

pub const TRAP_GETC: u8 = 0x20;
pub const TRAP_OUT: u8 = 0x21;
pub const TRAP_PUTS: u8 = 0x22;
pub const TRAP_IN: u8 = 0x23;
pub const TRAP_PUTSP: u8 = 0x24;
pub const TRAP_HALT: u8 = 0x25;

/// A trap service routine and the vector that selects it.
#[derive(Debug, Clone)]
pub struct TrapRoutine {
    pub name: &'static str,
    pub vector: u8,
    pub code: Vec<u16>,
}

/// All built-in routines, in installation order.
pub fn routines() -> Vec<TrapRoutine> {
    vec![
        TrapRoutine { name: "GETC", vector: TRAP_GETC, code: getc() },
        TrapRoutine { name: "OUT", vector: TRAP_OUT, code: out() },
        TrapRoutine { name: "PUTS", vector: TRAP_PUTS, code: puts() },
        TrapRoutine { name: "IN", vector: TRAP_IN, code: input() },
        TrapRoutine { name: "PUTSP", vector: TRAP_PUTSP, code: putsp() },
        TrapRoutine { name: "HALT", vector: TRAP_HALT, code: halt() },
    ]
}

/// Where each routine lands when installed from [`PRIVILEGED_START`].
pub fn layout() -> Vec<(TrapRoutine, u16)> {
    let mut addr = PRIVILEGED_START;
    routines()
        .into_iter()
        .map(|routine| {
            let at = addr;
            addr += routine.code.len() as u16;
            (routine, at)
        })
        .collect()
}

const ZP: Nzp = Nzp::Z.union(Nzp::P);

/// Read one character into R0. No echo.
pub fn getc() -> Vec<u16> {
    vec![
        ldi(R0, 3),       // POLL: R0 <- KBSR
        br(ZP, -2),       // not ready: goto POLL
        ldi(R0, 2),       // R0 <- KBDR
        ret(),
        KEYBOARD_STATUS,
        KEYBOARD_DATA,
    ]
}

/// Write the character in R0.
pub fn out() -> Vec<u16> {
    vec![
        str(R1, R6, 0), // push R1
        add_imm(R6, R6, -1),
        ldi(R1, 5),     // POLL: R1 <- DSR
        br(ZP, -2),     // not ready: goto POLL
        sti(R0, 4),     // DDR <- R0
        add_imm(R6, R6, 1), // pop R1
        ldr(R1, R6, 0),
        ret(),
        DISPLAY_STATUS,
        DISPLAY_DATA,
    ]
}

/// Write the zero-terminated string at R0, one character per word.
pub fn puts() -> Vec<u16> {
    vec![
        str(R1, R6, 0), // push R1
        add_imm(R6, R6, -1),
        str(R2, R6, 0), // push R2
        add_imm(R6, R6, -1),
        // LOOP:
        ldi(R1, 15),          // R1 <- DSR
        ld(R2, 16),           // R2 <- x8000
        and_reg(R1, R1, R2),  // R1 <- R1 & R2
        br(Nzp::Z, -4),       // not ready: goto LOOP
        ldr(R1, R0, 0),       // R1 <- mem[R0]
        br(Nzp::Z, 5),        // goto DONE on terminator
        ld(R2, 12),           // R2 <- x00FF
        and_reg(R1, R1, R2),  // R1 <- R1 & R2
        sti(R1, 8),           // DDR <- R1
        add_imm(R0, R0, 1),   // R0 <- R0 + 1
        br(Nzp::ALL, -11),    // goto LOOP
        // DONE:
        add_imm(R6, R6, 1), // pop R2
        ldr(R2, R6, 0),
        add_imm(R6, R6, 1), // pop R1
        ldr(R1, R6, 0),
        ret(),
        DISPLAY_STATUS,
        DISPLAY_DATA,
        0x8000,
        0x00FF,
    ]
}

/// Read one character into R0 and echo it.
pub fn input() -> Vec<u16> {
    vec![
        str(R1, R6, 0), // push R1
        add_imm(R6, R6, -1),
        ldi(R0, 8),     // KPOLL: R0 <- KBSR
        br(ZP, -2),     // not ready: goto KPOLL
        ldi(R0, 7),     // R0 <- KBDR
        ldi(R1, 7),     // DPOLL: R1 <- DSR
        br(ZP, -2),     // not ready: goto DPOLL
        sti(R0, 6),     // DDR <- R0
        add_imm(R6, R6, 1), // pop R1
        ldr(R1, R6, 0),
        ret(),
        KEYBOARD_STATUS,
        KEYBOARD_DATA,
        DISPLAY_STATUS,
        DISPLAY_DATA,
    ]
}

/// Write the zero-terminated packed string at R0: two characters per
/// word, low byte first.
pub fn putsp() -> Vec<u16> {
    vec![
        str(R1, R6, 0), // push R1
        add_imm(R6, R6, -1),
        str(R2, R6, 0), // push R2
        add_imm(R6, R6, -1),
        str(R3, R6, 0), // push R3
        add_imm(R6, R6, -1),
        str(R4, R6, 0), // push R4
        add_imm(R6, R6, -1),
        // LOOP:
        ldr(R1, R0, 0),      // R1 <- mem[R0]
        br(Nzp::Z, 23),      // goto DONE on terminator
        ld(R2, 33),          // R2 <- x00FF
        and_reg(R2, R1, R2), // R2 <- low byte
        br(Nzp::Z, 20),      // goto DONE on terminator
        ldi(R3, 28),         // POLL1: R3 <- DSR
        br(ZP, -2),          // not ready: goto POLL1
        sti(R2, 27),         // DDR <- R2
        // R2 <- high byte, shifted in one bit at a time from the top of R1
        and_imm(R2, R2, 0),
        and_imm(R4, R4, 0),
        add_imm(R4, R4, 8),
        add_reg(R2, R2, R2), // SHIFT: R2 <- R2 << 1
        add_imm(R1, R1, 0),
        br(ZP, 1),           // top bit clear: goto NEXT
        add_imm(R2, R2, 1),
        add_reg(R1, R1, R1), // NEXT: R1 <- R1 << 1
        add_imm(R4, R4, -1),
        br(Nzp::P, -7),      // goto SHIFT
        add_imm(R2, R2, 0),
        br(Nzp::Z, 5),       // goto DONE on terminator
        ldi(R3, 13),         // POLL2: R3 <- DSR
        br(ZP, -2),          // not ready: goto POLL2
        sti(R2, 12),         // DDR <- R2
        add_imm(R0, R0, 1),  // R0 <- R0 + 1
        br(Nzp::ALL, -25),   // goto LOOP
        // DONE:
        add_imm(R6, R6, 1), // pop R4
        ldr(R4, R6, 0),
        add_imm(R6, R6, 1), // pop R3
        ldr(R3, R6, 0),
        add_imm(R6, R6, 1), // pop R2
        ldr(R2, R6, 0),
        add_imm(R6, R6, 1), // pop R1
        ldr(R1, R6, 0),
        ret(),
        DISPLAY_STATUS,
        DISPLAY_DATA,
        0x00FF,
    ]
}

/// Stop the machine by clearing the clock-enable bit of MCR.
pub fn halt() -> Vec<u16> {
    vec![
        str(R0, R6, 0), // push R0
        add_imm(R6, R6, -1),
        str(R1, R6, 0), // push R1
        add_imm(R6, R6, -1),
        ld(R0, 9),           // R0 <- x7FFF
        ldi(R1, 7),          // R1 <- MCR
        and_reg(R1, R1, R0), // R1 <- R1 & R0
        sti(R1, 5),          // MCR <- R1
        add_imm(R6, R6, 1),  // pop R1
        ldr(R1, R6, 0),
        add_imm(R6, R6, 1), // pop R0
        ldr(R0, R6, 0),
        ret(),
        MACHINE_CONTROL,
        0x7FFF,
    ]
}
