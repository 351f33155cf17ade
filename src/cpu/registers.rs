//! LC-3 register file.
//!
//! - R0-R7: 16-bit general-purpose registers
//! - PC: 16-bit program counter
//! - PSR: processor status register
//!
//! PSR layout:
//! ```text
//! 15     privilege mode (0 = supervisor, 1 = user)
//! 14..11 reserved
//! 10..8  priority level
//! 7..3   reserved
//! 2..0   condition codes N, Z, P
//! ```

use crate::isa::{Nzp, Register};
use serde::{Deserialize, Serialize};

const PRIVILEGE_MASK: u16 = 1 << 15;
const PRIORITY_MASK: u16 = 0b111 << 8;
const FLAGS_MASK: u16 = 0b111;

/// Processor privilege mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivilegeMode {
    Supervisor,
    User,
}

/// The LC-3 register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General-purpose registers R0-R7.
    pub r: [u16; 8],

    /// Program counter.
    pub pc: u16,

    /// Processor status register.
    pub psr: u16,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers, PC and PSR to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn read(&self, reg: Register) -> u16 {
        self.r[reg.index()]
    }

    #[inline]
    pub fn read_signed(&self, reg: Register) -> i16 {
        self.r[reg.index()] as i16
    }

    #[inline]
    pub fn write(&mut self, reg: Register, value: u16) {
        self.r[reg.index()] = value;
    }

    #[inline]
    pub fn write_signed(&mut self, reg: Register, value: i16) {
        self.r[reg.index()] = value as u16;
    }

    pub fn privilege(&self) -> PrivilegeMode {
        if self.psr & PRIVILEGE_MASK == 0 {
            PrivilegeMode::Supervisor
        } else {
            PrivilegeMode::User
        }
    }

    pub fn set_privilege(&mut self, mode: PrivilegeMode) {
        match mode {
            PrivilegeMode::Supervisor => self.psr &= !PRIVILEGE_MASK,
            PrivilegeMode::User => self.psr |= PRIVILEGE_MASK,
        }
    }

    /// Priority level, 0 (lowest) to 7.
    pub fn priority(&self) -> u8 {
        ((self.psr & PRIORITY_MASK) >> 8) as u8
    }

    /// Set the priority level. Only the low three bits of `level` are used.
    pub fn set_priority(&mut self, level: u8) {
        self.psr = (self.psr & !PRIORITY_MASK) | (((level as u16) << 8) & PRIORITY_MASK);
    }

    /// Current condition codes.
    pub fn flags(&self) -> Nzp {
        Nzp::from_bits(self.psr)
    }

    /// Overwrite the condition codes, leaving the rest of the PSR alone.
    pub fn set_flags(&mut self, nzp: Nzp) {
        self.psr = (self.psr & !FLAGS_MASK) | nzp.bits();
    }

    /// Set exactly one condition code from the sign of `value`.
    pub fn set_flags_from(&mut self, value: u16) {
        self.set_flags(Nzp::of(value));
    }

    /// Increment the program counter by 1, wrapping at the top of memory.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = old.wrapping_add(1);
        old
    }

    /// PC plus a sign-extended offset.
    #[inline]
    pub fn pc_relative(&self, offset: i16) -> u16 {
        add_offset(self.pc, offset)
    }
}

/// Add a signed offset to an address, wrapping within the 16-bit space.
#[inline]
pub fn add_offset(base: u16, offset: i16) -> u16 {
    base.wrapping_add(offset as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_mode() {
        let mut regs = Registers { psr: 1 << 15, ..Registers::new() };
        assert_eq!(regs.privilege(), PrivilegeMode::User);

        regs.psr = !(1 << 15);
        assert_eq!(regs.privilege(), PrivilegeMode::Supervisor);

        let mut regs = Registers::new();
        regs.set_privilege(PrivilegeMode::User);
        assert_eq!(regs.psr, 1 << 15);

        regs.psr = u16::MAX;
        regs.set_privilege(PrivilegeMode::Supervisor);
        assert_eq!(regs.psr, !(1 << 15));
    }

    #[test]
    fn test_priority_level() {
        let regs = Registers { psr: 0b111 << 8, ..Registers::new() };
        assert_eq!(regs.priority(), 0b111);

        let regs = Registers { psr: !(0b111 << 8), ..Registers::new() };
        assert_eq!(regs.priority(), 0);

        let mut regs = Registers::new();
        regs.set_priority(0b111);
        assert_eq!(regs.psr, 0b111 << 8);

        regs.psr = u16::MAX;
        regs.set_priority(0);
        assert_eq!(regs.psr, !(0b111 << 8));
    }

    #[test]
    fn test_set_flags_preserves_other_bits() {
        let mut regs = Registers { psr: u16::MAX, ..Registers::new() };
        regs.set_flags(Nzp::NONE);
        assert_eq!(regs.psr, !0b111);

        regs.set_flags_from(0x8000);
        assert_eq!(regs.flags(), Nzp::N);
        assert_eq!(regs.psr, !0b011);
    }

    #[test]
    fn test_flags_from_value() {
        let mut regs = Registers::new();

        regs.set_flags_from(100);
        assert_eq!(regs.flags(), Nzp::P);

        regs.set_flags_from((-100i16) as u16);
        assert_eq!(regs.flags(), Nzp::N);

        regs.set_flags_from(0);
        assert_eq!(regs.flags(), Nzp::Z);
    }

    #[test]
    fn test_signed_access() {
        let mut regs = Registers::new();
        regs.write_signed(Register::R3, -2);
        assert_eq!(regs.read(Register::R3), 0xFFFE);
        assert_eq!(regs.read_signed(Register::R3), -2);
    }

    #[test]
    fn test_advance_pc_wraps() {
        let mut regs = Registers::new();
        regs.pc = 0xFFFF;

        let old = regs.advance_pc();
        assert_eq!(old, 0xFFFF);
        assert_eq!(regs.pc, 0);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers { r: [7; 8], pc: 0x3000, psr: 0x8002 };
        regs.reset();
        assert_eq!(regs, Registers::new());
    }
}
