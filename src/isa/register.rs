//! Register operands and branch condition masks.
//!
//! Both occupy a 3-bit field of an instruction word. A register field
//! names one of R0-R7; the same field position in a branch selects which
//! of the N/Z/P condition codes the branch tests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the eight general-purpose registers.
///
/// R6 is the stack pointer by convention and R7 holds return addresses
/// for JSR, JSRR and TRAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
}

impl Register {
    /// All registers in index order.
    pub const ALL: [Register; 8] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
    ];

    /// Stack pointer by convention.
    pub const SP: Register = Register::R6;

    /// Link register written by JSR, JSRR and TRAP.
    pub const LINK: Register = Register::R7;

    /// Build a register from the low three bits of `bits`.
    #[inline]
    pub const fn from_bits(bits: u16) -> Self {
        match bits & 0b111 {
            0 => Register::R0,
            1 => Register::R1,
            2 => Register::R2,
            3 => Register::R3,
            4 => Register::R4,
            5 => Register::R5,
            6 => Register::R6,
            _ => Register::R7,
        }
    }

    /// The register's 3-bit field value.
    #[inline]
    pub const fn bits(self) -> u16 {
        self as u16
    }

    /// Index into the register array.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.index())
    }
}

/// A 3-bit N/Z/P condition mask.
///
/// Used both as the condition selector of a branch and as the condition
/// code field of the processor status register. Bit 2 is N, bit 1 is Z,
/// bit 0 is P.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Nzp(u8);

impl Nzp {
    pub const NONE: Nzp = Nzp(0b000);
    pub const N: Nzp = Nzp(0b100);
    pub const Z: Nzp = Nzp(0b010);
    pub const P: Nzp = Nzp(0b001);
    pub const ALL: Nzp = Nzp(0b111);

    /// Build a mask from the low three bits of `bits`.
    #[inline]
    pub const fn from_bits(bits: u16) -> Self {
        Nzp((bits & 0b111) as u8)
    }

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0 as u16
    }

    /// The single condition code describing a result word read as signed.
    pub const fn of(value: u16) -> Self {
        let signed = value as i16;
        if signed < 0 {
            Nzp::N
        } else if signed == 0 {
            Nzp::Z
        } else {
            Nzp::P
        }
    }

    /// Combine two masks.
    #[inline]
    pub const fn union(self, other: Nzp) -> Self {
        Nzp(self.0 | other.0)
    }

    /// True when any condition in `self` is also set in `other`.
    #[inline]
    pub const fn intersects(self, other: Nzp) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn n(self) -> bool {
        self.0 & 0b100 != 0
    }

    pub const fn z(self) -> bool {
        self.0 & 0b010 != 0
    }

    pub const fn p(self) -> bool {
        self.0 & 0b001 != 0
    }
}

impl fmt::Display for Nzp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n() {
            f.write_str("n")?;
        }
        if self.z() {
            f.write_str("z")?;
        }
        if self.p() {
            f.write_str("p")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_bits_roundtrip() {
        for reg in Register::ALL {
            assert_eq!(Register::from_bits(reg.bits()), reg);
        }
        assert_eq!(Register::from_bits(0b1010), Register::R2);
    }

    #[test]
    fn test_register_display() {
        assert_eq!(Register::R5.to_string(), "R5");
    }

    #[test]
    fn test_nzp_of_value() {
        assert_eq!(Nzp::of(0), Nzp::Z);
        assert_eq!(Nzp::of(1), Nzp::P);
        assert_eq!(Nzp::of(0x7FFF), Nzp::P);
        assert_eq!(Nzp::of(0x8000), Nzp::N);
        assert_eq!(Nzp::of(0xFFFF), Nzp::N);
    }

    #[test]
    fn test_nzp_intersects() {
        let nz = Nzp::N.union(Nzp::Z);
        assert!(nz.intersects(Nzp::Z));
        assert!(!nz.intersects(Nzp::P));
        assert!(!Nzp::NONE.intersects(Nzp::ALL));
        assert_eq!(Nzp::ALL.to_string(), "nzp");
    }
}
