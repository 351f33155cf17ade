//! Instruction encoders.
//!
//! One function per mnemonic. Each packs its operands into the fixed bit
//! layout of the instruction family. Immediate and offset operands are
//! masked to the field width; out-of-range values are truncated, not
//! range-checked.

use crate::isa::register::{Nzp, Register};

/// Opcode family values (the top four bits of an instruction word).
pub struct Opcode;

impl Opcode {
    pub const BR: u16 = 0b0000;
    pub const ADD: u16 = 0b0001;
    pub const LD: u16 = 0b0010;
    pub const ST: u16 = 0b0011;
    pub const JSR: u16 = 0b0100;
    pub const AND: u16 = 0b0101;
    pub const LDR: u16 = 0b0110;
    pub const STR: u16 = 0b0111;
    pub const RTI: u16 = 0b1000;
    pub const NOT: u16 = 0b1001;
    pub const LDI: u16 = 0b1010;
    pub const STI: u16 = 0b1011;
    pub const JMP: u16 = 0b1100;
    pub const RESERVED: u16 = 0b1101;
    pub const LEA: u16 = 0b1110;
    pub const TRAP: u16 = 0b1111;
}

const IMM_FLAG: u16 = 1 << 5;
const JSR_OFFSET_FLAG: u16 = 1 << 11;

// ADD       DR      SR1             SR2
// 0 0 0 1 | x x x | x x x | 0 0 0 | x x x
pub fn add_reg(dr: Register, sr1: Register, sr2: Register) -> u16 {
    op(Opcode::ADD) | r3r3r3(dr, sr1, sr2)
}

// ADD       DR      SR1         imm5
// 0 0 0 1 | x x x | x x x | 1 | x x x x x
pub fn add_imm(dr: Register, sr1: Register, imm5: i16) -> u16 {
    op(Opcode::ADD) | r3r3imm5(dr, sr1, imm5)
}

// AND       DR      SR1             SR2
// 0 1 0 1 | x x x | x x x | 0 0 0 | x x x
pub fn and_reg(dr: Register, sr1: Register, sr2: Register) -> u16 {
    op(Opcode::AND) | r3r3r3(dr, sr1, sr2)
}

// AND       DR      SR1         imm5
// 0 1 0 1 | x x x | x x x | 1 | x x x x x
pub fn and_imm(dr: Register, sr1: Register, imm5: i16) -> u16 {
    op(Opcode::AND) | r3r3imm5(dr, sr1, imm5)
}

// BR         N   Z   P   PCoffset9
// 0 0 0 0 | x | x | x | x x x x x x x x x
pub fn br(nzp: Nzp, offset9: i16) -> u16 {
    op(Opcode::BR) | (nzp.bits() << 9) | field(offset9, 9)
}

/// Unconditional branch to the next instruction.
pub fn nop() -> u16 {
    br(Nzp::ALL, 0)
}

// JMP               BaseR
// 1 1 0 0 | 0 0 0 | x x x | 0 0 0 0 0 0
pub fn jmp(base: Register) -> u16 {
    op(Opcode::JMP) | (base.bits() << 6)
}

/// JMP with the low "table" bit set.
// 1 1 0 0 | 0 0 0 | x x x | 0 0 0 0 0 1
pub fn jmpt(base: Register) -> u16 {
    jmp(base) | 1
}

pub fn ret() -> u16 {
    jmp(Register::LINK)
}

// JSR           PCoffset11
// 0 1 0 0 | 1 | x x x x x x x x x x x
pub fn jsr(offset11: i16) -> u16 {
    op(Opcode::JSR) | JSR_OFFSET_FLAG | field(offset11, 11)
}

// JSRR              BaseR
// 0 1 0 0 | 0 0 0 | x x x | 0 0 0 0 0 0
pub fn jsrr(base: Register) -> u16 {
    op(Opcode::JSR) | (base.bits() << 6)
}

// LD        DR      PCoffset9
// 0 0 1 0 | x x x | x x x x x x x x x
pub fn ld(dr: Register, offset9: i16) -> u16 {
    op(Opcode::LD) | r3off9(dr, offset9)
}

// LDI       DR      PCoffset9
// 1 0 1 0 | x x x | x x x x x x x x x
pub fn ldi(dr: Register, offset9: i16) -> u16 {
    op(Opcode::LDI) | r3off9(dr, offset9)
}

// LDR       DR      BaseR   offset6
// 0 1 1 0 | x x x | x x x | x x x x x x
pub fn ldr(dr: Register, base: Register, offset6: i16) -> u16 {
    op(Opcode::LDR) | r3r3off6(dr, base, offset6)
}

// LEA       DR      PCoffset9
// 1 1 1 0 | x x x | x x x x x x x x x
pub fn lea(dr: Register, offset9: i16) -> u16 {
    op(Opcode::LEA) | r3off9(dr, offset9)
}

// NOT       DR      SR
// 1 0 0 1 | x x x | x x x | 1 1 1 1 1 1
pub fn not(dr: Register, sr: Register) -> u16 {
    op(Opcode::NOT) | (dr.bits() << 9) | (sr.bits() << 6) | 0b11_1111
}

pub fn rti() -> u16 {
    op(Opcode::RTI)
}

// ST        SR      PCoffset9
// 0 0 1 1 | x x x | x x x x x x x x x
pub fn st(sr: Register, offset9: i16) -> u16 {
    op(Opcode::ST) | r3off9(sr, offset9)
}

// STI       SR      PCoffset9
// 1 0 1 1 | x x x | x x x x x x x x x
pub fn sti(sr: Register, offset9: i16) -> u16 {
    op(Opcode::STI) | r3off9(sr, offset9)
}

// STR       SR      BaseR   offset6
// 0 1 1 1 | x x x | x x x | x x x x x x
pub fn str(sr: Register, base: Register, offset6: i16) -> u16 {
    op(Opcode::STR) | r3r3off6(sr, base, offset6)
}

// TRAP                trapvect8
// 1 1 1 1 | 0 0 0 0 | x x x x x x x x
pub fn trap(vector: u8) -> u16 {
    op(Opcode::TRAP) | vector as u16
}

#[inline]
fn op(opcode: u16) -> u16 {
    opcode << 12
}

/// Two's-complement truncation of `value` to its low `width` bits.
#[inline]
fn field(value: i16, width: u32) -> u16 {
    (value as u16) & ((1 << width) - 1)
}

fn r3r3r3(a: Register, b: Register, c: Register) -> u16 {
    (a.bits() << 9) | (b.bits() << 6) | c.bits()
}

fn r3r3imm5(a: Register, b: Register, imm5: i16) -> u16 {
    (a.bits() << 9) | (b.bits() << 6) | IMM_FLAG | field(imm5, 5)
}

fn r3r3off6(a: Register, b: Register, offset6: i16) -> u16 {
    (a.bits() << 9) | (b.bits() << 6) | field(offset6, 6)
}

fn r3off9(a: Register, offset9: i16) -> u16 {
    (a.bits() << 9) | field(offset9, 9)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::register::Register::*;

    #[test]
    fn test_add() {
        assert_eq!(add_reg(R1, R1, R1), 0b0001_001_001_000_001);
        assert_eq!(add_imm(R1, R1, 1), 0b0001_001_001_1_00001);
        assert_eq!(add_imm(R1, R1, -1), 0b0001_001_001_1_11111);
    }

    #[test]
    fn test_and() {
        assert_eq!(and_reg(R1, R1, R1), 0b0101_001_001_000_001);
        assert_eq!(and_imm(R1, R1, 1), 0b0101_001_001_1_00001);
        assert_eq!(and_imm(R1, R1, -1), 0b0101_001_001_1_11111);
    }

    #[test]
    fn test_branches() {
        assert_eq!(br(Nzp::Z, 1), 0b0000_0_1_0_000000001);
        assert_eq!(br(Nzp::Z, -1), 0b0000_0_1_0_111111111);
        assert_eq!(nop(), 0b0000_111_000000000);
    }

    #[test]
    fn test_jumps() {
        assert_eq!(jmp(R2), 0b1100_000_010_000000);
        assert_eq!(jmpt(R2), 0b1100_000_010_000001);
        assert_eq!(ret(), 0b1100_000_111_000000);
        assert_eq!(jsr(1), 0b0100_1_00000000001);
        assert_eq!(jsr(-1), 0b0100_1_11111111111);
        assert_eq!(jsrr(R2), 0b0100_000_010_000000);
    }

    #[test]
    fn test_loads() {
        assert_eq!(ld(R2, 1), 0b0010_010_000000001);
        assert_eq!(ld(R2, -1), 0b0010_010_111111111);
        assert_eq!(ldi(R2, -1), 0b1010_010_111111111);
        assert_eq!(ldr(R2, R4, 1), 0b0110_010_100_000001);
        assert_eq!(ldr(R2, R4, -1), 0b0110_010_100_111111);
        assert_eq!(lea(R2, 1), 0b1110_010_000000001);
    }

    #[test]
    fn test_stores() {
        assert_eq!(st(R2, 1), 0b0011_010_000000001);
        assert_eq!(sti(R2, -1), 0b1011_010_111111111);
        assert_eq!(str(R2, R4, -1), 0b0111_010_100_111111);
    }

    #[test]
    fn test_misc() {
        assert_eq!(not(R2, R1), 0b1001_010_001_111111);
        assert_eq!(rti(), 0b1000_0000_0000_0000);
        assert_eq!(trap(0x25), 0b1111_0000_0010_0101);
    }

    #[test]
    fn test_out_of_range_offsets_are_masked() {
        // 0x1FF + 1 wraps to zero in a 9-bit field
        assert_eq!(ld(R0, 512), ld(R0, 0));
        assert_eq!(add_imm(R0, R0, 16), add_imm(R0, R0, -16));
    }
}
