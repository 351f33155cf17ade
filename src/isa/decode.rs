//! Instruction decoder.
//!
//! The top four bits of a word select one of 16 opcode families. Each
//! family has a fixed payload layout and, for some families, reserved
//! bits that must hold a specific value. A word that breaks those rules
//! is rejected with a [`DecodeError`] rather than guessed at.

use crate::isa::encode;
use crate::isa::register::{Nzp, Register};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A decoded instruction.
///
/// Immediate and offset operands are stored sign-extended. RET decodes as
/// `Jmp { base: R7 }` and NOP as a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// DR := SR1 + SR2
    AddReg { dr: Register, sr1: Register, sr2: Register },
    /// DR := SR1 + imm5
    AddImm { dr: Register, sr1: Register, imm5: i16 },
    /// DR := SR1 & SR2
    AndReg { dr: Register, sr1: Register, sr2: Register },
    /// DR := SR1 & imm5
    AndImm { dr: Register, sr1: Register, imm5: i16 },
    /// Conditional PC-relative branch.
    Br { nzp: Nzp, offset9: i16 },
    /// PC := BaseR
    Jmp { base: Register },
    /// R7 := PC, PC := PC + offset11
    Jsr { offset11: i16 },
    /// R7 := PC, PC := BaseR
    Jsrr { base: Register },
    /// DR := mem[PC + offset9]
    Ld { dr: Register, offset9: i16 },
    /// DR := mem[mem[PC + offset9]]
    Ldi { dr: Register, offset9: i16 },
    /// DR := mem[BaseR + offset6]
    Ldr { dr: Register, base: Register, offset6: i16 },
    /// DR := PC + offset9
    Lea { dr: Register, offset9: i16 },
    /// DR := !SR
    Not { dr: Register, sr: Register },
    /// Return from interrupt.
    Rti,
    /// mem[PC + offset9] := SR
    St { sr: Register, offset9: i16 },
    /// mem[mem[PC + offset9]] := SR
    Sti { sr: Register, offset9: i16 },
    /// mem[BaseR + offset6] := SR
    Str { sr: Register, base: Register, offset6: i16 },
    /// R7 := PC, PC := mem[trapvect8]
    Trap { vector: u8 },
}

impl Instruction {
    /// Encode back to a 16-bit word.
    pub fn encode(&self) -> u16 {
        match *self {
            Instruction::AddReg { dr, sr1, sr2 } => encode::add_reg(dr, sr1, sr2),
            Instruction::AddImm { dr, sr1, imm5 } => encode::add_imm(dr, sr1, imm5),
            Instruction::AndReg { dr, sr1, sr2 } => encode::and_reg(dr, sr1, sr2),
            Instruction::AndImm { dr, sr1, imm5 } => encode::and_imm(dr, sr1, imm5),
            Instruction::Br { nzp, offset9 } => encode::br(nzp, offset9),
            Instruction::Jmp { base } => encode::jmp(base),
            Instruction::Jsr { offset11 } => encode::jsr(offset11),
            Instruction::Jsrr { base } => encode::jsrr(base),
            Instruction::Ld { dr, offset9 } => encode::ld(dr, offset9),
            Instruction::Ldi { dr, offset9 } => encode::ldi(dr, offset9),
            Instruction::Ldr { dr, base, offset6 } => encode::ldr(dr, base, offset6),
            Instruction::Lea { dr, offset9 } => encode::lea(dr, offset9),
            Instruction::Not { dr, sr } => encode::not(dr, sr),
            Instruction::Rti => encode::rti(),
            Instruction::St { sr, offset9 } => encode::st(sr, offset9),
            Instruction::Sti { sr, offset9 } => encode::sti(sr, offset9),
            Instruction::Str { sr, base, offset6 } => encode::str(sr, base, offset6),
            Instruction::Trap { vector } => encode::trap(vector),
        }
    }

    /// The assembler mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::AddReg { .. } | Instruction::AddImm { .. } => "ADD",
            Instruction::AndReg { .. } | Instruction::AndImm { .. } => "AND",
            Instruction::Br { .. } => "BR",
            Instruction::Jmp { base: Register::R7 } => "RET",
            Instruction::Jmp { .. } => "JMP",
            Instruction::Jsr { .. } => "JSR",
            Instruction::Jsrr { .. } => "JSRR",
            Instruction::Ld { .. } => "LD",
            Instruction::Ldi { .. } => "LDI",
            Instruction::Ldr { .. } => "LDR",
            Instruction::Lea { .. } => "LEA",
            Instruction::Not { .. } => "NOT",
            Instruction::Rti => "RTI",
            Instruction::St { .. } => "ST",
            Instruction::Sti { .. } => "STI",
            Instruction::Str { .. } => "STR",
            Instruction::Trap { .. } => "TRAP",
        }
    }

    /// Whether executing this instruction recomputes the condition codes.
    pub fn sets_flags(&self) -> bool {
        matches!(
            self,
            Instruction::AddReg { .. }
                | Instruction::AddImm { .. }
                | Instruction::AndReg { .. }
                | Instruction::AndImm { .. }
                | Instruction::Ld { .. }
                | Instruction::Ldi { .. }
                | Instruction::Ldr { .. }
                | Instruction::Lea { .. }
                | Instruction::Not { .. }
        )
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("reserved opcode in word {word:#06x}")]
    ReservedOpcode { word: u16 },

    #[error("malformed {family} instruction {word:#06x}: reserved bits violated")]
    ReservedBits { word: u16, family: &'static str },
}

type DecodeFn = fn(u16) -> Result<Instruction, DecodeError>;

/// Per-family decoders indexed by the top four bits of the word.
static DECODE_TABLE: [DecodeFn; 16] = [
    decode_br,       // 0b0000
    decode_add,      // 0b0001
    decode_ld,       // 0b0010
    decode_st,       // 0b0011
    decode_jsr,      // 0b0100
    decode_and,      // 0b0101
    decode_ldr,      // 0b0110
    decode_str,      // 0b0111
    decode_rti,      // 0b1000
    decode_not,      // 0b1001
    decode_ldi,      // 0b1010
    decode_sti,      // 0b1011
    decode_jmp,      // 0b1100
    decode_reserved, // 0b1101
    decode_lea,      // 0b1110
    decode_trap,     // 0b1111
];

/// The opcode family of a word.
#[inline]
pub fn opcode(word: u16) -> u16 {
    word >> 12
}

/// Decode a 16-bit instruction word.
pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    DECODE_TABLE[opcode(word) as usize](word)
}

/// Sign-extend the low `width` bits of `value` to 16 bits.
#[inline]
pub const fn sign_extend(value: u16, width: u32) -> i16 {
    let shift = 16 - width;
    ((value << shift) as i16) >> shift
}

fn decode_reserved(word: u16) -> Result<Instruction, DecodeError> {
    Err(DecodeError::ReservedOpcode { word })
}

fn decode_br(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::Br {
        nzp: Nzp::from_bits(word >> 9),
        offset9: offset9(word),
    })
}

fn decode_add(word: u16) -> Result<Instruction, DecodeError> {
    if word & (1 << 5) != 0 {
        return Ok(Instruction::AddImm { dr: dr(word), sr1: sr1(word), imm5: imm5(word) });
    }
    if word & 0b11_000 != 0 {
        return Err(DecodeError::ReservedBits { word, family: "ADD" });
    }
    Ok(Instruction::AddReg { dr: dr(word), sr1: sr1(word), sr2: sr2(word) })
}

fn decode_and(word: u16) -> Result<Instruction, DecodeError> {
    if word & (1 << 5) != 0 {
        return Ok(Instruction::AndImm { dr: dr(word), sr1: sr1(word), imm5: imm5(word) });
    }
    if word & 0b11_000 != 0 {
        return Err(DecodeError::ReservedBits { word, family: "AND" });
    }
    Ok(Instruction::AndReg { dr: dr(word), sr1: sr1(word), sr2: sr2(word) })
}

fn decode_jsr(word: u16) -> Result<Instruction, DecodeError> {
    if word & (1 << 11) != 0 {
        Ok(Instruction::Jsr { offset11: sign_extend(word & 0x07FF, 11) })
    } else {
        Ok(Instruction::Jsrr { base: sr1(word) })
    }
}

fn decode_rti(word: u16) -> Result<Instruction, DecodeError> {
    if word & 0x0FFF != 0 {
        return Err(DecodeError::ReservedBits { word, family: "RTI" });
    }
    Ok(Instruction::Rti)
}

fn decode_jmp(word: u16) -> Result<Instruction, DecodeError> {
    if word & 0b0000_1110_0011_1111 != 0 {
        return Err(DecodeError::ReservedBits { word, family: "JMP" });
    }
    Ok(Instruction::Jmp { base: sr1(word) })
}

fn decode_not(word: u16) -> Result<Instruction, DecodeError> {
    if word & 0b11_1111 != 0b11_1111 {
        return Err(DecodeError::ReservedBits { word, family: "NOT" });
    }
    Ok(Instruction::Not { dr: dr(word), sr: sr1(word) })
}

fn decode_trap(word: u16) -> Result<Instruction, DecodeError> {
    if word & 0x0F00 != 0 {
        return Err(DecodeError::ReservedBits { word, family: "TRAP" });
    }
    Ok(Instruction::Trap { vector: (word & 0xFF) as u8 })
}

fn decode_ld(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::Ld { dr: dr(word), offset9: offset9(word) })
}

fn decode_ldi(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::Ldi { dr: dr(word), offset9: offset9(word) })
}

fn decode_ldr(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::Ldr { dr: dr(word), base: sr1(word), offset6: offset6(word) })
}

fn decode_lea(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::Lea { dr: dr(word), offset9: offset9(word) })
}

fn decode_st(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::St { sr: dr(word), offset9: offset9(word) })
}

fn decode_sti(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::Sti { sr: dr(word), offset9: offset9(word) })
}

fn decode_str(word: u16) -> Result<Instruction, DecodeError> {
    Ok(Instruction::Str { sr: dr(word), base: sr1(word), offset6: offset6(word) })
}

// Field extractors. DR/SR of LD/ST families and the NZP mask all share bits 11..9.

#[inline]
fn dr(word: u16) -> Register {
    Register::from_bits(word >> 9)
}

#[inline]
fn sr1(word: u16) -> Register {
    Register::from_bits(word >> 6)
}

#[inline]
fn sr2(word: u16) -> Register {
    Register::from_bits(word)
}

#[inline]
fn imm5(word: u16) -> i16 {
    sign_extend(word & 0x1F, 5)
}

#[inline]
fn offset6(word: u16) -> i16 {
    sign_extend(word & 0x3F, 6)
}

#[inline]
fn offset9(word: u16) -> i16 {
    sign_extend(word & 0x1FF, 9)
}
