//! Disassembler.
//!
//! Converts instruction words back to readable assembly.

use crate::isa::decode::{decode, Instruction};
use crate::isa::register::Register;
use std::fmt;

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic();
        match *self {
            Instruction::AddReg { dr, sr1, sr2 } | Instruction::AndReg { dr, sr1, sr2 } => {
                write!(f, "{m} {dr}, {sr1}, {sr2}")
            }
            Instruction::AddImm { dr, sr1, imm5 } | Instruction::AndImm { dr, sr1, imm5 } => {
                write!(f, "{m} {dr}, {sr1}, #{imm5}")
            }
            Instruction::Br { nzp, offset9 } if nzp.bits() == 0 => write!(f, "NOP #{offset9}"),
            Instruction::Br { nzp, offset9 } => write!(f, "BR{nzp} #{offset9}"),
            Instruction::Jmp { base: Register::R7 } | Instruction::Rti => {
                f.write_str(m)
            }
            Instruction::Jmp { base } | Instruction::Jsrr { base } => write!(f, "{m} {base}"),
            Instruction::Jsr { offset11 } => write!(f, "{m} #{offset11}"),
            Instruction::Ld { dr, offset9 }
            | Instruction::Ldi { dr, offset9 }
            | Instruction::Lea { dr, offset9 } => write!(f, "{m} {dr}, #{offset9}"),
            Instruction::St { sr, offset9 } | Instruction::Sti { sr, offset9 } => {
                write!(f, "{m} {sr}, #{offset9}")
            }
            Instruction::Ldr { dr, base, offset6 } => write!(f, "{m} {dr}, {base}, #{offset6}"),
            Instruction::Str { sr, base, offset6 } => write!(f, "{m} {sr}, {base}, #{offset6}"),
            Instruction::Not { dr, sr } => write!(f, "{m} {dr}, {sr}"),
            Instruction::Trap { vector } => write!(f, "{m} x{vector:02X}"),
        }
    }
}

/// Disassemble a single word. Words that do not decode are shown as data.
pub fn disassemble_word(word: u16) -> String {
    match decode(word) {
        Ok(instr) => instr.to_string(),
        Err(_) => format!(".FILL x{:04X}", word),
    }
}

/// Disassemble a run of words that starts at address `origin`.
pub fn disassemble(words: &[u16], origin: u16) -> String {
    let mut output = String::new();
    for (i, &word) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as u16);
        output.push_str(&format!("x{:04X}: {:04X}  {}\n", addr, word, disassemble_word(word)));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::encode;
    use crate::isa::register::{Nzp, Register::*};

    #[test]
    fn test_format_instructions() {
        assert_eq!(disassemble_word(encode::add_imm(R0, R0, -3)), "ADD R0, R0, #-3");
        assert_eq!(disassemble_word(encode::and_reg(R1, R2, R3)), "AND R1, R2, R3");
        assert_eq!(disassemble_word(encode::br(Nzp::N.union(Nzp::Z), 10)), "BRnz #10");
        assert_eq!(disassemble_word(encode::ret()), "RET");
        assert_eq!(disassemble_word(encode::jmp(R3)), "JMP R3");
        assert_eq!(disassemble_word(encode::ldr(R1, R6, 0)), "LDR R1, R6, #0");
        assert_eq!(disassemble_word(encode::not(R1, R2)), "NOT R1, R2");
        assert_eq!(disassemble_word(encode::trap(0x25)), "TRAP x25");
        assert_eq!(disassemble_word(0), "NOP #0");
    }

    #[test]
    fn test_invalid_word_is_data() {
        assert_eq!(disassemble_word(0xD123), ".FILL xD123");
    }

    #[test]
    fn test_disassemble_listing() {
        let listing = disassemble(&[encode::lea(R0, 2), encode::trap(0x22)], 0x3000);
        assert_eq!(listing, "x3000: E002  LEA R0, #2\nx3001: F022  TRAP x22\n");
    }
}
