//! The operation set shared by every execution engine.

use crate::isa::{Instruction, Nzp, Register};

/// One method per mnemonic. Operands arrive already decoded and
/// sign-extended.
///
/// [`Machine`](crate::cpu::Machine) implements the architectural
/// semantics; [`TracedMachine`](crate::cpu::TracedMachine) logs each
/// operation and delegates.
pub trait Executor {
    fn add_reg(&mut self, dr: Register, sr1: Register, sr2: Register);
    fn add_imm(&mut self, dr: Register, sr1: Register, imm5: i16);
    fn and_reg(&mut self, dr: Register, sr1: Register, sr2: Register);
    fn and_imm(&mut self, dr: Register, sr1: Register, imm5: i16);
    fn br(&mut self, nzp: Nzp, offset9: i16);
    fn jmp(&mut self, base: Register);
    fn jsr(&mut self, offset11: i16);
    fn jsrr(&mut self, base: Register);
    fn ld(&mut self, dr: Register, offset9: i16);
    fn ldi(&mut self, dr: Register, offset9: i16);
    fn ldr(&mut self, dr: Register, base: Register, offset6: i16);
    fn lea(&mut self, dr: Register, offset9: i16);
    fn not(&mut self, dr: Register, sr: Register);
    fn rti(&mut self);
    fn st(&mut self, sr: Register, offset9: i16);
    fn sti(&mut self, sr: Register, offset9: i16);
    fn str(&mut self, sr: Register, base: Register, offset6: i16);
    fn trap(&mut self, vector: u8);
}

/// Invoke the operation `instr` names.
pub fn dispatch<E: Executor + ?Sized>(ex: &mut E, instr: Instruction) {
    use Instruction::*;

    match instr {
        AddReg { dr, sr1, sr2 } => ex.add_reg(dr, sr1, sr2),
        AddImm { dr, sr1, imm5 } => ex.add_imm(dr, sr1, imm5),
        AndReg { dr, sr1, sr2 } => ex.and_reg(dr, sr1, sr2),
        AndImm { dr, sr1, imm5 } => ex.and_imm(dr, sr1, imm5),
        Br { nzp, offset9 } => ex.br(nzp, offset9),
        Jmp { base } => ex.jmp(base),
        Jsr { offset11 } => ex.jsr(offset11),
        Jsrr { base } => ex.jsrr(base),
        Ld { dr, offset9 } => ex.ld(dr, offset9),
        Ldi { dr, offset9 } => ex.ldi(dr, offset9),
        Ldr { dr, base, offset6 } => ex.ldr(dr, base, offset6),
        Lea { dr, offset9 } => ex.lea(dr, offset9),
        Not { dr, sr } => ex.not(dr, sr),
        Rti => ex.rti(),
        St { sr, offset9 } => ex.st(sr, offset9),
        Sti { sr, offset9 } => ex.sti(sr, offset9),
        Str { sr, base, offset6 } => ex.str(sr, base, offset6),
        Trap { vector } => ex.trap(vector),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Register::*;

    /// Records the name and operands of every call.
    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Executor for Recorder {
        fn add_reg(&mut self, dr: Register, sr1: Register, sr2: Register) {
            self.0.push(format!("add {dr} {sr1} {sr2}"));
        }
        fn add_imm(&mut self, dr: Register, sr1: Register, imm5: i16) {
            self.0.push(format!("add {dr} {sr1} {imm5}"));
        }
        fn and_reg(&mut self, dr: Register, sr1: Register, sr2: Register) {
            self.0.push(format!("and {dr} {sr1} {sr2}"));
        }
        fn and_imm(&mut self, dr: Register, sr1: Register, imm5: i16) {
            self.0.push(format!("and {dr} {sr1} {imm5}"));
        }
        fn br(&mut self, nzp: Nzp, offset9: i16) {
            self.0.push(format!("br {nzp} {offset9}"));
        }
        fn jmp(&mut self, base: Register) {
            self.0.push(format!("jmp {base}"));
        }
        fn jsr(&mut self, offset11: i16) {
            self.0.push(format!("jsr {offset11}"));
        }
        fn jsrr(&mut self, base: Register) {
            self.0.push(format!("jsrr {base}"));
        }
        fn ld(&mut self, dr: Register, offset9: i16) {
            self.0.push(format!("ld {dr} {offset9}"));
        }
        fn ldi(&mut self, dr: Register, offset9: i16) {
            self.0.push(format!("ldi {dr} {offset9}"));
        }
        fn ldr(&mut self, dr: Register, base: Register, offset6: i16) {
            self.0.push(format!("ldr {dr} {base} {offset6}"));
        }
        fn lea(&mut self, dr: Register, offset9: i16) {
            self.0.push(format!("lea {dr} {offset9}"));
        }
        fn not(&mut self, dr: Register, sr: Register) {
            self.0.push(format!("not {dr} {sr}"));
        }
        fn rti(&mut self) {
            self.0.push("rti".into());
        }
        fn st(&mut self, sr: Register, offset9: i16) {
            self.0.push(format!("st {sr} {offset9}"));
        }
        fn sti(&mut self, sr: Register, offset9: i16) {
            self.0.push(format!("sti {sr} {offset9}"));
        }
        fn str(&mut self, sr: Register, base: Register, offset6: i16) {
            self.0.push(format!("str {sr} {base} {offset6}"));
        }
        fn trap(&mut self, vector: u8) {
            self.0.push(format!("trap {vector:#04x}"));
        }
    }

    #[test]
    fn test_dispatch_routes_operands() {
        let mut rec = Recorder::default();
        for instr in [
            Instruction::AddImm { dr: R1, sr1: R2, imm5: -3 },
            Instruction::Br { nzp: Nzp::N.union(Nzp::P), offset9: -1 },
            Instruction::Jmp { base: R7 },
            Instruction::Ldr { dr: R0, base: R6, offset6: 5 },
            Instruction::Rti,
            Instruction::Str { sr: R4, base: R5, offset6: -32 },
            Instruction::Trap { vector: 0x25 },
        ] {
            dispatch(&mut rec, instr);
        }

        assert_eq!(
            rec.0,
            vec![
                "add R1 R2 -3",
                "br np -1",
                "jmp R7",
                "ldr R0 R6 5",
                "rti",
                "str R4 R5 -32",
                "trap 0x25",
            ]
        );
    }

    #[test]
    fn test_dispatch_through_trait_object() {
        let mut rec = Recorder::default();
        let ex: &mut dyn Executor = &mut rec;
        dispatch(ex, Instruction::Not { dr: R3, sr: R3 });
        assert_eq!(rec.0, vec!["not R3 R3"]);
    }
}
