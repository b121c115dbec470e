//! Instruction encoding.
//!
//! Machine words are 32 bits: oc[31:28] mod[27:24] A[23:20] B[19:16]
//! C[15:12] disp[11:0], displacement sign-extended. Mnemonics that take a
//! full-width operand expand to a word pair that routes through a literal
//! pool word directly after the instruction; symbol operands leave a zero
//! placeholder there and record a forward reference.

use super::assembler::Assembler;
use super::parser::{JumpTarget, Operand, Stmt};

/// Jump through the in-line literal pool: `pc <= gpr[pc] + 4`.
const JMP_OVER_POOL: u32 = 0x30F0_0004;

fn disp12(value: i32) -> u32 {
    (value as u32) & 0xFFF
}

fn check_disp(value: i32) -> Result<(), String> {
    if !(-2048..=2047).contains(&value) {
        return Err(format!(
            "displacement {} does not fit in a signed 12-bit field",
            value
        ));
    }
    Ok(())
}

impl Assembler {
    pub(super) fn emit_instruction(&mut self, stmt: &Stmt) -> Result<(), String> {
        match stmt {
            Stmt::Halt => self.emit_word(0),
            Stmt::Int => self.emit_word(0x1000_0000),
            Stmt::Iret => {
                // sp <= sp + 8; status <= mem[sp - 4]; pc <= mem[sp - 8]
                self.emit_word(0x91EE_0008)?;
                self.emit_word(0x960E_0FFC)?;
                self.emit_word(0x92FE_0FF8)
            }
            Stmt::Call(target) => {
                // push pc; pc <= mem32[pc + 4], then the pool word
                self.emit_word(0x21F0_0004)?;
                self.emit_word(JMP_OVER_POOL)?;
                self.emit_pool_word(target)
            }
            Stmt::Ret => self.emit_word(0x93FE_0004),
            Stmt::Jmp(target) => {
                // pc <= mem32[pc]
                self.emit_word(0x38F0_0000)?;
                self.emit_pool_word(target)
            }
            Stmt::Beq(r1, r2, target) => self.emit_branch(0x39F, *r1, *r2, target),
            Stmt::Bne(r1, r2, target) => self.emit_branch(0x3AF, *r1, *r2, target),
            Stmt::Bgt(r1, r2, target) => self.emit_branch(0x3BF, *r1, *r2, target),
            Stmt::Push(r) => {
                // sp <= sp - 4; mem32[sp] <= gpr
                self.emit_word((0x81E0 << 16) | (u32::from(*r) << 12) | 0xFFC)
            }
            Stmt::Pop(r) => {
                // gpr <= mem32[sp]; sp <= sp + 4
                self.emit_word((0x93 << 24) | (u32::from(*r) << 20) | (0xE << 16) | 0x004)
            }
            Stmt::Xchg(r1, r2) => {
                self.emit_word((0x400 << 20) | (u32::from(*r1) << 16) | (u32::from(*r2) << 12))
            }
            Stmt::Add(src, dst) => self.emit_arith(0x50, *src, *dst),
            Stmt::Sub(src, dst) => self.emit_arith(0x51, *src, *dst),
            Stmt::Mul(src, dst) => self.emit_arith(0x52, *src, *dst),
            Stmt::Div(src, dst) => self.emit_arith(0x53, *src, *dst),
            Stmt::Not(r) => {
                self.emit_word((0x60 << 24) | (u32::from(*r) << 20) | (u32::from(*r) << 16))
            }
            Stmt::And(src, dst) => self.emit_logic(0x61, *src, *dst),
            Stmt::Or(src, dst) => self.emit_logic(0x62, *src, *dst),
            Stmt::Xor(src, dst) => self.emit_logic(0x63, *src, *dst),
            Stmt::Shl(src, dst) => self.emit_arith(0x70, *src, *dst),
            Stmt::Shr(src, dst) => self.emit_arith(0x71, *src, *dst),
            Stmt::Ld(operand, r) => self.emit_ld(operand, *r),
            Stmt::St(r, operand) => self.emit_st(*r, operand),
            Stmt::Csrrd(csr, gpr) => {
                // gpr <= csr
                self.emit_word((0x90 << 24) | (u32::from(*gpr) << 20) | (u32::from(*csr) << 16))
            }
            Stmt::Csrwr(gpr, csr) => {
                // csr <= gpr
                self.emit_word((0x94 << 24) | (u32::from(*csr) << 20) | (u32::from(*gpr) << 16))
            }
            other => Err(format!("statement {:?} is not an instruction", other)),
        }
    }

    /// The word after a branch/jump/load pair: a literal value or a
    /// placeholder for a deferred symbol.
    fn emit_pool_word(&mut self, target: &JumpTarget) -> Result<(), String> {
        match target {
            JumpTarget::Literal(value) => self.emit_word(*value),
            JumpTarget::Symbol(name) => self.defer_word(name),
        }
    }

    /// Conditional branches test through the pool word: `if (gpr[B] cmp
    /// gpr[C]) pc <= mem32[pc + 4]`, else fall through over it.
    fn emit_branch(&mut self, opcode: u32, r1: u8, r2: u8, target: &JumpTarget) -> Result<(), String> {
        self.emit_word((opcode << 20) | (u32::from(r1) << 16) | (u32::from(r2) << 12) | 0x004)?;
        self.emit_word(JMP_OVER_POOL)?;
        self.emit_pool_word(target)
    }

    /// dst <= dst op src
    fn emit_arith(&mut self, opcode: u32, src: u8, dst: u8) -> Result<(), String> {
        self.emit_word(
            (opcode << 24) | (u32::from(dst) << 20) | (u32::from(dst) << 16) | (u32::from(src) << 12),
        )
    }

    /// dst <= src op dst
    fn emit_logic(&mut self, opcode: u32, src: u8, dst: u8) -> Result<(), String> {
        self.emit_word(
            (opcode << 24) | (u32::from(dst) << 20) | (u32::from(src) << 16) | (u32::from(dst) << 12),
        )
    }

    fn emit_ld(&mut self, operand: &Operand, r: u8) -> Result<(), String> {
        let r = u32::from(r);
        match operand {
            Operand::ImmLiteral(value) => {
                // gpr <= mem32[pc + 4]; jump the pool word
                self.emit_word((0x92 << 24) | (r << 20) | 0xF_0004)?;
                self.emit_word(JMP_OVER_POOL)?;
                self.emit_word(*value)
            }
            Operand::ImmSymbol(name) => {
                self.emit_word((0x92 << 24) | (r << 20) | 0xF_0004)?;
                self.emit_word(JMP_OVER_POOL)?;
                self.defer_word(name)
            }
            Operand::MemLiteral(address) => {
                // gpr <= mem32[pc + 8]; gpr <= mem32[gpr]; jump the pool word
                self.emit_word((0x92 << 24) | (r << 20) | 0xF_0008)?;
                self.emit_word((0x92 << 24) | (r << 20) | (r << 16))?;
                self.emit_word(JMP_OVER_POOL)?;
                self.emit_word(*address)
            }
            Operand::MemSymbol(name) => {
                self.emit_word((0x92 << 24) | (r << 20) | 0xF_0008)?;
                self.emit_word((0x92 << 24) | (r << 20) | (r << 16))?;
                self.emit_word(JMP_OVER_POOL)?;
                self.defer_word(name)
            }
            Operand::Register(src) => {
                // gpr <= src + 0
                self.emit_word((0x91 << 24) | (r << 20) | (u32::from(*src) << 16))
            }
            Operand::RegIndirect(base) => {
                self.emit_word((0x92 << 24) | (r << 20) | (u32::from(*base) << 16))
            }
            Operand::RegOffsetLiteral(base, disp) => {
                check_disp(*disp)?;
                self.emit_word(
                    (0x92 << 24) | (r << 20) | (u32::from(*base) << 16) | disp12(*disp),
                )
            }
            Operand::RegOffsetSymbol(base, name) => {
                self.defer_narrow(name)?;
                self.emit_word((0x92 << 24) | (r << 20) | (u32::from(*base) << 16))
            }
        }
    }

    fn emit_st(&mut self, r: u8, operand: &Operand) -> Result<(), String> {
        let r = u32::from(r);
        match operand {
            Operand::ImmLiteral(_) | Operand::ImmSymbol(_) | Operand::Register(_) => {
                Err("illegal addressing mode for st".to_string())
            }
            Operand::MemLiteral(address) => {
                // mem32[mem32[pc + 4]] <= gpr; jump the pool word
                self.emit_word((0x82F0 << 16) | (r << 12) | 0x004)?;
                self.emit_word(JMP_OVER_POOL)?;
                self.emit_word(*address)
            }
            Operand::MemSymbol(name) => {
                self.emit_word((0x82F0 << 16) | (r << 12) | 0x004)?;
                self.emit_word(JMP_OVER_POOL)?;
                self.defer_word(name)
            }
            Operand::RegIndirect(base) => {
                self.emit_word((0x80 << 24) | (u32::from(*base) << 20) | (r << 12))
            }
            Operand::RegOffsetLiteral(base, disp) => {
                check_disp(*disp)?;
                self.emit_word(
                    (0x80 << 24) | (u32::from(*base) << 20) | (r << 12) | disp12(*disp),
                )
            }
            Operand::RegOffsetSymbol(base, name) => {
                self.defer_narrow(name)?;
                self.emit_word((0x80 << 24) | (u32::from(*base) << 20) | (r << 12))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::asm::parser::parse_source;
    use crate::asm::Assembler;
    use crate::obj::ObjectData;

    fn assemble(source: &str) -> Result<ObjectData, String> {
        let stmts = parse_source(source)?;
        Assembler::new(false).assemble(&stmts)
    }

    fn words(data: &ObjectData, section: &str) -> Vec<u32> {
        data.code[section]
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_simple_encodings() {
        let data = assemble(
            ".section text\nhalt\nint\nret\npush %r1\npop %r1\nxchg %r1, %r2\n.end\n",
        )
        .unwrap();
        assert_eq!(
            words(&data, "text"),
            vec![
                0x0000_0000,
                0x1000_0000,
                0x93FE_0004,
                0x81E0_1FFC,
                0x931E_0004,
                0x4001_2000,
            ]
        );
    }

    #[test]
    fn test_arithmetic_and_logic() {
        let data = assemble(
            ".section text\nadd %r1, %r2\nsub %r1, %r2\nand %r1, %r2\nxor %r1, %r2\nshl %r1, %r2\nnot %r3\n.end\n",
        )
        .unwrap();
        assert_eq!(
            words(&data, "text"),
            vec![
                0x5022_1000,
                0x5122_1000,
                0x6121_2000,
                0x6321_2000,
                0x7022_1000,
                0x6033_0000,
            ]
        );
    }

    #[test]
    fn test_jmp_literal_uses_pool() {
        let data = assemble(".section text\njmp 0x40000000\n.end\n").unwrap();
        assert_eq!(words(&data, "text"), vec![0x38F0_0000, 0x4000_0000]);
    }

    #[test]
    fn test_call_symbol_places_placeholder() {
        let data = assemble(".extern f\n.section text\ncall f\n.end\n").unwrap();
        assert_eq!(
            words(&data, "text"),
            vec![0x21F0_0004, 0x30F0_0004, 0]
        );
        assert_eq!(data.relocs["text"][0].offset, 8);
    }

    #[test]
    fn test_branch_encoding() {
        let data = assemble(".section text\nbeq %r1, %r2, 16\nbne %r3, %r4, 16\n.end\n").unwrap();
        let w = words(&data, "text");
        assert_eq!(w[0], 0x39F1_2004);
        assert_eq!(w[1], 0x30F0_0004);
        assert_eq!(w[2], 16);
        assert_eq!(w[3], 0x3AF3_4004);
    }

    #[test]
    fn test_ld_addressing_modes() {
        let data = assemble(
            ".section text\nld $5, %r1\nld %r2, %r1\nld [%r2], %r1\nld [%r2 + 8], %r1\n.end\n",
        )
        .unwrap();
        let w = words(&data, "text");
        assert_eq!(w[0], 0x921F_0004);
        assert_eq!(w[1], 0x30F0_0004);
        assert_eq!(w[2], 5);
        assert_eq!(w[3], 0x9112_0000);
        assert_eq!(w[4], 0x9212_0000);
        assert_eq!(w[5], 0x9212_0008);
    }

    #[test]
    fn test_st_addressing_modes() {
        let data = assemble(
            ".section text\nst %r1, [%r2]\nst %r1, [%r2 + 4]\nst %r1, 0x100\n.end\n",
        )
        .unwrap();
        let w = words(&data, "text");
        assert_eq!(w[0], 0x8020_1000);
        assert_eq!(w[1], 0x8020_1004);
        assert_eq!(w[2], 0x82F0_1004);
        assert_eq!(w[3], 0x30F0_0004);
        assert_eq!(w[4], 0x100);
    }

    #[test]
    fn test_st_immediate_is_illegal() {
        assert!(assemble(".section text\nst %r1, $5\n.end\n").is_err());
    }

    #[test]
    fn test_displacement_out_of_range() {
        let err = assemble(".section text\nld [%r1 + 4096], %r2\n.end\n").unwrap_err();
        assert!(err.contains("12-bit"), "{}", err);
    }

    #[test]
    fn test_narrow_symbol_displacement_is_unsupported() {
        let err = assemble(
            ".section text\nvar:\n.word 0\nld [%r1 + var], %r2\n.end\n",
        )
        .unwrap_err();
        assert!(err.contains("narrow"), "{}", err);
    }

    #[test]
    fn test_csr_moves() {
        let data = assemble(".section text\ncsrrd %status, %r1\ncsrwr %r1, %handler\n.end\n").unwrap();
        assert_eq!(words(&data, "text"), vec![0x9010_0000, 0x9411_0000]);
    }
}
