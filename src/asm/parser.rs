//! Assembly source parser.
//!
//! Line-oriented: `#` starts a comment, a leading `name:` token is a label,
//! `.`-prefixed words are directives, everything else is a mnemonic with
//! comma-separated operands. Addressing modes are parsed into the closed
//! `Operand` enum here, so the rest of the assembler never inspects operand
//! text.

use crate::common::literal::{parse_literal, parse_signed_literal};

/// An argument to `.word`: either a literal or a symbol reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordArg {
    Literal(u32),
    Symbol(String),
}

/// Data addressing modes for `ld` and `st`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `$lit` — immediate literal.
    ImmLiteral(u32),
    /// `$sym` — immediate symbol value.
    ImmSymbol(String),
    /// `lit` — memory direct at a literal address.
    MemLiteral(u32),
    /// `sym` — memory direct at a symbol's address.
    MemSymbol(String),
    /// `%r` — register.
    Register(u8),
    /// `[%r]` — register indirect.
    RegIndirect(u8),
    /// `[%r + lit]` — register indirect with a 12-bit displacement.
    RegOffsetLiteral(u8, i32),
    /// `[%r + sym]` — register indirect with a symbol displacement.
    RegOffsetSymbol(u8, String),
}

/// Jump and call targets: literal address or symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    Literal(u32),
    Symbol(String),
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Global(Vec<String>),
    Extern(Vec<String>),
    Section(String),
    Word(Vec<WordArg>),
    Skip(u32),
    Ascii(String),
    Equ,
    End,
    Label(String),
    Halt,
    Int,
    Iret,
    Call(JumpTarget),
    Ret,
    Jmp(JumpTarget),
    Beq(u8, u8, JumpTarget),
    Bne(u8, u8, JumpTarget),
    Bgt(u8, u8, JumpTarget),
    Push(u8),
    Pop(u8),
    Xchg(u8, u8),
    Add(u8, u8),
    Sub(u8, u8),
    Mul(u8, u8),
    Div(u8, u8),
    Not(u8),
    And(u8, u8),
    Or(u8, u8),
    Xor(u8, u8),
    Shl(u8, u8),
    Shr(u8, u8),
    Ld(Operand, u8),
    St(u8, Operand),
    /// csrrd %csr, %gpr
    Csrrd(u8, u8),
    /// csrwr %gpr, %csr
    Csrwr(u8, u8),
}

/// Parse a whole source file into `(line number, statement)` pairs.
/// Statements after `.end` are ignored, as assembly stops there.
pub fn parse_source(text: &str) -> Result<Vec<(usize, Stmt)>, String> {
    let mut stmts = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        let mut rest = line.trim();
        if rest.is_empty() {
            continue;
        }

        // A leading `name:` token is a label; the remainder of the line may
        // hold another statement.
        if let Some(colon) = rest.find(':') {
            let head = rest[..colon].trim();
            if !head.is_empty() && is_identifier(head) {
                stmts.push((lineno, Stmt::Label(head.to_string())));
                rest = rest[colon + 1..].trim();
                if rest.is_empty() {
                    continue;
                }
            }
        }

        let stmt = parse_statement(rest).map_err(|e| format!("line {}: {}", lineno, e))?;
        let is_end = stmt == Stmt::End;
        stmts.push((lineno, stmt));
        if is_end {
            break;
        }
    }
    Ok(stmts)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_statement(text: &str) -> Result<Stmt, String> {
    let (word, args_text) = match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim()),
        None => (text, ""),
    };

    if let Some(directive) = word.strip_prefix('.') {
        return parse_directive(directive, args_text);
    }

    let args: Vec<&str> = if args_text.is_empty() {
        Vec::new()
    } else {
        split_operands(args_text)
    };
    parse_instruction(word, &args)
}

/// Split a comma-separated operand list, leaving bracketed operands intact.
fn split_operands(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn parse_directive(name: &str, args_text: &str) -> Result<Stmt, String> {
    let list = || -> Vec<String> {
        args_text
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    match name {
        "global" => {
            let names = list();
            if names.is_empty() {
                return Err(".global expects at least one symbol".to_string());
            }
            Ok(Stmt::Global(names))
        }
        "extern" => {
            let names = list();
            if names.is_empty() {
                return Err(".extern expects at least one symbol".to_string());
            }
            Ok(Stmt::Extern(names))
        }
        "section" => {
            if args_text.is_empty() {
                return Err(".section expects a name".to_string());
            }
            Ok(Stmt::Section(args_text.to_string()))
        }
        "word" => {
            let mut args = Vec::new();
            for part in args_text.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    return Err(".word expects literals or symbols".to_string());
                }
                if part.starts_with(|c: char| c.is_ascii_digit()) {
                    args.push(WordArg::Literal(parse_literal(part)?));
                } else {
                    args.push(WordArg::Symbol(part.to_string()));
                }
            }
            if args.is_empty() {
                return Err(".word expects literals or symbols".to_string());
            }
            Ok(Stmt::Word(args))
        }
        "skip" => Ok(Stmt::Skip(parse_literal(args_text)?)),
        "ascii" => {
            let s = args_text.trim();
            if s.len() < 2 || !s.starts_with('"') || !s.ends_with('"') {
                return Err(".ascii expects a double-quoted string".to_string());
            }
            Ok(Stmt::Ascii(s[1..s.len() - 1].to_string()))
        }
        "equ" => Ok(Stmt::Equ),
        "end" => Ok(Stmt::End),
        other => Err(format!("unknown directive '.{}'", other)),
    }
}

fn parse_gpr(text: &str) -> Result<u8, String> {
    let name = text
        .trim()
        .strip_prefix('%')
        .ok_or_else(|| format!("expected a register, got '{}'", text))?;
    match name {
        "sp" => Ok(14),
        "pc" => Ok(15),
        _ => {
            let idx: u8 = name
                .strip_prefix('r')
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| format!("unknown register '{}'", text))?;
            if idx > 15 {
                return Err(format!("unknown register '{}'", text));
            }
            Ok(idx)
        }
    }
}

fn parse_csr(text: &str) -> Result<u8, String> {
    match text.trim().strip_prefix('%') {
        Some("status") => Ok(0),
        Some("handler") => Ok(1),
        Some("cause") => Ok(2),
        _ => Err(format!("unknown system register '{}'", text)),
    }
}

fn parse_jump_target(text: &str) -> Result<JumpTarget, String> {
    let t = text.trim();
    if t.is_empty() {
        return Err("missing jump target".to_string());
    }
    if t.starts_with(|c: char| c.is_ascii_digit()) {
        Ok(JumpTarget::Literal(parse_literal(t)?))
    } else {
        Ok(JumpTarget::Symbol(t.to_string()))
    }
}

fn parse_operand(text: &str) -> Result<Operand, String> {
    let t = text.trim();
    if let Some(imm) = t.strip_prefix('$') {
        let imm = imm.trim();
        if imm.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(Operand::ImmLiteral(parse_literal(imm)?));
        }
        return Ok(Operand::ImmSymbol(imm.to_string()));
    }
    if let Some(inner) = t.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| format!("unterminated memory operand '{}'", text))?
            .trim();
        return match inner.split_once('+') {
            None => Ok(Operand::RegIndirect(parse_gpr(inner)?)),
            Some((reg, disp)) => {
                let reg = parse_gpr(reg)?;
                let disp = disp.trim();
                if disp.starts_with(|c: char| c.is_ascii_digit()) || disp.starts_with('-') {
                    Ok(Operand::RegOffsetLiteral(reg, parse_signed_literal(disp)?))
                } else {
                    Ok(Operand::RegOffsetSymbol(reg, disp.to_string()))
                }
            }
        };
    }
    if t.starts_with('%') {
        return Ok(Operand::Register(parse_gpr(t)?));
    }
    if t.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(Operand::MemLiteral(parse_literal(t)?));
    }
    if t.is_empty() {
        return Err("missing operand".to_string());
    }
    Ok(Operand::MemSymbol(t.to_string()))
}

fn expect_args(mnemonic: &str, args: &[&str], n: usize) -> Result<(), String> {
    if args.len() != n {
        return Err(format!(
            "'{}' expects {} operand(s), got {}",
            mnemonic,
            n,
            args.len()
        ));
    }
    Ok(())
}

fn parse_instruction(mnemonic: &str, args: &[&str]) -> Result<Stmt, String> {
    match mnemonic {
        "halt" => {
            expect_args(mnemonic, args, 0)?;
            Ok(Stmt::Halt)
        }
        "int" => {
            expect_args(mnemonic, args, 0)?;
            Ok(Stmt::Int)
        }
        "iret" => {
            expect_args(mnemonic, args, 0)?;
            Ok(Stmt::Iret)
        }
        "ret" => {
            expect_args(mnemonic, args, 0)?;
            Ok(Stmt::Ret)
        }
        "call" => {
            expect_args(mnemonic, args, 1)?;
            Ok(Stmt::Call(parse_jump_target(args[0])?))
        }
        "jmp" => {
            expect_args(mnemonic, args, 1)?;
            Ok(Stmt::Jmp(parse_jump_target(args[0])?))
        }
        "beq" | "bne" | "bgt" => {
            expect_args(mnemonic, args, 3)?;
            let r1 = parse_gpr(args[0])?;
            let r2 = parse_gpr(args[1])?;
            let target = parse_jump_target(args[2])?;
            Ok(match mnemonic {
                "beq" => Stmt::Beq(r1, r2, target),
                "bne" => Stmt::Bne(r1, r2, target),
                _ => Stmt::Bgt(r1, r2, target),
            })
        }
        "push" => {
            expect_args(mnemonic, args, 1)?;
            Ok(Stmt::Push(parse_gpr(args[0])?))
        }
        "pop" => {
            expect_args(mnemonic, args, 1)?;
            Ok(Stmt::Pop(parse_gpr(args[0])?))
        }
        "not" => {
            expect_args(mnemonic, args, 1)?;
            Ok(Stmt::Not(parse_gpr(args[0])?))
        }
        "xchg" | "add" | "sub" | "mul" | "div" | "and" | "or" | "xor" | "shl" | "shr" => {
            expect_args(mnemonic, args, 2)?;
            let r1 = parse_gpr(args[0])?;
            let r2 = parse_gpr(args[1])?;
            Ok(match mnemonic {
                "xchg" => Stmt::Xchg(r1, r2),
                "add" => Stmt::Add(r1, r2),
                "sub" => Stmt::Sub(r1, r2),
                "mul" => Stmt::Mul(r1, r2),
                "div" => Stmt::Div(r1, r2),
                "and" => Stmt::And(r1, r2),
                "or" => Stmt::Or(r1, r2),
                "xor" => Stmt::Xor(r1, r2),
                "shl" => Stmt::Shl(r1, r2),
                _ => Stmt::Shr(r1, r2),
            })
        }
        "ld" => {
            expect_args(mnemonic, args, 2)?;
            Ok(Stmt::Ld(parse_operand(args[0])?, parse_gpr(args[1])?))
        }
        "st" => {
            expect_args(mnemonic, args, 2)?;
            Ok(Stmt::St(parse_gpr(args[0])?, parse_operand(args[1])?))
        }
        "csrrd" => {
            expect_args(mnemonic, args, 2)?;
            Ok(Stmt::Csrrd(parse_csr(args[0])?, parse_gpr(args[1])?))
        }
        "csrwr" => {
            expect_args(mnemonic, args, 2)?;
            Ok(Stmt::Csrwr(parse_gpr(args[0])?, parse_csr(args[1])?))
        }
        other => Err(format!("unknown instruction '{}'", other)),
    }
}
