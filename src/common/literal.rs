//! Numeric literal parsing shared by the assembler and the linker CLI.
//!
//! Accepts decimal, `0x`/`0X` hexadecimal, and `0b`/`0B` binary forms.
//! Anything that does not fit in 32 bits is a fatal error for the caller.

/// Parse an unsigned 32-bit literal.
pub fn parse_literal(text: &str) -> Result<u32, String> {
    let s = text.trim();
    let (digits, radix) = if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (rest, 2)
    } else {
        (s, 10)
    };
    let value = u64::from_str_radix(digits, radix)
        .map_err(|_| format!("invalid literal '{}'", text))?;
    if value >> 32 != 0 {
        return Err(format!("literal '{}' is bigger than 32 bits", text));
    }
    Ok(value as u32)
}

/// Parse a literal that may carry a leading minus sign, for displacement
/// fields. The magnitude still has to fit in 32 bits.
pub fn parse_signed_literal(text: &str) -> Result<i32, String> {
    let s = text.trim();
    if let Some(rest) = s.strip_prefix('-') {
        let magnitude = parse_literal(rest)?;
        if magnitude > 1 << 31 {
            return Err(format!("literal '{}' is out of signed 32-bit range", text));
        }
        Ok((magnitude as i64).wrapping_neg() as i32)
    } else {
        parse_literal(s).map(|v| v as i32)
    }
}
