//! Symbol resolution and code patching for executable output.
//!
//! First every non-section symbol's value becomes absolute by adding its
//! section's base address; then every relocation entry adds the resolved
//! symbol address plus the addend into the stored word. 32-bit wraparound
//! is expected, not an error.

use crate::asm::symtab::{SectionRef, SymbolKind};
use crate::obj::ObjectData;

/// Turn section-relative symbol values into absolute addresses.
pub fn resolve_symbols(data: &mut ObjectData) -> Result<(), String> {
    let mut updates = Vec::new();
    for sym in data.symtab.rows() {
        if sym.num == 0 || sym.kind == SymbolKind::Section {
            continue;
        }
        let section_num = match sym.ndx {
            SectionRef::Section(n) => n,
            _ => {
                return Err(format!(
                    "could not find section for symbol '{}'",
                    sym.name
                ))
            }
        };
        let base = data
            .symtab
            .get(section_num)
            .filter(|s| s.kind == SymbolKind::Section)
            .map(|s| s.value)
            .ok_or_else(|| format!("could not find section for symbol '{}'", sym.name))?;
        updates.push((sym.name.clone(), sym.value.wrapping_add(base)));
    }
    for (name, value) in updates {
        data.symtab.set_value(&name, value);
    }
    Ok(())
}

/// Apply every relocation entry to the merged section buffers.
pub fn patch_sections(data: &mut ObjectData) -> Result<(), String> {
    let sections: Vec<String> = data
        .symtab
        .rows()
        .iter()
        .filter(|s| s.kind == SymbolKind::Section)
        .map(|s| s.name.clone())
        .collect();

    for name in sections {
        let entries = match data.relocs.get(&name) {
            Some(entries) => entries.clone(),
            None => continue,
        };
        let buffer = data
            .code
            .get_mut(&name)
            .ok_or_else(|| format!("section '{}' has no code buffer", name))?;
        for entry in &entries {
            let symbol = data.symtab.get(entry.symbol).ok_or_else(|| {
                format!(
                    "relocation in section '{}' references unknown symbol ordinal {}",
                    name, entry.symbol
                )
            })?;
            let offset = entry.offset as usize;
            if offset + 4 > buffer.len() {
                return Err(format!(
                    "relocation offset {} past the end of section '{}'",
                    entry.offset, name
                ));
            }
            let old = u32::from_le_bytes([
                buffer[offset],
                buffer[offset + 1],
                buffer[offset + 2],
                buffer[offset + 3],
            ]);
            let patched = old
                .wrapping_add(symbol.value)
                .wrapping_add(entry.addend as u32);
            buffer[offset..offset + 4].copy_from_slice(&patched.to_le_bytes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::reloc::RelocEntry;
    use crate::asm::symtab::{SectionRef, SymbolBind, SymbolTable};
    use std::collections::HashMap;

    fn tables() -> ObjectData {
        let mut symtab = SymbolTable::new();
        // section "text" based at 0x100, 8 bytes
        symtab.insert_row(
            "text",
            0x100,
            8,
            SymbolKind::Section,
            SymbolBind::Local,
            SectionRef::Section(1),
        );
        // global symbol at offset 4 of text
        symtab.insert_row(
            "foo",
            4,
            0,
            SymbolKind::Untyped,
            SymbolBind::Global,
            SectionRef::Section(1),
        );
        let mut code = HashMap::new();
        code.insert("text".to_string(), vec![0u8; 8]);
        let mut relocs = HashMap::new();
        relocs.insert(
            "text".to_string(),
            vec![RelocEntry { offset: 0, symbol: 2, addend: 0 }],
        );
        ObjectData { symtab, code, relocs }
    }

    #[test]
    fn test_resolve_adds_section_base() {
        let mut data = tables();
        resolve_symbols(&mut data).unwrap();
        assert_eq!(data.symtab.lookup("foo").unwrap().value, 0x104);
        assert_eq!(data.symtab.lookup("text").unwrap().value, 0x100);
    }

    #[test]
    fn test_patch_adds_symbol_and_addend() {
        let mut data = tables();
        resolve_symbols(&mut data).unwrap();
        patch_sections(&mut data).unwrap();
        let word = u32::from_le_bytes(data.code["text"][0..4].try_into().unwrap());
        assert_eq!(word, 0x104);
    }

    #[test]
    fn test_patch_against_section_symbol_uses_addend() {
        let mut data = tables();
        data.relocs.insert(
            "text".to_string(),
            vec![RelocEntry { offset: 4, symbol: 1, addend: 6 }],
        );
        resolve_symbols(&mut data).unwrap();
        patch_sections(&mut data).unwrap();
        let word = u32::from_le_bytes(data.code["text"][4..8].try_into().unwrap());
        // base 0x100 + addend 6
        assert_eq!(word, 0x106);
    }

    #[test]
    fn test_patch_wraps_on_overflow() {
        let mut data = tables();
        data.code.get_mut("text").unwrap()[0..4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        resolve_symbols(&mut data).unwrap();
        patch_sections(&mut data).unwrap();
        let word = u32::from_le_bytes(data.code["text"][0..4].try_into().unwrap());
        assert_eq!(word, 0x103);
    }

    #[test]
    fn test_patch_out_of_range_offset() {
        let mut data = tables();
        data.relocs.insert(
            "text".to_string(),
            vec![RelocEntry { offset: 6, symbol: 1, addend: 0 }],
        );
        assert!(patch_sections(&mut data).is_err());
    }
}
