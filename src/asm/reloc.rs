//! Relocation-table generation from recorded forward links.
//!
//! Runs once per unit, after all symbols are resolved. A reference to a
//! local symbol becomes an entry against the *section* that defines it,
//! with the symbol's in-unit value as the addend; a reference to a global
//! symbol becomes an entry against the symbol itself with a zero addend.
//! The linker relies on exactly this split to recompute patched values.

use std::collections::HashMap;

use super::section::{PatchOp, Section};
use super::symtab::{SectionRef, SymbolBind, SymbolKind, SymbolTable};

/// One relocation entry. `symbol` is a symbol-table ordinal: the target
/// section's symbol for local references, the referenced symbol itself for
/// global references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocEntry {
    pub offset: u32,
    pub symbol: u32,
    pub addend: i32,
}

/// Convert every section's forward links into relocation tables, keyed by
/// the owning section's name.
pub fn generate(
    sections: &HashMap<String, Section>,
    symtab: &SymbolTable,
) -> Result<HashMap<String, Vec<RelocEntry>>, String> {
    let mut tables: HashMap<String, Vec<RelocEntry>> = HashMap::new();

    for (name, section) in sections {
        let entries = tables.entry(name.clone()).or_default();
        for row in section.flink() {
            let sym = symtab
                .lookup(&row.symbol)
                .ok_or_else(|| format!("forward reference to unknown symbol '{}'", row.symbol))?;
            for action in &row.actions {
                if action.narrow {
                    if sym.kind == SymbolKind::Pending {
                        return Err(format!(
                            "narrow relocation against symbol '{}' that is not defined during assembly",
                            row.symbol
                        ));
                    }
                    return Err(format!(
                        "narrow relocation against symbol '{}' is not implemented",
                        row.symbol
                    ));
                }
                if action.op == PatchOp::Sub {
                    return Err(format!(
                        "subtractive forward reference against symbol '{}' is not implemented",
                        row.symbol
                    ));
                }
                match sym.bind {
                    SymbolBind::Local => {
                        let target = match sym.ndx {
                            SectionRef::Section(ordinal) => ordinal,
                            _ => {
                                return Err(format!(
                                    "symbol '{}' resolves to no section (equ constants are not implemented)",
                                    row.symbol
                                ))
                            }
                        };
                        let section_sym = symtab.section_symbol(target).ok_or_else(|| {
                            format!("no section with ordinal {} for symbol '{}'", target, row.symbol)
                        })?;
                        entries.push(RelocEntry {
                            offset: action.offset,
                            symbol: section_sym.num,
                            addend: sym.value as i32,
                        });
                    }
                    SymbolBind::Global => {
                        entries.push(RelocEntry {
                            offset: action.offset,
                            symbol: sym.num,
                            addend: 0,
                        });
                    }
                }
            }
        }
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::section::PatchOp;
    use crate::asm::symtab::SymbolBind;

    fn setup() -> (HashMap<String, Section>, SymbolTable) {
        let mut symtab = SymbolTable::new();
        symtab.open_section("text", 1).unwrap();
        let mut sections = HashMap::new();
        sections.insert("text".to_string(), Section::new("text"));
        (sections, symtab)
    }

    #[test]
    fn test_local_symbol_becomes_section_relative() {
        let (mut sections, mut symtab) = setup();
        symtab.define_label("loop", 12, 1).unwrap();
        sections
            .get_mut("text")
            .unwrap()
            .record_forward_ref("loop", 4, PatchOp::Add, false);

        let tables = generate(&sections, &symtab).unwrap();
        let entries = &tables["text"];
        assert_eq!(entries.len(), 1);
        // symbol 1 is the "text" section symbol, addend carries loop's value
        assert_eq!(entries[0], RelocEntry { offset: 4, symbol: 1, addend: 12 });
    }

    #[test]
    fn test_global_symbol_keeps_ordinal_and_zero_addend() {
        let (mut sections, mut symtab) = setup();
        symtab.declare_external("foo").unwrap();
        let num = symtab.lookup("foo").unwrap().num;
        sections
            .get_mut("text")
            .unwrap()
            .record_forward_ref("foo", 0, PatchOp::Add, false);

        let tables = generate(&sections, &symtab).unwrap();
        assert_eq!(
            tables["text"][0],
            RelocEntry { offset: 0, symbol: num, addend: 0 }
        );
    }

    #[test]
    fn test_global_label_also_uses_symbol_ordinal() {
        let (mut sections, mut symtab) = setup();
        symtab.promote_global("entry").unwrap();
        symtab.define_label("entry", 8, 1).unwrap();
        let num = symtab.lookup("entry").unwrap().num;
        sections
            .get_mut("text")
            .unwrap()
            .record_forward_ref("entry", 16, PatchOp::Add, false);

        let tables = generate(&sections, &symtab).unwrap();
        assert_eq!(
            tables["text"][0],
            RelocEntry { offset: 16, symbol: num, addend: 0 }
        );
    }

    #[test]
    fn test_narrow_relocation_is_rejected() {
        let (mut sections, mut symtab) = setup();
        symtab.define_label("var", 0, 1).unwrap();
        sections
            .get_mut("text")
            .unwrap()
            .record_forward_ref("var", 0, PatchOp::Add, true);

        let err = generate(&sections, &symtab).unwrap_err();
        assert!(err.contains("not implemented"), "{}", err);
    }

    #[test]
    fn test_local_without_section_is_rejected() {
        let (mut sections, mut symtab) = setup();
        // Simulate a table that escaped the pending check with a section-less
        // local symbol: reloc generation still refuses it.
        symtab.insert_row(
            "c",
            5,
            0,
            crate::asm::symtab::SymbolKind::Untyped,
            SymbolBind::Local,
            crate::asm::symtab::SectionRef::Undefined,
        );
        sections
            .get_mut("text")
            .unwrap()
            .record_forward_ref("c", 0, PatchOp::Add, false);

        assert!(generate(&sections, &symtab).is_err());
    }
}
