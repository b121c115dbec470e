//! Cross-unit global symbol validation.
//!
//! Runs before any merging: every global non-section symbol may be
//! defined at most once across all units, and every symbol referenced as
//! external somewhere must be defined somewhere else.

use std::collections::HashSet;

use super::load::Unit;
use crate::asm::symtab::{SectionRef, SymbolBind, SymbolKind};

pub fn validate_globals(units: &[Unit]) -> Result<(), String> {
    let mut defined: HashSet<&str> = HashSet::new();
    let mut externals: HashSet<&str> = HashSet::new();

    for unit in units {
        for sym in unit.data.symtab.rows() {
            if sym.num == 0 || sym.kind == SymbolKind::Section || sym.bind == SymbolBind::Local {
                continue;
            }
            if sym.ndx == SectionRef::External {
                externals.insert(&sym.name);
            } else {
                if defined.contains(sym.name.as_str()) {
                    return Err(format!(
                        "{}: multiple definitions of symbol '{}'",
                        unit.file_name, sym.name
                    ));
                }
                defined.insert(&sym.name);
            }
        }
    }

    for name in externals {
        if !defined.contains(name) {
            return Err(format!(
                "symbol '{}' was declared extern but was never defined",
                name
            ));
        }
    }
    Ok(())
}
