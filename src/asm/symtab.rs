//! Symbol table shared by the assembler and the linker.
//!
//! Rows live in an arena indexed by ordinal; slot 0 is the reserved null
//! symbol. Name lookups go through a side map to the arena index, so
//! relocation entries can refer to rows by stable ordinal.

use std::collections::HashMap;
use std::fmt;

/// What a symbol table row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Ordinary symbol: a label or an external name.
    Untyped,
    /// Section symbol.
    Section,
    /// Referenced but not yet defined. Must be resolved by the end of a unit.
    Pending,
}

/// Symbol visibility across units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBind {
    Local,
    Global,
}

/// Which section a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRef {
    /// No owning section (yet).
    Undefined,
    /// Defined in some other unit; resolved at link time.
    External,
    /// Ordinal of the owning section.
    Section(u32),
}

/// One symbol table row.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub num: u32,
    pub value: u32,
    pub size: u32,
    pub kind: SymbolKind,
    pub bind: SymbolBind,
    pub ndx: SectionRef,
    pub name: String,
}

/// Arena of symbol rows plus a name index.
#[derive(Debug, Default)]
pub struct SymbolTable {
    rows: Vec<Symbol>,
    by_name: HashMap<String, usize>,
}

impl SymbolTable {
    /// Create a table holding only the reserved null symbol.
    pub fn new() -> Self {
        let null = Symbol {
            num: 0,
            value: 0,
            size: 0,
            kind: SymbolKind::Untyped,
            bind: SymbolBind::Local,
            ndx: SectionRef::Undefined,
            name: String::new(),
        };
        SymbolTable { rows: vec![null], by_name: HashMap::new() }
    }

    /// All rows, null symbol included, in ordinal order.
    pub fn rows(&self) -> &[Symbol] {
        &self.rows
    }

    /// Number of rows, null symbol included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, num: u32) -> Option<&Symbol> {
        self.rows.get(num as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name).map(|&i| &self.rows[i])
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Append a row, assigning the next ordinal. Used directly when
    /// rebuilding tables in the object decoder and the linker.
    pub fn insert_row(
        &mut self,
        name: &str,
        value: u32,
        size: u32,
        kind: SymbolKind,
        bind: SymbolBind,
        ndx: SectionRef,
    ) -> u32 {
        let num = self.rows.len() as u32;
        self.rows.push(Symbol {
            num,
            value,
            size,
            kind,
            bind,
            ndx,
            name: name.to_string(),
        });
        self.by_name.insert(name.to_string(), num as usize);
        num
    }

    /// Record a reference to `name`, creating a pending row on first sight.
    /// Returns the symbol's ordinal.
    pub fn declare_pending(&mut self, name: &str, bind: SymbolBind) -> u32 {
        if let Some(sym) = self.lookup(name) {
            return sym.num;
        }
        self.insert_row(name, 0, 0, SymbolKind::Pending, bind, SectionRef::Undefined)
    }

    /// `.global` directive: mark a symbol global, creating a pending global
    /// row on first sight. Fails on a symbol already declared external.
    pub fn promote_global(&mut self, name: &str) -> Result<(), String> {
        match self.index_of(name) {
            None => {
                self.insert_row(name, 0, 0, SymbolKind::Pending, SymbolBind::Global, SectionRef::Undefined);
                Ok(())
            }
            Some(i) => {
                let sym = &mut self.rows[i];
                if sym.ndx == SectionRef::External {
                    return Err(format!(
                        "global after extern is not allowed for symbol '{}'",
                        name
                    ));
                }
                sym.bind = SymbolBind::Global;
                Ok(())
            }
        }
    }

    /// `.extern` directive: mark a symbol as defined in another unit.
    /// Fails on a symbol that is already defined or already declared global.
    pub fn declare_external(&mut self, name: &str) -> Result<(), String> {
        match self.index_of(name) {
            None => {
                self.insert_row(name, 0, 0, SymbolKind::Untyped, SymbolBind::Global, SectionRef::External);
                Ok(())
            }
            Some(i) => {
                let sym = &mut self.rows[i];
                if sym.kind != SymbolKind::Pending {
                    return Err(format!("extern on already defined symbol '{}'", name));
                }
                if sym.bind == SymbolBind::Global {
                    return Err(format!(
                        "extern after global is not allowed for symbol '{}'",
                        name
                    ));
                }
                sym.bind = SymbolBind::Global;
                sym.kind = SymbolKind::Untyped;
                sym.ndx = SectionRef::External;
                Ok(())
            }
        }
    }

    /// Define `name` as a label at `value` inside the section with ordinal
    /// `section`. Completing a pending row is allowed; redefining anything
    /// else is fatal.
    pub fn define_label(&mut self, name: &str, value: u32, section: u32) -> Result<(), String> {
        match self.index_of(name) {
            None => {
                self.insert_row(
                    name,
                    value,
                    0,
                    SymbolKind::Untyped,
                    SymbolBind::Local,
                    SectionRef::Section(section),
                );
                Ok(())
            }
            Some(i) if self.rows[i].kind == SymbolKind::Pending => {
                let sym = &mut self.rows[i];
                sym.value = value;
                sym.ndx = SectionRef::Section(section);
                sym.kind = SymbolKind::Untyped;
                Ok(())
            }
            Some(_) => Err(format!("re-initialization of symbol '{}'", name)),
        }
    }

    /// Open a section named `name` with section ordinal `ordinal`. The
    /// section symbol's `ndx` is its own ordinal. Completing a pending row
    /// is allowed; any other existing symbol is fatal.
    pub fn open_section(&mut self, name: &str, ordinal: u32) -> Result<u32, String> {
        match self.index_of(name) {
            None => Ok(self.insert_row(
                name,
                0,
                0,
                SymbolKind::Section,
                SymbolBind::Local,
                SectionRef::Section(ordinal),
            )),
            Some(i) if self.rows[i].kind == SymbolKind::Pending => {
                let sym = &mut self.rows[i];
                sym.kind = SymbolKind::Section;
                sym.ndx = SectionRef::Section(ordinal);
                Ok(sym.num)
            }
            Some(_) => Err(format!(
                "symbol '{}' already exists in the symbol table",
                name
            )),
        }
    }

    /// Record a section's final byte length on its symbol row.
    pub fn set_size(&mut self, name: &str, size: u32) {
        if let Some(i) = self.index_of(name) {
            self.rows[i].size = size;
        }
    }

    /// Overwrite a symbol's value. Used by the linker's resolution pass.
    pub fn set_value(&mut self, name: &str, value: u32) {
        if let Some(i) = self.index_of(name) {
            self.rows[i].value = value;
        }
    }

    /// The section symbol whose section ordinal is `ordinal`, if any.
    pub fn section_symbol(&self, ordinal: u32) -> Option<&Symbol> {
        self.rows
            .iter()
            .find(|s| s.kind == SymbolKind::Section && s.ndx == SectionRef::Section(ordinal))
    }

    /// Fatal if any symbol is still pending at the end of a unit.
    pub fn check_no_pending(&self) -> Result<(), String> {
        for sym in &self.rows {
            if sym.kind == SymbolKind::Pending {
                return Err(format!(
                    "symbol '{}' is not defined by the end of assembly",
                    sym.name
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<5} {:<10} {:<10} {:<8} {:<6} {:<5} {}",
            "Num", "Value", "Size", "Type", "Bind", "Ndx", "Name"
        )?;
        for sym in &self.rows {
            let kind = match sym.kind {
                SymbolKind::Untyped => "NOTYP",
                SymbolKind::Section => "SCTN",
                SymbolKind::Pending => "PEND",
            };
            let bind = match sym.bind {
                SymbolBind::Local => "LOC",
                SymbolBind::Global => "GLOB",
            };
            let ndx = match sym.ndx {
                SectionRef::Undefined => "UND".to_string(),
                SectionRef::External => "EXT".to_string(),
                SectionRef::Section(n) => n.to_string(),
            };
            writeln!(
                f,
                "{:<5} {:<10} {:<10} {:<8} {:<6} {:<5} {}",
                sym.num, sym.value, sym.size, kind, bind, ndx, sym.name
            )?;
        }
        Ok(())
    }
}
