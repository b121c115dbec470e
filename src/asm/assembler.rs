//! Assembler driver.
//!
//! Consumes parsed statements, maintains the unit's symbol table and
//! section buffers, and finalizes the unit at `.end`: pending-symbol
//! checks, section sizes, relocation generation, and handoff to the
//! object codec.

use std::collections::HashMap;
use std::mem;

use super::parser::{Stmt, WordArg};
use super::reloc;
use super::section::{PatchOp, Section};
use super::symtab::{SectionRef, SymbolBind, SymbolTable};
use super::WORD_SIZE;
use crate::obj::ObjectData;

pub struct Assembler {
    location_counter: u32,
    current_section: Option<String>,
    section_counter: u32,
    symtab: SymbolTable,
    sections: HashMap<String, Section>,
    verbose: bool,
}

impl Assembler {
    pub fn new(verbose: bool) -> Self {
        Assembler {
            location_counter: 0,
            current_section: None,
            section_counter: 0,
            symtab: SymbolTable::new(),
            sections: HashMap::new(),
            verbose,
        }
    }

    /// Assemble a whole unit. Statements past `.end` never reach us; a
    /// missing `.end` is an error.
    pub fn assemble(mut self, stmts: &[(usize, Stmt)]) -> Result<ObjectData, String> {
        for (lineno, stmt) in stmts {
            if *stmt == Stmt::End {
                return self
                    .finish()
                    .map_err(|e| format!("line {}: {}", lineno, e));
            }
            self.statement(stmt)
                .map_err(|e| format!("line {}: {}", lineno, e))?;
        }
        Err("missing .end directive".to_string())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), String> {
        match stmt {
            Stmt::Global(names) => {
                for name in names {
                    self.symtab.promote_global(name)?;
                }
                Ok(())
            }
            Stmt::Extern(names) => {
                for name in names {
                    self.symtab.declare_external(name)?;
                }
                Ok(())
            }
            Stmt::Section(name) => self.open_section(name),
            Stmt::Word(args) => {
                for arg in args {
                    match arg {
                        WordArg::Literal(value) => self.emit_word(*value)?,
                        WordArg::Symbol(name) => self.defer_word(name)?,
                    }
                }
                Ok(())
            }
            Stmt::Skip(count) => {
                let section = self.section_mut()?;
                section.append_bytes(&vec![0u8; *count as usize]);
                self.location_counter += count;
                Ok(())
            }
            Stmt::Ascii(text) => {
                let bytes = text.as_bytes().to_vec();
                let section = self.section_mut()?;
                section.append_bytes(&bytes);
                self.location_counter += bytes.len() as u32;
                Ok(())
            }
            Stmt::Equ => Err("the .equ directive is not implemented".to_string()),
            Stmt::Label(name) => {
                let ordinal = self.current_section_ordinal()?;
                self.symtab
                    .define_label(name, self.location_counter, ordinal)
            }
            Stmt::End => Ok(()),
            instruction => self.emit_instruction(instruction),
        }
    }

    fn open_section(&mut self, name: &str) -> Result<(), String> {
        self.close_current_section();
        self.location_counter = 0;
        self.section_counter += 1;
        self.symtab.open_section(name, self.section_counter)?;
        self.sections.insert(name.to_string(), Section::new(name));
        self.current_section = Some(name.to_string());
        Ok(())
    }

    fn close_current_section(&mut self) {
        if let Some(current) = &self.current_section {
            if let Some(section) = self.sections.get_mut(current) {
                section.length = self.location_counter - section.base;
            }
        }
    }

    fn section_mut(&mut self) -> Result<&mut Section, String> {
        let name = self
            .current_section
            .as_ref()
            .ok_or("code or data emitted outside of a section")?;
        self.sections
            .get_mut(name)
            .ok_or_else(|| format!("section '{}' missing from the section table", name))
    }

    fn current_section_ordinal(&self) -> Result<u32, String> {
        let name = self
            .current_section
            .as_ref()
            .ok_or("label defined outside of a section")?;
        match self.symtab.lookup(name).map(|s| s.ndx) {
            Some(SectionRef::Section(ordinal)) => Ok(ordinal),
            _ => Err(format!("section '{}' missing from the symbol table", name)),
        }
    }

    /// Append one machine word at the current location.
    pub(super) fn emit_word(&mut self, value: u32) -> Result<(), String> {
        self.section_mut()?.append_word(value);
        self.location_counter += WORD_SIZE;
        Ok(())
    }

    /// Emit a zero placeholder word for `symbol` and record the forward
    /// reference to patch it.
    pub(super) fn defer_word(&mut self, symbol: &str) -> Result<(), String> {
        self.symtab.declare_pending(symbol, SymbolBind::Local);
        let offset = self.location_counter;
        self.section_mut()?
            .record_forward_ref(symbol, offset, PatchOp::Add, false);
        self.emit_word(0)
    }

    /// Record a narrow (12-bit displacement) forward reference at the
    /// current location; the caller emits the instruction word itself.
    pub(super) fn defer_narrow(&mut self, symbol: &str) -> Result<(), String> {
        self.symtab.declare_pending(symbol, SymbolBind::Local);
        let offset = self.location_counter;
        self.section_mut()?
            .record_forward_ref(symbol, offset, PatchOp::Add, true);
        Ok(())
    }

    fn finish(&mut self) -> Result<ObjectData, String> {
        if self.current_section.is_none() {
            return Err("no section was opened".to_string());
        }
        self.close_current_section();
        self.symtab.check_no_pending()?;
        for (name, section) in &self.sections {
            self.symtab.set_size(name, section.length);
        }
        let relocs = reloc::generate(&self.sections, &self.symtab)?;
        let code: HashMap<String, Vec<u8>> = self
            .sections
            .drain()
            .map(|(name, section)| (name, section.data))
            .collect();
        if self.verbose {
            eprintln!("{}", self.symtab);
        }
        Ok(ObjectData {
            symtab: mem::take(&mut self.symtab),
            code,
            relocs,
        })
    }
}
