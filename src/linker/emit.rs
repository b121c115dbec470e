//! Output emission.
//!
//! Relocatable output re-serializes the merged tables through the object
//! codec. Executable output lays every section's patched bytes into a
//! sparse address map and writes one `address: byte` line per occupied
//! byte, ascending, which is the format the emulator's loader consumes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;

use crate::asm::symtab::SymbolKind;
use crate::obj::{write_object_file, ObjectData};

/// Write the merged tables as a relocatable object.
pub fn write_relocatable(path: &str, data: &ObjectData) -> Result<(), String> {
    write_object_file(path, data)
}

/// Build the sparse byte map of the final image.
pub fn memory_map(data: &ObjectData) -> Result<BTreeMap<u32, u8>, String> {
    let mut memory = BTreeMap::new();
    for sym in data.symtab.rows() {
        if sym.kind != SymbolKind::Section {
            continue;
        }
        let bytes = data
            .code
            .get(&sym.name)
            .ok_or_else(|| format!("section '{}' has no code buffer", sym.name))?;
        for (i, byte) in bytes.iter().enumerate() {
            memory.insert(sym.value.wrapping_add(i as u32), *byte);
        }
    }
    Ok(memory)
}

/// Serialize a sparse byte map, one `address: byte` line per entry.
pub fn render_memory_map(memory: &BTreeMap<u32, u8>) -> String {
    let mut out = String::new();
    for (address, byte) in memory {
        let _ = writeln!(out, "{}: {:02x}", address, byte);
    }
    out
}

/// Write the final executable memory image.
pub fn write_memory_image(path: &str, data: &ObjectData) -> Result<(), String> {
    let memory = memory_map(data)?;
    fs::write(path, render_memory_map(&memory)).map_err(|e| format!("{}: {}", path, e))
}
