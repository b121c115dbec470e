//! Section placement and table merging.
//!
//! Builds the link's single symbol table, concatenated section buffers,
//! and rewritten relocation tables out of the per-file tables. Sections
//! with the same name across units merge into one region; every offset
//! and addend that pointed into a file's own copy is shifted by the sizes
//! contributed by the files before it.

use std::collections::{HashMap, HashSet};

use super::load::Unit;
use crate::asm::reloc::RelocEntry;
use crate::asm::symtab::{SectionRef, Symbol, SymbolBind, SymbolKind, SymbolTable};
use crate::obj::ObjectData;

/// Section names that occur in more than one unit.
pub fn merged_section_names(units: &[Unit]) -> HashSet<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = HashSet::new();
    for unit in units {
        for sym in unit.data.symtab.rows() {
            if sym.kind != SymbolKind::Section {
                continue;
            }
            if !seen.insert(&sym.name) {
                merged.insert(sym.name.clone());
            }
        }
    }
    merged
}

/// Total size of all same-named section copies across units.
fn merged_size(units: &[Unit], name: &str) -> u32 {
    units
        .iter()
        .filter_map(|u| u.data.symtab.lookup(name))
        .filter(|s| s.kind == SymbolKind::Section)
        .map(|s| s.size)
        .sum()
}

/// Bytes contributed to the merged section `name` by units before
/// `unit_idx`; offsets from that unit shift by this much.
fn preceding_contribution(units: &[Unit], unit_idx: usize, name: &str) -> u32 {
    units[..unit_idx]
        .iter()
        .filter_map(|u| u.data.symtab.lookup(name))
        .filter(|s| s.kind == SymbolKind::Section)
        .map(|s| s.size)
        .sum()
}

fn place_address(places: &[(String, u32)], name: &str) -> Option<u32> {
    places.iter().find(|(n, _)| n == name).map(|&(_, a)| a)
}

/// The name of the section a symbol row belongs to, within its own unit.
fn owning_section_name<'a>(unit: &'a Unit, sym: &Symbol) -> Result<&'a str, String> {
    let ordinal = match sym.ndx {
        SectionRef::Section(n) => n,
        _ => {
            return Err(format!(
                "{}: could not find section for symbol '{}'",
                unit.file_name, sym.name
            ))
        }
    };
    unit.data
        .symtab
        .section_symbol(ordinal)
        .map(|s| s.name.as_str())
        .ok_or_else(|| {
            format!(
                "{}: could not find section with ordinal {} for symbol '{}'",
                unit.file_name, ordinal, sym.name
            )
        })
}

/// Build the merged symbol table, section buffers, and relocation tables.
///
/// `placeable` is true only when producing an executable image; explicit
/// placements are ignored for relocatable output, where sections always
/// lay out sequentially from 0. `places` must be sorted ascending by
/// address.
pub fn build_tables(
    units: &[Unit],
    places: &[(String, u32)],
    placeable: bool,
) -> Result<ObjectData, String> {
    let merged = merged_section_names(units);
    let mut general = SymbolTable::new();
    let mut location_counter: u32 = 0;

    // Explicitly placed sections first, in ascending address order. Each
    // placement must start at or above the previous end.
    if placeable {
        for (place_name, address) in places {
            for unit in units {
                let row = match unit.data.symtab.lookup(place_name) {
                    Some(s) if s.kind == SymbolKind::Section => s,
                    _ => continue,
                };
                if general.lookup(&row.name).is_some() {
                    continue;
                }
                if *address < location_counter {
                    return Err(format!(
                        "sections overlap while placing section '{}' at address {:#x}",
                        row.name, address
                    ));
                }
                let size = if merged.contains(&row.name) {
                    merged_size(units, &row.name)
                } else {
                    row.size
                };
                location_counter = address + size;
                let num = general.len() as u32;
                general.insert_row(
                    &row.name,
                    *address,
                    size,
                    SymbolKind::Section,
                    SymbolBind::Local,
                    SectionRef::Section(num),
                );
            }
        }
    }

    // Remaining sections, in encounter order across units.
    for unit in units {
        for row in unit.data.symtab.rows() {
            if row.kind != SymbolKind::Section {
                continue;
            }
            if placeable && place_address(places, &row.name).is_some() {
                continue;
            }
            if general.lookup(&row.name).is_some() {
                continue;
            }
            let size = if merged.contains(&row.name) {
                merged_size(units, &row.name)
            } else {
                row.size
            };
            let value = location_counter;
            location_counter = value + size;
            let num = general.len() as u32;
            general.insert_row(
                &row.name,
                value,
                size,
                SymbolKind::Section,
                SymbolBind::Local,
                SectionRef::Section(num),
            );
        }
    }

    // Global non-section symbols. Locals were already folded into
    // relocation addends by the assembler; external markers are gone once
    // validated.
    for (idx, unit) in units.iter().enumerate() {
        for row in unit.data.symtab.rows() {
            if row.kind != SymbolKind::Untyped || row.num == 0 {
                continue;
            }
            if row.ndx == SectionRef::External || row.bind == SymbolBind::Local {
                continue;
            }
            let section_name = owning_section_name(unit, row)?;
            let section_row = general.lookup(section_name).ok_or_else(|| {
                format!(
                    "{}: section '{}' missing from the merged table",
                    unit.file_name, section_name
                )
            })?;
            let ndx = section_row.ndx;
            let value = if merged.contains(section_name) {
                preceding_contribution(units, idx, section_name) + row.value
            } else {
                row.value
            };
            general.insert_row(&row.name, value, 0, SymbolKind::Untyped, row.bind, ndx);
        }
    }

    // Relocation tables: renumber symbol ordinals into the merged table
    // and shift offsets/addends of merged sections.
    let mut relocs: HashMap<String, Vec<RelocEntry>> = HashMap::new();
    for (idx, unit) in units.iter().enumerate() {
        for (section_name, entries) in &unit.data.relocs {
            for entry in entries {
                let old_sym = unit.data.symtab.get(entry.symbol).ok_or_else(|| {
                    format!(
                        "{}: relocation in section '{}' references unknown symbol ordinal {}",
                        unit.file_name, section_name, entry.symbol
                    )
                })?;
                let new_sym = general.lookup(&old_sym.name).ok_or_else(|| {
                    format!(
                        "{}: relocation in section '{}' references symbol '{}' missing from the merged table",
                        unit.file_name, section_name, old_sym.name
                    )
                })?;
                let addend = if merged.contains(&new_sym.name) {
                    (preceding_contribution(units, idx, &new_sym.name) as i32)
                        .wrapping_add(entry.addend)
                } else {
                    entry.addend
                };
                let offset = if merged.contains(section_name) {
                    preceding_contribution(units, idx, section_name) + entry.offset
                } else {
                    entry.offset
                };
                relocs.entry(section_name.clone()).or_default().push(RelocEntry {
                    offset,
                    symbol: new_sym.num,
                    addend,
                });
            }
        }
    }

    // Concatenate section contents across units in file order.
    let mut code: HashMap<String, Vec<u8>> = HashMap::new();
    for row in general.rows() {
        if row.kind != SymbolKind::Section {
            continue;
        }
        let mut buffer = Vec::with_capacity(row.size as usize);
        for unit in units {
            if let Some(bytes) = unit.data.code.get(&row.name) {
                buffer.extend_from_slice(bytes);
            }
        }
        code.insert(row.name.clone(), buffer);
    }

    Ok(ObjectData { symtab: general, code, relocs })
}
