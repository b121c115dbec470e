//! Object-file encoder.
//!
//! Serializes an [`ObjectData`] into the hex-text container. Both the
//! assembler (per-unit objects) and the linker (merged relocatable
//! objects) write through this one path. Section headers get their
//! `sh_offset` values from a running accumulation over everything that
//! precedes them.

use std::fs;
use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::elf::{
    to_hex, shndx_for_section, EHDR_SIZE, EM_SS32, ET_REL, MAGIC, RELA_ENTRY_SIZE, SHDR_SIZE,
    SHN_EXTERNAL, SHN_UNDEFINED, SHT_CODE, SHT_RELA, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL,
    STB_LOCAL, STT_NOTYPE, STT_SECTION, SYM_ENTRY_SIZE,
    st_info,
};
use super::ObjectData;
use crate::asm::symtab::{SectionRef, Symbol, SymbolBind, SymbolKind};

fn encode_shndx(ndx: SectionRef) -> u32 {
    match ndx {
        SectionRef::External => SHN_EXTERNAL,
        SectionRef::Undefined => SHN_UNDEFINED,
        SectionRef::Section(n) => shndx_for_section(n),
    }
}

/// Write one 10-word section header.
fn write_shdr<W: Write>(
    w: &mut W,
    name: u32,
    sh_type: u32,
    offset: u32,
    size: u32,
    link: u32,
    info: u32,
    entsize: u32,
) -> io::Result<()> {
    // flags, addr, and addralign are always zero in this format
    for value in [name, sh_type, 0, 0, offset, size, link, info, 0, entsize] {
        w.write_u32::<LittleEndian>(value)?;
    }
    Ok(())
}

/// Encode the full logical byte image of an object file.
pub fn encode(data: &ObjectData) -> io::Result<Vec<u8>> {
    let sections: Vec<&Symbol> = data
        .symtab
        .rows()
        .iter()
        .filter(|s| s.kind == SymbolKind::Section)
        .collect();
    let shnum = 3 + 2 * sections.len() as u32;

    // Section-name string table: the three fixed table names first, then a
    // name and a ".rela." name per user section.
    let mut shstrtab: Vec<u8> = Vec::new();
    for name in ["shstrtab", "strtab", "symtab"] {
        shstrtab.extend_from_slice(name.as_bytes());
        shstrtab.push(0);
    }
    let mut section_name_offsets = Vec::with_capacity(sections.len());
    for s in &sections {
        let code_name = shstrtab.len() as u32;
        shstrtab.extend_from_slice(s.name.as_bytes());
        shstrtab.push(0);
        let rela_name = shstrtab.len() as u32;
        shstrtab.extend_from_slice(format!(".rela.{}", s.name).as_bytes());
        shstrtab.push(0);
        section_name_offsets.push((code_name, rela_name));
    }

    // Symbol-name string table and packed symbol entries; the null symbol
    // is implicit and never serialized.
    let mut strtab: Vec<u8> = Vec::new();
    let mut symtab: Vec<u8> = Vec::new();
    let mut last_local = 0u32;
    for s in data.symtab.rows().iter().skip(1) {
        let name_offset = strtab.len() as u32;
        strtab.extend_from_slice(s.name.as_bytes());
        strtab.push(0);

        let bind = match s.bind {
            SymbolBind::Local => STB_LOCAL,
            SymbolBind::Global => STB_GLOBAL,
        };
        let typ = match s.kind {
            SymbolKind::Section => STT_SECTION,
            _ => STT_NOTYPE,
        };
        symtab.write_u32::<LittleEndian>(name_offset)?;
        symtab.write_u8(st_info(bind, typ))?;
        symtab.write_u8(0)?;
        symtab.write_u32::<LittleEndian>(encode_shndx(s.ndx))?;
        symtab.write_u32::<LittleEndian>(if s.kind == SymbolKind::Section { 0 } else { s.value })?;
        symtab.write_u32::<LittleEndian>(s.size)?;
        if s.bind == SymbolBind::Local {
            last_local = s.num;
        }
    }

    // Relocation blobs, one per section in the same order.
    let mut rela_blobs: Vec<Vec<u8>> = Vec::with_capacity(sections.len());
    for s in &sections {
        let mut blob = Vec::new();
        if let Some(entries) = data.relocs.get(&s.name) {
            for e in entries {
                blob.write_u32::<LittleEndian>(e.offset)?;
                blob.write_u32::<LittleEndian>(e.symbol)?;
                blob.write_u32::<LittleEndian>(e.addend as u32)?;
            }
        }
        rela_blobs.push(blob);
    }

    let empty = Vec::new();
    let code_of = |s: &Symbol| data.code.get(&s.name).unwrap_or(&empty);

    // Running offsets over the leading tables and the code/rela pairs.
    let shstrtab_offset = EHDR_SIZE + shnum * SHDR_SIZE;
    let strtab_offset = shstrtab_offset + shstrtab.len() as u32;
    let symtab_offset = strtab_offset + strtab.len() as u32;
    let mut running = symtab_offset + symtab.len() as u32;
    let mut pair_offsets = Vec::with_capacity(sections.len());
    for (i, &s) in sections.iter().enumerate() {
        let code_offset = running;
        running += code_of(s).len() as u32;
        let rela_offset = running;
        running += rela_blobs[i].len() as u32;
        pair_offsets.push((code_offset, rela_offset));
    }

    let mut out: Vec<u8> = Vec::with_capacity(running as usize);

    // File header.
    out.extend_from_slice(&MAGIC);
    out.resize(16, 0);
    for value in [
        ET_REL,
        EM_SS32,
        0,
        0,
        0,
        EHDR_SIZE,
        0,
        EHDR_SIZE,
        0,
        0,
        SHDR_SIZE,
        shnum,
        0,
    ] {
        out.write_u32::<LittleEndian>(value)?;
    }

    // Section-header table. The three fixed names sit at known offsets in
    // the shstrtab.
    let strtab_name = "shstrtab".len() as u32 + 1;
    let symtab_name = strtab_name + "strtab".len() as u32 + 1;
    write_shdr(&mut out, 0, SHT_STRTAB, shstrtab_offset, shstrtab.len() as u32, 0, 0, 0)?;
    write_shdr(&mut out, strtab_name, SHT_STRTAB, strtab_offset, strtab.len() as u32, 0, 0, 0)?;
    write_shdr(
        &mut out,
        symtab_name,
        SHT_SYMTAB,
        symtab_offset,
        symtab.len() as u32,
        1,
        last_local + 1,
        SYM_ENTRY_SIZE,
    )?;
    for (i, &s) in sections.iter().enumerate() {
        let ordinal = match s.ndx {
            SectionRef::Section(n) => n,
            _ => 0,
        };
        write_shdr(
            &mut out,
            section_name_offsets[i].0,
            SHT_CODE,
            pair_offsets[i].0,
            code_of(s).len() as u32,
            0,
            0,
            0,
        )?;
        write_shdr(
            &mut out,
            section_name_offsets[i].1,
            SHT_RELA,
            pair_offsets[i].1,
            rela_blobs[i].len() as u32,
            2,
            shndx_for_section(ordinal) + 1,
            RELA_ENTRY_SIZE,
        )?;
    }

    // Section contents in header order.
    out.extend_from_slice(&shstrtab);
    out.extend_from_slice(&strtab);
    out.extend_from_slice(&symtab);
    for (i, &s) in sections.iter().enumerate() {
        out.extend_from_slice(code_of(s));
        out.extend_from_slice(&rela_blobs[i]);
    }

    Ok(out)
}

/// Encode `data` and write it to `path` as hex text.
pub fn write_object_file(path: &str, data: &ObjectData) -> Result<(), String> {
    let image = encode(data).map_err(|e| format!("{}: {}", path, e))?;
    fs::write(path, to_hex(&image)).map_err(|e| format!("{}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::symtab::SymbolTable;
    use crate::obj::elf::read_word;

    #[test]
    fn test_header_layout() {
        let mut symtab = SymbolTable::new();
        symtab.open_section("text", 1).unwrap();
        symtab.set_size("text", 8);
        let mut data = ObjectData { symtab, ..Default::default() };
        data.code.insert("text".to_string(), vec![0; 8]);

        let image = encode(&data).unwrap();
        assert_eq!(&image[0..4], &MAGIC);
        // shnum = 3 leading tables + one code/rela pair
        assert_eq!(read_word(&image, 60).unwrap(), 5);
        // section headers start right after the file header
        assert_eq!(read_word(&image, 36).unwrap(), EHDR_SIZE);
        // first section header is the shstrtab at the end of the headers
        let shstrtab_offset = read_word(&image, EHDR_SIZE as usize + 16).unwrap();
        assert_eq!(shstrtab_offset, EHDR_SIZE + 5 * SHDR_SIZE);
        // its contents start with the fixed table names
        let start = shstrtab_offset as usize;
        assert_eq!(&image[start..start + 9], b"shstrtab\0");
    }
}
