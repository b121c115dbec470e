//! Object-file decoder.
//!
//! Parses the hex-text container back into an [`ObjectData`]. Validates
//! the magic, file type, and machine id up front, then recovers the
//! string tables, the symbol table, and each section's code and
//! relocation entries. Truncated input, out-of-range string offsets, and
//! zero entry sizes on counted tables are all decoding errors.

use std::collections::HashMap;
use std::fs;

use super::elf::{
    from_hex, read_byte, read_cstr, read_word, section_for_shndx, EHDR_SIZE, EM_SS32, ET_REL,
    MAGIC, SHN_EXTERNAL, SHN_UNDEFINED, STB_GLOBAL, STB_LOCAL, STT_NOTYPE, STT_SECTION,
    st_bind, st_type,
};
use super::ObjectData;
use crate::asm::reloc::RelocEntry;
use crate::asm::symtab::{SectionRef, SymbolBind, SymbolKind, SymbolTable};

#[derive(Debug, Clone, Copy)]
struct Shdr {
    name: u32,
    offset: u32,
    size: u32,
    entsize: u32,
}

fn read_shdr(image: &[u8], base: usize) -> Result<Shdr, String> {
    Ok(Shdr {
        name: read_word(image, base)?,
        offset: read_word(image, base + 16)?,
        size: read_word(image, base + 20)?,
        entsize: read_word(image, base + 36)?,
    })
}

fn slice<'a>(image: &'a [u8], header: &Shdr, what: &str) -> Result<&'a [u8], String> {
    let start = header.offset as usize;
    let end = start
        .checked_add(header.size as usize)
        .filter(|&e| e <= image.len())
        .ok_or_else(|| format!("{} data out of bounds", what))?;
    Ok(&image[start..end])
}

/// Decode a logical byte image into symbol/section/relocation tables.
pub fn decode(image: &[u8], source: &str) -> Result<ObjectData, String> {
    decode_inner(image).map_err(|e| format!("{}: {}", source, e))
}

fn decode_inner(image: &[u8]) -> Result<ObjectData, String> {
    if image.len() < EHDR_SIZE as usize {
        return Err("file too small for an object header".to_string());
    }
    if image[0..4] != MAGIC {
        return Err("not an object file".to_string());
    }
    let e_type = read_word(image, 16)?;
    if e_type != ET_REL {
        return Err(format!("not a relocatable object (type={})", e_type));
    }
    let e_machine = read_word(image, 20)?;
    if e_machine != EM_SS32 {
        return Err(format!(
            "wrong machine type (expected={}, got={})",
            EM_SS32, e_machine
        ));
    }
    let e_shoff = read_word(image, 36)? as usize;
    let e_shnum = read_word(image, 60)? as usize;
    if e_shnum < 3 {
        return Err("missing leading table sections".to_string());
    }
    if (e_shnum - 3) % 2 != 0 {
        return Err("unpaired code/relocation section headers".to_string());
    }

    let mut headers = Vec::with_capacity(e_shnum);
    for i in 0..e_shnum {
        headers.push(read_shdr(image, e_shoff + i * 40).map_err(|e| {
            format!("section header {}: {}", i, e)
        })?);
    }

    let shstrtab = slice(image, &headers[0], "section name table")?;
    let strtab = slice(image, &headers[1], "symbol name table")?;
    let symtab_data = slice(image, &headers[2], "symbol table")?;

    if headers[2].entsize == 0 {
        return Err("symbol table entry size is zero".to_string());
    }
    let sym_count = (headers[2].size / headers[2].entsize) as usize;

    let mut symtab = SymbolTable::new();
    for i in 0..sym_count {
        let base = i * headers[2].entsize as usize;
        let name_offset = read_word(symtab_data, base)?;
        let info = read_byte(symtab_data, base + 4)?;
        let shndx = read_word(symtab_data, base + 6)?;
        let value = read_word(symtab_data, base + 10)?;
        let size = read_word(symtab_data, base + 14)?;

        let name = read_cstr(strtab, name_offset as usize)?;
        let kind = match st_type(info) {
            STT_NOTYPE => SymbolKind::Untyped,
            STT_SECTION => SymbolKind::Section,
            t => return Err(format!("symbol '{}': unknown type {}", name, t)),
        };
        let bind = match st_bind(info) {
            STB_LOCAL => SymbolBind::Local,
            STB_GLOBAL => SymbolBind::Global,
            b => return Err(format!("symbol '{}': unknown binding {}", name, b)),
        };
        let ndx = match shndx {
            SHN_EXTERNAL => SectionRef::External,
            SHN_UNDEFINED => SectionRef::Undefined,
            other => SectionRef::Section(section_for_shndx(other).ok_or_else(|| {
                format!("symbol '{}': invalid section index {}", name, other)
            })?),
        };
        symtab.insert_row(&name, value, size, kind, bind, ndx);
    }

    let mut code = HashMap::new();
    let mut relocs = HashMap::new();
    let mut i = 3;
    while i < e_shnum {
        let code_header = &headers[i];
        let rela_header = &headers[i + 1];
        let name = read_cstr(shstrtab, code_header.name as usize)?;

        code.insert(name.clone(), slice(image, code_header, &name)?.to_vec());

        let rela_data = slice(image, rela_header, &name)?;
        if rela_header.size > 0 && rela_header.entsize == 0 {
            return Err(format!(
                "relocation table for section '{}' has entry size zero",
                name
            ));
        }
        let mut entries = Vec::new();
        if rela_header.entsize != 0 {
            for j in 0..(rela_header.size / rela_header.entsize) as usize {
                let base = j * rela_header.entsize as usize;
                entries.push(RelocEntry {
                    offset: read_word(rela_data, base)?,
                    symbol: read_word(rela_data, base + 4)?,
                    addend: read_word(rela_data, base + 8)? as i32,
                });
            }
        }
        relocs.insert(name, entries);
        i += 2;
    }

    Ok(ObjectData { symtab, code, relocs })
}

/// Read and decode an object file from disk.
pub fn read_object_file(path: &str) -> Result<ObjectData, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("{}: cannot open input file: {}", path, e))?;
    let image = from_hex(&text).map_err(|e| format!("{}: {}", path, e))?;
    decode(&image, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::reloc::RelocEntry;
    use crate::asm::symtab::{SectionRef, SymbolBind, SymbolKind, SymbolTable};
    use crate::obj::write::encode;
    use std::io::Write as _;

    fn sample_object() -> ObjectData {
        let mut symtab = SymbolTable::new();
        symtab.open_section("text", 1).unwrap();
        symtab.define_label("start", 0, 1).unwrap();
        symtab.promote_global("start").unwrap();
        symtab.declare_external("foo").unwrap();
        symtab.open_section("data", 2).unwrap();
        symtab.set_size("text", 12);
        symtab.set_size("data", 4);

        let mut code = HashMap::new();
        code.insert("text".to_string(), vec![0x91, 0x00, 0x00, 0x04, 0, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef]);
        code.insert("data".to_string(), vec![1, 2, 3, 4]);

        let mut relocs = HashMap::new();
        relocs.insert(
            "text".to_string(),
            vec![
                RelocEntry { offset: 4, symbol: 3, addend: 0 },
                RelocEntry { offset: 8, symbol: 1, addend: 12 },
            ],
        );
        relocs.insert("data".to_string(), Vec::new());

        ObjectData { symtab, code, relocs }
    }

    #[test]
    fn test_round_trip() {
        let data = sample_object();
        let image = encode(&data).unwrap();
        let back = decode(&image, "mem").unwrap();

        assert_eq!(back.symtab.len(), data.symtab.len());
        for (a, b) in data.symtab.rows().iter().zip(back.symtab.rows()) {
            assert_eq!(a.num, b.num);
            assert_eq!(a.name, b.name);
            assert_eq!(a.value, b.value);
            assert_eq!(a.size, b.size);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.bind, b.bind);
            assert_eq!(a.ndx, b.ndx);
        }
        assert_eq!(back.code, data.code);
        assert_eq!(back.relocs, data.relocs);
    }

    #[test]
    fn test_round_trip_through_file() {
        let data = sample_object();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.o");
        let path = path.to_str().unwrap();

        crate::obj::write::write_object_file(path, &data).unwrap();
        let back = read_object_file(path).unwrap();
        assert_eq!(back.code, data.code);
        assert_eq!(back.relocs, data.relocs);
        assert_eq!(back.symtab.len(), data.symtab.len());
    }

    #[test]
    fn test_external_and_undefined_shndx_round_trip() {
        let data = sample_object();
        let image = encode(&data).unwrap();
        let back = decode(&image, "mem").unwrap();
        let foo = back.symtab.lookup("foo").unwrap();
        assert_eq!(foo.ndx, SectionRef::External);
        assert_eq!(foo.bind, SymbolBind::Global);
        assert_eq!(foo.kind, SymbolKind::Untyped);
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let data = sample_object();
        let image = encode(&data).unwrap();
        assert!(decode(&image[..image.len() - 10], "mem").is_err());
        assert!(decode(&image[..40], "mem").is_err());
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let data = sample_object();
        let mut image = encode(&data).unwrap();
        image[0] = 0;
        assert!(decode(&image, "mem").is_err());
    }

    #[test]
    fn test_invalid_hex_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.o");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"7f454c4z").unwrap();
        drop(f);
        assert!(read_object_file(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_missing_file_is_rejected() {
        assert!(read_object_file("/nonexistent/unit.o").is_err());
    }
}
