//! Link pipeline driver.
//!
//! Stages run in a fixed order: load units, validate globals, plan
//! placement and merge, rewrite relocations, then either re-serialize a
//! relocatable object or resolve, patch, and emit the executable memory
//! image. The first failing stage aborts the link with no output file.

use super::check::validate_globals;
use super::emit::{write_memory_image, write_relocatable};
use super::load::load_units;
use super::merge::build_tables;
use super::resolve::{patch_sections, resolve_symbols};

/// Kind of output to produce; chosen by exactly one of the `-hex` /
/// `-relocatable` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Flat executable memory image.
    Hex,
    /// Merged relocatable object.
    Relocatable,
}

/// Turn the two CLI flags into a mode. Giving both or neither is fatal,
/// before any input file is opened.
pub fn resolve_output_mode(hex: bool, relocatable: bool) -> Result<OutputMode, String> {
    match (hex, relocatable) {
        (true, false) => Ok(OutputMode::Hex),
        (false, true) => Ok(OutputMode::Relocatable),
        (true, true) => Err("-hex and -relocatable cannot be given together".to_string()),
        (false, false) => Err("exactly one of -hex or -relocatable must be given".to_string()),
    }
}

pub struct Linker {
    inputs: Vec<String>,
    places: Vec<(String, u32)>,
    output: String,
    mode: OutputMode,
    verbose: bool,
}

impl Linker {
    /// `places` are `(section name, address)` pairs; they are sorted
    /// ascending by address before use.
    pub fn new(
        inputs: Vec<String>,
        mut places: Vec<(String, u32)>,
        output: String,
        mode: OutputMode,
        verbose: bool,
    ) -> Self {
        places.sort_by_key(|&(_, address)| address);
        Linker { inputs, places, output, mode, verbose }
    }

    pub fn link(&self) -> Result<(), String> {
        let units = load_units(&self.inputs)?;
        validate_globals(&units)?;

        let placeable = self.mode == OutputMode::Hex;
        let mut tables = build_tables(&units, &self.places, placeable)?;
        if self.verbose {
            eprintln!("{}", tables.symtab);
        }

        match self.mode {
            OutputMode::Relocatable => write_relocatable(&self.output, &tables),
            OutputMode::Hex => {
                resolve_symbols(&mut tables)?;
                patch_sections(&mut tables)?;
                write_memory_image(&self.output, &tables)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::parser::parse_source;
    use crate::asm::Assembler;
    use crate::emu::memory::Memory;
    use crate::obj::write_object_file;
    use std::path::Path;

    fn assemble_to(path: &Path, source: &str) {
        let stmts = parse_source(source).unwrap();
        let data = Assembler::new(false).assemble(&stmts).unwrap();
        write_object_file(path.to_str().unwrap(), &data).unwrap();
    }

    fn path_string(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_str().unwrap().to_string()
    }

    const UNIT1: &str = ".extern foo\n.section text\n.word foo\n.end\n";
    const UNIT2: &str = ".global foo\n.section text\n.skip 8\nfoo:\n.word 1\n.end\n";

    #[test]
    fn test_merge_and_patch_at_base_zero() {
        let dir = tempfile::tempdir().unwrap();
        let a = path_string(&dir, "a.o");
        let b = path_string(&dir, "b.o");
        let out = path_string(&dir, "image.hex");
        assemble_to(Path::new(&a), UNIT1);
        assemble_to(Path::new(&b), UNIT2);

        Linker::new(vec![a, b], Vec::new(), out.clone(), OutputMode::Hex, false)
            .link()
            .unwrap();

        let memory = Memory::load_image(&out).unwrap();
        // merged text is len1 + len2 = 16 bytes; the patched word at
        // offset 0 holds foo's address: len1 + 8
        assert_eq!(memory.get_word(0), 4 + 8);
        assert_eq!(memory.get_word(12), 1);
    }

    #[test]
    fn test_merge_and_patch_with_placement() {
        let dir = tempfile::tempdir().unwrap();
        let a = path_string(&dir, "a.o");
        let b = path_string(&dir, "b.o");
        let out = path_string(&dir, "image.hex");
        assemble_to(Path::new(&a), UNIT1);
        assemble_to(Path::new(&b), UNIT2);

        let places = vec![("text".to_string(), 0x4000_0000u32)];
        Linker::new(vec![a, b], places, out.clone(), OutputMode::Hex, false)
            .link()
            .unwrap();

        let memory = Memory::load_image(&out).unwrap();
        assert_eq!(memory.get_word(0x4000_0000), 0x4000_0000 + 4 + 8);
    }

    #[test]
    fn test_relocatable_output_links_again() {
        // Linking [a, b] then [ab, c] must equal linking [a, b, c].
        let dir = tempfile::tempdir().unwrap();
        let a = path_string(&dir, "a.o");
        let b = path_string(&dir, "b.o");
        let c = path_string(&dir, "c.o");
        let ab = path_string(&dir, "ab.o");
        let direct = path_string(&dir, "direct.hex");
        let staged = path_string(&dir, "staged.hex");

        assemble_to(Path::new(&a), UNIT1);
        assemble_to(Path::new(&b), UNIT2);
        assemble_to(
            Path::new(&c),
            ".extern foo\n.section data\n.word foo, 7\n.end\n",
        );

        Linker::new(
            vec![a.clone(), b.clone(), c.clone()],
            Vec::new(),
            direct.clone(),
            OutputMode::Hex,
            false,
        )
        .link()
        .unwrap();

        Linker::new(
            vec![a, b],
            Vec::new(),
            ab.clone(),
            OutputMode::Relocatable,
            false,
        )
        .link()
        .unwrap();
        Linker::new(vec![ab, c], Vec::new(), staged.clone(), OutputMode::Hex, false)
            .link()
            .unwrap();

        let direct_text = std::fs::read_to_string(&direct).unwrap();
        let staged_text = std::fs::read_to_string(&staged).unwrap();
        assert_eq!(direct_text, staged_text);
    }

    #[test]
    fn test_undefined_extern_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = path_string(&dir, "a.o");
        let out = path_string(&dir, "image.hex");
        assemble_to(Path::new(&a), ".extern bar\n.section text\n.word bar\n.end\n");

        let err = Linker::new(vec![a], Vec::new(), out.clone(), OutputMode::Hex, false)
            .link()
            .unwrap_err();
        assert!(err.contains("bar"), "{}", err);
        assert!(!Path::new(&out).exists());
    }

    #[test]
    fn test_duplicate_definition_aborts_in_either_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = path_string(&dir, "a.o");
        let b = path_string(&dir, "b.o");
        let out = path_string(&dir, "out.o");
        let source = ".global f\n.section text\nf:\nhalt\n.end\n";
        assemble_to(Path::new(&a), source);
        assemble_to(Path::new(&b), source);

        for inputs in [vec![a.clone(), b.clone()], vec![b, a]] {
            let err = Linker::new(
                inputs,
                Vec::new(),
                out.clone(),
                OutputMode::Relocatable,
                false,
            )
            .link()
            .unwrap_err();
            assert!(err.contains("multiple definitions"), "{}", err);
        }
    }

    #[test]
    fn test_output_mode_flags() {
        assert_eq!(resolve_output_mode(true, false), Ok(OutputMode::Hex));
        assert_eq!(
            resolve_output_mode(false, true),
            Ok(OutputMode::Relocatable)
        );
        assert!(resolve_output_mode(true, true).is_err());
        assert!(resolve_output_mode(false, false).is_err());
    }

    #[test]
    fn test_missing_input_file() {
        let err = Linker::new(
            vec!["/nonexistent/x.o".to_string()],
            Vec::new(),
            "/tmp/out".to_string(),
            OutputMode::Hex,
            false,
        )
        .link()
        .unwrap_err();
        assert!(err.contains("x.o"), "{}", err);
    }
}
