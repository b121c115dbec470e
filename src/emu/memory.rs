//! Sparse emulated memory and the memory-image loader.
//!
//! Memory is a sparse byte map; addresses nobody wrote read back as
//! zero. The loader consumes the linker's executable format: one
//! `decimalAddress: hexByte` line per occupied byte.

use std::collections::BTreeMap;
use std::fs;

#[derive(Debug, Default)]
pub struct Memory {
    bytes: BTreeMap<u32, u8>,
}

impl Memory {
    pub fn new() -> Self {
        Memory { bytes: BTreeMap::new() }
    }

    /// Parse a memory image from its textual form.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut memory = Memory::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (address, value) = line
                .split_once(':')
                .ok_or_else(|| format!("line {}: malformed memory image line '{}'", idx + 1, line))?;
            let address: u32 = address
                .trim()
                .parse()
                .map_err(|_| format!("line {}: invalid address '{}'", idx + 1, address.trim()))?;
            let value = u8::from_str_radix(value.trim(), 16)
                .map_err(|_| format!("line {}: invalid byte '{}'", idx + 1, value.trim()))?;
            memory.bytes.insert(address, value);
        }
        Ok(memory)
    }

    /// Load a memory image file.
    pub fn load_image(path: &str) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("{}: cannot open input file: {}", path, e))?;
        Self::parse(&text).map_err(|e| format!("{}: {}", path, e))
    }

    pub fn get_byte(&self, address: u32) -> u8 {
        self.bytes.get(&address).copied().unwrap_or(0)
    }

    pub fn set_byte(&mut self, address: u32, value: u8) {
        self.bytes.insert(address, value);
    }

    /// Read a little-endian word.
    pub fn get_word(&self, address: u32) -> u32 {
        u32::from_le_bytes([
            self.get_byte(address),
            self.get_byte(address.wrapping_add(1)),
            self.get_byte(address.wrapping_add(2)),
            self.get_byte(address.wrapping_add(3)),
        ])
    }

    /// Write a little-endian word.
    pub fn set_word(&mut self, address: u32, value: u32) {
        for (i, byte) in value.to_le_bytes().iter().enumerate() {
            self.set_byte(address.wrapping_add(i as u32), *byte);
        }
    }
}
