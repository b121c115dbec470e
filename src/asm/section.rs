//! Section buffers and forward-link recording.
//!
//! Each section accumulates machine code and a forward-link table: for
//! every symbol referenced before its value is known, the list of byte
//! offsets that need patching once it is. The forward links are turned
//! into relocation entries when the unit ends.

use std::collections::HashMap;

/// How a resolved value combines with the patched location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Add,
    Sub,
}

/// A single deferred patch within a section.
#[derive(Debug, Clone)]
pub struct PatchAction {
    /// Byte offset of the patch target within the section.
    pub offset: u32,
    pub op: PatchOp,
    /// True for 12-bit displacement fields; the value must fit in a signed
    /// 12-bit immediate instead of a full word.
    pub narrow: bool,
}

/// All deferred patches against one symbol, in recording order.
#[derive(Debug)]
pub struct FlinkRow {
    pub symbol: String,
    pub actions: Vec<PatchAction>,
}

/// A named region of code under construction. `base` is always 0 within a
/// unit; real base addresses exist only at link time.
#[derive(Debug)]
pub struct Section {
    pub name: String,
    pub base: u32,
    pub length: u32,
    pub data: Vec<u8>,
    flink: Vec<FlinkRow>,
    flink_index: HashMap<String, usize>,
}

impl Section {
    pub fn new(name: &str) -> Self {
        Section {
            name: name.to_string(),
            base: 0,
            length: 0,
            data: Vec::new(),
            flink: Vec::new(),
            flink_index: HashMap::new(),
        }
    }

    /// Append one little-endian machine word.
    pub fn append_word(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Record a deferred patch against `symbol` at byte `offset`.
    pub fn record_forward_ref(&mut self, symbol: &str, offset: u32, op: PatchOp, narrow: bool) {
        let action = PatchAction { offset, op, narrow };
        match self.flink_index.get(symbol) {
            Some(&i) => self.flink[i].actions.push(action),
            None => {
                self.flink_index.insert(symbol.to_string(), self.flink.len());
                self.flink.push(FlinkRow {
                    symbol: symbol.to_string(),
                    actions: vec![action],
                });
            }
        }
    }

    /// Forward-link rows in first-reference order.
    pub fn flink(&self) -> &[FlinkRow] {
        &self.flink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_word_little_endian() {
        let mut sec = Section::new("text");
        sec.append_word(0x1234_5678);
        assert_eq!(sec.data, vec![0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_forward_refs_group_by_symbol() {
        let mut sec = Section::new("text");
        sec.record_forward_ref("a", 0, PatchOp::Add, false);
        sec.record_forward_ref("b", 4, PatchOp::Add, false);
        sec.record_forward_ref("a", 8, PatchOp::Add, true);

        let rows = sec.flink();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "a");
        assert_eq!(rows[0].actions.len(), 2);
        assert_eq!(rows[0].actions[1].offset, 8);
        assert!(rows[0].actions[1].narrow);
        assert_eq!(rows[1].symbol, "b");
    }
}
