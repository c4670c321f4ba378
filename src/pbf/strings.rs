// Per-block string table.
//
// Index 0 is the empty string on every table this crate builds. The dense
// node encoding relies on it: a 0 in `keys_vals` ends a node's tag run.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Bidirectional mapping between byte strings and dense indices.
///
/// Tables built with [`StringTable::new`] deduplicate on insert. Tables
/// parsed from the wire are only indexed the first time something is
/// interned into them, so decode-only use never pays for hashing.
#[derive(Debug, Clone)]
pub struct StringTable {
    strings: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, u32>,
    /// Entries `[0, indexed)` have been scanned into `index`.
    indexed: usize,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    /// A table holding only the empty string at index 0.
    pub fn new() -> Self {
        Self {
            strings: vec![Vec::new()],
            index: HashMap::new(),
            indexed: 1,
        }
    }

    /// Wrap a table read from the wire. Entries are kept as-is.
    pub fn from_wire(strings: Vec<Vec<u8>>) -> Self {
        Self {
            strings,
            index: HashMap::new(),
            indexed: 0,
        }
    }

    /// Replace the contents with `strings`, keeping allocations.
    pub fn reset_from_wire(&mut self, strings: Vec<Vec<u8>>) {
        self.strings = strings;
        self.index.clear();
        self.indexed = 0;
    }

    /// Reset to the single empty entry, keeping allocations.
    pub fn clear(&mut self) {
        self.strings.truncate(1);
        match self.strings.first_mut() {
            Some(first) => first.clear(),
            None => self.strings.push(Vec::new()),
        }
        self.index.clear();
        self.indexed = 1;
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Index of `s`, appending it if it is not present yet.
    /// The empty string is always 0.
    pub fn internalize(&mut self, s: impl AsRef<[u8]>) -> u32 {
        let s = s.as_ref();
        if s.is_empty() {
            return 0;
        }
        if self.strings.is_empty() {
            self.strings.push(Vec::new());
        }
        self.catch_up_index();
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_vec());
        self.index.insert(s.to_vec(), idx);
        self.indexed = self.strings.len();
        idx
    }

    /// Like [`internalize`](Self::internalize), with `None` mapping to 0.
    pub fn internalize_opt(&mut self, s: Option<&str>) -> u32 {
        s.map_or(0, |s| self.internalize(s))
    }

    /// Raw bytes at `index`.
    pub fn lookup(&self, index: i64) -> Result<&[u8]> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(Vec::as_slice)
            .ok_or(Error::Index {
                index,
                len: self.strings.len(),
            })
    }

    /// UTF-8 string at `index`.
    pub fn lookup_str(&self, index: i64) -> Result<&str> {
        let bytes = self.lookup(index)?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::format(format!("string table entry {index} is not UTF-8: {e}")))
    }

    pub fn as_slice(&self) -> &[Vec<u8>] {
        &self.strings
    }

    pub fn into_wire(self) -> Vec<Vec<u8>> {
        self.strings
    }

    /// Copy the entries into a wire vector, overwriting element-for-element
    /// and dropping whatever the vector held beyond our length.
    pub fn write_wire(&self, out: &mut Vec<Vec<u8>>) {
        for (i, s) in self.strings.iter().enumerate() {
            match out.get_mut(i) {
                Some(slot) => {
                    slot.clear();
                    slot.extend_from_slice(s);
                }
                None => out.push(s.clone()),
            }
        }
        out.truncate(self.strings.len());
    }

    fn catch_up_index(&mut self) {
        // First occurrence wins if a foreign table carries duplicates.
        for i in self.indexed..self.strings.len() {
            let s = &self.strings[i];
            if !s.is_empty() && !self.index.contains_key(s) {
                self.index.insert(s.clone(), i as u32);
            }
        }
        self.indexed = self.strings.len();
    }
}
