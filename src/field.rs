use std::ops::Range;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::type_code::TypeCode;

/// Public summary of one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldInfo<'a> {
    pub name: &'a str,
    pub type_code: TypeCode,
    pub count: usize,
}

/// One row of the field table. `offset` and `size` locate the field's values in the message's
/// data store; for variable-size types the range includes every value's length prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FieldEntry {
    pub name: String,
    pub type_code: TypeCode,
    pub count: usize,
    pub offset: usize,
    pub size: usize,
}

impl FieldEntry {
    pub fn range(&self) -> Range<usize> {
        self.offset..(self.offset + self.size)
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    pub fn info(&self) -> FieldInfo<'_> {
        FieldInfo {
            name: &self.name,
            type_code: self.type_code,
            count: self.count,
        }
    }
}

/// Fields in insertion order, keyed by name. Names are unique, and field ranges tile the data
/// store with no gaps: each field starts where the previous one ends.
#[derive(Clone, Debug, Default)]
pub(crate) struct FieldTable {
    entries: IndexMap<String, FieldEntry>,
}

impl FieldTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Values<'_, String, FieldEntry> {
        self.entries.values()
    }

    pub fn get(&self, index: usize) -> Option<&FieldEntry> {
        self.entries.get_index(index).map(|(_, entry)| entry)
    }

    /// Get a field that is known to exist.
    pub fn at(&self, index: usize) -> &FieldEntry {
        &self.entries[index]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    pub fn find(&self, name: &str) -> Option<&FieldEntry> {
        self.entries.get(name)
    }

    /// Add a new field at the end of the table.
    pub fn push(&mut self, entry: FieldEntry) -> Result<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(Error::DuplicateName { name: entry.name });
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Resize field `index` to `new_size` bytes and `new_count` values, shifting every later field
    /// so the ranges stay contiguous.
    pub fn resize(&mut self, index: usize, new_size: usize, new_count: usize) {
        let entry = &mut self.entries[index];
        let old_size = entry.size;
        entry.size = new_size;
        entry.count = new_count;
        for later in self.entries.values_mut().skip(index + 1) {
            later.offset = later.offset + new_size - old_size;
        }
    }

    /// Rename field `index` in place. The caller checks that `name` is free.
    pub fn rename(&mut self, index: usize, name: String) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .enumerate()
            .map(|(i, (key, mut entry))| {
                if i == index {
                    entry.name = name.clone();
                    (name.clone(), entry)
                } else {
                    (key, entry)
                }
            })
            .collect();
    }

    /// Drop field `index`, shifting every later field forward over its bytes.
    pub fn remove(&mut self, index: usize) -> Option<FieldEntry> {
        let (_, entry) = self.entries.shift_remove_index(index)?;
        for later in self.entries.values_mut().skip(index) {
            later.offset -= entry.size;
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// Order matters: two tables holding the same fields in a different order are different messages.
impl PartialEq for FieldTable {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for FieldTable {}
