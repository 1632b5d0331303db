//! String table for the binary node encoding
//!
//! Property names, selectors and keyword values repeat heavily within one
//! stylesheet. The encoder stores each distinct text once and node records
//! point at it by `StringId`.

use std::collections::HashMap;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Interned string ID (1-indexed, 0 = none)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct StringId(pub u32);

impl StringId {
    pub const NONE: StringId = StringId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Deduplicating string table
///
/// IDs are handed out in first-seen order, so iterating the pool yields the
/// table exactly as it is serialized.
#[derive(Default)]
pub struct StringPool {
    strings: Vec<Box<str>>,
    lookup: HashMap<Box<str>, StringId>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a pool from a decoded table, in ID order
    pub fn from_table<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        let mut pool = Self::new();
        for s in strings {
            let s: Box<str> = s.into();
            let id = StringId(pool.strings.len() as u32 + 1);
            pool.lookup.entry(s.clone()).or_insert(id);
            pool.strings.push(s);
        }
        pool
    }

    /// Intern a string, reusing the existing ID for repeats
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }

        let id = StringId(self.strings.len() as u32 + 1);
        let owned: Box<str> = s.into();
        self.lookup.insert(owned.clone(), id);
        self.strings.push(owned);
        id
    }

    /// String for `id`; `None` for `StringId::NONE` or out-of-range IDs
    pub fn get(&self, id: StringId) -> Option<&str> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.strings.get(index).map(|s| &**s)
    }

    pub fn get_id(&self, s: &str) -> Option<StringId> {
        self.lookup.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Strings in ID order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| &**s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_retrieve() {
        let mut pool = StringPool::new();

        let color = pool.intern("color");
        let red = pool.intern("red");
        let again = pool.intern("color");

        assert_eq!(color, again);
        assert_ne!(color, red);
        assert_eq!(color, StringId(1));
        assert_eq!(pool.get(color), Some("color"));
        assert_eq!(pool.get(red), Some("red"));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_id("red"), Some(red));
        assert_eq!(pool.get_id("blue"), None);
    }

    #[test]
    fn test_invalid_id() {
        let pool = StringPool::from_table(["a"]);
        assert_eq!(pool.get(StringId::NONE), None);
        assert_eq!(pool.get(StringId(2)), None);
        assert!(!StringId::NONE.is_valid());
    }

    #[test]
    fn test_table_order() {
        let mut pool = StringPool::new();
        pool.intern("b");
        pool.intern("a");
        pool.intern("b");
        assert_eq!(pool.iter().collect::<Vec<_>>(), vec!["b", "a"]);

        let rebuilt = StringPool::from_table(pool.iter().map(str::to_string));
        assert_eq!(rebuilt.get(StringId(2)), Some("a"));
        assert_eq!(rebuilt.get_id("b"), Some(StringId(1)));
    }
}
