//! Vendor prefix lookup for CSS property names
//!
//! The table is a succinct bitmap trie flattened by depth. Each depth holds
//! two 27-symbol bitmaps (bit 0 stands for any character outside `a`-`z`,
//! bits 1-26 for the letters): `recurse` marks characters that continue some
//! longer key, `result` marks characters that end one. Values for `result`
//! bits are stored densely, indexed by the bit's popcount rank, as 4-bit
//! slots packed into one word.
//!
//! Keys are matched per depth rather than per path, so two keys ending on the
//! same character at the same depth share its slot and the later entry wins.
//! Lookups therefore over-approximate: `padding` matches the `d` of `ord` at
//! depth 2 and reports `-webkit-`.

use bitflags::bitflags;
use once_cell::sync::Lazy;

use crate::error::BuildCapacityError;

bitflags! {
    /// Set of vendor prefixes a property needs
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct VendorPrefixes: u8 {
        const WEBKIT = 1;
        const MOZ = 2;
        const MS = 4;
    }
}

impl VendorPrefixes {
    /// Prefix strings in output order (`-webkit-`, `-moz-`, `-ms-`)
    pub fn prefixes(self) -> impl Iterator<Item = &'static str> {
        [
            (VendorPrefixes::WEBKIT, "-webkit-"),
            (VendorPrefixes::MOZ, "-moz-"),
            (VendorPrefixes::MS, "-ms-"),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, prefix)| prefix)
    }
}

/// Value slots per depth
pub const VALUE_CAPACITY: usize = 8;
const SLOT_BITS: u32 = 4;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Level {
    recurse: u32,
    result: u32,
    values: u32,
}

fn char_bit(c: char) -> u32 {
    if c.is_ascii_lowercase() {
        1 << (c as u32 - 96)
    } else {
        1
    }
}

/// Number of set bits in `bitmap` below `bit`
fn rank(bitmap: u32, bit: u32) -> u32 {
    (bitmap & (bit - 1)).count_ones()
}

/// Immutable prefix matcher
#[derive(Clone, Debug, Default)]
pub struct PrefixTable {
    levels: Vec<Level>,
}

impl PrefixTable {
    /// Build the per-depth bitmaps from `(key, vendors)` entries
    pub fn build<'a, I>(entries: I) -> Result<Self, BuildCapacityError>
    where
        I: IntoIterator<Item = (&'a str, VendorPrefixes)>,
    {
        let entries: Vec<(Vec<char>, VendorPrefixes)> = entries
            .into_iter()
            .map(|(key, vendors)| (key.chars().collect(), vendors))
            .collect();
        let max_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);

        let mut levels = Vec::with_capacity(max_len);
        for depth in 0..max_len {
            let mut level = Level::default();
            let mut pending: Vec<(u32, VendorPrefixes)> = Vec::new();

            for (key, vendors) in &entries {
                let Some(&c) = key.get(depth) else { continue };
                let bit = char_bit(c);
                if depth + 1 == key.len() {
                    level.result |= bit;
                    match pending.iter_mut().find(|(b, _)| *b == bit) {
                        Some((_, slot)) => *slot = *vendors,
                        None => pending.push((bit, *vendors)),
                    }
                } else {
                    level.recurse |= bit;
                }
            }

            if pending.len() > VALUE_CAPACITY {
                return Err(BuildCapacityError {
                    depth,
                    needed: pending.len(),
                    capacity: VALUE_CAPACITY,
                });
            }
            for (bit, vendors) in pending {
                let slot = rank(level.result, bit) * SLOT_BITS;
                level.values |= (vendors.bits() as u32) << slot;
            }
            levels.push(level);
        }

        log::debug!("built prefix table with {} levels", levels.len());
        Ok(Self { levels })
    }

    /// Vendor set of the longest key that prefixes `name`
    pub fn lookup(&self, name: &str) -> VendorPrefixes {
        let mut best = VendorPrefixes::empty();
        for (level, c) in self.levels.iter().zip(name.chars()) {
            let bit = char_bit(c);
            if level.result & bit != 0 {
                let slot = rank(level.result, bit) * SLOT_BITS;
                best = VendorPrefixes::from_bits_truncate(((level.values >> slot) & SLOT_MASK) as u8);
            }
            if level.recurse & bit == 0 {
                break;
            }
        }
        best
    }

    /// Longest key length
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

// ============================================================================
// Built-in table
// ============================================================================

const W: VendorPrefixes = VendorPrefixes::WEBKIT;
const M: VendorPrefixes = VendorPrefixes::MOZ;
const MS: VendorPrefixes = VendorPrefixes::MS;
const WM: VendorPrefixes = VendorPrefixes::WEBKIT.union(VendorPrefixes::MOZ);
const WMS: VendorPrefixes = VendorPrefixes::WEBKIT.union(VendorPrefixes::MS);
const ALL: VendorPrefixes = VendorPrefixes::all();

/// Property name prefixes that still need vendor copies
pub const DEFAULT_ENTRIES: &[(&str, VendorPrefixes)] = &[
    ("j", W),
    ("an", W),
    ("ap", WM),
    ("us", ALL),
    ("br", ALL),
    ("wr", WMS),
    ("pe", W),
    ("hy", ALL),
    ("gr", MS),
    ("wra", MS),
    ("fle", W),
    ("mas", W),
    ("ord", W),
    ("reg", WMS),
    ("tab-s", M),
    ("colu", WM),
    ("filt", W),
    ("flow", WMS),
    ("font-k", W),
    ("backd", W),
    ("text-e", W),
    ("box-de", W),
    ("clip-p", W),
    ("backf", W),
    ("font-fe", W),
    ("align-c", W),
    ("align-i", W),
    ("align-s", W),
    ("shape-i", W),
    ("text-si", WMS),
    ("scroll-s", WMS),
    ("border-im", W),
    ("transform", W),
    ("transform-o", W),
    ("transform-s", W),
    ("text-align-l", M),
    ("transition-d", W),
    ("transition-p", W),
    ("transition-t", W),
    ("text-decoration-s", W),
    ("text-decoration-l", W),
    ("text-decoration-c", W),
];

static DEFAULT_TABLE: Lazy<PrefixTable> = Lazy::new(|| {
    PrefixTable::build(DEFAULT_ENTRIES.iter().copied()).unwrap_or_else(|err| {
        log::error!("built-in prefix table rejected: {}", err);
        PrefixTable::default()
    })
});

/// Look up `name` in the built-in table
pub fn lookup(name: &str) -> VendorPrefixes {
    DEFAULT_TABLE.lookup(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let table = PrefixTable::build([("transform", W), ("transform-o", MS)]).unwrap();
        assert_eq!(table.lookup("transform-origin"), MS);
        assert_eq!(table.lookup("transform"), W);
        assert_eq!(table.lookup("transform-style"), W);
        assert_eq!(table.lookup("color"), VendorPrefixes::empty());
        assert_eq!(table.lookup(""), VendorPrefixes::empty());
        assert_eq!(table.depth(), 11);
    }

    #[test]
    fn test_default_table() {
        assert!(PrefixTable::build(DEFAULT_ENTRIES.iter().copied()).is_ok());
        assert_eq!(lookup("user-select"), ALL);
        assert_eq!(lookup("transform-origin"), W);
        assert_eq!(lookup("appearance"), WM);
        assert_eq!(lookup("text-align-last"), M);
        assert_eq!(lookup("tab-size"), M);
        assert_eq!(lookup("hyphens"), ALL);
        assert_eq!(lookup("columns"), WM);
        assert_eq!(lookup("color"), VendorPrefixes::empty());
        assert_eq!(lookup("display"), VendorPrefixes::empty());
        assert_eq!(lookup("border-radius"), VendorPrefixes::empty());
        // `br`, `wr` and `gr` share the depth-1 `r` slot; `gr` is listed last
        assert_eq!(lookup("grid-template"), MS);
        assert_eq!(lookup("src"), MS);
    }

    #[test]
    fn test_per_depth_false_positives() {
        assert_eq!(lookup("padding"), W);
        assert_eq!(lookup("width"), W);
    }

    #[test]
    fn test_shared_slot_keeps_last_entry() {
        // `br` and `gr` both end on `r` at depth 1
        let table = PrefixTable::build([("br", W), ("gr", MS)]).unwrap();
        assert_eq!(table.lookup("grid"), MS);
        assert_eq!(table.lookup("break-after"), MS);

        let reversed = PrefixTable::build([("gr", MS), ("br", WM)]).unwrap();
        assert_eq!(reversed.lookup("grid"), WM);
    }

    #[test]
    fn test_non_letters_share_wildcard_bit() {
        let table = PrefixTable::build([("a-b", M)]).unwrap();
        assert_eq!(table.lookup("a-b"), M);
        assert_eq!(table.lookup("a_b"), M);
        assert_eq!(table.lookup("axb"), VendorPrefixes::empty());
    }

    #[test]
    fn test_capacity_error() {
        let keys = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];
        let err = PrefixTable::build(keys.iter().map(|k| (*k, W))).unwrap_err();
        assert_eq!(
            err,
            BuildCapacityError {
                depth: 0,
                needed: 9,
                capacity: VALUE_CAPACITY
            }
        );
        assert!(PrefixTable::build(keys[..8].iter().map(|k| (*k, W))).is_ok());
    }

    #[test]
    fn test_prefix_strings() {
        let got: Vec<_> = (W | MS).prefixes().collect();
        assert_eq!(got, vec!["-webkit-", "-ms-"]);
        assert_eq!(VendorPrefixes::empty().prefixes().count(), 0);
    }
}
