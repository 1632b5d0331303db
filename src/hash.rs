//! Structural names for node sequences
//!
//! A sequence is reduced to a fingerprint of its kind codes, hashed with
//! MurmurHash2 and spelled in base 52, giving a short `[a-zA-Z]+` name that
//! is stable for every template with the same shape.

use crate::node::{Node, NodeClass};

const M: u32 = 0x5bd1_e995;
const ALPHABET_LEN: u32 = 52;

/// Kind-shape fingerprint of a node sequence
///
/// Empty-class nodes contribute `<code>undefined;`, all others just
/// `<code>`. The `undefined` text is kept verbatim so names match those
/// produced by existing tooling.
pub fn fingerprint<R>(nodes: &[Node<R>]) -> String {
    let mut out = String::with_capacity(nodes.len() * 4);
    for node in nodes {
        out.push_str(&node.kind_code().to_string());
        if node.class() == NodeClass::Empty {
            out.push_str("undefined;");
        }
    }
    out
}

/// 32-bit MurmurHash2 seeded with the input length
pub fn murmurhash2(bytes: &[u8]) -> u32 {
    let mut h = bytes.len() as u32;
    let mut chunks = bytes.chunks_exact(4);

    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> 24;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M) ^ k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

fn alphabetic_char(code: u32) -> char {
    // a-z for 0..=25, A-Z for 26..=51
    let offset = if code > 25 { 39 } else { 97 };
    char::from((code + offset) as u8)
}

/// Spell a number in base 52, most significant digit first
pub fn alphabetic_name(code: u32) -> String {
    let mut digits = Vec::new();
    let mut x = code;
    while x > ALPHABET_LEN {
        digits.push(alphabetic_char(x % ALPHABET_LEN));
        x /= ALPHABET_LEN;
    }
    digits.push(alphabetic_char(x % ALPHABET_LEN));
    digits.iter().rev().collect()
}

/// Hash arbitrary text into an alphabetic name
///
/// The hash runs over UTF-16 code units truncated to their low byte, so
/// names agree with hosts that hash JavaScript strings.
pub fn hash_name(text: &str) -> String {
    let units: Vec<u8> = text.encode_utf16().map(|unit| unit as u8).collect();
    alphabetic_name(murmurhash2(&units))
}

/// Name derived from the shape of a node sequence
pub fn derive_name<R>(nodes: &[Node<R>]) -> String {
    hash_name(&fingerprint(nodes))
}
