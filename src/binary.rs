//! Binary ISTF encoding
//!
//! Layout, all integers in host byte order (buffers are produced and consumed
//! inside one process, across the C ABI):
//!
//! ```text
//! Header      16 bytes  magic "ISTF", version, node count, string count
//! NodeRecord   8 bytes  per node: kind, 3 reserved, payload
//! strings               per string: u32 byte length, UTF-8 bytes
//! ```
//!
//! The record payload is a `StringId` for String kinds, the interpolation
//! ordinal for Ref kinds, the raw value for Identifier kinds and 0 otherwise.

use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::DecodeError;
use crate::node::{EmptyKind, IdentifierKind, Node, NodeClass, RefKind, StringKind};
use crate::string_interner::{StringId, StringPool};

/// Magic number, the bytes "ISTF" read as a little-endian u32
pub const MAGIC_NUMBER: u32 = u32::from_le_bytes(*b"ISTF");
/// Current binary format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Header {
    pub magic: u32,
    pub version: u32,
    pub node_count: u32,
    pub string_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct NodeRecord {
    pub kind: u8,
    pub reserved: [u8; 3],
    pub payload: u32,
}

const HEADER_SIZE: usize = size_of::<Header>();
const RECORD_SIZE: usize = size_of::<NodeRecord>();

/// Serialize a node sequence
pub fn encode(nodes: &[Node]) -> Vec<u8> {
    let mut strings = StringPool::new();
    let records: Vec<NodeRecord> = nodes
        .iter()
        .map(|node| {
            let payload = match node {
                Node::Empty(_) => 0,
                Node::String(_, text) => strings.intern(text).0,
                Node::Ref(_, ordinal) => *ordinal as u32,
                Node::Identifier(_, value) => *value,
            };
            NodeRecord {
                kind: node.kind_code(),
                reserved: [0; 3],
                payload,
            }
        })
        .collect();

    let header = Header {
        magic: MAGIC_NUMBER,
        version: FORMAT_VERSION,
        node_count: records.len() as u32,
        string_count: strings.len() as u32,
    };

    let table_size: usize = strings.iter().map(|s| 4 + s.len()).sum();
    let mut buf = Vec::with_capacity(HEADER_SIZE + records.len() * RECORD_SIZE + table_size);
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(records.as_bytes());
    for s in strings.iter() {
        buf.extend_from_slice((s.len() as u32).as_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    log::trace!(
        "encoded {} nodes, {} strings into {} bytes",
        header.node_count,
        header.string_count,
        buf.len()
    );
    buf
}

/// Read the header without decoding the rest
pub fn read_header(data: &[u8]) -> Result<Header, DecodeError> {
    let (header, _) = Header::read_from_prefix(data).map_err(|_| DecodeError::Truncated {
        offset: 0,
        needed: HEADER_SIZE,
    })?;
    if header.magic != MAGIC_NUMBER {
        return Err(DecodeError::BadMagic(header.magic));
    }
    if header.version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(header.version));
    }
    Ok(header)
}

/// Deserialize a node sequence
pub fn decode(data: &[u8]) -> Result<Vec<Node>, DecodeError> {
    let header = read_header(data)?;
    let mut offset = HEADER_SIZE;
    let mut rest = &data[HEADER_SIZE..];

    let node_count = header.node_count as usize;
    let mut records = Vec::with_capacity(node_count.min(rest.len() / RECORD_SIZE));
    for _ in 0..node_count {
        let (record, tail) = NodeRecord::read_from_prefix(rest).map_err(|_| DecodeError::Truncated {
            offset,
            needed: RECORD_SIZE,
        })?;
        records.push(record);
        rest = tail;
        offset += RECORD_SIZE;
    }

    let mut table = Vec::new();
    for _ in 0..header.string_count {
        let (len, tail) = u32::read_from_prefix(rest).map_err(|_| DecodeError::Truncated { offset, needed: 4 })?;
        offset += 4;
        let len = len as usize;
        if tail.len() < len {
            return Err(DecodeError::Truncated { offset, needed: len });
        }
        let text = std::str::from_utf8(&tail[..len]).map_err(|_| DecodeError::InvalidUtf8)?;
        table.push(text);
        rest = &tail[len..];
        offset += len;
    }

    let strings = StringPool::from_table(table);
    records.iter().map(|record| node_from_record(record, &strings)).collect()
}

fn node_from_record(record: &NodeRecord, strings: &StringPool) -> Result<Node, DecodeError> {
    let unknown = DecodeError::UnknownKind(record.kind);
    match NodeClass::of_code(record.kind) {
        Some(NodeClass::Empty) => EmptyKind::from_code(record.kind).map(Node::Empty).ok_or(unknown),
        Some(NodeClass::String) => {
            let kind = StringKind::from_code(record.kind).ok_or(unknown)?;
            let text = strings
                .get(StringId(record.payload))
                .ok_or(DecodeError::MissingString(record.payload))?;
            Ok(Node::text(kind, text))
        }
        Some(NodeClass::Ref) => {
            let kind = RefKind::from_code(record.kind).ok_or(unknown)?;
            Ok(Node::Ref(kind, record.payload as usize))
        }
        Some(NodeClass::Identifier) => {
            let kind = IdentifierKind::from_code(record.kind).ok_or(unknown)?;
            Ok(Node::Identifier(kind, record.payload))
        }
        None => Err(unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RuleKind;

    fn sample() -> Vec<Node> {
        vec![
            Node::rule_start(RuleKind::Style),
            Node::text(StringKind::Selector, "a"),
            Node::Empty(EmptyKind::DeclarationStart),
            Node::text(StringKind::Property, "color"),
            Node::Empty(EmptyKind::DeclarationSeparator),
            Node::Ref(RefKind::ValueRef, 3),
            Node::Empty(EmptyKind::DeclarationEnd),
            Node::Empty(EmptyKind::DeclarationStart),
            Node::text(StringKind::Property, "background-color"),
            Node::Empty(EmptyKind::DeclarationSeparator),
            Node::fragment(4),
            Node::Empty(EmptyKind::DeclarationEnd),
            Node::text(StringKind::Selector, "color"),
            Node::Empty(EmptyKind::RuleEnd),
        ]
    }

    #[test]
    fn test_binary_roundtrip() {
        let nodes = sample();
        let bytes = encode(&nodes);
        assert_eq!(decode(&bytes).unwrap(), nodes);

        let header = read_header(&bytes).unwrap();
        assert_eq!(header.node_count, 14);
        // "color" is shared by the property and the selector
        assert_eq!(header.string_count, 3);
        assert_eq!(bytes[..4], MAGIC_NUMBER.to_ne_bytes());
        assert_eq!(bytes.len(), 16 + 14 * 8 + (4 + 1) + (4 + 5) + (4 + 16));
    }

    #[test]
    fn test_empty_sequence() {
        let bytes = encode(&[]);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(decode(&bytes).unwrap(), Vec::<Node>::new());
    }

    #[test]
    fn test_rejects_bad_header() {
        assert_eq!(
            decode(&[0; 4]),
            Err(DecodeError::Truncated { offset: 0, needed: 16 })
        );

        let mut bytes = encode(&sample());
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMagic(_))));

        let mut bytes = encode(&sample());
        bytes[4..8].copy_from_slice(&7u32.to_ne_bytes());
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_rejects_bad_records() {
        let bytes = encode(&sample());
        assert_eq!(
            decode(&bytes[..HEADER_SIZE + 3]),
            Err(DecodeError::Truncated { offset: HEADER_SIZE, needed: 8 })
        );

        let mut unknown = bytes.clone();
        unknown[HEADER_SIZE] = 19;
        assert_eq!(decode(&unknown), Err(DecodeError::UnknownKind(19)));

        let mut missing = bytes.clone();
        // second record is the selector string; point it past the table
        missing[HEADER_SIZE + RECORD_SIZE + 4..HEADER_SIZE + 2 * RECORD_SIZE].copy_from_slice(&9u32.to_ne_bytes());
        assert_eq!(decode(&missing), Err(DecodeError::MissingString(9)));

        let truncated_table = &bytes[..bytes.len() - 1];
        assert!(matches!(decode(truncated_table), Err(DecodeError::Truncated { .. })));
    }
}
