//! Render ISTF nodes back to compact CSS
//!
//! Interpolations are spliced back from caller-provided strings by ordinal.
//! With vendor expansion enabled, declarations whose property is plain text
//! are preceded by one prefixed copy per vendor the prefix table asks for. Nested rules and `&` are
//! printed as written; resolving nesting is left to the consumer.

use std::fmt::{self, Write};

use cssparser::{serialize_string, CssStringWriter};

use crate::node::{EmptyKind, IdentifierKind, Node, RefKind, RuleKind, StringKind};
use crate::prefixes::{self, PrefixTable, VendorPrefixes};

/// CSS renderer for a node sequence; use through `Display`
pub struct Printer<'a, S> {
    nodes: &'a [Node],
    substitutions: &'a [S],
    vendor_prefixes: bool,
    table: Option<&'a PrefixTable>,
}

fn is_body_start(node: &Node) -> bool {
    matches!(
        node,
        Node::Empty(EmptyKind::DeclarationStart | EmptyKind::RuleEnd)
            | Node::Identifier(IdentifierKind::RuleStart, _)
            | Node::Ref(RefKind::PartialRef, _)
    )
}

fn is_value_end(node: &Node) -> bool {
    is_body_start(node)
        || matches!(
            node,
            Node::Empty(
                EmptyKind::DeclarationEnd
                    | EmptyKind::FunctionEnd
                    | EmptyKind::CompoundValueEnd
                    | EmptyKind::StringEnd
            )
        )
}

fn is_word_start(node: &Node) -> bool {
    matches!(
        node,
        Node::String(StringKind::Value | StringKind::FunctionStart, _)
            | Node::Ref(RefKind::ValueRef, _)
            | Node::Identifier(IdentifierKind::Fragment, _)
            | Node::Empty(EmptyKind::CompoundValueStart | EmptyKind::StringStart)
    )
}

impl<'a, S: AsRef<str>> Printer<'a, S> {
    pub fn new(nodes: &'a [Node], substitutions: &'a [S]) -> Self {
        Self {
            nodes,
            substitutions,
            vendor_prefixes: false,
            table: None,
        }
    }

    /// Toggle vendor-prefixed declaration copies (off by default)
    ///
    /// The prefix table matches per depth, not per key, so some unrelated
    /// properties get copies too (`-webkit-padding` from the `ord` entry).
    pub fn vendor_prefixes(mut self, enabled: bool) -> Self {
        self.vendor_prefixes = enabled;
        self
    }

    /// Use `table` instead of the built-in prefix table
    pub fn prefix_table(mut self, table: &'a PrefixTable) -> Self {
        self.table = Some(table);
        self
    }

    fn vendors(&self, property: &str) -> VendorPrefixes {
        if !self.vendor_prefixes {
            return VendorPrefixes::empty();
        }
        match self.table {
            Some(table) => table.lookup(property),
            None => prefixes::lookup(property),
        }
    }

    fn substitution(&self, index: usize) -> &str {
        match self.substitutions.get(index) {
            Some(s) => s.as_ref(),
            None => {
                log::warn!("no substitution for interpolation {}", index);
                ""
            }
        }
    }

    fn items<W: Write>(&self, pos: &mut usize, dest: &mut W, nested: bool) -> fmt::Result {
        while let Some(node) = self.nodes.get(*pos) {
            match node {
                Node::Empty(EmptyKind::RuleEnd) if nested => return Ok(()),
                Node::Empty(EmptyKind::DeclarationStart) => self.declaration(pos, dest)?,
                Node::Identifier(IdentifierKind::RuleStart, kind) => self.rule(*kind, pos, dest)?,
                Node::Ref(RefKind::PartialRef, index) => {
                    dest.write_str(self.substitution(*index))?;
                    *pos += 1;
                }
                _ => {
                    let before = *pos;
                    self.values(pos, dest)?;
                    if *pos == before {
                        *pos += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn rule<W: Write>(&self, code: u32, pos: &mut usize, dest: &mut W) -> fmt::Result {
        *pos += 1;
        let kind = RuleKind::from_code(code).unwrap_or(RuleKind::Unknown);

        if let Some(Node::String(StringKind::RuleName, name)) = self.nodes.get(*pos) {
            dest.write_char('@')?;
            dest.write_str(name)?;
            *pos += 1;
            self.prelude(pos, dest)?;
        } else {
            self.selectors(pos, dest)?;
        }

        let statement = matches!(
            kind,
            RuleKind::Charset | RuleKind::Import | RuleKind::Namespace | RuleKind::Unknown
        );
        let empty_body = matches!(self.nodes.get(*pos), Some(Node::Empty(EmptyKind::RuleEnd)) | None);
        if statement && empty_body {
            dest.write_char(';')?;
        } else {
            dest.write_char('{')?;
            self.items(pos, dest, true)?;
            dest.write_char('}')?;
        }
        if let Some(Node::Empty(EmptyKind::RuleEnd)) = self.nodes.get(*pos) {
            *pos += 1;
        }
        Ok(())
    }

    fn prelude<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        let mut first = true;
        while let Some(node) = self.nodes.get(*pos) {
            if is_body_start(node) {
                break;
            }
            if first {
                dest.write_char(' ')?;
                first = false;
            }
            match node {
                Node::String(StringKind::Condition, text) => dest.write_str(text)?,
                Node::Ref(RefKind::ConditionRef, index) => dest.write_str(self.substitution(*index))?,
                Node::Identifier(IdentifierKind::Fragment, index) => {
                    dest.write_str(self.substitution(*index as usize))?
                }
                Node::Empty(EmptyKind::StringStart) => {
                    self.string(pos, dest)?;
                    continue;
                }
                _ => {}
            }
            *pos += 1;
        }
        Ok(())
    }

    fn selectors<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        while let Some(node) = self.nodes.get(*pos) {
            if is_body_start(node) {
                break;
            }
            match node {
                Node::String(StringKind::Selector, text) => dest.write_str(text)?,
                Node::Ref(RefKind::SelectorRef, index) => dest.write_str(self.substitution(*index))?,
                Node::Identifier(IdentifierKind::Fragment, index) => {
                    dest.write_str(self.substitution(*index as usize))?
                }
                Node::Empty(EmptyKind::ParentSelector) => dest.write_char('&')?,
                Node::Empty(EmptyKind::UniversalSelector) => dest.write_char('*')?,
                Node::Empty(EmptyKind::SpaceCombinator) => dest.write_char(' ')?,
                Node::Empty(EmptyKind::ChildCombinator) => dest.write_char('>')?,
                Node::Empty(EmptyKind::NextSiblingCombinator) => dest.write_char('+')?,
                Node::Empty(EmptyKind::SubsequentSiblingCombinator) => dest.write_char('~')?,
                Node::Empty(EmptyKind::SelectorSeparator) => dest.write_char(',')?,
                Node::String(StringKind::AttributeName, name) => {
                    dest.write_char('[')?;
                    dest.write_str(name)?;
                    *pos += 1;
                    self.attribute(pos, dest)?;
                    continue;
                }
                _ => {}
            }
            *pos += 1;
        }
        Ok(())
    }

    fn attribute<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        loop {
            match self.nodes.get(*pos) {
                Some(Node::String(StringKind::AttributeOperator | StringKind::AttributeValue, text)) => {
                    dest.write_str(text)?
                }
                Some(Node::Ref(RefKind::AttributeValueRef, index)) => {
                    serialize_string(self.substitution(*index), dest)?
                }
                Some(Node::Empty(EmptyKind::StringStart)) => {
                    self.string(pos, dest)?;
                    continue;
                }
                _ => break,
            }
            *pos += 1;
        }
        dest.write_char(']')
    }

    /// Quoted string from `StringStart` through `StringEnd`
    fn string<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        *pos += 1;
        dest.write_char('"')?;
        while let Some(node) = self.nodes.get(*pos) {
            *pos += 1;
            match node {
                Node::String(StringKind::Value, text) => dest.write_str(text)?,
                Node::Ref(RefKind::StringRef, index) => {
                    CssStringWriter::new(dest).write_str(self.substitution(*index))?
                }
                Node::Empty(EmptyKind::StringEnd) => break,
                _ => {}
            }
        }
        dest.write_char('"')
    }

    fn declaration<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        let start = *pos;
        let property = match (self.nodes.get(start + 1), self.nodes.get(start + 2)) {
            (
                Some(Node::String(StringKind::Property, name)),
                Some(Node::Empty(EmptyKind::DeclarationSeparator)),
            ) => Some(name.as_str()),
            _ => None,
        };
        let vendors = property.map_or(VendorPrefixes::empty(), |name| self.vendors(name));

        for prefix in vendors.prefixes() {
            *pos = start;
            dest.write_str(prefix)?;
            self.declaration_body(pos, dest)?;
        }
        *pos = start;
        self.declaration_body(pos, dest)
    }

    fn declaration_body<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        *pos += 1;
        while let Some(node) = self.nodes.get(*pos) {
            *pos += 1;
            match node {
                Node::String(StringKind::Property, text) => dest.write_str(text)?,
                Node::Ref(RefKind::PropertyRef, index) => dest.write_str(self.substitution(*index))?,
                Node::Identifier(IdentifierKind::Fragment, index) => {
                    dest.write_str(self.substitution(*index as usize))?
                }
                Node::Empty(EmptyKind::DeclarationSeparator) => {
                    dest.write_char(':')?;
                    break;
                }
                _ => {}
            }
        }
        self.values(pos, dest)?;
        if let Some(Node::Empty(EmptyKind::DeclarationEnd)) = self.nodes.get(*pos) {
            *pos += 1;
        }
        dest.write_char(';')
    }

    /// Space-separated words up to the end of the enclosing construct
    fn values<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        let mut after_word = false;
        while let Some(node) = self.nodes.get(*pos) {
            if is_value_end(node) {
                break;
            }
            if let Node::Empty(EmptyKind::ValueSeparator) = node {
                dest.write_char(',')?;
                after_word = false;
                *pos += 1;
                continue;
            }
            if !is_word_start(node) {
                *pos += 1;
                continue;
            }
            if after_word {
                dest.write_char(' ')?;
            }
            self.word(pos, dest)?;
            after_word = true;
        }
        Ok(())
    }

    fn word<W: Write>(&self, pos: &mut usize, dest: &mut W) -> fmt::Result {
        let Some(node) = self.nodes.get(*pos) else {
            return Ok(());
        };
        match node {
            Node::String(StringKind::Value, text) => {
                dest.write_str(text)?;
                *pos += 1;
            }
            Node::Ref(RefKind::ValueRef, index) => {
                dest.write_str(self.substitution(*index))?;
                *pos += 1;
            }
            Node::Identifier(IdentifierKind::Fragment, index) => {
                dest.write_str(self.substitution(*index as usize))?;
                *pos += 1;
            }
            Node::String(StringKind::FunctionStart, name) => {
                dest.write_str(name)?;
                dest.write_char('(')?;
                *pos += 1;
                self.values(pos, dest)?;
                if let Some(Node::Empty(EmptyKind::FunctionEnd)) = self.nodes.get(*pos) {
                    *pos += 1;
                }
                dest.write_char(')')?;
            }
            Node::Empty(EmptyKind::CompoundValueStart) => {
                *pos += 1;
                while let Some(part) = self.nodes.get(*pos) {
                    if let Node::Empty(EmptyKind::CompoundValueEnd) = part {
                        *pos += 1;
                        break;
                    }
                    if is_word_start(part) {
                        self.word(pos, dest)?;
                    } else {
                        *pos += 1;
                    }
                }
            }
            Node::Empty(EmptyKind::StringStart) => self.string(pos, dest)?,
            _ => *pos += 1,
        }
        Ok(())
    }
}

impl<S: AsRef<str>> fmt::Display for Printer<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pos = 0;
        self.items(&mut pos, f, false)
    }
}
