//! ISTF node model
//!
//! A parsed template is a flat `Vec<Node>`. Nesting is expressed only through
//! paired Empty kinds (`RuleStart`/`RuleEnd`, `CompoundValueStart`/`End`, ...).
//! Every kind code belongs to exactly one payload class, and each class is its
//! own enum, so a node can never carry the wrong payload for its kind.

use std::fmt;

// ============================================================================
// Kind codes
// ============================================================================

/// Kinds with no payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EmptyKind {
    RuleEnd = 1,
    ParentSelector = 4,
    UniversalSelector = 5,
    CompoundSelectorStart = 6,
    CompoundSelectorEnd = 7,
    SpaceCombinator = 8,
    SelectorSeparator = 9,
    ChildCombinator = 10,
    NextSiblingCombinator = 11,
    SubsequentSiblingCombinator = 12,
    CompoundValueStart = 15,
    CompoundValueEnd = 16,
    FunctionEnd = 18,
    StringStart = 25,
    StringEnd = 27,
    DeclarationStart = 35,
    DeclarationSeparator = 36,
    DeclarationEnd = 37,
    ValueSeparator = 38,
}

/// Kinds carrying literal text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StringKind {
    Selector = 3,
    Property = 13,
    Value = 14,
    Condition = 17,
    RuleName = 24,
    AttributeValue = 28,
    FunctionStart = 30,
    AttributeName = 31,
    AttributeOperator = 33,
}

/// Kinds carrying a back-reference to an interpolation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RefKind {
    SelectorRef = 20,
    PropertyRef = 21,
    ValueRef = 22,
    PartialRef = 23,
    ConditionRef = 29,
    StringRef = 32,
    AttributeValueRef = 34,
}

/// Kinds carrying a small integer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IdentifierKind {
    /// Payload is a [`RuleKind`] code
    RuleStart = 0,
    /// Payload is the ordinal of an interpolation glued inside a word
    Fragment = 26,
}

impl EmptyKind {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => EmptyKind::RuleEnd,
            4 => EmptyKind::ParentSelector,
            5 => EmptyKind::UniversalSelector,
            6 => EmptyKind::CompoundSelectorStart,
            7 => EmptyKind::CompoundSelectorEnd,
            8 => EmptyKind::SpaceCombinator,
            9 => EmptyKind::SelectorSeparator,
            10 => EmptyKind::ChildCombinator,
            11 => EmptyKind::NextSiblingCombinator,
            12 => EmptyKind::SubsequentSiblingCombinator,
            15 => EmptyKind::CompoundValueStart,
            16 => EmptyKind::CompoundValueEnd,
            18 => EmptyKind::FunctionEnd,
            25 => EmptyKind::StringStart,
            27 => EmptyKind::StringEnd,
            35 => EmptyKind::DeclarationStart,
            36 => EmptyKind::DeclarationSeparator,
            37 => EmptyKind::DeclarationEnd,
            38 => EmptyKind::ValueSeparator,
            _ => return None,
        })
    }
}

impl StringKind {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            3 => StringKind::Selector,
            13 => StringKind::Property,
            14 => StringKind::Value,
            17 => StringKind::Condition,
            24 => StringKind::RuleName,
            28 => StringKind::AttributeValue,
            30 => StringKind::FunctionStart,
            31 => StringKind::AttributeName,
            33 => StringKind::AttributeOperator,
            _ => return None,
        })
    }
}

impl RefKind {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            20 => RefKind::SelectorRef,
            21 => RefKind::PropertyRef,
            22 => RefKind::ValueRef,
            23 => RefKind::PartialRef,
            29 => RefKind::ConditionRef,
            32 => RefKind::StringRef,
            34 => RefKind::AttributeValueRef,
            _ => return None,
        })
    }
}

impl IdentifierKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(IdentifierKind::RuleStart),
            26 => Some(IdentifierKind::Fragment),
            _ => None,
        }
    }
}

/// Payload class of a kind code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Empty,
    String,
    Ref,
    Identifier,
}

impl NodeClass {
    /// Class of a raw kind code; `None` for unassigned codes (2, 19, > 38)
    pub fn of_code(code: u8) -> Option<Self> {
        if EmptyKind::from_code(code).is_some() {
            Some(NodeClass::Empty)
        } else if StringKind::from_code(code).is_some() {
            Some(NodeClass::String)
        } else if RefKind::from_code(code).is_some() {
            Some(NodeClass::Ref)
        } else if IdentifierKind::from_code(code).is_some() {
            Some(NodeClass::Identifier)
        } else {
            None
        }
    }
}

// ============================================================================
// Rule kinds
// ============================================================================

/// Rule type carried by `RuleStart`, numbered as in the CSSOM
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RuleKind {
    Unknown = 0,
    Style = 1,
    Charset = 2,
    Import = 3,
    Media = 4,
    FontFace = 5,
    Page = 6,
    Keyframes = 7,
    Keyframe = 8,
    Namespace = 10,
    CounterStyle = 11,
    Supports = 12,
    Document = 13,
    FontFeatureValues = 14,
    Viewport = 15,
}

const VENDOR_PREFIXES: [&str; 4] = ["-webkit-", "-moz-", "-ms-", "-o-"];

impl RuleKind {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => RuleKind::Unknown,
            1 => RuleKind::Style,
            2 => RuleKind::Charset,
            3 => RuleKind::Import,
            4 => RuleKind::Media,
            5 => RuleKind::FontFace,
            6 => RuleKind::Page,
            7 => RuleKind::Keyframes,
            8 => RuleKind::Keyframe,
            10 => RuleKind::Namespace,
            11 => RuleKind::CounterStyle,
            12 => RuleKind::Supports,
            13 => RuleKind::Document,
            14 => RuleKind::FontFeatureValues,
            15 => RuleKind::Viewport,
            _ => return None,
        })
    }

    /// Rule kind for an at-keyword name (without `@`)
    ///
    /// Vendor-prefixed names such as `-webkit-keyframes` map to the
    /// unprefixed kind. Unrecognized names are `Unknown`.
    pub fn from_at_keyword(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let bare = VENDOR_PREFIXES
            .iter()
            .find_map(|prefix| lower.strip_prefix(prefix))
            .unwrap_or(&lower);
        match bare {
            "charset" => RuleKind::Charset,
            "import" => RuleKind::Import,
            "media" => RuleKind::Media,
            "font-face" => RuleKind::FontFace,
            "page" => RuleKind::Page,
            "keyframes" => RuleKind::Keyframes,
            "namespace" => RuleKind::Namespace,
            "counter-style" => RuleKind::CounterStyle,
            "supports" => RuleKind::Supports,
            "document" => RuleKind::Document,
            "font-feature-values" => RuleKind::FontFeatureValues,
            "viewport" => RuleKind::Viewport,
            _ => RuleKind::Unknown,
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// One ISTF node
///
/// `R` is the reference type for interpolations. The parser produces
/// ordinals (`usize`); [`Node::map_ref`] swaps them for caller handles.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node<R = usize> {
    Empty(EmptyKind),
    String(StringKind, String),
    Ref(RefKind, R),
    Identifier(IdentifierKind, u32),
}

impl<R> Node<R> {
    pub fn text(kind: StringKind, text: impl Into<String>) -> Self {
        Node::String(kind, text.into())
    }

    pub fn rule_start(kind: RuleKind) -> Self {
        Node::Identifier(IdentifierKind::RuleStart, kind.code())
    }

    pub fn fragment(ordinal: usize) -> Self {
        Node::Identifier(IdentifierKind::Fragment, ordinal as u32)
    }

    /// Numeric kind code
    pub fn kind_code(&self) -> u8 {
        match self {
            Node::Empty(kind) => *kind as u8,
            Node::String(kind, _) => *kind as u8,
            Node::Ref(kind, _) => *kind as u8,
            Node::Identifier(kind, _) => *kind as u8,
        }
    }

    pub fn class(&self) -> NodeClass {
        match self {
            Node::Empty(_) => NodeClass::Empty,
            Node::String(..) => NodeClass::String,
            Node::Ref(..) => NodeClass::Ref,
            Node::Identifier(..) => NodeClass::Identifier,
        }
    }

    /// Replace every back-reference, keeping kinds and order
    pub fn map_ref<S>(self, mut f: impl FnMut(R) -> S) -> Node<S> {
        match self {
            Node::Empty(kind) => Node::Empty(kind),
            Node::String(kind, text) => Node::String(kind, text),
            Node::Ref(kind, r) => Node::Ref(kind, f(r)),
            Node::Identifier(kind, value) => Node::Identifier(kind, value),
        }
    }
}

impl<R: fmt::Display> fmt::Display for Node<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty(kind) => write!(f, "{:?}", kind),
            Node::String(kind, text) => write!(f, "{:?}({:?})", kind, text),
            Node::Ref(kind, r) => write!(f, "{:?}(${{{}}})", kind, r),
            Node::Identifier(IdentifierKind::RuleStart, code) => match RuleKind::from_code(*code) {
                Some(rule) => write!(f, "RuleStart({:?})", rule),
                None => write!(f, "RuleStart({})", code),
            },
            Node::Identifier(kind, value) => write!(f, "{:?}({})", kind, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_has_one_class() {
        let mut assigned = 0;
        for code in 0..=u8::MAX {
            let classes = [
                EmptyKind::from_code(code).is_some(),
                StringKind::from_code(code).is_some(),
                RefKind::from_code(code).is_some(),
                IdentifierKind::from_code(code).is_some(),
            ];
            let count = classes.iter().filter(|&&hit| hit).count();
            assert!(count <= 1, "code {} is in {} classes", code, count);
            assigned += count;
        }
        assert_eq!(assigned, 37);
        assert_eq!(NodeClass::of_code(2), None);
        assert_eq!(NodeClass::of_code(19), None);
        assert_eq!(NodeClass::of_code(26), Some(NodeClass::Identifier));
        assert_eq!(NodeClass::of_code(38), Some(NodeClass::Empty));
    }

    #[test]
    fn test_kind_codes_round_trip() {
        for code in 0..=38u8 {
            if let Some(kind) = EmptyKind::from_code(code) {
                assert_eq!(kind as u8, code);
            }
            if let Some(kind) = StringKind::from_code(code) {
                assert_eq!(kind as u8, code);
            }
            if let Some(kind) = RefKind::from_code(code) {
                assert_eq!(kind as u8, code);
            }
        }
        assert_eq!(Node::<usize>::rule_start(RuleKind::Media).kind_code(), 0);
        assert_eq!(Node::<usize>::fragment(3).kind_code(), 26);
    }

    #[test]
    fn test_rule_kind_from_at_keyword() {
        assert_eq!(RuleKind::from_at_keyword("media"), RuleKind::Media);
        assert_eq!(RuleKind::from_at_keyword("MEDIA"), RuleKind::Media);
        assert_eq!(RuleKind::from_at_keyword("-webkit-keyframes"), RuleKind::Keyframes);
        assert_eq!(RuleKind::from_at_keyword("font-face"), RuleKind::FontFace);
        assert_eq!(RuleKind::from_at_keyword("tailwind"), RuleKind::Unknown);
        assert_eq!(RuleKind::from_code(9), None);
        assert_eq!(RuleKind::from_code(14), Some(RuleKind::FontFeatureValues));
    }

    #[test]
    fn test_map_ref_keeps_shape() {
        let nodes: Vec<Node> = vec![
            Node::Empty(EmptyKind::DeclarationStart),
            Node::text(StringKind::Property, "color"),
            Node::Ref(RefKind::ValueRef, 1),
            Node::fragment(1),
        ];
        let names = ["a", "b"];
        let mapped: Vec<Node<&str>> = nodes.iter().cloned().map(|n| n.map_ref(|i| names[i])).collect();
        assert_eq!(mapped[2], Node::Ref(RefKind::ValueRef, "b"));
        assert_eq!(mapped[3], Node::Identifier(IdentifierKind::Fragment, 1));
        let codes: Vec<u8> = mapped.iter().map(Node::kind_code).collect();
        assert_eq!(codes, vec![35, 13, 22, 26]);
    }

    #[test]
    fn test_display() {
        let node: Node = Node::Ref(RefKind::ValueRef, 0);
        assert_eq!(node.to_string(), "ValueRef(${0})");
        assert_eq!(
            Node::<usize>::rule_start(RuleKind::Style).to_string(),
            "RuleStart(Style)"
        );
    }
}
