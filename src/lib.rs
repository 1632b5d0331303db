//! ISTF Parser - tagged-template CSS to flat node sequences
//!
//! This crate provides:
//! - A lazy, memoized stream over template chunks and interpolations
//! - A CSS lexer and a backtracking parser emitting ISTF nodes
//! - Structural name derivation (MurmurHash2, base-52)
//! - Vendor prefix lookup through a succinct bitmap trie
//! - A zerocopy binary encoding and a compact CSS printer
//!
//! The `ffi` module exposes the pipeline over a C ABI.

pub mod binary;
pub mod error;
pub mod ffi;
pub mod hash;
pub mod input;
pub mod lexer;
pub mod naming;
pub mod node;
pub mod parser;
pub mod prefixes;
pub mod printer;
pub mod stream;
pub mod string_interner;

pub use error::*;
pub use hash::{derive_name, fingerprint, hash_name, murmurhash2};
pub use lexer::{Token, TokenKind};
pub use node::{EmptyKind, IdentifierKind, Node, NodeClass, RefKind, RuleKind, StringKind};
pub use parser::ParseOptions;
pub use prefixes::{PrefixTable, VendorPrefixes};
pub use printer::Printer;
pub use stream::Stream;

/// Parse a template into nodes whose references carry the caller's handles
///
/// `chunks` must hold exactly one more element than `interpolations`.
pub fn parse_template<S, R>(chunks: &[S], interpolations: &[R]) -> Result<Vec<Node<R>>, IstfError>
where
    S: AsRef<str>,
    R: Clone,
{
    parse_template_with_options(chunks, interpolations, &ParseOptions::default())
}

pub fn parse_template_with_options<S, R>(
    chunks: &[S],
    interpolations: &[R],
    options: &ParseOptions,
) -> Result<Vec<Node<R>>, IstfError>
where
    S: AsRef<str>,
    R: Clone,
{
    let units = input::assemble(chunks, interpolations)?;
    let nodes = parser::parse_with_options(lexer::lex(units), options)?;
    log::debug!("parsed template into {} nodes", nodes.len());
    Ok(nodes
        .into_iter()
        .map(|node| node.map_ref(|ordinal| interpolations[ordinal].clone()))
        .collect())
}

/// Like `parse_template`, but a failed template yields no nodes
pub fn parse_template_or_empty<S, R>(chunks: &[S], interpolations: &[R]) -> Vec<Node<R>>
where
    S: AsRef<str>,
    R: Clone,
{
    parse_template(chunks, interpolations).unwrap_or_else(|err| {
        log::warn!("template skipped: {}", err);
        Vec::new()
    })
}

/// Lex a template; interpolations appear as `TokenKind::Interpolation`
pub fn tokenize<S: AsRef<str>>(chunks: &[S]) -> Result<Vec<Token>, IstfError> {
    let slots = vec![(); chunks.len().saturating_sub(1)];
    let units = input::assemble(chunks, &slots)?;
    let mut tokens = Vec::new();
    for token in lexer::lex(units).iter() {
        let token = token?;
        if token.kind == TokenKind::Eof {
            break;
        }
        tokens.push(token);
    }
    Ok(tokens)
}
