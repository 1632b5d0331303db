//! Recursive-descent parser from tokens to ISTF nodes
//!
//! The cursor is a persistent token stream, so trying an alternative is just
//! keeping the old handle: on failure the parser restores the handle and
//! truncates its output to where the attempt began. Body items are tried as a
//! declaration, then a rule, then a standalone interpolation; when all three
//! fail the error that got furthest into the input is reported.
//!
//! A template that is not a valid block body (the `css` helper form, e.g.
//! `${a}px solid`) is re-read from the start as a single value.

use crate::error::{LexError, ParseError, StructuralError};
use crate::lexer::{Token, TokenKind};
use crate::node::{EmptyKind, Node, RefKind, RuleKind, StringKind};
use crate::stream::Stream;

type TokenStream = Stream<Result<Token, LexError>>;
type PResult<T> = Result<T, ParseError>;

// ============================================================================
// Options
// ============================================================================

/// Parser options
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Re-read a template that is not a block body as a single value
    pub allow_value_fragments: bool,
    /// Deepest allowed nesting of rules and functions
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allow_value_fragments: true,
            max_depth: 64,
        }
    }
}

/// Parse with default options
pub fn parse(tokens: TokenStream) -> Result<Vec<Node>, ParseError> {
    parse_with_options(tokens, &ParseOptions::default())
}

/// Parse a token stream into a flat node sequence
///
/// Either the whole template parses or nothing is returned.
pub fn parse_with_options(tokens: TokenStream, options: &ParseOptions) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser::new(tokens.clone(), options);
    let body_err = match parser.stylesheet() {
        Ok(()) => {
            log::trace!("parsed block body into {} nodes", parser.out.len());
            return Ok(parser.out);
        }
        Err(ParseError::Structural(err)) if options.allow_value_fragments => err,
        Err(err) => return Err(err),
    };

    log::debug!("not a block body ({}); retrying as a value fragment", body_err);
    let mut parser = Parser::new(tokens, options);
    match parser.value_fragment() {
        Ok(()) => Ok(parser.out),
        Err(ParseError::Structural(err)) => Err(body_err.furthest(err).into()),
        Err(err) => Err(err),
    }
}

// ============================================================================
// Word pieces
// ============================================================================

/// Part of a whitespace-delimited word
enum Piece {
    Text(String),
    Interp(usize),
    /// Pre-built nodes for a function, string, `&` or `*`
    Block(Vec<Node>),
    /// Attribute selector nodes; never emitted bare
    Attribute(Vec<Node>),
}

fn push_text(pieces: &mut Vec<Piece>, text: &str) {
    if let Some(Piece::Text(last)) = pieces.last_mut() {
        last.push_str(text);
    } else {
        pieces.push(Piece::Text(text.to_string()));
    }
}

fn push_token_text(pieces: &mut Vec<Piece>, kind: &TokenKind) {
    let mut text = String::new();
    kind.write_css(&mut text);
    push_text(pieces, &text);
}

fn glues_after(text: &str) -> bool {
    text.chars().last().map_or(false, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '#') || !c.is_ascii()
    })
}

fn glues_before(text: &str) -> bool {
    text.chars().next().map_or(false, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '%') || !c.is_ascii()
    })
}

/// Whether the piece at `at` directly touches word text on either side
fn is_glued(pieces: &[Piece], at: usize) -> bool {
    let before = at.checked_sub(1).and_then(|i| pieces.get(i));
    let after = pieces.get(at + 1);
    matches!(before, Some(Piece::Text(t)) if glues_after(t))
        || matches!(after, Some(Piece::Text(t)) if glues_before(t))
}

/// Node kinds used when emitting a word in one grammar position
struct WordKinds {
    text: StringKind,
    reference: RefKind,
    open: EmptyKind,
    close: EmptyKind,
}

const VALUE_WORD: WordKinds = WordKinds {
    text: StringKind::Value,
    reference: RefKind::ValueRef,
    open: EmptyKind::CompoundValueStart,
    close: EmptyKind::CompoundValueEnd,
};

const SELECTOR_WORD: WordKinds = WordKinds {
    text: StringKind::Selector,
    reference: RefKind::SelectorRef,
    open: EmptyKind::CompoundSelectorStart,
    close: EmptyKind::CompoundSelectorEnd,
};

/// Convert string contents from `quote` escaping to double-quote escaping
fn requote(text: &str, quote: char) -> String {
    if quote == '"' {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) if escaped == quote => out.push(escaped),
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => out.push('\\'),
            },
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Clone)]
struct Mark {
    tokens: TokenStream,
    len: usize,
    depth: usize,
}

struct Parser<'o> {
    tokens: TokenStream,
    out: Vec<Node>,
    depth: usize,
    options: &'o ParseOptions,
}

impl<'o> Parser<'o> {
    fn new(tokens: TokenStream, options: &'o ParseOptions) -> Self {
        Self {
            tokens,
            out: Vec::new(),
            depth: 0,
            options,
        }
    }

    // ---- cursor ----

    fn mark(&self) -> Mark {
        Mark {
            tokens: self.tokens.clone(),
            len: self.out.len(),
            depth: self.depth,
        }
    }

    fn reset(&mut self, mark: Mark) {
        self.tokens = mark.tokens;
        self.out.truncate(mark.len);
        self.depth = mark.depth;
    }

    fn peek(&self) -> PResult<Token> {
        match self.tokens.peek() {
            Some(Ok(token)) => Ok(token.clone()),
            Some(Err(err)) => Err(err.clone().into()),
            None => Ok(Token::new(TokenKind::Eof, 0)),
        }
    }

    fn peek_kind(&self) -> PResult<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    /// Consume the current token; `Eof` is never consumed
    fn bump(&mut self) -> PResult<Token> {
        let token = self.peek()?;
        if token.kind != TokenKind::Eof {
            if let Some((_, rest)) = self.tokens.next() {
                self.tokens = rest;
            }
        }
        Ok(token)
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Ok(token) => StructuralError {
                expected,
                found: token.kind.to_string(),
                offset: token.offset,
            }
            .into(),
            Err(err) => err,
        }
    }

    fn expect(&mut self, wanted: TokenKind, expected: &'static str) -> PResult<()> {
        if self.peek_kind()? == wanted {
            self.bump()?;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Skip whitespace, reporting whether there was any
    fn skip_ws(&mut self) -> PResult<bool> {
        let mut skipped = false;
        while self.peek_kind()? == TokenKind::Whitespace {
            self.bump()?;
            skipped = true;
        }
        Ok(skipped)
    }

    fn push(&mut self, node: Node) {
        self.out.push(node);
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(self.unexpected("shallower nesting"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Run `f` against a fresh output buffer and hand back what it emitted
    fn capture(&mut self, f: impl FnOnce(&mut Self) -> PResult<()>) -> PResult<Vec<Node>> {
        let outer = std::mem::take(&mut self.out);
        let result = f(self);
        let inner = std::mem::replace(&mut self.out, outer);
        result.map(|()| inner)
    }

    /// Restore on structural failure, folding it into `furthest`
    ///
    /// Returns whether the attempt succeeded. Lexical errors are terminal.
    fn settle(
        &mut self,
        start: &Mark,
        result: PResult<()>,
        furthest: &mut Option<StructuralError>,
    ) -> PResult<bool> {
        match result {
            Ok(()) => Ok(true),
            Err(ParseError::Structural(err)) => {
                self.reset(start.clone());
                *furthest = Some(match furthest.take() {
                    Some(prev) => prev.furthest(err),
                    None => err,
                });
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    // ---- blocks ----

    fn stylesheet(&mut self) -> PResult<()> {
        self.body(RuleKind::Style)?;
        self.expect(TokenKind::Eof, "end of input")
    }

    /// Items up to a closing `}` or the end of input, neither consumed
    fn body(&mut self, child: RuleKind) -> PResult<()> {
        loop {
            loop {
                match self.peek_kind()? {
                    TokenKind::Whitespace | TokenKind::Semicolon => {
                        self.bump()?;
                    }
                    _ => break,
                }
            }
            match self.peek_kind()? {
                TokenKind::Eof | TokenKind::CloseCurly => return Ok(()),
                TokenKind::AtKeyword(name) => {
                    self.bump()?;
                    self.at_rule(name)?;
                }
                _ => self.item(child)?,
            }
        }
    }

    fn item(&mut self, child: RuleKind) -> PResult<()> {
        let start = self.mark();
        let mut furthest = None;

        let result = self.declaration();
        if self.settle(&start, result, &mut furthest)? {
            return Ok(());
        }
        let result = self.rule(child);
        if self.settle(&start, result, &mut furthest)? {
            return Ok(());
        }
        let result = self.partial();
        if self.settle(&start, result, &mut furthest)? {
            return Ok(());
        }

        Err(match furthest {
            Some(err) => err.into(),
            None => self.unexpected("declaration or rule"),
        })
    }

    fn rule(&mut self, kind: RuleKind) -> PResult<()> {
        self.enter()?;
        self.push(Node::rule_start(kind));
        self.selector_list()?;
        self.skip_ws()?;
        self.expect(TokenKind::OpenCurly, "`{`")?;
        self.body(RuleKind::Style)?;
        self.expect(TokenKind::CloseCurly, "`}`")?;
        self.push(Node::Empty(EmptyKind::RuleEnd));
        self.leave();
        Ok(())
    }

    /// At-rule after its `@name` token
    fn at_rule(&mut self, name: String) -> PResult<()> {
        let kind = RuleKind::from_at_keyword(&name);
        self.enter()?;
        self.push(Node::rule_start(kind));
        self.push(Node::text(StringKind::RuleName, name));
        self.skip_ws()?;

        let mut pieces = Vec::new();
        loop {
            match self.peek_kind()? {
                TokenKind::OpenCurly
                | TokenKind::Semicolon
                | TokenKind::CloseCurly
                | TokenKind::Eof => break,
                TokenKind::Interpolation(index) => pieces.push(Piece::Interp(index)),
                TokenKind::StringHead { quote, text } => {
                    self.bump()?;
                    let nodes = self.capture(|p| p.interpolated_string(quote, &text))?;
                    pieces.push(Piece::Block(nodes));
                    continue;
                }
                other => push_token_text(&mut pieces, &other),
            }
            self.bump()?;
        }
        if let Some(Piece::Text(last)) = pieces.last_mut() {
            let trimmed = last.trim_end().len();
            last.truncate(trimmed);
        }

        let glued: Vec<bool> = (0..pieces.len()).map(|at| is_glued(&pieces, at)).collect();
        for (piece, glued) in pieces.into_iter().zip(glued) {
            match piece {
                Piece::Text(text) if !text.is_empty() => {
                    self.push(Node::String(StringKind::Condition, text))
                }
                Piece::Text(_) => {}
                Piece::Interp(index) if glued => self.push(Node::fragment(index)),
                Piece::Interp(index) => self.push(Node::Ref(RefKind::ConditionRef, index)),
                Piece::Block(nodes) | Piece::Attribute(nodes) => self.out.extend(nodes),
            }
        }

        match self.peek_kind()? {
            TokenKind::OpenCurly => {
                self.bump()?;
                let child = if kind == RuleKind::Keyframes {
                    RuleKind::Keyframe
                } else {
                    RuleKind::Style
                };
                self.body(child)?;
                self.expect(TokenKind::CloseCurly, "`}`")?;
            }
            TokenKind::Semicolon => {
                self.bump()?;
            }
            _ => {}
        }
        self.push(Node::Empty(EmptyKind::RuleEnd));
        self.leave();
        Ok(())
    }

    /// An interpolation standing in for a whole block item
    fn partial(&mut self) -> PResult<()> {
        let index = match self.peek_kind()? {
            TokenKind::Interpolation(index) => index,
            _ => return Err(self.unexpected("interpolation")),
        };
        self.bump()?;
        match self.peek_kind()? {
            TokenKind::Whitespace
            | TokenKind::Semicolon
            | TokenKind::CloseCurly
            | TokenKind::Eof => {}
            _ => return Err(self.unexpected("end of interpolated block")),
        }
        self.push(Node::Ref(RefKind::PartialRef, index));
        Ok(())
    }

    // ---- declarations and values ----

    fn declaration(&mut self) -> PResult<()> {
        self.push(Node::Empty(EmptyKind::DeclarationStart));
        self.property()?;
        self.skip_ws()?;
        self.expect(TokenKind::Colon, "`:`")?;
        self.push(Node::Empty(EmptyKind::DeclarationSeparator));
        self.value(false)?;
        match self.peek_kind()? {
            TokenKind::Semicolon => {
                self.bump()?;
            }
            TokenKind::CloseCurly | TokenKind::Eof => {}
            _ => return Err(self.unexpected("`;`")),
        }
        self.push(Node::Empty(EmptyKind::DeclarationEnd));
        Ok(())
    }

    fn property(&mut self) -> PResult<()> {
        let mut pieces = Vec::new();
        loop {
            match self.peek_kind()? {
                TokenKind::Ident(name) => push_text(&mut pieces, &name),
                TokenKind::Delim(c @ ('-' | '_' | '*')) => push_text(&mut pieces, c.encode_utf8(&mut [0; 4])),
                TokenKind::Interpolation(index) => pieces.push(Piece::Interp(index)),
                _ => break,
            }
            self.bump()?;
        }

        if pieces.is_empty() {
            return Err(self.unexpected("property name"));
        }
        if let [Piece::Interp(index)] = pieces.as_slice() {
            let index = *index;
            self.push(Node::Ref(RefKind::PropertyRef, index));
            return Ok(());
        }
        // Interpolations inside a property name are always part of the word
        for piece in pieces {
            match piece {
                Piece::Text(text) => self.push(Node::String(StringKind::Property, text)),
                Piece::Interp(index) => self.push(Node::fragment(index)),
                Piece::Block(nodes) | Piece::Attribute(nodes) => self.out.extend(nodes),
            }
        }
        Ok(())
    }

    /// Whole template as one value, the `css` helper form
    fn value_fragment(&mut self) -> PResult<()> {
        self.value(false)?;
        if self.peek_kind()? == TokenKind::Semicolon {
            self.bump()?;
            self.skip_ws()?;
        }
        self.expect(TokenKind::Eof, "end of input")
    }

    /// Words up to `;`, `}` or end of input, or `)` inside a function
    fn value(&mut self, nested: bool) -> PResult<()> {
        let start = self.out.len();
        loop {
            self.skip_ws()?;
            match self.peek_kind()? {
                TokenKind::Semicolon | TokenKind::CloseCurly | TokenKind::Eof => break,
                TokenKind::CloseParen if nested => break,
                TokenKind::Comma => {
                    self.bump()?;
                    self.push(Node::Empty(EmptyKind::ValueSeparator));
                    continue;
                }
                _ => {}
            }
            let pieces = self.value_word()?;
            if pieces.is_empty() {
                return Err(self.unexpected("value"));
            }
            self.emit_word(pieces, &VALUE_WORD);
        }
        if !nested && self.out.len() == start {
            return Err(self.unexpected("value"));
        }
        Ok(())
    }

    /// One word; a `:` is plain text here, as in `progid:` filter values
    fn value_word(&mut self) -> PResult<Vec<Piece>> {
        let mut pieces = Vec::new();
        loop {
            match self.peek_kind()? {
                TokenKind::Whitespace
                | TokenKind::Comma
                | TokenKind::Semicolon
                | TokenKind::CloseCurly
                | TokenKind::OpenCurly
                | TokenKind::CloseParen
                | TokenKind::Eof => break,
                TokenKind::StringMiddle(_) | TokenKind::StringTail(_) => {
                    return Err(self.unexpected("value"));
                }
                TokenKind::Interpolation(index) => {
                    self.bump()?;
                    pieces.push(Piece::Interp(index));
                }
                TokenKind::Function(name) => {
                    self.bump()?;
                    let nodes = self.capture(|p| p.function(name))?;
                    pieces.push(Piece::Block(nodes));
                }
                TokenKind::OpenParen => {
                    self.bump()?;
                    let nodes = self.capture(|p| p.function(String::new()))?;
                    pieces.push(Piece::Block(nodes));
                }
                TokenKind::StringHead { quote, text } => {
                    self.bump()?;
                    let nodes = self.capture(|p| p.interpolated_string(quote, &text))?;
                    pieces.push(Piece::Block(nodes));
                }
                other => {
                    self.bump()?;
                    push_token_text(&mut pieces, &other);
                }
            }
        }
        Ok(pieces)
    }

    /// Function arguments after `name(`
    fn function(&mut self, name: String) -> PResult<()> {
        self.enter()?;
        self.push(Node::String(StringKind::FunctionStart, name));
        self.value(true)?;
        self.expect(TokenKind::CloseParen, "`)`")?;
        self.push(Node::Empty(EmptyKind::FunctionEnd));
        self.leave();
        Ok(())
    }

    /// Remaining pieces of a string after its head token
    fn interpolated_string(&mut self, quote: char, head: &str) -> PResult<()> {
        self.push(Node::Empty(EmptyKind::StringStart));
        if !head.is_empty() {
            self.push(Node::String(StringKind::Value, requote(head, quote)));
        }
        loop {
            match self.peek_kind()? {
                TokenKind::Interpolation(index) => {
                    self.push(Node::Ref(RefKind::StringRef, index));
                }
                TokenKind::StringMiddle(text) => {
                    if !text.is_empty() {
                        self.push(Node::String(StringKind::Value, requote(&text, quote)));
                    }
                }
                TokenKind::StringTail(text) => {
                    if !text.is_empty() {
                        self.push(Node::String(StringKind::Value, requote(&text, quote)));
                    }
                    self.bump()?;
                    break;
                }
                _ => return Err(self.unexpected("end of string")),
            }
            self.bump()?;
        }
        self.push(Node::Empty(EmptyKind::StringEnd));
        Ok(())
    }

    fn emit_word(&mut self, pieces: Vec<Piece>, kinds: &WordKinds) {
        if pieces.len() == 1 && !matches!(pieces[0], Piece::Attribute(_)) {
            for piece in pieces {
                match piece {
                    Piece::Text(text) => self.push(Node::String(kinds.text, text)),
                    Piece::Interp(index) => self.push(Node::Ref(kinds.reference, index)),
                    Piece::Block(nodes) | Piece::Attribute(nodes) => self.out.extend(nodes),
                }
            }
            return;
        }

        let glued: Vec<bool> = (0..pieces.len()).map(|at| is_glued(&pieces, at)).collect();
        self.push(Node::Empty(kinds.open));
        for (piece, glued) in pieces.into_iter().zip(glued) {
            match piece {
                Piece::Text(text) => self.push(Node::String(kinds.text, text)),
                Piece::Interp(index) if glued => self.push(Node::fragment(index)),
                Piece::Interp(index) => self.push(Node::Ref(kinds.reference, index)),
                Piece::Block(nodes) | Piece::Attribute(nodes) => self.out.extend(nodes),
            }
        }
        self.push(Node::Empty(kinds.close));
    }

    // ---- selectors ----

    fn selector_list(&mut self) -> PResult<()> {
        loop {
            self.skip_ws()?;
            self.complex_selector()?;
            if self.peek_kind()? != TokenKind::Comma {
                return Ok(());
            }
            self.bump()?;
            self.push(Node::Empty(EmptyKind::SelectorSeparator));
        }
    }

    fn starts_compound(kind: &TokenKind) -> bool {
        match kind {
            TokenKind::Ident(_)
            | TokenKind::Hash(_)
            | TokenKind::Numeric(_)
            | TokenKind::Function(_)
            | TokenKind::Colon
            | TokenKind::OpenSquare
            | TokenKind::Interpolation(_) => true,
            TokenKind::Delim(c) => !matches!(c, '>' | '+' | '~'),
            _ => false,
        }
    }

    fn complex_selector(&mut self) -> PResult<()> {
        let mut compounds = 0;
        loop {
            let spaced = self.skip_ws()?;
            let kind = self.peek_kind()?;
            let combinator = match kind {
                TokenKind::Delim('>') => Some(EmptyKind::ChildCombinator),
                TokenKind::Delim('+') => Some(EmptyKind::NextSiblingCombinator),
                TokenKind::Delim('~') => Some(EmptyKind::SubsequentSiblingCombinator),
                _ => None,
            };
            if let Some(combinator) = combinator {
                self.bump()?;
                self.push(Node::Empty(combinator));
                self.skip_ws()?;
            } else if !Self::starts_compound(&kind) {
                break;
            } else if spaced && compounds > 0 {
                self.push(Node::Empty(EmptyKind::SpaceCombinator));
            }

            let pieces = self.compound_pieces()?;
            if pieces.is_empty() {
                return Err(self.unexpected("selector"));
            }
            self.emit_word(pieces, &SELECTOR_WORD);
            compounds += 1;
        }
        if compounds == 0 {
            return Err(self.unexpected("selector"));
        }
        Ok(())
    }

    fn compound_pieces(&mut self) -> PResult<Vec<Piece>> {
        let mut pieces = Vec::new();
        loop {
            let kind = self.peek_kind()?;
            if !Self::starts_compound(&kind) {
                break;
            }
            self.bump()?;
            match kind {
                TokenKind::Delim('&') => pieces.push(Piece::Block(vec![Node::Empty(EmptyKind::ParentSelector)])),
                TokenKind::Delim('*') => pieces.push(Piece::Block(vec![Node::Empty(EmptyKind::UniversalSelector)])),
                TokenKind::Interpolation(index) => pieces.push(Piece::Interp(index)),
                TokenKind::OpenSquare => {
                    let nodes = self.capture(|p| p.attribute())?;
                    pieces.push(Piece::Attribute(nodes));
                }
                TokenKind::Function(name) => {
                    push_text(&mut pieces, &name);
                    push_text(&mut pieces, "(");
                    self.pseudo_arguments(&mut pieces)?;
                }
                other => push_token_text(&mut pieces, &other),
            }
        }
        Ok(pieces)
    }

    /// Balanced pseudo-class arguments after `name(`, kept as text
    fn pseudo_arguments(&mut self, pieces: &mut Vec<Piece>) -> PResult<()> {
        let mut open = 1usize;
        loop {
            let kind = self.peek_kind()?;
            match kind {
                TokenKind::Eof
                | TokenKind::OpenCurly
                | TokenKind::CloseCurly
                | TokenKind::Semicolon
                | TokenKind::StringHead { .. } => return Err(self.unexpected("`)`")),
                TokenKind::Interpolation(index) => pieces.push(Piece::Interp(index)),
                TokenKind::Function(_) | TokenKind::OpenParen => {
                    open += 1;
                    push_token_text(pieces, &kind);
                }
                TokenKind::CloseParen => {
                    open -= 1;
                    push_text(pieces, ")");
                    if open == 0 {
                        self.bump()?;
                        return Ok(());
                    }
                }
                other => push_token_text(pieces, &other),
            }
            self.bump()?;
        }
    }

    /// Attribute selector contents after `[`
    fn attribute(&mut self) -> PResult<()> {
        self.skip_ws()?;
        let name = match self.peek_kind()? {
            TokenKind::Ident(name) => name,
            _ => return Err(self.unexpected("attribute name")),
        };
        self.bump()?;
        self.push(Node::String(StringKind::AttributeName, name));
        self.skip_ws()?;

        let operator = match self.peek_kind()? {
            TokenKind::Delim('=') => Some("=".to_string()),
            TokenKind::Delim(c @ ('~' | '|' | '^' | '$' | '*')) => {
                self.bump()?;
                if self.peek_kind()? != TokenKind::Delim('=') {
                    return Err(self.unexpected("`=`"));
                }
                Some(format!("{}=", c))
            }
            TokenKind::CloseSquare => None,
            _ => return Err(self.unexpected("attribute operator")),
        };

        if let Some(operator) = operator {
            self.bump()?;
            self.push(Node::String(StringKind::AttributeOperator, operator));
            self.skip_ws()?;

            let mut text = String::new();
            loop {
                match self.peek_kind()? {
                    TokenKind::CloseSquare => break,
                    TokenKind::Eof
                    | TokenKind::OpenCurly
                    | TokenKind::CloseCurly
                    | TokenKind::Semicolon => return Err(self.unexpected("`]`")),
                    TokenKind::Whitespace => text.push(' '),
                    TokenKind::Interpolation(index) => {
                        self.flush_attribute_text(&mut text);
                        self.push(Node::Ref(RefKind::AttributeValueRef, index));
                    }
                    TokenKind::StringHead { quote, text: head } => {
                        self.flush_attribute_text(&mut text);
                        self.bump()?;
                        self.interpolated_string(quote, &head)?;
                        continue;
                    }
                    other => other.write_css(&mut text),
                }
                self.bump()?;
            }
            self.flush_attribute_text(&mut text);
        }

        self.expect(TokenKind::CloseSquare, "`]`")
    }

    fn flush_attribute_text(&mut self, text: &mut String) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.push(Node::String(StringKind::AttributeValue, trimmed.to_string()));
        }
        text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::assemble;
    use crate::lexer::lex;
    use crate::node::IdentifierKind;

    fn tokens(chunks: &[&str]) -> TokenStream {
        let refs = vec![(); chunks.len() - 1];
        lex(assemble(chunks, &refs).unwrap())
    }

    fn parse_chunks(chunks: &[&str]) -> Result<Vec<Node>, ParseError> {
        parse(tokens(chunks))
    }

    fn empty(kind: EmptyKind) -> Node {
        Node::Empty(kind)
    }

    fn text(kind: StringKind, text: &str) -> Node {
        Node::text(kind, text)
    }

    fn reference(kind: RefKind, index: usize) -> Node {
        Node::Ref(kind, index)
    }

    fn declaration(property: &str, value: &str) -> Vec<Node> {
        vec![
            empty(EmptyKind::DeclarationStart),
            text(StringKind::Property, property),
            empty(EmptyKind::DeclarationSeparator),
            text(StringKind::Value, value),
            empty(EmptyKind::DeclarationEnd),
        ]
    }

    #[test]
    fn test_interpolated_declaration() {
        let nodes = parse_chunks(&["color: ", ";"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                empty(EmptyKind::DeclarationStart),
                text(StringKind::Property, "color"),
                empty(EmptyKind::DeclarationSeparator),
                reference(RefKind::ValueRef, 0),
                empty(EmptyKind::DeclarationEnd),
            ]
        );
        let codes: Vec<u8> = nodes.iter().map(Node::kind_code).collect();
        assert_eq!(codes, vec![35, 13, 36, 22, 37]);
    }

    #[test]
    fn test_value_fragment_fallback() {
        let nodes = parse_chunks(&["a", "b"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                empty(EmptyKind::CompoundValueStart),
                text(StringKind::Value, "a"),
                Node::fragment(0),
                text(StringKind::Value, "b"),
                empty(EmptyKind::CompoundValueEnd),
            ]
        );

        let strict = ParseOptions {
            allow_value_fragments: false,
            ..ParseOptions::default()
        };
        assert!(parse_with_options(tokens(&["a", "b"]), &strict).is_err());
    }

    #[test]
    fn test_style_rule() {
        let nodes = parse_chunks(&["a:hover { color: red; }"]).unwrap();
        let mut expected = vec![
            Node::rule_start(RuleKind::Style),
            text(StringKind::Selector, "a:hover"),
        ];
        expected.extend(declaration("color", "red"));
        expected.push(empty(EmptyKind::RuleEnd));
        assert_eq!(nodes, expected);
    }

    #[test]
    fn test_colon_in_value() {
        let nodes = parse_chunks(&["filter: progid:DXImageTransform.Microsoft.gradient(x=1);"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                empty(EmptyKind::DeclarationStart),
                text(StringKind::Property, "filter"),
                empty(EmptyKind::DeclarationSeparator),
                empty(EmptyKind::CompoundValueStart),
                text(StringKind::Value, "progid:DXImageTransform.Microsoft."),
                text(StringKind::FunctionStart, "gradient"),
                text(StringKind::Value, "x=1"),
                empty(EmptyKind::FunctionEnd),
                empty(EmptyKind::CompoundValueEnd),
                empty(EmptyKind::DeclarationEnd),
            ]
        );

        // `b:hover` still becomes a nested rule once `{` follows
        let nodes = parse_chunks(&["a { b:hover { color: red } }"]).unwrap();
        let mut expected = vec![
            Node::rule_start(RuleKind::Style),
            text(StringKind::Selector, "a"),
            Node::rule_start(RuleKind::Style),
            text(StringKind::Selector, "b:hover"),
        ];
        expected.extend(declaration("color", "red"));
        expected.push(empty(EmptyKind::RuleEnd));
        expected.push(empty(EmptyKind::RuleEnd));
        assert_eq!(nodes, expected);
    }

    #[test]
    fn test_selectors_and_combinators() {
        let nodes = parse_chunks(&["&:hover > .icon, ", " { }"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::rule_start(RuleKind::Style),
                empty(EmptyKind::CompoundSelectorStart),
                empty(EmptyKind::ParentSelector),
                text(StringKind::Selector, ":hover"),
                empty(EmptyKind::CompoundSelectorEnd),
                empty(EmptyKind::ChildCombinator),
                text(StringKind::Selector, ".icon"),
                empty(EmptyKind::SelectorSeparator),
                reference(RefKind::SelectorRef, 0),
                empty(EmptyKind::RuleEnd),
            ]
        );

        let nodes = parse_chunks(&["ul li ~ * { }"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::rule_start(RuleKind::Style),
                text(StringKind::Selector, "ul"),
                empty(EmptyKind::SpaceCombinator),
                text(StringKind::Selector, "li"),
                empty(EmptyKind::SubsequentSiblingCombinator),
                empty(EmptyKind::UniversalSelector),
                empty(EmptyKind::RuleEnd),
            ]
        );
    }

    #[test]
    fn test_glued_selector_interpolation() {
        let nodes = parse_chunks(&[".btn-", ":hover { }"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::rule_start(RuleKind::Style),
                empty(EmptyKind::CompoundSelectorStart),
                text(StringKind::Selector, ".btn-"),
                Node::fragment(0),
                text(StringKind::Selector, ":hover"),
                empty(EmptyKind::CompoundSelectorEnd),
                empty(EmptyKind::RuleEnd),
            ]
        );
    }

    #[test]
    fn test_attribute_selector() {
        let nodes = parse_chunks(&["a[href^=", "] { }"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::rule_start(RuleKind::Style),
                empty(EmptyKind::CompoundSelectorStart),
                text(StringKind::Selector, "a"),
                text(StringKind::AttributeName, "href"),
                text(StringKind::AttributeOperator, "^="),
                reference(RefKind::AttributeValueRef, 0),
                empty(EmptyKind::CompoundSelectorEnd),
                empty(EmptyKind::RuleEnd),
            ]
        );

        let nodes = parse_chunks(&["[data-x=\"1\"] { }"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::rule_start(RuleKind::Style),
                empty(EmptyKind::CompoundSelectorStart),
                text(StringKind::AttributeName, "data-x"),
                text(StringKind::AttributeOperator, "="),
                text(StringKind::AttributeValue, "\"1\""),
                empty(EmptyKind::CompoundSelectorEnd),
                empty(EmptyKind::RuleEnd),
            ]
        );
    }

    #[test]
    fn test_at_rules_and_keyframes() {
        let nodes = parse_chunks(&[
            "@media (min-width: ",
            "px) { a { color: red } } @keyframes fade { from { opacity: 0 } }",
        ])
        .unwrap();

        let mut expected = vec![
            Node::rule_start(RuleKind::Media),
            text(StringKind::RuleName, "media"),
            text(StringKind::Condition, "(min-width: "),
            Node::fragment(0),
            text(StringKind::Condition, "px)"),
            Node::rule_start(RuleKind::Style),
            text(StringKind::Selector, "a"),
        ];
        expected.extend(declaration("color", "red"));
        expected.extend([
            empty(EmptyKind::RuleEnd),
            empty(EmptyKind::RuleEnd),
            Node::rule_start(RuleKind::Keyframes),
            text(StringKind::RuleName, "keyframes"),
            text(StringKind::Condition, "fade"),
            Node::rule_start(RuleKind::Keyframe),
            text(StringKind::Selector, "from"),
        ]);
        expected.extend(declaration("opacity", "0"));
        expected.extend([empty(EmptyKind::RuleEnd), empty(EmptyKind::RuleEnd)]);
        assert_eq!(nodes, expected);
    }

    #[test]
    fn test_statement_at_rule() {
        let nodes = parse_chunks(&["@import url(a.css);"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::rule_start(RuleKind::Import),
                text(StringKind::RuleName, "import"),
                text(StringKind::Condition, "url(a.css)"),
                empty(EmptyKind::RuleEnd),
            ]
        );
    }

    #[test]
    fn test_partial_interpolations() {
        let nodes = parse_chunks(&["", "\ncolor: red;\n", ""]).unwrap();
        let mut expected = vec![reference(RefKind::PartialRef, 0)];
        expected.extend(declaration("color", "red"));
        expected.push(reference(RefKind::PartialRef, 1));
        assert_eq!(nodes, expected);
    }

    #[test]
    fn test_interpolated_property() {
        let nodes = parse_chunks(&["margin-", ": 0; ", ": 1px"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                empty(EmptyKind::DeclarationStart),
                text(StringKind::Property, "margin-"),
                Node::fragment(0),
                empty(EmptyKind::DeclarationSeparator),
                text(StringKind::Value, "0"),
                empty(EmptyKind::DeclarationEnd),
                empty(EmptyKind::DeclarationStart),
                reference(RefKind::PropertyRef, 1),
                empty(EmptyKind::DeclarationSeparator),
                text(StringKind::Value, "1px"),
                empty(EmptyKind::DeclarationEnd),
            ]
        );
    }

    #[test]
    fn test_compound_values_and_separators() {
        let nodes = parse_chunks(&["transition: opacity ", "ms, transform 1s;"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                empty(EmptyKind::DeclarationStart),
                text(StringKind::Property, "transition"),
                empty(EmptyKind::DeclarationSeparator),
                text(StringKind::Value, "opacity"),
                empty(EmptyKind::CompoundValueStart),
                Node::fragment(0),
                text(StringKind::Value, "ms"),
                empty(EmptyKind::CompoundValueEnd),
                empty(EmptyKind::ValueSeparator),
                text(StringKind::Value, "transform"),
                text(StringKind::Value, "1s"),
                empty(EmptyKind::DeclarationEnd),
            ]
        );
    }

    #[test]
    fn test_function_values() {
        let nodes = parse_chunks(&["width: calc(100% - ", ");"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                empty(EmptyKind::DeclarationStart),
                text(StringKind::Property, "width"),
                empty(EmptyKind::DeclarationSeparator),
                text(StringKind::FunctionStart, "calc"),
                text(StringKind::Value, "100%"),
                text(StringKind::Value, "-"),
                reference(RefKind::ValueRef, 0),
                empty(EmptyKind::FunctionEnd),
                empty(EmptyKind::DeclarationEnd),
            ]
        );
    }

    #[test]
    fn test_interpolated_strings() {
        let nodes = parse_chunks(&["content: 'say \"", "\"';"]).unwrap();
        assert_eq!(
            nodes,
            vec![
                empty(EmptyKind::DeclarationStart),
                text(StringKind::Property, "content"),
                empty(EmptyKind::DeclarationSeparator),
                empty(EmptyKind::StringStart),
                text(StringKind::Value, "say \\\""),
                reference(RefKind::StringRef, 0),
                text(StringKind::Value, "\\\""),
                empty(EmptyKind::StringEnd),
                empty(EmptyKind::DeclarationEnd),
            ]
        );
    }

    #[test]
    fn test_requote() {
        assert_eq!(requote("it\\'s \"x\"", '\''), "it's \\\"x\\\"");
        assert_eq!(requote("a\\\"b", '"'), "a\\\"b");
    }

    #[test]
    fn test_unclosed_rule_reports_furthest_error() {
        let err = parse_chunks(&["a { color: red"]).unwrap_err();
        match err {
            ParseError::Structural(err) => {
                assert_eq!(err.expected, "`}`");
                assert_eq!(err.offset, 14);
                assert_eq!(err.found, "end of input");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(parse_chunks(&["}"]), Err(ParseError::Structural(_))));
    }

    #[test]
    fn test_lexical_errors_are_terminal() {
        assert_eq!(
            parse_chunks(&["color: \"x"]),
            Err(ParseError::Lexical(LexError::UnterminatedString { start: 7 }))
        );
    }

    #[test]
    fn test_max_depth() {
        let shallow = ParseOptions {
            max_depth: 2,
            ..ParseOptions::default()
        };
        let source = ["a { b { c { } } }"];
        assert!(matches!(
            parse_with_options(tokens(&source), &shallow),
            Err(ParseError::Structural(_))
        ));
        assert!(parse_chunks(&source).is_ok());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let chunks = ["a { color: ", "; ", " } ", ""];
        let first = parse_chunks(&chunks).unwrap();
        let second = parse_chunks(&chunks).unwrap();
        assert_eq!(first, second);
        assert!(first
            .iter()
            .any(|n| matches!(n, Node::Identifier(IdentifierKind::RuleStart, 1))));
    }

    #[test]
    fn test_empty_template() {
        assert_eq!(parse_chunks(&[""]).unwrap(), Vec::<Node>::new());
        assert_eq!(parse_chunks(&["  ;  "]).unwrap(), Vec::<Node>::new());
    }
}
