//! CSS tokenizer over assembled template units
//!
//! Follows the CSS Syntax tokenization rules closely enough for selectors,
//! declarations and at-rule preludes, with one addition: interpolation markers
//! pass straight through as `Interpolation` tokens. A marker inside a string
//! or comment does not end it; the lexer remembers where it was and resumes
//! in the same mode after emitting the marker.

use std::fmt;

use crate::error::LexError;
use crate::input::Unit;
use crate::stream::Stream;

/// Lexical kind with its text payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    /// Identifier immediately followed by `(`
    Function(String),
    AtKeyword(String),
    Hash(String),
    /// Number, percentage or dimension, raw text including sign and unit
    Numeric(String),
    /// Complete quoted string, raw text including quotes
    Str(String),
    /// Start of a string that an interpolation interrupts
    StringHead { quote: char, text: String },
    /// String text between two interpolations
    StringMiddle(String),
    /// String text after the last interpolation, up to the closing quote
    StringTail(String),
    /// Unquoted `url(...)`, raw text
    Url(String),
    Delim(char),
    Colon,
    Semicolon,
    Comma,
    OpenCurly,
    CloseCurly,
    OpenParen,
    CloseParen,
    OpenSquare,
    CloseSquare,
    Whitespace,
    Interpolation(usize),
    Eof,
}

impl TokenKind {
    /// Append the token's CSS source text
    pub fn write_css(&self, out: &mut String) {
        match self {
            TokenKind::Ident(name) => out.push_str(name),
            TokenKind::Function(name) => {
                out.push_str(name);
                out.push('(');
            }
            TokenKind::AtKeyword(name) => {
                out.push('@');
                out.push_str(name);
            }
            TokenKind::Hash(name) => {
                out.push('#');
                out.push_str(name);
            }
            TokenKind::Numeric(raw) | TokenKind::Str(raw) | TokenKind::Url(raw) => {
                out.push_str(raw)
            }
            TokenKind::StringHead { quote, text } => {
                out.push(*quote);
                out.push_str(text);
            }
            TokenKind::StringMiddle(text) | TokenKind::StringTail(text) => out.push_str(text),
            TokenKind::Delim(c) => out.push(*c),
            TokenKind::Colon => out.push(':'),
            TokenKind::Semicolon => out.push(';'),
            TokenKind::Comma => out.push(','),
            TokenKind::OpenCurly => out.push('{'),
            TokenKind::CloseCurly => out.push('}'),
            TokenKind::OpenParen => out.push('('),
            TokenKind::CloseParen => out.push(')'),
            TokenKind::OpenSquare => out.push('['),
            TokenKind::CloseSquare => out.push(']'),
            TokenKind::Whitespace => out.push(' '),
            TokenKind::Interpolation(_) | TokenKind::Eof => {}
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Eof => f.write_str("end of input"),
            TokenKind::Whitespace => f.write_str("whitespace"),
            TokenKind::Interpolation(index) => write!(f, "interpolation #{}", index),
            other => {
                let mut text = String::new();
                other.write_css(&mut text);
                write!(f, "`{}`", text)
            }
        }
    }
}

/// Token with the unit offset it starts at
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// Tokenize a unit stream
///
/// The result ends with exactly one `Eof` token. On malformed input the last
/// element is the `Err` and no tokens follow it.
pub fn lex(units: Stream<Unit>) -> Stream<Result<Token, LexError>> {
    Stream::unfold(
        Lexer {
            units,
            offset: 0,
            mode: Mode::Normal,
        },
        Lexer::step,
    )
}

// ============================================================================
// Lexer state
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Normal,
    InString { quote: char, start: usize },
    InComment { start: usize },
    Done,
}

enum CommentEnd {
    Closed,
    Interrupted { index: usize, offset: usize },
}

#[derive(Clone)]
struct Lexer {
    units: Stream<Unit>,
    offset: usize,
    mode: Mode,
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0C')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-'
}

fn is_control(c: char) -> bool {
    (c < ' ' && !is_whitespace(c)) || c == '\x7F'
}

fn is_valid_escape(first: Option<char>, second: Option<char>) -> bool {
    first == Some('\\') && matches!(second, Some(c) if c != '\n' && c != '\r' && c != '\x0C')
}

impl Lexer {
    fn step(mut self) -> Option<(Result<Token, LexError>, Lexer)> {
        if self.mode == Mode::Done {
            return None;
        }
        let result = self.scan();
        match &result {
            Ok(Token {
                kind: TokenKind::Eof,
                ..
            })
            | Err(_) => self.mode = Mode::Done,
            Ok(_) => {}
        }
        Some((result, self))
    }

    fn peek(&self) -> Option<Unit> {
        self.units.peek().copied()
    }

    fn peek_at(&self, n: usize) -> Option<Unit> {
        let mut units = self.units.clone();
        for _ in 0..n {
            units = units.next()?.1;
        }
        units.peek().copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.peek_char_at(0)
    }

    fn peek_char_at(&self, n: usize) -> Option<char> {
        match self.peek_at(n) {
            Some(Unit::Char(c)) => Some(c),
            _ => None,
        }
    }

    fn bump(&mut self) -> Option<Unit> {
        let (unit, rest) = self.units.next()?;
        self.units = rest;
        self.offset += 1;
        Some(unit)
    }

    fn scan(&mut self) -> Result<Token, LexError> {
        match self.mode {
            Mode::InString { quote, start } => {
                if let Some(Unit::Interpolation(index)) = self.peek() {
                    let at = self.offset;
                    self.bump();
                    return Ok(Token::new(TokenKind::Interpolation(index), at));
                }
                return self.scan_string(quote, start, true);
            }
            Mode::InComment { start } => match self.skip_comment(start)? {
                CommentEnd::Closed => self.mode = Mode::Normal,
                CommentEnd::Interrupted { index, offset } => {
                    return Ok(Token::new(TokenKind::Interpolation(index), offset));
                }
            },
            Mode::Normal | Mode::Done => {}
        }

        loop {
            let start = self.offset;
            let c = match self.peek() {
                None => return Ok(Token::new(TokenKind::Eof, start)),
                Some(Unit::Interpolation(index)) => {
                    self.bump();
                    return Ok(Token::new(TokenKind::Interpolation(index), start));
                }
                Some(Unit::Char(c)) => c,
            };

            if is_whitespace(c) {
                return Ok(self.scan_whitespace(start));
            }

            if c == '/' && self.peek_char_at(1) == Some('*') {
                self.bump();
                self.bump();
                match self.skip_comment(start)? {
                    CommentEnd::Closed => continue,
                    CommentEnd::Interrupted { index, offset } => {
                        self.mode = Mode::InComment { start };
                        return Ok(Token::new(TokenKind::Interpolation(index), offset));
                    }
                }
            }

            return self.scan_char(c, start);
        }
    }

    fn scan_char(&mut self, c: char, start: usize) -> Result<Token, LexError> {
        let punct = match c {
            ':' => Some(TokenKind::Colon),
            ';' => Some(TokenKind::Semicolon),
            ',' => Some(TokenKind::Comma),
            '{' => Some(TokenKind::OpenCurly),
            '}' => Some(TokenKind::CloseCurly),
            '(' => Some(TokenKind::OpenParen),
            ')' => Some(TokenKind::CloseParen),
            '[' => Some(TokenKind::OpenSquare),
            ']' => Some(TokenKind::CloseSquare),
            _ => None,
        };
        if let Some(kind) = punct {
            self.bump();
            return Ok(Token::new(kind, start));
        }

        match c {
            '"' | '\'' => {
                self.bump();
                self.scan_string(c, start, false)
            }
            '#' => {
                let next = self.peek_char_at(1);
                if next.map_or(false, is_name_char) || is_valid_escape(next, self.peek_char_at(2)) {
                    self.bump();
                    let name = self.consume_name();
                    Ok(Token::new(TokenKind::Hash(name), start))
                } else {
                    self.bump();
                    Ok(Token::new(TokenKind::Delim('#'), start))
                }
            }
            '@' => {
                self.bump();
                if self.starts_ident(0) {
                    let name = self.consume_name();
                    Ok(Token::new(TokenKind::AtKeyword(name), start))
                } else {
                    Ok(Token::new(TokenKind::Delim('@'), start))
                }
            }
            _ if self.starts_number(0) => Ok(self.scan_numeric(start)),
            _ if self.starts_ident(0) => Ok(self.scan_ident_like(start)),
            _ if is_control(c) => Err(LexError::InvalidCharacter {
                found: c,
                offset: start,
            }),
            _ => {
                self.bump();
                Ok(Token::new(TokenKind::Delim(c), start))
            }
        }
    }

    fn scan_whitespace(&mut self, start: usize) -> Token {
        loop {
            while self.peek_char().map_or(false, is_whitespace) {
                self.bump();
            }
            // Comments inside a whitespace run collapse into it, unless they
            // hide an interpolation that must surface as its own token.
            if self.peek_char() == Some('/') && self.peek_char_at(1) == Some('*') {
                let mut probe = self.clone();
                probe.bump();
                probe.bump();
                let comment_start = self.offset;
                if let Ok(CommentEnd::Closed) = probe.skip_comment(comment_start) {
                    *self = probe;
                    continue;
                }
            }
            return Token::new(TokenKind::Whitespace, start);
        }
    }

    /// Consume a comment body after the opening `/*`
    fn skip_comment(&mut self, start: usize) -> Result<CommentEnd, LexError> {
        loop {
            let at = self.offset;
            match self.bump() {
                None => return Err(LexError::UnterminatedComment { start }),
                Some(Unit::Interpolation(index)) => {
                    return Ok(CommentEnd::Interrupted { index, offset: at });
                }
                Some(Unit::Char('*')) if self.peek_char() == Some('/') => {
                    self.bump();
                    return Ok(CommentEnd::Closed);
                }
                Some(Unit::Char(_)) => {}
            }
        }
    }

    /// Scan string text up to the closing quote or the next interpolation
    ///
    /// `resumed` is set when continuing a string after an interpolation.
    fn scan_string(&mut self, quote: char, start: usize, resumed: bool) -> Result<Token, LexError> {
        let token_start = self.offset;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { start }),
                Some(Unit::Interpolation(_)) => {
                    self.mode = Mode::InString { quote, start };
                    let kind = if resumed {
                        TokenKind::StringMiddle(text)
                    } else {
                        TokenKind::StringHead { quote, text }
                    };
                    let offset = if resumed { token_start } else { start };
                    return Ok(Token::new(kind, offset));
                }
                Some(Unit::Char(c)) if c == quote => {
                    self.bump();
                    self.mode = Mode::Normal;
                    let kind = if resumed {
                        TokenKind::StringTail(text)
                    } else {
                        TokenKind::Str(format!("{quote}{text}{quote}"))
                    };
                    let offset = if resumed { token_start } else { start };
                    return Ok(Token::new(kind, offset));
                }
                Some(Unit::Char('\n' | '\r' | '\x0C')) => {
                    return Err(LexError::UnterminatedString { start });
                }
                Some(Unit::Char('\\')) => {
                    self.bump();
                    text.push('\\');
                    match self.peek() {
                        None => return Err(LexError::UnterminatedString { start }),
                        Some(Unit::Char(escaped)) => {
                            self.bump();
                            text.push(escaped);
                        }
                        Some(Unit::Interpolation(_)) => {}
                    }
                }
                Some(Unit::Char(c)) => {
                    self.bump();
                    text.push(c);
                }
            }
        }
    }

    fn starts_ident(&self, n: usize) -> bool {
        let first = self.peek_char_at(n);
        match first {
            Some('-') => {
                let second = self.peek_char_at(n + 1);
                second.map_or(false, |c| is_name_start(c) || c == '-')
                    || is_valid_escape(second, self.peek_char_at(n + 2))
            }
            Some('\\') => is_valid_escape(first, self.peek_char_at(n + 1)),
            Some(c) => is_name_start(c),
            None => false,
        }
    }

    fn starts_number(&self, n: usize) -> bool {
        let digit_at = |at: usize| self.peek_char_at(at).map_or(false, |c| c.is_ascii_digit());
        match self.peek_char_at(n) {
            Some(c) if c.is_ascii_digit() => true,
            Some('.') => digit_at(n + 1),
            Some('+' | '-') => {
                digit_at(n + 1) || (self.peek_char_at(n + 1) == Some('.') && digit_at(n + 2))
            }
            _ => false,
        }
    }

    fn consume_name(&mut self) -> String {
        let mut name = String::new();
        loop {
            match self.peek_char() {
                Some(c) if is_name_char(c) => {
                    self.bump();
                    name.push(c);
                }
                Some('\\') if is_valid_escape(Some('\\'), self.peek_char_at(1)) => {
                    self.bump();
                    name.push('\\');
                    if let Some(Unit::Char(escaped)) = self.bump() {
                        name.push(escaped);
                    }
                }
                _ => return name,
            }
        }
    }

    fn consume_digits(&mut self, raw: &mut String) {
        while let Some(c) = self.peek_char().filter(char::is_ascii_digit) {
            self.bump();
            raw.push(c);
        }
    }

    fn scan_numeric(&mut self, start: usize) -> Token {
        let mut raw = String::new();
        if let Some(sign) = self.peek_char().filter(|c| matches!(c, '+' | '-')) {
            self.bump();
            raw.push(sign);
        }
        self.consume_digits(&mut raw);
        if self.peek_char() == Some('.')
            && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit())
        {
            self.bump();
            raw.push('.');
            self.consume_digits(&mut raw);
        }
        if let Some(e) = self.peek_char().filter(|c| matches!(c, 'e' | 'E')) {
            let next = self.peek_char_at(1);
            let signed = matches!(next, Some('+' | '-'))
                && self.peek_char_at(2).map_or(false, |c| c.is_ascii_digit());
            if next.map_or(false, |c| c.is_ascii_digit()) || signed {
                self.bump();
                raw.push(e);
                if signed {
                    if let Some(Unit::Char(sign)) = self.bump() {
                        raw.push(sign);
                    }
                }
                self.consume_digits(&mut raw);
            }
        }
        if self.peek_char() == Some('%') {
            self.bump();
            raw.push('%');
        } else if self.starts_ident(0) {
            raw.push_str(&self.consume_name());
        }
        Token::new(TokenKind::Numeric(raw), start)
    }

    fn scan_ident_like(&mut self, start: usize) -> Token {
        let name = self.consume_name();
        if self.peek_char() != Some('(') {
            return Token::new(TokenKind::Ident(name), start);
        }
        self.bump();
        if name.eq_ignore_ascii_case("url") {
            if let Some(url) = self.try_unquoted_url(&name) {
                return Token::new(TokenKind::Url(url), start);
            }
        }
        Token::new(TokenKind::Function(name), start)
    }

    /// Scan `url(` contents as one raw token when they are unquoted and
    /// contain no interpolation; otherwise leave the input untouched.
    fn try_unquoted_url(&mut self, name: &str) -> Option<String> {
        let mut probe = self.clone();
        while probe.peek_char().map_or(false, is_whitespace) {
            probe.bump();
        }
        let mut body = String::new();
        loop {
            match probe.peek()? {
                Unit::Interpolation(_) => return None,
                Unit::Char(')') => {
                    probe.bump();
                    break;
                }
                Unit::Char(c) if is_whitespace(c) => {
                    while probe.peek_char().map_or(false, is_whitespace) {
                        probe.bump();
                    }
                    if probe.peek_char() != Some(')') {
                        return None;
                    }
                }
                Unit::Char('"' | '\'' | '(') => return None,
                Unit::Char(c) if is_control(c) => return None,
                Unit::Char('\\') => {
                    probe.bump();
                    body.push('\\');
                    match probe.bump()? {
                        Unit::Char(escaped) => body.push(escaped),
                        Unit::Interpolation(_) => return None,
                    }
                }
                Unit::Char(c) => {
                    probe.bump();
                    body.push(c);
                }
            }
        }
        if body.is_empty() {
            return None;
        }
        *self = probe;
        Some(format!("{name}({body})"))
    }
}
