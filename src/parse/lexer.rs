//! Tokenizer for the exchange format
//!
//! Tokens are byte ranges into the input plus a classified payload. Single
//! character operators are returned immediately; everything else is read up
//! to the next delimiter and then classified.

use super::decoder;
use crate::value::{BitString, Logical};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    /// End of input
    None,
    Operator(u8),
    Identifier(u32),
    String,
    Enumeration,
    /// `.T.`, `.F.` and `.U.`
    Bool(Logical),
    Int(i64),
    Float(f64),
    Binary,
    Keyword,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

impl Token {
    pub fn none(offset: usize) -> Self {
        Self { kind: TokenKind::None, start: offset, end: offset }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, TokenKind::None)
    }

    pub fn is_operator(&self, op: u8) -> bool {
        matches!(self.kind, TokenKind::Operator(c) if c == op)
    }

    pub fn identifier(&self) -> Option<u32> {
        match self.kind {
            TokenKind::Identifier(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_keyword(&self) -> bool {
        matches!(self.kind, TokenKind::Keyword)
    }

    /// Floats accept integer tokens as well.
    pub fn as_float(&self) -> Option<f64> {
        match self.kind {
            TokenKind::Float(d) => Some(d),
            TokenKind::Int(i) => Some(i as f64),
            _ => None,
        }
    }
}

const OPERATORS: &[u8] = b"()=,;$*";
const DELIMITERS: &[u8] = b"()=,;/";

fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r')
}

/// Cursor over an in-memory buffer producing [`Token`]s.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset.min(self.data.len());
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(is_space) {
                self.pos += 1;
            }
            if self.data[self.pos.min(self.data.len())..].starts_with(b"/*") {
                match self.data[self.pos + 2..].windows(2).position(|w| w == b"*/") {
                    Some(end) => self.pos += 2 + end + 2,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            break;
        }
    }

    /// Advance past a quoted string whose opening quote was already consumed.
    fn skip_string(&mut self) -> Result<()> {
        match decoder::skip(self.data, self.pos) {
            Some(end) => {
                self.pos = end;
                Ok(())
            }
            None => {
                let begin = self.pos;
                self.pos = self.data.len();
                Err(Error::UnexpectedEof(begin))
            }
        }
    }

    /// Read the next token. At end of input a `None` token is returned; input
    /// ending inside a string is an error.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let Some(first) = self.peek() else {
            return Ok(Token::none(start));
        };

        if OPERATORS.contains(&first) {
            self.pos += 1;
            return Ok(Token { kind: TokenKind::Operator(first), start, end: self.pos });
        }

        let mut len = 0;
        while let Some(c) = self.peek() {
            if len > 0 && DELIMITERS.contains(&c) {
                break;
            }
            self.pos += 1;
            len += 1;
            if c == b'\'' {
                self.skip_string()?;
            }
        }

        let mut token = Token { kind: TokenKind::Keyword, start, end: self.pos };
        token.kind = self.classify(&token);
        Ok(token)
    }

    fn classify(&self, token: &Token) -> TokenKind {
        let text = self.text(token);
        let Some(&first) = text.as_bytes().first() else {
            return TokenKind::None;
        };
        match first {
            b'#' => match text[1..].parse::<u32>() {
                Ok(id) => TokenKind::Identifier(id),
                Err(_) => {
                    tracing::error!(
                        "Instance identifier '{}' at offset {} is not a valid integer",
                        text,
                        token.start
                    );
                    TokenKind::Operator(b'$')
                }
            },
            b'\'' => TokenKind::String,
            b'"' => TokenKind::Binary,
            b'.' if text.len() > 1 && !text.as_bytes()[1].is_ascii_digit() => match text.as_str() {
                ".T." => TokenKind::Bool(Logical::True),
                ".F." => TokenKind::Bool(Logical::False),
                ".U." => TokenKind::Bool(Logical::Unknown),
                _ => TokenKind::Enumeration,
            },
            b'0'..=b'9' | b'+' | b'-' | b'.' => {
                if let Ok(i) = text.parse::<i64>() {
                    TokenKind::Int(i)
                } else if let Ok(d) = text.parse::<f64>() {
                    TokenKind::Float(d)
                } else {
                    TokenKind::Keyword
                }
            }
            _ => TokenKind::Keyword,
        }
    }

    /// Token text with separators removed. Inside strings only line breaks are removed.
    pub fn text(&self, token: &Token) -> String {
        let raw = &self.data[token.start..token.end.min(self.data.len())];
        let mut out = Vec::with_capacity(raw.len());
        let mut in_string = false;
        for &c in raw {
            if c == b'\'' {
                in_string = !in_string;
            }
            if c == b'\n' || c == b'\r' || (!in_string && (c == b' ' || c == b'\t')) {
                continue;
            }
            out.push(c);
        }
        String::from_utf8(out).unwrap_or_else(|e| e.into_bytes().iter().map(|b| char::from(*b)).collect())
    }

    /// Uppercased keyword text.
    pub fn keyword(&self, token: &Token) -> Result<String> {
        if !token.is_keyword() {
            return Err(Error::InvalidToken { offset: token.start, expected: "keyword" });
        }
        Ok(self.text(token).to_ascii_uppercase())
    }

    /// Decoded string literal content.
    pub fn string_value(&self, token: &Token) -> Result<String> {
        if token.kind != TokenKind::String {
            return Err(Error::InvalidToken { offset: token.start, expected: "string" });
        }
        let raw = &self.data[token.start..token.end.min(self.data.len())];
        let first = raw.iter().position(|c| *c == b'\'').unwrap_or(0);
        let last = raw.iter().rposition(|c| *c == b'\'').unwrap_or(raw.len());
        if last <= first {
            return Err(Error::InvalidToken { offset: token.start, expected: "string" });
        }
        let content: Vec<u8> = raw[first + 1..last]
            .iter()
            .copied()
            .filter(|c| *c != b'\n' && *c != b'\r')
            .collect();
        decoder::decode(&content)
    }

    /// Enumeration literal without the surrounding dots.
    pub fn enumeration_value(&self, token: &Token) -> Result<String> {
        if token.kind != TokenKind::Enumeration {
            return Err(Error::InvalidToken { offset: token.start, expected: "enumeration" });
        }
        let text = self.text(token);
        Ok(text.trim_matches('.').to_string())
    }

    pub fn binary_value(&self, token: &Token) -> Result<BitString> {
        if token.kind != TokenKind::Binary {
            return Err(Error::InvalidToken { offset: token.start, expected: "binary" });
        }
        let text = self.text(token);
        BitString::from_hex(text.trim_matches('"'))
    }
}
