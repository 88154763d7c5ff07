// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line-oriented scanner for assembly source.
//!
//! One scanner instance tokenizes one logical line. A `#` outside a
//! captured region starts a comment that runs to end of line. The
//! `string` and `error` keywords switch into rest-of-line capture mode.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Char(char),
    /// Rest-of-line payload captured after `string`/`error`.
    Str(String),
    /// Raw whitespace-delimited word (used for `pack` format specs).
    Word(String),
    /// `%hi`, `%lo`, `%position`, `%offset`.
    Modifier(String),
    Op(Operator),
    Equals,
    Colon,
    Comma,
    OpenParen,
    CloseParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    And,
    Xor,
    Or,
    Tilde,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based column of the first byte of the token.
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct ScanError {
    pub column: usize,
    pub message: String,
}

impl ScanError {
    fn new(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScanError {}

pub struct Scanner<'a> {
    line: &'a str,
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            line,
            bytes: line.as_bytes(),
            cursor: 0,
        }
    }

    /// Scan the next token, or `None` at end of line / start of comment.
    pub fn next_token(&mut self) -> Result<Option<Token>, ScanError> {
        self.skip_white();
        let c = self.current_byte();
        if c == b'\0' || c == b'#' {
            return Ok(None);
        }

        let column = self.cursor + 1;
        if is_alpha(c) || c == b'_' {
            return Ok(Some(self.scan_identifier(column)));
        }
        if is_digit(c) {
            return self.scan_number(column).map(Some);
        }
        if c == b'\'' {
            return self.scan_char(column).map(Some);
        }

        let kind = match c {
            b':' => TokenKind::Colon,
            b',' => TokenKind::Comma,
            b'(' => TokenKind::OpenParen,
            b')' => TokenKind::CloseParen,
            b'=' => TokenKind::Equals,
            b'+' => TokenKind::Op(Operator::Plus),
            b'-' => TokenKind::Op(Operator::Minus),
            b'*' => TokenKind::Op(Operator::Star),
            b'/' => TokenKind::Op(Operator::Slash),
            b'~' => TokenKind::Op(Operator::Tilde),
            b'&' => TokenKind::Op(Operator::And),
            b'^' => TokenKind::Op(Operator::Xor),
            b'|' => TokenKind::Op(Operator::Or),
            b'<' => {
                if self.peek_byte(1) == b'<' {
                    self.cursor += 1;
                    TokenKind::Op(Operator::Shl)
                } else {
                    return Err(ScanError::new(column, "Illegal character: <"));
                }
            }
            b'>' => {
                if self.peek_byte(1) == b'>' {
                    self.cursor += 1;
                    TokenKind::Op(Operator::Shr)
                } else {
                    return Err(ScanError::new(column, "Illegal character: >"));
                }
            }
            b'%' => {
                let next = self.peek_byte(1);
                if is_alpha(next) || next == b'_' {
                    self.cursor += 1;
                    return self.scan_modifier(column).map(Some);
                }
                TokenKind::Op(Operator::Percent)
            }
            _ => {
                let found = self.line[self.cursor..].chars().next().unwrap_or('?');
                return Err(ScanError::new(column, format!("Illegal character: {found}")));
            }
        };
        self.cursor += 1;
        Ok(Some(Token { kind, column }))
    }

    /// Capture every remaining byte of the line, verbatim, after eating a
    /// single separating whitespace character. Used by `string`/`error`.
    pub fn capture_rest(&mut self) -> String {
        let mut start = self.cursor;
        if start < self.bytes.len() && is_space(self.bytes[start]) {
            start += 1;
        }
        let rest = self.line[start..].to_string();
        self.cursor = self.bytes.len();
        rest
    }

    /// Scan the next whitespace/comma-delimited raw word, without token rules.
    pub fn next_raw_word(&mut self) -> Option<Token> {
        while is_space(self.current_byte()) || self.current_byte() == b',' {
            self.cursor += 1;
        }
        let c = self.current_byte();
        if c == b'\0' || c == b'#' {
            return None;
        }
        let column = self.cursor + 1;
        let start = self.cursor;
        loop {
            let c = self.current_byte();
            if c == b'\0' || c == b'#' || c == b',' || is_space(c) {
                break;
            }
            self.cursor += 1;
        }
        Some(Token {
            kind: TokenKind::Word(self.line[start..self.cursor].to_string()),
            column,
        })
    }

    fn scan_identifier(&mut self, column: usize) -> Token {
        let start = self.cursor;
        while is_ident_char(self.current_byte()) {
            self.cursor += 1;
        }
        Token {
            kind: TokenKind::Ident(self.line[start..self.cursor].to_string()),
            column,
        }
    }

    fn scan_modifier(&mut self, column: usize) -> Result<Token, ScanError> {
        let start = self.cursor;
        while is_ident_char(self.current_byte()) {
            self.cursor += 1;
        }
        let name = &self.line[start..self.cursor];
        match name {
            "hi" | "lo" | "position" | "offset" => Ok(Token {
                kind: TokenKind::Modifier(name.to_string()),
                column,
            }),
            _ => Err(ScanError::new(
                column,
                format!("Unknown expression modifier: %{name}"),
            )),
        }
    }

    fn scan_number(&mut self, column: usize) -> Result<Token, ScanError> {
        let start = self.cursor;
        loop {
            let c = self.current_byte();
            if !(is_alnum(c) || c == b'_' || c == b'.') {
                break;
            }
            self.cursor += 1;
        }
        let text = &self.line[start..self.cursor];
        let stripped: String = text.chars().filter(|&c| c != '_').collect();

        if let Some(hex) = stripped
            .strip_prefix("0x")
            .or_else(|| stripped.strip_prefix("0X"))
        {
            return match u64::from_str_radix(hex, 16) {
                Ok(value) => Ok(Token {
                    kind: TokenKind::Int(value as i64),
                    column,
                }),
                Err(_) => Err(ScanError::new(column, format!("Invalid hex literal: {text}"))),
            };
        }
        if let Some(bin) = stripped
            .strip_prefix("0b")
            .or_else(|| stripped.strip_prefix("0B"))
        {
            return match u64::from_str_radix(bin, 2) {
                Ok(value) => Ok(Token {
                    kind: TokenKind::Int(value as i64),
                    column,
                }),
                Err(_) => Err(ScanError::new(
                    column,
                    format!("Invalid binary literal: {text}"),
                )),
            };
        }
        if stripped.contains('.') {
            return match stripped.parse::<f64>() {
                Ok(value) => Ok(Token {
                    kind: TokenKind::Float(value),
                    column,
                }),
                Err(_) => Err(ScanError::new(
                    column,
                    format!("Invalid float literal: {text}"),
                )),
            };
        }
        if let Ok(value) = stripped.parse::<i64>() {
            return Ok(Token {
                kind: TokenKind::Int(value),
                column,
            });
        }
        // Decimal literals above i64::MAX wrap like their hex counterparts.
        match stripped.parse::<u64>() {
            Ok(value) => Ok(Token {
                kind: TokenKind::Int(value as i64),
                column,
            }),
            Err(_) => Err(ScanError::new(
                column,
                format!("Invalid numeric literal: {text}"),
            )),
        }
    }

    fn scan_char(&mut self, column: usize) -> Result<Token, ScanError> {
        self.cursor += 1;
        let rest = &self.line[self.cursor..];
        let ch = match rest.chars().next() {
            Some(ch) if ch != '\'' => ch,
            Some(_) => return Err(ScanError::new(column, "Empty character literal")),
            None => return Err(ScanError::new(column, "Unterminated character literal")),
        };
        self.cursor += ch.len_utf8();
        if self.current_byte() != b'\'' {
            return Err(ScanError::new(
                column,
                "Character literal must contain exactly one character",
            ));
        }
        self.cursor += 1;
        Ok(Token {
            kind: TokenKind::Char(ch),
            column,
        })
    }

    fn skip_white(&mut self) {
        while is_space(self.current_byte()) {
            self.cursor += 1;
        }
    }

    fn current_byte(&self) -> u8 {
        self.bytes.get(self.cursor).copied().unwrap_or(b'\0')
    }

    fn peek_byte(&self, offset: usize) -> u8 {
        self.bytes.get(self.cursor + offset).copied().unwrap_or(b'\0')
    }
}

/// Tokenize a full line. `string` and `error` in the leading position
/// capture the remainder of the line as a single `Str` token; `pack` takes
/// its format spec as a raw `Word` token.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ScanError> {
    let mut scanner = Scanner::new(line);
    let mut tokens: Vec<Token> = Vec::new();
    while let Some(token) = scanner.next_token()? {
        let first = tokens.is_empty();
        match &token.kind {
            TokenKind::Ident(name)
                if first
                    && (name.eq_ignore_ascii_case("string")
                        || name.eq_ignore_ascii_case("error")) =>
            {
                let column = token.column + name.len() + 1;
                tokens.push(token);
                let payload = scanner.capture_rest();
                tokens.push(Token {
                    kind: TokenKind::Str(payload),
                    column,
                });
                break;
            }
            TokenKind::Ident(name) if first && name.eq_ignore_ascii_case("pack") => {
                tokens.push(token);
                if let Some(word) = scanner.next_raw_word() {
                    tokens.push(word);
                }
            }
            _ => tokens.push(token),
        }
    }
    Ok(tokens)
}

fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\r'
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_alnum(c: u8) -> bool {
    c.is_ascii_alphanumeric()
}

fn is_ident_char(c: u8) -> bool {
    is_alnum(c) || c == b'_' || c == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize(line)
            .expect("line should tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn label_and_mnemonic_tokens() {
        let tokens = kinds("loop: addi t0, zero, 1");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident("loop".to_string()),
                TokenKind::Colon,
                TokenKind::Ident("addi".to_string()),
                TokenKind::Ident("t0".to_string()),
                TokenKind::Comma,
                TokenKind::Ident("zero".to_string()),
                TokenKind::Comma,
                TokenKind::Int(1),
            ]
        );
    }

    #[test]
    fn numeric_literal_bases() {
        assert_eq!(
            kinds("bytes 10"),
            vec![TokenKind::Ident("bytes".into()), TokenKind::Int(10)]
        );
        assert_eq!(kinds("bytes 0x1F")[1], TokenKind::Int(0x1f));
        assert_eq!(kinds("bytes 0b101")[1], TokenKind::Int(5));
        assert_eq!(kinds("bytes 0xFF_FF")[1], TokenKind::Int(0xffff));
        assert_eq!(kinds("dd 0xffffffffffffffff")[1], TokenKind::Int(-1));
    }

    #[test]
    fn comment_ends_the_line() {
        let tokens = kinds("addi t0 t0 1 # increment");
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn string_keyword_captures_rest_of_line_verbatim() {
        let tokens = kinds("string hello  ##  world");
        assert_eq!(tokens[0], TokenKind::Ident("string".to_string()));
        assert_eq!(tokens[1], TokenKind::Str("hello  ##  world".to_string()));
    }

    #[test]
    fn string_capture_eats_exactly_one_separator() {
        let tokens = kinds("string   hello\\nworld");
        assert_eq!(tokens[1], TokenKind::Str("  hello\\nworld".to_string()));
    }

    #[test]
    fn pack_format_is_a_raw_word() {
        let tokens = kinds("pack <I 0x01020304");
        assert_eq!(tokens[1], TokenKind::Word("<I".to_string()));
        assert_eq!(tokens[2], TokenKind::Int(0x01020304));
    }

    #[test]
    fn character_literal_is_one_scalar() {
        assert_eq!(kinds("bytes 'a'")[1], TokenKind::Char('a'));
        assert!(tokenize("bytes '\\0'").is_err());
        assert!(tokenize("bytes ''").is_err());
        assert!(tokenize("bytes 'ab'").is_err());
    }

    #[test]
    fn modifiers_require_known_names() {
        let tokens = kinds("lui t0 %hi(ADDR)");
        assert_eq!(tokens[2], TokenKind::Modifier("hi".to_string()));
        assert!(tokenize("lui t0 %high(ADDR)").is_err());
    }

    #[test]
    fn modulo_operator_still_scans() {
        let tokens = kinds("X = 7 % 3");
        assert_eq!(tokens[3], TokenKind::Op(Operator::Percent));
    }

    #[test]
    fn shift_operators_are_two_chars() {
        let tokens = kinds("X = 1 << 4 >> 2");
        assert_eq!(tokens[3], TokenKind::Op(Operator::Shl));
        assert_eq!(tokens[5], TokenKind::Op(Operator::Shr));
        assert!(tokenize("X = 1 < 2").is_err());
    }
}
