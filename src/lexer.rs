//! Hand-rolled lexer covering the literal/operator surface of spec.md §6.
//!
//! This is the concrete, minimal stand-in for the "external collaborator"
//! spec.md names as out of scope beyond the AST it produces (see
//! `SPEC_FULL.md` §2) — it is not intended to be a gold-plated grammar.
//!
//! The one genuinely tricky bit is `/`: it opens a regex literal in a
//! "prefix" lexical position and means division in an "infix" position
//! (spec.md §9). This is resolved exactly as the teacher's `Parser`
//! resolves its own token-precedence ambiguities: by tracking whether the
//! previous significant token could end an expression.

use std::sync::Arc;

use crate::error::{GqlError, Result};
use crate::error::SourcePos;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Char(char),
    Regex(Arc<str>),
    /// `$name` sugar for `_.name` (field access on the implicit row
    /// variable), used pervasively in per-row operator arguments.
    Field(Arc<str>),
    /// Nanoseconds.
    Duration(i64),
    /// Nanoseconds since the Unix epoch, UTC.
    DateTime(i64),
    Ident(Arc<str>),
    True,
    False,
    Na,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    Dot,
    Comma,
    Colon,
    Semicolon,
    Bang,
    Question,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    ColonEq,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    EqEqQ,
    QEqEq,
    QEqEqQ,
    AndAnd,
    OrOr,

    Eof,
}

impl Token {
    /// Can a token of this kind end a complete expression? Used to decide
    /// whether a following `/` starts a regex literal or means division.
    fn can_end_expr(&self) -> bool {
        matches!(
            self,
            Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Char(_)
                | Token::Regex(_)
                | Token::Field(_)
                | Token::Duration(_)
                | Token::DateTime(_)
                | Token::Ident(_)
                | Token::True
                | Token::False
                | Token::Na
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
        )
    }
}

#[derive(Clone)]
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    last_significant: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            last_significant: None,
        }
    }

    fn here(&self) -> SourcePos {
        SourcePos { line: self.line, column: self.column }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    /// Next token, with the span it started at.
    pub fn next_token(&mut self) -> Result<(Token, SourcePos)> {
        self.skip_trivia();
        let pos = self.here();
        let tok = self.lex_one(pos)?;
        self.last_significant = Some(tok.clone());
        Ok((tok, pos))
    }

    fn lex_one(&mut self, pos: SourcePos) -> Result<Token> {
        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };
        match c {
            b'0'..=b'9' => self.lex_number(pos),
            b'"' | b'`' => self.lex_string(pos),
            b'\'' => self.lex_char(pos),
            b'/' => {
                let infix = self
                    .last_significant
                    .as_ref()
                    .is_some_and(Token::can_end_expr);
                if infix {
                    self.bump();
                    Ok(Token::Slash)
                } else {
                    self.lex_regex(pos)
                }
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Ok(self.lex_ident_or_keyword()),
            b'+' => {
                self.bump();
                Ok(Token::Plus)
            }
            b'-' => {
                self.bump();
                Ok(Token::Minus)
            }
            b'*' => {
                self.bump();
                Ok(Token::Star)
            }
            b'%' => {
                self.bump();
                Ok(Token::Percent)
            }
            b'.' => {
                self.bump();
                Ok(Token::Dot)
            }
            b',' => {
                self.bump();
                Ok(Token::Comma)
            }
            b';' => {
                self.bump();
                Ok(Token::Semicolon)
            }
            b'(' => {
                self.bump();
                Ok(Token::LParen)
            }
            b')' => {
                self.bump();
                Ok(Token::RParen)
            }
            b'{' => {
                self.bump();
                Ok(Token::LBrace)
            }
            b'}' => {
                self.bump();
                Ok(Token::RBrace)
            }
            b'[' => {
                self.bump();
                Ok(Token::LBracket)
            }
            b']' => {
                self.bump();
                Ok(Token::RBracket)
            }
            b'|' => {
                self.bump();
                Ok(Token::Pipe)
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::Ne)
                } else {
                    Ok(Token::Bang)
                }
            }
            b':' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::ColonEq)
                } else {
                    Ok(Token::Colon)
                }
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            b'&' => {
                self.bump();
                if self.peek() == Some(b'&') {
                    self.bump();
                    Ok(Token::AndAnd)
                } else {
                    Err(GqlError::Parse { pos, msg: "expected `&&`".into() })
                }
            }
            b'$' => {
                self.bump();
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
                if name.is_empty() {
                    return Err(GqlError::Parse { pos, msg: "expected identifier after `$`".into() });
                }
                Ok(Token::Field(Arc::from(name.as_str())))
            }
            b'?' => self.lex_question(pos),
            b'=' => self.lex_equals(pos),
            other => Err(GqlError::Parse {
                pos,
                msg: format!("unexpected character `{}`", other as char),
            }),
        }
    }

    fn lex_question(&mut self, pos: SourcePos) -> Result<Token> {
        self.bump();
        if self.peek() == Some(b'=') && self.peek2() == Some(b'=') {
            self.bump();
            self.bump();
            if self.peek() == Some(b'?') {
                self.bump();
                Ok(Token::QEqEqQ)
            } else {
                Ok(Token::QEqEq)
            }
        } else {
            let _ = pos;
            Ok(Token::Question)
        }
    }

    fn lex_equals(&mut self, pos: SourcePos) -> Result<Token> {
        self.bump();
        if self.peek() == Some(b'=') {
            self.bump();
            if self.peek() == Some(b'?') {
                self.bump();
                Ok(Token::EqEqQ)
            } else {
                Ok(Token::EqEq)
            }
        } else {
            Err(GqlError::Parse { pos, msg: "expected `==`".into() })
        }
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let s = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        match s.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "NA" => Token::Na,
            _ => Token::Ident(Arc::from(s.as_str())),
        }
    }

    fn lex_string(&mut self, pos: SourcePos) -> Result<Token> {
        let quote = self.bump().unwrap();
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(GqlError::Parse { pos, msg: "unterminated string literal".into() }),
                Some(c) if c == quote => break,
                Some(b'\\') if quote == b'"' => {
                    let esc = self.bump().ok_or(GqlError::Parse { pos, msg: "unterminated escape".into() })?;
                    s.push(match esc {
                        b'n' => '\n',
                        b't' => '\t',
                        b'\\' => '\\',
                        b'"' => '"',
                        other => other as char,
                    });
                }
                Some(c) => s.push(c as char),
            }
        }
        Ok(Token::Str(Arc::from(s.as_str())))
    }

    fn lex_char(&mut self, pos: SourcePos) -> Result<Token> {
        self.bump();
        let c = self.bump().ok_or(GqlError::Parse { pos, msg: "unterminated char literal".into() })?;
        let c = if c == b'\\' {
            match self.bump() {
                Some(b'n') => '\n',
                Some(b't') => '\t',
                Some(other) => other as char,
                None => return Err(GqlError::Parse { pos, msg: "unterminated char escape".into() }),
            }
        } else {
            c as char
        };
        if self.peek() != Some(b'\'') {
            return Err(GqlError::Parse { pos, msg: "expected closing `'`".into() });
        }
        self.bump();
        Ok(Token::Char(c))
    }

    fn lex_regex(&mut self, pos: SourcePos) -> Result<Token> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(GqlError::Parse { pos, msg: "unterminated regex literal".into() }),
                Some(b'/') => break,
                Some(b'\\') => {
                    s.push('\\');
                    if let Some(c) = self.bump() {
                        s.push(c as char);
                    }
                }
                Some(c) => s.push(c as char),
            }
        }
        Ok(Token::Regex(Arc::from(s.as_str())))
    }

    /// Numbers: ints (`0x`-prefixed allowed), floats, and durations (a
    /// digit sequence immediately followed by a duration unit with no
    /// separating whitespace — `5h30m`, `100ms`, `2us`, `1ns`). ISO
    /// date/times are disambiguated by a following `-`/`T` pattern that
    /// cannot be part of a numeric literal (`2024-01-02T03:04:05Z`).
    fn lex_number(&mut self, pos: SourcePos) -> Result<Token> {
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            let v = i64::from_str_radix(&digits, 16)
                .map_err(|_| GqlError::Parse { pos, msg: "invalid hex literal".into() })?;
            return Ok(Token::Int(v));
        }

        let int_part = self.take_while(|c| c.is_ascii_digit());

        // ISO date: digit run of length 4 followed by `-`.
        if int_part.len() == 4 && self.peek() == Some(b'-') {
            return self.lex_datetime(pos, int_part);
        }

        let mut s = int_part.clone();
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            s.push('.');
            self.bump();
            s.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            s.push(self.bump().unwrap() as char);
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                s.push(self.bump().unwrap() as char);
            }
            s.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }

        if is_float {
            let v: f64 = s.parse().map_err(|_| GqlError::Parse { pos, msg: "invalid float literal".into() })?;
            return Ok(Token::Float(v));
        }

        // Duration: a unit letter immediately follows with no whitespace.
        if matches!(self.peek(), Some(b'h') | Some(b'm') | Some(b's') | Some(b'u') | Some(b'n')) {
            if let Some(nanos) = self.try_lex_duration_units(&int_part)? {
                return Ok(Token::Duration(nanos));
            }
        }

        let v: i64 = s.parse().map_err(|_| GqlError::Parse { pos, msg: "invalid integer literal".into() })?;
        Ok(Token::Int(v))
    }

    fn try_lex_duration_units(&mut self, first_digits: &str) -> Result<Option<i64>> {
        let checkpoint = (self.pos, self.line, self.column);
        let mut total: i64 = 0;
        let mut digits = first_digits.to_string();
        loop {
            let unit = self.take_while(|c| c.is_ascii_alphabetic());
            let mult: i64 = match unit.as_str() {
                "ns" => 1,
                "us" => 1_000,
                "ms" => 1_000_000,
                "s" => 1_000_000_000,
                "m" => 60 * 1_000_000_000,
                "h" => 3_600 * 1_000_000_000,
                _ => {
                    (self.pos, self.line, self.column) = checkpoint;
                    return Ok(None);
                }
            };
            let n: i64 = digits.parse().unwrap_or(0);
            total += n * mult;
            digits = self.take_while(|c| c.is_ascii_digit());
            if digits.is_empty() {
                break;
            }
        }
        Ok(Some(total))
    }

    fn lex_datetime(&mut self, pos: SourcePos, year_digits: String) -> Result<Token> {
        let rest_start = self.pos;
        let _ = self.take_while(|c| c.is_ascii_digit() || matches!(c, b'-' | b':' | b'T' | b'Z' | b'.' | b'+'));
        let rest = String::from_utf8_lossy(&self.src[rest_start..self.pos]).into_owned();
        let full = format!("{year_digits}{rest}");
        let parsed = chrono::DateTime::parse_from_rfc3339(&full)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .or_else(|_| {
                chrono::NaiveDate::parse_from_str(&full, "%Y-%m-%d")
                    .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
            })
            .map_err(|e| GqlError::Parse { pos, msg: format!("invalid date/time literal: {e}") })?;
        Ok(Token::DateTime(parsed.timestamp_nanos_opt().unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lx = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let (t, _) = lx.next_token().unwrap();
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn slash_after_value_is_division_before_value_is_regex() {
        assert_eq!(tokens("4/2"), vec![Token::Int(4), Token::Slash, Token::Int(2)]);
        assert_eq!(tokens("/abc/"), vec![Token::Regex(Arc::from("abc"))]);
    }

    #[test]
    fn durations_parse_to_nanoseconds() {
        assert_eq!(tokens("100ms"), vec![Token::Duration(100_000_000)]);
        assert_eq!(tokens("5h30m"), vec![Token::Duration(5 * 3_600_000_000_000 + 30 * 60_000_000_000)]);
        assert_eq!(tokens("1ns"), vec![Token::Duration(1)]);
    }

    #[test]
    fn hex_int_literal() {
        assert_eq!(tokens("0x1F"), vec![Token::Int(31)]);
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(tokens("true false NA x"), vec![Token::True, Token::False, Token::Na, Token::Ident(Arc::from("x"))]);
    }

    #[test]
    fn field_shorthand_lexes_as_field_token() {
        assert_eq!(tokens("$k"), vec![Token::Field(Arc::from("k"))]);
    }

    #[test]
    fn null_tolerant_equality_operators() {
        assert_eq!(tokens("==? ?== ?==?"), vec![Token::EqEqQ, Token::QEqEq, Token::QEqEqQ]);
    }
}
