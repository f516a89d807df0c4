//! SQL statement lexer.
//!
//! Only as much of SQL's lexical structure as the directive classifier needs
//! is recognized: words, quoted identifiers, string literals, numbers and
//! punctuation. Whitespace and comments are skipped. Each token keeps the
//! exact source slice it was lexed from, so token spans map straight back
//! onto the original statement text.

use std::fmt;

use serde::Serialize;

use crate::error::FrontendError;

/// Words treated as keywords. Must stay sorted for the binary search.
const KEYWORDS: &[&str] = &[
    "ALL",
    "ALLOW_OVERWRITE",
    "ALTER",
    "AND",
    "AS",
    "ASC",
    "BATCH_SIZE",
    "BETWEEN",
    "BY",
    "CASE",
    "CREATE",
    "DELETE",
    "DESC",
    "DISTINCT",
    "DROP",
    "ELSE",
    "END",
    "EXISTS",
    "FALSE",
    "FLUSH_FREQUENCY",
    "FROM",
    "GROUP",
    "HAVING",
    "IN",
    "INDEX",
    "INSERT",
    "INTO",
    "IS",
    "JOIN",
    "LIKE",
    "LIMIT",
    "MERGE",
    "NOT",
    "NULL",
    "OFF",
    "ON",
    "OR",
    "ORDER",
    "ORDERED",
    "PER_NODE_BUFFER_SIZE",
    "PER_NODE_PARALLEL_OPERATIONS",
    "SELECT",
    "SET",
    "STREAMING",
    "TABLE",
    "THEN",
    "TRUE",
    "UNION",
    "UPDATE",
    "VALUES",
    "WHEN",
    "WHERE",
    "WITH",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS
        .binary_search(&word.to_ascii_uppercase().as_str())
        .is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Keyword,
    Identifier,
    QuotedIdentifier,
    StringLiteral,
    Number,
    Punctuation,
    End,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Identifier => "identifier",
            TokenKind::QuotedIdentifier => "quoted identifier",
            TokenKind::StringLiteral => "string literal",
            TokenKind::Number => "number",
            TokenKind::Punctuation => "punctuation",
            TokenKind::End => "end of statement",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    lexeme: String,
    kind: TokenKind,
    position: usize,
}

impl Token {
    pub fn new(lexeme: impl Into<String>, kind: TokenKind, position: usize) -> Self {
        Self {
            lexeme: lexeme.into(),
            kind,
            position,
        }
    }

    fn end(position: usize) -> Self {
        Self::new(String::new(), TokenKind::End, position)
    }

    /// Source text of the token with its original casing and quoting.
    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Byte offset of the lexeme in the statement text.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_end(&self) -> bool {
        self.kind == TokenKind::End
    }

    /// Bare words, keyword or not. Quoted identifiers are not words.
    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Identifier)
    }

    pub fn is_punctuation(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.lexeme == symbol
    }

    /// Case-insensitive comparison of a bare word against `word`.
    pub fn matches_word(&self, word: &str) -> bool {
        self.is_word() && self.lexeme.eq_ignore_ascii_case(word)
    }

    /// Content of a string literal or quoted identifier with the surrounding
    /// quotes removed and doubled quotes collapsed.
    pub fn unquoted(&self) -> Option<String> {
        let quote = match self.kind {
            TokenKind::StringLiteral => '\'',
            TokenKind::QuotedIdentifier => '"',
            _ => return None,
        };
        let inner = self
            .lexeme
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))?;
        let doubled: String = [quote, quote].iter().collect();
        Some(inner.replace(&doubled, &quote.to_string()))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end() {
            f.write_str(self.kind.name())
        } else {
            f.write_str(&self.lexeme)
        }
    }
}

/// A tokenized statement. The token list always ends with one `End` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    raw_text: String,
    tokens: Vec<Token>,
}

impl Statement {
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.len() == 1
    }
}

/// Lexes `sql` into a [`Statement`].
///
/// Returns an error for unterminated literals, quoted identifiers or block
/// comments (positioned at the opening delimiter) and for characters that
/// cannot start any token.
pub fn tokenize(sql: &str) -> Result<Statement, FrontendError> {
    let mut buf = LexBuf::new(sql);
    let mut tokens: Vec<Token> = Vec::new();

    while let Some(ch) = buf.peek() {
        let start = buf.pos();
        let kind = match ch {
            _ if ch.is_whitespace() => {
                buf.bump();
                continue;
            }
            '-' if buf.peek_nth(1) == Some('-') => {
                buf.take_while(|c| c != '\n');
                continue;
            }
            '/' if buf.peek_nth(1) == Some('*') => {
                lex_block_comment(&mut buf)?;
                continue;
            }
            '\'' => {
                lex_quoted(&mut buf, '\'', "string literal")?;
                TokenKind::StringLiteral
            }
            '"' => {
                lex_quoted(&mut buf, '"', "quoted identifier")?;
                TokenKind::QuotedIdentifier
            }
            'A'..='Z' | 'a'..='z' | '_' | '\u{80}'..=char::MAX => {
                let word = buf.take_while(is_word_char);
                if is_keyword(word) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                }
            }
            '0'..='9' => {
                lex_number(&mut buf);
                TokenKind::Number
            }
            '.' if starts_number(buf.peek_nth(1), buf.peek_nth(2)) => {
                lex_number(&mut buf);
                TokenKind::Number
            }
            '+' | '-'
                if sign_allowed(tokens.last())
                    && starts_number(buf.peek_nth(1), buf.peek_nth(2)) =>
            {
                buf.bump();
                lex_number(&mut buf);
                TokenKind::Number
            }
            _ if is_punctuation(ch) => {
                lex_punctuation(&mut buf);
                TokenKind::Punctuation
            }
            _ => {
                return Err(FrontendError::UnknownToken {
                    lexeme: ch.to_string(),
                    position: start,
                })
            }
        };
        tokens.push(Token::new(&sql[start..buf.pos()], kind, start));
    }

    tokens.push(Token::end(sql.len()));

    Ok(Statement {
        raw_text: sql.to_string(),
        tokens,
    })
}

struct LexBuf<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> LexBuf<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn consume(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while<F>(&mut self, mut predicate: F) -> &'a str
    where
        F: FnMut(char) -> bool,
    {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        &self.src[start..self.pos]
    }
}

fn is_word_char(ch: char) -> bool {
    matches!(ch, 'A'..='Z' | 'a'..='z' | '0'..='9' | '$' | '_' | '\u{80}'..=char::MAX)
        && !ch.is_whitespace()
}

fn is_punctuation(ch: char) -> bool {
    matches!(
        ch,
        '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';' | '.' | ':' | '*' | '=' | '<' | '>'
            | '!' | '+' | '-' | '/' | '%' | '|' | '&' | '^' | '~' | '@' | '#' | '?'
    )
}

fn starts_number(first: Option<char>, second: Option<char>) -> bool {
    match first {
        Some('0'..='9') => true,
        Some('.') => matches!(second, Some('0'..='9')),
        _ => false,
    }
}

/// Keywords that end an operand, so a following sign is an operator.
const OPERAND_KEYWORDS: &[&str] = &["END", "FALSE", "NULL", "TRUE"];

/// A sign belongs to a number only where it cannot be a binary operator, i.e.
/// when the previous token does not end an operand.
fn sign_allowed(previous: Option<&Token>) -> bool {
    match previous {
        None => true,
        Some(token) => match token.kind() {
            TokenKind::Keyword => !OPERAND_KEYWORDS
                .iter()
                .any(|keyword| token.lexeme().eq_ignore_ascii_case(keyword)),
            TokenKind::Punctuation => !matches!(token.lexeme(), ")" | "]" | "}"),
            _ => false,
        },
    }
}

fn lex_block_comment(buf: &mut LexBuf) -> Result<(), FrontendError> {
    let start = buf.pos();
    buf.bump();
    buf.bump();
    let mut nesting = 0usize;
    while let Some(ch) = buf.bump() {
        match ch {
            '*' if buf.consume('/') => {
                if nesting == 0 {
                    return Ok(());
                }
                nesting -= 1;
            }
            '/' if buf.consume('*') => nesting += 1,
            _ => (),
        }
    }
    Err(FrontendError::Lexical {
        message: "Unterminated block comment".to_string(),
        position: start,
    })
}

/// Consumes a quoted token. A doubled quote inside the token is an escaped
/// quote, not the end of the token.
fn lex_quoted(buf: &mut LexBuf, quote: char, what: &str) -> Result<(), FrontendError> {
    let start = buf.pos();
    buf.bump();
    loop {
        match buf.bump() {
            Some(ch) if ch == quote => {
                if !buf.consume(quote) {
                    return Ok(());
                }
            }
            Some(_) => (),
            None => {
                return Err(FrontendError::Lexical {
                    message: format!("Unterminated {what}"),
                    position: start,
                })
            }
        }
    }
}

fn lex_number(buf: &mut LexBuf) {
    buf.take_while(|ch| ch.is_ascii_digit());

    if buf.consume('.') {
        buf.take_while(|ch| ch.is_ascii_digit());
    }

    // Exponent only when digits follow, so `1e` stays a number and a word.
    if matches!(buf.peek(), Some('e' | 'E')) {
        let signed = matches!(buf.peek_nth(1), Some('+' | '-'));
        let digit_at = if signed { 2 } else { 1 };
        if matches!(buf.peek_nth(digit_at), Some('0'..='9')) {
            buf.bump();
            if signed {
                buf.bump();
            }
            buf.take_while(|ch| ch.is_ascii_digit());
        }
    }
}

fn lex_punctuation(buf: &mut LexBuf) {
    let Some(first) = buf.bump() else {
        return;
    };
    match (first, buf.peek()) {
        ('<', Some('=' | '>')) | ('>', Some('=')) | ('!', Some('=')) | ('|', Some('|'))
        | (':', Some(':')) => {
            buf.bump();
        }
        _ => (),
    }
}
