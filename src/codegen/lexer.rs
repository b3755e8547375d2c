//! Token-level view of member source text.
//!
//! The rewriting passes only need to tell identifiers apart from everything
//! they must leave alone (literals, comments, member accesses), so the lexer
//! is deliberately shallow. Holes of interpolated strings are lexed as code;
//! the surrounding literal text, including the hole braces, stays in string
//! tokens.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),
    #[error("unterminated character literal starting at byte {0}")]
    UnterminatedCharacter(usize),
    #[error("unterminated block comment starting at byte {0}")]
    UnterminatedComment(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    StringLiteral,
    CharLiteral,
    Comment,
    Whitespace,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl Token<'_> {
    /// Tokens that carry no meaning for the rewriter
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }
}

const KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "var",
    "virtual", "void", "volatile", "while", "await", "yield", "dynamic", "nint", "nuint",
];

/// Keywords that name a type and can therefore precede a variable name
pub const TYPE_KEYWORDS: &[&str] = &[
    "bool", "byte", "char", "decimal", "double", "float", "int", "long", "object", "sbyte",
    "short", "string", "uint", "ulong", "ushort", "var", "dynamic", "nint", "nuint",
];

const PUNCTUATORS: &[&str] = &[
    "=>", "==", "!=", "<=", ">=", "&&", "||", "??=", "??", "?.", "::", "->", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=",
];

pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, RewriteError> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
    };
    lexer.code(false)?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token<'a>>,
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte >= 0x80
}

impl<'a> Lexer<'a> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn starts_with(&self, text: &str) -> bool {
        self.source[self.pos..].starts_with(text)
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        if self.pos > start {
            self.tokens.push(Token {
                kind,
                text: &self.source[start..self.pos],
            });
        }
    }

    /// Lex code until the end of input, or, inside an interpolation hole,
    /// until the hole ends. Returns the byte that ended the hole.
    fn code(&mut self, in_hole: bool) -> Result<Option<u8>, RewriteError> {
        let mut depth = 0usize;
        let mut pending_conditionals = 0usize;

        while let Some(byte) = self.peek(0) {
            let start = self.pos;

            if in_hole && depth == 0 {
                match byte {
                    b'}' => return Ok(Some(byte)),
                    b',' => return Ok(Some(byte)),
                    b':' if self.peek(1) != Some(b':') && pending_conditionals == 0 => {
                        return Ok(Some(byte))
                    }
                    _ => {}
                }
            }

            if byte.is_ascii_whitespace() {
                while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
                    self.pos += 1;
                }
                self.push(TokenKind::Whitespace, start);
            } else if self.starts_with("//") {
                while self.peek(0).is_some_and(|b| b != b'\n') {
                    self.pos += 1;
                }
                self.push(TokenKind::Comment, start);
            } else if self.starts_with("/*") {
                match self.source[self.pos + 2..].find("*/") {
                    Some(end) => self.pos += 2 + end + 2,
                    None => return Err(RewriteError::UnterminatedComment(start)),
                }
                self.push(TokenKind::Comment, start);
            } else if self.string_prefix().is_some() {
                self.string()?;
            } else if byte == b'\'' {
                self.character()?;
            } else if byte.is_ascii_digit() {
                self.number();
            } else if is_ident_start(byte) || (byte == b'@' && self.peek(1).is_some_and(is_ident_start)) {
                self.pos += 1;
                while self.peek(0).is_some_and(is_ident_continue) {
                    self.pos += 1;
                }
                let text = &self.source[start..self.pos];
                let kind = if KEYWORDS.contains(&text) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                };
                self.push(kind, start);
            } else {
                let len = PUNCTUATORS
                    .iter()
                    .find(|punct| self.starts_with(punct))
                    .map_or(1, |punct| punct.len());
                match byte {
                    b'{' | b'(' | b'[' => depth += 1,
                    b'}' | b')' | b']' => depth = depth.saturating_sub(1),
                    b'?' if len == 1 => pending_conditionals += 1,
                    b':' if len == 1 => pending_conditionals = pending_conditionals.saturating_sub(1),
                    _ => {}
                }
                self.pos += len;
                self.push(TokenKind::Punct, start);
            }
        }
        Ok(None)
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(byte) = self.peek(0) {
            if is_ident_continue(byte) || (byte == b'.' && self.peek(1).is_some_and(|b| b.is_ascii_digit())) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, start);
    }

    fn character(&mut self) -> Result<(), RewriteError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\n') | None => return Err(RewriteError::UnterminatedCharacter(start)),
                Some(_) => self.pos += 1,
            }
        }
        self.push(TokenKind::CharLiteral, start);
        Ok(())
    }

    /// Length of a string literal prefix at the cursor and its flavour
    fn string_prefix(&self) -> Option<(usize, bool, bool)> {
        // (prefix length including the opening quote, interpolated, verbatim)
        let rest = &self.source[self.pos..];
        if rest.starts_with('"') {
            Some((1, false, false))
        } else if rest.starts_with("$@\"") || rest.starts_with("@$\"") {
            Some((3, true, true))
        } else if rest.starts_with("$\"") {
            Some((2, true, false))
        } else if rest.starts_with("@\"") {
            Some((2, false, true))
        } else {
            None
        }
    }

    fn string(&mut self) -> Result<(), RewriteError> {
        let start = self.pos;
        let Some((prefix, interpolated, verbatim)) = self.string_prefix() else {
            return Ok(());
        };

        if !verbatim && self.source[self.pos + prefix - 1..].starts_with("\"\"\"") {
            return self.raw_string(prefix - 1);
        }

        self.pos += prefix;
        let mut piece = start;
        loop {
            match self.peek(0) {
                None => return Err(RewriteError::UnterminatedString(start)),
                Some(b'\n') if !verbatim => return Err(RewriteError::UnterminatedString(start)),
                Some(b'\\') if !verbatim => self.pos += 2,
                Some(b'"') if verbatim && self.peek(1) == Some(b'"') => self.pos += 2,
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'{') if interpolated && self.peek(1) == Some(b'{') => self.pos += 2,
                Some(b'{') if interpolated => {
                    self.pos += 1;
                    self.push(TokenKind::StringLiteral, piece);
                    piece = self.hole(start)?;
                }
                Some(_) => self.pos += 1,
            }
        }
        self.push(TokenKind::StringLiteral, piece);
        Ok(())
    }

    /// Lex an interpolation hole. Returns where the literal text resumes:
    /// the closing brace, or the start of an alignment or format specifier,
    /// which is kept verbatim up to that brace.
    fn hole(&mut self, string_start: usize) -> Result<usize, RewriteError> {
        let terminator = self.code(true)?;
        let resume = self.pos;
        match terminator {
            Some(b'}') => Ok(resume),
            Some(_) => {
                while let Some(byte) = self.peek(0) {
                    if byte == b'}' {
                        return Ok(resume);
                    }
                    self.pos += 1;
                }
                Err(RewriteError::UnterminatedString(string_start))
            }
            None => Err(RewriteError::UnterminatedString(string_start)),
        }
    }

    /// Raw string literals keep their content untouched, holes included
    fn raw_string(&mut self, dollar_prefix: usize) -> Result<(), RewriteError> {
        let start = self.pos;
        self.pos += dollar_prefix;
        let mut quotes = 0;
        while self.peek(0) == Some(b'"') {
            quotes += 1;
            self.pos += 1;
        }
        let closing = "\"".repeat(quotes);
        match self.source[self.pos..].find(&closing) {
            Some(end) => self.pos += end + quotes,
            None => return Err(RewriteError::UnterminatedString(start)),
        }
        self.push(TokenKind::StringLiteral, start);
        Ok(())
    }
}
