//! State machine behind [`super::exports`].
//!
//! The lexer walks the source once. Outside of export statements it only looks
//! for the `export` keyword (skipping comments and string literals). Inside an
//! export statement it tokenizes just enough to tell names apart from
//! keywords, bodies, initializers, and opaque spans.

use std::collections::VecDeque;
use thiserror::Error;

/// Words inside an export clause that are never export names.
const KEYWORDS: &[&str] = &[
    "as", "async", "class", "const", "default", "from", "function", "let", "var",
];

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Source text outside any export statement.
    Text,
    /// The `export` keyword.
    Export,
    /// A keyword inside an export clause.
    Keyword,
    /// A candidate export name.
    Identifier,
    /// A quoted string inside an export clause.
    String,
    /// A numeric literal inside an export clause.
    Number,
}

/// A token borrowed from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of `text` in the source.
    pub offset: usize,
}

/// Lexing failure. Offsets point at the opening delimiter or the bad literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected end of quoted string starting at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("unexpected end of parenthesized span starting at byte {offset}")]
    UnterminatedParen { offset: usize },

    #[error("unexpected end of braced block starting at byte {offset}")]
    UnterminatedBrace { offset: usize },

    #[error("bad number syntax: {text:?} at byte {offset}")]
    BadNumber { text: String, offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Plain text between export statements.
    Text,
    /// Positioned on an `export` keyword.
    Export,
    /// Inside an export statement, outside braces.
    Clause,
    /// Inside an `export { ... }` list.
    Braces,
    /// Skipping the initializer of a `let`/`const`/`var` declarator.
    Initializer,
    Done,
}

/// Facts gathered about the current export statement.
#[derive(Debug, Default, Clone, Copy)]
struct Clause {
    /// `function` or `class` seen: the next `{` opens a body.
    body_follows: bool,
    /// `let`, `const`, or `var` seen: `=` starts an initializer.
    declaration: bool,
    /// The function or class name has been recorded.
    named: bool,
}

/// Pull-based lexer over JavaScript source.
pub struct Lexer<'a> {
    input: &'a str,
    start: usize,
    pos: usize,
    state: State,
    clause: Clause,
    found_colon: bool,
    brace_start: usize,
    queue: VecDeque<Token<'a>>,
    error: Option<LexError>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            start: 0,
            pos: 0,
            state: State::Text,
            clause: Clause::default(),
            found_colon: false,
            brace_start: 0,
            queue: VecDeque::new(),
            error: None,
        }
    }

    fn step(&mut self) -> Result<(), LexError> {
        match self.state {
            State::Text => {
                self.lex_text();
                Ok(())
            }
            State::Export => {
                self.lex_export();
                Ok(())
            }
            State::Clause => self.lex_clause(),
            State::Braces => self.lex_braces(),
            State::Initializer => self.lex_initializer(),
            State::Done => Ok(()),
        }
    }

    fn lex_text(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '/' if self.at_comment() => self.skip_comment(),
                '"' | '\'' | '`' => {
                    self.skip_text_string();
                }
                'e' if self.at_export_keyword() => {
                    self.emit(TokenKind::Text);
                    self.state = State::Export;
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
        self.emit(TokenKind::Text);
        self.state = State::Done;
    }

    fn lex_export(&mut self) {
        self.pos += "export".len();
        self.emit(TokenKind::Export);
        self.clause = Clause::default();
        self.state = State::Clause;
    }

    fn lex_clause(&mut self) -> Result<(), LexError> {
        loop {
            let Some(c) = self.peek() else {
                // A clause running into end of input is still a complete statement
                self.state = State::Done;
                return Ok(());
            };
            match c {
                ';' | '\n' => {
                    self.state = State::Text;
                    return Ok(());
                }
                '=' => {
                    self.bump();
                    self.ignore();
                    self.state = if self.clause.declaration {
                        State::Initializer
                    } else {
                        State::Text
                    };
                    return Ok(());
                }
                '{' if self.clause.body_follows => {
                    self.state = State::Text;
                    return Ok(());
                }
                '{' => {
                    self.brace_start = self.pos;
                    self.bump();
                    self.ignore();
                    self.found_colon = false;
                    self.state = State::Braces;
                    return Ok(());
                }
                '(' => self.skip_parens()?,
                '"' | '\'' | '`' => self.lex_string()?,
                '/' if self.at_comment() => {
                    self.skip_comment();
                    self.ignore();
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                c if is_ident_char(c) => self.lex_identifier(),
                _ => {
                    self.bump();
                    self.ignore();
                }
            }
        }
    }

    fn lex_braces(&mut self) -> Result<(), LexError> {
        loop {
            let Some(c) = self.peek() else {
                return Err(LexError::UnterminatedBrace {
                    offset: self.brace_start,
                });
            };
            match c {
                '}' => {
                    self.bump();
                    self.ignore();
                    self.state = State::Text;
                    return Ok(());
                }
                ':' => {
                    self.bump();
                    self.ignore();
                    self.found_colon = true;
                }
                '"' | '\'' | '`' => {
                    self.lex_string()?;
                    self.found_colon = false;
                }
                '/' if self.at_comment() => {
                    self.skip_comment();
                    self.ignore();
                }
                c if is_ident_char(c) && self.found_colon => {
                    // Only the first run after a colon is skipped
                    self.found_colon = false;
                    self.accept_run(is_ident_char);
                    self.ignore();
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                c if is_ident_char(c) => self.lex_identifier(),
                _ => {
                    self.bump();
                    self.ignore();
                }
            }
        }
    }

    fn lex_initializer(&mut self) -> Result<(), LexError> {
        let mut open: Vec<(char, usize)> = Vec::new();
        // Last significant character, to tell a regex literal from division
        let mut prev = '=';
        loop {
            let Some(c) = self.peek() else {
                return match open.last() {
                    Some(&('(', offset)) => Err(LexError::UnterminatedParen { offset }),
                    Some(&(_, offset)) => Err(LexError::UnterminatedBrace { offset }),
                    None => {
                        self.ignore();
                        self.state = State::Done;
                        Ok(())
                    }
                };
            };
            match c {
                '"' | '\'' | '`' => {
                    if !self.skip_text_string() {
                        self.abandon_initializer();
                        return Ok(());
                    }
                }
                '/' if self.at_comment() => {
                    self.skip_comment();
                    continue;
                }
                '/' if starts_operand(prev) => {
                    if !self.skip_regex() {
                        self.abandon_initializer();
                        return Ok(());
                    }
                    prev = 'a';
                    continue;
                }
                '(' | '[' | '{' => {
                    open.push((c, self.pos));
                    self.bump();
                }
                ')' | ']' | '}' => {
                    open.pop();
                    self.bump();
                }
                ',' if open.is_empty() => {
                    self.bump();
                    self.accept_run(char::is_whitespace);
                    self.ignore();
                    self.state = State::Clause;
                    return Ok(());
                }
                ';' | '\n' if open.is_empty() => {
                    self.ignore();
                    self.state = State::Text;
                    return Ok(());
                }
                _ => {
                    self.bump();
                }
            }
            if !c.is_whitespace() {
                prev = c;
            }
        }
    }

    /// Give up on an initializer that cannot be skipped and rescan from the
    /// end of the line as plain text.
    fn abandon_initializer(&mut self) {
        self.ignore();
        self.state = State::Text;
    }

    /// Skip a regex literal and its flags. Returns false if the line ends first.
    fn skip_regex(&mut self) -> bool {
        self.bump();
        let mut in_class = false;
        while let Some(c) = self.peek() {
            if c == '\n' {
                return false;
            }
            self.bump();
            match c {
                '\\' => {
                    if self.peek() == Some('\n') {
                        return false;
                    }
                    self.bump();
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => {
                    self.accept_run(is_ident_char);
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    fn lex_identifier(&mut self) {
        self.ignore();
        self.accept_run(is_ident_char);
        let word = &self.input[self.start..self.pos];

        if KEYWORDS.contains(&word) {
            match word {
                "function" | "class" => self.clause.body_follows = true,
                "let" | "const" | "var" => self.clause.declaration = true,
                _ => {}
            }
            self.emit(TokenKind::Keyword);
            return;
        }

        // `name as alias` exports the alias; `class A extends B` exports only A
        if self.next_word() == "as" || (self.clause.body_follows && self.clause.named) {
            self.ignore();
            return;
        }
        if self.clause.body_follows {
            self.clause.named = true;
        }
        self.emit(TokenKind::Identifier);
    }

    fn lex_string(&mut self) -> Result<(), LexError> {
        self.ignore();
        self.skip_quoted()?;
        self.emit(TokenKind::String);
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        self.ignore();
        self.accept_run(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.accept_run(|c| c.is_ascii_digit());
        }
        if self.peek().is_some_and(is_ident_char) {
            self.accept_run(is_ident_char);
            return Err(LexError::BadNumber {
                text: self.input[self.start..self.pos].to_string(),
                offset: self.start,
            });
        }
        self.emit(TokenKind::Number);
        Ok(())
    }

    /// Skip a balanced parenthesized span, including nested quotes.
    fn skip_parens(&mut self) -> Result<(), LexError> {
        let offset = self.pos;
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek() else {
                return Err(LexError::UnterminatedParen { offset });
            };
            match c {
                '(' => {
                    depth += 1;
                    self.bump();
                }
                ')' => {
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                '"' | '\'' | '`' => self.skip_quoted()?,
                '/' if self.at_comment() => self.skip_comment(),
                _ => {
                    self.bump();
                }
            }
        }
        self.ignore();
        Ok(())
    }

    /// Skip a string literal starting at the current quote character.
    fn skip_quoted(&mut self) -> Result<(), LexError> {
        let offset = self.pos;
        let Some(quote) = self.bump() else {
            return Ok(());
        };
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedString { offset }),
                Some('\n') if quote != '`' => {
                    return Err(LexError::UnterminatedString { offset });
                }
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    /// Skip a string in plain text. Never fails: a stray quote ends at the line.
    ///
    /// Returns whether the closing quote was found.
    fn skip_text_string(&mut self) -> bool {
        let Some(quote) = self.bump() else {
            return false;
        };
        while let Some(c) = self.peek() {
            if c == '\n' && quote != '`' {
                return false;
            }
            self.bump();
            if c == '\\' {
                self.bump();
            } else if c == quote {
                return true;
            }
        }
        false
    }

    fn skip_comment(&mut self) {
        if self.rest().starts_with("//") {
            match self.rest().find('\n') {
                Some(idx) => self.pos += idx,
                None => self.pos = self.input.len(),
            }
        } else {
            match self.rest()[2..].find("*/") {
                Some(idx) => self.pos += idx + 4,
                None => self.pos = self.input.len(),
            }
        }
    }

    fn at_comment(&self) -> bool {
        let rest = self.rest();
        rest.starts_with("//") || rest.starts_with("/*")
    }

    /// `export` standing alone as a word, not part of `exports` or `x.export`.
    fn at_export_keyword(&self) -> bool {
        if !self.rest().starts_with("export") {
            return false;
        }
        let before = self.input[..self.pos].chars().next_back();
        if before.is_some_and(|c| is_ident_char(c) || c == '.') {
            return false;
        }
        let after = self.input[self.pos + "export".len()..].chars().next();
        !after.is_some_and(is_ident_char)
    }

    /// The identifier after the current position, skipping spaces and tabs.
    fn next_word(&self) -> &'a str {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start_matches([' ', '\t']);
        let end = trimmed
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn accept_run(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn ignore(&mut self) {
        self.start = self.pos;
    }

    fn emit(&mut self, kind: TokenKind) {
        if self.pos > self.start {
            self.queue.push_back(Token {
                kind,
                text: &self.input[self.start..self.pos],
                offset: self.start,
            });
        }
        self.start = self.pos;
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.queue.pop_front() {
                return Some(Ok(token));
            }
            if let Some(err) = self.error.take() {
                return Some(Err(err));
            }
            if self.state == State::Done {
                return None;
            }
            if let Err(err) = self.step() {
                self.error = Some(err);
                self.state = State::Done;
            }
        }
    }
}

/// Whether a `/` after `prev` begins a regex literal rather than a division.
fn starts_operand(prev: char) -> bool {
    matches!(
        prev,
        '=' | '(' | ',' | ':' | '[' | '!' | '&' | '|' | '?' | '{' | ';' | '+' | '-' | '*' | '%'
            | '<' | '>' | '~' | '^'
    )
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).map(|t| t.unwrap().kind).collect()
    }

    #[test]
    fn test_token_stream() {
        assert_eq!(
            kinds("let x; export const a = \"s\";"),
            vec![
                TokenKind::Text,
                TokenKind::Export,
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Text,
            ]
        );
    }

    #[test]
    fn test_token_offsets() {
        let src = "  export { alpha }";
        let tokens: Vec<_> = Lexer::new(src).map(Result::unwrap).collect();
        let alpha = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Identifier)
            .unwrap();
        assert_eq!(alpha.text, "alpha");
        assert_eq!(&src[alpha.offset..alpha.offset + 5], "alpha");
    }

    #[test]
    fn test_strings_and_numbers_in_clause() {
        let tokens: Vec<_> = Lexer::new("export { 'a', 42 }")
            .map(Result::unwrap)
            .collect();
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::String && t.text == "'a'"));
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Number && t.text == "42"));
    }

    #[test]
    fn test_error_ends_iteration() {
        let mut lexer = Lexer::new("export { a, b");
        let mut saw_error = false;
        for item in lexer.by_ref() {
            if item.is_err() {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(lexer.next().is_none());
    }

    #[test]
    fn test_tokens_before_error_are_delivered() {
        let items: Vec<_> = Lexer::new("export { a, b").collect();
        assert!(matches!(
            items.last(),
            Some(Err(LexError::UnterminatedBrace { offset: 7 }))
        ));
        assert!(items
            .iter()
            .any(|t| matches!(t, Ok(Token { kind: TokenKind::Identifier, text: "b", .. }))));
    }
}
