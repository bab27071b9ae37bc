//! Export name scanner.
//!
//! Extracts top-level export names from JavaScript source without a parser.
//! The scan is heuristic: it understands declarations, export lists, and
//! aliasing well enough to build a module proxy, and degrades to best-effort
//! on syntax it does not model.

mod lexer;

pub use lexer::{LexError, Lexer, Token, TokenKind};

use std::collections::HashSet;

/// Punctuation stripped from both ends of a recorded name.
const NOISE: &[char] = &['{', '}', '(', ')', '-', ';', ',', '.', '!'];

/// Scan source for exported names.
///
/// Returns names in first-appearance order, deduplicated.
///
/// # Errors
/// Returns a [`LexError`] for an unterminated string, parenthesized span, or
/// brace list, or a malformed numeric literal inside an export statement.
pub fn exports(source: &[u8]) -> Result<Vec<String>, LexError> {
    let text = String::from_utf8_lossy(source);
    let mut names = Vec::new();
    let mut seen = HashSet::new();

    for token in Lexer::new(&text) {
        let token = token?;
        if token.kind != TokenKind::Identifier {
            continue;
        }
        let name = token.text.trim_matches(NOISE);
        if !name.is_empty() && seen.insert(name) {
            names.push(name.to_string());
        }
    }

    Ok(names)
}
