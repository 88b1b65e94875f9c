//! Query tokenizer
//!
//! A forgiving lexer shared by the sanitizer rules, parameter binding and
//! structural validation. It never fails: malformed input is reported
//! through token flags (unterminated literals and comments) and the caller
//! decides what that means.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    /// Keyword or identifier
    Word,
    Number,
    StringLiteral { terminated: bool },
    /// `"quoted identifier"`
    QuotedIdentifier { terminated: bool },
    LineComment,
    BlockComment { terminated: bool },
    /// `@name`
    Parameter,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end]
    }

    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment { .. }
        )
    }

    pub fn is_word(&self, input: &str, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text(input).eq_ignore_ascii_case(word)
    }
}

/// How an opening quote without a matching close is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralMode {
    /// Only closed literals count; a stray quote is punctuation and the rest
    /// of the input is lexed as code.
    ClosedOnly,
    /// An unterminated literal runs to the end of the input.
    ToEndOfInput,
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// End of a quoted run starting at `start` (the opening quote), and whether
/// the closing quote was found. Doubled quotes and backslash escapes stay
/// inside the literal.
fn scan_quoted(bytes: &[u8], start: usize) -> (usize, bool) {
    let quote = bytes[start];
    let mut j = start + 1;
    while j < bytes.len() {
        let b = bytes[j];
        if b == b'\\' {
            j += 2;
            continue;
        }
        if b == quote {
            if j + 1 < bytes.len() && bytes[j + 1] == quote {
                j += 2;
                continue;
            }
            return (j + 1, true);
        }
        j += 1;
    }
    (bytes.len(), false)
}

/// Tokenize a query. Token spans always fall on char boundaries.
pub fn tokenize(input: &str, mode: LiteralMode) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        let kind = if b.is_ascii_whitespace() {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            TokenKind::Whitespace
        } else if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            TokenKind::LineComment
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            match input[i + 2..].find("*/") {
                Some(offset) => {
                    i = i + 2 + offset + 2;
                    TokenKind::BlockComment { terminated: true }
                }
                None => {
                    i = bytes.len();
                    TokenKind::BlockComment { terminated: false }
                }
            }
        } else if b == b'\'' || b == b'"' {
            let (end, terminated) = scan_quoted(bytes, i);
            if !terminated && mode == LiteralMode::ClosedOnly {
                i += 1;
                TokenKind::Punct
            } else {
                i = end;
                if b == b'\'' {
                    TokenKind::StringLiteral { terminated }
                } else {
                    TokenKind::QuotedIdentifier { terminated }
                }
            }
        } else if b == b'@' && bytes.get(i + 1).copied().map_or(false, is_word_start) {
            i += 1;
            while i < bytes.len() && is_word_byte(bytes[i]) {
                i += 1;
            }
            TokenKind::Parameter
        } else if b == b'@' && bytes.get(i + 1) == Some(&b'@') {
            // @@system_variable
            i += 2;
            while i < bytes.len() && is_word_byte(bytes[i]) {
                i += 1;
            }
            TokenKind::Word
        } else if b.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                i += 1;
            }
            TokenKind::Number
        } else if is_word_start(b) {
            while i < bytes.len() && is_word_byte(bytes[i]) {
                i += 1;
            }
            TokenKind::Word
        } else {
            i += 1;
            TokenKind::Punct
        };

        tokens.push(Token {
            kind,
            start,
            end: i,
        });
    }

    tokens
}

/// Copy of `input` with the contents of literals and comments blanked to
/// spaces, so keyword patterns only see code. Byte offsets are preserved.
pub fn mask_literals(input: &str, mode: LiteralMode) -> String {
    let mut masked = input.as_bytes().to_vec();
    for token in tokenize(input, mode) {
        let blank = matches!(
            token.kind,
            TokenKind::StringLiteral { .. }
                | TokenKind::QuotedIdentifier { .. }
                | TokenKind::LineComment
                | TokenKind::BlockComment { .. }
        );
        if blank {
            for byte in &mut masked[token.range()] {
                *byte = b' ';
            }
        }
    }
    // Whole multi-byte chars are replaced, so the result is still UTF-8
    String::from_utf8(masked).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str, mode: LiteralMode) -> Vec<(TokenKind, String)> {
        tokenize(input, mode)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, t.text(input).to_string()))
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = kinds("SELECT n.name FROM nodes n WHERE n.id = @id -- trailing", LiteralMode::ClosedOnly);
        assert_eq!(tokens[0], (TokenKind::Word, "SELECT".to_string()));
        assert!(tokens.contains(&(TokenKind::Parameter, "@id".to_string())));
        assert_eq!(
            tokens.last().unwrap(),
            &(TokenKind::LineComment, "-- trailing".to_string())
        );
    }

    #[test]
    fn test_literals_hide_comment_markers() {
        let tokens = kinds("SELECT 'a -- b', 'it''s', 'x\\'y'", LiteralMode::ClosedOnly);
        let literals: Vec<&String> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::StringLiteral { terminated: true })
            .map(|(_, text)| text)
            .collect();
        assert_eq!(literals, vec!["'a -- b'", "'it''s'", "'x\\'y'"]);
        assert!(!tokens.iter().any(|(k, _)| *k == TokenKind::LineComment));
    }

    #[test]
    fn test_unterminated_literal_modes() {
        let input = "'; DROP TABLE t; --";
        let closed = kinds(input, LiteralMode::ClosedOnly);
        assert_eq!(closed[0], (TokenKind::Punct, "'".to_string()));
        assert_eq!(closed.last().unwrap().0, TokenKind::LineComment);

        let extended = kinds(input, LiteralMode::ToEndOfInput);
        assert_eq!(extended.len(), 1);
        assert_eq!(extended[0].0, TokenKind::StringLiteral { terminated: false });
    }

    #[test]
    fn test_block_comments_and_system_variables() {
        let tokens = kinds("SELECT @@version /* open", LiteralMode::ClosedOnly);
        assert_eq!(tokens[1], (TokenKind::Word, "@@version".to_string()));
        assert_eq!(tokens[2].0, TokenKind::BlockComment { terminated: false });
    }

    #[test]
    fn test_mask_preserves_offsets() {
        let input = "WHERE name = 'drop it' AND ü = 1 /* delete */";
        let masked = mask_literals(input, LiteralMode::ClosedOnly);
        assert_eq!(masked.len(), input.len());
        assert!(!masked.contains("drop"));
        assert!(!masked.contains("delete"));
        assert!(masked.contains("ü"));
    }
}
