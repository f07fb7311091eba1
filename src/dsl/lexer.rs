//! Lexer (tokenizer) for the design text.

use crate::error::{IrError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in the design text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Layer, net or instance name, or a keyword
    Identifier,
    /// Integer or floating point number, possibly with an SI suffix
    Number,
    /// Directive keyword (starts with '.')
    Directive,
    OpenParen,
    CloseParen,
    Equals,
    Newline,
    Eof,
}

/// Lexer over a design text buffer.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_blanks_and_comments();

        let line = self.line;
        let column = self.column;
        let make = |kind, text: String| Token {
            kind,
            text,
            line,
            column,
        };

        let ch = match self.chars.peek().copied() {
            Some(ch) => ch,
            None => return Ok(make(TokenKind::Eof, String::new())),
        };

        let token = match ch {
            '\n' => {
                self.advance();
                make(TokenKind::Newline, "\n".to_string())
            }
            '(' => {
                self.advance();
                make(TokenKind::OpenParen, "(".to_string())
            }
            ')' => {
                self.advance();
                make(TokenKind::CloseParen, ")".to_string())
            }
            '=' => {
                self.advance();
                make(TokenKind::Equals, "=".to_string())
            }
            '.' => {
                self.advance();
                let name = self.read_identifier();
                if name.is_empty() {
                    return Err(IrError::lexer(line, column, "expected directive name after '.'"));
                }
                make(TokenKind::Directive, format!(".{}", name))
            }
            '-' | '+' | '0'..='9' => make(TokenKind::Number, self.read_number()),
            _ if ch.is_alphabetic() || ch == '_' => {
                make(TokenKind::Identifier, self.read_identifier())
            }
            _ => {
                return Err(IrError::lexer(
                    line,
                    column,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };

        Ok(token)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_blanks_and_comments(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            match ch {
                ' ' | '\t' | '\r' | ',' => {
                    self.advance();
                }
                '#' | ';' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    // Hierarchical instance names carry '/', '.', and bus brackets.
    fn read_identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            let allowed = ch.is_alphanumeric()
                || ch == '_'
                || (!text.is_empty() && matches!(ch, '/' | '.' | '[' | ']' | '$'));
            if !allowed {
                break;
            }
            text.push(ch);
            self.advance();
        }
        text
    }

    fn read_number(&mut self) -> String {
        let mut text = String::new();

        if let Some(&sign) = self.chars.peek() {
            if sign == '-' || sign == '+' {
                text.push(sign);
                self.advance();
            }
        }

        self.read_digits(&mut text);

        if self.chars.peek() == Some(&'.') {
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }

        if let Some(&e) = self.chars.peek() {
            if e == 'e' || e == 'E' {
                text.push(e);
                self.advance();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '-' || sign == '+' {
                        text.push(sign);
                        self.advance();
                    }
                }
                self.read_digits(&mut text);
            }
        }

        if let Some(&suffix) = self.chars.peek() {
            if is_suffix(suffix) {
                text.push(suffix);
                self.advance();
            }
        }

        text
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(&ch) = self.chars.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            text.push(ch);
            self.advance();
        }
    }
}

fn is_suffix(ch: char) -> bool {
    matches!(ch, 'f' | 'p' | 'n' | 'u' | 'µ' | 'm' | 'k' | 'K' | 'M' | 'G')
}

/// Parse a number string with an optional SI suffix.
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let last = text.chars().last()?;
    let multiplier = match last {
        'f' => 1e-15,
        'p' => 1e-12,
        'n' => 1e-9,
        'u' | 'µ' => 1e-6,
        'm' => 1e-3,
        'k' | 'K' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        _ => return text.parse::<f64>().ok(),
    };
    text[..text.len() - last.len_utf8()]
        .parse::<f64>()
        .ok()
        .map(|v| v * multiplier)
}

/// Parse a coordinate; coordinates are plain integers in database units.
pub fn parse_coord(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            let kind = tok.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn test_parse_value_suffixes() {
        assert_relative_eq!(parse_value("10m").unwrap(), 0.01);
        assert_relative_eq!(parse_value("250u").unwrap(), 250e-6);
        assert_relative_eq!(parse_value("1.2").unwrap(), 1.2);
        assert_relative_eq!(parse_value("3e-3").unwrap(), 3e-3);
        assert!(parse_value("abc").is_none());
        assert!(parse_value("").is_none());
    }

    #[test]
    fn test_parse_coord_rejects_fractions() {
        assert_eq!(parse_coord("-1400"), Some(-1400));
        assert_eq!(parse_coord("1.5"), None);
    }

    #[test]
    fn test_lexer_wire_line() {
        assert_eq!(
            kinds(".wire VDD M1 0 0 1000 100\n"),
            vec![
                TokenKind::Directive,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_params_and_boxes() {
        let input = ".via VDD M1 M2 cut(0 0 10 10) rows=2 # trailing comment";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Directive,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::OpenParen,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::CloseParen,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lexer_hierarchical_name() {
        let mut lexer = Lexer::new("core/alu.u1[3]");
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Identifier);
        assert_eq!(tok.text, "core/alu.u1[3]");
    }

    #[test]
    fn test_lexer_rejects_stray_character() {
        let mut lexer = Lexer::new("@");
        assert!(matches!(
            lexer.next_token(),
            Err(IrError::LexerError { line: 1, column: 1, .. })
        ));
    }
}
