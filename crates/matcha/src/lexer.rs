//! Tokenizer for the surface syntax.
//!
//! The token set is tiny: two keywords, identifiers, integer literals, and
//! seven pieces of punctuation. One quirk is load-bearing: `+` is a valid
//! identifier head, which is how the built-in addition parses as an ordinary
//! call `(+ 1 2)`. Constructor and variable names are lexically identical;
//! the parser tells them apart by position alone.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Type,
    Fun,
    Ident(String),
    Int(i64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Pipe,
    Dot,
    Arrow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Tokenize a whole source text.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '+'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Lexer {
    fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
                continue;
            }

            let (line, column) = (self.line, self.column);
            let kind = if is_ident_start(c) {
                self.ident()
            } else if c.is_ascii_digit() {
                self.integer(line, column)?
            } else {
                self.punctuation(line, column)?
            };
            tokens.push(Token { kind, line, column });
        }
        Ok(tokens)
    }

    fn ident(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            let keep = if name.is_empty() {
                is_ident_start(c)
            } else {
                is_ident_continue(c)
            };
            if !keep {
                break;
            }
            name.push(c);
            self.advance();
        }
        match name.as_str() {
            "type" => TokenKind::Type,
            "fun" => TokenKind::Fun,
            _ => TokenKind::Ident(name),
        }
    }

    /// Leading zeros are accepted, matching the original lexer.
    fn integer(&mut self, line: usize, column: usize) -> Result<TokenKind> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.advance();
        }
        let value = digits.parse::<i64>().map_err(|_| {
            Error::Parse(format!(
                "integer literal '{digits}' out of range at line {line}, column {column}"
            ))
        })?;
        Ok(TokenKind::Int(value))
    }

    fn punctuation(&mut self, line: usize, column: usize) -> Result<TokenKind> {
        let c = self.advance().ok_or_else(|| {
            Error::Parse(format!("unexpected end of input at line {line}, column {column}"))
        })?;
        Ok(match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ':' => TokenKind::Colon,
            '|' => TokenKind::Pipe,
            '.' => TokenKind::Dot,
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    return Err(Error::Parse(format!(
                        "expected '->' at line {line}, column {column}"
                    )));
                }
            }
            other => {
                return Err(Error::Parse(format!(
                    "unexpected character '{other}' at line {line}, column {column}"
                )));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_punctuation_and_keywords() {
        assert_eq!(
            kinds("type [List x]: Nil ."),
            vec![
                TokenKind::Type,
                TokenKind::LBracket,
                TokenKind::Ident("List".to_string()),
                TokenKind::Ident("x".to_string()),
                TokenKind::RBracket,
                TokenKind::Colon,
                TokenKind::Ident("Nil".to_string()),
                TokenKind::Dot,
            ]
        );
    }

    #[test]
    fn plus_is_an_identifier() {
        assert_eq!(
            kinds("(+ 1 2)"),
            vec![
                TokenKind::LParen,
                TokenKind::Ident("+".to_string()),
                TokenKind::Int(1),
                TokenKind::Int(2),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn arrow_requires_the_full_token() {
        assert_eq!(kinds("-> ->"), vec![TokenKind::Arrow, TokenKind::Arrow]);
        assert!(tokenize("- ").is_err());
    }

    #[test]
    fn leading_zeros_are_accepted() {
        assert_eq!(kinds("007"), vec![TokenKind::Int(7)]);
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(tokenize("(f ?)").is_err());
    }

    #[test]
    fn reports_positions() {
        let tokens = tokenize("fun\n  (f)").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 4));
    }
}
