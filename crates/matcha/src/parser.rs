//! Recursive-descent parser producing the abstract program tree.
//!
//! The grammar is bracket-driven and needs a single token of lookahead:
//! `(` opens a call or a rule pattern, `[` opens a constructor (in types,
//! patterns, and expressions alike), and a bare identifier is a variable or
//! type variable depending on position. Nothing here is type-aware; the
//! annotations on `fun` and `type` headers are parsed and carried through
//! untouched.

use crate::ast::{
    Alternative, Definition, Expr, FunDef, Pattern, Program, Rule, TypeDef, TypeRef,
};
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind, tokenize};

/// Parse a whole source text into a [`Program`].
pub fn parse(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Program> {
        let mut definitions = Vec::new();
        while let Some(token) = self.peek() {
            let definition = match token.kind {
                TokenKind::Type => Definition::Type(self.type_def()?),
                TokenKind::Fun => Definition::Fun(self.fun_def()?),
                TokenKind::LParen | TokenKind::LBracket => Definition::Expr(self.expr()?),
                _ => {
                    return Err(self.unexpected(token, "a definition or expression"));
                }
            };
            definitions.push(definition);
        }
        Ok(Program { definitions })
    }

    // ---------------------------------------------------------------------
    // Definitions
    // ---------------------------------------------------------------------

    /// `type "[" Name param* "]" ":" alternative ("|" alternative)* "."`
    fn type_def(&mut self) -> Result<TypeDef> {
        self.expect(&TokenKind::Type)?;
        self.expect(&TokenKind::LBracket)?;
        let name = self.ident()?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            params.push(self.ident()?);
        }
        self.expect(&TokenKind::RBracket)?;
        self.expect(&TokenKind::Colon)?;

        let mut alternatives = vec![self.alternative()?];
        while self.eat(&TokenKind::Pipe) {
            alternatives.push(self.alternative()?);
        }
        self.expect(&TokenKind::Dot)?;

        Ok(TypeDef {
            name,
            params,
            alternatives,
        })
    }

    /// One constructor alternative: a name followed by its parameter types.
    fn alternative(&mut self) -> Result<Alternative> {
        let name = self.ident()?;
        let mut params = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::LBracket) | Some(TokenKind::Ident(_)) => {
                    params.push(self.type_ref()?);
                }
                _ => break,
            }
        }
        Ok(Alternative { name, params })
    }

    /// `fun "(" name param-type* ")" "->" return-type ":" rule ("|" rule)* "."`
    fn fun_def(&mut self) -> Result<FunDef> {
        self.expect(&TokenKind::Fun)?;
        self.expect(&TokenKind::LParen)?;
        let name = self.ident()?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.type_ref()?);
        }
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Arrow)?;
        let return_type = self.type_ref()?;
        self.expect(&TokenKind::Colon)?;

        let mut rules = vec![self.rule(&name, params.len())?];
        while self.eat(&TokenKind::Pipe) {
            rules.push(self.rule(&name, params.len())?);
        }
        self.expect(&TokenKind::Dot)?;

        Ok(FunDef {
            name,
            params,
            return_type,
            rules,
        })
    }

    /// `"(" head pattern* ")" "->" expression`
    ///
    /// The head must repeat the function name, and the pattern count must
    /// match the signature.
    fn rule(&mut self, fun_name: &str, arity: usize) -> Result<Rule> {
        let open = self.expect(&TokenKind::LParen)?;
        let head = self.ident()?;
        if head != fun_name {
            return Err(Error::Parse(format!(
                "rule head '{head}' does not match function '{fun_name}' at line {}, column {}",
                open.line, open.column
            )));
        }
        let mut patterns = Vec::new();
        while !self.check(&TokenKind::RParen) {
            patterns.push(self.pattern()?);
        }
        self.expect(&TokenKind::RParen)?;
        if patterns.len() != arity {
            return Err(Error::Parse(format!(
                "rule for '{fun_name}' has {} patterns but the signature declares {arity} at line {}, column {}",
                patterns.len(),
                open.line,
                open.column
            )));
        }
        self.expect(&TokenKind::Arrow)?;
        let body = self.expr()?;
        Ok(Rule { patterns, body })
    }

    // ---------------------------------------------------------------------
    // Patterns, expressions, types
    // ---------------------------------------------------------------------

    fn pattern(&mut self) -> Result<Pattern> {
        let Some(token) = self.peek() else {
            return Err(Error::Parse("unexpected end of input in pattern".to_string()));
        };
        match &token.kind {
            TokenKind::LBracket => {
                self.advance();
                let name = self.ident()?;
                let mut args = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    args.push(self.pattern()?);
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Pattern::Constructor { name, args })
            }
            TokenKind::Int(value) => {
                let value = *value;
                self.advance();
                Ok(Pattern::Literal(value))
            }
            TokenKind::Ident(_) => Ok(Pattern::Variable(self.ident()?)),
            _ => Err(self.unexpected(token, "a pattern")),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let Some(token) = self.peek() else {
            return Err(Error::Parse(
                "unexpected end of input in expression".to_string(),
            ));
        };
        match &token.kind {
            TokenKind::LParen => {
                let (line, column) = (token.line, token.column);
                self.advance();
                let name = self.ident()?;
                let mut args = Vec::new();
                while !self.check(&TokenKind::RParen) {
                    args.push(self.expr()?);
                }
                self.expect(&TokenKind::RParen)?;
                // The built-in print renders a single value per call.
                if name == "print" && args.len() != 1 {
                    return Err(Error::Parse(format!(
                        "print takes exactly one argument, got {} at line {line}, column {column}",
                        args.len()
                    )));
                }
                Ok(Expr::Call { name, args })
            }
            TokenKind::LBracket => {
                self.advance();
                let name = self.ident()?;
                let mut args = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    args.push(self.expr()?);
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::Construct { name, args })
            }
            TokenKind::Int(value) => {
                let value = *value;
                self.advance();
                Ok(Expr::Literal(value))
            }
            TokenKind::Ident(_) => Ok(Expr::Variable(self.ident()?)),
            _ => Err(self.unexpected(token, "an expression")),
        }
    }

    fn type_ref(&mut self) -> Result<TypeRef> {
        let Some(token) = self.peek() else {
            return Err(Error::Parse("unexpected end of input in type".to_string()));
        };
        match &token.kind {
            TokenKind::LBracket => {
                self.advance();
                let name = self.ident()?;
                let mut args = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    args.push(self.type_ref()?);
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(TypeRef::Apply { name, args })
            }
            TokenKind::Ident(name) if name == "Int" => {
                self.advance();
                Ok(TypeRef::Int)
            }
            TokenKind::Ident(_) => Ok(TypeRef::Var(self.ident()?)),
            _ => Err(self.unexpected(token, "a type")),
        }
    }

    // ---------------------------------------------------------------------
    // Token plumbing
    // ---------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|t| &t.kind == kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        match self.peek() {
            Some(token) if &token.kind == kind => {
                let token = token.clone();
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(self.unexpected(token, &format!("{kind:?}"))),
            None => Err(Error::Parse(format!(
                "unexpected end of input, expected {kind:?}"
            ))),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(token) => Err(self.unexpected(token, "an identifier")),
            None => Err(Error::Parse(
                "unexpected end of input, expected an identifier".to_string(),
            )),
        }
    }

    fn unexpected(&self, token: &Token, expected: &str) -> Error {
        Error::Parse(format!(
            "unexpected {:?} at line {}, column {}, expected {expected}",
            token.kind, token.line, token.column
        ))
    }
}
