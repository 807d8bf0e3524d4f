//! # Parser Context
//!
//! The [`Parser`] struct threads every piece of state the recursive-descent
//! parser needs: the lexer with its one-token window, the symbol table, the
//! code generator (the parser drives emission as each top-level declaration
//! completes), and the id of the function currently being parsed.
//!
//! Token-match helpers mirror the shape of the language: expected-token
//! mismatches are fatal syntax errors carrying the current line.

use crate::ast::types::PrimType;
use crate::compiler::error::CompileError;
use crate::compiler::lexer::{Lexer, Token};
use crate::compiler::symbols::{StructuralKind, SymbolTable};
use crate::codegen::Generator;
use crate::debug::DumpMode;

/// The parsing context shared by all sub-parsers.
pub struct Parser {
    pub lexer: Lexer,
    /// The current (most recently scanned) token.
    pub token: Token,
    pub symbols: SymbolTable,
    pub generator: Generator,
    /// Symbol id of the function being parsed, for `return` checking.
    pub current_function: Option<usize>,
    /// When set, each parsed function's AST is dumped to stdout.
    pub dump_mode: Option<DumpMode>,
}

impl Parser {
    /// Creates a parser over `source`. The first token is not yet scanned;
    /// [`prime`](Self::prime) fetches it.
    pub fn new(source: &str, generator: Generator, dump_mode: Option<DumpMode>) -> Self {
        Self {
            lexer: Lexer::new(source),
            token: Token::Eof,
            symbols: SymbolTable::new(),
            generator,
            current_function: None,
            dump_mode,
        }
    }

    /// Scans the first token and pre-registers the runtime print helpers so
    /// calls to them resolve like ordinary functions.
    pub fn prime(&mut self) -> Result<(), CompileError> {
        for name in ["printint", "printchar", "printstring"] {
            self.symbols
                .add_global(name, PrimType::Void, StructuralKind::Function, 0, 1)?;
        }
        self.advance()
    }

    /// Current source line, for diagnostics.
    pub fn line(&self) -> usize {
        self.lexer.line()
    }

    /// Replaces the current token with the next one from the lexer.
    pub fn advance(&mut self) -> Result<(), CompileError> {
        self.token = self.lexer.scan()?;
        Ok(())
    }

    /// Consumes the expected token or fails with a syntax error naming it.
    pub fn match_token(&mut self, expected: Token, what: &str) -> Result<(), CompileError> {
        if self.token == expected {
            self.advance()
        } else {
            Err(CompileError::syntax(
                self.line(),
                format!("expected {what}, found {:?}", self.token),
            ))
        }
    }

    pub fn semicolon(&mut self) -> Result<(), CompileError> {
        self.match_token(Token::Semicolon, "';'")
    }

    pub fn left_paren(&mut self) -> Result<(), CompileError> {
        self.match_token(Token::LeftParen, "'('")
    }

    pub fn right_paren(&mut self) -> Result<(), CompileError> {
        self.match_token(Token::RightParen, "')'")
    }

    pub fn left_brace(&mut self) -> Result<(), CompileError> {
        self.match_token(Token::LeftBrace, "'{'")
    }

    pub fn right_brace(&mut self) -> Result<(), CompileError> {
        self.match_token(Token::RightBrace, "'}'")
    }

    /// Consumes and returns an identifier token's spelling.
    pub fn expect_identifier(&mut self) -> Result<String, CompileError> {
        match &self.token {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            other => Err(CompileError::syntax(
                self.line(),
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    /// Looks up `name`, locals before globals, or fails with an undeclared
    /// identifier diagnostic.
    pub fn find_symbol(&self, name: &str) -> Result<usize, CompileError> {
        self.symbols
            .find(name)
            .ok_or_else(|| CompileError::undeclared(name, self.line()))
    }
}
