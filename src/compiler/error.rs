//! # Compiler Error Definitions
//!
//! This module centralizes all error types that can occur while compiling a
//! source file. Every failure is fatal: errors propagate up to the driver,
//! which prints a single diagnostic and exits with a non-zero status.
//!
//! It leverages the `thiserror` crate so each variant carries a clear,
//! descriptive message. Diagnostics produced by the lexer, parser, and type
//! checker always include the source line number recorded by the lexer.

use thiserror::Error;

/// The primary error enumeration for the compiler.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Wrapper for standard I/O errors (e.g., reading the source file or
    /// writing the assembly output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lexical errors: unrecognized characters, unterminated or over-length
    /// literals, unknown escape sequences.
    #[error("lexical error on line {line}: {message}")]
    Lexical { line: usize, message: String },

    /// Syntax errors caught during parsing (expected-token mismatches,
    /// unexpected tokens in expressions, and similar).
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Semantic and type errors: undeclared identifiers, wrong symbol kinds,
    /// incompatible or narrowing conversions.
    #[error("type error on line {line}: {message}")]
    Type { line: usize, message: String },

    /// Semantic error for an identifier used before declaration.
    #[error("undeclared identifier '{name}' on line {line}")]
    UndeclaredIdentifier { name: String, line: usize },

    /// The global and local regions of the symbol table collided.
    #[error("symbol table full")]
    SymbolTableFull,

    /// The scratch register pool is exhausted.
    #[error("no free registers available")]
    OutOfRegisters,

    /// Internal consistency failures (unknown operators in codegen, register
    /// pool misuse, pointer conversions on non-pointer types).
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Constructs a `Lexical` error at the given source line.
    pub fn lexical(line: usize, message: impl Into<String>) -> Self {
        Self::Lexical {
            line,
            message: message.into(),
        }
    }

    /// Constructs a `Syntax` error at the given source line.
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    /// Constructs a `Type` error at the given source line.
    pub fn type_error(line: usize, message: impl Into<String>) -> Self {
        Self::Type {
            line,
            message: message.into(),
        }
    }

    /// Constructs an `UndeclaredIdentifier` error.
    pub fn undeclared(name: impl Into<String>, line: usize) -> Self {
        Self::UndeclaredIdentifier {
            name: name.into(),
            line,
        }
    }

    /// Constructs an `Internal` error for conditions the compiler itself
    /// must never produce from valid state.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
