//! # Parser Module
//!
//! Recursive-descent parsing with Pratt expression parsing, organized as
//! sub-parsers over a shared [`Parser`] context. The compiler is
//! single-pass: the top-level loop emits each declaration as soon as it
//! finishes parsing, so this module's entry point drives the code generator
//! and returns the finished assembly text.

pub mod common;
pub mod declaration_parser;
pub mod expression_parser;
pub mod statement_parser;

pub use common::Parser;

use crate::codegen::Generator;
use crate::compiler::error::CompileError;
use crate::debug::DumpMode;
use declaration_parser::DeclarationParser;

/// Parses and emits a whole program, returning the generated assembly.
pub fn parse(
    source: &str,
    generator: Generator,
    dump_mode: Option<DumpMode>,
) -> Result<String, CompileError> {
    let mut parser = Parser::new(source, generator, dump_mode);

    parser.prime()?;
    parser.generator.preamble();
    DeclarationParser::global_declarations(&mut parser)?;
    parser.generator.postamble();

    Ok(parser.generator.take_output())
}
