//! # Compiler Driver
//!
//! Aggregates the compiler phases (lexer, parser, symbol table) and defines
//! the [`Compiler`] struct that manages a single compilation: read the
//! source, run the single-pass parse-and-emit pipeline, write the assembly.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod symbols;

pub use parser::parse;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codegen::{Generator, Target, select_backend};
use crate::debug::DumpMode;
use error::CompileError;

/// The compilation driver: target selection, output path, and dump options.
pub struct Compiler {
    /// Code generation target backend.
    pub target: Target,
    /// Where the assembly output is written.
    pub output_path: PathBuf,
    /// When set, each function's AST is dumped to stdout after parsing.
    pub dump_mode: Option<DumpMode>,
}

impl Compiler {
    /// Creates a compiler for the given target with the default output path.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            output_path: PathBuf::from("out.asm"),
            dump_mode: None,
        }
    }

    /// Compiles one source file to the configured output path.
    pub fn compile_file(&self, input: &Path) -> Result<(), CompileError> {
        debug!(input = %input.display(), target = ?self.target, "reading source");
        let source = std::fs::read_to_string(input)?;

        let assembly = self.compile_source(&source)?;

        std::fs::write(&self.output_path, &assembly)?;
        info!(
            output = %self.output_path.display(),
            lines = assembly.lines().count(),
            "assembly written"
        );
        Ok(())
    }

    /// Runs the single-pass pipeline over an in-memory source and returns
    /// the generated assembly.
    pub fn compile_source(&self, source: &str) -> Result<String, CompileError> {
        debug!(target = ?self.target, "compiling");
        let generator = Generator::new(select_backend(self.target));
        parser::parse(source, generator, self.dump_mode)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Target::default())
    }
}
