//! # smallc
//!
//! A single-pass compiler for a small C-like imperative language, emitting
//! x86-64 (NASM syntax) or AArch64 (GNU as syntax) assembly. The crate
//! exposes the full pipeline (lexer, Pratt parser with inline type
//! checking, and a two-backend code generator) plus the [`Compiler`]
//! driver used by the command-line binary.

// --- Core modules ---
/// Abstract Syntax Tree nodes and the primitive type system.
pub mod ast;
/// The target-agnostic generator and the per-target backends.
pub mod codegen;
/// The compiler phases and the main `Compiler` driver.
pub mod compiler;
/// AST dumping for the `-a` / `-A` flags.
pub mod debug;

// --- Public re-exports (the compiler API) ---
pub use codegen::Target;
pub use compiler::Compiler;
pub use compiler::error::CompileError;
pub use debug::DumpMode;

/// Compiles a source string for a target and returns the assembly text.
///
/// This is the in-memory pipeline behind [`Compiler::compile_file`], handy
/// for tests and embedding.
pub fn compile(source: &str, target: Target) -> Result<String, CompileError> {
    Compiler::new(target).compile_source(source)
}
