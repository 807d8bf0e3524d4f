//! # Code Generation
//!
//! The code generation phase is split in two: a target-agnostic
//! [`Generator`] that walks the AST, and per-target [`Backend`]
//! implementations that own instruction selection, the scratch register
//! pool, and the output buffer. The backend is chosen once at startup from
//! the [`Target`] value.

pub mod aarch64;
pub mod backend;
pub mod generator;
pub mod registers;
pub mod x86_64;

pub use backend::Backend;
pub use generator::Generator;

use aarch64::Aarch64Backend;
use x86_64::X86_64Backend;

/// Code generation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// x86-64, NASM syntax.
    #[default]
    Nasm,
    /// AArch64, GNU as syntax.
    Aarch64,
}

impl Target {
    /// Parses a `--target` argument value.
    pub fn from_name(name: &str) -> Option<Target> {
        match name {
            "nasm" => Some(Target::Nasm),
            "aarch64" => Some(Target::Aarch64),
            _ => None,
        }
    }
}

/// Instantiates the operation table for a target.
pub fn select_backend(target: Target) -> Box<dyn Backend> {
    match target {
        Target::Nasm => Box::new(X86_64Backend::new()),
        Target::Aarch64 => Box::new(Aarch64Backend::new()),
    }
}
