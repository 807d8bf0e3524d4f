//! # Abstract Syntax Tree
//!
//! Node structures, operator tags, and the primitive type system shared by
//! the parser and the code generator.

pub mod nodes;
pub mod types;

pub use nodes::{AstNode, NodeValue, Op};
pub use types::{Coercion, PrimType, coerce_for_op};
