//! # Type System
//!
//! This module defines the primitive types of the language and the single
//! place where expression types are ever adjusted: [`coerce_for_op`].
//!
//! Widening and pointer scaling are always materialised as `WidenType` /
//! `ScaleType` AST wrappers here, never improvised inside the code
//! generator.

use crate::ast::nodes::{AstNode, NodeValue, Op};
use crate::compiler::error::CompileError;

/// The primitive types of the language.
///
/// Both targets are LP64, so sizes are a property of the type itself:
/// `Char` is 1 byte, `Int` 4, `Long` 8, and every pointer 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    /// No type: statement nodes only, never an expression.
    None,
    Void,
    Char,
    Int,
    Long,
    VoidPtr,
    CharPtr,
    IntPtr,
    LongPtr,
}

impl PrimType {
    /// Returns true for the scalar integer types.
    pub fn is_integer(self) -> bool {
        matches!(self, PrimType::Char | PrimType::Int | PrimType::Long)
    }

    /// Returns true for the pointer types.
    pub fn is_pointer(self) -> bool {
        matches!(
            self,
            PrimType::VoidPtr | PrimType::CharPtr | PrimType::IntPtr | PrimType::LongPtr
        )
    }

    /// Size of a value of this type in bytes.
    pub fn size(self) -> usize {
        match self {
            PrimType::None | PrimType::Void => 0,
            PrimType::Char => 1,
            PrimType::Int => 4,
            PrimType::Long => 8,
            PrimType::VoidPtr | PrimType::CharPtr | PrimType::IntPtr | PrimType::LongPtr => 8,
        }
    }

    /// Converts a non-pointer primitive to its pointer type.
    pub fn to_pointer(self) -> Result<PrimType, CompileError> {
        match self {
            PrimType::Void => Ok(PrimType::VoidPtr),
            PrimType::Char => Ok(PrimType::CharPtr),
            PrimType::Int => Ok(PrimType::IntPtr),
            PrimType::Long => Ok(PrimType::LongPtr),
            other => Err(CompileError::internal(format!(
                "no pointer type for {other:?}"
            ))),
        }
    }

    /// Converts a pointer type to the type it points at.
    pub fn pointee(self) -> Result<PrimType, CompileError> {
        match self {
            PrimType::VoidPtr => Ok(PrimType::Void),
            PrimType::CharPtr => Ok(PrimType::Char),
            PrimType::IntPtr => Ok(PrimType::Int),
            PrimType::LongPtr => Ok(PrimType::Long),
            other => Err(CompileError::internal(format!(
                "{other:?} is not a pointer type"
            ))),
        }
    }
}

/// Outcome of [`coerce_for_op`]: the tree always comes back, either adjusted
/// for the context or untouched when the types cannot be reconciled.
#[derive(Debug)]
pub enum Coercion {
    Compatible(Box<AstNode>),
    Incompatible(Box<AstNode>),
}

impl Coercion {
    /// Unwraps the compatible tree, or `None` on incompatibility.
    pub fn compatible(self) -> Option<Box<AstNode>> {
        match self {
            Coercion::Compatible(tree) => Some(tree),
            Coercion::Incompatible(_) => None,
        }
    }
}

/// Reconciles an expression tree with the type its context expects.
///
/// Given a tree and the peer/expected type for operator `op`, returns a
/// possibly-wrapped tree whose type is compatible with `context`, or the
/// untouched tree marked incompatible when the types cannot be reconciled:
///
/// 1. Two integer types: equal passes through; a smaller tree is wrapped in
///    `WidenType`; a larger tree (narrowing) is rejected.
/// 2. A pointer tree passes through unchanged when the context is the same
///    pointer type and the operator is the `Nothing` sentinel.
/// 3. Under `Add`/`Subtract`, an integer tree against a pointer context is
///    scaled by the pointee size: wrapped in `ScaleType` when the size
///    exceeds one, passed through unchanged for one-byte pointees.
/// 4. Everything else is incompatible.
pub fn coerce_for_op(
    tree: Box<AstNode>,
    context: PrimType,
    op: Op,
) -> Result<Coercion, CompileError> {
    let left = tree.prim;

    if left.is_integer() && context.is_integer() {
        if left == context {
            return Ok(Coercion::Compatible(tree));
        }

        let left_size = left.size();
        let context_size = context.size();

        // Narrowing is never implicit
        if left_size > context_size {
            return Ok(Coercion::Incompatible(tree));
        }

        if context_size > left_size {
            return Ok(Coercion::Compatible(AstNode::unary(
                Op::WidenType,
                context,
                tree,
                NodeValue::None,
            )));
        }
    }

    if left.is_pointer() && op == Op::Nothing && left == context {
        return Ok(Coercion::Compatible(tree));
    }

    // Pointer arithmetic: scale the integer operand by the pointee size
    if (op == Op::Add || op == Op::Subtract) && left.is_integer() && context.is_pointer() {
        let pointee_size = context.pointee()?.size();
        if pointee_size > 1 {
            return Ok(Coercion::Compatible(AstNode::unary(
                Op::ScaleType,
                context,
                tree,
                NodeValue::Size(pointee_size),
            )));
        }
        // One-byte pointees need no scaling
        return Ok(Coercion::Compatible(tree));
    }

    Ok(Coercion::Incompatible(tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_conversion_round_trips() {
        for t in [PrimType::Void, PrimType::Char, PrimType::Int, PrimType::Long] {
            assert_eq!(t.to_pointer().unwrap().pointee().unwrap(), t);
        }
    }

    #[test]
    fn pointer_conversion_rejects_unknown_domains() {
        assert!(PrimType::IntPtr.to_pointer().is_err());
        assert!(PrimType::Int.pointee().is_err());
        assert!(PrimType::None.to_pointer().is_err());
    }

    #[test]
    fn sizes_match_the_lp64_layout() {
        assert_eq!(PrimType::Char.size(), 1);
        assert_eq!(PrimType::Int.size(), 4);
        assert_eq!(PrimType::Long.size(), 8);
        assert_eq!(PrimType::CharPtr.size(), 8);
        assert_eq!(PrimType::VoidPtr.size(), 8);
    }

    fn int_leaf(prim: PrimType) -> Box<AstNode> {
        AstNode::leaf(Op::IntLiteral, prim, NodeValue::Int(1))
    }

    #[test]
    fn equal_integer_types_pass_through() {
        let t = coerce_for_op(int_leaf(PrimType::Int), PrimType::Int, Op::Add)
            .unwrap()
            .compatible()
            .unwrap();
        assert_eq!(t.op, Op::IntLiteral);
    }

    #[test]
    fn smaller_integer_is_widened() {
        let t = coerce_for_op(int_leaf(PrimType::Char), PrimType::Int, Op::Nothing)
            .unwrap()
            .compatible()
            .unwrap();
        assert_eq!(t.op, Op::WidenType);
        assert_eq!(t.prim, PrimType::Int);
        assert_eq!(t.left.as_ref().unwrap().prim, PrimType::Char);
    }

    #[test]
    fn narrowing_is_rejected_and_the_tree_survives() {
        let outcome =
            coerce_for_op(int_leaf(PrimType::Long), PrimType::Char, Op::Nothing).unwrap();
        match outcome {
            Coercion::Incompatible(tree) => assert_eq!(tree.prim, PrimType::Long),
            Coercion::Compatible(_) => panic!("narrowing must be rejected"),
        }
    }

    #[test]
    fn matching_pointers_pass_under_nothing() {
        let p = AstNode::leaf(Op::Identifier, PrimType::IntPtr, NodeValue::SymbolId(0));
        let t = coerce_for_op(p, PrimType::IntPtr, Op::Nothing)
            .unwrap()
            .compatible()
            .unwrap();
        assert_eq!(t.prim, PrimType::IntPtr);

        let p = AstNode::leaf(Op::Identifier, PrimType::IntPtr, NodeValue::SymbolId(0));
        assert!(
            coerce_for_op(p, PrimType::CharPtr, Op::Nothing)
                .unwrap()
                .compatible()
                .is_none()
        );
    }

    #[test]
    fn integer_scales_against_pointer_context() {
        let t = coerce_for_op(int_leaf(PrimType::Int), PrimType::IntPtr, Op::Add)
            .unwrap()
            .compatible()
            .unwrap();
        assert_eq!(t.op, Op::ScaleType);
        assert_eq!(t.prim, PrimType::IntPtr);
        assert_eq!(t.value, NodeValue::Size(4));
    }

    #[test]
    fn one_byte_pointee_needs_no_scale() {
        let t = coerce_for_op(int_leaf(PrimType::Int), PrimType::CharPtr, Op::Add)
            .unwrap()
            .compatible()
            .unwrap();
        assert_eq!(t.op, Op::IntLiteral);
    }

    #[test]
    fn scaling_is_limited_to_additive_operators() {
        let outcome =
            coerce_for_op(int_leaf(PrimType::Int), PrimType::IntPtr, Op::Multiply).unwrap();
        assert!(outcome.compatible().is_none());
    }
}
