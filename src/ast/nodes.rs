//! # AST Nodes
//!
//! This module defines the data structures that make up the Abstract Syntax
//! Tree (AST). Every node carries an operator tag, a primitive type, an
//! r-value flag, up to three owned children, and an operator-dependent value.
//!
//! Trees are strictly tree-shaped: each node has exactly one owner, and a
//! tree is dropped as a whole once the code generator has consumed it.

use crate::ast::types::PrimType;

/// Operator tag of an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Sentinel operator: "no arithmetic context". Used by assignment and
    /// return when checking type compatibility, never stored in a tree.
    Nothing,

    // Binary arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Comparisons
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // Bitwise, shift, and logical binaries
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
    LogicalAnd,
    LogicalOr,

    // Leaves
    IntLiteral,
    StringLiteral,
    Identifier,

    // Unary prefixes
    Negate,
    Invert,
    LogicalNot,
    AddressOf,
    Dereference,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,

    // Type adjustments inserted by the type system
    WidenType,
    ScaleType,
    ToBoolean,

    // Statements
    Assign,
    Glue,
    If,
    While,
    Function,
    Return,
    FunctionCall,
}

impl Op {
    /// Returns true for the six comparison operators.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Op::Equal
                | Op::NotEqual
                | Op::LessThan
                | Op::GreaterThan
                | Op::LessEqual
                | Op::GreaterEqual
        )
    }
}

/// Operator-dependent payload of an AST node.
///
/// Replaces the C-style value union: integer literals carry their value,
/// identifier-like nodes carry a symbol table index, string literals carry
/// their rodata label, and scale nodes carry the pointee size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeValue {
    None,
    /// Literal value for `IntLiteral`.
    Int(i64),
    /// Symbol table index for `Identifier`, `Function`, `FunctionCall`,
    /// `AddressOf`, and post-increment/decrement leaves.
    SymbolId(usize),
    /// Label id for `StringLiteral`.
    Label(usize),
    /// Pointee size in bytes for `ScaleType`.
    Size(usize),
}

/// A single node of the Abstract Syntax Tree.
#[derive(Debug)]
pub struct AstNode {
    /// Operation represented by this node.
    pub op: Op,
    /// Primitive type of the expression; `PrimType::None` for statements.
    pub prim: PrimType,
    /// True when this node is used for its value rather than its address.
    pub rvalue: bool,
    pub left: Option<Box<AstNode>>,
    pub middle: Option<Box<AstNode>>,
    pub right: Option<Box<AstNode>>,
    pub value: NodeValue,
}

impl AstNode {
    /// Builds a node with up to three children.
    pub fn new(
        op: Op,
        prim: PrimType,
        left: Option<Box<AstNode>>,
        middle: Option<Box<AstNode>>,
        right: Option<Box<AstNode>>,
        value: NodeValue,
    ) -> Box<AstNode> {
        Box::new(AstNode {
            op,
            prim,
            rvalue: false,
            left,
            middle,
            right,
            value,
        })
    }

    /// Builds a childless leaf node.
    pub fn leaf(op: Op, prim: PrimType, value: NodeValue) -> Box<AstNode> {
        AstNode::new(op, prim, None, None, None, value)
    }

    /// Builds a node with a single (left) child.
    pub fn unary(op: Op, prim: PrimType, left: Box<AstNode>, value: NodeValue) -> Box<AstNode> {
        AstNode::new(op, prim, Some(left), None, None, value)
    }

    /// Returns the symbol table index carried by this node.
    ///
    /// Calling this on a node whose value is not a `SymbolId` is an internal
    /// inconsistency surfaced by the code generator.
    pub fn symbol_id(&self) -> Option<usize> {
        match self.value {
            NodeValue::SymbolId(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_has_no_children_and_is_lvalue_by_default() {
        let n = AstNode::leaf(Op::IntLiteral, PrimType::Int, NodeValue::Int(42));
        assert!(n.left.is_none() && n.middle.is_none() && n.right.is_none());
        assert!(!n.rvalue);
        assert_eq!(n.value, NodeValue::Int(42));
    }

    #[test]
    fn unary_wraps_a_single_child() {
        let child = AstNode::leaf(Op::IntLiteral, PrimType::Char, NodeValue::Int(7));
        let n = AstNode::unary(Op::WidenType, PrimType::Int, child, NodeValue::None);
        assert_eq!(n.op, Op::WidenType);
        assert_eq!(n.prim, PrimType::Int);
        assert_eq!(n.left.as_ref().unwrap().op, Op::IntLiteral);
        assert!(n.middle.is_none() && n.right.is_none());
    }

    #[test]
    fn symbol_id_only_for_symbol_nodes() {
        let ident = AstNode::leaf(Op::Identifier, PrimType::Int, NodeValue::SymbolId(3));
        assert_eq!(ident.symbol_id(), Some(3));
        let lit = AstNode::leaf(Op::IntLiteral, PrimType::Int, NodeValue::Int(3));
        assert_eq!(lit.symbol_id(), None);
    }
}
