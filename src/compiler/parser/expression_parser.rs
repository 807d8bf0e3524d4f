//! # Expression Parser
//!
//! Pratt-style operator-precedence parsing for expressions, together with
//! the `prefix`, `primary`, and `postfix` layers. Semantic checks and type
//! coercion run inline while the tree is built: every widening or pointer
//! scaling decision goes through [`coerce_for_op`], so the finished tree
//! carries explicit `WidenType`/`ScaleType` nodes.

use crate::ast::nodes::{AstNode, NodeValue, Op};
use crate::ast::types::{Coercion, PrimType, coerce_for_op};
use crate::compiler::error::CompileError;
use crate::compiler::lexer::Token;
use crate::compiler::parser::common::Parser;
use crate::compiler::symbols::StructuralKind;

/// A static utility struct dedicated to parsing expressions.
pub struct ExpressionParser;

impl ExpressionParser {
    /// Entry point: parses a full expression with minimum precedence 0.
    pub fn parse_expression(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        Self::binary_expression(parser, 0)
    }

    /// Binding power of a binary operator token. Higher binds tighter; 0
    /// marks tokens that end an expression.
    fn precedence(token: &Token) -> u8 {
        match token {
            Token::Assign => 10,
            Token::LogicalOr => 20,
            Token::LogicalAnd => 30,
            Token::Pipe => 40,
            Token::Caret => 50,
            Token::Ampersand => 60,
            Token::Equal | Token::NotEqual => 70,
            Token::LessThan | Token::LessEqual | Token::GreaterThan | Token::GreaterEqual => 80,
            Token::LeftShift | Token::RightShift => 90,
            Token::Plus | Token::Minus => 100,
            Token::Star | Token::Slash => 110,
            _ => 0,
        }
    }

    /// Only assignment binds right-to-left.
    fn is_right_associative(token: &Token) -> bool {
        matches!(token, Token::Assign)
    }

    /// Maps a binary operator token to its AST operator.
    fn binary_operator(parser: &Parser, token: &Token) -> Result<Op, CompileError> {
        let op = match token {
            Token::Plus => Op::Add,
            Token::Minus => Op::Subtract,
            Token::Star => Op::Multiply,
            Token::Slash => Op::Divide,
            Token::Equal => Op::Equal,
            Token::NotEqual => Op::NotEqual,
            Token::LessThan => Op::LessThan,
            Token::GreaterThan => Op::GreaterThan,
            Token::LessEqual => Op::LessEqual,
            Token::GreaterEqual => Op::GreaterEqual,
            Token::Ampersand => Op::BitwiseAnd,
            Token::Pipe => Op::BitwiseOr,
            Token::Caret => Op::BitwiseXor,
            Token::LeftShift => Op::LeftShift,
            Token::RightShift => Op::RightShift,
            Token::LogicalAnd => Op::LogicalAnd,
            Token::LogicalOr => Op::LogicalOr,
            Token::Assign => Op::Assign,
            other => {
                return Err(CompileError::syntax(
                    parser.line(),
                    format!("unknown binary operator {other:?}"),
                ));
            }
        };
        Ok(op)
    }

    /// Precedence-climbing loop. `prev_precedence` is the binding power of
    /// the operator to the left.
    fn binary_expression(
        parser: &mut Parser,
        prev_precedence: u8,
    ) -> Result<Box<AstNode>, CompileError> {
        let mut left = Self::prefix(parser)?;

        loop {
            let precedence = Self::precedence(&parser.token);
            if precedence == 0 {
                // Ending token (';', ')', ']', EOF, ...): stop binding
                left.rvalue = true;
                return Ok(left);
            }
            let keeps_binding = precedence > prev_precedence
                || (precedence == prev_precedence && Self::is_right_associative(&parser.token));
            if !keeps_binding {
                return Ok(left);
            }

            let operator_token = parser.token.clone();
            let op = Self::binary_operator(parser, &operator_token)?;
            parser.advance()?;

            let mut right = Self::binary_expression(parser, precedence)?;

            if op == Op::Assign {
                // The value being assigned is an r-value; it must fit the
                // destination's type with no arithmetic context.
                right.rvalue = true;
                let destination_prim = left.prim;
                let value = coerce_for_op(right, destination_prim, Op::Nothing)?
                    .compatible()
                    .ok_or_else(|| {
                        CompileError::type_error(
                            parser.line(),
                            "incompatible types in assignment",
                        )
                    })?;
                // Swap the children so codegen materialises the value before
                // the destination; the original left stays an l-value.
                left = AstNode::new(
                    Op::Assign,
                    destination_prim,
                    Some(value),
                    None,
                    Some(left),
                    NodeValue::None,
                );
            } else {
                left.rvalue = true;
                right.rvalue = true;

                // Try each side against the other; at least one must fit.
                // At most one side actually changes shape.
                let left_prim = left.prim;
                let right_prim = right.prim;
                let mut compatible = false;
                left = match coerce_for_op(left, right_prim, op)? {
                    Coercion::Compatible(tree) => {
                        compatible = true;
                        tree
                    }
                    Coercion::Incompatible(tree) => tree,
                };
                right = match coerce_for_op(right, left_prim, op)? {
                    Coercion::Compatible(tree) => {
                        compatible = true;
                        tree
                    }
                    Coercion::Incompatible(tree) => tree,
                };
                if !compatible {
                    return Err(CompileError::type_error(
                        parser.line(),
                        "incompatible types in expression",
                    ));
                }

                let result_prim = left.prim;
                left = AstNode::new(op, result_prim, Some(left), None, Some(right), NodeValue::None);
            }
        }
    }

    /// Unary prefix operators; everything else falls through to `primary`.
    fn prefix(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        match parser.token {
            Token::Ampersand => {
                parser.advance()?;
                let mut tree = Self::prefix(parser)?;
                if tree.op != Op::Identifier {
                    return Err(CompileError::type_error(
                        parser.line(),
                        "'&' must be applied to an identifier",
                    ));
                }
                // Rewrite the identifier in place into an address-of
                tree.op = Op::AddressOf;
                tree.prim = tree.prim.to_pointer()?;
                Ok(tree)
            }
            Token::Star => {
                parser.advance()?;
                let tree = Self::prefix(parser)?;
                if tree.op != Op::Identifier && tree.op != Op::Dereference {
                    return Err(CompileError::type_error(
                        parser.line(),
                        "'*' must be applied to an identifier or another dereference",
                    ));
                }
                if !tree.prim.is_pointer() {
                    return Err(CompileError::type_error(
                        parser.line(),
                        "'*' applied to a non-pointer expression",
                    ));
                }
                let pointee = tree.prim.pointee()?;
                Ok(AstNode::unary(Op::Dereference, pointee, tree, NodeValue::None))
            }
            Token::Minus => {
                parser.advance()?;
                let mut tree = Self::prefix(parser)?;
                tree.rvalue = true;
                let tree = coerce_for_op(tree, PrimType::Int, Op::Nothing)?
                    .compatible()
                    .ok_or_else(|| {
                        CompileError::type_error(parser.line(), "cannot negate this operand")
                    })?;
                let prim = tree.prim;
                Ok(AstNode::unary(Op::Negate, prim, tree, NodeValue::None))
            }
            Token::Tilde => {
                parser.advance()?;
                let mut tree = Self::prefix(parser)?;
                tree.rvalue = true;
                let prim = tree.prim;
                Ok(AstNode::unary(Op::Invert, prim, tree, NodeValue::None))
            }
            Token::Bang => {
                parser.advance()?;
                let mut tree = Self::prefix(parser)?;
                tree.rvalue = true;
                Ok(AstNode::unary(Op::LogicalNot, PrimType::Int, tree, NodeValue::None))
            }
            Token::Increment | Token::Decrement => {
                let op = if parser.token == Token::Increment {
                    Op::PreIncrement
                } else {
                    Op::PreDecrement
                };
                parser.advance()?;
                let tree = Self::prefix(parser)?;
                if tree.op != Op::Identifier {
                    return Err(CompileError::type_error(
                        parser.line(),
                        "'++'/'--' must be applied to an identifier",
                    ));
                }
                let prim = tree.prim;
                Ok(AstNode::unary(op, prim, tree, NodeValue::None))
            }
            _ => Self::primary(parser),
        }
    }

    /// Primary expressions: literals, identifiers, and parenthesised
    /// sub-expressions.
    fn primary(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        match parser.token.clone() {
            Token::IntLiteral(value) => {
                // Literals that fit a byte are chars; coercion widens them
                // at the use site
                let prim = if (0..=255).contains(&value) {
                    PrimType::Char
                } else {
                    PrimType::Int
                };
                parser.advance()?;
                Ok(AstNode::leaf(Op::IntLiteral, prim, NodeValue::Int(value)))
            }
            Token::StringLiteral(text) => {
                // The rodata declaration is emitted immediately; the leaf
                // carries the resulting label
                let label = parser.generator.declare_global_string(&text);
                parser.advance()?;
                Ok(AstNode::leaf(Op::StringLiteral, PrimType::CharPtr, NodeValue::Label(label)))
            }
            Token::Identifier(name) => Self::postfix(parser, name),
            Token::LeftParen => {
                parser.advance()?;
                let tree = Self::binary_expression(parser, 0)?;
                parser.right_paren()?;
                Ok(tree)
            }
            other => Err(CompileError::syntax(
                parser.line(),
                format!("expected expression, found {other:?}"),
            )),
        }
    }

    /// Postfix forms after an identifier: call, array index, `++`/`--`, or a
    /// plain variable reference.
    fn postfix(parser: &mut Parser, name: String) -> Result<Box<AstNode>, CompileError> {
        // One token of lookahead decides the postfix form
        parser.advance()?;
        match parser.token {
            Token::LeftParen => Self::function_call(parser, &name),
            Token::LeftBracket => Self::array_access(parser, &name),
            Token::Increment | Token::Decrement => {
                let op = if parser.token == Token::Increment {
                    Op::PostIncrement
                } else {
                    Op::PostDecrement
                };
                let id = parser.find_symbol(&name)?;
                let symbol = parser.symbols.get(id)?;
                if symbol.kind != StructuralKind::Variable {
                    return Err(CompileError::type_error(
                        parser.line(),
                        format!("'{name}' is not a variable"),
                    ));
                }
                let prim = symbol.prim;
                parser.advance()?;
                Ok(AstNode::leaf(op, prim, NodeValue::SymbolId(id)))
            }
            _ => {
                let id = parser.find_symbol(&name)?;
                let prim = parser.symbols.get(id)?.prim;
                Ok(AstNode::leaf(Op::Identifier, prim, NodeValue::SymbolId(id)))
            }
        }
    }

    /// A call expression `name(argument)`. The callee must be a declared
    /// function; its return type becomes the expression's type.
    fn function_call(parser: &mut Parser, name: &str) -> Result<Box<AstNode>, CompileError> {
        let id = parser.find_symbol(name)?;
        let symbol = parser.symbols.get(id)?;
        if symbol.kind != StructuralKind::Function {
            return Err(CompileError::type_error(
                parser.line(),
                format!("'{name}' is not a function"),
            ));
        }
        let return_prim = symbol.prim;

        parser.left_paren()?;
        let argument = Self::binary_expression(parser, 0)?;
        parser.right_paren()?;

        Ok(AstNode::unary(
            Op::FunctionCall,
            return_prim,
            argument,
            NodeValue::SymbolId(id),
        ))
    }

    /// An index expression `name[index]`. The base must be a declared array;
    /// the index is coerced against the element pointer type so it picks up
    /// the scale, and the result is an l-value element reference.
    fn array_access(parser: &mut Parser, name: &str) -> Result<Box<AstNode>, CompileError> {
        let id = parser.find_symbol(name)?;
        let symbol = parser.symbols.get(id)?;
        if symbol.kind != StructuralKind::Array {
            return Err(CompileError::type_error(
                parser.line(),
                format!("'{name}' is not an array"),
            ));
        }
        let element_prim = symbol.prim;
        let pointer_prim = element_prim.to_pointer()?;

        // The array identifier decays to a pointer to its first element
        let base = AstNode::leaf(Op::Identifier, pointer_prim, NodeValue::SymbolId(id));

        parser.match_token(Token::LeftBracket, "'['")?;
        let mut index = Self::binary_expression(parser, 0)?;
        parser.match_token(Token::RightBracket, "']'")?;

        if !index.prim.is_integer() {
            return Err(CompileError::type_error(
                parser.line(),
                "array index is not an integer",
            ));
        }
        index.rvalue = true;
        let index = coerce_for_op(index, pointer_prim, Op::Add)?
            .compatible()
            .ok_or_else(|| {
                CompileError::type_error(parser.line(), "array index cannot be scaled")
            })?;

        let address = AstNode::new(
            Op::Add,
            pointer_prim,
            Some(base),
            None,
            Some(index),
            NodeValue::None,
        );
        Ok(AstNode::unary(
            Op::Dereference,
            element_prim,
            address,
            NodeValue::None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{Generator, Target, select_backend};
    use crate::compiler::error::CompileError;

    fn parser_over(source: &str) -> Parser {
        let generator = Generator::new(select_backend(Target::Nasm));
        let mut parser = Parser::new(source, generator, None);
        parser.prime().unwrap();
        parser
    }

    fn declare(parser: &mut Parser, name: &str, prim: PrimType) {
        parser
            .symbols
            .add_global(name, prim, StructuralKind::Variable, 0, 1)
            .unwrap();
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let mut parser = parser_over("1 + 2 * 3;");
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        assert_eq!(tree.op, Op::Add);
        assert_eq!(tree.right.as_ref().unwrap().op, Op::Multiply);

        let mut parser = parser_over("2 * 3 + 1;");
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        assert_eq!(tree.op, Op::Add);
        assert_eq!(tree.left.as_ref().unwrap().op, Op::Multiply);
    }

    #[test]
    fn comparisons_bind_looser_than_arithmetic() {
        let mut parser = parser_over("1 + 2 < 3 * 4;");
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        assert_eq!(tree.op, Op::LessThan);
        assert_eq!(tree.left.as_ref().unwrap().op, Op::Add);
        assert_eq!(tree.right.as_ref().unwrap().op, Op::Multiply);
    }

    #[test]
    fn assignment_swaps_value_and_destination() {
        let mut parser = parser_over("i = 5;");
        declare(&mut parser, "i", PrimType::Int);
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        assert_eq!(tree.op, Op::Assign);
        // The destination sits in the right child and stays an l-value
        let destination = tree.right.as_ref().unwrap();
        assert_eq!(destination.op, Op::Identifier);
        assert!(!destination.rvalue);
        // The value is materialised first, widened from char to int
        let value = tree.left.as_ref().unwrap();
        assert_eq!(value.op, Op::WidenType);
        assert!(value.left.as_ref().unwrap().rvalue);
    }

    #[test]
    fn assignment_is_right_associative() {
        let mut parser = parser_over("a = b = 1;");
        declare(&mut parser, "a", PrimType::Int);
        declare(&mut parser, "b", PrimType::Int);
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        assert_eq!(tree.op, Op::Assign);
        // The inner assignment is the value of the outer one
        assert_eq!(tree.left.as_ref().unwrap().op, Op::Assign);
    }

    #[test]
    fn char_to_int_assignment_inserts_exactly_one_widen() {
        let mut parser = parser_over("i = c;");
        declare(&mut parser, "i", PrimType::Int);
        declare(&mut parser, "c", PrimType::Char);
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        let value = tree.left.as_ref().unwrap();
        assert_eq!(value.op, Op::WidenType);
        assert_eq!(value.prim, PrimType::Int);
        assert_eq!(value.left.as_ref().unwrap().op, Op::Identifier);
    }

    #[test]
    fn int_to_char_assignment_is_rejected() {
        let mut parser = parser_over("c = i;");
        declare(&mut parser, "i", PrimType::Int);
        declare(&mut parser, "c", PrimType::Char);
        let error = ExpressionParser::parse_expression(&mut parser).unwrap_err();
        assert!(matches!(error, CompileError::Type { .. }));
    }

    #[test]
    fn pointer_addition_scales_by_the_pointee_size() {
        let mut parser = parser_over("p + i;");
        declare(&mut parser, "p", PrimType::IntPtr);
        declare(&mut parser, "i", PrimType::Int);
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        assert_eq!(tree.op, Op::Add);
        assert_eq!(tree.prim, PrimType::IntPtr);
        let index = tree.right.as_ref().unwrap();
        assert_eq!(index.op, Op::ScaleType);
        assert_eq!(index.value, NodeValue::Size(4));
    }

    #[test]
    fn char_pointer_addition_does_not_scale() {
        let mut parser = parser_over("p + i;");
        declare(&mut parser, "p", PrimType::CharPtr);
        declare(&mut parser, "i", PrimType::Int);
        let tree = ExpressionParser::parse_expression(&mut parser).unwrap();
        assert_eq!(tree.right.as_ref().unwrap().op, Op::Identifier);
    }

    #[test]
    fn address_of_requires_an_identifier() {
        let mut parser = parser_over("&1;");
        let error = ExpressionParser::parse_expression(&mut parser).unwrap_err();
        assert!(matches!(error, CompileError::Type { .. }));
    }

    #[test]
    fn dereference_requires_a_pointer() {
        let mut parser = parser_over("*i;");
        declare(&mut parser, "i", PrimType::Int);
        let error = ExpressionParser::parse_expression(&mut parser).unwrap_err();
        assert!(matches!(error, CompileError::Type { .. }));
    }

    #[test]
    fn adding_two_pointers_is_rejected() {
        let mut parser = parser_over("p + q;");
        declare(&mut parser, "p", PrimType::IntPtr);
        declare(&mut parser, "q", PrimType::IntPtr);
        let error = ExpressionParser::parse_expression(&mut parser).unwrap_err();
        assert!(matches!(error, CompileError::Type { .. }));
    }
}
