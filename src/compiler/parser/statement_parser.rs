//! # Statement Parser
//!
//! Compound and single statements: declarations, `if`, `while`, `for`
//! (desugared to `while`), `return`, and expression statements. Statement
//! subtrees are gathered into a left-biased `Glue` chain.

use crate::ast::nodes::{AstNode, NodeValue, Op};
use crate::ast::types::{PrimType, coerce_for_op};
use crate::compiler::error::CompileError;
use crate::compiler::lexer::Token;
use crate::compiler::parser::common::Parser;
use crate::compiler::parser::declaration_parser::DeclarationParser;
use crate::compiler::parser::expression_parser::ExpressionParser;

/// A static utility struct dedicated to parsing statements.
pub struct StatementParser;

impl StatementParser {
    /// Parses `{ ... }` into a left-biased `Glue` chain. Returns `None` for
    /// an empty body.
    pub fn compound_statement(parser: &mut Parser) -> Result<Option<Box<AstNode>>, CompileError> {
        parser.left_brace()?;

        let mut left: Option<Box<AstNode>> = None;
        loop {
            if parser.token == Token::RightBrace {
                parser.right_brace()?;
                return Ok(left);
            }

            let tree = Self::single_statement(parser)?;

            // Expression-shaped statements carry a trailing semicolon
            if let Some(tree) = &tree {
                if matches!(tree.op, Op::Assign | Op::Return | Op::FunctionCall) {
                    parser.semicolon()?;
                }
            }

            if let Some(tree) = tree {
                left = Some(match left {
                    None => tree,
                    Some(chain) => AstNode::new(
                        Op::Glue,
                        PrimType::None,
                        Some(chain),
                        None,
                        Some(tree),
                        NodeValue::None,
                    ),
                });
            }
        }
    }

    /// Dispatches one statement on its first token. Declarations produce no
    /// AST and return `None`.
    pub fn single_statement(parser: &mut Parser) -> Result<Option<Box<AstNode>>, CompileError> {
        match parser.token {
            Token::Char | Token::Int | Token::Long | Token::Void => {
                let prim = DeclarationParser::parse_primitive_type(parser)?;
                let name = parser.expect_identifier()?;
                DeclarationParser::variable_declaration(parser, prim, name, true)?;
                Ok(None)
            }
            Token::If => Ok(Some(Self::if_statement(parser)?)),
            Token::While => Ok(Some(Self::while_statement(parser)?)),
            Token::For => Ok(Some(Self::for_statement(parser)?)),
            Token::Return => Ok(Some(Self::return_statement(parser)?)),
            // Anything else must be an expression statement; this catches
            // assignments and calls
            _ => Ok(Some(ExpressionParser::parse_expression(parser)?)),
        }
    }

    /// Parses a parenthesised condition. Non-comparison conditions are
    /// wrapped in `ToBoolean` so the backend emits a truth test.
    fn condition(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        parser.left_paren()?;
        let tree = ExpressionParser::parse_expression(parser)?;
        parser.right_paren()?;

        if tree.op.is_comparison() {
            Ok(tree)
        } else {
            Ok(AstNode::unary(Op::ToBoolean, PrimType::Int, tree, NodeValue::None))
        }
    }

    /// `if (condition) { ... } [else { ... }]`
    fn if_statement(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        parser.match_token(Token::If, "'if'")?;
        let condition = Self::condition(parser)?;

        let then_branch = Self::compound_statement(parser)?;

        let else_branch = if parser.token == Token::Else {
            parser.advance()?;
            Self::compound_statement(parser)?
        } else {
            None
        };

        Ok(AstNode::new(
            Op::If,
            PrimType::None,
            Some(condition),
            then_branch,
            else_branch,
            NodeValue::None,
        ))
    }

    /// `while (condition) { ... }`; the body lives in the right child.
    fn while_statement(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        parser.match_token(Token::While, "'while'")?;
        let condition = Self::condition(parser)?;
        let body = Self::compound_statement(parser)?;

        Ok(AstNode::new(
            Op::While,
            PrimType::None,
            Some(condition),
            None,
            body,
            NodeValue::None,
        ))
    }

    /// `for (pre; condition; post) { ... }` desugars to
    /// `Glue(pre, While(condition, Glue(body, post)))`.
    fn for_statement(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        parser.match_token(Token::For, "'for'")?;
        parser.left_paren()?;

        let pre = Self::single_statement(parser)?;
        parser.semicolon()?;

        let mut condition = ExpressionParser::parse_expression(parser)?;
        if !condition.op.is_comparison() {
            condition = AstNode::unary(Op::ToBoolean, PrimType::Int, condition, NodeValue::None);
        }
        parser.semicolon()?;

        let post = Self::single_statement(parser)?;
        parser.right_paren()?;

        let body = Self::compound_statement(parser)?;

        // body ; post
        let loop_body = match (body, post) {
            (Some(body), Some(post)) => Some(AstNode::new(
                Op::Glue,
                PrimType::None,
                Some(body),
                None,
                Some(post),
                NodeValue::None,
            )),
            (body, post) => body.or(post),
        };

        let while_tree = AstNode::new(
            Op::While,
            PrimType::None,
            Some(condition),
            None,
            loop_body,
            NodeValue::None,
        );

        Ok(match pre {
            Some(pre) => AstNode::new(
                Op::Glue,
                PrimType::None,
                Some(pre),
                None,
                Some(while_tree),
                NodeValue::None,
            ),
            None => while_tree,
        })
    }

    /// `return (expression)` with the expression coerced to the function's
    /// return type, or a bare `return` in a `void` function.
    fn return_statement(parser: &mut Parser) -> Result<Box<AstNode>, CompileError> {
        let function_id = parser.current_function.ok_or_else(|| {
            CompileError::syntax(parser.line(), "'return' outside a function")
        })?;
        let return_prim = parser.symbols.get(function_id)?.prim;

        parser.match_token(Token::Return, "'return'")?;

        // Bare `return;` just branches to the end label
        if parser.token == Token::Semicolon {
            if return_prim != PrimType::Void {
                return Err(CompileError::type_error(
                    parser.line(),
                    "non-void function must return a value",
                ));
            }
            return Ok(AstNode::leaf(Op::Return, PrimType::None, NodeValue::None));
        }

        if return_prim == PrimType::Void {
            return Err(CompileError::type_error(
                parser.line(),
                "cannot return a value from a void function",
            ));
        }

        parser.left_paren()?;

        let tree = ExpressionParser::parse_expression(parser)?;
        let tree = coerce_for_op(tree, return_prim, Op::Nothing)?
            .compatible()
            .ok_or_else(|| {
                CompileError::type_error(
                    parser.line(),
                    "incompatible type in return statement",
                )
            })?;

        parser.right_paren()?;

        Ok(AstNode::unary(Op::Return, PrimType::None, tree, NodeValue::None))
    }
}
