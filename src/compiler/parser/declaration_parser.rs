//! # Declaration Parser
//!
//! Types, variables, arrays, and functions. Global variable declarations
//! emit their storage immediately; function declarations parse the body,
//! enforce the terminal-return rule, and hand the finished tree back to the
//! top-level loop for emission.

use crate::ast::nodes::{AstNode, NodeValue, Op};
use crate::ast::types::PrimType;
use crate::compiler::error::CompileError;
use crate::compiler::lexer::Token;
use crate::compiler::parser::common::Parser;
use crate::compiler::parser::statement_parser::StatementParser;
use crate::compiler::symbols::StructuralKind;
use crate::debug;

/// A static utility struct dedicated to parsing declarations.
pub struct DeclarationParser;

impl DeclarationParser {
    /// Consumes a type keyword and any number of `*` suffixes, widening the
    /// type to its pointer form each time.
    pub fn parse_primitive_type(parser: &mut Parser) -> Result<PrimType, CompileError> {
        let base = match parser.token {
            Token::Void => PrimType::Void,
            Token::Char => PrimType::Char,
            Token::Int => PrimType::Int,
            Token::Long => PrimType::Long,
            ref other => {
                return Err(CompileError::syntax(
                    parser.line(),
                    format!("expected a type, found {other:?}"),
                ));
            }
        };
        parser.advance()?;

        let mut prim = base;
        while parser.token == Token::Star {
            prim = prim.to_pointer()?;
            parser.advance()?;
        }
        Ok(prim)
    }

    /// Parses the rest of a variable declaration after the type and first
    /// identifier: optional array size, comma-separated further names, and
    /// the closing semicolon. Globals emit their storage here; locals get a
    /// frame offset from the backend.
    pub fn variable_declaration(
        parser: &mut Parser,
        prim: PrimType,
        first_name: String,
        is_local: bool,
    ) -> Result<(), CompileError> {
        let mut name = first_name;
        loop {
            if parser.token == Token::LeftBracket {
                Self::array_declaration(parser, prim, &name, is_local)?;
            } else {
                Self::scalar_declaration(parser, prim, &name, is_local)?;
            }

            match parser.token {
                Token::Comma => {
                    parser.advance()?;
                    name = parser.expect_identifier()?;
                }
                Token::Semicolon => {
                    parser.advance()?;
                    return Ok(());
                }
                ref other => {
                    return Err(CompileError::syntax(
                        parser.line(),
                        format!("expected ',' or ';' in declaration, found {other:?}"),
                    ));
                }
            }
        }
    }

    fn scalar_declaration(
        parser: &mut Parser,
        prim: PrimType,
        name: &str,
        is_local: bool,
    ) -> Result<(), CompileError> {
        if prim == PrimType::Void {
            return Err(CompileError::type_error(
                parser.line(),
                format!("variable '{name}' cannot have type void"),
            ));
        }

        if is_local {
            let offset = parser.generator.local_offset_for(prim);
            parser
                .symbols
                .add_local(name, prim, StructuralKind::Variable, 0, 1, offset)?;
        } else {
            let id = parser
                .symbols
                .add_global(name, prim, StructuralKind::Variable, 0, 1)?;
            let symbol = parser.symbols.get(id)?;
            parser.generator.declare_global_symbol(symbol)?;
        }
        Ok(())
    }

    /// `name[count]` with a positive integer-literal element count.
    fn array_declaration(
        parser: &mut Parser,
        prim: PrimType,
        name: &str,
        is_local: bool,
    ) -> Result<(), CompileError> {
        if is_local {
            return Err(CompileError::type_error(
                parser.line(),
                format!("array '{name}' must be declared at global scope"),
            ));
        }
        if prim == PrimType::Void {
            return Err(CompileError::type_error(
                parser.line(),
                format!("array '{name}' cannot have element type void"),
            ));
        }

        parser.match_token(Token::LeftBracket, "'['")?;
        let count = match parser.token {
            Token::IntLiteral(value) if value > 0 => value as usize,
            Token::IntLiteral(_) => {
                return Err(CompileError::type_error(
                    parser.line(),
                    format!("array '{name}' must have a positive element count"),
                ));
            }
            ref other => {
                return Err(CompileError::syntax(
                    parser.line(),
                    format!("expected integer literal array size, found {other:?}"),
                ));
            }
        };
        parser.advance()?;
        parser.match_token(Token::RightBracket, "']'")?;

        let id = parser
            .symbols
            .add_global(name, prim, StructuralKind::Array, 0, count)?;
        let symbol = parser.symbols.get(id)?;
        parser.generator.declare_global_symbol(symbol)?;
        Ok(())
    }

    /// Parses a function declaration after the type and name; the current
    /// token is the opening parenthesis. Returns the `Function` tree.
    pub fn function_declaration(
        parser: &mut Parser,
        prim: PrimType,
        name: String,
    ) -> Result<Box<AstNode>, CompileError> {
        let end_label = parser.generator.next_label();
        let id = parser
            .symbols
            .add_global(&name, prim, StructuralKind::Function, end_label, 1)?;
        parser.current_function = Some(id);
        parser.generator.set_current_function(id);
        parser.generator.reset_local_offset();

        // No parameters in this revision
        parser.left_paren()?;
        parser.right_paren()?;

        let body = StatementParser::compound_statement(parser)?;

        // A function that returns a value must end on a return statement
        if prim != PrimType::Void && !body.as_ref().is_some_and(|tree| Self::ends_in_return(tree)) {
            return Err(CompileError::type_error(
                parser.line(),
                format!("function '{name}' must end with a return statement"),
            ));
        }

        Ok(AstNode::new(
            Op::Function,
            PrimType::None,
            body,
            None,
            None,
            NodeValue::SymbolId(id),
        ))
    }

    /// True when every path through the statement tree's tail reaches a
    /// `return`: the tree is a return itself, a glue chain whose last
    /// statement returns, or an if-else whose branches both return.
    fn ends_in_return(tree: &AstNode) -> bool {
        match tree.op {
            Op::Return => true,
            Op::Glue => tree.right.as_deref().is_some_and(Self::ends_in_return),
            Op::If => {
                tree.middle.as_deref().is_some_and(Self::ends_in_return)
                    && tree.right.as_deref().is_some_and(Self::ends_in_return)
            }
            _ => false,
        }
    }

    /// The top-level loop: reads declarations until end of file, emitting
    /// each function as soon as it finishes parsing.
    pub fn global_declarations(parser: &mut Parser) -> Result<(), CompileError> {
        loop {
            if parser.token == Token::Eof {
                return Ok(());
            }

            let prim = Self::parse_primitive_type(parser)?;
            let name = parser.expect_identifier()?;

            if parser.token == Token::LeftParen {
                let tree = Self::function_declaration(parser, prim, name)?;
                if let Some(mode) = parser.dump_mode {
                    println!("{}", debug::dump_tree(&tree, &parser.symbols, mode));
                }
                parser.generator.generate(&tree, &parser.symbols)?;
                // The function's locals die with its postamble
                parser.symbols.free_locals();
            } else {
                Self::variable_declaration(parser, prim, name, false)?;
            }
        }
    }
}
