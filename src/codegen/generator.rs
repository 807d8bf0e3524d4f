//! # Target-Agnostic Code Generator
//!
//! Walks the AST and routes every operation through the selected backend's
//! operation table. This layer owns the label allocator and the lowering of
//! `if`, `while`, glue sequencing, and function bodies; everything
//! instruction-shaped lives behind the [`Backend`] trait.
//!
//! Registers are reset between the sub-trees of control-flow constructs and
//! after every top-level statement, so a scratch value never outlives the
//! statement that produced it.

use crate::ast::nodes::{AstNode, NodeValue, Op};
use crate::ast::types::PrimType;
use crate::codegen::backend::{Backend, Reg};
use crate::compiler::error::CompileError;
use crate::compiler::symbols::{StructuralKind, Symbol, SymbolTable};

/// The code generator: one backend plus the process-wide label counter.
pub struct Generator {
    backend: Box<dyn Backend>,
    next_label: usize,
    /// Symbol id of the function currently being emitted.
    current_function: Option<usize>,
}

impl Generator {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            next_label: 1,
            current_function: None,
        }
    }

    /// Issues the next label id. Labels are unique and monotonically
    /// increasing across the whole compilation.
    pub fn next_label(&mut self) -> usize {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Emits the output preamble.
    pub fn preamble(&mut self) {
        self.backend.preamble();
    }

    /// Emits the output postamble.
    pub fn postamble(&mut self) {
        self.backend.postamble();
    }

    /// Declares storage for a global variable or array.
    pub fn declare_global_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        self.backend.declare_global_symbol(symbol)
    }

    /// Emits a string constant into read-only data and returns its label id.
    pub fn declare_global_string(&mut self, text: &str) -> usize {
        let label = self.next_label();
        self.backend.declare_global_string(label, text);
        label
    }

    /// Reserves frame space for one local; forwards to the backend.
    pub fn local_offset_for(&mut self, prim: PrimType) -> i32 {
        self.backend.get_local_offset(prim)
    }

    /// Resets per-function local frame tracking; forwards to the backend.
    pub fn reset_local_offset(&mut self) {
        self.backend.reset_local_offset();
    }

    /// Marks which function subsequent `Return` nodes belong to.
    pub fn set_current_function(&mut self, id: usize) {
        self.current_function = Some(id);
    }

    /// Drains the assembly text produced so far.
    pub fn take_output(&mut self) -> String {
        self.backend.take_output()
    }

    /// Generates code for one top-level declaration tree, then resets the
    /// register pool for the next statement.
    pub fn generate(
        &mut self,
        tree: &AstNode,
        symbols: &SymbolTable,
    ) -> Result<(), CompileError> {
        self.emit_ast(tree, symbols, None, Op::Nothing)?;
        self.backend.reset_registers();
        Ok(())
    }

    fn symbol_of<'a>(
        &self,
        node: &AstNode,
        symbols: &'a SymbolTable,
    ) -> Result<&'a Symbol, CompileError> {
        let id = node
            .symbol_id()
            .ok_or_else(|| CompileError::internal(format!("{:?} node carries no symbol", node.op)))?;
        symbols.get(id)
    }

    /// Lowers an `if` with optional `else`: the condition jumps to the false
    /// label when it fails, branches fall through in source order.
    fn emit_if(&mut self, node: &AstNode, symbols: &SymbolTable) -> Result<(), CompileError> {
        let false_label = self.next_label();
        let end_label = if node.right.is_some() {
            Some(self.next_label())
        } else {
            None
        };

        if let Some(condition) = &node.left {
            self.emit_ast(condition, symbols, Some(false_label), Op::If)?;
        }
        self.backend.reset_registers();

        if let Some(then_branch) = &node.middle {
            self.emit_ast(then_branch, symbols, None, Op::Nothing)?;
        }
        self.backend.reset_registers();

        if let Some(else_branch) = &node.right {
            let end = end_label
                .ok_or_else(|| CompileError::internal("if-else without an end label"))?;
            self.backend.jump(end);
            self.backend.label(false_label);
            self.emit_ast(else_branch, symbols, None, Op::Nothing)?;
            self.backend.reset_registers();
            self.backend.label(end);
        } else {
            self.backend.label(false_label);
        }
        Ok(())
    }

    /// Lowers a `while` loop: condition at the top, unconditional jump back.
    fn emit_while(&mut self, node: &AstNode, symbols: &SymbolTable) -> Result<(), CompileError> {
        let start_label = self.next_label();
        let end_label = self.next_label();

        self.backend.label(start_label);
        if let Some(condition) = &node.left {
            self.emit_ast(condition, symbols, Some(end_label), Op::While)?;
        }
        self.backend.reset_registers();

        if let Some(body) = &node.right {
            self.emit_ast(body, symbols, None, Op::Nothing)?;
        }
        self.backend.reset_registers();

        self.backend.jump(start_label);
        self.backend.label(end_label);
        Ok(())
    }

    /// Recursive AST walk. Returns the register holding the node's value, or
    /// `None` for statements and deferred l-values.
    fn emit_ast(
        &mut self,
        node: &AstNode,
        symbols: &SymbolTable,
        jump_label: Option<usize>,
        parent_op: Op,
    ) -> Result<Option<Reg>, CompileError> {
        // Constructs with their own control flow handle children themselves
        match node.op {
            Op::If => {
                self.emit_if(node, symbols)?;
                return Ok(None);
            }
            Op::While => {
                self.emit_while(node, symbols)?;
                return Ok(None);
            }
            Op::Glue => {
                if let Some(left) = &node.left {
                    self.emit_ast(left, symbols, None, Op::Nothing)?;
                    self.backend.reset_registers();
                }
                if let Some(right) = &node.right {
                    self.emit_ast(right, symbols, None, Op::Nothing)?;
                    self.backend.reset_registers();
                }
                return Ok(None);
            }
            Op::Function => {
                let function = self.symbol_of(node, symbols)?.clone();
                self.backend.function_preamble(&function);
                if let Some(body) = &node.left {
                    self.emit_ast(body, symbols, None, Op::Nothing)?;
                }
                self.backend.function_postamble(&function);
                return Ok(None);
            }
            _ => {}
        }

        // General case: children first, left then right
        let left_reg = match &node.left {
            Some(left) => self.emit_ast(left, symbols, None, node.op)?,
            None => None,
        };
        let right_reg = match &node.right {
            Some(right) => self.emit_ast(right, symbols, None, node.op)?,
            None => None,
        };

        match node.op {
            Op::Add => self.binary(left_reg, right_reg, |b, l, r| b.add_regs(l, r)),
            Op::Subtract => self.binary(left_reg, right_reg, |b, l, r| b.sub_regs(l, r)),
            Op::Multiply => self.binary(left_reg, right_reg, |b, l, r| b.mul_regs(l, r)),
            Op::Divide => self.binary(left_reg, right_reg, |b, l, r| b.div_regs_signed(l, r)),

            Op::Equal
            | Op::NotEqual
            | Op::LessThan
            | Op::GreaterThan
            | Op::LessEqual
            | Op::GreaterEqual => {
                let l = required(left_reg)?;
                let r = required(right_reg)?;
                if matches!(parent_op, Op::If | Op::While) {
                    let label = jump_label
                        .ok_or_else(|| CompileError::internal("comparison jump without a label"))?;
                    self.backend.compare_and_jump(node.op, l, r, label)?;
                    Ok(None)
                } else {
                    Ok(Some(self.backend.compare_and_set(node.op, l, r)?))
                }
            }

            Op::BitwiseAnd => self.binary(left_reg, right_reg, |b, l, r| b.bitwise_and_regs(l, r)),
            Op::BitwiseOr => self.binary(left_reg, right_reg, |b, l, r| b.bitwise_or_regs(l, r)),
            Op::BitwiseXor => self.binary(left_reg, right_reg, |b, l, r| b.bitwise_xor_regs(l, r)),
            Op::LeftShift => self.binary(left_reg, right_reg, |b, l, r| b.shift_left_regs(l, r)),
            Op::RightShift => self.binary(left_reg, right_reg, |b, l, r| b.shift_right_regs(l, r)),

            // Both operands are normalised to 0/1, then combined bitwise
            Op::LogicalAnd | Op::LogicalOr => {
                let l = required(left_reg)?;
                let r = required(right_reg)?;
                let l = self.backend.to_boolean(l, Op::Nothing, None);
                let r = self.backend.to_boolean(r, Op::Nothing, None);
                if node.op == Op::LogicalAnd {
                    Ok(Some(self.backend.bitwise_and_regs(l, r)?))
                } else {
                    Ok(Some(self.backend.bitwise_or_regs(l, r)?))
                }
            }

            Op::IntLiteral => {
                let value = match node.value {
                    NodeValue::Int(v) => v,
                    _ => return Err(CompileError::internal("integer literal without a value")),
                };
                Ok(Some(self.backend.load_immediate_int(value, node.prim)?))
            }

            Op::StringLiteral => {
                let label = match node.value {
                    NodeValue::Label(l) => l,
                    _ => return Err(CompileError::internal("string literal without a label")),
                };
                Ok(Some(self.backend.load_global_string(label)?))
            }

            Op::Identifier => {
                let symbol = self.symbol_of(node, symbols)?.clone();
                // Arrays decay to a pointer to their first element
                if symbol.kind == StructuralKind::Array {
                    return Ok(Some(self.backend.address_of_symbol(&symbol)?));
                }
                if node.rvalue || parent_op == Op::Dereference {
                    Ok(Some(self.backend.load_symbol(&symbol, Op::Nothing)?))
                } else {
                    // L-value position: the store path re-fetches by id
                    Ok(None)
                }
            }

            Op::Assign => {
                // The parser swapped the children: left is the value, right
                // the destination
                let value = required(left_reg)?;
                let destination = node
                    .right
                    .as_ref()
                    .ok_or_else(|| CompileError::internal("assignment without a destination"))?;
                match destination.op {
                    Op::Identifier => {
                        let symbol = self.symbol_of(destination, symbols)?.clone();
                        Ok(Some(self.backend.store_symbol(value, &symbol)?))
                    }
                    Op::Dereference => {
                        let address = required(right_reg)?;
                        let pointee = destination.prim;
                        Ok(Some(self.backend.store_dereferenced_pointer(
                            value, address, pointee,
                        )?))
                    }
                    other => Err(CompileError::internal(format!(
                        "cannot assign through {other:?}"
                    ))),
                }
            }

            Op::WidenType => {
                let reg = required(left_reg)?;
                let old = node
                    .left
                    .as_ref()
                    .map(|l| l.prim)
                    .unwrap_or(PrimType::None);
                Ok(Some(self.backend.widen_primitive_type(reg, old, node.prim)))
            }

            Op::ScaleType => {
                let reg = required(left_reg)?;
                let size = match node.value {
                    NodeValue::Size(s) => s,
                    _ => return Err(CompileError::internal("scale node without a size")),
                };
                // Powers of two become shifts; anything else multiplies
                match size {
                    2 => Ok(Some(self.backend.shift_left_const(reg, 1))),
                    4 => Ok(Some(self.backend.shift_left_const(reg, 2))),
                    8 => Ok(Some(self.backend.shift_left_const(reg, 3))),
                    _ => {
                        let size_reg =
                            self.backend.load_immediate_int(size as i64, node.prim)?;
                        Ok(Some(self.backend.mul_regs(size_reg, reg)?))
                    }
                }
            }

            Op::Return => {
                let id = self
                    .current_function
                    .ok_or_else(|| CompileError::internal("return outside a function"))?;
                let function = symbols.get(id)?.clone();
                match left_reg {
                    // Bare `return;` just branches to the end label
                    None => self.backend.jump(function.end_label),
                    Some(reg) => self.backend.return_from_function(reg, &function)?,
                }
                Ok(None)
            }

            Op::FunctionCall => {
                let arg = required(left_reg)?;
                let callee = self.symbol_of(node, symbols)?.clone();
                Ok(Some(self.backend.function_call(arg, &callee)?))
            }

            Op::AddressOf => {
                let symbol = self.symbol_of(node, symbols)?.clone();
                Ok(Some(self.backend.address_of_symbol(&symbol)?))
            }

            Op::Dereference => {
                let reg = required(left_reg)?;
                if node.rvalue {
                    let ptr_prim = node
                        .left
                        .as_ref()
                        .map(|l| l.prim)
                        .unwrap_or(PrimType::None);
                    Ok(Some(self.backend.dereference_pointer(reg, ptr_prim)?))
                } else {
                    // L-value: leave the address in the register
                    Ok(Some(reg))
                }
            }

            Op::ToBoolean => {
                let reg = required(left_reg)?;
                let result = self.backend.to_boolean(reg, parent_op, jump_label);
                if matches!(parent_op, Op::If | Op::While) {
                    Ok(None)
                } else {
                    Ok(Some(result))
                }
            }

            Op::Negate => Ok(Some(self.backend.negate(required(left_reg)?))),
            Op::Invert => Ok(Some(self.backend.invert(required(left_reg)?))),
            Op::LogicalNot => Ok(Some(self.backend.logical_not(required(left_reg)?))),

            // The increment or decrement is folded into the symbol access
            Op::PreIncrement | Op::PreDecrement => {
                let target = node
                    .left
                    .as_ref()
                    .ok_or_else(|| CompileError::internal("increment without a target"))?;
                let symbol = self.symbol_of(target, symbols)?.clone();
                Ok(Some(self.backend.load_symbol(&symbol, node.op)?))
            }
            Op::PostIncrement | Op::PostDecrement => {
                let symbol = self.symbol_of(node, symbols)?.clone();
                Ok(Some(self.backend.load_symbol(&symbol, node.op)?))
            }

            other => Err(CompileError::internal(format!(
                "unknown operator {other:?} in code generation"
            ))),
        }
    }

    fn binary(
        &mut self,
        left: Option<Reg>,
        right: Option<Reg>,
        op: impl FnOnce(&mut dyn Backend, Reg, Reg) -> Result<Reg, CompileError>,
    ) -> Result<Option<Reg>, CompileError> {
        let l = required(left)?;
        let r = required(right)?;
        Ok(Some(op(self.backend.as_mut(), l, r)?))
    }
}

/// Unwraps an operand register that the current operation requires.
fn required(reg: Option<Reg>) -> Result<Reg, CompileError> {
    reg.ok_or_else(|| CompileError::internal("operand produced no register"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::nodes::AstNode;
    use crate::codegen::x86_64::X86_64Backend;
    use crate::compiler::symbols::SymbolTable;

    fn generator() -> Generator {
        Generator::new(Box::new(X86_64Backend::new()))
    }

    #[test]
    fn labels_are_unique_and_monotonic() {
        let mut generator = generator();
        let a = generator.next_label();
        let b = generator.next_label();
        let c = generator.next_label();
        assert!(a < b && b < c);
        assert_eq!(a, 1);
    }

    #[test]
    fn string_declaration_returns_its_label() {
        let mut generator = generator();
        let label = generator.declare_global_string("hello");
        let out = generator.take_output();
        assert!(out.contains(&format!("L{label}:")));
    }

    #[test]
    fn constant_arithmetic_emits_in_tree_order() {
        // 1 + 2 * 3, as the parser would shape it
        let mul = AstNode::new(
            Op::Multiply,
            PrimType::Char,
            Some(AstNode::leaf(Op::IntLiteral, PrimType::Char, NodeValue::Int(2))),
            None,
            Some(AstNode::leaf(Op::IntLiteral, PrimType::Char, NodeValue::Int(3))),
            NodeValue::None,
        );
        let add = AstNode::new(
            Op::Add,
            PrimType::Char,
            Some(AstNode::leaf(Op::IntLiteral, PrimType::Char, NodeValue::Int(1))),
            None,
            Some(mul),
            NodeValue::None,
        );
        let mut generator = generator();
        let symbols = SymbolTable::new();
        generator.generate(&add, &symbols).unwrap();
        let out = generator.take_output();
        let mul_at = out.find("imul").expect("multiply emitted");
        let add_at = out.find("add").expect("add emitted");
        assert!(mul_at < add_at, "multiplication must precede addition:\n{out}");
    }
}
