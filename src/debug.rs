//! # AST Dump
//!
//! Renders a parsed function's tree in the order the code generator walks
//! it, for the `-a` / `-A` command-line flags. The compacted mode flattens
//! `Glue` chains so statement sequences read top to bottom without the
//! nesting of the raw tree.

use std::fmt::Write;

use crate::ast::nodes::{AstNode, NodeValue, Op};
use crate::compiler::symbols::SymbolTable;

/// How to render glue chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// The raw tree, one header line per node.
    Full,
    /// Glue chains flattened into a statement sequence.
    Compacted,
}

/// Per-dump state: the output buffer and the dump-label counter.
struct Dumper<'a> {
    out: String,
    symbols: &'a SymbolTable,
    mode: DumpMode,
    next_label: usize,
}

/// Renders the tree of one top-level declaration.
pub fn dump_tree(root: &AstNode, symbols: &SymbolTable, mode: DumpMode) -> String {
    let mut dumper = Dumper {
        out: String::new(),
        symbols,
        mode,
        next_label: 1,
    };

    dumper.out.push_str("============= AST dump =============\n");
    if root.op == Op::Function {
        if let Some(name) = dumper.symbol_name(root).map(str::to_owned) {
            let _ = writeln!(dumper.out, "function: {name}");
        }
    }
    let label = dumper.next_label();
    dumper.dump(root, label, 0);
    dumper.out.push_str("============= end AST dump =============");
    dumper.out
}

impl Dumper<'_> {
    fn next_label(&mut self) -> usize {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn indent(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push_str("   ");
        }
    }

    fn symbol_name(&self, node: &AstNode) -> Option<&str> {
        let id = node.symbol_id()?;
        self.symbols.get(id).ok().map(|s| s.name.as_str())
    }

    fn header(&mut self, node: &AstNode, label: usize) {
        let _ = write!(self.out, "L{label:03}: {:?} ({:?})", node.op, node.prim);
        if node.rvalue {
            self.out.push_str(" rvalue");
        }
        match (node.op, node.value) {
            (Op::IntLiteral, NodeValue::Int(value)) => {
                let _ = write!(self.out, " value={value}");
            }
            (Op::StringLiteral, NodeValue::Label(l)) => {
                let _ = write!(self.out, " label=L{l}");
            }
            (Op::ScaleType, NodeValue::Size(size)) => {
                let _ = write!(self.out, " size={size}");
            }
            (
                Op::Identifier
                | Op::Function
                | Op::FunctionCall
                | Op::AddressOf
                | Op::PostIncrement
                | Op::PostDecrement,
                NodeValue::SymbolId(_),
            ) => {
                if let Some(name) = self.symbol_name(node).map(str::to_owned) {
                    let _ = write!(self.out, " name={name}");
                }
            }
            _ => {}
        }
        self.out.push('\n');
    }

    /// Dumps a labelled child behind an arrow line, e.g. `cond -> L4`.
    fn arrow(&mut self, caption: &str, child: &AstNode, level: usize) {
        let label = self.next_label();
        self.indent(level + 1);
        let _ = writeln!(self.out, "{caption} -> L{label}");
        self.dump(child, label, level + 2);
    }

    fn dump(&mut self, node: &AstNode, label: usize, level: usize) {
        // Compacted mode renders a glue chain as a flat sequence
        if self.mode == DumpMode::Compacted && node.op == Op::Glue {
            if let Some(left) = &node.left {
                let label = self.next_label();
                self.dump(left, label, level);
            }
            if let Some(right) = &node.right {
                let label = self.next_label();
                self.dump(right, label, level);
            }
            return;
        }

        self.indent(level);
        self.header(node, label);

        match node.op {
            Op::If => {
                if let Some(condition) = &node.left {
                    self.arrow("cond", condition, level);
                }
                if let Some(then_branch) = &node.middle {
                    self.arrow("then", then_branch, level);
                }
                if let Some(else_branch) = &node.right {
                    self.arrow("else", else_branch, level);
                }
            }
            Op::While => {
                if let Some(condition) = &node.left {
                    self.arrow("cond", condition, level);
                }
                if let Some(body) = &node.right {
                    self.arrow("body", body, level);
                }
            }
            Op::Glue | Op::Function => {
                for child in [&node.left, &node.right].into_iter().flatten() {
                    let label = self.next_label();
                    self.dump(child, label, level + 1);
                }
            }
            _ => {
                for child in [&node.left, &node.middle, &node.right].into_iter().flatten() {
                    let label = self.next_label();
                    self.dump(child, label, level + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::PrimType;

    fn glue(left: Box<AstNode>, right: Box<AstNode>) -> Box<AstNode> {
        AstNode::new(Op::Glue, PrimType::None, Some(left), None, Some(right), NodeValue::None)
    }

    fn literal(value: i64) -> Box<AstNode> {
        AstNode::leaf(Op::IntLiteral, PrimType::Char, NodeValue::Int(value))
    }

    #[test]
    fn full_dump_shows_glue_nodes() {
        let symbols = SymbolTable::new();
        let tree = glue(glue(literal(1), literal(2)), literal(3));
        let text = dump_tree(&tree, &symbols, DumpMode::Full);
        assert_eq!(text.matches("Glue").count(), 2);
        assert!(text.contains("value=3"));
    }

    #[test]
    fn compacted_dump_flattens_glue_chains() {
        let symbols = SymbolTable::new();
        let tree = glue(glue(literal(1), literal(2)), literal(3));
        let text = dump_tree(&tree, &symbols, DumpMode::Compacted);
        assert!(!text.contains("Glue"));
        // All three statements render unindented, in source order
        let statements: Vec<&str> = text.lines().filter(|l| l.starts_with('L')).collect();
        assert_eq!(statements.len(), 3);
        for (line, value) in statements.iter().zip(["value=1", "value=2", "value=3"]) {
            assert!(line.contains(value), "unexpected line {line}");
        }
    }
}
