//! # Symbol Table
//!
//! A single flat array of `NSYMBOLS` slots shared by global and local
//! symbols. Globals occupy the low indices and grow upward; locals occupy
//! the high indices and grow downward:
//!
//! ```text
//! [0]xxxx......................................xxxxxxxx[NSYMBOLS-1]
//!         ^                                   ^
//!   next_global                          next_local
//! ```
//!
//! The two frontiers must never cross; a crossing insertion is fatal. Slot
//! indices are the symbol ids stored inside AST nodes, so the table is an
//! array by contract, not a map.

use crate::ast::types::PrimType;
use crate::compiler::error::CompileError;

/// Number of symbol table slots: the maximum number of distinct symbols in
/// one compilation.
pub const NSYMBOLS: usize = 1024;

/// Structural kind of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralKind {
    Variable,
    Function,
    Array,
}

/// Storage class of a symbol. Parameters use `Local` and are distinguished
/// by context; parameter handling is minimal in this revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Global,
    Local,
}

/// One symbol table entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub prim: PrimType,
    pub kind: StructuralKind,
    pub class: StorageClass,
    /// Element count for arrays; 1 for scalars.
    pub size: usize,
    /// End label id for functions.
    pub end_label: usize,
    /// Frame offset for locals, relative to the frame pointer (negative).
    pub offset: i32,
}

/// The two-frontier symbol table.
pub struct SymbolTable {
    slots: Vec<Option<Symbol>>,
    /// Index of the next free global slot (grows upward).
    next_global: usize,
    /// Index of the next free local slot (grows downward; signed so a fully
    /// drained region is representable).
    next_local: isize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            slots: (0..NSYMBOLS).map(|_| None).collect(),
            next_global: 0,
            next_local: NSYMBOLS as isize - 1,
        }
    }

    /// Returns the symbol stored at `id`. Ids are handed out by the add
    /// operations and embedded in AST nodes, so a missing slot is an
    /// internal inconsistency.
    pub fn get(&self, id: usize) -> Result<&Symbol, CompileError> {
        self.slots
            .get(id)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| CompileError::internal(format!("no symbol at slot {id}")))
    }

    /// Linear scan of the global region for `name`.
    pub fn find_global(&self, name: &str) -> Option<usize> {
        (0..self.next_global).find(|&i| {
            self.slots[i]
                .as_ref()
                .is_some_and(|s| s.name == name)
        })
    }

    /// Linear scan of the local region for `name`.
    pub fn find_local(&self, name: &str) -> Option<usize> {
        let low = (self.next_local + 1) as usize;
        (low..NSYMBOLS).find(|&i| {
            self.slots[i]
                .as_ref()
                .is_some_and(|s| s.name == name)
        })
    }

    /// Finds `name`, preferring the local region over the global one.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.find_local(name).or_else(|| self.find_global(name))
    }

    /// Checks that taking one more slot keeps the frontiers apart.
    fn check_frontiers(&self) -> Result<(), CompileError> {
        if self.next_global as isize > self.next_local {
            return Err(CompileError::SymbolTableFull);
        }
        Ok(())
    }

    /// Adds a global symbol, returning its slot index. Re-adding an existing
    /// name returns the existing index unchanged.
    pub fn add_global(
        &mut self,
        name: &str,
        prim: PrimType,
        kind: StructuralKind,
        end_label: usize,
        size: usize,
    ) -> Result<usize, CompileError> {
        if let Some(id) = self.find_global(name) {
            return Ok(id);
        }
        self.check_frontiers()?;
        let id = self.next_global;
        self.next_global += 1;
        self.slots[id] = Some(Symbol {
            name: name.to_owned(),
            prim,
            kind,
            class: StorageClass::Global,
            size,
            end_label,
            offset: 0,
        });
        Ok(id)
    }

    /// Adds a local symbol with its frame offset, returning its slot index.
    /// The offset comes from the backend's `get_local_offset`.
    pub fn add_local(
        &mut self,
        name: &str,
        prim: PrimType,
        kind: StructuralKind,
        end_label: usize,
        size: usize,
        offset: i32,
    ) -> Result<usize, CompileError> {
        if let Some(id) = self.find_local(name) {
            return Ok(id);
        }
        self.check_frontiers()?;
        let id = self.next_local as usize;
        self.next_local -= 1;
        self.slots[id] = Some(Symbol {
            name: name.to_owned(),
            prim,
            kind,
            class: StorageClass::Local,
            size,
            end_label,
            offset,
        });
        Ok(id)
    }

    /// Discards the local region. Called after a function has been emitted;
    /// global symbols and slot indices already handed out for them remain
    /// valid for the rest of the compilation.
    pub fn free_locals(&mut self) {
        let low = (self.next_local + 1) as usize;
        for slot in &mut self.slots[low..] {
            *slot = None;
        }
        self.next_local = NSYMBOLS as isize - 1;
    }

    /// The invariant checked after every insertion: the global frontier may
    /// touch but never pass the local frontier.
    #[cfg(test)]
    fn frontiers_ok(&self) -> bool {
        (self.next_global as isize) <= self.next_local + 1
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_var(table: &mut SymbolTable, name: &str) -> usize {
        table
            .add_global(name, PrimType::Int, StructuralKind::Variable, 0, 1)
            .unwrap()
    }

    #[test]
    fn globals_grow_upward_and_locals_downward() {
        let mut t = SymbolTable::new();
        assert_eq!(add_var(&mut t, "a"), 0);
        assert_eq!(add_var(&mut t, "b"), 1);
        let l = t
            .add_local("x", PrimType::Int, StructuralKind::Variable, 0, 1, -4)
            .unwrap();
        assert_eq!(l, NSYMBOLS - 1);
        assert!(t.frontiers_ok());
    }

    #[test]
    fn duplicate_insert_returns_existing_slot() {
        let mut t = SymbolTable::new();
        let a = add_var(&mut t, "a");
        assert_eq!(add_var(&mut t, "a"), a);
    }

    #[test]
    fn find_prefers_locals_over_globals() {
        let mut t = SymbolTable::new();
        let g = add_var(&mut t, "x");
        let l = t
            .add_local("x", PrimType::Char, StructuralKind::Variable, 0, 1, -4)
            .unwrap();
        assert_eq!(t.find("x"), Some(l));
        t.free_locals();
        assert_eq!(t.find("x"), Some(g));
    }

    #[test]
    fn free_locals_resets_the_upper_region() {
        let mut t = SymbolTable::new();
        t.add_local("x", PrimType::Int, StructuralKind::Variable, 0, 1, -4)
            .unwrap();
        t.add_local("y", PrimType::Int, StructuralKind::Variable, 0, 1, -8)
            .unwrap();
        t.free_locals();
        assert_eq!(t.find_local("x"), None);
        let again = t
            .add_local("z", PrimType::Int, StructuralKind::Variable, 0, 1, -4)
            .unwrap();
        assert_eq!(again, NSYMBOLS - 1);
    }

    #[test]
    fn crossing_frontiers_is_fatal() {
        let mut t = SymbolTable::new();
        for i in 0..NSYMBOLS {
            add_var(&mut t, &format!("g{i}"));
            assert!(t.frontiers_ok());
        }
        assert!(matches!(
            t.add_global("overflow", PrimType::Int, StructuralKind::Variable, 0, 1),
            Err(CompileError::SymbolTableFull)
        ));
        assert!(matches!(
            t.add_local("l", PrimType::Int, StructuralKind::Variable, 0, 1, -4),
            Err(CompileError::SymbolTableFull)
        ));
    }
}
