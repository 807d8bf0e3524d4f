//! # Backend Contract
//!
//! The fixed operation table every target must provide to plug into the
//! target-agnostic generator. Each operation emits assembly text into the
//! backend's output buffer and returns the index of the register holding its
//! result, freeing consumed operand registers as documented.
//!
//! Observable guarantees shared by all backends:
//!
//! - Scratch registers are caller-saved in the target ABI; no scratch value
//!   survives a `function_call`, and the pool is fully reset after
//!   `compare_and_jump` and after each top-level statement.
//! - Integer values are materialised as 64-bit scratch values; narrow loads
//!   zero-extend and stores narrow on the memory side.
//! - Scalar globals live zero-initialised in `.bss`, aligned to their
//!   natural size; string literals live in `.rodata` at `L<n>` labels.

use crate::ast::nodes::Op;
use crate::ast::types::PrimType;
use crate::compiler::error::CompileError;
use crate::compiler::symbols::Symbol;

/// A scratch register index within the backend's pool.
pub type Reg = usize;

/// The operation table implemented by each target backend.
///
/// Dispatch happens through a `Box<dyn Backend>` selected once at startup.
pub trait Backend {
    // Register pool

    /// Marks every scratch register free.
    fn reset_registers(&mut self);

    // Whole-file preamble / postamble

    /// Emits the output prologue: runtime externs and the text section.
    fn preamble(&mut self);

    /// Emits the output epilogue, if the target needs one.
    fn postamble(&mut self);

    // Functions

    /// Places the argument in the first argument register, calls the
    /// function, and returns a fresh register holding the return value.
    /// Frees the argument register.
    fn function_call(&mut self, reg: Reg, callee: &Symbol) -> Result<Reg, CompileError>;

    /// Emits the function label and prologue, reserving the 16-byte-aligned
    /// local frame accumulated through `get_local_offset`.
    fn function_preamble(&mut self, function: &Symbol);

    /// Moves the value into the ABI return register and jumps to the
    /// function's end label. Frees the value register.
    fn return_from_function(&mut self, reg: Reg, function: &Symbol) -> Result<(), CompileError>;

    /// Emits the function's end label and epilogue.
    fn function_postamble(&mut self, function: &Symbol);

    // Local frame bookkeeping

    /// Resets per-function local offset tracking. Called at function entry.
    fn reset_local_offset(&mut self);

    /// Reserves frame space for a local of the given type and returns its
    /// (negative) offset from the frame pointer.
    fn get_local_offset(&mut self, prim: PrimType) -> i32;

    // Global data

    /// Reserves zero-initialised, naturally aligned storage for a global
    /// variable or array.
    fn declare_global_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError>;

    /// Emits a NUL-terminated string constant in read-only data at `L<label>`,
    /// escaping non-printable bytes as numeric octets.
    fn declare_global_string(&mut self, label: usize, text: &str);

    // Loads and stores

    /// Loads an integer constant into a fresh register.
    fn load_immediate_int(&mut self, value: i64, prim: PrimType) -> Result<Reg, CompileError>;

    /// Loads a symbol's value into a fresh register, zero-extending narrow
    /// types. `op` folds a pre/post increment or decrement into the access;
    /// any other operator is a plain load.
    fn load_symbol(&mut self, symbol: &Symbol, op: Op) -> Result<Reg, CompileError>;

    /// Loads the address of the string constant at `L<label>`.
    fn load_global_string(&mut self, label: usize) -> Result<Reg, CompileError>;

    /// Stores a register into a symbol, narrowing on the memory side.
    /// Returns the same register, still live.
    fn store_symbol(&mut self, reg: Reg, symbol: &Symbol) -> Result<Reg, CompileError>;

    /// Loads the address of a symbol into a fresh register.
    fn address_of_symbol(&mut self, symbol: &Symbol) -> Result<Reg, CompileError>;

    /// Loads the value a pointer register points at, replacing the pointer.
    /// `ptr_prim` is the pointer's own type and selects the load width.
    fn dereference_pointer(&mut self, reg: Reg, ptr_prim: PrimType) -> Result<Reg, CompileError>;

    /// Stores `value_reg` through the pointer in `ptr_reg`. `pointee` selects
    /// the store width. Returns `value_reg`, still live; frees `ptr_reg`.
    fn store_dereferenced_pointer(
        &mut self,
        value_reg: Reg,
        ptr_reg: Reg,
        pointee: PrimType,
    ) -> Result<Reg, CompileError>;

    // Arithmetic: two-register operations free one operand and return the
    // other holding the result.

    fn add_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;
    fn sub_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;
    fn mul_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;
    fn div_regs_signed(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;

    // Shifts

    /// Shifts a register left by a constant number of bits.
    fn shift_left_const(&mut self, reg: Reg, amount: u32) -> Reg;
    fn shift_left_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;
    fn shift_right_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;

    // Unary operations, in place

    fn negate(&mut self, reg: Reg) -> Reg;
    fn invert(&mut self, reg: Reg) -> Reg;
    fn logical_not(&mut self, reg: Reg) -> Reg;

    // Bitwise binaries

    fn bitwise_and_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;
    fn bitwise_or_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;
    fn bitwise_xor_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;

    /// Tests a register for truth. Under an `If`/`While` parent this emits a
    /// conditional jump to `label` when the value is zero; otherwise it
    /// normalises the register to 0/1.
    fn to_boolean(&mut self, reg: Reg, parent_op: Op, label: Option<usize>) -> Reg;

    // Comparisons

    /// Compares two registers and materialises 0/1 in the returned register.
    fn compare_and_set(&mut self, op: Op, r1: Reg, r2: Reg) -> Result<Reg, CompileError>;

    /// Compares two registers and jumps to `label` when the comparison is
    /// false. Resets the register pool.
    fn compare_and_jump(
        &mut self,
        op: Op,
        r1: Reg,
        r2: Reg,
        label: usize,
    ) -> Result<(), CompileError>;

    // Control flow helpers

    /// Emits `L<label>:`.
    fn label(&mut self, label: usize);

    /// Emits an unconditional jump to `L<label>`.
    fn jump(&mut self, label: usize);

    // Types

    /// Hook for widening a narrow integer already in a register. A no-op on
    /// both current targets, where scratch values are always 64-bit.
    fn widen_primitive_type(&mut self, reg: Reg, old: PrimType, new: PrimType) -> Reg;

    /// Drains the assembly emitted so far.
    fn take_output(&mut self) -> String;
}
