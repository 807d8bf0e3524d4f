//! # AArch64 Backend (GNU as Syntax)
//!
//! Target-specific code emission for AArch64. Scratch values live in the
//! caller-saved registers x9–x16, treated as 64-bit; narrow accesses use the
//! w-register views with `ldrb`/`strb` and 32-bit `ldr`/`str`. Global
//! symbols are addressed PC-relative through x0 (`adrp` + `:lo12:`); locals
//! are addressed off the frame pointer x29.
//!
//! Assemble and link the output with:
//! ```text
//! $ as out.asm -o out.o
//! $ gcc -no-pie out.o runtime.o -o out
//! ```

use crate::ast::nodes::Op;
use crate::ast::types::PrimType;
use crate::codegen::backend::{Backend, Reg};
use crate::codegen::registers::RegisterPool;
use crate::compiler::error::CompileError;
use crate::compiler::symbols::{StorageClass, StructuralKind, Symbol};

const QWORD_REGISTERS: [&str; 8] = ["x9", "x10", "x11", "x12", "x13", "x14", "x15", "x16"];
// Low 32-bit views; byte-wide loads and stores also take a w-register
const DWORD_REGISTERS: [&str; 8] = ["w9", "w10", "w11", "w12", "w13", "w14", "w15", "w16"];

/// The GNU as AArch64 backend.
pub struct Aarch64Backend {
    out: String,
    registers: RegisterPool,
    local_offset: i32,
    stack_offset: i32,
}

impl Aarch64Backend {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            registers: RegisterPool::new(QWORD_REGISTERS.len()),
            local_offset: 0,
            stack_offset: 0,
        }
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    /// Loads the address of a symbol into x0. Globals use PC-relative
    /// `adrp`/`:lo12:` addressing; locals are below the frame pointer.
    fn load_symbol_address_into_x0(&mut self, symbol: &Symbol) {
        match symbol.class {
            StorageClass::Global => {
                self.emit(format!("\tadrp\tx0, {}", symbol.name));
                self.emit(format!("\tadd\tx0, x0, :lo12:{}", symbol.name));
            }
            StorageClass::Local => {
                self.emit(format!("\tsub\tx0, x29, #{}", -symbol.offset));
            }
        }
    }

    /// Loads or stores through the address in x0 at the width of `prim`.
    fn memory_access(&mut self, load: bool, reg: Reg, prim: PrimType) -> Result<(), CompileError> {
        let (mnemonic_load, mnemonic_store, name): (&str, &str, &str) = match prim {
            PrimType::Char => ("ldrb", "strb", DWORD_REGISTERS[reg]),
            PrimType::Int => ("ldr", "str", DWORD_REGISTERS[reg]),
            PrimType::Long
            | PrimType::VoidPtr
            | PrimType::CharPtr
            | PrimType::IntPtr
            | PrimType::LongPtr => ("ldr", "str", QWORD_REGISTERS[reg]),
            other => {
                return Err(CompileError::internal(format!(
                    "no memory access width for {other:?}"
                )));
            }
        };
        let mnemonic = if load { mnemonic_load } else { mnemonic_store };
        self.emit(format!("\t{mnemonic}\t{name}, [x0]"));
        Ok(())
    }

    /// Adjusts a symbol in memory by +1/-1 for the increment and decrement
    /// operators, clobbering x1 as a scratch value.
    fn emit_inc_dec(&mut self, symbol: &Symbol, op: Op) -> Result<(), CompileError> {
        let mnemonic = match op {
            Op::PreIncrement | Op::PostIncrement => "add",
            Op::PreDecrement | Op::PostDecrement => "sub",
            _ => return Ok(()),
        };
        self.load_symbol_address_into_x0(symbol);
        let wide = symbol.prim.size() > 4;
        let scratch = if wide { "x1" } else { "w1" };
        let load = if symbol.prim == PrimType::Char { "ldrb" } else { "ldr" };
        let store = if symbol.prim == PrimType::Char { "strb" } else { "str" };
        self.emit(format!("\t{load}\t{scratch}, [x0]"));
        self.emit(format!("\t{mnemonic}\t{scratch}, {scratch}, #1"));
        self.emit(format!("\t{store}\t{scratch}, [x0]"));
        Ok(())
    }
}

impl Default for Aarch64Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Aarch64Backend {
    fn reset_registers(&mut self) {
        self.registers.reset();
    }

    fn preamble(&mut self) {
        self.reset_registers();
        self.emit("\t.text");
        self.emit("\t.extern\tprintint");
        self.emit("\t.extern\tprintchar");
        self.emit("\t.extern\tprintstring");
    }

    fn postamble(&mut self) {
        // Functions carry their own epilogues
    }

    fn function_call(&mut self, reg: Reg, callee: &Symbol) -> Result<Reg, CompileError> {
        let out = self.registers.allocate()?;
        self.emit(format!("\tmov\tx0, {}", QWORD_REGISTERS[reg]));
        self.emit(format!("\tbl\t{}", callee.name));
        self.emit(format!("\tmov\t{}, x0", QWORD_REGISTERS[out]));
        self.registers.free(reg)?;
        Ok(out)
    }

    fn function_preamble(&mut self, function: &Symbol) {
        // Keep 16-byte stack alignment for the local frame
        self.stack_offset = (self.local_offset + 15) & !15;
        self.emit("\t.text");
        self.emit(format!("\t.global\t{}", function.name));
        self.emit(format!("{}:", function.name));
        self.emit("\tstp\tx29, x30, [sp, -16]!");
        self.emit("\tmov\tx29, sp");
        if self.stack_offset > 0 {
            self.emit(format!("\tsub\tsp, sp, #{}", self.stack_offset));
        }
    }

    fn return_from_function(&mut self, reg: Reg, function: &Symbol) -> Result<(), CompileError> {
        match function.prim {
            PrimType::Char | PrimType::Int => {
                self.emit(format!("\tmov\tw0, {}", DWORD_REGISTERS[reg]));
            }
            PrimType::Long => {
                self.emit(format!("\tmov\tx0, {}", QWORD_REGISTERS[reg]));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "unsupported return type {other:?}"
                )));
            }
        }
        self.registers.free(reg)?;
        self.emit(format!("\tb\tL{}", function.end_label));
        Ok(())
    }

    fn function_postamble(&mut self, function: &Symbol) {
        self.label(function.end_label);
        // Discard local stack space before restoring the frame
        self.emit("\tmov\tsp, x29");
        self.emit("\tldp\tx29, x30, [sp], 16");
        self.emit("\tret");
    }

    fn reset_local_offset(&mut self) {
        self.local_offset = 0;
        self.stack_offset = 0;
    }

    fn get_local_offset(&mut self, prim: PrimType) -> i32 {
        // Locals keep at least 4-byte slots
        let size = prim.size().max(4) as i32;
        self.local_offset += size;
        -self.local_offset
    }

    fn declare_global_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        let element_size = symbol.prim.size();
        if element_size == 0 {
            return Err(CompileError::internal(format!(
                "global '{}' has no storage size",
                symbol.name
            )));
        }
        let count = if symbol.kind == StructuralKind::Array {
            symbol.size
        } else {
            1
        };
        if count == 0 || count > i32::MAX as usize / element_size {
            return Err(CompileError::internal(format!(
                "bad element count {count} for global '{}'",
                symbol.name
            )));
        }

        // log2 of the natural alignment, for .p2align
        let p2 = element_size.min(8).trailing_zeros();
        self.emit("\t.bss");
        self.emit(format!("\t.global\t{}", symbol.name));
        self.emit(format!("\t.p2align\t{p2}"));
        self.emit(format!("{}:", symbol.name));
        self.emit(format!("\t.zero\t{}", element_size * count));
        Ok(())
    }

    fn declare_global_string(&mut self, label: usize, text: &str) {
        self.emit("\t.section\t.rodata");
        self.label(label);
        // Emit printable runs as .ascii and everything else as raw bytes
        let mut run = String::new();
        for byte in text.bytes() {
            match byte {
                0x20..=0x7e if byte != b'"' && byte != b'\\' => run.push(byte as char),
                other => {
                    if !run.is_empty() {
                        self.emit(format!("\t.ascii\t\"{run}\""));
                        run = String::new();
                    }
                    self.emit(format!("\t.byte\t{other}"));
                }
            }
        }
        if !run.is_empty() {
            self.emit(format!("\t.ascii\t\"{run}\""));
        }
        self.emit("\t.byte\t0");
    }

    fn load_immediate_int(&mut self, value: i64, _prim: PrimType) -> Result<Reg, CompileError> {
        let r = self.registers.allocate()?;
        self.emit(format!("\tmov\t{}, #{}", QWORD_REGISTERS[r], value));
        Ok(r)
    }

    fn load_symbol(&mut self, symbol: &Symbol, op: Op) -> Result<Reg, CompileError> {
        if matches!(op, Op::PreIncrement | Op::PreDecrement) {
            self.emit_inc_dec(symbol, op)?;
        }

        let r = self.registers.allocate()?;
        self.load_symbol_address_into_x0(symbol);
        self.memory_access(true, r, symbol.prim)?;

        if matches!(op, Op::PostIncrement | Op::PostDecrement) {
            self.emit_inc_dec(symbol, op)?;
        }
        Ok(r)
    }

    fn load_global_string(&mut self, label: usize) -> Result<Reg, CompileError> {
        let r = self.registers.allocate()?;
        self.emit(format!("\tadrp\t{}, L{label}", QWORD_REGISTERS[r]));
        self.emit(format!(
            "\tadd\t{}, {}, :lo12:L{label}",
            QWORD_REGISTERS[r], QWORD_REGISTERS[r]
        ));
        Ok(r)
    }

    fn store_symbol(&mut self, reg: Reg, symbol: &Symbol) -> Result<Reg, CompileError> {
        self.load_symbol_address_into_x0(symbol);
        self.memory_access(false, reg, symbol.prim)?;
        Ok(reg)
    }

    fn address_of_symbol(&mut self, symbol: &Symbol) -> Result<Reg, CompileError> {
        let r = self.registers.allocate()?;
        match symbol.class {
            StorageClass::Global => {
                self.emit(format!("\tadrp\t{}, {}", QWORD_REGISTERS[r], symbol.name));
                self.emit(format!(
                    "\tadd\t{}, {}, :lo12:{}",
                    QWORD_REGISTERS[r], QWORD_REGISTERS[r], symbol.name
                ));
            }
            StorageClass::Local => {
                self.emit(format!(
                    "\tsub\t{}, x29, #{}",
                    QWORD_REGISTERS[r],
                    -symbol.offset
                ));
            }
        }
        Ok(r)
    }

    fn dereference_pointer(&mut self, reg: Reg, ptr_prim: PrimType) -> Result<Reg, CompileError> {
        match ptr_prim {
            PrimType::CharPtr => {
                self.emit(format!(
                    "\tldrb\t{}, [{}]",
                    DWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
                ));
            }
            PrimType::IntPtr => {
                self.emit(format!(
                    "\tldr\t{}, [{}]",
                    DWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
                ));
            }
            PrimType::VoidPtr | PrimType::LongPtr => {
                self.emit(format!(
                    "\tldr\t{}, [{}]",
                    QWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
                ));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "cannot dereference {other:?}"
                )));
            }
        }
        Ok(reg)
    }

    fn store_dereferenced_pointer(
        &mut self,
        value_reg: Reg,
        ptr_reg: Reg,
        pointee: PrimType,
    ) -> Result<Reg, CompileError> {
        match pointee {
            PrimType::Char => {
                self.emit(format!(
                    "\tstrb\t{}, [{}]",
                    DWORD_REGISTERS[value_reg], QWORD_REGISTERS[ptr_reg]
                ));
            }
            PrimType::Int => {
                self.emit(format!(
                    "\tstr\t{}, [{}]",
                    DWORD_REGISTERS[value_reg], QWORD_REGISTERS[ptr_reg]
                ));
            }
            PrimType::Long => {
                self.emit(format!(
                    "\tstr\t{}, [{}]",
                    QWORD_REGISTERS[value_reg], QWORD_REGISTERS[ptr_reg]
                ));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "cannot store through pointer to {other:?}"
                )));
            }
        }
        self.registers.free(ptr_reg)?;
        Ok(value_reg)
    }

    fn add_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tadd\t{}, {}, {}",
            QWORD_REGISTERS[r2], QWORD_REGISTERS[r2], QWORD_REGISTERS[r1]
        ));
        self.registers.free(r1)?;
        Ok(r2)
    }

    fn sub_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tsub\t{}, {}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn mul_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tmul\t{}, {}, {}",
            QWORD_REGISTERS[r2], QWORD_REGISTERS[r2], QWORD_REGISTERS[r1]
        ));
        self.registers.free(r1)?;
        Ok(r2)
    }

    fn div_regs_signed(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tsdiv\t{}, {}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn shift_left_const(&mut self, reg: Reg, amount: u32) -> Reg {
        self.emit(format!(
            "\tlsl\t{}, {}, #{}",
            QWORD_REGISTERS[reg], QWORD_REGISTERS[reg], amount
        ));
        reg
    }

    fn shift_left_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tlsl\t{}, {}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn shift_right_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tlsr\t{}, {}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn negate(&mut self, reg: Reg) -> Reg {
        self.emit(format!(
            "\tneg\t{}, {}",
            QWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
        ));
        reg
    }

    fn invert(&mut self, reg: Reg) -> Reg {
        self.emit(format!(
            "\tmvn\t{}, {}",
            QWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
        ));
        reg
    }

    fn logical_not(&mut self, reg: Reg) -> Reg {
        self.emit(format!("\tcmp\t{}, #0", QWORD_REGISTERS[reg]));
        self.emit(format!("\tcset\t{}, eq", DWORD_REGISTERS[reg]));
        reg
    }

    fn bitwise_and_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tand\t{}, {}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn bitwise_or_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\torr\t{}, {}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn bitwise_xor_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\teor\t{}, {}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn to_boolean(&mut self, reg: Reg, parent_op: Op, label: Option<usize>) -> Reg {
        self.emit(format!("\tcmp\t{}, #0", QWORD_REGISTERS[reg]));
        match (parent_op, label) {
            (Op::If | Op::While, Some(label)) => {
                self.emit(format!("\tbeq\tL{label}"));
            }
            _ => {
                self.emit(format!("\tcset\t{}, ne", DWORD_REGISTERS[reg]));
            }
        }
        reg
    }

    fn compare_and_set(&mut self, op: Op, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        let condition = match op {
            Op::Equal => "eq",
            Op::NotEqual => "ne",
            Op::LessThan => "lt",
            Op::LessEqual => "le",
            Op::GreaterThan => "gt",
            Op::GreaterEqual => "ge",
            other => {
                return Err(CompileError::internal(format!(
                    "{other:?} is not a comparison"
                )));
            }
        };
        self.emit(format!(
            "\tcmp\t{}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        // cset on the w-register zeroes the high bits of the x-register
        self.emit(format!("\tcset\t{}, {condition}", DWORD_REGISTERS[r2]));
        self.registers.free(r1)?;
        Ok(r2)
    }

    fn compare_and_jump(
        &mut self,
        op: Op,
        r1: Reg,
        r2: Reg,
        label: usize,
    ) -> Result<(), CompileError> {
        // Jump when the condition is FALSE
        let branch = match op {
            Op::Equal => "bne",
            Op::NotEqual => "beq",
            Op::LessThan => "bge",
            Op::LessEqual => "bgt",
            Op::GreaterThan => "ble",
            Op::GreaterEqual => "blt",
            other => {
                return Err(CompileError::internal(format!(
                    "{other:?} is not a comparison"
                )));
            }
        };
        self.emit(format!(
            "\tcmp\t{}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.emit(format!("\t{branch}\tL{label}"));
        self.reset_registers();
        Ok(())
    }

    fn label(&mut self, label: usize) {
        self.emit(format!("L{label}:"));
    }

    fn jump(&mut self, label: usize) {
        self.emit(format!("\tb\tL{label}"));
    }

    fn widen_primitive_type(&mut self, reg: Reg, _old: PrimType, _new: PrimType) -> Reg {
        // Scratch values are already 64-bit
        reg
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: &str, prim: PrimType) -> Symbol {
        Symbol {
            name: name.into(),
            prim,
            kind: StructuralKind::Variable,
            class: StorageClass::Global,
            size: 1,
            end_label: 0,
            offset: 0,
        }
    }

    #[test]
    fn globals_load_pc_relative_through_x0() {
        let mut b = Aarch64Backend::new();
        let sym = global("counter", PrimType::Long);
        b.load_symbol(&sym, Op::Nothing).unwrap();
        let out = b.take_output();
        assert!(out.contains("adrp\tx0, counter"));
        assert!(out.contains("add\tx0, x0, :lo12:counter"));
        assert!(out.contains("ldr\tx9, [x0]"));
    }

    #[test]
    fn char_accesses_use_byte_width() {
        let mut b = Aarch64Backend::new();
        let sym = global("c", PrimType::Char);
        let r = b.load_symbol(&sym, Op::Nothing).unwrap();
        b.store_symbol(r, &sym).unwrap();
        let out = b.take_output();
        assert!(out.contains("ldrb\tw9, [x0]"));
        assert!(out.contains("strb\tw9, [x0]"));
    }

    #[test]
    fn frame_is_established_and_torn_down() {
        let mut b = Aarch64Backend::new();
        b.reset_local_offset();
        b.get_local_offset(PrimType::Long);
        let mut f = global("f", PrimType::Void);
        f.end_label = 4;
        b.function_preamble(&f);
        b.function_postamble(&f);
        let out = b.take_output();
        assert!(out.contains("stp\tx29, x30, [sp, -16]!"));
        assert!(out.contains("mov\tx29, sp"));
        assert!(out.contains("sub\tsp, sp, #16"));
        assert!(out.contains("L4:"));
        assert!(out.contains("ldp\tx29, x30, [sp], 16"));
    }

    #[test]
    fn globals_reserve_zeroed_storage() {
        let mut b = Aarch64Backend::new();
        let mut arr = global("arr", PrimType::Int);
        arr.kind = StructuralKind::Array;
        arr.size = 3;
        b.declare_global_symbol(&arr).unwrap();
        let out = b.take_output();
        assert!(out.contains("\t.bss"));
        assert!(out.contains("\t.p2align\t2"));
        assert!(out.contains("\t.zero\t12"));
    }

    #[test]
    fn strings_split_printable_runs_and_raw_bytes() {
        let mut b = Aarch64Backend::new();
        b.declare_global_string(5, "ok\n");
        let out = b.take_output();
        assert!(out.contains("L5:"));
        assert!(out.contains("\t.ascii\t\"ok\""));
        assert!(out.contains("\t.byte\t10"));
        assert!(out.ends_with("\t.byte\t0\n"));
    }

    #[test]
    fn compare_and_jump_inverts_the_condition() {
        let mut b = Aarch64Backend::new();
        let r1 = b.load_immediate_int(1, PrimType::Int).unwrap();
        let r2 = b.load_immediate_int(2, PrimType::Int).unwrap();
        b.compare_and_jump(Op::Equal, r1, r2, 3).unwrap();
        assert!(b.registers.all_free());
        let out = b.take_output();
        assert!(out.contains("\tbne\tL3"));
    }
}
