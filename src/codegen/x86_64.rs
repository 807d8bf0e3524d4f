//! # x86-64 Backend (NASM Syntax)
//!
//! Target-specific code emission for x86-64. Scratch values live in the
//! caller-saved registers r8–r11, always treated as 64-bit; loads of `char`
//! and `int` zero-extend, stores narrow with BYTE/DWORD/QWORD operand sizes.
//! Global symbols are addressed RIP-relative via `lea [rel name]`, locals
//! through the frame pointer.
//!
//! Assemble and link the output with:
//! ```text
//! $ nasm -f elf64 out.asm -o out.o
//! $ gcc -no-pie out.o runtime.o -o out
//! ```

use std::fmt::Write;

use crate::ast::nodes::Op;
use crate::ast::types::PrimType;
use crate::codegen::backend::{Backend, Reg};
use crate::codegen::registers::RegisterPool;
use crate::compiler::error::CompileError;
use crate::compiler::symbols::{StorageClass, StructuralKind, Symbol};

const QWORD_REGISTERS: [&str; 4] = ["r8", "r9", "r10", "r11"];
const DWORD_REGISTERS: [&str; 4] = ["r8d", "r9d", "r10d", "r11d"];
const BYTE_REGISTERS: [&str; 4] = ["r8b", "r9b", "r10b", "r11b"];

/// The NASM x86-64 backend.
pub struct X86_64Backend {
    out: String,
    registers: RegisterPool,
    /// Bytes of local frame space handed out so far in the current function.
    local_offset: i32,
    /// 16-byte-aligned frame size reserved by the current prologue.
    stack_offset: i32,
}

impl X86_64Backend {
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

    /// Memory operand for a symbol: `[rel name]` addressing for globals,
    /// frame-pointer relative for locals.
    fn symbol_operand(&self, symbol: &Symbol) -> String {
        match symbol.class {
            StorageClass::Global => format!("[rel {}]", symbol.name),
            StorageClass::Local => format!("[rbp{}]", symbol.offset),
        }
    }

    /// Folds a pre/post increment or decrement into a symbol access.
    fn emit_inc_dec(&mut self, symbol: &Symbol, op: Op) {
        let mnemonic = match op {
            Op::PreIncrement | Op::PostIncrement => "inc",
            Op::PreDecrement | Op::PostDecrement => "dec",
            _ => return,
        };
        let width = match symbol.prim {
            PrimType::Char => "BYTE",
            PrimType::Int => "DWORD",
            _ => "QWORD",
        };
        let operand = self.symbol_operand(symbol);
        self.emit(format!("\t{mnemonic}\t{width} {operand}"));
    }

    /// Largest power-of-two alignment <= n, capped at 8.
    fn align_pow2(n: usize) -> usize {
        match n {
            8.. => 8,
            4.. => 4,
            2.. => 2,
            _ => 1,
        }
    }
}

impl Default for X86_64Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for X86_64Backend {
    fn reset_registers(&mut self) {
        self.registers.reset();
    }

    fn preamble(&mut self) {
        self.reset_registers();
        self.emit("\textern\tprintint");
        self.emit("\textern\tprintchar");
        self.emit("\textern\tprintstring");
        self.emit("\tsection\t.text");
    }

    fn postamble(&mut self) {
        // Functions carry their own epilogues
    }

    fn function_call(&mut self, reg: Reg, callee: &Symbol) -> Result<Reg, CompileError> {
        let out = self.registers.allocate()?;
        self.emit(format!("\tmov\trdi, {}", QWORD_REGISTERS[reg]));
        self.emit(format!("\tcall\t{}", callee.name));
        self.emit(format!("\tmov\t{}, rax", QWORD_REGISTERS[out]));
        self.registers.free(reg)?;
        Ok(out)
    }

    fn function_preamble(&mut self, function: &Symbol) {
        self.stack_offset = (self.local_offset + 15) & !15;
        self.emit("\tsection\t.text");
        self.emit(format!("\tglobal\t{}", function.name));
        self.emit(format!("{}:", function.name));
        self.emit("\tpush\trbp");
        self.emit("\tmov\trbp, rsp");
        if self.stack_offset > 0 {
            self.emit(format!("\tsub\trsp, {}", self.stack_offset));
        }
    }

    fn return_from_function(&mut self, reg: Reg, function: &Symbol) -> Result<(), CompileError> {
        match function.prim {
            PrimType::Char => self.emit(format!("\tmovzx\teax, {}", BYTE_REGISTERS[reg])),
            PrimType::Int => self.emit(format!("\tmov\teax, {}", DWORD_REGISTERS[reg])),
            PrimType::Long => self.emit(format!("\tmov\trax, {}", QWORD_REGISTERS[reg])),
            other => {
                return Err(CompileError::internal(format!(
                    "unsupported return type {other:?}"
                )));
            }
        }
        self.registers.free(reg)?;
        self.jump(function.end_label);
        Ok(())
    }

    fn function_postamble(&mut self, function: &Symbol) {
        self.label(function.end_label);
        if self.stack_offset > 0 {
            self.emit("\tmov\trsp, rbp");
        }
        self.emit("\tpop\trbp");
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

        self.emit("\tsection\t.bss");
        self.emit(format!("\talign\t{}", Self::align_pow2(element_size)));
        self.emit(format!("\tglobal\t{}", symbol.name));
        self.emit(format!("{}:", symbol.name));
        let directive = match element_size {
            1 => "resb",
            2 => "resw",
            4 => "resd",
            _ => "resq",
        };
        self.emit(format!("\t{directive}\t{count}"));
        Ok(())
    }

    fn declare_global_string(&mut self, label: usize, text: &str) {
        self.emit("\tsection\t.rodata");
        self.label(label);
        // NASM quoted strings carry no escapes; emit special bytes numerically
        let mut line = String::from("\tdb \"");
        for byte in text.bytes() {
            match byte {
                0x20..=0x7e if byte != b'"' && byte != b'\\' => line.push(byte as char),
                other => {
                    let _ = write!(line, "\", {other}, \"");
                }
            }
        }
        line.push_str("\", 0");
        self.emit(line);
    }

    fn load_immediate_int(&mut self, value: i64, _prim: PrimType) -> Result<Reg, CompileError> {
        let r = self.registers.allocate()?;
        self.emit(format!("\tmov\t{}, {}", QWORD_REGISTERS[r], value));
        Ok(r)
    }

    fn load_symbol(&mut self, symbol: &Symbol, op: Op) -> Result<Reg, CompileError> {
        let r = self.registers.allocate()?;
        let operand = self.symbol_operand(symbol);

        if matches!(op, Op::PreIncrement | Op::PreDecrement) {
            self.emit_inc_dec(symbol, op);
        }

        match symbol.prim {
            PrimType::Char => {
                self.emit(format!("\tmovzx\t{}, BYTE {}", QWORD_REGISTERS[r], operand));
            }
            PrimType::Int => {
                // A 32-bit mov zero-extends into the full register
                self.emit(format!("\tmov\t{}, DWORD {}", DWORD_REGISTERS[r], operand));
            }
            PrimType::Long
            | PrimType::VoidPtr
            | PrimType::CharPtr
            | PrimType::IntPtr
            | PrimType::LongPtr => {
                self.emit(format!("\tmov\t{}, QWORD {}", QWORD_REGISTERS[r], operand));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "cannot load value of type {other:?}"
                )));
            }
        }

        if matches!(op, Op::PostIncrement | Op::PostDecrement) {
            self.emit_inc_dec(symbol, op);
        }

        Ok(r)
    }

    fn load_global_string(&mut self, label: usize) -> Result<Reg, CompileError> {
        let r = self.registers.allocate()?;
        self.emit(format!("\tlea\t{}, [rel L{label}]", QWORD_REGISTERS[r]));
        Ok(r)
    }

    fn store_symbol(&mut self, reg: Reg, symbol: &Symbol) -> Result<Reg, CompileError> {
        let operand = self.symbol_operand(symbol);
        match symbol.prim {
            PrimType::Char => {
                self.emit(format!("\tmov\tBYTE {operand}, {}", BYTE_REGISTERS[reg]));
            }
            PrimType::Int => {
                self.emit(format!("\tmov\tDWORD {operand}, {}", DWORD_REGISTERS[reg]));
            }
            PrimType::Long
            | PrimType::VoidPtr
            | PrimType::CharPtr
            | PrimType::IntPtr
            | PrimType::LongPtr => {
                self.emit(format!("\tmov\tQWORD {operand}, {}", QWORD_REGISTERS[reg]));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "cannot store value of type {other:?}"
                )));
            }
        }
        Ok(reg)
    }

    fn address_of_symbol(&mut self, symbol: &Symbol) -> Result<Reg, CompileError> {
        let r = self.registers.allocate()?;
        match symbol.class {
            StorageClass::Global => {
                self.emit(format!("\tlea\t{}, [rel {}]", QWORD_REGISTERS[r], symbol.name));
            }
            StorageClass::Local => {
                self.emit(format!("\tlea\t{}, [rbp{}]", QWORD_REGISTERS[r], symbol.offset));
            }
        }
        Ok(r)
    }

    fn dereference_pointer(&mut self, reg: Reg, ptr_prim: PrimType) -> Result<Reg, CompileError> {
        match ptr_prim {
            PrimType::CharPtr => {
                self.emit(format!(
                    "\tmovzx\t{}, BYTE [{}]",
                    QWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
                ));
            }
            PrimType::IntPtr => {
                self.emit(format!(
                    "\tmov\t{}, DWORD [{}]",
                    DWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
                ));
            }
            PrimType::VoidPtr | PrimType::LongPtr => {
                self.emit(format!(
                    "\tmov\t{}, QWORD [{}]",
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
                    "\tmov\tBYTE [{}], {}",
                    QWORD_REGISTERS[ptr_reg], BYTE_REGISTERS[value_reg]
                ));
            }
            PrimType::Int => {
                self.emit(format!(
                    "\tmov\tDWORD [{}], {}",
                    QWORD_REGISTERS[ptr_reg], DWORD_REGISTERS[value_reg]
                ));
            }
            PrimType::Long => {
                self.emit(format!(
                    "\tmov\tQWORD [{}], {}",
                    QWORD_REGISTERS[ptr_reg], QWORD_REGISTERS[value_reg]
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
            "\tadd\t{}, {}",
            QWORD_REGISTERS[r2], QWORD_REGISTERS[r1]
        ));
        self.registers.free(r1)?;
        Ok(r2)
    }

    fn sub_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tsub\t{}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn mul_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\timul\t{}, {}",
            QWORD_REGISTERS[r2], QWORD_REGISTERS[r1]
        ));
        self.registers.free(r1)?;
        Ok(r2)
    }

    fn div_regs_signed(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!("\tmov\trax, {}", QWORD_REGISTERS[r1]));
        // Sign-extend rax into rdx:rax
        self.emit("\tcqo");
        self.emit(format!("\tidiv\t{}", QWORD_REGISTERS[r2]));
        self.emit(format!("\tmov\t{}, rax", QWORD_REGISTERS[r1]));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn shift_left_const(&mut self, reg: Reg, amount: u32) -> Reg {
        self.emit(format!("\tshl\t{}, {}", QWORD_REGISTERS[reg], amount));
        reg
    }

    fn shift_left_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        // Variable shifts take their count in cl
        self.emit(format!("\tmov\trcx, {}", QWORD_REGISTERS[r2]));
        self.emit(format!("\tshl\t{}, cl", QWORD_REGISTERS[r1]));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn shift_right_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!("\tmov\trcx, {}", QWORD_REGISTERS[r2]));
        self.emit(format!("\tshr\t{}, cl", QWORD_REGISTERS[r1]));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn negate(&mut self, reg: Reg) -> Reg {
        self.emit(format!("\tneg\t{}", QWORD_REGISTERS[reg]));
        reg
    }

    fn invert(&mut self, reg: Reg) -> Reg {
        self.emit(format!("\tnot\t{}", QWORD_REGISTERS[reg]));
        reg
    }

    fn logical_not(&mut self, reg: Reg) -> Reg {
        self.emit(format!(
            "\ttest\t{}, {}",
            QWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
        ));
        self.emit(format!("\tsete\t{}", BYTE_REGISTERS[reg]));
        self.emit(format!(
            "\tmovzx\t{}, {}",
            QWORD_REGISTERS[reg], BYTE_REGISTERS[reg]
        ));
        reg
    }

    fn bitwise_and_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tand\t{}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn bitwise_or_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\tor\t{}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn bitwise_xor_regs(&mut self, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        self.emit(format!(
            "\txor\t{}, {}",
            QWORD_REGISTERS[r1], QWORD_REGISTERS[r2]
        ));
        self.registers.free(r2)?;
        Ok(r1)
    }

    fn to_boolean(&mut self, reg: Reg, parent_op: Op, label: Option<usize>) -> Reg {
        self.emit(format!(
            "\ttest\t{}, {}",
            QWORD_REGISTERS[reg], QWORD_REGISTERS[reg]
        ));
        match (parent_op, label) {
            (Op::If | Op::While, Some(label)) => {
                self.emit(format!("\tje\tL{label}"));
            }
            _ => {
                self.emit(format!("\tsetnz\t{}", BYTE_REGISTERS[reg]));
                self.emit(format!(
                    "\tmovzx\t{}, {}",
                    QWORD_REGISTERS[reg], BYTE_REGISTERS[reg]
                ));
            }
        }
        reg
    }

    fn compare_and_set(&mut self, op: Op, r1: Reg, r2: Reg) -> Result<Reg, CompileError> {
        let set = match op {
            Op::Equal => "sete",
            Op::NotEqual => "setne",
            Op::LessThan => "setl",
            Op::LessEqual => "setle",
            Op::GreaterThan => "setg",
            Op::GreaterEqual => "setge",
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
        self.emit(format!("\t{set}\t{}", BYTE_REGISTERS[r2]));
        self.emit(format!(
            "\tmovzx\t{}, {}",
            QWORD_REGISTERS[r2], BYTE_REGISTERS[r2]
        ));
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
            Op::Equal => "jne",
            Op::NotEqual => "je",
            Op::LessThan => "jge",
            Op::LessEqual => "jg",
            Op::GreaterThan => "jle",
            Op::GreaterEqual => "jl",
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
        self.emit(format!("\tjmp\tL{label}"));
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
    fn char_load_zero_extends_and_store_narrows() {
        let mut b = X86_64Backend::new();
        let c = global("c", PrimType::Char);
        let r = b.load_symbol(&c, Op::Nothing).unwrap();
        b.store_symbol(r, &c).unwrap();
        let out = b.take_output();
        assert!(out.contains("movzx\tr8, BYTE [rel c]"));
        assert!(out.contains("mov\tBYTE [rel c], r8b"));
    }

    #[test]
    fn local_symbols_address_through_the_frame_pointer() {
        let mut b = X86_64Backend::new();
        let offset = b.get_local_offset(PrimType::Int);
        assert_eq!(offset, -4);
        let mut sym = global("a", PrimType::Int);
        sym.class = StorageClass::Local;
        sym.offset = offset;
        let r = b.load_symbol(&sym, Op::Nothing).unwrap();
        b.store_symbol(r, &sym).unwrap();
        let out = b.take_output();
        assert!(out.contains("mov\tr8d, DWORD [rbp-4]"));
        assert!(out.contains("mov\tDWORD [rbp-4], r8d"));
    }

    #[test]
    fn prologue_reserves_an_aligned_frame() {
        let mut b = X86_64Backend::new();
        b.reset_local_offset();
        b.get_local_offset(PrimType::Int);
        b.get_local_offset(PrimType::Long);
        let f = global("f", PrimType::Void);
        b.function_preamble(&f);
        let out = b.take_output();
        assert!(out.contains("push\trbp"));
        assert!(out.contains("mov\trbp, rsp"));
        // 4 + 8 bytes of locals round up to 16
        assert!(out.contains("sub\trsp, 16"));
    }

    #[test]
    fn array_declarations_reserve_element_count() {
        let mut b = X86_64Backend::new();
        let mut arr = global("arr", PrimType::Int);
        arr.kind = StructuralKind::Array;
        arr.size = 5;
        b.declare_global_symbol(&arr).unwrap();
        let out = b.take_output();
        assert!(out.contains("section\t.bss"));
        assert!(out.contains("align\t4"));
        assert!(out.contains("\tresd\t5"));
    }

    #[test]
    fn strings_escape_non_printable_bytes() {
        let mut b = X86_64Backend::new();
        b.declare_global_string(7, "hi\n");
        let out = b.take_output();
        assert!(out.contains("section\t.rodata"));
        assert!(out.contains("L7:"));
        assert!(out.contains("\tdb \"hi\", 10, \"\", 0"));
    }

    #[test]
    fn compare_and_jump_inverts_the_condition_and_resets_the_pool() {
        let mut b = X86_64Backend::new();
        let r1 = b.load_immediate_int(1, PrimType::Int).unwrap();
        let r2 = b.load_immediate_int(2, PrimType::Int).unwrap();
        b.compare_and_jump(Op::LessThan, r1, r2, 9).unwrap();
        assert!(b.registers.all_free());
        let out = b.take_output();
        assert!(out.contains("\tjge\tL9"));
    }

    #[test]
    fn division_routes_through_rax() {
        let mut b = X86_64Backend::new();
        let r1 = b.load_immediate_int(10, PrimType::Int).unwrap();
        let r2 = b.load_immediate_int(3, PrimType::Int).unwrap();
        let r = b.div_regs_signed(r1, r2).unwrap();
        assert_eq!(r, r1);
        let out = b.take_output();
        assert!(out.contains("\tcqo"));
        assert!(out.contains("\tidiv\tr9"));
    }
}
