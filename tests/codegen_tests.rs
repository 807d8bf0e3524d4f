//! End-to-end shape assertions on the emitted assembly: each test compiles
//! a complete source program in memory and checks the instruction sequence,
//! label ordering, and section directives the scenario requires.

use smallc::{CompileError, Target, compile};

/// Position of `needle` in `haystack`, panicking with context on a miss.
fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("missing `{needle}` in:\n{haystack}"))
}

/// Asserts each needle occurs, in the given order.
fn assert_ordered(asm: &str, needles: &[&str]) {
    let mut last = 0;
    for needle in needles {
        let at = asm[last..]
            .find(needle)
            .unwrap_or_else(|| panic!("missing or out of order `{needle}` in:\n{asm}"));
        last += at + needle.len();
    }
}

#[test]
fn constant_expression_store_and_return_branch() {
    // 2 * 3 evaluates before the addition of 1, the result stores to the
    // local, and the bare return branches to the end label
    let asm = compile(
        "void f() { int a; a = 1 + 2 * 3; return; }",
        Target::Nasm,
    )
    .unwrap();

    let mul = position(&asm, "\timul\tr10, r9");
    let add = position(&asm, "\tadd\tr10, r8");
    let store = position(&asm, "\tmov\tDWORD [rbp-4], r10d");
    assert!(mul < add && add < store);
    assert_ordered(&asm, &["f:", "\tjmp\tL1", "L1:", "\tret"]);
    // 4 bytes of locals round up to one 16-byte frame slice
    assert!(asm.contains("\tsub\trsp, 16"));
}

#[test]
fn byte_literal_stores_narrow_and_widens_on_return() {
    // 200 fits a char, so the store is byte-wide with no extension; the
    // return path re-loads with zero-extension into the return register
    let asm = compile("int g() { char c; c = 200; return(c); }", Target::Nasm).unwrap();

    assert!(asm.contains("\tmov\tr8, 200"));
    assert!(asm.contains("\tmov\tBYTE [rbp-4], r8b"));
    assert_ordered(
        &asm,
        &["\tmovzx\tr8, BYTE [rbp-4]", "\tmov\teax, r8d", "\tjmp\tL1"],
    );
}

#[test]
fn pointer_roundtrip_through_a_local() {
    let asm = compile(
        "int h() { int *p; int a; p = &a; *p = 7; return(*p); }",
        Target::Nasm,
    )
    .unwrap();

    // p at rbp-8, a at rbp-12
    assert_ordered(
        &asm,
        &[
            "\tlea\tr8, [rbp-12]",
            "\tmov\tQWORD [rbp-8], r8",
            // store of 7 through p
            "\tmov\tDWORD [r9], r8d",
            // dereference load on return
            "\tmov\tr8d, DWORD [r8]",
            "\tmov\teax, r8d",
        ],
    );
}

#[test]
fn array_store_loop_scales_and_jumps() {
    let asm = compile(
        "int arr[3];
         void k() { int i; i = 0; while (i < 3) { arr[i] = i; i = i + 1; } return; }",
        Target::Nasm,
    )
    .unwrap();

    // Global array storage: 3 dwords, naturally aligned
    assert_ordered(&asm, &["\tsection\t.bss", "\talign\t4", "arr:", "\tresd\t3"]);

    // Loop shape: start label, compare-jump-on-false to the end label,
    // array decay + scale by 4, backward jump, end label
    assert_ordered(
        &asm,
        &[
            "L2:",
            "\tjge\tL3",
            "\tlea\tr9, [rel arr]",
            "\tshl\tr10, 2",
            "\tjmp\tL2",
            "L3:",
        ],
    );
}

#[test]
fn if_else_lowers_to_false_and_end_labels() {
    let asm = compile(
        "int main() { if (1) { return(1); } else { return(0); } }",
        Target::Nasm,
    )
    .unwrap();

    // ToBoolean zero-test on the constant, conditional jump to the false
    // label, true block, jump to end, false block, end label
    assert_ordered(
        &asm,
        &[
            "\ttest\tr8, r8",
            "\tje\tL2",
            "\tmov\teax, r8d",
            "\tjmp\tL1",
            "\tjmp\tL3",
            "L2:",
            "\tmov\teax, r8d",
            "L3:",
        ],
    );
}

#[test]
fn assigning_a_pointer_to_an_integer_is_rejected() {
    let error = compile("void f() { int x; x = &x; }", Target::Nasm).unwrap_err();
    let message = error.to_string();
    assert!(message.contains("line 1"), "diagnostic was: {message}");
    assert!(matches!(error, CompileError::Type { .. }));
}

#[test]
fn string_literals_land_in_rodata_with_escaped_bytes() {
    let asm = compile(
        "void f() { printstring(\"hi\\n\"); return; }",
        Target::Nasm,
    )
    .unwrap();

    // The function's end label takes L1, so the string lands at L2
    assert_ordered(&asm, &["\tsection\t.rodata", "L2:", "\tdb \"hi\", 10, \"\", 0"]);
    // The call loads the label address and routes through rdi
    assert_ordered(&asm, &["\tlea\tr8, [rel L2]", "\tmov\trdi, r8", "\tcall\tprintstring"]);
}

#[test]
fn char_pointer_arithmetic_needs_no_scaling() {
    let asm = compile(
        "char buf[8];
         void f() { char *p; p = &buf; return; }",
        Target::Nasm,
    )
    .unwrap();
    assert!(asm.contains("\tresb\t8"));
    assert!(!asm.contains("\tshl"));
}

#[test]
fn division_and_shifts_emit_their_instructions() {
    let asm = compile(
        "int f() { int a; int b; a = 100 / 3; b = (a << 2) >> 1; return(a + b); }",
        Target::Nasm,
    )
    .unwrap();
    assert_ordered(&asm, &["\tcqo", "\tidiv\tr9"]);
    assert!(asm.contains("\tshl\tr8, cl"));
    assert!(asm.contains("\tshr\tr8, cl"));
}

#[test]
fn logical_operators_normalise_before_combining() {
    let asm = compile(
        "int f() { int a; a = 2; if (a && 4) { return(1); } return(0); }",
        Target::Nasm,
    )
    .unwrap();
    // Both operands pass through a truth test before the bitwise and
    assert!(asm.matches("\tsetnz\t").count() >= 2);
    assert!(asm.contains("\tand\t"));
}

#[test]
fn undeclared_identifier_is_a_fatal_diagnostic() {
    let error = compile("void f() { x = 1; }", Target::Nasm).unwrap_err();
    assert!(matches!(error, CompileError::UndeclaredIdentifier { .. }));
    assert!(error.to_string().contains("'x'"));
}

#[test]
fn missing_terminal_return_is_fatal() {
    let error = compile("int f() { int a; a = 1; }", Target::Nasm).unwrap_err();
    assert!(error.to_string().contains("return"));
}

#[test]
fn return_value_in_void_function_is_fatal() {
    let error = compile("void f() { return(1); }", Target::Nasm).unwrap_err();
    assert!(matches!(error, CompileError::Type { .. }));
}

#[test]
fn indexing_a_scalar_is_fatal() {
    let error = compile("int x; void f() { x[0] = 1; }", Target::Nasm).unwrap_err();
    assert!(error.to_string().contains("not an array"));
}

#[test]
fn calling_a_variable_is_fatal() {
    let error = compile("int x; void f() { x(1); }", Target::Nasm).unwrap_err();
    assert!(error.to_string().contains("not a function"));
}

#[test]
fn labels_are_unique_and_increasing() {
    let asm = compile(
        "int f() { int i; i = 0; while (i < 3) { i = i + 1; } if (i) { i = 0; } return(i); }",
        Target::Nasm,
    )
    .unwrap();
    let mut labels: Vec<usize> = asm
        .lines()
        .filter_map(|line| {
            line.strip_prefix('L')
                .and_then(|rest| rest.strip_suffix(':'))
                .and_then(|n| n.parse().ok())
        })
        .collect();
    let emitted = labels.clone();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), emitted.len(), "duplicate labels in:\n{asm}");
}

// --- AArch64 shapes ---

#[test]
fn aarch64_frames_and_branches() {
    let asm = compile(
        "void f() { int a; a = 1 + 2 * 3; return; }",
        Target::Aarch64,
    )
    .unwrap();

    assert_ordered(
        &asm,
        &[
            "\t.global\tf",
            "f:",
            "\tstp\tx29, x30, [sp, -16]!",
            "\tmov\tx29, sp",
            "\tsub\tsp, sp, #16",
            "\tb\tL1",
            "L1:",
            "\tldp\tx29, x30, [sp], 16",
            "\tret",
        ],
    );
    let mul = position(&asm, "\tmul\tx11, x11, x10");
    let add = position(&asm, "\tadd\tx11, x11, x9");
    assert!(mul < add);
}

#[test]
fn aarch64_globals_use_pc_relative_addressing() {
    let asm = compile(
        "long counter;
         void f() { counter = counter + 1; return; }",
        Target::Aarch64,
    )
    .unwrap();

    assert_ordered(&asm, &["\t.bss", "\t.global\tcounter", "\t.p2align\t3", "\t.zero\t8"]);
    assert_ordered(
        &asm,
        &["\tadrp\tx0, counter", "\tadd\tx0, x0, :lo12:counter", "\tldr\tx9, [x0]"],
    );
    // The addition lands in x10, which is what the store writes back
    assert!(asm.contains("\tstr\tx10, [x0]"));
}

#[test]
fn aarch64_loop_compare_inverts_the_branch() {
    let asm = compile(
        "int arr[3];
         void k() { int i; i = 0; while (i < 3) { arr[i] = i; i = i + 1; } return; }",
        Target::Aarch64,
    )
    .unwrap();

    assert_ordered(&asm, &["L2:", "\tbge\tL3", "\tlsl\tx11, x11, #2", "\tb\tL2", "L3:"]);
    assert!(asm.contains("\t.zero\t12"));
}

#[test]
fn aarch64_calls_route_through_x0() {
    let asm = compile("int x; void f() { printint(x); return; }", Target::Aarch64).unwrap();
    assert_ordered(&asm, &["\tmov\tx0, x9", "\tbl\tprintint", "\tmov\tx10, x0"]);
    assert!(asm.contains("\t.extern\tprintint"));
}

#[test]
fn both_targets_accept_the_same_program() {
    // Calls take exactly one argument expression, parameters or not
    let source = "int total;
int sum() { int i; total = 0; for (i = 1; i <= 10; i = i + 1) { total = total + i; } return(total); }
void main() { printint(sum(0)); return; }";
    compile(source, Target::Nasm).unwrap();
    compile(source, Target::Aarch64).unwrap();
}
