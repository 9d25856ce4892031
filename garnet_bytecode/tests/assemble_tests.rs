//! Integration tests for the assemble → finalize → decode → verify cycle.
//!
//! These tests drive the public surface the way a code generator would:
//! sequential appends, label binding, a single finalize, and then decoding
//! and listing verification of the result.

use garnet_bytecode::{CodeObject, DecodedInstr, Opcode, disassemble};
use garnet_core::{GarnetError, GarnetResult, Value};

// =============================================================================
// Test Helpers
// =============================================================================

/// Decode a code object into (opcode name, resolved value) pairs.
fn decoded_pairs(co: &CodeObject) -> Vec<(&'static str, Option<Value>)> {
    co.cursor()
        .collect::<GarnetResult<Vec<DecodedInstr>>>()
        .expect("decoding failed")
        .into_iter()
        .map(|i| (i.opcode.name(), i.value))
        .collect()
}

/// Assemble a counting loop: `i = 10; while 0 < i: i = i - 1; return i`.
fn counting_loop() -> CodeObject {
    let mut co = CodeObject::new();
    co.declare_local("i").unwrap();

    let top = co.new_label();
    let done = co.new_label();

    co.append_arg("LOAD_CONST", 10).unwrap();
    co.append_arg("STORE_FAST", "i").unwrap();
    co.bind_label(top).unwrap();
    co.append_arg("LOAD_CONST", 0).unwrap();
    co.append_arg("LOAD_FAST", "i").unwrap();
    co.append_arg("COMPARE_OP", "<").unwrap();
    co.append_arg("POP_JUMP_IF_FALSE", done).unwrap();
    co.append_arg("LOAD_FAST", "i").unwrap();
    co.append_arg("LOAD_CONST", 1).unwrap();
    co.append("BINARY_SUBTRACT").unwrap();
    co.append_arg("STORE_FAST", "i").unwrap();
    co.append_arg("JUMP_ABSOLUTE", top).unwrap();
    co.bind_label(done).unwrap();
    co.append_arg("LOAD_FAST", "i").unwrap();
    co.append("RETURN_VALUE").unwrap();

    co.finalize().unwrap();
    co
}

// =============================================================================
// Round-Trip Properties
// =============================================================================

#[test]
fn test_simple_roundtrip() {
    let mut co = CodeObject::new();
    co.append_arg("LOAD_CONST", 42).unwrap();
    co.append("RETURN_VALUE").unwrap();
    co.finalize().unwrap();

    assert_eq!(
        decoded_pairs(&co),
        vec![
            ("LOAD_CONST", Some(Value::Int(42))),
            ("RETURN_VALUE", None),
        ]
    );
    assert_eq!(co.consts(), &[Value::None, Value::Int(42)]);
}

#[test]
fn test_loop_roundtrip() {
    let co = counting_loop();
    let pairs = decoded_pairs(&co);

    let names: Vec<_> = pairs.iter().map(|(n, _)| *n).collect();
    assert_eq!(
        names,
        vec![
            "LOAD_CONST",
            "STORE_FAST",
            "LOAD_CONST",
            "LOAD_FAST",
            "COMPARE_OP",
            "POP_JUMP_IF_FALSE",
            "LOAD_FAST",
            "LOAD_CONST",
            "BINARY_SUBTRACT",
            "STORE_FAST",
            "JUMP_ABSOLUTE",
            "LOAD_FAST",
            "RETURN_VALUE",
        ]
    );
    assert_eq!(pairs[4].1, Some(Value::str("<")));
    assert_eq!(co.locals().len(), 1);
    // 10, 0 and 1 join the None sentinel.
    assert_eq!(co.consts().len(), 4);
}

#[test]
fn test_loop_jump_targets() {
    let co = counting_loop();
    let instrs: Vec<DecodedInstr> = co.cursor().collect::<GarnetResult<_>>().unwrap();

    // The backward jump lands on the loop head (offset of the second
    // LOAD_CONST); the conditional jump lands just past it.
    let top = instrs[2].offset as u32;
    let done = instrs[11].offset as u32;

    let absolute = instrs
        .iter()
        .find(|i| i.opcode == Opcode::JumpAbsolute)
        .unwrap();
    assert_eq!(absolute.index, Some(top));

    let conditional = instrs
        .iter()
        .find(|i| i.opcode == Opcode::PopJumpIfFalse)
        .unwrap();
    assert_eq!(conditional.index, Some(done));
}

#[test]
fn test_finalize_idempotence_is_byte_identical() {
    let mut co = counting_loop();
    let sealed = co.code().to_vec();
    co.finalize().unwrap();
    assert_eq!(co.code(), &sealed[..]);
}

#[test]
fn test_extended_arg_roundtrip() {
    for wide in [0x1_0000u32, 0xFF_FFFFu32] {
        let mut co = CodeObject::new();
        co.append_arg("BUILD_TUPLE", wide).unwrap();
        co.finalize().unwrap();

        let instrs: Vec<DecodedInstr> = co.cursor().collect::<GarnetResult<_>>().unwrap();
        assert_eq!(instrs.len(), 1);
        assert_eq!(instrs[0].index, Some(wide));
    }
}

// =============================================================================
// Table Deduplication
// =============================================================================

#[test]
fn test_dedup_across_append_calls() {
    let mut co = CodeObject::new();
    co.append_arg("LOAD_CONST", 7).unwrap();
    co.append_arg("LOAD_CONST", 7).unwrap();
    co.append_arg("LOAD_GLOBAL", "print").unwrap();
    co.append_arg("LOAD_GLOBAL", "print").unwrap();
    co.finalize().unwrap();

    assert_eq!(co.consts().len(), 2);
    assert_eq!(co.names().len(), 1);

    let instrs: Vec<DecodedInstr> = co.cursor().collect::<GarnetResult<_>>().unwrap();
    assert_eq!(instrs[0].index, instrs[1].index);
    assert_eq!(instrs[2].index, instrs[3].index);
}

// =============================================================================
// Closure Variables
// =============================================================================

#[test]
fn test_closure_slots_after_late_cell_declarations() {
    let mut co = CodeObject::new();
    co.append_arg("LOAD_DEREF", "outer_a").unwrap();
    co.append_arg("LOAD_DEREF", "outer_b").unwrap();
    co.declare_cellvar("captured").unwrap();
    co.append_arg("LOAD_DEREF", "captured").unwrap();
    co.finalize().unwrap();

    let instrs: Vec<DecodedInstr> = co.cursor().collect::<GarnetResult<_>>().unwrap();
    // One cellvar shifts both freevars up by one.
    assert_eq!(instrs[0].index, Some(1));
    assert_eq!(instrs[0].value, Some(Value::str("outer_a")));
    assert_eq!(instrs[1].index, Some(2));
    assert_eq!(instrs[1].value, Some(Value::str("outer_b")));
    assert_eq!(instrs[2].index, Some(0));
    assert_eq!(instrs[2].value, Some(Value::str("captured")));
}

// =============================================================================
// Failure Modes
// =============================================================================

#[test]
fn test_return_value_rejects_operand() {
    let mut co = CodeObject::new();
    let err = co.append_arg("RETURN_VALUE", 1).unwrap_err();
    assert!(matches!(err, GarnetError::OperandArity { .. }));
}

#[test]
fn test_relative_jump_out_of_range() {
    let mut co = CodeObject::new();
    let far = co.new_label();
    co.append_arg("JUMP_FORWARD", far).unwrap();
    for _ in 0..70_000 {
        co.append("NOP").unwrap();
    }
    co.bind_label(far).unwrap();

    let err = co.finalize().unwrap_err();
    assert!(matches!(err, GarnetError::JumpRange { .. }));
    assert!(!co.is_finalized());
}

#[test]
fn test_truncated_decode() {
    let mut co = CodeObject::new();
    co.append_arg("CALL_FUNCTION", 0x20u32).unwrap();
    co.finalize().unwrap();

    // Restarting one byte in reads LOAD_CONST with a single trailing byte.
    let err = co.cursor_at(1).next().unwrap().unwrap_err();
    assert!(matches!(err, GarnetError::TruncatedStream { .. }));
}

// =============================================================================
// Listing Verification
// =============================================================================

#[test]
fn test_verify_loop_listing() {
    let co = counting_loop();
    co.check_assembly(
        "
        LOAD_CONST        1 (10)
        STORE_FAST        0 (i)
        LOAD_CONST        2 (0)
        LOAD_FAST         0 (i)
        COMPARE_OP        0 (<)
        POP_JUMP_IF_FALSE
        LOAD_FAST         0 (i)
        LOAD_CONST        3 (1)
        BINARY_SUBTRACT
        STORE_FAST        0 (i)
        JUMP_ABSOLUTE     6
        LOAD_FAST         0 (i)
        RETURN_VALUE
        ",
    )
    .unwrap();
}

#[test]
fn test_verify_partial_listing() {
    let co = counting_loop();
    co.check_assembly("LOAD_CONST 1 (10)\nSTORE_FAST 0 (i)").unwrap();
}

#[test]
fn test_verify_with_offsets() {
    let co = counting_loop();
    co.check_assembly("1 0 LOAD_CONST 1 (10)\n2 3 STORE_FAST 0 (i)")
        .unwrap();
}

#[test]
fn test_disassembly_reverifies() {
    for co in [counting_loop(), {
        let mut co = CodeObject::new();
        co.declare_cellvar("n").unwrap();
        co.append_arg("LOAD_DEREF", "n").unwrap();
        co.append_arg("LOAD_CONST", "step").unwrap();
        co.append("BINARY_ADD").unwrap();
        co.append("RETURN_VALUE").unwrap();
        co.finalize().unwrap();
        co
    }] {
        let listing = disassemble(&co);
        let body = listing
            .split("Disassembly:")
            .nth(1)
            .expect("listing has a disassembly section");
        co.check_assembly(body).unwrap();
    }
}
