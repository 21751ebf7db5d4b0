//! Interpreter behavior tests over whole modules.

use super::instantiate;
use crate::{
    Error, Module, ModuleInstance, NopExternals, StackLimits, TrapCode, Value, F32, F64,
};
use alloc::rc::Rc;
use assert_matches::assert_matches;

fn trap_code(error: Error) -> TrapCode {
    match error {
        Error::Trap(trap) => trap.code().expect("host trap instead of a trap code"),
        other => panic!("expected a trap, got {:?}", other),
    }
}

#[test]
fn empty_module_has_no_definitions() {
    // `\0asm` magic plus version 1 and nothing else.
    let module = Module::from_buffer([0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]).unwrap();
    assert!(module.types().is_empty());
    assert!(module.imports().is_empty());
    assert!(module.exports().is_empty());
    let instance = ModuleInstance::new(&Rc::new(module)).unwrap().assert_no_start();
    assert!(instance.memory_by_index(0).is_none());
}

#[test]
fn i32_add_of_two_arguments() {
    // Assembled by hand: one type (i32, i32) -> i32, one function
    // `local.get 0; local.get 1; i32.add; end`, exported as "add".
    let bytes = [
        0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x07, 0x01, 0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7F, // type section
        0x03, 0x02, 0x01, 0x00, // function section
        0x07, 0x07, 0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00, // export section
        0x0A, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B, // code section
    ];
    let module = Rc::new(Module::from_buffer(bytes).unwrap());
    let instance = ModuleInstance::new(&module).unwrap().assert_no_start();
    assert_eq!(
        instance
            .call(&mut NopExternals, "add", &[Value::I32(2), Value::I32(3)])
            .unwrap(),
        Some(Value::I32(5)),
    );
}

#[test]
fn division_by_zero_traps() {
    // `i32.const 1; i32.const 0; i32.div_s; end`
    let bytes = [
        0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F, // type section
        0x03, 0x02, 0x01, 0x00, // function section
        0x07, 0x07, 0x01, 0x03, b'd', b'i', b'v', 0x00, 0x00, // export section
        0x0A, 0x09, 0x01, 0x07, 0x00, 0x41, 0x01, 0x41, 0x00, 0x6D, 0x0B, // code section
    ];
    let module = Rc::new(Module::from_buffer(bytes).unwrap());
    let instance = ModuleInstance::new(&module).unwrap().assert_no_start();
    let err = instance.call(&mut NopExternals, "div", &[]).unwrap_err();
    assert_eq!(trap_code(err), TrapCode::DivisionByZero);
}

#[test]
fn store_then_load_round_trips() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "run") (result i32)
                i32.const 0
                i32.const 0x12345678
                i32.store
                i32.const 0
                i32.load
            )
        )
        "#,
    );
    assert_eq!(
        instance.call(&mut NopExternals, "run", &[]).unwrap(),
        Some(Value::I32(0x12345678)),
    );
    // Little-endian layout in the backing memory.
    let memory = instance.memory_by_index(0).unwrap();
    let mut bytes = [0u8; 4];
    memory.get_into(0, &mut bytes).unwrap();
    assert_eq!(bytes, [0x78, 0x56, 0x34, 0x12]);
}

#[test]
fn memory_grow_honors_the_declared_maximum() {
    let instance = instantiate(
        r#"
        (module
            (memory 1 3)
            (func (export "grow") (param i32) (result i32)
                local.get 0
                memory.grow
            )
            (func (export "size") (result i32)
                memory.size
            )
        )
        "#,
    );
    // First grow succeeds and returns the old size; size becomes 2.
    assert_eq!(
        instance
            .call(&mut NopExternals, "grow", &[Value::I32(1)])
            .unwrap(),
        Some(Value::I32(1)),
    );
    assert_eq!(
        instance.call(&mut NopExternals, "size", &[]).unwrap(),
        Some(Value::I32(2)),
    );
    // Growing by 2 more would exceed the maximum of 3: -1, size unchanged.
    assert_eq!(
        instance
            .call(&mut NopExternals, "grow", &[Value::I32(2)])
            .unwrap(),
        Some(Value::I32(-1)),
    );
    assert_eq!(
        instance.call(&mut NopExternals, "size", &[]).unwrap(),
        Some(Value::I32(2)),
    );
}

#[test]
fn loop_with_br_if_counts_down_to_zero() {
    let instance = instantiate(
        r#"
        (module
            (func (export "count") (param i32) (result i32)
                (loop $continue
                    local.get 0
                    i32.const 1
                    i32.sub
                    local.set 0
                    local.get 0
                    br_if $continue
                )
                local.get 0
            )
        )
        "#,
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "count", &[Value::I32(5)])
            .unwrap(),
        Some(Value::I32(0)),
    );
}

#[test]
fn block_branches_carry_their_result() {
    let instance = instantiate(
        r#"
        (module
            (func (export "pick") (param i32) (result i32)
                (block $exit (result i32)
                    i32.const 10
                    local.get 0
                    br_if $exit
                    drop
                    i32.const 20
                )
            )
        )
        "#,
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "pick", &[Value::I32(1)])
            .unwrap(),
        Some(Value::I32(10)),
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "pick", &[Value::I32(0)])
            .unwrap(),
        Some(Value::I32(20)),
    );
}

#[test]
fn br_table_clamps_to_the_default_target() {
    let instance = instantiate(
        r#"
        (module
            (func (export "classify") (param i32) (result i32)
                (block $two
                    (block $one
                        (block $zero
                            local.get 0
                            br_table $zero $one $two
                        )
                        i32.const 100
                        return
                    )
                    i32.const 101
                    return
                )
                i32.const 102
            )
        )
        "#,
    );
    for (input, expected) in [(0, 100), (1, 101), (2, 102), (7, 102)] {
        assert_eq!(
            instance
                .call(&mut NopExternals, "classify", &[Value::I32(input)])
                .unwrap(),
            Some(Value::I32(expected)),
            "br_table with input {}",
            input,
        );
    }
}

#[test]
fn if_else_takes_the_matching_branch() {
    let instance = instantiate(
        r#"
        (module
            (func (export "abs") (param i32) (result i32)
                local.get 0
                i32.const 0
                i32.lt_s
                (if (result i32)
                    (then i32.const 0 local.get 0 i32.sub)
                    (else local.get 0)
                )
            )
        )
        "#,
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "abs", &[Value::I32(-7)])
            .unwrap(),
        Some(Value::I32(7)),
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "abs", &[Value::I32(3)])
            .unwrap(),
        Some(Value::I32(3)),
    );
}

#[test]
fn if_without_else_is_skipped_on_zero() {
    let instance = instantiate(
        r#"
        (module
            (global $g (mut i32) (i32.const 0))
            (func (export "maybe") (param i32) (result i32)
                local.get 0
                (if (then (global.set $g (i32.const 1))))
                global.get $g
            )
        )
        "#,
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "maybe", &[Value::I32(0)])
            .unwrap(),
        Some(Value::I32(0)),
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "maybe", &[Value::I32(9)])
            .unwrap(),
        Some(Value::I32(1)),
    );
}

#[test]
fn calls_pass_arguments_in_order() {
    let instance = instantiate(
        r#"
        (module
            (func $sub (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.sub
            )
            (func (export "run") (result i32)
                i32.const 44
                i32.const 2
                call $sub
            )
        )
        "#,
    );
    assert_eq!(
        instance.call(&mut NopExternals, "run", &[]).unwrap(),
        Some(Value::I32(42)),
    );
}

#[test]
fn recursion_exhausts_the_call_stack() {
    let instance = instantiate(
        r#"
        (module
            (func $loop (export "loop")
                call $loop
            )
        )
        "#,
    );
    let err = instance.call(&mut NopExternals, "loop", &[]).unwrap_err();
    assert_eq!(trap_code(err), TrapCode::CallStackExhaustion);
}

#[test]
fn deep_operand_stacks_overflow_at_the_configured_limit() {
    let wasm = wat::parse_str(
        r#"
        (module
            (func (export "deep") (result i32)
                i32.const 1
                i32.const 2
                i32.const 3
                i32.const 4
                i32.add
                i32.add
                i32.add
            )
        )
        "#,
    )
    .unwrap();
    let module = Rc::new(Module::from_buffer(wasm).unwrap());
    let limits = StackLimits {
        value_stack_limit: 3,
        call_stack_limit: 16,
    };
    let instance = ModuleInstance::with_limits(&module, limits)
        .unwrap()
        .assert_no_start();
    let err = instance.call(&mut NopExternals, "deep", &[]).unwrap_err();
    assert_eq!(trap_code(err), TrapCode::StackOverflow);

    // The same function fits into the default limits.
    let instance = ModuleInstance::new(&module).unwrap().assert_no_start();
    assert_eq!(
        instance.call(&mut NopExternals, "deep", &[]).unwrap(),
        Some(Value::I32(10)),
    );
}

#[test]
fn unreachable_traps() {
    let instance = instantiate(
        r#"
        (module (func (export "boom") unreachable))
        "#,
    );
    let err = instance.call(&mut NopExternals, "boom", &[]).unwrap_err();
    assert_eq!(trap_code(err), TrapCode::Unreachable);
}

#[test]
fn partial_memory_effects_survive_a_trap() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "run")
                i32.const 0
                i32.const 0xAA
                i32.store8
                unreachable
            )
        )
        "#,
    );
    assert!(instance.call(&mut NopExternals, "run", &[]).is_err());
    let memory = instance.memory_by_index(0).unwrap();
    assert_eq!(memory.get_value::<u8>(0).unwrap(), 0xAA);
}

#[test]
fn signed_division_overflow_traps_but_remainder_is_zero() {
    let instance = instantiate(
        r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.div_s
            )
            (func (export "rem") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.rem_s
            )
        )
        "#,
    );
    let err = instance
        .call(&mut NopExternals, "div", &[Value::I32(i32::MIN), Value::I32(-1)])
        .unwrap_err();
    assert_eq!(trap_code(err), TrapCode::IntegerOverflow);
    assert_eq!(
        instance
            .call(&mut NopExternals, "rem", &[Value::I32(i32::MIN), Value::I32(-1)])
            .unwrap(),
        Some(Value::I32(0)),
    );
}

#[test]
fn shift_counts_are_masked_to_the_width() {
    let instance = instantiate(
        r#"
        (module
            (func (export "shl") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.shl
            )
            (func (export "shl64") (param i64 i64) (result i64)
                local.get 0
                local.get 1
                i64.shl
            )
        )
        "#,
    );
    // An i32 shift of 33 behaves like a shift of 1.
    assert_eq!(
        instance
            .call(&mut NopExternals, "shl", &[Value::I32(1), Value::I32(33)])
            .unwrap(),
        Some(Value::I32(2)),
    );
    // An i64 shift of 64 behaves like a shift of 0.
    assert_eq!(
        instance
            .call(&mut NopExternals, "shl64", &[Value::I64(5), Value::I64(64)])
            .unwrap(),
        Some(Value::I64(5)),
    );
}

#[test]
fn float_truncation_traps_on_nan_and_range() {
    let instance = instantiate(
        r#"
        (module
            (func (export "trunc") (param f32) (result i32)
                local.get 0
                i32.trunc_f32_s
            )
        )
        "#,
    );
    let err = instance
        .call(&mut NopExternals, "trunc", &[Value::F32(F32::from(f32::NAN))])
        .unwrap_err();
    assert_eq!(trap_code(err), TrapCode::InvalidConversionToInt);
    let err = instance
        .call(&mut NopExternals, "trunc", &[Value::F32(F32::from(3.0e9f32))])
        .unwrap_err();
    assert_eq!(trap_code(err), TrapCode::IntegerOverflow);
    assert_eq!(
        instance
            .call(&mut NopExternals, "trunc", &[Value::F32(F32::from(-3.9f32))])
            .unwrap(),
        Some(Value::I32(-3)),
    );
}

#[test]
fn reinterpret_round_trips_preserve_bits() {
    let instance = instantiate(
        r#"
        (module
            (func (export "roundtrip32") (param i32) (result i32)
                local.get 0
                f32.reinterpret_i32
                i32.reinterpret_f32
            )
            (func (export "roundtrip64") (param i64) (result i64)
                local.get 0
                f64.reinterpret_i64
                i64.reinterpret_f64
            )
        )
        "#,
    );
    for bits in [0, 1, -1, i32::MIN, i32::MAX, 0x7FC0_0001u32 as i32] {
        assert_eq!(
            instance
                .call(&mut NopExternals, "roundtrip32", &[Value::I32(bits)])
                .unwrap(),
            Some(Value::I32(bits)),
        );
    }
    assert_eq!(
        instance
            .call(&mut NopExternals, "roundtrip64", &[Value::I64(i64::MIN)])
            .unwrap(),
        Some(Value::I64(i64::MIN)),
    );
}

#[test]
fn sign_extension_operators_extend_the_low_bits() {
    let instance = instantiate(
        r#"
        (module
            (func (export "ext8") (param i32) (result i32)
                local.get 0
                i32.extend8_s
            )
            (func (export "ext32") (param i64) (result i64)
                local.get 0
                i64.extend32_s
            )
        )
        "#,
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "ext8", &[Value::I32(0x180)])
            .unwrap(),
        Some(Value::I32(-128)),
    );
    assert_eq!(
        instance
            .call(&mut NopExternals, "ext32", &[Value::I64(0xFFFF_FFFF)])
            .unwrap(),
        Some(Value::I64(-1)),
    );
}

#[test]
fn out_of_bounds_access_traps() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "peek") (param i32) (result i32)
                local.get 0
                i32.load
            )
        )
        "#,
    );
    let err = instance
        .call(&mut NopExternals, "peek", &[Value::I32(65533)])
        .unwrap_err();
    assert_eq!(trap_code(err), TrapCode::MemoryAccessOutOfBounds);
}

#[test]
fn static_offset_is_added_to_the_base_address() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "run") (result i32)
                i32.const 8
                i32.const 0x5A
                i32.store offset=4
                i32.const 12
                i32.load
            )
        )
        "#,
    );
    assert_eq!(
        instance.call(&mut NopExternals, "run", &[]).unwrap(),
        Some(Value::I32(0x5A)),
    );
}

#[test]
fn float_min_max_follow_wasm_zero_ordering() {
    let instance = instantiate(
        r#"
        (module
            (func (export "min") (param f64 f64) (result f64)
                local.get 0
                local.get 1
                f64.min
            )
        )
        "#,
    );
    let result = instance
        .call(
            &mut NopExternals,
            "min",
            &[
                Value::F64(F64::from(0.0f64)),
                Value::F64(F64::from(-0.0f64)),
            ],
        )
        .unwrap();
    assert_matches!(result, Some(Value::F64(f)) if f.to_bits() == (-0.0f64).to_bits());
}

#[test]
fn argument_mismatches_are_function_errors() {
    let instance = instantiate(
        r#"
        (module (func (export "one") (param i32)))
        "#,
    );
    assert_matches!(
        instance.call(&mut NopExternals, "one", &[]),
        Err(Error::Function(_))
    );
    assert_matches!(
        instance.call(&mut NopExternals, "one", &[Value::I64(1)]),
        Err(Error::Function(_))
    );
    assert_matches!(
        instance.call(&mut NopExternals, "missing", &[]),
        Err(Error::Function(_))
    );
}

#[test]
fn call_indirect_traps_on_the_unpopulated_table() {
    let instance = instantiate(
        r#"
        (module
            (type $t (func))
            (table 4 funcref)
            (func (export "run") (param i32)
                local.get 0
                call_indirect (type $t)
            )
        )
        "#,
    );
    // An in-bounds slot exists but was never initialized.
    let err = instance
        .call(&mut NopExternals, "run", &[Value::I32(0)])
        .unwrap_err();
    assert_eq!(trap_code(err), TrapCode::ElemUninitialized);
    // An out-of-bounds index selects an undefined element.
    let err = instance
        .call(&mut NopExternals, "run", &[Value::I32(9)])
        .unwrap_err();
    assert_eq!(trap_code(err), TrapCode::UndefinedElement);
}
