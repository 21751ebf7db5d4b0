//! Tests of the host-import bridge.

use crate::{
    Error, Module, ModuleInstance, ProcExit, RuntimeArgs, Trap, TrapCode, Value,
};
use alloc::rc::Rc;
use alloc::vec::Vec;
use assert_matches::assert_matches;

/// A host with one `env.sub` function and a recordable exit request.
struct TestHost {
    calls: Vec<(Value, Value)>,
    exit: Option<i32>,
}

impl TestHost {
    fn new() -> TestHost {
        TestHost {
            calls: Vec::new(),
            exit: None,
        }
    }
}

impl crate::Externals for TestHost {
    fn invoke_import(
        &mut self,
        module: &str,
        field: &str,
        args: RuntimeArgs,
    ) -> Result<Option<Value>, Trap> {
        match (module, field) {
            ("env", "sub") => {
                let left: i32 = args.nth_checked(0)?;
                let right: i32 = args.nth_checked(1)?;
                self.calls
                    .push((args.nth_value_checked(0)?, args.nth_value_checked(1)?));
                Ok(Some(Value::I32(left.wrapping_sub(right))))
            }
            ("env", "fail") => Err(TrapCode::Unreachable.into()),
            ("env", "exit") => {
                self.exit = Some(args.nth_checked(0)?);
                Ok(None)
            }
            ("env", "wrong_kind") => Ok(Some(Value::I64(0))),
            _ => Err(TrapCode::Unreachable.into()),
        }
    }

    fn exit_status(&self) -> Option<i32> {
        self.exit
    }
}

fn instantiate(source: &str) -> crate::ModuleRef {
    let wasm = wat::parse_str(source).unwrap();
    let module = Rc::new(Module::from_buffer(wasm).unwrap());
    ModuleInstance::new(&module).unwrap().assert_no_start()
}

#[test]
fn imported_calls_receive_arguments_in_declaration_order() {
    let instance = instantiate(
        r#"
        (module
            (import "env" "sub" (func $sub (param i32 i32) (result i32)))
            (func (export "run") (result i32)
                i32.const 50
                i32.const 8
                call $sub
            )
        )
        "#,
    );
    let mut host = TestHost::new();
    assert_eq!(
        instance.call(&mut host, "run", &[]).unwrap(),
        Some(Value::I32(42)),
    );
    assert_eq!(host.calls, [(Value::I32(50), Value::I32(8))]);
}

#[test]
fn imported_functions_can_be_called_directly() {
    let instance = instantiate(
        r#"
        (module
            (import "env" "sub" (func (export "sub") (param i32 i32) (result i32)))
        )
        "#,
    );
    let mut host = TestHost::new();
    assert_eq!(
        instance
            .call(&mut host, "sub", &[Value::I32(1), Value::I32(2)])
            .unwrap(),
        Some(Value::I32(-1)),
    );
}

#[test]
fn host_traps_abort_the_invocation() {
    let instance = instantiate(
        r#"
        (module
            (import "env" "fail" (func $fail))
            (func (export "run") (result i32)
                call $fail
                i32.const 1
            )
        )
        "#,
    );
    let mut host = TestHost::new();
    let err = instance.call(&mut host, "run", &[]).unwrap_err();
    assert_matches!(err, Error::Trap(_));
}

#[test]
fn mismatched_host_return_kind_is_a_signature_trap() {
    let instance = instantiate(
        r#"
        (module
            (import "env" "wrong_kind" (func $wrong (result i32)))
            (func (export "run") (result i32)
                call $wrong
            )
        )
        "#,
    );
    let mut host = TestHost::new();
    let err = instance.call(&mut host, "run", &[]).unwrap_err();
    match err {
        Error::Trap(trap) => assert_eq!(trap.code(), Some(TrapCode::UnexpectedSignature)),
        other => panic!("expected a trap, got {:?}", other),
    }
}

#[test]
fn recorded_exit_status_unwinds_as_a_proc_exit_trap() {
    let instance = instantiate(
        r#"
        (module
            (import "env" "exit" (func $exit (param i32)))
            (global $g (mut i32) (i32.const 0))
            (func (export "run")
                i32.const 17
                call $exit
                ;; must never execute
                i32.const 1
                global.set $g
            )
        )
        "#,
    );
    let mut host = TestHost::new();
    let err = instance.call(&mut host, "run", &[]).unwrap_err();
    let exit = err
        .as_host_error()
        .and_then(|host_err| host_err.downcast_ref::<ProcExit>())
        .expect("expected a ProcExit host trap");
    assert_eq!(exit.0, 17);
    // The pseudo-trap fired before the store to the global.
    assert_eq!(instance.global_by_index(0).unwrap().get(), Value::I32(0));
}
