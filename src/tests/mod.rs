mod host;
mod wasm;

use crate::{Module, ModuleInstance, ModuleRef, NopExternals};
use alloc::rc::Rc;

/// Builds an instance from WebAssembly text, asserting there is no start
/// function.
pub(crate) fn instantiate(source: &str) -> ModuleRef {
    let wasm = wat::parse_str(source).expect("invalid wat");
    let module = Rc::new(Module::from_buffer(wasm).expect("failed to load wasm"));
    ModuleInstance::new(&module)
        .expect("failed to instantiate wasm module")
        .assert_no_start()
}

#[test]
fn nop_externals_trap_on_any_import() {
    let wasm = wat::parse_str(
        r#"
        (module
            (import "env" "missing" (func $missing))
            (func (export "run") (call $missing))
        )
        "#,
    )
    .unwrap();
    let module = Rc::new(Module::from_buffer(wasm).unwrap());
    let instance = ModuleInstance::new(&module).unwrap().assert_no_start();
    assert!(instance.call(&mut NopExternals, "run", &[]).is_err());
}
