//! Module instantiation: allocating memories and globals, evaluating
//! constant initializer expressions and applying active data segments.

use crate::{
    global::{GlobalInstance, GlobalRef},
    host::Externals,
    memory::{MemoryInstance, MemoryRef},
    memory_units::Pages,
    module::{DataMode, Module},
    opcode,
    reader::{BinaryReader, DecodeErrorKind},
    runner::{Interpreter, StackLimits},
    types::{ExternalKind, FuncType, ImportDesc},
    Error,
    Value,
};
use alloc::{rc::Rc, vec::Vec};

/// Reference to a [`ModuleInstance`].
///
/// This reference has reference-counting semantics.
#[derive(Clone, Debug)]
pub struct ModuleRef(pub(crate) Rc<ModuleInstance>);

impl ::core::ops::Deref for ModuleRef {
    type Target = ModuleInstance;
    fn deref(&self) -> &ModuleInstance {
        &self.0
    }
}

/// A module instance is the runtime representation of a [module][`Module`].
///
/// An instance exclusively owns its linear memories and global variables
/// and shares the immutable module description. It is created by
/// instantiating a module: memories are allocated and zero-filled, globals
/// are initialized by evaluating their initializer expressions in
/// declaration order, and active data segments are copied into memory at
/// their evaluated offsets.
///
/// After instantiation, exported functions can be invoked with [`call`].
///
/// [`call`]: #method.call
#[derive(Debug)]
pub struct ModuleInstance {
    module: Rc<Module>,
    memories: Vec<MemoryRef>,
    globals: Vec<GlobalRef>,
    limits: StackLimits,
}

impl ModuleInstance {
    /// Instantiates `module` with the default stack limits.
    ///
    /// The returned handle holds the instance but has not yet executed the
    /// module's `start` function; use [`NotStartedModuleRef::run_start`] or
    /// [`NotStartedModuleRef::assert_no_start`] to obtain the finished
    /// [`ModuleRef`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the module imports anything but functions, if a
    /// memory declaration is invalid, if a global initializer is malformed
    /// or refers to a global that is not yet initialized, or if an active
    /// data segment does not fit its target memory.
    pub fn new(module: &Rc<Module>) -> Result<NotStartedModuleRef, Error> {
        Self::with_limits(module, StackLimits::default())
    }

    /// Instantiates `module` with the given stack limits.
    ///
    /// See [`new`] for details.
    ///
    /// [`new`]: #method.new
    pub fn with_limits(
        module: &Rc<Module>,
        limits: StackLimits,
    ) -> Result<NotStartedModuleRef, Error> {
        // The host bridge resolves imported functions by name at call time.
        // Other import kinds have no resolver, so their presence is a
        // linkage failure.
        for import in module.imports() {
            match import.desc() {
                ImportDesc::Func(_) => {}
                desc => {
                    return Err(Error::Instantiation(format!(
                        "cannot satisfy {:?}-kind import {}.{}",
                        desc.kind(),
                        import.module(),
                        import.field(),
                    )))
                }
            }
        }

        let mut memories = Vec::with_capacity(module.memories.len());
        for declared in &module.memories {
            let initial = Pages(declared.min() as usize);
            let maximum = declared.max().map(|max| Pages(max as usize));
            memories.push(MemoryInstance::alloc(initial, maximum)?);
        }

        // Globals initialize in declaration order; each initializer may
        // refer only to globals that already exist.
        let mut globals: Vec<GlobalRef> = Vec::with_capacity(module.globals.len());
        for entry in &module.globals {
            let value = eval_init_expr(&entry.init_expr, &globals)?;
            if value.value_type() != entry.ty.content_type() {
                return Err(Error::Global(format!(
                    "initializer yields {:?}, global declares {:?}",
                    value.value_type(),
                    entry.ty.content_type(),
                )));
            }
            globals.push(GlobalInstance::alloc(value, entry.ty.is_mutable()));
        }

        let instance = ModuleInstance {
            module: module.clone(),
            memories,
            globals,
            limits,
        };
        instance.apply_data_segments()?;

        Ok(NotStartedModuleRef {
            instance: ModuleRef(Rc::new(instance)),
        })
    }

    /// Copies every active data segment to its evaluated offset.
    fn apply_data_segments(&self) -> Result<(), Error> {
        for segment in &self.module.data {
            let mem_idx = match segment.mode {
                DataMode::Active { mem_idx } => mem_idx,
                DataMode::Passive => continue,
            };
            let memory = self.memory_by_index(mem_idx).ok_or_else(|| {
                Error::Memory(format!("data segment targets unknown memory {}", mem_idx))
            })?;
            let offset = match eval_init_expr(&segment.offset_expr, &self.globals)? {
                Value::I32(offset) => offset as u32,
                other => {
                    return Err(Error::Instantiation(format!(
                        "data segment offset evaluates to {:?}, expected i32",
                        other.value_type(),
                    )))
                }
            };
            memory.set(offset, &segment.init).map_err(|_| {
                Error::Memory(format!(
                    "data segment of {} bytes does not fit at offset {}",
                    segment.init.len(),
                    offset,
                ))
            })?;
        }
        Ok(())
    }

    /// Returns the shared module description.
    pub(crate) fn module(&self) -> &Module {
        &self.module
    }

    pub(crate) fn stack_limits(&self) -> &StackLimits {
        &self.limits
    }

    /// Returns the memory at the given index, if any.
    pub fn memory_by_index(&self, idx: u32) -> Option<MemoryRef> {
        self.memories.get(idx as usize).cloned()
    }

    /// Returns the global at the given index, if any.
    pub fn global_by_index(&self, idx: u32) -> Option<GlobalRef> {
        self.globals.get(idx as usize).cloned()
    }

    /// Resolves an exported function by name, first match wins.
    fn export_func_by_name(&self, name: &str) -> Result<u32, Error> {
        let export = self
            .module
            .exports()
            .iter()
            .find(|export| export.field() == name)
            .ok_or_else(|| Error::Function(format!("export {} not found", name)))?;
        if export.kind() != ExternalKind::Func {
            return Err(Error::Function(format!(
                "export {} is a {:?}, not a function",
                name,
                export.kind(),
            )));
        }
        Ok(export.index())
    }

    /// Invokes an exported function by name.
    ///
    /// The arguments are pushed left to right; the returned value is the
    /// single result of the function, or `None` for a function without
    /// results.
    ///
    /// # Errors
    ///
    /// Returns `Err` if there is no function export with that name, if the
    /// argument count or kinds do not match the function's type, or if
    /// execution traps.
    pub fn call<E: Externals>(
        &self,
        externals: &mut E,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>, Error> {
        let func_idx = self.export_func_by_name(name)?;
        self.call_func(externals, func_idx, args)
    }

    /// Invokes a function by its index, counting imported functions first.
    ///
    /// See [`call`] for details.
    ///
    /// [`call`]: #method.call
    pub fn call_func<E: Externals>(
        &self,
        externals: &mut E,
        func_idx: u32,
        args: &[Value],
    ) -> Result<Option<Value>, Error> {
        let func_type = self.func_type_by_index(func_idx)?;
        check_function_args(func_type, args)?;
        let mut interpreter = Interpreter::new(self);
        interpreter.invoke(externals, func_idx, args)
    }

    pub(crate) fn func_type_by_index(&self, func_idx: u32) -> Result<&FuncType, Error> {
        let func_type = self
            .module
            .func_type(func_idx)
            .ok_or_else(|| Error::Function(format!("function {} does not exist", func_idx)))?;
        if func_type.results().len() > 1 {
            return Err(Error::Function(format!(
                "function {} returns {} results; multi-value results are not supported",
                func_idx,
                func_type.results().len(),
            )));
        }
        Ok(func_type)
    }
}

/// Checks that the argument list matches the function type in length and
/// value kinds.
fn check_function_args(func_type: &FuncType, args: &[Value]) -> Result<(), Error> {
    if func_type.params().len() != args.len() {
        return Err(Error::Function(format!(
            "expected {} arguments, got {}",
            func_type.params().len(),
            args.len(),
        )));
    }
    for (param, arg) in func_type.params().iter().zip(args) {
        if arg.value_type() != *param {
            return Err(Error::Function(format!(
                "expected argument of type {:?}, got {:?}",
                param,
                arg.value_type(),
            )));
        }
    }
    Ok(())
}

/// Evaluates a constant initializer expression.
///
/// Only the constant opcodes, `global.get` of an already-initialized
/// global, `ref.null` and `ref.func` are accepted, terminated by `end`.
pub(crate) fn eval_init_expr(expr: &[u8], globals: &[GlobalRef]) -> Result<Value, Error> {
    let mut r = BinaryReader::new(expr);
    let offset = r.pos();
    let op = r.read_u8().map_err(Error::Decode)?;
    let value = match op {
        opcode::I32_CONST => Value::I32(r.read_var_i32().map_err(Error::Decode)?),
        opcode::I64_CONST => Value::I64(r.read_var_i64().map_err(Error::Decode)?),
        opcode::F32_CONST => Value::F32(r.read_f32().map_err(Error::Decode)?),
        opcode::F64_CONST => Value::F64(r.read_f64().map_err(Error::Decode)?),
        opcode::GLOBAL_GET => {
            let idx = r.read_var_u32().map_err(Error::Decode)?;
            let global = globals.get(idx as usize).ok_or_else(|| {
                Error::Global(format!(
                    "initializer refers to global {} which is not yet initialized",
                    idx
                ))
            })?;
            global.get()
        }
        opcode::REF_NULL => {
            let heap_type = r.read_u8().map_err(Error::Decode)?;
            match heap_type {
                0x70 => Value::FuncRef(None),
                0x6F => Value::ExternRef(None),
                _ => {
                    return Err(Error::Global(format!(
                        "unknown heap type 0x{:02X} in ref.null",
                        heap_type
                    )))
                }
            }
        }
        opcode::REF_FUNC => Value::FuncRef(Some(r.read_var_u32().map_err(Error::Decode)?)),
        unknown => {
            return Err(Error::Decode(crate::reader::DecodeError::new(
                DecodeErrorKind::UnknownOpcode(unknown),
                offset,
            )))
        }
    };
    let end = r.read_u8().map_err(Error::Decode)?;
    if end != opcode::END {
        return Err(Error::Global(
            "initializer expression is not a single constant".into(),
        ));
    }
    Ok(value)
}

/// A handle to an instantiated module whose `start` function, if any, has
/// not been executed yet.
pub struct NotStartedModuleRef {
    instance: ModuleRef,
}

impl NotStartedModuleRef {
    /// Returns `true` if the module declares a `start` function.
    pub fn has_start(&self) -> bool {
        self.instance.module().start_func().is_some()
    }

    /// Executes the `start` function, if one is declared, and returns the
    /// finished instance.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the `start` function traps.
    pub fn run_start<E: Externals>(self, externals: &mut E) -> Result<ModuleRef, Error> {
        if let Some(start_idx) = self.instance.module().start_func() {
            self.instance.call_func(externals, start_idx, &[])?;
        }
        Ok(self.instance)
    }

    /// Returns the instance, asserting that the module has no `start`
    /// function.
    ///
    /// # Panics
    ///
    /// Panics if the module declares a `start` function.
    pub fn assert_no_start(self) -> ModuleRef {
        assert!(
            !self.has_start(),
            "assert_no_start called on a module with a start function"
        );
        self.instance
    }

    /// Returns the not-yet-started instance.
    ///
    /// Intended for hosts that must wire themselves to the instance's
    /// memory before any wasm code runs.
    pub fn not_started_instance(&self) -> &ModuleRef {
        &self.instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Module, NopExternals};
    use assert_matches::assert_matches;

    fn instantiate(wat: &str) -> NotStartedModuleRef {
        let wasm = wat::parse_str(wat).unwrap();
        let module = Rc::new(Module::from_buffer(wasm).unwrap());
        ModuleInstance::new(&module).unwrap()
    }

    #[test]
    fn globals_initialize_in_declaration_order() {
        let instance = instantiate(
            r#"
            (module
                (global i32 (i32.const 7))
                (global i32 (global.get 0))
            )
            "#,
        )
        .assert_no_start();
        assert_eq!(instance.global_by_index(1).unwrap().get(), Value::I32(7));
    }

    #[test]
    fn forward_global_references_are_rejected() {
        let wasm = wat::parse_str(
            r#"
            (module
                (global i32 (global.get 1))
                (global i32 (i32.const 1))
            )
            "#,
        )
        .unwrap();
        let module = Rc::new(Module::from_buffer(wasm).unwrap());
        assert_matches!(ModuleInstance::new(&module), Err(Error::Global(_)));
    }

    #[test]
    fn active_data_segments_are_copied() {
        let instance = instantiate(
            r#"
            (module
                (memory 1)
                (data (i32.const 16) "\12\34")
            )
            "#,
        )
        .assert_no_start();
        let memory = instance.memory_by_index(0).unwrap();
        let mut bytes = [0u8; 2];
        memory.get_into(16, &mut bytes).unwrap();
        assert_eq!(bytes, [0x12, 0x34]);
    }

    #[test]
    fn oversized_data_segment_fails_instantiation() {
        let wasm = wat::parse_str(
            r#"
            (module
                (memory 1)
                (data (i32.const 65535) "\aa\bb")
            )
            "#,
        )
        .unwrap();
        let module = Rc::new(Module::from_buffer(wasm).unwrap());
        assert_matches!(ModuleInstance::new(&module), Err(Error::Memory(_)));
    }

    #[test]
    fn non_function_imports_fail_instantiation() {
        let wasm = wat::parse_str(
            r#"
            (module
                (import "env" "memory" (memory 1))
            )
            "#,
        )
        .unwrap();
        let module = Rc::new(Module::from_buffer(wasm).unwrap());
        assert_matches!(ModuleInstance::new(&module), Err(Error::Instantiation(_)));
    }

    #[test]
    fn start_function_runs_once_on_request() {
        let wasm = wat::parse_str(
            r#"
            (module
                (global $g (mut i32) (i32.const 0))
                (func $init (global.set $g (i32.const 42)))
                (start $init)
            )
            "#,
        )
        .unwrap();
        let module = Rc::new(Module::from_buffer(wasm).unwrap());
        let not_started = ModuleInstance::new(&module).unwrap();
        assert!(not_started.has_start());
        let instance = not_started.run_start(&mut NopExternals).unwrap();
        assert_eq!(instance.global_by_index(0).unwrap().get(), Value::I32(42));
    }
}
