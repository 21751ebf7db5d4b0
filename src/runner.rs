//! The execution engine: a direct interpreter over the raw body bytes of
//! the running function.
//!
//! Each invocation owns an operand stack and a call stack of frames. A
//! frame carries its locals, the byte cursor into its body and the stack of
//! structured-control labels opened within it. Branch targets are resolved
//! by re-scanning forward with depth tracking; `loop` labels re-enter at
//! the recorded body offset.

use crate::{
    host::{Externals, ProcExit, RuntimeArgs},
    instance::ModuleInstance,
    memory::MemoryRef,
    memory_units::Pages,
    opcode::{self, IfSkip},
    reader::{BinaryReader, DecodeError, DecodeErrorKind},
    stack::StackWithLimit,
    types::BlockType,
    value::FromValue,
    Error,
    Trap,
    Value,
};
use alloc::{rc::Rc, vec::Vec};
use wasmlite_core::{
    ArithmeticOps,
    ExtendInto,
    Float,
    Integer,
    LittleEndianConvert,
    SignExtendFrom,
    TransmuteInto,
    TrapCode,
    TryTruncateInto,
    WrapInto,
    F32,
    F64,
};

/// Maximum number of values on the operand stack, unless overridden.
pub const DEFAULT_VALUE_STACK_LIMIT: usize = 1024;

/// Maximum number of frames on the call stack, unless overridden.
pub const DEFAULT_CALL_STACK_LIMIT: usize = 512;

/// The index of the default linear memory.
pub(crate) const DEFAULT_MEMORY_INDEX: u32 = 0;

/// Configurable bounds of an invocation's stacks.
///
/// Exceeding the operand-stack bound traps with
/// [`TrapCode::StackOverflow`]; exceeding the call-stack bound traps with
/// [`TrapCode::CallStackExhaustion`].
#[derive(Copy, Clone, Debug)]
pub struct StackLimits {
    /// Maximum number of values on the operand stack.
    pub value_stack_limit: usize,
    /// Maximum number of frames on the call stack.
    pub call_stack_limit: usize,
}

impl Default for StackLimits {
    fn default() -> Self {
        StackLimits {
            value_stack_limit: DEFAULT_VALUE_STACK_LIMIT,
            call_stack_limit: DEFAULT_CALL_STACK_LIMIT,
        }
    }
}

/// What kind of structured block a label belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BlockKind {
    Block,
    Loop,
    If,
}

/// A structured-control label opened within the current function.
#[derive(Copy, Clone, Debug)]
struct BlockFrame {
    kind: BlockKind,
    /// Branch re-entry offset; only meaningful for `loop` labels.
    target: usize,
    /// Operand stack height when the block was entered.
    stack_height: usize,
    /// Number of values a branch to this label carries.
    arity: usize,
}

/// The per-invocation state of one function activation.
struct FunctionContext {
    /// The function's body bytes, inclusive of the terminating `end`.
    body: Rc<[u8]>,
    /// Parameters followed by the declared locals.
    locals: Vec<Value>,
    /// Byte offset of the next instruction within `body`.
    pc: usize,
    labels: Vec<BlockFrame>,
    /// Operand stack height at activation, after the arguments were moved
    /// into `locals`.
    stack_base: usize,
    return_arity: usize,
}

/// Outcome of running a frame until it yields control.
enum RunResult {
    /// The frame finished; its results are on the operand stack.
    Return,
    /// The frame calls the function with the given index.
    NestedCall(u32),
}

/// Function interpreter. Lives for a single invocation.
pub(crate) struct Interpreter<'a> {
    instance: &'a ModuleInstance,
    value_stack: StackWithLimit<Value>,
    call_stack: Vec<FunctionContext>,
    call_stack_limit: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(instance: &'a ModuleInstance) -> Interpreter<'a> {
        let limits = instance.stack_limits();
        Interpreter {
            instance,
            value_stack: StackWithLimit::with_limit(limits.value_stack_limit),
            call_stack: Vec::new(),
            call_stack_limit: limits.call_stack_limit,
        }
    }

    /// Runs the function with the given index to completion.
    ///
    /// The caller has already checked `args` against the function's type.
    pub(crate) fn invoke<E: Externals>(
        &mut self,
        externals: &mut E,
        func_idx: u32,
        args: &[Value],
    ) -> Result<Option<Value>, Error> {
        for &arg in args {
            self.push_value(arg)?;
        }

        if func_idx < self.instance.module().import_func_count() {
            // A direct invocation of an imported function does not need a
            // frame at all.
            self.invoke_host(externals, func_idx)?;
            if let Some(status) = externals.exit_status() {
                return Err(Error::Trap(Trap::from(ProcExit(status))));
            }
        } else {
            self.push_frame(func_idx)?;
            self.run_interpreter_loop(externals)?;
        }

        let func_type = self
            .instance
            .module()
            .func_type(func_idx)
            .expect("existence checked before invocation");
        let result = match func_type.return_type() {
            Some(_) => Some(self.pop_value()?),
            None => None,
        };
        debug_assert!(
            self.value_stack.is_empty(),
            "operand stack must be empty after the outermost return"
        );
        Ok(result)
    }

    fn run_interpreter_loop<E: Externals>(&mut self, externals: &mut E) -> Result<(), Error> {
        loop {
            if let Some(status) = externals.exit_status() {
                return Err(Error::Trap(Trap::from(ProcExit(status))));
            }

            let mut ctx = self
                .call_stack
                .pop()
                .expect("entered with one frame; frames are pushed back before continuing");

            match self.do_run_function(&mut ctx)? {
                RunResult::Return => {
                    if self.call_stack.is_empty() {
                        return Ok(());
                    }
                }
                RunResult::NestedCall(func_idx) => {
                    self.call_stack.push(ctx);
                    if func_idx < self.instance.module().import_func_count() {
                        self.invoke_host(externals, func_idx)?;
                    } else {
                        self.push_frame(func_idx)?;
                    }
                }
            }
        }
    }

    /// Creates and pushes the frame for a locally-defined function,
    /// consuming its arguments off the operand stack.
    fn push_frame(&mut self, func_idx: u32) -> Result<(), Error> {
        if self.call_stack.len() >= self.call_stack_limit {
            return Err(TrapCode::CallStackExhaustion.into());
        }
        let module = self.instance.module();
        let func_type = module
            .func_type(func_idx)
            .ok_or_else(|| Error::Function(format!("function {} does not exist", func_idx)))?;
        if func_type.results().len() > 1 {
            return Err(Error::Function(format!(
                "function {} returns {} results; multi-value results are not supported",
                func_idx,
                func_type.results().len(),
            )));
        }
        let body = module
            .func_body(func_idx)
            .ok_or_else(|| Error::Function(format!("function {} has no body", func_idx)))?;

        let param_count = func_type.params().len();
        let mut locals = Vec::with_capacity(
            param_count
                + body
                    .locals
                    .iter()
                    .map(|&(count, _)| count as usize)
                    .sum::<usize>(),
        );
        // The last parameter is the top of the stack.
        locals.resize(param_count, Value::I32(0));
        for i in (0..param_count).rev() {
            locals[i] = self.pop_value()?;
        }
        for &(count, ty) in body.locals.iter() {
            for _ in 0..count {
                locals.push(Value::default(ty));
            }
        }

        self.call_stack.push(FunctionContext {
            body: body.code.clone(),
            locals,
            pc: 0,
            labels: Vec::new(),
            stack_base: self.value_stack.len(),
            return_arity: func_type.results().len(),
        });
        Ok(())
    }

    /// Pops the frame's results down to its base stack height.
    fn finish_frame(&mut self, ctx: &FunctionContext) -> Result<RunResult, Error> {
        self.unwind_stack(ctx.stack_base, ctx.return_arity)?;
        Ok(RunResult::Return)
    }

    /// Keeps the top `keep` values, truncates the stack to `height`, and
    /// pushes the kept values back.
    fn unwind_stack(&mut self, height: usize, keep: usize) -> Result<(), Error> {
        if keep == 0 {
            self.value_stack.truncate(height);
            return Ok(());
        }
        if keep == 1 {
            let result = self.pop_value()?;
            self.value_stack.truncate(height);
            return self.push_value(result);
        }
        let mut kept = Vec::with_capacity(keep);
        for _ in 0..keep {
            kept.push(self.pop_value()?);
        }
        self.value_stack.truncate(height);
        for value in kept.into_iter().rev() {
            self.push_value(value)?;
        }
        Ok(())
    }

    /// Transfers control to the label `depth` levels up, adjusting the
    /// operand and label stacks.
    ///
    /// Returns `Some` when the branch leaves the function, i.e. it targets
    /// the implicit function-level label.
    fn do_branch(
        &mut self,
        ctx: &mut FunctionContext,
        r: &mut BinaryReader,
        depth: u32,
    ) -> Result<Option<RunResult>, Error> {
        let labels_len = ctx.labels.len() as u32;
        if depth >= labels_len {
            ctx.labels.clear();
            return self.finish_frame(ctx).map(Some);
        }

        let target_idx = (labels_len - 1 - depth) as usize;
        let label = ctx.labels[target_idx];
        match label.kind {
            BlockKind::Loop => {
                // Re-enter at the top of the loop body. Branches to a loop
                // label carry no values.
                self.value_stack.truncate(label.stack_height);
                ctx.labels.truncate(target_idx + 1);
                r.seek(label.target);
            }
            BlockKind::Block | BlockKind::If => {
                self.unwind_stack(label.stack_height, label.arity)?;
                ctx.labels.truncate(target_idx);
                // One `end` per label being exited, the target included.
                opcode::skip_to_block_end(r, depth + 1)?;
            }
        }
        Ok(None)
    }

    /// Number of values the given block type produces.
    fn block_arity(&self, block_type: BlockType) -> Result<usize, Error> {
        match block_type {
            BlockType::Empty => Ok(0),
            BlockType::Value(_) => Ok(1),
            BlockType::TypeIndex(idx) => self
                .instance
                .module()
                .types()
                .get(idx as usize)
                .map(|func_type| func_type.results().len())
                .ok_or_else(|| Error::Function(format!("block type index {} out of range", idx))),
        }
    }

    /// Pops the arguments of an imported function, bridges to the host and
    /// pushes the returned value.
    fn invoke_host<E: Externals>(&mut self, externals: &mut E, func_idx: u32) -> Result<(), Error> {
        let module = self.instance.module();
        let import = module
            .func_import(func_idx)
            .ok_or_else(|| Error::Function(format!("imported function {} not found", func_idx)))?;
        let func_type = module
            .func_type(func_idx)
            .ok_or_else(|| Error::Function(format!("imported function {} has no type", func_idx)))?;
        if func_type.results().len() > 1 {
            return Err(Error::Function(format!(
                "imported function {}.{} declares multiple results",
                import.module(),
                import.field(),
            )));
        }

        let params = func_type.params();
        let mut args = Vec::new();
        args.resize(params.len(), Value::I32(0));
        for i in (0..params.len()).rev() {
            let value = self.pop_value()?;
            if value.value_type() != params[i] {
                return Err(Error::Value(format!(
                    "argument {} of {}.{} is {:?}, expected {:?}",
                    i,
                    import.module(),
                    import.field(),
                    value.value_type(),
                    params[i],
                )));
            }
            args[i] = value;
        }

        let result = externals
            .invoke_import(import.module(), import.field(), RuntimeArgs::from(&args[..]))
            .map_err(Error::Trap)?;

        match (result, func_type.return_type()) {
            (None, None) => Ok(()),
            (Some(value), Some(expected)) if value.value_type() == expected => {
                self.push_value(value)
            }
            _ => Err(TrapCode::UnexpectedSignature.into()),
        }
    }

    /// Runs one frame until it returns, calls another function, or traps.
    fn do_run_function(&mut self, ctx: &mut FunctionContext) -> Result<RunResult, Error> {
        let body = ctx.body.clone();
        let mut r = BinaryReader::at(&body, ctx.pc);

        loop {
            let opcode_offset = r.pos();
            let op = r.read_u8()?;
            match op {
                opcode::UNREACHABLE => return Err(TrapCode::Unreachable.into()),
                opcode::NOP => {}

                opcode::BLOCK => {
                    let block_type = r.read_block_type()?;
                    let arity = self.block_arity(block_type)?;
                    ctx.labels.push(BlockFrame {
                        kind: BlockKind::Block,
                        target: 0,
                        stack_height: self.value_stack.len(),
                        arity,
                    });
                }
                opcode::LOOP => {
                    r.read_block_type()?;
                    ctx.labels.push(BlockFrame {
                        kind: BlockKind::Loop,
                        target: r.pos(),
                        stack_height: self.value_stack.len(),
                        arity: 0,
                    });
                }
                opcode::IF => {
                    let block_type = r.read_block_type()?;
                    let arity = self.block_arity(block_type)?;
                    let condition: i32 = self.pop_as()?;
                    let label = BlockFrame {
                        kind: BlockKind::If,
                        target: 0,
                        stack_height: self.value_stack.len(),
                        arity,
                    };
                    if condition != 0 {
                        ctx.labels.push(label);
                    } else {
                        match opcode::skip_if_branch(&mut r)? {
                            IfSkip::Else => ctx.labels.push(label),
                            // No else branch: the whole `if` was skipped.
                            IfSkip::End => {}
                        }
                    }
                }
                opcode::ELSE => {
                    // The true branch ran to completion; hop over the else
                    // branch to the matching `end`.
                    ctx.labels
                        .pop()
                        .ok_or_else(|| Error::from(TrapCode::StackUnderflow))?;
                    opcode::skip_to_block_end(&mut r, 1)?;
                }
                opcode::END => {
                    if ctx.labels.pop().is_none() {
                        // The function's own `end`.
                        ctx.pc = r.pos();
                        return self.finish_frame(ctx);
                    }
                }

                opcode::BR => {
                    let depth = r.read_var_u32()?;
                    if let Some(run_result) = self.do_branch(ctx, &mut r, depth)? {
                        return Ok(run_result);
                    }
                }
                opcode::BR_IF => {
                    let depth = r.read_var_u32()?;
                    let condition: i32 = self.pop_as()?;
                    if condition != 0 {
                        if let Some(run_result) = self.do_branch(ctx, &mut r, depth)? {
                            return Ok(run_result);
                        }
                    }
                }
                opcode::BR_TABLE => {
                    let count = r.read_var_u32()?;
                    let mut targets = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        targets.push(r.read_var_u32()?);
                    }
                    let default = r.read_var_u32()?;
                    let index: u32 = self.pop_as()?;
                    let depth = targets
                        .get(index as usize)
                        .copied()
                        .unwrap_or(default);
                    if let Some(run_result) = self.do_branch(ctx, &mut r, depth)? {
                        return Ok(run_result);
                    }
                }
                opcode::RETURN => {
                    ctx.labels.clear();
                    return self.finish_frame(ctx);
                }

                opcode::CALL => {
                    let func_idx = r.read_var_u32()?;
                    ctx.pc = r.pos();
                    return Ok(RunResult::NestedCall(func_idx));
                }
                opcode::CALL_INDIRECT => {
                    r.read_var_u32()?;
                    let table_idx = r.read_var_u32()?;
                    let index: u32 = self.pop_as()?;
                    let table = self
                        .instance
                        .module()
                        .table_by_index(table_idx)
                        .ok_or_else(|| {
                            Error::Table(format!("table {} does not exist", table_idx))
                        })?;
                    if index >= table.limits().min() {
                        return Err(TrapCode::UndefinedElement.into());
                    }
                    // Tables are never populated, so an in-bounds slot is
                    // always uninitialized.
                    return Err(TrapCode::ElemUninitialized.into());
                }

                opcode::DROP => {
                    self.pop_value()?;
                }
                opcode::SELECT => {
                    let condition: i32 = self.pop_as()?;
                    let right = self.pop_value()?;
                    let left = self.pop_value()?;
                    self.push_value(if condition != 0 { left } else { right })?;
                }

                opcode::LOCAL_GET => {
                    let index = r.read_var_u32()?;
                    let value = *ctx
                        .locals
                        .get(index as usize)
                        .ok_or_else(|| invalid_local(index))?;
                    self.push_value(value)?;
                }
                opcode::LOCAL_SET => {
                    let index = r.read_var_u32()?;
                    let value = self.pop_value()?;
                    *ctx.locals
                        .get_mut(index as usize)
                        .ok_or_else(|| invalid_local(index))? = value;
                }
                opcode::LOCAL_TEE => {
                    let index = r.read_var_u32()?;
                    let value = *self
                        .value_stack
                        .top()
                        .ok_or_else(|| Error::from(TrapCode::StackUnderflow))?;
                    *ctx.locals
                        .get_mut(index as usize)
                        .ok_or_else(|| invalid_local(index))? = value;
                }
                opcode::GLOBAL_GET => {
                    let index = r.read_var_u32()?;
                    let global = self
                        .instance
                        .global_by_index(index)
                        .ok_or_else(|| invalid_global(index))?;
                    self.push_value(global.get())?;
                }
                opcode::GLOBAL_SET => {
                    let index = r.read_var_u32()?;
                    let value = self.pop_value()?;
                    self.instance
                        .global_by_index(index)
                        .ok_or_else(|| invalid_global(index))?
                        .set(value)?;
                }

                opcode::I32_LOAD => self.op_load::<i32>(&mut r)?,
                opcode::I64_LOAD => self.op_load::<i64>(&mut r)?,
                opcode::F32_LOAD => self.op_load::<F32>(&mut r)?,
                opcode::F64_LOAD => self.op_load::<F64>(&mut r)?,
                opcode::I32_LOAD8_S => self.op_load_extend::<i8, i32>(&mut r)?,
                opcode::I32_LOAD8_U => self.op_load_extend::<u8, i32>(&mut r)?,
                opcode::I32_LOAD16_S => self.op_load_extend::<i16, i32>(&mut r)?,
                opcode::I32_LOAD16_U => self.op_load_extend::<u16, i32>(&mut r)?,
                opcode::I64_LOAD8_S => self.op_load_extend::<i8, i64>(&mut r)?,
                opcode::I64_LOAD8_U => self.op_load_extend::<u8, i64>(&mut r)?,
                opcode::I64_LOAD16_S => self.op_load_extend::<i16, i64>(&mut r)?,
                opcode::I64_LOAD16_U => self.op_load_extend::<u16, i64>(&mut r)?,
                opcode::I64_LOAD32_S => self.op_load_extend::<i32, i64>(&mut r)?,
                opcode::I64_LOAD32_U => self.op_load_extend::<u32, i64>(&mut r)?,
                opcode::I32_STORE => self.op_store::<i32>(&mut r)?,
                opcode::I64_STORE => self.op_store::<i64>(&mut r)?,
                opcode::F32_STORE => self.op_store::<F32>(&mut r)?,
                opcode::F64_STORE => self.op_store::<F64>(&mut r)?,
                opcode::I32_STORE8 => self.op_store_wrap::<i32, i8>(&mut r)?,
                opcode::I32_STORE16 => self.op_store_wrap::<i32, i16>(&mut r)?,
                opcode::I64_STORE8 => self.op_store_wrap::<i64, i8>(&mut r)?,
                opcode::I64_STORE16 => self.op_store_wrap::<i64, i16>(&mut r)?,
                opcode::I64_STORE32 => self.op_store_wrap::<i64, i32>(&mut r)?,

                opcode::MEMORY_SIZE => {
                    r.read_var_u32()?;
                    let memory = self.memory()?;
                    self.push_value(Value::I32(memory.current_size().0 as i32))?;
                }
                opcode::MEMORY_GROW => {
                    r.read_var_u32()?;
                    let pages: u32 = self.pop_as()?;
                    let memory = self.memory()?;
                    let result = match memory.grow(Pages(pages as usize)) {
                        Ok(Pages(previous)) => previous as i32,
                        Err(_) => -1,
                    };
                    self.push_value(Value::I32(result))?;
                }

                opcode::I32_CONST => {
                    let value = r.read_var_i32()?;
                    self.push_value(Value::I32(value))?;
                }
                opcode::I64_CONST => {
                    let value = r.read_var_i64()?;
                    self.push_value(Value::I64(value))?;
                }
                opcode::F32_CONST => {
                    let value = r.read_f32()?;
                    self.push_value(Value::F32(value))?;
                }
                opcode::F64_CONST => {
                    let value = r.read_f64()?;
                    self.push_value(Value::F64(value))?;
                }

                opcode::I32_EQZ => self.op_unop(|v: i32| v == 0)?,
                opcode::I32_EQ => self.op_relop(|l: i32, r: i32| l == r)?,
                opcode::I32_NE => self.op_relop(|l: i32, r: i32| l != r)?,
                opcode::I32_LT_S => self.op_relop(|l: i32, r: i32| l < r)?,
                opcode::I32_LT_U => self.op_relop(|l: u32, r: u32| l < r)?,
                opcode::I32_GT_S => self.op_relop(|l: i32, r: i32| l > r)?,
                opcode::I32_GT_U => self.op_relop(|l: u32, r: u32| l > r)?,
                opcode::I32_LE_S => self.op_relop(|l: i32, r: i32| l <= r)?,
                opcode::I32_LE_U => self.op_relop(|l: u32, r: u32| l <= r)?,
                opcode::I32_GE_S => self.op_relop(|l: i32, r: i32| l >= r)?,
                opcode::I32_GE_U => self.op_relop(|l: u32, r: u32| l >= r)?,
                opcode::I64_EQZ => self.op_unop(|v: i64| v == 0)?,
                opcode::I64_EQ => self.op_relop(|l: i64, r: i64| l == r)?,
                opcode::I64_NE => self.op_relop(|l: i64, r: i64| l != r)?,
                opcode::I64_LT_S => self.op_relop(|l: i64, r: i64| l < r)?,
                opcode::I64_LT_U => self.op_relop(|l: u64, r: u64| l < r)?,
                opcode::I64_GT_S => self.op_relop(|l: i64, r: i64| l > r)?,
                opcode::I64_GT_U => self.op_relop(|l: u64, r: u64| l > r)?,
                opcode::I64_LE_S => self.op_relop(|l: i64, r: i64| l <= r)?,
                opcode::I64_LE_U => self.op_relop(|l: u64, r: u64| l <= r)?,
                opcode::I64_GE_S => self.op_relop(|l: i64, r: i64| l >= r)?,
                opcode::I64_GE_U => self.op_relop(|l: u64, r: u64| l >= r)?,
                opcode::F32_EQ => self.op_relop(|l: F32, r: F32| l == r)?,
                opcode::F32_NE => self.op_relop(|l: F32, r: F32| l != r)?,
                opcode::F32_LT => self.op_relop(|l: F32, r: F32| l < r)?,
                opcode::F32_GT => self.op_relop(|l: F32, r: F32| l > r)?,
                opcode::F32_LE => self.op_relop(|l: F32, r: F32| l <= r)?,
                opcode::F32_GE => self.op_relop(|l: F32, r: F32| l >= r)?,
                opcode::F64_EQ => self.op_relop(|l: F64, r: F64| l == r)?,
                opcode::F64_NE => self.op_relop(|l: F64, r: F64| l != r)?,
                opcode::F64_LT => self.op_relop(|l: F64, r: F64| l < r)?,
                opcode::F64_GT => self.op_relop(|l: F64, r: F64| l > r)?,
                opcode::F64_LE => self.op_relop(|l: F64, r: F64| l <= r)?,
                opcode::F64_GE => self.op_relop(|l: F64, r: F64| l >= r)?,

                opcode::I32_CLZ => self.op_unop(|v: i32| Integer::leading_zeros(v))?,
                opcode::I32_CTZ => self.op_unop(|v: i32| Integer::trailing_zeros(v))?,
                opcode::I32_POPCNT => self.op_unop(|v: i32| Integer::count_ones(v))?,
                opcode::I32_ADD => self.op_binop(|l: i32, r: i32| ArithmeticOps::add(l, r))?,
                opcode::I32_SUB => self.op_binop(|l: i32, r: i32| ArithmeticOps::sub(l, r))?,
                opcode::I32_MUL => self.op_binop(|l: i32, r: i32| ArithmeticOps::mul(l, r))?,
                opcode::I32_DIV_S => self.op_div::<i32>()?,
                opcode::I32_DIV_U => self.op_div::<u32>()?,
                opcode::I32_REM_S => self.op_rem::<i32>()?,
                opcode::I32_REM_U => self.op_rem::<u32>()?,
                opcode::I32_AND => self.op_binop(|l: i32, r: i32| l & r)?,
                opcode::I32_OR => self.op_binop(|l: i32, r: i32| l | r)?,
                opcode::I32_XOR => self.op_binop(|l: i32, r: i32| l ^ r)?,
                opcode::I32_SHL => self.op_binop(|l: i32, r: i32| l.wrapping_shl(r as u32))?,
                opcode::I32_SHR_S => self.op_binop(|l: i32, r: i32| l.wrapping_shr(r as u32))?,
                opcode::I32_SHR_U => self.op_binop(|l: u32, r: u32| l.wrapping_shr(r))?,
                opcode::I32_ROTL => self.op_binop(|l: i32, r: i32| Integer::rotl(l, r))?,
                opcode::I32_ROTR => self.op_binop(|l: i32, r: i32| Integer::rotr(l, r))?,
                opcode::I64_CLZ => self.op_unop(|v: i64| Integer::leading_zeros(v))?,
                opcode::I64_CTZ => self.op_unop(|v: i64| Integer::trailing_zeros(v))?,
                opcode::I64_POPCNT => self.op_unop(|v: i64| Integer::count_ones(v))?,
                opcode::I64_ADD => self.op_binop(|l: i64, r: i64| ArithmeticOps::add(l, r))?,
                opcode::I64_SUB => self.op_binop(|l: i64, r: i64| ArithmeticOps::sub(l, r))?,
                opcode::I64_MUL => self.op_binop(|l: i64, r: i64| ArithmeticOps::mul(l, r))?,
                opcode::I64_DIV_S => self.op_div::<i64>()?,
                opcode::I64_DIV_U => self.op_div::<u64>()?,
                opcode::I64_REM_S => self.op_rem::<i64>()?,
                opcode::I64_REM_U => self.op_rem::<u64>()?,
                opcode::I64_AND => self.op_binop(|l: i64, r: i64| l & r)?,
                opcode::I64_OR => self.op_binop(|l: i64, r: i64| l | r)?,
                opcode::I64_XOR => self.op_binop(|l: i64, r: i64| l ^ r)?,
                opcode::I64_SHL => self.op_binop(|l: i64, r: i64| l.wrapping_shl(r as u32))?,
                opcode::I64_SHR_S => self.op_binop(|l: i64, r: i64| l.wrapping_shr(r as u32))?,
                opcode::I64_SHR_U => self.op_binop(|l: u64, r: u64| l.wrapping_shr(r as u32))?,
                opcode::I64_ROTL => self.op_binop(|l: i64, r: i64| Integer::rotl(l, r))?,
                opcode::I64_ROTR => self.op_binop(|l: i64, r: i64| Integer::rotr(l, r))?,

                opcode::F32_ABS => self.op_unop(|v: F32| Float::abs(v))?,
                opcode::F32_NEG => self.op_unop(|v: F32| -v)?,
                opcode::F32_CEIL => self.op_unop(|v: F32| Float::ceil(v))?,
                opcode::F32_FLOOR => self.op_unop(|v: F32| Float::floor(v))?,
                opcode::F32_TRUNC => self.op_unop(|v: F32| Float::trunc(v))?,
                opcode::F32_NEAREST => self.op_unop(|v: F32| Float::nearest(v))?,
                opcode::F32_SQRT => self.op_unop(|v: F32| Float::sqrt(v))?,
                opcode::F32_ADD => self.op_binop(|l: F32, r: F32| l + r)?,
                opcode::F32_SUB => self.op_binop(|l: F32, r: F32| l - r)?,
                opcode::F32_MUL => self.op_binop(|l: F32, r: F32| l * r)?,
                opcode::F32_DIV => self.op_binop(|l: F32, r: F32| l / r)?,
                opcode::F32_MIN => self.op_binop(|l: F32, r: F32| Float::min(l, r))?,
                opcode::F32_MAX => self.op_binop(|l: F32, r: F32| Float::max(l, r))?,
                opcode::F32_COPYSIGN => self.op_binop(|l: F32, r: F32| Float::copysign(l, r))?,
                opcode::F64_ABS => self.op_unop(|v: F64| Float::abs(v))?,
                opcode::F64_NEG => self.op_unop(|v: F64| -v)?,
                opcode::F64_CEIL => self.op_unop(|v: F64| Float::ceil(v))?,
                opcode::F64_FLOOR => self.op_unop(|v: F64| Float::floor(v))?,
                opcode::F64_TRUNC => self.op_unop(|v: F64| Float::trunc(v))?,
                opcode::F64_NEAREST => self.op_unop(|v: F64| Float::nearest(v))?,
                opcode::F64_SQRT => self.op_unop(|v: F64| Float::sqrt(v))?,
                opcode::F64_ADD => self.op_binop(|l: F64, r: F64| l + r)?,
                opcode::F64_SUB => self.op_binop(|l: F64, r: F64| l - r)?,
                opcode::F64_MUL => self.op_binop(|l: F64, r: F64| l * r)?,
                opcode::F64_DIV => self.op_binop(|l: F64, r: F64| l / r)?,
                opcode::F64_MIN => self.op_binop(|l: F64, r: F64| Float::min(l, r))?,
                opcode::F64_MAX => self.op_binop(|l: F64, r: F64| Float::max(l, r))?,
                opcode::F64_COPYSIGN => self.op_binop(|l: F64, r: F64| Float::copysign(l, r))?,

                opcode::I32_WRAP_I64 => self.op_wrap::<i64, i32>()?,
                opcode::I32_TRUNC_F32_S => self.op_trunc_to_int::<F32, i32>()?,
                opcode::I32_TRUNC_F32_U => self.op_trunc_to_int::<F32, u32>()?,
                opcode::I32_TRUNC_F64_S => self.op_trunc_to_int::<F64, i32>()?,
                opcode::I32_TRUNC_F64_U => self.op_trunc_to_int::<F64, u32>()?,
                opcode::I64_EXTEND_I32_S => self.op_extend::<i32, i64>()?,
                opcode::I64_EXTEND_I32_U => self.op_extend::<u32, i64>()?,
                opcode::I64_TRUNC_F32_S => self.op_trunc_to_int::<F32, i64>()?,
                opcode::I64_TRUNC_F32_U => self.op_trunc_to_int::<F32, u64>()?,
                opcode::I64_TRUNC_F64_S => self.op_trunc_to_int::<F64, i64>()?,
                opcode::I64_TRUNC_F64_U => self.op_trunc_to_int::<F64, u64>()?,
                opcode::F32_CONVERT_I32_S => self.op_extend::<i32, F32>()?,
                opcode::F32_CONVERT_I32_U => self.op_extend::<u32, F32>()?,
                opcode::F32_CONVERT_I64_S => self.op_extend::<i64, F32>()?,
                opcode::F32_CONVERT_I64_U => self.op_extend::<u64, F32>()?,
                opcode::F32_DEMOTE_F64 => self.op_wrap::<F64, F32>()?,
                opcode::F64_CONVERT_I32_S => self.op_extend::<i32, F64>()?,
                opcode::F64_CONVERT_I32_U => self.op_extend::<u32, F64>()?,
                opcode::F64_CONVERT_I64_S => self.op_extend::<i64, F64>()?,
                opcode::F64_CONVERT_I64_U => self.op_extend::<u64, F64>()?,
                opcode::F64_PROMOTE_F32 => self.op_extend::<F32, F64>()?,
                opcode::I32_REINTERPRET_F32 => self.op_reinterpret::<F32, i32>()?,
                opcode::I64_REINTERPRET_F64 => self.op_reinterpret::<F64, i64>()?,
                opcode::F32_REINTERPRET_I32 => self.op_reinterpret::<i32, F32>()?,
                opcode::F64_REINTERPRET_I64 => self.op_reinterpret::<i64, F64>()?,

                opcode::I32_EXTEND8_S => {
                    self.op_unop(|v: i32| SignExtendFrom::<i8>::sign_extend_from(v))?
                }
                opcode::I32_EXTEND16_S => {
                    self.op_unop(|v: i32| SignExtendFrom::<i16>::sign_extend_from(v))?
                }
                opcode::I64_EXTEND8_S => {
                    self.op_unop(|v: i64| SignExtendFrom::<i8>::sign_extend_from(v))?
                }
                opcode::I64_EXTEND16_S => {
                    self.op_unop(|v: i64| SignExtendFrom::<i16>::sign_extend_from(v))?
                }
                opcode::I64_EXTEND32_S => {
                    self.op_unop(|v: i64| SignExtendFrom::<i32>::sign_extend_from(v))?
                }

                unknown => {
                    return Err(DecodeError::new(
                        DecodeErrorKind::UnknownOpcode(unknown),
                        opcode_offset,
                    )
                    .into())
                }
            }
        }
    }

    fn memory(&self) -> Result<MemoryRef, Error> {
        self.instance
            .memory_by_index(DEFAULT_MEMORY_INDEX)
            .ok_or_else(|| Error::Memory("module declares no linear memory".into()))
    }

    fn push_value(&mut self, value: Value) -> Result<(), Error> {
        self.value_stack
            .push(value)
            .map_err(|_| TrapCode::StackOverflow.into())
    }

    fn pop_value(&mut self) -> Result<Value, Error> {
        self.value_stack
            .pop()
            .ok_or_else(|| TrapCode::StackUnderflow.into())
    }

    fn pop_as<T: FromValue>(&mut self) -> Result<T, Error> {
        let value = self.pop_value()?;
        value.try_into().ok_or_else(|| {
            Error::Value(format!(
                "unexpected {:?} on the operand stack",
                value.value_type()
            ))
        })
    }

    fn pop_pair_as<T: FromValue>(&mut self) -> Result<(T, T), Error> {
        let right = self.pop_as()?;
        let left = self.pop_as()?;
        Ok((left, right))
    }

    fn op_unop<T, U, F>(&mut self, f: F) -> Result<(), Error>
    where
        T: FromValue,
        F: FnOnce(T) -> U,
        Value: From<U>,
    {
        let value = self.pop_as::<T>()?;
        self.push_value(f(value).into())
    }

    fn op_binop<T, F>(&mut self, f: F) -> Result<(), Error>
    where
        T: FromValue,
        F: FnOnce(T, T) -> T,
        Value: From<T>,
    {
        let (left, right) = self.pop_pair_as::<T>()?;
        self.push_value(f(left, right).into())
    }

    fn op_relop<T, F>(&mut self, f: F) -> Result<(), Error>
    where
        T: FromValue,
        F: FnOnce(T, T) -> bool,
    {
        let (left, right) = self.pop_pair_as::<T>()?;
        self.push_value(f(left, right).into())
    }

    fn op_div<T>(&mut self) -> Result<(), Error>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        let (left, right) = self.pop_pair_as::<T>()?;
        let value = left.div(right)?;
        self.push_value(value.into())
    }

    fn op_rem<T>(&mut self) -> Result<(), Error>
    where
        T: FromValue + Integer<T>,
        Value: From<T>,
    {
        let (left, right) = self.pop_pair_as::<T>()?;
        let value = left.rem(right)?;
        self.push_value(value.into())
    }

    fn op_wrap<T, U>(&mut self) -> Result<(), Error>
    where
        T: FromValue + WrapInto<U>,
        Value: From<U>,
    {
        let value = self.pop_as::<T>()?;
        self.push_value(value.wrap_into().into())
    }

    fn op_extend<T, U>(&mut self) -> Result<(), Error>
    where
        T: FromValue + ExtendInto<U>,
        Value: From<U>,
    {
        let value = self.pop_as::<T>()?;
        self.push_value(value.extend_into().into())
    }

    fn op_trunc_to_int<T, U>(&mut self) -> Result<(), Error>
    where
        T: FromValue + TryTruncateInto<U, TrapCode>,
        Value: From<U>,
    {
        let value = self.pop_as::<T>()?;
        let truncated = value.try_truncate_into()?;
        self.push_value(truncated.into())
    }

    fn op_reinterpret<T, U>(&mut self) -> Result<(), Error>
    where
        T: FromValue + TransmuteInto<U>,
        Value: From<U>,
    {
        let value = self.pop_as::<T>()?;
        self.push_value(value.transmute_into().into())
    }

    /// Reads a memarg and performs a plain load of `T`.
    fn op_load<T>(&mut self, r: &mut BinaryReader) -> Result<(), Error>
    where
        T: LittleEndianConvert,
        Value: From<T>,
    {
        let offset = read_memarg(r)?;
        let base: u32 = self.pop_as()?;
        let address = effective_address(base, offset);
        let memory = self.memory()?;
        let value: T = memory.get_value(address)?;
        self.push_value(value.into())
    }

    /// Reads a memarg and performs a narrow load of `T`, widened into `U`.
    fn op_load_extend<T, U>(&mut self, r: &mut BinaryReader) -> Result<(), Error>
    where
        T: LittleEndianConvert + ExtendInto<U>,
        Value: From<U>,
    {
        let offset = read_memarg(r)?;
        let base: u32 = self.pop_as()?;
        let address = effective_address(base, offset);
        let memory = self.memory()?;
        let value: T = memory.get_value(address)?;
        let widened: U = value.extend_into();
        self.push_value(widened.into())
    }

    /// Reads a memarg and performs a plain store of `T`.
    fn op_store<T>(&mut self, r: &mut BinaryReader) -> Result<(), Error>
    where
        T: FromValue + LittleEndianConvert,
    {
        let offset = read_memarg(r)?;
        let value = self.pop_as::<T>()?;
        let base: u32 = self.pop_as()?;
        let address = effective_address(base, offset);
        let memory = self.memory()?;
        memory.set_value(address, value)?;
        Ok(())
    }

    /// Reads a memarg and performs a narrow store: `T` truncated to `U`.
    fn op_store_wrap<T, U>(&mut self, r: &mut BinaryReader) -> Result<(), Error>
    where
        T: FromValue + WrapInto<U>,
        U: LittleEndianConvert,
    {
        let offset = read_memarg(r)?;
        let value = self.pop_as::<T>()?.wrap_into();
        let base: u32 = self.pop_as()?;
        let address = effective_address(base, offset);
        let memory = self.memory()?;
        memory.set_value(address, value)?;
        Ok(())
    }
}

/// Reads a memarg, discarding the advisory alignment hint.
fn read_memarg(r: &mut BinaryReader) -> Result<u32, DecodeError> {
    r.read_var_u32()?;
    r.read_var_u32()
}

/// The effective address of a memory access: base plus static offset, both
/// unsigned 32-bit, wrapping.
fn effective_address(base: u32, offset: u32) -> u32 {
    base.wrapping_add(offset)
}

fn invalid_local(index: u32) -> Error {
    Error::Function(format!("local {} out of range", index))
}

fn invalid_global(index: u32) -> Error {
    Error::Global(format!("global {} out of range", index))
}
