//! The bytecode interpreter.
//!
//! One dispatch loop per context. Frames share a single operand stack:
//! locals occupy `[stack_base, stack_base + var_count)` (except module
//! frames, whose locals live in their ModuleObject), operands pile on top.
//! Suspension (generators, await) detaches the frame region into a heap
//! object; resumption copies it back.
//!
//! Safepoints sit between instructions: the loop head consumes pending
//! garbage collections (walking every root the context owns) and checks the
//! host's cooperative interrupt flag.

mod call;
mod exceptions;
mod natives;
mod ops;

use crate::{
    bytecode::{FunctionDefId, Opcode},
    context::Context,
    error::{RunError, RunResult},
    heap::HeapData,
    object::{ModuleState, PropKey},
    value::Value,
};

/// Control transfer parked while finally blocks run.
#[derive(Debug)]
pub(crate) enum PendingControl {
    /// Commit a jump to this pc once the finally chain completes.
    Goto(u32),
    /// Return this value through the remaining finallys.
    Return(Value),
    /// Re-raise after the finally completes.
    Throw(RunError),
}

impl PendingControl {
    fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        match self {
            Self::Goto(_) => {}
            Self::Return(value) => f(value),
            Self::Throw(RunError::Throw(value, _)) => f(value),
            Self::Throw(_) => {}
        }
    }
}

/// What to do with a frame's return value.
#[derive(Debug)]
pub(crate) enum ReturnMode {
    /// Push the returned value to the caller.
    Normal,
    /// Module body: mark evaluated; the caller (an importing frame) receives
    /// the module object, optionally boxed in a resolved promise
    /// (`GetModuleAsync`). The outermost run receives the completion value.
    Module { module: Value, as_promise: bool },
    /// Constructor: the caller receives `this` unless an object was
    /// explicitly returned.
    Ctor { this: Value },
    /// Generator body completed: close the generator; the caller receives
    /// `{value, done: true}` (or the raw pair for `for-of` drives).
    Generator { r#gen: Value, pair: bool },
    /// Async body completed: resolve the promise; the caller (if any)
    /// receives the promise.
    Async { r#gen: Value },
}

impl ReturnMode {
    fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        match self {
            Self::Normal => {}
            Self::Module { module, .. } => f(module),
            Self::Ctor { this } => f(this),
            Self::Generator { r#gen, .. } => f(r#gen),
            Self::Async { r#gen } => f(r#gen),
        }
    }
}

/// One activation record.
#[derive(Debug)]
pub(crate) struct Frame {
    pub func: FunctionDefId,
    /// The closure/function value invoked, for traces and `GetSuper`.
    pub function: Value,
    pub this_val: Value,
    pub ip: usize,
    /// Operand-stack index where this frame's region begins.
    pub stack_base: usize,
    /// `Ref(ModuleObject)` for module frames: locals live in the module's
    /// variable array instead of the stack.
    pub module_vars: Value,
    /// `Ref(GeneratorObject)` when this frame drives a generator or async
    /// body.
    pub generator: Value,
    pub return_mode: ReturnMode,
    /// The finally region currently being run for a parked transfer.
    pub finally_chain: Option<(u32, u32)>,
    pub pending: Option<PendingControl>,
    /// Drop the return value instead of pushing it (setter invocations).
    pub discard_return: bool,
}

impl Frame {
    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        f(&mut self.function);
        f(&mut self.this_val);
        f(&mut self.module_vars);
        f(&mut self.generator);
        self.return_mode.trace(f);
        if let Some(pending) = &mut self.pending {
            pending.trace(f);
        }
    }
}

/// The interpreter over one context.
pub(crate) struct Vm<'c, 'r> {
    pub(crate) ctx: &'c mut Context<'r>,
    /// Instruction counter for periodic interrupt checks.
    ticks: u64,
}

/// Applies the root-walk visitor to every root the context owns. The
/// fields are destructured at the call site so the heap can be borrowed
/// separately.
macro_rules! walk_roots {
    ($stack:expr, $frames:expr, $globals:expr, $module_cache:expr, $microtasks:expr, $class_protos:expr, $def_prototypes:expr, $string_proto:expr, $visit:ident) => {{
        for value in $stack.iter_mut() {
            $visit(value);
        }
        for frame in $frames.iter_mut() {
            frame.trace($visit);
        }
        for value in $globals.values_mut() {
            $visit(value);
        }
        for value in $module_cache.values_mut() {
            $visit(value);
        }
        for task in $microtasks.iter_mut() {
            task.trace($visit);
        }
        for value in $class_protos.iter_mut() {
            $visit(value);
        }
        for value in $def_prototypes.values_mut() {
            $visit(value);
        }
        $visit($string_proto);
    }};
}

impl<'c, 'r> Vm<'c, 'r> {
    pub fn new(ctx: &'c mut Context<'r>) -> Self {
        Self { ctx, ticks: 0 }
    }

    /// Evaluates a module body (once), drains microtasks, and returns the
    /// module's completion value.
    pub fn run_module(&mut self, module: Value) -> RunResult<Value> {
        let Value::Ref(module_id) = module else {
            return Err(RunError::type_error("call_module expects a module value"));
        };
        let (def_id, state) = match self.ctx.heap.get(module_id) {
            HeapData::Module(m) => (self.ctx.defs.module(m.def).main, m.state),
            _ => return Err(RunError::type_error("call_module expects a module value")),
        };
        if state == ModuleState::Evaluated {
            return Ok(Value::Undefined);
        }
        self.push_module_frame(def_id, module, false);
        let value = self.execute()?;
        self.drain_microtasks()?;
        Ok(value)
    }

    fn push_module_frame(&mut self, main: FunctionDefId, module: Value, as_promise: bool) {
        if let Value::Ref(id) = module
            && let HeapData::Module(m) = self.ctx.heap.get_mut(id)
        {
            m.state = ModuleState::Evaluating;
        }
        let stack_base = self.ctx.stack.len();
        self.ctx.frames.push(Frame {
            func: main,
            function: Value::Undefined,
            this_val: Value::Undefined,
            ip: 0,
            stack_base,
            module_vars: module,
            generator: Value::Undefined,
            return_mode: ReturnMode::Module { module, as_promise },
            finally_chain: None,
            pending: None,
            discard_return: false,
        });
        let depth = self.ctx.frames.len();
        self.ctx.tracer.on_call(depth);
    }

    /// Runs until the frame stack empties; the last delivered value is the
    /// result.
    pub(crate) fn execute(&mut self) -> RunResult<Value> {
        loop {
            if self.ctx.frames.is_empty() {
                return Ok(self.ctx.stack.pop().unwrap_or(Value::Undefined));
            }
            self.safepoint()?;
            if let Err(err) = self.step() {
                if let Some(fatal) = self.handle_error(err) {
                    return Err(fatal);
                }
            }
        }
    }

    /// GC and interrupt checks between instructions. All live values are on
    /// the operand stack or in frames here, so relocation is safe.
    fn safepoint(&mut self) -> RunResult<()> {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks & 0x3F == 0 && self.ctx.interrupt.load(std::sync::atomic::Ordering::Relaxed) {
            self.ctx.interrupt.store(false, std::sync::atomic::Ordering::Relaxed);
            return Err(RunError::Interrupted);
        }
        if let Some(kind) = self.ctx.heap.pending() {
            let Context {
                heap,
                stack,
                frames,
                globals,
                module_cache,
                microtasks,
                class_protos,
                def_prototypes,
                string_proto,
                ..
            } = &mut *self.ctx;
            match kind {
                crate::heap::PendingGc::Minor => {
                    heap.collect_minor(|visit| {
                        walk_roots!(stack, frames, globals, module_cache, microtasks, class_protos, def_prototypes, string_proto, visit);
                    });
                }
                crate::heap::PendingGc::Major => {
                    heap.collect_major(|visit| {
                        walk_roots!(stack, frames, globals, module_cache, microtasks, class_protos, def_prototypes, string_proto, visit);
                    });
                }
            }
            self.ctx.tracer.on_gc(kind);
        }
        Ok(())
    }

    // --- operand fetch ---

    /// Splits the context borrow into the current frame and its function
    /// definition.
    fn frame_and_def(&mut self) -> (&mut Frame, &crate::bytecode::FunctionDef) {
        let ctx = &mut *self.ctx;
        let frame = ctx.frames.last_mut().expect("no active frame");
        let def = &ctx.defs.funcs[frame.func.0 as usize];
        (frame, def)
    }

    pub(crate) fn frame(&self) -> &Frame {
        self.ctx.frames.last().expect("no active frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut Frame {
        self.ctx.frames.last_mut().expect("no active frame")
    }

    fn fetch_opcode(&mut self) -> RunResult<(Opcode, u32)> {
        let (frame, def) = self.frame_and_def();
        let pc = frame.ip;
        let byte = *def
            .bytecode
            .get(pc)
            .ok_or_else(|| RunError::internal(format!("pc {pc} out of bytecode range")))?;
        frame.ip += 1;
        let op = Opcode::from_repr(byte).ok_or_else(|| RunError::internal(format!("unknown opcode byte {byte}")))?;
        Ok((op, u32::try_from(pc).expect("pc exceeds u32")))
    }

    fn fetch_u8(&mut self) -> u8 {
        let (frame, def) = self.frame_and_def();
        let byte = def.bytecode[frame.ip];
        frame.ip += 1;
        byte
    }

    fn fetch_u16(&mut self) -> u16 {
        let (frame, def) = self.frame_and_def();
        let bytes = [def.bytecode[frame.ip], def.bytecode[frame.ip + 1]];
        frame.ip += 2;
        u16::from_le_bytes(bytes)
    }

    fn fetch_i16(&mut self) -> i16 {
        let (frame, def) = self.frame_and_def();
        let bytes = [def.bytecode[frame.ip], def.bytecode[frame.ip + 1]];
        frame.ip += 2;
        i16::from_le_bytes(bytes)
    }

    fn fetch_u32(&mut self) -> u32 {
        let (frame, def) = self.frame_and_def();
        let bytes = [
            def.bytecode[frame.ip],
            def.bytecode[frame.ip + 1],
            def.bytecode[frame.ip + 2],
            def.bytecode[frame.ip + 3],
        ];
        frame.ip += 4;
        u32::from_le_bytes(bytes)
    }

    fn jump_relative(&mut self, offset: i16) {
        let frame = self.frame_mut();
        let ip = i64::try_from(frame.ip).expect("ip exceeds i64") + i64::from(offset);
        frame.ip = usize::try_from(ip).expect("jump produced a negative pc");
    }

    // --- stack helpers ---

    pub(crate) fn push(&mut self, value: Value) {
        self.ctx.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> RunResult<Value> {
        self.ctx
            .stack
            .pop()
            .ok_or_else(|| RunError::internal("operand stack underflow"))
    }

    pub(crate) fn peek(&self) -> RunResult<Value> {
        self.ctx
            .stack
            .last()
            .copied()
            .ok_or_else(|| RunError::internal("operand stack underflow"))
    }

    /// Operand-stack index where the current frame's operands begin (above
    /// its locals).
    fn operand_floor(&self) -> usize {
        let frame = self.frame();
        if matches!(frame.module_vars, Value::Ref(_)) {
            frame.stack_base
        } else {
            let def = &self.ctx.defs.funcs[frame.func.0 as usize];
            frame.stack_base + def.var_count as usize
        }
    }

    // --- one instruction ---

    fn step(&mut self) -> RunResult<()> {
        // Finally-chain commit: a parked transfer resumes when the pc
        // reaches the end of the finally region being run.
        if let Some((_, end)) = self.frame().finally_chain {
            let ip = u32::try_from(self.frame().ip).expect("ip exceeds u32");
            if ip == end && self.frame().pending.is_some() {
                return self.commit_finally();
            }
        }

        let (op, op_pc) = self.fetch_opcode()?;
        let tracer_pc = op_pc as usize;
        self.ctx.tracer.on_instruction(tracer_pc);

        match op {
            Opcode::Nop | Opcode::TryBegin | Opcode::TryEnd => {}

            // --- constants ---
            Opcode::CLoad0 => self.push_const(0),
            Opcode::CLoad1 => self.push_const(1),
            Opcode::CLoad2 => self.push_const(2),
            Opcode::CLoad3 => self.push_const(3),
            Opcode::CLoad4 => self.push_const(4),
            Opcode::CLoad5 => self.push_const(5),
            Opcode::CLoad => {
                let index = u32::from(self.fetch_u16());
                self.push_const(index);
            }
            Opcode::CLoadW | Opcode::CLoadD => {
                let index = self.fetch_u32();
                self.push_const(index);
            }
            Opcode::Closure => {
                let index = self.fetch_u32();
                self.op_closure(index)?;
            }
            Opcode::Undefined => self.push(Value::Undefined),

            // --- locals ---
            Opcode::VarLoad => {
                let slot = self.fetch_u16();
                self.op_var_load(slot)?;
            }
            Opcode::VarStore => {
                let slot = self.fetch_u16();
                self.op_var_store(slot)?;
            }

            // --- globals ---
            Opcode::GetGlobal => {
                let name = self.fetch_u32();
                self.op_get_global(name, false)?;
            }
            Opcode::GetGlobalSoft => {
                let name = self.fetch_u32();
                self.op_get_global(name, true)?;
            }
            Opcode::SetGlobal => {
                let name = self.fetch_u32();
                let value = self.pop()?;
                let name_id = crate::intern::StringId::from_raw(name);
                self.ctx.globals.insert(name_id, value);
            }

            // --- properties ---
            Opcode::PropertyLoad => {
                let name = self.fetch_u32();
                let object = self.pop()?;
                let key = PropKey::Str(crate::intern::StringId::from_raw(name));
                self.op_property_load(object, key)?;
            }
            Opcode::PropertyStore => {
                let name = self.fetch_u32();
                let value = self.pop()?;
                let object = self.pop()?;
                let key = PropKey::Str(crate::intern::StringId::from_raw(name));
                self.op_property_store(object, key, value)?;
            }
            Opcode::IndexedLoad => {
                let key = self.pop()?;
                let object = self.pop()?;
                self.op_indexed_load(object, key)?;
            }
            Opcode::IndexedStore => {
                let value = self.pop()?;
                let key = self.pop()?;
                let object = self.pop()?;
                self.op_indexed_store(object, key, value)?;
            }
            Opcode::BindImport => {
                let name = self.fetch_u32();
                self.op_bind_import(crate::intern::StringId::from_raw(name))?;
            }
            Opcode::DeleteProperty => {
                let name = self.fetch_u32();
                let object = self.pop()?;
                let key = PropKey::Str(crate::intern::StringId::from_raw(name));
                let removed = self.op_delete(object, key)?;
                self.push(Value::Bool(removed));
            }
            Opcode::DeleteIndexed => {
                let key = self.pop()?;
                let object = self.pop()?;
                let prop_key = self.value_to_prop_key(key)?;
                let removed = self.op_delete(object, prop_key)?;
                self.push(Value::Bool(removed));
            }

            // --- arithmetic / comparison / bitwise ---
            Opcode::Add => self.binary_op(ops::BinaryKind::Add)?,
            Opcode::Sub => self.binary_op(ops::BinaryKind::Sub)?,
            Opcode::Mul => self.binary_op(ops::BinaryKind::Mul)?,
            Opcode::Div => self.binary_op(ops::BinaryKind::Div)?,
            Opcode::Rem => self.binary_op(ops::BinaryKind::Rem)?,
            Opcode::Exp => self.binary_op(ops::BinaryKind::Exp)?,
            Opcode::Neg => self.unary_numeric(ops::UnaryKind::Neg)?,
            Opcode::ToNumber => self.unary_numeric(ops::UnaryKind::ToNumber)?,
            Opcode::Inc => self.unary_numeric(ops::UnaryKind::Inc)?,
            Opcode::Dec => self.unary_numeric(ops::UnaryKind::Dec)?,
            Opcode::Eq => self.equality_op(false, false)?,
            Opcode::Ne => self.equality_op(false, true)?,
            Opcode::StrictEq => self.equality_op(true, false)?,
            Opcode::StrictNe => self.equality_op(true, true)?,
            Opcode::Lt => self.binary_op(ops::BinaryKind::Lt)?,
            Opcode::Le => self.binary_op(ops::BinaryKind::Le)?,
            Opcode::Gt => self.binary_op(ops::BinaryKind::Gt)?,
            Opcode::Ge => self.binary_op(ops::BinaryKind::Ge)?,
            Opcode::InOp => self.op_in()?,
            Opcode::InstanceOf => self.op_instanceof()?,
            Opcode::BitAnd => self.binary_op(ops::BinaryKind::BitAnd)?,
            Opcode::BitOr => self.binary_op(ops::BinaryKind::BitOr)?,
            Opcode::BitXor => self.binary_op(ops::BinaryKind::BitXor)?,
            Opcode::BitNot => self.unary_numeric(ops::UnaryKind::BitNot)?,
            Opcode::Shl => self.binary_op(ops::BinaryKind::Shl)?,
            Opcode::Shr => self.binary_op(ops::BinaryKind::Shr)?,
            Opcode::UShr => self.binary_op(ops::BinaryKind::UShr)?,

            // --- logic / stack ---
            Opcode::Not => {
                let value = self.pop()?;
                let truthy = value.is_truthy(&self.ctx.heap, &self.ctx.interns);
                self.push(Value::Bool(!truthy));
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let value = self.peek()?;
                self.push(value);
            }
            Opcode::Dup2 => {
                let len = self.ctx.stack.len();
                if len < 2 {
                    return Err(RunError::internal("operand stack underflow"));
                }
                let a = self.ctx.stack[len - 2];
                let b = self.ctx.stack[len - 1];
                self.push(a);
                self.push(b);
            }
            Opcode::Swap => {
                let len = self.ctx.stack.len();
                if len < 2 {
                    return Err(RunError::internal("operand stack underflow"));
                }
                self.ctx.stack.swap(len - 2, len - 1);
            }
            Opcode::ToString => {
                let value = self.pop()?;
                let string = self.to_string_value(value);
                self.push(string);
            }
            Opcode::TypeOf => {
                let value = self.pop()?;
                let name = value.type_of(&self.ctx.heap);
                let id = self.ctx.interns.intern(name);
                self.push(Value::String(id));
            }

            // --- control flow ---
            Opcode::Goto => {
                let offset = self.fetch_i16();
                self.jump_relative(offset);
            }
            Opcode::IfEq => {
                let offset = self.fetch_i16();
                let value = self.pop()?;
                if !value.is_truthy(&self.ctx.heap, &self.ctx.interns) {
                    self.jump_relative(offset);
                }
            }
            Opcode::IfTrue => {
                let offset = self.fetch_i16();
                let value = self.pop()?;
                if value.is_truthy(&self.ctx.heap, &self.ctx.interns) {
                    self.jump_relative(offset);
                }
            }
            Opcode::JumpIfTrueOrPop => {
                let offset = self.fetch_i16();
                let value = self.peek()?;
                if value.is_truthy(&self.ctx.heap, &self.ctx.interns) {
                    self.jump_relative(offset);
                } else {
                    self.pop()?;
                }
            }
            Opcode::JumpIfFalseOrPop => {
                let offset = self.fetch_i16();
                let value = self.peek()?;
                if value.is_truthy(&self.ctx.heap, &self.ctx.interns) {
                    self.pop()?;
                } else {
                    self.jump_relative(offset);
                }
            }
            Opcode::JumpNotNullishOrPop => {
                let offset = self.fetch_i16();
                let value = self.peek()?;
                if value.is_nullish() {
                    self.pop()?;
                } else {
                    self.jump_relative(offset);
                }
            }
            Opcode::OptionalJump => {
                let offset = self.fetch_i16();
                let value = self.peek()?;
                if value.is_nullish() {
                    self.pop()?;
                    self.push(Value::Undefined);
                    self.jump_relative(offset);
                }
            }

            // --- literals ---
            Opcode::ArrayNew => {
                let count = self.fetch_u16();
                self.op_array_new(count as usize)?;
            }
            Opcode::ArrayPush => self.op_array_push()?,
            Opcode::ArraySpread => self.op_array_spread()?,
            Opcode::ObjectNew => {
                let pairs = self.fetch_u16();
                self.op_object_new(pairs as usize)?;
            }
            Opcode::DefineAccessor => {
                let flag = self.fetch_u8();
                self.op_define_accessor(flag)?;
            }

            // --- iteration ---
            Opcode::GetIterator => self.op_get_iterator()?,
            Opcode::IteratorNext => self.op_iterator_next()?,
            Opcode::EnumKeys => self.op_enum_keys()?,

            // --- calls ---
            Opcode::FunctionCall => self.op_function_call()?,
            Opcode::CallSpread => self.op_call_spread()?,
            Opcode::New => self.op_new()?,
            Opcode::NewSpread => self.op_new_spread()?,
            Opcode::Return => {
                let value = self.pop()?;
                self.do_return(value)?;
            }

            // --- classes ---
            Opcode::MakeClass => {
                let name = self.fetch_u32();
                self.op_make_class(crate::intern::StringId::from_raw(name))?;
            }
            Opcode::DefineMethod => {
                let name = self.fetch_u32();
                let flags = self.fetch_u8();
                let key = PropKey::Str(crate::intern::StringId::from_raw(name));
                let function = self.pop()?;
                self.op_define_method(key, function, flags)?;
            }
            Opcode::DefineMethodComputed => {
                let flags = self.fetch_u8();
                let function = self.pop()?;
                let key = self.pop()?;
                let key = self.value_to_prop_key(key)?;
                self.op_define_method(key, function, flags)?;
            }

            // --- exceptions ---
            Opcode::Throw => {
                let value = self.pop()?;
                return Err(RunError::Throw(value, Vec::new()));
            }
            Opcode::FinallyGoto => {
                let offset = self.fetch_i16();
                let frame = self.frame();
                let target_i64 = i64::try_from(frame.ip).expect("ip exceeds i64") + i64::from(offset);
                let target = u32::try_from(target_i64).expect("finally target out of range");
                self.op_finally_goto(op_pc, target)?;
            }
            Opcode::FinallyReturn => {
                let value = self.pop()?;
                self.op_finally_return(op_pc, value)?;
            }

            // --- coroutines ---
            Opcode::Yield => self.op_yield()?,
            Opcode::Await => self.op_await()?,

            // --- modules ---
            Opcode::GetModule => self.op_get_module(false)?,
            Opcode::GetModuleAsync => self.op_get_module(true)?,

            // --- meta ---
            Opcode::GetThis | Opcode::GetOuterThis => {
                let this = self.frame().this_val;
                self.push(this);
            }
            Opcode::GetSuper => self.op_get_super()?,
        }
        Ok(())
    }

    fn push_const(&mut self, index: u32) {
        let value = self.ctx.pool.get(index);
        self.push(value);
    }

    /// Builds a string value, preferring the heap for computed strings.
    pub(crate) fn to_string_value(&mut self, value: Value) -> Value {
        match value {
            Value::String(_) => value,
            Value::Ref(id) if matches!(self.ctx.heap.get(id), HeapData::Str(_)) => value,
            other => {
                let s = crate::value::to_js_string(other, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs);
                self.alloc_string(s)
            }
        }
    }

    pub(crate) fn alloc_string(&mut self, s: String) -> Value {
        // Short strings intern (cheap equality); longer ones live on the
        // heap.
        if s.len() <= 8 {
            Value::String(self.ctx.interns.intern(&s))
        } else {
            Value::Ref(self.ctx.heap.alloc(HeapData::Str(s)))
        }
    }

    /// Converts an arbitrary key value to a property key (numbers become
    /// their canonical string form).
    pub(crate) fn value_to_prop_key(&mut self, key: Value) -> RunResult<PropKey> {
        match key {
            Value::Symbol(id) => Ok(PropKey::Sym(id)),
            Value::String(id) => Ok(PropKey::Str(id)),
            other => {
                let s = crate::value::to_js_string(other, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs);
                Ok(PropKey::Str(self.ctx.interns.intern(&s)))
            }
        }
    }
}
