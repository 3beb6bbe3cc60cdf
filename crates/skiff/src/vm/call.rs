//! Call dispatch and frame management: bytecode functions, closures,
//! constructors, native functions, generator instantiation and resumption,
//! async bodies, promises, and module loading.

use smallvec::SmallVec;

use crate::{
    bytecode::{FunctionDefId, ModuleId},
    context::{Microtask, NativeKind},
    error::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::StaticStrings,
    object::{
        ClassId, FunctionObject, GeneratorObject, GeneratorState, JsObject, ModuleState, PromiseObject, PromiseState,
        PropKey, PropSlot, Reaction,
    },
    value::{NativeFnId, Value},
    vm::{Frame, ReturnMode, Vm},
};

/// How a suspended generator is being re-entered.
#[derive(Debug)]
pub(crate) enum Resume {
    Next(Value),
    Throw(Value),
    Return(Value),
}

/// Result of a native-function dispatch.
pub(crate) enum NativeOutcome {
    /// Push this value (unless the call discards its result).
    Value(Value),
    /// A frame was pushed, or the native already arranged the stack.
    Handled,
}

/// Argument pack popped off the operand stack for a native call; calls
/// rarely carry more than a handful of values.
pub(crate) type NativeArgs = SmallVec<[Value; 8]>;

impl Vm<'_, '_> {
    // --- call opcodes ---

    pub(crate) fn op_function_call(&mut self) -> RunResult<()> {
        let this = self.pop()?;
        let callee = self.pop()?;
        let argc = self.pop_argc()?;
        self.dispatch_call(callee, this, argc, false, false)
    }

    pub(crate) fn op_call_spread(&mut self) -> RunResult<()> {
        let this = self.pop()?;
        let callee = self.pop()?;
        let args_array = self.pop()?;
        let argc = self.push_spread_args(args_array)?;
        self.dispatch_call(callee, this, argc, false, false)
    }

    pub(crate) fn op_new(&mut self) -> RunResult<()> {
        let callee = self.pop()?;
        let argc = self.pop_argc()?;
        self.dispatch_call(callee, Value::Undefined, argc, true, false)
    }

    pub(crate) fn op_new_spread(&mut self) -> RunResult<()> {
        let callee = self.pop()?;
        let args_array = self.pop()?;
        let argc = self.push_spread_args(args_array)?;
        self.dispatch_call(callee, Value::Undefined, argc, true, false)
    }

    fn pop_argc(&mut self) -> RunResult<usize> {
        match self.pop()? {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            other => Err(RunError::internal(format!("malformed argument count: {other:?}"))),
        }
    }

    fn push_spread_args(&mut self, args_array: Value) -> RunResult<usize> {
        let Value::Ref(id) = args_array else {
            return Err(RunError::internal("spread call without an argument array"));
        };
        let HeapData::Array(array) = self.ctx.heap.get(id) else {
            return Err(RunError::internal("spread call without an argument array"));
        };
        let elements = array.elements.clone();
        let count = elements.len();
        for value in elements {
            self.push(value);
        }
        Ok(count)
    }

    /// Pushes `args` and dispatches a call; the workhorse behind the call
    /// opcodes, accessor invocation, and microtask handlers.
    pub(crate) fn invoke(&mut self, callee: Value, this: Value, args: &[Value], discard: bool) -> RunResult<()> {
        for &arg in args {
            self.push(arg);
        }
        self.dispatch_call(callee, this, args.len(), false, discard)
    }

    /// Runs a callable to completion and returns its result. Only used
    /// while no frames are live (microtask handlers).
    pub(crate) fn call_value(&mut self, callee: Value, this: Value, args: &[Value]) -> RunResult<Value> {
        debug_assert!(self.ctx.frames.is_empty(), "call_value requires an idle VM");
        self.invoke(callee, this, args, false)?;
        if self.ctx.frames.is_empty() {
            return self.pop();
        }
        self.execute()
    }

    /// Central call dispatch. The top `argc` operands are the arguments.
    fn dispatch_call(&mut self, callee: Value, this: Value, argc: usize, construct: bool, discard: bool) -> RunResult<()> {
        match callee {
            Value::Native(id) => {
                let args = self.take_args(argc)?;
                match self.call_native(id, this, &args, construct)? {
                    NativeOutcome::Value(value) => {
                        if !discard {
                            self.push(value);
                        }
                        Ok(())
                    }
                    NativeOutcome::Handled => Ok(()),
                }
            }
            Value::FunctionDef(def_id) => {
                self.call_bytecode(def_id, callee, SmallVec::new(), Value::Undefined, this, argc, construct, discard)
            }
            Value::Ref(id) => {
                let func = match self.ctx.heap.get(id) {
                    HeapData::Function(f) => f,
                    _ => {
                        let shown = self.describe_callee(callee);
                        return Err(RunError::type_error(format!("{shown} is not a function")));
                    }
                };
                let def_id = func.def;
                let env = func.env.clone();
                let captured_this = func.captured_this;
                let is_ctor = func.is_ctor;
                // Class constructors require `new`; a super(...) call is
                // recognised by its pre-bound `this`.
                if is_ctor && !construct && matches!(this, Value::Undefined) {
                    return Err(RunError::type_error("Class constructor cannot be invoked without 'new'"));
                }
                self.call_bytecode(def_id, callee, env, captured_this, this, argc, construct, discard)
            }
            other => {
                let shown = self.describe_callee(other);
                Err(RunError::type_error(format!("{shown} is not a function")))
            }
        }
    }

    fn describe_callee(&self, callee: Value) -> String {
        crate::value::to_js_string(callee, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs)
    }

    fn take_args(&mut self, argc: usize) -> RunResult<NativeArgs> {
        let len = self.ctx.stack.len();
        if len < argc {
            return Err(RunError::internal("operand stack underflow in call"));
        }
        Ok(self.ctx.stack.drain(len - argc..).collect())
    }

    /// Calls a bytecode function: pushes a frame, or instantiates a
    /// generator/async body.
    #[expect(clippy::too_many_arguments, reason = "call dispatch concentrates every calling convention")]
    fn call_bytecode(
        &mut self,
        def_id: FunctionDefId,
        function: Value,
        env: SmallVec<[Value; 4]>,
        captured_this: Value,
        this: Value,
        argc: usize,
        construct: bool,
        discard: bool,
    ) -> RunResult<()> {
        let def = &self.ctx.defs.funcs[def_id.0 as usize];
        let flags = def.flags;
        let param_count = def.param_count as usize;
        let var_count = def.var_count as usize;
        let name = def.name;
        let closure_vars: Vec<_> = def.closure_vars.clone();

        let effective_this = if flags.is_arrow { captured_this } else { this };

        if flags.is_generator || flags.is_async {
            if construct {
                return Err(RunError::type_error("generator and async functions are not constructors"));
            }
            // Detached locals: the body runs only when resumed.
            let mut locals = self.take_args(argc)?;
            locals.resize(param_count.max(locals.len()), Value::Undefined);
            locals.truncate(param_count);
            locals.resize(var_count, Value::Undefined);
            for (i, cvd) in closure_vars.iter().enumerate() {
                locals[cvd.child_slot as usize] = env[i];
            }
            let promise = if flags.is_async {
                let proto = self.ctx.class_protos[ClassId::PROMISE.0 as usize];
                Value::Ref(self.ctx.heap.alloc(HeapData::Promise(PromiseObject::pending(proto))))
            } else {
                Value::Undefined
            };
            let proto = self.ctx.class_protos[ClassId::GENERATOR.0 as usize];
            let r#gen = Value::Ref(self.ctx.heap.alloc(HeapData::Generator(GeneratorObject {
                def: def_id,
                name,
                state: GeneratorState::Suspended,
                ip: 0,
                stack: locals.into_vec(),
                this_val: effective_this,
                env,
                promise,
                proto,
            })));
            if flags.is_async {
                // Run the body to its first await (or completion); the
                // caller receives the promise when the frame exits.
                return self.resume_generator(r#gen, Resume::Next(Value::Undefined), false);
            }
            if !discard {
                self.push(r#gen);
            }
            return Ok(());
        }

        if self.ctx.frames.len() >= self.ctx.config.max_call_depth {
            return Err(RunError::range_error("Maximum call stack size exceeded"));
        }

        let (effective_this, return_mode) = if construct {
            let proto = self.prototype_for_new(function, def_id)?;
            let this_obj = Value::Ref(self.ctx.heap.alloc(HeapData::Object(JsObject::new(ClassId::OBJECT, proto))));
            (this_obj, ReturnMode::Ctor { this: this_obj })
        } else {
            (effective_this, ReturnMode::Normal)
        };

        // Arguments become the first locals; surplus args are dropped and
        // missing ones filled with undefined.
        if argc > param_count {
            self.ctx.stack.truncate(self.ctx.stack.len() - (argc - param_count));
        } else {
            for _ in argc..param_count {
                self.push(Value::Undefined);
            }
        }
        let stack_base = self.ctx.stack.len() - param_count;
        self.ctx.stack.resize(stack_base + var_count, Value::Undefined);
        for (i, cvd) in closure_vars.iter().enumerate() {
            self.ctx.stack[stack_base + cvd.child_slot as usize] = env[i];
        }

        self.ctx.frames.push(Frame {
            func: def_id,
            function,
            this_val: effective_this,
            ip: 0,
            stack_base,
            module_vars: Value::Undefined,
            generator: Value::Undefined,
            return_mode,
            finally_chain: None,
            pending: None,
            discard_return: discard,
        });
        self.ctx.tracer.on_call(self.ctx.frames.len());
        Ok(())
    }

    /// The prototype a `new` expression gives the fresh object.
    ///
    /// Closure objects carry their own `prototype` property; constant
    /// function definitions share one per-definition prototype so instances
    /// of the same function agree on identity.
    fn prototype_for_new(&mut self, function: Value, def_id: FunctionDefId) -> RunResult<Value> {
        if let Value::Ref(id) = function
            && matches!(self.ctx.heap.get(id), HeapData::Function(_))
        {
            let existing = {
                let HeapData::Function(func) = self.ctx.heap.get(id) else {
                    unreachable!("checked above");
                };
                match func.props.get(&PropKey::Str(StaticStrings::Prototype.into())) {
                    Some(PropSlot::Data(v)) => Some(*v),
                    _ => None,
                }
            };
            return Ok(match existing {
                Some(proto) => proto,
                None => self.ensure_function_prototype(id),
            });
        }
        if let Some(&proto) = self.ctx.def_prototypes.get(&def_id) {
            return Ok(proto);
        }
        let object_proto = self.ctx.class_protos[ClassId::OBJECT.0 as usize];
        let mut proto_obj = JsObject::new(ClassId::OBJECT, object_proto);
        proto_obj
            .props
            .insert(PropKey::Str(StaticStrings::Constructor.into()), PropSlot::Data(function));
        let proto = Value::Ref(self.ctx.heap.alloc(HeapData::Object(proto_obj)));
        self.ctx.def_prototypes.insert(def_id, proto);
        Ok(proto)
    }

    // --- returns ---

    /// Pops the current frame and routes the return value per the frame's
    /// return mode.
    pub(crate) fn do_return(&mut self, value: Value) -> RunResult<()> {
        let frame = self
            .ctx
            .frames
            .pop()
            .ok_or_else(|| RunError::internal("return without a frame"))?;
        self.ctx.stack.truncate(frame.stack_base);
        self.ctx.tracer.on_return(self.ctx.frames.len());

        match frame.return_mode {
            ReturnMode::Normal => {
                if !frame.discard_return {
                    self.push(value);
                }
            }
            ReturnMode::Module { module, as_promise } => {
                if let Value::Ref(id) = module
                    && let HeapData::Module(m) = self.ctx.heap.get_mut(id)
                {
                    m.state = ModuleState::Evaluated;
                }
                if self.ctx.frames.is_empty() {
                    // Top-level evaluation: the completion value is the
                    // result.
                    self.push(value);
                } else if as_promise {
                    let promise = self.new_settled_promise(module, false);
                    self.push(promise);
                } else {
                    self.push(module);
                }
            }
            ReturnMode::Ctor { this } => {
                let result = match value {
                    Value::Ref(id)
                        if matches!(
                            self.ctx.heap.get(id),
                            HeapData::Object(_) | HeapData::Array(_) | HeapData::Function(_)
                        ) =>
                    {
                        value
                    }
                    _ => this,
                };
                if !frame.discard_return {
                    self.push(result);
                }
            }
            ReturnMode::Generator { r#gen, pair } => {
                self.set_generator_state(r#gen, GeneratorState::Closed);
                if pair {
                    self.push(value);
                    self.push(Value::Bool(true));
                } else {
                    let result = self.iter_result(value, true);
                    self.push(result);
                }
            }
            ReturnMode::Async { r#gen } => {
                let promise = self.generator_promise(r#gen)?;
                self.set_generator_state(r#gen, GeneratorState::Closed);
                self.resolve_promise_value(promise, value)?;
                self.push(promise);
            }
        }
        Ok(())
    }

    pub(crate) fn iter_result(&mut self, value: Value, done: bool) -> Value {
        let object_proto = self.ctx.class_protos[ClassId::OBJECT.0 as usize];
        let mut obj = JsObject::new(ClassId::OBJECT, object_proto);
        obj.props
            .insert(PropKey::Str(StaticStrings::Value.into()), PropSlot::Data(value));
        obj.props
            .insert(PropKey::Str(StaticStrings::Done.into()), PropSlot::Data(Value::Bool(done)));
        Value::Ref(self.ctx.heap.alloc(HeapData::Object(obj)))
    }

    // --- closures & classes ---

    pub(crate) fn op_closure(&mut self, const_index: u32) -> RunResult<()> {
        let Value::FunctionDef(def_id) = self.ctx.pool.get(const_index) else {
            return Err(RunError::internal("Closure constant is not a function definition"));
        };
        let closure_vars: Vec<_> = self.ctx.defs.funcs[def_id.0 as usize].closure_vars.clone();
        let name = self.ctx.defs.funcs[def_id.0 as usize].name;

        // Wire the environment: alias existing cells, or box the current
        // slot value into a fresh cell shared with the parent frame.
        let mut env: SmallVec<[Value; 4]> = SmallVec::with_capacity(closure_vars.len());
        for cvd in &closure_vars {
            let raw = self.read_slot_raw(cvd.parent_slot)?;
            let cell = if let Value::Ref(id) = raw
                && matches!(self.ctx.heap.get(id), HeapData::Cell(_))
            {
                raw
            } else {
                let cell = Value::Ref(self.ctx.heap.alloc(HeapData::Cell(raw)));
                self.write_slot(cvd.parent_slot, cell)?;
                cell
            };
            env.push(cell);
        }

        let captured_this = self.frame().this_val;
        let proto = self.ctx.class_protos[ClassId::FUNCTION.0 as usize];
        let id = self.ctx.heap.alloc(HeapData::Function(FunctionObject {
            def: def_id,
            name,
            env,
            captured_this,
            home_super: Value::Undefined,
            is_ctor: false,
            proto,
            props: crate::object::PropMap::default(),
        }));
        self.push(Value::Ref(id));
        Ok(())
    }

    fn read_slot_raw(&self, slot: u16) -> RunResult<Value> {
        let frame = self.frame();
        if let Value::Ref(module_id) = frame.module_vars {
            let HeapData::Module(module) = self.ctx.heap.get(module_id) else {
                return Err(RunError::internal("module frame without module object"));
            };
            return Ok(module.vars[slot as usize]);
        }
        Ok(self.ctx.stack[frame.stack_base + slot as usize])
    }

    /// Wraps a constant function definition in a heap function object (for
    /// class machinery that needs properties on the value).
    pub(crate) fn materialize_function(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Ref(id) if matches!(self.ctx.heap.get(id), HeapData::Function(_)) => Ok(value),
            Value::FunctionDef(def_id) => {
                let name = self.ctx.defs.funcs[def_id.0 as usize].name;
                let proto = self.ctx.class_protos[ClassId::FUNCTION.0 as usize];
                let id = self.ctx.heap.alloc(HeapData::Function(FunctionObject {
                    def: def_id,
                    name,
                    env: SmallVec::new(),
                    captured_this: Value::Undefined,
                    home_super: Value::Undefined,
                    is_ctor: false,
                    proto,
                    props: crate::object::PropMap::default(),
                }));
                Ok(Value::Ref(id))
            }
            other => {
                let shown = self.describe_callee(other);
                Err(RunError::type_error(format!("{shown} is not a function")))
            }
        }
    }

    pub(crate) fn op_make_class(&mut self, name: crate::intern::StringId) -> RunResult<()> {
        let ctor_fn = self.pop()?;
        let superclass = self.pop()?;
        let ctor = self.materialize_function(ctor_fn)?;
        let Value::Ref(ctor_id) = ctor else {
            unreachable!("materialize_function returns a heap function");
        };

        let parent_proto = match superclass {
            Value::Undefined => self.ctx.class_protos[ClassId::OBJECT.0 as usize],
            Value::Ref(super_id) if matches!(self.ctx.heap.get(super_id), HeapData::Function(_)) => {
                self.ensure_function_prototype(super_id)
            }
            _ => {
                return Err(RunError::type_error("Class extends value is not a constructor"));
            }
        };

        let object_proto = parent_proto;
        let mut proto_obj = JsObject::new(ClassId::OBJECT, object_proto);
        proto_obj
            .props
            .insert(PropKey::Str(StaticStrings::Constructor.into()), PropSlot::Data(ctor));
        let prototype = Value::Ref(self.ctx.heap.alloc(HeapData::Object(proto_obj)));

        let HeapData::Function(func) = self.ctx.heap.get_mut(ctor_id) else {
            unreachable!("constructor is a function object");
        };
        func.name = name;
        func.is_ctor = true;
        func.home_super = superclass;
        func.props
            .insert(PropKey::Str(StaticStrings::Prototype.into()), PropSlot::Data(prototype));
        if matches!(superclass, Value::Ref(_)) {
            // Static members inherit through the constructor chain.
            func.proto = superclass;
        }
        self.ctx.heap.write_barrier(ctor_id, prototype);
        self.push(ctor);
        Ok(())
    }

    pub(crate) fn op_define_method(&mut self, key: PropKey, function: Value, flags: u8) -> RunResult<()> {
        let class = self.peek()?;
        let Value::Ref(class_id) = class else {
            return Err(RunError::internal("DefineMethod target is not a class"));
        };
        let method = self.materialize_function(function)?;

        // Methods see the class's superclass through `super`.
        let home_super = {
            let HeapData::Function(class_fn) = self.ctx.heap.get(class_id) else {
                return Err(RunError::internal("DefineMethod target is not a class"));
            };
            class_fn.home_super
        };
        if let Value::Ref(method_id) = method
            && let HeapData::Function(method_fn) = self.ctx.heap.get_mut(method_id)
        {
            method_fn.home_super = home_super;
        }

        let is_static = flags & 0b001 != 0;
        let is_getter = flags & 0b010 != 0;
        let is_setter = flags & 0b100 != 0;

        if is_static {
            let HeapData::Function(class_fn) = self.ctx.heap.get_mut(class_id) else {
                unreachable!("checked above");
            };
            insert_member(&mut class_fn.props, key, method, is_getter, is_setter);
            self.ctx.heap.write_barrier(class_id, method);
            return Ok(());
        }

        let prototype = {
            let HeapData::Function(class_fn) = self.ctx.heap.get(class_id) else {
                unreachable!("checked above");
            };
            match class_fn.props.get(&PropKey::Str(StaticStrings::Prototype.into())) {
                Some(PropSlot::Data(v)) => *v,
                _ => return Err(RunError::internal("class without a prototype object")),
            }
        };
        let Value::Ref(proto_id) = prototype else {
            return Err(RunError::internal("class prototype is not an object"));
        };
        let HeapData::Object(proto_obj) = self.ctx.heap.get_mut(proto_id) else {
            return Err(RunError::internal("class prototype is not an object"));
        };
        insert_member(&mut proto_obj.props, key, method, is_getter, is_setter);
        self.ctx.heap.write_barrier(proto_id, method);
        Ok(())
    }

    pub(crate) fn op_get_super(&mut self) -> RunResult<()> {
        let function = self.frame().function;
        let super_ctor = match function {
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Function(func) => func.home_super,
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        };
        if matches!(super_ctor, Value::Undefined) {
            return Err(RunError::syntax_error("'super' used outside a derived class method"));
        }
        self.push(super_ctor);
        Ok(())
    }

    // --- generators ---

    fn set_generator_state(&mut self, r#gen: Value, state: GeneratorState) {
        if let Value::Ref(id) = r#gen
            && let HeapData::Generator(g) = self.ctx.heap.get_mut(id)
        {
            g.state = state;
        }
    }

    fn generator_promise(&self, r#gen: Value) -> RunResult<Value> {
        if let Value::Ref(id) = r#gen
            && let HeapData::Generator(g) = self.ctx.heap.get(id)
        {
            return Ok(g.promise);
        }
        Err(RunError::internal("async frame without a generator"))
    }

    /// Re-enters a suspended generator (or async body).
    ///
    /// Pushes a frame for suspended generators; pushes a finished result
    /// directly for closed ones. `pair` selects the raw `(value, done)`
    /// stack shape used by for-of drives over the `{value, done}` object.
    pub(crate) fn resume_generator(&mut self, r#gen: Value, resume: Resume, pair: bool) -> RunResult<()> {
        let Value::Ref(gen_id) = r#gen else {
            return Err(RunError::type_error("next called on a non-generator"));
        };
        let (state, started) = match self.ctx.heap.get(gen_id) {
            HeapData::Generator(g) => (g.state, g.ip > 0),
            _ => return Err(RunError::type_error("next called on a non-generator")),
        };

        match state {
            GeneratorState::Executing => Err(RunError::type_error("Generator is already running")),
            GeneratorState::Closed => {
                match resume {
                    Resume::Next(_) => self.push_gen_result(Value::Undefined, true, pair),
                    Resume::Return(value) => self.push_gen_result(value, true, pair),
                    Resume::Throw(value) => return Err(RunError::Throw(value, Vec::new())),
                }
                Ok(())
            }
            GeneratorState::Suspended => {
                match resume {
                    Resume::Return(value) => {
                        // Closing a suspended generator: pending finally
                        // blocks inside it are skipped.
                        self.set_generator_state(r#gen, GeneratorState::Closed);
                        self.push_gen_result(value, true, pair);
                        Ok(())
                    }
                    Resume::Throw(value) if !started => {
                        self.set_generator_state(r#gen, GeneratorState::Closed);
                        Err(RunError::Throw(value, Vec::new()))
                    }
                    Resume::Next(sent) => {
                        self.install_generator_frame(gen_id, r#gen, pair)?;
                        if started {
                            self.push(sent);
                        }
                        Ok(())
                    }
                    Resume::Throw(value) => {
                        self.install_generator_frame(gen_id, r#gen, pair)?;
                        // Raise at the resume point; handlers inside the
                        // generator may catch it.
                        Err(RunError::Throw(value, Vec::new()))
                    }
                }
            }
        }
    }

    fn push_gen_result(&mut self, value: Value, done: bool, pair: bool) {
        if pair {
            self.push(value);
            self.push(Value::Bool(done));
        } else {
            let result = self.iter_result(value, done);
            self.push(result);
        }
    }

    fn install_generator_frame(&mut self, gen_id: HeapId, r#gen: Value, pair: bool) -> RunResult<()> {
        if self.ctx.frames.len() >= self.ctx.config.max_call_depth {
            return Err(RunError::range_error("Maximum call stack size exceeded"));
        }
        let (def, ip, saved, this_val, promise) = {
            let HeapData::Generator(g) = self.ctx.heap.get_mut(gen_id) else {
                unreachable!("caller checked the generator flavour");
            };
            g.state = GeneratorState::Executing;
            let saved = std::mem::take(&mut g.stack);
            (g.def, g.ip, saved, g.this_val, g.promise)
        };
        let stack_base = self.ctx.stack.len();
        self.ctx.stack.extend(saved);
        let return_mode = if matches!(promise, Value::Undefined) {
            ReturnMode::Generator { r#gen, pair }
        } else {
            ReturnMode::Async { r#gen }
        };
        self.ctx.frames.push(Frame {
            func: def,
            function: r#gen,
            this_val,
            ip: ip as usize,
            stack_base,
            module_vars: Value::Undefined,
            generator: r#gen,
            return_mode,
            finally_chain: None,
            pending: None,
            discard_return: false,
        });
        self.ctx.tracer.on_call(self.ctx.frames.len());
        Ok(())
    }

    /// Saves the current frame back into its generator and pops it.
    fn suspend_current_generator(&mut self) -> RunResult<Frame> {
        let frame = self
            .ctx
            .frames
            .pop()
            .ok_or_else(|| RunError::internal("suspend without a frame"))?;
        let region: Vec<Value> = self.ctx.stack.split_off(frame.stack_base);
        let Value::Ref(gen_id) = frame.generator else {
            return Err(RunError::internal("suspend outside a generator frame"));
        };
        for value in &region {
            self.ctx.heap.write_barrier(gen_id, *value);
        }
        let HeapData::Generator(g) = self.ctx.heap.get_mut(gen_id) else {
            return Err(RunError::internal("suspend outside a generator frame"));
        };
        g.state = GeneratorState::Suspended;
        g.ip = u32::try_from(frame.ip).expect("ip exceeds u32");
        g.stack = region;
        self.ctx.tracer.on_return(self.ctx.frames.len());
        Ok(frame)
    }

    pub(crate) fn op_yield(&mut self) -> RunResult<()> {
        let value = self.pop()?;
        let frame = self.suspend_current_generator()?;
        match frame.return_mode {
            ReturnMode::Generator { pair, .. } => {
                self.push_gen_result(value, false, pair);
                Ok(())
            }
            _ => Err(RunError::internal("Yield outside a generator frame")),
        }
    }

    pub(crate) fn op_await(&mut self) -> RunResult<()> {
        let awaited = self.pop()?;
        let r#gen = self.frame().generator;
        if matches!(r#gen, Value::Undefined) {
            return Err(RunError::internal("Await outside an async frame"));
        }

        // Subscribe the resumption before suspending.
        match awaited {
            Value::Ref(id) if matches!(self.ctx.heap.get(id), HeapData::Promise(_)) => {
                let state = {
                    let HeapData::Promise(p) = self.ctx.heap.get(id) else {
                        unreachable!("checked above");
                    };
                    (p.state, p.result)
                };
                match state {
                    (PromiseState::Pending, _) => {
                        let HeapData::Promise(p) = self.ctx.heap.get_mut(id) else {
                            unreachable!("checked above");
                        };
                        p.reactions.push(Reaction::AwaitResume { generator: r#gen });
                        self.ctx.heap.write_barrier(id, r#gen);
                    }
                    (PromiseState::Fulfilled, result) => self.enqueue_await(r#gen, result, false),
                    (PromiseState::Rejected, result) => self.enqueue_await(r#gen, result, true),
                }
            }
            // Non-promise: behaves like awaiting a resolved promise — one
            // microtask turn.
            other => self.enqueue_await(r#gen, other, false),
        }

        let frame = self.suspend_current_generator()?;
        let ReturnMode::Async { r#gen } = frame.return_mode else {
            return Err(RunError::internal("Await outside an async frame"));
        };
        let promise = self.generator_promise(r#gen)?;
        self.push(promise);
        Ok(())
    }

    fn enqueue_await(&mut self, r#gen: Value, value: Value, rejected: bool) {
        self.ctx.microtasks.push_back(Microtask::Reaction {
            reaction: Reaction::AwaitResume { generator: r#gen },
            value,
            rejected,
        });
    }

    // --- promises ---

    pub(crate) fn new_settled_promise(&mut self, value: Value, rejected: bool) -> Value {
        let proto = self.ctx.class_protos[ClassId::PROMISE.0 as usize];
        let mut promise = PromiseObject::pending(proto);
        promise.state = if rejected {
            PromiseState::Rejected
        } else {
            PromiseState::Fulfilled
        };
        promise.result = value;
        Value::Ref(self.ctx.heap.alloc(HeapData::Promise(promise)))
    }

    /// Settles a promise, moving its queued reactions to the microtask
    /// queue in registration order.
    pub(crate) fn settle_promise(&mut self, promise: Value, value: Value, rejected: bool) -> RunResult<()> {
        let Value::Ref(id) = promise else {
            return Err(RunError::internal("settle on a non-promise"));
        };
        let reactions = {
            let HeapData::Promise(p) = self.ctx.heap.get_mut(id) else {
                return Err(RunError::internal("settle on a non-promise"));
            };
            if p.state != PromiseState::Pending {
                return Ok(());
            }
            p.state = if rejected {
                PromiseState::Rejected
            } else {
                PromiseState::Fulfilled
            };
            p.result = value;
            std::mem::take(&mut p.reactions)
        };
        self.ctx.heap.write_barrier(id, value);
        for reaction in reactions {
            self.ctx.microtasks.push_back(Microtask::Reaction {
                reaction,
                value,
                rejected,
            });
        }
        Ok(())
    }

    /// Fulfils a promise, adopting the state of a promise result instead of
    /// nesting it.
    pub(crate) fn resolve_promise_value(&mut self, promise: Value, value: Value) -> RunResult<()> {
        if let Value::Ref(id) = value
            && value != promise
            && matches!(self.ctx.heap.get(id), HeapData::Promise(_))
        {
            let state = {
                let HeapData::Promise(p) = self.ctx.heap.get(id) else {
                    unreachable!("checked above");
                };
                (p.state, p.result)
            };
            match state {
                (PromiseState::Pending, _) => {
                    let HeapData::Promise(p) = self.ctx.heap.get_mut(id) else {
                        unreachable!("checked above");
                    };
                    p.reactions.push(Reaction::Then {
                        on_fulfilled: Value::Undefined,
                        on_rejected: Value::Undefined,
                        derived: promise,
                    });
                    self.ctx.heap.write_barrier(id, promise);
                }
                (PromiseState::Fulfilled, result) => {
                    self.ctx.microtasks.push_back(Microtask::Reaction {
                        reaction: Reaction::Then {
                            on_fulfilled: Value::Undefined,
                            on_rejected: Value::Undefined,
                            derived: promise,
                        },
                        value: result,
                        rejected: false,
                    });
                }
                (PromiseState::Rejected, result) => {
                    self.ctx.microtasks.push_back(Microtask::Reaction {
                        reaction: Reaction::Then {
                            on_fulfilled: Value::Undefined,
                            on_rejected: Value::Undefined,
                            derived: promise,
                        },
                        value: result,
                        rejected: true,
                    });
                }
            }
            return Ok(());
        }
        self.settle_promise(promise, value, false)
    }

    /// Drains the microtask queue in FIFO order, running promise reactions
    /// and async-body resumptions to completion.
    pub(crate) fn drain_microtasks(&mut self) -> RunResult<()> {
        while let Some(task) = self.ctx.microtasks.pop_front() {
            let Microtask::Reaction {
                reaction,
                value,
                rejected,
            } = task;
            match reaction {
                Reaction::AwaitResume { generator } => {
                    let resume = if rejected {
                        Resume::Throw(value)
                    } else {
                        Resume::Next(value)
                    };
                    if let Err(err) = self.resume_generator(generator, resume, false) {
                        if let Some(fatal) = self.handle_error(err) {
                            return Err(fatal);
                        }
                    }
                    if !self.ctx.frames.is_empty() {
                        let _ = self.execute()?;
                    } else {
                        // The closed-generator result was pushed; discard it.
                        let _ = self.ctx.stack.pop();
                    }
                }
                Reaction::Then {
                    on_fulfilled,
                    on_rejected,
                    derived,
                } => {
                    let handler = if rejected { on_rejected } else { on_fulfilled };
                    if handler.is_callable(&self.ctx.heap) {
                        match self.call_value(handler, Value::Undefined, &[value]) {
                            Ok(result) => self.resolve_promise_value(derived, result)?,
                            Err(RunError::Internal(message)) => return Err(RunError::Internal(message)),
                            Err(RunError::Interrupted) => return Err(RunError::Interrupted),
                            Err(err) => {
                                let error_value = self.error_value(err);
                                self.settle_promise(derived, error_value, true)?;
                            }
                        }
                    } else if rejected {
                        self.settle_promise(derived, value, true)?;
                    } else {
                        self.resolve_promise_value(derived, value)?;
                    }
                }
            }
        }
        Ok(())
    }

    // --- modules ---

    pub(crate) fn op_get_module(&mut self, as_promise: bool) -> RunResult<()> {
        let spec_value = self.pop()?;
        let Some(specifier) = spec_value.as_str(&self.ctx.heap, &self.ctx.interns) else {
            return Err(RunError::type_error("module specifier must be a string"));
        };
        let specifier = specifier.to_owned();

        let referrer = {
            let def = &self.ctx.defs.funcs[self.frame().func.0 as usize];
            let module_def = self.ctx.defs.module(def.module);
            self.ctx.interns.get(module_def.name).to_owned()
        };

        let canonical = self
            .ctx
            .loader
            .resolve(&specifier, &referrer)
            .map_err(RunError::type_error)?;

        if let Some(&cached) = self.ctx.module_cache.get(&canonical) {
            let Value::Ref(id) = cached else {
                return Err(RunError::internal("module cache holds a non-module"));
            };
            let (state, main) = match self.ctx.heap.get(id) {
                HeapData::Module(m) => (m.state, self.ctx.defs.module(m.def).main),
                _ => return Err(RunError::internal("module cache holds a non-module")),
            };
            match state {
                ModuleState::Instantiated => {
                    self.push_module_eval(main, cached, as_promise);
                }
                // A cycle (or finished module) exposes its current
                // bindings; uninitialised consts read as holes and throw.
                ModuleState::Evaluating | ModuleState::Evaluated => {
                    if as_promise {
                        let promise = self.new_settled_promise(cached, false);
                        self.push(promise);
                    } else {
                        self.push(cached);
                    }
                }
            }
            return Ok(());
        }

        let source = self.ctx.loader.load(&canonical).map_err(RunError::type_error)?;
        let module_id = self.compile_nested(&canonical, &source)?;
        let module = self.ctx.instantiate_module(module_id);
        self.ctx.module_cache.insert(canonical, module);
        let main = self.ctx.defs.module(module_id).main;
        self.push_module_eval(main, module, as_promise);
        Ok(())
    }

    fn compile_nested(&mut self, name: &str, source: &str) -> RunResult<ModuleId> {
        crate::codegen::compile_module(
            name,
            source,
            &mut self.ctx.interns,
            &mut self.ctx.pool,
            &mut self.ctx.defs,
            &mut self.ctx.heap,
        )
        .map_err(|err| RunError::syntax_error(format!("{} (in module {name})", err.message)))
    }

    fn push_module_eval(&mut self, main: FunctionDefId, module: Value, as_promise: bool) {
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
        self.ctx.tracer.on_call(self.ctx.frames.len());
    }

    // --- native dispatch ---

    fn call_native(&mut self, id: NativeFnId, this: Value, args: &NativeArgs, construct: bool) -> RunResult<NativeOutcome> {
        let native = self.ctx.natives[id.0 as usize];
        match native.kind {
            NativeKind::Host(function) => {
                if construct {
                    return Err(RunError::type_error("host function is not a constructor"));
                }
                let mut native_ctx = crate::context::NativeCtx {
                    heap: &mut self.ctx.heap,
                    interns: &mut self.ctx.interns,
                };
                match function(&mut native_ctx, this, args) {
                    Ok(value) => Ok(NativeOutcome::Value(value)),
                    Err(message) => Err(RunError::Exc(crate::error::JsException::new(
                        crate::error::JsErrorKind::Error,
                        message,
                    ))),
                }
            }
            NativeKind::Builtin(builtin) => self.call_builtin(builtin, this, args, construct),
        }
    }
}

/// Inserts a method, getter, or setter into a property map, merging
/// accessor halves.
fn insert_member(props: &mut crate::object::PropMap, key: PropKey, method: Value, is_getter: bool, is_setter: bool) {
    if !is_getter && !is_setter {
        props.insert(key, PropSlot::Data(method));
        return;
    }
    let slot = props.entry(key).or_insert(PropSlot::Accessor {
        get: Value::Undefined,
        set: Value::Undefined,
    });
    if let PropSlot::Data(_) = slot {
        *slot = PropSlot::Accessor {
            get: Value::Undefined,
            set: Value::Undefined,
        };
    }
    if let PropSlot::Accessor { get, set } = slot {
        if is_getter {
            *get = method;
        } else {
            *set = method;
        }
    }
}
