//! Execution contexts: per-context heap, stacks, constant pool, globals,
//! module cache, microtask queue, and the embedding API.
//!
//! A [`Context`] ties a shared [`Runtime`] to one execution thread. Multiple
//! contexts may share a runtime by immutable borrow; each owns its heap and
//! never shares per-context state.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use ahash::AHashMap;

use crate::{
    bytecode::{FunctionDef, FunctionDefId, ModuleDef, ModuleId},
    codegen,
    error::{Exception, JsErrorKind, RunError, SyntaxError},
    heap::{GcConfig, Heap, HeapData, HeapStats},
    intern::{Interns, StaticStrings, StringId, SymbolId},
    io::{PrintWriter, StdPrint},
    module_loader::{ModuleLoader, NoLoader},
    object::{ClassId, JsObject, ModuleObject, ModuleState, PropKey, PropSlot, Reaction},
    runtime::{Builtin, Runtime},
    tracer::{NoopTracer, VmTracer},
    value::{NativeFnId, Value},
    vm::{Frame, Vm},
};

/// Engine limits and GC sizing, fixed at context creation.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub gc: GcConfig,
    /// Maximum JS call depth before a RangeError.
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gc: GcConfig::default(),
            max_call_depth: 1024,
        }
    }
}

/// Keys for structural constant deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKey {
    Undefined,
    Hole,
    Null,
    Bool(bool),
    Int(i64),
    /// Float bit pattern; NaN dedups with itself, +0/-0 stay distinct.
    Float(u64),
    String(StringId),
    BigInt(u32),
    Func(FunctionDefId),
    Native(NativeFnId),
    Symbol(SymbolId),
}

/// Context-owned pool of constant values, deduplicated by structural
/// equality. Bytecode refers to entries by index; function definitions in
/// the pool are thereby pinned.
#[derive(Debug, Default)]
pub(crate) struct ConstPool {
    values: Vec<Value>,
    map: AHashMap<ConstKey, u32>,
}

impl ConstPool {
    fn key(value: Value) -> ConstKey {
        match value {
            Value::Undefined => ConstKey::Undefined,
            Value::Hole => ConstKey::Hole,
            Value::Null => ConstKey::Null,
            Value::Bool(b) => ConstKey::Bool(b),
            Value::Int(v) => ConstKey::Int(v),
            Value::Float(v) => ConstKey::Float(v.to_bits()),
            Value::String(id) => ConstKey::String(id),
            Value::BigInt(id) => ConstKey::BigInt(id.0),
            Value::FunctionDef(id) => ConstKey::Func(id),
            Value::Native(id) => ConstKey::Native(id),
            Value::Symbol(id) => ConstKey::Symbol(id),
            Value::Ref(_) => unreachable!("heap references cannot be constants"),
        }
    }

    /// Interns a constant, returning its pool index.
    pub fn find_or_insert(&mut self, value: Value) -> u32 {
        let key = Self::key(value);
        if let Some(&index) = self.map.get(&key) {
            return index;
        }
        let index = u32::try_from(self.values.len()).expect("constant pool exceeds u32");
        self.values.push(value);
        self.map.insert(key, index);
        index
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Value {
        self.values[index as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Per-context registries of compiled definitions.
///
/// Definitions are immutable once finalised; ids are indices.
#[derive(Debug, Default)]
pub(crate) struct Definitions {
    pub funcs: Vec<FunctionDef>,
    pub modules: Vec<ModuleDef>,
}

impl Definitions {
    pub fn add_func(&mut self, def: FunctionDef) -> FunctionDefId {
        let id = FunctionDefId(u32::try_from(self.funcs.len()).expect("function registry exceeds u32"));
        self.funcs.push(def);
        id
    }

    #[must_use]
    pub fn func(&self, id: FunctionDefId) -> &FunctionDef {
        &self.funcs[id.0 as usize]
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> &ModuleDef {
        &self.modules[id.0 as usize]
    }
}

/// Limited view handed to host native functions.
pub struct NativeCtx<'a> {
    pub(crate) heap: &'a mut Heap,
    pub(crate) interns: &'a mut Interns,
}

impl NativeCtx<'_> {
    /// Builds a string value (interned).
    pub fn string_value(&mut self, s: &str) -> Value {
        Value::String(self.interns.intern(s))
    }

    /// Reads any string flavour.
    #[must_use]
    pub fn value_str(&self, value: &Value) -> Option<&str> {
        value.as_str(self.heap, self.interns)
    }

    /// Numeric view of ints and floats (no coercion).
    #[must_use]
    pub fn value_number(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Host-registered native function: `(ctx, this, args) -> value`.
///
/// A returned `Err(message)` surfaces as a thrown JS `Error`.
pub type HostFn = fn(&mut NativeCtx<'_>, Value, &[Value]) -> Result<Value, String>;

#[derive(Debug, Clone, Copy)]
pub(crate) enum NativeKind {
    Builtin(Builtin),
    Host(HostFn),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct NativeFunction {
    pub name: StringId,
    pub kind: NativeKind,
}

/// A queued promise reaction.
#[derive(Debug)]
pub(crate) enum Microtask {
    Reaction {
        reaction: Reaction,
        value: Value,
        rejected: bool,
    },
}

impl Microtask {
    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        match self {
            Self::Reaction { reaction, value, .. } => {
                reaction.trace(f);
                f(value);
            }
        }
    }
}

/// Handle for cooperatively interrupting a running context from another
/// thread.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// One execution context over a shared runtime.
pub struct Context<'r> {
    pub(crate) runtime: &'r Runtime,
    pub(crate) heap: Heap,
    pub(crate) interns: Interns,
    pub(crate) pool: ConstPool,
    pub(crate) defs: Definitions,
    pub(crate) natives: Vec<NativeFunction>,
    pub(crate) globals: AHashMap<StringId, Value>,
    /// Canonical path -> ModuleObject.
    pub(crate) module_cache: AHashMap<String, Value>,
    pub(crate) microtasks: VecDeque<Microtask>,
    /// Shared operand stack for all frames.
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    /// Prototype objects indexed by [`ClassId`].
    pub(crate) class_protos: Vec<Value>,
    /// Shared `prototype` object per constant function definition, so
    /// `new F()` instances agree on identity.
    pub(crate) def_prototypes: AHashMap<FunctionDefId, Value>,
    /// Prototype consulted for methods on primitive strings.
    pub(crate) string_proto: Value,
    pub(crate) loader: Box<dyn ModuleLoader>,
    pub(crate) print: Box<dyn PrintWriter>,
    pub(crate) tracer: Box<dyn VmTracer>,
    pub(crate) interrupt: Arc<AtomicBool>,
    pub(crate) config: EngineConfig,
    pub(crate) symbol_counter: u32,
    /// Deterministic-enough state for `Math.random`.
    pub(crate) rng_state: u64,
}

impl<'r> Context<'r> {
    /// Creates a context with default configuration.
    #[must_use]
    pub fn new(runtime: &'r Runtime) -> Self {
        Self::with_config(runtime, EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(runtime: &'r Runtime, config: EngineConfig) -> Self {
        let mut context = Self {
            runtime,
            heap: Heap::new(config.gc),
            interns: Interns::new(),
            pool: ConstPool::default(),
            defs: Definitions::default(),
            natives: Vec::new(),
            globals: AHashMap::new(),
            module_cache: AHashMap::new(),
            microtasks: VecDeque::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            class_protos: Vec::new(),
            def_prototypes: AHashMap::new(),
            string_proto: Value::Undefined,
            loader: Box::new(NoLoader),
            print: Box::new(StdPrint),
            tracer: Box::new(NoopTracer),
            interrupt: Arc::new(AtomicBool::new(false)),
            config,
            symbol_counter: 0,
            rng_state: 0x9E37_79B9_7F4A_7C15,
        };
        context.seed_builtins();
        context
    }

    /// Installs the module loader consulted by imports and `eval_by_path`.
    pub fn set_module_loader(&mut self, loader: Box<dyn ModuleLoader>) {
        self.loader = loader;
    }

    /// Redirects console output.
    pub fn set_print_writer(&mut self, print: Box<dyn PrintWriter>) {
        self.print = print;
    }

    /// Installs an execution tracer.
    pub fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) {
        self.tracer = tracer;
    }

    /// Returns a handle that interrupts this context from another thread;
    /// the VM checks it at back-edges and call boundaries.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupt))
    }

    /// Registers a global native function.
    pub fn add_native_function(&mut self, name: &str, function: HostFn) {
        let name_id = self.interns.intern(name);
        let id = self.add_native(name_id, NativeKind::Host(function));
        self.globals.insert(name_id, Value::Native(id));
    }

    /// Compiles a module, returning its module value without evaluating it.
    ///
    /// Errors are reported as the public exception type with line/column
    /// resolved through the module's line table.
    pub fn compile(&mut self, name: &str, source: &str) -> Result<Value, Exception> {
        match self.compile_internal(name, source) {
            Ok(value) => Ok(value),
            Err(err) => Err(self.syntax_exception(name, source, &err)),
        }
    }

    fn compile_internal(&mut self, name: &str, source: &str) -> Result<Value, SyntaxError> {
        let module_id = codegen::compile_module(
            name,
            source,
            &mut self.interns,
            &mut self.pool,
            &mut self.defs,
            &mut self.heap,
        )?;
        Ok(self.instantiate_module(module_id))
    }

    /// Creates the ModuleObject whose variable array backs the module's
    /// top-level slots. Slots start as holes: cyclic importers reading an
    /// uninitialised binding get a ReferenceError.
    pub(crate) fn instantiate_module(&mut self, module_id: ModuleId) -> Value {
        let main = self.defs.module(module_id).main;
        let var_count = self.defs.func(main).var_count as usize;
        let mut vars = vec![Value::Undefined; var_count];
        // Only const slots sit in the TDZ; everything else reads as
        // undefined before initialisation, matching cyclic-import rules.
        for &slot in &self.defs.module(module_id).const_slots {
            vars[slot as usize] = Value::Hole;
        }
        let id = self.heap.alloc(HeapData::Module(ModuleObject {
            def: module_id,
            state: ModuleState::Instantiated,
            vars,
        }));
        Value::Ref(id)
    }

    /// Evaluates a compiled module's body once, returning its completion
    /// value and draining the microtask queue.
    pub fn call_module(&mut self, module: &Value) -> Result<Value, Exception> {
        let mut vm = Vm::new(self);
        let result = vm.run_module(*module);
        self.finish_run(result)
    }

    /// Compile + evaluate in one step.
    pub fn eval(&mut self, name: &str, source: &str) -> Result<Value, Exception> {
        let module = self.compile(name, source)?;
        self.call_module(&module)
    }

    /// Resolves `path` through the module loader, then evaluates it (with
    /// caching by canonical path).
    pub fn eval_by_path(&mut self, path: &str) -> Result<Value, Exception> {
        let canonical = self
            .loader
            .resolve(path, "")
            .map_err(|message| Exception::from_kind(JsErrorKind::Error, message, Vec::new()))?;
        if let Some(module) = self.module_cache.get(&canonical) {
            let module = *module;
            return self.call_module(&module);
        }
        let source = self
            .loader
            .load(&canonical)
            .map_err(|message| Exception::from_kind(JsErrorKind::Error, message, Vec::new()))?;
        let module = self.compile(&canonical, &source)?;
        self.module_cache.insert(canonical, module);
        self.call_module(&module)
    }

    fn finish_run(&mut self, result: Result<Value, RunError>) -> Result<Value, Exception> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => Err(self.exception_from(err)),
        }
    }

    pub(crate) fn exception_from(&mut self, err: RunError) -> Exception {
        match err {
            RunError::Exc(exc) => Exception::from_kind(exc.kind, exc.message, exc.frames),
            RunError::Throw(value, frames) => {
                // Error-descended objects expose name/message; any other
                // value is reported through its display form.
                let (name, message) = self.thrown_name_message(value);
                Exception {
                    name,
                    message,
                    stack: frames,
                    interrupted: false,
                    internal: false,
                }
            }
            RunError::Internal(message) => Exception::internal(message),
            RunError::Interrupted => Exception::interrupted(),
        }
    }

    fn thrown_name_message(&mut self, value: Value) -> (String, String) {
        if let Value::Ref(id) = value
            && let HeapData::Object(obj) = self.heap.get(id)
            && obj.class_id == ClassId::ERROR
        {
            let name_key = PropKey::Str(StaticStrings::Name.into());
            let message_key = PropKey::Str(StaticStrings::Message.into());
            let read = |props: &crate::object::PropMap, key: &PropKey| match props.get(key) {
                Some(PropSlot::Data(v)) => Some(*v),
                _ => None,
            };
            let name_val = read(&obj.props, &name_key);
            let message_val = read(&obj.props, &message_key);
            let name = name_val
                .and_then(|v| v.as_str(&self.heap, &self.interns).map(str::to_owned))
                .unwrap_or_else(|| "Error".to_owned());
            let message = message_val
                .and_then(|v| v.as_str(&self.heap, &self.interns).map(str::to_owned))
                .unwrap_or_default();
            return (name, message);
        }
        ("Uncaught".to_owned(), self.display(&value))
    }

    fn syntax_exception(&mut self, module_name: &str, source: &str, err: &SyntaxError) -> Exception {
        let table = crate::lexer::LineTable::new(source);
        let (line, column) = table.line_col(source, err.pos);
        Exception::from_kind(
            JsErrorKind::SyntaxError,
            err.message.clone(),
            vec![crate::error::TraceFrame {
                function: "<module>".to_owned(),
                module: module_name.to_owned(),
                line,
                column,
            }],
        )
    }

    /// Renders a value the way `String(v)` would, for hosts and the CLI.
    #[must_use]
    pub fn display(&self, value: &Value) -> String {
        crate::value::to_js_string(*value, &self.heap, &self.interns, &self.defs)
    }

    /// Numeric view of a result value, when it is a number.
    #[must_use]
    pub fn value_number(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of a result value, when it is any string flavour.
    #[must_use]
    pub fn value_str(&self, value: &Value) -> Option<&str> {
        value.as_str(&self.heap, &self.interns)
    }

    /// Current heap occupancy and GC counters.
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Forces a full collection now. Only callable between runs (the
    /// embedding API is not reentrant), so the context's own state is the
    /// complete root set.
    pub fn collect_garbage(&mut self) {
        self.heap.request_major();
        let Self {
            heap,
            globals,
            module_cache,
            microtasks,
            stack,
            frames,
            class_protos,
            def_prototypes,
            string_proto,
            ..
        } = self;
        heap.collect_major(|visit| {
            for value in stack.iter_mut() {
                visit(value);
            }
            for frame in frames.iter_mut() {
                frame.trace(visit);
            }
            for value in globals.values_mut() {
                visit(value);
            }
            for value in module_cache.values_mut() {
                visit(value);
            }
            for task in microtasks.iter_mut() {
                task.trace(visit);
            }
            for value in class_protos.iter_mut() {
                visit(value);
            }
            for value in def_prototypes.values_mut() {
                visit(value);
            }
            visit(string_proto);
        });
    }

    // --- builtin seeding ---

    pub(crate) fn add_native(&mut self, name: StringId, kind: NativeKind) -> NativeFnId {
        let id = NativeFnId(u32::try_from(self.natives.len()).expect("native registry exceeds u32"));
        self.natives.push(NativeFunction { name, kind });
        id
    }

    fn builtin_value(&mut self, name: StaticStrings, builtin: Builtin) -> Value {
        let id = self.add_native(name.into(), NativeKind::Builtin(builtin));
        Value::Native(id)
    }

    /// Creates the per-context prototype objects and global bindings.
    ///
    /// Class prototypes live on this context's heap; the shared runtime only
    /// carries the class descriptors.
    fn seed_builtins(&mut self) {
        // Object.prototype sits at the root of every chain.
        let object_proto = {
            let id = self.heap.alloc(HeapData::Object(JsObject::new(ClassId::OBJECT, Value::Null)));
            Value::Ref(id)
        };
        let mut protos = vec![object_proto];
        for _ in 1..self.runtime.classes().len() {
            let id = self.heap.alloc(HeapData::Object(JsObject::new(ClassId::OBJECT, object_proto)));
            protos.push(Value::Ref(id));
        }
        self.class_protos = protos;
        let string_proto = {
            let id = self.heap.alloc(HeapData::Object(JsObject::new(ClassId::OBJECT, object_proto)));
            Value::Ref(id)
        };
        self.string_proto = string_proto;

        // Object.prototype methods.
        let obj_to_string = self.builtin_value(StaticStrings::ToString, Builtin::ObjToString);
        let obj_has_own = self.builtin_value(StaticStrings::HasOwnProperty, Builtin::ObjHasOwnProperty);
        let obj_value_of = self.builtin_value(StaticStrings::ValueOf, Builtin::ObjValueOf);
        self.define_on(object_proto, StaticStrings::ToString, obj_to_string);
        self.define_on(object_proto, StaticStrings::HasOwnProperty, obj_has_own);
        self.define_on(object_proto, StaticStrings::ValueOf, obj_value_of);

        // Array.prototype methods.
        let array_proto = self.class_protos[ClassId::ARRAY.0 as usize];
        for (name, builtin) in [
            (StaticStrings::Push, Builtin::ArrayPush),
            (StaticStrings::Pop, Builtin::ArrayPop),
            (StaticStrings::Shift, Builtin::ArrayShift),
            (StaticStrings::Unshift, Builtin::ArrayUnshift),
            (StaticStrings::IndexOf, Builtin::ArrayIndexOf),
            (StaticStrings::Includes, Builtin::ArrayIncludes),
            (StaticStrings::Join, Builtin::ArrayJoin),
            (StaticStrings::Slice, Builtin::ArraySlice),
            (StaticStrings::Concat, Builtin::ArrayConcat),
        ] {
            let value = self.builtin_value(name, builtin);
            self.define_on(array_proto, name, value);
        }

        // String prototype methods (consulted for primitive strings).
        for (name, builtin) in [
            (StaticStrings::CharAt, Builtin::StrCharAt),
            (StaticStrings::CharCodeAt, Builtin::StrCharCodeAt),
            (StaticStrings::IndexOf, Builtin::StrIndexOf),
            (StaticStrings::Includes, Builtin::StrIncludes),
            (StaticStrings::Slice, Builtin::StrSlice),
            (StaticStrings::Substring, Builtin::StrSubstring),
            (StaticStrings::Split, Builtin::StrSplit),
            (StaticStrings::ToUpperCase, Builtin::StrToUpperCase),
            (StaticStrings::ToLowerCase, Builtin::StrToLowerCase),
            (StaticStrings::Trim, Builtin::StrTrim),
            (StaticStrings::StartsWith, Builtin::StrStartsWith),
            (StaticStrings::EndsWith, Builtin::StrEndsWith),
            (StaticStrings::Repeat, Builtin::StrRepeat),
        ] {
            let value = self.builtin_value(name, builtin);
            self.define_on(string_proto, name, value);
        }

        // Generator prototype.
        let generator_proto = self.class_protos[ClassId::GENERATOR.0 as usize];
        for (name, builtin) in [
            (StaticStrings::Next, Builtin::GeneratorNext),
            (StaticStrings::Return, Builtin::GeneratorReturn),
            (StaticStrings::Throw, Builtin::GeneratorThrow),
        ] {
            let value = self.builtin_value(name, builtin);
            self.define_on(generator_proto, name, value);
        }

        // Promise prototype.
        let promise_proto = self.class_protos[ClassId::PROMISE.0 as usize];
        for (name, builtin) in [
            (StaticStrings::Then, Builtin::PromiseThen),
            (StaticStrings::Catch, Builtin::PromiseCatch),
        ] {
            let value = self.builtin_value(name, builtin);
            self.define_on(promise_proto, name, value);
        }

        // Globals: bare functions.
        for (name, builtin) in [
            (StaticStrings::IsNaN, Builtin::IsNaN),
            (StaticStrings::IsFinite, Builtin::IsFinite),
            (StaticStrings::ParseInt, Builtin::ParseInt),
            (StaticStrings::ParseFloat, Builtin::ParseFloat),
        ] {
            let value = self.builtin_value(name, builtin);
            self.globals.insert(name.into(), value);
        }
        for (name, builtin) in [
            ("String", Builtin::StringCtor),
            ("Number", Builtin::NumberCtor),
            ("Boolean", Builtin::BooleanCtor),
            ("Symbol", Builtin::SymbolCtor),
            ("gc", Builtin::GcRequest),
        ] {
            let name_id = self.interns.intern(name);
            let id = self.add_native(name_id, NativeKind::Builtin(builtin));
            self.globals.insert(name_id, Value::Native(id));
        }

        self.globals.insert(StaticStrings::NaN.into(), Value::Float(f64::NAN));
        self.globals
            .insert(StaticStrings::Infinity.into(), Value::Float(f64::INFINITY));

        // Error constructors.
        for (name, builtin) in [
            (StaticStrings::Error, Builtin::ErrorCtor),
            (StaticStrings::TypeError, Builtin::TypeErrorCtor),
            (StaticStrings::RangeError, Builtin::RangeErrorCtor),
            (StaticStrings::ReferenceError, Builtin::ReferenceErrorCtor),
            (StaticStrings::SyntaxError, Builtin::SyntaxErrorCtor),
        ] {
            let value = self.builtin_value(name, builtin);
            self.globals.insert(name.into(), value);
        }

        // Namespace objects: console, Math, JSON, Object, Array, Promise.
        let log = self.builtin_value(StaticStrings::Log, Builtin::ConsoleLog);
        let console = self.namespace_object(&[(StaticStrings::Log, log)]);
        self.globals.insert(StaticStrings::Console.into(), console);

        let math_members: Vec<(StaticStrings, Value)> = vec![
            (StaticStrings::Floor, self.builtin_value(StaticStrings::Floor, Builtin::MathFloor)),
            (StaticStrings::Ceil, self.builtin_value(StaticStrings::Ceil, Builtin::MathCeil)),
            (StaticStrings::Round, self.builtin_value(StaticStrings::Round, Builtin::MathRound)),
            (StaticStrings::Abs, self.builtin_value(StaticStrings::Abs, Builtin::MathAbs)),
            (StaticStrings::Sqrt, self.builtin_value(StaticStrings::Sqrt, Builtin::MathSqrt)),
            (StaticStrings::Min, self.builtin_value(StaticStrings::Min, Builtin::MathMin)),
            (StaticStrings::Max, self.builtin_value(StaticStrings::Max, Builtin::MathMax)),
            (StaticStrings::Pow, self.builtin_value(StaticStrings::Pow, Builtin::MathPow)),
            (StaticStrings::Random, self.builtin_value(StaticStrings::Random, Builtin::MathRandom)),
            (StaticStrings::Pi, Value::Float(std::f64::consts::PI)),
            (StaticStrings::Euler, Value::Float(std::f64::consts::E)),
        ];
        let math = self.namespace_object(&math_members);
        self.globals.insert(StaticStrings::Math.into(), math);

        let parse_id = self.interns.intern("parse");
        let stringify_id = self.interns.intern("stringify");
        let parse = Value::Native(self.add_native(parse_id, NativeKind::Builtin(Builtin::JsonParse)));
        let stringify = Value::Native(self.add_native(stringify_id, NativeKind::Builtin(Builtin::JsonStringify)));
        let json = {
            let mut obj = JsObject::new(ClassId::OBJECT, object_proto);
            obj.props.insert(PropKey::Str(parse_id), PropSlot::Data(parse));
            obj.props.insert(PropKey::Str(stringify_id), PropSlot::Data(stringify));
            Value::Ref(self.heap.alloc(HeapData::Object(obj)))
        };
        self.globals.insert(StaticStrings::Json.into(), json);

        let object_ns_members: Vec<(StaticStrings, Value)> = vec![
            (StaticStrings::Keys, self.builtin_value(StaticStrings::Keys, Builtin::ObjectKeys)),
            (
                StaticStrings::Values,
                self.builtin_value(StaticStrings::Values, Builtin::ObjectValues),
            ),
            (
                StaticStrings::Entries,
                self.builtin_value(StaticStrings::Entries, Builtin::ObjectEntries),
            ),
            (
                StaticStrings::Freeze,
                self.builtin_value(StaticStrings::Freeze, Builtin::ObjectFreeze),
            ),
            (
                StaticStrings::Assign,
                self.builtin_value(StaticStrings::Assign, Builtin::ObjectAssign),
            ),
            (
                StaticStrings::GetPrototypeOf,
                self.builtin_value(StaticStrings::GetPrototypeOf, Builtin::ObjectGetPrototypeOf),
            ),
        ];
        let object_ns = self.namespace_object(&object_ns_members);
        self.globals.insert(StaticStrings::Object.into(), object_ns);

        let array_ns_members: Vec<(StaticStrings, Value)> = vec![(
            StaticStrings::IsArray,
            self.builtin_value(StaticStrings::IsArray, Builtin::ArrayIsArray),
        )];
        let array_ns = self.namespace_object(&array_ns_members);
        self.globals.insert(StaticStrings::Array.into(), array_ns);

        let promise_ns_members: Vec<(StaticStrings, Value)> = vec![
            (
                StaticStrings::Resolve,
                self.builtin_value(StaticStrings::Resolve, Builtin::PromiseResolve),
            ),
            (
                StaticStrings::Reject,
                self.builtin_value(StaticStrings::Reject, Builtin::PromiseReject),
            ),
        ];
        let promise_ns = self.namespace_object(&promise_ns_members);
        self.globals.insert(StaticStrings::Promise.into(), promise_ns);
    }

    fn namespace_object(&mut self, members: &[(StaticStrings, Value)]) -> Value {
        let proto = self.class_protos[ClassId::OBJECT.0 as usize];
        let mut obj = JsObject::new(ClassId::OBJECT, proto);
        for &(name, value) in members {
            obj.props.insert(PropKey::Str(name.into()), PropSlot::Data(value));
        }
        Value::Ref(self.heap.alloc(HeapData::Object(obj)))
    }

    fn define_on(&mut self, target: Value, name: StaticStrings, value: Value) {
        let Value::Ref(id) = target else {
            unreachable!("prototype targets are heap objects");
        };
        let HeapData::Object(obj) = self.heap.get_mut(id) else {
            unreachable!("prototype targets are plain objects");
        };
        obj.props.insert(PropKey::Str(name.into()), PropSlot::Data(value));
        self.heap.write_barrier(id, value);
    }

    /// Allocates a fresh Symbol identity.
    pub(crate) fn next_symbol(&mut self) -> SymbolId {
        let id = SymbolId(self.symbol_counter);
        self.symbol_counter += 1;
        id
    }
}
