//! Heap object flavours: plain objects, arrays, functions/closures,
//! generators, promises, modules, capture cells, and iterators.
//!
//! Deep inheritance from the classic engine design is replaced by
//! composition: each flavour is its own struct carried in a `HeapData`
//! variant, with a `class_id` discriminator where the runtime's class table
//! needs to be consulted. Property maps are insertion-ordered (`IndexMap`)
//! because JS property iteration order is insertion order.

use ahash::RandomState;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    bytecode::{FunctionDefId, ModuleId},
    intern::{StringId, SymbolId},
    value::Value,
};

/// Index into the runtime's class-definition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Well-known class ids, fixed at runtime construction.
impl ClassId {
    pub const OBJECT: Self = Self(0);
    pub const ARRAY: Self = Self(1);
    pub const FUNCTION: Self = Self(2);
    pub const GENERATOR: Self = Self(3);
    pub const PROMISE: Self = Self(4);
    pub const MODULE: Self = Self(5);
    pub const ERROR: Self = Self(6);
}

/// A property key: interned string or symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropKey {
    Str(StringId),
    Sym(SymbolId),
}

/// A property slot: plain data or an accessor pair.
///
/// Accessor halves are `Value::Undefined` when absent.
#[derive(Debug, Clone, Copy)]
pub enum PropSlot {
    Data(Value),
    Accessor { get: Value, set: Value },
}

/// Insertion-ordered property map shared by every object flavour.
pub type PropMap = IndexMap<PropKey, PropSlot, RandomState>;

/// Walks every outgoing `Value` edge of a property map.
fn trace_props(props: &mut PropMap, f: &mut dyn FnMut(&mut Value)) {
    for slot in props.values_mut() {
        match slot {
            PropSlot::Data(value) => f(value),
            PropSlot::Accessor { get, set } => {
                f(get);
                f(set);
            }
        }
    }
}

/// A plain JS object: class id, prototype, property map.
#[derive(Debug)]
pub struct JsObject {
    pub class_id: ClassId,
    pub proto: Value,
    pub props: PropMap,
    /// Set by `Object.freeze`; writes are silently ignored.
    pub frozen: bool,
}

impl JsObject {
    #[must_use]
    pub fn new(class_id: ClassId, proto: Value) -> Self {
        Self {
            class_id,
            proto,
            props: PropMap::default(),
            frozen: false,
        }
    }

    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        f(&mut self.proto);
        trace_props(&mut self.props, f);
    }
}

/// An array: dense element vector plus the inherited map for named
/// properties.
#[derive(Debug)]
pub struct ArrayObject {
    pub elements: Vec<Value>,
    pub proto: Value,
    pub props: PropMap,
}

impl ArrayObject {
    #[must_use]
    pub fn new(elements: Vec<Value>, proto: Value) -> Self {
        Self {
            elements,
            proto,
            props: PropMap::default(),
        }
    }

    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        for element in &mut self.elements {
            f(element);
        }
        f(&mut self.proto);
        trace_props(&mut self.props, f);
    }
}

/// A closure: function definition plus its environment of capture cells.
#[derive(Debug)]
pub struct FunctionObject {
    pub def: FunctionDefId,
    /// Kept inline so traces and `fn.name` never need the def registry.
    pub name: StringId,
    /// One `Ref` to a `HeapData::Cell` per closure-var-table entry. Most
    /// closures capture at most a handful of variables.
    pub env: SmallVec<[Value; 4]>,
    /// `this` captured at closure creation, for arrow functions.
    pub captured_this: Value,
    /// The superclass constructor, for methods that use `super`.
    pub home_super: Value,
    /// Marks class constructors (callable only via `new`).
    pub is_ctor: bool,
    pub proto: Value,
    /// Named properties (`prototype`, user additions).
    pub props: PropMap,
}

impl FunctionObject {
    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        for cell in &mut self.env {
            f(cell);
        }
        f(&mut self.captured_this);
        f(&mut self.home_super);
        f(&mut self.proto);
        trace_props(&mut self.props, f);
    }
}

/// Generator lifecycle per the suspend/resume protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created or suspended at a `Yield`; `next` may resume it.
    Suspended,
    /// Currently on the VM stack; reentrant `next` is a TypeError.
    Executing,
    /// Returned or thrown; `next` yields `{ value: undefined, done: true }`.
    Closed,
}

/// A suspended generator (or the hidden generator inside an async
/// function): a detached frame.
#[derive(Debug)]
pub struct GeneratorObject {
    pub def: FunctionDefId,
    pub name: StringId,
    pub state: GeneratorState,
    /// Resume pc; 0 before the first `next`.
    pub ip: u32,
    /// Saved frame region: locals at the bottom, operands above.
    pub stack: Vec<Value>,
    pub this_val: Value,
    /// Capture cells, copied from the closure that created the generator.
    pub env: SmallVec<[Value; 4]>,
    /// For async functions: the promise settled by this body's completion.
    pub promise: Value,
    pub proto: Value,
}

impl GeneratorObject {
    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        for value in &mut self.stack {
            f(value);
        }
        f(&mut self.this_val);
        for cell in &mut self.env {
            f(cell);
        }
        f(&mut self.promise);
        f(&mut self.proto);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// A reaction registered on a pending promise.
#[derive(Debug)]
pub enum Reaction {
    /// `.then(onFulfilled, onRejected)` with its derived promise.
    Then {
        on_fulfilled: Value,
        on_rejected: Value,
        derived: Value,
    },
    /// Resume an awaiting async function body.
    AwaitResume { generator: Value },
}

impl Reaction {
    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        match self {
            Self::Then {
                on_fulfilled,
                on_rejected,
                derived,
            } => {
                f(on_fulfilled);
                f(on_rejected);
                f(derived);
            }
            Self::AwaitResume { generator } => f(generator),
        }
    }
}

#[derive(Debug)]
pub struct PromiseObject {
    pub state: PromiseState,
    /// Fulfilment value or rejection reason.
    pub result: Value,
    /// Reactions waiting for settlement, in registration order.
    pub reactions: Vec<Reaction>,
    pub proto: Value,
}

impl PromiseObject {
    #[must_use]
    pub fn pending(proto: Value) -> Self {
        Self {
            state: PromiseState::Pending,
            result: Value::Undefined,
            reactions: Vec::new(),
            proto,
        }
    }

    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        f(&mut self.result);
        for reaction in &mut self.reactions {
            reaction.trace(f);
        }
        f(&mut self.proto);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Compiled and cached, body not yet started.
    Instantiated,
    /// Body executing; cyclic importers see partially initialised bindings.
    Evaluating,
    Evaluated,
}

/// A module instance: its top-level variable array doubles as the module
/// frame's local slots, so exports observe live bindings.
#[derive(Debug)]
pub struct ModuleObject {
    pub def: ModuleId,
    pub state: ModuleState,
    /// Top-level variable slots; `Value::Hole` until initialised.
    pub vars: Vec<Value>,
}

impl ModuleObject {
    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        for value in &mut self.vars {
            f(value);
        }
    }
}

/// Iterator state produced by `GetIterator`.
#[derive(Debug)]
pub enum IterState {
    /// Live indexed iteration over an array.
    Indexed { target: Value, index: u32 },
    /// Snapshot iteration (string characters, for-in key lists).
    Items { items: Vec<Value>, index: u32 },
}

impl IterState {
    pub fn trace(&mut self, f: &mut dyn FnMut(&mut Value)) {
        match self {
            Self::Indexed { target, .. } => f(target),
            Self::Items { items, .. } => {
                for item in items {
                    f(item);
                }
            }
        }
    }
}
