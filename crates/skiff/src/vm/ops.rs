//! Operator and data-access opcode handlers: JS numeric coercion,
//! comparisons, property access with prototype chains, literals, and
//! iteration.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    error::{RunError, RunResult},
    heap::HeapData,
    intern::{StaticStrings, StringId},
    object::{ArrayObject, ClassId, IterState, JsObject, PropKey, PropSlot},
    value::{Value, parse_js_number, to_js_string},
    vm::Vm,
};

/// A coerced numeric operand: i64 when exact, f64 otherwise.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Int(v) => Value::Int(v),
            Self::Float(v) => Value::Float(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryKind {
    Neg,
    ToNumber,
    Inc,
    Dec,
    BitNot,
}

/// Result of a property lookup before accessor dispatch.
enum Lookup {
    Value(Value),
    Getter(Value),
    NotFound,
}

impl Vm<'_, '_> {
    // --- numeric coercion ---

    /// JS ToNumber. BigInts refuse numeric coercion (mixed BigInt/Number
    /// arithmetic is a TypeError).
    pub(crate) fn to_number(&self, value: Value) -> RunResult<Num> {
        let num = match value {
            Value::Undefined | Value::Hole => Num::Float(f64::NAN),
            Value::Null => Num::Int(0),
            Value::Bool(b) => Num::Int(i64::from(b)),
            Value::Int(v) => Num::Int(v),
            Value::Float(v) => Num::Float(v),
            Value::String(id) => match parse_js_number(self.ctx.interns.get(id)) {
                Some(v) => float_to_num(v),
                None => Num::Float(f64::NAN),
            },
            Value::BigInt(_) => {
                return Err(RunError::type_error("Cannot mix BigInt and other types in arithmetic"));
            }
            Value::Symbol(_) => {
                return Err(RunError::type_error("Cannot convert a Symbol value to a number"));
            }
            Value::FunctionDef(_) | Value::Native(_) => Num::Float(f64::NAN),
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Str(s) => match parse_js_number(s) {
                    Some(v) => float_to_num(v),
                    None => Num::Float(f64::NAN),
                },
                HeapData::Array(array) if array.elements.len() == 1 => {
                    // [x] coerces like x; longer arrays are NaN.
                    return self.to_number(array.elements[0]);
                }
                HeapData::Array(array) if array.elements.is_empty() => Num::Int(0),
                _ => Num::Float(f64::NAN),
            },
        };
        Ok(num)
    }

    fn is_string_like(&self, value: Value) -> bool {
        match value {
            Value::String(_) => true,
            Value::Ref(id) => matches!(
                self.ctx.heap.get(id),
                HeapData::Str(_) | HeapData::Array(_) | HeapData::Object(_) | HeapData::Function(_)
            ),
            _ => false,
        }
    }

    pub(crate) fn binary_op(&mut self, kind: BinaryKind) -> RunResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let result = self.apply_binary(kind, lhs, rhs)?;
        self.push(result);
        Ok(())
    }

    fn apply_binary(&mut self, kind: BinaryKind, lhs: Value, rhs: Value) -> RunResult<Value> {
        // BigInt ⋄ BigInt arithmetic and comparison; mixing throws below.
        if let (Value::BigInt(a), Value::BigInt(b)) = (lhs, rhs) {
            return self.bigint_binary(kind, a, b);
        }

        match kind {
            BinaryKind::Add => {
                // String `+` concatenates; arrays/objects coerce to strings
                // first.
                if self.is_string_like(lhs) || self.is_string_like(rhs) {
                    let mut left = to_js_string(lhs, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs);
                    let right = to_js_string(rhs, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs);
                    left.push_str(&right);
                    return Ok(self.alloc_string(left));
                }
                let (a, b) = (self.to_number(lhs)?, self.to_number(rhs)?);
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => match x.checked_add(y) {
                        Some(v) => Value::Int(v),
                        None => Value::Float(x as f64 + y as f64),
                    },
                    _ => Value::Float(a.as_f64() + b.as_f64()),
                })
            }
            BinaryKind::Sub | BinaryKind::Mul => {
                let (a, b) = (self.to_number(lhs)?, self.to_number(rhs)?);
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => {
                        let checked = if kind == BinaryKind::Sub {
                            x.checked_sub(y)
                        } else {
                            x.checked_mul(y)
                        };
                        match checked {
                            Some(v) => Value::Int(v),
                            None if kind == BinaryKind::Sub => Value::Float(x as f64 - y as f64),
                            None => Value::Float(x as f64 * y as f64),
                        }
                    }
                    _ if kind == BinaryKind::Sub => Value::Float(a.as_f64() - b.as_f64()),
                    _ => Value::Float(a.as_f64() * b.as_f64()),
                })
            }
            BinaryKind::Div => {
                let (a, b) = (self.to_number(lhs)?, self.to_number(rhs)?);
                if let (Num::Int(x), Num::Int(y)) = (a, b)
                    && y != 0
                    && x % y == 0
                {
                    return Ok(Value::Int(x / y));
                }
                Ok(Value::Float(a.as_f64() / b.as_f64()))
            }
            BinaryKind::Rem => {
                let (a, b) = (self.to_number(lhs)?, self.to_number(rhs)?);
                if let (Num::Int(x), Num::Int(y)) = (a, b)
                    && y != 0
                {
                    return Ok(Value::Int(x.wrapping_rem(y)));
                }
                Ok(Value::Float(a.as_f64() % b.as_f64()))
            }
            BinaryKind::Exp => {
                let (a, b) = (self.to_number(lhs)?, self.to_number(rhs)?);
                if let (Num::Int(x), Num::Int(y)) = (a, b)
                    && let Ok(exp) = u32::try_from(y)
                    && let Some(v) = x.checked_pow(exp)
                {
                    return Ok(Value::Int(v));
                }
                Ok(Value::Float(a.as_f64().powf(b.as_f64())))
            }
            BinaryKind::Lt | BinaryKind::Le | BinaryKind::Gt | BinaryKind::Ge => {
                // Two strings compare lexicographically; otherwise numeric.
                let string_pair = {
                    let left = lhs.as_str(&self.ctx.heap, &self.ctx.interns);
                    let right = rhs.as_str(&self.ctx.heap, &self.ctx.interns);
                    match (left, right) {
                        (Some(a), Some(b)) => Some(match kind {
                            BinaryKind::Lt => a < b,
                            BinaryKind::Le => a <= b,
                            BinaryKind::Gt => a > b,
                            _ => a >= b,
                        }),
                        _ => None,
                    }
                };
                if let Some(result) = string_pair {
                    return Ok(Value::Bool(result));
                }
                let (a, b) = (self.to_number(lhs)?.as_f64(), self.to_number(rhs)?.as_f64());
                Ok(Value::Bool(match kind {
                    BinaryKind::Lt => a < b,
                    BinaryKind::Le => a <= b,
                    BinaryKind::Gt => a > b,
                    _ => a >= b,
                }))
            }
            BinaryKind::BitAnd | BinaryKind::BitOr | BinaryKind::BitXor | BinaryKind::Shl | BinaryKind::Shr => {
                let a = to_int32(self.to_number(lhs)?);
                let b = to_int32(self.to_number(rhs)?);
                let v = match kind {
                    BinaryKind::BitAnd => a & b,
                    BinaryKind::BitOr => a | b,
                    BinaryKind::BitXor => a ^ b,
                    BinaryKind::Shl => a.wrapping_shl(b as u32 & 31),
                    _ => a.wrapping_shr(b as u32 & 31),
                };
                Ok(Value::Int(i64::from(v)))
            }
            BinaryKind::UShr => {
                let a = to_int32(self.to_number(lhs)?) as u32;
                let b = to_int32(self.to_number(rhs)?) as u32;
                Ok(Value::Int(i64::from(a.wrapping_shr(b & 31))))
            }
        }
    }

    fn bigint_binary(&mut self, kind: BinaryKind, a: crate::value::BigIntId, b: crate::value::BigIntId) -> RunResult<Value> {
        let left = self.ctx.heap.bigint(a).clone();
        let right = self.ctx.heap.bigint(b).clone();
        let value = match kind {
            BinaryKind::Add => left + right,
            BinaryKind::Sub => left - right,
            BinaryKind::Mul => left * right,
            BinaryKind::Div => {
                if right == BigInt::from(0) {
                    return Err(RunError::range_error("Division by zero"));
                }
                left / right
            }
            BinaryKind::Rem => {
                if right == BigInt::from(0) {
                    return Err(RunError::range_error("Division by zero"));
                }
                left % right
            }
            BinaryKind::Exp => {
                let exp = right
                    .to_u32()
                    .ok_or_else(|| RunError::range_error("BigInt exponent out of range"))?;
                left.pow(exp)
            }
            BinaryKind::Lt => return Ok(Value::Bool(left < right)),
            BinaryKind::Le => return Ok(Value::Bool(left <= right)),
            BinaryKind::Gt => return Ok(Value::Bool(left > right)),
            BinaryKind::Ge => return Ok(Value::Bool(left >= right)),
            _ => {
                return Err(RunError::type_error("bitwise operations are not supported on BigInt"));
            }
        };
        let id = self.ctx.heap.intern_bigint(value);
        Ok(Value::BigInt(id))
    }

    pub(crate) fn unary_numeric(&mut self, kind: UnaryKind) -> RunResult<()> {
        let value = self.pop()?;
        // BigInt negation and increment keep BigInt-ness.
        if let Value::BigInt(id) = value {
            let current = self.ctx.heap.bigint(id).clone();
            let result = match kind {
                UnaryKind::Neg => -current,
                UnaryKind::ToNumber => {
                    return Err(RunError::type_error("Cannot convert a BigInt value to a number"));
                }
                UnaryKind::Inc => current + 1,
                UnaryKind::Dec => current - 1,
                UnaryKind::BitNot => !current,
            };
            let id = self.ctx.heap.intern_bigint(result);
            self.push(Value::BigInt(id));
            return Ok(());
        }
        let num = self.to_number(value)?;
        let result = match kind {
            UnaryKind::Neg => match num {
                Num::Int(v) => v.checked_neg().map_or(Value::Float(-(v as f64)), Value::Int),
                Num::Float(v) => Value::Float(-v),
            },
            UnaryKind::ToNumber => num.into_value(),
            UnaryKind::Inc => match num {
                Num::Int(v) => v.checked_add(1).map_or(Value::Float(v as f64 + 1.0), Value::Int),
                Num::Float(v) => Value::Float(v + 1.0),
            },
            UnaryKind::Dec => match num {
                Num::Int(v) => v.checked_sub(1).map_or(Value::Float(v as f64 - 1.0), Value::Int),
                Num::Float(v) => Value::Float(v - 1.0),
            },
            UnaryKind::BitNot => Value::Int(i64::from(!to_int32(num))),
        };
        self.push(result);
        Ok(())
    }

    pub(crate) fn equality_op(&mut self, strict: bool, negate: bool) -> RunResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let eq = if strict {
            lhs.strict_eq(rhs, &self.ctx.heap, &self.ctx.interns)
        } else {
            lhs.loose_eq(rhs, &self.ctx.heap, &self.ctx.interns)
        };
        self.push(Value::Bool(eq != negate));
        Ok(())
    }

    pub(crate) fn op_in(&mut self) -> RunResult<()> {
        let object = self.pop()?;
        let key = self.pop()?;
        let key = self.value_to_prop_key(key)?;
        let Value::Ref(_) = object else {
            return Err(RunError::type_error("Cannot use 'in' operator on a non-object"));
        };
        let found = !matches!(self.lookup_property(object, key)?, Lookup::NotFound);
        self.push(Value::Bool(found));
        Ok(())
    }

    pub(crate) fn op_instanceof(&mut self) -> RunResult<()> {
        let ctor = self.pop()?;
        let value = self.pop()?;
        let Value::Ref(ctor_id) = ctor else {
            return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let HeapData::Function(func) = self.ctx.heap.get(ctor_id) else {
            return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let proto_key = PropKey::Str(StaticStrings::Prototype.into());
        let prototype = match func.props.get(&proto_key) {
            Some(PropSlot::Data(v)) => *v,
            _ => {
                self.push(Value::Bool(false));
                return Ok(());
            }
        };
        let mut cursor = self.proto_of(value);
        let mut found = false;
        while let Value::Ref(id) = cursor {
            if Value::Ref(id) == prototype {
                found = true;
                break;
            }
            cursor = self.proto_of(cursor);
        }
        self.push(Value::Bool(found));
        Ok(())
    }

    /// The prototype of a value (its own `proto` field, or the class
    /// prototype for primitives).
    fn proto_of(&self, value: Value) -> Value {
        match value {
            Value::String(_) => self.ctx.string_proto,
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Str(_) => self.ctx.string_proto,
                HeapData::Object(o) => o.proto,
                HeapData::Array(a) => a.proto,
                HeapData::Function(f) => f.proto,
                HeapData::Generator(g) => g.proto,
                HeapData::Promise(p) => p.proto,
                HeapData::Module(_) | HeapData::Cell(_) | HeapData::Iter(_) => Value::Null,
            },
            _ => Value::Null,
        }
    }

    // --- locals & globals ---

    pub(crate) fn op_var_load(&mut self, slot: u16) -> RunResult<()> {
        let raw = self.read_slot(slot)?;
        let value = match raw {
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Cell(inner) => *inner,
                _ => raw,
            },
            other => other,
        };
        if matches!(value, Value::Hole) {
            let name = self.slot_name(slot);
            return Err(RunError::reference_error(format!(
                "Cannot access '{name}' before initialization"
            )));
        }
        self.push(value);
        Ok(())
    }

    pub(crate) fn op_var_store(&mut self, slot: u16) -> RunResult<()> {
        let value = self.pop()?;
        let current = self.read_slot(slot)?;
        if let Value::Ref(id) = current
            && matches!(self.ctx.heap.get(id), HeapData::Cell(_))
        {
            let HeapData::Cell(inner) = self.ctx.heap.get_mut(id) else {
                unreachable!("checked above");
            };
            *inner = value;
            self.ctx.heap.write_barrier(id, value);
            return Ok(());
        }
        self.write_slot(slot, value)
    }

    fn read_slot(&self, slot: u16) -> RunResult<Value> {
        let frame = self.frame();
        if let Value::Ref(module_id) = frame.module_vars {
            let HeapData::Module(module) = self.ctx.heap.get(module_id) else {
                return Err(RunError::internal("module frame without module object"));
            };
            return Ok(module.vars[slot as usize]);
        }
        Ok(self.ctx.stack[frame.stack_base + slot as usize])
    }

    pub(crate) fn write_slot(&mut self, slot: u16, value: Value) -> RunResult<()> {
        let frame_module = self.frame().module_vars;
        if let Value::Ref(module_id) = frame_module {
            let HeapData::Module(module) = self.ctx.heap.get_mut(module_id) else {
                return Err(RunError::internal("module frame without module object"));
            };
            module.vars[slot as usize] = value;
            self.ctx.heap.write_barrier(module_id, value);
            return Ok(());
        }
        let base = self.frame().stack_base;
        self.ctx.stack[base + slot as usize] = value;
        Ok(())
    }

    fn slot_name(&self, slot: u16) -> String {
        let def = &self.ctx.defs.funcs[self.frame().func.0 as usize];
        def.var_names
            .get(slot as usize)
            .map_or_else(|| format!("slot {slot}"), |id| self.ctx.interns.get(*id).to_owned())
    }

    pub(crate) fn op_get_global(&mut self, raw_name: u32, soft: bool) -> RunResult<()> {
        let name = StringId::from_raw(raw_name);
        match self.ctx.globals.get(&name) {
            Some(&value) => self.push(value),
            None if soft => self.push(Value::Undefined),
            None => {
                let text = self.ctx.interns.get(name).to_owned();
                return Err(RunError::reference_error(format!("{text} is not defined")));
            }
        }
        Ok(())
    }

    // --- property access ---

    /// Walks own properties then the prototype chain.
    fn lookup_property(&mut self, object: Value, key: PropKey) -> RunResult<Lookup> {
        // Own lookup per flavour, then generic chain walk.
        let mut cursor = object;
        let mut depth = 0;
        loop {
            depth += 1;
            if depth > 1000 {
                return Err(RunError::internal("prototype chain too deep"));
            }
            match self.own_property(cursor, key)? {
                Lookup::NotFound => {
                    let next = self.proto_of(cursor);
                    if next.is_nullish() {
                        return Ok(Lookup::NotFound);
                    }
                    cursor = next;
                }
                found => return Ok(found),
            }
        }
    }

    /// Own-property lookup; handles per-class specialisations (array
    /// length/indices, string length/chars, module exports, lazy function
    /// `prototype`).
    fn own_property(&mut self, object: Value, key: PropKey) -> RunResult<Lookup> {
        let length_key = PropKey::Str(StaticStrings::Length.into());
        // Functions get their `prototype` object created on first access,
        // which mutates the heap; handle them before borrowing the target.
        if let Value::Ref(id) = object
            && matches!(self.ctx.heap.get(id), HeapData::Function(_))
        {
            return self.function_own_property(id, key, length_key);
        }
        match object {
            Value::String(_) => {
                let s = object
                    .as_str(&self.ctx.heap, &self.ctx.interns)
                    .expect("string value has text");
                if key == length_key {
                    return Ok(Lookup::Value(Value::Int(
                        i64::try_from(s.chars().count()).expect("string length fits i64"),
                    )));
                }
                if let Some(index) = self.key_as_index(key) {
                    return Ok(match s.chars().nth(index) {
                        Some(c) => {
                            let buf = c.to_string();
                            Lookup::Value(Value::String(self.ctx.interns.intern(&buf)))
                        }
                        None => Lookup::NotFound,
                    });
                }
                Ok(Lookup::NotFound)
            }
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Str(s) => {
                    if key == length_key {
                        let count = i64::try_from(s.chars().count()).expect("string length fits i64");
                        return Ok(Lookup::Value(Value::Int(count)));
                    }
                    if let Some(index) = self.key_as_index(key) {
                        let ch = s.chars().nth(index);
                        return Ok(match ch {
                            Some(c) => {
                                let buf = c.to_string();
                                Lookup::Value(Value::String(self.ctx.interns.intern(&buf)))
                            }
                            None => Lookup::NotFound,
                        });
                    }
                    Ok(Lookup::NotFound)
                }
                HeapData::Array(array) => {
                    if key == length_key {
                        return Ok(Lookup::Value(Value::Int(
                            i64::try_from(array.elements.len()).expect("array length fits i64"),
                        )));
                    }
                    if let Some(index) = self.key_as_index(key) {
                        return Ok(match array.elements.get(index) {
                            Some(&v) => Lookup::Value(v),
                            None => Lookup::NotFound,
                        });
                    }
                    Ok(slot_lookup(array.props.get(&key)))
                }
                HeapData::Object(obj) => Ok(slot_lookup(obj.props.get(&key))),
                HeapData::Function(_) => unreachable!("functions handled before the flavour match"),
                HeapData::Module(module) => {
                    let PropKey::Str(name) = key else {
                        return Ok(Lookup::NotFound);
                    };
                    let def = self.ctx.defs.module(module.def);
                    match def.export_slot(name) {
                        Some(slot) => {
                            let value = module.vars[slot as usize];
                            if matches!(value, Value::Hole) {
                                let text = self.ctx.interns.get(name).to_owned();
                                return Err(RunError::reference_error(format!(
                                    "Cannot access '{text}' before initialization"
                                )));
                            }
                            // Exported bindings may themselves be capture
                            // cells.
                            if let Value::Ref(cell_id) = value
                                && let HeapData::Cell(inner) = self.ctx.heap.get(cell_id)
                            {
                                return Ok(Lookup::Value(*inner));
                            }
                            Ok(Lookup::Value(value))
                        }
                        None => Ok(Lookup::NotFound),
                    }
                }
                HeapData::Generator(_) | HeapData::Promise(_) => Ok(Lookup::NotFound),
                HeapData::Cell(_) | HeapData::Iter(_) => Err(RunError::internal("property access on internal object")),
            },
            _ => Ok(Lookup::NotFound),
        }
    }

    fn function_own_property(
        &mut self,
        id: crate::heap::HeapId,
        key: PropKey,
        length_key: PropKey,
    ) -> RunResult<Lookup> {
        let slot = {
            let HeapData::Function(func) = self.ctx.heap.get(id) else {
                unreachable!("caller checked the function flavour");
            };
            if key == PropKey::Str(StaticStrings::Name.into()) {
                return Ok(Lookup::Value(Value::String(func.name)));
            }
            if key == length_key {
                let def = &self.ctx.defs.funcs[func.def.0 as usize];
                return Ok(Lookup::Value(Value::Int(i64::from(def.param_count))));
            }
            func.props.get(&key).copied()
        };
        match slot_lookup(slot.as_ref()) {
            Lookup::NotFound if key == PropKey::Str(StaticStrings::Prototype.into()) => {
                let prototype = self.ensure_function_prototype(id);
                Ok(Lookup::Value(prototype))
            }
            found => Ok(found),
        }
    }

    /// Returns `fn.prototype`, creating it on first access: a plain object
    /// whose `constructor` points back at the function.
    pub(crate) fn ensure_function_prototype(&mut self, func_id: crate::heap::HeapId) -> Value {
        let existing = {
            let HeapData::Function(func) = self.ctx.heap.get(func_id) else {
                unreachable!("caller checked the function flavour");
            };
            match func.props.get(&PropKey::Str(StaticStrings::Prototype.into())) {
                Some(PropSlot::Data(v)) => Some(*v),
                _ => None,
            }
        };
        if let Some(prototype) = existing {
            return prototype;
        }
        let object_proto = self.ctx.class_protos[ClassId::OBJECT.0 as usize];
        let mut proto_obj = JsObject::new(ClassId::OBJECT, object_proto);
        proto_obj
            .props
            .insert(PropKey::Str(StaticStrings::Constructor.into()), PropSlot::Data(Value::Ref(func_id)));
        let proto_id = self.ctx.heap.alloc(HeapData::Object(proto_obj));
        let prototype = Value::Ref(proto_id);
        let HeapData::Function(func) = self.ctx.heap.get_mut(func_id) else {
            unreachable!("caller checked the function flavour");
        };
        func.props
            .insert(PropKey::Str(StaticStrings::Prototype.into()), PropSlot::Data(prototype));
        self.ctx.heap.write_barrier(func_id, prototype);
        prototype
    }

    fn key_as_index(&self, key: PropKey) -> Option<usize> {
        let PropKey::Str(id) = key else { return None };
        let text = self.ctx.interns.get(id);
        if text.is_empty() || (text.len() > 1 && text.starts_with('0')) {
            return None;
        }
        text.parse::<usize>().ok()
    }

    /// Import-binding read: pops nothing (object stays via the caller's
    /// Dup), pushes the export slot's current value — hole included.
    pub(crate) fn op_bind_import(&mut self, name: StringId) -> RunResult<()> {
        let module = self.pop()?;
        let Value::Ref(id) = module else {
            return Err(RunError::type_error("import target is not a module"));
        };
        let HeapData::Module(m) = self.ctx.heap.get(id) else {
            return Err(RunError::type_error("import target is not a module"));
        };
        let def = self.ctx.defs.module(m.def);
        let Some(slot) = def.export_slot(name) else {
            let text = self.ctx.interns.get(name).to_owned();
            let module_name = self.ctx.interns.get(def.name).to_owned();
            return Err(RunError::syntax_error(format!(
                "module '{module_name}' does not provide an export named '{text}'"
            )));
        };
        let mut value = m.vars[slot as usize];
        if let Value::Ref(cell_id) = value
            && let HeapData::Cell(inner) = self.ctx.heap.get(cell_id)
        {
            value = *inner;
        }
        self.push(value);
        Ok(())
    }

    pub(crate) fn op_property_load(&mut self, object: Value, key: PropKey) -> RunResult<()> {
        if object.is_nullish() {
            let name = self.describe_key(key);
            return Err(RunError::type_error(format!(
                "Cannot read properties of {} (reading '{name}')",
                if matches!(object, Value::Null) { "null" } else { "undefined" }
            )));
        }
        match self.lookup_property(object, key)? {
            Lookup::Value(value) => {
                self.push(value);
                Ok(())
            }
            Lookup::Getter(getter) => {
                // The getter's return value lands exactly where the
                // property value belongs.
                self.invoke(getter, object, &[], false)
            }
            Lookup::NotFound => {
                self.push(Value::Undefined);
                Ok(())
            }
        }
    }

    pub(crate) fn op_property_store(&mut self, object: Value, key: PropKey, value: Value) -> RunResult<()> {
        let Value::Ref(id) = object else {
            return Err(RunError::type_error("Cannot create properties on a primitive"));
        };

        // Accessor with a setter anywhere on the chain wins over a data
        // store.
        if let Some(setter) = self.find_setter(object, key)? {
            return self.invoke(setter, object, &[value], true);
        }

        let length_key = PropKey::Str(StaticStrings::Length.into());
        let index = self.key_as_index(key);
        match self.ctx.heap.get_mut(id) {
            HeapData::Array(array) => {
                if key == length_key {
                    let Value::Int(new_len) = value else {
                        return Err(RunError::range_error("Invalid array length"));
                    };
                    let new_len = usize::try_from(new_len).map_err(|_| RunError::range_error("Invalid array length"))?;
                    array.elements.resize(new_len, Value::Undefined);
                    return Ok(());
                }
                if let Some(index) = index {
                    if index >= array.elements.len() {
                        array.elements.resize(index + 1, Value::Undefined);
                    }
                    array.elements[index] = value;
                    self.ctx.heap.write_barrier(id, value);
                    return Ok(());
                }
                array.props.insert(key, PropSlot::Data(value));
                self.ctx.heap.write_barrier(id, value);
                Ok(())
            }
            HeapData::Object(obj) => {
                if obj.frozen {
                    return Ok(());
                }
                obj.props.insert(key, PropSlot::Data(value));
                self.ctx.heap.write_barrier(id, value);
                Ok(())
            }
            HeapData::Function(func) => {
                func.props.insert(key, PropSlot::Data(value));
                self.ctx.heap.write_barrier(id, value);
                Ok(())
            }
            HeapData::Module(_) => Err(RunError::type_error("Cannot assign to module namespace")),
            HeapData::Str(_) => Ok(()),
            HeapData::Generator(_) | HeapData::Promise(_) => Ok(()),
            HeapData::Cell(_) | HeapData::Iter(_) => Err(RunError::internal("property store on internal object")),
        }
    }

    /// Finds a setter for `key` along the prototype chain.
    fn find_setter(&mut self, object: Value, key: PropKey) -> RunResult<Option<Value>> {
        let mut cursor = object;
        loop {
            if let Value::Ref(id) = cursor {
                let slot = match self.ctx.heap.get(id) {
                    HeapData::Object(o) => o.props.get(&key).copied(),
                    HeapData::Array(a) => a.props.get(&key).copied(),
                    HeapData::Function(f) => f.props.get(&key).copied(),
                    _ => None,
                };
                match slot {
                    Some(PropSlot::Accessor { set, .. }) => {
                        return Ok(if matches!(set, Value::Undefined) { None } else { Some(set) });
                    }
                    Some(PropSlot::Data(_)) => return Ok(None),
                    None => {}
                }
            }
            let next = self.proto_of(cursor);
            if next.is_nullish() {
                return Ok(None);
            }
            cursor = next;
        }
    }

    pub(crate) fn op_indexed_load(&mut self, object: Value, key: Value) -> RunResult<()> {
        // Fast path: integer index into a dense array or string.
        if let (Value::Ref(id), Value::Int(index)) = (object, key)
            && index >= 0
            && let HeapData::Array(array) = self.ctx.heap.get(id)
        {
            let value = array.elements.get(index as usize).copied().unwrap_or(Value::Undefined);
            self.push(value);
            return Ok(());
        }
        let prop_key = self.value_to_prop_key(key)?;
        self.op_property_load(object, prop_key)
    }

    pub(crate) fn op_indexed_store(&mut self, object: Value, key: Value, value: Value) -> RunResult<()> {
        if let (Value::Ref(id), Value::Int(index)) = (object, key)
            && index >= 0
            && let HeapData::Array(array) = self.ctx.heap.get_mut(id)
        {
            let index = index as usize;
            if index >= array.elements.len() {
                array.elements.resize(index + 1, Value::Undefined);
            }
            array.elements[index] = value;
            self.ctx.heap.write_barrier(id, value);
            return Ok(());
        }
        let prop_key = self.value_to_prop_key(key)?;
        self.op_property_store(object, prop_key, value)
    }

    pub(crate) fn op_delete(&mut self, object: Value, key: PropKey) -> RunResult<bool> {
        let Value::Ref(id) = object else {
            return Ok(true);
        };
        let index = self.key_as_index(key);
        match self.ctx.heap.get_mut(id) {
            HeapData::Array(array) => {
                if let Some(index) = index {
                    if index < array.elements.len() {
                        array.elements[index] = Value::Undefined;
                    }
                    return Ok(true);
                }
                array.props.shift_remove(&key);
                Ok(true)
            }
            HeapData::Object(obj) => {
                if obj.frozen {
                    return Ok(false);
                }
                obj.props.shift_remove(&key);
                Ok(true)
            }
            HeapData::Function(func) => {
                func.props.shift_remove(&key);
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    fn describe_key(&self, key: PropKey) -> String {
        match key {
            PropKey::Str(id) => self.ctx.interns.get(id).to_owned(),
            PropKey::Sym(_) => "Symbol()".to_owned(),
        }
    }

    // --- literals ---

    pub(crate) fn op_array_new(&mut self, count: usize) -> RunResult<()> {
        let len = self.ctx.stack.len();
        if len < count {
            return Err(RunError::internal("operand stack underflow in ArrayNew"));
        }
        let elements: Vec<Value> = self.ctx.stack.split_off(len - count);
        let proto = self.ctx.class_protos[ClassId::ARRAY.0 as usize];
        let id = self.ctx.heap.alloc(HeapData::Array(ArrayObject::new(elements, proto)));
        self.push(Value::Ref(id));
        Ok(())
    }

    pub(crate) fn op_array_push(&mut self) -> RunResult<()> {
        let value = self.pop()?;
        let array = self.peek()?;
        let Value::Ref(id) = array else {
            return Err(RunError::internal("ArrayPush target is not an array"));
        };
        let HeapData::Array(arr) = self.ctx.heap.get_mut(id) else {
            return Err(RunError::internal("ArrayPush target is not an array"));
        };
        arr.elements.push(value);
        self.ctx.heap.write_barrier(id, value);
        Ok(())
    }

    pub(crate) fn op_array_spread(&mut self) -> RunResult<()> {
        let iterable = self.pop()?;
        let target = self.peek()?;
        let Value::Ref(target_id) = target else {
            return Err(RunError::internal("ArraySpread target is not an array"));
        };
        let values: Vec<Value> = match iterable {
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Array(arr) => arr.elements.clone(),
                HeapData::Str(s) => {
                    let chars: Vec<String> = s.chars().map(|c| c.to_string()).collect();
                    chars
                        .iter()
                        .map(|c| Value::String(self.ctx.interns.intern(c)))
                        .collect()
                }
                _ => return Err(RunError::type_error("value is not spreadable")),
            },
            Value::String(sid) => {
                let chars: Vec<String> = self.ctx.interns.get(sid).chars().map(|c| c.to_string()).collect();
                chars
                    .iter()
                    .map(|c| Value::String(self.ctx.interns.intern(c)))
                    .collect()
            }
            _ => return Err(RunError::type_error("value is not spreadable")),
        };
        for value in values {
            let HeapData::Array(arr) = self.ctx.heap.get_mut(target_id) else {
                unreachable!("checked above");
            };
            arr.elements.push(value);
            self.ctx.heap.write_barrier(target_id, value);
        }
        Ok(())
    }

    pub(crate) fn op_object_new(&mut self, pairs: usize) -> RunResult<()> {
        let len = self.ctx.stack.len();
        if len < pairs * 2 {
            return Err(RunError::internal("operand stack underflow in ObjectNew"));
        }
        let mut entries = self.ctx.stack.split_off(len - pairs * 2);
        let object_proto = self.ctx.class_protos[ClassId::OBJECT.0 as usize];
        let mut obj = JsObject::new(ClassId::OBJECT, object_proto);
        for chunk in entries.chunks_exact_mut(2) {
            let key = self.value_to_prop_key(chunk[0])?;
            obj.props.insert(key, PropSlot::Data(chunk[1]));
        }
        let id = self.ctx.heap.alloc(HeapData::Object(obj));
        self.push(Value::Ref(id));
        Ok(())
    }

    pub(crate) fn op_define_accessor(&mut self, flag: u8) -> RunResult<()> {
        let function = self.pop()?;
        let key = self.pop()?;
        let key = self.value_to_prop_key(key)?;
        let target = self.peek()?;
        let function = self.materialize_function(function)?;
        let Value::Ref(id) = target else {
            return Err(RunError::internal("DefineAccessor target is not an object"));
        };
        let HeapData::Object(obj) = self.ctx.heap.get_mut(id) else {
            return Err(RunError::internal("DefineAccessor target is not an object"));
        };
        let slot = obj.props.entry(key).or_insert(PropSlot::Accessor {
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
            if flag == 0 {
                *get = function;
            } else {
                *set = function;
            }
        }
        self.ctx.heap.write_barrier(id, function);
        Ok(())
    }

    // --- iteration ---

    pub(crate) fn op_get_iterator(&mut self) -> RunResult<()> {
        let value = self.pop()?;
        let iterator = match value {
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Array(_) => {
                    let iter = IterState::Indexed { target: value, index: 0 };
                    Value::Ref(self.ctx.heap.alloc(HeapData::Iter(iter)))
                }
                HeapData::Generator(_) => value,
                HeapData::Str(s) => {
                    let chars: Vec<String> = s.chars().map(|c| c.to_string()).collect();
                    let items = chars
                        .iter()
                        .map(|c| Value::String(self.ctx.interns.intern(c)))
                        .collect();
                    Value::Ref(self.ctx.heap.alloc(HeapData::Iter(IterState::Items { items, index: 0 })))
                }
                _ => {
                    let shown = value.type_of(&self.ctx.heap);
                    return Err(RunError::type_error(format!("{shown} is not iterable")));
                }
            },
            Value::String(sid) => {
                let chars: Vec<String> = self.ctx.interns.get(sid).chars().map(|c| c.to_string()).collect();
                let items = chars
                    .iter()
                    .map(|c| Value::String(self.ctx.interns.intern(c)))
                    .collect();
                Value::Ref(self.ctx.heap.alloc(HeapData::Iter(IterState::Items { items, index: 0 })))
            }
            other => {
                let shown = other.type_of(&self.ctx.heap);
                return Err(RunError::type_error(format!("{shown} is not iterable")));
            }
        };
        self.push(iterator);
        Ok(())
    }

    pub(crate) fn op_iterator_next(&mut self) -> RunResult<()> {
        let iterator = self.pop()?;
        let Value::Ref(id) = iterator else {
            return Err(RunError::internal("IteratorNext on a non-iterator"));
        };
        match self.ctx.heap.get(id) {
            HeapData::Iter(IterState::Indexed { target, index }) => {
                let (target, index) = (*target, *index);
                let element = match target {
                    Value::Ref(array_id) => match self.ctx.heap.get(array_id) {
                        HeapData::Array(arr) => arr.elements.get(index as usize).copied(),
                        _ => None,
                    },
                    _ => None,
                };
                match element {
                    Some(value) => {
                        if let HeapData::Iter(IterState::Indexed { index, .. }) = self.ctx.heap.get_mut(id) {
                            *index += 1;
                        }
                        self.push(value);
                        self.push(Value::Bool(false));
                    }
                    None => {
                        self.push(Value::Undefined);
                        self.push(Value::Bool(true));
                    }
                }
                Ok(())
            }
            HeapData::Iter(IterState::Items { items, index }) => {
                let item = items.get(*index as usize).copied();
                match item {
                    Some(value) => {
                        if let HeapData::Iter(IterState::Items { index, .. }) = self.ctx.heap.get_mut(id) {
                            *index += 1;
                        }
                        self.push(value);
                        self.push(Value::Bool(false));
                    }
                    None => {
                        self.push(Value::Undefined);
                        self.push(Value::Bool(true));
                    }
                }
                Ok(())
            }
            HeapData::Generator(_) => {
                // Driving a generator with for-of resumes it; the frame's
                // yield/return pushes the (value, done) pair.
                self.resume_generator(iterator, crate::vm::call::Resume::Next(Value::Undefined), true)
            }
            _ => Err(RunError::internal("IteratorNext on a non-iterator")),
        }
    }

    pub(crate) fn op_enum_keys(&mut self) -> RunResult<()> {
        let object = self.pop()?;
        let mut keys: Vec<Value> = Vec::new();
        if let Value::Ref(id) = object {
            match self.ctx.heap.get(id) {
                HeapData::Array(array) => {
                    let len = array.elements.len();
                    let prop_keys: Vec<PropKey> = array.props.keys().copied().collect();
                    for index in 0..len {
                        let text = index.to_string();
                        keys.push(Value::String(self.ctx.interns.intern(&text)));
                    }
                    for key in prop_keys {
                        if let PropKey::Str(sid) = key {
                            keys.push(Value::String(sid));
                        }
                    }
                }
                HeapData::Object(obj) => {
                    let prop_keys: Vec<PropKey> = obj.props.keys().copied().collect();
                    for key in prop_keys {
                        if let PropKey::Str(sid) = key {
                            keys.push(Value::String(sid));
                        }
                    }
                }
                HeapData::Module(module) => {
                    let def = self.ctx.defs.module(module.def);
                    for &(name, _) in &def.export_vars {
                        keys.push(Value::String(name));
                    }
                }
                _ => {}
            }
        }
        let proto = self.ctx.class_protos[ClassId::ARRAY.0 as usize];
        let id = self.ctx.heap.alloc(HeapData::Array(ArrayObject::new(keys, proto)));
        self.push(Value::Ref(id));
        Ok(())
    }
}

fn slot_lookup(slot: Option<&PropSlot>) -> Lookup {
    match slot {
        Some(PropSlot::Data(value)) => Lookup::Value(*value),
        Some(PropSlot::Accessor { get, .. }) => {
            if matches!(get, Value::Undefined) {
                Lookup::Value(Value::Undefined)
            } else {
                Lookup::Getter(*get)
            }
        }
        None => Lookup::NotFound,
    }
}

/// ES ToInt32: modular reduction into the signed 32-bit range.
fn to_int32(num: Num) -> i32 {
    let f = match num {
        Num::Int(v) => return (v as u64 & 0xFFFF_FFFF) as u32 as i32,
        Num::Float(v) => v,
    };
    if !f.is_finite() || f == 0.0 {
        return 0;
    }
    let truncated = f.trunc();
    let modulus = 4_294_967_296.0;
    let mut remainder = truncated % modulus;
    if remainder < 0.0 {
        remainder += modulus;
    }
    let unsigned = remainder as u32;
    unsigned as i32
}

fn float_to_num(v: f64) -> Num {
    if v.fract() == 0.0 && v.abs() < 9e15 {
        Num::Int(v as i64)
    } else {
        Num::Float(v)
    }
}
