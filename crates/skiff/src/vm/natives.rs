//! Engine-implemented native functions: console, Math, JSON, Object/Array
//! statics, string and array methods, error constructors, and the
//! generator/promise protocol entries the interpreter dispatches inline.

use crate::{
    error::{JsErrorKind, RunError, RunResult},
    heap::HeapData,
    object::{ArrayObject, ClassId, JsObject, PropKey, PropSlot},
    runtime::Builtin,
    value::{Value, js_number_to_string, to_js_string},
    vm::{
        Vm,
        call::{NativeOutcome, Resume},
        ops::Num,
    },
};

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).copied().unwrap_or(Value::Undefined)
}

impl Vm<'_, '_> {
    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        this: Value,
        args: &[Value],
        construct: bool,
    ) -> RunResult<NativeOutcome> {
        // Error classes are the only constructible natives.
        if construct
            && !matches!(
                builtin,
                Builtin::ErrorCtor
                    | Builtin::TypeErrorCtor
                    | Builtin::RangeErrorCtor
                    | Builtin::ReferenceErrorCtor
                    | Builtin::SyntaxErrorCtor
            )
        {
            return Err(RunError::type_error("not a constructor"));
        }

        let value = match builtin {
            // --- globals ---
            Builtin::ConsoleLog => {
                let line = args
                    .iter()
                    .map(|v| to_js_string(*v, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.ctx.print.print(&line);
                Value::Undefined
            }
            Builtin::IsNaN => {
                let n = self.to_number(arg(args, 0))?.as_f64();
                Value::Bool(n.is_nan())
            }
            Builtin::IsFinite => {
                let n = self.to_number(arg(args, 0))?.as_f64();
                Value::Bool(n.is_finite())
            }
            Builtin::ParseInt => {
                let text = self.arg_string(args, 0);
                let radix = match arg(args, 1) {
                    Value::Int(r) if (2..=36).contains(&r) => u32::try_from(r).expect("radix range checked"),
                    _ => 10,
                };
                parse_int(&text, radix)
            }
            Builtin::ParseFloat => {
                let text = self.arg_string(args, 0);
                let trimmed = text.trim();
                // Longest numeric prefix, like the spec's parseFloat.
                let mut end = 0;
                for i in (1..=trimmed.len()).rev() {
                    if trimmed.is_char_boundary(i) && trimmed[..i].parse::<f64>().is_ok() {
                        end = i;
                        break;
                    }
                }
                if end == 0 {
                    Value::Float(f64::NAN)
                } else {
                    Value::Float(trimmed[..end].parse::<f64>().expect("prefix parsed above"))
                }
            }
            Builtin::StringCtor => {
                let s = to_js_string(arg(args, 0), &self.ctx.heap, &self.ctx.interns, &self.ctx.defs);
                self.alloc_string(s)
            }
            Builtin::NumberCtor => self.to_number(arg(args, 0))?.into_value(),
            Builtin::BooleanCtor => Value::Bool(arg(args, 0).is_truthy(&self.ctx.heap, &self.ctx.interns)),
            Builtin::SymbolCtor => Value::Symbol(self.ctx.next_symbol()),
            Builtin::GcRequest => {
                self.ctx.heap.request_major();
                Value::Undefined
            }

            // --- error constructors ---
            Builtin::ErrorCtor => self.make_error(JsErrorKind::Error, args),
            Builtin::TypeErrorCtor => self.make_error(JsErrorKind::TypeError, args),
            Builtin::RangeErrorCtor => self.make_error(JsErrorKind::RangeError, args),
            Builtin::ReferenceErrorCtor => self.make_error(JsErrorKind::ReferenceError, args),
            Builtin::SyntaxErrorCtor => self.make_error(JsErrorKind::SyntaxError, args),

            // --- Object ---
            Builtin::ObjectCtor => arg(args, 0),
            Builtin::ObjectKeys => self.object_keys(arg(args, 0), KeysKind::Keys)?,
            Builtin::ObjectValues => self.object_keys(arg(args, 0), KeysKind::Values)?,
            Builtin::ObjectEntries => self.object_keys(arg(args, 0), KeysKind::Entries)?,
            Builtin::ObjectFreeze => {
                let target = arg(args, 0);
                if let Value::Ref(id) = target
                    && let HeapData::Object(obj) = self.ctx.heap.get_mut(id)
                {
                    obj.frozen = true;
                }
                target
            }
            Builtin::ObjectAssign => {
                let target = arg(args, 0);
                let Value::Ref(target_id) = target else {
                    return Err(RunError::type_error("Object.assign target must be an object"));
                };
                for source in args.iter().skip(1) {
                    if let Value::Ref(source_id) = source {
                        let entries: Vec<(PropKey, PropSlot)> = match self.ctx.heap.get(*source_id) {
                            HeapData::Object(obj) => obj.props.iter().map(|(k, v)| (*k, *v)).collect(),
                            _ => Vec::new(),
                        };
                        for (key, slot) in entries {
                            if let PropSlot::Data(value) = slot {
                                let HeapData::Object(target_obj) = self.ctx.heap.get_mut(target_id) else {
                                    return Err(RunError::type_error("Object.assign target must be an object"));
                                };
                                target_obj.props.insert(key, PropSlot::Data(value));
                                self.ctx.heap.write_barrier(target_id, value);
                            }
                        }
                    }
                }
                target
            }
            Builtin::ObjectGetPrototypeOf => match arg(args, 0) {
                Value::Ref(id) => match self.ctx.heap.get(id) {
                    HeapData::Object(obj) => obj.proto,
                    HeapData::Array(array) => array.proto,
                    HeapData::Function(func) => func.proto,
                    _ => Value::Null,
                },
                _ => Value::Null,
            },
            Builtin::ObjToString => {
                let s = match this {
                    Value::Ref(id) if matches!(self.ctx.heap.get(id), HeapData::Array(_)) => {
                        to_js_string(this, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs)
                    }
                    Value::Ref(_) => "[object Object]".to_owned(),
                    other => to_js_string(other, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs),
                };
                self.alloc_string(s)
            }
            Builtin::ObjHasOwnProperty => {
                let key = self.value_to_prop_key(arg(args, 0))?;
                let found = match this {
                    Value::Ref(id) => match self.ctx.heap.get(id) {
                        HeapData::Object(obj) => obj.props.contains_key(&key),
                        HeapData::Array(array) => {
                            let by_index = key_index(&self.ctx.interns, key)
                                .is_some_and(|index| index < array.elements.len());
                            by_index || array.props.contains_key(&key)
                        }
                        HeapData::Function(func) => func.props.contains_key(&key),
                        _ => false,
                    },
                    _ => false,
                };
                Value::Bool(found)
            }
            Builtin::ObjValueOf => this,

            // --- Array ---
            Builtin::ArrayCtor => {
                let elements = args.to_vec();
                self.new_array(elements)
            }
            Builtin::ArrayIsArray => Value::Bool(matches!(
                arg(args, 0),
                Value::Ref(id) if matches!(self.ctx.heap.get(id), HeapData::Array(_))
            )),
            Builtin::ArrayPush => {
                let id = self.this_array(this)?;
                for value in args {
                    let HeapData::Array(array) = self.ctx.heap.get_mut(id) else {
                        unreachable!("this_array checked the flavour");
                    };
                    array.elements.push(*value);
                    self.ctx.heap.write_barrier(id, *value);
                }
                let HeapData::Array(array) = self.ctx.heap.get(id) else {
                    unreachable!("this_array checked the flavour");
                };
                Value::Int(i64::try_from(array.elements.len()).expect("array length fits i64"))
            }
            Builtin::ArrayPop => {
                let id = self.this_array(this)?;
                let HeapData::Array(array) = self.ctx.heap.get_mut(id) else {
                    unreachable!("this_array checked the flavour");
                };
                array.elements.pop().unwrap_or(Value::Undefined)
            }
            Builtin::ArrayShift => {
                let id = self.this_array(this)?;
                let HeapData::Array(array) = self.ctx.heap.get_mut(id) else {
                    unreachable!("this_array checked the flavour");
                };
                if array.elements.is_empty() {
                    Value::Undefined
                } else {
                    array.elements.remove(0)
                }
            }
            Builtin::ArrayUnshift => {
                let id = self.this_array(this)?;
                let HeapData::Array(array) = self.ctx.heap.get_mut(id) else {
                    unreachable!("this_array checked the flavour");
                };
                for (offset, value) in args.iter().enumerate() {
                    array.elements.insert(offset, *value);
                }
                let len = array.elements.len();
                for value in args {
                    self.ctx.heap.write_barrier(id, *value);
                }
                Value::Int(i64::try_from(len).expect("array length fits i64"))
            }
            Builtin::ArrayIndexOf => {
                let id = self.this_array(this)?;
                let needle = arg(args, 0);
                let elements = match self.ctx.heap.get(id) {
                    HeapData::Array(array) => array.elements.clone(),
                    _ => unreachable!("this_array checked the flavour"),
                };
                let mut found = -1i64;
                for (index, element) in elements.iter().enumerate() {
                    if element.strict_eq(needle, &self.ctx.heap, &self.ctx.interns) {
                        found = i64::try_from(index).expect("index fits i64");
                        break;
                    }
                }
                Value::Int(found)
            }
            Builtin::ArrayIncludes => {
                let id = self.this_array(this)?;
                let needle = arg(args, 0);
                let elements = match self.ctx.heap.get(id) {
                    HeapData::Array(array) => array.elements.clone(),
                    _ => unreachable!("this_array checked the flavour"),
                };
                let found = elements
                    .iter()
                    .any(|element| element.strict_eq(needle, &self.ctx.heap, &self.ctx.interns));
                Value::Bool(found)
            }
            Builtin::ArrayJoin => {
                let id = self.this_array(this)?;
                let separator = match arg(args, 0) {
                    Value::Undefined => ",".to_owned(),
                    other => to_js_string(other, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs),
                };
                let elements = match self.ctx.heap.get(id) {
                    HeapData::Array(array) => array.elements.clone(),
                    _ => unreachable!("this_array checked the flavour"),
                };
                let parts: Vec<String> = elements
                    .iter()
                    .map(|element| match element {
                        Value::Undefined | Value::Null => String::new(),
                        other => to_js_string(*other, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs),
                    })
                    .collect();
                self.alloc_string(parts.join(&separator))
            }
            Builtin::ArraySlice => {
                let id = self.this_array(this)?;
                let elements = match self.ctx.heap.get(id) {
                    HeapData::Array(array) => array.elements.clone(),
                    _ => unreachable!("this_array checked the flavour"),
                };
                let len = elements.len();
                let start = slice_bound(arg(args, 0), 0, len);
                let end = slice_bound(arg(args, 1), len, len);
                let slice = if start < end { elements[start..end].to_vec() } else { Vec::new() };
                self.new_array(slice)
            }
            Builtin::ArrayConcat => {
                let id = self.this_array(this)?;
                let mut elements = match self.ctx.heap.get(id) {
                    HeapData::Array(array) => array.elements.clone(),
                    _ => unreachable!("this_array checked the flavour"),
                };
                for value in args {
                    match value {
                        Value::Ref(other) if matches!(self.ctx.heap.get(*other), HeapData::Array(_)) => {
                            let HeapData::Array(array) = self.ctx.heap.get(*other) else {
                                unreachable!("checked above");
                            };
                            elements.extend(array.elements.iter().copied());
                        }
                        other => elements.push(*other),
                    }
                }
                self.new_array(elements)
            }

            // --- strings ---
            Builtin::StrCharAt
            | Builtin::StrCharCodeAt
            | Builtin::StrIndexOf
            | Builtin::StrIncludes
            | Builtin::StrSlice
            | Builtin::StrSubstring
            | Builtin::StrSplit
            | Builtin::StrToUpperCase
            | Builtin::StrToLowerCase
            | Builtin::StrTrim
            | Builtin::StrStartsWith
            | Builtin::StrEndsWith
            | Builtin::StrRepeat => self.string_builtin(builtin, this, args)?,

            // --- Math ---
            Builtin::MathFloor => Value::Float(self.to_number(arg(args, 0))?.as_f64().floor()),
            Builtin::MathCeil => Value::Float(self.to_number(arg(args, 0))?.as_f64().ceil()),
            Builtin::MathRound => {
                let n = self.to_number(arg(args, 0))?.as_f64();
                // JS rounds .5 toward +Infinity.
                Value::Float((n + 0.5).floor())
            }
            Builtin::MathAbs => match self.to_number(arg(args, 0))? {
                Num::Int(v) => Value::Int(v.abs()),
                Num::Float(v) => Value::Float(v.abs()),
            },
            Builtin::MathSqrt => Value::Float(self.to_number(arg(args, 0))?.as_f64().sqrt()),
            Builtin::MathMin | Builtin::MathMax => {
                let minimum = builtin == Builtin::MathMin;
                let mut best = if minimum { f64::INFINITY } else { f64::NEG_INFINITY };
                for value in args {
                    let n = self.to_number(*value)?.as_f64();
                    if n.is_nan() {
                        best = f64::NAN;
                        break;
                    }
                    if (minimum && n < best) || (!minimum && n > best) {
                        best = n;
                    }
                }
                float_result(best)
            }
            Builtin::MathPow => {
                let base = self.to_number(arg(args, 0))?.as_f64();
                let exponent = self.to_number(arg(args, 1))?.as_f64();
                Value::Float(base.powf(exponent))
            }
            Builtin::MathRandom => {
                // xorshift64*; seeded per context.
                let mut x = self.ctx.rng_state;
                x ^= x >> 12;
                x ^= x << 25;
                x ^= x >> 27;
                self.ctx.rng_state = x;
                let bits = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
                Value::Float(bits as f64 / (1u64 << 53) as f64)
            }

            // --- JSON ---
            Builtin::JsonParse => {
                let text = self.arg_string(args, 0);
                self.json_parse(&text)?
            }
            Builtin::JsonStringify => {
                let rendered = self.json_stringify(arg(args, 0), 0)?;
                match rendered {
                    Some(text) => self.alloc_string(text),
                    None => Value::Undefined,
                }
            }

            // --- generator protocol ---
            Builtin::GeneratorNext => {
                self.resume_generator(this, Resume::Next(arg(args, 0)), false)?;
                return Ok(NativeOutcome::Handled);
            }
            Builtin::GeneratorReturn => {
                self.resume_generator(this, Resume::Return(arg(args, 0)), false)?;
                return Ok(NativeOutcome::Handled);
            }
            Builtin::GeneratorThrow => {
                self.resume_generator(this, Resume::Throw(arg(args, 0)), false)?;
                return Ok(NativeOutcome::Handled);
            }

            // --- promises ---
            Builtin::PromiseResolve => {
                let value = arg(args, 0);
                if matches!(value, Value::Ref(id) if matches!(self.ctx.heap.get(id), HeapData::Promise(_))) {
                    value
                } else {
                    self.new_settled_promise(value, false)
                }
            }
            Builtin::PromiseReject => self.new_settled_promise(arg(args, 0), true),
            Builtin::PromiseThen => self.promise_then(this, arg(args, 0), arg(args, 1))?,
            Builtin::PromiseCatch => self.promise_then(this, Value::Undefined, arg(args, 0))?,
        };
        Ok(NativeOutcome::Value(value))
    }

    fn arg_string(&self, args: &[Value], index: usize) -> String {
        to_js_string(arg(args, index), &self.ctx.heap, &self.ctx.interns, &self.ctx.defs)
    }

    fn make_error(&mut self, kind: JsErrorKind, args: &[Value]) -> Value {
        let message = match arg(args, 0) {
            Value::Undefined => String::new(),
            other => to_js_string(other, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs),
        };
        self.new_error_object(kind, &message, "")
    }

    fn this_array(&self, this: Value) -> RunResult<crate::heap::HeapId> {
        if let Value::Ref(id) = this
            && matches!(self.ctx.heap.get(id), HeapData::Array(_))
        {
            return Ok(id);
        }
        Err(RunError::type_error("receiver is not an array"))
    }

    pub(crate) fn new_array(&mut self, elements: Vec<Value>) -> Value {
        let proto = self.ctx.class_protos[ClassId::ARRAY.0 as usize];
        Value::Ref(self.ctx.heap.alloc(HeapData::Array(ArrayObject::new(elements, proto))))
    }

    fn object_keys(&mut self, target: Value, kind: KeysKind) -> RunResult<Value> {
        let mut out: Vec<Value> = Vec::new();
        if let Value::Ref(id) = target {
            let entries: Vec<(PropKey, PropSlot)> = match self.ctx.heap.get(id) {
                HeapData::Object(obj) => obj.props.iter().map(|(k, v)| (*k, *v)).collect(),
                HeapData::Array(array) => {
                    let len = array.elements.len();
                    let elements = array.elements.clone();
                    let mut entries = Vec::with_capacity(len);
                    for (index, element) in elements.iter().enumerate().take(len) {
                        let key = self.ctx.interns.intern(&index.to_string());
                        entries.push((PropKey::Str(key), PropSlot::Data(*element)));
                    }
                    entries
                }
                _ => Vec::new(),
            };
            for (key, slot) in entries {
                let PropKey::Str(name) = key else { continue };
                let value = match slot {
                    PropSlot::Data(v) => v,
                    PropSlot::Accessor { .. } => Value::Undefined,
                };
                match kind {
                    KeysKind::Keys => out.push(Value::String(name)),
                    KeysKind::Values => out.push(value),
                    KeysKind::Entries => {
                        let pair = self.new_array(vec![Value::String(name), value]);
                        out.push(pair);
                    }
                }
            }
        }
        Ok(self.new_array(out))
    }

    fn string_builtin(&mut self, builtin: Builtin, this: Value, args: &[Value]) -> RunResult<Value> {
        let Some(text) = this.as_str(&self.ctx.heap, &self.ctx.interns) else {
            return Err(RunError::type_error("receiver is not a string"));
        };
        let text = text.to_owned();
        let chars: Vec<char> = text.chars().collect();
        let value = match builtin {
            Builtin::StrCharAt => {
                let index = self.to_number(arg(args, 0))?.as_f64();
                let index = if index.is_finite() && index >= 0.0 { index as usize } else { usize::MAX };
                match chars.get(index) {
                    Some(c) => {
                        let buf = c.to_string();
                        Value::String(self.ctx.interns.intern(&buf))
                    }
                    None => Value::String(self.ctx.interns.intern("")),
                }
            }
            Builtin::StrCharCodeAt => {
                let index = self.to_number(arg(args, 0))?.as_f64();
                let index = if index.is_finite() && index >= 0.0 { index as usize } else { usize::MAX };
                match chars.get(index) {
                    Some(c) => Value::Int(i64::from(u32::from(*c))),
                    None => Value::Float(f64::NAN),
                }
            }
            Builtin::StrIndexOf => {
                let needle = self.arg_string(args, 0);
                match text.find(&needle) {
                    Some(byte_pos) => {
                        let char_pos = text[..byte_pos].chars().count();
                        Value::Int(i64::try_from(char_pos).expect("index fits i64"))
                    }
                    None => Value::Int(-1),
                }
            }
            Builtin::StrIncludes => {
                let needle = self.arg_string(args, 0);
                Value::Bool(text.contains(&needle))
            }
            Builtin::StrSlice => {
                let len = chars.len();
                let start = signed_slice_bound(arg(args, 0), 0, len, self)?;
                let end = signed_slice_bound(arg(args, 1), len, len, self)?;
                let out: String = if start < end {
                    chars[start..end].iter().collect()
                } else {
                    String::new()
                };
                self.alloc_string(out)
            }
            Builtin::StrSubstring => {
                let len = chars.len();
                let mut start = slice_bound(arg(args, 0), 0, len);
                let mut end = slice_bound(arg(args, 1), len, len);
                if start > end {
                    std::mem::swap(&mut start, &mut end);
                }
                let out: String = chars[start..end].iter().collect();
                self.alloc_string(out)
            }
            Builtin::StrSplit => {
                let parts: Vec<Value> = match arg(args, 0) {
                    Value::Undefined => {
                        let whole = self.alloc_string(text.clone());
                        vec![whole]
                    }
                    separator => {
                        let sep = to_js_string(separator, &self.ctx.heap, &self.ctx.interns, &self.ctx.defs);
                        let pieces: Vec<String> = if sep.is_empty() {
                            chars.iter().map(ToString::to_string).collect()
                        } else {
                            text.split(&sep).map(ToOwned::to_owned).collect()
                        };
                        pieces.into_iter().map(|piece| self.alloc_string(piece)).collect()
                    }
                };
                self.new_array(parts)
            }
            Builtin::StrToUpperCase => self.alloc_string(text.to_uppercase()),
            Builtin::StrToLowerCase => self.alloc_string(text.to_lowercase()),
            Builtin::StrTrim => self.alloc_string(text.trim().to_owned()),
            Builtin::StrStartsWith => {
                let needle = self.arg_string(args, 0);
                Value::Bool(text.starts_with(&needle))
            }
            Builtin::StrEndsWith => {
                let needle = self.arg_string(args, 0);
                Value::Bool(text.ends_with(&needle))
            }
            Builtin::StrRepeat => {
                let count = self.to_number(arg(args, 0))?.as_f64();
                if !count.is_finite() || count < 0.0 {
                    return Err(RunError::range_error("Invalid count value"));
                }
                self.alloc_string(text.repeat(count as usize))
            }
            _ => unreachable!("non-string builtin routed to string_builtin"),
        };
        Ok(value)
    }

    fn promise_then(&mut self, this: Value, on_fulfilled: Value, on_rejected: Value) -> RunResult<Value> {
        let Value::Ref(id) = this else {
            return Err(RunError::type_error("then called on a non-promise"));
        };
        if !matches!(self.ctx.heap.get(id), HeapData::Promise(_)) {
            return Err(RunError::type_error("then called on a non-promise"));
        }
        let proto = self.ctx.class_protos[ClassId::PROMISE.0 as usize];
        let derived = Value::Ref(
            self.ctx
                .heap
                .alloc(HeapData::Promise(crate::object::PromiseObject::pending(proto))),
        );

        let state = {
            let HeapData::Promise(p) = self.ctx.heap.get(id) else {
                unreachable!("checked above");
            };
            (p.state, p.result)
        };
        match state {
            (crate::object::PromiseState::Pending, _) => {
                let HeapData::Promise(p) = self.ctx.heap.get_mut(id) else {
                    unreachable!("checked above");
                };
                p.reactions.push(crate::object::Reaction::Then {
                    on_fulfilled,
                    on_rejected,
                    derived,
                });
                self.ctx.heap.write_barrier(id, derived);
                self.ctx.heap.write_barrier(id, on_fulfilled);
                self.ctx.heap.write_barrier(id, on_rejected);
            }
            (crate::object::PromiseState::Fulfilled, result) => {
                self.ctx.microtasks.push_back(crate::context::Microtask::Reaction {
                    reaction: crate::object::Reaction::Then {
                        on_fulfilled,
                        on_rejected,
                        derived,
                    },
                    value: result,
                    rejected: false,
                });
            }
            (crate::object::PromiseState::Rejected, result) => {
                self.ctx.microtasks.push_back(crate::context::Microtask::Reaction {
                    reaction: crate::object::Reaction::Then {
                        on_fulfilled,
                        on_rejected,
                        derived,
                    },
                    value: result,
                    rejected: true,
                });
            }
        }
        Ok(derived)
    }

    // --- JSON ---

    fn json_parse(&mut self, text: &str) -> RunResult<Value> {
        let mut parser = JsonParser {
            bytes: text.as_bytes(),
            pos: 0,
        };
        parser.skip_ws();
        let value = parser.parse_value(self)?;
        parser.skip_ws();
        if parser.pos != parser.bytes.len() {
            return Err(RunError::syntax_error("Unexpected token in JSON"));
        }
        Ok(value)
    }

    fn json_stringify(&mut self, value: Value, depth: usize) -> RunResult<Option<String>> {
        if depth > 64 {
            return Err(RunError::range_error("JSON structure too deep"));
        }
        let rendered = match value {
            Value::Undefined | Value::Hole | Value::FunctionDef(_) | Value::Native(_) | Value::Symbol(_) => None,
            Value::Null => Some("null".to_owned()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(if v.is_finite() {
                js_number_to_string(v)
            } else {
                "null".to_owned()
            }),
            Value::String(id) => Some(json_quote(self.ctx.interns.get(id))),
            Value::BigInt(_) => {
                return Err(RunError::type_error("Do not know how to serialize a BigInt"));
            }
            Value::Ref(id) => match self.ctx.heap.get(id) {
                HeapData::Str(s) => Some(json_quote(s)),
                HeapData::Array(array) => {
                    let elements = array.elements.clone();
                    let mut parts = Vec::with_capacity(elements.len());
                    for element in elements {
                        let part = self.json_stringify(element, depth + 1)?.unwrap_or_else(|| "null".to_owned());
                        parts.push(part);
                    }
                    Some(format!("[{}]", parts.join(",")))
                }
                HeapData::Object(obj) => {
                    let entries: Vec<(PropKey, PropSlot)> = obj.props.iter().map(|(k, v)| (*k, *v)).collect();
                    let mut parts = Vec::new();
                    for (key, slot) in entries {
                        let PropKey::Str(name) = key else { continue };
                        let PropSlot::Data(field) = slot else { continue };
                        if let Some(rendered) = self.json_stringify(field, depth + 1)? {
                            let quoted = json_quote(self.ctx.interns.get(name));
                            parts.push(format!("{quoted}:{rendered}"));
                        }
                    }
                    Some(format!("{{{}}}", parts.join(",")))
                }
                HeapData::Function(_) => None,
                _ => Some("null".to_owned()),
            },
        };
        Ok(rendered)
    }
}

#[derive(Debug, Clone, Copy)]
enum KeysKind {
    Keys,
    Values,
    Entries,
}

fn float_result(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 9e15 && v.is_finite() {
        Value::Int(v as i64)
    } else {
        Value::Float(v)
    }
}

fn parse_int(text: &str, radix: u32) -> Value {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = if radix == 16 {
        digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits)
    } else {
        digits
    };
    let mut value: i64 = 0;
    let mut seen = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        seen = true;
        value = value.saturating_mul(i64::from(radix)).saturating_add(i64::from(d));
    }
    if !seen {
        return Value::Float(f64::NAN);
    }
    Value::Int(if negative { -value } else { value })
}

/// Clamps an unsigned slice bound argument; `Undefined` takes the default.
fn slice_bound(value: Value, default: usize, len: usize) -> usize {
    match value {
        Value::Int(v) if v >= 0 => (v as usize).min(len),
        Value::Int(_) => 0,
        Value::Float(v) if v >= 0.0 => (v as usize).min(len),
        Value::Float(_) => 0,
        _ => default,
    }
}

/// Slice bound supporting negative (from-the-end) indices.
fn signed_slice_bound(value: Value, default: usize, len: usize, vm: &Vm<'_, '_>) -> RunResult<usize> {
    match value {
        Value::Undefined => Ok(default),
        other => {
            let n = vm.to_number(other)?.as_f64();
            if n.is_nan() {
                return Ok(0);
            }
            if n < 0.0 {
                let from_end = len as f64 + n;
                Ok(if from_end < 0.0 { 0 } else { from_end as usize })
            } else {
                Ok((n as usize).min(len))
            }
        }
    }
}

fn json_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Minimal recursive-descent JSON parser building engine values.
struct JsonParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl JsonParser<'_> {
    fn skip_ws(&mut self) {
        while let Some(&b) = self.bytes.get(self.pos) {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn parse_value(&mut self, vm: &mut Vm<'_, '_>) -> RunResult<Value> {
        self.skip_ws();
        match self.bytes.get(self.pos) {
            Some(b'{') => self.parse_object(vm),
            Some(b'[') => self.parse_array(vm),
            Some(b'"') => {
                let text = self.parse_string()?;
                Ok(vm.alloc_string(text))
            }
            Some(b't') => self.parse_keyword("true", Value::Bool(true)),
            Some(b'f') => self.parse_keyword("false", Value::Bool(false)),
            Some(b'n') => self.parse_keyword("null", Value::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            _ => Err(RunError::syntax_error("Unexpected token in JSON")),
        }
    }

    fn parse_keyword(&mut self, keyword: &str, value: Value) -> RunResult<Value> {
        if self.bytes[self.pos..].starts_with(keyword.as_bytes()) {
            self.pos += keyword.len();
            Ok(value)
        } else {
            Err(RunError::syntax_error("Unexpected token in JSON"))
        }
    }

    fn parse_number(&mut self) -> RunResult<Value> {
        let start = self.pos;
        if self.bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| RunError::syntax_error("Invalid number in JSON"))?;
        if let Ok(int) = text.parse::<i64>() {
            return Ok(Value::Int(int));
        }
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RunError::syntax_error("Invalid number in JSON"))
    }

    fn parse_string(&mut self) -> RunResult<String> {
        // Opening quote.
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(RunError::syntax_error("Unterminated string in JSON")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.bytes.get(self.pos) {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'/') => out.push('/'),
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'b') => out.push('\u{0008}'),
                        Some(b'f') => out.push('\u{000C}'),
                        Some(b'u') => {
                            let hex = self
                                .bytes
                                .get(self.pos + 1..self.pos + 5)
                                .ok_or_else(|| RunError::syntax_error("Invalid escape in JSON"))?;
                            let hex = std::str::from_utf8(hex)
                                .map_err(|_| RunError::syntax_error("Invalid escape in JSON"))?;
                            let code = u32::from_str_radix(hex, 16)
                                .map_err(|_| RunError::syntax_error("Invalid escape in JSON"))?;
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                            self.pos += 4;
                        }
                        _ => return Err(RunError::syntax_error("Invalid escape in JSON")),
                    }
                    self.pos += 1;
                }
                Some(_) => {
                    // Consume one UTF-8 character.
                    let rest = std::str::from_utf8(&self.bytes[self.pos..])
                        .map_err(|_| RunError::syntax_error("Invalid UTF-8 in JSON"))?;
                    let c = rest.chars().next().expect("non-empty checked above");
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn parse_array(&mut self, vm: &mut Vm<'_, '_>) -> RunResult<Value> {
        self.pos += 1;
        let mut elements = Vec::new();
        self.skip_ws();
        if self.bytes.get(self.pos) == Some(&b']') {
            self.pos += 1;
            return Ok(vm.new_array(elements));
        }
        loop {
            let value = self.parse_value(vm)?;
            elements.push(value);
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(vm.new_array(elements));
                }
                _ => return Err(RunError::syntax_error("Expected ',' or ']' in JSON")),
            }
        }
    }

    fn parse_object(&mut self, vm: &mut Vm<'_, '_>) -> RunResult<Value> {
        self.pos += 1;
        let object_proto = vm.ctx.class_protos[ClassId::OBJECT.0 as usize];
        let mut obj = JsObject::new(ClassId::OBJECT, object_proto);
        self.skip_ws();
        if self.bytes.get(self.pos) == Some(&b'}') {
            self.pos += 1;
            return Ok(Value::Ref(vm.ctx.heap.alloc(HeapData::Object(obj))));
        }
        loop {
            self.skip_ws();
            if self.bytes.get(self.pos) != Some(&b'"') {
                return Err(RunError::syntax_error("Expected string key in JSON"));
            }
            let key_text = self.parse_string()?;
            let key = PropKey::Str(vm.ctx.interns.intern(&key_text));
            self.skip_ws();
            if self.bytes.get(self.pos) != Some(&b':') {
                return Err(RunError::syntax_error("Expected ':' in JSON"));
            }
            self.pos += 1;
            let value = self.parse_value(vm)?;
            obj.props.insert(key, PropSlot::Data(value));
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Ref(vm.ctx.heap.alloc(HeapData::Object(obj))));
                }
                _ => return Err(RunError::syntax_error("Expected ',' or '}' in JSON")),
            }
        }
    }
}

fn key_index(interns: &crate::intern::Interns, key: PropKey) -> Option<usize> {
    let PropKey::Str(id) = key else { return None };
    interns.get(id).parse::<usize>().ok()
}
