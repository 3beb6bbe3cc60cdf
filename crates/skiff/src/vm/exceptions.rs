//! Exception handling: the throw-time exception-table walk, frame
//! unwinding with stack-trace capture, and the finally-chaining machinery
//! behind `FinallyGoto` / `FinallyReturn`.

use crate::{
    bytecode::ExceptionEntry,
    error::{JsErrorKind, RunError, TraceFrame},
    heap::HeapData,
    intern::{StaticStrings, StringId},
    object::{ClassId, GeneratorState, JsObject, PropKey, PropSlot},
    value::Value,
    vm::{PendingControl, ReturnMode, Vm},
};

/// Where a raised error transfers to within one frame.
enum Transfer {
    Catch(ExceptionEntry),
    Finally(ExceptionEntry),
    Unwind,
}

impl Vm<'_, '_> {
    /// Walks the exception tables from the current frame outward.
    ///
    /// Returns `None` when the error was caught (control has been
    /// transferred), or `Some(err)` when it escaped every frame and must be
    /// reported to the embedder. Internal errors and interrupts are never
    /// catchable by JS handlers.
    pub(crate) fn handle_error(&mut self, mut err: RunError) -> Option<RunError> {
        if matches!(err, RunError::Internal(_) | RunError::Interrupted) {
            return Some(err);
        }
        self.ctx.tracer.on_throw();

        loop {
            if self.ctx.frames.is_empty() {
                return Some(err);
            }
            let pc = u32::try_from(self.frame().ip).expect("pc exceeds u32");
            let transfer = self.find_transfer(pc);
            match transfer {
                Transfer::Catch(entry) => {
                    let frame = self.frame_mut();
                    frame.finally_chain = None;
                    frame.pending = None;
                    let floor = self.operand_floor();
                    self.ctx.stack.truncate(floor);
                    if let Some(slot) = entry.catch_slot {
                        let value = self.error_value(err);
                        if let Err(store_err) = self.write_slot(slot, value) {
                            return Some(store_err);
                        }
                    }
                    self.frame_mut().ip = entry.catch_start.expect("catch transfer has a catch region") as usize;
                    return None;
                }
                Transfer::Finally(entry) => {
                    let start = entry.finally_start.expect("finally transfer has a finally region");
                    let end = entry.finally_end.expect("finally transfer has a finally region");
                    let floor = self.operand_floor();
                    self.ctx.stack.truncate(floor);
                    let frame = self.frame_mut();
                    frame.finally_chain = Some((start, end));
                    frame.pending = Some(PendingControl::Throw(err));
                    frame.ip = start as usize;
                    return None;
                }
                Transfer::Unwind => {
                    let trace = self.current_trace_frame();
                    err.push_frame(trace);
                    let frame = self.ctx.frames.pop().expect("frame present during unwind");
                    self.ctx.stack.truncate(frame.stack_base);
                    self.ctx.tracer.on_return(self.ctx.frames.len());

                    match frame.return_mode {
                        ReturnMode::Async { r#gen } => {
                            // An uncaught error in an async body rejects its
                            // promise instead of propagating.
                            let reason = self.error_value(err);
                            if let Value::Ref(gid) = r#gen
                                && let HeapData::Generator(g) = self.ctx.heap.get_mut(gid)
                            {
                                g.state = GeneratorState::Closed;
                            }
                            let promise = match self.generator_promise_value(r#gen) {
                                Some(p) => p,
                                None => return Some(RunError::internal("async frame without a promise")),
                            };
                            if let Err(settle_err) = self.settle_promise(promise, reason, true) {
                                return Some(settle_err);
                            }
                            self.push(promise);
                            return None;
                        }
                        ReturnMode::Generator { r#gen, .. } => {
                            if let Value::Ref(gid) = r#gen
                                && let HeapData::Generator(g) = self.ctx.heap.get_mut(gid)
                            {
                                g.state = GeneratorState::Closed;
                            }
                        }
                        ReturnMode::Module { .. } | ReturnMode::Ctor { .. } | ReturnMode::Normal => {}
                    }
                    // Continue searching in the caller.
                }
            }
        }
    }

    fn generator_promise_value(&self, r#gen: Value) -> Option<Value> {
        if let Value::Ref(id) = r#gen
            && let HeapData::Generator(g) = self.ctx.heap.get(id)
        {
            return Some(g.promise);
        }
        None
    }

    /// Chooses the handler for an error raised at `pc` in the current
    /// frame: a covering catch, a covering finally (including finallys
    /// guarding a faulting catch body), or unwind.
    fn find_transfer(&self, pc: u32) -> Transfer {
        let def = &self.ctx.defs.funcs[self.frame().func.0 as usize];
        for entry in &def.exception_table {
            if entry.covers(pc) {
                if entry.catch_start.is_some() {
                    return Transfer::Catch(*entry);
                }
                if entry.finally_start.is_some() {
                    return Transfer::Finally(*entry);
                }
            }
            if entry.in_catch(pc) && entry.finally_start.is_some() {
                return Transfer::Finally(*entry);
            }
        }
        Transfer::Unwind
    }

    /// Builds the trace frame for the current execution point.
    pub(crate) fn current_trace_frame(&self) -> TraceFrame {
        let frame = self.frame();
        let def = &self.ctx.defs.funcs[frame.func.0 as usize];
        let module = self.ctx.defs.module(def.module);
        let function = if def.flags.is_module {
            "<module>".to_owned()
        } else {
            let name = self.ctx.interns.get(def.name);
            if name.is_empty() { "<anonymous>".to_owned() } else { name.to_owned() }
        };
        let pc = u32::try_from(frame.ip.saturating_sub(1)).unwrap_or(u32::MAX);
        let (line, column) = match def.span_at(pc) {
            Some(span) => module.line_table.line_col(&module.source, span.start),
            None => (0, 0),
        };
        TraceFrame {
            function,
            module: self.ctx.interns.get(module.name).to_owned(),
            line,
            column,
        }
    }

    /// Materialises an error as a JS value: engine-raised errors become
    /// Error objects with `name`/`message`/`stack`; thrown values pass
    /// through unchanged.
    pub(crate) fn error_value(&mut self, err: RunError) -> Value {
        match err {
            RunError::Throw(value, _) => value,
            RunError::Exc(exc) => {
                let stack_text = exc
                    .frames
                    .iter()
                    .map(|frame| format!("    at {frame}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.new_error_object(exc.kind, &exc.message, &stack_text)
            }
            RunError::Internal(message) => {
                // Should be unreachable: internal errors are uncatchable.
                self.new_error_object(JsErrorKind::Error, &message, "")
            }
            RunError::Interrupted => self.new_error_object(JsErrorKind::Error, "interrupted", ""),
        }
    }

    pub(crate) fn new_error_object(&mut self, kind: JsErrorKind, message: &str, stack: &str) -> Value {
        let proto = self.ctx.class_protos[ClassId::ERROR.0 as usize];
        let mut obj = JsObject::new(ClassId::ERROR, proto);
        let name_id: StringId = match kind {
            JsErrorKind::SyntaxError => StaticStrings::SyntaxError.into(),
            JsErrorKind::ReferenceError => StaticStrings::ReferenceError.into(),
            JsErrorKind::TypeError => StaticStrings::TypeError.into(),
            JsErrorKind::RangeError => StaticStrings::RangeError.into(),
            JsErrorKind::Error => StaticStrings::Error.into(),
        };
        let message_value = {
            let interned = self.ctx.interns.intern(message);
            Value::String(interned)
        };
        let stack_value = {
            let interned = self.ctx.interns.intern(stack);
            Value::String(interned)
        };
        obj.props
            .insert(PropKey::Str(StaticStrings::Name.into()), PropSlot::Data(Value::String(name_id)));
        obj.props
            .insert(PropKey::Str(StaticStrings::Message.into()), PropSlot::Data(message_value));
        obj.props
            .insert(PropKey::Str(StaticStrings::Stack.into()), PropSlot::Data(stack_value));
        Value::Ref(self.ctx.heap.alloc(HeapData::Object(obj)))
    }

    // --- finally chaining ---

    /// `FinallyGoto`: run the innermost finally whose region the jump
    /// leaves, parking the target; plain jump when none applies.
    pub(crate) fn op_finally_goto(&mut self, op_pc: u32, target: u32) -> crate::error::RunResult<()> {
        match self.applicable_finally(op_pc, Some(target)) {
            Some(entry) => {
                let start = entry.finally_start.expect("applicable entry has a finally");
                let end = entry.finally_end.expect("applicable entry has a finally");
                let floor = self.operand_floor();
                self.ctx.stack.truncate(floor);
                let frame = self.frame_mut();
                frame.finally_chain = Some((start, end));
                frame.pending = Some(PendingControl::Goto(target));
                frame.ip = start as usize;
            }
            None => {
                self.frame_mut().ip = target as usize;
            }
        }
        Ok(())
    }

    /// `FinallyReturn`: run enclosing finallys before returning `value`.
    pub(crate) fn op_finally_return(&mut self, op_pc: u32, value: Value) -> crate::error::RunResult<()> {
        match self.applicable_finally(op_pc, None) {
            Some(entry) => {
                let start = entry.finally_start.expect("applicable entry has a finally");
                let end = entry.finally_end.expect("applicable entry has a finally");
                let floor = self.operand_floor();
                self.ctx.stack.truncate(floor);
                let frame = self.frame_mut();
                frame.finally_chain = Some((start, end));
                frame.pending = Some(PendingControl::Return(value));
                frame.ip = start as usize;
                Ok(())
            }
            None => self.do_return(value),
        }
    }

    /// The innermost entry with a finally whose protected region contains
    /// `pc` and (for jumps) does not contain the target.
    fn applicable_finally(&self, pc: u32, target: Option<u32>) -> Option<ExceptionEntry> {
        let def = &self.ctx.defs.funcs[self.frame().func.0 as usize];
        for entry in &def.exception_table {
            if entry.finally_start.is_none() {
                continue;
            }
            if !(entry.covers(pc) || entry.in_catch(pc)) {
                continue;
            }
            if let Some(target) = target {
                let region_end = entry.finally_end.expect("entry has a finally");
                if entry.try_start <= target && target < region_end {
                    // The jump stays inside the protected statement; its
                    // finally does not run.
                    continue;
                }
            }
            return Some(*entry);
        }
        None
    }

    /// A finally region finished with a parked transfer: chain into the
    /// next applicable finally or commit the transfer.
    pub(crate) fn commit_finally(&mut self) -> crate::error::RunResult<()> {
        let frame = self.frame_mut();
        frame.finally_chain = None;
        let pending = frame
            .pending
            .take()
            .ok_or_else(|| RunError::internal("finally commit without a pending transfer"))?;
        let pc = u32::try_from(self.frame().ip).expect("pc exceeds u32");
        match pending {
            PendingControl::Goto(target) => self.op_finally_goto(pc, target),
            PendingControl::Return(value) => self.op_finally_return(pc, value),
            // Re-raising lets the normal walk find outer handlers (and
            // outer finallys).
            PendingControl::Throw(err) => Err(err),
        }
    }
}
