//! AST to bytecode compilation.
//!
//! The generator walks statements and expressions post-order, emitting into
//! the current function's [`CodeBuilder`]. Nested function literals are
//! compiled into their own builders depth-first; the parent then emits
//! `CLoadD` for constant functions or `Closure` when the child captured
//! variables (or an arrow used `this`). Scope resolution, capture-chain
//! construction, and break/continue repair are delegated to the
//! [`ScopeManager`] and [`JumpManager`].

pub mod jump;
pub mod scope;

use ahash::AHashMap;

use crate::{
    ast::{
        Argument, BinaryOp, ClassLiteral, ClassMember, ClassMemberKind, Expr, ExprKind, FunctionLiteral,
        ImportDeclaration, LogicalOp, MemberKey, ObjectProperty, PropertyKind, PropertyName, Span, Stat, StatKind,
        UnaryOp, UpdateOp, VarKind,
    },
    bytecode::{
        ClosureVarDef, CodeBuilder, ExceptionEntry, FunctionDef, FunctionDefId, FunctionFlags, JumpLabel, ModuleDef,
        ModuleId, Opcode,
    },
    context::{ConstPool, Definitions},
    error::SyntaxError,
    heap::Heap,
    intern::{Interns, StaticStrings, StringId},
    lexer::LineTable,
    parser::Parser,
    value::Value,
};

use self::{
    jump::JumpManager,
    scope::{ScopeKind, ScopeManager, VarInfo},
};

/// Result alias for code generation.
type GenResult<T> = Result<T, SyntaxError>;

/// Compiles one module from source, registering its definitions and
/// returning the new module id.
pub(crate) fn compile_module(
    name: &str,
    source: &str,
    interns: &mut Interns,
    pool: &mut ConstPool,
    defs: &mut Definitions,
    heap: &mut Heap,
) -> Result<ModuleId, SyntaxError> {
    let program = Parser::new(source).parse_program()?;
    let module_id = ModuleId(u32::try_from(defs.modules.len()).expect("module registry exceeds u32"));
    let name_id = interns.intern(name);

    let mut generator = CodeGenerator {
        interns,
        pool,
        defs,
        heap,
        funcs: Vec::new(),
        scopes: ScopeManager::new(),
        jumps: JumpManager::new(),
        module_id,
        exports: Vec::new(),
        pending_label: None,
        completion_slot: None,
        const_slots: Vec::new(),
    };

    let main = generator.compile_program(name_id, &program.body)?;
    let exports = std::mem::take(&mut generator.exports);
    let const_slots = std::mem::take(&mut generator.const_slots);

    defs.modules.push(ModuleDef {
        name: name_id,
        source: source.to_owned(),
        line_table: LineTable::new(source),
        export_vars: exports,
        const_slots,
        main,
    });
    Ok(module_id)
}

/// One function being compiled; the stack mirrors lexical nesting.
struct FuncFrame {
    builder: CodeBuilder,
    name: StringId,
    param_count: u16,
    var_count: u16,
    var_names: Vec<StringId>,
    closure_vars: Vec<ClosureVarDef>,
    /// Captured names already wired at this level -> local child slot.
    captures: AHashMap<String, u16>,
    flags: FunctionFlags,
    /// `this` referenced in this body (drives arrow closure capture).
    uses_this: bool,
    /// Free list of hidden temporary slots.
    temp_pool: Vec<u16>,
}

impl FuncFrame {
    fn alloc_slot(&mut self, name: StringId) -> u16 {
        let slot = self.var_count;
        self.var_count = self.var_count.checked_add(1).expect("function exceeds 65535 locals");
        self.var_names.push(name);
        slot
    }
}

struct CodeGenerator<'a> {
    interns: &'a mut Interns,
    pool: &'a mut ConstPool,
    defs: &'a mut Definitions,
    /// BigInt interning only; no GC objects are created at compile time.
    heap: &'a mut Heap,
    funcs: Vec<FuncFrame>,
    scopes: ScopeManager,
    jumps: JumpManager,
    module_id: ModuleId,
    /// Exported name -> module top-level slot, collected during emission.
    exports: Vec<(StringId, u16)>,
    /// Label waiting to attach to the next loop/switch statement.
    pending_label: Option<String>,
    /// Module slot holding the value of the last top-level expression
    /// statement; the module body returns it as its completion value.
    completion_slot: Option<u16>,
    /// Top-level `const` slots (TDZ holes until initialised).
    const_slots: Vec<u16>,
}

impl CodeGenerator<'_> {
    // --- function frame plumbing ---

    fn compile_program(&mut self, name_id: StringId, body: &[Stat]) -> GenResult<FunctionDefId> {
        self.push_function(
            StaticStrings::Module.into(),
            &[],
            FunctionFlags {
                is_module: true,
                ..FunctionFlags::default()
            },
        );
        let _ = name_id;
        // The module body returns the value of its last top-level
        // expression statement (the completion value `eval` reports).
        let completion = self.frame().alloc_slot(StaticStrings::EmptyString.into());
        self.completion_slot = Some(completion);
        self.builder().emit(Opcode::Undefined);
        self.builder().emit_u16(Opcode::VarStore, completion);
        self.emit_statements(body)?;
        let builder = self.builder();
        builder.emit_u16(Opcode::VarLoad, completion);
        builder.emit(Opcode::Return);
        let (def_id, _) = self.pop_function();
        Ok(def_id)
    }

    fn push_function(&mut self, name: StringId, params: &[crate::ast::Param], flags: FunctionFlags) {
        let kind = if flags.is_arrow {
            ScopeKind::Arrow
        } else {
            ScopeKind::Function
        };
        self.funcs.push(FuncFrame {
            builder: CodeBuilder::new(),
            name,
            param_count: u16::try_from(params.len()).expect("too many parameters"),
            var_count: 0,
            var_names: Vec::new(),
            closure_vars: Vec::new(),
            captures: AHashMap::new(),
            flags,
            uses_this: false,
            temp_pool: Vec::new(),
        });
        let func_index = self.funcs.len() - 1;
        self.scopes.enter(func_index, kind);
        for param in params {
            let name_id = self.interns.intern(&param.name);
            let frame = self.funcs.last_mut().expect("function frame present");
            let slot = frame.alloc_slot(name_id);
            // Duplicate parameter names take the later slot, like sloppy JS.
            self.scopes.declare(&param.name, VarInfo { slot, is_const: false });
        }
    }

    /// Finalises the innermost function. Returns its id and whether the
    /// parent must emit `Closure` instead of `CLoadD`.
    fn pop_function(&mut self) -> (FunctionDefId, bool) {
        self.scopes.exit();
        let frame = self.funcs.pop().expect("function frame underflow");
        let needs_closure = !frame.closure_vars.is_empty() || (frame.flags.is_arrow && frame.uses_this);
        // An arrow that reads `this` needs the creating frame's `this`
        // captured, which also forces every enclosing arrow to capture it.
        if frame.flags.is_arrow
            && frame.uses_this
            && let Some(parent) = self.funcs.last_mut()
        {
            parent.uses_this = true;
        }
        let built = frame.builder.finish();
        let def = FunctionDef {
            name: frame.name,
            param_count: frame.param_count,
            var_count: frame.var_count,
            bytecode: built.bytecode,
            exception_table: built.exception_table,
            debug_table: built.debug_table,
            closure_vars: frame.closure_vars,
            var_names: frame.var_names,
            flags: frame.flags,
            module: self.module_id,
            max_stack: built.max_stack,
        };
        let id = self.defs.add_func(def);
        (id, needs_closure)
    }

    fn builder(&mut self) -> &mut CodeBuilder {
        &mut self.funcs.last_mut().expect("function frame present").builder
    }

    fn frame(&mut self) -> &mut FuncFrame {
        self.funcs.last_mut().expect("function frame present")
    }

    fn at_module_top_level(&self) -> bool {
        self.funcs.len() == 1
    }

    fn acquire_temp(&mut self) -> u16 {
        let frame = self.frame();
        frame
            .temp_pool
            .pop()
            .unwrap_or_else(|| frame.alloc_slot(StaticStrings::EmptyString.into()))
    }

    fn release_temp(&mut self, slot: u16) {
        self.frame().temp_pool.push(slot);
    }

    // --- variable resolution ---

    fn declare_var(&mut self, name: &str, is_const: bool, span: Span) -> GenResult<u16> {
        let name_id = self.interns.intern(name);
        let frame = self.frame();
        let slot = frame.alloc_slot(name_id);
        if !self.scopes.declare(name, VarInfo { slot, is_const }) {
            return Err(SyntaxError::new(
                format!("identifier '{name}' has already been declared"),
                span.start,
            ));
        }
        Ok(slot)
    }

    /// Resolves a name, building the capture chain through intermediate
    /// functions when the binding lives in an outer one.
    fn resolve_var(&mut self, name: &str) -> Option<VarInfo> {
        let resolved = self.scopes.find(name)?;
        let top = self.funcs.len() - 1;
        if resolved.func_index == top {
            return Some(resolved.info);
        }
        let name_id = self.interns.intern(name);
        let mut parent_slot = resolved.info.slot;
        for level in resolved.func_index + 1..=top {
            if let Some(&slot) = self.funcs[level].captures.get(name) {
                parent_slot = slot;
                continue;
            }
            let child_slot = self.funcs[level].alloc_slot(name_id);
            self.funcs[level].closure_vars.push(ClosureVarDef {
                child_slot,
                parent_slot,
            });
            self.funcs[level].captures.insert(name.to_owned(), child_slot);
            parent_slot = child_slot;
        }
        Some(VarInfo {
            slot: parent_slot,
            is_const: resolved.info.is_const,
        })
    }

    // --- constants ---

    fn emit_const(&mut self, value: Value) {
        let index = self.pool.find_or_insert(value);
        self.builder().emit_const_load(index);
    }

    fn emit_string_const(&mut self, s: &str) {
        let id = self.interns.intern(s);
        self.emit_const(Value::String(id));
    }

    fn emit_argc(&mut self, argc: usize) {
        self.emit_const(Value::Int(i64::try_from(argc).expect("argument count exceeds i64")));
    }

    // --- statements ---

    /// Emits a statement list with function declarations hoisted: their
    /// slots are allocated and their closures created before any other
    /// statement runs, so mutual recursion works.
    fn emit_statements(&mut self, stats: &[Stat]) -> GenResult<()> {
        let mut hoisted_slots: AHashMap<usize, u16> = AHashMap::new();
        for (index, stat) in stats.iter().enumerate() {
            if let StatKind::FunctionDecl { name, .. } = &stat.kind {
                let slot = self.declare_var(name, false, stat.span)?;
                hoisted_slots.insert(index, slot);
            }
        }
        for (index, stat) in stats.iter().enumerate() {
            if let StatKind::FunctionDecl {
                name,
                function,
                exported,
            } = &stat.kind
            {
                let slot = hoisted_slots[&index];
                self.builder().set_span(stat.span);
                self.emit_function(function)?;
                self.builder().emit_u16(Opcode::VarStore, slot);
                if *exported {
                    self.record_export(name, slot, stat.span)?;
                }
            }
        }
        for (index, stat) in stats.iter().enumerate() {
            if hoisted_slots.contains_key(&index) {
                continue;
            }
            self.emit_statement(stat)?;
        }
        Ok(())
    }

    fn record_export(&mut self, name: &str, slot: u16, span: Span) -> GenResult<()> {
        if !self.at_module_top_level() {
            return Err(SyntaxError::new("export is only allowed at module top level", span.start));
        }
        let name_id = self.interns.intern(name);
        self.exports.push((name_id, slot));
        Ok(())
    }

    fn emit_statement(&mut self, stat: &Stat) -> GenResult<()> {
        self.builder().set_span(stat.span);
        match &stat.kind {
            StatKind::Block(body) => {
                self.scopes.enter(self.funcs.len() - 1, ScopeKind::None);
                self.emit_statements(body)?;
                self.scopes.exit();
            }
            StatKind::Expression(expr) => {
                self.emit_expr(expr)?;
                // Top-level expression statements feed the module's
                // completion value.
                match self.completion_slot {
                    Some(slot) if self.at_module_top_level() => {
                        self.builder().emit_u16(Opcode::VarStore, slot);
                    }
                    _ => self.builder().emit(Opcode::Pop),
                }
            }
            StatKind::VarDecl {
                kind,
                declarations,
                exported,
            } => {
                for decl in declarations {
                    let slot = self.declare_var(&decl.name, *kind == VarKind::Const, decl.span)?;
                    if *kind == VarKind::Const && self.at_module_top_level() {
                        self.const_slots.push(slot);
                    }
                    match &decl.init {
                        Some(init) => self.emit_expr(init)?,
                        None => self.builder().emit(Opcode::Undefined),
                    }
                    self.builder().emit_u16(Opcode::VarStore, slot);
                    if *exported {
                        self.record_export(&decl.name, slot, decl.span)?;
                    }
                }
            }
            StatKind::FunctionDecl { .. } => {
                // Handled by hoisting in emit_statements.
            }
            StatKind::ClassDecl { name, class, exported } => {
                let slot = self.declare_var(name, false, stat.span)?;
                self.emit_class(class)?;
                self.builder().emit_u16(Opcode::VarStore, slot);
                if *exported {
                    self.record_export(name, slot, stat.span)?;
                }
            }
            StatKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.emit_expr(test)?;
                let jump_else = self.builder().emit_jump(Opcode::IfEq);
                self.scopes.enter(self.funcs.len() - 1, ScopeKind::If);
                self.emit_statement(consequent)?;
                self.scopes.exit();
                match alternate {
                    Some(alternate) => {
                        let jump_end = self.builder().emit_jump(Opcode::Goto);
                        self.builder().patch_jump(jump_else);
                        self.scopes.enter(self.funcs.len() - 1, ScopeKind::Else);
                        self.emit_statement(alternate)?;
                        self.scopes.exit();
                        self.builder().patch_jump(jump_end);
                    }
                    None => self.builder().patch_jump(jump_else),
                }
            }
            StatKind::Labeled { label, body } => {
                match &body.kind {
                    StatKind::While { .. }
                    | StatKind::DoWhile { .. }
                    | StatKind::For { .. }
                    | StatKind::ForIn { .. }
                    | StatKind::ForOf { .. }
                    | StatKind::Switch { .. } => {
                        self.pending_label = Some(label.clone());
                        self.emit_statement(body)?;
                    }
                    _ => {
                        // Labelled non-loop: break-only target.
                        self.jumps.enter(Some(label.clone()), false);
                        self.emit_statement(body)?;
                        let ctx = self.jumps.exit();
                        let end = self.builder().current_offset();
                        for jump in ctx.breaks {
                            self.builder().patch_jump_to(jump, end);
                        }
                    }
                }
            }
            StatKind::While { test, body } => self.emit_while(test, body)?,
            StatKind::DoWhile { body, test } => self.emit_do_while(body, test)?,
            StatKind::For {
                init,
                test,
                update,
                body,
            } => self.emit_for(init.as_deref(), test.as_ref(), update.as_ref(), body)?,
            StatKind::ForIn {
                decl_kind,
                binding,
                object,
                body,
            } => {
                self.emit_expr(object)?;
                self.builder().emit(Opcode::EnumKeys);
                self.emit_iteration_loop(decl_kind.is_some(), binding, body, stat.span)?;
            }
            StatKind::ForOf {
                decl_kind,
                binding,
                iterable,
                body,
            } => {
                self.emit_expr(iterable)?;
                self.emit_iteration_loop(decl_kind.is_some(), binding, body, stat.span)?;
            }
            StatKind::Switch { discriminant, cases } => self.emit_switch(discriminant, cases)?,
            StatKind::Continue { label } => {
                let op = if self
                    .scopes
                    .is_in_scope_kind(ScopeKind::FINALLY_KINDS, ScopeKind::LOOP_KINDS)
                {
                    Opcode::FinallyGoto
                } else {
                    Opcode::Goto
                };
                let jump = self.builder().emit_jump(op);
                if !self.jumps.add_continue(label.as_deref(), jump) {
                    return Err(SyntaxError::new("continue outside of a loop", stat.span.start));
                }
            }
            StatKind::Break { label } => {
                let op = if self
                    .scopes
                    .is_in_scope_kind(ScopeKind::FINALLY_KINDS, ScopeKind::LOOP_KINDS)
                {
                    Opcode::FinallyGoto
                } else {
                    Opcode::Goto
                };
                let jump = self.builder().emit_jump(op);
                if !self.jumps.add_break(label.as_deref(), jump) {
                    return Err(SyntaxError::new("break outside of a loop or switch", stat.span.start));
                }
            }
            StatKind::Return(value) => {
                match value {
                    Some(expr) => self.emit_expr(expr)?,
                    None => self.builder().emit(Opcode::Undefined),
                }
                let op = if self
                    .scopes
                    .is_in_scope_kind(ScopeKind::FINALLY_KINDS, ScopeKind::FUNCTION_KINDS)
                {
                    Opcode::FinallyReturn
                } else {
                    Opcode::Return
                };
                self.builder().emit(op);
            }
            StatKind::Try { block, catch, finally } => self.emit_try(block, catch.as_ref(), finally.as_deref())?,
            StatKind::Throw(expr) => {
                self.emit_expr(expr)?;
                self.builder().emit(Opcode::Throw);
            }
            StatKind::Import(decl) => self.emit_import(decl)?,
            StatKind::ExportNamed(specifiers) => {
                for spec in specifiers {
                    let Some(resolved) = self.scopes.find(&spec.local) else {
                        return Err(SyntaxError::new(
                            format!("exported binding '{}' is not declared", spec.local),
                            stat.span.start,
                        ));
                    };
                    if resolved.func_index != 0 || !self.at_module_top_level() {
                        return Err(SyntaxError::new(
                            "export is only allowed at module top level",
                            stat.span.start,
                        ));
                    }
                    let name_id = self.interns.intern(&spec.exported);
                    self.exports.push((name_id, resolved.info.slot));
                }
            }
            StatKind::ExportDefault(expr) => {
                if !self.at_module_top_level() {
                    return Err(SyntaxError::new("export is only allowed at module top level", stat.span.start));
                }
                let name_id: StringId = StaticStrings::Default.into();
                let slot = self.frame().alloc_slot(name_id);
                self.emit_expr(expr)?;
                self.builder().emit_u16(Opcode::VarStore, slot);
                self.exports.push((name_id, slot));
            }
            StatKind::TypeAlias { .. } | StatKind::Empty => {}
        }
        Ok(())
    }

    fn emit_while(&mut self, test: &Expr, body: &Stat) -> GenResult<()> {
        let label = self.pending_label.take();
        self.jumps.enter(label, true);
        let top = self.builder().current_offset();
        self.emit_expr(test)?;
        let jump_end = self.builder().emit_jump(Opcode::IfEq);
        self.scopes.enter(self.funcs.len() - 1, ScopeKind::While);
        self.emit_statement(body)?;
        self.scopes.exit();
        self.builder().emit_jump_to(Opcode::Goto, top);
        self.builder().patch_jump(jump_end);
        self.repair_loop(top);
        Ok(())
    }

    fn emit_do_while(&mut self, body: &Stat, test: &Expr) -> GenResult<()> {
        let label = self.pending_label.take();
        self.jumps.enter(label, true);
        let top = self.builder().current_offset();
        self.scopes.enter(self.funcs.len() - 1, ScopeKind::While);
        self.emit_statement(body)?;
        self.scopes.exit();
        let test_pc = self.builder().current_offset();
        self.emit_expr(test)?;
        self.builder().emit_jump_to(Opcode::IfTrue, top);
        self.repair_loop(test_pc);
        Ok(())
    }

    fn emit_for(
        &mut self,
        init: Option<&Stat>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stat,
    ) -> GenResult<()> {
        let label = self.pending_label.take();
        self.scopes.enter(self.funcs.len() - 1, ScopeKind::For);
        if let Some(init) = init {
            self.emit_statement(init)?;
        }
        self.jumps.enter(label, true);
        let top = self.builder().current_offset();
        let jump_end = match test {
            Some(test) => {
                self.emit_expr(test)?;
                Some(self.builder().emit_jump(Opcode::IfEq))
            }
            None => None,
        };
        self.emit_statement(body)?;
        // `continue` lands on the update clause.
        let update_pc = self.builder().current_offset();
        if let Some(update) = update {
            self.emit_expr(update)?;
            self.builder().emit(Opcode::Pop);
        }
        self.builder().emit_jump_to(Opcode::Goto, top);
        if let Some(jump_end) = jump_end {
            self.builder().patch_jump(jump_end);
        }
        self.repair_loop(update_pc);
        self.scopes.exit();
        Ok(())
    }

    /// Shared loop body for for-of and for-in; expects the iterable (or key
    /// array) already on the stack.
    fn emit_iteration_loop(&mut self, declares: bool, binding: &str, body: &Stat, span: Span) -> GenResult<()> {
        let label = self.pending_label.take();
        self.scopes.enter(self.funcs.len() - 1, ScopeKind::For);
        self.builder().emit(Opcode::GetIterator);
        let iter_slot = self.acquire_temp();
        self.builder().emit_u16(Opcode::VarStore, iter_slot);

        let binding_var = if declares {
            Some(self.declare_var(binding, false, span)?)
        } else {
            self.resolve_var(binding).map(|info| info.slot)
        };

        self.jumps.enter(label, true);
        let top = self.builder().current_offset();
        self.builder().emit_u16(Opcode::VarLoad, iter_slot);
        self.builder().emit(Opcode::IteratorNext);
        let jump_done = self.builder().emit_jump(Opcode::IfTrue);
        match binding_var {
            Some(slot) => self.builder().emit_u16(Opcode::VarStore, slot),
            None => {
                let name_id = self.interns.intern(binding);
                self.builder().emit_u32(Opcode::SetGlobal, name_id.raw());
            }
        }
        self.emit_statement(body)?;
        self.builder().emit_jump_to(Opcode::Goto, top);

        // Done path arrives with the final iterator value still pushed.
        let depth = self.builder().stack_depth();
        self.builder().patch_jump(jump_done);
        self.builder().set_stack_depth(depth + 1);
        self.builder().emit(Opcode::Pop);
        self.repair_loop(top);
        self.scopes.exit();
        self.release_temp(iter_slot);
        Ok(())
    }

    fn emit_switch(&mut self, discriminant: &Expr, cases: &[crate::ast::SwitchCase]) -> GenResult<()> {
        let label = self.pending_label.take();
        self.scopes.enter(self.funcs.len() - 1, ScopeKind::Switch);
        self.emit_expr(discriminant)?;
        let disc_slot = self.acquire_temp();
        self.builder().emit_u16(Opcode::VarStore, disc_slot);

        self.jumps.enter(label, false);
        let mut body_jumps: Vec<(usize, JumpLabel)> = Vec::new();
        let mut default_index = None;
        for (index, case) in cases.iter().enumerate() {
            match &case.test {
                Some(test) => {
                    self.builder().emit_u16(Opcode::VarLoad, disc_slot);
                    self.emit_expr(test)?;
                    self.builder().emit(Opcode::StrictEq);
                    let jump = self.builder().emit_jump(Opcode::IfTrue);
                    body_jumps.push((index, jump));
                }
                None => default_index = Some(index),
            }
        }
        let jump_no_match = self.builder().emit_jump(Opcode::Goto);

        let mut body_starts = vec![0usize; cases.len()];
        for (index, case) in cases.iter().enumerate() {
            body_starts[index] = self.builder().current_offset();
            self.builder().set_stack_depth(0);
            self.emit_statements(&case.body)?;
        }
        let end = self.builder().current_offset();

        for (index, jump) in body_jumps {
            self.builder().patch_jump_to(jump, body_starts[index]);
        }
        match default_index {
            Some(index) => self.builder().patch_jump_to(jump_no_match, body_starts[index]),
            None => self.builder().patch_jump_to(jump_no_match, end),
        }

        let ctx = self.jumps.exit();
        let end = self.builder().current_offset();
        for jump in ctx.breaks {
            self.builder().patch_jump_to(jump, end);
        }
        self.scopes.exit();
        self.release_temp(disc_slot);
        Ok(())
    }

    /// Pops the innermost jump context and patches breaks to the current
    /// offset and continues to `reloop`.
    fn repair_loop(&mut self, reloop: usize) {
        let ctx = self.jumps.exit();
        let end = self.builder().current_offset();
        for jump in ctx.breaks {
            self.builder().patch_jump_to(jump, end);
        }
        for jump in ctx.continues {
            self.builder().patch_jump_to(jump, reloop);
        }
    }

    fn emit_try(
        &mut self,
        block: &[Stat],
        catch: Option<&crate::ast::CatchClause>,
        finally: Option<&[Stat]>,
    ) -> GenResult<()> {
        let has_finally = finally.is_some();
        let try_kind = if has_finally {
            ScopeKind::TryFinally
        } else {
            ScopeKind::Try
        };

        let try_start = self.builder().current_pc();
        self.builder().emit(Opcode::TryBegin);
        self.scopes.enter(self.funcs.len() - 1, try_kind);
        self.emit_statements(block)?;
        self.scopes.exit();
        self.builder().emit(Opcode::TryEnd);
        let try_end = self.builder().current_pc();
        let jump_try_exit = self.builder().emit_jump(Opcode::Goto);

        let mut catch_range = None;
        let mut catch_slot = None;
        let mut jump_catch_exit = None;
        if let Some(clause) = catch {
            let catch_start = self.builder().current_pc();
            self.builder().set_stack_depth(0);
            let catch_kind = if has_finally {
                ScopeKind::CatchFinally
            } else {
                ScopeKind::Catch
            };
            self.scopes.enter(self.funcs.len() - 1, catch_kind);
            if let Some(param) = &clause.param {
                let slot = self.declare_var(param, false, Span::default())?;
                catch_slot = Some(slot);
            }
            self.emit_statements(&clause.body)?;
            self.scopes.exit();
            jump_catch_exit = Some(self.builder().emit_jump(Opcode::Goto));
            catch_range = Some((catch_start, self.builder().current_pc()));
        }

        let mut finally_range = None;
        if let Some(body) = finally {
            let finally_start = self.builder().current_pc();
            self.builder().set_stack_depth(0);
            self.scopes.enter(self.funcs.len() - 1, ScopeKind::Finally);
            self.emit_statements(body)?;
            self.scopes.exit();
            finally_range = Some((finally_start, self.builder().current_pc()));
        }

        // Normal exits route through the finally body when there is one.
        let exit_target = match finally_range {
            Some((start, _)) => start as usize,
            None => self.builder().current_offset(),
        };
        self.builder().patch_jump_to(jump_try_exit, exit_target);
        if let Some(jump) = jump_catch_exit {
            self.builder().patch_jump_to(jump, exit_target);
        }

        self.builder().add_exception_entry(ExceptionEntry {
            try_start,
            try_end,
            catch_start: catch_range.map(|(start, _)| start),
            catch_end: catch_range.map(|(_, end)| end),
            catch_slot,
            finally_start: finally_range.map(|(start, _)| start),
            finally_end: finally_range.map(|(_, end)| end),
        });
        Ok(())
    }

    fn emit_import(&mut self, decl: &ImportDeclaration) -> GenResult<()> {
        self.emit_string_const(&decl.specifier);
        self.builder().emit(Opcode::GetModule);

        if let Some(name) = &decl.default_binding {
            let slot = self.declare_var(name, true, decl.span)?;
            self.builder().emit(Opcode::Dup);
            let default_id: StringId = StaticStrings::Default.into();
            self.builder().emit_u32(Opcode::BindImport, default_id.raw());
            self.builder().emit_u16(Opcode::VarStore, slot);
        }
        if let Some(name) = &decl.namespace_binding {
            let slot = self.declare_var(name, true, decl.span)?;
            self.builder().emit(Opcode::Dup);
            self.builder().emit_u16(Opcode::VarStore, slot);
        }
        for spec in &decl.named {
            let slot = self.declare_var(&spec.local, true, decl.span)?;
            let name_id = self.interns.intern(&spec.imported);
            self.builder().emit(Opcode::Dup);
            self.builder().emit_u32(Opcode::BindImport, name_id.raw());
            self.builder().emit_u16(Opcode::VarStore, slot);
        }
        self.builder().emit(Opcode::Pop);
        Ok(())
    }

    // --- expressions ---

    fn emit_expr(&mut self, expr: &Expr) -> GenResult<()> {
        self.builder().set_span(expr.span);
        match &expr.kind {
            ExprKind::Undefined => self.builder().emit(Opcode::Undefined),
            ExprKind::Null => self.emit_const(Value::Null),
            ExprKind::Bool(v) => self.emit_const(Value::Bool(*v)),
            ExprKind::Int(v) => self.emit_const(Value::Int(*v)),
            ExprKind::Float(v) => self.emit_const(Value::Float(*v)),
            ExprKind::String(s) => {
                let id = self.interns.intern(s);
                self.emit_const(Value::String(id));
            }
            ExprKind::BigInt(v) => {
                let id = self.heap.intern_bigint(v.clone());
                self.emit_const(Value::BigInt(id));
            }
            ExprKind::Regex { pattern, flags } => {
                // No runtime regex engine: a regex literal evaluates to a
                // plain object carrying its source and flags.
                self.emit_string_const("source");
                self.emit_string_const(pattern);
                self.emit_string_const("flags");
                let mut flag_str = String::new();
                if flags.global {
                    flag_str.push('g');
                }
                if flags.ignore_case {
                    flag_str.push('i');
                }
                if flags.multiline {
                    flag_str.push('m');
                }
                if flags.dot_all {
                    flag_str.push('s');
                }
                if flags.unicode {
                    flag_str.push('u');
                }
                if flags.sticky {
                    flag_str.push('y');
                }
                if flags.has_indices {
                    flag_str.push('d');
                }
                self.emit_string_const(&flag_str);
                self.builder().emit_u16(Opcode::ObjectNew, 2);
            }
            ExprKind::TemplateLiteral { quasis, exprs } => {
                self.emit_string_const(&quasis[0]);
                self.builder().emit(Opcode::ToString);
                for (index, part) in exprs.iter().enumerate() {
                    self.emit_expr(part)?;
                    self.builder().emit(Opcode::Add);
                    let quasi = &quasis[index + 1];
                    if !quasi.is_empty() {
                        self.emit_string_const(quasi);
                        self.builder().emit(Opcode::Add);
                    }
                }
            }
            ExprKind::Identifier(name) => match self.resolve_var(name) {
                Some(info) => self.builder().emit_u16(Opcode::VarLoad, info.slot),
                None => {
                    let name_id = self.interns.intern(name);
                    self.builder().emit_u32(Opcode::GetGlobal, name_id.raw());
                }
            },
            ExprKind::This => {
                let is_arrow = self.frame().flags.is_arrow;
                if is_arrow {
                    self.frame().uses_this = true;
                    self.builder().emit(Opcode::GetOuterThis);
                } else {
                    self.builder().emit(Opcode::GetThis);
                }
            }
            ExprKind::Super => {
                return Err(SyntaxError::new(
                    "'super' is only valid in calls and member accesses",
                    expr.span.start,
                ));
            }
            ExprKind::Array(elements) => self.emit_array_literal(elements)?,
            ExprKind::Object(properties) => self.emit_object_literal(properties)?,
            ExprKind::Function(literal) => self.emit_function(literal)?,
            ExprKind::Arrow(literal) => self.emit_function(literal)?,
            ExprKind::Class(class) => self.emit_class(class)?,
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                if let ExprKind::Super = object.kind {
                    // `super.m` resolves on the superclass prototype.
                    self.builder().emit(Opcode::GetSuper);
                    let proto_id: StringId = StaticStrings::Prototype.into();
                    self.builder().emit_u32(Opcode::PropertyLoad, proto_id.raw());
                } else {
                    self.emit_expr(object)?;
                }
                let optional_jump = if *optional {
                    Some(self.builder().emit_jump(Opcode::OptionalJump))
                } else {
                    None
                };
                self.emit_member_load(property)?;
                if let Some(jump) = optional_jump {
                    self.builder().patch_jump(jump);
                }
            }
            ExprKind::Call { callee, args, optional } => self.emit_call(callee, args, *optional)?,
            ExprKind::New { callee, args } => self.emit_new(callee, args)?,
            ExprKind::Unary { op, operand } => self.emit_unary(*op, operand)?,
            ExprKind::Update { op, prefix, operand } => self.emit_update(*op, *prefix, operand)?,
            ExprKind::Binary { op, left, right } => {
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                self.builder().emit(binary_opcode(*op));
            }
            ExprKind::Logical { op, left, right } => {
                self.emit_expr(left)?;
                let jump = self.builder().emit_jump(match op {
                    LogicalOp::And => Opcode::JumpIfFalseOrPop,
                    LogicalOp::Or => Opcode::JumpIfTrueOrPop,
                    LogicalOp::Nullish => Opcode::JumpNotNullishOrPop,
                });
                self.emit_expr(right)?;
                self.builder().patch_jump(jump);
            }
            ExprKind::Assign { op, target, value } => self.emit_assign(*op, target, value)?,
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.emit_expr(test)?;
                let jump_else = self.builder().emit_jump(Opcode::IfEq);
                self.emit_expr(consequent)?;
                let jump_end = self.builder().emit_jump(Opcode::Goto);
                let depth = self.builder().stack_depth();
                self.builder().patch_jump(jump_else);
                self.builder().set_stack_depth(depth - 1);
                self.emit_expr(alternate)?;
                self.builder().patch_jump(jump_end);
            }
            ExprKind::Yield { argument, delegate } => {
                if !self.frame().flags.is_generator {
                    return Err(SyntaxError::new("yield outside of a generator", expr.span.start));
                }
                if *delegate {
                    let argument = argument
                        .as_deref()
                        .ok_or_else(|| SyntaxError::new("yield* requires an iterable", expr.span.start))?;
                    self.emit_yield_delegate(argument)?;
                } else {
                    match argument {
                        Some(argument) => self.emit_expr(argument)?,
                        None => self.builder().emit(Opcode::Undefined),
                    }
                    self.builder().emit(Opcode::Yield);
                }
            }
            ExprKind::Await(operand) => {
                if !self.frame().flags.is_async {
                    return Err(SyntaxError::new("await outside of an async function", expr.span.start));
                }
                self.emit_expr(operand)?;
                self.builder().emit(Opcode::Await);
            }
            ExprKind::ImportCall(specifier) => {
                self.emit_expr(specifier)?;
                self.builder().emit(Opcode::GetModuleAsync);
            }
            ExprKind::Sequence(exprs) => {
                let (last, init) = exprs.split_last().expect("sequence is non-empty");
                for expr in init {
                    self.emit_expr(expr)?;
                    self.builder().emit(Opcode::Pop);
                }
                self.emit_expr(last)?;
            }
        }
        Ok(())
    }

    /// `yield* e` desugars to an explicit drive loop over `e`'s iterator.
    /// Values sent into the outer generator are not forwarded to the inner
    /// iterator.
    fn emit_yield_delegate(&mut self, argument: &Expr) -> GenResult<()> {
        self.emit_expr(argument)?;
        self.builder().emit(Opcode::GetIterator);
        let iter_slot = self.acquire_temp();
        self.builder().emit_u16(Opcode::VarStore, iter_slot);

        let top = self.builder().current_offset();
        self.builder().emit_u16(Opcode::VarLoad, iter_slot);
        self.builder().emit(Opcode::IteratorNext);
        let jump_done = self.builder().emit_jump(Opcode::IfTrue);
        self.builder().emit(Opcode::Yield);
        self.builder().emit(Opcode::Pop);
        self.builder().emit_jump_to(Opcode::Goto, top);
        // Done: the iterator's final value becomes the yield* result.
        let depth = self.builder().stack_depth();
        self.builder().patch_jump(jump_done);
        self.builder().set_stack_depth(depth + 1);
        self.release_temp(iter_slot);
        Ok(())
    }

    fn emit_member_load(&mut self, property: &MemberKey) -> GenResult<()> {
        match property {
            MemberKey::Dot(name) => {
                let name_id = self.interns.intern(name);
                self.builder().emit_u32(Opcode::PropertyLoad, name_id.raw());
            }
            MemberKey::Computed(key) => {
                self.emit_expr(key)?;
                self.builder().emit(Opcode::IndexedLoad);
            }
        }
        Ok(())
    }

    fn emit_array_literal(&mut self, elements: &[Argument]) -> GenResult<()> {
        let has_spread = elements.iter().any(|element| element.spread);
        if !has_spread {
            for element in elements {
                self.emit_expr(&element.expr)?;
            }
            let count = u16::try_from(elements.len())
                .map_err(|_| SyntaxError::new("array literal too large", 0))?;
            self.builder().emit_u16(Opcode::ArrayNew, count);
            return Ok(());
        }
        self.builder().emit_u16(Opcode::ArrayNew, 0);
        for element in elements {
            self.emit_expr(&element.expr)?;
            self.builder().emit(if element.spread {
                Opcode::ArraySpread
            } else {
                Opcode::ArrayPush
            });
        }
        Ok(())
    }

    fn emit_object_literal(&mut self, properties: &[ObjectProperty]) -> GenResult<()> {
        let mut accessors: Vec<&ObjectProperty> = Vec::new();
        let mut pairs = 0u16;
        for property in properties {
            match property.kind {
                PropertyKind::Get | PropertyKind::Set => accessors.push(property),
                PropertyKind::Init | PropertyKind::Method => {
                    self.emit_property_key(&property.key)?;
                    self.emit_expr(&property.value)?;
                    pairs += 1;
                }
            }
        }
        self.builder().emit_u16(Opcode::ObjectNew, pairs);
        for property in accessors {
            self.emit_property_key(&property.key)?;
            self.emit_expr(&property.value)?;
            let flag = if property.kind == PropertyKind::Get { 0 } else { 1 };
            self.builder().emit_u8(Opcode::DefineAccessor, flag);
        }
        Ok(())
    }

    fn emit_property_key(&mut self, key: &PropertyName) -> GenResult<()> {
        match key {
            PropertyName::Static(name) => self.emit_string_const(name),
            PropertyName::Computed(expr) => self.emit_expr(expr)?,
        }
        Ok(())
    }

    fn emit_function(&mut self, literal: &FunctionLiteral) -> GenResult<()> {
        let name_id = match &literal.name {
            Some(name) => self.interns.intern(name),
            None => StaticStrings::Anonymous.into(),
        };
        let flags = FunctionFlags {
            is_module: false,
            is_arrow: literal.is_arrow,
            is_generator: literal.is_generator,
            is_async: literal.is_async,
        };
        self.push_function(name_id, &literal.params, flags);
        self.emit_statements(&literal.body)?;
        let builder = self.builder();
        builder.set_span(Span::new(literal.span.end, literal.span.end));
        builder.emit(Opcode::Undefined);
        builder.emit(Opcode::Return);
        let (def_id, needs_closure) = self.pop_function();

        let index = self.pool.find_or_insert(Value::FunctionDef(def_id));
        let op = if needs_closure { Opcode::Closure } else { Opcode::CLoadD };
        self.builder().emit_u32(op, index);
        Ok(())
    }

    fn emit_class(&mut self, class: &ClassLiteral) -> GenResult<()> {
        match &class.super_class {
            Some(super_class) => self.emit_expr(super_class)?,
            None => self.builder().emit(Opcode::Undefined),
        }

        // The constructor body runs instance-field initialisers before the
        // user's constructor statements.
        let ctor = class
            .members
            .iter()
            .find_map(|member| match &member.kind {
                ClassMemberKind::Constructor(function) => Some(function),
                _ => None,
            });
        let instance_fields: Vec<&ClassMember> = class
            .members
            .iter()
            .filter(|member| matches!(member.kind, ClassMemberKind::Field(_)) && !member.is_static)
            .collect();
        self.emit_constructor(class, ctor, &instance_fields)?;

        let name_id = match &class.name {
            Some(name) => self.interns.intern(name),
            None => StaticStrings::Anonymous.into(),
        };
        self.builder().emit_u32(Opcode::MakeClass, name_id.raw());

        for member in &class.members {
            match &member.kind {
                ClassMemberKind::Constructor(_) => {}
                ClassMemberKind::Method(function) => {
                    self.emit_class_method(member, function, 0)?;
                }
                ClassMemberKind::Getter(function) => {
                    self.emit_class_method(member, function, 0b010)?;
                }
                ClassMemberKind::Setter(function) => {
                    self.emit_class_method(member, function, 0b100)?;
                }
                ClassMemberKind::Field(init) => {
                    if !member.is_static {
                        continue;
                    }
                    // Static field: evaluated once, stored on the
                    // constructor itself.
                    match &member.key {
                        PropertyName::Static(name) => {
                            let name_id = self.interns.intern(name);
                            self.builder().emit(Opcode::Dup);
                            match init {
                                Some(init) => self.emit_expr(init)?,
                                None => self.builder().emit(Opcode::Undefined),
                            }
                            self.builder().emit_u32(Opcode::PropertyStore, name_id.raw());
                        }
                        PropertyName::Computed(key) => {
                            self.builder().emit(Opcode::Dup);
                            self.emit_expr(key)?;
                            match init {
                                Some(init) => self.emit_expr(init)?,
                                None => self.builder().emit(Opcode::Undefined),
                            }
                            self.builder().emit(Opcode::IndexedStore);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_constructor(
        &mut self,
        class: &ClassLiteral,
        ctor: Option<&FunctionLiteral>,
        instance_fields: &[&ClassMember],
    ) -> GenResult<()> {
        let name_id = match &class.name {
            Some(name) => self.interns.intern(name),
            None => StaticStrings::Anonymous.into(),
        };
        let params: &[crate::ast::Param] = match ctor {
            Some(function) => &function.params,
            None => &[],
        };
        self.push_function(name_id, params, FunctionFlags::default());

        for member in instance_fields {
            let ClassMemberKind::Field(init) = &member.kind else {
                continue;
            };
            self.builder().set_span(member.span);
            match &member.key {
                PropertyName::Static(name) => {
                    let field_id = self.interns.intern(name);
                    self.builder().emit(Opcode::GetThis);
                    match init {
                        Some(init) => self.emit_expr(init)?,
                        None => self.builder().emit(Opcode::Undefined),
                    }
                    self.builder().emit_u32(Opcode::PropertyStore, field_id.raw());
                }
                PropertyName::Computed(key) => {
                    self.builder().emit(Opcode::GetThis);
                    self.emit_expr(key)?;
                    match init {
                        Some(init) => self.emit_expr(init)?,
                        None => self.builder().emit(Opcode::Undefined),
                    }
                    self.builder().emit(Opcode::IndexedStore);
                }
            }
        }
        if let Some(function) = ctor {
            self.emit_statements(&function.body)?;
        }
        self.builder().emit(Opcode::Undefined);
        self.builder().emit(Opcode::Return);
        let (def_id, needs_closure) = self.pop_function();
        let index = self.pool.find_or_insert(Value::FunctionDef(def_id));
        let op = if needs_closure { Opcode::Closure } else { Opcode::CLoadD };
        self.builder().emit_u32(op, index);
        Ok(())
    }

    fn emit_class_method(&mut self, member: &ClassMember, function: &FunctionLiteral, kind_flags: u8) -> GenResult<()> {
        let flags = kind_flags | u8::from(member.is_static);
        match &member.key {
            PropertyName::Static(name) => {
                let method_name = self.interns.intern(name);
                let named = FunctionLiteral {
                    name: Some(name.clone()),
                    ..function.clone()
                };
                self.emit_function(&named)?;
                self.builder().emit_u32_u8(Opcode::DefineMethod, method_name.raw(), flags);
            }
            PropertyName::Computed(key) => {
                self.emit_expr(key)?;
                self.emit_function(function)?;
                self.builder().emit_u8(Opcode::DefineMethodComputed, flags);
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, callee: &Expr, args: &[Argument], optional: bool) -> GenResult<()> {
        let has_spread = args.iter().any(|arg| arg.spread);
        let base_depth = self.builder().stack_depth();

        if has_spread {
            self.builder().emit_u16(Opcode::ArrayNew, 0);
            for arg in args {
                self.emit_expr(&arg.expr)?;
                self.builder().emit(if arg.spread {
                    Opcode::ArraySpread
                } else {
                    Opcode::ArrayPush
                });
            }
        } else {
            for arg in args {
                self.emit_expr(&arg.expr)?;
            }
            self.emit_argc(args.len());
        }

        // Nullish short-circuit jumps, by the stack shape at the jump:
        // "shallow" jumps leave [.., undefined] above the arguments,
        // "deep" jumps leave [.., obj, undefined] (the `a.b?.()` callee
        // check fires with the receiver still stacked).
        let mut shallow_jumps = Vec::new();
        let mut deep_jumps = Vec::new();
        match &callee.kind {
            ExprKind::Member {
                object,
                property,
                optional: member_optional,
            } => {
                if let ExprKind::Super = object.kind {
                    // `super.m(...)`: look the method up on the superclass
                    // prototype but call it with the current `this`.
                    self.builder().emit(Opcode::GetSuper);
                    let proto_id: StringId = StaticStrings::Prototype.into();
                    self.builder().emit_u32(Opcode::PropertyLoad, proto_id.raw());
                    self.emit_member_load(property)?;
                    self.builder().emit(Opcode::GetThis);
                } else {
                    self.emit_expr(object)?;
                    if *member_optional {
                        shallow_jumps.push(self.builder().emit_jump(Opcode::OptionalJump));
                    }
                    self.builder().emit(Opcode::Dup);
                    self.emit_member_load(property)?;
                    if optional {
                        // `a.b?.()` checks the loaded callee while the
                        // receiver is still below it.
                        deep_jumps.push(self.builder().emit_jump(Opcode::OptionalJump));
                    }
                    // The object doubles as the call's `this`.
                    self.builder().emit(Opcode::Swap);
                }
            }
            ExprKind::Super => {
                self.builder().emit(Opcode::GetSuper);
                self.builder().emit(Opcode::GetThis);
            }
            _ => {
                self.emit_expr(callee)?;
                if optional {
                    shallow_jumps.push(self.builder().emit_jump(Opcode::OptionalJump));
                }
                self.builder().emit(Opcode::Undefined);
            }
        }

        let call_op = if has_spread { Opcode::CallSpread } else { Opcode::FunctionCall };
        self.builder().emit(call_op);
        // Calls collapse their operands into a single result.
        self.builder().set_stack_depth(base_depth + 1);

        if !shallow_jumps.is_empty() || !deep_jumps.is_empty() {
            let jump_after = self.builder().emit_jump(Opcode::Goto);
            let args_depth = if has_spread {
                1
            } else {
                u16::try_from(args.len()).expect("argument count exceeds u16") + 1
            };
            // Deep entry pops the extra receiver, then falls into the
            // shallow entry; from there only pops remain.
            if !deep_jumps.is_empty() {
                let deep = self.builder().current_offset();
                self.builder().set_stack_depth(base_depth + args_depth + 2);
                for jump in deep_jumps {
                    self.builder().patch_jump_to(jump, deep);
                }
                self.builder().emit(Opcode::Pop);
            }
            let shallow = self.builder().current_offset();
            self.builder().set_stack_depth(base_depth + args_depth + 1);
            for jump in shallow_jumps {
                self.builder().patch_jump_to(jump, shallow);
            }
            // Drop the undefined, the argument pack, and push the result.
            self.builder().emit(Opcode::Pop);
            if has_spread {
                self.builder().emit(Opcode::Pop);
            } else {
                self.builder().emit(Opcode::Pop);
                for _ in 0..args.len() {
                    self.builder().emit(Opcode::Pop);
                }
            }
            self.builder().emit(Opcode::Undefined);
            self.builder().patch_jump(jump_after);
            self.builder().set_stack_depth(base_depth + 1);
        }
        Ok(())
    }

    fn emit_new(&mut self, callee: &Expr, args: &[Argument]) -> GenResult<()> {
        let has_spread = args.iter().any(|arg| arg.spread);
        if has_spread {
            self.builder().emit_u16(Opcode::ArrayNew, 0);
            for arg in args {
                self.emit_expr(&arg.expr)?;
                self.builder().emit(if arg.spread {
                    Opcode::ArraySpread
                } else {
                    Opcode::ArrayPush
                });
            }
            self.emit_expr(callee)?;
            self.builder().emit(Opcode::NewSpread);
        } else {
            for arg in args {
                self.emit_expr(&arg.expr)?;
            }
            self.emit_argc(args.len());
            self.emit_expr(callee)?;
            self.builder().emit(Opcode::New);
        }
        Ok(())
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Expr) -> GenResult<()> {
        match op {
            UnaryOp::Typeof => {
                // `typeof x` on an undeclared identifier must not throw.
                if let ExprKind::Identifier(name) = &operand.kind {
                    match self.resolve_var(name) {
                        Some(info) => self.builder().emit_u16(Opcode::VarLoad, info.slot),
                        None => {
                            let name_id = self.interns.intern(name);
                            self.builder().emit_u32(Opcode::GetGlobalSoft, name_id.raw());
                        }
                    }
                } else {
                    self.emit_expr(operand)?;
                }
                self.builder().emit(Opcode::TypeOf);
            }
            UnaryOp::Void => {
                self.emit_expr(operand)?;
                self.builder().emit(Opcode::Pop);
                self.builder().emit(Opcode::Undefined);
            }
            UnaryOp::Delete => match &operand.kind {
                ExprKind::Member {
                    object,
                    property,
                    optional: false,
                } => {
                    self.emit_expr(object)?;
                    match property {
                        MemberKey::Dot(name) => {
                            let name_id = self.interns.intern(name);
                            self.builder().emit_u32(Opcode::DeleteProperty, name_id.raw());
                        }
                        MemberKey::Computed(key) => {
                            self.emit_expr(key)?;
                            self.builder().emit(Opcode::DeleteIndexed);
                        }
                    }
                }
                _ => {
                    // `delete` on a non-member is evaluated for effect only.
                    self.emit_expr(operand)?;
                    self.builder().emit(Opcode::Pop);
                    self.emit_const(Value::Bool(true));
                }
            },
            UnaryOp::Plus => {
                self.emit_expr(operand)?;
                self.builder().emit(Opcode::ToNumber);
            }
            UnaryOp::Minus => {
                self.emit_expr(operand)?;
                self.builder().emit(Opcode::Neg);
            }
            UnaryOp::Not => {
                self.emit_expr(operand)?;
                self.builder().emit(Opcode::Not);
            }
            UnaryOp::BitNot => {
                self.emit_expr(operand)?;
                self.builder().emit(Opcode::BitNot);
            }
        }
        Ok(())
    }

    fn emit_update(&mut self, op: UpdateOp, prefix: bool, operand: &Expr) -> GenResult<()> {
        let step = if op == UpdateOp::Inc { Opcode::Inc } else { Opcode::Dec };
        match &operand.kind {
            ExprKind::Identifier(name) => {
                let resolved = self.resolve_var(name);
                if let Some(info) = &resolved
                    && info.is_const
                {
                    return Err(SyntaxError::new(
                        format!("assignment to constant '{name}'"),
                        operand.span.start,
                    ));
                }
                let name_id = self.interns.intern(name);
                match resolved {
                    Some(info) => self.builder().emit_u16(Opcode::VarLoad, info.slot),
                    None => self.builder().emit_u32(Opcode::GetGlobal, name_id.raw()),
                }
                if prefix {
                    self.builder().emit(step);
                    self.builder().emit(Opcode::Dup);
                } else {
                    self.builder().emit(Opcode::ToNumber);
                    self.builder().emit(Opcode::Dup);
                    self.builder().emit(step);
                }
                match resolved {
                    Some(info) => self.builder().emit_u16(Opcode::VarStore, info.slot),
                    None => self.builder().emit_u32(Opcode::SetGlobal, name_id.raw()),
                }
            }
            ExprKind::Member {
                object,
                property,
                optional: false,
            } => {
                let obj_slot = self.acquire_temp();
                let old_slot = self.acquire_temp();
                self.emit_expr(object)?;
                self.builder().emit_u16(Opcode::VarStore, obj_slot);

                let key_slot = match property {
                    MemberKey::Computed(key) => {
                        let key_slot = self.acquire_temp();
                        self.emit_expr(key)?;
                        self.builder().emit_u16(Opcode::VarStore, key_slot);
                        Some(key_slot)
                    }
                    MemberKey::Dot(_) => None,
                };

                // old = ToNumber(obj[key])
                self.builder().emit_u16(Opcode::VarLoad, obj_slot);
                match (property, key_slot) {
                    (MemberKey::Dot(name), _) => {
                        let name_id = self.interns.intern(name);
                        self.builder().emit_u32(Opcode::PropertyLoad, name_id.raw());
                    }
                    (MemberKey::Computed(_), Some(key_slot)) => {
                        self.builder().emit_u16(Opcode::VarLoad, key_slot);
                        self.builder().emit(Opcode::IndexedLoad);
                    }
                    (MemberKey::Computed(_), None) => unreachable!("computed key allocated a slot"),
                }
                self.builder().emit(Opcode::ToNumber);
                self.builder().emit_u16(Opcode::VarStore, old_slot);

                // obj[key] = old ± 1
                self.builder().emit_u16(Opcode::VarLoad, obj_slot);
                if let Some(key_slot) = key_slot {
                    self.builder().emit_u16(Opcode::VarLoad, key_slot);
                }
                self.builder().emit_u16(Opcode::VarLoad, old_slot);
                self.builder().emit(step);
                match (property, key_slot) {
                    (MemberKey::Dot(name), _) => {
                        let name_id = self.interns.intern(name);
                        self.builder().emit_u32(Opcode::PropertyStore, name_id.raw());
                    }
                    (MemberKey::Computed(_), _) => self.builder().emit(Opcode::IndexedStore),
                }

                // Result: the old value (postfix) or the stepped value
                // (prefix).
                self.builder().emit_u16(Opcode::VarLoad, old_slot);
                if prefix {
                    self.builder().emit(step);
                }

                if let Some(key_slot) = key_slot {
                    self.release_temp(key_slot);
                }
                self.release_temp(old_slot);
                self.release_temp(obj_slot);
            }
            _ => {
                return Err(SyntaxError::new("invalid increment/decrement target", operand.span.start));
            }
        }
        Ok(())
    }

    fn emit_assign(&mut self, op: Option<BinaryOp>, target: &Expr, value: &Expr) -> GenResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let resolved = self.resolve_var(name);
                if let Some(info) = &resolved
                    && info.is_const
                {
                    return Err(SyntaxError::new(
                        format!("assignment to constant '{name}'"),
                        target.span.start,
                    ));
                }
                let name_id = self.interns.intern(name);
                if let Some(op) = op {
                    match &resolved {
                        Some(info) => self.builder().emit_u16(Opcode::VarLoad, info.slot),
                        None => self.builder().emit_u32(Opcode::GetGlobal, name_id.raw()),
                    }
                    self.emit_expr(value)?;
                    self.builder().emit(binary_opcode(op));
                } else {
                    self.emit_expr(value)?;
                }
                self.builder().emit(Opcode::Dup);
                match resolved {
                    Some(info) => self.builder().emit_u16(Opcode::VarStore, info.slot),
                    None => self.builder().emit_u32(Opcode::SetGlobal, name_id.raw()),
                }
            }
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                if *optional {
                    return Err(SyntaxError::new(
                        "optional chain cannot be an assignment target",
                        target.span.start,
                    ));
                }
                let obj_slot = self.acquire_temp();
                self.emit_expr(object)?;
                self.builder().emit_u16(Opcode::VarStore, obj_slot);

                let key_slot = match property {
                    MemberKey::Computed(key) => {
                        let key_slot = self.acquire_temp();
                        self.emit_expr(key)?;
                        self.builder().emit_u16(Opcode::VarStore, key_slot);
                        Some(key_slot)
                    }
                    MemberKey::Dot(_) => None,
                };

                if let Some(op) = op {
                    self.builder().emit_u16(Opcode::VarLoad, obj_slot);
                    match (property, key_slot) {
                        (MemberKey::Dot(name), _) => {
                            let name_id = self.interns.intern(name);
                            self.builder().emit_u32(Opcode::PropertyLoad, name_id.raw());
                        }
                        (MemberKey::Computed(_), Some(key_slot)) => {
                            self.builder().emit_u16(Opcode::VarLoad, key_slot);
                            self.builder().emit(Opcode::IndexedLoad);
                        }
                        (MemberKey::Computed(_), None) => unreachable!("computed key allocated a slot"),
                    }
                    self.emit_expr(value)?;
                    self.builder().emit(binary_opcode(op));
                } else {
                    self.emit_expr(value)?;
                }

                // Stack: [result]. Keep it as the expression value while
                // storing a copy.
                self.builder().emit(Opcode::Dup);
                self.builder().emit_u16(Opcode::VarLoad, obj_slot);
                self.builder().emit(Opcode::Swap);
                match (property, key_slot) {
                    (MemberKey::Dot(name), _) => {
                        let name_id = self.interns.intern(name);
                        self.builder().emit_u32(Opcode::PropertyStore, name_id.raw());
                    }
                    (MemberKey::Computed(_), Some(key_slot)) => {
                        // [result, obj, value] -> [result, obj, key, value]
                        self.builder().emit_u16(Opcode::VarLoad, key_slot);
                        self.builder().emit(Opcode::Swap);
                        self.builder().emit(Opcode::IndexedStore);
                    }
                    (MemberKey::Computed(_), None) => unreachable!("computed key allocated a slot"),
                }

                if let Some(key_slot) = key_slot {
                    self.release_temp(key_slot);
                }
                self.release_temp(obj_slot);
            }
            _ => {
                return Err(SyntaxError::new("invalid assignment target", target.span.start));
            }
        }
        Ok(())
    }
}

/// Maps a non-logical binary operator to its opcode.
fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Rem => Opcode::Rem,
        BinaryOp::Exp => Opcode::Exp,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
        BinaryOp::StrictEq => Opcode::StrictEq,
        BinaryOp::StrictNe => Opcode::StrictNe,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitXor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
        BinaryOp::UShr => Opcode::UShr,
        BinaryOp::In => Opcode::InOp,
        BinaryOp::Instanceof => Opcode::InstanceOf,
    }
}
