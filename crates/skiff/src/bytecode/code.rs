//! Function and module definitions: the compiled artefacts the VM executes.
//!
//! A [`FunctionDef`] owns its bytecode, exception table, debug table, and
//! closure descriptor. A [`ModuleDef`] additionally holds the module name,
//! source text, line table, and export-variable table. Definitions live in
//! per-context registries and are immutable once finalised; the constant
//! pool pins them by construction.

use crate::{ast::Span, intern::StringId, lexer::LineTable};

/// Index into the context's function-definition registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionDefId(pub u32);

/// Index into the context's module-definition registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// Type flags of a function definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// Module top-level body (zero parameters, locals live in the module
    /// object).
    pub is_module: bool,
    /// Arrow function: `this` is captured lexically.
    pub is_arrow: bool,
    pub is_generator: bool,
    pub is_async: bool,
}

/// One entry of a function's exception table.
///
/// All pcs are absolute offsets into the owning function's bytecode. A throw
/// at pc `p` is handled by the innermost entry with
/// `try_start <= p < try_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub try_start: u32,
    pub try_end: u32,
    pub catch_start: Option<u32>,
    pub catch_end: Option<u32>,
    /// Local slot receiving the thrown value when a catch clause binds one.
    pub catch_slot: Option<u16>,
    pub finally_start: Option<u32>,
    pub finally_end: Option<u32>,
}

impl ExceptionEntry {
    /// True when `pc` lies inside the protected try region.
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        self.try_start <= pc && pc < self.try_end
    }

    /// True when `pc` lies inside the catch handler region.
    #[must_use]
    pub fn in_catch(&self, pc: u32) -> bool {
        match (self.catch_start, self.catch_end) {
            (Some(start), Some(end)) => start <= pc && pc < end,
            _ => false,
        }
    }

    /// True when `pc` lies inside the finally region.
    #[must_use]
    pub fn in_finally(&self, pc: u32) -> bool {
        match (self.finally_start, self.finally_end) {
            (Some(start), Some(end)) => start <= pc && pc < end,
            _ => false,
        }
    }
}

/// Wires one captured variable: the cell comes from the parent frame's
/// `parent_slot` and is installed into the child frame's `child_slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureVarDef {
    pub child_slot: u16,
    pub parent_slot: u16,
}

/// One debug-table entry: instructions from `pc` (until the next entry) come
/// from `span` in the module source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugEntry {
    pub pc: u32,
    pub span: Span,
}

/// A finalised function definition. Immutable after compilation.
#[derive(Debug)]
pub struct FunctionDef {
    pub name: StringId,
    pub param_count: u16,
    /// Total local slots, parameters included (slots `0..param_count`).
    pub var_count: u16,
    pub bytecode: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    /// Ordered by pc; consulted by binary search for stack traces.
    pub debug_table: Vec<DebugEntry>,
    /// Capture chain entries; non-empty exactly when the function was
    /// loaded via `Closure` rather than `CLoadD`.
    pub closure_vars: Vec<ClosureVarDef>,
    /// Slot index -> variable name, for error messages.
    pub var_names: Vec<StringId>,
    pub flags: FunctionFlags,
    /// Owning module, for line tables and stack traces.
    pub module: ModuleId,
    /// Deepest operand-stack use, tracked at compile time.
    pub max_stack: u16,
}

impl FunctionDef {
    /// Source span of the instruction at `pc`, from the debug table.
    #[must_use]
    pub fn span_at(&self, pc: u32) -> Option<Span> {
        if self.debug_table.is_empty() {
            return None;
        }
        let idx = match self.debug_table.binary_search_by_key(&pc, |entry| entry.pc) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        Some(self.debug_table[idx].span)
    }

    /// Innermost exception-table entry covering `pc`. Entries are appended
    /// innermost-first (an inner try statement finishes compiling before its
    /// enclosing one), so the first covering entry is the innermost.
    #[must_use]
    pub fn handler_for(&self, pc: u32) -> Option<&ExceptionEntry> {
        self.exception_table.iter().find(|entry| entry.covers(pc))
    }
}

/// A module definition: the top-level function plus source metadata.
#[derive(Debug)]
pub struct ModuleDef {
    pub name: StringId,
    /// Kept for error messages and line/column resolution.
    pub source: String,
    pub line_table: LineTable,
    /// Exported name -> top-level variable slot.
    pub export_vars: Vec<(StringId, u16)>,
    /// Top-level `const` slots: holes until their declaration runs, so
    /// cyclic importers reading too early get a ReferenceError.
    pub const_slots: Vec<u16>,
    /// The module body compiled as a zero-parameter function.
    pub main: FunctionDefId,
}

impl ModuleDef {
    /// Slot of an exported name, if the module exports it.
    #[must_use]
    pub fn export_slot(&self, name: StringId) -> Option<u16> {
        self.export_vars
            .iter()
            .find_map(|&(export, slot)| (export == name).then_some(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_entry_ranges() {
        let entry = ExceptionEntry {
            try_start: 10,
            try_end: 20,
            catch_start: Some(20),
            catch_end: Some(30),
            catch_slot: Some(2),
            finally_start: Some(30),
            finally_end: Some(40),
        };
        assert!(entry.covers(10));
        assert!(entry.covers(19));
        assert!(!entry.covers(20));
        assert!(entry.in_catch(25));
        assert!(entry.in_finally(35));
        assert!(!entry.in_finally(40));
    }

    #[test]
    fn debug_table_lookup_uses_preceding_entry() {
        let def = FunctionDef {
            name: StringId::default(),
            param_count: 0,
            var_count: 0,
            bytecode: Vec::new(),
            exception_table: Vec::new(),
            debug_table: vec![
                DebugEntry {
                    pc: 0,
                    span: Span::new(0, 5),
                },
                DebugEntry {
                    pc: 8,
                    span: Span::new(10, 15),
                },
            ],
            closure_vars: Vec::new(),
            var_names: Vec::new(),
            flags: FunctionFlags::default(),
            module: ModuleId(0),
            max_stack: 0,
        };
        assert_eq!(def.span_at(0), Some(Span::new(0, 5)));
        assert_eq!(def.span_at(7), Some(Span::new(0, 5)));
        assert_eq!(def.span_at(8), Some(Span::new(10, 15)));
        assert_eq!(def.span_at(100), Some(Span::new(10, 15)));
    }

    #[test]
    fn innermost_handler_wins() {
        let outer = ExceptionEntry {
            try_start: 0,
            try_end: 50,
            catch_start: Some(50),
            catch_end: Some(60),
            catch_slot: None,
            finally_start: None,
            finally_end: None,
        };
        let inner = ExceptionEntry {
            try_start: 10,
            try_end: 20,
            catch_start: Some(20),
            catch_end: Some(30),
            catch_slot: None,
            finally_start: None,
            finally_end: None,
        };
        let def = FunctionDef {
            name: StringId::default(),
            param_count: 0,
            var_count: 0,
            bytecode: Vec::new(),
            exception_table: vec![inner, outer],
            debug_table: Vec::new(),
            closure_vars: Vec::new(),
            var_names: Vec::new(),
            flags: FunctionFlags::default(),
            module: ModuleId(0),
            max_stack: 0,
        };
        assert_eq!(def.handler_for(15), Some(&inner));
        assert_eq!(def.handler_for(40), Some(&outer));
        assert_eq!(def.handler_for(60), None);
    }
}
