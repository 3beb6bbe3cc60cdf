//! Lexical scope tracking for the code generator.
//!
//! Scopes form a stack during code generation. Each scope records which
//! function it belongs to (an index into the generator's function-compile
//! stack) and its kind; the kind walk decides how `break`/`continue`/
//! `return` are lowered when they cross a `finally`.

use ahash::AHashMap;

/// Classification of a scope, used to choose jump lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    None,
    If,
    Else,
    While,
    For,
    Switch,
    Function,
    Arrow,
    Try,
    TryFinally,
    Catch,
    CatchFinally,
    Finally,
}

impl ScopeKind {
    /// Scope kinds whose exit must route through a finally block.
    pub const FINALLY_KINDS: &[Self] = &[Self::TryFinally, Self::CatchFinally, Self::Finally];
    /// Kinds that terminate the walk for `break`/`continue`.
    pub const LOOP_KINDS: &[Self] = &[Self::While, Self::For, Self::Switch, Self::Function, Self::Arrow];
    /// Kinds that terminate the walk for `return`.
    pub const FUNCTION_KINDS: &[Self] = &[Self::Function, Self::Arrow];
}

/// A variable binding: slot index in its owning function plus flags.
#[derive(Debug, Clone, Copy)]
pub struct VarInfo {
    pub slot: u16,
    pub is_const: bool,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Index into the code generator's function-compile stack.
    pub func_index: usize,
    vars: AHashMap<String, VarInfo>,
}

/// Result of a name lookup: where the binding lives.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub info: VarInfo,
    /// Function level the binding was declared in.
    pub func_index: usize,
}

/// Stack of scopes, innermost last.
#[derive(Debug, Default)]
pub struct ScopeManager {
    scopes: Vec<Scope>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, func_index: usize, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            func_index,
            vars: AHashMap::new(),
        });
    }

    pub fn exit(&mut self) {
        self.scopes.pop().expect("scope stack underflow");
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declares a name in the innermost scope.
    ///
    /// Returns false when the name is already declared in that scope
    /// (redeclaration is a SyntaxError at the call site).
    pub fn declare(&mut self, name: &str, info: VarInfo) -> bool {
        let scope = self.scopes.last_mut().expect("declare outside any scope");
        if scope.vars.contains_key(name) {
            return false;
        }
        scope.vars.insert(name.to_owned(), info);
        true
    }

    /// Finds a name, walking inward-to-outward.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Resolved> {
        for scope in self.scopes.iter().rev() {
            if let Some(&info) = scope.vars.get(name) {
                return Some(Resolved {
                    info,
                    func_index: scope.func_index,
                });
            }
        }
        None
    }

    /// Walks inward-to-outward and reports whether a `wanted` kind appears
    /// before any `stopper` kind.
    ///
    /// Used to decide `FinallyGoto` vs plain `Goto`: a `break` crossing a
    /// try-with-finally must run the finally first.
    #[must_use]
    pub fn is_in_scope_kind(&self, wanted: &[ScopeKind], stoppers: &[ScopeKind]) -> bool {
        for scope in self.scopes.iter().rev() {
            if wanted.contains(&scope.kind) {
                return true;
            }
            if stoppers.contains(&scope.kind) {
                return false;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(slot: u16) -> VarInfo {
        VarInfo { slot, is_const: false }
    }

    #[test]
    fn shadowing_resolves_innermost() {
        let mut scopes = ScopeManager::new();
        scopes.enter(0, ScopeKind::Function);
        assert!(scopes.declare("x", var(0)));
        scopes.enter(0, ScopeKind::While);
        assert!(scopes.declare("x", var(1)));
        assert_eq!(scopes.find("x").expect("x bound").info.slot, 1);
        scopes.exit();
        assert_eq!(scopes.find("x").expect("x bound").info.slot, 0);
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let mut scopes = ScopeManager::new();
        scopes.enter(0, ScopeKind::Function);
        assert!(scopes.declare("x", var(0)));
        assert!(!scopes.declare("x", var(1)));
    }

    #[test]
    fn finally_walk_stops_at_loop() {
        let mut scopes = ScopeManager::new();
        scopes.enter(0, ScopeKind::Function);
        scopes.enter(0, ScopeKind::While);
        scopes.enter(0, ScopeKind::TryFinally);
        // break inside try-finally inside loop: the finally comes first.
        assert!(scopes.is_in_scope_kind(ScopeKind::FINALLY_KINDS, ScopeKind::LOOP_KINDS));
        scopes.exit();
        scopes.enter(0, ScopeKind::If);
        // break from a plain if inside the loop: no finally on the path.
        assert!(!scopes.is_in_scope_kind(ScopeKind::FINALLY_KINDS, ScopeKind::LOOP_KINDS));
    }

    #[test]
    fn return_walk_crosses_loops() {
        let mut scopes = ScopeManager::new();
        scopes.enter(0, ScopeKind::Function);
        scopes.enter(0, ScopeKind::TryFinally);
        scopes.enter(0, ScopeKind::While);
        // return from a loop inside try-finally still runs the finally.
        assert!(scopes.is_in_scope_kind(ScopeKind::FINALLY_KINDS, ScopeKind::FUNCTION_KINDS));
    }
}
