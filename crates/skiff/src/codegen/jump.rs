//! Break/continue jump bookkeeping.
//!
//! Loops (and other breakable statements) register a context holding lists
//! of placeholder jumps emitted for `break` and `continue`. When the loop
//! finishes, the code generator repairs each placeholder to the loop end or
//! the reloop point. Labelled statements attach a name to their context so
//! `break label;` / `continue label;` target the named statement instead of
//! the innermost one.

use crate::bytecode::JumpLabel;

/// One breakable region (loop, switch, or labelled statement).
#[derive(Debug)]
pub struct LoopContext {
    pub label: Option<String>,
    /// `continue` only targets real loops; switch and labelled blocks
    /// accept `break` alone.
    pub allows_continue: bool,
    pub breaks: Vec<JumpLabel>,
    pub continues: Vec<JumpLabel>,
}

/// Stack of breakable regions, innermost last.
#[derive(Debug, Default)]
pub struct JumpManager {
    contexts: Vec<LoopContext>,
}

impl JumpManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a breakable region. The matching [`Self::exit`] returns the
    /// placeholder lists for repair.
    pub fn enter(&mut self, label: Option<String>, allows_continue: bool) {
        self.contexts.push(LoopContext {
            label,
            allows_continue,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
    }

    pub fn exit(&mut self) -> LoopContext {
        self.contexts.pop().expect("jump context underflow")
    }

    /// True when a `break` has somewhere to go.
    #[must_use]
    pub fn in_breakable(&self) -> bool {
        !self.contexts.is_empty()
    }

    /// Registers a `break` placeholder, innermost or named.
    ///
    /// Returns false when no matching context exists (break outside a loop
    /// or unknown label).
    pub fn add_break(&mut self, label: Option<&str>, jump: JumpLabel) -> bool {
        let context = match label {
            None => self.contexts.last_mut(),
            Some(name) => self
                .contexts
                .iter_mut()
                .rev()
                .find(|ctx| ctx.label.as_deref() == Some(name)),
        };
        match context {
            Some(ctx) => {
                ctx.breaks.push(jump);
                true
            }
            None => false,
        }
    }

    /// Registers a `continue` placeholder, innermost loop or named loop.
    pub fn add_continue(&mut self, label: Option<&str>, jump: JumpLabel) -> bool {
        let context = match label {
            None => self.contexts.iter_mut().rev().find(|ctx| ctx.allows_continue),
            Some(name) => self
                .contexts
                .iter_mut()
                .rev()
                .find(|ctx| ctx.allows_continue && ctx.label.as_deref() == Some(name)),
        };
        match context {
            Some(ctx) => {
                ctx.continues.push(jump);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_at(pc: u32) -> JumpLabel {
        JumpLabel::from_pc(pc)
    }

    #[test]
    fn break_targets_innermost_context() {
        let mut jumps = JumpManager::new();
        jumps.enter(Some("outer".to_owned()), true);
        jumps.enter(None, true);
        assert!(jumps.add_break(None, label_at(10)));
        assert!(jumps.add_break(Some("outer"), label_at(20)));
        let inner = jumps.exit();
        assert_eq!(inner.breaks.len(), 1);
        let outer = jumps.exit();
        assert_eq!(outer.breaks.len(), 1);
    }

    #[test]
    fn continue_skips_switch_contexts() {
        let mut jumps = JumpManager::new();
        jumps.enter(None, true); // loop
        jumps.enter(None, false); // switch
        assert!(jumps.add_continue(None, label_at(5)));
        let switch = jumps.exit();
        assert!(switch.continues.is_empty());
        let loop_ctx = jumps.exit();
        assert_eq!(loop_ctx.continues.len(), 1);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let mut jumps = JumpManager::new();
        jumps.enter(Some("a".to_owned()), true);
        assert!(!jumps.add_break(Some("missing"), label_at(0)));
        assert!(!jumps.add_continue(Some("missing"), label_at(0)));
        jumps.exit();
        assert!(!jumps.add_break(None, label_at(0)));
    }
}
