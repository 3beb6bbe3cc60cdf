//! Execution tracing hooks.
//!
//! The VM reports coarse events through a [`VmTracer`]; the default
//! [`NoopTracer`] compiles to nothing. [`StderrTracer`] is a debugging aid,
//! [`CountingTracer`] backs tests that assert on execution shape (how many
//! calls, whether a GC ran) without coupling to bytecode details.

use crate::heap::PendingGc;

/// Hooks invoked by the VM at coarse execution events.
///
/// Implementations must be cheap; the instruction hook sits in the dispatch
/// loop.
pub trait VmTracer {
    /// One bytecode instruction is about to dispatch.
    fn on_instruction(&mut self, _pc: usize) {}

    /// A frame was pushed (function entry).
    fn on_call(&mut self, _depth: usize) {}

    /// A frame returned.
    fn on_return(&mut self, _depth: usize) {}

    /// An exception is being raised (before handler search).
    fn on_throw(&mut self) {}

    /// A garbage collection ran at a safepoint.
    fn on_gc(&mut self, _kind: PendingGc) {}
}

/// The default tracer: every hook is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Logs calls, throws, and collections to stderr.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_call(&mut self, depth: usize) {
        eprintln!("[skiff] call depth={depth}");
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("[skiff] return depth={depth}");
    }

    fn on_throw(&mut self) {
        eprintln!("[skiff] throw");
    }

    fn on_gc(&mut self, kind: PendingGc) {
        eprintln!("[skiff] gc {kind:?}");
    }
}

/// Counts events; used by tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingTracer {
    pub instructions: usize,
    pub calls: usize,
    pub returns: usize,
    pub throws: usize,
    pub minor_gcs: usize,
    pub major_gcs: usize,
}

impl VmTracer for CountingTracer {
    fn on_instruction(&mut self, _pc: usize) {
        self.instructions += 1;
    }

    fn on_call(&mut self, _depth: usize) {
        self.calls += 1;
    }

    fn on_return(&mut self, _depth: usize) {
        self.returns += 1;
    }

    fn on_throw(&mut self) {
        self.throws += 1;
    }

    fn on_gc(&mut self, kind: PendingGc) {
        match kind {
            PendingGc::Minor => self.minor_gcs += 1,
            PendingGc::Major => self.major_gcs += 1,
        }
    }
}
