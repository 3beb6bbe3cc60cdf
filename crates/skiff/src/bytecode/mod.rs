//! Bytecode representation and tables.
//!
//! - `op` — opcode enum with operand widths and fixed stack effects
//! - `code` — FunctionDef / ModuleDef and their exception, debug, and
//!   closure tables
//! - `builder` — CodeBuilder for emitting bytecode during compilation

pub use builder::{BuiltCode, CodeBuilder, JumpLabel};
pub use code::{ClosureVarDef, DebugEntry, ExceptionEntry, FunctionDef, FunctionDefId, FunctionFlags, ModuleDef, ModuleId};
pub use op::Opcode;

mod builder;
mod code;
mod op;
