//! skiff — an embeddable JavaScript engine.
//!
//! The pipeline: UTF-8 source → lexer → recursive-descent parser → bytecode
//! code generator → stack VM with a generational moving garbage collector.
//! Hosts embed the engine through [`Runtime`] and [`Context`]:
//!
//! ```
//! use skiff::{Context, Runtime};
//!
//! let runtime = Runtime::new();
//! let mut ctx = Context::new(&runtime);
//! let result = ctx.eval("main", "1 + 2 * 3").unwrap();
//! assert_eq!(ctx.value_number(&result), Some(7.0));
//! ```
#![expect(dead_code, reason = "embedding surface keeps some currently-unused APIs")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors JS ToInt32")]
#![expect(clippy::unnecessary_wraps, reason = "dispatch signatures are uniform")]
#![expect(clippy::float_cmp, reason = "JS semantics require exact float comparison")]

mod ast;
mod bytecode;
mod codegen;
mod context;
mod error;
mod heap;
mod intern;
mod io;
mod lexer;
mod module_loader;
mod object;
mod parser;
mod runtime;
mod token;
mod tracer;
mod value;
mod vm;

pub use crate::{
    context::{Context, EngineConfig, HostFn, InterruptHandle, NativeCtx},
    error::{Exception, TraceFrame},
    heap::{GcConfig, GcCounters, HeapStats, PendingGc},
    io::{CollectPrint, NoPrint, PrintWriter, StdPrint},
    lexer::LineTable,
    module_loader::{FsLoader, MapLoader, ModuleLoader, NoLoader},
    runtime::Runtime,
    tracer::{CountingTracer, NoopTracer, StderrTracer, VmTracer},
    value::Value,
};
