//! Module loading: imports, exports, namespaces, caching, and cyclic
//! imports with partially initialised bindings.

use pretty_assertions::assert_eq;
use skiff::{Context, MapLoader, Runtime, Value};

fn context_with_modules<'r>(runtime: &'r Runtime, modules: &[(&str, &str)]) -> Context<'r> {
    let mut loader = MapLoader::new();
    for (name, source) in modules {
        loader.insert(*name, *source);
    }
    let mut ctx = Context::new(runtime);
    ctx.set_module_loader(Box::new(loader));
    ctx
}

#[test]
fn named_import_reads_export() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(&runtime, &[("b", "export let x = 1;")]);
    let value = ctx.eval("a", "import { x } from \"b\"; x + 1").unwrap();
    assert_eq!(value, Value::Int(2));
}

#[test]
fn default_and_renamed_imports() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(
        &runtime,
        &[(
            "lib",
            "export default 40;\n\
             export function helper(n) { return n + 1; }\n\
             export const name = 'lib';",
        )],
    );
    let value = ctx
        .eval(
            "main",
            "import d, { helper as h, name } from \"lib\";\n\
             h(d) + name.length",
        )
        .unwrap();
    assert_eq!(value, Value::Int(44));
}

#[test]
fn namespace_import() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(&runtime, &[("m", "export let a = 1; export let b = 2;")]);
    let value = ctx.eval("main", "import * as ns from \"m\"; ns.a + ns.b").unwrap();
    assert_eq!(value, Value::Int(3));
}

#[test]
fn exports_observe_live_bindings() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(
        &runtime,
        &[(
            "counter",
            "export let n = 0;\n\
             export function bump() { n = n + 1; }",
        )],
    );
    let value = ctx
        .eval("main", "import { n, bump } from \"counter\"; bump(); bump(); n")
        .unwrap();
    // The local binding is initialised at import time; the namespace sees
    // the live slot.
    let ns_value = ctx
        .eval("main2", "import * as c from \"counter\"; c.bump(); c.n")
        .unwrap();
    assert_eq!(value, Value::Int(0));
    assert_eq!(ns_value, Value::Int(3));
}

#[test]
fn modules_evaluate_once_and_cache() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(
        &runtime,
        &[
            ("effect", "sideEffects = sideEffects + 1; export let done = true;"),
            ("one", "import { done } from \"effect\"; export let a = 1;"),
            ("two", "import { done } from \"effect\"; export let b = 2;"),
        ],
    );
    ctx.eval("init", "sideEffects = 0;").unwrap();
    let value = ctx
        .eval(
            "main",
            "import { a } from \"one\"; import { b } from \"two\"; sideEffects",
        )
        .unwrap();
    assert_eq!(value, Value::Int(1));
}

#[test]
fn cyclic_imports_expose_partial_bindings() {
    // a imports b while b (transitively) imports a again; the uninitialised
    // const read throws a ReferenceError.
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(
        &runtime,
        &[
            (
                "a",
                "import { fromB } from \"b\";\n\
                 export const fromA = 'A';\n\
                 export let sawB = fromB;",
            ),
            (
                "b",
                "import { fromA } from \"a\";\n\
                 export const fromB = 'B';\n\
                 probe = (function(){ try { return fromA; } catch (e) { return e.name; } })();",
            ),
        ],
    );
    ctx.eval("main", "import { sawB } from \"a\"; result = sawB;").unwrap();
    let probe = ctx.eval("check", "probe").unwrap();
    let result = ctx.eval("check2", "result").unwrap();
    // b ran while a's const was still a hole.
    assert_eq!(ctx.display(&probe), "ReferenceError");
    assert_eq!(ctx.display(&result), "B");
}

#[test]
fn eval_by_path_uses_loader_and_cache() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(&runtime, &[("entry", "hits = hits + 1; hits")]);
    ctx.eval("init", "hits = 0;").unwrap();
    let first = ctx.eval_by_path("entry").unwrap();
    assert_eq!(first, Value::Int(1));
    // Cached: the body does not run again.
    ctx.eval_by_path("entry").unwrap();
    let hits = ctx.eval("check", "hits").unwrap();
    assert_eq!(hits, Value::Int(1));
}

#[test]
fn missing_module_is_an_error() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(&runtime, &[]);
    let err = ctx.eval("main", "import { x } from \"nowhere\";").unwrap_err();
    assert!(err.message.contains("nowhere"), "unexpected message: {}", err.message);
}

#[test]
fn dynamic_import_returns_a_promise() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(&runtime, &[("m", "export let v = 5;")]);
    ctx.eval(
        "main",
        "import(\"m\").then(ns => { got = ns.v; });",
    )
    .unwrap();
    let got = ctx.eval("check", "got").unwrap();
    assert_eq!(got, Value::Int(5));
}

#[test]
fn export_list_and_rename() {
    let runtime = Runtime::new();
    let mut ctx = context_with_modules(
        &runtime,
        &[(
            "m",
            "let inner = 7;\n\
             function twice(n) { return n * 2; }\n\
             export { inner, twice as double };",
        )],
    );
    let value = ctx
        .eval("main", "import { inner, double } from \"m\"; double(inner)")
        .unwrap();
    assert_eq!(value, Value::Int(14));
}

#[test]
fn module_syntax_errors_carry_position() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx.eval("broken", "let = 1;").unwrap_err();
    assert_eq!(err.name, "SyntaxError");
    assert!(!err.stack.is_empty());
    assert_eq!(err.stack[0].module, "broken");
    assert_eq!(err.stack[0].line, 1);
}
