//! Async functions, promises, and microtask ordering.

use pretty_assertions::assert_eq;
use skiff::{Context, Runtime, Value};

fn run<'r>(runtime: &'r Runtime, source: &str) -> Context<'r> {
    let mut ctx = Context::new(runtime);
    if let Err(err) = ctx.eval("main", source) {
        panic!("eval failed: {err}\nsource:\n{source}");
    }
    ctx
}

fn global(ctx: &mut Context<'_>, name: &str) -> Value {
    ctx.eval("probe", name).expect("probe eval")
}

#[test]
fn await_of_plain_value_resolves_after_one_turn() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "order = '';\n\
         async function f(){ order += 'a'; let v = await 42; order += 'c'; return v; }\n\
         f().then(v => { got = v; });\n\
         order += 'b';",
    );
    // The body ran to the first await synchronously, the rest on the
    // microtask queue.
    let order = global(&mut ctx, "order");
    assert_eq!(ctx.display(&order), "abc");
    assert_eq!(global(&mut ctx, "got"), Value::Int(42));
}

#[test]
fn async_return_value_resolves_promise() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "async function f(){ return await 40 + 2; }\n\
         f().then(v => { got = v; });",
    );
    assert_eq!(global(&mut ctx, "got"), Value::Int(42));
}

#[test]
fn await_chains_between_async_functions() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "async function inner(){ return await 10; }\n\
         async function outer(){ let a = await inner(); let b = await inner(); return a + b; }\n\
         outer().then(v => { got = v; });",
    );
    assert_eq!(global(&mut ctx, "got"), Value::Int(20));
}

#[test]
fn then_chain_transforms_values() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "Promise.resolve(5).then(v => v * 2).then(v => { got = v + 1; });",
    );
    assert_eq!(global(&mut ctx, "got"), Value::Int(11));
}

#[test]
fn rejection_flows_to_catch() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "Promise.reject('boom').catch(reason => { caught = reason; });",
    );
    let caught = global(&mut ctx, "caught");
    assert_eq!(ctx.display(&caught), "boom");
}

#[test]
fn thrown_error_in_async_body_rejects_the_promise() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "async function f(){ await 1; throw new RangeError('async boom'); }\n\
         f().catch(e => { name = e.name; msg = e.message; });",
    );
    let name = global(&mut ctx, "name");
    assert_eq!(ctx.display(&name), "RangeError");
    let msg = global(&mut ctx, "msg");
    assert_eq!(ctx.display(&msg), "async boom");
}

#[test]
fn try_catch_inside_async_catches_rejection() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "async function boom(){ await 1; throw 'inner'; }\n\
         async function f(){\n\
           try { await boom(); return 'unreached'; } catch (e) { return 'caught:' + e; }\n\
         }\n\
         f().then(v => { got = v; });",
    );
    let got = global(&mut ctx, "got");
    assert_eq!(ctx.display(&got), "caught:inner");
}

#[test]
fn microtasks_run_in_fifo_order() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "order = '';\n\
         Promise.resolve(1).then(() => { order += 'a'; }).then(() => { order += 'c'; });\n\
         Promise.resolve(2).then(() => { order += 'b'; });",
    );
    let order = global(&mut ctx, "order");
    assert_eq!(ctx.display(&order), "abc");
}

#[test]
fn awaiting_an_already_resolved_promise() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "async function f(){ return await Promise.resolve(7); }\n\
         f().then(v => { got = v; });",
    );
    assert_eq!(global(&mut ctx, "got"), Value::Int(7));
}

#[test]
fn async_function_call_returns_a_promise_synchronously() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "async function f(){ await 1; return 2; }\n\
         let p = f();\n\
         isPromise = typeof p === 'object';",
    );
    assert_eq!(global(&mut ctx, "isPromise"), Value::Bool(true));
}

#[test]
fn await_sequences_loop_iterations() {
    let runtime = Runtime::new();
    let mut ctx = run(
        &runtime,
        "async function f(){\n\
           let total = 0;\n\
           for (let i = 1; i <= 4; i++) { total += await i; }\n\
           return total;\n\
         }\n\
         f().then(v => { got = v; });",
    );
    assert_eq!(global(&mut ctx, "got"), Value::Int(10));
}
