//! Error taxonomy and stack-trace formatting at the embedding boundary.

use pretty_assertions::assert_eq;
use skiff::{Context, Runtime};

#[test]
fn runtime_errors_carry_js_frames() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx
        .eval(
            "trace",
            "function inner() { throw new Error('deep'); }\n\
             function outer() { return inner(); }\n\
             outer();",
        )
        .unwrap_err();
    assert_eq!(err.name, "Error");
    assert_eq!(err.message, "deep");
    let functions: Vec<&str> = err.stack.iter().map(|frame| frame.function.as_str()).collect();
    assert_eq!(functions, vec!["inner", "outer", "<module>"]);
    assert_eq!(err.stack[0].module, "trace");
    assert_eq!(err.stack[0].line, 1);
    assert_eq!(err.stack[1].line, 2);
    assert_eq!(err.stack[2].line, 3);
}

#[test]
fn exception_display_renders_stack() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx
        .eval("m", "function f() { throw new TypeError('nope'); } f();")
        .unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.starts_with("TypeError: nope"), "got: {rendered}");
    assert!(rendered.contains("at f (m:1:"), "got: {rendered}");
}

#[test]
fn caught_engine_errors_materialise_as_error_objects() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let value = ctx
        .eval(
            "m",
            "let report;\n\
             try { nonexistentGlobal; } catch (e) { report = e.name + ':' + e.message; }\n\
             report",
        )
        .unwrap();
    assert_eq!(ctx.display(&value), "ReferenceError:nonexistentGlobal is not defined");
}

#[test]
fn error_objects_expose_a_stack_string() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let value = ctx
        .eval(
            "m",
            "function f(){ try { missing; } catch (e) { return typeof e.stack; } }\n\
             f()",
        )
        .unwrap();
    assert_eq!(ctx.display(&value), "string");
}

#[test]
fn non_error_thrown_values_pass_through() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx.eval("m", "throw 'just a string';").unwrap_err();
    assert_eq!(err.name, "Uncaught");
    assert_eq!(err.message, "just a string");

    let err = ctx.eval("m2", "throw {code: 7};").unwrap_err();
    assert_eq!(err.name, "Uncaught");
}

#[test]
fn type_errors_from_bad_calls() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx.eval("m", "let x = 5; x();").unwrap_err();
    assert_eq!(err.name, "TypeError");
    assert!(err.message.contains("not a function"), "got: {}", err.message);

    let err = ctx.eval("m2", "null.prop;").unwrap_err();
    assert_eq!(err.name, "TypeError");
    assert!(err.message.contains("reading 'prop'"), "got: {}", err.message);
}

#[test]
fn reference_error_on_forward_reference() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    // Reading a name before any declaration resolves it.
    let value = ctx
        .eval(
            "m",
            "probe = (function(){ try { return later; } catch (e) { return e.name; } })();\n\
             export const later = 1;\n\
             probe",
        )
        .unwrap();
    assert_eq!(ctx.display(&value), "ReferenceError");
}

#[test]
fn syntax_error_positions() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let cases = [
        ("unterminated string", "let s = 'abc"),
        ("unterminated block comment", "1 + /* comment"),
        ("unterminated regex", "let r = /ab"),
        ("const without initialiser", "const x;"),
        ("bad assignment target", "1 = 2;"),
    ];
    for (label, source) in cases {
        let err = ctx.eval("m", source).unwrap_err();
        assert_eq!(err.name, "SyntaxError", "{label}: expected a SyntaxError, got {err}");
        assert!(!err.stack.is_empty(), "{label}: position missing");
    }
}

#[test]
fn syntax_errors_report_line_and_column() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx.eval("m", "let ok = 1;\nlet bad = 'oops").unwrap_err();
    assert_eq!(err.stack[0].line, 2);
    assert_eq!(err.stack[0].column, 11);
}

#[test]
fn native_frames_render_as_native() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    ctx.add_native_function("explode", |_ctx, _this, _args| Err("native failure".to_owned()));
    let err = ctx.eval("m", "function f(){ explode(); } f();").unwrap_err();
    assert_eq!(err.name, "Error");
    assert_eq!(err.message, "native failure");
    // The JS frames around the native call are present.
    assert!(err.stack.iter().any(|frame| frame.function == "f"));
}
