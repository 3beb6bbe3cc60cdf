//! End-to-end interpreter tests: arithmetic, closures, control flow,
//! classes, generators, and exception semantics, all through the public
//! embedding API.

use pretty_assertions::assert_eq;
use skiff::{Context, Runtime, Value};

fn eval(source: &str) -> (String, Value) {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let value = match ctx.eval("main", source) {
        Ok(value) => value,
        Err(exception) => panic!("eval failed: {exception}\nsource:\n{source}"),
    };
    (ctx.display(&value), value)
}

fn eval_display(source: &str) -> String {
    eval(source).0
}

#[test]
fn arithmetic_basics() {
    assert_eq!(eval("1 + 2 * 3").1, Value::Int(7));
    assert_eq!(eval_display("10 / 4"), "2.5");
    assert_eq!(eval("12 / 4").1, Value::Int(3));
    assert_eq!(eval("7 % 3").1, Value::Int(1));
    assert_eq!(eval("2 ** 10").1, Value::Int(1024));
    assert_eq!(eval("1 + 2 === 3").1, Value::Bool(true));
    assert_eq!(eval("0.1 + 0.2 !== 0.3").1, Value::Bool(true));
    assert_eq!(eval("0.1 + 0.2 === 0.30000000000000004").1, Value::Bool(true));
    assert_eq!(eval_display("'a' + 1"), "a1");
    assert_eq!(eval_display("1 + '1'"), "11");
}

#[test]
fn number_specials() {
    assert_eq!(eval("NaN !== NaN").1, Value::Bool(true));
    assert_eq!(eval("1 / 0 === Infinity").1, Value::Bool(true));
    assert_eq!(eval_display("typeof null"), "object");
    assert_eq!(eval_display("typeof undefined"), "undefined");
    assert_eq!(eval_display("typeof 1.5"), "number");
    assert_eq!(eval_display("typeof 'x'"), "string");
    assert_eq!(eval_display("typeof (() => 1)"), "function");
    assert_eq!(eval_display("typeof notDeclaredAnywhere"), "undefined");
}

#[test]
fn loose_and_strict_equality() {
    assert_eq!(eval("1 == '1'").1, Value::Bool(true));
    assert_eq!(eval("1 === '1'").1, Value::Bool(false));
    assert_eq!(eval("null == undefined").1, Value::Bool(true));
    assert_eq!(eval("null === undefined").1, Value::Bool(false));
    assert_eq!(eval("true == 1").1, Value::Bool(true));
    assert_eq!(eval("'abc' === 'ab' + 'c'").1, Value::Bool(true));
}

#[test]
fn bitwise_and_shifts() {
    assert_eq!(eval("(5 & 3) === 1 && (5 | 3) === 7 && (5 ^ 3) === 6").1, Value::Bool(true));
    assert_eq!(eval("1 << 4").1, Value::Int(16));
    assert_eq!(eval("-8 >> 1").1, Value::Int(-4));
    assert_eq!(eval("-1 >>> 28").1, Value::Int(15));
    assert_eq!(eval("~5").1, Value::Int(-6));
}

#[test]
fn string_for_loop_builds_value() {
    assert_eq!(eval_display("let s=''; for(let i=0;i<3;i++) s += i; s"), "012");
}

#[test]
fn fibonacci_recursion() {
    assert_eq!(
        eval("function fib(n){return n<2?n:fib(n-1)+fib(n-2);} fib(10)").1,
        Value::Int(55)
    );
}

#[test]
fn closures_share_the_captured_cell() {
    assert_eq!(
        eval(
            "function f(){let x=0; return function(){return ++x;};}\n\
             let g=f();\n\
             g()===1 && g()===2 && g()===3"
        )
        .1,
        Value::Bool(true)
    );
}

#[test]
fn two_closures_alias_one_variable() {
    assert_eq!(
        eval(
            "function make(){let n=0; return [function(){n+=1; return n;}, function(){return n;}];}\n\
             let pair=make(); pair[0](); pair[0]();\n\
             pair[1]()"
        )
        .1,
        Value::Int(2)
    );
}

#[test]
fn capture_chain_through_intermediate_function() {
    // `inner` reads `x` defined two function levels up; the middle level
    // relays the cell.
    assert_eq!(
        eval(
            "function outer(){\n\
               let x = 7;\n\
               function middle(){\n\
                 function inner(){ return x; }\n\
                 return inner;\n\
               }\n\
               return middle();\n\
             }\n\
             outer()()"
        )
        .1,
        Value::Int(7)
    );
}

#[test]
fn arrow_functions_capture_this() {
    assert_eq!(
        eval(
            "let obj = {\n\
               n: 5,\n\
               collect() { let f = () => this.n * 2; return f(); }\n\
             };\n\
             obj.collect()"
        )
        .1,
        Value::Int(10)
    );
}

#[test]
fn generators_yield_and_finish() {
    assert_eq!(
        eval(
            "function* g(){yield 1; yield 2;}\n\
             let it=g();\n\
             it.next().value===1 && it.next().value===2 && it.next().done===true"
        )
        .1,
        Value::Bool(true)
    );
}

#[test]
fn generator_receives_sent_values() {
    assert_eq!(
        eval(
            "function* echo(){ let got = yield 'first'; yield got; }\n\
             let it = echo();\n\
             it.next();\n\
             it.next(42).value"
        )
        .1,
        Value::Int(42)
    );
}

#[test]
fn generator_return_closes() {
    assert_eq!(
        eval(
            "function* g(){yield 1; yield 2;}\n\
             let it=g(); it.next();\n\
             let r = it.return(9);\n\
             r.value === 9 && r.done === true && it.next().done === true"
        )
        .1,
        Value::Bool(true)
    );
}

#[test]
fn yield_delegate_drains_inner_iterable() {
    assert_eq!(
        eval_display(
            "function* inner(){ yield 'b'; yield 'c'; }\n\
             function* outer(){ yield 'a'; yield* inner(); yield 'd'; }\n\
             let s='';\n\
             for (v of outer()) s += v;\n\
             s"
        ),
        "abcd"
    );
}

#[test]
fn for_of_over_arrays_and_strings() {
    assert_eq!(eval_display("let s=''; for (v of [1,2,3]) s += v; s"), "123");
    assert_eq!(eval_display("let s=''; for (c of 'xyz') s += c + '-'; s"), "x-y-z-");
}

#[test]
fn for_in_iterates_insertion_ordered_keys() {
    assert_eq!(eval_display("let o={a:1,b:2,c:3}; let ks=''; for (k in o) ks += k; ks"), "abc");
    assert_eq!(eval_display("let ks=''; for (k in [9,8]) ks += k; ks"), "01");
}

#[test]
fn try_catch_returns_thrown_value() {
    assert_eq!(
        eval("function t(){ try { throw 42; } catch(e) { return e; } } t()").1,
        Value::Int(42)
    );
}

#[test]
fn finally_runs_on_all_exits() {
    // Normal exit.
    assert_eq!(
        eval_display("let log=''; try { log += 'b'; } finally { log += 'f'; } log"),
        "bf"
    );
    // Exceptional exit.
    assert_eq!(
        eval_display(
            "let log='';\n\
             try { try { throw 1; } finally { log += 'f'; } } catch(e) { log += 'c'; }\n\
             log"
        ),
        "fc"
    );
    // Return exit.
    assert_eq!(
        eval_display(
            "let log='';\n\
             function f(){ try { return 'r'; } finally { log += 'f'; } }\n\
             let r = f();\n\
             log + r"
        ),
        "fr"
    );
}

#[test]
fn break_through_finally() {
    assert_eq!(
        eval_display(
            "let log=[];\n\
             for(let i=0;i<3;i++){ try { if(i===1) break; } finally { log.push(i); } }\n\
             log.join(',')"
        ),
        "0,1"
    );
}

#[test]
fn finally_overrides_pending_return() {
    assert_eq!(
        eval("function f(){ try { return 1; } finally { return 2; } } f()").1,
        Value::Int(2)
    );
}

#[test]
fn catch_rethrow_reaches_outer_handler() {
    assert_eq!(
        eval_display(
            "let seen='';\n\
             try {\n\
               try { throw 'x'; } catch(e) { seen += 'inner'; throw e; }\n\
             } catch(e) { seen += '-outer-' + e; }\n\
             seen"
        ),
        "inner-outer-x"
    );
}

#[test]
fn uncaught_exception_reports_error() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx.eval("main", "function f(){ throw new TypeError('bad'); } f()").unwrap_err();
    assert_eq!(err.name, "TypeError");
    assert_eq!(err.message, "bad");
}

#[test]
fn labelled_continue_and_break() {
    assert_eq!(
        eval_display(
            "let s='';\n\
             outer: for (let i=0;i<3;i++) {\n\
               for (let j=0;j<3;j++) {\n\
                 if (j===1) continue outer;\n\
                 s += '' + i + j;\n\
               }\n\
             }\n\
             s"
        ),
        "001020"
    );
    assert_eq!(
        eval_display(
            "let s='';\n\
             outer: for (let i=0;i<3;i++) {\n\
               for (let j=0;j<3;j++) { if (i===1) break outer; s += '' + i + j; }\n\
             }\n\
             s"
        ),
        "000102"
    );
}

#[test]
fn switch_with_fallthrough_and_default() {
    let source = "function pick(x){\n\
                    let out='';\n\
                    switch(x){\n\
                      case 1: out += 'one ';\n\
                      case 2: out += 'two'; break;\n\
                      default: out = 'other';\n\
                    }\n\
                    return out;\n\
                  }\n";
    assert_eq!(eval_display(&format!("{source} pick(1)")), "one two");
    assert_eq!(eval_display(&format!("{source} pick(2)")), "two");
    assert_eq!(eval_display(&format!("{source} pick(9)")), "other");
}

#[test]
fn do_while_runs_at_least_once() {
    assert_eq!(eval("let n=0; do { n++; } while (false); n").1, Value::Int(1));
}

#[test]
fn template_literals_and_nesting() {
    assert_eq!(eval_display("let x=5; `v=${x + 1}!`"), "v=6!");
    assert_eq!(eval_display("let a='A', b='B'; `1${`2${b}`}3${a}`"), "12B3A");
    assert_eq!(eval_display("`${ {k: 1}.k }`"), "1");
}

#[test]
fn objects_and_property_access() {
    assert_eq!(eval("let o = {a: 1, ['b' + 'x']: 2}; o.a + o.bx").1, Value::Int(3));
    assert_eq!(eval("let o = {n: 1}; o.n = 5; o['n'] + 1").1, Value::Int(6));
    assert_eq!(eval_display("let o = {}; '' + o.missing"), "undefined");
    assert_eq!(eval("let o = {a:{b:{c:7}}}; o.a.b.c").1, Value::Int(7));
    assert_eq!(eval("'a' in {a:1} && !('b' in {a:1})").1, Value::Bool(true));
    assert_eq!(eval("let o={x:1}; delete o.x; o.x === undefined").1, Value::Bool(true));
}

#[test]
fn object_shorthand_and_methods() {
    assert_eq!(
        eval("let v = 3; let o = {v, double(){ return this.v * 2; }}; o.double()").1,
        Value::Int(6)
    );
}

#[test]
fn getters_and_setters_in_object_literals() {
    assert_eq!(
        eval(
            "let o = { _v: 1, get v(){ return this._v; }, set v(n){ this._v = n * 2; } };\n\
             o.v = 4;\n\
             o.v"
        )
        .1,
        Value::Int(8)
    );
}

#[test]
fn arrays_basics() {
    assert_eq!(eval("[1,2,3].length").1, Value::Int(3));
    assert_eq!(eval("let a=[1,2]; a.push(3); a[2]").1, Value::Int(3));
    assert_eq!(eval_display("[1,2,3].join('-')"), "1-2-3");
    assert_eq!(eval("let a=[]; a[3] = 9; a.length").1, Value::Int(4));
    assert_eq!(eval("[5,6,7].indexOf(6)").1, Value::Int(1));
    assert_eq!(eval_display("[0, ...[1,2], 3].join('')"), "0123");
}

#[test]
fn spread_in_calls() {
    assert_eq!(
        eval("function add(x,y,z){return x+y+z;} let a=[1,2]; add(...a, 3)").1,
        Value::Int(6)
    );
}

#[test]
fn string_methods() {
    assert_eq!(eval_display("'Hello World'.toUpperCase()"), "HELLO WORLD");
    assert_eq!(eval_display("'a,b,c'.split(',').join('|')"), "a|b|c");
    assert_eq!(eval("'hello'.indexOf('ll')").1, Value::Int(2));
    assert_eq!(eval_display("'  pad  '.trim()"), "pad");
    assert_eq!(eval_display("'abcdef'.slice(1, -1)"), "bcde");
    assert_eq!(eval("'ha'.repeat(3) === 'hahaha'").1, Value::Bool(true));
    assert_eq!(eval("'abc'.length").1, Value::Int(3));
    assert_eq!(eval_display("'abc'[1]"), "b");
}

#[test]
fn classes_with_inheritance_and_super() {
    assert_eq!(
        eval(
            "class A {\n\
               constructor(x){ this.x = x; }\n\
               getX(){ return this.x; }\n\
               static make(v){ return new A(v); }\n\
               get double(){ return this.x * 2; }\n\
             }\n\
             class B extends A {\n\
               constructor(x){ super(x); }\n\
               getX(){ return super.getX() + 1; }\n\
             }\n\
             let b = new B(5);\n\
             b.getX() === 6 && A.make(3).getX() === 3 && new A(4).double === 8\n\
               && (b instanceof B) && (b instanceof A)"
        )
        .1,
        Value::Bool(true)
    );
}

#[test]
fn class_fields_initialise_per_instance() {
    assert_eq!(
        eval(
            "class Counter {\n\
               count = 10;\n\
               static created = 'yes';\n\
               bump(){ return ++this.count; }\n\
             }\n\
             let c = new Counter();\n\
             c.bump(); c.bump();\n\
             let d = new Counter();\n\
             c.count === 12 && d.count === 10 && Counter.created === 'yes'"
        )
        .1,
        Value::Bool(true)
    );
}

#[test]
fn class_constructor_requires_new() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx.eval("main", "class A {} A()").unwrap_err();
    assert_eq!(err.name, "TypeError");
}

#[test]
fn plain_function_constructors() {
    assert_eq!(
        eval(
            "function Point(x, y){ this.x = x; this.y = y; }\n\
             let p = new Point(3, 4);\n\
             let q = new Point(1, 2);\n\
             p.x + p.y + q.x === 8 && (p instanceof Point)"
        )
        .1,
        Value::Bool(true)
    );
}

#[test]
fn optional_chaining_short_circuits_per_step() {
    assert_eq!(eval("let o = null; o?.x === undefined").1, Value::Bool(true));
    assert_eq!(eval("let o = {a: null}; o.a?.b === undefined").1, Value::Bool(true));
    assert_eq!(eval("let o = {a: {b: 3}}; o.a?.b").1, Value::Int(3));
    assert_eq!(eval("let o = {}; o.f?.() === undefined").1, Value::Bool(true));
    assert_eq!(eval("let o = {f(){ return 9; }}; o.f?.()").1, Value::Int(9));
    // The skipped step does not evaluate its key expression.
    assert_eq!(
        eval_display("let hit=''; let o=null; o?.[hit = 'evaluated']; hit"),
        ""
    );
}

#[test]
fn nullish_and_logical_operators() {
    assert_eq!(eval("null ?? 5").1, Value::Int(5));
    assert_eq!(eval("0 ?? 5").1, Value::Int(0));
    assert_eq!(eval("0 || 5").1, Value::Int(5));
    assert_eq!(eval("1 && 5").1, Value::Int(5));
    assert_eq!(eval_display("'' || 'fallback'"), "fallback");
    // Short circuit: the right side must not run.
    assert_eq!(eval_display("let hit=''; true || (hit='x'); hit"), "");
    assert_eq!(eval_display("let hit=''; false && (hit='x'); hit"), "");
}

#[test]
fn update_and_compound_assignment() {
    assert_eq!(eval("let x = 1; x++ === 1 && x === 2 && ++x === 3").1, Value::Bool(true));
    assert_eq!(eval("let x = 10; x -= 4; x *= 2; x").1, Value::Int(12));
    assert_eq!(eval("let o = {n: 1}; o.n++; ++o.n; o.n").1, Value::Int(3));
    assert_eq!(eval("let a = [5]; a[0] += 2; a[0]").1, Value::Int(7));
    assert_eq!(eval("let x = '5'; x++; x").1, Value::Int(6));
}

#[test]
fn sequence_and_conditional() {
    assert_eq!(eval("(1, 2, 3)").1, Value::Int(3));
    assert_eq!(eval("true ? 1 : 2").1, Value::Int(1));
    assert_eq!(eval("false ? 1 : true ? 2 : 3").1, Value::Int(2));
}

#[test]
fn bigint_arithmetic_and_mixing() {
    assert_eq!(eval("10n + 20n === 30n").1, Value::Bool(true));
    assert_eq!(eval_display("typeof 10n"), "bigint");
    assert_eq!(eval("2n ** 70n > 1000000000000000000n").1, Value::Bool(true));
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let err = ctx.eval("main", "1n + 1").unwrap_err();
    assert_eq!(err.name, "TypeError");
}

#[test]
fn json_round_trip() {
    assert_eq!(
        eval("let v = JSON.parse('{\"a\": [1, 2.5, null, true, \"s\"]}'); v.a[1]").1,
        Value::Float(2.5)
    );
    assert_eq!(
        eval_display("JSON.stringify({b: [1, 'x'], n: null})"),
        "{\"b\":[1,\"x\"],\"n\":null}"
    );
    assert_eq!(eval_display("try { JSON.parse('bad'); } catch(e) { e.name }"), "SyntaxError");
}

#[test]
fn math_builtins() {
    assert_eq!(eval_display("Math.floor(2.7)"), "2");
    assert_eq!(eval_display("Math.max(1, 9, 4)"), "9");
    assert_eq!(eval_display("Math.abs(-3)"), "3");
    assert_eq!(eval("Math.sqrt(144) === 12").1, Value::Bool(true));
    assert_eq!(eval("let r = Math.random(); r >= 0 && r < 1").1, Value::Bool(true));
}

#[test]
fn object_statics() {
    assert_eq!(eval_display("Object.keys({x:1, y:2}).join(',')"), "x,y");
    assert_eq!(eval("Object.freeze({a:1}).a").1, Value::Int(1));
    assert_eq!(
        eval("let o = Object.freeze({a:1}); o.a = 99; o.a").1,
        Value::Int(1)
    );
    assert_eq!(eval("Array.isArray([]) && !Array.isArray({})").1, Value::Bool(true));
}

#[test]
fn recursion_limit_is_a_range_error() {
    assert_eq!(
        eval_display("function r(){ return r(); } try { r(); } catch(e) { e.name }"),
        "RangeError"
    );
}

#[test]
fn regex_literals_carry_source_and_flags() {
    assert_eq!(eval_display("let re = /a[/]b+/gi; re.source"), "a[/]b+");
    assert_eq!(eval_display("let re = /x/gi; re.flags"), "gi");
    // `/` after an identifier stays division.
    assert_eq!(eval("let a=10, b=5, g=2; a/b/g").1, Value::Int(1));
}

#[test]
fn host_native_functions() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    ctx.add_native_function("addInts", |_ctx, _this, args| {
        match (args.first(), args.get(1)) {
            (Some(Value::Int(a)), Some(Value::Int(b))) => Ok(Value::Int(a + b)),
            _ => Err("addInts requires two integers".to_owned()),
        }
    });
    let value = ctx.eval("main", "addInts(20, 22)").unwrap();
    assert_eq!(value, Value::Int(42));
    let err = ctx.eval("main2", "addInts('x')").unwrap_err();
    assert_eq!(err.message, "addInts requires two integers");
}

#[test]
fn console_log_goes_to_print_writer() {
    use std::sync::{Arc, Mutex};

    struct SharedPrint(Arc<Mutex<Vec<String>>>);
    impl skiff::PrintWriter for SharedPrint {
        fn print(&mut self, line: &str) {
            self.0.lock().expect("print lock").push(line.to_owned());
        }
    }

    let lines = Arc::new(Mutex::new(Vec::new()));
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    ctx.set_print_writer(Box::new(SharedPrint(Arc::clone(&lines))));
    ctx.eval("main", "console.log('a', 1, [2, 3]); console.log('next');").unwrap();
    let lines = lines.lock().expect("print lock");
    assert_eq!(*lines, vec!["a 1 2,3".to_owned(), "next".to_owned()]);
}

#[test]
fn interrupt_flag_stops_tight_loops() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    let handle = ctx.interrupt_handle();
    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        handle.interrupt();
    });
    let err = ctx.eval("main", "while (true) {}").unwrap_err();
    assert!(err.interrupted, "expected an interrupted exception, got: {err}");
    interrupter.join().expect("interrupter thread");
}

#[test]
fn globals_persist_across_evals() {
    let runtime = Runtime::new();
    let mut ctx = Context::new(&runtime);
    ctx.eval("a", "counter = 10;").unwrap();
    let value = ctx.eval("b", "counter + 1").unwrap();
    assert_eq!(value, Value::Int(11));
}

#[test]
fn void_and_delete_and_comma() {
    assert_eq!(eval("void 42 === undefined").1, Value::Bool(true));
    assert_eq!(eval("typeof (void 0)").0, "undefined");
}
