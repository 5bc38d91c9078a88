use tjunkie::error::LoxError;

/// Run `src`, returning everything it printed and how it ended.
fn run(src: &str) -> (String, Result<(), LoxError>) {
    let mut out: Vec<u8> = Vec::new();
    let result = tjunkie::run(src, &mut out);

    (String::from_utf8(out).unwrap(), result)
}

fn output(src: &str) -> String {
    let (out, result) = run(src);

    if let Err(e) = result {
        panic!("program failed: {}\noutput so far:\n{}", e, out);
    }

    out
}

fn runtime_error(src: &str) -> (String, String) {
    let (out, result) = run(src);

    match result {
        Err(e @ LoxError::Runtime { .. }) => (out, e.to_string()),
        other => panic!("expected runtime error, got {:?}", other),
    }
}

// ─────────────────────────────── values ───────────────────────────────────

#[test]
fn test_arithmetic_and_number_formatting() {
    assert_eq!(
        output("print 1 + 2; print 7 / 2; print 2.50; print -3 * 2; print 10 - 0.5;"),
        "3\n3.5\n2.5\n-6\n9.5\n"
    );
}

#[test]
fn test_division_follows_ieee() {
    assert_eq!(
        output("print 1 / 0; print -1 / 0; print 0 / 0;"),
        "Infinity\n-Infinity\nNaN\n"
    );
}

#[test]
fn test_large_and_small_numbers_use_exponent_form() {
    assert_eq!(
        output(
            "print 1000000 * 1000000 * 1000000 * 1000; print 1 / 10000000;
             print 12345678; print 9999999; print 0.001; print -0.0001;"
        ),
        "1.0E21\n1.0E-7\n1.2345678E7\n9999999\n0.001\n-1.0E-4\n"
    );
}

#[test]
fn test_string_concatenation() {
    assert_eq!(output("print \"foo\" + \"bar\";"), "foobar\n");
}

#[test]
fn test_equality() {
    assert_eq!(
        output(
            "print nil == nil; print 1 == 1; print 1 == \"1\"; print \"a\" != \"b\";
             print nil == false; print 0 / 0 == 0 / 0;"
        ),
        "true\ntrue\nfalse\ntrue\nfalse\ntrue\n"
    );
}

#[test]
fn test_truthiness() {
    assert_eq!(
        output("print !nil; print !false; print !0; print !\"\"; print !!true;"),
        "true\ntrue\nfalse\nfalse\ntrue\n"
    );
}

#[test]
fn test_logical_operators_return_an_operand() {
    assert_eq!(
        output(
            "print nil or \"x\"; print 1 and 2; print false and missing; print \"y\" or missing;"
        ),
        "x\n2\nfalse\ny\n"
    );
}

#[test]
fn test_comparison() {
    assert_eq!(
        output("print 1 < 2; print 2 <= 2; print 3 > 4; print 4 >= 5;"),
        "true\ntrue\nfalse\nfalse\n"
    );
}

// ─────────────────────────── variables & scope ────────────────────────────

#[test]
fn test_block_shadowing() {
    assert_eq!(
        output("var a = \"outer\"; { var a = \"inner\"; print a; } print a;"),
        "inner\nouter\n"
    );
}

#[test]
fn test_uninitialized_variable_is_nil() {
    assert_eq!(output("var a; print a;"), "nil\n");
}

#[test]
fn test_assignment_is_an_expression() {
    assert_eq!(output("var a; var b; a = b = 3; print a + b;"), "6\n");
}

#[test]
fn test_closures_see_declaration_scope() {
    let src = r#"
        var a = "global";
        {
            fun showA() { print a; }
            showA();
            var a = "block";
            showA();
        }
    "#;

    assert_eq!(output(src), "global\nglobal\n");
}

#[test]
fn test_control_flow() {
    let src = r#"
        var i = 0;
        while (i < 3) { print i; i = i + 1; }
        for (var j = 10; j > 8; j = j - 1) print j;
        if (i == 3) print "yes"; else print "no";
        if (nil) print "no"; else print "else";
    "#;

    assert_eq!(output(src), "0\n1\n2\n10\n9\nyes\nelse\n");
}

// ─────────────────────────────── functions ────────────────────────────────

#[test]
fn test_counter_closure() {
    let src = r#"
        fun makeCounter() {
            var i = 0;
            fun count() {
                i = i + 1;
                print i;
            }
            return count;
        }

        var counter = makeCounter();
        counter();
        counter();
        var other = makeCounter();
        other();
    "#;

    assert_eq!(output(src), "1\n2\n1\n");
}

#[test]
fn test_closure_outlives_its_block() {
    let src = r#"
        var f;
        {
            var y = "block";
            fun g() { print y; }
            f = g;
        }
        { var z = "reuse"; }
        f();
    "#;

    assert_eq!(output(src), "block\n");
}

#[test]
fn test_loop_body_frames_are_fresh_per_iteration() {
    let src = r#"
        var first;
        var second;
        for (var i = 0; i < 2; i = i + 1) {
            var j = i;
            fun body() { print j; }
            fun loop() { print i; }
            if (i == 0) first = body; else second = loop;
        }
        first();
        second();
    "#;

    assert_eq!(output(src), "0\n2\n");
}

#[test]
fn test_recursion() {
    let src = r#"
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print fib(15);
    "#;

    assert_eq!(output(src), "610\n");
}

#[test]
fn test_return_unwinds_nested_loops() {
    let src = r#"
        fun find() {
            for (var i = 0; i < 10; i = i + 1) {
                while (true) {
                    if (i == 4) return i;
                    i = i + 1;
                }
            }
            return -1;
        }
        print find();
    "#;

    assert_eq!(output(src), "4\n");
}

#[test]
fn test_function_without_return_yields_nil() {
    assert_eq!(output("fun f() {} print f(); fun g() { return; } print g();"), "nil\nnil\n");
}

#[test]
fn test_callable_display() {
    assert_eq!(
        output("fun f() {} print f; print clock; class K {} print K; print K();"),
        "<fn f>\n<native fn>\nK\nK instance\n"
    );
}

#[test]
fn test_natives() {
    assert_eq!(
        output("print pi(); print div(5); print clock() > 0;"),
        "3.14159265359\n2.5\ntrue\n"
    );

    assert_eq!(
        output("print iel();"),
        "Pronom personnel sujet de la troisième personne du singulier et du pluriel, \n \
         employé pour évoquer une personne quel que soit son genre.\n"
    );
}

// ──────────────────────────────── classes ─────────────────────────────────

#[test]
fn test_methods_and_fields() {
    let src = r#"
        class Bagel {
            eat() { print "Crunch crunch crunch!"; }
        }
        var b = Bagel();
        b.eat();
        b.topping = "seeds";
        print b.topping;
    "#;

    assert_eq!(output(src), "Crunch crunch crunch!\nseeds\n");
}

#[test]
fn test_fields_shadow_methods() {
    let src = r#"
        class A { m() { return "method"; } }
        var a = A();
        print a.m();
        a.m = "field";
        print a.m;
    "#;

    assert_eq!(output(src), "method\nfield\n");
}

#[test]
fn test_bound_method_keeps_this() {
    let src = r#"
        class Point {
            init(n) { this.n = n; }
            get() { return this.n; }
        }
        var g = Point(3).get;
        print g();
    "#;

    assert_eq!(output(src), "3\n");
}

#[test]
fn test_closure_inside_method_keeps_this_alive() {
    let src = r#"
        class A {
            init(name) { this.name = name; }
            later() {
                fun say() { print this.name; }
                return say;
            }
        }
        var say = A("kept").later();
        { var churn = 1; }
        A("other").later();
        say();
    "#;

    assert_eq!(output(src), "kept\n");
}

#[test]
fn test_initializer_returns_this() {
    let src = r#"
        class Foo {
            init() {
                this.x = 1;
                return;
                this.x = 2;
            }
        }
        var f = Foo();
        print f.x;
        print f.init();
        print f.x;
    "#;

    assert_eq!(output(src), "1\nFoo instance\n1\n");
}

#[test]
fn test_inheritance_and_super() {
    let src = r#"
        class A {
            method() { print "A method"; }
        }
        class B < A {
            method() { print "B method"; }
            test() { super.method(); }
        }
        class C < B {}
        C().test();
        C().method();
    "#;

    assert_eq!(output(src), "A method\nB method\n");
}

#[test]
fn test_inherited_initializer() {
    let src = r#"
        class Base { init(x) { this.x = x; } }
        class Derived < Base {
            init(x, y) { super.init(x); this.y = y; }
        }
        var d = Derived(1, 2);
        print d.x + d.y;
        class Plain < Base {}
        print Plain(9).x;
    "#;

    assert_eq!(output(src), "3\n9\n");
}

#[test]
fn test_instances_compare_by_identity() {
    let src = r#"
        class A {}
        var a = A();
        var b = a;
        print a == b;
        print a == A();
    "#;

    assert_eq!(output(src), "true\nfalse\n");
}

// ───────────────────────────── runtime errors ─────────────────────────────

#[test]
fn test_mixed_plus_operands() {
    let (out, err) = runtime_error("print \"before\";\nprint \"a\" + 1;\nprint \"after\";");

    assert_eq!(out, "before\n");
    assert_eq!(
        err,
        "[line 2] Runtime error: Operands of '+' must be two numbers or two strings."
    );
}

#[test]
fn test_operand_type_errors() {
    assert_eq!(
        runtime_error("print -\"a\";").1,
        "[line 1] Runtime error: Operand must be a number."
    );
    assert_eq!(
        runtime_error("print 1 < \"a\";").1,
        "[line 1] Runtime error: Operands of '<' must be numbers."
    );
}

#[test]
fn test_arity_mismatch_halts() {
    let (out, err) = runtime_error("fun f(a, b) {}\nf(1);\nprint \"unreachable\";");

    assert_eq!(out, "");
    assert_eq!(err, "[line 2] Runtime error: Expected 2 arguments but got 1.");

    assert_eq!(
        runtime_error("class A { init(x) {} } A();").1,
        "[line 1] Runtime error: Expected 1 arguments but got 0."
    );
}

#[test]
fn test_name_and_property_errors() {
    assert_eq!(
        runtime_error("print missing;").1,
        "[line 1] Runtime error: Undefined variable 'missing'."
    );
    assert_eq!(
        runtime_error("missing = 1;").1,
        "[line 1] Runtime error: Undefined variable 'missing'."
    );
    assert_eq!(
        runtime_error("class A {} A().x;").1,
        "[line 1] Runtime error: Undefined property 'x'."
    );
    assert_eq!(
        runtime_error("var a = 1; a.x;").1,
        "[line 1] Runtime error: Only instances have properties."
    );
    assert_eq!(
        runtime_error("var a = 1; a.x = 2;").1,
        "[line 1] Runtime error: Only instances have fields."
    );
    assert_eq!(
        runtime_error("\"str\"();").1,
        "[line 1] Runtime error: Can only call functions and classes."
    );
}

#[test]
fn test_superclass_must_be_a_class() {
    assert_eq!(
        runtime_error("var NotAClass = 1;\nclass A < NotAClass {}").1,
        "[line 2] Runtime error: Superclass must be a class."
    );
}

#[test]
fn test_native_argument_error() {
    assert_eq!(
        runtime_error("div(\"x\");").1,
        "[line 1] Runtime error: Operands must be numbers."
    );
}

// ───────────────────────────── static errors ──────────────────────────────

#[test]
fn test_static_errors_prevent_execution() {
    for src in [
        "print \"hi\"; var = 1;",
        "print \"hi\"; return 1;",
        "print \"hi\"; var a = a;",
        "print \"hi\"; print @;",
    ] {
        let (out, result) = run(src);

        assert_eq!(out, "", "{} printed output", src);
        match result {
            Err(e @ LoxError::Compile(_)) => assert!(e.is_static()),
            other => panic!("{}: expected compile error, got {:?}", src, other),
        }
    }
}

#[test]
fn test_lex_and_parse_errors_reported_together() {
    let (_, result) = run("print @;\nvar = 2;");

    let Err(LoxError::Compile(errors)) = result else {
        panic!("expected compile error");
    };

    let lines: Vec<Option<usize>> = errors.iter().map(LoxError::line).collect();
    assert!(lines.contains(&Some(1)));
    assert!(lines.contains(&Some(2)));
}
