#[cfg(test)]
mod interpreter_tests {
    use rox::error::{Diagnostics, LoxError};
    use rox::expr::{Expr, LiteralValue};
    use rox::interpreter::Interpreter;
    use rox::lox::{decode_source, on_interpreter_stack, Lox};
    use rox::parser::Parser;
    use rox::scanner::Scanner;
    use rox::value::Value;

    fn output(lox: &Lox<Vec<u8>>) -> String {
        String::from_utf8(lox.interpreter().output().clone()).expect("output is UTF-8")
    }

    /// Run `source` in a fresh session and return (stdout, diagnostics).
    fn run(source: &str) -> (String, Diagnostics) {
        let mut lox = Lox::with_output(Vec::new());
        let diagnostics = lox.run(source);
        (output(&lox), diagnostics)
    }

    /// Run a program that must succeed and return what it printed.
    fn run_ok(source: &str) -> String {
        let (out, diagnostics) = run(source);
        assert!(
            diagnostics.is_empty(),
            "unexpected errors: {:?}",
            diagnostics.errors()
        );
        out
    }

    fn runtime_error(source: &str) -> (String, String) {
        let (out, diagnostics) = run(source);
        assert!(diagnostics.had_runtime_error(), "expected a runtime error");
        assert!(!diagnostics.had_error());
        (out, diagnostics.errors()[0].to_string())
    }

    /// Execute without the resolver pass, looking every name up dynamically.
    fn run_dynamic(source: &str) -> String {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new(source).scan_tokens(&mut diagnostics);
        let statements = Parser::new(tokens).parse(&mut diagnostics);
        assert!(diagnostics.is_empty());

        let mut interpreter = Interpreter::with_output(Vec::new()).with_dynamic_lookup();
        interpreter.interpret(&statements).expect("program runs");

        String::from_utf8(interpreter.output().clone()).expect("output is UTF-8")
    }

    #[test]
    fn test_literals_evaluate_to_themselves() {
        let mut interpreter = Interpreter::with_output(Vec::new());

        for n in [0.0, 1.5, -2.25, 1e10, 123456.789, f64::MAX] {
            let value = interpreter
                .evaluate(&Expr::Literal(LiteralValue::Number(n)))
                .unwrap();
            assert_eq!(value, Value::Number(n));
        }
    }

    #[test]
    fn test_arithmetic_and_concatenation() {
        assert_eq!(
            run_ok("print 1 + 2; print \"a\" + \"b\"; print 2 * 3; print 7 / 2; print -(3); print 10 - 4 - 3;"),
            "3\nab\n6\n3.5\n-3\n3\n"
        );
    }

    #[test]
    fn test_division_follows_ieee() {
        assert_eq!(
            run_ok("print 1 / 0; print -1 / 0; print 0 / 0 == 0 / 0;"),
            "inf\n-inf\nfalse\n"
        );
    }

    #[test]
    fn test_mixed_plus_is_a_type_error() {
        let (out, message) = runtime_error("print 1 + \"a\";");

        assert_eq!(out, "");
        assert_eq!(
            message,
            "Operands must be two numbers or two strings.\n[line 1]"
        );
    }

    #[test]
    fn test_comparison_requires_numbers() {
        let (_, message) = runtime_error("print \"a\" < \"b\";");

        assert_eq!(message, "Operands must be numbers.\n[line 1]");
    }

    #[test]
    fn test_negation_requires_a_number() {
        let (out, message) = runtime_error("print 1;\nprint -\"x\";\nprint 2;");

        // The error aborts the rest of the run.
        assert_eq!(out, "1\n");
        assert_eq!(message, "Operand must be a number.\n[line 2]");
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(
            run_ok("print !nil; print !false; print !0; print !\"\"; print !!true;"),
            "true\ntrue\nfalse\nfalse\ntrue\n"
        );
    }

    #[test]
    fn test_equality_has_no_coercion() {
        assert_eq!(
            run_ok(
                "print nil == nil; print nil == false; print 1 == 1; print \"a\" == \"a\";
                 print 1 == \"1\"; print clock == clock; print 1 != 2;"
            ),
            "true\nfalse\ntrue\ntrue\nfalse\ntrue\ntrue\n"
        );
    }

    #[test]
    fn test_logical_operators_short_circuit_and_return_operands() {
        assert_eq!(
            run_ok(
                "print \"a\" or \"b\"; print nil or \"b\"; print nil and undefined; \
                 print 1 and 2; print false or nil;"
            ),
            "a\nb\nnil\n2\nnil\n"
        );
    }

    #[test]
    fn test_stringification() {
        assert_eq!(
            run_ok("fun foo() {} print 1.5; print 100; print nil; print true; print clock; print foo;"),
            "1.5\n100\nnil\ntrue\n<native fn>\n<fn foo>\n"
        );
    }

    #[test]
    fn test_shadowing_in_blocks() {
        assert_eq!(
            run_ok("var a = 1; { var a = 2; print a; } print a;"),
            "2\n1\n"
        );
    }

    #[test]
    fn test_chained_assignment() {
        assert_eq!(
            run_ok("var a; var b; a = b = 5; print a; print b; print a = 6;"),
            "5\n5\n6\n"
        );
    }

    #[test]
    fn test_undefined_variable() {
        let (_, message) = runtime_error("print nope;");
        assert_eq!(message, "Undefined variable 'nope'.\n[line 1]");

        let (_, message) = runtime_error("nope = 1;");
        assert_eq!(message, "Undefined variable 'nope'.\n[line 1]");
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(
            run_ok(
                "var i = 0; while (i < 3) { if (i == 1) print \"one\"; else print i; i = i + 1; }"
            ),
            "0\none\n2\n"
        );
    }

    #[test]
    fn test_for_loop_prints_in_order() {
        assert_eq!(
            run_ok("for (var i = 0; i < 3; i = i + 1) print i;"),
            "0\n1\n2\n"
        );
    }

    #[test]
    fn test_for_loop_variable_does_not_leak() {
        let (out, message) = runtime_error("for (var i = 0; i < 1; i = i + 1) {} print i;");

        assert_eq!(out, "");
        assert_eq!(message, "Undefined variable 'i'.\n[line 1]");
    }

    #[test]
    fn test_functions_and_recursion() {
        assert_eq!(
            run_ok(
                "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
                 print fib(15);"
            ),
            "610\n"
        );
    }

    #[test]
    fn test_function_without_return_yields_nil() {
        assert_eq!(
            run_ok("fun f() {} fun g() { return; } print f(); print g();"),
            "nil\nnil\n"
        );
    }

    #[test]
    fn test_return_unwinds_nested_statements() {
        assert_eq!(
            run_ok(
                "fun find() {
                   var i = 0;
                   while (true) {
                     { if (i == 3) return i; }
                     i = i + 1;
                   }
                 }
                 print find();
                 print \"after\";"
            ),
            "3\nafter\n"
        );
    }

    #[test]
    fn test_closures_share_state() {
        assert_eq!(
            run_ok(
                "fun makeCounter() {
                   var i = 0;
                   fun count() { i = i + 1; return i; }
                   return count;
                 }
                 var c = makeCounter();
                 print c(); print c();
                 var d = makeCounter();
                 print d(); print c();"
            ),
            "1\n2\n1\n3\n"
        );
    }

    #[test]
    fn test_closure_sees_later_mutation() {
        assert_eq!(
            run_ok("{ var x = 1; fun get() { return x; } x = 2; print get(); }"),
            "2\n"
        );

        assert_eq!(
            run_ok(
                "var counter = 0;
                 var f;
                 for (var i = 0; i < 3; i = i + 1) {
                   fun inc() { counter = counter + i; return counter; }
                   f = inc;
                 }
                 counter = 10;
                 print f();"
            ),
            // Sees both the reassigned counter and the final increment of `i`.
            "13\n"
        );
    }

    #[test]
    fn test_binding_is_lexical_not_dynamic() {
        let program = "var a = \"global\";
                       {
                         fun showA() { print a; }
                         showA();
                         var a = \"block\";
                         showA();
                       }";

        assert_eq!(run_ok(program), "global\nglobal\n");

        // Without the resolver the later local shadows the global.
        assert_eq!(run_dynamic(program), "global\nblock\n");
    }

    #[test]
    fn test_resolver_is_transparent_without_collisions() {
        let program = "var total = 0;
                       fun add(n) { var doubled = n * 2; total = total + doubled; return total; }
                       for (var i = 1; i <= 3; i = i + 1) { print add(i); }
                       { var local = \"x\"; print local + \"y\"; }";

        assert_eq!(run_ok(program), run_dynamic(program));
        assert_eq!(run_ok(program), "2\n6\n12\nxy\n");
    }

    #[test]
    fn test_arity_mismatch() {
        let (_, message) = runtime_error("fun f() {} f(1);");
        assert_eq!(message, "Expected 0 arguments but got 1.\n[line 1]");

        let (_, message) = runtime_error("clock(1, 2);");
        assert_eq!(message, "Expected 0 arguments but got 2.\n[line 1]");
    }

    #[test]
    fn test_calling_a_non_callable() {
        let (_, message) = runtime_error("\"str\"();");

        assert_eq!(message, "Can only call functions.\n[line 1]");
    }

    #[test]
    fn test_clock_returns_seconds() {
        assert_eq!(run_ok("var t = clock(); print t > 1000000000;"), "true\n");
    }

    #[test]
    fn test_static_errors_suppress_execution() {
        let (out, diagnostics) = run("print 1; print ;");
        assert_eq!(out, "");
        assert!(diagnostics.had_error());
        assert!(!diagnostics.had_runtime_error());

        let (out, diagnostics) = run("print 1; { var a = a; }");
        assert_eq!(out, "");
        assert!(diagnostics.had_error());

        let (out, diagnostics) = run("print 1; @");
        assert_eq!(out, "");
        assert!(diagnostics.had_error());
    }

    #[test]
    fn test_top_level_return_ends_the_run() {
        assert_eq!(run_ok("print 1; return; print 2;"), "1\n");
    }

    #[test]
    fn test_session_keeps_globals_between_runs() {
        let mut lox = Lox::with_output(Vec::new());

        assert!(lox.run("var x = 1;").is_empty());
        assert!(lox.run("fun f() { return x + 1; }").is_empty());
        assert!(lox.run("print f();").is_empty());

        // A failing line does not poison the session.
        assert!(lox.run("print ;").had_error());
        assert!(lox.run("x = 41; print f();").is_empty());

        assert_eq!(output(&lox), "2\n42\n");
    }

    #[test]
    fn test_environment_is_restored_after_runtime_error() {
        let mut lox = Lox::with_output(Vec::new());

        let diagnostics = lox.run("var a = \"outer\"; { var a = \"inner\"; print missing; }");
        assert!(diagnostics.had_runtime_error());

        let diagnostics = lox.run("fun f() { var a = \"fn\"; return missing; } f();");
        assert!(diagnostics.had_runtime_error());

        assert!(lox.run("print a;").is_empty());
        assert_eq!(output(&lox), "outer\n");
    }

    #[test]
    fn test_call_depth_guard() {
        let interpreter = Interpreter::with_output(Vec::new()).with_max_call_depth(16);
        let mut lox = Lox::with_interpreter(interpreter);

        let diagnostics = lox.run("fun r(n) { return r(n + 1); } r(0);");
        assert!(diagnostics.had_runtime_error());
        assert_eq!(
            diagnostics.errors()[0].to_string(),
            "Stack overflow.\n[line 1]"
        );

        // Depth is unwound after the error; shallow recursion still works.
        let diagnostics = lox.run(
            "fun down(n) { if (n == 0) return 0; return down(n - 1); } print down(10);",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(output(&lox), "0\n");
    }

    #[test]
    fn test_default_depth_limit_fits_interpreter_stack() {
        let (out, errors) = on_interpreter_stack(|| {
            let mut lox = Lox::with_output(Vec::new());

            let diagnostics = lox.run(
                "fun sum(n) { if (n == 0) return 0; return n + sum(n - 1); }
                 print sum(500);
                 fun r(n) { return r(n + 1); }
                 r(0);",
            );
            let errors: Vec<String> = diagnostics.errors().iter().map(|e| e.to_string()).collect();

            (output(&lox), errors)
        })
        .expect("interpreter thread starts");

        assert_eq!(out, "125250\n");
        assert_eq!(errors, vec!["Stack overflow.\n[line 3]"]);
    }

    #[test]
    fn test_large_whole_numbers_print_shortest_form() {
        assert_eq!(
            run_ok("print 100000000000000000000000; print 10 / 10; print 2.50; print -0;"),
            "100000000000000000000000\n1\n2.5\n-0\n"
        );
    }

    #[test]
    fn test_runtime_errors_are_written_with_program_output() {
        let (_, diagnostics) = run("print 1; print nope;");
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        diagnostics.write_to(&mut out, &mut err).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Undefined variable 'nope'.\n[line 1]\n");
        assert!(err.is_empty());

        let (_, diagnostics) = run("print ;");
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        diagnostics.write_to(&mut out, &mut err).unwrap();

        assert!(out.is_empty());
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "[line 1] Error at ';': Expected expression.\n"
        );
    }

    #[test]
    fn test_source_must_be_utf8() {
        assert_eq!(decode_source(b"print 1;").unwrap(), "print 1;");

        let error = decode_source(b"print \"\xff\";").unwrap_err();
        assert!(matches!(error, LoxError::Utf8(_)));
        assert!(!error.is_static());
    }
}
