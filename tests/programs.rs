use amilang::{Error, Options, ParseError, Value, run_source, run_source_with};

fn output_of(program: &str) -> Vec<String> {
    match run_source(program) {
        Ok(outcome) => outcome.output,
        Err(e) => panic!("Program failed:\n{}\nError: {:?}", program, e),
    }
}

fn error_of(program: &str) -> Error {
    match run_source(program) {
        Ok(outcome) => panic!("Program should fail:\n{}\nGot: {:?}", program, outcome),
        Err(e) => e,
    }
}

#[test]
fn loop_with_redeclared_counter_terminates() {
    let program = "
        declare x = 0
        while x < 5 {
            print x
            declare x = x + 1
        }
    ";
    assert_eq!(output_of(program), ["0", "1", "2", "3", "4"]);
}

#[test]
fn function_call_prints_result() {
    let program = "
        function add(a, b) { return a + b }
        print add(10, 20)
    ";
    assert_eq!(output_of(program), ["30"]);
}

#[test]
fn undefined_name_fails_without_later_output() {
    let program = "
        print 'before'
        print missing
        print 'after'
    ";
    let error = error_of(program);
    assert_eq!(error.kind(), "UndefinedNameError");
    assert!(error.to_string().contains("'missing'"));
}

#[test]
fn recursive_fibonacci() {
    let program = "
        function fib(n) {
            if n < 2 { return n }
            return fib(n - 1) + fib(n - 2)
        }
        declare i = 0
        while i < 10 {
            print fib(i)
            declare i = i + 1
        }
    ";
    assert_eq!(
        output_of(program),
        ["0", "1", "1", "2", "3", "5", "8", "13", "21", "34"]
    );
}

#[test]
fn counter_closures_are_independent() {
    let program = "
        function make_adder(step) {
            function add(n) { return n + step }
            return add
        }
        declare add_two = make_adder(2)
        declare add_ten = make_adder(10)
        print add_two(1)
        add_ten(1)
    ";
    let outcome = run_source(program).unwrap();
    assert_eq!(outcome.output, ["3"]);
    assert_eq!(outcome.value, Value::Number(11.0));
}

#[test]
fn strings_and_print_builtin() {
    let program = r#"
        declare name = "Ami"
        declare log = print
        declare nothing
        log("hello", name + "!", 1 / 2, nothing, true)
        print 'tab\there'
    "#;
    assert_eq!(output_of(program), ["hello Ami! 0.5 null true", "tab\there"]);
}

#[test]
fn top_level_return_is_program_value() {
    let outcome = run_source("print 1 return 2 + 3 print 4").unwrap();
    assert_eq!(outcome.output, ["1"]);
    assert_eq!(outcome.value, Value::Number(5.0));
}

#[test]
fn errors_are_classified_by_stage() {
    assert!(matches!(error_of("declare x = 'open"), Error::Lex(_)));
    assert!(matches!(error_of("declare = 1"), Error::Parse(_)));
    assert!(matches!(error_of("1 + null_value"), Error::Runtime(_)));
    assert_eq!(error_of("1 - 'a'").kind(), "TypeError");
    assert_eq!(error_of("declare f = 3 f()").kind(), "TypeError");
}

#[test]
fn options_apply_to_runs() {
    let program = "function pair(a, b) { return b } pair(1)";
    assert_eq!(run_source(program).unwrap().value, Value::Null);

    let strict = Options {
        strict_arity: true,
        ..Options::default()
    };
    let error = run_source_with(program, strict).unwrap_err();
    assert_eq!(error.kind(), "ArityError");

    let shallow = Options {
        max_call_depth: 10,
        ..Options::default()
    };
    let deep = "function down(n) { if n > 0 { return down(n - 1) } return 0 } down(50)";
    assert_eq!(run_source_with(deep, shallow).unwrap_err().kind(), "RecursionError");
    assert_eq!(run_source(deep).unwrap().value, Value::Number(0.0));
}

#[test]
fn runs_do_not_share_state() {
    run_source("declare shared = 1").unwrap();
    assert_eq!(error_of("shared").kind(), "UndefinedNameError");
}

#[test]
fn deep_nesting_is_a_parse_error() {
    let program = format!("print {}1{}", "(".repeat(10_000), ")".repeat(10_000));
    assert!(matches!(
        error_of(&program),
        Error::Parse(ParseError::TooDeeplyNested { .. })
    ));
}

#[test]
fn runaway_recursion_stops_at_default_limit() {
    let program = "
        function down(n) {
            declare m = n - 1
            if n > 0 {
                if m >= 0 { return down(m) }
            }
            return 0
        }
        down(300)
    ";
    assert_eq!(error_of(program).kind(), "RecursionError");
}

#[test]
fn negative_zero_prints_as_zero() {
    assert_eq!(output_of("print -0 print 0 * -1"), ["0", "0"]);
}
