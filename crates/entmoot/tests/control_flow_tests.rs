//! Loops, exceptions, `finally` and `with` through `ThreadContext`

use entmoot::ast::build::*;
use entmoot::ast::{CmpOp, Expr, Operator, Stmt};
use entmoot::*;
use pretty_assertions::assert_eq;

fn run_with(config: Config, body: Vec<Stmt>) -> std::result::Result<String, String> {
    let process = ProcessContext::new(config);
    let mut thread = process.thread();
    let rendered = match thread.evaluate(interactive(body)) {
        Ok(value) => Ok(repr(&value)),
        Err(error) => Err(error.to_string()),
    };
    rendered
}

fn eval(body: Vec<Stmt>) -> std::result::Result<String, String> {
    run_with(Config::new().with_gc(GcConfig::manual()), body)
}

fn bump(counter: &str, by: Expr) -> Stmt {
    aug_assign(name(counter), Operator::Add, by)
}

fn value_error(message: &str) -> Expr {
    call(name("ValueError"), vec![string(message)])
}

fn key_error(message: &str) -> Expr {
    call(name("KeyError"), vec![string(message)])
}

// ═══════════════════════════════════════════════════════════════════════
// Loops
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_while_counts_down() {
    let result = eval(vec![
        assign(name("n"), int(10)),
        assign(name("steps"), int(0)),
        while_(
            compare(name("n"), CmpOp::Gt, int(0)),
            vec![
                aug_assign(name("n"), Operator::Sub, int(1)),
                bump("steps", int(1)),
            ],
            vec![],
        ),
        expr(tuple(vec![name("n"), name("steps")])),
    ]);
    assert_eq!(result, Ok("(0, 10)".to_string()));
}

#[test]
fn test_long_loop_with_background_collector() {
    let result = run_with(
        Config::default(),
        vec![
            assign(name("n"), int(100_000)),
            while_(
                name("n"),
                vec![aug_assign(name("n"), Operator::Sub, int(1))],
                vec![],
            ),
            expr(name("n")),
        ],
    );
    assert_eq!(result, Ok("0".to_string()));
}

#[test]
fn test_million_iterations_keep_native_stack_flat() {
    let result = run_with(
        Config::default(),
        vec![
            assign(name("n"), int(1_000_000)),
            while_(
                compare(name("n"), CmpOp::Gt, int(0)),
                vec![aug_assign(name("n"), Operator::Sub, int(1))],
                vec![],
            ),
            while_(boolean(true), vec![Stmt::Break], vec![]),
            expr(name("n")),
        ],
    );
    assert_eq!(result, Ok("0".to_string()));
}

#[test]
fn test_while_else_runs_without_break() {
    let result = eval(vec![
        assign(name("flag"), int(0)),
        while_(boolean(false), vec![Stmt::Pass], vec![assign(name("flag"), int(1))]),
        expr(name("flag")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_break_skips_else() {
    let result = eval(vec![
        assign(name("flag"), int(0)),
        while_(boolean(true), vec![Stmt::Break], vec![assign(name("flag"), int(1))]),
        expr(name("flag")),
    ]);
    assert_eq!(result, Ok("0".to_string()));
}

#[test]
fn test_for_sums_tuple() {
    let result = eval(vec![
        assign(name("total"), int(0)),
        for_(
            name("i"),
            tuple(vec![int(1), int(2), int(3), int(4)]),
            vec![bump("total", name("i"))],
            vec![],
        ),
        expr(tuple(vec![name("total"), name("i")])),
    ]);
    assert_eq!(result, Ok("(10, 4)".to_string()));
}

#[test]
fn test_for_else_over_empty_iterable() {
    let result = eval(vec![
        assign(name("flag"), int(0)),
        for_(name("i"), tuple(vec![]), vec![Stmt::Pass], vec![assign(name("flag"), int(1))]),
        expr(name("flag")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_continue_skips_rest_of_body() {
    let result = eval(vec![
        assign(name("total"), int(0)),
        for_(
            name("i"),
            tuple(vec![int(1), int(2), int(3)]),
            vec![
                if_(compare(name("i"), CmpOp::Eq, int(2)), vec![Stmt::Continue], vec![]),
                bump("total", name("i")),
            ],
            vec![],
        ),
        expr(name("total")),
    ]);
    assert_eq!(result, Ok("4".to_string()));
}

#[test]
fn test_user_iterator_protocol() {
    let counter = class_def(
        "Count",
        vec![],
        vec![
            function_def("__init__", &["self"], vec![assign(attribute(name("self"), "n"), int(0))]),
            function_def("__iter__", &["self"], vec![return_(Some(name("self")))]),
            function_def(
                "__next__",
                &["self"],
                vec![
                    if_(
                        compare(attribute(name("self"), "n"), CmpOp::GtE, int(3)),
                        vec![raise(name("StopIteration"))],
                        vec![],
                    ),
                    aug_assign(attribute(name("self"), "n"), Operator::Add, int(1)),
                    return_(Some(attribute(name("self"), "n"))),
                ],
            ),
        ],
    );
    let result = eval(vec![
        counter,
        assign(name("total"), int(0)),
        for_(name("v"), call(name("Count"), vec![]), vec![bump("total", name("v"))], vec![]),
        expr(name("total")),
    ]);
    assert_eq!(result, Ok("6".to_string()));
}

#[test]
fn test_break_outside_loop() {
    assert_eq!(
        eval(vec![Stmt::Break]),
        Err("RuntimeError: 'break' outside loop".to_string())
    );
}

// ═══════════════════════════════════════════════════════════════════════
// try / except
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_handler_binds_exception() {
    let result = eval(vec![
        try_(
            vec![raise(value_error("bad"))],
            vec![handler(
                Some(name("ValueError")),
                Some("e"),
                vec![assign(name("caught"), name("e"))],
            )],
            vec![],
            vec![],
        ),
        expr(name("caught")),
    ]);
    assert_eq!(result, Ok("ValueError('bad')".to_string()));
}

#[test]
fn test_handler_name_is_unbound_afterwards() {
    let result = eval(vec![
        try_(
            vec![raise(name("ValueError"))],
            vec![handler(Some(name("ValueError")), Some("e"), vec![Stmt::Pass])],
            vec![],
            vec![],
        ),
        expr(name("e")),
    ]);
    assert_eq!(result, Err("NameError: name 'e' is not defined".to_string()));
}

#[test]
fn test_handler_matches_tuple_and_base_class() {
    let result = eval(vec![
        try_(
            vec![raise(key_error("k"))],
            vec![handler(
                Some(tuple(vec![name("TypeError"), name("LookupError")])),
                None,
                vec![assign(name("hit"), int(1))],
            )],
            vec![],
            vec![],
        ),
        expr(name("hit")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_unmatched_exception_propagates() {
    let result = eval(vec![try_(
        vec![raise(key_error("k"))],
        vec![handler(Some(name("ValueError")), None, vec![Stmt::Pass])],
        vec![],
        vec![],
    )]);
    assert_eq!(result, Err("KeyError: k".to_string()));
}

#[test]
fn test_try_else_runs_on_success() {
    let result = eval(vec![
        assign(name("path"), string("")),
        try_(
            vec![Stmt::Pass],
            vec![handler(None, None, vec![assign(name("path"), string("except"))])],
            vec![assign(name("path"), string("else"))],
            vec![],
        ),
        expr(name("path")),
    ]);
    assert_eq!(result, Ok("'else'".to_string()));
}

#[test]
fn test_catching_a_non_exception_class() {
    let result = eval(vec![try_(
        vec![raise(name("ValueError"))],
        vec![handler(Some(name("int")), None, vec![Stmt::Pass])],
        vec![],
        vec![],
    )]);
    assert_eq!(
        result,
        Err("TypeError: catching classes that do not inherit from BaseException is not allowed"
            .to_string())
    );
}

#[test]
fn test_raising_a_non_exception() {
    assert_eq!(
        eval(vec![raise(int(1))]),
        Err("TypeError: exceptions must derive from BaseException".to_string())
    );
}

#[test]
fn test_handler_raise_chains_context() {
    let inner = try_(
        vec![raise(value_error("a"))],
        vec![handler(Some(name("ValueError")), None, vec![raise(key_error("b"))])],
        vec![],
        vec![],
    );
    let result = eval(vec![
        try_(
            vec![inner],
            vec![handler(
                Some(name("KeyError")),
                Some("e"),
                vec![assign(name("ctx"), attribute(name("e"), "__context__"))],
            )],
            vec![],
            vec![],
        ),
        expr(name("ctx")),
    ]);
    assert_eq!(result, Ok("ValueError('a')".to_string()));
}

#[test]
fn test_raise_from_sets_cause() {
    let result = eval(vec![
        try_(
            vec![raise_from(key_error("b"), value_error("a"))],
            vec![handler(
                Some(name("KeyError")),
                Some("e"),
                vec![assign(name("cause"), attribute(name("e"), "__cause__"))],
            )],
            vec![],
            vec![],
        ),
        expr(name("cause")),
    ]);
    assert_eq!(result, Ok("ValueError('a')".to_string()));
}

#[test]
fn test_bare_raise_reraises_handled_exception() {
    let inner = try_(
        vec![raise(value_error("x"))],
        vec![handler(None, None, vec![reraise()])],
        vec![],
        vec![],
    );
    let result = eval(vec![
        try_(
            vec![inner],
            vec![handler(
                Some(name("ValueError")),
                Some("e"),
                vec![assign(name("args"), attribute(name("e"), "args"))],
            )],
            vec![],
            vec![],
        ),
        expr(name("args")),
    ]);
    assert_eq!(result, Ok("('x',)".to_string()));
}

#[test]
fn test_bare_raise_without_active_exception() {
    assert_eq!(
        eval(vec![reraise()]),
        Err("RuntimeError: No active exception to reraise".to_string())
    );
}

#[test]
fn test_uncaught_chain_report() {
    let process = ProcessContext::new(Config::new().with_gc(GcConfig::manual()));
    let mut thread = process.thread();
    let unit = interactive(vec![try_(
        vec![raise(value_error("a"))],
        vec![handler(None, None, vec![raise(key_error("b"))])],
        vec![],
        vec![],
    )]);
    let outcome = thread.evaluate(unit);
    assert_eq!(exit_code(&outcome), 1);
    let report = match outcome {
        Err(EvalError::Exception(exception)) => exception.report(),
        _ => panic!("expected an exception"),
    };
    assert_eq!(
        report,
        "ValueError: a\n\nDuring handling of the above exception, another exception occurred:\n\nKeyError: b\n"
    );
}

#[test]
fn test_raise_from_none_hides_context_in_report() {
    let process = ProcessContext::new(Config::new().with_gc(GcConfig::manual()));
    let mut thread = process.thread();
    let unit = interactive(vec![try_(
        vec![raise(value_error("a"))],
        vec![handler(None, None, vec![raise_from(key_error("b"), none())])],
        vec![],
        vec![],
    )]);
    let exception = match thread.evaluate(unit) {
        Err(EvalError::Exception(exception)) => exception,
        _ => panic!("expected an exception"),
    };
    // the context is still recorded, only the report leaves it out
    assert!(exception.context().is_some());
    assert_eq!(exception.report(), "KeyError: b\n");
}

// ═══════════════════════════════════════════════════════════════════════
// finally
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_finally_runs_once_on_return() {
    let result = eval(vec![
        assign(name("runs"), int(0)),
        function_def(
            "f",
            &[],
            vec![
                global(&["runs"]),
                try_(vec![return_(Some(int(1)))], vec![], vec![], vec![bump("runs", int(1))]),
                return_(Some(int(2))),
            ],
        ),
        expr(tuple(vec![call(name("f"), vec![]), name("runs")])),
    ]);
    assert_eq!(result, Ok("(1, 1)".to_string()));
}

#[test]
fn test_finally_runs_once_on_exception() {
    let guarded = try_(vec![raise(value_error("x"))], vec![], vec![], vec![bump("runs", int(1))]);
    let result = eval(vec![
        assign(name("runs"), int(0)),
        try_(
            vec![guarded],
            vec![handler(Some(name("ValueError")), None, vec![Stmt::Pass])],
            vec![],
            vec![],
        ),
        expr(name("runs")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_finally_runs_after_handler() {
    let result = eval(vec![
        assign(name("order"), tuple(vec![])),
        try_(
            vec![raise(name("ValueError"))],
            vec![handler(
                None,
                None,
                vec![bump("order", tuple(vec![string("except")]))],
            )],
            vec![],
            vec![bump("order", tuple(vec![string("finally")]))],
        ),
        expr(name("order")),
    ]);
    assert_eq!(result, Ok("('except', 'finally')".to_string()));
}

#[test]
fn test_finally_once_when_handler_raises() {
    let guarded = try_(
        vec![raise(value_error("body"))],
        vec![handler(None, None, vec![raise(key_error("handler"))])],
        vec![],
        vec![bump("runs", int(1))],
    );
    let result = eval(vec![
        assign(name("runs"), int(0)),
        try_(
            vec![guarded],
            vec![handler(
                Some(name("KeyError")),
                Some("e"),
                vec![assign(name("ctx"), attribute(name("e"), "__context__"))],
            )],
            vec![],
            vec![],
        ),
        expr(tuple(vec![name("runs"), name("ctx")])),
    ]);
    assert_eq!(result, Ok("(1, ValueError('body'))".to_string()));
}

#[test]
fn test_finally_raising_after_handler_raises() {
    let guarded = try_(
        vec![raise(value_error("body"))],
        vec![handler(None, None, vec![raise(key_error("handler"))])],
        vec![],
        vec![
            bump("runs", int(1)),
            raise(call(name("RuntimeError"), vec![string("finally")])),
        ],
    );
    let result = eval(vec![
        assign(name("runs"), int(0)),
        try_(
            vec![guarded],
            vec![handler(
                Some(name("RuntimeError")),
                Some("e"),
                vec![
                    assign(name("caught"), name("e")),
                    assign(name("ctx"), attribute(name("e"), "__context__")),
                ],
            )],
            vec![],
            vec![],
        ),
        expr(tuple(vec![
            name("runs"),
            name("caught"),
            name("ctx"),
            attribute(name("ctx"), "__context__"),
        ])),
    ]);
    assert_eq!(
        result,
        Ok("(1, RuntimeError('finally'), KeyError('handler'), ValueError('body'))".to_string())
    );
}

#[test]
fn test_break_through_finally() {
    let result = eval(vec![
        assign(name("n"), int(0)),
        while_(
            boolean(true),
            vec![try_(vec![Stmt::Break], vec![], vec![], vec![bump("n", int(1))])],
            vec![],
        ),
        expr(name("n")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_continue_through_finally() {
    let result = eval(vec![
        assign(name("n"), int(0)),
        for_(
            name("i"),
            tuple(vec![int(1), int(2), int(3)]),
            vec![try_(vec![Stmt::Continue], vec![], vec![], vec![bump("n", name("i"))])],
            vec![],
        ),
        expr(name("n")),
    ]);
    assert_eq!(result, Ok("6".to_string()));
}

#[test]
fn test_exception_in_finally_replaces_pending() {
    let result = eval(vec![try_(
        vec![raise(value_error("a"))],
        vec![],
        vec![],
        vec![raise(key_error("b"))],
    )]);
    assert_eq!(result, Err("KeyError: b".to_string()));
}

// ═══════════════════════════════════════════════════════════════════════
// with
// ═══════════════════════════════════════════════════════════════════════

/// `class CM` whose `__exit__` records the exception value in `seen` and
/// returns `suppress`.
fn manager(suppress: bool) -> Stmt {
    class_def(
        "CM",
        vec![],
        vec![
            function_def("__enter__", &["self"], vec![return_(Some(int(5)))]),
            function_def(
                "__exit__",
                &["self", "t", "v", "tb"],
                vec![
                    global(&["seen", "exits"]),
                    assign(name("seen"), name("v")),
                    bump("exits", int(1)),
                    return_(Some(boolean(suppress))),
                ],
            ),
        ],
    )
}

fn with_prelude(suppress: bool) -> Vec<Stmt> {
    vec![
        manager(suppress),
        assign(name("seen"), string("unset")),
        assign(name("exits"), int(0)),
    ]
}

#[test]
fn test_with_binds_enter_result_and_exits() {
    let mut body = with_prelude(false);
    body.extend([
        with(call(name("CM"), vec![]), Some(name("x")), vec![assign(name("y"), name("x"))]),
        expr(tuple(vec![name("y"), name("seen"), name("exits")])),
    ]);
    assert_eq!(eval(body), Ok("(5, None, 1)".to_string()));
}

#[test]
fn test_with_suppresses_exception() {
    let mut body = with_prelude(true);
    body.extend([
        with(call(name("CM"), vec![]), None, vec![raise(value_error("inside"))]),
        expr(tuple(vec![name("seen"), name("exits")])),
    ]);
    assert_eq!(eval(body), Ok("(ValueError('inside'), 1)".to_string()));
}

#[test]
fn test_with_propagates_unsuppressed_exception() {
    let mut body = with_prelude(false);
    body.push(with(call(name("CM"), vec![]), None, vec![raise(value_error("inside"))]));
    assert_eq!(eval(body), Err("ValueError: inside".to_string()));
}

#[test]
fn test_return_inside_with_calls_exit() {
    let mut body = with_prelude(false);
    body.extend([
        function_def(
            "f",
            &[],
            vec![with(call(name("CM"), vec![]), None, vec![return_(Some(int(7)))])],
        ),
        expr(tuple(vec![call(name("f"), vec![]), name("exits")])),
    ]);
    assert_eq!(eval(body), Ok("(7, 1)".to_string()));
}

/// The `async` form of a `for` or `with` statement.
fn asynchronous(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::For(node) => Stmt::AsyncFor(node),
        Stmt::With(node) => Stmt::AsyncWith(node),
        other => other,
    }
}

#[test]
fn test_async_for_runs_like_for() {
    let result = eval(vec![
        assign(name("n"), int(0)),
        asynchronous(for_(
            name("x"),
            tuple(vec![int(1), int(2)]),
            vec![bump("n", name("x"))],
            vec![],
        )),
        expr(name("n")),
    ]);
    assert_eq!(result, Ok("3".to_string()));
}

#[test]
fn test_async_with_runs_like_with() {
    let mut body = with_prelude(false);
    body.extend([
        asynchronous(with(
            call(name("CM"), vec![]),
            Some(name("x")),
            vec![assign(name("y"), name("x"))],
        )),
        expr(tuple(vec![name("y"), name("seen"), name("exits")])),
    ]);
    assert_eq!(eval(body), Ok("(5, None, 1)".to_string()));
}

#[test]
fn test_with_requires_context_manager() {
    assert_eq!(
        eval(vec![with(int(3), None, vec![Stmt::Pass])]),
        Err("TypeError: 'int' object does not support the context manager protocol".to_string())
    );
}

// ═══════════════════════════════════════════════════════════════════════
// assert and interrupts
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_failed_assert() {
    assert_eq!(
        eval(vec![assert_(boolean(false), Some(string("boom")))]),
        Err("AssertionError: boom".to_string())
    );
    assert_eq!(
        eval(vec![assert_(int(0), None)]),
        Err("AssertionError".to_string())
    );
}

#[test]
fn test_optimize_skips_asserts() {
    let config = Config::new().with_gc(GcConfig::manual()).with_optimize(true);
    let result = run_with(config, vec![assert_(boolean(false), None), expr(int(1))]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_interrupt_stops_infinite_loop() {
    let process = ProcessContext::new(Config::new().with_gc(GcConfig::manual()));
    process.interrupt();
    let mut thread = process.thread();
    let unit = interactive(vec![while_(boolean(true), vec![Stmt::Pass], vec![])]);
    let rendered = match thread.evaluate(unit) {
        Ok(value) => Ok(repr(&value)),
        Err(error) => Err(error.to_string()),
    };
    assert_eq!(rendered, Err("KeyboardInterrupt".to_string()));
}

#[test]
fn test_interrupt_can_be_caught() {
    let process = ProcessContext::new(Config::new().with_gc(GcConfig::manual()));
    let unit = interactive(vec![
        try_(
            vec![while_(boolean(true), vec![Stmt::Pass], vec![])],
            vec![handler(
                Some(name("KeyboardInterrupt")),
                None,
                vec![assign(name("stopped"), boolean(true))],
            )],
            vec![],
            vec![],
        ),
        expr(name("stopped")),
    ]);
    let rendered = std::thread::scope(|scope| {
        scope.spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(50));
            process.interrupt();
        });
        let mut thread = process.thread();
        let rendered = match thread.evaluate(unit) {
            Ok(value) => Ok(repr(&value)),
            Err(error) => Err(error.to_string()),
        };
        rendered
    });
    assert_eq!(rendered, Ok("True".to_string()));
}
