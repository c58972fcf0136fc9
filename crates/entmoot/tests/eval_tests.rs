//! Expression, call and class evaluation through `ThreadContext`

use std::io::{self, Write};
use std::sync::Arc;

use entmoot::ast::build::*;
use entmoot::ast::{CmpOp, Compare, Expr, FunctionDef, Operator, Slice, Stmt, UnaryOperator};
use entmoot::*;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn process() -> ProcessContext {
    ProcessContext::new(Config::new().with_gc(GcConfig::manual()))
}

/// Run an interactive unit; the result or the raised exception rendered.
fn eval(body: Vec<Stmt>) -> std::result::Result<String, String> {
    let process = process();
    let mut thread = process.thread();
    let rendered = match thread.evaluate(interactive(body)) {
        Ok(value) => Ok(repr(&value)),
        Err(error) => Err(error.to_string()),
    };
    rendered
}

fn eval_expr(expr: Expr) -> std::result::Result<String, String> {
    eval(vec![Stmt::Expr(expr)])
}

fn chain(left: Expr, rest: Vec<(CmpOp, Expr)>) -> Expr {
    let (ops, comparators): (Vec<CmpOp>, Vec<Expr>) = rest.into_iter().unzip();
    Expr::Compare(Arc::new(Compare {
        left,
        ops: ops.into(),
        comparators: comparators.into(),
    }))
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Names and operators
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_assign_then_load() {
    let result = eval(vec![assign(name("a"), int(1)), expr(name("a"))]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_chained_assignment_binds_every_target() {
    let result = eval(vec![
        assign_many(vec![name("a"), name("b")], int(3)),
        expr(binop(name("a"), Operator::Add, name("b"))),
    ]);
    assert_eq!(result, Ok("6".to_string()));
}

#[test]
fn test_undefined_name() {
    assert_eq!(
        eval_expr(name("nope")),
        Err("NameError: name 'nope' is not defined".to_string())
    );
}

#[test]
fn test_expression_unit_reads_module_binding() {
    let process = process();
    let mut thread = process.thread();
    thread.evaluate(module(vec![assign(name("a"), int(1))])).unwrap();

    let value = thread.evaluate(expression(name("a"))).unwrap();
    assert_eq!(value.as_number().and_then(|n| n.to_i64()), Some(1));
    assert!(thread.return_value().is(&value));

    let again = thread.evaluate_expression(binop(name("a"), Operator::Add, int(1))).unwrap();
    assert_eq!(repr(&again), "2");
}

#[test]
fn test_arithmetic() {
    let product = binop(int(3), Operator::Mult, int(4));
    assert_eq!(eval_expr(binop(int(2), Operator::Add, product)), Ok("14".to_string()));
    assert_eq!(eval_expr(binop(int(7), Operator::Div, int(2))), Ok("3.5".to_string()));
    let negative = unary(UnaryOperator::USub, int(7));
    assert_eq!(eval_expr(binop(negative, Operator::FloorDiv, int(2))), Ok("-4".to_string()));
}

#[test]
fn test_big_integers_do_not_overflow() {
    let result = eval_expr(binop(int(2), Operator::Pow, int(100)));
    assert_eq!(result, Ok("1267650600228229401496703205376".to_string()));
}

#[test]
fn test_division_by_zero() {
    assert_eq!(
        eval_expr(binop(int(1), Operator::Div, int(0))),
        Err("ZeroDivisionError: division by zero".to_string())
    );
}

#[test]
fn test_unsupported_operands() {
    assert_eq!(
        eval_expr(binop(int(1), Operator::Add, string("a"))),
        Err("TypeError: unsupported operand type(s) for +: 'int' and 'str'".to_string())
    );
}

#[test]
fn test_string_operators() {
    assert_eq!(
        eval_expr(binop(string("ab"), Operator::Add, string("cd"))),
        Ok("'abcd'".to_string())
    );
    assert_eq!(
        eval_expr(binop(int(3), Operator::Mult, string("ab"))),
        Ok("'ababab'".to_string())
    );
    assert_eq!(
        eval_expr(compare(string("b"), CmpOp::In, string("abc"))),
        Ok("True".to_string())
    );
}

#[test]
fn test_not_operator() {
    assert_eq!(eval_expr(unary(UnaryOperator::Not, int(0))), Ok("True".to_string()));
    assert_eq!(eval_expr(unary(UnaryOperator::Not, string("x"))), Ok("False".to_string()));
}

#[test]
fn test_comparison_chain_short_circuits() {
    let ascending = chain(int(1), vec![(CmpOp::Lt, int(2)), (CmpOp::Lt, int(3))]);
    assert_eq!(eval_expr(ascending), Ok("True".to_string()));
    // `boom` is never evaluated
    let broken = chain(int(3), vec![(CmpOp::Lt, int(2)), (CmpOp::Lt, name("boom"))]);
    assert_eq!(eval_expr(broken), Ok("False".to_string()));
}

#[test]
fn test_identity_comparison() {
    let result = eval(vec![
        assign(name("a"), tuple(vec![])),
        expr(compare(name("a"), CmpOp::Is, name("a"))),
    ]);
    assert_eq!(result, Ok("True".to_string()));
    assert_eq!(eval_expr(compare(none(), CmpOp::IsNot, none())), Ok("False".to_string()));
}

#[test]
fn test_if_expression() {
    let pick = if_exp(int(0), string("yes"), string("no"));
    assert_eq!(eval_expr(pick), Ok("'no'".to_string()));
}

// ═══════════════════════════════════════════════════════════════════════
// Sequences and builtins
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_tuple_unpacking() {
    let result = eval(vec![
        assign(tuple(vec![name("a"), name("b")]), tuple(vec![int(1), int(2)])),
        expr(tuple(vec![name("b"), name("a")])),
    ]);
    assert_eq!(result, Ok("(2, 1)".to_string()));
}

#[test]
fn test_starred_unpacking() {
    let result = eval(vec![
        assign(
            tuple(vec![name("first"), starred(name("rest"))]),
            tuple(vec![int(1), int(2), int(3)]),
        ),
        expr(name("rest")),
    ]);
    assert_eq!(result, Ok("(2, 3)".to_string()));
}

#[test]
fn test_unpacking_count_mismatch() {
    let result = eval(vec![assign(
        tuple(vec![name("a"), name("b")]),
        tuple(vec![int(1), int(2), int(3)]),
    )]);
    assert_eq!(
        result,
        Err("ValueError: too many values to unpack (expected 2)".to_string())
    );
}

#[test]
fn test_len_and_subscript() {
    assert_eq!(eval_expr(call(name("len"), vec![string("héllo")])), Ok("5".to_string()));
    let last = unary(UnaryOperator::USub, int(1));
    assert_eq!(eval_expr(subscript(string("abc"), last)), Ok("'c'".to_string()));
    let items = tuple(vec![int(10), int(20), int(30)]);
    assert_eq!(eval_expr(subscript(items, int(1))), Ok("20".to_string()));
}

fn slice(lower: Option<Expr>, upper: Option<Expr>, step: Option<Expr>) -> Expr {
    Expr::Slice(Arc::new(Slice { lower, upper, step }))
}

#[test]
fn test_tuple_slices() {
    let items = || tuple(vec![int(1), int(2), int(3)]);
    assert_eq!(
        eval_expr(subscript(items(), slice(Some(int(1)), None, None))),
        Ok("(2, 3)".to_string())
    );
    assert_eq!(
        eval_expr(subscript(items(), slice(None, None, Some(unary(UnaryOperator::USub, int(1)))))),
        Ok("(3, 2, 1)".to_string())
    );
}

#[test]
fn test_slice_with_huge_step() {
    let items = || tuple(vec![int(1), int(2), int(3)]);
    assert_eq!(
        eval_expr(subscript(items(), slice(Some(int(1)), None, Some(int(i64::MAX))))),
        Ok("(2,)".to_string())
    );
    assert_eq!(
        eval_expr(subscript(items(), slice(None, None, Some(int(i64::MIN))))),
        Ok("(3,)".to_string())
    );
}

#[test]
fn test_index_out_of_range() {
    assert_eq!(
        eval_expr(subscript(tuple(vec![int(1)]), int(5))),
        Err("IndexError: tuple index out of range".to_string())
    );
}

#[test]
fn test_int_conversion() {
    assert_eq!(eval_expr(call(name("int"), vec![string("42")])), Ok("42".to_string()));
    assert_eq!(
        eval_expr(call(name("int"), vec![string("x")])),
        Err("ValueError: invalid literal for int() with base 10: 'x'".to_string())
    );
}

#[test]
fn test_isinstance_follows_mro() {
    let check = call(name("isinstance"), vec![boolean(true), name("int")]);
    assert_eq!(eval_expr(check), Ok("True".to_string()));
    let either = call(
        name("isinstance"),
        vec![string("s"), tuple(vec![name("int"), name("str")])],
    );
    assert_eq!(eval_expr(either), Ok("True".to_string()));
}

#[test]
fn test_getattr_and_hasattr() {
    let fallback = call(name("getattr"), vec![int(1), string("nope"), int(5)]);
    assert_eq!(eval_expr(fallback), Ok("5".to_string()));
    let missing = call(name("hasattr"), vec![int(1), string("nope")]);
    assert_eq!(eval_expr(missing), Ok("False".to_string()));
    let present = call(name("hasattr"), vec![int(1), string("__add__")]);
    assert_eq!(eval_expr(present), Ok("True".to_string()));
}

#[test]
fn test_next_with_default() {
    let empty = call(name("iter"), vec![tuple(vec![])]);
    assert_eq!(eval_expr(call(name("next"), vec![empty, int(7)])), Ok("7".to_string()));
}

#[test]
fn test_print_writes_to_process_output() {
    let process = process();
    let capture = Capture::default();
    process.set_output(Box::new(capture.clone()));
    let mut thread = process.thread();
    let unit = module(vec![
        expr(call_kw(
            name("print"),
            vec![string("a"), int(1)],
            vec![("sep", string("-"))],
        )),
        expr(call(name("print"), vec![])),
    ]);
    thread.evaluate(unit).unwrap();
    assert_eq!(capture.text(), "a-1\n\n");
}

// ═══════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_function_defaults() {
    let mut params = arguments(&["a", "b"]);
    params.defaults = vec![int(2)].into();
    let result = eval(vec![
        function_def_with(
            "f",
            params,
            vec![return_(Some(binop(name("a"), Operator::Add, name("b"))))],
        ),
        expr(tuple(vec![
            call(name("f"), vec![int(1)]),
            call_kw(name("f"), vec![int(1)], vec![("b", int(10))]),
        ])),
    ]);
    assert_eq!(result, Ok("(3, 11)".to_string()));
}

#[test]
fn test_missing_argument() {
    let result = eval(vec![
        function_def("f", &["a", "b"], vec![Stmt::Pass]),
        expr(call(name("f"), vec![int(1)])),
    ]);
    assert_eq!(
        result,
        Err("TypeError: f() missing 1 required positional argument: 'b'".to_string())
    );
}

#[test]
fn test_too_many_arguments() {
    let result = eval(vec![
        function_def("f", &["a"], vec![Stmt::Pass]),
        expr(call(name("f"), vec![int(1), int(2)])),
    ]);
    assert_eq!(
        result,
        Err("TypeError: f() takes 1 positional argument but 2 were given".to_string())
    );
}

#[test]
fn test_function_without_return_yields_none() {
    let result = eval(vec![
        function_def("f", &[], vec![Stmt::Pass]),
        expr(call(name("f"), vec![])),
    ]);
    assert_eq!(result, Ok("None".to_string()));
}

#[test]
fn test_recursive_factorial() {
    let n = || name("n");
    let body = vec![
        if_(
            compare(n(), CmpOp::LtE, int(1)),
            vec![return_(Some(int(1)))],
            vec![],
        ),
        return_(Some(binop(
            n(),
            Operator::Mult,
            call(name("fact"), vec![binop(n(), Operator::Sub, int(1))]),
        ))),
    ];
    let result = eval(vec![
        function_def("fact", &["n"], body),
        expr(call(name("fact"), vec![int(20)])),
    ]);
    assert_eq!(result, Ok("2432902008176640000".to_string()));
}

#[test]
fn test_unbounded_recursion_hits_frame_limit() {
    let result = eval(vec![
        function_def("f", &[], vec![return_(Some(call(name("f"), vec![])))]),
        expr(call(name("f"), vec![])),
    ]);
    assert_eq!(
        result,
        Err("RecursionError: maximum recursion depth exceeded".to_string())
    );
}

#[test]
fn test_closure_reads_enclosing_scope() {
    let result = eval(vec![
        function_def(
            "outer",
            &[],
            vec![
                assign(name("x"), int(5)),
                function_def("inner", &[], vec![return_(Some(name("x")))]),
                return_(Some(name("inner"))),
            ],
        ),
        expr(call(call(name("outer"), vec![]), vec![])),
    ]);
    assert_eq!(result, Ok("5".to_string()));
}

#[test]
fn test_global_declaration_redirects_store() {
    let result = eval(vec![
        assign(name("counter"), int(0)),
        function_def(
            "bump",
            &[],
            vec![
                global(&["counter"]),
                aug_assign(name("counter"), Operator::Add, int(1)),
            ],
        ),
        expr(call(name("bump"), vec![])),
        expr(call(name("bump"), vec![])),
        expr(name("counter")),
    ]);
    assert_eq!(result, Ok("2".to_string()));
}

#[test]
fn test_lambda_call() {
    let double = lambda(&["x"], binop(name("x"), Operator::Mult, int(2)));
    assert_eq!(eval_expr(call(double, vec![int(21)])), Ok("42".to_string()));
}

#[test]
fn test_star_arguments_spread() {
    let result = eval(vec![
        function_def(
            "add",
            &["a", "b"],
            vec![return_(Some(binop(name("a"), Operator::Add, name("b"))))],
        ),
        expr(call(name("add"), vec![starred(tuple(vec![int(4), int(5)]))])),
    ]);
    assert_eq!(result, Ok("9".to_string()));
}

#[test]
fn test_decorator_replaces_function() {
    let decorated = Stmt::FunctionDef(Arc::new(FunctionDef {
        name: "g".into(),
        args: Arc::new(arguments(&[])),
        body: vec![return_(Some(int(1)))].into(),
        decorator_list: vec![name("tag")].into(),
        returns: None,
    }));
    let result = eval(vec![
        function_def("tag", &["f"], vec![return_(Some(lambda(&[], int(99))))]),
        decorated,
        expr(call(name("g"), vec![])),
    ]);
    assert_eq!(result, Ok("99".to_string()));
}

// ═══════════════════════════════════════════════════════════════════════
// Classes
// ═══════════════════════════════════════════════════════════════════════

fn self_attr(attr: &str) -> Expr {
    attribute(name("self"), attr)
}

#[test]
fn test_class_init_and_method() {
    let class = class_def(
        "C",
        vec![],
        vec![
            function_def("__init__", &["self", "v"], vec![assign(self_attr("v"), name("v"))]),
            function_def("get", &["self"], vec![return_(Some(self_attr("v")))]),
        ],
    );
    let result = eval(vec![
        class,
        expr(call(attribute(call(name("C"), vec![int(7)]), "get"), vec![])),
    ]);
    assert_eq!(result, Ok("7".to_string()));
}

#[test]
fn test_method_resolution_order() {
    let who = |label: &str| function_def("who", &["self"], vec![return_(Some(string(label)))]);
    let result = eval(vec![
        class_def("A", vec![], vec![who("A")]),
        class_def("B", vec![name("A")], vec![Stmt::Pass]),
        class_def("C", vec![name("A")], vec![who("C")]),
        class_def("D", vec![name("B"), name("C")], vec![Stmt::Pass]),
        expr(tuple(vec![
            call(attribute(call(name("B"), vec![]), "who"), vec![]),
            call(attribute(call(name("D"), vec![]), "who"), vec![]),
        ])),
    ]);
    assert_eq!(result, Ok("('A', 'C')".to_string()));
}

#[test]
fn test_inconsistent_hierarchy_rejected() {
    let result = eval(vec![
        class_def("A", vec![], vec![Stmt::Pass]),
        class_def("B", vec![name("A")], vec![Stmt::Pass]),
        class_def("C", vec![name("A"), name("B")], vec![Stmt::Pass]),
    ]);
    let error = result.unwrap_err();
    assert!(error.starts_with("TypeError: Cannot create a consistent method resolution order"));
}

#[test]
fn test_getattr_hook_handles_missing_attributes() {
    let class = class_def(
        "Echo",
        vec![],
        vec![
            assign(name("present"), int(1)),
            function_def("__getattr__", &["self", "name"], vec![return_(Some(name("name")))]),
        ],
    );
    let result = eval(vec![
        class,
        assign(name("e"), call(name("Echo"), vec![])),
        expr(tuple(vec![attribute(name("e"), "present"), attribute(name("e"), "missing")])),
    ]);
    assert_eq!(result, Ok("(1, 'missing')".to_string()));
}

#[test]
fn test_missing_attribute_error() {
    let result = eval(vec![
        class_def("Empty", vec![], vec![Stmt::Pass]),
        expr(attribute(call(name("Empty"), vec![]), "nothing")),
    ]);
    assert_eq!(
        result,
        Err("AttributeError: 'Empty' object has no attribute 'nothing'".to_string())
    );
}

#[test]
fn test_user_operators_and_reflection() {
    let result = eval(vec![
        class_def(
            "Left",
            vec![],
            vec![function_def("__add__", &["self", "other"], vec![return_(Some(int(10)))])],
        ),
        class_def(
            "Right",
            vec![],
            vec![function_def("__radd__", &["self", "other"], vec![return_(Some(int(20)))])],
        ),
        expr(tuple(vec![
            binop(call(name("Left"), vec![]), Operator::Add, int(1)),
            binop(int(1), Operator::Add, call(name("Right"), vec![])),
        ])),
    ]);
    assert_eq!(result, Ok("(10, 20)".to_string()));
}

#[test]
fn test_callable_instances() {
    let result = eval(vec![
        class_def(
            "Adder",
            vec![],
            vec![function_def(
                "__call__",
                &["self", "x"],
                vec![return_(Some(binop(name("x"), Operator::Add, int(1))))],
            )],
        ),
        expr(call(call(name("Adder"), vec![]), vec![int(41)])),
    ]);
    assert_eq!(result, Ok("42".to_string()));
}

#[test]
fn test_calling_a_non_callable() {
    assert_eq!(
        eval_expr(call(int(3), vec![])),
        Err("TypeError: 'int' object is not callable".to_string())
    );
}

#[test]
fn test_self_referencing_call_hook_hits_limit() {
    let result = eval(vec![
        class_def("C", vec![], vec![Stmt::Pass]),
        assign(name("c"), call(name("C"), vec![])),
        assign(attribute(name("C"), "__call__"), name("c")),
        expr(call(name("c"), vec![])),
    ]);
    assert_eq!(
        result,
        Err("RecursionError: maximum recursion depth exceeded while calling an object".to_string())
    );
}

#[test]
fn test_bound_method_objects_are_callable() {
    let result = eval(vec![
        class_def(
            "Greeter",
            vec![],
            vec![function_def("hello", &["self", "who"], vec![return_(Some(name("who")))])],
        ),
        assign(name("m"), attribute(call(name("Greeter"), vec![]), "hello")),
        assign(name("again"), name("m")),
        expr(call(name("again"), vec![string("you")])),
    ]);
    assert_eq!(result, Ok("'you'".to_string()));
}

#[test]
fn test_user_item_protocol() {
    let result = eval(vec![
        class_def(
            "Box",
            vec![],
            vec![
                function_def(
                    "__setitem__",
                    &["self", "key", "value"],
                    vec![assign(self_attr("last"), name("value"))],
                ),
                function_def("__getitem__", &["self", "key"], vec![return_(Some(name("key")))]),
            ],
        ),
        assign(name("b"), call(name("Box"), vec![])),
        assign(subscript(name("b"), int(1)), int(5)),
        expr(tuple(vec![attribute(name("b"), "last"), subscript(name("b"), string("key"))])),
    ]);
    assert_eq!(result, Ok("(5, 'key')".to_string()));
}

#[test]
fn test_item_assignment_unsupported() {
    let result = eval(vec![assign(subscript(tuple(vec![int(1)]), int(0)), int(2))]);
    assert_eq!(
        result,
        Err("TypeError: 'tuple' object does not support item assignment".to_string())
    );
}
