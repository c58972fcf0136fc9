//! Object model and attribute protocol, driven through the public API

use entmoot::ast::build::*;
use entmoot::ast::{CmpOp, Stmt};
use entmoot::protocol::{self, find_special, is_instance, is_subclass, linearize, mro};
use entmoot::*;
use pretty_assertions::assert_eq;

fn process() -> ProcessContext {
    ProcessContext::new(Config::new().with_gc(GcConfig::manual()))
}

fn run(thread: &mut ThreadContext<'_>, body: Vec<Stmt>) -> Object {
    thread.evaluate(interactive(body)).unwrap()
}

fn binding(thread: &ThreadContext<'_>, name: &str) -> Object {
    thread.module().attribute(name).unwrap()
}

fn names(classes: &[Object]) -> Vec<String> {
    classes.iter().map(|class| class.name().unwrap()).collect()
}

fn diamond() -> Vec<Stmt> {
    vec![
        class_def("A", vec![], vec![Stmt::Pass]),
        class_def("B", vec![name("A")], vec![Stmt::Pass]),
        class_def("C", vec![name("A")], vec![Stmt::Pass]),
        class_def("D", vec![name("B"), name("C")], vec![Stmt::Pass]),
    ]
}

// ═══════════════════════════════════════════════════════════════════════
// Method resolution order
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_diamond_linearization() {
    let process = process();
    let mut thread = process.thread();
    run(&mut thread, diamond());
    let d = binding(&thread, "D");
    assert_eq!(names(&mro(&d)), vec!["D", "B", "C", "A", "object"]);
}

#[test]
fn test_linearize_rejects_inconsistent_bases() {
    let process = process();
    let mut thread = process.thread();
    run(&mut thread, diamond());
    let (a, b) = (binding(&thread, "A"), binding(&thread, "B"));
    let fresh = process.instance(&process.builtins().type_);
    let error = linearize(&fresh, &[a, b]).unwrap_err();
    assert_eq!(
        error,
        MroError::Inconsistent {
            bases: "A, B".to_string()
        }
    );
}

#[test]
fn test_linearize_rejects_non_types() {
    let process = process();
    let fresh = process.instance(&process.builtins().type_);
    let error = linearize(&fresh, &[process.int(1)]).unwrap_err();
    assert_eq!(error.to_string(), "bases must be types, got 'int'");
}

#[test]
fn test_builtin_hierarchy() {
    let process = process();
    let builtins = process.builtins();
    let exceptions = &builtins.exceptions;
    assert!(is_subclass(&builtins.bool_, &builtins.int));
    assert!(is_subclass(&builtins.int, &builtins.object));
    assert!(!is_subclass(&builtins.int, &builtins.bool_));
    assert!(is_subclass(&exceptions.key_error, &exceptions.lookup_error));
    assert!(is_subclass(&exceptions.keyboard_interrupt, &exceptions.base_exception));
    assert!(!is_subclass(&exceptions.keyboard_interrupt, &exceptions.exception));
    assert!(is_instance(&builtins.true_, &builtins.int));
    assert!(is_instance(&process.string("s"), &builtins.object));
}

// ═══════════════════════════════════════════════════════════════════════
// Attribute lookup
// ═══════════════════════════════════════════════════════════════════════

fn point_class() -> Stmt {
    class_def(
        "Point",
        vec![],
        vec![
            assign(name("x"), int(1)),
            function_def("norm", &["self"], vec![return_(Some(int(0)))]),
        ],
    )
}

#[test]
fn test_instance_attribute_shadows_class_attribute() {
    let process = process();
    let mut thread = process.thread();
    run(
        &mut thread,
        vec![
            point_class(),
            assign(name("p"), call(name("Point"), vec![])),
            assign(attribute(name("p"), "x"), int(2)),
        ],
    );
    let p = binding(&thread, "p");
    assert_eq!(repr(&protocol::resolve(&p, "x").unwrap()), "2");
    let special = find_special(&p, "x").unwrap();
    assert_eq!(repr(special.function()), "1");
}

#[test]
fn test_methods_bind_to_receiver() {
    let process = process();
    let mut thread = process.thread();
    run(
        &mut thread,
        vec![point_class(), assign(name("p"), call(name("Point"), vec![]))],
    );
    let p = binding(&thread, "p");
    match protocol::lookup(&p, "norm") {
        Lookup::Found(Attribute::Bound { receiver, .. }) => assert!(receiver.is(&p)),
        other => panic!("expected a bound method, got {:?}", other),
    }
    // looked up on the class itself, the function stays unbound
    let class = binding(&thread, "Point");
    assert!(matches!(
        protocol::lookup(&class, "norm"),
        Lookup::Found(Attribute::Plain(_))
    ));
}

#[test]
fn test_lookup_reports_missing_and_fallback() {
    let process = process();
    let mut thread = process.thread();
    run(
        &mut thread,
        vec![
            point_class(),
            class_def(
                "Lazy",
                vec![],
                vec![function_def("__getattr__", &["self", "name"], vec![return_(Some(none()))])],
            ),
            assign(name("p"), call(name("Point"), vec![])),
            assign(name("l"), call(name("Lazy"), vec![])),
        ],
    );
    match protocol::lookup(&binding(&thread, "p"), "z") {
        Lookup::Missing(error) => {
            assert_eq!(error.to_string(), "'Point' object has no attribute 'z'")
        }
        other => panic!("expected a miss, got {:?}", other),
    }
    assert!(matches!(
        protocol::lookup(&binding(&thread, "l"), "z"),
        Lookup::Fallback(_)
    ));
}

#[test]
fn test_getattribute_hook_takes_over() {
    let process = process();
    let mut thread = process.thread();
    let result = run(
        &mut thread,
        vec![
            class_def(
                "Everything",
                vec![],
                vec![
                    assign(name("real"), int(1)),
                    function_def(
                        "__getattribute__",
                        &["self", "name"],
                        vec![return_(Some(int(42)))],
                    ),
                ],
            ),
            assign(name("e"), call(name("Everything"), vec![])),
            expr(tuple(vec![attribute(name("e"), "real"), attribute(name("e"), "anything")])),
        ],
    );
    assert!(matches!(
        protocol::lookup(&binding(&thread, "e"), "real"),
        Lookup::Hook(_)
    ));
    assert_eq!(repr(&result), "(42, 42)");
}

#[test]
fn test_setattr_and_delattr_builtins() {
    let process = process();
    let mut thread = process.thread();
    let result = run(
        &mut thread,
        vec![
            point_class(),
            assign(name("p"), call(name("Point"), vec![])),
            expr(call(name("setattr"), vec![name("p"), string("y"), int(9)])),
            assign(name("before"), attribute(name("p"), "y")),
            expr(call(name("delattr"), vec![name("p"), string("y")])),
            expr(tuple(vec![
                name("before"),
                call(name("hasattr"), vec![name("p"), string("y")]),
            ])),
        ],
    );
    assert_eq!(repr(&result), "(9, False)");
}

#[test]
fn test_type_of_instance_is_its_class() {
    let process = process();
    let mut thread = process.thread();
    let mut body = diamond();
    body.push(expr(tuple(vec![
        compare(call(name("type"), vec![call(name("D"), vec![])]), CmpOp::Is, name("D")),
        call(name("issubclass"), vec![name("D"), name("A")]),
        call(name("issubclass"), vec![name("A"), name("D")]),
    ])));
    let result = run(&mut thread, body);
    assert_eq!(repr(&result), "(True, True, False)");
}

// ═══════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_repr_of_classes_modules_and_instances() {
    let process = process();
    let mut thread = process.thread();
    run(
        &mut thread,
        vec![point_class(), assign(name("p"), call(name("Point"), vec![]))],
    );
    assert_eq!(repr(&binding(&thread, "Point")), "<class 'Point'>");
    assert_eq!(repr(thread.module()), "<module '__main__'>");
    assert!(repr(&binding(&thread, "p")).starts_with("<Point object at "));
    assert_eq!(repr(&process.builtins().int), "<class 'int'>");
}

#[test]
fn test_user_repr_and_str() {
    let process = process();
    let mut thread = process.thread();
    let result = run(
        &mut thread,
        vec![
            class_def(
                "Named",
                vec![],
                vec![function_def("__repr__", &["self"], vec![return_(Some(string("Named!")))])],
            ),
            expr(tuple(vec![
                call(name("repr"), vec![call(name("Named"), vec![])]),
                call(name("str"), vec![call(name("Named"), vec![])]),
            ])),
        ],
    );
    assert_eq!(repr(&result), "('Named!', 'Named!')");
}

#[test]
fn test_string_quoting() {
    let process = process();
    assert_eq!(repr(&process.string("it's")), "\"it's\"");
    assert_eq!(repr(&process.string("a\nb")), "'a\\nb'");
    assert_eq!(to_str(&process.string("plain")), "plain");
    assert_eq!(repr(&process.tuple(vec![process.int(1)])), "(1,)");
}
