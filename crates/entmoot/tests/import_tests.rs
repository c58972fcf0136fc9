//! `import` and `from ... import` against an in-memory resolver

use entmoot::ast::build::*;
use entmoot::ast::{CmpOp, Operator, Stmt};
use entmoot::*;
use pretty_assertions::assert_eq;

fn library() -> AstModules {
    AstModules::new()
        .with_module(
            "mathy",
            module(vec![
                assign(name("pi"), int(3)),
                function_def(
                    "double",
                    &["x"],
                    vec![return_(Some(binop(name("x"), Operator::Mult, int(2))))],
                ),
                assign(name("_hidden"), int(0)),
            ]),
        )
        .with_module("pkg.sub", module(vec![assign(name("value"), int(1))]))
        .with_module(
            "rel",
            module(vec![import_from(Some("inner"), &[("value", None)], 1)]),
        )
        .with_module("rel.inner", module(vec![assign(name("value"), int(11))]))
        .with_module(
            "broken",
            module(vec![raise(call(name("ValueError"), vec![string("boom")]))]),
        )
        .with_module(
            "ping",
            module(vec![import(&[("pong", None)]), assign(name("x"), int(1))]),
        )
        .with_module(
            "pong",
            module(vec![import(&[("ping", None)]), assign(name("y"), int(2))]),
        )
}

fn eval_in(process: &ProcessContext, body: Vec<Stmt>) -> std::result::Result<String, String> {
    let mut thread = process.thread();
    let rendered = match thread.evaluate(interactive(body)) {
        Ok(value) => Ok(repr(&value)),
        Err(error) => Err(error.to_string()),
    };
    rendered
}

fn eval(body: Vec<Stmt>) -> std::result::Result<String, String> {
    let process =
        ProcessContext::with_resolver(Config::new().with_gc(GcConfig::manual()), library());
    eval_in(&process, body)
}

// ═══════════════════════════════════════════════════════════════════════
// import
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_import_binds_module() {
    let result = eval(vec![
        import(&[("mathy", None)]),
        expr(tuple(vec![
            attribute(name("mathy"), "pi"),
            call(attribute(name("mathy"), "double"), vec![int(4)]),
        ])),
    ]);
    assert_eq!(result, Ok("(3, 8)".to_string()));
}

#[test]
fn test_module_is_loaded_once() {
    let process =
        ProcessContext::with_resolver(Config::new().with_gc(GcConfig::manual()), library());
    let result = eval_in(
        &process,
        vec![
            import(&[("mathy", None)]),
            import(&[("mathy", Some("again"))]),
            expr(compare(name("mathy"), CmpOp::Is, name("again"))),
        ],
    );
    assert_eq!(result, Ok("True".to_string()));
    assert!(process.modules().contains("mathy"));

    // a second thread sees the same module
    let again = eval_in(
        &process,
        vec![
            import(&[("mathy", None)]),
            expr(attribute(name("mathy"), "pi")),
        ],
    );
    assert_eq!(again, Ok("3".to_string()));
}

#[test]
fn test_dotted_import_binds_top_package() {
    let result = eval(vec![
        import(&[("pkg.sub", None)]),
        expr(attribute(attribute(name("pkg"), "sub"), "value")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_dotted_import_as_binds_leaf() {
    let result = eval(vec![
        import(&[("pkg.sub", Some("leaf"))]),
        expr(attribute(name("leaf"), "value")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_missing_module() {
    assert_eq!(
        eval(vec![import(&[("nope", None)])]),
        Err("ModuleNotFoundError: No module named 'nope'".to_string())
    );
}

#[test]
fn test_failing_module_is_not_registered() {
    let process =
        ProcessContext::with_resolver(Config::new().with_gc(GcConfig::manual()), library());
    let result = eval_in(&process, vec![import(&[("broken", None)])]);
    assert_eq!(result, Err("ValueError: boom".to_string()));
    assert!(!process.modules().contains("broken"));
}

#[test]
fn test_circular_import_sees_partial_module() {
    let result = eval(vec![
        import(&[("ping", None)]),
        expr(tuple(vec![
            attribute(name("ping"), "x"),
            attribute(attribute(name("ping"), "pong"), "y"),
        ])),
    ]);
    assert_eq!(result, Ok("(1, 2)".to_string()));
}

// ═══════════════════════════════════════════════════════════════════════
// from ... import
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_from_import_with_alias() {
    let result = eval(vec![
        import_from(Some("pkg.sub"), &[("value", Some("v"))], 0),
        expr(name("v")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_from_package_import_submodule() {
    let result = eval(vec![
        import_from(Some("pkg"), &[("sub", None)], 0),
        expr(attribute(name("sub"), "value")),
    ]);
    assert_eq!(result, Ok("1".to_string()));
}

#[test]
fn test_from_import_missing_name() {
    assert_eq!(
        eval(vec![import_from(Some("mathy"), &[("nothing", None)], 0)]),
        Err("ImportError: cannot import name 'nothing' from 'mathy'".to_string())
    );
}

#[test]
fn test_star_import_skips_private_names() {
    let result = eval(vec![
        import_from(Some("mathy"), &[("*", None)], 0),
        expr(tuple(vec![
            name("pi"),
            call(name("double"), vec![int(2)]),
        ])),
    ]);
    assert_eq!(result, Ok("(3, 4)".to_string()));
    assert_eq!(
        eval(vec![
            import_from(Some("mathy"), &[("*", None)], 0),
            expr(name("_hidden")),
        ]),
        Err("NameError: name '_hidden' is not defined".to_string())
    );
}

#[test]
fn test_relative_import_inside_package() {
    let result = eval(vec![
        import(&[("rel", None)]),
        expr(attribute(name("rel"), "value")),
    ]);
    assert_eq!(result, Ok("11".to_string()));
}

#[test]
fn test_relative_import_without_package() {
    assert_eq!(
        eval(vec![import_from(Some("x"), &[("y", None)], 1)]),
        Err("ImportError: attempted relative import with no known parent package".to_string())
    );
}
