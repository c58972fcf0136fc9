//! Constructors for assembling trees by hand.
//!
//! Hosts without a parser, and the test-suite, build programs with these.

use std::sync::Arc;

use super::*;
use crate::number::Number;

/// `id`
pub fn name(id: &str) -> Expr {
    Expr::Name(Name { id: id.into() })
}

/// Integer literal.
pub fn int(n: i64) -> Expr {
    Expr::Constant(Constant::Number(Number::int(n)))
}

/// Float literal.
pub fn float(f: f64) -> Expr {
    Expr::Constant(Constant::Number(Number::float(f)))
}

/// String literal.
pub fn string(s: &str) -> Expr {
    Expr::Constant(Constant::Str(s.into()))
}

/// Bytes literal.
pub fn bytes(b: &[u8]) -> Expr {
    Expr::Constant(Constant::Bytes(b.into()))
}

/// `True` or `False`.
pub fn boolean(b: bool) -> Expr {
    Expr::Constant(if b { Constant::True } else { Constant::False })
}

/// `None`
pub fn none() -> Expr {
    Expr::Constant(Constant::None)
}

/// `value.attr`
pub fn attribute(value: Expr, attr: &str) -> Expr {
    Expr::Attribute(Arc::new(Attribute {
        value,
        attr: attr.into(),
    }))
}

/// `value[slice]`
pub fn subscript(value: Expr, slice: Expr) -> Expr {
    Expr::Subscript(Arc::new(Subscript { value, slice }))
}

/// `func(args)`
pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
    call_kw(func, args, vec![])
}

/// `func(args, name=value, ...)`
pub fn call_kw(func: Expr, args: Vec<Expr>, keywords: Vec<(&str, Expr)>) -> Expr {
    Expr::Call(Arc::new(Call {
        func,
        args: args.into(),
        keywords: keywords
            .into_iter()
            .map(|(arg, value)| Keyword {
                arg: Some(arg.into()),
                value,
            })
            .collect(),
    }))
}

/// `left op right`
pub fn binop(left: Expr, op: Operator, right: Expr) -> Expr {
    Expr::BinOp(Arc::new(BinOp {
        op,
        values: vec![left, right].into(),
    }))
}

/// `op operand`
pub fn unary(op: UnaryOperator, operand: Expr) -> Expr {
    Expr::UnaryOp(Arc::new(UnaryOp { op, operand }))
}

/// `v1 and v2 ...` / `v1 or v2 ...`
pub fn bool_op(op: BoolOperator, values: Vec<Expr>) -> Expr {
    Expr::BoolOp(Arc::new(BoolOp {
        op,
        values: values.into(),
    }))
}

/// `left op right`
pub fn compare(left: Expr, op: CmpOp, right: Expr) -> Expr {
    Expr::Compare(Arc::new(Compare {
        left,
        ops: vec![op].into(),
        comparators: vec![right].into(),
    }))
}

/// `body if test else orelse`
pub fn if_exp(test: Expr, body: Expr, orelse: Expr) -> Expr {
    Expr::IfExp(Arc::new(IfExp { test, body, orelse }))
}

/// `(elts,)`
pub fn tuple(elts: Vec<Expr>) -> Expr {
    Expr::Tuple(elts.into())
}

/// `*value`
pub fn starred(value: Expr) -> Expr {
    Expr::Starred(Arc::new(value))
}

/// `lambda params: body`
pub fn lambda(params: &[&str], body: Expr) -> Expr {
    Expr::Lambda(Arc::new(Lambda {
        args: Arc::new(arguments(params)),
        body,
    }))
}

/// Plain positional parameters.
pub fn arguments(params: &[&str]) -> Arguments {
    Arguments {
        args: params.iter().map(|p| arg(p)).collect(),
        ..Arguments::default()
    }
}

/// One unannotated parameter.
pub fn arg(name: &str) -> Arg {
    Arg {
        arg: name.into(),
        annotation: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Statements
// ═══════════════════════════════════════════════════════════════════════

/// `target = value`
pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign(Arc::new(Assign {
        targets: vec![target].into(),
        value,
    }))
}

/// `t1 = t2 = ... = value`
pub fn assign_many(targets: Vec<Expr>, value: Expr) -> Stmt {
    Stmt::Assign(Arc::new(Assign {
        targets: targets.into(),
        value,
    }))
}

/// `target op= value`
pub fn aug_assign(target: Expr, op: Operator, value: Expr) -> Stmt {
    Stmt::AugAssign(Arc::new(AugAssign { target, op, value }))
}

/// Expression statement.
pub fn expr(value: Expr) -> Stmt {
    Stmt::Expr(value)
}

/// `while test: body else: orelse`
pub fn while_(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
    Stmt::While(Arc::new(While {
        test,
        body: body.into(),
        orelse: orelse.into(),
    }))
}

/// `for target in iter: body else: orelse`
pub fn for_(target: Expr, iter: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
    Stmt::For(Arc::new(For {
        target,
        iter,
        body: body.into(),
        orelse: orelse.into(),
    }))
}

/// `if test: body else: orelse`
pub fn if_(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
    Stmt::If(Arc::new(If {
        test,
        body: body.into(),
        orelse: orelse.into(),
    }))
}

/// `try` statement.
pub fn try_(
    body: Vec<Stmt>,
    handlers: Vec<ExceptHandler>,
    orelse: Vec<Stmt>,
    finalbody: Vec<Stmt>,
) -> Stmt {
    Stmt::Try(Arc::new(Try {
        body: body.into(),
        handlers: handlers.into(),
        orelse: orelse.into(),
        finalbody: finalbody.into(),
    }))
}

/// `except type as name: body`
pub fn handler(type_: Option<Expr>, name: Option<&str>, body: Vec<Stmt>) -> ExceptHandler {
    ExceptHandler {
        type_,
        name: name.map(Into::into),
        body: body.into(),
    }
}

/// `with context_expr as target: body`
pub fn with(context_expr: Expr, target: Option<Expr>, body: Vec<Stmt>) -> Stmt {
    Stmt::With(Arc::new(With {
        items: vec![WithItem {
            context_expr,
            optional_vars: target,
        }]
        .into(),
        body: body.into(),
    }))
}

/// `raise exc`
pub fn raise(exc: Expr) -> Stmt {
    Stmt::Raise(Arc::new(Raise {
        exc: Some(exc),
        cause: None,
    }))
}

/// `raise exc from cause`
pub fn raise_from(exc: Expr, cause: Expr) -> Stmt {
    Stmt::Raise(Arc::new(Raise {
        exc: Some(exc),
        cause: Some(cause),
    }))
}

/// Bare `raise`.
pub fn reraise() -> Stmt {
    Stmt::Raise(Arc::new(Raise::default()))
}

/// `assert test, msg`
pub fn assert_(test: Expr, msg: Option<Expr>) -> Stmt {
    Stmt::Assert(Arc::new(Assert { test, msg }))
}

/// `return value`
pub fn return_(value: Option<Expr>) -> Stmt {
    Stmt::Return(value)
}

/// `def name(params): body`
pub fn function_def(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    function_def_with(name, arguments(params), body)
}

/// `def name(args): body` with a full parameter list.
pub fn function_def_with(name: &str, args: Arguments, body: Vec<Stmt>) -> Stmt {
    Stmt::FunctionDef(Arc::new(FunctionDef {
        name: name.into(),
        args: Arc::new(args),
        body: body.into(),
        decorator_list: Exprs::default(),
        returns: None,
    }))
}

/// `class name(bases): body`
pub fn class_def(name: &str, bases: Vec<Expr>, body: Vec<Stmt>) -> Stmt {
    Stmt::ClassDef(Arc::new(ClassDef {
        name: name.into(),
        bases: bases.into(),
        keywords: Arc::default(),
        body: body.into(),
        decorator_list: Exprs::default(),
    }))
}

/// `import a, b.c as d`
pub fn import(names: &[(&str, Option<&str>)]) -> Stmt {
    Stmt::Import(aliases(names))
}

/// `from module import names` with `level` leading dots.
pub fn import_from(module: Option<&str>, names: &[(&str, Option<&str>)], level: u32) -> Stmt {
    Stmt::ImportFrom(Arc::new(ImportFrom {
        module: module.map(Into::into),
        names: aliases(names),
        level,
    }))
}

fn aliases(names: &[(&str, Option<&str>)]) -> Arc<[Alias]> {
    names
        .iter()
        .map(|(name, asname)| Alias {
            name: (*name).into(),
            asname: asname.map(Into::into),
        })
        .collect()
}

/// `global names`
pub fn global(names: &[&str]) -> Stmt {
    Stmt::Global(names.iter().map(|n| Ident::from(*n)).collect())
}

/// `del targets`
pub fn delete(targets: Vec<Expr>) -> Stmt {
    Stmt::Delete(targets.into())
}

// ═══════════════════════════════════════════════════════════════════════
// Program units
// ═══════════════════════════════════════════════════════════════════════

/// A module.
pub fn module(body: Vec<Stmt>) -> Module {
    Module { body: body.into() }
}

/// An interactive unit.
pub fn interactive(body: Vec<Stmt>) -> Interactive {
    Interactive { body: body.into() }
}

/// An expression unit.
pub fn expression(body: Expr) -> Expression {
    Expression { body }
}
