//! Abstract syntax tree consumed by the evaluator.
//!
//! The tree is produced by an external parser and handed over either as
//! Rust values (see [`build`]) or as externally tagged JSON. Nodes are
//! immutable. Every composite node sits behind an [`Arc`] and every child
//! sequence is an `Arc<[T]>`, so evaluator continuations can capture a
//! subtree with a reference-count bump instead of a deep clone.

pub mod build;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::number::Number;

/// An identifier.
pub type Ident = Arc<str>;

/// A statement sequence.
pub type Block = Arc<[Stmt]>;

/// An expression sequence.
pub type Exprs = Arc<[Expr]>;

// ═══════════════════════════════════════════════════════════════════════
// Program units
// ═══════════════════════════════════════════════════════════════════════

/// A module body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    /// Top-level statements
    pub body: Block,
}

/// A unit entered interactively; expression statements yield their value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Interactive {
    /// Top-level statements
    pub body: Block,
}

/// A single expression evaluated for its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// The expression
    pub body: Expr,
}

// ═══════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════

/// Expression kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// `id`
    Name(Name),
    /// A literal
    Constant(Constant),
    /// `value.attr`
    Attribute(Arc<Attribute>),
    /// `value[slice]`
    Subscript(Arc<Subscript>),
    /// `lower:upper:step`
    Slice(Arc<Slice>),
    /// `func(args, keywords)`
    Call(Arc<Call>),
    /// Left-associative chain of one binary operator
    BinOp(Arc<BinOp>),
    /// `op operand`
    UnaryOp(Arc<UnaryOp>),
    /// Short-circuit `and` / `or` chain
    BoolOp(Arc<BoolOp>),
    /// `left op1 c1 op2 c2 ...`
    Compare(Arc<Compare>),
    /// `body if test else orelse`
    IfExp(Arc<IfExp>),
    /// `(a, b)`
    Tuple(Exprs),
    /// `[a, b]`
    List(Exprs),
    /// `{a, b}`
    Set(Exprs),
    /// `{k: v}`
    Dict(Arc<Dict>),
    /// List, set and dict comprehensions and generator expressions
    Comprehension(Arc<Comprehension>),
    /// `lambda args: body`
    Lambda(Arc<Lambda>),
    /// `*value`
    Starred(Arc<Expr>),
    /// `target := value`
    NamedExpr(Arc<NamedExpr>),
    /// f-string
    JoinedStr(Exprs),
    /// `{value}` inside an f-string
    FormattedValue(Arc<FormattedValue>),
    /// `yield value`
    Yield(Option<Arc<Expr>>),
    /// `yield from value`
    YieldFrom(Arc<Expr>),
    /// `await value`
    Await(Arc<Expr>),
}

/// A name reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Name {
    /// The identifier
    pub id: Ident,
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// `None`
    None,
    /// `True`
    True,
    /// `False`
    False,
    /// `...`
    Ellipsis,
    /// Numeric literal
    Number(Number),
    /// String literal
    Str(Arc<str>),
    /// Bytes literal
    Bytes(Arc<[u8]>),
}

/// Attribute access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Base expression
    pub value: Expr,
    /// Attribute name
    pub attr: Ident,
}

/// Item access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscript {
    /// Container expression
    pub value: Expr,
    /// Index or slice expression
    pub slice: Expr,
}

/// Slice bounds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Slice {
    /// Lower bound
    #[serde(default)]
    pub lower: Option<Expr>,
    /// Upper bound
    #[serde(default)]
    pub upper: Option<Expr>,
    /// Step
    #[serde(default)]
    pub step: Option<Expr>,
}

/// A call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Callee expression
    pub func: Expr,
    /// Positional arguments, possibly `Starred`
    #[serde(default)]
    pub args: Exprs,
    /// Keyword arguments
    #[serde(default)]
    pub keywords: Arc<[Keyword]>,
}

/// `arg=value`, or `**value` when `arg` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Keyword name
    #[serde(default)]
    pub arg: Option<Ident>,
    /// Value expression
    pub value: Expr,
}

/// Binary operator chain: `values[0] op values[1] op ...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinOp {
    /// Operator
    pub op: Operator,
    /// Operands, at least two
    pub values: Exprs,
}

/// Unary operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryOp {
    /// Operator
    pub op: UnaryOperator,
    /// Operand
    pub operand: Expr,
}

/// Boolean operation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoolOp {
    /// Operator
    pub op: BoolOperator,
    /// Operands, at least two
    pub values: Exprs,
}

/// Comparison chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compare {
    /// Leftmost operand
    pub left: Expr,
    /// Operators, one per comparator
    pub ops: Arc<[CmpOp]>,
    /// Right-hand operands
    pub comparators: Exprs,
}

/// Conditional expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfExp {
    /// Condition
    pub test: Expr,
    /// Value when true
    pub body: Expr,
    /// Value when false
    pub orelse: Expr,
}

/// Dictionary display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dict {
    /// Keys; `None` marks `**mapping` unpacking
    pub keys: Arc<[Option<Expr>]>,
    /// Values
    pub values: Exprs,
}

/// Which container a comprehension builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComprehensionKind {
    /// `[elt for ...]`
    List,
    /// `{elt for ...}`
    Set,
    /// `{key: value for ...}`
    Dict,
    /// `(elt for ...)`
    Generator,
}

/// A comprehension or generator expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    /// Result container
    pub kind: ComprehensionKind,
    /// Element expression (key for dict comprehensions)
    pub elt: Expr,
    /// Value expression of dict comprehensions
    #[serde(default)]
    pub value: Option<Expr>,
    /// `for` clauses
    pub generators: Arc<[ComprehensionFor]>,
}

/// One `for target in iter if cond` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensionFor {
    /// Loop target
    pub target: Expr,
    /// Iterable
    pub iter: Expr,
    /// Filters
    #[serde(default)]
    pub ifs: Exprs,
}

/// Anonymous function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    /// Parameters
    pub args: Arc<Arguments>,
    /// Body expression
    pub body: Expr,
}

/// Assignment expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedExpr {
    /// Target name
    pub target: Expr,
    /// Value
    pub value: Expr,
}

/// Formatted value inside an f-string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedValue {
    /// Value
    pub value: Expr,
    /// Format spec
    #[serde(default)]
    pub format_spec: Option<Expr>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mult,
    /// `@`
    MatMult,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Pow,
    /// `<<`
    LShift,
    /// `>>`
    RShift,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `//`
    FloorDiv,
}

impl Operator {
    /// Method dispatched on the left operand.
    pub fn dunder(self) -> &'static str {
        match self {
            Operator::Add => "__add__",
            Operator::Sub => "__sub__",
            Operator::Mult => "__mul__",
            Operator::MatMult => "__matmul__",
            Operator::Div => "__truediv__",
            Operator::Mod => "__mod__",
            Operator::Pow => "__pow__",
            Operator::LShift => "__lshift__",
            Operator::RShift => "__rshift__",
            Operator::BitOr => "__or__",
            Operator::BitXor => "__xor__",
            Operator::BitAnd => "__and__",
            Operator::FloorDiv => "__floordiv__",
        }
    }

    /// Method tried on the right operand when the left declines.
    pub fn reflected_dunder(self) -> &'static str {
        match self {
            Operator::Add => "__radd__",
            Operator::Sub => "__rsub__",
            Operator::Mult => "__rmul__",
            Operator::MatMult => "__rmatmul__",
            Operator::Div => "__rtruediv__",
            Operator::Mod => "__rmod__",
            Operator::Pow => "__rpow__",
            Operator::LShift => "__rlshift__",
            Operator::RShift => "__rrshift__",
            Operator::BitOr => "__ror__",
            Operator::BitXor => "__rxor__",
            Operator::BitAnd => "__rand__",
            Operator::FloorDiv => "__rfloordiv__",
        }
    }

    /// In-place method tried first by augmented assignment.
    pub fn inplace_dunder(self) -> &'static str {
        match self {
            Operator::Add => "__iadd__",
            Operator::Sub => "__isub__",
            Operator::Mult => "__imul__",
            Operator::MatMult => "__imatmul__",
            Operator::Div => "__itruediv__",
            Operator::Mod => "__imod__",
            Operator::Pow => "__ipow__",
            Operator::LShift => "__ilshift__",
            Operator::RShift => "__irshift__",
            Operator::BitOr => "__ior__",
            Operator::BitXor => "__ixor__",
            Operator::BitAnd => "__iand__",
            Operator::FloorDiv => "__ifloordiv__",
        }
    }

    /// Source symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mult => "*",
            Operator::MatMult => "@",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "**",
            Operator::LShift => "<<",
            Operator::RShift => ">>",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::BitAnd => "&",
            Operator::FloorDiv => "//",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// `not`
    Not,
    /// `-`
    USub,
    /// `+`
    UAdd,
    /// `~`
    Invert,
}

impl UnaryOperator {
    /// Method dispatched on the operand; `not` uses boolean coercion.
    pub fn dunder(self) -> Option<&'static str> {
        match self {
            UnaryOperator::Not => None,
            UnaryOperator::USub => Some("__neg__"),
            UnaryOperator::UAdd => Some("__pos__"),
            UnaryOperator::Invert => Some("__invert__"),
        }
    }
}

/// Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOperator {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtE,
    /// `>`
    Gt,
    /// `>=`
    GtE,
    /// `is`
    Is,
    /// `is not`
    IsNot,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

impl CmpOp {
    /// Method dispatched for rich comparisons.
    pub fn dunder(self) -> Option<&'static str> {
        match self {
            CmpOp::Eq => Some("__eq__"),
            CmpOp::NotEq => Some("__ne__"),
            CmpOp::Lt => Some("__lt__"),
            CmpOp::LtE => Some("__le__"),
            CmpOp::Gt => Some("__gt__"),
            CmpOp::GtE => Some("__ge__"),
            CmpOp::Is | CmpOp::IsNot | CmpOp::In | CmpOp::NotIn => None,
        }
    }

    /// The operator with its operands swapped.
    pub fn reflected(self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::LtE => CmpOp::GtE,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::GtE => CmpOp::LtE,
            other => other,
        }
    }

    /// Source symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Function signatures
// ═══════════════════════════════════════════════════════════════════════

/// Parameter list of a function or lambda.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Arguments {
    /// Positional-only parameters
    #[serde(default)]
    pub posonlyargs: Arc<[Arg]>,
    /// Positional-or-keyword parameters
    #[serde(default)]
    pub args: Arc<[Arg]>,
    /// `*args`
    #[serde(default)]
    pub vararg: Option<Arg>,
    /// Keyword-only parameters
    #[serde(default)]
    pub kwonlyargs: Arc<[Arg]>,
    /// Defaults of keyword-only parameters, aligned with `kwonlyargs`
    #[serde(default)]
    pub kw_defaults: Arc<[Option<Expr>]>,
    /// `**kwargs`
    #[serde(default)]
    pub kwarg: Option<Arg>,
    /// Defaults of the trailing positional parameters
    #[serde(default)]
    pub defaults: Exprs,
}

impl Arguments {
    /// Positional parameters in binding order.
    pub fn positional(&self) -> impl Iterator<Item = &Arg> {
        self.posonlyargs.iter().chain(self.args.iter())
    }
}

/// One parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    /// Parameter name
    pub arg: Ident,
    /// Annotation, unevaluated
    #[serde(default)]
    pub annotation: Option<Expr>,
}

// ═══════════════════════════════════════════════════════════════════════
// Statements
// ═══════════════════════════════════════════════════════════════════════

/// Statement kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `def`
    FunctionDef(Arc<FunctionDef>),
    /// `async def`
    AsyncFunctionDef(Arc<FunctionDef>),
    /// `class`
    ClassDef(Arc<ClassDef>),
    /// `return [value]`
    Return(Option<Expr>),
    /// `del targets`
    Delete(Exprs),
    /// `t1 = t2 = value`
    Assign(Arc<Assign>),
    /// `target op= value`
    AugAssign(Arc<AugAssign>),
    /// `target: annotation [= value]`
    AnnAssign(Arc<AnnAssign>),
    /// `for`
    For(Arc<For>),
    /// `async for`
    AsyncFor(Arc<For>),
    /// `while`
    While(Arc<While>),
    /// `if`
    If(Arc<If>),
    /// `with`
    With(Arc<With>),
    /// `async with`
    AsyncWith(Arc<With>),
    /// `raise [exc [from cause]]`
    Raise(Arc<Raise>),
    /// `try`
    Try(Arc<Try>),
    /// `assert test[, msg]`
    Assert(Arc<Assert>),
    /// `import a.b as c`
    Import(Arc<[Alias]>),
    /// `from m import n`
    ImportFrom(Arc<ImportFrom>),
    /// `global names`
    Global(Arc<[Ident]>),
    /// `nonlocal names`
    Nonlocal(Arc<[Ident]>),
    /// Expression statement
    Expr(Expr),
    /// `pass`
    Pass,
    /// `break`
    Break,
    /// `continue`
    Continue,
}

/// Function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Function name
    pub name: Ident,
    /// Parameters
    #[serde(default)]
    pub args: Arc<Arguments>,
    /// Body
    pub body: Block,
    /// Decorators, outermost first
    #[serde(default)]
    pub decorator_list: Exprs,
    /// Return annotation, unevaluated
    #[serde(default)]
    pub returns: Option<Expr>,
}

/// Class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Class name
    pub name: Ident,
    /// Base class expressions
    #[serde(default)]
    pub bases: Exprs,
    /// Class keywords such as `metaclass=`
    #[serde(default)]
    pub keywords: Arc<[Keyword]>,
    /// Body
    pub body: Block,
    /// Decorators, outermost first
    #[serde(default)]
    pub decorator_list: Exprs,
}

/// Assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    /// Targets, assigned left to right
    pub targets: Exprs,
    /// Value, evaluated once
    pub value: Expr,
}

/// Augmented assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugAssign {
    /// Target
    pub target: Expr,
    /// Operator
    pub op: Operator,
    /// Right-hand value
    pub value: Expr,
}

/// Annotated assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnAssign {
    /// Target
    pub target: Expr,
    /// Annotation, unevaluated
    pub annotation: Expr,
    /// Optional value
    #[serde(default)]
    pub value: Option<Expr>,
}

/// `for target in iter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct For {
    /// Loop target
    pub target: Expr,
    /// Iterable
    pub iter: Expr,
    /// Body
    pub body: Block,
    /// Runs when the iterator is exhausted without `break`
    #[serde(default)]
    pub orelse: Block,
}

/// `while test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct While {
    /// Condition
    pub test: Expr,
    /// Body
    pub body: Block,
    /// Runs when the condition turns false without `break`
    #[serde(default)]
    pub orelse: Block,
}

/// `if test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct If {
    /// Condition
    pub test: Expr,
    /// Body
    pub body: Block,
    /// `else` / `elif` branch
    #[serde(default)]
    pub orelse: Block,
}

/// `with items: body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct With {
    /// Context managers, entered left to right
    pub items: Arc<[WithItem]>,
    /// Body
    pub body: Block,
}

/// `context_expr as optional_vars`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithItem {
    /// Context manager expression
    pub context_expr: Expr,
    /// Binding target for `__enter__`'s result
    #[serde(default)]
    pub optional_vars: Option<Expr>,
}

/// `raise`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Raise {
    /// Exception; absent for a bare re-raise
    #[serde(default)]
    pub exc: Option<Expr>,
    /// Explicit cause
    #[serde(default)]
    pub cause: Option<Expr>,
}

/// `try`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Try {
    /// Guarded body
    pub body: Block,
    /// `except` clauses
    #[serde(default)]
    pub handlers: Arc<[ExceptHandler]>,
    /// Runs when the body completes without exception
    #[serde(default)]
    pub orelse: Block,
    /// Always runs
    #[serde(default)]
    pub finalbody: Block,
}

/// `except type as name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    /// Matched type or tuple of types; absent for bare `except`
    #[serde(default, rename = "type")]
    pub type_: Option<Expr>,
    /// Binding name
    #[serde(default)]
    pub name: Option<Ident>,
    /// Handler body
    pub body: Block,
}

/// `assert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assert {
    /// Condition
    pub test: Expr,
    /// Message, evaluated only on failure
    #[serde(default)]
    pub msg: Option<Expr>,
}

/// `name as asname`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    /// Dotted module name or imported name; `*` for star imports
    pub name: Ident,
    /// Local binding
    #[serde(default)]
    pub asname: Option<Ident>,
}

/// `from module import names`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFrom {
    /// Module path, absent for `from . import x`
    #[serde(default)]
    pub module: Option<Ident>,
    /// Imported names
    pub names: Arc<[Alias]>,
    /// Number of leading dots
    #[serde(default)]
    pub level: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_module_from_json() {
        let json = r#"{
            "body": [
                {"Assign": {"targets": [{"Name": {"id": "a"}}],
                            "value": {"Constant": {"Number": 1}}}},
                {"While": {"test": {"Constant": "False"}, "body": ["Pass"]}}
            ]
        }"#;
        let module: Module = serde_json::from_str(json).unwrap();
        assert_eq!(module.body.len(), 2);
        assert_eq!(
            module.body[0],
            build::assign(build::name("a"), build::int(1))
        );
        assert_eq!(
            module.body[1],
            build::while_(build::boolean(false), vec![Stmt::Pass], vec![])
        );
    }

    #[test]
    fn test_handler_type_field_is_renamed() {
        let json = r#"{"type": {"Name": {"id": "E"}}, "name": "e", "body": ["Pass"]}"#;
        let handler: ExceptHandler = serde_json::from_str(json).unwrap();
        assert_eq!(handler.type_, Some(build::name("E")));
        assert_eq!(handler.name.as_deref(), Some("e"));
    }
}
