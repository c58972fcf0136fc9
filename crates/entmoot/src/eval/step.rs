//! Scheduler steps.

use std::fmt;
use std::sync::Arc;

use super::Evaluator;
use crate::ast::{self, BoolOp, Compare, Expr, IfExp, Operator, UnaryOperator};
use crate::error::Result;
use crate::object::Object;

/// A one-shot continuation.
pub(crate) type Deferred = Box<dyn FnOnce(&mut Evaluator<'_>) -> Result<()>>;

/// One unit of scheduled work.
///
/// Running a step does a bounded amount of native work and may push more
/// steps, bodies or frames; it never evaluates a sub-expression in place.
pub(crate) enum Step {
    /// Run `block[index]`, scheduling the rest of the block first
    Block(ast::Block, usize),
    /// Evaluate an expression, leaving its value on the operand stack
    Get(Expr),
    /// Push an already computed value
    Push(Object),
    /// Drop the top of the operand stack
    Discard,
    /// Pop into the frame's return slot
    SetReturn,
    /// Push the value returned by the frame that just finished
    PushReturn,
    /// Pop and assign to a target
    Store(Expr),
    /// Replace the top of the stack by one of its attributes
    GetAttr(ast::Ident),
    /// Stack holds callee, arguments and keyword values from `height` up
    Call {
        /// The call expression
        node: Arc<ast::Call>,
        /// Stack height before the callee was evaluated
        height: usize,
    },
    /// Pop two operands and apply a binary operator
    Binary(Operator),
    /// Pop two operands and apply an in-place operator
    InPlace(Operator),
    /// Pop one operand and apply a unary operator
    Unary(UnaryOperator),
    /// Negate the boolean on top of the stack
    Not,
    /// Coerce the top of the stack to `True` or `False`
    ToBool,
    /// Check the result of a `__bool__` call
    BoolResult,
    /// Coerce the top of the stack with `str()`
    ToStr,
    /// Compare the value on top of the stack with `comparators[index]`
    Compare {
        /// The comparison chain
        node: Arc<Compare>,
        /// Position in the chain
        index: usize,
    },
    /// Short-circuit check after `values[index - 1]`
    BoolOp {
        /// The operator chain
        node: Arc<BoolOp>,
        /// Next operand
        index: usize,
    },
    /// Choose a branch of a conditional expression
    IfExp(Arc<IfExp>),
    /// Choose a branch of an `if` statement
    If(Arc<ast::If>),
    /// Evaluate a loop condition
    WhileTest(Arc<ast::While>),
    /// Enter an iteration or leave the loop
    WhileBranch(Arc<ast::While>),
    /// Ask the iterator for the next item
    ForNext {
        /// The loop
        node: Arc<ast::For>,
        /// The loop's iterator
        iterator: Object,
    },
    /// Bind the next item and run one iteration
    ForBind {
        /// The loop
        node: Arc<ast::For>,
        /// The loop's iterator
        iterator: Object,
    },
    /// The guarded body finished: leave the handlers' scope, run `else`
    TryElse(Arc<ast::Try>),
    /// The try statement finished normally: run `finally`
    FinallyNormal(Arc<ast::Try>),
    /// A finally block finished: resume whatever it interrupted
    EndCleanup,
    /// A with body finished normally: call `__exit__`
    WithExit(Object),
    /// Anything else
    Deferred(Deferred),
}

impl Step {
    /// Wrap a closure as a step.
    pub(crate) fn deferred(
        deferred: impl FnOnce(&mut Evaluator<'_>) -> Result<()> + 'static,
    ) -> Step {
        Step::Deferred(Box::new(deferred))
    }

    /// Short name for step tracing.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Step::Block(..) => "block",
            Step::Get(_) => "get",
            Step::Push(_) => "push",
            Step::Discard => "discard",
            Step::SetReturn => "set_return",
            Step::PushReturn => "push_return",
            Step::Store(_) => "store",
            Step::GetAttr(_) => "get_attr",
            Step::Call { .. } => "call",
            Step::Binary(_) => "binary",
            Step::InPlace(_) => "in_place",
            Step::Unary(_) => "unary",
            Step::Not => "not",
            Step::ToBool => "to_bool",
            Step::BoolResult => "bool_result",
            Step::ToStr => "to_str",
            Step::Compare { .. } => "compare",
            Step::BoolOp { .. } => "bool_op",
            Step::IfExp(_) => "if_exp",
            Step::If(_) => "if",
            Step::WhileTest(_) => "while_test",
            Step::WhileBranch(_) => "while_branch",
            Step::ForNext { .. } => "for_next",
            Step::ForBind { .. } => "for_bind",
            Step::TryElse(_) => "try_else",
            Step::FinallyNormal(_) => "finally",
            Step::EndCleanup => "end_cleanup",
            Step::WithExit(_) => "with_exit",
            Step::Deferred(_) => "deferred",
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
