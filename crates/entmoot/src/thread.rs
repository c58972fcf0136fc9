//! Per-thread evaluation entry points.
//!
//! A [`ThreadContext`] pairs a borrowed [`ProcessContext`] with the module
//! its programs run in. Any number of threads may evaluate concurrently
//! against one process; each evaluation gets its own evaluator stacks.

use crate::ast;
use crate::error::Result;
use crate::eval::{Evaluator, FrameKind};
use crate::object::Object;
use crate::process::ProcessContext;

/// A program unit ready to evaluate.
#[derive(Debug, Clone)]
pub enum Unit {
    /// Statements run for effect
    Module(ast::Module),
    /// Statements whose expression statements produce the result
    Interactive(ast::Interactive),
    /// One expression producing the result
    Expression(ast::Expression),
}

impl From<ast::Module> for Unit {
    fn from(module: ast::Module) -> Self {
        Unit::Module(module)
    }
}

impl From<ast::Interactive> for Unit {
    fn from(interactive: ast::Interactive) -> Self {
        Unit::Interactive(interactive)
    }
}

impl From<ast::Expression> for Unit {
    fn from(expression: ast::Expression) -> Self {
        Unit::Expression(expression)
    }
}

/// One thread's view of a process.
pub struct ThreadContext<'p> {
    process: &'p ProcessContext,
    module: Object,
    ret: Option<Object>,
}

impl<'p> ThreadContext<'p> {
    /// A context running in a fresh `__main__` module.
    pub fn new(process: &'p ProcessContext) -> Self {
        let module = process.make_module("__main__");
        Self::with_module(process, module)
    }

    /// A context running in `module`.
    pub fn with_module(process: &'p ProcessContext, module: Object) -> Self {
        ThreadContext {
            process,
            module,
            ret: None,
        }
    }

    /// The owning process.
    pub fn process(&self) -> &'p ProcessContext {
        self.process
    }

    /// The module programs run in.
    pub fn module(&self) -> &Object {
        &self.module
    }

    /// Evaluate a unit to completion, returning its result value.
    ///
    /// Modules produce `None`. An uncaught exception is returned as
    /// [`EvalError::Exception`](crate::error::EvalError::Exception).
    pub fn evaluate(&mut self, unit: impl Into<Unit>) -> Result<Object> {
        let unit = unit.into();
        let span = tracing::debug_span!("evaluate", kind = unit_kind(&unit));
        let _enter = span.enter();

        self.ret = None;
        let mut evaluator = Evaluator::new(self.process);
        match unit {
            Unit::Module(module) => evaluator.enter_block(&self.module, module.body, FrameKind::Module)?,
            Unit::Interactive(interactive) => {
                evaluator.enter_block(&self.module, interactive.body, FrameKind::Interactive)?
            }
            Unit::Expression(expression) => evaluator.enter_expression(&self.module, expression.body)?,
        }
        let outcome = evaluator.run();
        if let Err(error) = &outcome {
            tracing::debug!(%error, "evaluation raised");
        }
        outcome?;
        self.ret = evaluator.take_return();
        Ok(self.return_value())
    }

    /// Run a module body.
    pub fn evaluate_module(&mut self, module: &ast::Module) -> Result<Object> {
        self.evaluate(module.clone())
    }

    /// Run an interactive unit.
    pub fn evaluate_interactive(&mut self, interactive: &ast::Interactive) -> Result<Object> {
        self.evaluate(interactive.clone())
    }

    /// Evaluate one expression.
    pub fn evaluate_expression(&mut self, expr: ast::Expr) -> Result<Object> {
        self.evaluate(ast::Expression { body: expr })
    }

    /// The result of the last evaluation, `None` when it produced nothing.
    pub fn return_value(&self) -> Object {
        self.ret.clone().unwrap_or_else(|| self.process.none())
    }

    /// Raise a pending interrupt, if any.
    pub fn process_interrupts(&self) -> Result<()> {
        self.process.process_interrupts()
    }
}

fn unit_kind(unit: &Unit) -> &'static str {
    match unit {
        Unit::Module(_) => "module",
        Unit::Interactive(_) => "interactive",
        Unit::Expression(_) => "expression",
    }
}
