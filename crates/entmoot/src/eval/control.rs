//! Loops, `try` and `with`.
//!
//! Each compound statement opens a body whose [`BodyKind`] tells the
//! unwinder what to do when an exception or a jump leaves it. Loop
//! iterations reschedule a step on the loop body instead of recursing.

use std::sync::Arc;

use super::{BodyKind, Evaluator, Kwargs, Pending, Step};
use crate::ast;
use crate::error::{BaseException, EvalError, Result};
use crate::object::{Object, Value};
use crate::protocol::{self, find_special};

impl Evaluator<'_> {
    // ───────────────────────────────────────────────────────────────────
    // while
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn while_test(&mut self, node: Arc<ast::While>) -> Result<()> {
        let test = node.test.clone();
        self.push_step(Step::WhileBranch(node))?;
        self.push_step(Step::ToBool)?;
        self.push_step(Step::Get(test))
    }

    pub(crate) fn while_branch(&mut self, node: Arc<ast::While>) -> Result<()> {
        if self.pop()?.get_bool() {
            let body = node.body.clone();
            self.push_step(Step::WhileTest(node))?;
            return self.push_body(BodyKind::Block, vec![Step::Block(body, 0)]);
        }
        self.pop_body()?;
        if node.orelse.is_empty() {
            return Ok(());
        }
        self.push_step(Step::Block(node.orelse.clone(), 0))
    }

    // ───────────────────────────────────────────────────────────────────
    // for
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn enter_for(&mut self, node: Arc<ast::For>) -> Result<()> {
        let iter = node.iter.clone();
        self.defer(move |ev| {
            let iterable = ev.pop()?;
            ev.defer(move |ev| {
                let iterator = ev.pop()?;
                ev.push_body(BodyKind::Loop, vec![Step::ForNext { node, iterator }])
            })?;
            ev.call_special(iterable, "__iter__", Vec::new())
        })?;
        self.push_step(Step::Get(iter))
    }

    /// Ask for the next item; `StopIteration` from `__next__` reaches the
    /// `Next` body and ends the loop.
    pub(crate) fn for_next(&mut self, node: Arc<ast::For>, iterator: Object) -> Result<()> {
        let bind = Step::ForBind {
            node: Arc::clone(&node),
            iterator: iterator.clone(),
        };
        self.push_body(BodyKind::Next(node), vec![bind])?;
        self.call_special(iterator, "__next__", Vec::new())
    }

    pub(crate) fn for_bind(&mut self, node: Arc<ast::For>, iterator: Object) -> Result<()> {
        let value = self.pop()?;
        self.pop_body()?;
        let (body, target) = (node.body.clone(), node.target.clone());
        self.push_step(Step::ForNext { node, iterator })?;
        self.push_body(
            BodyKind::Block,
            vec![Step::Block(body, 0), Step::Store(target), Step::Push(value)],
        )
    }

    pub(crate) fn end_for(&mut self, node: &ast::For) -> Result<()> {
        self.pop_body()?;
        if node.orelse.is_empty() {
            return Ok(());
        }
        self.push_step(Step::Block(node.orelse.clone(), 0))
    }

    // ───────────────────────────────────────────────────────────────────
    // try
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn enter_try(&mut self, node: Arc<ast::Try>) -> Result<()> {
        if !node.finalbody.is_empty() {
            self.push_body(
                BodyKind::Finally(Arc::clone(&node)),
                vec![Step::FinallyNormal(Arc::clone(&node))],
            )?;
        }
        let body = Step::Block(node.body.clone(), 0);
        if node.handlers.is_empty() {
            return self.push_body(BodyKind::Block, vec![body]);
        }
        self.push_body(
            BodyKind::Try(Arc::clone(&node)),
            vec![Step::TryElse(node), body],
        )
    }

    /// The guarded body completed: handlers no longer apply.
    pub(crate) fn try_else(&mut self, node: Arc<ast::Try>) -> Result<()> {
        self.pop_body()?;
        if node.orelse.is_empty() {
            return Ok(());
        }
        self.push_step(Step::Block(node.orelse.clone(), 0))
    }

    pub(crate) fn finally_normal(&mut self, node: Arc<ast::Try>) -> Result<()> {
        self.pop_body()?;
        self.run_finally(&node, None)
    }

    /// Run the finally block, then resume `pending`.
    pub(crate) fn run_finally(&mut self, node: &ast::Try, pending: Option<Pending>) -> Result<()> {
        self.push_body(
            BodyKind::Cleanup(pending),
            vec![Step::EndCleanup, Step::Block(node.finalbody.clone(), 0)],
        )
    }

    pub(crate) fn end_cleanup(&mut self) -> Result<()> {
        match self.pop_body()?.kind {
            BodyKind::Cleanup(None) => Ok(()),
            BodyKind::Cleanup(Some(Pending::Raise(exception))) => Err(exception.into()),
            BodyKind::Cleanup(Some(pending)) => self.unwind(pending),
            _ => Err(EvalError::fatal("cleanup body expected")),
        }
    }

    /// An exception left the guarded body of `node`.
    pub(crate) fn enter_handlers(&mut self, node: Arc<ast::Try>, exception: BaseException) -> Result<()> {
        self.push_body(BodyKind::Handler(exception.clone()), Vec::new())?;
        self.match_handler(node, 0, exception)
    }

    fn match_handler(&mut self, node: Arc<ast::Try>, index: usize, exception: BaseException) -> Result<()> {
        let Some(handler) = node.handlers.get(index) else {
            return Err(exception.into());
        };
        let Some(type_) = handler.type_.clone() else {
            return self.enter_handler(&node, index, exception);
        };
        self.defer(move |ev| {
            let class = ev.pop()?;
            if ev.exception_matches(exception.value(), &class)? {
                ev.enter_handler(&node, index, exception)
            } else {
                ev.match_handler(node, index + 1, exception)
            }
        })?;
        self.push_step(Step::Get(type_))
    }

    fn enter_handler(&mut self, node: &ast::Try, index: usize, exception: BaseException) -> Result<()> {
        let handler = node
            .handlers
            .get(index)
            .ok_or_else(|| EvalError::fatal("handler index out of range"))?;
        if let Some(name) = &handler.name {
            self.store_name(name, exception.value().clone())?;
        }
        let name = handler.name.clone();
        self.defer(move |ev| {
            if let Some(name) = name {
                // the handler body may already have deleted it
                let _ = ev.delete_name(&name);
            }
            ev.pop_body().map(drop)
        })?;
        self.push_step(Step::Block(handler.body.clone(), 0))
    }

    /// Whether the raised `value` matches an `except` clause's class or
    /// tuple of classes.
    pub(crate) fn exception_matches(&self, value: &Object, class: &Object) -> Result<bool> {
        if let Value::Tuple(classes) = class.value() {
            for class in classes {
                if self.exception_matches(value, class)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        if !self.is_exception_class(class) {
            return Err(self.type_error(
                "catching classes that do not inherit from BaseException is not allowed",
            ));
        }
        Ok(protocol::is_instance(value, class))
    }

    // ───────────────────────────────────────────────────────────────────
    // with
    // ───────────────────────────────────────────────────────────────────

    /// Enter `items[index]`, or run the body once every item is entered.
    pub(crate) fn enter_with(&mut self, node: Arc<ast::With>, index: usize) -> Result<()> {
        let Some(item) = node.items.get(index) else {
            return self.push_step(Step::Block(node.body.clone(), 0));
        };
        let context = item.context_expr.clone();
        self.defer(move |ev| {
            let manager = ev.pop()?;
            ev.with_manager(node, index, manager)
        })?;
        self.push_step(Step::Get(context))
    }

    fn with_manager(&mut self, node: Arc<ast::With>, index: usize, manager: Object) -> Result<()> {
        let (Some(enter), Some(exit)) = (
            find_special(&manager, "__enter__"),
            find_special(&manager, "__exit__"),
        ) else {
            return Err(self.type_error(format!(
                "'{}' object does not support the context manager protocol",
                manager.type_name()
            )));
        };
        let exit = self.materialize(exit);
        let target = node
            .items
            .get(index)
            .and_then(|item| item.optional_vars.clone());
        self.defer(move |ev| {
            let entered = ev.pop()?;
            let mut steps = vec![
                Step::WithExit(exit.clone()),
                Step::deferred(move |ev| ev.enter_with(node, index + 1)),
            ];
            if let Some(target) = target {
                steps.push(Step::Store(target));
                steps.push(Step::Push(entered));
            }
            ev.push_body(BodyKind::With(exit), steps)
        })?;
        self.call_attribute(enter, Vec::new(), Kwargs::new())
    }

    /// The with body completed normally.
    pub(crate) fn with_exit(&mut self, exit: Object) -> Result<()> {
        self.pop_body()?;
        self.push_step(Step::Discard)?;
        let none = self.process.none();
        self.call(exit, vec![none.clone(), none.clone(), none], Kwargs::new())
    }

    /// An exception left a with body: `__exit__` decides whether it is
    /// suppressed.
    pub(crate) fn with_exit_exceptional(&mut self, exit: Object, exception: BaseException) -> Result<()> {
        let value = exception.value().clone();
        let none = self.process.none();
        let class = value.class().unwrap_or_else(|| none.clone());
        self.push_body(BodyKind::Handler(exception.clone()), Vec::new())?;
        self.defer(move |ev| {
            let suppress = ev.pop()?.get_bool();
            ev.pop_body()?;
            if suppress {
                Ok(())
            } else {
                Err(exception.into())
            }
        })?;
        self.push_step(Step::ToBool)?;
        self.call(exit, vec![class, value, none], Kwargs::new())
    }

    /// A jump left a with body: call `__exit__`, then keep unwinding.
    pub(crate) fn with_exit_jump(&mut self, exit: Object, pending: Pending) -> Result<()> {
        self.push_body(
            BodyKind::Cleanup(Some(pending)),
            vec![Step::EndCleanup, Step::Discard],
        )?;
        let none = self.process.none();
        self.call(exit, vec![none.clone(), none.clone(), none], Kwargs::new())
    }
}
