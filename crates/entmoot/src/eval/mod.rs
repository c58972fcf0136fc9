//! The continuation scheduler.
//!
//! An [`Evaluator`] never recurses on the native stack. Evaluation state is
//! three explicit stacks:
//!
//! - **frames**: one per active function, class body or program unit;
//! - **bodies** within each frame: a block of pending steps plus what the
//!   block means for control flow (loop, try, finally, with, ...);
//! - **steps** within each body, and one shared **operand stack** of
//!   Objects between them.
//!
//! The main loop pops the top step of the top body of the top frame and
//! runs it. A step may push values, steps, bodies or frames, all of which
//! run before anything beneath them. Exceptions, `break`, `continue` and
//! `return` unwind these stacks directly.

mod call;
mod control;
mod define;
mod expr;
mod import;
mod native;
mod ops;
mod scope;
mod step;
mod stmt;

use std::sync::Arc;

use crate::ast::{self, Expr, Ident};
use crate::builtins::Builtins;
use crate::error::{BaseException, EvalError, Result};
use crate::object::{Object, Value};
use crate::process::ProcessContext;

pub(crate) use call::Kwargs;
pub(crate) use step::Step;

// ═══════════════════════════════════════════════════════════════════════
// Frames and bodies
// ═══════════════════════════════════════════════════════════════════════

/// What a frame evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// A module body
    Module,
    /// An interactive unit; expression statements set the return value
    Interactive,
    /// A function call
    Function,
    /// A class body
    Class,
}

/// How a name is bound in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// `global`
    Global,
    /// `nonlocal`
    Nonlocal,
}

/// One activation.
pub(crate) struct Frame {
    kind: FrameKind,
    locals: Object,
    globals: Object,
    enclosing: Vec<Object>,
    declared: Vec<(Ident, Scope)>,
    bodies: Vec<Body>,
    ret: Option<Object>,
    qualname: Option<Arc<str>>,
}

impl Frame {
    fn declared(&self, name: &str) -> Option<Scope> {
        self.declared
            .iter()
            .find(|(declared, _)| &**declared == name)
            .map(|(_, scope)| *scope)
    }
}

/// A block of pending steps.
pub(crate) struct Body {
    kind: BodyKind,
    steps: Vec<Step>,
    height: usize,
}

/// Control-flow role of a body.
pub(crate) enum BodyKind {
    /// Plain block
    Block,
    /// Loop control; target of `break` and `continue`
    Loop,
    /// Guarded `try` body; exceptions go to the handlers
    Try(Arc<ast::Try>),
    /// Region whose `finally` block must run however it is left
    Finally(Arc<ast::Try>),
    /// An exception handler, or `__exit__` called for an exception
    Handler(BaseException),
    /// A finally block, with the action it interrupted
    Cleanup(Option<Pending>),
    /// A `for` loop waiting on `__next__`
    Next(Arc<ast::For>),
    /// Body of a `with` statement
    With(Object),
    /// Catches one exception class, pushing a fallback value instead
    Catch {
        /// Exception class caught
        class: Object,
        /// Value pushed when caught
        fallback: Object,
    },
}

/// An action interrupted by a finally block.
pub(crate) enum Pending {
    Raise(BaseException),
    Break,
    Continue,
    Return,
}

// ═══════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════

/// Runs one program unit to completion on the calling thread.
pub(crate) struct Evaluator<'p> {
    process: &'p ProcessContext,
    frames: Vec<Frame>,
    stack: Vec<Object>,
    ret: Option<Object>,
    /// Length of the non-code call chain being dispatched
    hops: usize,
}

impl<'p> Evaluator<'p> {
    pub(crate) fn new(process: &'p ProcessContext) -> Self {
        Evaluator {
            process,
            frames: Vec::new(),
            stack: Vec::new(),
            ret: None,
            hops: 0,
        }
    }

    pub(crate) fn builtins(&self) -> &'p Builtins {
        self.process.builtins()
    }

    /// Schedule statements with `module` as both locals and globals.
    pub(crate) fn enter_block(&mut self, module: &Object, body: ast::Block, kind: FrameKind) -> Result<()> {
        self.push_frame(kind, module.clone(), module.clone(), Vec::new(), vec![Step::Block(body, 0)])
    }

    /// Schedule one expression whose value becomes the return value.
    pub(crate) fn enter_expression(&mut self, module: &Object, expr: Expr) -> Result<()> {
        self.push_frame(
            FrameKind::Module,
            module.clone(),
            module.clone(),
            Vec::new(),
            vec![Step::SetReturn, Step::Get(expr)],
        )
    }

    /// The value left by the last frame to finish.
    pub(crate) fn take_return(&mut self) -> Option<Object> {
        self.ret.take()
    }

    /// Operand stack depth; zero once a unit has completed.
    pub(crate) fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Run until every frame has finished.
    pub(crate) fn run(&mut self) -> Result<()> {
        let trace = self.process.config().trace_steps;
        while let Some(frame) = self.frames.last_mut() {
            let step = match frame.bodies.last_mut() {
                None => {
                    self.pop_frame();
                    continue;
                }
                Some(body) => match body.steps.pop() {
                    Some(step) => step,
                    None => {
                        frame.bodies.pop();
                        continue;
                    }
                },
            };
            if trace {
                tracing::trace!(
                    step = step.name(),
                    frames = self.frames.len(),
                    stack = self.stack.len(),
                    "step"
                );
            }
            let result = {
                let _pin = self.process.collector().pin();
                self.process
                    .process_interrupts()
                    .and_then(|()| self.step(step))
            };
            if let Err(error) = result {
                self.raise(error)?;
            }
        }
        Ok(())
    }

    fn step(&mut self, step: Step) -> Result<()> {
        match step {
            Step::Block(block, index) => self.block(block, index),
            Step::Get(expr) => self.get(expr),
            Step::Push(object) => {
                self.push(object);
                Ok(())
            }
            Step::Discard => self.pop().map(drop),
            Step::SetReturn => {
                let value = self.pop()?;
                self.frame_mut()?.ret = Some(value);
                Ok(())
            }
            Step::PushReturn => {
                let value = self.ret.take().unwrap_or_else(|| self.process.none());
                self.push(value);
                Ok(())
            }
            Step::Store(target) => self.store(target),
            Step::GetAttr(name) => {
                let object = self.pop()?;
                self.get_attribute(object, &name)
            }
            Step::Call { node, height } => self.call_expression(&node, height),
            Step::Binary(op) => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.binary(op, left, right)
            }
            Step::InPlace(op) => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.in_place(op, left, right)
            }
            Step::Unary(op) => {
                let operand = self.pop()?;
                self.unary(op, operand)
            }
            Step::Not => {
                let value = self.pop()?;
                let negated = self.process.boolean(!value.get_bool());
                self.push(negated);
                Ok(())
            }
            Step::ToBool => self.to_bool(),
            Step::BoolResult => self.bool_result(),
            Step::ToStr => self.to_str(),
            Step::Compare { node, index } => self.compare_next(node, index),
            Step::BoolOp { node, index } => self.bool_op(node, index),
            Step::IfExp(node) => {
                let test = self.pop()?;
                let branch = if test.get_bool() { &node.body } else { &node.orelse };
                self.push_step(Step::Get(branch.clone()))
            }
            Step::If(node) => {
                let test = self.pop()?;
                let branch = if test.get_bool() { &node.body } else { &node.orelse };
                if branch.is_empty() {
                    return Ok(());
                }
                self.push_step(Step::Block(branch.clone(), 0))
            }
            Step::WhileTest(node) => self.while_test(node),
            Step::WhileBranch(node) => self.while_branch(node),
            Step::ForNext { node, iterator } => self.for_next(node, iterator),
            Step::ForBind { node, iterator } => self.for_bind(node, iterator),
            Step::TryElse(node) => self.try_else(node),
            Step::FinallyNormal(node) => self.finally_normal(node),
            Step::EndCleanup => self.end_cleanup(),
            Step::WithExit(exit) => self.with_exit(exit),
            Step::Deferred(deferred) => deferred(self),
        }
    }

    fn block(&mut self, block: ast::Block, index: usize) -> Result<()> {
        let Some(stmt) = block.get(index).cloned() else {
            return Ok(());
        };
        if index + 1 < block.len() {
            self.push_step(Step::Block(block, index + 1))?;
        }
        self.exec(stmt)
    }

    // ───────────────────────────────────────────────────────────────────
    // Stack plumbing
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn push(&mut self, object: Object) {
        self.stack.push(object);
    }

    pub(crate) fn pop(&mut self) -> Result<Object> {
        self.stack
            .pop()
            .ok_or_else(|| EvalError::fatal("operand stack underflow"))
    }

    pub(crate) fn top(&self) -> Result<&Object> {
        self.stack
            .last()
            .ok_or_else(|| EvalError::fatal("operand stack underflow"))
    }

    /// Everything above `height`, bottom first.
    pub(crate) fn pop_from(&mut self, height: usize) -> Result<Vec<Object>> {
        if height > self.stack.len() {
            return Err(EvalError::fatal("operand stack underflow"));
        }
        Ok(self.stack.split_off(height))
    }

    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| EvalError::fatal("no active frame"))
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| EvalError::fatal("no active frame"))
    }

    pub(crate) fn push_step(&mut self, step: Step) -> Result<()> {
        self.frame_mut()?
            .bodies
            .last_mut()
            .ok_or_else(|| EvalError::fatal("no active body"))?
            .steps
            .push(step);
        Ok(())
    }

    pub(crate) fn defer(
        &mut self,
        deferred: impl FnOnce(&mut Evaluator<'_>) -> Result<()> + 'static,
    ) -> Result<()> {
        self.push_step(Step::deferred(deferred))
    }

    /// Open a body; `steps` run last-first.
    pub(crate) fn push_body(&mut self, kind: BodyKind, steps: Vec<Step>) -> Result<()> {
        let height = self.stack.len();
        self.frame_mut()?.bodies.push(Body {
            kind,
            steps,
            height,
        });
        Ok(())
    }

    /// Close the current body.
    pub(crate) fn pop_body(&mut self) -> Result<Body> {
        self.frame_mut()?
            .bodies
            .pop()
            .ok_or_else(|| EvalError::fatal("no active body"))
    }

    pub(crate) fn push_frame(
        &mut self,
        kind: FrameKind,
        locals: Object,
        globals: Object,
        enclosing: Vec<Object>,
        steps: Vec<Step>,
    ) -> Result<()> {
        if self.frames.len() >= self.process.config().max_frames {
            return Err(self.process.error(
                &self.builtins().exceptions.recursion_error,
                "maximum recursion depth exceeded",
            ));
        }
        let height = self.stack.len();
        self.frames.push(Frame {
            kind,
            locals,
            globals,
            enclosing,
            declared: Vec::new(),
            bodies: vec![Body {
                kind: BodyKind::Block,
                steps,
                height,
            }],
            ret: None,
            qualname: None,
        });
        Ok(())
    }

    fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            self.ret = frame.ret;
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Exceptions
    // ───────────────────────────────────────────────────────────────────

    /// Unwind to the nearest body that handles `error`. Returns the error
    /// when it escapes every frame.
    fn raise(&mut self, error: EvalError) -> Result<()> {
        let mut exception = match error {
            EvalError::Exception(exception) => exception,
            fatal @ EvalError::Fatal { .. } => return Err(fatal),
        };
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Err(exception.into());
            };
            let Some(body) = frame.bodies.pop() else {
                self.frames.pop();
                continue;
            };
            self.stack.truncate(body.height);
            match self.catch(body, exception) {
                Ok(None) => return Ok(()),
                Ok(Some(uncaught)) | Err(EvalError::Exception(uncaught)) => exception = uncaught,
                Err(fatal) => return Err(fatal),
            }
        }
    }

    /// Offer `exception` to a body being unwound. `None` means handled.
    fn catch(&mut self, body: Body, exception: BaseException) -> Result<Option<BaseException>> {
        match body.kind {
            BodyKind::Block | BodyKind::Loop => Ok(Some(exception)),
            BodyKind::Handler(handled) => {
                chain_context(&exception, &handled);
                Ok(Some(exception))
            }
            BodyKind::Cleanup(pending) => {
                if let Some(Pending::Raise(interrupted)) = pending {
                    chain_context(&exception, &interrupted);
                }
                Ok(Some(exception))
            }
            BodyKind::Try(node) => {
                self.enter_handlers(node, exception)?;
                Ok(None)
            }
            BodyKind::Finally(node) => {
                self.run_finally(&node, Some(Pending::Raise(exception)))?;
                Ok(None)
            }
            BodyKind::Next(node) => {
                let stop = &self.builtins().exceptions.stop_iteration;
                if crate::protocol::is_instance(exception.value(), stop) {
                    self.end_for(&node)?;
                    Ok(None)
                } else {
                    Ok(Some(exception))
                }
            }
            BodyKind::With(exit) => {
                self.with_exit_exceptional(exit, exception)?;
                Ok(None)
            }
            BodyKind::Catch { class, fallback } => {
                if crate::protocol::is_instance(exception.value(), &class) {
                    self.push(fallback);
                    Ok(None)
                } else {
                    Ok(Some(exception))
                }
            }
        }
    }

    /// The innermost exception being handled on this thread.
    pub(crate) fn handled_exception(&self) -> Option<BaseException> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.bodies.iter().rev())
            .find_map(|body| match &body.kind {
                BodyKind::Handler(exception) => Some(exception.clone()),
                BodyKind::Cleanup(Some(Pending::Raise(exception))) => Some(exception.clone()),
                _ => None,
            })
    }

    // ───────────────────────────────────────────────────────────────────
    // break, continue, return
    // ───────────────────────────────────────────────────────────────────

    /// Pop bodies for a jump, stopping at the first finally block or with
    /// statement that must run before the jump completes.
    pub(crate) fn unwind(&mut self, pending: Pending) -> Result<()> {
        loop {
            let frame = self.frame_mut()?;
            if matches!(pending, Pending::Continue)
                && matches!(frame.bodies.last().map(|body| &body.kind), Some(BodyKind::Loop))
            {
                return Ok(());
            }
            let Some(body) = frame.bodies.pop() else {
                return match pending {
                    Pending::Return => Ok(()),
                    Pending::Raise(exception) => Err(exception.into()),
                    Pending::Break => Err(self.runtime_error("'break' outside loop")),
                    Pending::Continue => Err(self.runtime_error("'continue' not properly in loop")),
                };
            };
            self.stack.truncate(body.height);
            match body.kind {
                BodyKind::Loop if matches!(pending, Pending::Break) => return Ok(()),
                BodyKind::Finally(node) => return self.run_finally(&node, Some(pending)),
                BodyKind::With(exit) => return self.with_exit_jump(exit, pending),
                _ => {}
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Errors
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn type_error(&self, message: impl Into<Arc<str>>) -> EvalError {
        self.process.type_error(message)
    }

    pub(crate) fn runtime_error(&self, message: impl Into<Arc<str>>) -> EvalError {
        self.process
            .error(&self.builtins().exceptions.runtime_error, message)
    }

    pub(crate) fn value_error(&self, message: impl Into<Arc<str>>) -> EvalError {
        self.process
            .error(&self.builtins().exceptions.value_error, message)
    }

    pub(crate) fn is_none(object: &Object) -> bool {
        matches!(object.value(), Value::None)
    }

    pub(crate) fn is_not_implemented(&self, object: &Object) -> bool {
        object.is(&self.builtins().not_implemented)
    }
}

/// Record `handled` as the `__context__` of `exception` unless it already
/// has one or the link would close a cycle.
fn chain_context(exception: &BaseException, handled: &BaseException) {
    let value = exception.value();
    if value.is(handled.value()) {
        return;
    }
    if value
        .attribute("__context__")
        .is_some_and(|context| !Evaluator::is_none(&context))
    {
        return;
    }
    let mut cursor = Some(handled.value().clone());
    let mut depth = 0;
    while let Some(link) = cursor {
        if link.is(value) || depth > 64 {
            return;
        }
        cursor = link
            .attribute("__context__")
            .filter(|context| !Evaluator::is_none(context));
        depth += 1;
    }
    value.set_attribute("__context__", handled.value().clone());
}
