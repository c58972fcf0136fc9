//! Statement scheduling, assignment targets and `raise`.

use std::sync::Arc;

use super::expr::is_starred;
use super::{BodyKind, Evaluator, FrameKind, Kwargs, Pending, Scope, Step};
use crate::ast::{self, Expr, Exprs, Stmt};
use crate::error::{BaseException, Result};
use crate::object::{Object, ObjectMethod, Value};
use crate::protocol::{self, find_special};

impl Evaluator<'_> {
    pub(crate) fn exec(&mut self, stmt: Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(expr) => {
                let sink = if self.frame()?.kind == FrameKind::Interactive {
                    Step::SetReturn
                } else {
                    Step::Discard
                };
                self.push_step(sink)?;
                self.push_step(Step::Get(expr))
            }
            Stmt::Assign(node) => {
                let Some((last, rest)) = node.targets.split_last() else {
                    return Err(self.runtime_error("assignment without target"));
                };
                self.push_step(Step::Store(last.clone()))?;
                for target in rest.iter().rev() {
                    self.push_step(Step::Store(target.clone()))?;
                    self.push_dup()?;
                }
                self.push_step(Step::Get(node.value.clone()))
            }
            Stmt::AugAssign(node) => self.aug_assign(node),
            Stmt::AnnAssign(node) => match &node.value {
                Some(value) => {
                    self.push_step(Step::Store(node.target.clone()))?;
                    self.push_step(Step::Get(value.clone()))
                }
                None => Ok(()),
            },
            Stmt::Delete(targets) => {
                for target in targets.iter().rev() {
                    let target = target.clone();
                    self.defer(move |ev| ev.delete(target))?;
                }
                Ok(())
            }
            Stmt::If(node) => {
                let test = node.test.clone();
                self.push_step(Step::If(node))?;
                self.push_step(Step::ToBool)?;
                self.push_step(Step::Get(test))
            }
            Stmt::While(node) => self.push_body(BodyKind::Loop, vec![Step::WhileTest(node)]),
            Stmt::For(node) | Stmt::AsyncFor(node) => self.enter_for(node),
            Stmt::With(node) | Stmt::AsyncWith(node) => self.enter_with(node, 0),
            Stmt::Try(node) => self.enter_try(node),
            Stmt::Raise(node) => self.raise_statement(node),
            Stmt::Assert(node) => self.assert(node),
            Stmt::Return(value) => self.return_statement(value),
            Stmt::Break => self.unwind(Pending::Break),
            Stmt::Continue => self.unwind(Pending::Continue),
            Stmt::Import(names) => self.import(&names),
            Stmt::ImportFrom(node) => self.import_from(&node),
            Stmt::Global(names) => self.declare(&names, Scope::Global),
            Stmt::Nonlocal(names) => self.declare(&names, Scope::Nonlocal),
            Stmt::FunctionDef(def) | Stmt::AsyncFunctionDef(def) => self.define_function(def),
            Stmt::ClassDef(def) => self.define_class(def),
            Stmt::Pass => Ok(()),
        }
    }

    /// Schedule a copy of the top of the stack.
    pub(crate) fn push_dup(&mut self) -> Result<()> {
        self.defer(|ev| {
            let value = ev.top()?.clone();
            ev.push(value);
            Ok(())
        })
    }

    fn return_statement(&mut self, value: Option<Expr>) -> Result<()> {
        match value {
            Some(value) => {
                self.defer(|ev| {
                    let value = ev.pop()?;
                    ev.frame_mut()?.ret = Some(value);
                    ev.unwind(Pending::Return)
                })?;
                self.push_step(Step::Get(value))
            }
            None => {
                let none = self.process.none();
                self.frame_mut()?.ret = Some(none);
                self.unwind(Pending::Return)
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Targets
    // ───────────────────────────────────────────────────────────────────

    /// Pop the value on top of the stack into `target`.
    pub(crate) fn store(&mut self, target: Expr) -> Result<()> {
        match target {
            Expr::Name(name) => {
                let value = self.pop()?;
                self.store_name(&name.id, value)
            }
            Expr::Attribute(node) => {
                let base = node.value.clone();
                self.defer(move |ev| {
                    let object = ev.pop()?;
                    let value = ev.pop()?;
                    ev.set_attr(object, &node.attr, value)
                })?;
                self.push_step(Step::Get(base))
            }
            Expr::Subscript(node) => {
                let (base, index) = (node.value.clone(), node.slice.clone());
                self.defer(|ev| {
                    let index = ev.pop()?;
                    let container = ev.pop()?;
                    let value = ev.pop()?;
                    ev.push_step(Step::Discard)?;
                    ev.call_special(container, "__setitem__", vec![index, value])
                })?;
                self.push_step(Step::Get(index))?;
                self.push_step(Step::Get(base))
            }
            Expr::Tuple(elements) | Expr::List(elements) => {
                let value = self.pop()?;
                self.unpack(value, elements)
            }
            Expr::Starred(_) => {
                Err(self.runtime_error("starred assignment target must be in a list or tuple"))
            }
            other => Err(self.runtime_error(format!("cannot assign to {}", describe(&other)))),
        }
    }

    fn delete(&mut self, target: Expr) -> Result<()> {
        match target {
            Expr::Name(name) => self.delete_name(&name.id),
            Expr::Attribute(node) => {
                let base = node.value.clone();
                self.defer(move |ev| {
                    let object = ev.pop()?;
                    ev.del_attr(object, &node.attr)
                })?;
                self.push_step(Step::Get(base))
            }
            Expr::Subscript(node) => {
                self.defer(|ev| {
                    let index = ev.pop()?;
                    let container = ev.pop()?;
                    ev.push_step(Step::Discard)?;
                    ev.call_special(container, "__delitem__", vec![index])
                })?;
                self.push_step(Step::Get(node.slice.clone()))?;
                self.push_step(Step::Get(node.value.clone()))
            }
            Expr::Tuple(elements) | Expr::List(elements) => {
                for element in elements.iter().rev() {
                    let element = element.clone();
                    self.defer(move |ev| ev.delete(element))?;
                }
                Ok(())
            }
            other => Err(self.runtime_error(format!("cannot delete {}", describe(&other)))),
        }
    }

    /// `object.name = value`, through a user `__setattr__` when defined.
    pub(crate) fn set_attr(&mut self, object: Object, name: &str, value: Object) -> Result<()> {
        match find_special(&object, "__setattr__") {
            Some(hook)
                if !matches!(
                    hook.function().value(),
                    Value::ObjectMethod(ObjectMethod::SetAttr)
                ) =>
            {
                self.push_step(Step::Discard)?;
                let name = self.process.string(name);
                self.call_attribute(hook, vec![name, value], Kwargs::new())
            }
            _ => {
                object.set_attribute(name, value);
                Ok(())
            }
        }
    }

    /// `del object.name`; deleting an absent attribute does nothing.
    pub(crate) fn del_attr(&mut self, object: Object, name: &str) -> Result<()> {
        match find_special(&object, "__delattr__") {
            Some(hook)
                if !matches!(
                    hook.function().value(),
                    Value::ObjectMethod(ObjectMethod::DelAttr)
                ) =>
            {
                self.push_step(Step::Discard)?;
                let name = self.process.string(name);
                self.call_attribute(hook, vec![name], Kwargs::new())
            }
            _ => {
                drop(object.delete_attribute(name));
                Ok(())
            }
        }
    }

    fn aug_assign(&mut self, node: Arc<ast::AugAssign>) -> Result<()> {
        let op = node.op;
        match &node.target {
            Expr::Name(_) => {
                self.push_step(Step::Store(node.target.clone()))?;
                self.push_step(Step::InPlace(op))?;
                self.push_step(Step::Get(node.value.clone()))?;
                self.push_step(Step::Get(node.target.clone()))
            }
            Expr::Attribute(target) => {
                let attr = target.attr.clone();
                self.defer(move |ev| {
                    let result = ev.pop()?;
                    let object = ev.pop()?;
                    ev.set_attr(object, &attr, result)
                })?;
                self.push_step(Step::InPlace(op))?;
                self.push_step(Step::Get(node.value.clone()))?;
                self.push_step(Step::GetAttr(target.attr.clone()))?;
                self.push_dup()?;
                self.push_step(Step::Get(target.value.clone()))
            }
            Expr::Subscript(target) => {
                self.defer(|ev| {
                    let result = ev.pop()?;
                    let index = ev.pop()?;
                    let container = ev.pop()?;
                    ev.push_step(Step::Discard)?;
                    ev.call_special(container, "__setitem__", vec![index, result])
                })?;
                self.push_step(Step::InPlace(op))?;
                self.push_step(Step::Get(node.value.clone()))?;
                self.defer(|ev| {
                    let index = ev.pop()?;
                    let container = ev.pop()?;
                    ev.push(container.clone());
                    ev.push(index.clone());
                    ev.call_special(container, "__getitem__", vec![index])
                })?;
                self.push_step(Step::Get(target.slice.clone()))?;
                self.push_step(Step::Get(target.value.clone()))
            }
            other => Err(self.runtime_error(format!(
                "illegal expression for augmented assignment: {}",
                describe(other)
            ))),
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Unpacking
    // ───────────────────────────────────────────────────────────────────

    fn unpack(&mut self, value: Object, elements: Exprs) -> Result<()> {
        if matches!(value.value(), Value::Tuple(_) | Value::String(_)) {
            let items = self.sequence_items(&value)?;
            return self.assign_items(items, elements);
        }
        let height = self.stack_len();
        self.defer(move |ev| {
            let items = ev.pop_from(height)?;
            ev.assign_items(items, elements)
        })?;
        self.collect_iterable(value)
    }

    /// Push every item `iterable` yields.
    pub(crate) fn collect_iterable(&mut self, iterable: Object) -> Result<()> {
        self.defer(|ev| {
            let iterator = ev.pop()?;
            ev.collect_next(iterator)
        })?;
        self.call_special(iterable, "__iter__", Vec::new())
    }

    fn collect_next(&mut self, iterator: Object) -> Result<()> {
        let exhausted = Object::bare(Value::Instance);
        let marker = exhausted.clone();
        let next = iterator.clone();
        self.defer(move |ev| {
            if ev.top()?.is(&marker) {
                ev.pop()?;
                return Ok(());
            }
            ev.collect_next(next)
        })?;
        let stop = self.builtins().exceptions.stop_iteration.clone();
        self.push_body(
            BodyKind::Catch {
                class: stop,
                fallback: exhausted,
            },
            Vec::new(),
        )?;
        self.call_special(iterator, "__next__", Vec::new())
    }

    fn assign_items(&mut self, mut items: Vec<Object>, elements: Exprs) -> Result<()> {
        let count = elements.len();
        let values = match elements.iter().position(is_starred) {
            None => {
                if items.len() > count {
                    return Err(self.value_error(format!(
                        "too many values to unpack (expected {})",
                        count
                    )));
                }
                if items.len() < count {
                    return Err(self.value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        count,
                        items.len()
                    )));
                }
                items
            }
            Some(star) => {
                if items.len() + 1 < count {
                    return Err(self.value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        count - 1,
                        items.len()
                    )));
                }
                let after = count - star - 1;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(star);
                items.push(self.process.tuple(middle));
                items.extend(tail);
                items
            }
        };
        for (target, value) in elements.iter().zip(values).rev() {
            let target = match target {
                Expr::Starred(inner) => (**inner).clone(),
                other => other.clone(),
            };
            self.push_step(Step::Store(target))?;
            self.push_step(Step::Push(value))?;
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // raise / assert
    // ───────────────────────────────────────────────────────────────────

    fn raise_statement(&mut self, node: Arc<ast::Raise>) -> Result<()> {
        let Some(exc) = node.exc.clone() else {
            return match self.handled_exception() {
                Some(exception) => Err(exception.into()),
                None => Err(self.runtime_error("No active exception to reraise")),
            };
        };
        let has_cause = node.cause.is_some();
        self.defer(move |ev| {
            let cause = if has_cause { Some(ev.pop()?) } else { None };
            let value = ev.pop()?;
            ev.raise_object(value, cause)
        })?;
        if let Some(cause) = &node.cause {
            self.push_step(Step::Get(cause.clone()))?;
        }
        self.push_step(Step::Get(exc))
    }

    /// Raise `value`, instantiating it first when it is an exception class.
    fn raise_object(&mut self, value: Object, cause: Option<Object>) -> Result<()> {
        if self.is_exception_class(&value) {
            self.defer(move |ev| {
                let instance = ev.pop()?;
                ev.raise_object(instance, cause)
            })?;
            return self.call(value, Vec::new(), Kwargs::new());
        }
        let base = &self.builtins().exceptions.base_exception;
        if !protocol::is_instance(&value, base) {
            return Err(self.type_error("exceptions must derive from BaseException"));
        }
        if let Some(cause) = cause {
            if self.is_exception_class(&cause) {
                self.defer(move |ev| {
                    let cause = ev.pop()?;
                    ev.raise_object(value, Some(cause))
                })?;
                return self.call(cause, Vec::new(), Kwargs::new());
            }
            if !Evaluator::is_none(&cause) && !protocol::is_instance(&cause, base) {
                return Err(self.type_error("exception causes must derive from BaseException"));
            }
            value.set_attribute("__cause__", cause);
            value.set_attribute("__suppress_context__", self.process.boolean(true));
        }
        Err(BaseException::new(value).into())
    }

    pub(crate) fn is_exception_class(&self, value: &Object) -> bool {
        value.has_attribute("__mro__")
            && protocol::is_subclass(value, &self.builtins().exceptions.base_exception)
    }

    fn assert(&mut self, node: Arc<ast::Assert>) -> Result<()> {
        if self.process.config().optimize {
            return Ok(());
        }
        let test = node.test.clone();
        self.defer(move |ev| {
            if ev.pop()?.get_bool() {
                return Ok(());
            }
            let class = ev.builtins().exceptions.assertion_error.clone();
            let Some(message) = node.msg.clone() else {
                return Err(ev.process.exception(&class, Vec::new()).into());
            };
            ev.defer(move |ev| {
                let message = ev.pop()?;
                Err(ev.process.exception(&class, vec![message]).into())
            })?;
            ev.push_step(Step::Get(message))
        })?;
        self.push_step(Step::ToBool)?;
        self.push_step(Step::Get(test))
    }
}

/// What an invalid target looks like, for error messages.
fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::Constant(_) => "literal",
        Expr::Call(_) => "function call",
        Expr::BinOp(_) | Expr::UnaryOp(_) => "expression",
        Expr::BoolOp(_) => "boolean operation",
        Expr::Compare(_) => "comparison",
        Expr::IfExp(_) => "conditional expression",
        Expr::Lambda(_) => "lambda",
        Expr::Dict(_) => "dict literal",
        Expr::Set(_) => "set display",
        Expr::Comprehension(_) => "comprehension",
        Expr::JoinedStr(_) | Expr::FormattedValue(_) => "f-string expression",
        Expr::NamedExpr(_) => "named expression",
        Expr::Yield(_) | Expr::YieldFrom(_) => "yield expression",
        Expr::Await(_) => "await expression",
        Expr::Slice(_) => "slice",
        Expr::Starred(_) => "starred",
        Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_) | Expr::Tuple(_) | Expr::List(_) => {
            "target"
        }
    }
}
