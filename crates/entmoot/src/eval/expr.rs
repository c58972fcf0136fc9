//! Expression scheduling.
//!
//! Every compound expression pushes a continuation that consumes its
//! operands, then the operands themselves in reverse so that they are
//! evaluated left to right.

use std::sync::Arc;

use super::{Evaluator, Step};
use crate::ast::{Constant, Expr};
use crate::error::Result;
use crate::object::{Object, Value};

impl Evaluator<'_> {
    pub(crate) fn get(&mut self, expr: Expr) -> Result<()> {
        match expr {
            Expr::Name(name) => {
                let value = self.load_name(&name.id)?;
                self.push(value);
                Ok(())
            }
            Expr::Constant(constant) => {
                let value = self.constant(&constant);
                self.push(value);
                Ok(())
            }
            Expr::Attribute(node) => {
                self.push_step(Step::GetAttr(node.attr.clone()))?;
                self.push_step(Step::Get(node.value.clone()))
            }
            Expr::Subscript(node) => {
                self.defer(|ev| {
                    let index = ev.pop()?;
                    let container = ev.pop()?;
                    ev.call_special(container, "__getitem__", vec![index])
                })?;
                self.push_step(Step::Get(node.slice.clone()))?;
                self.push_step(Step::Get(node.value.clone()))
            }
            Expr::Slice(node) => {
                self.defer(|ev| {
                    let step = ev.pop()?;
                    let stop = ev.pop()?;
                    let start = ev.pop()?;
                    let class = ev.builtins().slice.clone();
                    let slice = ev.process.alloc(
                        Value::Instance,
                        [
                            ("__class__", class),
                            ("start", start),
                            ("stop", stop),
                            ("step", step),
                        ],
                    );
                    ev.push(slice);
                    Ok(())
                })?;
                for bound in [&node.step, &node.upper, &node.lower] {
                    self.push_optional(bound.clone())?;
                }
                Ok(())
            }
            Expr::Call(node) => {
                let height = self.stack_len();
                self.push_step(Step::Call {
                    node: node.clone(),
                    height,
                })?;
                for keyword in node.keywords.iter().rev() {
                    self.push_step(Step::Get(keyword.value.clone()))?;
                }
                for arg in node.args.iter().rev() {
                    self.push_step(Step::Get(unstarred(arg).clone()))?;
                }
                self.push_step(Step::Get(node.func.clone()))
            }
            Expr::BinOp(node) => {
                for value in node.values.iter().skip(1).rev() {
                    self.push_step(Step::Binary(node.op))?;
                    self.push_step(Step::Get(value.clone()))?;
                }
                match node.values.first() {
                    Some(first) => self.push_step(Step::Get(first.clone())),
                    None => Err(self.runtime_error("empty operator chain")),
                }
            }
            Expr::UnaryOp(node) => {
                match node.op.dunder() {
                    None => {
                        self.push_step(Step::Not)?;
                        self.push_step(Step::ToBool)?;
                    }
                    Some(_) => self.push_step(Step::Unary(node.op))?,
                }
                self.push_step(Step::Get(node.operand.clone()))
            }
            Expr::BoolOp(node) => {
                let Some(first) = node.values.first().cloned() else {
                    return Err(self.runtime_error("empty boolean chain"));
                };
                if node.values.len() > 1 {
                    self.push_step(Step::BoolOp { node, index: 1 })?;
                }
                self.push_step(Step::Get(first))
            }
            Expr::Compare(node) => {
                let left = node.left.clone();
                if !node.ops.is_empty() {
                    self.push_step(Step::Compare { node, index: 0 })?;
                }
                self.push_step(Step::Get(left))
            }
            Expr::IfExp(node) => {
                let test = node.test.clone();
                self.push_step(Step::IfExp(node))?;
                self.push_step(Step::ToBool)?;
                self.push_step(Step::Get(test))
            }
            Expr::Tuple(elements) => {
                let height = self.stack_len();
                let starred: Vec<bool> = elements.iter().map(is_starred).collect();
                self.defer(move |ev| {
                    let values = ev.pop_from(height)?;
                    let items = ev.splice_starred(values, &starred)?;
                    let tuple = ev.process.tuple(items);
                    ev.push(tuple);
                    Ok(())
                })?;
                for element in elements.iter().rev() {
                    self.push_step(Step::Get(unstarred(element).clone()))?;
                }
                Ok(())
            }
            Expr::Lambda(node) => self.define_lambda(node),
            Expr::Starred(inner) => self.push_step(Step::Get((*inner).clone())),
            Expr::NamedExpr(node) => {
                let target = node.target.clone();
                self.defer(move |ev| {
                    let value = ev.top()?.clone();
                    ev.push(value);
                    ev.store(target)
                })?;
                self.push_step(Step::Get(node.value.clone()))
            }
            Expr::JoinedStr(parts) => {
                let height = self.stack_len();
                self.defer(move |ev| {
                    let pieces = ev.pop_from(height)?;
                    let mut text = String::new();
                    for piece in &pieces {
                        text.push_str(piece.as_str().unwrap_or_default());
                    }
                    let joined = ev.process.string(text);
                    ev.push(joined);
                    Ok(())
                })?;
                for part in parts.iter().rev() {
                    self.push_step(Step::ToStr)?;
                    self.push_step(Step::Get(part.clone()))?;
                }
                Ok(())
            }
            Expr::FormattedValue(node) => {
                self.push_step(Step::ToStr)?;
                self.push_step(Step::Get(node.value.clone()))
            }
            Expr::List(_)
            | Expr::Set(_)
            | Expr::Dict(_)
            | Expr::Comprehension(_)
            | Expr::Yield(_)
            | Expr::YieldFrom(_)
            | Expr::Await(_) => {
                let none = self.process.none();
                self.push(none);
                Ok(())
            }
        }
    }

    fn push_optional(&mut self, expr: Option<Expr>) -> Result<()> {
        match expr {
            Some(expr) => self.push_step(Step::Get(expr)),
            None => {
                let none = self.process.none();
                self.push_step(Step::Push(none))
            }
        }
    }

    pub(crate) fn constant(&self, constant: &Constant) -> Object {
        let builtins = self.builtins();
        match constant {
            Constant::None => builtins.none.clone(),
            Constant::True => builtins.true_.clone(),
            Constant::False => builtins.false_.clone(),
            Constant::Ellipsis => builtins.ellipsis.clone(),
            Constant::Number(number) => self.process.number(number.clone()),
            Constant::Str(text) => self.process.string(Arc::clone(text)),
            Constant::Bytes(data) => self.process.bytes(Arc::clone(data)),
        }
    }

    /// Flatten the values at `starred` positions into the sequence.
    pub(crate) fn splice_starred(&self, values: Vec<Object>, starred: &[bool]) -> Result<Vec<Object>> {
        if !starred.iter().any(|&star| star) {
            return Ok(values);
        }
        let mut items = Vec::with_capacity(values.len());
        for (value, &star) in values.into_iter().zip(starred) {
            if star {
                items.extend(self.sequence_items(&value)?);
            } else {
                items.push(value);
            }
        }
        Ok(items)
    }

    /// Items of a builtin sequence, for unpacking.
    pub(crate) fn sequence_items(&self, value: &Object) -> Result<Vec<Object>> {
        match value.value() {
            Value::Tuple(items) => Ok(items.clone()),
            Value::String(text) => Ok(text
                .chars()
                .map(|c| self.process.string(c.to_string()))
                .collect()),
            _ => Err(self.type_error(format!(
                "cannot unpack non-sequence {}",
                value.type_name()
            ))),
        }
    }
}

pub(crate) fn is_starred(expr: &Expr) -> bool {
    matches!(expr, Expr::Starred(_))
}

fn unstarred(expr: &Expr) -> &Expr {
    match expr {
        Expr::Starred(inner) => &**inner,
        other => other,
    }
}
