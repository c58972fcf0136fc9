//! Operators, comparisons and boolean coercion.
//!
//! Every operator is a call to a dunder found on the operand's type. A
//! result of `NotImplemented` hands the operation to the reflected dunder
//! on the other operand; when both decline, the operation fails with
//! `TypeError`.

use std::sync::Arc;

use super::{Evaluator, Step};
use crate::ast::{BoolOp, BoolOperator, CmpOp, Compare, Operator, UnaryOperator};
use crate::error::Result;
use crate::object::{Object, Value};
use crate::protocol::find_special;

impl Evaluator<'_> {
    // ───────────────────────────────────────────────────────────────────
    // Arithmetic
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn binary(&mut self, op: Operator, left: Object, right: Object) -> Result<()> {
        let Some(method) = find_special(&left, op.dunder()) else {
            return self.binary_reflected(op, left, right);
        };
        let (l, r) = (left, right.clone());
        self.defer(move |ev| {
            let result = ev.pop()?;
            if ev.is_not_implemented(&result) {
                return ev.binary_reflected(op, l, r);
            }
            ev.push(result);
            Ok(())
        })?;
        self.call_attribute(method, vec![right], Vec::new())
    }

    fn binary_reflected(&mut self, op: Operator, left: Object, right: Object) -> Result<()> {
        let Some(method) = find_special(&right, op.reflected_dunder()) else {
            return Err(self.unsupported(op, &left, &right));
        };
        let (l, r) = (left.clone(), right);
        self.defer(move |ev| {
            let result = ev.pop()?;
            if ev.is_not_implemented(&result) {
                return Err(ev.unsupported(op, &l, &r));
            }
            ev.push(result);
            Ok(())
        })?;
        self.call_attribute(method, vec![left], Vec::new())
    }

    /// `left op= right`: the in-place dunder, else the binary operator.
    pub(crate) fn in_place(&mut self, op: Operator, left: Object, right: Object) -> Result<()> {
        let Some(method) = find_special(&left, op.inplace_dunder()) else {
            return self.binary(op, left, right);
        };
        let (l, r) = (left, right.clone());
        self.defer(move |ev| {
            let result = ev.pop()?;
            if ev.is_not_implemented(&result) {
                return ev.binary(op, l, r);
            }
            ev.push(result);
            Ok(())
        })?;
        self.call_attribute(method, vec![right], Vec::new())
    }

    pub(crate) fn unary(&mut self, op: UnaryOperator, operand: Object) -> Result<()> {
        match op.dunder() {
            Some(name) => self.call_special(operand, name, Vec::new()),
            None => {
                self.push(operand);
                self.push_step(Step::Not)?;
                self.push_step(Step::ToBool)
            }
        }
    }

    fn unsupported(&self, op: Operator, left: &Object, right: &Object) -> crate::error::EvalError {
        self.type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    }

    // ───────────────────────────────────────────────────────────────────
    // Coercions
    // ───────────────────────────────────────────────────────────────────

    /// Replace the top of the stack by `True` or `False`.
    pub(crate) fn to_bool(&mut self) -> Result<()> {
        let value = self.pop()?;
        match value.value() {
            Value::True | Value::False => {
                self.push(value);
                return Ok(());
            }
            Value::None => {
                let result = self.process.boolean(false);
                self.push(result);
                return Ok(());
            }
            _ => {}
        }
        if let Some(method) = find_special(&value, "__bool__") {
            self.push_step(Step::BoolResult)?;
            return self.call_attribute(method, Vec::new(), Vec::new());
        }
        if let Some(method) = find_special(&value, "__len__") {
            self.defer(|ev| {
                let length = ev.pop()?;
                let nonzero = !ev.length(&length)?.is_zero();
                let result = ev.process.boolean(nonzero);
                ev.push(result);
                Ok(())
            })?;
            return self.call_attribute(method, Vec::new(), Vec::new());
        }
        let result = self.process.boolean(true);
        self.push(result);
        Ok(())
    }

    pub(crate) fn bool_result(&mut self) -> Result<()> {
        let value = self.top()?;
        if matches!(value.value(), Value::True | Value::False) {
            return Ok(());
        }
        Err(self.type_error(format!(
            "__bool__ should return bool, returned {}",
            value.type_name()
        )))
    }

    /// Validate a `__len__` result.
    pub(crate) fn length(&self, value: &Object) -> Result<crate::number::Number> {
        let number = match value.value() {
            Value::Number(number) if number.is_int() => number.clone(),
            Value::True => crate::number::Number::int(1),
            Value::False => crate::number::Number::int(0),
            _ => {
                return Err(self.type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    value.type_name()
                )))
            }
        };
        if number.to_f64() < 0.0 {
            return Err(self.value_error("__len__() should return >= 0"));
        }
        Ok(number)
    }

    /// Replace the top of the stack by its `str()`.
    pub(crate) fn to_str(&mut self) -> Result<()> {
        let value = self.pop()?;
        let exact = value
            .class()
            .is_some_and(|class| class.is(&self.builtins().str_));
        if exact {
            self.push(value);
            return Ok(());
        }
        self.defer(|ev| {
            let text = ev.top()?;
            if text.as_str().is_none() {
                return Err(ev.type_error(format!(
                    "__str__ returned non-string (type {})",
                    text.type_name()
                )));
            }
            Ok(())
        })?;
        self.call_special(value, "__str__", Vec::new())
    }

    // ───────────────────────────────────────────────────────────────────
    // Comparisons
    // ───────────────────────────────────────────────────────────────────

    /// The left operand of `ops[index]` is on top of the stack.
    pub(crate) fn compare_next(&mut self, node: Arc<Compare>, index: usize) -> Result<()> {
        let comparator = node
            .comparators
            .get(index)
            .cloned()
            .ok_or_else(|| self.runtime_error("malformed comparison"))?;
        self.defer(move |ev| ev.compare_apply(node, index))?;
        self.push_step(Step::Get(comparator))
    }

    fn compare_apply(&mut self, node: Arc<Compare>, index: usize) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let op = *node
            .ops
            .get(index)
            .ok_or_else(|| self.runtime_error("malformed comparison"))?;
        if index + 1 >= node.ops.len() {
            return self.compare(op, left, right);
        }

        // keep the right operand for the next link
        self.push(right.clone());
        self.defer(move |ev| {
            let truth = ev.pop()?;
            let result = ev.pop()?;
            if truth.get_bool() {
                ev.push_step(Step::Compare {
                    node,
                    index: index + 1,
                })
            } else {
                ev.pop()?;
                ev.push(result);
                Ok(())
            }
        })?;
        self.push_step(Step::ToBool)?;
        self.defer(|ev| {
            let result = ev.top()?.clone();
            ev.push(result);
            Ok(())
        })?;
        self.compare(op, left, right)
    }

    pub(crate) fn compare(&mut self, op: CmpOp, left: Object, right: Object) -> Result<()> {
        match op {
            CmpOp::Is | CmpOp::IsNot => {
                let same = left.is(&right);
                let result = self.process.boolean(same == (op == CmpOp::Is));
                self.push(result);
                Ok(())
            }
            CmpOp::In | CmpOp::NotIn => {
                if op == CmpOp::NotIn {
                    self.push_step(Step::Not)?;
                }
                self.push_step(Step::ToBool)?;
                self.call_special(right, "__contains__", vec![left])
            }
            _ => self.rich_compare(op, left, right),
        }
    }

    fn rich_compare(&mut self, op: CmpOp, left: Object, right: Object) -> Result<()> {
        let Some(name) = op.dunder() else {
            return Err(self.runtime_error("not a rich comparison"));
        };
        let Some(method) = find_special(&left, name) else {
            return self.compare_reflected(op, left, right);
        };
        let (l, r) = (left, right.clone());
        self.defer(move |ev| {
            let result = ev.pop()?;
            if ev.is_not_implemented(&result) {
                return ev.compare_reflected(op, l, r);
            }
            ev.push(result);
            Ok(())
        })?;
        self.call_attribute(method, vec![right], Vec::new())
    }

    fn compare_reflected(&mut self, op: CmpOp, left: Object, right: Object) -> Result<()> {
        let method = op
            .reflected()
            .dunder()
            .and_then(|name| find_special(&right, name));
        let Some(method) = method else {
            return self.compare_fallback(op, &left, &right);
        };
        let (l, r) = (left.clone(), right);
        self.defer(move |ev| {
            let result = ev.pop()?;
            if ev.is_not_implemented(&result) {
                return ev.compare_fallback(op, &l, &r);
            }
            ev.push(result);
            Ok(())
        })?;
        self.call_attribute(method, vec![left], Vec::new())
    }

    /// Both operands declined: equality falls back to identity.
    fn compare_fallback(&mut self, op: CmpOp, left: &Object, right: &Object) -> Result<()> {
        let same = left.is(right);
        let result = match op {
            CmpOp::Eq => same,
            CmpOp::NotEq => !same,
            _ => {
                return Err(self.type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                )))
            }
        };
        let result = self.process.boolean(result);
        self.push(result);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // and / or
    // ───────────────────────────────────────────────────────────────────

    /// `values[index - 1]` is on top of the stack; decide whether
    /// `values[index]` is needed.
    pub(crate) fn bool_op(&mut self, node: Arc<BoolOp>, index: usize) -> Result<()> {
        let value = self.top()?.clone();
        self.defer(move |ev| {
            let truth = ev.pop()?.get_bool();
            let done = match node.op {
                BoolOperator::And => !truth,
                BoolOperator::Or => truth,
            };
            if done {
                return Ok(());
            }
            ev.pop()?;
            let next = node
                .values
                .get(index)
                .cloned()
                .ok_or_else(|| ev.runtime_error("malformed boolean operation"))?;
            if index + 1 < node.values.len() {
                ev.push_step(Step::BoolOp {
                    node: Arc::clone(&node),
                    index: index + 1,
                })?;
            }
            ev.push_step(Step::Get(next))
        })?;
        self.push_step(Step::ToBool)?;
        self.push(value);
        Ok(())
    }
}
