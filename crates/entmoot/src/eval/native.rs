//! Bodies of the native method tags and builtin functions.
//!
//! A native either pushes its result before returning or schedules the
//! steps that will. Binary natives answer `NotImplemented` for operands
//! they do not understand so the evaluator can try the reflected method.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{BodyKind, Evaluator, Kwargs, Step};
use crate::error::{EvalError, Result};
use crate::number::{Number, NumberError};
use crate::object::{
    repr, to_str, AttributeError, BytesMethod, ExceptionMethod, NumberMethod, Object,
    ObjectMethod, StrMethod, SysCall, TupleMethod, Value,
};
use crate::protocol::{self, find_special};

impl Evaluator<'_> {
    pub(crate) fn call_native(&mut self, callee: &Object, args: Vec<Object>, kwargs: Kwargs) -> Result<()> {
        let name = callee
            .name()
            .unwrap_or_else(|| callee.value().kind().to_string());
        match callee.value() {
            Value::ObjectMethod(method) => return self.object_method(*method, &name, args, kwargs),
            Value::SysCall(call) => return self.sys_call(*call, args, kwargs),
            _ => {}
        }
        if !kwargs.is_empty() {
            return Err(self.type_error(format!("{}() takes no keyword arguments", name)));
        }
        match callee.value() {
            Value::NumberMethod(method) => self.number_method(*method, &name, args),
            Value::StrMethod(method) => self.str_method(*method, &name, args),
            Value::BytesMethod(method) => self.bytes_method(*method, &name, args),
            Value::TupleMethod(method) => self.tuple_method(*method, &name, args),
            Value::ExceptionMethod(method) => self.exception_method(*method, &name, args),
            _ => Err(EvalError::fatal("not a native callable")),
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Argument helpers
    // ───────────────────────────────────────────────────────────────────

    fn exact<const N: usize>(&self, name: &str, args: Vec<Object>) -> Result<[Object; N]> {
        let given = args.len();
        <[Object; N]>::try_from(args).map_err(|_| self.arity_error(name, N, N, given))
    }

    fn arity(&self, name: &str, args: &[Object], min: usize, max: usize) -> Result<()> {
        if (min..=max).contains(&args.len()) {
            Ok(())
        } else {
            Err(self.arity_error(name, min, max, args.len()))
        }
    }

    fn arity_error(&self, name: &str, min: usize, max: usize, given: usize) -> EvalError {
        let expected = if min == max {
            format!("exactly {}", min)
        } else if given < min {
            format!("at least {}", min)
        } else {
            format!("at most {}", max)
        };
        let count = if given < min { min } else { max };
        self.type_error(format!(
            "{}() takes {} argument{} ({} given)",
            name,
            expected,
            if count == 1 { "" } else { "s" },
            given
        ))
    }

    fn attribute_name(&self, name: &Object) -> Result<String> {
        name.as_str().map(str::to_string).ok_or_else(|| {
            self.type_error(format!(
                "attribute name must be string, not '{}'",
                name.type_name()
            ))
        })
    }

    fn push_none(&mut self) {
        let none = self.process.none();
        self.push(none);
    }

    fn push_bool(&mut self, value: bool) {
        let value = self.process.boolean(value);
        self.push(value);
    }

    fn push_not_implemented(&mut self) -> Result<()> {
        let value = self.builtins().not_implemented.clone();
        self.push(value);
        Ok(())
    }

    fn number_error(&self, error: NumberError) -> EvalError {
        let exceptions = &self.builtins().exceptions;
        let class = match error {
            NumberError::ZeroDivision { .. } => &exceptions.zero_division_error,
            NumberError::Unsupported { .. } => &exceptions.type_error,
            NumberError::Overflow { .. } => &exceptions.overflow_error,
            NumberError::NegativeShift => &exceptions.value_error,
        };
        self.process.error(class, error.to_string())
    }

    // ───────────────────────────────────────────────────────────────────
    // object and type
    // ───────────────────────────────────────────────────────────────────

    fn object_method(
        &mut self,
        method: ObjectMethod,
        name: &str,
        args: Vec<Object>,
        kwargs: Kwargs,
    ) -> Result<()> {
        match method {
            ObjectMethod::GetAttribute => {
                let [object, attr] = self.exact(name, args)?;
                let attr = self.attribute_name(&attr)?;
                match protocol::find(&object, &attr) {
                    Some(found) => {
                        let value = self.materialize(found);
                        self.push(value);
                        Ok(())
                    }
                    None => {
                        let error = AttributeError {
                            name: attr,
                            type_name: object.type_name(),
                        };
                        Err(self.process.attribute_error(&error, &object))
                    }
                }
            }
            ObjectMethod::SetAttr => {
                let [object, attr, value] = self.exact(name, args)?;
                let attr = self.attribute_name(&attr)?;
                object.set_attribute(attr, value);
                self.push_none();
                Ok(())
            }
            ObjectMethod::DelAttr => {
                let [object, attr] = self.exact(name, args)?;
                let attr = self.attribute_name(&attr)?;
                drop(object.delete_attribute(&attr));
                self.push_none();
                Ok(())
            }
            ObjectMethod::New => {
                self.arity(name, &args, 1, usize::MAX)?;
                let class = &args[0];
                if !class.has_attribute("__mro__") {
                    return Err(self.type_error(format!(
                        "object.__new__(X): X is not a type object ({})",
                        class.type_name()
                    )));
                }
                let instance = self.process.instance(class);
                if protocol::is_subclass(class, &self.builtins().exceptions.base_exception) {
                    instance.set_attribute("args", self.process.tuple(args[1..].to_vec()));
                }
                self.push(instance);
                Ok(())
            }
            ObjectMethod::Init => {
                self.arity(name, &args, 1, usize::MAX)?;
                self.push_none();
                Ok(())
            }
            ObjectMethod::Eq | ObjectMethod::Ne => {
                let [left, right] = self.exact(name, args)?;
                if left.is(&right) {
                    self.push_bool(method == ObjectMethod::Eq);
                    Ok(())
                } else {
                    self.push_not_implemented()
                }
            }
            ObjectMethod::Repr => {
                let [object] = self.exact(name, args)?;
                let text = self.process.string(repr(&object));
                self.push(text);
                Ok(())
            }
            ObjectMethod::Str => {
                let [object] = self.exact(name, args)?;
                if object.as_str().is_some() {
                    self.push(object);
                    return Ok(());
                }
                self.call_special(object, "__repr__", Vec::new())
            }
            ObjectMethod::Dir => {
                let [object] = self.exact(name, args)?;
                let mut names: BTreeSet<String> = object.dir().into_iter().collect();
                let mut types = protocol::mro(&object);
                if let Some(class) = object.class() {
                    types.extend(protocol::mro(&class));
                }
                for ty in &types {
                    names.extend(ty.dir());
                }
                let names = names
                    .into_iter()
                    .map(|name| self.process.string(name))
                    .collect();
                let names = self.process.tuple(names);
                self.push(names);
                Ok(())
            }
            ObjectMethod::TypeCall => self.type_call(args, kwargs),
        }
    }

    /// `cls(*args, **kwargs)`: `__new__`, then `__init__` on the result
    /// when it is an instance of `cls`.
    fn type_call(&mut self, args: Vec<Object>, kwargs: Kwargs) -> Result<()> {
        let mut args = args.into_iter();
        let Some(class) = args.next() else {
            return Err(self.type_error("type.__call__ needs an argument"));
        };
        let rest: Vec<Object> = args.collect();
        let type_ = self.builtins().type_.clone();
        if class.is(&type_) {
            if let ([object], true) = (rest.as_slice(), kwargs.is_empty()) {
                let class = object.class().unwrap_or(type_);
                self.push(class);
                return Ok(());
            }
            return Err(self.type_error("type() takes 1 argument"));
        }
        let Some(new) = protocol::find(&class, "__new__") else {
            return Err(self.type_error(format!(
                "cannot create '{}' instances",
                class.name().unwrap_or_else(|| class.type_name())
            )));
        };

        let (init_args, init_kwargs, expected) = (rest.clone(), kwargs.clone(), class.clone());
        self.defer(move |ev| {
            let instance = ev.pop()?;
            if !protocol::is_instance(&instance, &expected) {
                ev.push(instance);
                return Ok(());
            }
            let Some(init) = find_special(&instance, "__init__") else {
                ev.push(instance);
                return Ok(());
            };
            ev.defer(move |ev| {
                let result = ev.pop()?;
                if !Evaluator::is_none(&result) {
                    return Err(ev.type_error(format!(
                        "__init__() should return None, not '{}'",
                        result.type_name()
                    )));
                }
                ev.push(instance);
                Ok(())
            })?;
            ev.call_attribute(init, init_args, init_kwargs)
        })?;

        let mut new_args = Vec::with_capacity(rest.len() + 1);
        new_args.push(class);
        new_args.extend(rest);
        self.call(new.function().clone(), new_args, kwargs)
    }

    // ───────────────────────────────────────────────────────────────────
    // int, float, bool
    // ───────────────────────────────────────────────────────────────────

    fn number_method(&mut self, method: NumberMethod, name: &str, args: Vec<Object>) -> Result<()> {
        use NumberMethod::*;
        match method {
            New => self.number_new(name, args),
            Neg | Pos | Invert | Abs | Bool | Index => {
                let [receiver] = self.exact(name, args)?;
                let Some(x) = numeric(&receiver) else {
                    return Err(self.type_error(format!(
                        "descriptor '{}' requires a number, not '{}'",
                        name,
                        receiver.type_name()
                    )));
                };
                let result = match method {
                    Neg => self.process.number(x.neg()),
                    Invert => {
                        let inverted = x.invert().map_err(|error| self.number_error(error))?;
                        self.process.number(inverted)
                    }
                    Abs => self.process.number(x.abs()),
                    Bool => self.process.boolean(!x.is_zero()),
                    Index if !x.is_int() => {
                        return Err(self.type_error(
                            "'float' object cannot be interpreted as an integer",
                        ))
                    }
                    _ => self.process.number(x),
                };
                self.push(result);
                Ok(())
            }
            _ => {
                let [left, right] = self.exact(name, args)?;
                let (Some(x), Some(y)) = (numeric(&left), numeric(&right)) else {
                    return self.push_not_implemented();
                };
                let result = match method {
                    Eq => self.process.boolean(x.equals(&y)),
                    Ne => self.process.boolean(!x.equals(&y)),
                    Lt => self.process.boolean(x.compare(&y) == Some(Ordering::Less)),
                    Le => self.process.boolean(matches!(
                        x.compare(&y),
                        Some(Ordering::Less | Ordering::Equal)
                    )),
                    Gt => self.process.boolean(x.compare(&y) == Some(Ordering::Greater)),
                    Ge => self.process.boolean(matches!(
                        x.compare(&y),
                        Some(Ordering::Greater | Ordering::Equal)
                    )),
                    _ => {
                        let number = arithmetic(method, &x, &y)
                            .map_err(|error| self.number_error(error))?;
                        self.process.number(number)
                    }
                };
                self.push(result);
                Ok(())
            }
        }
    }

    fn number_new(&mut self, name: &str, args: Vec<Object>) -> Result<()> {
        self.arity(name, &args, 1, 2)?;
        let mut args = args.into_iter();
        let Some(class) = args.next() else {
            return Err(self.arity_error(name, 1, 2, 0));
        };
        let value = args.next();
        let builtins = self.builtins();

        if protocol::is_subclass(&class, &builtins.bool_) {
            match value {
                None => self.push_bool(false),
                Some(value) => {
                    self.push(value);
                    self.push_step(Step::ToBool)?;
                }
            }
            return Ok(());
        }

        let float = protocol::is_subclass(&class, &builtins.float);
        let kind = if float { "float" } else { "int" };
        let number = match &value {
            None if float => Number::float(0.0),
            None => Number::int(0),
            Some(value) => match value.value() {
                Value::Number(n) if float => n.to_float(),
                Value::Number(n) => n.truncate().map_err(|error| self.number_error(error))?,
                Value::True | Value::False => {
                    let n = Number::int(i64::from(value.get_bool()));
                    if float {
                        n.to_float()
                    } else {
                        n
                    }
                }
                Value::String(text) => match (Number::parse(text), float) {
                    (Some(n), true) => n.to_float(),
                    (Some(n), false) if n.is_int() => n,
                    (_, true) => {
                        return Err(self.value_error(format!(
                            "could not convert string to float: {}",
                            repr(value)
                        )))
                    }
                    (_, false) => {
                        return Err(self.value_error(format!(
                            "invalid literal for int() with base 10: {}",
                            repr(value)
                        )))
                    }
                },
                _ => {
                    return Err(self.type_error(format!(
                        "{}() argument must be a string or a number, not '{}'",
                        kind,
                        value.type_name()
                    )))
                }
            },
        };
        let object = if class.is(&builtins.int) || class.is(&builtins.float) {
            self.process.number(number)
        } else {
            self.process
                .alloc(Value::Number(number), [("__class__", class)])
        };
        self.push(object);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // str and bytes
    // ───────────────────────────────────────────────────────────────────

    fn str_method(&mut self, method: StrMethod, name: &str, args: Vec<Object>) -> Result<()> {
        use StrMethod::*;
        if method == New {
            self.arity(name, &args, 1, 2)?;
            match args.into_iter().nth(1) {
                Some(value) => {
                    self.push(value);
                    self.push_step(Step::ToStr)
                }
                None => {
                    let empty = self.process.string("");
                    self.push(empty);
                    Ok(())
                }
            }
        } else if matches!(method, Bool | Len) {
            let [receiver] = self.exact(name, args)?;
            let text = self.text(&receiver, name)?;
            let result = if method == Bool {
                self.process.boolean(!text.is_empty())
            } else {
                self.process.int(text.chars().count() as i64)
            };
            self.push(result);
            Ok(())
        } else {
            let [receiver, other] = self.exact(name, args)?;
            let text = self.text(&receiver, name)?;
            let result = match (method, other.value()) {
                (Add, Value::String(right)) => {
                    self.process.string(format!("{}{}", text, right))
                }
                (Mul, _) => match numeric(&other).filter(Number::is_int) {
                    Some(count) => {
                        let count = count.to_i64().ok_or_else(|| {
                            self.process.error(
                                &self.builtins().exceptions.overflow_error,
                                "cannot fit 'int' into an index-sized integer",
                            )
                        })?;
                        self.process.string(text.repeat(count.max(0) as usize))
                    }
                    None => return self.push_not_implemented(),
                },
                (Eq, Value::String(right)) => self.process.boolean(*text == **right),
                (Ne, Value::String(right)) => self.process.boolean(*text != **right),
                (Lt, Value::String(right)) => self.process.boolean(*text < **right),
                (Le, Value::String(right)) => self.process.boolean(*text <= **right),
                (Gt, Value::String(right)) => self.process.boolean(*text > **right),
                (Ge, Value::String(right)) => self.process.boolean(*text >= **right),
                (Contains, Value::String(right)) => self.process.boolean(text.contains(&**right)),
                (Contains, _) => {
                    return Err(self.type_error(format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    )))
                }
                (GetItem, _) => {
                    let chars: Vec<char> = text.chars().collect();
                    if self.is_slice(&other) {
                        let picked: String = self
                            .slice_indices(&other, chars.len())?
                            .into_iter()
                            .map(|index| chars[index])
                            .collect();
                        self.process.string(picked)
                    } else {
                        let index = self.index(&other, chars.len(), "string")?;
                        self.process.string(chars[index].to_string())
                    }
                }
                _ => return self.push_not_implemented(),
            };
            self.push(result);
            Ok(())
        }
    }

    fn text(&self, receiver: &Object, name: &str) -> Result<Arc<str>> {
        match receiver.value() {
            Value::String(text) => Ok(Arc::clone(text)),
            _ => Err(self.type_error(format!(
                "descriptor '{}' requires a 'str' object but received a '{}'",
                name,
                receiver.type_name()
            ))),
        }
    }

    fn bytes_method(&mut self, method: BytesMethod, name: &str, args: Vec<Object>) -> Result<()> {
        use BytesMethod::*;
        let receiver = args.first().cloned();
        let Some(Value::Bytes(data)) = receiver.as_ref().map(Object::value) else {
            return Err(self.type_error(format!("descriptor '{}' requires a 'bytes' object", name)));
        };
        let result = match method {
            Bool | Len => {
                self.arity(name, &args, 1, 1)?;
                if method == Bool {
                    self.process.boolean(!data.is_empty())
                } else {
                    self.process.int(data.len() as i64)
                }
            }
            Add | Eq | Ne => {
                self.arity(name, &args, 2, 2)?;
                let Value::Bytes(other) = args[1].value() else {
                    return self.push_not_implemented();
                };
                match method {
                    Add => {
                        let joined: Vec<u8> = data.iter().chain(other.iter()).copied().collect();
                        self.process.bytes(joined)
                    }
                    Eq => self.process.boolean(data == other),
                    _ => self.process.boolean(data != other),
                }
            }
        };
        self.push(result);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // tuple
    // ───────────────────────────────────────────────────────────────────

    fn tuple_method(&mut self, method: TupleMethod, name: &str, args: Vec<Object>) -> Result<()> {
        use TupleMethod::*;
        match method {
            New => {
                self.arity(name, &args, 1, 2)?;
                let Some(iterable) = args.into_iter().nth(1) else {
                    let empty = self.process.tuple(Vec::new());
                    self.push(empty);
                    return Ok(());
                };
                match iterable.value() {
                    Value::Tuple(_) => {
                        self.push(iterable);
                        Ok(())
                    }
                    Value::String(_) => {
                        let items = self.sequence_items(&iterable)?;
                        let tuple = self.process.tuple(items);
                        self.push(tuple);
                        Ok(())
                    }
                    _ => {
                        let height = self.stack_len();
                        self.defer(move |ev| {
                            let items = ev.pop_from(height)?;
                            let tuple = ev.process.tuple(items);
                            ev.push(tuple);
                            Ok(())
                        })?;
                        self.collect_iterable(iterable)
                    }
                }
            }
            IteratorIter => {
                let [iterator] = self.exact(name, args)?;
                self.push(iterator);
                Ok(())
            }
            IteratorNext => {
                let [iterator] = self.exact(name, args)?;
                let items = iterator.attribute("__items__");
                let position = iterator
                    .attribute("__position__")
                    .and_then(|position| position.as_number().and_then(Number::to_i64))
                    .unwrap_or(0);
                let next = items
                    .as_ref()
                    .and_then(|items| items.as_tuple())
                    .and_then(|items| usize::try_from(position).ok().and_then(|at| items.get(at)))
                    .cloned();
                match next {
                    Some(item) => {
                        iterator.set_attribute("__position__", self.process.int(position + 1));
                        self.push(item);
                        Ok(())
                    }
                    None => {
                        let stop = &self.builtins().exceptions.stop_iteration;
                        Err(self.process.exception(stop, Vec::new()).into())
                    }
                }
            }
            _ => {
                let Some(items) = args.first().and_then(|first| first.as_tuple()).map(<[Object]>::to_vec)
                else {
                    return Err(self.type_error(format!(
                        "descriptor '{}' requires a 'tuple' object",
                        name
                    )));
                };
                let result = match method {
                    Bool => {
                        self.arity(name, &args, 1, 1)?;
                        self.process.boolean(!items.is_empty())
                    }
                    Len => {
                        self.arity(name, &args, 1, 1)?;
                        self.process.int(items.len() as i64)
                    }
                    Iter => {
                        self.arity(name, &args, 1, 1)?;
                        self.process.alloc(
                            Value::Instance,
                            [
                                ("__class__", self.builtins().tuple_iterator.clone()),
                                ("__items__", args[0].clone()),
                                ("__position__", self.process.int(0)),
                            ],
                        )
                    }
                    _ => {
                        self.arity(name, &args, 2, 2)?;
                        let other = &args[1];
                        match (method, other.as_tuple()) {
                            (Add, Some(right)) => {
                                let mut joined = items;
                                joined.extend(right.iter().cloned());
                                self.process.tuple(joined)
                            }
                            (Eq, Some(right)) => self.process.boolean(sequences_equal(&items, right)),
                            (Ne, Some(right)) => self.process.boolean(!sequences_equal(&items, right)),
                            (Contains, _) => self
                                .process
                                .boolean(items.iter().any(|item| values_equal(item, other))),
                            (GetItem, _) if self.is_slice(other) => {
                                let picked = self
                                    .slice_indices(other, items.len())?
                                    .into_iter()
                                    .map(|index| items[index].clone())
                                    .collect();
                                self.process.tuple(picked)
                            }
                            (GetItem, _) => {
                                let index = self.index(other, items.len(), "tuple")?;
                                items[index].clone()
                            }
                            _ => return self.push_not_implemented(),
                        }
                    }
                };
                self.push(result);
                Ok(())
            }
        }
    }

    fn is_slice(&self, object: &Object) -> bool {
        object
            .class()
            .is_some_and(|class| class.is(&self.builtins().slice))
    }

    /// A subscript index normalized against `len`.
    fn index(&self, index: &Object, len: usize, what: &str) -> Result<usize> {
        let Some(number) = numeric(index).filter(Number::is_int) else {
            return Err(self.type_error(format!(
                "{} indices must be integers or slices, not {}",
                what,
                index.type_name()
            )));
        };
        let len = len as i64;
        let position = number
            .to_i64()
            .map(|at| if at < 0 { at + len } else { at })
            .filter(|at| (0..len).contains(at));
        match position {
            Some(at) => Ok(at as usize),
            None => Err(self.process.error(
                &self.builtins().exceptions.index_error,
                format!("{} index out of range", what),
            )),
        }
    }

    /// Positions selected by a `slice` over a sequence of `len` items.
    fn slice_indices(&self, slice: &Object, len: usize) -> Result<Vec<usize>> {
        let len = len as i64;
        let bound = |name: &str| -> Result<Option<i64>> {
            match slice.attribute(name) {
                None => Ok(None),
                Some(value) if Evaluator::is_none(&value) => Ok(None),
                Some(value) => numeric(&value)
                    .filter(Number::is_int)
                    .map(|number| {
                        // huge bounds clamp to the ends anyway
                        let past = if number.to_f64() < 0.0 { -len - 1 } else { len + 1 };
                        Some(number.to_i64().unwrap_or(past))
                    })
                    .ok_or_else(|| {
                        self.type_error("slice indices must be integers or None")
                    }),
            }
        };
        let step = bound("step")?.unwrap_or(1);
        if step == 0 {
            return Err(self.value_error("slice step cannot be zero"));
        }
        let clamp = |at: i64, low: i64, high: i64| {
            let at = if at < 0 { at + len } else { at };
            at.clamp(low, high)
        };
        let (start, stop) = if step > 0 {
            (
                bound("start")?.map_or(0, |at| clamp(at, 0, len)),
                bound("stop")?.map_or(len, |at| clamp(at, 0, len)),
            )
        } else {
            (
                bound("start")?.map_or(len - 1, |at| clamp(at, -1, len - 1)),
                bound("stop")?.map_or(-1, |at| clamp(at, -1, len - 1)),
            )
        };
        let mut indices = Vec::new();
        let mut next = Some(start);
        while let Some(at) = next {
            if !((step > 0 && at < stop) || (step < 0 && at > stop)) {
                break;
            }
            indices.push(at as usize);
            next = at.checked_add(step);
        }
        Ok(indices)
    }

    // ───────────────────────────────────────────────────────────────────
    // BaseException
    // ───────────────────────────────────────────────────────────────────

    fn exception_method(&mut self, method: ExceptionMethod, name: &str, args: Vec<Object>) -> Result<()> {
        self.arity(name, &args, 1, usize::MAX)?;
        let receiver = args[0].clone();
        let result = match method {
            ExceptionMethod::Init => {
                receiver.set_attribute("args", self.process.tuple(args[1..].to_vec()));
                self.process.none()
            }
            ExceptionMethod::Repr => {
                self.arity(name, &args, 1, 1)?;
                self.process.string(repr(&receiver))
            }
            ExceptionMethod::Str => {
                self.arity(name, &args, 1, 1)?;
                self.process.string(to_str(&receiver))
            }
        };
        self.push(result);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // builtins
    // ───────────────────────────────────────────────────────────────────

    fn sys_call(&mut self, call: SysCall, args: Vec<Object>, kwargs: Kwargs) -> Result<()> {
        let name = call.name();
        if call != SysCall::Print && !kwargs.is_empty() {
            return Err(self.type_error(format!("{}() takes no keyword arguments", name)));
        }
        let exceptions = &self.builtins().exceptions;
        match call {
            SysCall::Print => self.print(args, kwargs),
            SysCall::Id => {
                let [object] = self.exact(name, args)?;
                let id = self.process.number(Number::int(object.id().as_usize()));
                self.push(id);
                Ok(())
            }
            SysCall::Len => {
                let [object] = self.exact(name, args)?;
                self.defer(|ev| {
                    let length = ev.pop()?;
                    let length = ev.length(&length)?;
                    let length = ev.process.number(length);
                    ev.push(length);
                    Ok(())
                })?;
                self.call_special(object, "__len__", Vec::new())
            }
            SysCall::Iter => {
                let [object] = self.exact(name, args)?;
                self.call_special(object, "__iter__", Vec::new())
            }
            SysCall::Next => {
                self.arity(name, &args, 1, 2)?;
                let mut args = args.into_iter();
                let iterator = args.next().ok_or_else(|| EvalError::fatal("next() without iterator"))?;
                if let Some(default) = args.next() {
                    self.push_body(
                        BodyKind::Catch {
                            class: exceptions.stop_iteration.clone(),
                            fallback: default,
                        },
                        Vec::new(),
                    )?;
                }
                self.call_special(iterator, "__next__", Vec::new())
            }
            SysCall::Repr => {
                let [object] = self.exact(name, args)?;
                self.defer(|ev| {
                    let text = ev.top()?;
                    if text.as_str().is_none() {
                        return Err(ev.type_error(format!(
                            "__repr__ returned non-string (type {})",
                            text.type_name()
                        )));
                    }
                    Ok(())
                })?;
                self.call_special(object, "__repr__", Vec::new())
            }
            SysCall::IsInstance => {
                let [object, classinfo] = self.exact(name, args)?;
                let result =
                    self.class_matches(name, &classinfo, &|class| protocol::is_instance(&object, class))?;
                self.push_bool(result);
                Ok(())
            }
            SysCall::IsSubclass => {
                let [class, classinfo] = self.exact(name, args)?;
                if !class.has_attribute("__mro__") {
                    return Err(self.type_error("issubclass() arg 1 must be a class"));
                }
                let result =
                    self.class_matches(name, &classinfo, &|base| protocol::is_subclass(&class, base))?;
                self.push_bool(result);
                Ok(())
            }
            SysCall::GetAttr => {
                self.arity(name, &args, 2, 3)?;
                let attr = self.attribute_name(&args[1])?;
                if let Some(default) = args.get(2) {
                    self.push_body(
                        BodyKind::Catch {
                            class: exceptions.attribute_error.clone(),
                            fallback: default.clone(),
                        },
                        Vec::new(),
                    )?;
                }
                self.get_attribute(args[0].clone(), &attr)
            }
            SysCall::HasAttr => {
                let [object, attr] = self.exact(name, args)?;
                let attr = self.attribute_name(&attr)?;
                self.push_body(
                    BodyKind::Catch {
                        class: exceptions.attribute_error.clone(),
                        fallback: self.process.boolean(false),
                    },
                    Vec::new(),
                )?;
                self.defer(|ev| {
                    ev.pop()?;
                    ev.push_bool(true);
                    Ok(())
                })?;
                self.get_attribute(object, &attr)
            }
            SysCall::SetAttr => {
                let [object, attr, value] = self.exact(name, args)?;
                let attr = self.attribute_name(&attr)?;
                self.push_step(Step::Push(self.process.none()))?;
                self.set_attr(object, &attr, value)
            }
            SysCall::DelAttr => {
                let [object, attr] = self.exact(name, args)?;
                let attr = self.attribute_name(&attr)?;
                self.push_step(Step::Push(self.process.none()))?;
                self.del_attr(object, &attr)
            }
            SysCall::Dir => {
                let [object] = self.exact(name, args)?;
                self.call_special(object, "__dir__", Vec::new())
            }
            SysCall::Abs => {
                let [object] = self.exact(name, args)?;
                self.call_special(object, "__abs__", Vec::new())
            }
        }
    }

    fn class_matches(
        &self,
        name: &str,
        classinfo: &Object,
        test: &dyn Fn(&Object) -> bool,
    ) -> Result<bool> {
        if let Some(classes) = classinfo.as_tuple() {
            for class in classes {
                if self.class_matches(name, class, test)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        if !classinfo.has_attribute("__mro__") {
            return Err(self.type_error(format!(
                "{}() arg 2 must be a type or tuple of types",
                name
            )));
        }
        Ok(test(classinfo))
    }

    /// `print(*args, sep=' ', end='\n')`: every argument goes through
    /// `str()` before anything is written.
    fn print(&mut self, args: Vec<Object>, kwargs: Kwargs) -> Result<()> {
        let mut sep = String::from(" ");
        let mut end = String::from("\n");
        for (key, value) in kwargs {
            let slot = match &*key {
                "sep" => &mut sep,
                "end" => &mut end,
                "flush" => continue,
                _ => {
                    return Err(self.type_error(format!(
                        "'{}' is an invalid keyword argument for print()",
                        key
                    )))
                }
            };
            match value.value() {
                Value::None => {}
                Value::String(text) => *slot = text.to_string(),
                _ => {
                    return Err(self.type_error(format!(
                        "{} must be None or a string, not {}",
                        key,
                        value.type_name()
                    )))
                }
            }
        }

        let height = self.stack_len();
        self.defer(move |ev| {
            let pieces = ev.pop_from(height)?;
            let mut text = pieces
                .iter()
                .map(|piece| piece.as_str().unwrap_or_default())
                .collect::<Vec<_>>()
                .join(&sep);
            text.push_str(&end);
            ev.process
                .write_output(&text)
                .map_err(|error| ev.runtime_error(format!("print failed: {}", error)))?;
            ev.push_none();
            Ok(())
        })?;
        for arg in args.into_iter().rev() {
            self.push_step(Step::ToStr)?;
            self.push_step(Step::Push(arg))?;
        }
        Ok(())
    }
}

/// Numeric view of an operand; booleans count as 0 and 1.
fn numeric(object: &Object) -> Option<Number> {
    match object.value() {
        Value::Number(number) => Some(number.clone()),
        Value::True => Some(Number::int(1)),
        Value::False => Some(Number::int(0)),
        _ => None,
    }
}

fn arithmetic(method: NumberMethod, x: &Number, y: &Number) -> std::result::Result<Number, NumberError> {
    use NumberMethod::*;
    match method {
        Add => Ok(x.add(y)),
        Sub => Ok(x.sub(y)),
        Mul => Ok(x.mul(y)),
        TrueDiv => x.true_div(y),
        FloorDiv => x.floor_div(y),
        Mod => x.rem(y),
        Pow => x.pow(y),
        LShift => x.shl(y),
        RShift => x.shr(y),
        And => x.bitand(y),
        Or => x.bitor(y),
        _ => x.bitxor(y),
    }
}

/// Structural equality of builtin values, used by tuple comparison and
/// containment.
fn values_equal(left: &Object, right: &Object) -> bool {
    if left.is(right) {
        return true;
    }
    match (left.value(), right.value()) {
        (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        _ => match (numeric(left), numeric(right)) {
            (Some(a), Some(b)) => a.equals(&b),
            _ => false,
        },
    }
}

fn sequences_equal(left: &[Object], right: &[Object]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(a, b)| values_equal(a, b))
}
