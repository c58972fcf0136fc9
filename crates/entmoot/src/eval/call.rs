//! Calls and argument binding.

use std::sync::Arc;

use super::expr::is_starred;
use super::{Evaluator, FrameKind, Step};
use crate::ast::{self, Ident};
use crate::error::{EvalError, Result};
use crate::object::{Code, Object, Value};
use crate::protocol::{self, find_special, Attribute, Lookup};

/// Keyword arguments in call order.
pub(crate) type Kwargs = Vec<(Ident, Object)>;

impl Evaluator<'_> {
    /// The callee, positional values and keyword values of `node` are on
    /// the stack above `height`.
    pub(crate) fn call_expression(&mut self, node: &ast::Call, height: usize) -> Result<()> {
        let mut values = self.pop_from(height)?.into_iter();
        let underflow = || EvalError::fatal("call operands missing");
        let callee = values.next().ok_or_else(underflow)?;

        let mut args = Vec::with_capacity(node.args.len());
        for arg in node.args.iter() {
            let value = values.next().ok_or_else(underflow)?;
            if is_starred(arg) {
                args.extend(self.sequence_items(&value)?);
            } else {
                args.push(value);
            }
        }

        let mut kwargs = Kwargs::with_capacity(node.keywords.len());
        for keyword in node.keywords.iter() {
            let value = values.next().ok_or_else(underflow)?;
            match &keyword.arg {
                Some(name) => kwargs.push((name.clone(), value)),
                None => {
                    return Err(self.type_error(format!(
                        "argument after ** must be a mapping, not {}",
                        value.type_name()
                    )))
                }
            }
        }
        self.call(callee, args, kwargs)
    }

    /// Call `callee`. The result is on the stack once the scheduled steps
    /// have run.
    ///
    /// Code objects get a frame at once. Anything else is dispatched from a
    /// step of its own, so chains of bound methods, `__call__` hooks and
    /// native callables never nest on the native stack; the length of such a
    /// chain is limited like frame depth.
    pub(crate) fn call(&mut self, callee: Object, args: Vec<Object>, kwargs: Kwargs) -> Result<()> {
        if let Value::Code(code) = callee.value() {
            let code = code.clone();
            return self.call_code(&callee, code, args, kwargs);
        }
        let hops = self.hops + 1;
        if hops > self.process.config().max_frames {
            return Err(self.process.error(
                &self.builtins().exceptions.recursion_error,
                "maximum recursion depth exceeded while calling an object",
            ));
        }
        self.defer(move |ev| {
            let outer = std::mem::replace(&mut ev.hops, hops);
            let result = ev.dispatch(callee, args, kwargs);
            ev.hops = outer;
            result
        })
    }

    fn dispatch(&mut self, callee: Object, mut args: Vec<Object>, kwargs: Kwargs) -> Result<()> {
        if callee.value().is_native() {
            return self.call_native(&callee, args, kwargs);
        }
        if protocol::is_instance(&callee, &self.builtins().method) {
            if let (Some(function), Some(receiver)) =
                (callee.attribute("__func__"), callee.attribute("__self__"))
            {
                args.insert(0, receiver);
                return self.call(function, args, kwargs);
            }
        }
        match find_special(&callee, "__call__") {
            Some(method) => self.call_attribute(method, args, kwargs),
            None => Err(self.type_error(format!(
                "'{}' object is not callable",
                callee.type_name()
            ))),
        }
    }

    pub(crate) fn call_attribute(
        &mut self,
        attribute: Attribute,
        mut args: Vec<Object>,
        kwargs: Kwargs,
    ) -> Result<()> {
        match attribute {
            Attribute::Plain(function) => self.call(function, args, kwargs),
            Attribute::Bound { function, receiver } => {
                args.insert(0, receiver);
                self.call(function, args, kwargs)
            }
        }
    }

    /// Call an implicitly invoked method of `receiver`'s type.
    pub(crate) fn call_special(&mut self, receiver: Object, name: &str, args: Vec<Object>) -> Result<()> {
        match find_special(&receiver, name) {
            Some(method) => self.call_attribute(method, args, Kwargs::new()),
            None => Err(self.missing_special(&receiver, name)),
        }
    }

    fn missing_special(&self, receiver: &Object, name: &str) -> EvalError {
        let type_name = receiver.type_name();
        let message = match name {
            "__getitem__" => format!("'{}' object is not subscriptable", type_name),
            "__setitem__" => format!("'{}' object does not support item assignment", type_name),
            "__delitem__" => format!("'{}' object doesn't support item deletion", type_name),
            "__len__" => format!("object of type '{}' has no len()", type_name),
            "__iter__" => format!("'{}' object is not iterable", type_name),
            "__next__" => format!("'{}' object is not an iterator", type_name),
            "__contains__" => format!("argument of type '{}' is not iterable", type_name),
            "__neg__" => format!("bad operand type for unary -: '{}'", type_name),
            "__pos__" => format!("bad operand type for unary +: '{}'", type_name),
            "__invert__" => format!("bad operand type for unary ~: '{}'", type_name),
            "__abs__" => format!("bad operand type for abs(): '{}'", type_name),
            _ => {
                let error = crate::object::AttributeError {
                    name: name.to_string(),
                    type_name,
                };
                return self.process.attribute_error(&error, receiver);
            }
        };
        self.type_error(message)
    }

    /// The value an attribute expression evaluates to. Functions found on
    /// the type become bound `method` objects.
    pub(crate) fn materialize(&self, attribute: Attribute) -> Object {
        match attribute {
            Attribute::Plain(object) => object,
            Attribute::Bound { function, receiver } => self.process.alloc(
                Value::Instance,
                [
                    ("__class__", self.builtins().method.clone()),
                    ("__func__", function),
                    ("__self__", receiver),
                ],
            ),
        }
    }

    /// Push `object.name`, running `__getattribute__` / `__getattr__`
    /// hooks when the type defines them.
    pub(crate) fn get_attribute(&mut self, object: Object, name: &str) -> Result<()> {
        match protocol::lookup(&object, name) {
            Lookup::Found(attribute) => {
                let value = self.materialize(attribute);
                self.push(value);
                Ok(())
            }
            Lookup::Hook(hook) | Lookup::Fallback(hook) => {
                let name = self.process.string(name);
                self.call_attribute(hook, vec![name], Kwargs::new())
            }
            Lookup::Missing(error) => Err(self.process.attribute_error(&error, &object)),
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Code objects
    // ───────────────────────────────────────────────────────────────────

    fn call_code(&mut self, function: &Object, code: Code, args: Vec<Object>, kwargs: Kwargs) -> Result<()> {
        let locals = self
            .process
            .alloc(Value::Instance, std::iter::empty::<(String, Object)>());
        self.bind_arguments(function, &code, &locals, args, kwargs)?;

        let globals = match function.attribute("__globals__") {
            Some(globals) => globals,
            None => self.globals()?,
        };
        let enclosing = function
            .attribute("__closure__")
            .and_then(|closure| closure.as_tuple().map(<[Object]>::to_vec))
            .unwrap_or_default();
        let qualname = function
            .attribute("__qualname__")
            .and_then(|name| name.as_str().map(Arc::from));
        let steps = match &code {
            Code::Function(def) => vec![Step::Block(def.body.clone(), 0)],
            Code::Lambda(lambda) => vec![Step::SetReturn, Step::Get(lambda.body.clone())],
        };

        self.push_step(Step::PushReturn)?;
        self.push_frame(FrameKind::Function, locals, globals, enclosing, steps)?;
        self.frame_mut()?.qualname = qualname;
        Ok(())
    }

    fn bind_arguments(
        &self,
        function: &Object,
        code: &Code,
        locals: &Object,
        args: Vec<Object>,
        kwargs: Kwargs,
    ) -> Result<()> {
        let spec = code.arguments();
        let name = code.name();
        let positional: Vec<&ast::Arg> = spec.positional().collect();
        let defaults = function
            .attribute("__defaults__")
            .and_then(|defaults| defaults.as_tuple().map(<[Object]>::to_vec))
            .unwrap_or_default();

        let given = args.len();
        let mut args = args.into_iter();
        for (param, value) in positional.iter().zip(args.by_ref()) {
            locals.set_attribute(&*param.arg, value);
        }
        let extra: Vec<Object> = args.collect();
        match &spec.vararg {
            Some(vararg) => locals.set_attribute(&*vararg.arg, self.process.tuple(extra)),
            None if !extra.is_empty() => {
                let max = positional.len();
                let min = max.saturating_sub(defaults.len());
                let takes = if min == max {
                    format!("{} positional argument{}", max, plural(max))
                } else {
                    format!("from {} to {} positional arguments", min, max)
                };
                return Err(self.type_error(format!(
                    "{}() takes {} but {} {} given",
                    name,
                    takes,
                    given,
                    if given == 1 { "was" } else { "were" }
                )));
            }
            None => {}
        }

        let extra_keywords = spec.kwarg.as_ref().map(|_| {
            self.process
                .alloc(Value::Instance, std::iter::empty::<(String, Object)>())
        });
        for (key, value) in kwargs {
            let is_param = spec
                .args
                .iter()
                .chain(spec.kwonlyargs.iter())
                .any(|param| param.arg == key);
            if is_param {
                if locals.has_attribute(&key) {
                    return Err(self.type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        name, key
                    )));
                }
                locals.set_attribute(&*key, value);
            } else if let Some(extra) = &extra_keywords {
                extra.set_attribute(&*key, value);
            } else {
                return Err(self.type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                )));
            }
        }
        if let (Some(kwarg), Some(extra)) = (&spec.kwarg, extra_keywords) {
            locals.set_attribute(&*kwarg.arg, extra);
        }

        let first_default = positional.len().saturating_sub(defaults.len());
        let mut missing = Vec::new();
        for (index, param) in positional.iter().enumerate() {
            if locals.has_attribute(&param.arg) {
                continue;
            }
            match index.checked_sub(first_default).and_then(|i| defaults.get(i)) {
                Some(default) => locals.set_attribute(&*param.arg, default.clone()),
                None => missing.push(param.arg.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(self.missing_arguments(name, "positional", &missing));
        }

        let kw_defaults = function.attribute("__kwdefaults__");
        for param in spec.kwonlyargs.iter() {
            if locals.has_attribute(&param.arg) {
                continue;
            }
            match kw_defaults
                .as_ref()
                .and_then(|defaults| defaults.attribute(&param.arg))
            {
                Some(default) => locals.set_attribute(&*param.arg, default),
                None => missing.push(param.arg.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(self.missing_arguments(name, "keyword-only", &missing));
        }
        Ok(())
    }

    fn missing_arguments(&self, function: &str, kind: &str, names: &[Ident]) -> EvalError {
        let quoted: Vec<String> = names.iter().map(|name| format!("'{}'", name)).collect();
        let listed = match quoted.as_slice() {
            [] => String::new(),
            [one] => one.clone(),
            [first, second] => format!("{} and {}", first, second),
            [init @ .., last] => format!("{}, and {}", init.join(", "), last),
        };
        self.type_error(format!(
            "{}() missing {} required {} argument{}: {}",
            function,
            names.len(),
            kind,
            plural(names.len()),
            listed
        ))
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
