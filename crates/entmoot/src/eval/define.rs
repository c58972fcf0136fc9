//! `def`, `lambda` and `class`.

use std::sync::Arc;

use super::{Evaluator, FrameKind, Kwargs, Step};
use crate::ast;
use crate::error::Result;
use crate::object::{Code, Object, Value};
use crate::protocol;

impl Evaluator<'_> {
    /// Decorators, then defaults, then the function; decorators apply
    /// innermost first and the result is bound to the name.
    pub(crate) fn define_function(&mut self, def: Arc<ast::FunctionDef>) -> Result<()> {
        let height = self.stack_len();
        let decorators = def.decorator_list.len();
        let name = def.name.clone();
        self.defer(move |ev| {
            let function = ev.pop()?;
            ev.store_name(&name, function)
        })?;
        for _ in 0..decorators {
            self.defer(|ev| ev.decorate())?;
        }
        let code = Code::Function(Arc::clone(&def));
        self.defer(move |ev| {
            let function = ev.make_function(code, height + decorators)?;
            ev.push(function);
            Ok(())
        })?;
        self.push_defaults(&def.args)?;
        for decorator in def.decorator_list.iter().rev() {
            self.push_step(Step::Get(decorator.clone()))?;
        }
        Ok(())
    }

    pub(crate) fn define_lambda(&mut self, node: Arc<ast::Lambda>) -> Result<()> {
        let height = self.stack_len();
        let args = Arc::clone(&node.args);
        let code = Code::Lambda(node);
        self.defer(move |ev| {
            let function = ev.make_function(code, height)?;
            ev.push(function);
            Ok(())
        })?;
        self.push_defaults(&args)
    }

    fn push_defaults(&mut self, args: &ast::Arguments) -> Result<()> {
        for default in args.kw_defaults.iter().rev().flatten() {
            self.push_step(Step::Get(default.clone()))?;
        }
        for default in args.defaults.iter().rev() {
            self.push_step(Step::Get(default.clone()))?;
        }
        Ok(())
    }

    /// Pop the evaluated defaults above `height` and build a `function`.
    fn make_function(&mut self, code: Code, height: usize) -> Result<Object> {
        let mut values = self.pop_from(height)?.into_iter();
        let spec = code.arguments();
        let defaults: Vec<Object> = values.by_ref().take(spec.defaults.len()).collect();
        let kw_defaults = if spec.kw_defaults.iter().any(Option::is_some) {
            let namespace = self
                .process
                .alloc(Value::Instance, std::iter::empty::<(String, Object)>());
            for (param, default) in spec.kwonlyargs.iter().zip(spec.kw_defaults.iter()) {
                if default.is_none() {
                    continue;
                }
                if let Some(value) = values.next() {
                    namespace.set_attribute(&*param.arg, value);
                }
            }
            namespace
        } else {
            self.process.none()
        };
        let defaults = if defaults.is_empty() {
            self.process.none()
        } else {
            self.process.tuple(defaults)
        };

        let name = code.name().to_string();
        let qualname = self.qualify(&name)?;
        let globals = self.globals()?;
        let module = globals
            .attribute("__name__")
            .unwrap_or_else(|| self.process.none());
        let closure = self.process.tuple(self.closure()?);
        let code_object = self.process.alloc(
            Value::Code(code.clone()),
            std::iter::empty::<(String, Object)>(),
        );
        Ok(self.process.alloc(
            Value::Code(code),
            [
                ("__class__", self.builtins().function.clone()),
                ("__name__", self.process.string(name)),
                ("__qualname__", self.process.string(qualname)),
                ("__module__", module),
                ("__globals__", globals),
                ("__defaults__", defaults),
                ("__kwdefaults__", kw_defaults),
                ("__closure__", closure),
                ("__code__", code_object),
            ],
        ))
    }

    /// Stack holds a decorator and the object it decorates.
    fn decorate(&mut self) -> Result<()> {
        let target = self.pop()?;
        let decorator = self.pop()?;
        self.call(decorator, vec![target], Kwargs::new())
    }

    /// Qualified name of something defined in the current frame.
    fn qualify(&self, name: &str) -> Result<String> {
        let frame = self.frame()?;
        let prefix = match frame.kind {
            FrameKind::Class => frame
                .locals
                .attribute("__qualname__")
                .and_then(|qualname| qualname.as_str().map(str::to_string)),
            FrameKind::Function => frame
                .qualname
                .as_ref()
                .map(|qualname| format!("{}.<locals>", qualname)),
            FrameKind::Module | FrameKind::Interactive => None,
        };
        Ok(match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        })
    }

    // ───────────────────────────────────────────────────────────────────
    // Classes
    // ───────────────────────────────────────────────────────────────────

    pub(crate) fn define_class(&mut self, def: Arc<ast::ClassDef>) -> Result<()> {
        let height = self.stack_len();
        let decorators = def.decorator_list.len();
        let name = def.name.clone();
        self.defer(move |ev| {
            let class = ev.pop()?;
            ev.store_name(&name, class)
        })?;
        for _ in 0..decorators {
            self.defer(|ev| ev.decorate())?;
        }
        let node = Arc::clone(&def);
        self.defer(move |ev| ev.build_class(node, height + decorators))?;
        for keyword in def.keywords.iter().rev() {
            self.push_step(Step::Get(keyword.value.clone()))?;
        }
        for base in def.bases.iter().rev() {
            self.push_step(Step::Get(base.clone()))?;
        }
        for decorator in def.decorator_list.iter().rev() {
            self.push_step(Step::Get(decorator.clone()))?;
        }
        Ok(())
    }

    /// Bases and keyword values are on the stack above `height`. Creates
    /// the class and runs its body with the class as the frame's locals.
    fn build_class(&mut self, def: Arc<ast::ClassDef>, height: usize) -> Result<()> {
        let values = self.pop_from(height)?;
        if values.len() != def.bases.len() + def.keywords.len() {
            return Err(crate::error::EvalError::fatal("class operands missing"));
        }
        let (bases, keywords) = values.split_at(def.bases.len());

        let mut metaclass = None;
        for (keyword, value) in def.keywords.iter().zip(keywords) {
            match keyword.arg.as_deref() {
                Some("metaclass") => metaclass = Some(value.clone()),
                Some(_) => {}
                None => return Err(self.type_error("class keywords cannot be unpacked")),
            }
        }
        let builtins = self.builtins();
        let bases = if bases.is_empty() {
            vec![builtins.object.clone()]
        } else {
            bases.to_vec()
        };
        let metaclass = metaclass
            .or_else(|| bases.first().and_then(Object::class))
            .unwrap_or_else(|| builtins.type_.clone());

        let qualname = self.qualify(&def.name)?;
        let globals = self.globals()?;
        let module = globals
            .attribute("__name__")
            .unwrap_or_else(|| self.process.none());
        let class = self.process.alloc(
            Value::Instance,
            [
                ("__class__", metaclass),
                ("__name__", self.process.string(Arc::clone(&def.name))),
                ("__qualname__", self.process.string(qualname.as_str())),
                ("__module__", module),
                ("__bases__", self.process.tuple(bases.clone())),
            ],
        );
        let mro = protocol::linearize(&class, &bases)
            .map_err(|error| self.type_error(error.to_string()))?;
        class.set_attribute("__mro__", self.process.tuple(mro));
        tracing::trace!(class = %qualname, "class created");

        self.push_step(Step::Push(class.clone()))?;
        let enclosing = self.closure()?;
        self.push_frame(
            FrameKind::Class,
            class,
            globals,
            enclosing,
            vec![Step::Block(def.body.clone(), 0)],
        )?;
        self.frame_mut()?.qualname = Some(qualname.into());
        Ok(())
    }
}
