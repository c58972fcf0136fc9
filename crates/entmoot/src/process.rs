//! Process-wide runtime state.
//!
//! A [`ProcessContext`] owns everything shared by the evaluators of one
//! program: configuration, the builtin types, the module table, the
//! garbage collector, the interrupt flag and the module resolver. Evaluator
//! threads borrow it through [`ThreadContext`].

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::ast;
use crate::builtins::Builtins;
use crate::collector::GarbageCollector;
use crate::config::Config;
use crate::error::{BaseException, EvalError, Result};
use crate::modules::ModuleTable;
use crate::number::Number;
use crate::object::{AttributeError, Object, Value};
use crate::thread::ThreadContext;

// ═══════════════════════════════════════════════════════════════════════
// Module resolution
// ═══════════════════════════════════════════════════════════════════════

/// Failure to produce a module for an import.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No source for the module
    #[error("No module named '{name}'")]
    NotFound {
        /// Dotted module name
        name: String,
    },

    /// The module source could not be parsed
    #[error("{message}")]
    Syntax {
        /// Dotted module name
        name: String,
        /// Parser message
        message: String,
    },

    /// The module source could not be read
    #[error("cannot load module '{name}': {source}")]
    Io {
        /// Dotted module name
        name: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Evaluating the module body raised
    #[error(transparent)]
    Failed(#[from] EvalError),
}

/// Produces modules for `import` statements.
///
/// Called only for names missing from the module table. Implementations
/// typically locate an AST and hand it to [`ProcessContext::load_module`],
/// which registers the module before evaluating its body.
pub trait ModuleResolver: Send + Sync {
    /// Produce the module called `name`.
    fn resolve_module(
        &self,
        process: &ProcessContext,
        name: &str,
    ) -> std::result::Result<Object, ResolveError>;
}

/// Resolver for programs that import nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModules;

impl ModuleResolver for NoModules {
    fn resolve_module(
        &self,
        _process: &ProcessContext,
        name: &str,
    ) -> std::result::Result<Object, ResolveError> {
        Err(ResolveError::NotFound {
            name: name.to_string(),
        })
    }
}

/// Resolver over in-memory module ASTs keyed by dotted name.
///
/// A name that prefixes a registered module (`a` for `a.b`) resolves to a
/// package, empty unless it is registered itself.
#[derive(Debug, Default, Clone)]
pub struct AstModules {
    modules: HashMap<String, ast::Module>,
}

impl AstModules {
    /// An empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module.
    pub fn with_module(mut self, name: impl Into<String>, module: ast::Module) -> Self {
        self.insert(name, module);
        self
    }

    /// Add or replace a module.
    pub fn insert(&mut self, name: impl Into<String>, module: ast::Module) {
        self.modules.insert(name.into(), module);
    }

    fn is_package(&self, name: &str) -> bool {
        let prefix = format!("{}.", name);
        self.modules.keys().any(|key| key.starts_with(&prefix))
    }
}

impl ModuleResolver for AstModules {
    fn resolve_module(
        &self,
        process: &ProcessContext,
        name: &str,
    ) -> std::result::Result<Object, ResolveError> {
        let package = self.is_package(name);
        match self.modules.get(name) {
            Some(body) => Ok(process.load(name, body, package)?),
            None if package => Ok(process.load(name, &ast::Module::default(), true)?),
            None => Err(ResolveError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Process context
// ═══════════════════════════════════════════════════════════════════════

/// Shared state of one running program.
pub struct ProcessContext {
    config: Config,
    modules: Arc<ModuleTable>,
    collector: GarbageCollector,
    builtins: Builtins,
    interrupt: Arc<AtomicBool>,
    resolver: Box<dyn ModuleResolver>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl ProcessContext {
    /// A process that resolves no modules.
    pub fn new(config: Config) -> Self {
        Self::with_resolver(config, NoModules)
    }

    /// A process importing through `resolver`.
    pub fn with_resolver(config: Config, resolver: impl ModuleResolver + 'static) -> Self {
        let modules = Arc::new(ModuleTable::new());
        let collector = GarbageCollector::start(config.gc.clone(), Arc::clone(&modules));
        let builtins = Builtins::bootstrap(&collector, config.optimize);
        modules.insert("builtins", builtins.module.clone());
        tracing::debug!(
            max_frames = config.max_frames,
            background_gc = config.gc.background,
            "process context created"
        );
        ProcessContext {
            config,
            modules,
            collector,
            builtins,
            interrupt: Arc::new(AtomicBool::new(false)),
            resolver: Box::new(resolver),
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builtin types, singletons and the `builtins` module.
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Loaded modules.
    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    /// The garbage collector.
    pub fn collector(&self) -> &GarbageCollector {
        &self.collector
    }

    /// An evaluator context with a fresh `__main__` module.
    pub fn thread(&self) -> ThreadContext<'_> {
        ThreadContext::new(self)
    }

    // ───────────────────────────────────────────────────────────────────
    // Interrupts and output
    // ───────────────────────────────────────────────────────────────────

    /// The flag checked by every evaluator between steps; storing `true`
    /// raises `KeyboardInterrupt` in the next evaluator to look.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Request a `KeyboardInterrupt`.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Consume a pending interrupt, raising `KeyboardInterrupt`.
    pub fn process_interrupts(&self) -> Result<()> {
        if self.interrupt.load(Ordering::Relaxed) && self.interrupt.swap(false, Ordering::AcqRel) {
            let class = &self.builtins.exceptions.keyboard_interrupt;
            return Err(self.exception(class, Vec::new()).into());
        }
        Ok(())
    }

    /// Redirect `print` output.
    pub fn set_output(&self, output: Box<dyn Write + Send>) {
        *self.output.lock() = output;
    }

    pub(crate) fn write_output(&self, text: &str) -> io::Result<()> {
        let mut output = self.output.lock();
        output.write_all(text.as_bytes())?;
        output.flush()
    }

    // ───────────────────────────────────────────────────────────────────
    // Allocation
    // ───────────────────────────────────────────────────────────────────

    /// Create an Object and register it with the collector.
    pub fn alloc<I, K>(&self, value: Value, attributes: I) -> Object
    where
        I: IntoIterator<Item = (K, Object)>,
        K: Into<String>,
    {
        let object = Object::new(value, attributes);
        self.collector.emplace(object.clone());
        object
    }

    /// A plain instance of `class`.
    pub fn instance(&self, class: &Object) -> Object {
        self.alloc(Value::Instance, [("__class__", class.clone())])
    }

    /// An `int` or `float`.
    pub fn number(&self, number: Number) -> Object {
        let class = if number.is_int() {
            &self.builtins.int
        } else {
            &self.builtins.float
        };
        self.alloc(Value::Number(number), [("__class__", class.clone())])
    }

    /// An `int`.
    pub fn int(&self, value: i64) -> Object {
        self.number(Number::int(value))
    }

    /// A `str`.
    pub fn string(&self, text: impl Into<Arc<str>>) -> Object {
        self.alloc(
            Value::String(text.into()),
            [("__class__", self.builtins.str_.clone())],
        )
    }

    /// A `bytes`.
    pub fn bytes(&self, data: impl Into<Arc<[u8]>>) -> Object {
        self.alloc(
            Value::Bytes(data.into()),
            [("__class__", self.builtins.bytes.clone())],
        )
    }

    /// A `tuple`.
    pub fn tuple(&self, items: Vec<Object>) -> Object {
        self.alloc(
            Value::Tuple(items),
            [("__class__", self.builtins.tuple.clone())],
        )
    }

    /// `True` or `False`.
    pub fn boolean(&self, value: bool) -> Object {
        self.builtins.boolean(value)
    }

    /// `None`.
    pub fn none(&self) -> Object {
        self.builtins.none.clone()
    }

    /// An instance of exception `class` with the given `args`.
    pub fn exception(&self, class: &Object, args: Vec<Object>) -> BaseException {
        let args = self.tuple(args);
        BaseException::new(self.alloc(
            Value::Instance,
            [("__class__", class.clone()), ("args", args)],
        ))
    }

    /// An exception of `class` carrying one message argument.
    pub fn error(&self, class: &Object, message: impl Into<Arc<str>>) -> EvalError {
        let message = self.string(message);
        self.exception(class, vec![message]).into()
    }

    /// `TypeError(message)`.
    pub fn type_error(&self, message: impl Into<Arc<str>>) -> EvalError {
        self.error(&self.builtins.exceptions.type_error, message)
    }

    /// `AttributeError` for a failed lookup, with `name` and `obj` set.
    pub fn attribute_error(&self, error: &AttributeError, object: &Object) -> EvalError {
        let exception = self.exception(
            &self.builtins.exceptions.attribute_error,
            vec![self.string(error.to_string())],
        );
        exception
            .value()
            .set_attribute("name", self.string(error.name.as_str()));
        exception.value().set_attribute("obj", object.clone());
        exception.into()
    }

    // ───────────────────────────────────────────────────────────────────
    // Modules
    // ───────────────────────────────────────────────────────────────────

    /// An empty module; not registered in the module table.
    pub fn make_module(&self, name: &str) -> Object {
        let package = name.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
        self.alloc(
            Value::Instance,
            [
                ("__class__", self.builtins.module_type.clone()),
                ("__name__", self.string(name)),
                ("__package__", self.string(package)),
                ("__builtins__", self.builtins.module.clone()),
            ],
        )
    }

    /// Register `name` and evaluate `body` as its contents.
    ///
    /// The module is visible in the table while its body runs, so circular
    /// imports see the partially initialized module. A body that raises
    /// leaves no entry behind.
    pub fn load_module(&self, name: &str, body: &ast::Module) -> Result<Object> {
        self.load(name, body, false)
    }

    /// Like [`load_module`](Self::load_module), for a package: relative
    /// imports inside it resolve against the package itself.
    pub fn load_package(&self, name: &str, body: &ast::Module) -> Result<Object> {
        self.load(name, body, true)
    }

    fn load(&self, name: &str, body: &ast::Module, package: bool) -> Result<Object> {
        let module = self.make_module(name);
        if package {
            module.set_attribute("__package__", self.string(name));
            module.set_attribute("__path__", self.tuple(Vec::new()));
        }
        self.modules.insert(name, module.clone());
        tracing::debug!(module = name, package, "loading module");

        let mut thread = ThreadContext::with_module(self, module.clone());
        if let Err(error) = thread.evaluate_module(body) {
            self.modules.remove(name);
            return Err(error);
        }
        Ok(module)
    }

    /// The module called `name`, resolving it on first use.
    pub fn import(&self, name: &str) -> Result<Object> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module);
        }
        let module = self
            .resolver
            .resolve_module(self, name)
            .map_err(|error| self.resolve_error(error))?;
        if !self.modules.contains(name) {
            self.modules.insert(name, module.clone());
        }
        Ok(module)
    }

    /// Import every prefix of a dotted name, binding each child on its
    /// parent. Returns the top-level and the innermost module.
    pub fn import_dotted(&self, name: &str) -> Result<(Object, Object)> {
        let mut path = String::new();
        let mut top: Option<Object> = None;
        let mut parent: Option<Object> = None;
        for part in name.split('.') {
            if part.is_empty() {
                break;
            }
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(part);
            let module = self.import(&path)?;
            if let Some(parent) = &parent {
                parent.set_attribute(part, module.clone());
            }
            top.get_or_insert_with(|| module.clone());
            parent = Some(module);
        }
        match (top, parent) {
            (Some(top), Some(leaf)) => Ok((top, leaf)),
            _ => Err(self.error(&self.builtins.exceptions.value_error, "Empty module name")),
        }
    }

    fn resolve_error(&self, error: ResolveError) -> EvalError {
        let exceptions = &self.builtins.exceptions;
        let message = error.to_string();
        match error {
            ResolveError::NotFound { name } => {
                let error = self.exception(
                    &exceptions.module_not_found_error,
                    vec![self.string(message)],
                );
                error.value().set_attribute("name", self.string(name));
                error.into()
            }
            ResolveError::Syntax { .. } => self.error(&exceptions.syntax_error, message),
            ResolveError::Io { .. } => self.error(&exceptions.import_error, message),
            ResolveError::Failed(error) => error,
        }
    }
}

impl Drop for ProcessContext {
    fn drop(&mut self) {
        self.collector.shutdown();
        drop(self.modules.clear());
        self.builtins.teardown();
        let report = self.collector.collect();
        tracing::debug!(
            released = report.released,
            reclaimed = report.reclaimed,
            "process context torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::config::GcConfig;
    use pretty_assertions::assert_eq;

    fn process(resolver: impl ModuleResolver + 'static) -> ProcessContext {
        ProcessContext::with_resolver(Config::new().with_gc(GcConfig::manual()), resolver)
    }

    #[test]
    fn test_builtins_module_preloaded() {
        let process = process(NoModules);
        let builtins = process.import("builtins").unwrap();
        assert!(builtins.is(&process.builtins().module));
    }

    #[test]
    fn test_missing_module_raises_module_not_found() {
        let process = process(NoModules);
        let error = process.import("nowhere").unwrap_err();
        let exception = error.exception().unwrap();
        assert_eq!(exception.type_name(), "ModuleNotFoundError");
        assert_eq!(exception.to_string(), "ModuleNotFoundError: No module named 'nowhere'");
    }

    #[test]
    fn test_dotted_import_binds_children() {
        let resolver = AstModules::new().with_module("pkg.leaf", module(vec![assign(name("x"), int(1))]));
        let process = process(resolver);
        let (top, leaf) = process.import_dotted("pkg.leaf").unwrap();
        assert!(top.attribute("leaf").unwrap().is(&leaf));
        assert_eq!(top.attribute("__package__").unwrap().as_str(), Some("pkg"));
        assert!(leaf.attribute("x").is_some());
        assert_eq!(process.modules().names(), vec!["builtins", "pkg", "pkg.leaf"]);
    }

    #[test]
    fn test_failed_module_is_not_registered() {
        let resolver = AstModules::new().with_module("bad", module(vec![expr(name("missing"))]));
        let process = process(resolver);
        let error = process.import("bad").unwrap_err();
        assert_eq!(error.exception().unwrap().type_name(), "NameError");
        assert!(!process.modules().contains("bad"));
    }

    #[test]
    fn test_interrupt_raises_once() {
        let process = process(NoModules);
        process.interrupt();
        let error = process.process_interrupts().unwrap_err();
        assert_eq!(error.exception().unwrap().type_name(), "KeyboardInterrupt");
        assert!(process.process_interrupts().is_ok());
    }
}
