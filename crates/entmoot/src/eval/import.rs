//! `import` and `from ... import`.
//!
//! Module loading runs synchronously through the process's module table
//! and resolver; only the binding of names happens in the current frame.

use super::Evaluator;
use crate::ast::{Alias, ImportFrom};
use crate::error::{EvalError, Result};
use crate::object::Object;
use crate::protocol;

impl Evaluator<'_> {
    pub(crate) fn import(&mut self, names: &[Alias]) -> Result<()> {
        for alias in names {
            let (top, leaf) = self.process.import_dotted(&alias.name)?;
            match &alias.asname {
                Some(asname) => self.store_name(asname, leaf)?,
                None => {
                    let first = alias.name.split('.').next().unwrap_or(&alias.name);
                    self.store_name(first, top)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn import_from(&mut self, node: &ImportFrom) -> Result<()> {
        let base = self.absolute_name(node.module.as_deref(), node.level)?;
        let (_, module) = self.process.import_dotted(&base)?;
        for alias in node.names.iter() {
            if &*alias.name == "*" {
                self.import_star(&module)?;
                continue;
            }
            let value = self.import_name(&module, &base, &alias.name)?;
            let binding = alias.asname.as_ref().unwrap_or(&alias.name);
            self.store_name(binding, value)?;
        }
        Ok(())
    }

    /// `module.name`, falling back to the submodule `base.name`.
    fn import_name(&self, module: &Object, base: &str, name: &str) -> Result<Object> {
        if let Some(value) = module.attribute(name) {
            return Ok(value);
        }
        let full = format!("{}.{}", base, name);
        match self.process.import(&full) {
            Ok(submodule) => {
                module.set_attribute(name, submodule.clone());
                Ok(submodule)
            }
            Err(EvalError::Exception(exception))
                if protocol::is_instance(
                    exception.value(),
                    &self.builtins().exceptions.module_not_found_error,
                ) =>
            {
                let error = self.process.exception(
                    &self.builtins().exceptions.import_error,
                    vec![self
                        .process
                        .string(format!("cannot import name '{}' from '{}'", name, base))],
                );
                error.value().set_attribute("name", self.process.string(base));
                Err(error.into())
            }
            Err(error) => Err(error),
        }
    }

    /// Bind the public names of `module`: `__all__` when present, else
    /// every name not starting with an underscore.
    fn import_star(&mut self, module: &Object) -> Result<()> {
        let names: Vec<String> = match module.attribute("__all__") {
            Some(all) => match all.as_tuple() {
                Some(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            self.type_error(format!(
                                "Item in __all__ must be str, not {}",
                                item.type_name()
                            ))
                        })
                    })
                    .collect::<Result<_>>()?,
                None => return Err(self.type_error("__all__ must be a tuple of str")),
            },
            None => module
                .dir()
                .into_iter()
                .filter(|name| !name.starts_with('_'))
                .collect(),
        };
        for name in names {
            let value = module.attribute(&name).ok_or_else(|| {
                self.process.attribute_error(
                    &crate::object::AttributeError {
                        name: name.clone(),
                        type_name: module.type_name(),
                    },
                    module,
                )
            })?;
            self.store_name(&name, value)?;
        }
        Ok(())
    }

    /// Resolve a relative module reference against `__package__`.
    fn absolute_name(&self, module: Option<&str>, level: u32) -> Result<String> {
        if level == 0 {
            return module
                .map(str::to_string)
                .ok_or_else(|| self.value_error("Empty module name"));
        }
        let exceptions = &self.builtins().exceptions;
        let package = self
            .globals()?
            .attribute("__package__")
            .and_then(|package| package.as_str().map(str::to_string))
            .unwrap_or_default();
        if package.is_empty() {
            return Err(self.process.error(
                &exceptions.import_error,
                "attempted relative import with no known parent package",
            ));
        }
        let mut base = package.as_str();
        for _ in 1..level {
            match base.rsplit_once('.') {
                Some((parent, _)) => base = parent,
                None => {
                    return Err(self.process.error(
                        &exceptions.import_error,
                        "attempted relative import beyond top-level package",
                    ))
                }
            }
        }
        Ok(match module {
            Some(module) => format!("{}.{}", base, module),
            None => base.to_string(),
        })
    }
}
