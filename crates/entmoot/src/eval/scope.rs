//! Name resolution.
//!
//! Loads search the frame's locals, the enclosing function scopes captured
//! when the function was defined, the globals, and finally the builtins.
//! `global` and `nonlocal` declarations redirect stores and deletes.

use super::{Evaluator, Scope};
use crate::ast::Ident;
use crate::error::{EvalError, Result};
use crate::object::Object;

impl Evaluator<'_> {
    pub(crate) fn load_name(&self, name: &str) -> Result<Object> {
        let frame = self.frame()?;
        let declared = frame.declared(name);
        if declared != Some(Scope::Global) {
            if declared != Some(Scope::Nonlocal) {
                if let Some(value) = frame.locals.attribute(name) {
                    return Ok(value);
                }
            }
            for scope in &frame.enclosing {
                if let Some(value) = scope.attribute(name) {
                    return Ok(value);
                }
            }
        }
        if let Some(value) = frame.globals.attribute(name) {
            return Ok(value);
        }
        let builtins = frame
            .globals
            .attribute("__builtins__")
            .unwrap_or_else(|| self.builtins().module.clone());
        builtins
            .attribute(name)
            .ok_or_else(|| self.name_error(name))
    }

    pub(crate) fn store_name(&mut self, name: &str, value: Object) -> Result<()> {
        let frame = self.frame()?;
        let target = match frame.declared(name) {
            Some(Scope::Global) => frame.globals.clone(),
            Some(Scope::Nonlocal) => self.nonlocal_scope(name)?,
            None => frame.locals.clone(),
        };
        target.set_attribute(name, value);
        Ok(())
    }

    pub(crate) fn delete_name(&mut self, name: &str) -> Result<()> {
        let frame = self.frame()?;
        let target = match frame.declared(name) {
            Some(Scope::Global) => frame.globals.clone(),
            Some(Scope::Nonlocal) => self.nonlocal_scope(name)?,
            None => frame.locals.clone(),
        };
        match target.delete_attribute(name) {
            Some(_) => Ok(()),
            None => Err(self.name_error(name)),
        }
    }

    pub(crate) fn declare(&mut self, names: &[Ident], scope: Scope) -> Result<()> {
        let frame = self.frame_mut()?;
        for name in names {
            frame.declared.retain(|(declared, _)| declared != name);
            frame.declared.push((name.clone(), scope));
        }
        if scope == Scope::Nonlocal {
            for name in names {
                self.nonlocal_scope(name)?;
            }
        }
        Ok(())
    }

    fn nonlocal_scope(&self, name: &str) -> Result<Object> {
        self.frame()?
            .enclosing
            .iter()
            .find(|scope| scope.has_attribute(name))
            .cloned()
            .ok_or_else(|| {
                self.process.error(
                    &self.builtins().exceptions.syntax_error,
                    format!("no binding for nonlocal '{}' found", name),
                )
            })
    }

    /// Scopes captured by a function defined in the current frame.
    pub(crate) fn closure(&self) -> Result<Vec<Object>> {
        let frame = self.frame()?;
        let mut scopes = Vec::with_capacity(frame.enclosing.len() + 1);
        if frame.kind == super::FrameKind::Function {
            scopes.push(frame.locals.clone());
        }
        scopes.extend(frame.enclosing.iter().cloned());
        Ok(scopes)
    }

    pub(crate) fn globals(&self) -> Result<Object> {
        Ok(self.frame()?.globals.clone())
    }

    fn name_error(&self, name: &str) -> EvalError {
        let exception = self.process.exception(
            &self.builtins().exceptions.name_error,
            vec![self
                .process
                .string(format!("name '{}' is not defined", name))],
        );
        exception
            .value()
            .set_attribute("name", self.process.string(name));
        exception.into()
    }
}
