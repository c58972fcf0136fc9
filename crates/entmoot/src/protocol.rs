//! Attribute resolution protocol.
//!
//! Resolution is a pure function of an Object, the MRO reachable through its
//! `__class__`, and the requested name. The order is fixed:
//!
//! 1. a user-level `__getattribute__` found on the object or its MRO takes
//!    over the whole lookup;
//! 2. the object's own attributes (for a type, its own `__mro__` in order);
//! 3. `__class__.__mro__`, left to right, binding functions to the receiver;
//! 4. a `__getattr__` hook, called with the name;
//! 5. otherwise an [`AttributeError`].
//!
//! Steps 1 and 4 need evaluation, so [`lookup`] reports them to the caller
//! instead of running them. [`resolve`] is the hook-free subset.

use thiserror::Error;

use crate::object::{AttributeError, Object, ObjectMethod, Value};

/// An attribute as found, before any call.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Use as-is
    Plain(Object),
    /// A function found on the receiver's type; calls pass `receiver` first
    Bound {
        /// The function found in the MRO
        function: Object,
        /// The Object the lookup started from
        receiver: Object,
    },
}

impl Attribute {
    /// The underlying Object, ignoring any binding.
    pub fn function(&self) -> &Object {
        match self {
            Attribute::Plain(object) => object,
            Attribute::Bound { function, .. } => function,
        }
    }
}

/// Outcome of [`lookup`].
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The attribute
    Found(Attribute),
    /// A user `__getattribute__`; call it with the name
    Hook(Attribute),
    /// A `__getattr__`; call it with the name
    Fallback(Attribute),
    /// Nothing matched
    Missing(AttributeError),
}

/// Failure computing a class linearization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MroError {
    /// The bases admit no consistent order
    #[error("Cannot create a consistent method resolution order (MRO) for bases {bases}")]
    Inconsistent {
        /// Base names, comma separated
        bases: String,
    },

    /// A base is not a type
    #[error("bases must be types, got '{name}'")]
    NotAType {
        /// Offending base's type name
        name: String,
    },
}

/// Full lookup, reporting hooks that require a call.
pub fn lookup(object: &Object, name: &str) -> Lookup {
    if let Some(hook) = find(object, "__getattribute__") {
        if !is_default_getattribute(hook.function()) {
            return Lookup::Hook(hook);
        }
    }
    if let Some(found) = find(object, name) {
        return Lookup::Found(found);
    }
    if let Some(hook) = find(object, "__getattr__") {
        return Lookup::Fallback(hook);
    }
    Lookup::Missing(missing(object, name))
}

/// Own attributes, then the MRO. Never invokes hooks and never binds.
pub fn resolve(object: &Object, name: &str) -> Result<Object, AttributeError> {
    find(object, name)
        .map(|attribute| attribute.function().clone())
        .ok_or_else(|| missing(object, name))
}

/// Step 2 and 3 of the protocol.
pub fn find(object: &Object, name: &str) -> Option<Attribute> {
    if let Some(own) = object.attribute(name) {
        return Some(Attribute::Plain(own));
    }
    if let Some(inherited) = search_mro(object, name, true) {
        return Some(Attribute::Plain(inherited));
    }
    let class = object.class()?;
    let found = search_mro(&class, name, false)?;
    Some(bind(found, object))
}

/// Lookup of an implicitly invoked method: only `__class__.__mro__` is
/// searched, so an instance attribute or a type's own methods never shadow
/// the behaviour of its type.
pub fn find_special(object: &Object, name: &str) -> Option<Attribute> {
    let class = object.class()?;
    let found = search_mro(&class, name, false)?;
    Some(bind(found, object))
}

/// First type in `class.__mro__` holding `name`.
fn search_mro(class: &Object, name: &str, skip_self: bool) -> Option<Object> {
    let mro = class.attribute("__mro__")?;
    mro.as_tuple()?
        .iter()
        .filter(|ty| !(skip_self && ty.is(class)))
        .find_map(|ty| ty.attribute(name))
}

fn bind(found: Object, receiver: &Object) -> Attribute {
    let binds = match found.value() {
        Value::Code(_) => true,
        Value::SysCall(_) => false,
        value => value.is_native(),
    };
    if binds {
        Attribute::Bound {
            function: found,
            receiver: receiver.clone(),
        }
    } else {
        Attribute::Plain(found)
    }
}

fn missing(object: &Object, name: &str) -> AttributeError {
    AttributeError {
        name: name.to_string(),
        type_name: object.type_name(),
    }
}

/// Whether `hook` is the native default `__getattribute__`.
pub fn is_default_getattribute(hook: &Object) -> bool {
    matches!(hook.value(), Value::ObjectMethod(ObjectMethod::GetAttribute))
}

/// `class.__mro__` as a list; empty when absent.
pub fn mro(class: &Object) -> Vec<Object> {
    class
        .attribute("__mro__")
        .and_then(|mro| mro.as_tuple().map(<[Object]>::to_vec))
        .unwrap_or_default()
}

/// Whether `class` appears in `candidate.__mro__`.
pub fn is_subclass(candidate: &Object, class: &Object) -> bool {
    if candidate.is(class) {
        return true;
    }
    candidate
        .attribute("__mro__")
        .and_then(|mro| mro.as_tuple().map(|types| types.iter().any(|ty| ty.is(class))))
        .unwrap_or(false)
}

/// Whether `object.__class__` is `class` or derives from it.
pub fn is_instance(object: &Object, class: &Object) -> bool {
    object
        .class()
        .map(|own| is_subclass(&own, class))
        .unwrap_or(false)
}

/// C3 linearization of `class` over `bases`; the result starts with `class`.
pub fn linearize(class: &Object, bases: &[Object]) -> Result<Vec<Object>, MroError> {
    let mut sequences = Vec::with_capacity(bases.len() + 1);
    for base in bases {
        if !base.has_attribute("__mro__") {
            return Err(MroError::NotAType {
                name: base.type_name(),
            });
        }
        sequences.push(mro(base));
    }
    sequences.push(bases.to_vec());

    let mut result = vec![class.clone()];
    loop {
        sequences.retain(|sequence| !sequence.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        let head = sequences
            .iter()
            .map(|sequence| &sequence[0])
            .find(|candidate| {
                !sequences
                    .iter()
                    .any(|sequence| sequence[1..].iter().any(|ty| ty.is(candidate)))
            })
            .cloned()
            .ok_or_else(|| MroError::Inconsistent {
                bases: bases
                    .iter()
                    .map(|base| base.name().unwrap_or_else(|| base.type_name()))
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        for sequence in sequences.iter_mut() {
            if sequence[0].is(&head) {
                sequence.remove(0);
            }
        }
        result.push(head);
    }
}
