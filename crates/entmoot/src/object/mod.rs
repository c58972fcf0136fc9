//! Runtime object cells.
//!
//! Every language-level entity is an [`Object`]: a shared cell holding an
//! immutable [`Value`] and a mutable attribute map. Identity is the address
//! of the cell. The attribute map is guarded by a per-object reader/writer
//! lock, so any number of threads may read an Object while writes are
//! serialized. Nothing is atomic across Objects.
//!
//! Cycles between Objects are expected (a type's `__class__` may be the type
//! itself). Reference counting alone never frees them; see
//! [`collector`](crate::collector) for how they are reclaimed.

mod display;
pub mod method;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::ast;
use crate::number::Number;

pub use display::{repr, to_str};
pub use method::{
    BytesMethod, ExceptionMethod, NumberMethod, ObjectMethod, StrMethod, SysCall, TupleMethod,
};

/// Attribute storage of one Object.
pub type Attributes = IndexMap<String, Object>;

/// An attribute was not found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{type_name}' object has no attribute '{name}'")]
pub struct AttributeError {
    /// Requested attribute name
    pub name: String,
    /// Type name of the object searched
    pub type_name: String,
}

/// The immutable payload of an Object.
#[derive(Debug, Clone)]
pub enum Value {
    /// Plain instance; all state lives in attributes
    Instance,
    /// Number
    Number(Number),
    /// Text
    String(Arc<str>),
    /// Byte string
    Bytes(Arc<[u8]>),
    /// The `True` singleton
    True,
    /// The `False` singleton
    False,
    /// The `None` singleton
    None,
    /// Immutable sequence of Objects
    Tuple(Vec<Object>),
    /// Native behaviour shared by all objects and types
    ObjectMethod(ObjectMethod),
    /// Native behaviour of numbers
    NumberMethod(NumberMethod),
    /// Native behaviour of strings
    StrMethod(StrMethod),
    /// Native behaviour of byte strings
    BytesMethod(BytesMethod),
    /// Native behaviour of tuples
    TupleMethod(TupleMethod),
    /// Native behaviour of exceptions
    ExceptionMethod(ExceptionMethod),
    /// Builtin function
    SysCall(SysCall),
    /// Unevaluated function body
    Code(Code),
}

/// An embedded, unevaluated function body.
#[derive(Debug, Clone)]
pub enum Code {
    /// `def` body
    Function(Arc<ast::FunctionDef>),
    /// `lambda` body
    Lambda(Arc<ast::Lambda>),
}

impl Code {
    /// Parameter list.
    pub fn arguments(&self) -> &ast::Arguments {
        match self {
            Code::Function(def) => &def.args,
            Code::Lambda(lambda) => &lambda.args,
        }
    }

    /// Function name, `<lambda>` for lambdas.
    pub fn name(&self) -> &str {
        match self {
            Code::Function(def) => &def.name,
            Code::Lambda(_) => "<lambda>",
        }
    }
}

impl Value {
    /// Whether the payload is a native callable tag.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            Value::ObjectMethod(_)
                | Value::NumberMethod(_)
                | Value::StrMethod(_)
                | Value::BytesMethod(_)
                | Value::TupleMethod(_)
                | Value::ExceptionMethod(_)
                | Value::SysCall(_)
        )
    }

    /// Whether the payload is callable without attribute lookup.
    pub fn is_function(&self) -> bool {
        self.is_native() || matches!(self, Value::Code(_))
    }

    /// Short description of the payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Instance => "object",
            Value::Number(n) => n.type_name(),
            Value::String(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::True | Value::False => "bool",
            Value::None => "NoneType",
            Value::Tuple(_) => "tuple",
            Value::Code(_) => "function",
            _ => "builtin_function",
        }
    }
}

/// Address-derived identity of an Object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(usize);

impl Id {
    /// The raw address.
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A shared, mutably-attributed value cell.
#[derive(Clone)]
pub struct Object(Arc<Cell>);

struct Cell {
    value: Value,
    attributes: RwLock<Attributes>,
}

impl Object {
    /// Create an Object with the given payload and attributes.
    pub fn new<I, K>(value: Value, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Object)>,
        K: Into<String>,
    {
        Object(Arc::new(Cell {
            value,
            attributes: RwLock::new(
                attributes
                    .into_iter()
                    .map(|(name, object)| (name.into(), object))
                    .collect(),
            ),
        }))
    }

    /// Create an Object with no attributes.
    pub fn bare(value: Value) -> Self {
        Object::new(value, std::iter::empty::<(String, Object)>())
    }

    /// Identity.
    pub fn id(&self) -> Id {
        Id(Arc::as_ptr(&self.0) as *const () as usize)
    }

    /// Whether both handles name the same cell.
    pub fn is(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Read-only view of the payload.
    pub fn value(&self) -> &Value {
        &self.0.value
    }

    /// Resolve `name` through the full attribute protocol.
    ///
    /// Hooks that would require evaluation (a user `__getattribute__` or
    /// `__getattr__`) are not invoked here; see [`protocol::lookup`].
    ///
    /// [`protocol::lookup`]: crate::protocol::lookup
    pub fn get_attribute(&self, name: &str) -> Result<Object, AttributeError> {
        crate::protocol::resolve(self, name)
    }

    /// The Object's own attribute, without protocol search.
    pub fn attribute(&self, name: &str) -> Option<Object> {
        self.0.attributes.read().get(name).cloned()
    }

    /// Insert or replace an attribute.
    ///
    /// Host code writing to Objects that a running process tracks should
    /// hold [`GarbageCollector::pin`](crate::collector::GarbageCollector::pin).
    pub fn set_attribute(&self, name: impl Into<String>, value: Object) {
        let previous = self.0.attributes.write().insert(name.into(), value);
        drop(previous);
    }

    /// Remove an attribute. Absent names are ignored.
    pub fn delete_attribute(&self, name: &str) -> Option<Object> {
        self.0.attributes.write().shift_remove(name)
    }

    /// Whether the Object itself holds `name`.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.attributes.read().contains_key(name)
    }

    /// Own attribute names in insertion order.
    pub fn dir(&self) -> Vec<String> {
        self.0.attributes.read().keys().cloned().collect()
    }

    /// Snapshot of the own attributes.
    pub fn attributes(&self) -> Vec<(String, Object)> {
        self.0
            .attributes
            .read()
            .iter()
            .map(|(name, object)| (name.clone(), object.clone()))
            .collect()
    }

    /// A fresh Object with `value` and an independent copy of the attributes.
    pub fn copy(&self, value: Value) -> Object {
        let attributes = self.0.attributes.read().clone();
        Object(Arc::new(Cell {
            value,
            attributes: RwLock::new(attributes),
        }))
    }

    /// Whether the payload is the `True` singleton.
    pub fn get_bool(&self) -> bool {
        matches!(self.value(), Value::True)
    }

    /// Number of live handles to this cell.
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// `__class__`, if set.
    pub fn class(&self) -> Option<Object> {
        self.attribute("__class__")
    }

    /// Text payload.
    pub fn as_str(&self) -> Option<&str> {
        match self.value() {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric payload.
    pub fn as_number(&self) -> Option<&Number> {
        match self.value() {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Tuple payload.
    pub fn as_tuple(&self) -> Option<&[Object]> {
        match self.value() {
            Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// `__name__` of the Object, when it is a string.
    pub fn name(&self) -> Option<String> {
        self.attribute("__name__")
            .and_then(|name| name.as_str().map(str::to_string))
    }

    /// Name of the Object's type.
    pub fn type_name(&self) -> String {
        self.class()
            .and_then(|class| class.name())
            .unwrap_or_else(|| self.value().kind().to_string())
    }

    /// Visit every Object this one holds directly.
    pub(crate) fn for_each_reference(&self, mut visit: impl FnMut(&Object)) {
        if let Value::Tuple(items) = self.value() {
            items.iter().for_each(&mut visit);
        }
        self.0.attributes.read().values().for_each(visit);
    }

    /// Empty the attribute map, handing the old contents to the caller so
    /// they are dropped outside the lock.
    pub(crate) fn clear_attributes(&self) -> Attributes {
        std::mem::take(&mut *self.0.attributes.write())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({} @ {})", repr(self), self.id())
    }
}

impl Drop for Cell {
    // Unwind chains of uniquely held Objects with a worklist so that
    // dropping a long linked structure does not recurse per link.
    fn drop(&mut self) {
        let mut orphans = Vec::new();
        release_into(&mut self.value, self.attributes.get_mut(), &mut orphans);
        while let Some(mut object) = orphans.pop() {
            if let Some(cell) = Arc::get_mut(&mut object.0) {
                release_into(&mut cell.value, cell.attributes.get_mut(), &mut orphans);
            }
        }
    }
}

fn release_into(value: &mut Value, attributes: &mut Attributes, orphans: &mut Vec<Object>) {
    orphans.extend(attributes.drain(..).map(|(_, object)| object));
    if let Value::Tuple(items) = value {
        orphans.append(items);
    }
}
