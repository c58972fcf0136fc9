//! The `builtins` module and the builtin type hierarchy.
//!
//! Bootstrapping is done in two passes: every type object is created empty
//! first, so that `type`, `str` and `tuple` exist before anything needs a
//! name string or an MRO tuple; the second pass fills in names, bases,
//! MROs and native methods.

use crate::collector::GarbageCollector;
use crate::object::{
    BytesMethod, ExceptionMethod, NumberMethod, Object, ObjectMethod, StrMethod, SysCall,
    TupleMethod, Value,
};

/// Handles to the builtin types, singletons and the `builtins` module.
pub struct Builtins {
    /// The `builtins` module
    pub module: Object,

    /// `object`
    pub object: Object,
    /// `type`
    pub type_: Object,
    /// `int`
    pub int: Object,
    /// `float`
    pub float: Object,
    /// `bool`
    pub bool_: Object,
    /// `NoneType`
    pub none_type: Object,
    /// `str`
    pub str_: Object,
    /// `bytes`
    pub bytes: Object,
    /// `tuple`
    pub tuple: Object,
    /// Iterator over a tuple
    pub tuple_iterator: Object,
    /// Type of `def` and `lambda` functions
    pub function: Object,
    /// Type of bound methods
    pub method: Object,
    /// Type of native functions and methods
    pub builtin_function: Object,
    /// Type of modules
    pub module_type: Object,
    /// `slice`
    pub slice: Object,
    /// Type of `Ellipsis`
    pub ellipsis_type: Object,
    /// Type of `NotImplemented`
    pub not_implemented_type: Object,

    /// `None`
    pub none: Object,
    /// `True`
    pub true_: Object,
    /// `False`
    pub false_: Object,
    /// `Ellipsis`
    pub ellipsis: Object,
    /// `NotImplemented`
    pub not_implemented: Object,

    /// Builtin exception classes
    pub exceptions: Exceptions,

    types: Vec<Object>,
}

/// Builtin exception classes.
pub struct Exceptions {
    /// `BaseException`
    pub base_exception: Object,
    /// `Exception`
    pub exception: Object,
    /// `KeyboardInterrupt`
    pub keyboard_interrupt: Object,
    /// `SystemExit`
    pub system_exit: Object,
    /// `StopIteration`
    pub stop_iteration: Object,
    /// `ArithmeticError`
    pub arithmetic_error: Object,
    /// `ZeroDivisionError`
    pub zero_division_error: Object,
    /// `OverflowError`
    pub overflow_error: Object,
    /// `AttributeError`
    pub attribute_error: Object,
    /// `AssertionError`
    pub assertion_error: Object,
    /// `RuntimeError`
    pub runtime_error: Object,
    /// `RecursionError`
    pub recursion_error: Object,
    /// `NotImplementedError`
    pub not_implemented_error: Object,
    /// `NameError`
    pub name_error: Object,
    /// `TypeError`
    pub type_error: Object,
    /// `ValueError`
    pub value_error: Object,
    /// `LookupError`
    pub lookup_error: Object,
    /// `IndexError`
    pub index_error: Object,
    /// `KeyError`
    pub key_error: Object,
    /// `ImportError`
    pub import_error: Object,
    /// `ModuleNotFoundError`
    pub module_not_found_error: Object,
    /// `SyntaxError`
    pub syntax_error: Object,
}

struct Heap<'a> {
    collector: &'a GarbageCollector,
    type_: Object,
    str_: Object,
    tuple: Object,
    builtin_function: Object,
    types: Vec<Object>,
}

impl Heap<'_> {
    fn track(&self, object: Object) -> Object {
        self.collector.emplace(object.clone());
        object
    }

    fn string(&self, text: &str) -> Object {
        self.track(Object::new(
            Value::String(text.into()),
            [("__class__", self.str_.clone())],
        ))
    }

    fn tuple(&self, items: Vec<Object>) -> Object {
        self.track(Object::new(
            Value::Tuple(items),
            [("__class__", self.tuple.clone())],
        ))
    }

    /// Fill in a type created empty. Builtin types use single inheritance,
    /// so the MRO is the type followed by its base's MRO.
    fn class(&mut self, class: &Object, name: &str, base: Option<&Object>) {
        let mut mro = vec![class.clone()];
        let mut bases = Vec::new();
        if let Some(base) = base {
            bases.push(base.clone());
            if let Some(inherited) = base.attribute("__mro__") {
                mro.extend(inherited.as_tuple().unwrap_or_default().iter().cloned());
            }
        }
        class.set_attribute("__class__", self.type_.clone());
        class.set_attribute("__name__", self.string(name));
        class.set_attribute("__qualname__", self.string(name));
        class.set_attribute("__module__", self.string("builtins"));
        class.set_attribute("__bases__", self.tuple(bases));
        class.set_attribute("__mro__", self.tuple(mro));
        let tracked = self.track(class.clone());
        self.types.push(tracked);
    }

    fn new_class(&mut self, name: &str, base: &Object) -> Object {
        let class = Object::bare(Value::Instance);
        self.class(&class, name, Some(base));
        class
    }

    fn native(&self, name: &str, value: Value) -> Object {
        self.track(Object::new(
            value,
            [
                ("__class__", self.builtin_function.clone()),
                ("__name__", self.string(name)),
            ],
        ))
    }

    fn methods(&self, class: &Object, methods: &[(&str, Value)]) {
        for (name, value) in methods {
            class.set_attribute(*name, self.native(name, value.clone()));
        }
    }

    fn singleton(&self, value: Value, class: &Object) -> Object {
        self.track(Object::new(value, [("__class__", class.clone())]))
    }
}

fn number_methods() -> Vec<(&'static str, Value)> {
    use NumberMethod::*;
    [
        ("__new__", New),
        ("__add__", Add),
        ("__sub__", Sub),
        ("__mul__", Mul),
        ("__truediv__", TrueDiv),
        ("__floordiv__", FloorDiv),
        ("__mod__", Mod),
        ("__pow__", Pow),
        ("__lshift__", LShift),
        ("__rshift__", RShift),
        ("__and__", And),
        ("__or__", Or),
        ("__xor__", Xor),
        ("__neg__", Neg),
        ("__pos__", Pos),
        ("__invert__", Invert),
        ("__abs__", Abs),
        ("__bool__", Bool),
        ("__eq__", Eq),
        ("__ne__", Ne),
        ("__lt__", Lt),
        ("__le__", Le),
        ("__gt__", Gt),
        ("__ge__", Ge),
        ("__index__", Index),
    ]
    .into_iter()
    .map(|(name, method)| (name, Value::NumberMethod(method)))
    .collect()
}

impl Builtins {
    /// Create the builtin types and the `builtins` module, registering every
    /// Object with `collector`.
    pub(crate) fn bootstrap(collector: &GarbageCollector, optimize: bool) -> Builtins {
        let empty = || Object::bare(Value::Instance);
        let object = empty();
        let type_ = empty();
        let str_ = empty();
        let tuple = empty();
        let builtin_function = empty();

        let mut heap = Heap {
            collector,
            type_: type_.clone(),
            str_: str_.clone(),
            tuple: tuple.clone(),
            builtin_function: builtin_function.clone(),
            types: Vec::new(),
        };

        heap.class(&object, "object", None);
        heap.class(&type_, "type", Some(&object));
        heap.class(&str_, "str", Some(&object));
        heap.class(&tuple, "tuple", Some(&object));
        heap.class(&builtin_function, "builtin_function_or_method", Some(&object));

        let int = heap.new_class("int", &object);
        let float = heap.new_class("float", &object);
        let bool_ = heap.new_class("bool", &int);
        let none_type = heap.new_class("NoneType", &object);
        let bytes = heap.new_class("bytes", &object);
        let tuple_iterator = heap.new_class("tuple_iterator", &object);
        let function = heap.new_class("function", &object);
        let method = heap.new_class("method", &object);
        let module_type = heap.new_class("module", &object);
        let slice = heap.new_class("slice", &object);
        let ellipsis_type = heap.new_class("ellipsis", &object);
        let not_implemented_type = heap.new_class("NotImplementedType", &object);

        {
            use ObjectMethod::*;
            heap.methods(
                &object,
                &[
                    ("__getattribute__", Value::ObjectMethod(GetAttribute)),
                    ("__setattr__", Value::ObjectMethod(SetAttr)),
                    ("__delattr__", Value::ObjectMethod(DelAttr)),
                    ("__new__", Value::ObjectMethod(New)),
                    ("__init__", Value::ObjectMethod(Init)),
                    ("__eq__", Value::ObjectMethod(Eq)),
                    ("__ne__", Value::ObjectMethod(Ne)),
                    ("__repr__", Value::ObjectMethod(Repr)),
                    ("__str__", Value::ObjectMethod(Str)),
                    ("__dir__", Value::ObjectMethod(Dir)),
                ],
            );
            heap.methods(&type_, &[("__call__", Value::ObjectMethod(TypeCall))]);
        }

        let numeric = number_methods();
        heap.methods(&int, &numeric);
        heap.methods(&float, &numeric);
        heap.methods(&bool_, &[("__new__", Value::NumberMethod(NumberMethod::New))]);

        {
            use StrMethod::*;
            let methods: Vec<(&str, Value)> = [
                ("__new__", New),
                ("__add__", Add),
                ("__mul__", Mul),
                ("__rmul__", Mul),
                ("__eq__", Eq),
                ("__ne__", Ne),
                ("__lt__", Lt),
                ("__le__", Le),
                ("__gt__", Gt),
                ("__ge__", Ge),
                ("__bool__", Bool),
                ("__len__", Len),
                ("__contains__", Contains),
                ("__getitem__", GetItem),
            ]
            .into_iter()
            .map(|(name, method)| (name, Value::StrMethod(method)))
            .collect();
            heap.methods(&str_, &methods);
        }

        {
            use BytesMethod::*;
            let methods: Vec<(&str, Value)> = [
                ("__add__", Add),
                ("__eq__", Eq),
                ("__ne__", Ne),
                ("__bool__", Bool),
                ("__len__", Len),
            ]
            .into_iter()
            .map(|(name, method)| (name, Value::BytesMethod(method)))
            .collect();
            heap.methods(&bytes, &methods);
        }

        {
            use TupleMethod::*;
            let methods: Vec<(&str, Value)> = [
                ("__new__", New),
                ("__add__", Add),
                ("__eq__", Eq),
                ("__ne__", Ne),
                ("__bool__", Bool),
                ("__len__", Len),
                ("__contains__", Contains),
                ("__getitem__", GetItem),
                ("__iter__", Iter),
            ]
            .into_iter()
            .map(|(name, method)| (name, Value::TupleMethod(method)))
            .collect();
            heap.methods(&tuple, &methods);
            heap.methods(
                &tuple_iterator,
                &[
                    ("__iter__", Value::TupleMethod(IteratorIter)),
                    ("__next__", Value::TupleMethod(IteratorNext)),
                ],
            );
        }

        let base_exception = heap.new_class("BaseException", &object);
        heap.methods(
            &base_exception,
            &[
                ("__init__", Value::ExceptionMethod(ExceptionMethod::Init)),
                ("__repr__", Value::ExceptionMethod(ExceptionMethod::Repr)),
                ("__str__", Value::ExceptionMethod(ExceptionMethod::Str)),
            ],
        );
        let exception = heap.new_class("Exception", &base_exception);
        let arithmetic_error = heap.new_class("ArithmeticError", &exception);
        let runtime_error = heap.new_class("RuntimeError", &exception);
        let lookup_error = heap.new_class("LookupError", &exception);
        let import_error = heap.new_class("ImportError", &exception);
        let exceptions = Exceptions {
            keyboard_interrupt: heap.new_class("KeyboardInterrupt", &base_exception),
            system_exit: heap.new_class("SystemExit", &base_exception),
            stop_iteration: heap.new_class("StopIteration", &exception),
            zero_division_error: heap.new_class("ZeroDivisionError", &arithmetic_error),
            overflow_error: heap.new_class("OverflowError", &arithmetic_error),
            attribute_error: heap.new_class("AttributeError", &exception),
            assertion_error: heap.new_class("AssertionError", &exception),
            recursion_error: heap.new_class("RecursionError", &runtime_error),
            not_implemented_error: heap.new_class("NotImplementedError", &runtime_error),
            name_error: heap.new_class("NameError", &exception),
            type_error: heap.new_class("TypeError", &exception),
            value_error: heap.new_class("ValueError", &exception),
            index_error: heap.new_class("IndexError", &lookup_error),
            key_error: heap.new_class("KeyError", &lookup_error),
            module_not_found_error: heap.new_class("ModuleNotFoundError", &import_error),
            syntax_error: heap.new_class("SyntaxError", &exception),
            base_exception,
            exception,
            arithmetic_error,
            runtime_error,
            lookup_error,
            import_error,
        };

        let none = heap.singleton(Value::None, &none_type);
        let true_ = heap.singleton(Value::True, &bool_);
        let false_ = heap.singleton(Value::False, &bool_);
        let ellipsis = heap.singleton(Value::Instance, &ellipsis_type);
        let not_implemented = heap.singleton(Value::Instance, &not_implemented_type);

        let module = heap.track(Object::new(
            Value::Instance,
            [
                ("__class__", module_type.clone()),
                ("__name__", heap.string("builtins")),
            ],
        ));
        for (name, class) in [
            ("object", &object),
            ("type", &type_),
            ("int", &int),
            ("float", &float),
            ("bool", &bool_),
            ("str", &str_),
            ("bytes", &bytes),
            ("tuple", &tuple),
            ("slice", &slice),
        ] {
            module.set_attribute(name, class.clone());
        }
        for class in &heap.types {
            if crate::protocol::is_subclass(class, &exceptions.base_exception) {
                if let Some(name) = class.name() {
                    module.set_attribute(name, class.clone());
                }
            }
        }
        for call in SysCall::ALL {
            module.set_attribute(call.name(), heap.native(call.name(), Value::SysCall(call)));
        }
        module.set_attribute("None", none.clone());
        module.set_attribute("True", true_.clone());
        module.set_attribute("False", false_.clone());
        module.set_attribute("Ellipsis", ellipsis.clone());
        module.set_attribute("NotImplemented", not_implemented.clone());
        module.set_attribute(
            "__debug__",
            if optimize { false_.clone() } else { true_.clone() },
        );

        Builtins {
            module,
            object,
            type_,
            int,
            float,
            bool_,
            none_type,
            str_,
            bytes,
            tuple,
            tuple_iterator,
            function,
            method,
            builtin_function,
            module_type,
            slice,
            ellipsis_type,
            not_implemented_type,
            none,
            true_,
            false_,
            ellipsis,
            not_implemented,
            exceptions,
            types: heap.types,
        }
    }

    /// A builtin type or exception class by name.
    pub fn type_named(&self, name: &str) -> Option<Object> {
        self.types
            .iter()
            .find(|class| class.name().as_deref() == Some(name))
            .cloned()
    }

    /// `True` or `False`.
    pub fn boolean(&self, value: bool) -> Object {
        if value {
            self.true_.clone()
        } else {
            self.false_.clone()
        }
    }

    /// Break the reference cycles among the builtin Objects: every type's
    /// `__class__` leads back to `type`.
    pub(crate) fn teardown(&self) {
        drop(self.module.clear_attributes());
        for class in &self.types {
            drop(class.clear_attributes());
        }
        for singleton in [&self.none, &self.true_, &self.false_, &self.ellipsis, &self.not_implemented] {
            drop(singleton.clear_attributes());
        }
    }
}
