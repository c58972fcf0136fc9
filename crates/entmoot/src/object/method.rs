//! Native method tags.
//!
//! Builtin behaviour is carried by small enumerated tags stored directly in
//! an Object's [`Value`](super::Value). The evaluator interprets a tag when
//! the Object is called; the tag itself holds no state.

/// Natives shared by every object and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectMethod {
    /// `object.__getattribute__`, the default resolution protocol
    GetAttribute,
    /// `object.__setattr__`
    SetAttr,
    /// `object.__delattr__`
    DelAttr,
    /// `object.__new__`
    New,
    /// `object.__init__`
    Init,
    /// `object.__eq__`, identity equality
    Eq,
    /// `object.__ne__`
    Ne,
    /// `object.__repr__`
    Repr,
    /// `object.__str__`
    Str,
    /// `object.__dir__`
    Dir,
    /// `type.__call__`
    TypeCall,
}

/// Natives of `int`, `float` and `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberMethod {
    /// `int.__new__` / `float.__new__`
    New,
    /// `__add__`
    Add,
    /// `__sub__`
    Sub,
    /// `__mul__`
    Mul,
    /// `__truediv__`
    TrueDiv,
    /// `__floordiv__`
    FloorDiv,
    /// `__mod__`
    Mod,
    /// `__pow__`
    Pow,
    /// `__lshift__`
    LShift,
    /// `__rshift__`
    RShift,
    /// `__and__`
    And,
    /// `__or__`
    Or,
    /// `__xor__`
    Xor,
    /// `__neg__`
    Neg,
    /// `__pos__`
    Pos,
    /// `__invert__`
    Invert,
    /// `__abs__`
    Abs,
    /// `__bool__`
    Bool,
    /// `__eq__`
    Eq,
    /// `__ne__`
    Ne,
    /// `__lt__`
    Lt,
    /// `__le__`
    Le,
    /// `__gt__`
    Gt,
    /// `__ge__`
    Ge,
    /// `__index__`
    Index,
}

/// Natives of `str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrMethod {
    /// `str.__new__`
    New,
    /// `__add__`
    Add,
    /// `__mul__`
    Mul,
    /// `__eq__`
    Eq,
    /// `__ne__`
    Ne,
    /// `__lt__`
    Lt,
    /// `__le__`
    Le,
    /// `__gt__`
    Gt,
    /// `__ge__`
    Ge,
    /// `__bool__`
    Bool,
    /// `__len__`
    Len,
    /// `__contains__`
    Contains,
    /// `__getitem__`
    GetItem,
}

/// Natives of `bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BytesMethod {
    /// `__add__`
    Add,
    /// `__eq__`
    Eq,
    /// `__ne__`
    Ne,
    /// `__bool__`
    Bool,
    /// `__len__`
    Len,
}

/// Natives of `tuple` and its iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TupleMethod {
    /// `tuple.__new__`
    New,
    /// `__add__`
    Add,
    /// `__eq__`
    Eq,
    /// `__ne__`
    Ne,
    /// `__bool__`
    Bool,
    /// `__len__`
    Len,
    /// `__contains__`
    Contains,
    /// `__getitem__`
    GetItem,
    /// `tuple.__iter__`
    Iter,
    /// `tuple_iterator.__iter__`
    IteratorIter,
    /// `tuple_iterator.__next__`
    IteratorNext,
}

/// Natives of `BaseException`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionMethod {
    /// `BaseException.__init__`, stores `args`
    Init,
    /// `BaseException.__repr__`
    Repr,
    /// `BaseException.__str__`
    Str,
}

/// Builtin functions of the `builtins` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SysCall {
    /// `print(*args)`
    Print,
    /// `id(obj)`
    Id,
    /// `len(obj)`
    Len,
    /// `iter(obj)`
    Iter,
    /// `next(iterator)`
    Next,
    /// `repr(obj)`
    Repr,
    /// `isinstance(obj, types)`
    IsInstance,
    /// `issubclass(cls, types)`
    IsSubclass,
    /// `getattr(obj, name[, default])`
    GetAttr,
    /// `setattr(obj, name, value)`
    SetAttr,
    /// `hasattr(obj, name)`
    HasAttr,
    /// `delattr(obj, name)`
    DelAttr,
    /// `dir(obj)`
    Dir,
    /// `abs(x)`
    Abs,
}

impl SysCall {
    /// Name the function is bound to in `builtins`.
    pub fn name(self) -> &'static str {
        match self {
            SysCall::Print => "print",
            SysCall::Id => "id",
            SysCall::Len => "len",
            SysCall::Iter => "iter",
            SysCall::Next => "next",
            SysCall::Repr => "repr",
            SysCall::IsInstance => "isinstance",
            SysCall::IsSubclass => "issubclass",
            SysCall::GetAttr => "getattr",
            SysCall::SetAttr => "setattr",
            SysCall::HasAttr => "hasattr",
            SysCall::DelAttr => "delattr",
            SysCall::Dir => "dir",
            SysCall::Abs => "abs",
        }
    }

    /// Every builtin function.
    pub const ALL: [SysCall; 14] = [
        SysCall::Print,
        SysCall::Id,
        SysCall::Len,
        SysCall::Iter,
        SysCall::Next,
        SysCall::Repr,
        SysCall::IsInstance,
        SysCall::IsSubclass,
        SysCall::GetAttr,
        SysCall::SetAttr,
        SysCall::HasAttr,
        SysCall::DelAttr,
        SysCall::Dir,
        SysCall::Abs,
    ];
}
