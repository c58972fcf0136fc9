//! Text renderings of builtin values.

use super::*;

/// `repr()` of builtin payloads; instances render by type.
pub fn repr(object: &Object) -> String {
    match object.value() {
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_str(s),
        Value::Bytes(b) => quote_bytes(b),
        Value::True => "True".to_string(),
        Value::False => "False".to_string(),
        Value::None => "None".to_string(),
        Value::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(repr).collect();
            if parts.len() == 1 {
                format!("({},)", parts[0])
            } else {
                format!("({})", parts.join(", "))
            }
        }
        Value::Code(code) => format!("<function {} at {}>", code.name(), object.id()),
        Value::SysCall(call) => format!("<built-in function {}>", call.name()),
        Value::Instance => repr_instance(object),
        _ => match object.name() {
            Some(name) => format!("<built-in method {}>", name),
            None => format!("<built-in method at {}>", object.id()),
        },
    }
}

/// `str()` of builtin payloads.
pub fn to_str(object: &Object) -> String {
    match object.value() {
        Value::String(s) => s.to_string(),
        Value::Instance if is_exception(object) => match exception_args(object).as_deref() {
            Some([]) | None => String::new(),
            Some([single]) => to_str(single),
            Some(_) => exception_args_repr(object),
        },
        _ => repr(object),
    }
}

fn repr_instance(object: &Object) -> String {
    let type_name = object.type_name();
    if object.has_attribute("__mro__") {
        return format!("<class '{}'>", object.name().unwrap_or(type_name));
    }
    if type_name == "module" {
        return format!("<module '{}'>", object.name().unwrap_or_default());
    }
    if is_exception(object) {
        return format!("{}{}", type_name, exception_args_repr(object));
    }
    format!("<{} object at {}>", type_name, object.id())
}

fn is_exception(object: &Object) -> bool {
    object.has_attribute("args") && object.class().is_some()
}

fn exception_args(object: &Object) -> Option<Vec<Object>> {
    object
        .attribute("args")
        .and_then(|args| args.as_tuple().map(<[Object]>::to_vec))
}

fn exception_args_repr(object: &Object) -> String {
    let args = exception_args(object).unwrap_or_default();
    let parts: Vec<String> = args.iter().map(repr).collect();
    format!("({})", parts.join(", "))
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn quote_bytes(b: &[u8]) -> String {
    let mut out = String::from("b'");
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push('\'');
    out
}
