//! The query/result printer (component H's writer half, §6): turns a
//! query `Node` back into EDN-like text, and a `Value` (including a
//! `Reference`) into its textual form.
//!
//! Grounded on `examples/original_source/hiku/edn.py`'s `__repr__` methods
//! per collection kind, and on
//! `examples/original_source/tests/test_write_simple.py` for the result
//! serialization shape — a reference prints as `#graph/ref [node ident]`,
//! and the full normalized index is emitted as one map with the root's own
//! fields flattened into its top level alongside every other node's table.

use crate::query::{Child, Node, OptionMap};
use crate::result::{Index, ROOT_NODE};
use crate::value::{Reference, Value};
use itertools::Itertools;

/// Prints a single `Value`, recursively. Strings are quoted and escaped;
/// collections use the same bracket conventions the reader accepts, so
/// `read(print_value(v))` round-trips for every construct the reader
/// recognizes (§8 round-trip law).
pub fn print_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => print_float(*f),
        Value::Str(s) => quote_string(s),
        Value::Keyword(name) => format!(":{name}"),
        Value::Symbol(name) => name.to_string(),
        Value::Vector(items) => format!("[{}]", items.iter().map(print_value).join(" ")),
        Value::List(items) => format!("({})", items.iter().map(print_value).join(" ")),
        Value::Set(items) => format!("#{{{}}}", items.iter().map(print_value).join(" ")),
        Value::Map(entries) => format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{} {}", print_value(k), print_value(v)))
                .join(" ")
        ),
        Value::Tagged(tag, inner) => format!("#{tag} {}", print_value(inner)),
        Value::Instant(dt) => format!("#inst {}", quote_string(&print_instant(*dt))),
        Value::Uuid(uuid) => format!("#uuid {}", quote_string(&uuid.to_string())),
        Value::Ref(r) => print_reference(r),
    }
}

fn print_reference(r: &Reference) -> String {
    format!("#graph/ref [{} {}]", quote_string(r.node.as_str()), print_value(&r.ident))
}

fn print_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn print_instant(dt: time::OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.millisecond(),
    )
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Prints a query node back into its `[...]` selection-set text (§6),
/// the inverse of `reader::read`.
pub fn print_query(node: &Node) -> String {
    format!("[{}]", node.children.values().map(print_child).join(" "))
}

fn print_child(child: &Child) -> String {
    match child {
        Child::Field(f) if f.options.0.is_empty() => format!(":{}", f.name),
        Child::Field(f) => format!("(:{} {})", f.name, print_option_map(&f.options)),
        Child::Link(l) if l.options.0.is_empty() => {
            format!("{{:{} {}}}", l.name, print_query(&l.node))
        }
        Child::Link(l) => format!(
            "{{(:{} {}) {}}}",
            l.name,
            print_option_map(&l.options),
            print_query(&l.node)
        ),
    }
}

fn print_option_map(options: &OptionMap) -> String {
    format!(
        "{{{}}}",
        options
            .iter()
            .map(|(k, v)| format!(":{k} {}", print_value(v)))
            .join(" ")
    )
}

/// Serializes a finalized `Index` into a single `Value::Map` (§6 Result
/// serialization): the root pseudo-object's own fields are flattened into
/// the top level, alongside every other node's `ident -> field -> value`
/// table keyed by node name.
pub fn serialize_index(index: &Index) -> Value {
    let mut top = Vec::new();
    if let Some(idents) = index.objects().get(ROOT_NODE) {
        if let Some(root_object) = idents.get(&Value::str(crate::result::ROOT_IDENT)) {
            for (field, value) in root_object {
                top.push((Value::str(field.as_str()), value.clone()));
            }
        }
    }
    for (node, idents) in index.objects() {
        if node.as_str() == ROOT_NODE {
            continue;
        }
        let table: Vec<(Value, Value)> = idents
            .iter()
            .map(|(ident, fields)| {
                let object = Value::Map(
                    fields
                        .iter()
                        .map(|(name, value)| (Value::str(name.as_str()), value.clone()))
                        .collect(),
                );
                (ident.clone(), object)
            })
            .collect();
        top.push((Value::str(node.as_str()), Value::Map(table)));
    }
    Value::Map(top)
}
