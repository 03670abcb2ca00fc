//! The external query reader (component H, upper half): converts the
//! generic EDN [`Value`] tree parsed by [`edn`] into the query AST
//! (component A). Grounded on the shape the original source's
//! `hiku.readers.simple` module builds (confirmed indirectly via
//! `examples/original_source/tests/test_read_simple.py`, which pins the
//! EDN tree a selection set like `[:foo {:bar [:baz]} (limit 10)]` parses
//! into) — this module is the missing second half that turns that tree
//! into `query::Node` rather than leaving it as bare EDN.

mod edn;

use crate::error::ParseError;
use crate::name::Name;
use crate::query::{Child, Field, Link, Node, OptionMap};
use crate::value::Value;

/// Parses query text into a single query `Node` (§6). The text must
/// contain exactly one top-level form, and that form must be a selection
/// vector `[...]`.
pub fn read(text: &str) -> Result<Node, ParseError> {
    let mut forms = edn::parse_all(text)?;
    if forms.len() != 1 {
        return Err(ParseError::NotSingleForm(forms.len()));
    }
    match forms.remove(0) {
        Value::Vector(items) => convert_selection(&items),
        other => Err(ParseError::ExpectedSelectionSet(type_name(&other))),
    }
}

fn convert_selection(items: &[Value]) -> Result<Node, ParseError> {
    let mut node = Node::new();
    for item in items {
        let child = convert_element(item)?;
        node.children.insert(child.name().clone(), child);
    }
    Ok(node)
}

fn convert_element(value: &Value) -> Result<Child, ParseError> {
    match value {
        Value::Keyword(name) => Ok(Child::Field(Field::new(name.clone()))),
        Value::List(items) => {
            let (name, options) = convert_invocation(items)?;
            Ok(Child::Field(Field::with_options(name, options)))
        }
        Value::Map(entries) => {
            if entries.len() != 1 {
                return Err(ParseError::MalformedNestedLink);
            }
            let (key, selection) = &entries[0];
            let (name, options) = match key {
                Value::Keyword(name) => (name.clone(), OptionMap::new()),
                Value::List(items) => convert_invocation(items)?,
                other => return Err(ParseError::ExpectedName(type_name(other))),
            };
            let node = match selection {
                Value::Vector(items) => convert_selection(items)?,
                other => return Err(ParseError::ExpectedSelectionSet(type_name(other))),
            };
            Ok(Child::Link(Link { name, options, node }))
        }
        other => Err(ParseError::ExpectedName(type_name(other))),
    }
}

/// `(:name {:opt val ...})` — a field or link name with an explicit option
/// map, no nested selection (§6).
fn convert_invocation(items: &[Value]) -> Result<(Name, OptionMap), ParseError> {
    let [name, options] = items else {
        return Err(ParseError::MalformedInvocation);
    };
    let name = match name {
        Value::Keyword(name) | Value::Symbol(name) => name.clone(),
        other => return Err(ParseError::ExpectedName(type_name(other))),
    };
    let entries = match options {
        Value::Map(entries) => entries,
        _ => return Err(ParseError::MalformedInvocation),
    };
    let mut map = OptionMap::new();
    for (key, value) in entries {
        match key {
            Value::Keyword(name) => map.insert(name.clone(), value.clone()),
            other => return Err(ParseError::ExpectedOptionKeyword(type_name(other))),
        }
    }
    Ok((name, map))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Bool(_) => "a boolean",
        Value::Int(_) => "an integer",
        Value::Float(_) => "a float",
        Value::Str(_) => "a string",
        Value::Keyword(_) => "a keyword",
        Value::Symbol(_) => "a symbol",
        Value::Vector(_) => "a vector",
        Value::List(_) => "a list",
        Value::Set(_) => "a set",
        Value::Map(_) => "a map",
        Value::Tagged(_, _) => "a tagged literal",
        Value::Instant(_) => "an instant",
        Value::Uuid(_) => "a uuid",
        Value::Ref(_) => "a reference",
    }
}
