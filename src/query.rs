//! The query AST (component A): a tree of field reads and link traversals,
//! mergeable per §4.A. Grounded on the teacher's
//! `query_plan::operation::{NormalizedSelectionSet, NormalizedSelection}` —
//! an `IndexMap`-keyed selection set with a recursive `merge_selections`,
//! generalized here from GraphQL selection sets to this crate's field/link
//! query nodes.

use crate::error::EngineError;
use crate::name::Name;
use crate::value::Value;
use indexmap::map::Entry;
use indexmap::IndexMap;

/// An effective or query-supplied option map, keyed by option name.
///
/// `IndexMap`'s `PartialEq` compares key/value pairs irrespective of
/// insertion order, which is exactly "identical options" per §4.A — two
/// option maps written in a different order in the query text still merge
/// cleanly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionMap(pub IndexMap<Name, Value>);

impl OptionMap {
    pub fn new() -> Self {
        OptionMap(IndexMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<Name>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Value)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Name,
    pub options: OptionMap,
}

impl Field {
    pub fn new(name: impl Into<Name>) -> Self {
        Field {
            name: name.into(),
            options: OptionMap::new(),
        }
    }

    pub fn with_options(name: impl Into<Name>, options: OptionMap) -> Self {
        Field {
            name: name.into(),
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: Name,
    pub options: OptionMap,
    pub node: Node,
}

#[derive(Debug, Clone, PartialEq, derive_more::From, derive_more::IsVariant)]
pub enum Child {
    Field(Field),
    Link(Link),
}

impl Child {
    pub fn name(&self) -> &Name {
        match self {
            Child::Field(f) => &f.name,
            Child::Link(l) => &l.name,
        }
    }
}

/// A selection set: an ordered, name-keyed set of field/link children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub children: IndexMap<Name, Child>,
}

impl Node {
    pub fn new() -> Self {
        Node {
            children: IndexMap::new(),
        }
    }

    pub fn from_children(children: impl IntoIterator<Item = Child>) -> Self {
        let mut node = Node::new();
        for child in children {
            node.children.insert(child.name().clone(), child);
        }
        node
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.children.values().filter_map(|c| match c {
            Child::Field(f) => Some(f),
            Child::Link(_) => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.children.values().filter_map(|c| match c {
            Child::Link(l) => Some(l),
            Child::Field(_) => None,
        })
    }
}

/// Merges a sequence of query nodes into one (§4.A). Associative and
/// commutative: fields with equal options merge into one; fields with
/// differing options fail with `ConflictingOptions`; links merge
/// recursively after the same options check.
pub fn merge(nodes: impl IntoIterator<Item = Node>) -> Result<Node, EngineError> {
    let mut acc = Node::new();
    for node in nodes {
        acc = merge_two(acc, node)?;
    }
    Ok(acc)
}

fn merge_two(mut acc: Node, other: Node) -> Result<Node, EngineError> {
    for (name, child) in other.children {
        match acc.children.entry(name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(child);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get().clone();
                *slot.get_mut() = merge_child(&name, existing, child)?;
            }
        }
    }
    Ok(acc)
}

fn merge_child(name: &Name, a: Child, b: Child) -> Result<Child, EngineError> {
    match (a, b) {
        (Child::Field(fa), Child::Field(fb)) => {
            if fa.options != fb.options {
                return Err(EngineError::ConflictingOptions { name: name.clone() });
            }
            Ok(Child::Field(fa))
        }
        (Child::Link(la), Child::Link(lb)) => {
            if la.options != lb.options {
                return Err(EngineError::ConflictingOptions { name: name.clone() });
            }
            let node = merge_two(la.node, lb.node)?;
            Ok(Child::Link(Link {
                name: la.name,
                options: la.options,
                node,
            }))
        }
        // A field and a link can't share a name on a valid schema node, so
        // seeing both under one name in a query is itself a conflict.
        _ => Err(EngineError::ConflictingOptions { name: name.clone() }),
    }
}
