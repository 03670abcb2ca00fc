//! The normalized result store (component D, §4.C/§4.D): a two-level
//! `node -> ident -> field -> value` map, a `Reference` into it, and a
//! `Proxy` ergonomic view keyed by the query that produced the result.
//!
//! Grounded on the teacher's `schema::position` pattern — typed read-only
//! accessor structs layered over an owned store — but here the store itself
//! has two explicit lifecycle phases (writable while the engine executes,
//! read-only and raise-on-miss after `finalize`) rather than the source's
//! auto-vivifying `defaultdict`. `IndexMap` is used at both levels for the
//! same reason the teacher uses it throughout `query_plan`: deterministic
//! iteration order, here relevant to serializing a finalized index (§8).

use crate::error::EngineError;
use crate::name::Name;
use crate::query::{Child, Node as QueryNode};
use crate::value::{Reference as ValueReference, Value};
use indexmap::IndexMap;

pub const ROOT_NODE: &str = "__root__";
pub const ROOT_IDENT: &str = "__root__";

/// A deferred lookup into a particular `Index`. Cheap to copy; borrows the
/// index only for the duration of a `lookup` call, never owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub node: Name,
    pub ident: Value,
}

impl Reference {
    fn root() -> Self {
        Reference {
            node: Name::new(ROOT_NODE),
            ident: Value::str(ROOT_IDENT),
        }
    }
}

/// The normalized two-level store (§3 Index). A fresh `Index` is created
/// per `execute` call, written to during execution via `insert`, then
/// `finalize`d — after which every `lookup` miss is an error rather than an
/// auto-vivified empty slot.
#[derive(Debug, Default)]
pub struct Index {
    objects: IndexMap<Name, IndexMap<Value, IndexMap<Name, Value>>>,
    finalized: bool,
}

impl Index {
    pub fn new() -> Self {
        Index {
            objects: IndexMap::new(),
            finalized: false,
        }
    }

    /// A reference to the synthetic root object.
    pub fn root(&self) -> Reference {
        Reference::root()
    }

    /// Allocates a reference bound to this index. Does not itself touch
    /// storage — `lookup` is where existence is actually checked.
    pub fn reference(&self, node: impl Into<Name>, ident: Value) -> Reference {
        Reference {
            node: node.into(),
            ident,
        }
    }

    /// Writes a field value for `(node, ident)`. Only the engine calls this,
    /// during execution, before `finalize`.
    pub fn insert(
        &mut self,
        node: impl Into<Name>,
        ident: Value,
        field: impl Into<Name>,
        value: Value,
    ) -> Result<(), EngineError> {
        if self.finalized {
            return Err(EngineError::IndexFinalized);
        }
        self.objects
            .entry(node.into())
            .or_default()
            .entry(ident)
            .or_default()
            .insert(field.into(), value);
        Ok(())
    }

    /// Reads a field value. Before `finalize`, an absent slot is simply a
    /// normal part of incremental construction and isn't distinguished here
    /// (the engine tracks its own population state); after `finalize`, a
    /// miss is always `MissingObject`/`MissingField` (§3 invariant i/ii).
    pub fn lookup(&self, reference: &Reference, field: &str) -> Result<&Value, EngineError> {
        let object =
            self.objects
                .get(&reference.node)
                .and_then(|idents| idents.get(&reference.ident))
                .ok_or_else(|| EngineError::MissingObject {
                    node: reference.node.clone(),
                    ident: reference.ident.clone(),
                })?;
        object.get(field).ok_or_else(|| EngineError::MissingField {
            node: reference.node.clone(),
            ident: reference.ident.clone(),
            field: Name::new(field),
        })
    }

    pub fn contains(&self, node: &str, ident: &Value) -> bool {
        self.objects
            .get(node)
            .map(|idents| idents.contains_key(ident))
            .unwrap_or(false)
    }

    /// Freezes the index: subsequent `insert` calls fail with
    /// `IndexFinalized`.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The raw `node -> ident -> field -> value` store, for read-only
    /// walks that need more than a single `lookup` — currently only the
    /// result serializer (§6 Result serialization).
    pub fn objects(&self) -> &IndexMap<Name, IndexMap<Value, IndexMap<Name, Value>>> {
        &self.objects
    }
}

/// A value read out through a `Proxy`: either a scalar/record field, a
/// single nested object, or an ordered list of nested objects — mirroring
/// the three shapes a query field/link can resolve to (§4.D).
#[derive(Debug, Clone)]
pub enum ProxyValue<'a> {
    Scalar(&'a Value),
    Object(Proxy<'a>),
    List(Vec<Proxy<'a>>),
}

/// An ergonomic read-only view over a `Reference`, scoped to the query node
/// that requested it. `field` re-wraps nested references as further
/// `Proxy`s and wraps lists of references element-wise; requesting a field
/// absent from the query fails with `FieldNotRequested`, which is distinct
/// from an index-level miss (§4.D, §9).
#[derive(Debug, Clone)]
pub struct Proxy<'a> {
    index: &'a Index,
    reference: Reference,
    query: &'a QueryNode,
}

impl<'a> Proxy<'a> {
    pub fn new(index: &'a Index, reference: Reference, query: &'a QueryNode) -> Self {
        Proxy {
            index,
            reference,
            query,
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn field(&self, name: &str) -> Result<ProxyValue<'a>, EngineError> {
        let child = self
            .query
            .children
            .get(name)
            .ok_or_else(|| EngineError::FieldNotRequested(Name::new(name)))?;

        let value = self.index.lookup(&self.reference, name)?;

        match child {
            Child::Field(_) => Ok(ProxyValue::Scalar(value)),
            Child::Link(link) => match value {
                Value::Ref(r) => Ok(ProxyValue::Object(Proxy::new(
                    self.index,
                    reference_from(r),
                    &link.node,
                ))),
                Value::Vector(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Ref(r) = item else {
                            return Err(EngineError::NotAReference(Name::new(name)));
                        };
                        out.push(Proxy::new(self.index, reference_from(r), &link.node));
                    }
                    Ok(ProxyValue::List(out))
                }
                Value::Nil => Ok(ProxyValue::List(vec![])),
                _ => Err(EngineError::NotAReference(Name::new(name))),
            },
        }
    }
}

fn reference_from(r: &ValueReference) -> Reference {
    Reference {
        node: r.node.clone(),
        ident: (*r.ident).clone(),
    }
}
