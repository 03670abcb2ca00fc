//! The type system (component C): scalar/record/sequence/optional/type-ref
//! field-type descriptors, re-expressed per the redesign note (§9) as a
//! tagged variant (sum type) with an explicit `match` site in the engine and
//! denormalizer, rather than the teacher's/source's runtime `isinstance`
//! dispatch on `RecordMeta`/`SequenceMeta`/`OptionalMeta`/`TypeRef`.

use crate::name::Name;
use indexmap::IndexMap;
use strum_macros::Display;

/// A field's declared type. `None` on a `Field` member means "opaque" — not
/// further projected by the denormalizer (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// An unstructured scalar value, returned verbatim.
    Scalar,
    Optional(Box<FieldType>),
    Sequence(Box<FieldType>),
    Record(IndexMap<Name, FieldType>),
    /// A cross-node reference, named by the target node.
    TypeRef(Name),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn sequence(inner: FieldType) -> Self {
        FieldType::Sequence(Box::new(inner))
    }

    pub fn type_ref(name: impl Into<Name>) -> Self {
        FieldType::TypeRef(name.into())
    }

    /// Every `TypeRef` reachable from this type, for schema validation
    /// (§3 invariant: every `TypeRef[T]` resolves to some node in the graph).
    pub fn type_refs(&self) -> Vec<&Name> {
        match self {
            FieldType::Scalar => vec![],
            FieldType::Optional(inner) | FieldType::Sequence(inner) => inner.type_refs(),
            FieldType::Record(fields) => fields.values().flat_map(|f| f.type_refs()).collect(),
            FieldType::TypeRef(name) => vec![name],
        }
    }

    /// The link cardinality selected by a `Link` member's declared type:
    /// `TypeRef[T]` (`One`), `Sequence[TypeRef[T]]` (`Many`) or
    /// `Optional[TypeRef[T]]` (`Maybe`) — §3.
    pub fn as_link_shape(&self) -> Option<(Cardinality, &Name)> {
        match self {
            FieldType::TypeRef(name) => Some((Cardinality::One, name)),
            FieldType::Sequence(inner) => match inner.as_ref() {
                FieldType::TypeRef(name) => Some((Cardinality::Many, name)),
                _ => None,
            },
            FieldType::Optional(inner) => match inner.as_ref() {
                FieldType::TypeRef(name) => Some((Cardinality::Maybe, name)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A link's cardinality, selected by its declared type (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
    Maybe,
}
