//! Crate-wide error kinds (§7). Grounded on the teacher's split between a
//! single-fault error (`SingleFederationError`) and a schema-build-time
//! error family — here `EngineError` covers execution-time faults and
//! `SchemaError` covers faults detected while assembling a `Graph`.

use crate::name::Name;
use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("node `{0}` is defined more than once in the graph")]
    DuplicateNode(Name),

    #[error("member `{member}` is defined more than once on node `{node}`")]
    DuplicateMember { node: Name, member: Name },

    #[error("option `{option}` is declared more than once on `{owner}`")]
    DuplicateOption { owner: Name, option: Name },

    #[error("`{from}` refers to node `{type_ref}`, which isn't defined in the graph")]
    DanglingTypeRef { from: Name, type_ref: Name },

    #[error("link `{link}` on node `{node}` requires unknown field `{field}`")]
    DanglingRequires { node: Name, link: Name, field: Name },

    #[error("link `{link}` on node `{node}` requires `{field}`, which is a link, not a field")]
    RequiresNotAField { node: Name, link: Name, field: Name },

    #[error("node `{node}` has no member named `{member}`")]
    UnknownMember { node: Name, member: Name },

    #[error("`{member}` on `{node}` is a field, but was queried as a link")]
    NotALink { node: Name, member: Name },

    #[error("`{member}` on `{node}` is a link, but was queried as a field")]
    NotAField { node: Name, member: Name },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("required option `{option}` for `{owner}` was not provided")]
    MissingRequiredOption { owner: Name, option: Name },

    #[error("`{name}` was requested more than once with conflicting options")]
    ConflictingOptions { name: Name },

    #[error(
        "resolver for `{owner}` returned {got} result(s), expected {expected}"
    )]
    ResultShapeMismatch {
        owner: Name,
        expected: usize,
        got: usize,
    },

    #[error("resolver for `{owner}` omitted requested field `{field}`")]
    ResultFieldMissing { owner: Name, field: Name },

    #[error("field `{0}` wasn't requested in the query")]
    FieldNotRequested(Name),

    #[error("object {node}[{ident:?}] is missing in the index")]
    MissingObject { node: Name, ident: Value },

    #[error("field {node}[{ident:?}].{field} is missing in the index")]
    MissingField {
        node: Name,
        ident: Value,
        field: Name,
    },

    #[error("cannot write to the index after it has been finalized")]
    IndexFinalized,

    #[error("field `{0}` is a link in the query but its stored value isn't a reference")]
    NotAReference(Name),

    #[error("field `{0}` has no declared type, but was queried as a compound field")]
    OpaqueFieldQueriedAsCompound(Name),

    #[error("compound field `{0}`'s stored value doesn't match its declared shape")]
    CompoundShapeMismatch(Name),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("resolver error: {0}")]
    Resolver(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A query text failed to tokenize (§6 grammar).
#[derive(Debug, Error)]
pub enum EdnError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unexpected character {0:?} at byte offset {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string literal starting at byte offset {0}")]
    UnterminatedString(usize),

    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),

    #[error("map literal has an odd number of elements")]
    OddMap,

    #[error("unknown character literal \\{0}")]
    UnknownCharLiteral(String),

    #[error("invalid #inst literal {0:?}: {1}")]
    InvalidInstant(String, String),

    #[error("invalid #uuid literal {0:?}: {1}")]
    InvalidUuid(String, String),

    #[error("tagged literal is missing its value")]
    TaggedElementMissingValue,
}

/// A query text parsed as EDN but didn't shape up into a valid query (§6).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Edn(#[from] EdnError),

    #[error("query text must contain exactly one top-level form, found {0}")]
    NotSingleForm(usize),

    #[error("expected a selection vector `[...]`, found {0}")]
    ExpectedSelectionSet(&'static str),

    #[error("expected a keyword naming a field or link, found {0}")]
    ExpectedName(&'static str),

    #[error("option map keys must be keywords, found {0}")]
    ExpectedOptionKeyword(&'static str),

    #[error("`(...)` invocation must be `(name {{...options}})`")]
    MalformedInvocation,

    #[error("`{{...}}` nested-link shorthand must have exactly one key")]
    MalformedNestedLink,
}
