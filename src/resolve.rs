//! Resolver traits (component F, part of §4.B): the boundary between the
//! engine and user-supplied data-fetching code. Grounded on the teacher's
//! `sources::connect` resolver abstractions — a small `async_trait` surface
//! the engine calls in batches — generalized here to hiku's resolver call
//! shapes (§4.B Design Note): root fields take only the requested fields,
//! non-root fields additionally take the idents of the objects being
//! resolved, and links take the gathered `requires` values only when the
//! link declares `requires`.

use crate::query::OptionMap;
use crate::value::Value;
use async_trait::async_trait;
use std::error::Error;

/// A single requested field, with whatever options the query asked for
/// collapsed against the field's declared defaults (§4.B).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedField {
    pub name: crate::name::Name,
    pub options: OptionMap,
}

impl RequestedField {
    pub fn new(name: impl Into<crate::name::Name>, options: OptionMap) -> Self {
        RequestedField {
            name: name.into(),
            options,
        }
    }
}

/// Ambient request-scoped state threaded through context-aware resolvers
/// (§4.B) — the analogue of hiku's engine-supplied `ctx` dict. Kept as a
/// trait rather than a concrete struct so callers can hand the engine
/// whatever request type they already carry (a session, an auth token, a
/// request-scoped cache handle) without the engine needing to know its shape.
pub trait Context: Send + Sync {
    fn get(&self, key: &str) -> Option<&Value>;
}

/// A `Context` with nothing in it, for resolvers that ignore context
/// entirely and engine calls made outside of a live request.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContext;

impl Context for EmptyContext {
    fn get(&self, _key: &str) -> Option<&Value> {
        None
    }
}

pub type ResolverError = Box<dyn Error + Send + Sync>;

/// Resolves one field across a batch of objects. Called once per
/// (node, requested-fields-batch) per level (§4.B, §5).
#[async_trait]
pub trait FieldResolver: Send + Sync {
    /// Root-level fields have no idents to resolve against — there is
    /// exactly one root object per query.
    async fn resolve_root(
        &self,
        ctx: &dyn Context,
        fields: &[RequestedField],
    ) -> Result<Vec<Value>, ResolverError>;

    /// Non-root fields are resolved per ident. Returns one row per ident,
    /// each row holding one value per requested field, in the same order.
    async fn resolve(
        &self,
        ctx: &dyn Context,
        fields: &[RequestedField],
        idents: &[Value],
    ) -> Result<Vec<Vec<Value>>, ResolverError>;
}

/// Resolves a link's target idents. Called once per (node, link) per level.
///
/// When the link declares no `requires`, `requires` is `None` and the
/// resolver is called exactly once for the whole batch — its single result
/// is broadcast across every incoming ident (§4.B Design Note; grounded on
/// hiku's `test_node_link_without_requirements`, where the downstream
/// resolver is asserted called exactly once regardless of batch size).
/// When the link declares `requires`, one gathered value is supplied per
/// incoming ident and the resolver returns one result per ident.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &dyn Context,
        options: &OptionMap,
        requires: Option<&[Value]>,
    ) -> Result<Vec<Value>, ResolverError>;
}

/// Minimal stand-ins used by schema-graph tests that need *a* resolver but
/// don't exercise resolution itself.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;

    #[derive(Default)]
    pub struct StubFieldResolver;

    #[async_trait]
    impl FieldResolver for StubFieldResolver {
        async fn resolve_root(
            &self,
            _ctx: &dyn Context,
            _fields: &[RequestedField],
        ) -> Result<Vec<Value>, ResolverError> {
            Ok(vec![])
        }

        async fn resolve(
            &self,
            _ctx: &dyn Context,
            _fields: &[RequestedField],
            idents: &[Value],
        ) -> Result<Vec<Vec<Value>>, ResolverError> {
            Ok(idents.iter().map(|_| vec![]).collect())
        }
    }

    #[derive(Default)]
    pub struct StubLinkResolver;

    #[async_trait]
    impl LinkResolver for StubLinkResolver {
        async fn resolve(
            &self,
            _ctx: &dyn Context,
            _options: &OptionMap,
            _requires: Option<&[Value]>,
        ) -> Result<Vec<Value>, ResolverError> {
            Ok(vec![])
        }
    }
}
