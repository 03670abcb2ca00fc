//! The engine core (component F, §4.B): `process_node`, the central
//! recursive algorithm that walks a query node against its schema
//! counterpart, dispatches batched resolver calls through an `Executor`,
//! and writes results into an `Index`.
//!
//! Grounded on hiku's `engine.Engine.process_node`
//! (`examples/original_source/hiku/engine.py`) for the batching and
//! call-shape rules, and on the teacher's instrumentation style
//! (`tracing` spans around request-shaped work) for the ambient logging.

pub mod executor;

use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::{debug_span, info_span, trace, Instrument};

use crate::error::EngineError;
use crate::graph::{Graph, LinkDef, Member, NodeDef, OptionDef};
use crate::name::Name;
use crate::query::{Field as QueryField, Link as QueryLink, Node as QueryNode, OptionMap};
use crate::resolve::{Context, EmptyContext, RequestedField};
use crate::result::{Index, Reference, ROOT_IDENT, ROOT_NODE};
use crate::types::Cardinality;
use crate::value::{Reference as ValueReference, Value};
use executor::{task, Executor, Task, TaskOutput};

/// The outcome of a successful `Engine::execute` call: a finalized index,
/// the merged query it was built from, and a reference to the root object
/// (§4.C/§4.D). Owns the index thereafter — references borrow it for
/// lookup duration only.
pub struct ExecutionResult {
    index: Index,
    query: QueryNode,
}

impl ExecutionResult {
    pub fn root(&self) -> crate::result::Proxy<'_> {
        crate::result::Proxy::new(&self.index, self.index.root(), &self.query)
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn query(&self) -> &QueryNode {
        &self.query
    }
}

/// Runs queries against a `Graph`. Stateless beyond the executor it holds —
/// a single `Engine` can serve any number of `execute` calls concurrently,
/// each against its own fresh `Index`.
pub struct Engine {
    executor: Arc<dyn Executor>,
}

impl Engine {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Engine { executor }
    }

    pub async fn execute(
        &self,
        graph: &Graph,
        query: QueryNode,
        context: Option<Arc<dyn Context>>,
    ) -> Result<ExecutionResult, EngineError> {
        let span = info_span!("execute");
        async move {
            let ctx = context.unwrap_or_else(|| Arc::new(EmptyContext) as Arc<dyn Context>);
            let query = crate::query::merge([query])?;
            let mut index = Index::new();
            let root_ident = Value::str(ROOT_IDENT);

            process_node(
                graph,
                &mut index,
                &self.executor,
                &ctx,
                graph.root(),
                &query,
                vec![root_ident],
                true,
            )
            .await?;

            index.finalize();
            Ok(ExecutionResult { index, query })
        }
        .instrument(span)
        .await
    }
}

/// Resolves an effective option map against a member's declared options:
/// query-supplied values win, then declared defaults, then
/// `MissingRequiredOption` (§4.B). Options the query supplies but the
/// member doesn't declare are dropped — only declared options reach the
/// resolver.
fn resolve_options(
    owner: &Name,
    declared: &IndexMap<Name, OptionDef>,
    supplied: &OptionMap,
) -> Result<OptionMap, EngineError> {
    let mut resolved = OptionMap::new();
    for option in declared.values() {
        if let Some(value) = supplied.get(option.name.as_str()) {
            resolved.insert(option.name.clone(), value.clone());
        } else if let Some(default) = &option.default {
            resolved.insert(option.name.clone(), default.clone());
        } else {
            return Err(EngineError::MissingRequiredOption {
                owner: owner.clone(),
                option: option.name.clone(),
            });
        }
    }
    Ok(resolved)
}

fn context_for<'a>(member_context_aware: bool, ctx: &'a Arc<dyn Context>) -> &'a dyn Context {
    if member_context_aware {
        ctx.as_ref()
    } else {
        &EmptyContext
    }
}

/// The recursive walk over one node level: resolves every requested field
/// (batched by shared resolver identity), then every requested link
/// (batched per link only — distinct links rarely share a resolver), then
/// recurses sequentially into each link's target subtree (§5: the Index is
/// mutated only by the single orchestrating task between awaits, so
/// sibling subtrees are walked one at a time; true concurrency happens only
/// inside each level's resolver-call barrier).
fn process_node<'a>(
    graph: &'a Graph,
    index: &'a mut Index,
    executor: &'a Arc<dyn Executor>,
    ctx: &'a Arc<dyn Context>,
    node_def: &'a NodeDef,
    query_node: &'a QueryNode,
    idents: Vec<Value>,
    is_root: bool,
) -> BoxFuture<'a, Result<(), EngineError>> {
    Box::pin(async move {
        let span = debug_span!("level", node = %node_def.name, idents = idents.len());
        async move {
            let required_fields = linked_required_fields(node_def, query_node, &node_def.name)?;
            resolve_fields(
                graph,
                index,
                executor,
                ctx,
                node_def,
                query_node,
                &idents,
                is_root,
                &required_fields,
            )
            .await?;

            let link_targets =
                resolve_links(graph, index, executor, ctx, node_def, query_node, &idents).await?;

            for (link, target_node, target_idents) in link_targets {
                if target_idents.is_empty() {
                    continue;
                }
                process_node(
                    graph,
                    index,
                    executor,
                    ctx,
                    target_node,
                    &link.node,
                    target_idents,
                    false,
                )
                .await?;
            }
            Ok(())
        }
        .instrument(span)
        .await
    })
}

/// A child of the query node, classified against the schema (§4.B/§4.E).
/// The AST shape alone doesn't determine this: a compound `Field` member
/// (one with a `Record`/`Sequence`/`Optional` type) is queried with the
/// same nested-selection `Link` syntax as a real graph `Link`, but it's
/// resolved as a field — the nested selection only drives denormalization
/// (§4.E), never a separate resolver call. Grounded on the original
/// source's `eches`/`lappin`/`ant` fixtures in
/// `examples/original_source/tests/test_engine.py::test_node_complex_fields`,
/// where `Field('eches', Optional[Record[...]], ...)` is queried as
/// `{:eches [:gone]}`.
pub(crate) enum Classified<'a> {
    Field(&'a QueryField),
    CompoundField(&'a QueryLink),
    Link(&'a QueryLink),
}

pub(crate) fn classify_children<'a>(
    node_def: &NodeDef,
    query_node: &'a QueryNode,
    node_name: &Name,
) -> Result<Vec<Classified<'a>>, EngineError> {
    let mut out = Vec::with_capacity(query_node.children.len());
    for child in query_node.children.values() {
        match child {
            crate::query::Child::Field(f) => match node_def.member(f.name.as_str()) {
                Some(Member::Field(_)) => out.push(Classified::Field(f)),
                Some(Member::Link(_)) => {
                    return Err(EngineError::Schema(crate::error::SchemaError::NotAField {
                        node: node_name.clone(),
                        member: f.name.clone(),
                    }))
                }
                None => {
                    return Err(EngineError::Schema(crate::error::SchemaError::UnknownMember {
                        node: node_name.clone(),
                        member: f.name.clone(),
                    }))
                }
            },
            crate::query::Child::Link(l) => match node_def.member(l.name.as_str()) {
                Some(Member::Link(_)) => out.push(Classified::Link(l)),
                Some(Member::Field(_)) => out.push(Classified::CompoundField(l)),
                None => {
                    return Err(EngineError::Schema(crate::error::SchemaError::UnknownMember {
                        node: node_name.clone(),
                        member: l.name.clone(),
                    }))
                }
            },
        }
    }
    Ok(out)
}

/// Every `requires` name declared by this level's links, deduplicated, in
/// link declaration order. A link's required field must already sit in the
/// index by the time `resolve_links` looks it up, whether or not the query
/// independently selected it — grounded on the original's auto-fetch of a
/// link's `requires` field (`examples/original_source/hiku/engine.py`'s
/// `Engine.store_fields` gathering `link.requires` alongside the query's own
/// fields; see `test_source_sql.py::test_m2o`, where `bar_id` ends up in the
/// result despite never being selected).
fn linked_required_fields(
    node_def: &NodeDef,
    query_node: &QueryNode,
    node_name: &Name,
) -> Result<Vec<Name>, EngineError> {
    let mut required = Vec::new();
    for classified in classify_children(node_def, query_node, node_name)? {
        if let Classified::Link(query_link) = classified {
            let link_def: &LinkDef = node_def
                .link(query_link.name.as_str())
                .expect("classified as a link member");
            if let Some(requires) = &link_def.requires {
                if !required.contains(requires) {
                    required.push(requires.clone());
                }
            }
        }
    }
    Ok(required)
}

async fn resolve_fields(
    graph: &Graph,
    index: &mut Index,
    executor: &Arc<dyn Executor>,
    ctx: &Arc<dyn Context>,
    node_def: &NodeDef,
    query_node: &QueryNode,
    idents: &[Value],
    is_root: bool,
    required_fields: &[Name],
) -> Result<(), EngineError> {
    let _ = graph;
    let node_name = node_def.name.clone();

    // Group requested fields by shared resolver identity (§4.B): several
    // query fields backed by the same underlying resolver are dispatched
    // as one call with the union of requested fields.
    let mut groups: Vec<(Arc<dyn crate::resolve::FieldResolver>, bool, Vec<RequestedField>)> =
        Vec::new();
    let mut selected = Vec::new();
    for classified in classify_children(node_def, query_node, &node_name)? {
        let (name, options) = match classified {
            Classified::Field(f) => (&f.name, &f.options),
            Classified::CompoundField(l) => (&l.name, &l.options),
            Classified::Link(_) => continue,
        };
        selected.push(name.clone());
        let field_def = node_def.field(name.as_str()).expect("classified as a field member");
        let requested = RequestedField::new(
            field_def.name.clone(),
            resolve_options(&field_def.name, &field_def.options, options)?,
        );
        match groups
            .iter_mut()
            .find(|(resolver, _, _)| Arc::ptr_eq(resolver, &field_def.resolver))
        {
            Some((_, _, fields)) => fields.push(requested),
            None => groups.push((field_def.resolver.clone(), field_def.context_aware, vec![requested])),
        }
    }

    // A link's `requires` field is scheduled here too even when the query
    // never selected it on its own (§4.B).
    for name in required_fields {
        if selected.contains(name) {
            continue;
        }
        let field_def = node_def
            .field(name.as_str())
            .expect("requires names a field member, checked by Graph::validate");
        let requested = RequestedField::new(
            field_def.name.clone(),
            resolve_options(&field_def.name, &field_def.options, &OptionMap::new())?,
        );
        match groups
            .iter_mut()
            .find(|(resolver, _, _)| Arc::ptr_eq(resolver, &field_def.resolver))
        {
            Some((_, _, fields)) => fields.push(requested),
            None => groups.push((field_def.resolver.clone(), field_def.context_aware, vec![requested])),
        }
    }

    if groups.is_empty() {
        return Ok(());
    }

    let mut tasks: Vec<Task> = Vec::with_capacity(groups.len());
    for (resolver, context_aware, fields) in &groups {
        let resolver = resolver.clone();
        let fields = fields.clone();
        let call_ctx: Arc<dyn Context> = if *context_aware { ctx.clone() } else { Arc::new(EmptyContext) };
        let owner = node_name.clone();
        if is_root {
            tasks.push(task(async move {
                trace!(fields = fields.len(), owner = %owner, "dispatch root field batch");
                let values = resolver
                    .resolve_root(call_ctx.as_ref(), &fields)
                    .await
                    .map_err(EngineError::Resolver)?;
                if values.len() != fields.len() {
                    return Err(EngineError::ResultShapeMismatch {
                        owner,
                        expected: fields.len(),
                        got: values.len(),
                    });
                }
                Ok(TaskOutput::RootFields(values))
            }));
        } else {
            let idents = idents.to_vec();
            tasks.push(task(async move {
                trace!(fields = fields.len(), idents = idents.len(), owner = %owner, "dispatch field batch");
                let rows = resolver
                    .resolve(call_ctx.as_ref(), &fields, &idents)
                    .await
                    .map_err(EngineError::Resolver)?;
                if rows.len() != idents.len() {
                    return Err(EngineError::ResultShapeMismatch {
                        owner,
                        expected: idents.len(),
                        got: rows.len(),
                    });
                }
                Ok(TaskOutput::Fields(rows))
            }));
        }
    }

    let results = executor.wait_all(tasks).await;

    for ((_, _, fields), result) in groups.into_iter().zip(results) {
        match result? {
            TaskOutput::RootFields(values) => {
                let root_ident = Value::str(ROOT_IDENT);
                for (field, value) in fields.into_iter().zip(values) {
                    index.insert(ROOT_NODE, root_ident.clone(), field.name, value)?;
                }
            }
            TaskOutput::Fields(rows) => {
                for (ident, row) in idents.iter().zip(rows) {
                    if row.len() != fields.len() {
                        return Err(EngineError::ResultFieldMissing {
                            owner: node_name.clone(),
                            field: fields[row.len().min(fields.len().saturating_sub(1))]
                                .name
                                .clone(),
                        });
                    }
                    for (field, value) in fields.iter().zip(row) {
                        index.insert(node_name.clone(), ident.clone(), field.name.clone(), value)?;
                    }
                }
            }
            TaskOutput::Link(_) => unreachable!("field batch never yields a Link task output"),
        }
    }

    Ok(())
}

type LinkTarget<'a> = (&'a QueryLink, &'a NodeDef, Vec<Value>);

/// Resolves every link at this level. Returns, per link, the schema node
/// it targets and the de-duplicated set of target idents to recurse into.
/// Only children classified as `Member::Link` reach here — a `Link`-shaped
/// child over a compound `Field` member is handled by `resolve_fields`
/// instead (see `Classified`).
async fn resolve_links<'a>(
    graph: &'a Graph,
    index: &mut Index,
    executor: &Arc<dyn Executor>,
    ctx: &Arc<dyn Context>,
    node_def: &NodeDef,
    query_node: &'a QueryNode,
    idents: &[Value],
) -> Result<Vec<LinkTarget<'a>>, EngineError> {
    let node_name = node_def.name.clone();
    let mut links = Vec::new();
    for classified in classify_children(node_def, query_node, &node_name)? {
        if let Classified::Link(query_link) = classified {
            let link_def = node_def
                .link(query_link.name.as_str())
                .expect("classified as a link member");
            links.push((query_link, link_def));
        }
    }

    if links.is_empty() {
        return Ok(Vec::new());
    }

    let mut tasks: Vec<Task> = Vec::with_capacity(links.len());
    for (query_link, link_def) in &links {
        let resolver = link_def.resolver.clone();
        let options = resolve_options(&link_def.name, &link_def.options, &query_link.options)?;
        let call_ctx: Arc<dyn Context> = if link_def.context_aware {
            ctx.clone()
        } else {
            Arc::new(EmptyContext)
        };
        let owner = node_name.clone();
        let link_name = link_def.name.clone();

        match &link_def.requires {
            Some(requires_field) => {
                let mut required = Vec::with_capacity(idents.len());
                for ident in idents {
                    let reference = Reference {
                        node: node_name.clone(),
                        ident: ident.clone(),
                    };
                    required.push(index.lookup(&reference, requires_field.as_str())?.clone());
                }
                tasks.push(task(async move {
                    trace!(link = %link_name, idents = required.len(), owner = %owner, "dispatch link batch");
                    let targets = resolver
                        .resolve(call_ctx.as_ref(), &options, Some(&required))
                        .await
                        .map_err(EngineError::Resolver)?;
                    if targets.len() != required.len() {
                        return Err(EngineError::ResultShapeMismatch {
                            owner,
                            expected: required.len(),
                            got: targets.len(),
                        });
                    }
                    Ok(TaskOutput::Link(targets))
                }));
            }
            None => {
                let cardinality = link_def.cardinality;
                tasks.push(task(async move {
                    trace!(link = %link_name, owner = %owner, "dispatch broadcast link call");
                    let targets = resolver
                        .resolve(call_ctx.as_ref(), &options, None)
                        .await
                        .map_err(EngineError::Resolver)?;
                    // A requires-less `Many` link returns the flat list of
                    // target idents directly — any length is valid,
                    // including zero or several. `One`/`Maybe` still expect
                    // exactly one value broadcast to every ident.
                    if cardinality != Cardinality::Many && targets.len() != 1 {
                        return Err(EngineError::ResultShapeMismatch {
                            owner,
                            expected: 1,
                            got: targets.len(),
                        });
                    }
                    Ok(TaskOutput::Link(targets))
                }));
            }
        }
    }

    let results = executor.wait_all(tasks).await;

    let mut targets = Vec::with_capacity(links.len());
    for ((query_link, link_def), result) in links.into_iter().zip(results) {
        let raw = match result? {
            TaskOutput::Link(values) => values,
            _ => unreachable!("link batch never yields a field task output"),
        };

        // A requires-less resolver is called once per level, not once per
        // ident: its result is broadcast across every incoming ident rather
        // than zipped one-to-one. For `Many` the raw vec *is* the flat
        // target-ident list the broadcast value wraps; for `One`/`Maybe` the
        // single returned value itself is the broadcast value.
        let broadcast: Option<Value> = if link_def.requires.is_none() {
            Some(match link_def.cardinality {
                Cardinality::Many => Value::Vector(raw.clone()),
                Cardinality::One | Cardinality::Maybe => raw[0].clone(),
            })
        } else {
            None
        };
        let mut target_idents = Vec::new();

        for (i, ident) in idents.iter().enumerate() {
            let slot = broadcast.as_ref().unwrap_or(&raw[i]);
            let stored = link_value_for(
                &link_def.target,
                &link_def.name,
                &node_name,
                link_def.cardinality,
                slot,
            )?;
            if let Value::Ref(r) = &stored {
                push_unique(&mut target_idents, (*r.ident).clone());
            } else if let Value::Vector(items) = &stored {
                for item in items {
                    if let Value::Ref(r) = item {
                        push_unique(&mut target_idents, (*r.ident).clone());
                    }
                }
            }
            index.insert(node_name.clone(), ident.clone(), link_def.name.clone(), stored)?;
        }

        let target_node = graph.node(link_def.target.as_str()).ok_or_else(|| {
            EngineError::Schema(crate::error::SchemaError::DanglingTypeRef {
                from: link_def.name.clone(),
                type_ref: link_def.target.clone(),
            })
        })?;
        targets.push((query_link, target_node, target_idents));
    }

    Ok(targets)
}

fn push_unique(idents: &mut Vec<Value>, candidate: Value) {
    if !idents.iter().any(|v| v == &candidate) {
        idents.push(candidate);
    }
}

/// Converts one raw resolver-returned ident shape into the `Value` stored
/// in the index for a link field, per the link's declared cardinality.
/// `target` is the link's target node — the `Reference`'s node name, which
/// is what the recursive `process_node` call into that node later writes
/// fields under (§3 invariant i), not the link's own field name.
fn link_value_for(
    target: &Name,
    link_name: &Name,
    owner: &Name,
    cardinality: Cardinality,
    raw: &Value,
) -> Result<Value, EngineError> {
    match cardinality {
        Cardinality::One => match raw {
            Value::Vector(_) => Err(EngineError::ResultFieldMissing {
                owner: owner.clone(),
                field: link_name.clone(),
            }),
            ident => Ok(ValueReference::new(target.clone(), ident.clone()).into()),
        },
        Cardinality::Maybe => match raw {
            Value::Nil => Ok(Value::Nil),
            Value::Vector(_) => Err(EngineError::ResultFieldMissing {
                owner: owner.clone(),
                field: link_name.clone(),
            }),
            ident => Ok(ValueReference::new(target.clone(), ident.clone()).into()),
        },
        Cardinality::Many => match raw {
            Value::Vector(items) => Ok(Value::Vector(
                items
                    .iter()
                    .map(|ident| ValueReference::new(target.clone(), ident.clone()).into())
                    .collect(),
            )),
            Value::Nil => Ok(Value::Vector(vec![])),
            _ => Err(EngineError::ResultFieldMissing {
                owner: owner.clone(),
                field: link_name.clone(),
            }),
        },
    }
}
