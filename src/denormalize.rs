//! The result denormalizer (component G, §4.E): projects a finalized,
//! normalized `Index` back into a tree shaped by the query that produced
//! it, following `Reference`s as it recurses.
//!
//! Grounded on `examples/original_source/hiku/result.py`'s `_denormalize`/
//! `_denormalize_type`/`denormalize` functions. The original dispatches at
//! runtime on `isinstance(graph_obj, GraphField | GraphLink)`; here that's
//! the same schema-member-based `Classified` the engine already computes
//! (`engine::classify_children`), reused rather than re-derived, so a
//! compound field and a real link are told apart exactly the same way in
//! both passes.

use crate::engine::{classify_children, Classified, ExecutionResult};
use crate::error::EngineError;
use crate::graph::{Graph, NodeDef};
use crate::query::Node as QueryNode;
use crate::result::{Index, Reference};
use crate::types::{Cardinality, FieldType};
use crate::value::{Reference as ValueReference, Value};

/// Projects an executed query's result into a plain `Value` tree (§4.E),
/// in the shape the query text requested — one `Value::Map` per node
/// level, keyed by field/link name.
pub fn denormalize(graph: &Graph, result: &ExecutionResult) -> Result<Value, EngineError> {
    denormalize_node(
        graph,
        result.index(),
        graph.root(),
        &result.index().root(),
        result.query(),
    )
}

fn denormalize_node(
    graph: &Graph,
    index: &Index,
    node_def: &NodeDef,
    reference: &Reference,
    query_node: &QueryNode,
) -> Result<Value, EngineError> {
    let mut out = Vec::with_capacity(query_node.children.len());
    for classified in classify_children(node_def, query_node, &node_def.name)? {
        match classified {
            Classified::Field(field) => {
                let value = index.lookup(reference, field.name.as_str())?;
                out.push((Value::str(field.name.as_str()), value.clone()));
            }
            Classified::CompoundField(link) => {
                let field_def = node_def
                    .field(link.name.as_str())
                    .expect("classified as a field member");
                let ty = field_def.ty.as_ref().ok_or_else(|| {
                    EngineError::OpaqueFieldQueriedAsCompound(link.name.clone())
                })?;
                let raw = index.lookup(reference, link.name.as_str())?;
                let value = denormalize_type(&link.name, ty, raw, &link.node)?;
                out.push((Value::str(link.name.as_str()), value));
            }
            Classified::Link(link) => {
                let link_def = node_def
                    .link(link.name.as_str())
                    .expect("classified as a link member");
                let raw = index.lookup(reference, link.name.as_str())?;
                let target = graph.node(link_def.target.as_str()).ok_or_else(|| {
                    EngineError::Schema(crate::error::SchemaError::DanglingTypeRef {
                        from: link.name.clone(),
                        type_ref: link_def.target.clone(),
                    })
                })?;

                let value = match link_def.cardinality {
                    Cardinality::One => {
                        let r = as_reference(raw, &link.name)?;
                        denormalize_node(graph, index, target, &to_reference(index, r), &link.node)?
                    }
                    Cardinality::Maybe => {
                        if raw.is_nil() {
                            Value::Nil
                        } else {
                            let r = as_reference(raw, &link.name)?;
                            denormalize_node(
                                graph,
                                index,
                                target,
                                &to_reference(index, r),
                                &link.node,
                            )?
                        }
                    }
                    Cardinality::Many => {
                        let items = raw
                            .as_vector()
                            .ok_or_else(|| EngineError::NotAReference(link.name.clone()))?;
                        let mut list = Vec::with_capacity(items.len());
                        for item in items {
                            let r = as_reference(item, &link.name)?;
                            list.push(denormalize_node(
                                graph,
                                index,
                                target,
                                &to_reference(index, r),
                                &link.node,
                            )?);
                        }
                        Value::Vector(list)
                    }
                };
                out.push((Value::str(link.name.as_str()), value));
            }
        }
    }
    Ok(Value::Map(out))
}

/// Projects a raw compound-field value according to its declared type
/// (§3): a `Sequence`/`Optional` wrapper recurses through unchanged, a
/// `Record` is narrowed down to the fields the query actually requested, in
/// the order the query named them. A nested field's own value is returned
/// verbatim — the source's `_denormalize_type` shows the same behavior: it
/// looks up each nested field's declared type only to recurse into a
/// further `Field` query node, which always returns its value as-is.
fn denormalize_type(
    field_name: &crate::name::Name,
    ty: &FieldType,
    value: &Value,
    query_node: &QueryNode,
) -> Result<Value, EngineError> {
    match ty {
        FieldType::Sequence(inner) => {
            let items = value
                .as_vector()
                .ok_or_else(|| EngineError::CompoundShapeMismatch(field_name.clone()))?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(denormalize_type(field_name, inner, item, query_node)?);
            }
            Ok(Value::Vector(out))
        }
        FieldType::Optional(inner) => {
            if value.is_nil() {
                Ok(Value::Nil)
            } else {
                denormalize_type(field_name, inner, value, query_node)
            }
        }
        FieldType::Record(_) => {
            let entries = value
                .as_map()
                .ok_or_else(|| EngineError::CompoundShapeMismatch(field_name.clone()))?;
            let mut out = Vec::with_capacity(query_node.children.len());
            for field in query_node.fields() {
                let field_value = entries
                    .iter()
                    .find(|(k, _)| matches!(k, Value::Keyword(n) if n == &field.name))
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| EngineError::ResultFieldMissing {
                        owner: field_name.clone(),
                        field: field.name.clone(),
                    })?;
                out.push((Value::str(field.name.as_str()), field_value));
            }
            Ok(Value::Map(out))
        }
        FieldType::Scalar | FieldType::TypeRef(_) => Ok(value.clone()),
    }
}

fn as_reference<'a>(value: &'a Value, name: &crate::name::Name) -> Result<&'a ValueReference, EngineError> {
    match value {
        Value::Ref(r) => Ok(r),
        _ => Err(EngineError::NotAReference(name.clone())),
    }
}

fn to_reference(index: &Index, r: &ValueReference) -> Reference {
    index.reference(r.node.clone(), (*r.ident).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::executor::InlineExecutor;
    use crate::engine::Engine;
    use crate::graph::{FieldDef, LinkDef, Member};
    use crate::query::{Child, Field as QField, Link as QLink, Node as QNode, OptionMap};
    use crate::resolve::{Context, RequestedField, ResolverError};
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use std::sync::Arc;

    struct CannedField(Value);

    #[async_trait]
    impl crate::resolve::FieldResolver for CannedField {
        async fn resolve_root(
            &self,
            _ctx: &dyn Context,
            fields: &[RequestedField],
        ) -> Result<Vec<Value>, ResolverError> {
            Ok(fields.iter().map(|_| self.0.clone()).collect())
        }

        async fn resolve(
            &self,
            _ctx: &dyn Context,
            fields: &[RequestedField],
            idents: &[Value],
        ) -> Result<Vec<Vec<Value>>, ResolverError> {
            Ok(idents
                .iter()
                .map(|_| fields.iter().map(|_| self.0.clone()).collect())
                .collect())
        }
    }

    struct CannedLink(Vec<Value>);

    #[async_trait]
    impl crate::resolve::LinkResolver for CannedLink {
        async fn resolve(
            &self,
            _ctx: &dyn Context,
            _options: &OptionMap,
            _requires: Option<&[Value]>,
        ) -> Result<Vec<Value>, ResolverError> {
            Ok(self.0.clone())
        }
    }

    fn leaf(name: &str) -> QNode {
        QNode::from_children([Child::Field(QField::new(name))])
    }

    #[tokio::test]
    async fn denormalizes_a_plain_scalar_tree() {
        let root = crate::graph::NodeDef::new(
            "__root__",
            [Member::Field(FieldDef::new(
                "indice",
                None,
                Arc::new(CannedField(Value::str("x"))),
            ))],
        )
        .unwrap();
        let graph = Graph::builder().root(root).build().unwrap();
        let query = QNode::from_children([Child::Field(QField::new("indice"))]);

        let engine = Engine::new(Arc::new(InlineExecutor));
        let result = engine.execute(&graph, query, None).await.unwrap();
        let tree = denormalize(&graph, &result).unwrap();

        match tree {
            Value::Map(entries) => {
                assert_eq!(entries, vec![(Value::str("indice"), Value::str("x"))])
            }
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn maybe_link_denormalizes_to_nil_when_target_is_absent() {
        let ferulae = crate::graph::NodeDef::new(
            "ferulae",
            [Member::Field(FieldDef::new(
                "trilled",
                None,
                Arc::new(CannedField(Value::str("v"))),
            ))],
        )
        .unwrap();
        let root = crate::graph::NodeDef::new(
            "__root__",
            [Member::Link(LinkDef::new(
                "zovirax",
                "ferulae",
                Cardinality::Maybe,
                Arc::new(CannedLink(vec![Value::Nil])),
            ))],
        )
        .unwrap();
        let graph = Graph::builder()
            .node(ferulae)
            .unwrap()
            .root(root)
            .build()
            .unwrap();

        let query = QNode::from_children([Child::Link(QLink {
            name: crate::name::Name::new("zovirax"),
            options: OptionMap::new(),
            node: leaf("trilled"),
        })]);

        let engine = Engine::new(Arc::new(InlineExecutor));
        let result = engine.execute(&graph, query, None).await.unwrap();
        let tree = denormalize(&graph, &result).unwrap();

        match tree {
            Value::Map(entries) => {
                assert_eq!(entries, vec![(Value::str("zovirax"), Value::Nil)]);
            }
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn many_link_with_empty_target_denormalizes_to_an_empty_list() {
        let ferulae = crate::graph::NodeDef::new(
            "ferulae",
            [Member::Field(FieldDef::new(
                "trilled",
                None,
                Arc::new(CannedField(Value::str("v"))),
            ))],
        )
        .unwrap();
        let root = crate::graph::NodeDef::new(
            "__root__",
            [Member::Link(LinkDef::new(
                "subaru",
                "ferulae",
                Cardinality::Many,
                Arc::new(CannedLink(vec![])),
            ))],
        )
        .unwrap();
        let graph = Graph::builder()
            .node(ferulae)
            .unwrap()
            .root(root)
            .build()
            .unwrap();

        let query = QNode::from_children([Child::Link(QLink {
            name: crate::name::Name::new("subaru"),
            options: OptionMap::new(),
            node: leaf("trilled"),
        })]);

        let engine = Engine::new(Arc::new(InlineExecutor));
        let result = engine.execute(&graph, query, None).await.unwrap();
        let tree = denormalize(&graph, &result).unwrap();

        match tree {
            Value::Map(entries) => {
                assert_eq!(entries, vec![(Value::str("subaru"), Value::Vector(vec![]))]);
            }
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn compound_record_field_projects_only_requested_subfields_in_order() {
        let record = Value::Map(vec![
            (Value::keyword("gone"), Value::str("a")),
            (Value::keyword("unmined"), Value::str("b")),
        ]);
        let mut record_fields = IndexMap::new();
        record_fields.insert(crate::name::Name::new("gone"), FieldType::Scalar);
        record_fields.insert(crate::name::Name::new("unmined"), FieldType::Scalar);

        let tergate = crate::graph::NodeDef::new(
            "tergate",
            [Member::Field(FieldDef::new(
                "eches",
                Some(FieldType::Record(record_fields)),
                Arc::new(CannedField(record)),
            ))],
        )
        .unwrap();
        let root = crate::graph::NodeDef::new(
            "__root__",
            [Member::Link(LinkDef::new(
                "subaru",
                "tergate",
                Cardinality::One,
                Arc::new(CannedLink(vec![Value::Int(1)])),
            ))],
        )
        .unwrap();
        let graph = Graph::builder()
            .node(tergate)
            .unwrap()
            .root(root)
            .build()
            .unwrap();

        let inner = QNode::from_children([Child::Link(QLink {
            name: crate::name::Name::new("eches"),
            options: OptionMap::new(),
            node: leaf("unmined"),
        })]);
        let query = QNode::from_children([Child::Link(QLink {
            name: crate::name::Name::new("subaru"),
            options: OptionMap::new(),
            node: inner,
        })]);

        let engine = Engine::new(Arc::new(InlineExecutor));
        let result = engine.execute(&graph, query, None).await.unwrap();
        let tree = denormalize(&graph, &result).unwrap();

        let subaru = match &tree {
            Value::Map(entries) => &entries[0].1,
            other => panic!("expected a map, got {other:?}"),
        };
        match subaru {
            Value::Map(entries) => {
                assert_eq!(
                    entries,
                    &vec![(Value::str("eches"), Value::Map(vec![(Value::str("unmined"), Value::str("b"))]))]
                );
            }
            other => panic!("expected a map, got {other:?}"),
        }
    }
}
