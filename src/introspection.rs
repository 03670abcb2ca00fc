//! Read-only reflection over a built [`Graph`] (§2 ADDED — ambient module),
//! grounded on the teacher's `schema::position` accessor structs: typed,
//! read-only views over an already-validated schema, used by tooling and
//! tests that want to describe a graph without re-deriving its shape from
//! `NodeDef`/`Member` directly.

use crate::graph::{Graph, Member};
use crate::name::Name;
use crate::types::Cardinality;

/// One node's shape, as seen from the outside: its name and the name/kind
/// of each member.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeShape {
    pub name: Name,
    pub fields: Vec<Name>,
    pub links: Vec<LinkShape>,
}

/// One link member's shape: its target node and cardinality, for callers
/// that want to describe a graph (docs generators, schema diff tools)
/// without matching on `Member` themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkShape {
    pub name: Name,
    pub target: Name,
    pub cardinality: Cardinality,
}

/// Every node in `graph`, the distinguished root included, in declaration
/// order with the root last — mirroring `Graph::nodes()` plus `Graph::root()`.
pub fn node_shapes(graph: &Graph) -> Vec<NodeShape> {
    graph
        .nodes()
        .chain(std::iter::once(graph.root()))
        .map(|node| {
            let mut fields = Vec::new();
            let mut links = Vec::new();
            for member in node.members() {
                match member {
                    Member::Field(f) => fields.push(f.name.clone()),
                    Member::Link(l) => links.push(LinkShape {
                        name: l.name.clone(),
                        target: l.target.clone(),
                        cardinality: l.cardinality,
                    }),
                }
            }
            NodeShape {
                name: node.name.clone(),
                fields,
                links,
            }
        })
        .collect()
}

/// Every node name directly reachable from `from` via a link, for callers
/// building reachability/dependency graphs over the schema (e.g. a doc
/// generator wanting a DOT file) without re-walking `Member::Link` by hand.
pub fn reachable_from(graph: &Graph, from: &str) -> Vec<Name> {
    let Some(node) = graph.node(from) else {
        return Vec::new();
    };
    node.members()
        .filter_map(|m| match m {
            Member::Link(l) => Some(l.target.clone()),
            Member::Field(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FieldDef, GraphBuilder, LinkDef, NodeDef};
    use crate::resolve::test_support::{StubFieldResolver, StubLinkResolver};
    use std::sync::Arc;

    fn sample_graph() -> Graph {
        let ferulae =
            NodeDef::new("ferulae", [Member::Field(FieldDef::new("trilled", None, Arc::new(StubFieldResolver)))])
                .unwrap();
        let tergate = NodeDef::new(
            "tergate",
            [
                Member::Field(FieldDef::new("arion", None, Arc::new(StubFieldResolver))),
                Member::Link(LinkDef::new("traces", "ferulae", Cardinality::Many, Arc::new(StubLinkResolver))),
            ],
        )
        .unwrap();
        GraphBuilder::new().node(ferulae).unwrap().node(tergate).unwrap().build().unwrap()
    }

    #[test]
    fn node_shapes_lists_fields_and_links_per_node() {
        let graph = sample_graph();
        let shapes = node_shapes(&graph);
        let tergate = shapes.iter().find(|s| s.name.as_str() == "tergate").unwrap();
        assert_eq!(tergate.fields.len(), 1);
        assert_eq!(tergate.links.len(), 1);
        assert_eq!(tergate.links[0].target.as_str(), "ferulae");
        assert_eq!(tergate.links[0].cardinality, Cardinality::Many);
    }

    #[test]
    fn node_shapes_includes_the_root() {
        let graph = sample_graph();
        let shapes = node_shapes(&graph);
        assert!(shapes.iter().any(|s| s.name.as_str() == "__root__"));
    }

    #[test]
    fn reachable_from_lists_link_targets() {
        let graph = sample_graph();
        assert_eq!(reachable_from(&graph, "tergate"), vec![Name::new("ferulae")]);
        assert_eq!(reachable_from(&graph, "ferulae"), Vec::<Name>::new());
        assert_eq!(reachable_from(&graph, "missing"), Vec::<Name>::new());
    }
}
