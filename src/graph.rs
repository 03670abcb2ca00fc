//! The schema graph (component B): typed declaration of nodes, fields,
//! links and options. Grounded on the teacher's
//! `type_specification::{TypeSpecification, ObjectTypeSpecification}`
//! builder pattern (`check_or_add` against a schema under construction),
//! generalized here into a `GraphBuilder` that assembles a fresh `Graph`
//! rather than augmenting an existing `apollo_compiler` schema, and on
//! `query_graph::mod` for using `petgraph` to validate that every `TypeRef`
//! edge in the declared members lands on a real node.
//!
//! Member/option lists are taken as plain iterables rather than pre-built
//! maps, so a caller handing in two options named the same thing is a
//! checked `SchemaError::DuplicateOption`, not silently dropped by the
//! underlying map's own key uniqueness.

use crate::error::SchemaError;
use crate::name::Name;
use crate::resolve::{FieldResolver, LinkResolver};
use crate::types::{Cardinality, FieldType};
use crate::value::Value;
use indexmap::map::Entry;
use indexmap::IndexMap;
use petgraph::graph::DiGraph;
use std::sync::Arc;

pub const ROOT_NAME: &str = "__root__";

#[derive(Clone)]
pub struct OptionDef {
    pub name: Name,
    pub ty: Option<FieldType>,
    pub default: Option<Value>,
}

impl OptionDef {
    pub fn required(name: impl Into<Name>) -> Self {
        OptionDef {
            name: name.into(),
            ty: None,
            default: None,
        }
    }

    pub fn with_default(name: impl Into<Name>, default: Value) -> Self {
        OptionDef {
            name: name.into(),
            ty: None,
            default: Some(default),
        }
    }
}

fn build_option_map(
    owner: &Name,
    options: impl IntoIterator<Item = OptionDef>,
) -> Result<IndexMap<Name, OptionDef>, SchemaError> {
    let mut map = IndexMap::new();
    for option in options {
        match map.entry(option.name.clone()) {
            Entry::Occupied(_) => {
                return Err(SchemaError::DuplicateOption {
                    owner: owner.clone(),
                    option: option.name,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(option);
            }
        }
    }
    Ok(map)
}

#[derive(Clone)]
pub struct FieldDef {
    pub name: Name,
    /// `None` for an opaque field — not further projected by the
    /// denormalizer (§3).
    pub ty: Option<FieldType>,
    pub options: IndexMap<Name, OptionDef>,
    pub context_aware: bool,
    pub resolver: Arc<dyn FieldResolver>,
}

impl FieldDef {
    pub fn new(
        name: impl Into<Name>,
        ty: Option<FieldType>,
        resolver: Arc<dyn FieldResolver>,
    ) -> Self {
        let name = name.into();
        FieldDef {
            name,
            ty,
            options: IndexMap::new(),
            context_aware: false,
            resolver,
        }
    }

    pub fn with_options(
        mut self,
        options: impl IntoIterator<Item = OptionDef>,
    ) -> Result<Self, SchemaError> {
        self.options = build_option_map(&self.name, options)?;
        Ok(self)
    }

    pub fn context_aware(mut self) -> Self {
        self.context_aware = true;
        self
    }
}

#[derive(Clone)]
pub struct LinkDef {
    pub name: Name,
    pub target: Name,
    pub cardinality: Cardinality,
    /// The field on the containing node whose value(s) feed the link
    /// resolver, or `None` if the link is self-sufficient (§3).
    pub requires: Option<Name>,
    pub options: IndexMap<Name, OptionDef>,
    pub context_aware: bool,
    pub resolver: Arc<dyn LinkResolver>,
}

impl LinkDef {
    pub fn new(
        name: impl Into<Name>,
        target: impl Into<Name>,
        cardinality: Cardinality,
        resolver: Arc<dyn LinkResolver>,
    ) -> Self {
        LinkDef {
            name: name.into(),
            target: target.into(),
            cardinality,
            requires: None,
            options: IndexMap::new(),
            context_aware: false,
            resolver,
        }
    }

    pub fn requires(mut self, field: impl Into<Name>) -> Self {
        self.requires = Some(field.into());
        self
    }

    pub fn with_options(
        mut self,
        options: impl IntoIterator<Item = OptionDef>,
    ) -> Result<Self, SchemaError> {
        self.options = build_option_map(&self.name, options)?;
        Ok(self)
    }

    pub fn context_aware(mut self) -> Self {
        self.context_aware = true;
        self
    }
}

#[derive(Clone)]
pub enum Member {
    Field(FieldDef),
    Link(LinkDef),
}

impl Member {
    pub fn name(&self) -> &Name {
        match self {
            Member::Field(f) => &f.name,
            Member::Link(l) => &l.name,
        }
    }

    pub fn options(&self) -> &IndexMap<Name, OptionDef> {
        match self {
            Member::Field(f) => &f.options,
            Member::Link(l) => &l.options,
        }
    }

    pub fn context_aware(&self) -> bool {
        match self {
            Member::Field(f) => f.context_aware,
            Member::Link(l) => l.context_aware,
        }
    }
}

#[derive(Clone)]
pub struct NodeDef {
    pub name: Name,
    members: IndexMap<Name, Member>,
}

impl NodeDef {
    pub fn new(
        name: impl Into<Name>,
        members: impl IntoIterator<Item = Member>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut map = IndexMap::new();
        for member in members {
            match map.entry(member.name().clone()) {
                Entry::Occupied(_) => {
                    return Err(SchemaError::DuplicateMember {
                        node: name.clone(),
                        member: member.name().clone(),
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(member);
                }
            }
        }
        Ok(NodeDef { name, members: map })
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        match self.members.get(name)? {
            Member::Field(f) => Some(f),
            Member::Link(_) => None,
        }
    }

    pub fn link(&self, name: &str) -> Option<&LinkDef> {
        match self.members.get(name)? {
            Member::Link(l) => Some(l),
            Member::Field(_) => None,
        }
    }
}

pub struct Graph {
    nodes: IndexMap<Name, NodeDef>,
    root: NodeDef,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn root(&self) -> &NodeDef {
        &self.root
    }

    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.values()
    }
}

pub struct GraphBuilder {
    nodes: IndexMap<Name, NodeDef>,
    root: Option<NodeDef>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder {
            nodes: IndexMap::new(),
            root: None,
        }
    }

    pub fn node(mut self, node: NodeDef) -> Result<Self, SchemaError> {
        match self.nodes.entry(node.name.clone()) {
            Entry::Occupied(_) => Err(SchemaError::DuplicateNode(node.name)),
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(self)
            }
        }
    }

    pub fn root(mut self, node: NodeDef) -> Self {
        self.root = Some(node);
        self
    }

    pub fn build(self) -> Result<Graph, SchemaError> {
        let root = match self.root {
            Some(root) => root,
            None => NodeDef::new(ROOT_NAME, [])?,
        };
        let graph = Graph {
            nodes: self.nodes,
            root,
        };
        validate(&graph)?;
        Ok(graph)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        GraphBuilder::new()
    }
}

/// Checks the remaining invariants from §3 that survive past construction:
/// every `TypeRef[T]` resolves to a node in the graph, and `requires` names
/// a field (not a link) that exists on the containing node. (Member-name
/// and option-name uniqueness are enforced earlier, at `NodeDef`/`FieldDef`/
/// `LinkDef` construction time.)
///
/// Builds a `petgraph::DiGraph` of node-name -> node-name edges for every
/// `TypeRef`/link target along the way, mirroring how the teacher's
/// `query_graph` module represents the schema as a
/// `petgraph::graph::DiGraph` rather than as bespoke adjacency lists. The
/// resulting graph isn't retained — it's exposed read-only via
/// `introspection` for callers who want to traverse reachability — but
/// building it here means a dangling edge is caught in the same pass.
fn validate(graph: &Graph) -> Result<(), SchemaError> {
    let mut edges = DiGraph::<Name, ()>::new();
    let mut index_of = IndexMap::new();
    for node in graph.nodes().chain(std::iter::once(&graph.root)) {
        let idx = edges.add_node(node.name.clone());
        index_of.insert(node.name.clone(), idx);
    }

    for node in graph.nodes().chain(std::iter::once(&graph.root)) {
        for member in node.members() {
            match member {
                Member::Field(field) => {
                    if let Some(ty) = &field.ty {
                        for type_ref in ty.type_refs() {
                            if !index_of.contains_key(type_ref) {
                                return Err(SchemaError::DanglingTypeRef {
                                    from: field.name.clone(),
                                    type_ref: type_ref.clone(),
                                });
                            }
                            edges.add_edge(index_of[&node.name], index_of[type_ref], ());
                        }
                    }
                }
                Member::Link(link) => {
                    if !index_of.contains_key(&link.target) {
                        return Err(SchemaError::DanglingTypeRef {
                            from: link.name.clone(),
                            type_ref: link.target.clone(),
                        });
                    }
                    edges.add_edge(index_of[&node.name], index_of[&link.target], ());

                    if let Some(requires) = &link.requires {
                        match node.member(requires) {
                            Some(Member::Field(_)) => {}
                            Some(Member::Link(_)) => {
                                return Err(SchemaError::RequiresNotAField {
                                    node: node.name.clone(),
                                    link: link.name.clone(),
                                    field: requires.clone(),
                                });
                            }
                            None => {
                                return Err(SchemaError::DanglingRequires {
                                    node: node.name.clone(),
                                    link: link.name.clone(),
                                    field: requires.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
