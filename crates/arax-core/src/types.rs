//! Query graph, knowledge graph and result types

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A constraint attached to a query node. Evaluated by filtering actions,
/// carried through untouched by the core.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub operator: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub not: bool,
}

/// Query graph node: a typed pattern a KG node can bind to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct QNode {
    pub id: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// Pinned identifiers. A qnode with any is "specific".
    #[serde(default)]
    pub ids: BTreeSet<String>,
    #[serde(default)]
    pub is_set: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl QNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn set(mut self, is_set: bool) -> Self {
        self.is_set = is_set;
        self
    }

    pub fn is_specific(&self) -> bool {
        !self.ids.is_empty()
    }
}

/// Query graph edge between two qnodes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct QEdge {
    pub id: String,
    pub subject: String,
    pub object: String,
    #[serde(default)]
    pub predicates: BTreeSet<String>,
    #[serde(default)]
    pub exclude: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_group_id: Option<String>,
}

impl QEdge {
    pub fn new(id: impl Into<String>, subject: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            object: object.into(),
            ..Default::default()
        }
    }

    pub fn with_predicates<I, S>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicates
            .extend(predicates.into_iter().map(Into::into));
        self
    }
}

/// The query graph. Node order is significant: essence selection uses it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryGraph {
    #[serde(default)]
    pub nodes: Vec<QNode>,
    #[serde(default)]
    pub edges: Vec<QEdge>,
}

impl QueryGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&QNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&QEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn add_node(&mut self, node: QNode) -> Result<()> {
        if self.node(&node.id).is_some() {
            return Err(Error::DuplicateQNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Add an edge; both endpoints must already be in the graph.
    pub fn add_edge(&mut self, edge: QEdge) -> Result<()> {
        if self.edge(&edge.id).is_some() {
            return Err(Error::DuplicateQEdge(edge.id));
        }
        for end in [&edge.subject, &edge.object] {
            if self.node(end).is_none() {
                return Err(Error::UnknownQNodeKey(end.clone()));
            }
        }
        self.edges.push(edge);
        Ok(())
    }

    /// First unused key of the form `{prefix}00`, `{prefix}01`, ...
    pub fn next_key(&self, prefix: &str) -> String {
        (0..)
            .map(|i| format!("{}{:02}", prefix, i))
            .find(|k| self.node(k).is_none() && self.edge(k).is_none())
            .unwrap_or_else(|| format!("{}{}", prefix, self.nodes.len() + self.edges.len()))
    }
}

/// Knowledge graph node, bound to one or more qnodes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "key_set")]
    pub qnode_keys: BTreeSet<String>,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn bound_to(mut self, qnode_key: impl Into<String>) -> Self {
        self.qnode_keys.insert(qnode_key.into());
        self
    }
}

/// Knowledge graph edge. An empty `qedge_keys` set is a real edge with no
/// pattern binding: it counts for connectivity but is never a result edge.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Edge {
    pub id: String,
    pub subject: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default, deserialize_with = "key_set")]
    pub qedge_keys: BTreeSet<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, subject: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            object: object.into(),
            ..Default::default()
        }
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn bound_to(mut self, qedge_key: impl Into<String>) -> Self {
        self.qedge_keys.insert(qedge_key.into());
        self
    }

    pub fn is_bound(&self) -> bool {
        !self.qedge_keys.is_empty()
    }
}

/// Binding sets arrive with `null` members from some providers; drop them.
fn key_set<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let keys: Option<Vec<Option<String>>> = Option::deserialize(deserializer)?;
    Ok(keys.unwrap_or_default().into_iter().flatten().collect())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl KnowledgeGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Insert a node, or union its bindings and categories into the existing one.
    pub fn merge_node(&mut self, node: Node) {
        match self.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => {
                existing.qnode_keys.extend(node.qnode_keys);
                existing.categories.extend(node.categories);
                if existing.name.is_none() {
                    existing.name = node.name;
                }
                if existing.symbol.is_none() {
                    existing.symbol = node.symbol;
                }
            }
            None => self.nodes.push(node),
        }
    }

    pub fn merge_edge(&mut self, edge: Edge) {
        match self.edges.iter_mut().find(|e| e.id == edge.id) {
            Some(existing) => existing.qedge_keys.extend(edge.qedge_keys),
            None => self.edges.push(edge),
        }
    }

    pub fn merge(&mut self, other: KnowledgeGraph) {
        for node in other.nodes {
            self.merge_node(node);
        }
        for edge in other.edges {
            self.merge_edge(edge);
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeBinding {
    pub qnode_key: String,
    pub kg_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeBinding {
    pub qedge_key: String,
    pub kg_id: String,
}

/// One concrete subgraph of the KG satisfying the query graph.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryResult {
    pub node_bindings: Vec<NodeBinding>,
    pub edge_bindings: Vec<EdgeBinding>,
    #[serde(default)]
    pub essence: Option<String>,
    #[serde(default)]
    pub essence_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl QueryResult {
    /// KG node ids bound to `qnode_key` in this result.
    pub fn nodes_for(&self, qnode_key: &str) -> Vec<&str> {
        self.node_bindings
            .iter()
            .filter(|b| b.qnode_key == qnode_key)
            .map(|b| b.kg_id.as_str())
            .collect()
    }

    pub fn edges_for(&self, qedge_key: &str) -> Vec<&str> {
        self.edge_bindings
            .iter()
            .filter(|b| b.qedge_key == qedge_key)
            .map(|b| b.kg_id.as_str())
            .collect()
    }
}

/// The mutable query state threaded through the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Message {
    #[serde(default)]
    pub query_graph: QueryGraph,
    #[serde(default)]
    pub knowledge_graph: KnowledgeGraph,
    #[serde(default)]
    pub results: Vec<QueryResult>,
}

/// Caller-supplied options that travel with the envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryOptions {
    /// Knowledge-provider timeout in seconds, threaded to `expand`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kp_timeout: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
