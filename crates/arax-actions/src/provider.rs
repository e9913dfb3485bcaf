//! Knowledge providers: the data source `expand` queries.

use arax_core::{Edge, KnowledgeGraph, Node, QNode, QEdge, QueryGraph};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("knowledge provider '{provider}' failed: {message}")]
    Failed { provider: String, message: String },

    #[error("failed to load knowledge source: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid knowledge source: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "KPError",
            Self::Io(_) | Self::Json(_) => "KPUnavailable",
        }
    }
}

/// Answers a query-graph fragment (one qedge with its two qnodes, or a
/// single pinned qnode) with KG elements already bound to the fragment's
/// qnode and qedge keys.
#[async_trait::async_trait]
pub trait KnowledgeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn answer(&self, fragment: &QueryGraph) -> Result<KnowledgeGraph, ProviderError>;
}

/// Serves fragments from a fixed, unbound graph.
///
/// A KG node matches a qnode when it carries one of the qnode's ids (if any)
/// and one of its categories (if any). An edge matches a qedge when its
/// predicate is allowed and its endpoints match the qedge's qnodes in
/// either orientation.
pub struct InMemoryKnowledgeProvider {
    name: String,
    graph: KnowledgeGraph,
}

impl InMemoryKnowledgeProvider {
    pub fn new(name: impl Into<String>, graph: KnowledgeGraph) -> Self {
        Self {
            name: name.into(),
            graph,
        }
    }

    /// Load a graph from a JSON file of the form `{"nodes": [...], "edges": [...]}`.
    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let raw = std::fs::read_to_string(path)?;
        let graph: KnowledgeGraph = serde_json::from_str(&raw)?;
        Ok(Self::new(name, graph))
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    fn node_matches(node: &Node, qnode: &QNode) -> bool {
        (qnode.ids.is_empty() || qnode.ids.contains(&node.id))
            && (qnode.categories.is_empty()
                || node.categories.iter().any(|c| qnode.categories.contains(c)))
    }

    fn predicate_matches(edge: &Edge, qedge: &QEdge) -> bool {
        qedge.predicates.is_empty()
            || edge
                .predicate
                .as_ref()
                .is_some_and(|p| qedge.predicates.contains(p))
    }

    fn bound_node(node: &Node, qnode_key: &str) -> Node {
        Node {
            qnode_keys: [qnode_key.to_string()].into_iter().collect(),
            ..node.clone()
        }
    }

    fn answer_edge(&self, fragment: &QueryGraph, qedge: &QEdge) -> KnowledgeGraph {
        let mut out = KnowledgeGraph::default();
        let (Some(qsubject), Some(qobject)) =
            (fragment.node(&qedge.subject), fragment.node(&qedge.object))
        else {
            return out;
        };

        for edge in &self.graph.edges {
            if !Self::predicate_matches(edge, qedge) {
                continue;
            }
            let (Some(subject), Some(object)) =
                (self.graph.node(&edge.subject), self.graph.node(&edge.object))
            else {
                continue;
            };
            let orientation = if Self::node_matches(subject, qsubject)
                && Self::node_matches(object, qobject)
            {
                Some((&qsubject.id, &qobject.id))
            } else if Self::node_matches(subject, qobject) && Self::node_matches(object, qsubject) {
                Some((&qobject.id, &qsubject.id))
            } else {
                None
            };
            let Some((subject_key, object_key)) = orientation else {
                continue;
            };
            out.merge_node(Self::bound_node(subject, subject_key));
            out.merge_node(Self::bound_node(object, object_key));
            out.merge_edge(Edge {
                qedge_keys: [qedge.id.clone()].into_iter().collect(),
                ..edge.clone()
            });
        }
        out
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for InMemoryKnowledgeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn answer(&self, fragment: &QueryGraph) -> Result<KnowledgeGraph, ProviderError> {
        let mut out = KnowledgeGraph::default();
        if fragment.edges.is_empty() {
            for qnode in &fragment.nodes {
                for node in self.graph.nodes.iter().filter(|n| Self::node_matches(n, qnode)) {
                    out.merge_node(Self::bound_node(node, &qnode.id));
                }
            }
        } else {
            for qedge in &fragment.edges {
                out.merge(self.answer_edge(fragment, qedge));
            }
        }
        debug!(
            provider = %self.name,
            nodes = out.nodes.len(),
            edges = out.edges.len(),
            "answered fragment"
        );
        Ok(out)
    }
}
