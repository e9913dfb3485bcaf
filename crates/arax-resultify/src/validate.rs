//! Binding validation between the knowledge graph and the query graph.

use crate::error::MaterializeError;
use arax_core::{KnowledgeGraph, Node, QueryGraph};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Lookups produced by a successful validation.
#[derive(Debug)]
pub struct Bindings<'a> {
    pub nodes: HashMap<&'a str, &'a Node>,
    /// qnode key -> KG node ids bound to it.
    pub by_qnode: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> Bindings<'a> {
    /// Whether every qnode in the query graph has at least one bound KG node.
    pub fn covers(&self, qg: &QueryGraph) -> bool {
        qg.nodes
            .iter()
            .all(|q| self.by_qnode.get(q.id.as_str()).is_some_and(|s| !s.is_empty()))
    }
}

pub fn validate<'a>(
    kg: &'a KnowledgeGraph,
    qg: &'a QueryGraph,
    ignore_edge_direction: bool,
) -> Result<Bindings<'a>, MaterializeError> {
    let mut qnode_keys = BTreeSet::new();
    for qnode in &qg.nodes {
        if !qnode_keys.insert(qnode.id.as_str()) {
            return Err(MaterializeError::DuplicateQNode(qnode.id.clone()));
        }
    }
    for qedge in &qg.edges {
        for end in [&qedge.subject, &qedge.object] {
            if !qnode_keys.contains(end.as_str()) {
                return Err(MaterializeError::DanglingQEdge {
                    qedge: qedge.id.clone(),
                    qnode: end.clone(),
                });
            }
        }
    }

    let mut nodes = HashMap::with_capacity(kg.nodes.len());
    let mut by_qnode: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for node in &kg.nodes {
        if node.qnode_keys.is_empty() {
            return Err(MaterializeError::UnboundKgNode(node.id.clone()));
        }
        for key in &node.qnode_keys {
            if !qnode_keys.contains(key.as_str()) {
                return Err(MaterializeError::UnknownQNodeBinding {
                    kg_id: node.id.clone(),
                    qnode: key.clone(),
                });
            }
            by_qnode.entry(key.as_str()).or_default().insert(node.id.as_str());
        }
        nodes.insert(node.id.as_str(), node);
    }

    for edge in &kg.edges {
        for key in &edge.qedge_keys {
            if qg.edge(key).is_none() {
                return Err(MaterializeError::UnknownQEdgeBinding {
                    kg_id: edge.id.clone(),
                    qedge: key.clone(),
                });
            }
        }
        let mut ends = [None, None];
        for (slot, end) in ends.iter_mut().zip([&edge.subject, &edge.object]) {
            match nodes.get(end.as_str()) {
                Some(node) => *slot = Some(*node),
                None => {
                    return Err(MaterializeError::DanglingKgEdge {
                        kg_id: edge.id.clone(),
                        node: end.clone(),
                    })
                }
            }
        }
        if !edge.is_bound() {
            continue;
        }
        let (Some(subject), Some(object)) = (ends[0], ends[1]) else {
            continue;
        };

        let forward = qg.edges.iter().any(|q| {
            subject.qnode_keys.contains(&q.subject) && object.qnode_keys.contains(&q.object)
        });
        if forward {
            continue;
        }
        let backward = qg.edges.iter().any(|q| {
            subject.qnode_keys.contains(&q.object) && object.qnode_keys.contains(&q.subject)
        });
        match (backward, ignore_edge_direction) {
            (true, true) => {}
            (true, false) => {
                return Err(MaterializeError::DirectionMismatch {
                    kg_id: edge.id.clone(),
                })
            }
            (false, _) => {
                return Err(MaterializeError::DisconnectedBinding {
                    kg_id: edge.id.clone(),
                })
            }
        }
    }

    Ok(Bindings { nodes, by_qnode })
}
