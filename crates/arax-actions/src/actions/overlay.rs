//! overlay: annotate the knowledge graph with virtual edges

use crate::registry::{check_params, Action};
use arax_core::{Edge, KnowledgeGraph, Parameters, QEdge, Response};
use std::collections::{BTreeMap, BTreeSet};

pub const SHARES_NEIGHBOR: &str = "arax:shares_neighbor";

pub struct Overlay;

#[async_trait::async_trait]
impl Action for Overlay {
    fn name(&self) -> &str {
        "overlay"
    }

    fn description(&self) -> &str {
        "Add virtual edges to the knowledge graph (action=add_virtual_edge)."
    }

    fn allowed_parameters(&self) -> &[&'static str] {
        &[
            "action",
            "subject_qnode_key",
            "object_qnode_key",
            "virtual_relation_label",
        ]
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownParameter") {
            return Ok(());
        }
        match params.get_string("action").as_deref() {
            Some("add_virtual_edge") => add_virtual_edge(response, params),
            other => response.error(
                format!("unknown overlay action {:?}; supported: add_virtual_edge", other),
                "UnknownOverlayAction",
            ),
        }
        Ok(())
    }
}

/// Connect every subject/object KG node pair, bound to the given qnodes,
/// that shares at least one KG neighbour. The virtual qedge is named by
/// `virtual_relation_label`.
fn add_virtual_edge(response: &mut Response, params: &Parameters) {
    let (Some(subject_key), Some(object_key), Some(label)) = (
        params.get_string("subject_qnode_key"),
        params.get_string("object_qnode_key"),
        params.get_string("virtual_relation_label"),
    ) else {
        response.error(
            "add_virtual_edge requires subject_qnode_key, object_qnode_key and virtual_relation_label",
            "MissingParameter",
        );
        return;
    };

    let qedge = QEdge::new(label.clone(), subject_key.clone(), object_key.clone())
        .with_predicates([SHARES_NEIGHBOR]);
    if let Err(e) = response.message_mut().query_graph.add_edge(qedge) {
        response.error(e.to_string(), e.code());
        return;
    }

    let kg = &response.message().knowledge_graph;
    let mut neighbors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for edge in &kg.edges {
        if edge.subject == edge.object {
            continue;
        }
        neighbors.entry(edge.subject.as_str()).or_default().insert(edge.object.as_str());
        neighbors.entry(edge.object.as_str()).or_default().insert(edge.subject.as_str());
    }
    let empty = BTreeSet::new();

    let mut added = Vec::new();
    for subject in bound(kg, &subject_key) {
        let around_subject = neighbors.get(subject).unwrap_or(&empty);
        for object in bound(kg, &object_key) {
            if subject == object {
                continue;
            }
            let around_object = neighbors.get(object).unwrap_or(&empty);
            if around_subject.intersection(around_object).next().is_some() {
                added.push(
                    Edge::new(format!("{}_{}_{}", label, subject, object), subject, object)
                        .with_predicate(SHARES_NEIGHBOR)
                        .bound_to(label.clone()),
                );
            }
        }
    }

    let n = added.len();
    let kg = &mut response.message_mut().knowledge_graph;
    for edge in added {
        kg.merge_edge(edge);
    }
    response.info(format!("overlay added {} virtual edges as {}", n, label));
}

fn bound<'a>(kg: &'a KnowledgeGraph, qnode_key: &str) -> Vec<&'a str> {
    kg.nodes
        .iter()
        .filter(|n| n.qnode_keys.contains(qnode_key))
        .map(|n| n.id.as_str())
        .collect()
}
