//! filter_kg: prune nodes from the knowledge graph

use crate::registry::{check_params, Action};
use arax_core::{KnowledgeGraph, Node, Parameters, Response};
use std::collections::BTreeSet;

pub struct FilterKg;

enum Mode {
    Orphans(Option<String>),
    Category(String),
}

#[async_trait::async_trait]
impl Action for FilterKg {
    fn name(&self) -> &str {
        "filter_kg"
    }

    fn description(&self) -> &str {
        "Remove knowledge-graph nodes (action=remove_orphaned_nodes or remove_nodes_by_category)."
    }

    fn allowed_parameters(&self) -> &[&'static str] {
        &["action", "node_category"]
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownParameter") {
            return Ok(());
        }
        let category = params.get_string("node_category");
        let mode = match params.get_string("action").as_deref() {
            Some("remove_orphaned_nodes") => Mode::Orphans(category),
            Some("remove_nodes_by_category") => match category {
                Some(category) => Mode::Category(category),
                None => {
                    response.error(
                        "remove_nodes_by_category requires node_category",
                        "MissingParameter",
                    );
                    return Ok(());
                }
            },
            other => {
                response.error(
                    format!(
                        "unknown filter_kg action {:?}; supported: remove_orphaned_nodes, remove_nodes_by_category",
                        other
                    ),
                    "UnknownFilterKgAction",
                );
                return Ok(());
            }
        };
        let kg = &mut response.message_mut().knowledge_graph;
        let removed = match mode {
            Mode::Orphans(category) => remove_orphans(kg, category.as_deref()),
            Mode::Category(category) => remove_where(kg, |n| n.categories.contains(&category)),
        };
        response.info(format!("filter_kg removed {} nodes", removed));
        Ok(())
    }
}

/// Nodes with no incident edge, optionally limited to one category.
fn remove_orphans(kg: &mut KnowledgeGraph, category: Option<&str>) -> usize {
    let touched: BTreeSet<String> = kg
        .edges
        .iter()
        .flat_map(|e| [e.subject.clone(), e.object.clone()])
        .collect();
    remove_where(kg, |n| {
        !touched.contains(&n.id) && category.map_or(true, |c| n.categories.contains(c))
    })
}

/// Drop matching nodes and every edge incident to them.
fn remove_where(kg: &mut KnowledgeGraph, doomed: impl Fn(&Node) -> bool) -> usize {
    let removed: BTreeSet<String> = kg
        .nodes
        .iter()
        .filter(|n| doomed(n))
        .map(|n| n.id.clone())
        .collect();
    kg.nodes.retain(|n| !removed.contains(&n.id));
    kg.edges
        .retain(|e| !removed.contains(&e.subject) && !removed.contains(&e.object));
    removed.len()
}
