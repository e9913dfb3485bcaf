//! Essence query-node selection.
//!
//! One qnode per query graph is designated the essence; each result then
//! names the KG node bound to it. The heuristic prefers leaves that are
//! neither pinned nor sets, and among several picks the one farthest from the pinned
//! end of the query. Ties go to the later qnode in query-graph order.

use crate::adjacency::Adjacency;
use crate::error::MaterializeError;
use arax_core::QueryGraph;
use std::collections::BTreeMap;

pub fn essence_qnode(qg: &QueryGraph) -> Result<Option<String>, MaterializeError> {
    if let Some(conflict) = qg.nodes.iter().find(|q| q.is_specific() && q.is_set) {
        return Err(MaterializeError::SpecificSetConflict(conflict.id.clone()));
    }

    let adj = Adjacency::for_query_graph(qg);
    let position: BTreeMap<&str, usize> = qg
        .nodes
        .iter()
        .enumerate()
        .map(|(i, q)| (q.id.as_str(), i))
        .collect();

    let free: Vec<&str> = qg
        .nodes
        .iter()
        .filter(|q| !q.is_specific() && !q.is_set)
        .map(|q| q.id.as_str())
        .collect();
    let free_leaves: Vec<&str> = free
        .iter()
        .copied()
        .filter(|k| adj.degree(k) == 1)
        .collect();
    let candidates = if free_leaves.is_empty() { free } else { free_leaves };

    match candidates.as_slice() {
        [] => return Ok(None),
        [only] => return Ok(Some(only.to_string())),
        _ => {}
    }

    let specific: Vec<&str> = qg
        .nodes
        .iter()
        .filter(|q| q.is_specific())
        .map(|q| q.id.as_str())
        .collect();
    let specific_leaves: Vec<&str> = specific
        .iter()
        .copied()
        .filter(|k| adj.degree(k) == 1)
        .collect();

    let chosen = if !specific_leaves.is_empty() {
        let maps: Vec<_> = specific_leaves
            .iter()
            .map(|leaf| adj.distances_from(leaf))
            .collect();
        // Distance to the nearest specific leaf; unreachable counts as 0.
        farthest(&candidates, &position, |c| {
            maps.iter().filter_map(|m| m.get(c).copied()).min().unwrap_or(0)
        })
    } else if let [anchor] = specific.as_slice() {
        let start = position[anchor];
        farthest(&candidates, &position, |c| position[c].abs_diff(start))
    } else {
        candidates.last().copied()
    };

    Ok(chosen.map(str::to_string))
}

/// Candidate with the highest score, ties broken toward the later position.
fn farthest<'a>(
    candidates: &[&'a str],
    position: &BTreeMap<&str, usize>,
    score: impl Fn(&str) -> usize,
) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .max_by_key(|c| (score(c), position[c]))
}
