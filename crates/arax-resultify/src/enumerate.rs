//! Candidate subgraph enumeration and result construction.

use crate::adjacency::Adjacency;
use crate::error::MaterializeError;
use crate::validate::Bindings;
use arax_core::{EdgeBinding, KnowledgeGraph, NodeBinding, QueryGraph, QueryResult};
use std::collections::BTreeSet;

pub const RESULT_DESCRIPTION: &str = "No description available";

/// Cartesian product over per-qnode candidate lists. With no lists it
/// yields a single empty tuple.
pub struct Product<'a> {
    lists: Vec<Vec<&'a str>>,
    cursor: Vec<usize>,
    done: bool,
}

impl<'a> Product<'a> {
    pub fn new(lists: Vec<Vec<&'a str>>) -> Self {
        let done = lists.iter().any(|l| l.is_empty());
        Self {
            cursor: vec![0; lists.len()],
            lists,
            done,
        }
    }
}

impl<'a> Iterator for Product<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self
            .cursor
            .iter()
            .zip(&self.lists)
            .map(|(&i, list)| list[i])
            .collect();

        // Advance rightmost first, as itertools-style products do.
        let mut pos = self.lists.len();
        loop {
            if pos == 0 {
                self.done = true;
                break;
            }
            pos -= 1;
            self.cursor[pos] += 1;
            if self.cursor[pos] < self.lists[pos].len() {
                break;
            }
            self.cursor[pos] = 0;
        }
        Some(item)
    }
}

/// A candidate subgraph: (qnode key, KG node id) pairs.
type Subgraph<'a> = BTreeSet<(&'a str, &'a str)>;

pub struct Enumerator<'a> {
    pub kg: &'a KnowledgeGraph,
    pub qg: &'a QueryGraph,
    pub bindings: &'a Bindings<'a>,
    pub kg_adj: &'a Adjacency<'a>,
    pub qg_adj: &'a Adjacency<'a>,
    /// Set qnodes in query-graph order.
    pub set_qnodes: Vec<&'a str>,
    /// Choice qnodes in query-graph order.
    pub choice_qnodes: Vec<&'a str>,
    pub essence: Option<&'a str>,
}

impl<'a> Enumerator<'a> {
    pub fn run(&self) -> Result<Vec<QueryResult>, MaterializeError> {
        let lists: Vec<Vec<&'a str>> = self
            .choice_qnodes
            .iter()
            .map(|q| self.members(q).collect())
            .collect();
        let set_members: Subgraph<'a> = self
            .set_qnodes
            .iter()
            .flat_map(|q| self.members(q).map(move |k| (*q, k)))
            .collect();

        let mut results = Vec::new();
        for tuple in Product::new(lists) {
            let mut subgraph: Subgraph<'a> = self
                .choice_qnodes
                .iter()
                .copied()
                .zip(tuple)
                .collect();
            subgraph.extend(set_members.iter().copied());
            self.prune_set_members(&mut subgraph);
            results.push(self.build(&subgraph)?);
        }
        Ok(results)
    }

    fn members(&self, qnode: &str) -> impl Iterator<Item = &'a str> + 'a {
        let bindings: &'a Bindings<'a> = self.bindings;
        bindings
            .by_qnode
            .get(qnode)
            .into_iter()
            .flatten()
            .copied()
    }

    /// Drop set members with no KG neighbour among the subgraph's members of
    /// some adjacent qnode. One pass in query-graph order; a removal does
    /// not revisit members already kept.
    fn prune_set_members(&self, subgraph: &mut Subgraph<'a>) {
        for &set_qnode in &self.set_qnodes {
            let members: Vec<&str> = self.members(set_qnode).collect();
            for kg_id in members {
                if !subgraph.contains(&(set_qnode, kg_id)) {
                    continue;
                }
                let isolated = self.qg_adj.neighbors(set_qnode).any(|neighbor| {
                    !subgraph
                        .iter()
                        .filter(|(q, _)| *q == neighbor)
                        .any(|(_, other)| self.kg_adj.adjacent(kg_id, other))
                });
                if isolated {
                    subgraph.remove(&(set_qnode, kg_id));
                }
            }
        }
    }

    fn build(&self, subgraph: &Subgraph<'a>) -> Result<QueryResult, MaterializeError> {
        let mut node_bindings = Vec::with_capacity(subgraph.len());
        for qnode in &self.qg.nodes {
            node_bindings.extend(
                subgraph
                    .iter()
                    .filter(|(q, _)| *q == qnode.id)
                    .map(|(q, k)| NodeBinding {
                        qnode_key: q.to_string(),
                        kg_id: k.to_string(),
                    }),
            );
        }

        let present: BTreeSet<&str> = subgraph.iter().map(|(_, k)| *k).collect();
        let edge_bindings = self
            .kg
            .edges
            .iter()
            .filter(|e| {
                e.is_bound()
                    && present.contains(e.subject.as_str())
                    && present.contains(e.object.as_str())
            })
            .flat_map(|e| {
                e.qedge_keys.iter().map(move |key| EdgeBinding {
                    qedge_key: key.clone(),
                    kg_id: e.id.clone(),
                })
            })
            .collect();

        let (essence, essence_type) = self.essence_of(subgraph)?;
        Ok(QueryResult {
            node_bindings,
            edge_bindings,
            essence,
            essence_type,
            description: Some(RESULT_DESCRIPTION.to_string()),
            confidence: None,
        })
    }

    fn essence_of(
        &self,
        subgraph: &Subgraph<'a>,
    ) -> Result<(Option<String>, Option<String>), MaterializeError> {
        let Some(essence_qnode) = self.essence else {
            return Ok((None, None));
        };
        let bound: Vec<&str> = subgraph
            .iter()
            .filter(|(q, _)| *q == essence_qnode)
            .map(|(_, k)| *k)
            .collect();
        match bound.as_slice() {
            [] => Ok((None, None)),
            [kg_id] => {
                let Some(node) = self.bindings.nodes.get(kg_id) else {
                    return Ok((None, None));
                };
                let mut essence = node.name.clone().unwrap_or_else(|| node.id.clone());
                if let Some(symbol) = &node.symbol {
                    essence.push_str(&format!(" ({})", symbol));
                }
                Ok((Some(essence), node.categories.iter().next().cloned()))
            }
            many => Err(MaterializeError::AmbiguousEssence {
                qnode: essence_qnode.to_string(),
                count: many.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_of_nothing_is_one_empty_tuple() {
        let items: Vec<_> = Product::new(vec![]).collect();
        assert_eq!(items, vec![Vec::<&str>::new()]);
    }

    #[test]
    fn product_with_empty_list_is_empty() {
        assert_eq!(Product::new(vec![vec!["a"], vec![]]).count(), 0);
    }

    #[test]
    fn product_order() {
        let items: Vec<_> = Product::new(vec![vec!["a", "b"], vec!["x", "y"]]).collect();
        assert_eq!(
            items,
            vec![
                vec!["a", "x"],
                vec!["a", "y"],
                vec!["b", "x"],
                vec!["b", "y"]
            ]
        );
    }
}
