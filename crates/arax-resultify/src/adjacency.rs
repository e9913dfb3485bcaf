//! Adjacency maps over the query graph and the knowledge graph.

use arax_core::{KnowledgeGraph, QueryGraph};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Directed in/out maps plus an undirected map. Self-loops appear in the
/// directed maps only.
#[derive(Debug, Default)]
pub struct Adjacency<'a> {
    pub out: BTreeMap<&'a str, BTreeSet<&'a str>>,
    pub incoming: BTreeMap<&'a str, BTreeSet<&'a str>>,
    pub both: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> Adjacency<'a> {
    fn build(
        nodes: impl Iterator<Item = &'a str>,
        edges: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut adj = Self::default();
        for node in nodes {
            adj.out.entry(node).or_default();
            adj.incoming.entry(node).or_default();
            adj.both.entry(node).or_default();
        }
        for (subject, object) in edges {
            adj.out.entry(subject).or_default().insert(object);
            adj.incoming.entry(object).or_default().insert(subject);
            if subject != object {
                adj.both.entry(subject).or_default().insert(object);
                adj.both.entry(object).or_default().insert(subject);
            }
        }
        adj
    }

    pub fn for_query_graph(qg: &'a QueryGraph) -> Self {
        Self::build(
            qg.nodes.iter().map(|n| n.id.as_str()),
            qg.edges
                .iter()
                .map(|e| (e.subject.as_str(), e.object.as_str())),
        )
    }

    pub fn for_knowledge_graph(kg: &'a KnowledgeGraph) -> Self {
        Self::build(
            kg.nodes.iter().map(|n| n.id.as_str()),
            kg.edges
                .iter()
                .map(|e| (e.subject.as_str(), e.object.as_str())),
        )
    }

    pub fn neighbors(&self, node: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.both.get(node).into_iter().flatten().copied()
    }

    pub fn degree(&self, node: &str) -> usize {
        self.both.get(node).map_or(0, |n| n.len())
    }

    pub fn adjacent(&self, a: &str, b: &str) -> bool {
        self.both.get(a).is_some_and(|n| n.contains(b))
    }

    /// Undirected hop distances from `start`. Unreachable nodes are absent.
    pub fn distances_from(&self, start: &'a str) -> BTreeMap<&'a str, usize> {
        let mut dist = BTreeMap::new();
        dist.insert(start, 0);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let next = dist[node] + 1;
            for neighbor in self.neighbors(node) {
                if !dist.contains_key(neighbor) {
                    dist.insert(neighbor, next);
                    queue.push_back(neighbor);
                }
            }
        }
        dist
    }
}
