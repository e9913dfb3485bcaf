//! expand: fill the knowledge graph from a knowledge provider

use crate::provider::KnowledgeProvider;
use crate::registry::{check_params, param, Action};
use arax_core::{KnowledgeGraph, Parameters, QueryGraph, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Expand {
    provider: Arc<dyn KnowledgeProvider>,
    default_timeout: Option<Duration>,
}

impl Expand {
    pub fn new(provider: Arc<dyn KnowledgeProvider>) -> Self {
        Self {
            provider,
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// One fragment per requested qedge, plus one per requested qnode.
    /// With no keys given: every qedge, or every qnode when there are no
    /// edges.
    fn fragments(
        qg: &QueryGraph,
        edge_keys: &[String],
        node_keys: &[String],
    ) -> Result<Vec<(String, QueryGraph)>, String> {
        let mut fragments = Vec::new();
        let edges: Vec<&str> = if edge_keys.is_empty() && node_keys.is_empty() {
            qg.edges.iter().map(|e| e.id.as_str()).collect()
        } else {
            edge_keys.iter().map(String::as_str).collect()
        };
        for key in edges {
            let qedge = qg.edge(key).ok_or_else(|| format!("unknown qedge key '{}'", key))?;
            let nodes = [&qedge.subject, &qedge.object]
                .into_iter()
                .filter_map(|k| qg.node(k).cloned())
                .collect();
            fragments.push((
                key.to_string(),
                QueryGraph {
                    nodes,
                    edges: vec![qedge.clone()],
                },
            ));
        }

        let nodes: Vec<&str> = if node_keys.is_empty() && edge_keys.is_empty() && qg.edges.is_empty() {
            qg.nodes.iter().map(|n| n.id.as_str()).collect()
        } else {
            node_keys.iter().map(String::as_str).collect()
        };
        for key in nodes {
            let qnode = qg.node(key).ok_or_else(|| format!("unknown qnode key '{}'", key))?;
            fragments.push((
                key.to_string(),
                QueryGraph {
                    nodes: vec![qnode.clone()],
                    edges: vec![],
                },
            ));
        }
        Ok(fragments)
    }
}

#[async_trait::async_trait]
impl Action for Expand {
    fn name(&self) -> &str {
        "expand"
    }

    fn description(&self) -> &str {
        "Query the knowledge provider for each query edge (or pinned query node) and merge the answers into the knowledge graph."
    }

    fn allowed_parameters(&self) -> &[&'static str] {
        &["edge_key", "node_key", "kp", "kp_timeout"]
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownParameter") {
            return Ok(());
        }
        let Some(param_timeout) = param(response, params.get_usize("kp_timeout")) else {
            return Ok(());
        };
        if let Some(kp) = params.get_string("kp") {
            if kp != self.provider.name() {
                response.warning(format!(
                    "kp '{}' is not configured; using '{}'",
                    kp,
                    self.provider.name()
                ));
            }
        }
        let timeout = param_timeout
            .map(|s| Duration::from_secs(s as u64))
            .or_else(|| {
                response
                    .envelope
                    .query_options
                    .kp_timeout
                    .map(Duration::from_secs)
            })
            .or(self.default_timeout);

        let fragments = match Self::fragments(
            &response.message().query_graph,
            &params.get_list("edge_key"),
            &params.get_list("node_key"),
        ) {
            Ok(f) => f,
            Err(message) => {
                response.error(message, "UnknownQGraphKey");
                return Ok(());
            }
        };
        if fragments.is_empty() {
            response.warning("expand: query graph is empty, nothing to expand");
            return Ok(());
        }

        for (key, fragment) in fragments {
            let answer = match timeout {
                Some(limit) => match tokio::time::timeout(limit, self.provider.answer(&fragment)).await {
                    Ok(answer) => answer,
                    Err(_) => {
                        warn!(key = %key, timeout_secs = limit.as_secs(), "knowledge provider timed out");
                        response.warning(format!(
                            "{} timed out after {}s while expanding {}",
                            self.provider.name(),
                            limit.as_secs(),
                            key
                        ));
                        continue;
                    }
                },
                None => self.provider.answer(&fragment).await,
            };
            let kg: KnowledgeGraph = match answer {
                Ok(kg) => kg,
                Err(e) => {
                    response.error(e.to_string(), e.code());
                    return Ok(());
                }
            };
            info!(
                key = %key,
                provider = self.provider.name(),
                nodes = kg.nodes.len(),
                edges = kg.edges.len(),
                "expanded"
            );
            response.info(format!(
                "expand {}: {} nodes, {} edges from {}",
                key,
                kg.nodes.len(),
                kg.edges.len(),
                self.provider.name()
            ));
            response.message_mut().knowledge_graph.merge(kg);
        }
        Ok(())
    }
}
