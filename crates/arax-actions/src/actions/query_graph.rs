//! add_qnode / add_qedge: build the query graph one element at a time

use crate::registry::{check_params, param, Action};
use arax_core::{Parameters, QEdge, QNode, Response};

pub struct AddQNode;

#[async_trait::async_trait]
impl Action for AddQNode {
    fn name(&self) -> &str {
        "add_qnode"
    }

    fn description(&self) -> &str {
        "Add a query node. Without a key the next free n00, n01, ... is used."
    }

    fn allowed_parameters(&self) -> &[&'static str] {
        &["key", "ids", "categories", "is_set", "option_group_id"]
    }

    fn request_shape_code(&self) -> Option<&'static str> {
        Some("UnknownQNodeProperty")
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownQNodeProperty") {
            return Ok(());
        }
        let Some(is_set) = param(response, params.get_bool("is_set")) else {
            return Ok(());
        };

        let qg = &response.message().query_graph;
        let key = params.get_string("key").unwrap_or_else(|| qg.next_key("n"));
        let mut qnode = QNode::new(key.clone())
            .with_ids(params.get_list("ids"))
            .with_categories(params.get_list("categories"))
            .set(is_set.unwrap_or(false));
        qnode.option_group_id = params.get_string("option_group_id");

        match response.message_mut().query_graph.add_node(qnode) {
            Ok(()) => response.debug(format!("added qnode {}", key)),
            Err(e) => response.error(e.to_string(), e.code()),
        }
        Ok(())
    }
}

pub struct AddQEdge;

#[async_trait::async_trait]
impl Action for AddQEdge {
    fn name(&self) -> &str {
        "add_qedge"
    }

    fn description(&self) -> &str {
        "Add a query edge between two existing query nodes. Without a key the next free e00, e01, ... is used."
    }

    fn allowed_parameters(&self) -> &[&'static str] {
        &["key", "subject", "object", "predicates", "exclude", "option_group_id"]
    }

    fn request_shape_code(&self) -> Option<&'static str> {
        Some("UnknownQEdgeProperty")
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownQEdgeProperty") {
            return Ok(());
        }
        let (Some(subject), Some(object)) = (params.get_string("subject"), params.get_string("object"))
        else {
            response.error(
                "add_qedge requires both subject and object",
                "MissingParameter",
            );
            return Ok(());
        };
        let Some(exclude) = param(response, params.get_bool("exclude")) else {
            return Ok(());
        };

        let qg = &response.message().query_graph;
        let key = params.get_string("key").unwrap_or_else(|| qg.next_key("e"));
        let mut qedge =
            QEdge::new(key.clone(), subject, object).with_predicates(params.get_list("predicates"));
        qedge.exclude = exclude.unwrap_or(false);
        qedge.option_group_id = params.get_string("option_group_id");

        match response.message_mut().query_graph.add_edge(qedge) {
            Ok(()) => response.debug(format!("added qedge {}", key)),
            Err(e) => response.error(e.to_string(), e.code()),
        }
        Ok(())
    }
}
