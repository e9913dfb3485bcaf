//! resultify: materialize results from the bound knowledge graph

use crate::registry::Action;
use arax_core::{Parameters, Response};
use arax_resultify::{resultify_response, ALLOWED_PARAMETERS};

pub struct Resultify;

#[async_trait::async_trait]
impl Action for Resultify {
    fn name(&self) -> &str {
        "resultify"
    }

    fn description(&self) -> &str {
        "Enumerate every knowledge-graph subgraph that satisfies the query graph."
    }

    fn allowed_parameters(&self) -> &[&'static str] {
        ALLOWED_PARAMETERS
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        // With debug=true a materialization error comes back as Err and
        // surfaces as a fault.
        resultify_response(response, params)?;
        Ok(())
    }
}
