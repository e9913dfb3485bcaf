//! create_message: start over with an empty message

use crate::registry::{check_params, Action};
use arax_core::{Message, Parameters, Response};

pub struct CreateMessage;

#[async_trait::async_trait]
impl Action for CreateMessage {
    fn name(&self) -> &str {
        "create_message"
    }

    fn description(&self) -> &str {
        "Reset the message to an empty query graph, knowledge graph and result list."
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownParameter") {
            return Ok(());
        }
        *response.message_mut() = Message::default();
        response.debug("created empty message");
        Ok(())
    }
}
