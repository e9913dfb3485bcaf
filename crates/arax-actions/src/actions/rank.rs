//! rank_results: run the configured ranker on demand

use crate::ranker::Ranker;
use crate::registry::{check_params, Action};
use arax_core::{Parameters, Response};
use std::sync::Arc;

pub struct RankResults {
    ranker: Arc<dyn Ranker>,
}

impl RankResults {
    pub fn new(ranker: Arc<dyn Ranker>) -> Self {
        Self { ranker }
    }
}

#[async_trait::async_trait]
impl Action for RankResults {
    fn name(&self) -> &str {
        "rank_results"
    }

    fn description(&self) -> &str {
        "Score and reorder the results with the configured ranker."
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownParameter") {
            return Ok(());
        }
        self.ranker.score(response.message_mut())?;
        let n = response.message().results.len();
        response.info(format!("ranker '{}' scored {} results", self.ranker.name(), n));
        Ok(())
    }
}
