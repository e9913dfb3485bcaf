//! filter_results: trim or reorder the result list

use crate::registry::{check_params, param, Action};
use arax_core::{Parameters, Response};
use std::cmp::Ordering;

pub struct FilterResults;

#[async_trait::async_trait]
impl Action for FilterResults {
    fn name(&self) -> &str {
        "filter_results"
    }

    fn description(&self) -> &str {
        "Limit or sort results (action=limit_number_of_results or sort_by_score)."
    }

    fn allowed_parameters(&self) -> &[&'static str] {
        &["action", "max_results", "direction"]
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()> {
        if !check_params(response, params, self.allowed_parameters(), "UnknownParameter") {
            return Ok(());
        }
        match params.get_string("action").as_deref() {
            Some("limit_number_of_results") => {
                let Some(max) = param(response, params.get_usize("max_results")) else {
                    return Ok(());
                };
                let Some(max) = max else {
                    response.error(
                        "limit_number_of_results requires max_results",
                        "MissingParameter",
                    );
                    return Ok(());
                };
                let results = &mut response.message_mut().results;
                let before = results.len();
                results.truncate(max);
                let after = results.len();
                response.info(format!("kept {} of {} results", after, before));
            }
            Some("sort_by_score") => {
                let descending = match params.get_string("direction").as_deref() {
                    None | Some("descending") | Some("d") => true,
                    Some("ascending") | Some("a") => false,
                    Some(other) => {
                        response.error(
                            format!("unknown sort direction '{}'", other),
                            "UnknownParameter",
                        );
                        return Ok(());
                    }
                };
                // Unscored results sort last either way.
                response.message_mut().results.sort_by(|a, b| {
                    match (a.confidence, b.confidence) {
                        (Some(x), Some(y)) => {
                            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                            if descending {
                                ord.reverse()
                            } else {
                                ord
                            }
                        }
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    }
                });
                response.debug("sorted results by score");
            }
            other => response.error(
                format!(
                    "unknown filter_results action {:?}; supported: limit_number_of_results, sort_by_score",
                    other
                ),
                "UnknownFilterResultsAction",
            ),
        }
        Ok(())
    }
}
