//! Result scoring. The executor runs the configured ranker right after
//! every successful `resultify`; `rank_results` runs it on demand.

use arax_core::Message;
use std::cmp::Ordering;

pub trait Ranker: Send + Sync {
    fn name(&self) -> &str;

    /// Set each result's confidence and reorder the results.
    fn score(&self, message: &mut Message) -> anyhow::Result<()>;
}

/// Confidence is the result's edge-binding count over the largest count in
/// the message. Results are sorted by descending confidence, stably.
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeSupportRanker;

impl Ranker for EdgeSupportRanker {
    fn name(&self) -> &str {
        "edge_support"
    }

    fn score(&self, message: &mut Message) -> anyhow::Result<()> {
        let max = message
            .results
            .iter()
            .map(|r| r.edge_bindings.len())
            .max()
            .unwrap_or(0);
        for result in &mut message.results {
            result.confidence = Some(if max == 0 {
                0.0
            } else {
                result.edge_bindings.len() as f64 / max as f64
            });
        }
        message.results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        Ok(())
    }
}
