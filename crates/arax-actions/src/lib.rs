//! ARAX actions: the built-in steps of a processing plan
//!
//! Each action is a self-contained file in src/actions/.
//! To add an action: create the file, implement the Action trait, register
//! it below.

pub mod actions;
pub mod provider;
pub mod ranker;
pub mod registry;

pub use provider::{InMemoryKnowledgeProvider, KnowledgeProvider, ProviderError};
pub use ranker::{EdgeSupportRanker, Ranker};
pub use registry::{Action, ActionRegistry};

use std::sync::Arc;
use std::time::Duration;

/// Options for building the default registry.
#[derive(Clone, Debug, Default)]
pub struct RegistryOptions {
    /// Knowledge-provider timeout used when neither the request nor the
    /// `expand` parameters give one.
    pub default_kp_timeout: Option<Duration>,
}

/// Create the registry with every built-in action.
///
/// `filter` is registered as the legacy name of `filter_kg`.
pub fn create_default_registry(
    provider: Arc<dyn KnowledgeProvider>,
    ranker: Arc<dyn Ranker>,
) -> ActionRegistry {
    create_registry_with_options(provider, ranker, RegistryOptions::default())
}

pub fn create_registry_with_options(
    provider: Arc<dyn KnowledgeProvider>,
    ranker: Arc<dyn Ranker>,
    options: RegistryOptions,
) -> ActionRegistry {
    let mut registry = ActionRegistry::new();

    // --- Message and query graph construction ---
    registry.register(actions::message::CreateMessage);
    registry.register(actions::query_graph::AddQNode);
    registry.register(actions::query_graph::AddQEdge);

    // --- Knowledge graph population and annotation ---
    let mut expand = actions::expand::Expand::new(provider);
    if let Some(timeout) = options.default_kp_timeout {
        expand = expand.with_default_timeout(timeout);
    }
    registry.register(expand);
    registry.register(actions::overlay::Overlay);
    registry.register(actions::filter_kg::FilterKg);
    registry.alias("filter", "filter_kg");

    // --- Results ---
    registry.register(actions::resultify::Resultify);
    registry.register(actions::filter_results::FilterResults);
    registry.register(actions::rank::RankResults::new(ranker));

    registry
}
