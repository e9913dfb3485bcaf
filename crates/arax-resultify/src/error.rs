//! Materialization errors

use arax_core::ParamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("query node key '{0}' appears more than once")]
    DuplicateQNode(String),

    #[error("query edge '{qedge}' references unknown query node '{qnode}'")]
    DanglingQEdge { qedge: String, qnode: String },

    #[error("knowledge graph node '{0}' is not bound to any query node")]
    UnboundKgNode(String),

    #[error("knowledge graph node '{kg_id}' is bound to query node '{qnode}', which is not in the query graph")]
    UnknownQNodeBinding { kg_id: String, qnode: String },

    #[error("knowledge graph edge '{kg_id}' is bound to query edge '{qedge}', which is not in the query graph")]
    UnknownQEdgeBinding { kg_id: String, qedge: String },

    #[error("knowledge graph edge '{kg_id}' references node '{node}', which is not in the knowledge graph")]
    DanglingKgEdge { kg_id: String, node: String },

    #[error("knowledge graph edge '{kg_id}' runs opposite to the query edges between its endpoints' query nodes")]
    DirectionMismatch { kg_id: String },

    #[error("knowledge graph edge '{kg_id}' joins query nodes that no query edge connects")]
    DisconnectedBinding { kg_id: String },

    #[error("query node '{0}' has pinned ids and is_set=true; a specific query node cannot be a set")]
    SpecificSetConflict(String),

    #[error("{count} knowledge graph nodes are bound to essence query node '{qnode}' in one result")]
    AmbiguousEssence { qnode: String, count: usize },

    #[error("message already has {0} results; resultify requires an empty result list")]
    ResultsAlreadyPresent(usize),

    #[error(transparent)]
    Parameter(#[from] ParamError),
}

impl MaterializeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateQNode(_) | Self::DanglingQEdge { .. } => "InvalidQuery",
            Self::UnboundKgNode(_)
            | Self::UnknownQNodeBinding { .. }
            | Self::UnknownQEdgeBinding { .. }
            | Self::DanglingKgEdge { .. } => "InvalidKnowledgeGraph",
            Self::DirectionMismatch { .. } | Self::DisconnectedBinding { .. } => {
                "InconsistentBindings"
            }
            Self::SpecificSetConflict(_) => "EssenceError",
            Self::AmbiguousEssence { .. } => "AmbiguousEssence",
            Self::ResultsAlreadyPresent(_) => "ResultsAlreadyPresent",
            Self::Parameter(e) => e.code(),
        }
    }
}
