//! arax-resultify: result materialization
//!
//! Turns a knowledge graph whose nodes and edges carry query-graph bindings
//! into the list of results: every candidate subgraph consistent with the
//! query graph, one per combination of choice-node bindings, with set nodes
//! contributing all of their (connected) members as a group.

pub mod adjacency;
pub mod enumerate;
pub mod error;
pub mod essence;
pub mod validate;

pub use enumerate::RESULT_DESCRIPTION;
pub use error::MaterializeError;
pub use essence::essence_qnode;

use adjacency::Adjacency;
use arax_core::{KnowledgeGraph, Message, Parameters, QueryGraph, QueryResult, Response};
use enumerate::Enumerator;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Parameter names `resultify` accepts.
pub const ALLOWED_PARAMETERS: &[&str] = &["ignore_edge_direction", "force_isset_false", "debug"];

#[derive(Clone, Debug)]
pub struct MaterializeOptions {
    /// Qnodes to enumerate one-by-one even though they have `is_set`.
    pub force_isset_false: BTreeSet<String>,
    pub ignore_edge_direction: bool,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            force_isset_false: BTreeSet::new(),
            ignore_edge_direction: true,
        }
    }
}

/// How a resultify failure reaches the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Record the error on the response and return normally.
    #[default]
    Wrap,
    /// Return the error itself (test harnesses).
    Propagate,
}

/// Parsed `resultify` parameters.
#[derive(Clone, Debug, Default)]
pub struct ResultifyParams {
    pub options: MaterializeOptions,
    pub mode: ErrorMode,
}

impl ResultifyParams {
    pub fn parse(params: &Parameters) -> Result<Self, MaterializeError> {
        params.check_allowed(ALLOWED_PARAMETERS)?;
        let mut options = MaterializeOptions::default();
        if let Some(ignore) = params.get_bool("ignore_edge_direction")? {
            options.ignore_edge_direction = ignore;
        }
        options.force_isset_false = params.get_list("force_isset_false").into_iter().collect();
        let mode = match params.get_bool("debug")? {
            Some(true) => ErrorMode::Propagate,
            _ => ErrorMode::Wrap,
        };
        Ok(Self { options, mode })
    }
}

/// Enumerate all results for `kg` against `qg`.
///
/// Validation failures are errors. A query graph with an unbound qnode is
/// not: it yields no results.
pub fn materialize(
    kg: &KnowledgeGraph,
    qg: &QueryGraph,
    options: &MaterializeOptions,
) -> Result<Vec<QueryResult>, MaterializeError> {
    if kg.is_empty() && qg.is_empty() {
        return Ok(Vec::new());
    }

    let bindings = validate::validate(kg, qg, options.ignore_edge_direction)?;
    let essence = essence_qnode(qg)?;
    if !bindings.covers(qg) {
        info!(
            qnodes = qg.nodes.len(),
            bound = bindings.by_qnode.len(),
            "query graph not fulfilled by knowledge graph"
        );
        return Ok(Vec::new());
    }

    let kg_adj = Adjacency::for_knowledge_graph(kg);
    let qg_adj = Adjacency::for_query_graph(qg);
    let mut set_qnodes = Vec::new();
    let mut choice_qnodes = Vec::new();
    for qnode in &qg.nodes {
        if qnode.is_set && !options.force_isset_false.contains(&qnode.id) {
            set_qnodes.push(qnode.id.as_str());
        } else {
            choice_qnodes.push(qnode.id.as_str());
        }
    }

    debug!(
        sets = ?set_qnodes,
        choices = ?choice_qnodes,
        essence = ?essence,
        "enumerating candidate subgraphs"
    );

    let enumerator = Enumerator {
        kg,
        qg,
        bindings: &bindings,
        kg_adj: &kg_adj,
        qg_adj: &qg_adj,
        set_qnodes,
        choice_qnodes,
        essence: essence.as_deref(),
    };
    enumerator.run()
}

/// Materialize results into `message`. The message must not already have
/// results. Returns the number produced.
pub fn resultify_message(
    message: &mut Message,
    options: &MaterializeOptions,
) -> Result<usize, MaterializeError> {
    if !message.results.is_empty() {
        return Err(MaterializeError::ResultsAlreadyPresent(message.results.len()));
    }
    let results = materialize(&message.knowledge_graph, &message.query_graph, options)?;
    let n = results.len();
    message.results = results;
    Ok(n)
}

/// Run resultify against a response, honouring the error mode in `params`.
///
/// Parameter errors are reported the same way as validation errors: on the
/// response in `Wrap` mode, returned in `Propagate` mode.
pub fn resultify_response(
    response: &mut Response,
    params: &Parameters,
) -> Result<(), MaterializeError> {
    let mode = match params.get_bool("debug") {
        Ok(Some(true)) => ErrorMode::Propagate,
        _ => ErrorMode::Wrap,
    };
    let outcome = ResultifyParams::parse(params)
        .and_then(|p| resultify_message(response.message_mut(), &p.options));
    match outcome {
        Ok(n) => {
            response.info(format!("resultify produced {} results", n));
            response.n_results = Some(n);
            Ok(())
        }
        Err(e) if mode == ErrorMode::Propagate => Err(e),
        Err(e) => {
            response.error(e.to_string(), e.code());
            Ok(())
        }
    }
}
