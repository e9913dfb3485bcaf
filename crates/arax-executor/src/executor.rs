//! Pipeline executor: runs a request's actions in order over one message.
//!
//! Every action runs under a fault boundary: an `Err` or a panic from a
//! handler becomes an `UncaughtARAXiError` response. The first action that
//! leaves the response status not-OK ends the pipeline; mutations made
//! before that point stay. A successful `resultify` is always followed by
//! the ranker.
//!
//! In asynchronous mode the request is validated on the caller's path, then
//! a tokio task takes ownership of the message and the caller gets an ack.

use crate::callback::CallbackClient;
use crate::request::{parse_request, ActionCall, Operations, QueryRequest, RequestError, RETURN_COMMAND};
use crate::store::{parse_response_uri, response_uri, InMemoryStore, ResponseStore};
use crate::tracker::{InMemoryTracker, PipelineState, QueryTracker, TrackerEntry};
use arax_actions::{ActionRegistry, Ranker};
use arax_core::{Message, ParamError, Parameters, Response};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const UNCAUGHT_ERROR: &str = "UncaughtARAXiError";
pub const STATUS_RUNNING: &str = "Running";
pub const DEFAULT_BASE_URI: &str = "http://localhost:5000/api/arax/v1.4";

const RESULTIFY: &str = "resultify";

/// What `return` asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReturnParams {
    /// Persist the response to the store.
    pub store: bool,
    /// Include the message in the returned response; otherwise only its id.
    pub response: bool,
}

impl ReturnParams {
    pub const ALLOWED: &'static [&'static str] = &["store", "response", "message"];

    /// Defaults when the plan has no `return`: store only what succeeded.
    pub fn implicit(succeeded: bool) -> Self {
        Self {
            store: succeeded,
            response: true,
        }
    }

    /// `message` is accepted as the older name of `response`.
    pub fn parse(params: &Parameters) -> Result<Self, ParamError> {
        params.check_allowed(Self::ALLOWED)?;
        let store = params.get_bool("store")?.unwrap_or(true);
        let response = match params.get_bool("response")? {
            Some(r) => r,
            None => params.get_bool("message")?.unwrap_or(true),
        };
        Ok(Self { store, response })
    }
}

/// Outcome of `submit`.
pub enum Submission {
    Completed(Response),
    Running {
        ack: Response,
        handle: SubmissionHandle,
    },
}

impl Submission {
    /// The response the caller sees right away.
    pub fn response(&self) -> &Response {
        match self {
            Self::Completed(response) => response,
            Self::Running { ack, .. } => ack,
        }
    }
}

/// Completion signal for a background query.
pub struct SubmissionHandle {
    tracker_id: String,
    completion: oneshot::Receiver<Response>,
    task: JoinHandle<()>,
}

impl SubmissionHandle {
    pub fn tracker_id(&self) -> &str {
        &self.tracker_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the final response (after delivery, if any).
    pub async fn wait(self) -> Result<Response, oneshot::error::RecvError> {
        self.completion.await
    }
}

/// A validated request, ready to run.
struct Prepared {
    response: Response,
    actions: Vec<ActionCall>,
    returns: Option<ReturnParams>,
    callback: Option<String>,
    entry: TrackerEntry,
}

#[derive(Clone)]
pub struct Executor {
    registry: Arc<ActionRegistry>,
    ranker: Arc<dyn Ranker>,
    store: Arc<dyn ResponseStore>,
    tracker: Arc<dyn QueryTracker>,
    callback: CallbackClient,
    base_uri: String,
}

impl Executor {
    pub fn new(registry: ActionRegistry, ranker: Arc<dyn Ranker>) -> Self {
        Self {
            registry: Arc::new(registry),
            ranker,
            store: Arc::new(InMemoryStore::new()),
            tracker: Arc::new(InMemoryTracker::new()),
            callback: CallbackClient::default(),
            base_uri: DEFAULT_BASE_URI.to_string(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResponseStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn QueryTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_callback_client(mut self, callback: CallbackClient) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<dyn QueryTracker> {
        &self.tracker
    }

    /// Run `actions` over `message` and return the final response.
    pub async fn execute(&self, actions: Vec<ActionCall>, message: Message) -> Response {
        self.run(QueryRequest {
            message: Some(message),
            operations: Some(Operations {
                actions,
                message_uris: Vec::new(),
            }),
            ..Default::default()
        })
        .await
    }

    /// Run a request to completion on the caller's task, ignoring
    /// `asynchronous`. A callback, if given, is still delivered.
    pub async fn run(&self, request: QueryRequest) -> Response {
        match self.prepare(request).await {
            Ok(prepared) => self.run_prepared(prepared).await,
            Err(rejected) => rejected,
        }
    }

    /// Validate and decode a raw JSON request, then submit it.
    pub async fn submit_value(&self, value: serde_json::Value) -> Submission {
        match parse_request(value) {
            Ok(request) => self.submit(request).await,
            Err(e) => Submission::Completed(rejected(&e)),
        }
    }

    /// Run synchronously, or in the background when the request is
    /// asynchronous or names a callback.
    pub async fn submit(&self, request: QueryRequest) -> Submission {
        let background = request.is_async();
        let callback = request.callback.clone();
        let prepared = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err(rejected) => return Submission::Completed(rejected),
        };
        if !background {
            return Submission::Completed(self.run_prepared(prepared).await);
        }

        let tracker_id = prepared.entry.tracker_id.clone();
        let mut ack = Response::new();
        ack.envelope.status = STATUS_RUNNING.to_string();
        ack.tracker_id = Some(tracker_id.clone());
        ack.set_description(match &callback {
            Some(url) => format!("Query {} is running; the response will be posted to {}", tracker_id, url),
            None => format!("Query {} is running", tracker_id),
        });
        ack.info(format!("query {} accepted for background execution", tracker_id));

        let (tx, rx) = oneshot::channel();
        let executor = self.clone();
        let task = tokio::spawn(async move {
            let response = executor.run_prepared(prepared).await;
            // The caller may have dropped the handle.
            let _ = tx.send(response);
        });
        info!(tracker_id = %tracker_id, "query forked to background task");
        Submission::Running {
            ack,
            handle: SubmissionHandle {
                tracker_id,
                completion: rx,
                task,
            },
        }
    }

    /// Check the plan, resolve the starting message and open a tracker entry.
    async fn prepare(&self, request: QueryRequest) -> Result<Prepared, Response> {
        let actions = request.actions();
        let mut response = Response::new();
        response.envelope.query_options = request.query_options.clone();

        let returns = match actions.iter().find(|a| a.command == RETURN_COMMAND) {
            Some(call) => match ReturnParams::parse(&call.parameters) {
                Ok(returns) => Some(returns),
                Err(e) => {
                    response.error(format!("return: {}", e), e.code());
                    return Err(response);
                }
            },
            None => None,
        };

        for call in &actions {
            let Some(action) = self.registry.get(&call.command) else {
                continue;
            };
            if let Some(code) = action.request_shape_code() {
                if let Err(e) = call.parameters.check_allowed(action.allowed_parameters()) {
                    response.error(format!("{}: {}", call.command, e), code);
                    return Err(response);
                }
            }
        }

        let uris = request
            .operations
            .as_ref()
            .map(|ops| ops.message_uris.clone())
            .unwrap_or_default();
        let had_message = request.message.is_some();
        let mut message = request.message.unwrap_or_default();
        for (index, uri) in uris.iter().enumerate() {
            let stored = match parse_response_uri(uri) {
                Ok(id) => self.store.get(id).await,
                Err(e) => Err(e),
            };
            let stored = match stored {
                Ok(stored) => stored,
                Err(e) => {
                    response.error(e.to_string(), e.code());
                    return Err(response);
                }
            };
            if index == 0 && !had_message {
                message = stored.envelope.message;
            } else {
                message.knowledge_graph.merge(stored.envelope.message.knowledge_graph);
            }
            response.info(format!("loaded stored response {}", uri));
        }
        response.envelope.message = message;

        let entry = TrackerEntry::new(request.submitter.clone(), actions.len());
        response.tracker_id = Some(entry.tracker_id.clone());
        if let Err(e) = self.tracker.create(&entry).await {
            warn!(tracker_id = %entry.tracker_id, "could not record query: {}", e);
        }

        Ok(Prepared {
            response,
            actions,
            returns,
            callback: request.callback,
            entry,
        })
    }

    async fn run_prepared(&self, prepared: Prepared) -> Response {
        let Prepared {
            mut response,
            actions,
            returns,
            callback,
            mut entry,
        } = prepared;
        let tracker_id = entry.tracker_id.clone();

        self.advance(&mut entry, PipelineState::Running).await;
        info!(tracker_id = %tracker_id, n_actions = actions.len(), "query started");

        self.run_pipeline(&mut response, &actions, &tracker_id).await;
        self.finalize(&mut response, returns).await;

        if let Err(e) = entry.finish(&response) {
            warn!(tracker_id = %tracker_id, "{}", e);
        }

        if let Some(url) = callback {
            match self.callback.deliver(&url, &response.envelope).await {
                Ok(status) => response.info(format!("response posted to {} (HTTP {})", url, status)),
                Err(e) => response.error(e.to_string(), e.code()),
            }
        }

        if let Err(e) = self.tracker.update(&entry).await {
            warn!(tracker_id = %tracker_id, "could not update query record: {}", e);
        }
        info!(
            tracker_id = %tracker_id,
            status = response.status(),
            n_results = ?response.n_results,
            elapsed_ms = ?entry.elapsed_ms,
            "query finished"
        );
        response
    }

    /// Dispatch actions strictly in order until one fails or `return`.
    async fn run_pipeline(&self, response: &mut Response, actions: &[ActionCall], tracker_id: &str) {
        for (index, call) in actions.iter().enumerate() {
            let command = call.command.as_str();
            if command == RETURN_COMMAND {
                let skipped = actions.len() - index - 1;
                if skipped > 0 {
                    response.warning(format!("{} actions after return were not run", skipped));
                }
                break;
            }

            let Some(action) = self.registry.get(command) else {
                response.error(
                    format!("unrecognized command '{}'", command),
                    "UnrecognizedCommand",
                );
                break;
            };

            debug!(tracker_id, command, index, "dispatching action");
            let outcome = AssertUnwindSafe(action.apply(response, &call.parameters))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => response.error(format!("{} failed: {:#}", command, e), UNCAUGHT_ERROR),
                Err(panic) => response.error(
                    format!("{} panicked: {}", command, panic_message(panic.as_ref())),
                    UNCAUGHT_ERROR,
                ),
            }

            if command == RESULTIFY && response.is_ok() {
                self.rank(response);
            }
            if !response.is_ok() {
                warn!(
                    tracker_id,
                    command,
                    index,
                    code = response.status(),
                    "pipeline aborted"
                );
                break;
            }
        }
    }

    fn rank(&self, response: &mut Response) {
        let name = self.ranker.name().to_string();
        let ranker = &self.ranker;
        let message = response.message_mut();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| ranker.score(message)));
        match outcome {
            Ok(Ok(())) => response.debug(format!("ranker '{}' scored results", name)),
            Ok(Err(e)) => response.error(format!("ranker '{}' failed: {:#}", name, e), UNCAUGHT_ERROR),
            Err(panic) => response.error(
                format!("ranker '{}' panicked: {}", name, panic_message(panic.as_ref())),
                UNCAUGHT_ERROR,
            ),
        }
    }

    /// Apply `return`: summary line, storage, and message inclusion.
    async fn finalize(&self, response: &mut Response, returns: Option<ReturnParams>) {
        let ok = response.is_ok();
        let returns = returns.unwrap_or_else(|| ReturnParams::implicit(ok));

        if ok {
            let n = response.message().results.len();
            response.n_results = Some(n);
            response.set_description(format!("Normal completion with {} results", n));
        } else {
            response.n_results = None;
        }

        if returns.store {
            match self.store.put(response).await {
                Ok(id) => {
                    response.response_id = Some(id);
                    response.envelope.id = Some(response_uri(&self.base_uri, id));
                    response.debug(format!("stored response {} in {}", id, self.store.location()));
                }
                Err(e) => response.warning(format!("could not store response: {}", e)),
            }
        }

        if !returns.response {
            response.envelope.message = Message::default();
        }
    }

    async fn advance(&self, entry: &mut TrackerEntry, next: PipelineState) {
        if let Err(e) = entry.advance(next) {
            warn!(tracker_id = %entry.tracker_id, "{}", e);
            return;
        }
        if let Err(e) = self.tracker.update(entry).await {
            warn!(tracker_id = %entry.tracker_id, "could not update query record: {}", e);
        }
    }
}

/// Error response for a request that failed shape validation.
pub fn rejected(err: &RequestError) -> Response {
    let mut response = Response::new();
    response.error(err.to_string(), err.code());
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
