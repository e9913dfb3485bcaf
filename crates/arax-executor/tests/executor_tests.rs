//! Integration tests: pipeline dispatch, return handling, stored messages
//! and background delivery.

use arax_actions::*;
use arax_core::*;
use arax_executor::*;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

fn source_graph() -> KnowledgeGraph {
    KnowledgeGraph {
        nodes: vec![
            Node::new("DOID:12345")
                .named("some disease")
                .with_category("biolink:Disease"),
            Node::new("UniProtKB:P1")
                .named("protein one")
                .with_category("biolink:Protein"),
            Node::new("UniProtKB:P2")
                .named("protein two")
                .with_category("biolink:Protein"),
            Node::new("HP:1").with_category("biolink:PhenotypicFeature"),
            Node::new("HP:2").with_category("biolink:PhenotypicFeature"),
            Node::new("HP:3").with_category("biolink:PhenotypicFeature"),
        ],
        edges: vec![
            Edge::new("k1", "DOID:12345", "UniProtKB:P1"),
            Edge::new("k2", "DOID:12345", "UniProtKB:P2"),
            Edge::new("k3", "DOID:12345", "HP:1"),
            Edge::new("k4", "DOID:12345", "HP:2"),
            Edge::new("k5", "DOID:12345", "HP:3"),
        ],
    }
}

/// `source_graph` with the bindings `expand` would give it for `disease_query`.
fn bound_source_graph() -> KnowledgeGraph {
    let mut kg = source_graph();
    for node in &mut kg.nodes {
        let qnode = match node.id.split(':').next() {
            Some("DOID") => "n00",
            Some("UniProtKB") => "n01",
            _ => "n02",
        };
        node.qnode_keys.insert(qnode.to_string());
    }
    for edge in &mut kg.edges {
        let qedge = if edge.object.starts_with("UniProtKB") { "qe01" } else { "qe02" };
        edge.qedge_keys.insert(qedge.to_string());
    }
    kg
}

fn disease_query() -> QueryGraph {
    QueryGraph {
        nodes: vec![
            QNode::new("n00").with_ids(["DOID:12345"]),
            QNode::new("n01").with_categories(["biolink:Protein"]),
            QNode::new("n02")
                .with_categories(["biolink:PhenotypicFeature"])
                .set(true),
        ],
        edges: vec![
            QEdge::new("qe01", "n00", "n01"),
            QEdge::new("qe02", "n00", "n02"),
        ],
    }
}

/// Counts how many times it ran.
struct Recorder {
    name: &'static str,
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Action for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "records calls"
    }

    async fn apply(&self, response: &mut Response, _params: &Parameters) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        response
            .message_mut()
            .query_graph
            .nodes
            .push(QNode::new(format!("touched{}", self.calls.load(Ordering::SeqCst))));
        Ok(())
    }
}

struct Explode;

#[async_trait::async_trait]
impl Action for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    fn description(&self) -> &str {
        "always faults"
    }

    async fn apply(&self, _response: &mut Response, _params: &Parameters) -> anyhow::Result<()> {
        anyhow::bail!("provider connection reset")
    }
}

struct Panic;

#[async_trait::async_trait]
impl Action for Panic {
    fn name(&self) -> &str {
        "panic"
    }

    fn description(&self) -> &str {
        "always panics"
    }

    async fn apply(&self, _response: &mut Response, _params: &Parameters) -> anyhow::Result<()> {
        panic!("index out of range")
    }
}

struct SoftFail;

#[async_trait::async_trait]
impl Action for SoftFail {
    fn name(&self) -> &str {
        "soft_fail"
    }

    fn description(&self) -> &str {
        "reports an error on the response"
    }

    async fn apply(&self, response: &mut Response, _params: &Parameters) -> anyhow::Result<()> {
        response.error("no knowledge provider answered", "KPNotAvailable");
        Ok(())
    }
}

struct CountingRanker {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl Ranker for CountingRanker {
    fn name(&self) -> &str {
        "counting"
    }

    fn score(&self, message: &mut Message) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("ranker exploded");
        }
        for result in &mut message.results {
            result.confidence = Some(0.5);
        }
        Ok(())
    }
}

struct Harness {
    executor: Executor,
    store: Arc<InMemoryStore>,
    tracker: Arc<InMemoryTracker>,
    recorded: Arc<AtomicUsize>,
    ranked: Arc<AtomicUsize>,
}

fn harness_with(fail_ranker: bool) -> Harness {
    let recorded = Arc::new(AtomicUsize::new(0));
    let ranked = Arc::new(AtomicUsize::new(0));
    let ranker: Arc<dyn Ranker> = Arc::new(CountingRanker {
        calls: ranked.clone(),
        fail: fail_ranker,
    });
    let mut registry = create_default_registry(
        Arc::new(InMemoryKnowledgeProvider::new("memory", source_graph())),
        ranker.clone(),
    );
    registry.register(Recorder {
        name: "record",
        calls: recorded.clone(),
    });
    registry.register(Explode);
    registry.register(Panic);
    registry.register(SoftFail);

    let store = Arc::new(InMemoryStore::new());
    let tracker = Arc::new(InMemoryTracker::new());
    let executor = Executor::new(registry, ranker)
        .with_store(store.clone())
        .with_tracker(tracker.clone())
        .with_base_uri("http://arax.test/api");
    Harness {
        executor,
        store,
        tracker,
        recorded,
        ranked,
    }
}

fn harness() -> Harness {
    harness_with(false)
}

fn call(command: &str) -> ActionCall {
    ActionCall::new(command)
}

// ===========================================================================
// Pipeline abort
// ===========================================================================

#[tokio::test]
async fn fault_in_second_action_stops_the_third() {
    let h = harness();
    let response = h
        .executor
        .execute(
            vec![call("record"), call("explode"), call("record")],
            Message::default(),
        )
        .await;
    assert_eq!(response.status(), "UncaughtARAXiError");
    assert!(response.description().contains("provider connection reset"));
    assert_eq!(h.recorded.load(Ordering::SeqCst), 1);
    // The first action's mutation is kept.
    assert!(response.message().query_graph.node("touched1").is_some());
    assert_eq!(response.n_results, None);
}

#[tokio::test]
async fn panic_is_caught_at_the_boundary() {
    let h = harness();
    let response = h
        .executor
        .execute(vec![call("panic"), call("record")], Message::default())
        .await;
    assert_eq!(response.status(), "UncaughtARAXiError");
    assert!(response.description().contains("index out of range"));
    assert_eq!(h.recorded.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn error_status_keeps_its_code() {
    let h = harness();
    let response = h
        .executor
        .execute(
            vec![call("record"), call("soft_fail"), call("record")],
            Message::default(),
        )
        .await;
    assert_eq!(response.status(), "KPNotAvailable");
    assert_eq!(h.recorded.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_command_aborts() {
    let h = harness();
    let response = h
        .executor
        .execute(
            vec![call("record"), call("compute_magic"), call("record")],
            Message::default(),
        )
        .await;
    assert_eq!(response.status(), "UnrecognizedCommand");
    assert_eq!(h.recorded.load(Ordering::SeqCst), 1);
}

// ===========================================================================
// Resultify and the ranker
// ===========================================================================

#[tokio::test]
async fn message_only_request_runs_default_workflow() {
    let h = harness();
    let request = parse_request(json!({
        "message": {"query_graph": serde_json::to_value(disease_query()).unwrap()}
    }))
    .unwrap();
    let response = h.executor.run(request).await;
    assert!(response.is_ok(), "{}", response.description());
    assert_eq!(response.n_results, Some(2));
    assert_eq!(response.description(), "Normal completion with 2 results");
    assert_eq!(h.ranked.load(Ordering::SeqCst), 1);
    assert!(response
        .message()
        .results
        .iter()
        .all(|r| r.confidence == Some(0.5)));
}

#[tokio::test]
async fn ranker_runs_after_every_resultify() {
    let h = harness();
    let actions = vec![
        call("create_message"),
        call("add_qnode").with("key", "n00").with("ids", "DOID:12345"),
        call("add_qnode").with("key", "n01").with("categories", "biolink:Protein"),
        call("add_qedge").with("key", "qe01").with("subject", "n00").with("object", "n01"),
        call("expand"),
        call("resultify"),
        call("filter_results")
            .with("action", "limit_number_of_results")
            .with("max_results", 1),
    ];
    let response = h.executor.execute(actions, Message::default()).await;
    assert!(response.is_ok(), "{}", response.description());
    assert_eq!(h.ranked.load(Ordering::SeqCst), 1);
    assert_eq!(response.n_results, Some(1));
}

#[tokio::test]
async fn ranker_failure_is_uncaught_error() {
    let h = harness_with(true);
    let message = Message {
        query_graph: QueryGraph {
            nodes: vec![QNode::new("n0")],
            edges: vec![],
        },
        knowledge_graph: KnowledgeGraph {
            nodes: vec![Node::new("X").bound_to("n0")],
            edges: vec![],
        },
        results: vec![],
    };
    let response = h
        .executor
        .execute(vec![call("resultify"), call("record")], message)
        .await;
    assert_eq!(response.status(), "UncaughtARAXiError");
    assert!(response.description().contains("ranker exploded"));
    assert_eq!(h.recorded.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resultify_error_in_plan() {
    let h = harness();
    let mut qg = disease_query();
    qg.nodes[0].is_set = true;
    let message = Message {
        query_graph: qg,
        knowledge_graph: bound_source_graph(),
        results: vec![],
    };
    let response = h
        .executor
        .execute(vec![call("resultify"), call("record")], message)
        .await;
    assert_eq!(response.status(), "EssenceError");
    assert_eq!(h.ranked.load(Ordering::SeqCst), 0);
    assert_eq!(h.recorded.load(Ordering::SeqCst), 0);
}

// ===========================================================================
// Return and storage
// ===========================================================================

#[tokio::test]
async fn implicit_return_stores_success() {
    let h = harness();
    let response = h.executor.execute(vec![call("record")], Message::default()).await;
    assert!(response.is_ok());
    assert_eq!(response.response_id, Some(1));
    assert_eq!(
        response.envelope.id.as_deref(),
        Some("http://arax.test/api/response/1")
    );
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn failure_is_not_stored_by_default() {
    let h = harness();
    let response = h.executor.execute(vec![call("explode")], Message::default()).await;
    assert!(!response.is_ok());
    assert_eq!(response.response_id, None);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn explicit_return_controls_store_and_message() {
    let h = harness();
    let response = h
        .executor
        .execute(
            vec![
                call("record"),
                call("return").with("store", "true").with("response", "false"),
                call("record"),
            ],
            Message::default(),
        )
        .await;
    assert!(response.is_ok());
    assert_eq!(h.recorded.load(Ordering::SeqCst), 1);
    assert!(response.message().query_graph.is_empty());
    assert_eq!(response.response_id, Some(1));

    let stored = h.store.get(1).await.unwrap();
    assert!(stored.message().query_graph.node("touched1").is_some());
}

#[tokio::test]
async fn explicit_store_applies_after_failure() {
    let h = harness();
    let response = h
        .executor
        .execute(
            vec![call("explode"), call("return").with("store", true)],
            Message::default(),
        )
        .await;
    assert_eq!(response.status(), "UncaughtARAXiError");
    assert_eq!(response.response_id, Some(1));
}

#[tokio::test]
async fn bad_return_parameters_reject_the_plan() {
    let h = harness();
    let response = h
        .executor
        .execute(
            vec![call("record"), call("return").with("store", "perhaps")],
            Message::default(),
        )
        .await;
    assert_eq!(response.status(), "ParseBoolError");
    assert_eq!(h.recorded.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_qnode_property_rejects_before_running() {
    let h = harness();
    let response = h
        .executor
        .execute(
            vec![
                call("record"),
                call("add_qnode").with("key", "n0").with("colour", "red"),
            ],
            Message::default(),
        )
        .await;
    assert_eq!(response.status(), "UnknownQNodeProperty");
    assert_eq!(h.recorded.load(Ordering::SeqCst), 0);
    assert_eq!(response.tracker_id, None);
}

// ===========================================================================
// Stored messages
// ===========================================================================

#[tokio::test]
async fn message_uris_resume_from_store() {
    let h = harness();
    let first = h
        .executor
        .execute(
            vec![
                call("add_qnode").with("key", "n00").with("ids", "DOID:12345"),
                call("add_qnode").with("key", "n01").with("categories", "biolink:Protein"),
                call("add_qedge").with("key", "qe01").with("subject", "n00").with("object", "n01"),
                call("expand"),
            ],
            Message::default(),
        )
        .await;
    let uri = first.envelope.id.clone().unwrap();

    let request = parse_request(json!({
        "operations": {"message_uris": [uri], "actions": [{"command": "resultify"}]}
    }))
    .unwrap();
    let second = h.executor.run(request).await;
    assert!(second.is_ok(), "{}", second.description());
    assert_eq!(second.n_results, Some(2));
}

#[tokio::test]
async fn bad_message_uris() {
    let h = harness();
    let request = |uri: &str| {
        parse_request(json!({"operations": {"message_uris": [uri], "actions": []}})).unwrap()
    };
    let response = h.executor.run(request("http://arax.test/api/response/99")).await;
    assert_eq!(response.status(), "ResponseNotFound");
    let response = h.executor.run(request("http://arax.test/api/message/1")).await;
    assert_eq!(response.status(), "UnrecognizedMessageUri");
}

#[tokio::test]
async fn shape_errors_run_nothing() {
    let h = harness();
    let submission = h
        .executor
        .submit_value(json!({"operations": {"actions": [{"command": "record", "parameters": "x=1"}]}}))
        .await;
    let Submission::Completed(response) = submission else {
        panic!("expected a completed submission");
    };
    assert_eq!(response.status(), "ParametersNotDict");
    assert_eq!(h.recorded.load(Ordering::SeqCst), 0);
}

// ===========================================================================
// Tracking
// ===========================================================================

#[tokio::test]
async fn tracker_records_lifecycle() {
    let h = harness();
    let response = h.executor.execute(vec![call("record")], Message::default()).await;
    let tracker_id = response.tracker_id.clone().unwrap();
    let entry = h.tracker.get(&tracker_id).await.unwrap().unwrap();
    assert_eq!(entry.status, TrackerStatus::Completed);
    assert_eq!(entry.pipeline_state, PipelineState::DoneOk);
    assert_eq!(entry.n_actions, 1);
    assert_eq!(entry.n_results, Some(0));
    assert_eq!(entry.response_id, Some(1));

    let failed = h.executor.execute(vec![call("explode")], Message::default()).await;
    let entry = h
        .tracker
        .get(failed.tracker_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, TrackerStatus::Error);
    assert_eq!(entry.message_code.as_deref(), Some("UncaughtARAXiError"));
    assert_eq!(h.tracker.list().await.unwrap().len(), 2);
}

// ===========================================================================
// Background execution and callback delivery
// ===========================================================================

async fn receive(State(tx): State<mpsc::Sender<Value>>, Json(body): Json<Value>) -> StatusCode {
    let _ = tx.send(body).await;
    StatusCode::OK
}

async fn reject(Json(_body): Json<Value>) -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Callback receiver on an ephemeral port. Returns its base URL.
async fn callback_server() -> (String, mpsc::Receiver<Value>) {
    let (tx, rx) = mpsc::channel(4);
    let app = Router::new()
        .route("/callback", post(receive))
        .route("/broken", post(reject))
        .with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), rx)
}

#[tokio::test]
async fn async_submission_posts_to_callback() {
    let h = harness();
    let (base, mut received) = callback_server().await;
    let request = parse_request(json!({
        "message": {"query_graph": serde_json::to_value(disease_query()).unwrap()},
        "callback": format!("{}/callback", base),
        "submitter": "test-suite"
    }))
    .unwrap();

    let Submission::Running { ack, handle } = h.executor.submit(request).await else {
        panic!("expected a background submission");
    };
    assert_eq!(ack.status(), "Running");
    assert_eq!(ack.tracker_id.as_deref(), Some(handle.tracker_id()));
    let tracker_id = handle.tracker_id().to_string();

    let final_response = handle.wait().await.unwrap();
    assert!(final_response.is_ok(), "{}", final_response.description());
    assert_eq!(final_response.n_results, Some(2));

    let posted = received.recv().await.unwrap();
    assert_eq!(posted["status"], "OK");
    assert_eq!(posted["message"]["results"].as_array().unwrap().len(), 2);

    let entry = h.tracker.get(&tracker_id).await.unwrap().unwrap();
    assert_eq!(entry.status, TrackerStatus::Completed);
    assert_eq!(entry.submitter.as_deref(), Some("test-suite"));
}

#[tokio::test]
async fn rejected_callback_is_unreachable_and_not_retried() {
    let h = harness();
    let (base, _received) = callback_server().await;
    let mut request = QueryRequest::from_actions(vec![call("record")]);
    request.callback = Some(format!("{}/broken", base));

    let Submission::Running { handle, .. } = h.executor.submit(request).await else {
        panic!("expected a background submission");
    };
    let tracker_id = handle.tracker_id().to_string();
    let final_response = handle.wait().await.unwrap();
    assert_eq!(final_response.status(), "UnreachableCallback");
    assert_eq!(h.recorded.load(Ordering::SeqCst), 1);

    let entry = h.tracker.get(&tracker_id).await.unwrap().unwrap();
    assert_eq!(entry.status, TrackerStatus::Completed);
    assert_eq!(entry.message_code.as_deref(), Some("OK"));
}

async fn unavailable(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

#[tokio::test]
async fn failed_delivery_is_attempted_once() {
    let h = harness();
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/callback", post(unavailable))
        .with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut request = QueryRequest::from_actions(vec![call("record")]);
    request.callback = Some(format!("http://{}/callback", addr));
    let Submission::Running { handle, .. } = h.executor.submit(request).await else {
        panic!("expected a background submission");
    };
    let final_response = handle.wait().await.unwrap();
    assert_eq!(final_response.status(), "UnreachableCallback");
    assert!(final_response.description().contains("503"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let h = harness();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut request = QueryRequest::from_actions(vec![call("record")]);
    request.callback = Some(format!("http://{}/callback", addr));
    let Submission::Running { handle, .. } = h.executor.submit(request).await else {
        panic!("expected a background submission");
    };
    let tracker_id = handle.tracker_id().to_string();
    while !handle.is_finished() {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let final_response = handle.wait().await.unwrap();
    assert_eq!(final_response.status(), "UnreachableCallback");
    assert_eq!(h.recorded.load(Ordering::SeqCst), 1);

    let entry = h.tracker.get(&tracker_id).await.unwrap().unwrap();
    assert_eq!(entry.status, TrackerStatus::Completed);
    assert_eq!(entry.pipeline_state, PipelineState::DoneOk);
}

#[tokio::test]
async fn asynchronous_without_callback_completes_via_handle() {
    let h = harness();
    let mut request = QueryRequest::from_actions(vec![call("record")]);
    request.asynchronous = true;
    let Submission::Running { handle, .. } = h.executor.submit(request).await else {
        panic!("expected a background submission");
    };
    let response = handle.wait().await.unwrap();
    assert!(response.is_ok());
    assert_eq!(h.recorded.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shape_error_never_forks() {
    let h = harness();
    let submission = h
        .executor
        .submit_value(json!({"callback": "http://127.0.0.1:9/cb"}))
        .await;
    assert!(matches!(submission, Submission::Completed(_)));
    assert_eq!(submission.response().status(), "NoQueryMessageOrOperations");
}
