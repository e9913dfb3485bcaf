//! Tests for arax-resultify: enumeration, set handling, essence and validation

use arax_core::*;
use arax_resultify::*;
use serde_json::json;

fn opts() -> MaterializeOptions {
    MaterializeOptions::default()
}

/// Disease n00 (pinned), proteins n01 (choice), phenotypes n02 (set).
fn disease_fixture() -> (KnowledgeGraph, QueryGraph) {
    let qg = QueryGraph {
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
    };
    let kg = KnowledgeGraph {
        nodes: vec![
            Node::new("DOID:12345")
                .named("some disease")
                .with_category("biolink:Disease")
                .bound_to("n00"),
            Node::new("UniProtKB:P1")
                .named("protein one")
                .with_category("biolink:Protein")
                .bound_to("n01"),
            Node::new("UniProtKB:P2")
                .named("protein two")
                .with_category("biolink:Protein")
                .bound_to("n01"),
            Node::new("HP:1").bound_to("n02"),
            Node::new("HP:2").bound_to("n02"),
            Node::new("HP:3").bound_to("n02"),
        ],
        edges: vec![
            Edge::new("ke01", "DOID:12345", "UniProtKB:P1").bound_to("qe01"),
            Edge::new("ke02", "DOID:12345", "UniProtKB:P2").bound_to("qe01"),
            Edge::new("ke03", "DOID:12345", "HP:1").bound_to("qe02"),
            Edge::new("ke04", "DOID:12345", "HP:2").bound_to("qe02"),
            Edge::new("ke05", "DOID:12345", "HP:3").bound_to("qe02"),
        ],
    };
    (kg, qg)
}

// ===========================================================================
// Cardinality
// ===========================================================================

#[test]
fn disease_fixture_gives_two_results() {
    let (kg, qg) = disease_fixture();
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.nodes_for("n00"), vec!["DOID:12345"]);
        assert_eq!(r.nodes_for("n01").len(), 1);
        assert_eq!(r.nodes_for("n02"), vec!["HP:1", "HP:2", "HP:3"]);
        assert_eq!(r.edges_for("qe01").len(), 1);
        assert_eq!(r.edges_for("qe02").len(), 3);
        assert_eq!(r.description.as_deref(), Some(RESULT_DESCRIPTION));
    }
    let proteins: Vec<_> = results.iter().map(|r| r.nodes_for("n01")[0]).collect();
    assert_eq!(proteins, vec!["UniProtKB:P1", "UniProtKB:P2"]);
}

#[test]
fn cardinality_law_n_choices_m_set_members() {
    let qg = QueryGraph {
        nodes: vec![
            QNode::new("a").with_ids(["A"]),
            QNode::new("c"),
            QNode::new("s").set(true),
        ],
        edges: vec![QEdge::new("ac", "a", "c"), QEdge::new("as", "a", "s")],
    };
    let mut kg = KnowledgeGraph::default();
    kg.nodes.push(Node::new("A").bound_to("a"));
    for i in 0..4 {
        kg.nodes.push(Node::new(format!("C{}", i)).bound_to("c"));
        kg.edges
            .push(Edge::new(format!("ac{}", i), "A", format!("C{}", i)).bound_to("ac"));
    }
    for i in 0..5 {
        kg.nodes.push(Node::new(format!("S{}", i)).bound_to("s"));
        kg.edges
            .push(Edge::new(format!("as{}", i), "A", format!("S{}", i)).bound_to("as"));
    }
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.nodes_for("s").len() == 5));
}

#[test]
fn force_isset_false_enumerates_set_members() {
    let (kg, qg) = disease_fixture();
    let mut options = opts();
    options.force_isset_false.insert("n02".into());
    let results = materialize(&kg, &qg, &options).unwrap();
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.nodes_for("n02").len() == 1));
}

#[test]
fn only_set_nodes_give_one_result() {
    let qg = QueryGraph {
        nodes: vec![QNode::new("s").set(true)],
        edges: vec![],
    };
    let kg = KnowledgeGraph {
        nodes: vec![Node::new("X").bound_to("s"), Node::new("Y").bound_to("s")],
        edges: vec![],
    };
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].nodes_for("s"), vec!["X", "Y"]);
    assert_eq!(results[0].essence, None);
}

// ===========================================================================
// Empty and unfulfilled inputs
// ===========================================================================

#[test]
fn empty_graphs_give_no_results() {
    let results =
        materialize(&KnowledgeGraph::default(), &QueryGraph::default(), &opts()).unwrap();
    assert!(results.is_empty());
}

#[test]
fn unfulfilled_query_graph_gives_no_results() {
    let (mut kg, qg) = disease_fixture();
    kg.nodes.retain(|n| !n.qnode_keys.contains("n02"));
    kg.edges.retain(|e| !e.qedge_keys.contains("qe02"));
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert!(results.is_empty());
}

// ===========================================================================
// Set-member pruning
// ===========================================================================

#[test]
fn disconnected_set_member_is_pruned() {
    let (mut kg, qg) = disease_fixture();
    // HP:4 is bound to the set node but has no edge to the disease.
    kg.nodes.push(Node::new("HP:4").bound_to("n02"));
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| !r.nodes_for("n02").contains(&"HP:4")));
}

#[test]
fn unbound_edge_counts_for_connectivity_only() {
    let (mut kg, qg) = disease_fixture();
    kg.nodes.push(Node::new("HP:4").bound_to("n02"));
    kg.edges.push(Edge::new("raw", "HP:4", "DOID:12345"));
    let results = materialize(&kg, &qg, &opts()).unwrap();
    for r in &results {
        assert!(r.nodes_for("n02").contains(&"HP:4"));
        assert!(r.edge_bindings.iter().all(|b| b.kg_id != "raw"));
    }
}

#[test]
fn pruning_is_a_single_pass() {
    // S1 - S2 - C, both S nodes are sets. t1 is dropped (no edge to c1)
    // after s1 was already kept on the strength of t1.
    let qg = QueryGraph {
        nodes: vec![
            QNode::new("S1").set(true),
            QNode::new("S2").set(true),
            QNode::new("C"),
        ],
        edges: vec![QEdge::new("q1", "S1", "S2"), QEdge::new("q2", "S2", "C")],
    };
    let kg = KnowledgeGraph {
        nodes: vec![
            Node::new("s1").bound_to("S1"),
            Node::new("s2").bound_to("S1"),
            Node::new("t1").bound_to("S2"),
            Node::new("t2").bound_to("S2"),
            Node::new("c1").bound_to("C"),
        ],
        edges: vec![
            Edge::new("k1", "s1", "t1").bound_to("q1"),
            Edge::new("k2", "s2", "t2").bound_to("q1"),
            Edge::new("k3", "t2", "c1").bound_to("q2"),
        ],
    };
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.nodes_for("S1"), vec!["s1", "s2"]);
    assert_eq!(r.nodes_for("S2"), vec!["t2"]);
    assert!(r.edges_for("q1").contains(&"k2"));
    assert!(!r.edges_for("q1").contains(&"k1"));
}

// ===========================================================================
// Edge bindings
// ===========================================================================

#[test]
fn virtual_edges_are_bound() {
    let (mut kg, mut qg) = disease_fixture();
    qg.edges.push(QEdge::new("v0", "n01", "n02"));
    kg.edges.push(
        Edge::new("virt1", "UniProtKB:P1", "HP:1")
            .with_predicate("arax:shares_neighbor")
            .bound_to("v0"),
    );
    let results = materialize(&kg, &qg, &opts()).unwrap();
    let with_p1 = results
        .iter()
        .find(|r| r.nodes_for("n01") == vec!["UniProtKB:P1"])
        .unwrap();
    assert_eq!(with_p1.edges_for("v0"), vec!["virt1"]);
    let with_p2 = results
        .iter()
        .find(|r| r.nodes_for("n01") == vec!["UniProtKB:P2"])
        .unwrap();
    assert!(with_p2.edges_for("v0").is_empty());
}

// ===========================================================================
// Essence
// ===========================================================================

#[test]
fn essence_names_the_choice_node() {
    let (mut kg, qg) = disease_fixture();
    kg.nodes[1].symbol = Some("P1SYM".into());
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results[0].essence.as_deref(), Some("protein one (P1SYM)"));
    assert_eq!(results[0].essence_type.as_deref(), Some("biolink:Protein"));
    assert_eq!(results[1].essence.as_deref(), Some("protein two"));
}

#[test]
fn essence_follows_the_free_end_of_a_chain() {
    let chain = |pinned: &str| QueryGraph {
        nodes: ["A", "B", "C"]
            .iter()
            .map(|k| {
                let q = QNode::new(*k);
                if *k == pinned {
                    q.with_ids(["X:1"])
                } else {
                    q
                }
            })
            .collect(),
        edges: vec![QEdge::new("ab", "A", "B"), QEdge::new("bc", "B", "C")],
    };
    assert_eq!(essence_qnode(&chain("A")).unwrap().as_deref(), Some("C"));
    assert_eq!(essence_qnode(&chain("C")).unwrap().as_deref(), Some("A"));
}

#[test]
fn essence_falls_back_to_node_id() {
    let (mut kg, qg) = disease_fixture();
    kg.nodes[1].name = None;
    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results[0].essence.as_deref(), Some("UniProtKB:P1"));
}

#[test]
fn specific_set_node_is_an_error() {
    let (kg, mut qg) = disease_fixture();
    qg.nodes[0].is_set = true;
    let err = materialize(&kg, &qg, &opts()).unwrap_err();
    assert!(matches!(err, MaterializeError::SpecificSetConflict(ref k) if k == "n00"));
}

// ===========================================================================
// Validation
// ===========================================================================

#[test]
fn direction_sensitivity() {
    let qg = QueryGraph {
        nodes: vec![QNode::new("n0").with_ids(["A"]), QNode::new("n1")],
        edges: vec![QEdge::new("e0", "n0", "n1")],
    };
    let kg = KnowledgeGraph {
        nodes: vec![Node::new("A").bound_to("n0"), Node::new("B").bound_to("n1")],
        edges: vec![Edge::new("k0", "B", "A").bound_to("e0")],
    };
    let strict = MaterializeOptions {
        ignore_edge_direction: false,
        ..opts()
    };
    let err = materialize(&kg, &qg, &strict).unwrap_err();
    assert!(matches!(err, MaterializeError::DirectionMismatch { .. }));
    assert_eq!(err.code(), "InconsistentBindings");

    let results = materialize(&kg, &qg, &opts()).unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn edge_between_unconnected_qnodes_is_rejected() {
    let (mut kg, qg) = disease_fixture();
    kg.edges
        .push(Edge::new("bad", "UniProtKB:P1", "HP:1").bound_to("qe01"));
    let err = materialize(&kg, &qg, &opts()).unwrap_err();
    assert!(matches!(err, MaterializeError::DisconnectedBinding { ref kg_id } if kg_id == "bad"));
}

#[test]
fn binding_to_unknown_qnode_is_rejected() {
    let (mut kg, qg) = disease_fixture();
    kg.nodes.push(Node::new("X").bound_to("n99"));
    let err = materialize(&kg, &qg, &opts()).unwrap_err();
    assert_eq!(err.code(), "InvalidKnowledgeGraph");
}

#[test]
fn binding_to_unknown_qedge_is_rejected() {
    let (mut kg, qg) = disease_fixture();
    kg.edges[0].qedge_keys.insert("qe99".into());
    let err = materialize(&kg, &qg, &opts()).unwrap_err();
    assert!(matches!(err, MaterializeError::UnknownQEdgeBinding { ref qedge, .. } if qedge == "qe99"));
}

#[test]
fn null_qedge_keys_deserialize_as_unbound() {
    let edge: Edge = serde_json::from_value(json!({
        "id": "k", "subject": "A", "object": "B", "qedge_keys": [null]
    }))
    .unwrap();
    assert!(!edge.is_bound());
}

// ===========================================================================
// Message / response wrappers
// ===========================================================================

#[test]
fn resultify_twice_is_an_error() {
    let (kg, qg) = disease_fixture();
    let mut message = Message {
        query_graph: qg,
        knowledge_graph: kg,
        results: vec![],
    };
    assert_eq!(resultify_message(&mut message, &opts()).unwrap(), 2);
    let err = resultify_message(&mut message, &opts()).unwrap_err();
    assert_eq!(err.code(), "ResultsAlreadyPresent");
    assert_eq!(message.results.len(), 2);
}

#[test]
fn wrap_mode_records_error_on_response() {
    let (kg, mut qg) = disease_fixture();
    qg.nodes[0].is_set = true;
    let mut response = Response::with_message(Message {
        query_graph: qg,
        knowledge_graph: kg,
        results: vec![],
    });
    resultify_response(&mut response, &Parameters::new()).unwrap();
    assert_eq!(response.status(), "EssenceError");
    assert!(response.message().results.is_empty());
}

#[test]
fn debug_mode_propagates_error() {
    let (kg, mut qg) = disease_fixture();
    qg.nodes[0].is_set = true;
    let mut response = Response::with_message(Message {
        query_graph: qg,
        knowledge_graph: kg,
        results: vec![],
    });
    let params = Parameters::new().with("debug", "true");
    let err = resultify_response(&mut response, &params).unwrap_err();
    assert_eq!(err.code(), "EssenceError");
    assert!(response.is_ok());
}

#[test]
fn unknown_parameter_is_reported() {
    let mut response = Response::new();
    let params = Parameters::new().with("ignore_direction", true);
    resultify_response(&mut response, &params).unwrap();
    assert_eq!(response.status(), "UnknownParameter");
}

#[test]
fn strict_direction_via_parameters() {
    let params = Parameters::new()
        .with("ignore_edge_direction", "false")
        .with("force_isset_false", json!(["n02"]));
    let parsed = ResultifyParams::parse(&params).unwrap();
    assert!(!parsed.options.ignore_edge_direction);
    assert!(parsed.options.force_isset_false.contains("n02"));
    assert_eq!(parsed.mode, ErrorMode::Wrap);
}
