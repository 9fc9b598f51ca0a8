//! Executor tests: full runs over small in-memory workflows with a
//! scripted invoker and a map-backed repository.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use capabilities::{CapabilityDescriptor, CapabilityError, HttpVerb, MockInvoker};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::ResolveError,
    models::{Edge, Node, NodeRole, Workflow, WorkflowStatus},
    trace::{RunStatus, StepOutcome},
    EngineConfig, EngineError, Executor, WorkflowRepository,
};

// ============================================================
// Fixtures
// ============================================================

struct MapRepository {
    workflows: HashMap<Uuid, Workflow>,
}

impl MapRepository {
    fn empty() -> Self {
        Self {
            workflows: HashMap::new(),
        }
    }

    fn with(workflows: Vec<Workflow>) -> Self {
        Self {
            workflows: workflows.into_iter().map(|w| (w.id, w)).collect(),
        }
    }
}

#[async_trait]
impl WorkflowRepository for MapRepository {
    async fn resolve_published(&self, workflow_id: Uuid) -> Result<Workflow, ResolveError> {
        self.workflows
            .get(&workflow_id)
            .cloned()
            .ok_or(ResolveError::NotFound(workflow_id))
    }
}

fn start() -> Node {
    Node {
        role: NodeRole::Start,
        capability: None,
        display: Value::Null,
    }
}

fn end() -> Node {
    Node {
        role: NodeRole::End,
        capability: None,
        display: Value::Null,
    }
}

fn task(capability: Option<CapabilityDescriptor>) -> Node {
    Node {
        role: NodeRole::Task,
        capability,
        display: Value::Null,
    }
}

fn remote(address: &str) -> Option<CapabilityDescriptor> {
    Some(CapabilityDescriptor::Remote {
        address: address.into(),
        verb: HttpVerb::Post,
    })
}

fn edge(id: &str, source: &str, target: &str, guard: Option<&str>, ordinal: u32) -> Edge {
    Edge {
        id: id.into(),
        source: source.into(),
        target: target.into(),
        guard: guard.map(Into::into),
        ordinal,
    }
}

fn workflow(name: &str, nodes: Vec<(&str, Node)>, edges: Vec<Edge>) -> Workflow {
    let nodes: BTreeMap<String, Node> = nodes
        .into_iter()
        .map(|(id, node)| (id.to_string(), node))
        .collect();
    Workflow {
        id: Uuid::new_v4(),
        name: name.into(),
        version: 1,
        status: WorkflowStatus::Published,
        nodes,
        edges,
    }
}

fn executor(repository: MapRepository, invoker: Arc<MockInvoker>) -> Executor {
    Executor::new(Arc::new(repository), invoker, EngineConfig::default())
}

// ============================================================
// Linear runs
// ============================================================

#[tokio::test]
async fn linear_run_completes_with_ordered_trace() {
    let wf = workflow(
        "linear",
        vec![
            ("start", start()),
            ("diagnose", task(remote("http://svc/diagnose"))),
            ("notify", task(remote("http://svc/notify"))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "diagnose", None, 0),
            edge("e2", "diagnose", "notify", None, 0),
            edge("e3", "notify", "end", None, 0),
        ],
    );
    let invoker = Arc::new(
        MockInvoker::new()
            .returning("http://svc/diagnose", json!({ "fault": "pump" }))
            .returning("http://svc/notify", json!({ "notified": true })),
    );

    let report = executor(MapRepository::empty(), invoker.clone())
        .run_graph(&wf, json!({ "reading": 42 }))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report
            .steps
            .iter()
            .map(|s| s.node_id.as_str())
            .collect::<Vec<_>>(),
        vec!["start", "diagnose", "notify", "end"]
    );
    assert_eq!(report.final_payload, Some(json!({ "notified": true })));
    // Each capability output feeds the next node's input.
    assert_eq!(
        invoker.inputs_for("http://svc/diagnose"),
        vec![json!({ "reading": 42 })]
    );
    assert_eq!(
        invoker.inputs_for("http://svc/notify"),
        vec![json!({ "fault": "pump" })]
    );
}

#[tokio::test]
async fn branch_marker_passes_payload_through_unchanged() {
    let wf = workflow(
        "passthrough",
        vec![
            ("start", start()),
            ("route", task(None)),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "route", None, 0),
            edge("e2", "route", "end", None, 0),
        ],
    );

    let report = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .run_graph(&wf, json!({ "untouched": true }))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.final_payload, Some(json!({ "untouched": true })));
    assert_eq!(report.steps[1].output, Some(json!({ "untouched": true })));
}

// ============================================================
// Branching
// ============================================================

fn branching_workflow() -> Workflow {
    workflow(
        "branching",
        vec![
            ("start", start()),
            ("route", task(None)),
            ("high", task(remote("http://svc/high"))),
            ("low", task(remote("http://svc/low"))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "route", None, 0),
            edge("e_high", "route", "high", Some("severity > 5"), 0),
            edge("e_low", "route", "low", None, 1),
            edge("e3", "high", "end", None, 0),
            edge("e4", "low", "end", None, 0),
        ],
    )
}

#[tokio::test]
async fn guarded_branch_routes_by_payload() {
    let invoker = Arc::new(MockInvoker::new());
    let report = executor(MapRepository::empty(), invoker.clone())
        .run_graph(&branching_workflow(), json!({ "severity": 8 }))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.steps.iter().any(|s| s.node_id == "high"));
    assert_eq!(invoker.calls_for("http://svc/low"), 0);
}

#[tokio::test]
async fn unconditional_edge_is_the_fallback_branch() {
    let invoker = Arc::new(MockInvoker::new());
    let report = executor(MapRepository::empty(), invoker.clone())
        .run_graph(&branching_workflow(), json!({ "severity": 2 }))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.steps.iter().any(|s| s.node_id == "low"));
    assert_eq!(invoker.calls_for("http://svc/high"), 0);
}

#[tokio::test]
async fn guard_evaluation_failure_is_recorded_and_run_continues() {
    let wf = workflow(
        "degrading",
        vec![
            ("start", start()),
            ("route", task(None)),
            ("a", task(None)),
            ("b", task(None)),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "route", None, 0),
            // References a field the payload does not carry.
            edge("e_bad", "route", "a", Some("missing.field == 1"), 0),
            edge("e_ok", "route", "b", None, 1),
            edge("e3", "a", "end", None, 0),
            edge("e4", "b", "end", None, 0),
        ],
    );

    let report = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .run_graph(&wf, json!({ "x": 1 }))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.steps.iter().any(|s| s.node_id == "b"));
    let route_step = report
        .steps
        .iter()
        .find(|s| s.node_id == "route")
        .unwrap();
    assert_eq!(route_step.guard_failures.len(), 1);
    assert!(route_step.guard_failures[0].contains("e_bad"));
}

// ============================================================
// Failure modes
// ============================================================

#[tokio::test]
async fn dead_end_fails_the_run_and_keeps_the_trace() {
    let wf = workflow(
        "dead-end",
        vec![
            ("start", start()),
            ("route", task(None)),
            ("a", task(None)),
            ("b", task(None)),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "route", None, 0),
            edge("e2", "route", "a", Some("x == 1"), 0),
            edge("e3", "route", "b", Some("x == 2"), 1),
            edge("e4", "a", "end", None, 0),
            edge("e5", "b", "end", None, 0),
        ],
    );

    let report = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .run_graph(&wf, json!({ "x": 3 }))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.error,
        Some(EngineError::DeadEnd { ref node_id }) if node_id == "route"
    ));
    // The trace still shows every step up to and including the dead end.
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[1].outcome, StepOutcome::Success);
}

#[tokio::test]
async fn capability_failure_stops_the_run() {
    let wf = workflow(
        "failing",
        vec![
            ("start", start()),
            ("call", task(remote("http://svc/boom"))),
            ("after", task(remote("http://svc/after"))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "call", None, 0),
            edge("e2", "call", "after", None, 0),
            edge("e3", "after", "end", None, 0),
        ],
    );
    let invoker = Arc::new(MockInvoker::new().failing(
        "http://svc/boom",
        CapabilityError::Invocation {
            status: Some(500),
            detail: "status 500: upstream exploded".into(),
        },
    ));

    let report = executor(MapRepository::empty(), invoker.clone())
        .run_graph(&wf, json!({}))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.error,
        Some(EngineError::Capability { ref node_id, .. }) if node_id == "call"
    ));
    // The failing step is in the trace; nothing after it ran.
    let last = report.steps.last().unwrap();
    assert_eq!(last.node_id, "call");
    assert!(matches!(last.outcome, StepOutcome::Failure { .. }));
    assert_eq!(invoker.calls_for("http://svc/after"), 0);
}

#[tokio::test]
async fn revisiting_a_node_beyond_max_visits_is_a_cycle_error() {
    let wf = workflow(
        "cyclic",
        vec![
            ("start", start()),
            ("a", task(None)),
            ("b", task(None)),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "a", None, 0),
            edge("e2", "a", "b", None, 0),
            edge("e3", "b", "a", None, 0),
        ],
    );

    let report = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .run_graph(&wf, json!({}))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.error,
        Some(EngineError::CycleDetected { ref node_id, visits: 2, max_visits: 1 })
            if node_id == "a"
    ));
    // start, a, b, then the revisit of a that tripped the guard.
    assert_eq!(report.steps.len(), 4);
}

#[tokio::test]
async fn raising_max_visits_permits_bounded_loops() {
    let wf = workflow(
        "retry-loop",
        vec![
            ("start", start()),
            ("attempt", task(remote("http://svc/attempt"))),
            ("check", task(None)),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "attempt", None, 0),
            edge("e2", "attempt", "check", None, 0),
            edge("e_done", "check", "end", Some("done == true"), 0),
            edge("e_retry", "check", "attempt", None, 1),
        ],
    );
    // The scripted call always reports done, so the loop exits on the
    // first pass; the raised limit just has to tolerate the wiring.
    let invoker = Arc::new(MockInvoker::new().returning("http://svc/attempt", json!({ "done": true })));
    let executor = Executor::new(
        Arc::new(MapRepository::empty()),
        invoker,
        EngineConfig {
            max_visits: 3,
            ..EngineConfig::default()
        },
    );

    let report = executor.run_graph(&wf, json!({})).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
}

#[tokio::test]
async fn structural_defect_is_an_error_not_a_failed_report() {
    // No start node at all.
    let wf = workflow(
        "broken",
        vec![("a", task(None)), ("end", end())],
        vec![edge("e1", "a", "end", None, 0)],
    );

    let result = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .run_graph(&wf, json!({}))
        .await;

    assert!(matches!(result, Err(EngineError::Graph(_))));
}

// ============================================================
// Cancellation
// ============================================================

#[tokio::test]
async fn cancelled_run_fails_with_trace_preserved() {
    let wf = workflow(
        "cancellable",
        vec![
            ("start", start()),
            ("work", task(None)),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "work", None, 0),
            edge("e2", "work", "end", None, 0),
        ],
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .run_graph_cancellable(&wf, json!({}), cancel)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(report.error, Some(EngineError::Cancelled)));
    assert!(report.steps.is_empty());
}

// ============================================================
// Sub-workflows
// ============================================================

fn sub_descriptor(workflow_id: Uuid) -> Option<CapabilityDescriptor> {
    Some(CapabilityDescriptor::Subworkflow { workflow_id })
}

#[tokio::test]
async fn sub_workflow_trace_is_nested_not_flattened() {
    let child = workflow(
        "child",
        vec![
            ("start", start()),
            ("enrich", task(remote("http://svc/enrich"))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "enrich", None, 0),
            edge("e2", "enrich", "end", None, 0),
        ],
    );
    let child_id = child.id;
    let parent = workflow(
        "parent",
        vec![
            ("start", start()),
            ("delegate", task(sub_descriptor(child_id))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "delegate", None, 0),
            edge("e2", "delegate", "end", None, 0),
        ],
    );
    let invoker =
        Arc::new(MockInvoker::new().returning("http://svc/enrich", json!({ "enriched": true })));

    let report = executor(MapRepository::with(vec![child]), invoker)
        .run_graph(&parent, json!({ "raw": 1 }))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    // Parent trace holds exactly its own three steps.
    assert_eq!(report.steps.len(), 3);
    let delegate = &report.steps[1];
    assert_eq!(delegate.output, Some(json!({ "enriched": true })));
    // Child steps live inside the delegate step's nested report.
    let sub = delegate.sub_run.as_ref().unwrap();
    assert_eq!(sub.workflow_id, child_id);
    assert_eq!(sub.steps.len(), 3);
    assert_eq!(report.final_payload, Some(json!({ "enriched": true })));
}

#[tokio::test]
async fn sub_workflow_failure_fails_the_parent_node() {
    let child = workflow(
        "failing-child",
        vec![
            ("start", start()),
            ("boom", task(remote("http://svc/boom"))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "boom", None, 0),
            edge("e2", "boom", "end", None, 0),
        ],
    );
    let child_id = child.id;
    let parent = workflow(
        "parent",
        vec![
            ("start", start()),
            ("delegate", task(sub_descriptor(child_id))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "delegate", None, 0),
            edge("e2", "delegate", "end", None, 0),
        ],
    );
    let invoker = Arc::new(MockInvoker::new().failing(
        "http://svc/boom",
        CapabilityError::Timeout { timeout_ms: 30_000 },
    ));

    let report = executor(MapRepository::with(vec![child]), invoker)
        .run_graph(&parent, json!({}))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.error,
        Some(EngineError::Capability { ref node_id, .. }) if node_id == "delegate"
    ));
    // The failed child report is still attached for debugging.
    let delegate = report.steps.last().unwrap();
    let sub = delegate.sub_run.as_ref().unwrap();
    assert_eq!(sub.status, RunStatus::Failed);
}

#[tokio::test]
async fn unresolvable_sub_workflow_is_a_resolution_failure() {
    let missing = Uuid::new_v4();
    let parent = workflow(
        "parent",
        vec![
            ("start", start()),
            ("delegate", task(sub_descriptor(missing))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "delegate", None, 0),
            edge("e2", "delegate", "end", None, 0),
        ],
    );

    let report = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .run_graph(&parent, json!({}))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.error,
        Some(EngineError::Capability {
            source: CapabilityError::Resolution { workflow_id },
            ..
        }) if workflow_id == missing
    ));
}

#[tokio::test]
async fn recursion_depth_limit_stops_self_referencing_workflows() {
    let id = Uuid::new_v4();
    let mut recursive = workflow(
        "recursive",
        vec![
            ("start", start()),
            ("again", task(sub_descriptor(id))),
            ("end", end()),
        ],
        vec![
            edge("e1", "start", "again", None, 0),
            edge("e2", "again", "end", None, 0),
        ],
    );
    recursive.id = id;

    let executor = Executor::new(
        Arc::new(MapRepository::with(vec![recursive.clone()])),
        Arc::new(MockInvoker::new()),
        EngineConfig {
            max_depth: 0,
            ..EngineConfig::default()
        },
    );

    let report = executor.run_graph(&recursive, json!({})).await.unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.error,
        Some(EngineError::RecursionLimit { max_depth: 0 })
    ));
}

// ============================================================
// Repository-resolved entry points
// ============================================================

#[tokio::test]
async fn execute_resolves_the_published_workflow_by_id() {
    let wf = workflow(
        "by-id",
        vec![("start", start()), ("end", end())],
        vec![edge("e1", "start", "end", None, 0)],
    );
    let id = wf.id;

    let report = executor(MapRepository::with(vec![wf]), Arc::new(MockInvoker::new()))
        .execute(id, json!({ "input": true }))
        .await
        .unwrap();

    assert_eq!(report.workflow_id, id);
    assert_eq!(report.status, RunStatus::Completed);
}

#[tokio::test]
async fn execute_of_unknown_workflow_is_an_error() {
    let missing = Uuid::new_v4();
    let result = executor(MapRepository::empty(), Arc::new(MockInvoker::new()))
        .execute(missing, json!({}))
        .await;

    assert!(matches!(
        result,
        Err(EngineError::Resolve(ResolveError::NotFound(id))) if id == missing
    ));
}
