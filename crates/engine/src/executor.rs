//! Workflow execution engine.
//!
//! `Executor` drives a single run: validate the graph, then loop:
//! invoke the current node's capability, append a step to the trace,
//! enforce the visit-count cycle guard, and ask the navigator for the
//! next node, until an end node completes the run or an error fails
//! it.  Sub-workflow nodes recurse into the same engine with a fresh
//! context.
//!
//! A run is strictly sequential; independent runs share nothing but the
//! repository's read path and may proceed concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use capabilities::{CapabilityDescriptor, CapabilityError, CapabilityInvoker};
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::ResolveError,
    graph::validate_graph,
    models::NodeRole,
    navigator,
    trace::{RunReport, RunStatus, Step, StepOutcome},
    EngineError, Workflow, WorkflowRepository,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of times any single node may be visited within
    /// one run.  The default of 1 forbids revisits entirely.
    pub max_visits: u32,
    /// Maximum nesting depth of sub-workflow runs.  Per-run visit
    /// counts cannot catch workflows that reference each other, so the
    /// depth limit is the transitive safeguard.
    pub max_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_visits: 1,
            max_depth: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Stateless orchestrator for workflow runs.  Construct once and share;
/// every run owns its own context.
pub struct Executor {
    repository: Arc<dyn WorkflowRepository>,
    invoker: Arc<dyn CapabilityInvoker>,
    config: EngineConfig,
}

type WorkResult = (Result<Value, EngineError>, Option<Box<RunReport>>);

impl Executor {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        invoker: Arc<dyn CapabilityInvoker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            invoker,
            config,
        }
    }

    /// Resolve the latest published version of `workflow_id` and run it.
    ///
    /// # Errors
    /// Returns `Err` only for failures *before* the run starts: no
    /// published version, an invalid stored definition, or a structural
    /// graph defect.  Failures during the run come back inside the
    /// report with the trace collected so far.
    #[instrument(skip(self, input), fields(workflow_id = %workflow_id))]
    pub async fn execute(
        &self,
        workflow_id: Uuid,
        input: Value,
    ) -> Result<RunReport, EngineError> {
        self.execute_cancellable(workflow_id, input, CancellationToken::new())
            .await
    }

    /// [`Executor::execute`] with an external cancellation signal.  The
    /// token is checked before each node's work step; on cancellation
    /// the run fails with [`EngineError::Cancelled`], trace preserved
    /// up to the last completed step.
    pub async fn execute_cancellable(
        &self,
        workflow_id: Uuid,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        let workflow = self.repository.resolve_published(workflow_id).await?;
        self.run_inner(&workflow, input, cancel, 0).await
    }

    /// Run a workflow in test mode.
    ///
    /// The run itself is identical to [`Executor::execute`]; the engine
    /// performs no side effects of its own either way.  Side-effect
    /// isolation is the responsibility of the invoked capabilities, not
    /// the engine.
    pub async fn test_run(
        &self,
        workflow_id: Uuid,
        input: Value,
    ) -> Result<RunReport, EngineError> {
        self.execute(workflow_id, input).await
    }

    /// Run an already-resolved graph snapshot.
    pub async fn run_graph(
        &self,
        workflow: &Workflow,
        input: Value,
    ) -> Result<RunReport, EngineError> {
        self.run_inner(workflow, input, CancellationToken::new(), 0)
            .await
    }

    /// [`Executor::run_graph`] with an external cancellation signal.
    pub async fn run_graph_cancellable(
        &self,
        workflow: &Workflow,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        self.run_inner(workflow, input, cancel, 0).await
    }

    // -----------------------------------------------------------------------
    // Internal: the run loop
    // -----------------------------------------------------------------------

    // Boxed so sub-workflow nodes can recurse into the same engine.
    fn run_inner<'a>(
        &'a self,
        workflow: &'a Workflow,
        input: Value,
        cancel: CancellationToken,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = Result<RunReport, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            // Structural errors are fatal before any step runs.
            let start_id = validate_graph(workflow)?;

            info!(
                "starting run of workflow '{}' v{} ({} nodes, {} edges)",
                workflow.name,
                workflow.version,
                workflow.nodes.len(),
                workflow.edges.len()
            );

            let started_at = Utc::now();
            let mut steps: Vec<Step> = Vec::new();
            let mut visits: HashMap<String, u32> = HashMap::new();
            let mut current_id = start_id.to_string();
            let mut payload = input;

            let outcome: Result<Value, EngineError> = loop {
                if cancel.is_cancelled() {
                    warn!("run of '{}' cancelled at node '{current_id}'", workflow.name);
                    break Err(EngineError::Cancelled);
                }

                // Edge targets are validated, so the lookup cannot miss;
                // fail explicitly rather than panic if it ever does.
                let node = match workflow.node(&current_id) {
                    Some(node) => node,
                    None => {
                        break Err(EngineError::DeadEnd {
                            node_id: current_id.clone(),
                        })
                    }
                };

                // ----------------------------------------------------------
                // Work step
                // ----------------------------------------------------------
                let step_started = Utc::now();
                let (work, sub_run) = match (node.role, node.capability.as_ref()) {
                    // Start, end, and branch-marker nodes pass the
                    // payload through unchanged.
                    (NodeRole::Start, _) | (NodeRole::End, _) | (NodeRole::Task, None) => {
                        (Ok(payload.clone()), None)
                    }
                    (
                        NodeRole::Task,
                        Some(CapabilityDescriptor::Subworkflow { workflow_id }),
                    ) => {
                        self.run_subworkflow(*workflow_id, &current_id, payload.clone(), &cancel, depth)
                            .await
                    }
                    (NodeRole::Task, Some(descriptor)) => (
                        self.invoker
                            .invoke(descriptor, payload.clone())
                            .await
                            .map_err(|source| EngineError::Capability {
                                node_id: current_id.clone(),
                                source,
                            }),
                        None,
                    ),
                };

                // ----------------------------------------------------------
                // Trace
                // ----------------------------------------------------------
                steps.push(Step {
                    node_id: current_id.clone(),
                    role: node.role,
                    kind: node.kind(),
                    input: payload.clone(),
                    output: work.as_ref().ok().cloned(),
                    started_at: step_started,
                    finished_at: Utc::now(),
                    outcome: match &work {
                        Ok(_) => StepOutcome::Success,
                        Err(err) => StepOutcome::Failure {
                            message: err.to_string(),
                        },
                    },
                    guard_failures: Vec::new(),
                    sub_run,
                });

                let output = match work {
                    Ok(output) => output,
                    Err(err) => break Err(err),
                };

                // ----------------------------------------------------------
                // Cycle guard
                // ----------------------------------------------------------
                let count = visits.entry(current_id.clone()).or_insert(0);
                *count += 1;
                if *count > self.config.max_visits {
                    break Err(EngineError::CycleDetected {
                        node_id: current_id.clone(),
                        visits: *count,
                        max_visits: self.config.max_visits,
                    });
                }

                if node.role == NodeRole::End {
                    break Ok(output);
                }

                // ----------------------------------------------------------
                // Edge selection
                // ----------------------------------------------------------
                let selection = navigator::next(workflow, &current_id, &output);
                if let Some(last) = steps.last_mut() {
                    last.guard_failures = selection.guard_failures;
                }

                match selection.edge {
                    Some(chosen) => {
                        current_id = chosen.target;
                        payload = output;
                    }
                    None => {
                        break Err(EngineError::DeadEnd {
                            node_id: current_id.clone(),
                        })
                    }
                }
            };

            let finished_at = Utc::now();
            let report = match outcome {
                Ok(final_payload) => {
                    info!(
                        "run of '{}' completed in {} steps",
                        workflow.name,
                        steps.len()
                    );
                    RunReport {
                        workflow_id: workflow.id,
                        workflow_version: workflow.version,
                        status: RunStatus::Completed,
                        steps,
                        final_payload: Some(final_payload),
                        error: None,
                        started_at,
                        finished_at,
                    }
                }
                Err(err) => {
                    error!("run of '{}' failed: {err}", workflow.name);
                    RunReport {
                        workflow_id: workflow.id,
                        workflow_version: workflow.version,
                        status: RunStatus::Failed,
                        steps,
                        final_payload: None,
                        error: Some(err),
                        started_at,
                        finished_at,
                    }
                }
            };

            Ok(report)
        })
    }

    // -----------------------------------------------------------------------
    // Internal: sub-workflow dispatch
    // -----------------------------------------------------------------------

    async fn run_subworkflow(
        &self,
        workflow_id: Uuid,
        node_id: &str,
        payload: Value,
        cancel: &CancellationToken,
        depth: u32,
    ) -> WorkResult {
        if depth + 1 > self.config.max_depth {
            return (
                Err(EngineError::RecursionLimit {
                    max_depth: self.config.max_depth,
                }),
                None,
            );
        }

        let child = match self.repository.resolve_published(workflow_id).await {
            Ok(child) => child,
            Err(ResolveError::NotFound(_)) => {
                return (
                    Err(EngineError::Capability {
                        node_id: node_id.to_string(),
                        source: CapabilityError::Resolution { workflow_id },
                    }),
                    None,
                )
            }
            Err(err @ ResolveError::Invalid { .. }) => {
                return (
                    Err(EngineError::Capability {
                        node_id: node_id.to_string(),
                        source: CapabilityError::Invocation {
                            status: None,
                            detail: err.to_string(),
                        },
                    }),
                    None,
                )
            }
        };

        match self
            .run_inner(&child, payload, cancel.child_token(), depth + 1)
            .await
        {
            // Child failed structural validation before starting.
            Err(err) => (
                Err(EngineError::Capability {
                    node_id: node_id.to_string(),
                    source: CapabilityError::Invocation {
                        status: None,
                        detail: format!("sub-workflow {workflow_id} failed to start: {err}"),
                    },
                }),
                None,
            ),
            Ok(report) => {
                if report.succeeded() {
                    let output = report.final_payload.clone().unwrap_or(Value::Null);
                    (Ok(output), Some(Box::new(report)))
                } else if matches!(report.error, Some(EngineError::Cancelled)) {
                    (Err(EngineError::Cancelled), Some(Box::new(report)))
                } else {
                    let detail = report
                        .error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "unknown error".to_string());
                    (
                        Err(EngineError::Capability {
                            node_id: node_id.to_string(),
                            source: CapabilityError::Invocation {
                                status: None,
                                detail: format!("sub-workflow {workflow_id} failed: {detail}"),
                            },
                        }),
                        Some(Box::new(report)),
                    )
                }
            }
        }
    }
}
