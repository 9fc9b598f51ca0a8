//! Edge selection: picks the next node after a step completes.
//!
//! Policy: ordered first match.  Outgoing edges are scanned in ordinal
//! order and the first whose guard holds wins.  A guard-less edge is
//! always-true, so it serves as a default branch only when it is
//! ordered after the guarded ones.  This gives deterministic branch
//! selection without requiring mutually exclusive guards; workflow
//! authors order edges by priority.

use serde_json::Value;
use tracing::warn;

use crate::{guard, Workflow};

/// The edge chosen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChosenEdge {
    pub edge_id: String,
    pub target: String,
}

/// Outcome of one edge-selection scan.  `edge` is `None` when no edge
/// matched; `guard_failures` collects every guard that failed to
/// *evaluate* (not guards that evaluated false) so the engine can
/// record them without aborting the run.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub edge: Option<ChosenEdge>,
    pub guard_failures: Vec<String>,
}

/// Select the next node from `current`, deterministically and without
/// side effects.
pub fn next(workflow: &Workflow, current: &str, payload: &Value) -> Selection {
    let outgoing = workflow.outgoing(current);

    if outgoing.is_empty() {
        return Selection::default();
    }

    // A single outgoing edge is followed unconditionally, guard or not.
    if let [only] = outgoing.as_slice() {
        return Selection {
            edge: Some(ChosenEdge {
                edge_id: only.id.clone(),
                target: only.target.clone(),
            }),
            guard_failures: Vec::new(),
        };
    }

    let mut guard_failures = Vec::new();

    for edge in outgoing {
        let matched = match &edge.guard {
            None => true,
            Some(expression) => match guard::evaluate(expression, payload) {
                Ok(flag) => flag,
                Err(err) => {
                    // Degrades to a non-match; the run continues.
                    warn!("edge '{}' guard failed to evaluate: {err}", edge.id);
                    guard_failures.push(format!("edge '{}': {err}", edge.id));
                    false
                }
            },
        };

        if matched {
            return Selection {
                edge: Some(ChosenEdge {
                    edge_id: edge.id.clone(),
                    target: edge.target.clone(),
                }),
                guard_failures,
            };
        }
    }

    Selection {
        edge: None,
        guard_failures,
    }
}
