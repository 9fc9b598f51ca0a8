//! Graph structure validation, run this before executing a workflow.
//!
//! Rules enforced:
//! 1. Exactly one node has role `start`.
//! 2. At least one node has role `end`.
//! 3. Every edge references node ids that exist in the workflow.
//! 4. Start and end nodes carry no capability (they pass the payload
//!    through unchanged).
//!
//! Cycles are deliberately *not* rejected here: loops are legal in the
//! graph and are bounded at run time by the engine's visit counter.
//!
//! Returns the start node's id on success.

use crate::{models::NodeRole, GraphError, Workflow};

/// Validate the workflow's structure and return the unique start node id.
///
/// # Errors
/// - [`GraphError::MissingStart`] / [`GraphError::MultipleStarts`]
/// - [`GraphError::MissingEnd`]
/// - [`GraphError::DanglingEdge`] if an edge references a missing node.
/// - [`GraphError::CapabilityOnPassthrough`] if a start or end node
///   carries a capability descriptor.
pub fn validate_graph(workflow: &Workflow) -> Result<&str, GraphError> {
    // -----------------------------------------------------------------------
    // 1. Exactly one start, at least one end
    // -----------------------------------------------------------------------
    let mut start: Option<&str> = None;
    let mut has_end = false;

    for (id, node) in &workflow.nodes {
        match node.role {
            NodeRole::Start => match start {
                None => start = Some(id),
                Some(first) => {
                    return Err(GraphError::MultipleStarts {
                        first: first.to_string(),
                        second: id.clone(),
                    })
                }
            },
            NodeRole::End => has_end = true,
            NodeRole::Task => {}
        }

        if !matches!(node.role, NodeRole::Task) && node.capability.is_some() {
            let role = match node.role {
                NodeRole::Start => "start",
                NodeRole::End => "end",
                NodeRole::Task => unreachable!(),
            };
            return Err(GraphError::CapabilityOnPassthrough(
                id.clone(),
                role.to_string(),
            ));
        }
    }

    let start = start.ok_or(GraphError::MissingStart)?;
    if !has_end {
        return Err(GraphError::MissingEnd);
    }

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints
    // -----------------------------------------------------------------------
    for edge in &workflow.edges {
        for node_id in [&edge.source, &edge.target] {
            if !workflow.nodes.contains_key(node_id) {
                return Err(GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: node_id.clone(),
                });
            }
        }
    }

    Ok(start)
}
