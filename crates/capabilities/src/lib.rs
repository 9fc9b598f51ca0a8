//! `capabilities` crate: capability descriptors and the invokers that
//! perform them.
//!
//! A capability is the unit of work a task node performs: an HTTP call
//! to a remote endpoint, a named local payload transformation, or a
//! reference to another workflow.  The execution engine dispatches the
//! first two through the [`CapabilityInvoker`] trait; sub-workflow
//! descriptors are resolved and run by the engine itself.

pub mod descriptor;
pub mod error;
pub mod invoker;
pub mod mock;
pub mod remote;
pub mod traits;
pub mod transform;

pub use descriptor::{CapabilityDescriptor, HttpVerb};
pub use error::CapabilityError;
pub use invoker::DefaultInvoker;
pub use mock::{MockInvoker, MockOutcome};
pub use remote::{HttpInvoker, RemoteConfig};
pub use traits::CapabilityInvoker;
pub use transform::TransformRegistry;
