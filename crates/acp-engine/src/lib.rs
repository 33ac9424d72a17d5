//! Business logic of the agentic control plane.
//!
//! Four services over the resource store and the provider adapters:
//! - [`workflow::WorkflowService`]: user-facing workflow CRUD
//! - [`session::SessionService`]: session creation with the preflight gate
//!   and prompt composition
//! - [`completion::CompletionRouter`]: reacts to session status transitions
//!   with per-type, best-effort external publication
//! - [`sync::TrackerSyncEngine`]: mirrors a workflow into the external
//!   issue tracker
//!
//! The workflow service runs under the caller's authority; the completion
//! router and the sync engine's persistence run under the service account.

pub mod completion;
pub mod error;
pub mod events;
pub mod prompt;
pub mod session;
pub mod sync;
pub mod workflow;

pub use error::EngineError;
pub use events::{ControlPlaneEvent, EventBus, EventKind};
