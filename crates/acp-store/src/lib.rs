//! Typed persistence for the control plane's custom resources.
//!
//! The [`ResourceStore`] trait is the only way the rest of the system reads
//! or writes `BugFixWorkflow` and `AgenticSession` objects. Two
//! implementations exist: [`KubeResourceStore`] against a real cluster and
//! [`MemoryResourceStore`] for tests and single-node development.
//!
//! The [`CredentialBroker`] lives here too because both token flows are
//! backed by the same secret machinery.

pub mod credentials;
pub mod error;
pub mod kube_store;
pub mod memory;
pub mod traits;

pub use credentials::{CredentialBroker, CredentialError, KubeCredentialBroker, MemoryCredentialBroker};
pub use error::StoreError;
pub use kube_store::KubeResourceStore;
pub use memory::MemoryResourceStore;
pub use traits::ResourceStore;
