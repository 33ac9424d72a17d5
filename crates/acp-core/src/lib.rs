//! Core library for the agentic control plane: custom resource types,
//! phase machinery, naming and validation rules shared by every other crate.
//!
//! This crate provides:
//! - The `BugFixWorkflow` and `AgenticSession` custom resource definitions
//! - Phase and session-type enumerations with transition helpers
//! - The label schema and annotation journal keys
//! - Branch-name validation and repository-name derivation
//! - Daemon runtime settings read from the environment

pub mod branch;
pub mod project_settings;
pub mod repo_url;
pub mod session;
pub mod settings;
pub mod types;
pub mod workflow;
