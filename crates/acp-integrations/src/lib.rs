//! Provider adapters for the control plane.
//!
//! `github` is the source-control adapter (issues, comments, labels, gists,
//! pull requests, branches) behind the [`scm::SourceControl`] capability
//! trait. `tracker` is the external issue-tracker adapter behind the
//! [`tracker::Tracker`] trait, plus the deterministic description formatter
//! the sync engine renders workflows with.

pub mod github;
pub mod scm;
pub mod tracker;
pub mod types;
