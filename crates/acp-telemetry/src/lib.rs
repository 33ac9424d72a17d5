//! Logging bootstrap shared by the daemon and integration tests.

pub mod logging;
