//! Shared utilities for reupload integration tests.
//!
//! - `TestHarness`: temp directories, state store, source and target stores
//! - builders for run configs and counting collaborators

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
