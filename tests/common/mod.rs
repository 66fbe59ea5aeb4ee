//! Common test utilities for integration tests.

pub mod assertions;
pub mod fixtures;

// Re-export common types
#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
