#![forbid(unsafe_code)]
#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "test utility crate — unwraps are acceptable"
)]

//! Shared test utilities for the rangecache workspace.

pub mod fixtures;
pub mod memory_source;
pub mod rng;

pub use fixtures::*;
pub use memory_source::{MemorySource, SourceProbe};
pub use rng::{Xorshift64, patterned_bytes};
