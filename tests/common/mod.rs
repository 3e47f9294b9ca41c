//! Common test utilities for jsoc-dl integration tests

#[allow(dead_code)]
pub mod archive;
#[allow(dead_code)]
pub mod assertions;

#[allow(unused_imports)]
pub use archive::*;
#[allow(unused_imports)]
pub use assertions::*;
