//! Utilities for testing: [`run_test_and_block_on`] runs a test body as a
//! coroutine, reusing one executor per thread; the `#[chorus_macros::test]`
//! attribute generates the wrapping.

pub mod runner;

pub use runner::run_test_and_block_on;
