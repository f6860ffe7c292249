use std::future::Future;

use crate::runtime::executor::is_local_executor_init;
use crate::BUG_MESSAGE;
use crate::{local_executor, Executor};

/// Initializes the executor of the current thread (only if it is not
/// initialized yet) and blocks until `future` completes.
///
/// Tests running on the same thread reuse the executor, so a test must leave
/// it idle: every coroutine it spawned must have finished (`local_scope`
/// guarantees this).
///
/// # Example
///
/// ```no_run
/// use chorus::test::run_test_and_block_on;
///
/// async fn awesome_async_function() -> usize {
///     42
/// }
///
/// #[cfg(test)]
/// fn test_awesome_async_function() {
///     run_test_and_block_on(async {
///         assert_eq!(awesome_async_function().await, 42);
///     });
/// }
/// ```
///
/// # Shortcut
///
/// The `#[chorus_macros::test]` attribute generates exactly this wrapping.
pub fn run_test_and_block_on<Fut>(future: Fut)
where
    Fut: Future<Output = ()>,
{
    if !is_local_executor_init() {
        Executor::init();
    }
    local_executor().run_and_block_on(future).expect(BUG_MESSAGE);
}
