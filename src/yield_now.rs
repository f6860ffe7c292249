use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// `Yield` implements the [`Future`] trait for yielding the current
/// coroutine.
///
/// When [`Future::poll`] is called, it requeues the current task behind every
/// task already in the run queue.
pub struct Yield {
    was_yielded: bool,
}

impl Future for Yield {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.was_yielded {
            Poll::Ready(())
        } else {
            this.was_yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Transfers control to the executor: every task already in the run queue
/// runs before the current coroutine resumes.
///
/// # Example
///
/// ```rust
/// use chorus::yield_now;
///
/// async fn foo(is_ready: &std::cell::Cell<bool>) {
///     while !is_ready.get() {
///         yield_now().await;
///     }
/// }
/// ```
#[must_use = "Future must be awaited to yield"]
pub fn yield_now() -> Yield {
    Yield { was_yielded: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as chorus;
    use crate::runtime::local_executor;
    use crate::Local;

    #[chorus_macros::test]
    fn test_yield_now() {
        let i = Local::new(false);
        let i_clone = i.clone();
        local_executor().spawn_local(async move {
            assert!(!*i.borrow());
            *i.borrow_mut() = true;
        });
        yield_now().await;
        assert!(*i_clone.borrow());
    }
}
