use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::Poll;

use crate::runtime::local_executor;
use crate::sync::{LocalWaitGroup, WaitResult};
use crate::BUG_MESSAGE;

/// A scope to spawn coroutines that borrow data from the enclosing frame.
///
/// See [`local_scope`] for details.
pub struct LocalScope<'scope> {
    wg: LocalWaitGroup,
    _scope: PhantomData<&'scope ()>,
    // impl !Send
    no_send_marker: PhantomData<*mut ()>,
}

impl<'scope> LocalScope<'scope> {
    /// Executes a new coroutine within the scope, polling it immediately.
    ///
    /// Unlike non-scoped coroutines, it may borrow non-`'static` data from
    /// outside the scope.
    #[inline(always)]
    pub fn exec<F: Future<Output = ()> + 'scope>(&'scope self, future: F) {
        self.wg.inc();
        let guarded = ScopedRun {
            scope: self,
            fut: future,
            no_send_marker: PhantomData,
        };

        local_executor().exec_future(guarded);
    }

    /// Spawns a new coroutine within the scope; it is polled later.
    ///
    /// Unlike non-scoped coroutines, it may borrow non-`'static` data from
    /// outside the scope.
    #[inline(always)]
    pub fn spawn<F: Future<Output = ()> + 'scope>(&'scope self, future: F) {
        self.wg.inc();
        let guarded = ScopedRun {
            scope: self,
            fut: future,
            no_send_marker: PhantomData,
        };

        local_executor().spawn_local(guarded);
    }
}

/// `ScopedRun` wraps a scoped coroutine and releases its slot in the scope
/// from [`Drop`], not from a completed poll.
///
/// The scope does not care whether the coroutine finished — only that its
/// future is gone and can never touch the borrowed data again. Counting in
/// `Drop` covers both completion (the executor releases the future right
/// after it returns ready) and a future that is dropped without completing.
struct ScopedRun<'scope, Fut: Future<Output = ()>> {
    scope: &'scope LocalScope<'scope>,
    fut: Fut,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl<Fut: Future<Output = ()>> Future for ScopedRun<'_, Fut> {
    type Output = ();

    #[inline(always)]
    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        unsafe { Pin::new_unchecked(&mut this.fut) }.poll(cx)
    }
}

impl<Fut: Future<Output = ()>> Drop for ScopedRun<'_, Fut> {
    fn drop(&mut self) {
        self.scope.wg.done();
    }
}

/// Creates a scope for spawning coroutines that borrow non-`'static` data.
///
/// The function passed to `local_scope` is provided a [`LocalScope`] object,
/// through which scoped coroutines can be [spawned](LocalScope::spawn) or
/// [executed](LocalScope::exec).
///
/// `local_scope` returns only after the future of every spawned coroutine is
/// gone, which is what makes the borrows sound. The join survives runtime
/// shutdown: the children are woken with canceled results and the scope still
/// waits for each of them to finish.
///
/// # Example
///
/// ```rust
/// use chorus::sync::local_scope;
/// use chorus::Local;
///
/// async fn foo() {
///     let a = Local::new(0);
///     let a_ref = &a;
///
///     local_scope(|scope| async move {
///         for _ in 0..10 {
///             scope.spawn(async move {
///                 *a_ref.borrow_mut() += 1;
///             });
///         }
///     })
///     .await;
///
///     assert_eq!(*a.borrow(), 10);
/// }
/// ```
#[inline(always)]
pub async fn local_scope<'scope, Fut, F>(f: F)
where
    Fut: Future<Output = ()>,
    F: FnOnce(&'scope LocalScope<'scope>) -> Fut,
{
    let scope = LocalScope {
        wg: LocalWaitGroup::new(),
        _scope: PhantomData,
        no_send_marker: PhantomData,
    };
    // the children are guaranteed to release the wait group before the join
    // below returns, so the erased lifetime never outlives this frame
    let static_scope = unsafe { std::mem::transmute::<&_, &'static LocalScope<'static>>(&scope) };

    f(static_scope).await;

    match static_scope.wg.join().await {
        WaitResult::Ok => {}
        _ => unreachable!("{BUG_MESSAGE}"),
    }
}

#[cfg(test)]
mod tests {
    use crate as chorus;
    use crate::sync::local_scope;
    use crate::yield_now;
    use crate::Local;

    #[chorus_macros::test]
    fn test_scope_spawn_runs_later() {
        let a = Local::new(0);
        let a_ref = &a;

        local_scope(|scope| async move {
            for _ in 0..10 {
                scope.spawn(async move {
                    *a_ref.borrow_mut() += 1;
                });
            }

            assert_eq!(*a_ref.borrow(), 0);
        })
        .await;

        assert_eq!(*a.borrow(), 10);
    }

    #[chorus_macros::test]
    fn test_scope_exec_runs_immediately() {
        let a = Local::new(0);
        let a_ref = &a;

        local_scope(|scope| async move {
            scope.exec(async move {
                *a_ref.borrow_mut() += 1;
                yield_now().await;
                *a_ref.borrow_mut() += 1;
            });

            assert_eq!(*a_ref.borrow(), 1);
        })
        .await;

        assert_eq!(*a.borrow(), 2);
    }

    #[chorus_macros::test]
    fn test_sequential_scopes() {
        let a = Local::new(0);
        let a_ref = &a;

        local_scope(|scope| async move {
            scope.spawn(async move {
                *a_ref.borrow_mut() += 1;
            });
        })
        .await;

        local_scope(|scope| async move {
            scope.spawn(async move {
                *a_ref.borrow_mut() += 1;
            });
        })
        .await;

        assert_eq!(*a.borrow(), 2);
    }
}
