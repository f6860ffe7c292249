use std::cell::UnsafeCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::ptr::NonNull;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::get_task_from_context;
use crate::runtime::local_executor;
use crate::sync::clause::{trigger, Clause, Selection, WaitQueue, WakeReason};
use crate::sync::WaitResult;
use crate::BUG_MESSAGE;

/// A [`Future`] to wait until all tasks of a [`LocalWaitGroup`] complete.
///
/// A wait is a one-clause blocking operation like a channel send: it parks a
/// clause on the group's waiter queue, optionally arms a deadline timer and
/// is woken exactly once — by the last [`done`](LocalWaitGroup::done), by the
/// deadline, or by runtime shutdown. The clause carries no payload.
pub struct WaitLocalWaitGroup<'wait_group> {
    wait_group: &'wait_group LocalWaitGroup,
    deadline: Option<Instant>,
    cancelable: bool,
    selection: Selection,
    clause: Clause,
    was_parked: bool,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl<'wait_group> WaitLocalWaitGroup<'wait_group> {
    #[inline(always)]
    fn new(
        wait_group: &'wait_group LocalWaitGroup,
        deadline: Option<Instant>,
        cancelable: bool,
    ) -> Self {
        Self {
            wait_group,
            deadline,
            cancelable,
            selection: Selection::new(),
            clause: Clause::new(0, std::ptr::null_mut()),
            was_parked: false,
            no_send_marker: PhantomData,
        }
    }
}

impl Future for WaitLocalWaitGroup<'_> {
    type Output = WaitResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        if !this.was_parked {
            if this.cancelable && !local_executor().can_block() {
                return Poll::Ready(WaitResult::Canceled);
            }

            let inner = this.wait_group.get_inner();
            if inner.count == 0 {
                return Poll::Ready(WaitResult::Ok);
            }

            this.was_parked = true;
            this.clause.owner = &mut this.selection;
            inner
                .waiters
                .push_back(unsafe { NonNull::new_unchecked(&mut this.clause) });
            let task = unsafe { get_task_from_context!(cx) };
            unsafe {
                Selection::commit_park(
                    NonNull::from(&mut this.selection),
                    task,
                    &mut this.clause,
                    1,
                    this.deadline,
                    this.cancelable,
                );
            }
            return Poll::Pending;
        }

        match this.selection.reason {
            WakeReason::Parked => Poll::Pending,
            WakeReason::Completed { .. } => Poll::Ready(WaitResult::Ok),
            WakeReason::TimedOut => Poll::Ready(WaitResult::TimedOut),
            WakeReason::Canceled => Poll::Ready(WaitResult::Canceled),
            WakeReason::Closed { .. } => unreachable!("{BUG_MESSAGE}"),
        }
    }
}

impl Drop for WaitLocalWaitGroup<'_> {
    fn drop(&mut self) {
        self.selection.abandon();
    }
}

struct Inner {
    count: usize,
    waiters: WaitQueue,
}

/// `LocalWaitGroup` is a synchronization primitive to
/// [`wait`](LocalWaitGroup::wait) until all counted tasks are
/// [`completed`](LocalWaitGroup::done).
///
/// Waits share the runtime plumbing of channel operations, so they support
/// deadlines ([`wait_with_deadline`](LocalWaitGroup::wait_with_deadline),
/// [`wait_with_timeout`](LocalWaitGroup::wait_with_timeout)) and are woken
/// with a canceled result when the runtime shuts down. A timed-out or
/// canceled wait leaves the counter untouched; the tasks it was waiting for
/// keep running.
///
/// # Example
///
/// ```rust
/// use chorus::sync::{local_scope, LocalWaitGroup};
/// use chorus::Local;
///
/// async fn foo() {
///     let wait_group = LocalWaitGroup::new();
///     let wg_ref = &wait_group;
///     let number_executed_tasks = Local::new(0);
///     let counter_ref = &number_executed_tasks;
///
///     local_scope(|scope| async move {
///         for _ in 0..10 {
///             wg_ref.inc();
///             scope.spawn(async move {
///                 *counter_ref.borrow_mut() += 1;
///                 wg_ref.done();
///             });
///         }
///
///         wg_ref.wait().await.unwrap(); // wait until all tasks are completed
///         assert_eq!(*counter_ref.borrow(), 10);
///     })
///     .await;
/// }
/// ```
pub struct LocalWaitGroup {
    inner: UnsafeCell<Inner>,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl LocalWaitGroup {
    /// Creates a new `LocalWaitGroup`.
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(Inner {
                count: 0,
                waiters: WaitQueue::new(),
            }),
            no_send_marker: PhantomData,
        }
    }

    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    fn get_inner(&self) -> &mut Inner {
        unsafe { &mut *self.inner.get() }
    }

    /// Adds `count` tasks to wait for.
    #[inline(always)]
    pub fn add(&self, count: usize) {
        self.get_inner().count += count;
    }

    /// Adds one task to wait for.
    #[inline(always)]
    pub fn inc(&self) {
        self.add(1);
    }

    /// The number of tasks not yet completed.
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.get_inner().count
    }

    /// Marks one task as completed; the last completion resumes every parked
    /// waiter.
    ///
    /// # Panics
    ///
    /// If called more times than tasks were added.
    #[inline(always)]
    pub fn done(&self) {
        let inner = self.get_inner();
        inner.count -= 1;
        if inner.count != 0 {
            return;
        }

        // drain first: a resumed waiter may drop this wait group
        let mut parked: SmallVec<[NonNull<Clause>; 4]> = SmallVec::new();
        while let Some(clause) = inner.waiters.pop_front() {
            parked.push(clause);
        }
        for clause in parked {
            unsafe { trigger(clause, true) };
        }
    }

    /// Waits until all counted tasks are completed.
    #[inline(always)]
    #[must_use = "Future must be awaited to start the wait"]
    pub fn wait(&self) -> WaitLocalWaitGroup<'_> {
        WaitLocalWaitGroup::new(self, None, true)
    }

    /// Waits until all counted tasks are completed, giving up at `deadline`
    /// with [`TimedOut`](WaitResult::TimedOut).
    #[inline(always)]
    #[must_use = "Future must be awaited to start the wait"]
    pub fn wait_with_deadline(&self, deadline: Instant) -> WaitLocalWaitGroup<'_> {
        WaitLocalWaitGroup::new(self, Some(deadline), true)
    }

    /// Waits until all counted tasks are completed, giving up after `timeout`
    /// with [`TimedOut`](WaitResult::TimedOut).
    #[inline(always)]
    #[must_use = "Future must be awaited to start the wait"]
    pub fn wait_with_timeout(&self, timeout: Duration) -> WaitLocalWaitGroup<'_> {
        self.wait_with_deadline(Instant::now() + timeout)
    }

    /// The wait used by scope joins: never canceled, never timed out.
    ///
    /// A scope must keep waiting through shutdown, because the borrows it
    /// guards are only released when every child finished.
    #[inline(always)]
    pub(crate) fn join(&self) -> WaitLocalWaitGroup<'_> {
        WaitLocalWaitGroup::new(self, None, false)
    }
}

impl Default for LocalWaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Sync for LocalWaitGroup {}
