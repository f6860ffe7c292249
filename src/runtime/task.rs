use std::future::Future;

use crate::runtime::task_pool::task_pool;

/// `Task` is a lightweight handle to a spawned future.
///
/// It is `Copy`: the run queue, the timer service and parked channel
/// operations all pass the same erased pointer around. The future is released
/// exactly once, after it returns [`Poll::Ready`](std::task::Poll::Ready).
#[derive(Copy, Clone)]
pub struct Task {
    pub(crate) future_ptr: *mut dyn Future<Output = ()>,
}

impl Task {
    /// Returns a [`Task`] with the given future.
    #[inline(always)]
    pub(crate) fn from_future<F: Future<Output = ()>>(future: F) -> Self {
        Self {
            future_ptr: task_pool().acquire(future),
        }
    }

    /// Releases the wrapped future back to the task pool.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, after the future has returned
    /// [`Poll::Ready`](std::task::Poll::Ready). No copy of this [`Task`] may
    /// be used afterwards.
    #[inline(always)]
    pub(crate) unsafe fn release_future(self) {
        unsafe { task_pool().put(self.future_ptr) };
    }
}
