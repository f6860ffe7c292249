use std::task::{RawWaker, RawWakerVTable, Waker};

use crate::runtime::local_executor;
use crate::runtime::task::Task;

/// The waker's data pointer is a `*const Task` living in the executor's
/// current `exec_task` frame.
///
/// # Safety
///
/// - A [`Task`] must never be executed after it returned
///   [`Poll::Ready`](std::task::Poll::Ready).
///
/// - The data pointer is only valid during the current poll. Every future in
///   this crate reads the task out of the waker inside `poll` and stores the
///   copy; the waker itself must not be kept across suspension points.
unsafe fn clone(data_ptr: *const ()) -> RawWaker {
    RawWaker::new(data_ptr, &VTABLE)
}

unsafe fn wake(data_ptr: *const ()) {
    let task = unsafe { data_ptr.cast::<Task>().read() };
    local_executor().spawn_local_task(task);
}

unsafe fn wake_by_ref(data_ptr: *const ()) {
    let task = unsafe { data_ptr.cast::<Task>().read() };
    local_executor().spawn_local_task(task);
}

/// Do nothing, because the executor releases the [`Task`] only when it is
/// needed.
unsafe fn drop(_data_ptr: *const ()) {}

pub(crate) const VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);

/// Creates a [`Waker`] carrying `task_ptr` in its data pointer.
#[inline(always)]
pub(crate) fn create_waker(task_ptr: *const ()) -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(task_ptr, &VTABLE)) }
}
