use std::cell::UnsafeCell;
use std::future::Future;
use std::mem;
use std::ptr;

use ahash::AHashMap;

use crate::BUG_MESSAGE;

thread_local! {
    static TASK_POOL: UnsafeCell<Option<TaskPool>> = const { UnsafeCell::new(None) };
}

/// Returns the thread-local [`TaskPool`].
///
/// # Panics
///
/// If the pool is not initialized on this thread.
#[inline(always)]
pub(crate) fn task_pool() -> &'static mut TaskPool {
    let ptr = TASK_POOL.with(UnsafeCell::get);
    unsafe { (*ptr).as_mut().expect(BUG_MESSAGE) }
}

/// Storage of reusable future allocations. The key is an allocation layout
/// (size, alignment), so a released slot is only ever handed to a future that
/// fits it exactly.
pub(crate) struct TaskPool {
    storage: AHashMap<(usize, usize), Vec<*mut ()>>,
}

impl TaskPool {
    pub(crate) fn init() {
        let ptr = TASK_POOL.with(UnsafeCell::get);
        unsafe {
            if (*ptr).is_none() {
                *ptr = Some(TaskPool {
                    storage: AHashMap::new(),
                });
            }
        }
    }

    /// Moves `future` into a pooled (or fresh) allocation and returns the
    /// erased pointer to it.
    ///
    /// The lifetime of the future is erased here. Non-`'static` futures are
    /// legal because every spawned task is driven to completion before its
    /// borrows end (see `local_scope`).
    #[inline(always)]
    pub(crate) fn acquire<F: Future<Output = ()>>(
        &mut self,
        future: F,
    ) -> *mut dyn Future<Output = ()> {
        let key = (mem::size_of::<F>(), mem::align_of::<F>());
        let pool = self.storage.entry(key).or_default();
        let raw: *mut (dyn Future<Output = ()> + '_) = if let Some(slot_ptr) = pool.pop() {
            let slot = slot_ptr.cast::<F>();
            unsafe { slot.write(future) };
            slot
        } else {
            let boxed: Box<dyn Future<Output = ()> + '_> = Box::new(future);
            Box::into_raw(boxed)
        };

        unsafe { mem::transmute(raw) }
    }

    /// Drops the future behind `ptr` and keeps its allocation for reuse.
    #[inline(always)]
    pub(crate) fn put(&mut self, ptr: *mut dyn Future<Output = ()>) {
        let key = unsafe { (mem::size_of_val(&*ptr), mem::align_of_val(&*ptr)) };
        unsafe { ptr::drop_in_place(ptr) };
        self.storage.entry(key).or_default().push(ptr.cast::<()>());
    }
}
