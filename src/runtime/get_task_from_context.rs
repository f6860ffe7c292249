/// Returns a [`Task`](crate::runtime::Task) from a
/// [`Context`](std::task::Context).
///
/// # Safety
///
/// May only be called with a [`Context`](std::task::Context) whose waker was
/// created by this crate's executor.
#[macro_export]
macro_rules! get_task_from_context {
    ($ctx:expr) => {
        std::ptr::read($ctx.waker().data().cast::<$crate::runtime::Task>())
    };
}
