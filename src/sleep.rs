use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::get_task_from_context;
use crate::runtime::local_executor;
use crate::runtime::timer::TimerEvent;

/// Future of a [`sleep`] call.
pub struct Sleep {
    was_yielded: bool,
    sleep_until: Instant,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.was_yielded {
            Poll::Ready(())
        } else {
            this.was_yielded = true;
            let task = unsafe { get_task_from_context!(cx) };
            local_executor().arm_timer(this.sleep_until, TimerEvent::WakeTask(task));
            Poll::Pending
        }
    }
}

/// Suspends the current coroutine for at least `duration`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use chorus::sleep;
///
/// async fn foo() {
///     sleep(Duration::from_millis(10)).await;
/// }
/// ```
#[inline(always)]
#[must_use = "Future must be awaited to start the sleep"]
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        was_yielded: false,
        sleep_until: Instant::now() + duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as chorus;
    use crate::Local;

    #[chorus_macros::test]
    fn test_sleep() {
        async fn sleep_for(dur: Duration, number: u16, arr: Local<Vec<u16>>) {
            sleep(dur).await;
            arr.borrow_mut().push(number);
        }

        let arr = Local::new(Vec::new());

        let executor = local_executor();
        executor.spawn_local(sleep_for(Duration::from_millis(1), 1, arr.clone()));
        executor.spawn_local(sleep_for(Duration::from_millis(4), 4, arr.clone()));
        executor.spawn_local(sleep_for(Duration::from_millis(3), 3, arr.clone()));
        executor.spawn_local(sleep_for(Duration::from_millis(2), 2, arr.clone()));

        sleep(Duration::from_millis(6)).await;
        assert_eq!(vec![1, 2, 3, 4], *arr.borrow());
    }
}
