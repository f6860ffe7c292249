use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::ptr::NonNull;
use std::task::{Context, Poll};
use std::time::Instant;

use ahash::AHashMap;

use crate::runtime::config::Config;
use crate::runtime::registry::Registry;
use crate::runtime::task::Task;
use crate::runtime::task_pool::TaskPool;
use crate::runtime::timer::{TimerEvent, TimerKey, TimerQueue};
use crate::runtime::waker::create_waker;
use crate::sync::clause::Selection;

thread_local! {
    static LOCAL_EXECUTOR: UnsafeCell<Option<Executor>> = const { UnsafeCell::new(None) };
}

pub(crate) const MSG_LOCAL_EXECUTOR_IS_NOT_INIT: &str = "\
    ------------------------------------------------------------------------\n\
    |    Local executor is not initialized.                                |\n\
    |    Please initialize it first.                                       |\n\
    |                                                                      |\n\
    |    1 - use let executor = Executor::init();                          |\n\
    |    2 - use executor.spawn_local(your_future)                         |\n\
    |    3 - use executor.run()                                            |\n\
    ------------------------------------------------------------------------";

/// Returns the executor of the current thread.
///
/// # Panics
///
/// If the executor is not initialized on this thread.
#[inline(always)]
pub fn local_executor() -> &'static mut Executor {
    let ptr = LOCAL_EXECUTOR.with(UnsafeCell::get);
    unsafe { (*ptr).as_mut().expect(MSG_LOCAL_EXECUTOR_IS_NOT_INIT) }
}

/// Whether [`Executor::init`] was called on the current thread.
pub(crate) fn is_local_executor_init() -> bool {
    let ptr = LOCAL_EXECUTOR.with(UnsafeCell::get);
    unsafe { (*ptr).is_some() }
}

/// A single-threaded cooperative executor.
///
/// Exactly one coroutine runs at a time; coroutines yield only at suspension
/// points (parked channel operations, [`sleep`](crate::sleep()),
/// [`yield_now`](crate::yield_now())). All state reachable from coroutines of
/// one executor is therefore mutated without locks.
pub struct Executor {
    config: Config,
    exec_series: usize,
    tasks: VecDeque<Task>,
    timers: TimerQueue,
    /// Blocking operations currently parked on channel wait queues, so that
    /// [`shutdown`](Executor::shutdown) can cancel them.
    parked: AHashMap<u64, NonNull<Selection>>,
    next_parked_id: u64,
    registry: Registry,
    is_shutting_down: bool,
    was_stopped: bool,
}

impl Executor {
    /// Initializes the executor on the current thread with the given
    /// [`Config`] and returns it.
    pub fn init_with_config(config: Config) -> &'static mut Executor {
        TaskPool::init();
        let ptr = LOCAL_EXECUTOR.with(UnsafeCell::get);
        unsafe {
            *ptr = Some(Executor {
                config,
                exec_series: 0,
                tasks: VecDeque::with_capacity(config.initial_run_queue_capacity),
                timers: TimerQueue::new(),
                parked: AHashMap::new(),
                next_parked_id: 0,
                registry: Registry::new(),
                is_shutting_down: false,
                was_stopped: false,
            });
            (*ptr).as_mut().unwrap_unchecked()
        }
    }

    /// Initializes the executor on the current thread with the default
    /// [`Config`] and returns it.
    pub fn init() -> &'static mut Executor {
        Self::init_with_config(Config::default())
    }

    /// Polls `task` immediately.
    ///
    /// Wake chains (a completing operation resuming its parked peer, which
    /// completes another operation, ...) run inline up to the configured
    /// burst limit; beyond it the task is queued instead, bounding recursion.
    #[inline(always)]
    pub(crate) fn exec_task(&mut self, mut task: Task) {
        self.exec_series += 1;
        if self.exec_series > self.config.wake_burst_limit {
            self.exec_series -= 1;
            self.spawn_local_task(task);
            return;
        }

        let task_ptr: *mut Task = &mut task;
        let future = unsafe { &mut *task.future_ptr };
        let waker = create_waker(task_ptr.cast());
        let mut context = Context::from_waker(&waker);

        match unsafe { Pin::new_unchecked(future) }.poll(&mut context) {
            Poll::Ready(()) => unsafe { task.release_future() },
            Poll::Pending => {}
        }
        self.exec_series -= 1;
    }

    /// Polls `future` immediately, like a function call that may suspend.
    #[inline(always)]
    pub fn exec_future<F: Future<Output = ()>>(&mut self, future: F) {
        let task = Task::from_future(future);
        self.exec_task(task);
    }

    /// Queues `future` to be polled later.
    #[inline(always)]
    pub fn spawn_local<F: Future<Output = ()>>(&mut self, future: F) {
        let task = Task::from_future(future);
        self.spawn_local_task(task);
    }

    #[inline(always)]
    pub(crate) fn spawn_local_task(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Whether blocking operations may be started. `false` after
    /// [`shutdown`](Executor::shutdown) was initiated.
    #[inline(always)]
    pub fn can_block(&self) -> bool {
        !self.is_shutting_down
    }

    /// Whether [`shutdown`](Executor::shutdown) was initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down
    }

    /// Initiates shutdown: every parked blocking operation is woken with a
    /// canceled result and every new blocking operation fails immediately
    /// with a canceled result. The run loop keeps going until the resumed
    /// coroutines finish.
    pub fn shutdown(&mut self) {
        if self.is_shutting_down {
            return;
        }
        self.is_shutting_down = true;

        // one at a time: canceling a selection runs its coroutine, which may
        // resume (and thereby deregister) other parked selections
        loop {
            let Some((id, selection)) = self.parked.iter().map(|(id, sel)| (*id, *sel)).next()
            else {
                break;
            };
            self.parked.remove(&id);
            unsafe { Selection::cancel(selection) };
        }
    }

    /// Makes the current [`run`](Executor::run) call return as soon as the
    /// running task suspends or finishes.
    pub fn stop(&mut self) {
        self.was_stopped = true;
    }

    pub(crate) fn register_parked(&mut self, selection: NonNull<Selection>) -> u64 {
        let id = self.next_parked_id;
        self.next_parked_id += 1;
        self.parked.insert(id, selection);
        id
    }

    pub(crate) fn deregister_parked(&mut self, id: u64) {
        self.parked.remove(&id);
    }

    pub(crate) fn arm_timer(&mut self, at: Instant, event: TimerEvent) -> TimerKey {
        self.timers.arm(at, event)
    }

    pub(crate) fn disarm_timer(&mut self, key: TimerKey) {
        self.timers.disarm(key);
    }

    pub(crate) fn registry(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Fires expired timers and sleeps until the next one when the run queue
    /// is empty. Returns `true` when the run loop must stop.
    fn background(&mut self) -> bool {
        self.exec_series = 0;

        let now = Instant::now();
        while let Some(event) = self.timers.pop_expired(now) {
            match event {
                TimerEvent::WakeTask(task) => self.spawn_local_task(task),
                TimerEvent::ExpireSelection(selection) => unsafe {
                    Selection::expire(selection);
                },
            }
        }

        if !self.tasks.is_empty() {
            return false;
        }

        if let Some(at) = self.timers.next_expiry() {
            let now = Instant::now();
            if at > now {
                std::thread::sleep(at - now);
            }
            return false;
        }

        if !self.parked.is_empty() {
            panic!(
                "all coroutines are parked on channels and no timer is armed; \
                 the executor would sleep forever"
            );
        }

        true
    }

    /// Runs queued tasks until the executor is stopped or fully idle (no
    /// runnable task, no armed timer, no parked operation).
    pub fn run(&mut self) {
        loop {
            if self.was_stopped {
                break;
            }
            match self.tasks.pop_front() {
                Some(task) => {
                    self.exec_series = 0;
                    self.exec_task(task);
                }
                None => {
                    if self.background() {
                        break;
                    }
                }
            }
        }

        self.was_stopped = false;
        self.is_shutting_down = false;
    }

    /// Runs the executor until `future` completes and returns its output.
    ///
    /// Fails when the executor was stopped before the future completed.
    pub fn run_and_block_on<T, Fut: Future<Output = T>>(
        &mut self,
        future: Fut,
    ) -> Result<T, &'static str> {
        struct StopAndWriteIntoPtr<R, Fut: Future<Output = R>> {
            res_ptr: *mut Option<R>,
            future: Fut,
        }

        impl<R, Fut: Future<Output = R>> Future for StopAndWriteIntoPtr<R, Fut> {
            type Output = ();

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let this = unsafe { self.get_unchecked_mut() };
                let mut pinned_fut = unsafe { Pin::new_unchecked(&mut this.future) };
                match pinned_fut.as_mut().poll(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(res) => {
                        unsafe { this.res_ptr.write(Some(res)) };
                        local_executor().stop();
                        Poll::Ready(())
                    }
                }
            }
        }

        let mut res = None;
        let wrapper = StopAndWriteIntoPtr {
            res_ptr: &mut res,
            future,
        };
        self.exec_future(wrapper);
        self.run();
        res.ok_or("the executor was stopped before the blocked-on future completed")
    }
}
