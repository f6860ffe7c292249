use std::collections::VecDeque;
use std::ptr;
use std::ptr::NonNull;
use std::time::Instant;

use crate::runtime::local_executor;
use crate::runtime::task::Task;
use crate::runtime::timer::{TimerEvent, TimerKey};
use crate::BUG_MESSAGE;

/// Kind of a pending channel operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ClauseOp {
    Send,
    Recv,
}

/// Outcome of trying to complete one clause immediately.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Probe {
    /// The transfer was performed.
    Completed,
    /// The channel is done or closed (for receives: and drained).
    Closed,
    /// The clause is malformed: a send with an empty payload slot.
    Invalid,
    /// The clause cannot complete now; it may be parked.
    NotReady,
}

/// Why a parked operation was resumed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum WakeReason {
    /// Not resumed yet.
    Parked,
    /// Clause `index` transferred its payload.
    Completed { index: usize },
    /// Clause `index` hit a done or closed channel.
    Closed { index: usize },
    /// The armed deadline fired.
    TimedOut,
    /// The runtime is shutting down.
    Canceled,
}

/// One pending operation linked into a channel wait queue.
///
/// The clause lives inside its owner's suspended future; the queue stores raw
/// links only. `data` points at caller-owned memory (`Option<T>` of the
/// channel's element type): it is taken from for sends and written to for
/// receives, always by the peer that completes the transfer.
pub(crate) struct Clause {
    pub(crate) owner: *mut Selection,
    pub(crate) index: usize,
    pub(crate) data: *mut (),
    /// The queue this clause is currently linked into; null when unlinked.
    pub(crate) queue: *mut WaitQueue,
}

impl Clause {
    pub(crate) fn new(index: usize, data: *mut ()) -> Self {
        Self {
            owner: ptr::null_mut(),
            index,
            data,
            queue: ptr::null_mut(),
        }
    }
}

/// FIFO queue of clauses parked on a channel.
pub(crate) struct WaitQueue {
    clauses: VecDeque<NonNull<Clause>>,
}

impl WaitQueue {
    pub(crate) const fn new() -> Self {
        Self {
            clauses: VecDeque::new(),
        }
    }

    /// Links `clause` at the tail and records the queue inside it.
    pub(crate) fn push_back(&mut self, mut clause: NonNull<Clause>) {
        unsafe { clause.as_mut().queue = self };
        self.clauses.push_back(clause);
    }

    /// Pops the oldest parked clause and marks it unlinked.
    pub(crate) fn pop_front(&mut self) -> Option<NonNull<Clause>> {
        let mut clause = self.clauses.pop_front()?;
        unsafe { clause.as_mut().queue = ptr::null_mut() };
        Some(clause)
    }

    /// Removes `clause` from whatever position it sits at.
    pub(crate) fn unlink(&mut self, clause: NonNull<Clause>) {
        if let Some(pos) = self.clauses.iter().position(|parked| *parked == clause) {
            let _ = self.clauses.remove(pos);
        }
    }
}

/// Shared header of every blocking channel call (send, receive, choose).
///
/// A standalone send or receive is a one-clause selection. The header records
/// the suspended task and the single wake event that won; all other clauses
/// and the armed timer are detached before the owner resumes, so nothing can
/// reach the operation's stack frame afterwards.
pub(crate) struct Selection {
    pub(crate) task: Option<Task>,
    pub(crate) reason: WakeReason,
    clauses: *mut Clause,
    n_clauses: usize,
    timer: Option<TimerKey>,
    parked_key: Option<u64>,
}

impl Selection {
    pub(crate) fn new() -> Self {
        Self {
            task: None,
            reason: WakeReason::Parked,
            clauses: ptr::null_mut(),
            n_clauses: 0,
            timer: None,
            parked_key: None,
        }
    }

    /// Registers the parked selection with the runtime: remembers the
    /// suspended task, arms the deadline timer and, for `cancelable`
    /// selections, makes the operation visible to
    /// [`shutdown`](crate::Executor::shutdown).
    ///
    /// Non-cancelable selections are used by scope joins: they must outlive
    /// shutdown because the borrows they guard are only released when every
    /// child finished, and the children themselves are reached through their
    /// own (cancelable or queued) wakers.
    ///
    /// # Safety
    ///
    /// `clauses` must point at `n_clauses` clauses that stay valid, together
    /// with `selection` itself, until the selection is resumed or dropped.
    /// Every clause must already be linked into its wait queue.
    pub(crate) unsafe fn commit_park(
        mut selection: NonNull<Self>,
        task: Task,
        clauses: *mut Clause,
        n_clauses: usize,
        deadline: Option<Instant>,
        cancelable: bool,
    ) {
        let sel = unsafe { selection.as_mut() };
        sel.task = Some(task);
        sel.reason = WakeReason::Parked;
        sel.clauses = clauses;
        sel.n_clauses = n_clauses;

        let executor = local_executor();
        sel.parked_key = if cancelable {
            Some(executor.register_parked(selection))
        } else {
            None
        };
        if let Some(at) = deadline {
            sel.timer = Some(executor.arm_timer(at, TimerEvent::ExpireSelection(selection)));
        }
    }

    /// Unlinks every still-linked clause and deregisters the timer and the
    /// cancelation entry.
    unsafe fn detach(&mut self) {
        for i in 0..self.n_clauses {
            let clause = unsafe { self.clauses.add(i) };
            let queue = unsafe { (*clause).queue };
            if !queue.is_null() {
                unsafe {
                    (*queue).unlink(NonNull::new_unchecked(clause));
                    (*clause).queue = ptr::null_mut();
                }
            }
        }

        let executor = local_executor();
        if let Some(key) = self.timer.take() {
            executor.disarm_timer(key);
        }
        if let Some(key) = self.parked_key.take() {
            executor.deregister_parked(key);
        }
    }

    /// Resumes the owner with `reason`. The winning clause, if any, has
    /// already been popped from its queue and its transfer performed.
    ///
    /// # Safety
    ///
    /// `selection` must be parked.
    pub(crate) unsafe fn wake(mut selection: NonNull<Self>, reason: WakeReason) {
        let sel = unsafe { selection.as_mut() };
        debug_assert!(matches!(sel.reason, WakeReason::Parked), "{BUG_MESSAGE}");
        sel.reason = reason;
        unsafe { sel.detach() };
        let task = sel.task.take().expect(BUG_MESSAGE);
        local_executor().exec_task(task);
    }

    /// The deadline timer fired: the timer entry is already popped.
    pub(crate) unsafe fn expire(selection: NonNull<Self>) {
        unsafe {
            (*selection.as_ptr()).timer = None;
            Self::wake(selection, WakeReason::TimedOut);
        }
    }

    /// The runtime is shutting down: the cancelation entry is already
    /// removed.
    pub(crate) unsafe fn cancel(selection: NonNull<Self>) {
        unsafe {
            (*selection.as_ptr()).parked_key = None;
            Self::wake(selection, WakeReason::Canceled);
        }
    }

    /// Cleanup for a future dropped while parked: unlink everything, resume
    /// nothing.
    pub(crate) fn abandon(&mut self) {
        if self.task.is_some() && matches!(self.reason, WakeReason::Parked) {
            unsafe { self.detach() };
            self.task = None;
        }
    }
}

/// Wakes the owner of a clause that was just popped from a wait queue.
///
/// # Safety
///
/// `clause` must have been parked through [`Selection::commit_park`] and
/// popped (not merely peeked) from its queue; its transfer, if `completed`,
/// must already be done.
pub(crate) unsafe fn trigger(clause: NonNull<Clause>, completed: bool) {
    let (owner, index) = {
        let clause = unsafe { clause.as_ref() };
        (clause.owner, clause.index)
    };
    let reason = if completed {
        WakeReason::Completed { index }
    } else {
        WakeReason::Closed { index }
    };
    unsafe { Selection::wake(NonNull::new_unchecked(owner), reason) };
}
