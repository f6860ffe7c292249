use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::ptr::NonNull;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::get_task_from_context;
use crate::runtime::local_executor;
use crate::sync::clause::{Clause, ClauseOp, Probe, Selection, WakeReason};
use crate::sync::channel::LocalChannel;
use crate::sync::ChooseResult;

/// A channel viewed through a type-erased clause.
///
/// Implemented by [`LocalChannel`] for every element type; the selection
/// engine needs only these two entry points, so one [`Selector`] can span
/// channels of different element types.
pub(crate) trait Selectable {
    /// Tries to complete the operation immediately. `data` is a
    /// `*mut Option<T>` of the channel's element type: emptied for sends,
    /// filled for receives.
    fn probe(&self, op: ClauseOp, data: *mut ()) -> Probe;

    /// Parks `clause` on the wait queue matching `op`.
    ///
    /// # Safety
    ///
    /// `clause` must stay valid until it is triggered or unlinked, and the
    /// channel must be open.
    unsafe fn park(&self, op: ClauseOp, clause: NonNull<Clause>);
}

struct ClauseSpec<'sel> {
    target: &'sel (dyn Selectable + 'sel),
    op: ClauseOp,
    data: *mut (),
}

/// A list of send/receive clauses over any number of channels, committing to
/// exactly one of them.
///
/// Clauses are tried in the order they were added: the first immediately
/// satisfiable clause wins, which makes the list order a caller-controlled
/// priority. If none is satisfiable, [`choose`](Selector::choose) parks one
/// clause on every target channel and resumes on the first event; the other
/// clauses are unlinked before it returns.
///
/// Payloads travel through caller-owned `Option` slots: a send clause takes
/// its value out of the slot when it commits, a receive clause puts the
/// received value in. Slots of losing clauses are left untouched.
///
/// # Example
///
/// ```rust
/// use chorus::sync::{ChooseResult, LocalChannel, Selector};
///
/// async fn foo() {
///     let c1 = LocalChannel::<u32>::rendezvous();
///     let c2 = LocalChannel::<u32>::bounded(1);
///
///     let mut slot1 = None;
///     let mut slot2 = None;
///     let mut selector = Selector::new();
///     selector.recv(&c1, &mut slot1).recv(&c2, &mut slot2);
///
///     let result = selector.choose().await;
///     drop(selector);
///     match result {
///         ChooseResult::Completed(0) => assert!(slot1.is_some()),
///         ChooseResult::Completed(1) => assert!(slot2.is_some()),
///         _ => unreachable!(),
///     }
/// }
/// ```
pub struct Selector<'sel> {
    clauses: SmallVec<[ClauseSpec<'sel>; 4]>,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl<'sel> Selector<'sel> {
    pub fn new() -> Self {
        Self {
            clauses: SmallVec::new(),
            no_send_marker: PhantomData,
        }
    }

    /// Adds a send clause. `slot` must hold `Some(payload)`; the payload is
    /// taken out when this clause commits.
    pub fn send<T>(&mut self, channel: &'sel LocalChannel<T>, slot: &'sel mut Option<T>) -> &mut Self {
        self.clauses.push(ClauseSpec {
            target: channel,
            op: ClauseOp::Send,
            data: (slot as *mut Option<T>).cast(),
        });
        self
    }

    /// Adds a receive clause. The received value is put into `slot` when this
    /// clause commits.
    pub fn recv<T>(&mut self, channel: &'sel LocalChannel<T>, slot: &'sel mut Option<T>) -> &mut Self {
        self.clauses.push(ClauseSpec {
            target: channel,
            op: ClauseOp::Recv,
            data: (slot as *mut Option<T>).cast(),
        });
        self
    }

    /// The number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Tries every clause in order; the first satisfiable one commits.
    fn probe_all(&mut self) -> Option<ChooseResult> {
        for (i, clause) in self.clauses.iter().enumerate() {
            match clause.target.probe(clause.op, clause.data) {
                Probe::Completed => return Some(ChooseResult::Completed(i)),
                Probe::Closed => return Some(ChooseResult::Closed(i)),
                Probe::Invalid => return Some(ChooseResult::Invalid(i)),
                Probe::NotReady => {}
            }
        }
        None
    }

    /// Commits to the first immediately satisfiable clause, without parking.
    ///
    /// Returns [`TimedOut`](ChooseResult::TimedOut) when no clause is
    /// satisfiable; channel state is left untouched in that case, so the
    /// probe can be repeated.
    pub fn try_choose(&mut self) -> ChooseResult {
        if !local_executor().can_block() {
            return ChooseResult::Canceled;
        }
        self.probe_all().unwrap_or(ChooseResult::TimedOut)
    }

    /// Commits to exactly one clause, parking until one becomes satisfiable.
    ///
    /// An empty selector never becomes satisfiable.
    pub fn choose(&mut self) -> WaitChoose<'_, 'sel> {
        WaitChoose::new(self, None)
    }

    /// Like [`choose`](Selector::choose), but gives up at `deadline` with
    /// [`TimedOut`](ChooseResult::TimedOut).
    pub fn choose_with_deadline(&mut self, deadline: Instant) -> WaitChoose<'_, 'sel> {
        WaitChoose::new(self, Some(deadline))
    }

    /// Like [`choose`](Selector::choose), but gives up after `timeout` with
    /// [`TimedOut`](ChooseResult::TimedOut).
    pub fn choose_with_timeout(&mut self, timeout: Duration) -> WaitChoose<'_, 'sel> {
        self.choose_with_deadline(Instant::now() + timeout)
    }
}

impl Default for Selector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Future of a blocking [`choose`](Selector::choose).
///
/// On the first poll it probes every clause in order; if none is satisfiable
/// it parks one clause per target channel, all owned by one selection, and
/// arms the deadline timer. Exactly one wake event wins; the selection
/// unlinks every other clause before this future's owner resumes.
pub struct WaitChoose<'cur, 'sel> {
    selector: &'cur mut Selector<'sel>,
    deadline: Option<Instant>,
    selection: Selection,
    parked_clauses: SmallVec<[Clause; 4]>,
    was_parked: bool,
}

impl<'cur, 'sel> WaitChoose<'cur, 'sel> {
    #[inline(always)]
    fn new(selector: &'cur mut Selector<'sel>, deadline: Option<Instant>) -> Self {
        Self {
            selector,
            deadline,
            selection: Selection::new(),
            parked_clauses: SmallVec::new(),
            was_parked: false,
        }
    }
}

impl Future for WaitChoose<'_, '_> {
    type Output = ChooseResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        if !this.was_parked {
            if !local_executor().can_block() {
                return Poll::Ready(ChooseResult::Canceled);
            }

            if let Some(result) = this.selector.probe_all() {
                return Poll::Ready(result);
            }

            this.was_parked = true;
            for (i, spec) in this.selector.clauses.iter().enumerate() {
                this.parked_clauses.push(Clause::new(i, spec.data));
            }
            // the clause list is complete; addresses are stable from here on
            for (clause, spec) in this
                .parked_clauses
                .iter_mut()
                .zip(this.selector.clauses.iter())
            {
                clause.owner = &mut this.selection;
                unsafe { spec.target.park(spec.op, NonNull::from(&mut *clause)) };
            }
            let task = unsafe { get_task_from_context!(cx) };
            unsafe {
                Selection::commit_park(
                    NonNull::from(&mut this.selection),
                    task,
                    this.parked_clauses.as_mut_ptr(),
                    this.parked_clauses.len(),
                    this.deadline,
                    true,
                );
            }
            return Poll::Pending;
        }

        match this.selection.reason {
            WakeReason::Parked => Poll::Pending,
            WakeReason::Completed { index } => Poll::Ready(ChooseResult::Completed(index)),
            WakeReason::Closed { index } => Poll::Ready(ChooseResult::Closed(index)),
            WakeReason::TimedOut => Poll::Ready(ChooseResult::TimedOut),
            WakeReason::Canceled => Poll::Ready(ChooseResult::Canceled),
        }
    }
}

impl Drop for WaitChoose<'_, '_> {
    fn drop(&mut self) {
        self.selection.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as chorus;
    use crate::sync::{local_scope, TrySendResult};
    use crate::yield_now;

    #[chorus_macros::test]
    fn test_choose_priority() {
        let c1 = LocalChannel::<u8>::rendezvous();
        let c2 = LocalChannel::<u8>::bounded(1);

        c2.try_send(42).unwrap();

        let mut b1 = None;
        let mut b2 = None;
        let mut selector = Selector::new();
        selector.recv(&c1, &mut b1).recv(&c2, &mut b2);

        // c1 is not satisfiable, c2 is
        assert_eq!(selector.try_choose(), ChooseResult::Completed(1));
        drop(selector);

        assert_eq!(b1, None);
        assert_eq!(b2, Some(42));
    }

    #[chorus_macros::test]
    fn test_choose_prefers_earlier_clause() {
        let c1 = LocalChannel::<u8>::bounded(1);
        let c2 = LocalChannel::<u8>::bounded(1);

        c1.try_send(1).unwrap();
        c2.try_send(2).unwrap();

        let mut b1 = None;
        let mut b2 = None;
        let mut selector = Selector::new();
        selector.recv(&c1, &mut b1).recv(&c2, &mut b2);

        assert_eq!(selector.try_choose(), ChooseResult::Completed(0));
        drop(selector);

        assert_eq!(b1, Some(1));
        assert_eq!(b2, None);
    }

    #[chorus_macros::test]
    fn test_choose_wakeup_unlinks_losers() {
        let c1 = LocalChannel::<u8>::rendezvous();
        let c2 = LocalChannel::<u8>::rendezvous();
        let c1_ref = &c1;
        let c2_ref = &c2;

        local_scope(|scope| async move {
            scope.spawn(async move {
                c2_ref.send(5).await.unwrap();
            });

            let mut b1 = None;
            let mut b2 = None;
            let mut selector = Selector::new();
            selector.recv(c1_ref, &mut b1).recv(c2_ref, &mut b2);

            assert_eq!(selector.choose().await, ChooseResult::Completed(1));
            drop(selector);
            assert_eq!(b1, None);
            assert_eq!(b2, Some(5));

            // the losing clause must be gone from the first channel
            assert!(matches!(c1_ref.try_send(9), TrySendResult::Full(9)));
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_choose_send_parks_until_receiver() {
        let ch = LocalChannel::<u8>::rendezvous();
        let ch_ref = &ch;

        local_scope(|scope| async move {
            scope.spawn(async move {
                assert_eq!(ch_ref.recv().await.unwrap(), 9);
            });

            let mut payload = Some(9);
            let mut selector = Selector::new();
            selector.send(ch_ref, &mut payload);

            assert_eq!(selector.choose().await, ChooseResult::Completed(0));
            drop(selector);
            assert_eq!(payload, None);
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_try_choose_is_idempotent() {
        let c1 = LocalChannel::<u8>::rendezvous();

        let mut b1 = None;
        let mut selector = Selector::new();
        selector.recv(&c1, &mut b1);

        assert_eq!(selector.try_choose(), ChooseResult::TimedOut);
        assert_eq!(selector.try_choose(), ChooseResult::TimedOut);
        drop(selector);

        assert_eq!(b1, None);
        assert_eq!(c1.len(), 0);
    }

    #[chorus_macros::test]
    fn test_choose_deadline_expires() {
        let c1 = LocalChannel::<u8>::rendezvous();
        let c2 = LocalChannel::<u8>::rendezvous();

        let mut b1 = None;
        let mut b2 = None;
        let mut selector = Selector::new();
        selector.recv(&c1, &mut b1).recv(&c2, &mut b2);

        let before = Instant::now();
        assert_eq!(
            selector.choose_with_timeout(Duration::from_millis(10)).await,
            ChooseResult::TimedOut
        );
        assert!(before.elapsed() >= Duration::from_millis(10));

        // both clauses must be unlinked
        assert!(matches!(c1.try_send(1), TrySendResult::Full(1)));
        assert!(matches!(c2.try_send(2), TrySendResult::Full(2)));
    }

    #[chorus_macros::test]
    fn test_choose_send_commits_to_buffer() {
        let ch = LocalChannel::<u8>::bounded(1);

        let mut payload = Some(3);
        let mut selector = Selector::new();
        selector.send(&ch, &mut payload);

        assert_eq!(selector.try_choose(), ChooseResult::Completed(0));
        // the slot is now empty, so re-running the same clause is malformed
        assert_eq!(selector.try_choose(), ChooseResult::Invalid(0));
        drop(selector);

        assert_eq!(payload, None);
        assert_eq!(ch.try_recv().unwrap(), 3);
    }

    #[chorus_macros::test]
    fn test_choose_on_done_channel() {
        let c1 = LocalChannel::<u8>::bounded(2);
        c1.try_send(7).unwrap();
        c1.done().unwrap();

        let mut b1 = None;
        let mut selector = Selector::new();
        selector.recv(&c1, &mut b1);

        // the buffered element is still drained, then the done state shows
        assert_eq!(selector.try_choose(), ChooseResult::Completed(0));
        assert_eq!(selector.try_choose(), ChooseResult::Closed(0));
        drop(selector);
        assert_eq!(b1, Some(7));

        let c2 = LocalChannel::<u8>::bounded(1);
        c2.done().unwrap();
        let mut payload = Some(1);
        let mut selector = Selector::new();
        selector.send(&c2, &mut payload);

        assert_eq!(selector.try_choose(), ChooseResult::Closed(0));
        drop(selector);
        // the payload was not consumed
        assert_eq!(payload, Some(1));
    }

    #[chorus_macros::test]
    fn test_empty_selector_never_matches() {
        let mut selector = Selector::new();
        assert_eq!(selector.try_choose(), ChooseResult::TimedOut);
        assert_eq!(
            selector.choose_with_timeout(Duration::from_millis(1)).await,
            ChooseResult::TimedOut
        );
    }

    #[chorus_macros::test]
    fn test_choose_canceled_on_shutdown() {
        let c1 = LocalChannel::<u8>::rendezvous();
        let c1_ref = &c1;

        local_scope(|scope| async move {
            scope.spawn(async move {
                let mut b = None;
                let mut selector = Selector::new();
                selector.recv(c1_ref, &mut b);
                assert_eq!(selector.choose().await, ChooseResult::Canceled);
            });

            // let the selection park first
            yield_now().await;

            crate::local_executor().shutdown();

            let mut b = None;
            let mut selector = Selector::new();
            selector.recv(c1_ref, &mut b);
            assert_eq!(selector.try_choose(), ChooseResult::Canceled);
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_choose_fifo_across_selections() {
        let ch = LocalChannel::<u8>::rendezvous();
        let ch_ref = &ch;
        let order = crate::Local::new(Vec::new());
        let order_ref = &order;

        local_scope(|scope| async move {
            for i in 0..3u8 {
                scope.spawn(async move {
                    let mut slot = None;
                    let mut selector = Selector::new();
                    selector.recv(ch_ref, &mut slot);
                    assert_eq!(selector.choose().await, ChooseResult::Completed(0));
                    drop(selector);
                    order_ref.borrow_mut().push((i, slot.take().unwrap()));
                });
            }

            // let all three selections park first
            yield_now().await;

            for value in [10, 20, 30] {
                ch_ref.send(value).await.unwrap();
            }
        })
        .await;

        // the oldest parked selection receives first
        assert_eq!(order.borrow().as_slice(), [(0, 10), (1, 20), (2, 30)]);
    }
}
