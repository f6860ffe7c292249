use std::any::Any;
use std::cell::UnsafeCell;
use std::collections::{TryReserveError, VecDeque};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::ptr::NonNull;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::get_task_from_context;
use crate::runtime::local_executor;
use crate::runtime::registry::RuntimeObject;
use crate::sync::clause::{trigger, Clause, ClauseOp, Probe, Selection, WaitQueue, WakeReason};
use crate::sync::select::Selectable;
use crate::sync::{DoneResult, RecvResult, SendResult, TryRecvResult, TrySendResult};
use crate::BUG_MESSAGE;

/// Lifecycle of a channel.
///
/// `Open` until [`done`](LocalChannel::done), then `Done` until
/// [`close`](LocalChannel::close), then `Closed`. `Open → Closed` is also
/// legal. Transitions are one-way.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ChanState {
    Open,
    Done,
    Closed,
}

/// The internal data structure of a [`LocalChannel`]. It holds the buffered
/// elements and the queues of parked senders and receivers.
pub(crate) struct Inner<T> {
    storage: VecDeque<T>,
    capacity: usize,
    state: ChanState,
    senders: WaitQueue,
    receivers: WaitQueue,
}

impl<T> Inner<T> {
    /// Immediate paths of a send. `slot` holds the payload and is emptied on
    /// [`Probe::Completed`].
    ///
    /// Never suspends. Parked receivers are always preferred over the buffer:
    /// a receiver can only be parked while the buffer is empty.
    fn try_send_impl(&mut self, slot: &mut Option<T>) -> Probe {
        if slot.is_none() {
            return Probe::Invalid;
        }
        if self.state != ChanState::Open {
            return Probe::Closed;
        }

        if let Some(recv_clause) = self.receivers.pop_front() {
            unsafe {
                let value = slot.take().unwrap_unchecked();
                let dst = recv_clause.as_ref().data.cast::<Option<T>>();
                *dst = Some(value);
                trigger(recv_clause, true);
            }
            return Probe::Completed;
        }

        if self.storage.len() < self.capacity {
            self.storage
                .push_back(unsafe { slot.take().unwrap_unchecked() });
            return Probe::Completed;
        }

        Probe::NotReady
    }

    /// Immediate paths of a receive. The received value is written into
    /// `slot` on [`Probe::Completed`].
    ///
    /// The buffer is drained before the channel state is consulted, so
    /// elements buffered before [`done`](LocalChannel::done) are still
    /// delivered, in order.
    fn try_recv_impl(&mut self, slot: &mut Option<T>) -> Probe {
        if let Some(value) = self.storage.pop_front() {
            *slot = Some(value);
            // a buffer slot was freed: refill it from the oldest parked
            // sender, which keeps end-to-end FIFO intact
            if let Some(send_clause) = self.senders.pop_front() {
                unsafe {
                    let src = send_clause.as_ref().data.cast::<Option<T>>();
                    let value = (*src).take().expect(BUG_MESSAGE);
                    self.storage.push_back(value);
                    trigger(send_clause, true);
                }
            }
            return Probe::Completed;
        }

        if let Some(send_clause) = self.senders.pop_front() {
            // rendezvous: take the payload straight out of the parked sender
            unsafe {
                let src = send_clause.as_ref().data.cast::<Option<T>>();
                *slot = Some((*src).take().expect(BUG_MESSAGE));
                trigger(send_clause, true);
            }
            return Probe::Completed;
        }

        if self.state != ChanState::Open {
            return Probe::Closed;
        }

        Probe::NotReady
    }

    /// Pops every parked clause from both queues.
    ///
    /// The clauses are collected before any of them is triggered: a resumed
    /// coroutine may immediately call back into this channel.
    fn drain_parked(&mut self) -> SmallVec<[NonNull<Clause>; 8]> {
        let mut parked = SmallVec::new();
        while let Some(clause) = self.senders.pop_front() {
            parked.push(clause);
        }
        while let Some(clause) = self.receivers.pop_front() {
            parked.push(clause);
        }
        parked
    }

    fn done(&mut self) -> DoneResult {
        if self.state != ChanState::Open {
            return DoneResult::AlreadyDone;
        }
        self.state = ChanState::Done;
        for clause in self.drain_parked() {
            unsafe { trigger(clause, false) };
        }
        DoneResult::Ok
    }

    fn close(&mut self) {
        self.state = ChanState::Closed;
        self.storage.clear();
        for clause in self.drain_parked() {
            unsafe { trigger(clause, false) };
        }
    }
}

// region futures

/// Future of a blocking send.
///
/// On the first poll it runs the immediate paths (direct handoff to the
/// oldest parked receiver, then buffer space); otherwise it parks itself on
/// the channel's sender queue until a receiver, the deadline or done/close
/// resumes it. The payload stays inside this future while parked, so the
/// matching receiver copies it out before the sender is resumed.
pub struct WaitSend<'chan, T> {
    channel: &'chan LocalChannel<T>,
    value: Option<T>,
    deadline: Option<Instant>,
    selection: Selection,
    clause: Clause,
    was_parked: bool,
}

impl<'chan, T> WaitSend<'chan, T> {
    #[inline(always)]
    fn new(channel: &'chan LocalChannel<T>, value: T, deadline: Option<Instant>) -> Self {
        Self {
            channel,
            value: Some(value),
            deadline,
            selection: Selection::new(),
            clause: Clause::new(0, std::ptr::null_mut()),
            was_parked: false,
        }
    }
}

impl<T> Future for WaitSend<'_, T> {
    type Output = SendResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        if !this.was_parked {
            if !local_executor().can_block() {
                let value = unsafe { this.value.take().unwrap_unchecked() };
                return Poll::Ready(SendResult::Canceled(value));
            }

            let inner = unsafe { &mut *this.channel.inner.get() };
            match inner.try_send_impl(&mut this.value) {
                Probe::Completed => return Poll::Ready(SendResult::Ok),
                Probe::Closed => {
                    let value = unsafe { this.value.take().unwrap_unchecked() };
                    return Poll::Ready(SendResult::Closed(value));
                }
                Probe::NotReady => {}
                Probe::Invalid => unreachable!("{BUG_MESSAGE}"),
            }

            this.was_parked = true;
            this.clause = Clause::new(0, (&mut this.value as *mut Option<T>).cast());
            this.clause.owner = &mut this.selection;
            inner
                .senders
                .push_back(unsafe { NonNull::new_unchecked(&mut this.clause) });
            let task = unsafe { get_task_from_context!(cx) };
            unsafe {
                Selection::commit_park(
                    NonNull::from(&mut this.selection),
                    task,
                    &mut this.clause,
                    1,
                    this.deadline,
                    true,
                );
            }
            return Poll::Pending;
        }

        match this.selection.reason {
            WakeReason::Parked => Poll::Pending,
            WakeReason::Completed { .. } => Poll::Ready(SendResult::Ok),
            WakeReason::Closed { .. } => {
                let value = unsafe { this.value.take().unwrap_unchecked() };
                Poll::Ready(SendResult::Closed(value))
            }
            WakeReason::TimedOut => {
                let value = unsafe { this.value.take().unwrap_unchecked() };
                Poll::Ready(SendResult::TimedOut(value))
            }
            WakeReason::Canceled => {
                let value = unsafe { this.value.take().unwrap_unchecked() };
                Poll::Ready(SendResult::Canceled(value))
            }
        }
    }
}

impl<T> Drop for WaitSend<'_, T> {
    fn drop(&mut self) {
        self.selection.abandon();
    }
}

/// Future of a blocking receive.
///
/// On the first poll it runs the immediate paths (buffer, then a parked
/// sender, then the done check); otherwise it parks itself on the channel's
/// receiver queue. The matching sender writes the value into this future
/// before the receiver is resumed.
pub struct WaitRecv<'chan, T> {
    channel: &'chan LocalChannel<T>,
    slot: Option<T>,
    deadline: Option<Instant>,
    selection: Selection,
    clause: Clause,
    was_parked: bool,
}

impl<'chan, T> WaitRecv<'chan, T> {
    #[inline(always)]
    fn new(channel: &'chan LocalChannel<T>, deadline: Option<Instant>) -> Self {
        Self {
            channel,
            slot: None,
            deadline,
            selection: Selection::new(),
            clause: Clause::new(0, std::ptr::null_mut()),
            was_parked: false,
        }
    }
}

impl<T> Future for WaitRecv<'_, T> {
    type Output = RecvResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        if !this.was_parked {
            if !local_executor().can_block() {
                return Poll::Ready(RecvResult::Canceled);
            }

            let inner = unsafe { &mut *this.channel.inner.get() };
            match inner.try_recv_impl(&mut this.slot) {
                Probe::Completed => {
                    let value = unsafe { this.slot.take().unwrap_unchecked() };
                    return Poll::Ready(RecvResult::Ok(value));
                }
                Probe::Closed => return Poll::Ready(RecvResult::Closed),
                Probe::NotReady => {}
                Probe::Invalid => unreachable!("{BUG_MESSAGE}"),
            }

            this.was_parked = true;
            this.clause = Clause::new(0, (&mut this.slot as *mut Option<T>).cast());
            this.clause.owner = &mut this.selection;
            inner
                .receivers
                .push_back(unsafe { NonNull::new_unchecked(&mut this.clause) });
            let task = unsafe { get_task_from_context!(cx) };
            unsafe {
                Selection::commit_park(
                    NonNull::from(&mut this.selection),
                    task,
                    &mut this.clause,
                    1,
                    this.deadline,
                    true,
                );
            }
            return Poll::Pending;
        }

        match this.selection.reason {
            WakeReason::Parked => Poll::Pending,
            WakeReason::Completed { .. } => {
                let value = unsafe { this.slot.take().unwrap_unchecked() };
                Poll::Ready(RecvResult::Ok(value))
            }
            WakeReason::Closed { .. } => Poll::Ready(RecvResult::Closed),
            WakeReason::TimedOut => Poll::Ready(RecvResult::TimedOut),
            WakeReason::Canceled => Poll::Ready(RecvResult::Canceled),
        }
    }
}

impl<T> Drop for WaitRecv<'_, T> {
    fn drop(&mut self) {
        self.selection.abandon();
    }
}

// endregion

// region channel

/// A typed FIFO channel between coroutines of one executor.
///
/// Every message is one `T`. With a positive capacity the channel buffers up
/// to that many elements; with capacity zero it is a pure rendezvous: a send
/// completes only together with a matching receive.
///
/// A channel ends in two steps. [`done`](LocalChannel::done) marks that no
/// more values will be sent: parked operations are woken with a closed
/// result, new sends fail, receives still drain the buffer.
/// [`close`](LocalChannel::close) additionally discards buffered elements.
/// Clients that care about buffered values must drain them before closing.
///
/// # Example
///
/// ```rust
/// use chorus::sync::LocalChannel;
///
/// async fn foo() {
///     let channel = LocalChannel::bounded(2); // capacity = 2
///
///     channel.send(1).await.unwrap();
///     let res = channel.recv().await.unwrap();
///     assert_eq!(res, 1);
/// }
/// ```
pub struct LocalChannel<T> {
    pub(crate) inner: UnsafeCell<Inner<T>>,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl<T> LocalChannel<T> {
    fn with_storage(storage: VecDeque<T>, capacity: usize) -> Self {
        Self {
            inner: UnsafeCell::new(Inner {
                storage,
                capacity,
                state: ChanState::Open,
                senders: WaitQueue::new(),
                receivers: WaitQueue::new(),
            }),
            no_send_marker: PhantomData,
        }
    }

    /// Creates a channel buffering up to `capacity` elements.
    /// `capacity == 0` creates a rendezvous channel.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_storage(VecDeque::with_capacity(capacity), capacity)
    }

    /// Creates a rendezvous channel: sends complete only together with a
    /// matching receive.
    pub fn rendezvous() -> Self {
        Self::bounded(0)
    }

    /// Creates a channel with an unlimited buffer. Sends never park.
    pub fn unbounded() -> Self {
        Self::with_storage(VecDeque::new(), usize::MAX)
    }

    /// Fallible constructor used by [`handle::open`](crate::sync::handle::open):
    /// reports buffer allocation failure instead of aborting.
    pub(crate) fn try_bounded(capacity: usize) -> Result<Self, TryReserveError> {
        let mut storage = VecDeque::new();
        storage.try_reserve_exact(capacity)?;
        Ok(Self::with_storage(storage, capacity))
    }

    /// Sends `value`, parking until a peer or buffer space is available.
    pub fn send(&self, value: T) -> WaitSend<'_, T> {
        WaitSend::new(self, value, None)
    }

    /// Sends `value`, giving up at `deadline` with
    /// [`TimedOut`](SendResult::TimedOut).
    pub fn send_with_deadline(&self, value: T, deadline: Instant) -> WaitSend<'_, T> {
        WaitSend::new(self, value, Some(deadline))
    }

    /// Sends `value`, giving up after `timeout` with
    /// [`TimedOut`](SendResult::TimedOut).
    pub fn send_with_timeout(&self, value: T, timeout: Duration) -> WaitSend<'_, T> {
        self.send_with_deadline(value, Instant::now() + timeout)
    }

    /// Sends `value` only if it can be done without parking.
    pub fn try_send(&self, value: T) -> TrySendResult<T> {
        if !local_executor().can_block() {
            return TrySendResult::Canceled(value);
        }

        let inner = unsafe { &mut *self.inner.get() };
        let mut slot = Some(value);
        match inner.try_send_impl(&mut slot) {
            Probe::Completed => TrySendResult::Ok,
            Probe::Closed => TrySendResult::Closed(unsafe { slot.take().unwrap_unchecked() }),
            Probe::NotReady => TrySendResult::Full(unsafe { slot.take().unwrap_unchecked() }),
            Probe::Invalid => unreachable!("{BUG_MESSAGE}"),
        }
    }

    /// Receives the next value, parking until one is available.
    pub fn recv(&self) -> WaitRecv<'_, T> {
        WaitRecv::new(self, None)
    }

    /// Receives the next value, giving up at `deadline` with
    /// [`TimedOut`](RecvResult::TimedOut).
    pub fn recv_with_deadline(&self, deadline: Instant) -> WaitRecv<'_, T> {
        WaitRecv::new(self, Some(deadline))
    }

    /// Receives the next value, giving up after `timeout` with
    /// [`TimedOut`](RecvResult::TimedOut).
    pub fn recv_with_timeout(&self, timeout: Duration) -> WaitRecv<'_, T> {
        self.recv_with_deadline(Instant::now() + timeout)
    }

    /// Receives the next value only if it can be done without parking.
    pub fn try_recv(&self) -> TryRecvResult<T> {
        if !local_executor().can_block() {
            return TryRecvResult::Canceled;
        }

        let inner = unsafe { &mut *self.inner.get() };
        let mut slot = None;
        match inner.try_recv_impl(&mut slot) {
            Probe::Completed => TryRecvResult::Ok(unsafe { slot.take().unwrap_unchecked() }),
            Probe::Closed => TryRecvResult::Closed,
            Probe::NotReady => TryRecvResult::Empty,
            Probe::Invalid => unreachable!("{BUG_MESSAGE}"),
        }
    }

    /// Marks that no more values will be sent.
    ///
    /// Every parked sender and receiver is woken with a closed result. New
    /// sends fail immediately; receives drain the remaining buffered values
    /// in FIFO order and then fail.
    ///
    /// Returns [`AlreadyDone`](DoneResult::AlreadyDone), changing nothing, if
    /// the channel was already done or closed.
    pub fn done(&self) -> DoneResult {
        unsafe { &mut *self.inner.get() }.done()
    }

    /// Closes the channel: wakes every parked sender and receiver with a
    /// closed result and discards buffered elements.
    ///
    /// Prior [`done`](LocalChannel::done) is not required; closing simply
    /// abandons blocked peers.
    pub fn close(&self) {
        unsafe { &mut *self.inner.get() }.close()
    }

    /// The number of buffered elements.
    pub fn len(&self) -> usize {
        unsafe { &*self.inner.get() }.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The buffer capacity. Zero for rendezvous channels.
    pub fn capacity(&self) -> usize {
        unsafe { &*self.inner.get() }.capacity
    }

    /// Whether [`done`](LocalChannel::done) or [`close`](LocalChannel::close)
    /// was called.
    pub fn is_done(&self) -> bool {
        unsafe { &*self.inner.get() }.state != ChanState::Open
    }

    /// Splits the channel into a sending and a receiving half.
    pub fn split(&self) -> (LocalSender<'_, T>, LocalReceiver<'_, T>) {
        (LocalSender::new(self), LocalReceiver::new(self))
    }
}

unsafe impl<T> Sync for LocalChannel<T> {}

impl<T> Selectable for LocalChannel<T> {
    fn probe(&self, op: ClauseOp, data: *mut ()) -> Probe {
        let inner = unsafe { &mut *self.inner.get() };
        let slot = unsafe { &mut *data.cast::<Option<T>>() };
        match op {
            ClauseOp::Send => inner.try_send_impl(slot),
            ClauseOp::Recv => inner.try_recv_impl(slot),
        }
    }

    unsafe fn park(&self, op: ClauseOp, clause: NonNull<Clause>) {
        let inner = unsafe { &mut *self.inner.get() };
        debug_assert!(inner.state == ChanState::Open, "{BUG_MESSAGE}");
        match op {
            ClauseOp::Send => inner.senders.push_back(clause),
            ClauseOp::Recv => inner.receivers.push_back(clause),
        }
    }
}

impl<T: 'static> RuntimeObject for LocalChannel<T> {
    fn as_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn close_object(&self) {
        self.close();
    }
}

// endregion

// region sender and receiver

/// The sending half of a [`LocalChannel`], created by
/// [`split`](LocalChannel::split).
pub struct LocalSender<'chan, T> {
    channel: &'chan LocalChannel<T>,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl<'chan, T> LocalSender<'chan, T> {
    #[inline(always)]
    fn new(channel: &'chan LocalChannel<T>) -> Self {
        Self {
            channel,
            no_send_marker: PhantomData,
        }
    }

    pub fn send(&self, value: T) -> WaitSend<'chan, T> {
        self.channel.send(value)
    }

    pub fn send_with_deadline(&self, value: T, deadline: Instant) -> WaitSend<'chan, T> {
        self.channel.send_with_deadline(value, deadline)
    }

    pub fn send_with_timeout(&self, value: T, timeout: Duration) -> WaitSend<'chan, T> {
        self.channel.send_with_timeout(value, timeout)
    }

    pub fn try_send(&self, value: T) -> TrySendResult<T> {
        self.channel.try_send(value)
    }

    /// Marks the channel as done: the receiving half can still drain it.
    pub fn done(&self) -> DoneResult {
        self.channel.done()
    }

    pub fn close(&self) {
        self.channel.close()
    }
}

impl<T> Clone for LocalSender<'_, T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel,
            no_send_marker: PhantomData,
        }
    }
}

/// The receiving half of a [`LocalChannel`], created by
/// [`split`](LocalChannel::split).
pub struct LocalReceiver<'chan, T> {
    channel: &'chan LocalChannel<T>,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl<'chan, T> LocalReceiver<'chan, T> {
    #[inline(always)]
    fn new(channel: &'chan LocalChannel<T>) -> Self {
        Self {
            channel,
            no_send_marker: PhantomData,
        }
    }

    pub fn recv(&self) -> WaitRecv<'chan, T> {
        self.channel.recv()
    }

    pub fn recv_with_deadline(&self, deadline: Instant) -> WaitRecv<'chan, T> {
        self.channel.recv_with_deadline(deadline)
    }

    pub fn recv_with_timeout(&self, timeout: Duration) -> WaitRecv<'chan, T> {
        self.channel.recv_with_timeout(timeout)
    }

    pub fn try_recv(&self) -> TryRecvResult<T> {
        self.channel.try_recv()
    }

    pub fn close(&self) {
        self.channel.close()
    }
}

impl<T> Clone for LocalReceiver<'_, T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel,
            no_send_marker: PhantomData,
        }
    }
}

// endregion

#[cfg(test)]
mod tests {
    use super::*;
    use crate as chorus;
    use crate::sync::local_scope;
    use crate::utils::droppable_element::DroppableElement;
    use crate::yield_now;
    use crate::Local;

    #[chorus_macros::test]
    fn test_rendezvous() {
        let ch = LocalChannel::rendezvous();
        let ch_ref = &ch;

        local_scope(|scope| async move {
            scope.spawn(async move {
                ch_ref.send([0x01u8, 0x02, 0x03, 0x04]).await.unwrap();
            });

            let res = ch_ref.recv().await.unwrap();
            assert_eq!(res, [0x01, 0x02, 0x03, 0x04]);
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_buffered_fifo() {
        let ch = LocalChannel::bounded(3);

        ch.try_send(10u8).unwrap();
        ch.try_send(20).unwrap();
        ch.try_send(30).unwrap();
        assert!(matches!(ch.try_send(40), TrySendResult::Full(40)));

        assert_eq!(ch.recv().await.unwrap(), 10);
        assert_eq!(ch.recv().await.unwrap(), 20);
        assert_eq!(ch.recv().await.unwrap(), 30);
    }

    #[chorus_macros::test]
    fn test_full_channel_parks_sender_and_receiver_refills() {
        let ch = LocalChannel::bounded(1);
        let ch_ref = &ch;

        ch.try_send(1).unwrap();

        local_scope(|scope| async move {
            scope.spawn(async move {
                // the buffer is full, so this parks until the receiver
                // frees a slot
                ch_ref.send(2).await.unwrap();
                ch_ref.send(3).await.unwrap();
            });

            // let the sender park first
            yield_now().await;

            assert_eq!(ch_ref.recv().await.unwrap(), 1);
            assert_eq!(ch_ref.recv().await.unwrap(), 2);
            assert_eq!(ch_ref.recv().await.unwrap(), 3);
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_send_deadline_expires() {
        let ch = LocalChannel::rendezvous();

        let before = Instant::now();
        match ch.send_with_timeout(4u32, Duration::from_millis(10)).await {
            SendResult::TimedOut(value) => assert_eq!(value, 4),
            _ => panic!("should time out"),
        }
        assert!(before.elapsed() >= Duration::from_millis(10));

        // the expired clause must be gone: otherwise this would find a sender
        assert!(matches!(ch.try_recv(), TryRecvResult::Empty));
    }

    #[chorus_macros::test]
    fn test_recv_deadline_expires() {
        let ch = LocalChannel::<u32>::bounded(1);

        match ch.recv_with_timeout(Duration::from_millis(10)).await {
            RecvResult::TimedOut => {}
            _ => panic!("should time out"),
        }

        // the expired clause must be gone: this send must go to the buffer,
        // not to a parked receiver
        ch.try_send(7).unwrap();
        assert_eq!(ch.len(), 1);
    }

    #[chorus_macros::test]
    fn test_deadline_send_completes_in_time() {
        let ch = LocalChannel::bounded(1);
        let ch_ref = &ch;

        ch.try_send(1).unwrap();

        local_scope(|scope| async move {
            scope.spawn(async move {
                match ch_ref.send_with_timeout(2, Duration::from_secs(1)).await {
                    SendResult::Ok => {}
                    _ => panic!("should complete before the deadline"),
                }
            });

            // let the sender park first
            yield_now().await;

            assert_eq!(ch_ref.recv().await.unwrap(), 1);
            assert_eq!(ch_ref.recv().await.unwrap(), 2);
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_done_drains_then_fails() {
        let ch = LocalChannel::bounded(2);

        ch.try_send(7u8).unwrap();
        ch.try_send(8).unwrap();
        assert!(matches!(ch.done(), DoneResult::Ok));

        assert_eq!(ch.recv().await.unwrap(), 7);
        assert_eq!(ch.recv().await.unwrap(), 8);
        assert!(matches!(ch.recv().await, RecvResult::Closed));

        match ch.send(9).await {
            SendResult::Closed(value) => assert_eq!(value, 9),
            _ => panic!("should be closed"),
        }
        assert!(matches!(ch.try_send(10), TrySendResult::Closed(10)));
    }

    #[chorus_macros::test]
    fn test_done_is_one_shot() {
        let ch = LocalChannel::<u8>::bounded(1);

        assert!(matches!(ch.done(), DoneResult::Ok));
        assert!(matches!(ch.done(), DoneResult::AlreadyDone));
    }

    #[chorus_macros::test]
    fn test_done_wakes_parked_sender() {
        let ch = LocalChannel::rendezvous();
        let ch_ref = &ch;

        local_scope(|scope| async move {
            scope.spawn(async move {
                match ch_ref.send(2).await {
                    SendResult::Closed(value) => assert_eq!(value, 2),
                    _ => panic!("should be woken by done"),
                }
            });

            // let the sender park first
            yield_now().await;

            assert!(matches!(ch_ref.done(), DoneResult::Ok));
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_close_wakes_all_parked() {
        let ch = LocalChannel::<u8>::rendezvous();
        let ch_ref = &ch;
        let woken = Local::new(0);
        let woken_ref = &woken;

        local_scope(|scope| async move {
            for _ in 0..3 {
                scope.spawn(async move {
                    assert!(matches!(ch_ref.recv().await, RecvResult::Closed));
                    *woken_ref.borrow_mut() += 1;
                });
            }

            // let all three receivers park first
            yield_now().await;

            ch_ref.close();
        })
        .await;

        assert_eq!(*woken.borrow(), 3);
    }

    #[chorus_macros::test]
    fn test_close_discards_buffered() {
        let ch = LocalChannel::bounded(2);

        ch.try_send(1u8).unwrap();
        ch.try_send(2).unwrap();
        ch.close();

        assert!(matches!(ch.try_recv(), TryRecvResult::Closed));
        assert_eq!(ch.len(), 0);
    }

    #[chorus_macros::test]
    fn test_zero_sized_elements() {
        let ch = LocalChannel::bounded(2);

        ch.try_send(()).unwrap();
        ch.try_send(()).unwrap();
        assert!(matches!(ch.try_send(()), TrySendResult::Full(())));

        ch.recv().await.unwrap();
        ch.recv().await.unwrap();
        assert!(matches!(ch.try_recv(), TryRecvResult::Empty));
    }

    #[chorus_macros::test]
    fn test_unbounded() {
        let ch = LocalChannel::unbounded();
        let ch_ref = &ch;

        local_scope(|scope| async move {
            scope.spawn(async move {
                for i in 0..100 {
                    ch_ref.send(i).await.unwrap();
                }
                ch_ref.done().unwrap();
            });

            for i in 0..100 {
                assert_eq!(ch_ref.recv().await.unwrap(), i);
            }
            assert!(matches!(ch_ref.recv().await, RecvResult::Closed));
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_try_ops() {
        let ch = LocalChannel::bounded(1);

        assert!(matches!(ch.try_recv(), TryRecvResult::Empty));
        assert!(matches!(ch.try_send(1), TrySendResult::Ok));
        assert!(matches!(ch.try_recv(), TryRecvResult::Ok(1)));
        assert!(matches!(ch.try_send(2), TrySendResult::Ok));
        match ch.try_send(3) {
            TrySendResult::Full(value) => assert_eq!(value, 3),
            _ => panic!("should be full"),
        }

        ch.close();

        assert!(matches!(ch.try_recv(), TryRecvResult::Closed));
        match ch.try_send(4) {
            TrySendResult::Closed(value) => assert_eq!(value, 4),
            _ => panic!("should be closed"),
        }
    }

    const N: usize = 125;

    #[chorus_macros::test]
    fn test_wait_for_recv() {
        let ch = LocalChannel::bounded(N);
        let ch_ref = &ch;

        local_scope(|scope| async move {
            scope.spawn(async move {
                for i in 0..N {
                    ch_ref.send(i).await.unwrap();
                }

                yield_now().await;

                ch_ref.close();
            });

            for i in 0..N {
                assert_eq!(ch_ref.recv().await.unwrap(), i);
            }

            assert!(matches!(ch_ref.recv().await, RecvResult::Closed));
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_wait_for_send() {
        let ch = LocalChannel::bounded(N);
        let ch_ref = &ch;

        local_scope(|scope| async move {
            scope.spawn(async move {
                for i in 0..N {
                    assert_eq!(ch_ref.recv().await.unwrap(), i);
                }

                yield_now().await;

                assert_eq!(ch_ref.recv().await.unwrap(), N);
            });

            for i in 0..=N {
                ch_ref.send(i).await.unwrap();
            }
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_split() {
        let ch = LocalChannel::bounded(N);
        let (tx, rx) = ch.split();

        local_scope(|scope| async move {
            scope.spawn(async move {
                for i in 0..N * 2 {
                    assert_eq!(rx.recv().await.unwrap(), i);
                }
            });

            for i in 0..N * 2 {
                tx.send(i).await.unwrap();
            }
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_drop_on_transfer_and_close() {
        let dropped = Local::new(Vec::new());
        let ch = LocalChannel::bounded(1);

        ch.try_send(DroppableElement::new(1, dropped.clone()))
            .unwrap();
        match ch.try_recv() {
            TryRecvResult::Ok(element) => assert_eq!(element.value, 1),
            _ => panic!("should receive"),
        }
        // the received element is dropped at the end of the match above
        assert_eq!(dropped.borrow().as_slice(), [1]);

        ch.try_send(DroppableElement::new(2, dropped.clone()))
            .unwrap();
        ch.close();
        // close discards the buffered element
        assert_eq!(dropped.borrow().as_slice(), [1, 2]);

        match ch.try_send(DroppableElement::new(3, dropped.clone())) {
            TrySendResult::Closed(element) => assert_eq!(element.value, 3),
            _ => panic!("should be closed"),
        }
        assert_eq!(dropped.borrow().as_slice(), [1, 2, 3]);
    }

    #[chorus_macros::test]
    fn test_cancel_on_shutdown() {
        let ch = LocalChannel::<u8>::rendezvous();
        let ch_ref = &ch;

        local_scope(|scope| async move {
            scope.spawn(async move {
                assert!(matches!(ch_ref.recv().await, RecvResult::Canceled));
            });

            // let the receiver park first
            yield_now().await;

            crate::local_executor().shutdown();

            assert!(matches!(ch_ref.try_send(1), TrySendResult::Canceled(1)));
            match ch_ref.send(2).await {
                SendResult::Canceled(value) => assert_eq!(value, 2),
                _ => panic!("should be canceled"),
            }
        })
        .await;
    }
}
