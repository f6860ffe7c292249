//! Communication primitives between coroutines of one executor:
//! [`LocalChannel`], the multi-way [`Selector`], [`LocalWaitGroup`] and
//! [`local_scope`].

pub mod channel;
pub(crate) mod clause;
pub mod handle;
pub mod scope;
pub mod select;
pub mod wait_group;

pub use channel::{LocalChannel, LocalReceiver, LocalSender, WaitRecv, WaitSend};
pub use scope::{local_scope, LocalScope};
pub use select::{Selector, WaitChoose};
pub use wait_group::LocalWaitGroup;

/// The result of a send operation.
///
/// # Variants
///
/// - [`Ok`](SendResult::Ok): the value was handed to a receiver or buffered.
///
/// - [`Closed`](SendResult::Closed): the channel is done or closed. Contains
///   the value that could not be sent.
///
/// - [`TimedOut`](SendResult::TimedOut): the deadline expired before a
///   receiver or buffer space became available. Contains the value. Only
///   returned by the `_with_deadline`/`_with_timeout` flavors.
///
/// - [`Canceled`](SendResult::Canceled): the runtime is shutting down.
///   Contains the value.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum SendResult<T> {
    /// The value was handed to a receiver or buffered.
    Ok,
    /// The channel is done or closed. Contains the value that could not be
    /// sent.
    Closed(T),
    /// The deadline expired. Contains the value that could not be sent.
    TimedOut(T),
    /// The runtime is shutting down. Contains the value that could not be
    /// sent.
    Canceled(T),
}

impl<T> SendResult<T> {
    /// # Panics
    ///
    /// If the result is not [`Ok`](SendResult::Ok).
    pub fn unwrap(self) {
        match self {
            Self::Ok => (),
            Self::Closed(_) => panic!("Unwrap on SendResult::Closed: the channel is closed"),
            Self::TimedOut(_) => panic!("Unwrap on SendResult::TimedOut: the deadline expired"),
            Self::Canceled(_) => {
                panic!("Unwrap on SendResult::Canceled: the runtime is shutting down")
            }
        }
    }
}

/// The result of a non-blocking send attempt.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum TrySendResult<T> {
    /// The value was handed to a receiver or buffered.
    Ok,
    /// No receiver is parked and the buffer is full. Contains the value that
    /// could not be sent.
    Full(T),
    /// The channel is done or closed. Contains the value that could not be
    /// sent.
    Closed(T),
    /// The runtime is shutting down. Contains the value that could not be
    /// sent.
    Canceled(T),
}

impl<T> TrySendResult<T> {
    /// # Panics
    ///
    /// If the result is not [`Ok`](TrySendResult::Ok).
    pub fn unwrap(self) {
        match self {
            Self::Ok => (),
            Self::Full(_) => panic!("Unwrap on TrySendResult::Full: the channel is full"),
            Self::Closed(_) => panic!("Unwrap on TrySendResult::Closed: the channel is closed"),
            Self::Canceled(_) => {
                panic!("Unwrap on TrySendResult::Canceled: the runtime is shutting down")
            }
        }
    }
}

/// The result of a receive operation.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum RecvResult<T> {
    /// A value was received.
    Ok(T),
    /// The channel is done (and drained) or closed.
    Closed,
    /// The deadline expired before a value became available. Only returned by
    /// the `_with_deadline`/`_with_timeout` flavors.
    TimedOut,
    /// The runtime is shutting down.
    Canceled,
}

impl<T> RecvResult<T> {
    /// # Panics
    ///
    /// If the result is not [`Ok`](RecvResult::Ok).
    pub fn unwrap(self) -> T {
        match self {
            Self::Ok(value) => value,
            Self::Closed => panic!("Unwrap on RecvResult::Closed: the channel is closed"),
            Self::TimedOut => panic!("Unwrap on RecvResult::TimedOut: the deadline expired"),
            Self::Canceled => {
                panic!("Unwrap on RecvResult::Canceled: the runtime is shutting down")
            }
        }
    }
}

/// The result of a non-blocking receive attempt.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum TryRecvResult<T> {
    /// A value was received.
    Ok(T),
    /// The buffer is empty and no sender is parked.
    Empty,
    /// The channel is done (and drained) or closed.
    Closed,
    /// The runtime is shutting down.
    Canceled,
}

impl<T> TryRecvResult<T> {
    /// # Panics
    ///
    /// If the result is not [`Ok`](TryRecvResult::Ok).
    pub fn unwrap(self) -> T {
        match self {
            Self::Ok(value) => value,
            Self::Empty => panic!("Unwrap on TryRecvResult::Empty: the channel is empty"),
            Self::Closed => panic!("Unwrap on TryRecvResult::Closed: the channel is closed"),
            Self::Canceled => {
                panic!("Unwrap on TryRecvResult::Canceled: the runtime is shutting down")
            }
        }
    }
}

/// The result of a [`LocalWaitGroup`] wait.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum WaitResult {
    /// Every counted task completed.
    Ok,
    /// The deadline expired while tasks were still running. Only returned by
    /// the `_with_deadline`/`_with_timeout` flavors.
    TimedOut,
    /// The runtime is shutting down.
    Canceled,
}

impl WaitResult {
    /// # Panics
    ///
    /// If the result is not [`Ok`](WaitResult::Ok).
    pub fn unwrap(self) {
        match self {
            Self::Ok => (),
            Self::TimedOut => panic!("Unwrap on WaitResult::TimedOut: the deadline expired"),
            Self::Canceled => {
                panic!("Unwrap on WaitResult::Canceled: the runtime is shutting down")
            }
        }
    }
}

/// The result of [`done`](LocalChannel::done).
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum DoneResult {
    /// The channel is now done.
    Ok,
    /// The channel was already done or closed; nothing changed.
    AlreadyDone,
}

impl DoneResult {
    /// # Panics
    ///
    /// If the result is not [`Ok`](DoneResult::Ok).
    pub fn unwrap(self) {
        if matches!(self, Self::AlreadyDone) {
            panic!("Unwrap on DoneResult::AlreadyDone: the channel was already done");
        }
    }
}

/// The result of a [`choose`](Selector::choose) operation.
///
/// When the outcome concerns a single clause, its index in the
/// [`Selector`] is carried along, so the caller can tell which channel
/// completed or failed.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum ChooseResult {
    /// The clause at this index committed; its transfer already happened.
    Completed(usize),
    /// The clause at this index hit a done or closed channel.
    Closed(usize),
    /// The clause at this index is malformed: a send with an empty payload
    /// slot.
    Invalid(usize),
    /// No clause became satisfiable before the deadline. All clauses are
    /// unlinked.
    TimedOut,
    /// The runtime is shutting down.
    Canceled,
}

impl ChooseResult {
    /// Returns the index of the committed clause.
    ///
    /// # Panics
    ///
    /// If the result is not [`Completed`](ChooseResult::Completed).
    pub fn unwrap(self) -> usize {
        match self {
            Self::Completed(index) => index,
            Self::Closed(index) => {
                panic!("Unwrap on ChooseResult::Closed: the channel of clause {index} is closed")
            }
            Self::Invalid(index) => {
                panic!("Unwrap on ChooseResult::Invalid: clause {index} is malformed")
            }
            Self::TimedOut => panic!("Unwrap on ChooseResult::TimedOut: the deadline expired"),
            Self::Canceled => {
                panic!("Unwrap on ChooseResult::Canceled: the runtime is shutting down")
            }
        }
    }
}
