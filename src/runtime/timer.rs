use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::time::Instant;

use crate::runtime::task::Task;
use crate::sync::clause::Selection;

/// Key of an armed timer. `seq` disambiguates timers armed for the same
/// instant and keeps them in arming order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct TimerKey {
    pub(crate) at: Instant,
    pub(crate) seq: u64,
}

/// What happens when a timer fires.
pub(crate) enum TimerEvent {
    /// Requeue a task parked by [`sleep`](crate::sleep()).
    WakeTask(Task),
    /// Expire a parked channel operation: unlink its clauses and resume its
    /// owner with a timed-out result.
    ExpireSelection(NonNull<Selection>),
}

/// Pending timers, ordered by expiry instant.
pub(crate) struct TimerQueue {
    entries: BTreeMap<TimerKey, TimerEvent>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn arm(&mut self, at: Instant, event: TimerEvent) -> TimerKey {
        let key = TimerKey {
            at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, event);
        key
    }

    /// Removes an armed timer. A key that already fired is ignored.
    pub(crate) fn disarm(&mut self, key: TimerKey) {
        self.entries.remove(&key);
    }

    /// The instant the earliest pending timer fires at.
    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.entries.keys().next().map(|key| key.at)
    }

    /// Pops the earliest timer if it already expired.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<TimerEvent> {
        let key = *self.entries.keys().next()?;
        if key.at <= now {
            self.entries.remove(&key)
        } else {
            None
        }
    }
}
