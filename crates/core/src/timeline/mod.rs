//! Virtual millisecond timeline shared by the controller and the bridge.
//!
//! Nothing here sleeps. Owners advance the queue to a point in time and
//! receive every timer that came due, in order, with the exact instant it was
//! due. Real-time drivers simply call `advance_to` with the elapsed wall clock.

/// Milliseconds since the owner started.
pub type Millis = u64;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Timer that came due during an advance.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<T> {
    pub id: TimerId,
    pub due: Millis,
    pub target: T,
}

#[derive(Debug, Clone)]
struct ScheduledTimer<T> {
    id: TimerId,
    due: Millis,
    period: Option<Millis>,
    target: T,
}

/// Ordered queue of one-shot and periodic timers.
#[derive(Debug)]
pub struct TimerQueue<T> {
    timers: Vec<ScheduledTimer<T>>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T: Clone> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires once at `due`.
    pub fn schedule_at(&mut self, due: Millis, target: T) -> TimerId {
        self.insert(due, None, target)
    }

    /// Fires every `period` ms, starting one period after `now`.
    pub fn schedule_every(&mut self, now: Millis, period: Millis, target: T) -> TimerId {
        let period = period.max(1);
        self.insert(now.saturating_add(period), Some(period), target)
    }

    /// Removes a timer. Returns false when it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.id != id);
        self.timers.len() != before
    }

    /// Removes every timer whose target matches.
    pub fn cancel_where(&mut self, mut matches: impl FnMut(&T) -> bool) -> usize {
        let before = self.timers.len();
        self.timers.retain(|timer| !matches(&timer.target));
        before - self.timers.len()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn next_due(&self) -> Option<Millis> {
        self.timers.first().map(|timer| timer.due)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Pops the earliest timer due at or before `now`. Periodic timers are
    /// re-armed one period after the instant they were due.
    pub fn pop_due(&mut self, now: Millis) -> Option<Fired<T>> {
        if self.timers.first()?.due > now {
            return None;
        }

        let timer = self.timers.remove(0);
        let fired = Fired {
            id: timer.id,
            due: timer.due,
            target: timer.target.clone(),
        };

        if let Some(period) = timer.period {
            self.reinsert(ScheduledTimer {
                due: timer.due.saturating_add(period),
                ..timer
            });
        }

        Some(fired)
    }

    fn insert(&mut self, due: Millis, period: Option<Millis>, target: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.reinsert(ScheduledTimer {
            id,
            due,
            period,
            target,
        });
        id
    }

    fn reinsert(&mut self, timer: ScheduledTimer<T>) {
        // Timers sharing a due instant keep their insertion order.
        let index = self
            .timers
            .partition_point(|existing| existing.due <= timer.due);
        self.timers.insert(index, timer);
    }
}
