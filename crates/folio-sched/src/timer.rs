//! Token-tagged timer queue.
//!
//! Timers are never collected implicitly: an owner tears its timers down
//! with [`TimerQueue::cancel`] (all timers for a token) or
//! [`TimerQueue::cancel_timer`] (one timer).

/// Identifier of a scheduled timer, unique within its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// A timer that has come due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<K, T> {
    pub id: TimerId,
    pub token: K,
    pub due_ms: u64,
    pub payload: T,
}

#[derive(Debug)]
struct TimerEntry<K, T> {
    id: TimerId,
    token: K,
    due_ms: u64,
    payload: T,
}

/// A set of pending deadlines, each tagged with a cancellation token.
#[derive(Debug)]
pub struct TimerQueue<K, T> {
    /// Kept sorted by `(due_ms, id)`.
    entries: Vec<TimerEntry<K, T>>,
    next_id: u64,
}

impl<K: PartialEq + Clone, T> TimerQueue<K, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `payload` to fire at `due_ms` under `token`.
    pub fn schedule(&mut self, token: K, due_ms: u64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        // Equal deadlines fire in scheduling order.
        let pos = self.entries.partition_point(|e| e.due_ms <= due_ms);
        self.entries.insert(
            pos,
            TimerEntry {
                id,
                token,
                due_ms,
                payload,
            },
        );
        id
    }

    /// Cancel every timer scheduled under `token`. Returns how many were
    /// removed.
    pub fn cancel(&mut self, token: &K) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| &e.token != token);
        before - self.entries.len()
    }

    /// Cancel a single timer. Returns `false` if it already fired or was
    /// cancelled.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(i) => {
                self.entries.remove(i);
                true
            },
            None => false,
        }
    }

    /// Remove and return every timer due at or before `now_ms`, earliest
    /// first.
    pub fn expire(&mut self, now_ms: u64) -> Vec<Fired<K, T>> {
        let due = self.entries.partition_point(|e| e.due_ms <= now_ms);
        self.entries
            .drain(..due)
            .map(|e| Fired {
                id: e.id,
                token: e.token,
                due_ms: e.due_ms,
                payload: e.payload,
            })
            .collect()
    }

    /// Deadline of the earliest pending timer.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.first().map(|e| e.due_ms)
    }

    /// Number of pending timers scheduled under `token`.
    pub fn pending_for(&self, token: &K) -> usize {
        self.entries.iter().filter(|e| &e.token == token).count()
    }

    /// Whether the timer `id` is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: PartialEq + Clone, T> Default for TimerQueue<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
