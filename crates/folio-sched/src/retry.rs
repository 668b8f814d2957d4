//! Bounded-attempt retry control with per-attempt timeouts.
//!
//! A [`RetryRun`] tracks one operation across attempts. The caller performs
//! the actual work and reports back; the run arms timeout and resume timers
//! in the caller's [`TimerQueue`] under the caller's token, and answers
//! every signal with a [`Step`] telling the caller what to do next.
//!
//! ```text
//! start ─▶ Launch(1) ─fail/timeout─▶ Retrying ─resume─▶ Launch(2) ─ ...
//!             │                                           │
//!          succeed ─▶ Succeeded            last failure ─▶ Exhausted
//! ```

use serde::{Deserialize, Serialize};

use crate::timer::{TimerId, TimerQueue};

/// Limits for a bounded operation. Immutable and freely shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Budget for each attempt; 0 disables the timeout.
    pub per_attempt_timeout_ms: u64,
    /// Pause between a failed attempt and the next one.
    pub delay_between_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, per_attempt_timeout_ms: u64, delay_between_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            per_attempt_timeout_ms,
            delay_between_ms,
        }
    }
}

/// How an individual attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The action itself signalled failure.
    Errored,
    /// The per-attempt timer fired first.
    TimedOut,
}

/// Timer payloads armed by a run. The caller wraps them into its own
/// timer payload type and hands them back through [`RetryRun::on_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTimer {
    /// Attempt `attempt` ran out of time.
    Timeout { attempt: u32 },
    /// Attempt `attempt` may start now.
    Resume { attempt: u32 },
}

/// What the caller must do after feeding a signal to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Start attempt `attempt` now.
    Launch { attempt: u32 },
    /// Attempt `failed` failed. If `delay_ms` is 0, attempt `next` has
    /// already begun and must be started now; otherwise a resume timer
    /// will produce [`Step::Launch`] later.
    Retrying {
        failed: u32,
        failure: AttemptFailure,
        next: u32,
        delay_ms: u64,
    },
    /// Attempt `attempt` succeeded; the run is finished.
    Succeeded { attempt: u32 },
    /// The final attempt failed; the run is finished.
    Exhausted { attempts: u32, last: AttemptFailure },
    /// The signal was stale or irrelevant; nothing to do.
    Ignored,
}

impl Step {
    /// The attempt the caller has to start right away, if any.
    pub fn launch_now(&self) -> Option<u32> {
        match *self {
            Step::Launch { attempt } => Some(attempt),
            Step::Retrying {
                next, delay_ms: 0, ..
            } => Some(next),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running { timeout: Option<TimerId> },
    Backoff { next: u32, timer: TimerId },
    Succeeded,
    Exhausted,
    Cancelled,
}

/// Per-operation retry state.
///
/// `K` is the cancellation token every timer is tagged with; `T` is the
/// caller's timer payload type, built from a [`RetryTimer`] by `wrap`.
#[derive(Debug)]
pub struct RetryRun<K, T> {
    policy: RetryPolicy,
    token: K,
    wrap: fn(RetryTimer) -> T,
    attempt: u32,
    phase: Phase,
    last_failure: Option<AttemptFailure>,
}

impl<K: PartialEq + Clone, T> RetryRun<K, T> {
    /// Begin a run: attempt 1 starts immediately.
    pub fn start(
        policy: RetryPolicy,
        token: K,
        wrap: fn(RetryTimer) -> T,
        timers: &mut TimerQueue<K, T>,
        now_ms: u64,
    ) -> (Self, Step) {
        let mut run = Self {
            policy: RetryPolicy::new(
                policy.max_attempts,
                policy.per_attempt_timeout_ms,
                policy.delay_between_ms,
            ),
            token,
            wrap,
            attempt: 0,
            phase: Phase::Cancelled,
            last_failure: None,
        };
        let step = run.begin_attempt(1, timers, now_ms);
        (run, step)
    }

    /// Report that `attempt` completed successfully.
    pub fn succeed(&mut self, attempt: u32, timers: &mut TimerQueue<K, T>) -> Step {
        let Phase::Running { timeout } = self.phase else {
            return Step::Ignored;
        };
        if attempt != self.attempt {
            return Step::Ignored;
        }
        if let Some(id) = timeout {
            timers.cancel_timer(id);
        }
        self.phase = Phase::Succeeded;
        Step::Succeeded { attempt }
    }

    /// Report that `attempt` failed.
    pub fn fail(&mut self, attempt: u32, timers: &mut TimerQueue<K, T>, now_ms: u64) -> Step {
        let Phase::Running { timeout } = self.phase else {
            return Step::Ignored;
        };
        if attempt != self.attempt {
            return Step::Ignored;
        }
        if let Some(id) = timeout {
            timers.cancel_timer(id);
        }
        self.conclude_failure(attempt, AttemptFailure::Errored, timers, now_ms)
    }

    /// Feed back a timer this run armed.
    pub fn on_timer(
        &mut self,
        timer: RetryTimer,
        timers: &mut TimerQueue<K, T>,
        now_ms: u64,
    ) -> Step {
        match (timer, self.phase) {
            (RetryTimer::Timeout { attempt }, Phase::Running { .. }) if attempt == self.attempt => {
                self.conclude_failure(attempt, AttemptFailure::TimedOut, timers, now_ms)
            },
            (RetryTimer::Resume { attempt }, Phase::Backoff { next, .. }) if attempt == next => {
                self.begin_attempt(attempt, timers, now_ms)
            },
            _ => Step::Ignored,
        }
    }

    /// Disarm every timer this run holds. The run ignores all later signals.
    pub fn cancel(&mut self, timers: &mut TimerQueue<K, T>) {
        match self.phase {
            Phase::Running { timeout: Some(id) } | Phase::Backoff { timer: id, .. } => {
                timers.cancel_timer(id);
            },
            _ => {},
        }
        self.phase = Phase::Cancelled;
    }

    /// The current (or last) attempt number; 0 before the first launch.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts still available after the current one.
    pub fn remaining(&self) -> u32 {
        self.policy.max_attempts.saturating_sub(self.attempt)
    }

    /// Whether an attempt is currently in flight.
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    /// Whether the run is waiting out the inter-attempt delay.
    pub fn is_backing_off(&self) -> bool {
        matches!(self.phase, Phase::Backoff { .. })
    }

    /// Whether the run has reached a final outcome (or was cancelled).
    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            Phase::Succeeded | Phase::Exhausted | Phase::Cancelled
        )
    }

    pub fn last_failure(&self) -> Option<AttemptFailure> {
        self.last_failure
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn begin_attempt(&mut self, attempt: u32, timers: &mut TimerQueue<K, T>, now_ms: u64) -> Step {
        self.attempt = attempt;
        let timeout = (self.policy.per_attempt_timeout_ms > 0).then(|| {
            timers.schedule(
                self.token.clone(),
                now_ms.saturating_add(self.policy.per_attempt_timeout_ms),
                (self.wrap)(RetryTimer::Timeout { attempt }),
            )
        });
        self.phase = Phase::Running { timeout };
        Step::Launch { attempt }
    }

    fn conclude_failure(
        &mut self,
        attempt: u32,
        failure: AttemptFailure,
        timers: &mut TimerQueue<K, T>,
        now_ms: u64,
    ) -> Step {
        self.last_failure = Some(failure);
        if attempt >= self.policy.max_attempts {
            self.phase = Phase::Exhausted;
            log::debug!("retry run exhausted after {attempt} attempt(s), last {failure:?}");
            return Step::Exhausted {
                attempts: attempt,
                last: failure,
            };
        }

        let next = attempt + 1;
        let delay_ms = self.policy.delay_between_ms;
        if delay_ms == 0 {
            self.begin_attempt(next, timers, now_ms);
        } else {
            let timer = timers.schedule(
                self.token.clone(),
                now_ms.saturating_add(delay_ms),
                (self.wrap)(RetryTimer::Resume { attempt: next }),
            );
            self.phase = Phase::Backoff { next, timer };
        }
        Step::Retrying {
            failed: attempt,
            failure,
            next,
            delay_ms,
        }
    }
}
