//! Timer scheduling and bounded retry/timeout control for Folio.
//!
//! Everything here is driven by the caller's clock and nothing blocks.
//! A [`TimerQueue`] holds token-tagged deadlines and hands back
//! the ones that are due; a [`RetryRun`] uses it to bound an operation by
//! attempt count, per-attempt timeout, and inter-attempt delay.

pub mod retry;
pub mod timer;

pub use retry::{AttemptFailure, RetryPolicy, RetryRun, RetryTimer, Step};
pub use timer::{Fired, TimerId, TimerQueue};
