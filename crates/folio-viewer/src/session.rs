//! Viewer session: the preview strategy state machine.
//!
//! ```text
//! Idle ─▶ Probing ─┬─▶ Accessible ─▶ RenderingPrimarySurface ─┬─▶ Loaded
//!                  │                          │ error/timeout  │
//!                  │                          ▼                │
//!                  │              RenderingSandboxedSurface ───┘
//!                  │                          │ error/timeout
//!                  │                          ▼
//!                  └─▶ Inaccessible ─▶ AlternateRich | RawFallback | Failed
//! ```
//!
//! Every asynchronous signal (probe reply, timer, surface load/error)
//! carries the epoch it was issued under and is dropped unless that epoch
//! is still current. Reset cancels the current epoch's timers before the
//! epoch is bumped.

use std::sync::Arc;

use folio_net::probe::{ProbeStep, ProbeTarget, Prober};
use folio_net::relay::RelayRewriter;
use folio_net::transport::{ProbeReply, ProbeTicket, ProbeTransport};
use folio_sched::{AttemptFailure, RetryPolicy, RetryRun, RetryTimer, Step, TimerQueue};
use folio_types::config::ViewerConfig;
use folio_types::error::{FolioError, Result};
use folio_types::model::{
    Accessibility, ContentClass, Epoch, FailureReason, PreviewRequest, ProbeResult,
    RecoveryOption, RenderAttempt, RenderOutcome, RenderTicket, SessionHandle, Strategy,
    ViewerState,
};

use crate::notifier::Notifier;
use crate::resolver::resolve;
use crate::surface::SurfaceHost;

/// Timer payloads armed by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTimer {
    Probe(RetryTimer),
    Render(RetryTimer),
}

/// Budgets a session runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub probe: RetryPolicy,
    /// One attempt per embedded strategy, no pause between them.
    pub render: RetryPolicy,
    /// Whether `open_externally` hands out the relay reference.
    pub external_via_relay: bool,
}

impl SessionSettings {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            probe: RetryPolicy::new(
                config.probe.max_attempts,
                config.probe.per_attempt_timeout_ms,
                config.probe.delay_between_ms,
            ),
            render: RetryPolicy::new(
                config
                    .render
                    .max_strategy_attempts
                    .clamp(1, Strategy::EMBEDDED_COUNT),
                config.render.timeout_ms,
                0,
            ),
            external_via_relay: config.relay.external_via_relay,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ViewerConfig::default())
    }
}

/// One end-to-end preview of one [`PreviewRequest`].
pub struct ViewerSession {
    handle: SessionHandle,
    request: PreviewRequest,
    settings: SessionSettings,
    relay: Arc<RelayRewriter>,
    epoch: Epoch,
    state: ViewerState,
    probe: ProbeResult,
    attempts: Vec<RenderAttempt>,
    failure: Option<FailureReason>,
    timers: TimerQueue<Epoch, SessionTimer>,
    prober: Option<Prober<SessionTimer>>,
    render: Option<RetryRun<Epoch, SessionTimer>>,
    notifier: Box<dyn Notifier>,
    surface: Box<dyn SurfaceHost>,
}

impl ViewerSession {
    /// Create an idle session. Nothing happens until [`start`](Self::start).
    pub fn new(
        handle: SessionHandle,
        request: PreviewRequest,
        settings: SessionSettings,
        relay: Arc<RelayRewriter>,
        notifier: Box<dyn Notifier>,
        surface: Box<dyn SurfaceHost>,
    ) -> Self {
        Self {
            handle,
            request,
            settings,
            relay,
            epoch: Epoch(1),
            state: ViewerState::Idle,
            probe: ProbeResult::unknown(),
            attempts: Vec::new(),
            failure: None,
            timers: TimerQueue::new(),
            prober: None,
            render: None,
            notifier,
            surface,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn request(&self) -> &PreviewRequest {
        &self.request
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn probe_result(&self) -> &ProbeResult {
        &self.probe
    }

    /// Render attempts of the current epoch, oldest first.
    pub fn attempts(&self) -> &[RenderAttempt] {
        &self.attempts
    }

    /// The terminal failure, while in `Failed`.
    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_due()
    }

    /// Number of non-stale operations currently in flight (0 or 1).
    pub fn in_flight(&self) -> usize {
        let probing = self.prober.as_ref().is_some_and(|p| p.is_in_flight());
        let rendering = self.render.as_ref().is_some_and(|r| r.is_running());
        usize::from(probing) + usize::from(rendering)
    }

    /// Recovery options for the current request: `Retry` always,
    /// `OpenExternally` with a primary reference, `SwitchToAlternate` with
    /// alternate content.
    pub fn recovery_options(&self) -> Vec<RecoveryOption> {
        let mut options = vec![RecoveryOption::Retry];
        if self.request.primary().is_some() {
            options.push(RecoveryOption::OpenExternally);
        }
        if self.request.alternate().is_some() {
            options.push(RecoveryOption::SwitchToAlternate);
        }
        options
    }

    /// The reference to open outside the embedded surface.
    pub fn open_externally(&self) -> Option<String> {
        let primary = self.request.primary()?;
        if self.settings.external_via_relay {
            Some(self.relay.rewrite(primary))
        } else {
            Some(primary.to_string())
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Begin the session from `Idle`: probe the primary reference, or go
    /// straight to fallback resolution when there is none.
    pub fn start(&mut self, transport: &mut dyn ProbeTransport, now_ms: u64) {
        if self.state != ViewerState::Idle {
            log::debug!("{} start ignored in {:?}", self.handle, self.state);
            return;
        }
        let Some(reference) = self.request.primary().map(str::to_string) else {
            log::info!("{} has no primary reference; skipping probe", self.handle);
            self.probe = ProbeResult {
                accessible: Accessibility::Inaccessible,
                ..ProbeResult::unknown()
            };
            self.set_state(ViewerState::Inaccessible);
            self.resolve_content(now_ms);
            return;
        };

        self.set_state(ViewerState::Probing);
        let target = ProbeTarget {
            session: self.handle,
            epoch: self.epoch,
            url: self.relay.rewrite(&reference),
            reference,
            expected: self.request.expected_kind,
        };
        let (prober, step) = Prober::start(
            target,
            self.settings.probe,
            &mut self.timers,
            SessionTimer::Probe,
            now_ms,
        );
        self.prober = Some(prober);
        self.follow_probe(step, transport, now_ms);
    }

    /// Manual retry: new epoch, fresh budgets, back to `Probing`.
    pub fn retry(&mut self, transport: &mut dyn ProbeTransport, now_ms: u64) -> Result<()> {
        self.ensure_live()?;
        log::info!("{} retry requested in {:?}", self.handle, self.state);
        self.reset(transport, now_ms);
        Ok(())
    }

    /// Replace the primary reference. In-flight work for the old reference
    /// is superseded. Returns `false` when the reference is unchanged.
    pub fn change_reference(
        &mut self,
        reference: &str,
        transport: &mut dyn ProbeTransport,
        now_ms: u64,
    ) -> Result<bool> {
        self.ensure_live()?;
        let reference = reference.trim();
        if self.request.primary() == Some(reference) {
            log::debug!("{} reference unchanged", self.handle);
            return Ok(false);
        }
        self.request.primary_reference = (!reference.is_empty()).then(|| reference.to_string());
        log::info!("{} reference changed", self.handle);
        self.reset(transport, now_ms);
        Ok(true)
    }

    /// Abandon the primary document and show the alternate content.
    pub fn switch_to_alternate(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.request.alternate().is_none() {
            return Err(FolioError::NoAlternate);
        }
        self.supersede();
        self.failure = None;
        self.show_alternate();
        Ok(())
    }

    /// Cancel everything and go quiet. No callbacks fire afterwards.
    pub fn dispose(&mut self) {
        if self.state == ViewerState::Disposed {
            return;
        }
        self.supersede();
        self.state = ViewerState::Disposed;
        log::info!("{} disposed", self.handle);
    }

    // -- Asynchronous signals -----------------------------------------------

    /// A probe reply arrived from the transport.
    pub fn on_probe_reply(
        &mut self,
        ticket: ProbeTicket,
        reply: ProbeReply,
        transport: &mut dyn ProbeTransport,
        now_ms: u64,
    ) {
        if ticket.session != self.handle || ticket.epoch != self.epoch {
            log::debug!("{} dropping probe reply from {}", self.handle, ticket.epoch);
            return;
        }
        let Some(prober) = self.prober.as_mut() else {
            return;
        };
        let step = prober.on_reply(ticket, reply, &mut self.timers, now_ms);
        self.follow_probe(step, transport, now_ms);
    }

    /// The surface reported that `ticket`'s mount finished loading.
    pub fn on_surface_loaded(&mut self, ticket: RenderTicket) {
        if !self.is_current_render(&ticket) {
            log::debug!(
                "{} dropping load signal for {} attempt {}",
                self.handle,
                ticket.epoch,
                ticket.attempt
            );
            return;
        }
        let Some(run) = self.render.as_mut() else {
            return;
        };
        if let Step::Succeeded { attempt } = run.succeed(ticket.attempt, &mut self.timers) {
            self.set_outcome(attempt, RenderOutcome::Loaded);
            self.set_state(ViewerState::Loaded);
            self.notifier.on_loaded();
        }
    }

    /// The surface reported that `ticket`'s mount failed.
    pub fn on_surface_error(&mut self, ticket: RenderTicket, detail: &str, now_ms: u64) {
        if !self.is_current_render(&ticket) {
            log::debug!(
                "{} dropping error signal for {} attempt {}",
                self.handle,
                ticket.epoch,
                ticket.attempt
            );
            return;
        }
        log::debug!("{} surface error on attempt {}: {detail}", self.handle, ticket.attempt);
        let Some(run) = self.render.as_mut() else {
            return;
        };
        let step = run.fail(ticket.attempt, &mut self.timers, now_ms);
        self.follow_render(step, now_ms);
    }

    /// Fire every timer due at `now_ms`.
    pub fn advance(&mut self, now_ms: u64, transport: &mut dyn ProbeTransport) {
        if self.state == ViewerState::Disposed {
            return;
        }
        for fired in self.timers.expire(now_ms) {
            if fired.token != self.epoch {
                log::debug!("{} dropping timer from {}", self.handle, fired.token);
                continue;
            }
            match fired.payload {
                SessionTimer::Probe(timer) => {
                    let Some(prober) = self.prober.as_mut() else {
                        continue;
                    };
                    let step = prober.on_timer(timer, &mut self.timers, now_ms);
                    self.follow_probe(step, transport, now_ms);
                },
                SessionTimer::Render(timer) => {
                    let Some(run) = self.render.as_mut() else {
                        continue;
                    };
                    let step = run.on_timer(timer, &mut self.timers, now_ms);
                    self.follow_render(step, now_ms);
                },
            }
        }
    }

    // -- Internals ----------------------------------------------------------

    fn ensure_live(&self) -> Result<()> {
        if self.state == ViewerState::Disposed {
            Err(FolioError::UnknownSession(self.handle))
        } else {
            Ok(())
        }
    }

    /// Cancel this epoch's work, then move to a fresh epoch.
    fn supersede(&mut self) {
        self.timers.cancel(&self.epoch);
        if let Some(mut prober) = self.prober.take() {
            prober.cancel(&mut self.timers);
        }
        if let Some(mut run) = self.render.take() {
            run.cancel(&mut self.timers);
        }
        self.surface.unmount();
        self.epoch = self.epoch.next();
    }

    fn reset(&mut self, transport: &mut dyn ProbeTransport, now_ms: u64) {
        self.supersede();
        self.attempts.clear();
        self.probe = ProbeResult::unknown();
        self.failure = None;
        self.state = ViewerState::Idle;
        log::debug!("{} reset to {}", self.handle, self.epoch);
        self.start(transport, now_ms);
    }

    fn set_state(&mut self, state: ViewerState) {
        if self.state == state {
            return;
        }
        log::info!("{} {:?} -> {:?}", self.handle, self.state, state);
        self.state = state;
        self.notifier.on_state_changed(state);
    }

    fn follow_probe(&mut self, step: ProbeStep, transport: &mut dyn ProbeTransport, now_ms: u64) {
        match step {
            ProbeStep::Send(request) => transport.send(request),
            ProbeStep::Pending => {},
            ProbeStep::Finished(result) => {
                self.probe = result;
                if self.probe.is_accessible() {
                    self.set_state(ViewerState::Accessible);
                } else {
                    self.set_state(ViewerState::Inaccessible);
                }
                self.resolve_content(now_ms);
            },
        }
    }

    fn resolve_content(&mut self, now_ms: u64) {
        match resolve(&self.request, &self.probe) {
            ContentClass::PrimaryDocument => self.begin_render(now_ms),
            ContentClass::AlternateRich => self.show_alternate(),
            ContentClass::RawFallback => {
                if let Some(content) = self.request.raw_fallback() {
                    self.surface.show_raw(content);
                }
                self.set_state(ViewerState::RawFallback);
            },
            ContentClass::NoContent => self.fail(FailureReason::NoContentAvailable),
        }
    }

    fn show_alternate(&mut self) {
        if let Some(content) = self.request.alternate() {
            self.surface.show_alternate(content);
        }
        self.set_state(ViewerState::AlternateRich);
    }

    fn begin_render(&mut self, now_ms: u64) {
        let (run, step) = RetryRun::start(
            self.settings.render,
            self.epoch,
            SessionTimer::Render,
            &mut self.timers,
            now_ms,
        );
        self.render = Some(run);
        self.follow_render(step, now_ms);
    }

    fn follow_render(&mut self, step: Step, now_ms: u64) {
        match step {
            Step::Retrying { failed, failure, .. } => self.attempt_failed(failed, failure),
            Step::Exhausted { attempts, last } => {
                self.attempt_failed(attempts, last);
                self.fail(FailureReason::StrategyExhausted);
                return;
            },
            _ => {},
        }
        if let Some(attempt) = step.launch_now() {
            self.mount(attempt, now_ms);
        }
    }

    fn mount(&mut self, attempt: u32, now_ms: u64) {
        let strategy = Strategy::for_attempt(attempt);
        let Some(state) = ViewerState::rendering(strategy) else {
            self.fail(FailureReason::StrategyExhausted);
            return;
        };
        if attempt > 1 {
            self.surface.unmount();
        }
        self.attempts.push(RenderAttempt {
            strategy,
            attempt_number: attempt,
            outcome: RenderOutcome::Pending,
            started_at_ms: now_ms,
        });
        self.set_state(state);

        let ticket = RenderTicket {
            session: self.handle,
            epoch: self.epoch,
            attempt,
        };
        let reference = self
            .request
            .primary()
            .map(|r| self.relay.rewrite(r))
            .unwrap_or_default();
        self.surface.mount(ticket, strategy, &reference);
    }

    fn attempt_failed(&mut self, attempt: u32, failure: AttemptFailure) {
        let (outcome, reason) = match failure {
            AttemptFailure::Errored => (RenderOutcome::Errored, FailureReason::RenderErrored),
            AttemptFailure::TimedOut => (RenderOutcome::TimedOut, FailureReason::RenderTimedOut),
        };
        log::debug!(
            "{} {:?} attempt {attempt}: {reason}",
            self.handle,
            Strategy::for_attempt(attempt)
        );
        self.set_outcome(attempt, outcome);
    }

    fn set_outcome(&mut self, attempt: u32, outcome: RenderOutcome) {
        if let Some(entry) = self
            .attempts
            .iter_mut()
            .rev()
            .find(|a| a.attempt_number == attempt && a.outcome == RenderOutcome::Pending)
        {
            entry.outcome = outcome;
        }
    }

    fn fail(&mut self, reason: FailureReason) {
        if let Some(mut prober) = self.prober.take() {
            prober.cancel(&mut self.timers);
        }
        if let Some(mut run) = self.render.take() {
            run.cancel(&mut self.timers);
        }
        self.surface.unmount();
        self.failure = Some(reason);
        self.set_state(ViewerState::Failed);

        let recovery = self.recovery_options();
        log::warn!("{} failed: {reason} (recovery {recovery:?})", self.handle);
        self.notifier.on_error(reason, &recovery);
    }

    fn is_current_render(&self, ticket: &RenderTicket) -> bool {
        ticket.session == self.handle
            && ticket.epoch == self.epoch
            && self
                .render
                .as_ref()
                .is_some_and(|r| r.is_running() && r.attempt() == ticket.attempt)
    }
}
